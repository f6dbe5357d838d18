//! Integration tests for the world, facets and frame loop

mod world_lifecycle;
