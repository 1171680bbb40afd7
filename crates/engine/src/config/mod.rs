//! Configuration for the docflow engine.
//!
//! Loaded from `DOCFLOW_`-prefixed environment variables using the `envy`
//! crate for type-safe parsing.

mod engine;

pub use engine::EngineConfig;
