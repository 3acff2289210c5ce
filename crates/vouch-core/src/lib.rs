pub mod baseline;
pub mod config;
pub mod cost;
pub mod embeddings;
pub mod engine;
pub mod errors;
pub mod judge;
pub mod logging;
pub mod model;
pub mod pricing;
pub mod providers;
pub mod report;
pub mod snapshot;
pub mod stats;
pub mod storage;

pub use engine::{Engine, EngineBuilder, TestContext, TestOutcome, TestSession};
pub use errors::{EvalError, Result};
