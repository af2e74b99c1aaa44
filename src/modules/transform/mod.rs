pub mod engine;
pub mod operations;

pub use engine::{TransformEngine, OUTPUT_CONTENT_TYPE};
