pub mod engine;
pub mod pattern;

pub use engine::{AccessSnapshot, Decision, PolicyEngine, PolicyError, evaluate};
