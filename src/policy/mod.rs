pub mod defaults;
pub mod engine;
pub mod linter;
pub mod parser;
pub mod types;

pub use engine::PolicySet;
pub use types::*;
