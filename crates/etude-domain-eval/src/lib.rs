pub mod analyzer;
pub mod difficulty;
pub mod scoring;

pub use analyzer::*;
pub use difficulty::*;
pub use scoring::*;
