pub mod evaluation;
pub mod pricing_model;

pub use evaluation::*;
pub use pricing_model::*;
