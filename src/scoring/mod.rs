pub mod bargain_scorer;
pub mod report;

pub use bargain_scorer::*;
pub use report::*;
