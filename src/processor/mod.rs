pub mod feature_builder;
pub mod field_extractor;
pub mod listing_loader;
pub mod vocabulary;

pub use feature_builder::*;
pub use field_extractor::*;
pub use listing_loader::*;
pub use vocabulary::*;
