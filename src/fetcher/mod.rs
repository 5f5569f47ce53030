pub mod listing_fetcher;
pub mod listing_parser;

pub use listing_fetcher::*;
pub use listing_parser::*;
