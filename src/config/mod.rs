pub mod pipeline_config;
pub mod scrape_config;

pub use pipeline_config::*;
pub use scrape_config::*;
