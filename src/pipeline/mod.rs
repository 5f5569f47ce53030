pub mod bargain_pipeline;

pub use bargain_pipeline::*;
