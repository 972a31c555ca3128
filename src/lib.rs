pub mod browser;
pub mod change_detector;
pub mod config;
pub mod models;
pub mod pipeline;
pub mod rate_limiter;
pub mod report;
pub mod storage;
pub mod utils;
pub mod vendors;

// Re-export commonly used types
pub use config::AppConfig;
pub use pipeline::{PipelineOptions, RunOutcome, ScrapePipeline};
pub use utils::error::AppError;

pub type Result<T> = std::result::Result<T, AppError>;
