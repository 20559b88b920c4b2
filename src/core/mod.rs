//! Core business logic module
//!
//! Proxy probing, cookie harvesting, media extraction and the download
//! job orchestration that ties them together.

pub mod catalog;
pub mod config;
pub mod cookies;
pub mod extractor;
pub mod models;
pub mod orchestrator;
pub mod proxy_prober;


// Re-export commonly used types
pub use catalog::Catalog;
pub use config::AppConfig;
pub use orchestrator::{JobOrchestrator, JobRegistry, Submission};
