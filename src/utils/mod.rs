//! Utility modules and helper functions
//!
//! Shared helpers used by the core services and the HTTP layer.

pub mod file_utils;
pub mod logging;
pub mod network;
pub mod validation;

// Re-export commonly used utilities
pub use file_utils::*;
pub use logging::*;
pub use network::*;
pub use validation::*;
