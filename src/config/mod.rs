//! Configuration module for procsignal
//!
//! Provides XDG-compliant layered configuration loading.

pub mod loader;
pub mod model;

pub use loader::{config_paths, find_config_files, layered, load_config};
pub use model::*;
