//! Configuration module for xscrape
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use xscrape::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("scrape.toml")).unwrap();
//! println!("{} jobs defined", config.jobs.len());
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{Config, DestinationConfig, HttpConfig, JobDefinition, StorageConfig};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};

pub(crate) use validation::{compile_xpath, parse_root_url};
