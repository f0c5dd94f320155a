//! # Core Runtime Module
//!
//! Runtime infrastructure shared by the sync pipeline crates:
//! - Logging and tracing setup
//! - Pipeline configuration
//! - Event bus for run and record events

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
