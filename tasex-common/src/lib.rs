//! # Tasex Common Library
//!
//! Shared code for the tasting-experiment services:
//! - Database schema initialization and row models
//! - Panel lifecycle and description-visibility enums
//! - Configuration loading
//! - Common error type

pub mod config;
pub mod db;
pub mod error;

pub use error::{Error, Result};
