//! # SmartPlayer Common Library
//!
//! Shared code for SmartPlayer services including:
//! - Track and play-history models
//! - Database initialization and settings
//! - Configuration loading
//! - Timestamp helpers

pub mod config;
pub mod db;
pub mod error;
pub mod time;

pub use db::models::{Embedding, HistoryEntry, Track, TrackId};
pub use error::{Error, Result};
