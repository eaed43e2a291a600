//! SQLite-backed snapshot loaders and writers
//!
//! Loaders take a point-in-time copy so that one query never observes the
//! catalog or history changing mid-evaluation. Any database failure while
//! loading is reported as [`StoreError::Unavailable`](crate::error::StoreError).

pub mod history;
pub mod tracks;

pub use history::{last_played_at, load_history_since, record_play};
pub use tracks::{find_track_id_by_path, load_catalog, save_track};
