//! smp-select library - next-track selection
//!
//! Given a reference track (or a raw embedding), picks the catalog track most
//! similar by cosine similarity after removing candidates that are explicitly
//! excluded, the same recording, played recently, or obviously the same song
//! by title.

pub mod catalog;
pub mod db;
pub mod error;
pub mod filters;
pub mod history;
pub mod query;
pub mod scorer;
pub mod selector;
pub mod service;
pub mod settings;

pub use catalog::{Catalog, CatalogSnapshot};
pub use error::{SelectionOutcome, StoreError};
pub use filters::{ExclusionFilter, FilterChain, RejectionStage, TitleMatch};
pub use history::{History, HistoryLog, TrackRef};
pub use query::{Reference, SelectionQuery};
pub use scorer::{cosine_distance, cosine_similarity, ReferenceVector, ScoreError};
pub use selector::{RankedTrack, Rejection, SelectionReport, Selector};
pub use service::{NextTrackService, ReferenceInput};
pub use settings::SelectionSettings;
