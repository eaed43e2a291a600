//! Selection settings
//!
//! Loaded from the database `settings` table, then overridden by the TOML
//! `[selection]` section. Command-line flags are applied by the caller.

use chrono::Duration;
use smp_common::config::SelectionOverrides;
use smp_common::db::init::{
    load_setting, SETTING_NEAR_DUPLICATE_THRESHOLD, SETTING_RECENCY_WINDOW_SECS,
    SETTING_SHORTLIST_SIZE, SETTING_TITLE_MATCH,
};
use smp_common::time::window_from_secs;
use smp_common::{Error, Result};
use sqlx::SqlitePool;
use tracing::warn;

use crate::filters::TitleMatch;
use crate::query::{DEFAULT_NEAR_DUPLICATE_THRESHOLD, DEFAULT_RECENCY_WINDOW_SECS};

const DEFAULT_SHORTLIST_SIZE: usize = 5;

/// Effective selection parameters
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionSettings {
    pub recency_window_secs: u64,
    pub near_duplicate_threshold: f64,
    pub shortlist_size: usize,
    pub title_match: TitleMatch,
}

impl Default for SelectionSettings {
    fn default() -> Self {
        Self {
            recency_window_secs: DEFAULT_RECENCY_WINDOW_SECS,
            near_duplicate_threshold: DEFAULT_NEAR_DUPLICATE_THRESHOLD,
            shortlist_size: DEFAULT_SHORTLIST_SIZE,
            title_match: TitleMatch::default(),
        }
    }
}

impl SelectionSettings {
    /// Load settings from the database; missing or NULL keys keep defaults
    pub async fn load(pool: &SqlitePool) -> Result<Self> {
        let mut settings = Self::default();

        if let Some(value) = load_setting(pool, SETTING_RECENCY_WINDOW_SECS).await? {
            settings.recency_window_secs = parse_window(&value, SETTING_RECENCY_WINDOW_SECS)?;
        }
        if let Some(value) = load_setting(pool, SETTING_NEAR_DUPLICATE_THRESHOLD).await? {
            settings.near_duplicate_threshold =
                parse_threshold(&value, SETTING_NEAR_DUPLICATE_THRESHOLD)?;
        }
        if let Some(value) = load_setting(pool, SETTING_SHORTLIST_SIZE).await? {
            settings.shortlist_size = parse_shortlist(&value, SETTING_SHORTLIST_SIZE)?;
        }
        if let Some(value) = load_setting(pool, SETTING_TITLE_MATCH).await? {
            settings.title_match = parse_title_match(&value, SETTING_TITLE_MATCH);
        }

        Ok(settings)
    }

    /// Apply TOML overrides on top of the current values
    pub fn apply_overrides(&mut self, overrides: &SelectionOverrides) -> Result<()> {
        if let Some(secs) = overrides.recency_window_secs {
            self.recency_window_secs = secs;
        }
        if let Some(threshold) = overrides.near_duplicate_threshold {
            self.near_duplicate_threshold =
                check_threshold(threshold, "selection.near_duplicate_threshold")?;
        }
        if let Some(size) = overrides.shortlist_size {
            self.shortlist_size = check_shortlist(size, "selection.shortlist_size")?;
        }
        if let Some(strategy) = overrides.title_match.as_deref() {
            self.title_match = parse_title_match(strategy, "selection.title_match");
        }
        Ok(())
    }

    pub fn recency_window(&self) -> Duration {
        window_from_secs(self.recency_window_secs)
    }
}

fn parse_window(value: &str, key: &str) -> Result<u64> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|e| Error::Config(format!("Invalid {} '{}': {}", key, value, e)))
}

fn parse_threshold(value: &str, key: &str) -> Result<f64> {
    let threshold = value
        .trim()
        .parse::<f64>()
        .map_err(|e| Error::Config(format!("Invalid {} '{}': {}", key, value, e)))?;
    check_threshold(threshold, key)
}

/// Cosine distance lives in [0, 2]
fn check_threshold(threshold: f64, key: &str) -> Result<f64> {
    if threshold.is_finite() && (0.0..=2.0).contains(&threshold) {
        Ok(threshold)
    } else {
        Err(Error::Config(format!(
            "Invalid {} {}: must be between 0 and 2",
            key, threshold
        )))
    }
}

fn parse_shortlist(value: &str, key: &str) -> Result<usize> {
    let size = value
        .trim()
        .parse::<usize>()
        .map_err(|e| Error::Config(format!("Invalid {} '{}': {}", key, value, e)))?;
    check_shortlist(size, key)
}

fn check_shortlist(size: usize, key: &str) -> Result<usize> {
    if size == 0 {
        return Err(Error::Config(format!("Invalid {} 0: must be at least 1", key)));
    }
    Ok(size)
}

fn parse_title_match(value: &str, key: &str) -> TitleMatch {
    value.parse().unwrap_or_else(|e| {
        warn!("Invalid {}: {}; using '{}'", key, e, TitleMatch::default().as_str());
        TitleMatch::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = SelectionSettings::default();
        assert_eq!(settings.recency_window(), Duration::hours(2));
        assert_eq!(settings.near_duplicate_threshold, 0.001);
        assert_eq!(settings.shortlist_size, 5);
        assert_eq!(settings.title_match, TitleMatch::Substring);
    }

    #[test]
    fn test_overrides_apply() {
        let mut settings = SelectionSettings::default();
        settings
            .apply_overrides(&SelectionOverrides {
                recency_window_secs: Some(600),
                near_duplicate_threshold: Some(0.02),
                shortlist_size: Some(3),
                title_match: Some("normalized".to_string()),
            })
            .unwrap();

        assert_eq!(settings.recency_window_secs, 600);
        assert_eq!(settings.near_duplicate_threshold, 0.02);
        assert_eq!(settings.shortlist_size, 3);
        assert_eq!(settings.title_match, TitleMatch::Normalized);
    }

    #[test]
    fn test_empty_overrides_change_nothing() {
        let mut settings = SelectionSettings::default();
        settings.apply_overrides(&SelectionOverrides::default()).unwrap();
        assert_eq!(settings, SelectionSettings::default());
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let mut settings = SelectionSettings::default();
        let result = settings.apply_overrides(&SelectionOverrides {
            near_duplicate_threshold: Some(-0.5),
            ..Default::default()
        });
        assert!(matches!(result, Err(Error::Config(_))));
        assert!(parse_threshold("NaN", "k").is_err());
        assert!(parse_threshold("abc", "k").is_err());
        assert_eq!(parse_threshold(" 0.01 ", "k").unwrap(), 0.01);
    }

    #[test]
    fn test_zero_shortlist_rejected() {
        assert!(parse_shortlist("0", "k").is_err());
        assert_eq!(parse_shortlist("7", "k").unwrap(), 7);
    }

    #[test]
    fn test_unknown_title_match_falls_back() {
        assert_eq!(parse_title_match("fuzzy", "k"), TitleMatch::Substring);
    }
}
