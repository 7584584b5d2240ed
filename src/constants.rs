//! Application-wide constants
//!
//! This module contains constants used throughout the application.

/// URL prefix uploaded files are served under.
pub const UPLOADS_URL_PREFIX: &str = "/uploads";

/// Default number of surveys returned by the list endpoint.
pub const DEFAULT_PAGE_SIZE: u64 = 20;

/// Upper bound on any `limit` query parameter.
pub const MAX_PAGE_SIZE: u64 = 100;

/// Number of entries in each "recent" list on the owner dashboard.
pub const DASHBOARD_RECENT_COUNT: u64 = 5;

/// Seconds an aggregated results payload stays cached.
pub const RESULTS_CACHE_TTL_SECS: u64 = 300;

/// Rating scale used when a rating question declares no bounds.
pub const DEFAULT_RATING_MIN: i32 = 1;
pub const DEFAULT_RATING_MAX: i32 = 5;

/// Widest accepted rating scale, `max_value - min_value`.
pub const MAX_RATING_SPAN: i64 = 100;

/// Seconds between sweeps that close surveys past their `expires_at`.
pub const EXPIRY_SWEEP_INTERVAL_SECS: u64 = 60;
