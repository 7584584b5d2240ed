//! In-memory caching for aggregated survey results.
//! Uses moka for TTL-based caching with LRU eviction.

use crate::constants::RESULTS_CACHE_TTL_SECS;
use crate::responses::SurveyResults;
use moka::sync::Cache;
use once_cell::sync::Lazy;
use std::sync::Arc;
use std::time::Duration;

/// Key is survey_id, value is the results payload computed for it.
static RESULTS_CACHE: Lazy<Cache<i32, Arc<SurveyResults>>> = Lazy::new(|| {
    Cache::builder()
        .time_to_live(Duration::from_secs(RESULTS_CACHE_TTL_SECS))
        .max_capacity(10_000)
        .build()
});

pub fn get_results(survey_id: i32) -> Option<Arc<SurveyResults>> {
    RESULTS_CACHE.get(&survey_id)
}

pub fn put_results(survey_id: i32, results: Arc<SurveyResults>) {
    RESULTS_CACHE.insert(survey_id, results);
}

/// Invalidate cached results for a survey.
/// Call this after any write to the survey, its questions or its responses.
pub fn invalidate_results(survey_id: i32) {
    RESULTS_CACHE.invalidate(&survey_id);
}

/// Drop every cached entry.
pub fn clear_results_cache() {
    RESULTS_CACHE.invalidate_all();
}
