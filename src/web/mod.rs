pub mod images;
pub mod index;
pub mod responses;
pub mod surveys;

use crate::error::ApiError;
use actix_web::web::{JsonConfig, PathConfig, QueryConfig, ServiceConfig};

/// Configures the web app by adding services from each web file.
///
/// @see https://docs.rs/actix-web/4/actix_web/struct.App.html#method.configure
pub fn configure(conf: &mut ServiceConfig) {
    // Descending order. Order is important.
    // Route resolution will stop at the first match, so fixed paths under
    // /api/surveys/ must come before /api/surveys/{id}.
    conf.app_data(json_config())
        .app_data(query_config())
        .app_data(path_config());

    index::configure(conf);
    responses::configure(conf);
    surveys::configure(conf);
    images::configure(conf);
}

/// Malformed bodies are rendered like every other validation failure.
pub fn json_config() -> JsonConfig {
    JsonConfig::default().error_handler(|err, _req| {
        ApiError::Validation(format!("Invalid request body: {}", err)).into()
    })
}

pub fn query_config() -> QueryConfig {
    QueryConfig::default().error_handler(|err, _req| {
        ApiError::Validation(format!("Invalid query string: {}", err)).into()
    })
}

pub fn path_config() -> PathConfig {
    PathConfig::default().error_handler(|err, _req| {
        ApiError::Validation(format!("Invalid path parameter: {}", err)).into()
    })
}
