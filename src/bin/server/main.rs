use actix_files::Files;
use actix_web::http::header;
use actix_web::middleware::{DefaultHeaders, Logger};
use actix_web::web::Data;
use actix_web::{App, HttpServer};
use env_logger::Env;
use std::io::{Error, ErrorKind};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use survey_platform::app_config;
use survey_platform::auth::TokenVerifier;
use survey_platform::constants::{EXPIRY_SWEEP_INTERVAL_SECS, UPLOADS_URL_PREFIX};
use survey_platform::db;
use survey_platform::storage::local::LocalStorage;
use survey_platform::storage::StorageBackend;
use survey_platform::surveys;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    init_lib_mods();
    init_our_mods();

    let database = app_config::database();
    let server_config = app_config::server();
    let uploads = app_config::uploads();

    let pool = db::connect(&database.url, database.max_connections)
        .await
        .map_err(|e| Error::new(ErrorKind::Other, format!("Database connection failed: {}", e)))?;
    if database.create_schema {
        db::create_schema(&pool)
            .await
            .map_err(|e| Error::new(ErrorKind::Other, format!("Schema creation failed: {}", e)))?;
    }

    let verifier = TokenVerifier::from_config(&app_config::auth())
        .map_err(|e| Error::new(ErrorKind::InvalidInput, e.to_string()))?;

    let upload_root = PathBuf::from(&uploads.directory);
    let storage: Arc<dyn StorageBackend> = Arc::new(
        LocalStorage::new(upload_root.clone())
            .map_err(|e| Error::new(ErrorKind::Other, e.to_string()))?,
    );

    // Close surveys whose expiry has passed.
    let sweep_pool = pool.clone();
    actix_web::rt::spawn(async move {
        let mut interval =
            actix_web::rt::time::interval(Duration::from_secs(EXPIRY_SWEEP_INTERVAL_SECS));
        loop {
            interval.tick().await;
            match surveys::close_expired(&sweep_pool).await {
                Ok(0) => {}
                Ok(n) => log::info!("Expiry sweep closed {} survey(s)", n),
                Err(e) => log::error!("Expiry sweep failed: {}", e),
            }
        }
    });

    let mut server = HttpServer::new(move || {
        // Order of middleware IS IMPORTANT and is in REVERSE EXECUTION ORDER.
        App::new()
            .app_data(Data::new(pool.clone()))
            .app_data(Data::new(verifier.clone()))
            .app_data(Data::new(storage.clone()))
            .app_data(Data::new(uploads.clone()))
            // Security headers - applied to all responses
            .wrap(
                DefaultHeaders::new()
                    .add((header::X_FRAME_OPTIONS, "DENY"))
                    .add((header::X_CONTENT_TYPE_OPTIONS, "nosniff"))
                    .add(("Referrer-Policy", "strict-origin-when-cross-origin")),
            )
            .wrap(Logger::new("%a %r %s %Dms"))
            .configure(survey_platform::web::configure)
            .service(Files::new(UPLOADS_URL_PREFIX, upload_root.clone()))
    });

    if server_config.workers > 0 {
        server = server.workers(server_config.workers);
    }

    log::info!("Listening on {}", server_config.bind_address);
    server.bind(&server_config.bind_address)?.run().await
}

/// Initialize third party crates we rely on but don't have control over.
pub fn init_lib_mods() {
    // This should be calls to crates without any transformative work applied.
    if let Err(e) = dotenv::dotenv() {
        eprintln!("No .env file loaded: {}", e);
    }
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
}

/// Initialize all local mods.
pub fn init_our_mods() {
    survey_platform::app_config::init();
}
