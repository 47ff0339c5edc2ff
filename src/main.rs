mod auth;
mod catalog;
mod config;
mod database;
mod error;
mod favorites;
mod filter;
mod model;
mod record_client;
mod routes;
mod session;

use actix_identity::IdentityMiddleware;
use actix_web::{cookie::Key, middleware::Logger, web, App, HttpServer};
use catalog::CatalogClient;
use config::Config;
use database::RecordStore;
use error::AppError;
use log::{info, warn};
use record_client::HttpRecordStore;
use routes::Settings;
use session::SessionStore;
use std::sync::Arc;
use std::time::Duration;

fn startup_error<E: std::fmt::Display>(err: E) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, err.to_string())
}

fn session_key(config: &Config) -> Result<Key, AppError> {
    match &config.session_secret {
        Some(secret) => Key::try_from(secret.as_bytes())
            .map_err(|_| AppError::Config("SESSION_SECRET must be at least 64 bytes".to_owned())),
        None => {
            warn!("SESSION_SECRET not set, logins will not survive a restart");
            Ok(Key::generate())
        }
    }
}

#[actix_rt::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("flicklist=debug,actix_web=info"),
    )
    .init();

    let config = Config::load().map_err(startup_error)?;
    let timeout = Duration::from_secs(config.http_timeout_secs);
    let db = sled::open(&config.data_dir).map_err(startup_error)?;

    let records: Arc<dyn RecordStore> = match &config.record_store_url {
        Some(url) => {
            info!("Using record store at {}", url);
            Arc::new(HttpRecordStore::new(url, timeout).map_err(startup_error)?)
        }
        None => {
            info!("Using embedded record store in {}", config.data_dir.display());
            Arc::new(db.clone())
        }
    };
    let records = web::Data::from(records);

    let sessions = SessionStore::open(&db, chrono::Duration::seconds(config.session_ttl_secs))
        .map_err(startup_error)?;
    let purged = sessions.purge_expired().map_err(startup_error)?;
    info!("Purged {} expired sessions", purged);
    let sessions = web::Data::new(sessions);

    let catalog = web::Data::new(
        CatalogClient::new(
            &config.catalog_api_url,
            &config.catalog_api_key,
            &config.catalog_language,
            timeout,
        )
        .map_err(startup_error)?,
    );
    let settings = web::Data::new(Settings {
        bcrypt_cost: config.bcrypt_cost,
    });
    let key = session_key(&config).map_err(startup_error)?;

    info!("Listening on {}", config.bind_addr);
    HttpServer::new(move || {
        App::new()
            .wrap(IdentityMiddleware::default())
            .wrap(routes::session_middleware(key.clone()))
            .wrap(Logger::default())
            .app_data(records.clone())
            .app_data(sessions.clone())
            .app_data(catalog.clone())
            .app_data(settings.clone())
            .configure(routes::configure)
    })
    .bind(&config.bind_addr)?
    .run()
    .await
}
