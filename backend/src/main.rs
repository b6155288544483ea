mod class_index;
mod config;
mod error;
mod fetcher;
mod routes;
mod serving;

use actix_web::middleware::Logger;
use actix_web::{App, HttpServer, web};
use class_index::ClassIndexStore;
use config::GatewayConfig;
use fetcher::{HttpImageFetcher, ImageSource};
use routes::{configure_routes, cors_policy};
use serving::{Predictor, TfServingPredictor};
use std::io;
use std::sync::Arc;

#[actix_web::main]
async fn main() -> io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = GatewayConfig::from_env().map_err(|e| {
        log::error!("Invalid configuration: {}", e);
        io::Error::new(io::ErrorKind::InvalidInput, e)
    })?;

    let class_index = ClassIndexStore::load(
        config.class_index.path.clone(),
        config.class_index.reload_per_request,
    )
    .map_err(|e| {
        log::error!("Failed to load class index at startup: {}", e);
        io::Error::new(io::ErrorKind::Other, e)
    })?;
    if config.class_index.reload_per_request {
        log::info!("Class index will be re-read on every request");
    }

    let fetcher = HttpImageFetcher::new(&config.fetch).map_err(|e| {
        log::error!("Failed to build HTTP client: {}", e);
        io::Error::new(io::ErrorKind::Other, e)
    })?;
    if config.fetch.allowed_hosts.is_empty() {
        log::warn!("ALLOWED_IMAGE_HOSTS is empty; images will be fetched from any host");
    }

    let predictor = TfServingPredictor::new(&config.inference).map_err(|e| {
        log::error!("Invalid inference endpoint: {}", e);
        io::Error::new(io::ErrorKind::InvalidInput, e)
    })?;
    log::info!(
        "Inference server: {} (model '{}', signature '{}')",
        predictor.endpoint_uri(),
        config.inference.model_name,
        config.inference.signature_name
    );

    #[cfg(unix)]
    spawn_reload_on_hangup(class_index.clone());

    let images: Arc<dyn ImageSource> = Arc::new(fetcher);
    let predictor: Arc<dyn Predictor> = Arc::new(predictor);
    let images = web::Data::from(images);
    let predictor = web::Data::from(predictor);
    let class_index = web::Data::new(class_index);

    let bind_address = config.server.bind_address();
    log::info!("Starting server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(cors_policy())
            .wrap(Logger::default())
            .app_data(images.clone())
            .app_data(predictor.clone())
            .app_data(class_index.clone())
            .configure(configure_routes)
    })
    .bind(&bind_address)?
    .run()
    .await
}

/// `kill -HUP` re-reads the class index without a restart.
#[cfg(unix)]
fn spawn_reload_on_hangup(store: ClassIndexStore) {
    use tokio::signal::unix::{SignalKind, signal};

    actix_web::rt::spawn(async move {
        let mut hangups = match signal(SignalKind::hangup()) {
            Ok(stream) => stream,
            Err(e) => {
                log::warn!("SIGHUP reload disabled: {}", e);
                return;
            }
        };
        while hangups.recv().await.is_some() {
            match store.reload() {
                Ok(count) => log::info!(
                    "Reloaded {} classes from {}",
                    count,
                    store.path().display()
                ),
                Err(e) => log::error!("Class index reload failed, keeping previous table: {}", e),
            }
        }
    });
}
