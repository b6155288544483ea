use actix_cors::Cors;
use actix_web::error::InternalError;
use actix_web::{HttpResponse, http::header, web};
use log::{error, info, warn};
use shared::{ClassifyRequest, ClassifyResponse, ErrorResponse};
use uuid::Uuid;

use crate::class_index::ClassIndexStore;
use crate::error::GatewayError;
use crate::fetcher::ImageSource;
use crate::serving::Predictor;

const GREETING: &str = "Welcome to the Homepage!";

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config())
        .service(web::resource("/").route(web::get().to(home)))
        .service(web::resource("/classify").route(web::post().to(classify)));
}

/// Any origin, fixed method and header allow-lists.
pub fn cors_policy() -> Cors {
    Cors::default()
        .allow_any_origin()
        .send_wildcard()
        .allowed_methods(vec!["GET", "POST", "PUT", "DELETE"])
        .allowed_headers(vec![
            header::HeaderName::from_static("x-requested-with"),
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
        ])
        .max_age(3600)
}

/// Body decoding errors render as `{"error": ...}` with 400.
fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .content_type_required(false)
        .error_handler(|err, _req| {
            warn!("Rejected classify body: {}", err);
            let response = HttpResponse::BadRequest()
                .json(ErrorResponse::new(format!("Invalid request body: {}", err)));
            InternalError::from_response(err, response).into()
        })
}

async fn home() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .body(GREETING)
}

async fn classify(
    body: web::Json<ClassifyRequest>,
    images: web::Data<dyn ImageSource>,
    predictor: web::Data<dyn Predictor>,
    classes: web::Data<ClassIndexStore>,
) -> Result<HttpResponse, GatewayError> {
    let request_id = Uuid::new_v4();
    let url = body.into_inner().url;

    match run_classification(&url, &**images, &**predictor, &classes).await {
        Ok(label) => {
            info!("[{}] Classified image as {}", request_id, label);
            Ok(HttpResponse::Created().json(ClassifyResponse { label }))
        }
        Err(e) => {
            if actix_web::ResponseError::status_code(&e).is_server_error() {
                error!("[{}] Classification of {:?} failed: {:?}", request_id, url, e);
            } else {
                warn!("[{}] Classification of {:?} rejected: {}", request_id, url, e);
            }
            Err(e)
        }
    }
}

/// fetch -> predict -> look up label.
async fn run_classification(
    url: &str,
    images: &dyn ImageSource,
    predictor: &dyn Predictor,
    classes: &ClassIndexStore,
) -> Result<String, GatewayError> {
    if url.trim().is_empty() {
        return Err(GatewayError::BadRequest("Missing image URL".to_string()));
    }

    let image_data = images.fetch(url).await?;
    let predicted = predictor.predict_class(image_data).await?;
    let index = classes.for_request()?;
    let label = index.label_for_prediction(predicted)?;
    log::debug!("Predicted class {} -> {} ({})", predicted, label.name(), label.wnid());
    Ok(label.name().to_string())
}
