//! Runtime configuration endpoints.

use crate::error::AppError;
use crate::state::AppState;
use actix_web::{web, HttpResponse};

/// `GET /api/config` - the active configuration.
pub async fn get_config(app_state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    Ok(HttpResponse::Ok().json(app_state.get_config()))
}

/// `PUT /api/config` - apply a partial configuration update.
///
/// The update is validated before it takes effect; an invalid document
/// leaves the running configuration unchanged.
pub async fn update_config(
    app_state: web::Data<AppState>,
    body: String,
) -> Result<HttpResponse, AppError> {
    let mut config = app_state.get_config();
    config
        .update_from_json(&body)
        .map_err(|e| AppError::ValidationError(e.to_string()))?;

    app_state.update_config(config.clone());
    tracing::info!("Configuration updated at runtime");

    Ok(HttpResponse::Ok().json(config))
}
