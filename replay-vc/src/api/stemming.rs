//! Separation model catalog endpoint

use axum::{routing::get, Json, Router};

use crate::capabilities::{catalog, StemModel};
use crate::AppState;

/// GET /stemming_models
pub async fn list_stemming_models() -> Json<&'static [StemModel]> {
    Json(catalog())
}

pub fn stemming_routes() -> Router<AppState> {
    Router::new().route("/stemming_models", get(list_stemming_models))
}
