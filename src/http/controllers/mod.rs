use axum::Router;
use crate::http::{ApiContext, ApiError};

pub mod posts;
pub mod tags;

pub fn router() -> Router<ApiContext> {
    posts::router()
        .merge(tags::router())
}

pub async fn not_found() -> ApiError {
    ApiError::NotFound
}
