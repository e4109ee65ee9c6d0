use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::Value;
use tracing::info;
use crate::entities::{InsertResult, Tag};
use crate::http::{ApiContext, ApiError, ApiJson, Result, SharedStore};
use crate::http::controllers::not_found;

pub fn router() -> Router<ApiContext> {
    Router::new()
        .route("/tags", get(get_all_tags).post(create_tag).fallback(not_found))
}

#[derive(serde::Deserialize, Debug, Default)]
struct CreateTag {
    name: Option<Value>,
}

impl CreateTag {
    fn name(self) -> Result<String> {
        // truthy scalars are cast to their string form
        match self.name {
            Some(Value::String(name)) if !name.is_empty() => Ok(name),
            Some(Value::Number(n)) if n.as_f64().is_some_and(|x| x != 0.0 && !x.is_nan()) => Ok(n.to_string()),
            Some(Value::Bool(true)) => Ok("true".to_string()),
            _ => Err(ApiError::bad_request("name is required")),
        }
    }
}

async fn get_all_tags(
    State(store): State<SharedStore>,
) -> Result<Json<Vec<Tag>>> {
    let tags = store.read().await.all_tags();
    Ok(Json(tags))
}

async fn create_tag(
    State(store): State<SharedStore>,
    ApiJson(req): ApiJson<CreateTag>,
) -> Result<(StatusCode, Json<Tag>)> {
    let name = req.name()?;
    let mut store = store.write().await;
    match store.insert_tag(&name).await? {
        InsertResult::New(tag) => {
            info!("Created tag {} ({})", tag.name, tag.id);
            Ok((StatusCode::CREATED, Json(tag)))
        }
        InsertResult::Existing(_) => Err(ApiError::conflict("Tag already exists")),
    }
}
