use crate::error::Result;
use crate::state::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use stubby_core::{ShortId, UserId};

pub async fn list_user_urls_handler(
    State(state): State<AppState>,
    Extension(user_id): Extension<UserId>,
) -> Result<Response> {
    let urls = state.shortener().get_user_links(Some(&user_id)).await?;

    if urls.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }
    Ok(Json(urls).into_response())
}

/// Accepts a JSON array of short ids. Deletion happens later, in the
/// background.
pub async fn delete_user_urls_handler(
    State(state): State<AppState>,
    Extension(user_id): Extension<UserId>,
    Json(short_ids): Json<Vec<String>>,
) -> Result<StatusCode> {
    let short_ids = short_ids
        .into_iter()
        .map(ShortId::new)
        .collect::<std::result::Result<Vec<_>, _>>()?;

    state.shortener().delete_urls(user_id, short_ids);
    Ok(StatusCode::ACCEPTED)
}
