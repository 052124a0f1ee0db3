use crate::error::Result;
use crate::model::{BatchShortenItem, BatchShortenResult, ShortenRequest, ShortenResponse};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::{Extension, Json};
use stubby_core::{ShortId, UserId};

fn created_or_conflict(conflict: bool) -> StatusCode {
    if conflict {
        StatusCode::CONFLICT
    } else {
        StatusCode::CREATED
    }
}

/// `POST /` with the URL as a plain-text body.
pub async fn shorten_text_handler(
    State(state): State<AppState>,
    Extension(user_id): Extension<UserId>,
    body: String,
) -> Result<Response> {
    let shortened = state
        .shortener()
        .make_shorter(body.trim(), Some(&user_id))
        .await?;

    Ok((created_or_conflict(shortened.conflict), shortened.short_url).into_response())
}

pub async fn shorten_json_handler(
    State(state): State<AppState>,
    Extension(user_id): Extension<UserId>,
    Json(request): Json<ShortenRequest>,
) -> Result<(StatusCode, Json<ShortenResponse>)> {
    let shortened = state
        .shortener()
        .make_shorter(request.url.trim(), Some(&user_id))
        .await?;

    Ok((
        created_or_conflict(shortened.conflict),
        Json(ShortenResponse {
            result: shortened.short_url,
        }),
    ))
}

pub async fn shorten_batch_handler(
    State(state): State<AppState>,
    Json(items): Json<Vec<BatchShortenItem>>,
) -> Result<(StatusCode, Json<Vec<BatchShortenResult>>)> {
    let original_urls: Vec<String> = items
        .iter()
        .map(|item| item.original_url.clone())
        .collect();
    let short_urls = state.shortener().make_shorter_batch(&original_urls).await?;

    let results = items
        .into_iter()
        .zip(short_urls)
        .map(|(item, short_url)| BatchShortenResult {
            correlation_id: item.correlation_id,
            short_url,
        })
        .collect();

    Ok((StatusCode::CREATED, Json(results)))
}

pub async fn redirect_handler(
    State(state): State<AppState>,
    Path(short_id): Path<String>,
) -> Result<Redirect> {
    let short_id = ShortId::new(short_id)?;
    let original_url = state.shortener().restore_long(&short_id).await?;

    Ok(Redirect::temporary(&original_url))
}
