use crate::state::AppState;
use axum::extract::State;
use axum::http::StatusCode;

pub async fn ping_handler(State(state): State<AppState>) -> StatusCode {
    if state.shortener().is_storage_available().await {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}
