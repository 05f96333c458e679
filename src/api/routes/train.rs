use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;

use crate::api::error::{error_response, ApiError};
use crate::api::state::AppState;
use crate::application::TrainingStatus;

#[derive(Debug, Deserialize)]
pub struct TrainRequest {
    #[serde(default)]
    pub text: String,
    pub user_id: Option<String>,
}

pub async fn train_handler(
    State(state): State<AppState>,
    payload: Result<Json<TrainRequest>, JsonRejection>,
) -> Response {
    let Ok(Json(request)) = payload else {
        return error_response(StatusCode::BAD_REQUEST, "No training text provided.");
    };

    match state
        .training
        .submit(&request.text, request.user_id.as_deref())
    {
        Ok(status) => Json(status).into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}

pub async fn training_status(State(state): State<AppState>) -> Json<TrainingStatus> {
    Json(state.training.status())
}
