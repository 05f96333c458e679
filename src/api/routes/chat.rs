use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::api::error::{error_response, ApiError};
use crate::api::state::AppState;
use crate::application::PLACEHOLDER_RESPONSE;
use crate::domain::GenerationParams;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub prompt: String,
    pub user_id: Option<String>,
    pub max_new_tokens: Option<usize>,
    pub temperature: Option<f32>,
    pub top_k: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub text: String,
}

pub async fn chat_handler(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    // Without a model every request gets the placeholder, whatever its body.
    if !state.chat_service.model_loaded() {
        return Json(ChatResponse {
            text: PLACEHOLDER_RESPONSE.to_string(),
        })
        .into_response();
    }

    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            tracing::warn!(error = %rejection.body_text(), "rejected chat request body");
            return error_response(StatusCode::BAD_REQUEST, "Invalid request body");
        }
    };

    let params =
        GenerationParams::from_options(request.max_new_tokens, request.temperature, request.top_k);

    match state
        .chat_service
        .respond(&request.prompt, request.user_id.as_deref(), params)
        .await
    {
        Ok(text) => Json(ChatResponse { text }).into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}
