use crate::models::chat::{ ChatFlags, ChatResponse, ErrorResponse, SummaryResponse };
use crate::ratelimit::client_key;
use crate::relay::{ ChatRelay, RelayError, RelayMode, RelayOutcome };
use crate::server::stream::event_stream_response;
use crate::trial::economics::{ transform_dataset, TrialRow };
use crate::trial::model::optimize;
use crate::trial::score::assess;
use crate::trial::TrialInputs;

use std::num::NonZeroU32;
use std::sync::Arc;
use axum::{
    body::Bytes,
    extract::{ Query, Request, State },
    extract::rejection::JsonRejection,
    http::{ HeaderMap, StatusCode },
    middleware::{ self, Next },
    response::{ IntoResponse, Response },
    routing::{ get, post },
    Json,
    Router,
};
use chrono::{ DateTime, Utc };
use governor::{ DefaultDirectRateLimiter, Quota, RateLimiter };
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::cors::{ Any, CorsLayer };
use log::{ info, warn, error };
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<ChatRelay>,
    guard: Arc<DefaultDirectRateLimiter>,
    started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(relay: Arc<ChatRelay>, requests_per_second: u32) -> Self {
        let rate = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        Self {
            relay,
            guard: Arc::new(RateLimiter::direct(Quota::per_second(rate))),
            started_at: Utc::now(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    rate_limit_backend: &'static str,
    model: Option<String>,
    started_at: DateTime<Utc>,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ErrorResponse { error: message.into() })).into_response()
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = match &self {
            RelayError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            RelayError::MissingCredential => StatusCode::INTERNAL_SERVER_ERROR,
            RelayError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            RelayError::InvalidPayload => StatusCode::BAD_REQUEST,
            RelayError::Provider(_) | RelayError::RateStore(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        error_response(status, self.public_message())
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/chat", post(chat_handler).fallback(method_not_allowed))
        .route("/api/trial/evaluate", post(evaluate_handler))
        .route("/api/trial/optimize", post(optimize_handler))
        .route("/api/economics/transform", post(economics_handler))
        .route("/healthz", get(health_handler))
        .layer(
            ServiceBuilder::new()
                .layer(cors)
                .layer(middleware::from_fn_with_state(state.clone(), global_guard))
        )
        .with_state(state)
}

async fn global_guard(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if state.guard.check().is_err() {
        warn!("Global request rate exceeded; rejecting {} {}", request.method(), request.uri().path());
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "Server busy.");
    }
    next.run(request).await
}

async fn method_not_allowed() -> Response {
    RelayError::MethodNotAllowed.into_response()
}

async fn chat_handler(
    State(state): State<AppState>,
    Query(flags): Query<ChatFlags>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request_id = Uuid::new_v4();
    let client = client_key(&headers);
    let mode = RelayMode::from_flags(flags.stream(), flags.summary());
    info!("[{}] chat request from {} ({:?})", request_id, client, mode);

    match state.relay.handle(&client, &body, mode).await {
        Ok(RelayOutcome::Text(text)) => Json(ChatResponse { text }).into_response(),
        Ok(RelayOutcome::Summary(summary)) => Json(SummaryResponse { summary }).into_response(),
        Ok(RelayOutcome::Stream(stream)) => event_stream_response(stream, request_id),
        Err(e) => {
            if e.is_internal() {
                error!("[{}] /api/chat error: {}", request_id, e);
            } else {
                info!("[{}] /api/chat rejected: {}", request_id, e);
            }
            e.into_response()
        }
    }
}

async fn evaluate_handler(payload: Result<Json<TrialInputs>, JsonRejection>) -> Response {
    match payload {
        Ok(Json(inputs)) => Json(assess(&inputs)).into_response(),
        Err(rejection) => error_response(StatusCode::BAD_REQUEST, rejection.body_text()),
    }
}

async fn optimize_handler(payload: Result<Json<TrialInputs>, JsonRejection>) -> Response {
    match payload {
        Ok(Json(inputs)) => Json(optimize(&inputs)).into_response(),
        Err(rejection) => error_response(StatusCode::BAD_REQUEST, rejection.body_text()),
    }
}

async fn economics_handler(payload: Result<Json<Vec<TrialRow>>, JsonRejection>) -> Response {
    match payload {
        Ok(Json(rows)) => Json(transform_dataset(&rows)).into_response(),
        Err(rejection) => error_response(StatusCode::BAD_REQUEST, rejection.body_text()),
    }
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        rate_limit_backend: state.relay.limiter_backend(),
        model: state.relay.model(),
        started_at: state.started_at,
    })
}
