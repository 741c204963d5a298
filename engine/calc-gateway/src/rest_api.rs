//! HTTP and WebSocket routes for the CalcGateway
//!
//! - `POST /calc[?float=true]`: evaluate an expression, reply with the result
//! - `GET /ws`: live history feed
//! - `GET /history`: current snapshot
//! - `GET /health`: liveness and counters

use crate::error::{CalcError, ErrorCategory};
use crate::gateway::CalcGateway;
use crate::websocket_handler::WebSocketHandler;

use calc_protocol::HistoryMessage;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tracing::{debug, warn};
use warp::http::StatusCode;
use warp::hyper::body::Bytes;
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

/// Query parameters of `POST /calc`
#[derive(Debug, Default, Deserialize)]
pub struct CalcParams {
    #[serde(default)]
    pub float: bool,
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

/// Health check response body
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub records: usize,
    pub subscribers: usize,
}

fn error_reply(status: StatusCode, message: impl Into<String>, category: Option<ErrorCategory>) -> Response {
    let body = ErrorResponse {
        error: message.into(),
        category: category.map(|c| c.as_str().to_string()),
    };
    warp::reply::with_status(warp::reply::json(&body), status).into_response()
}

/// Handle `POST /calc`
pub async fn submit_calculation(
    gateway: CalcGateway,
    params: CalcParams,
    content_type: Option<String>,
    body: Bytes,
) -> Result<Response, Infallible> {
    match gateway.submit_raw(&body, content_type.as_deref(), params.float).await {
        Ok(record) => {
            metrics::increment_counter!("calc_requests_total", "outcome" => "ok");
            Ok(warp::reply::json(&record.result).into_response())
        }
        Err(e) => {
            let category = e.category();
            metrics::increment_counter!("calc_requests_total", "outcome" => category.as_str());

            let status = match e {
                CalcError::Validation(_) => StatusCode::BAD_REQUEST,
                CalcError::Evaluation(_) | CalcError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            if let CalcError::Storage(_) = e {
                warn!("Calculation could not be stored: {}", e);
            } else {
                debug!("Calculation rejected ({}): {}", category.as_str(), e);
            }

            Ok(error_reply(status, e.to_string(), Some(category)))
        }
    }
}

/// Handle `GET /history`
pub async fn get_history(gateway: CalcGateway) -> Result<impl Reply, Infallible> {
    let snapshot = gateway.ledger().snapshot();
    Ok(warp::reply::json(&HistoryMessage::from_records(snapshot.records())))
}

/// Handle `GET /health`
pub async fn get_health(gateway: CalcGateway) -> Result<impl Reply, Infallible> {
    let response = HealthResponse {
        status: "healthy".to_string(),
        records: gateway.ledger().len(),
        subscribers: gateway.hub().subscriber_count(),
    };
    Ok(warp::reply::json(&response))
}

/// Turn rejections into JSON error responses
pub async fn handle_rejection(err: Rejection) -> Result<Response, Infallible> {
    if err.is_not_found() {
        return Ok(error_reply(StatusCode::NOT_FOUND, "not found", None));
    }

    if let Some(e) = err.find::<warp::reject::InvalidQuery>() {
        return Ok(error_reply(StatusCode::BAD_REQUEST, e.to_string(), Some(ErrorCategory::Validation)));
    }

    if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        return Ok(error_reply(StatusCode::METHOD_NOT_ALLOWED, "method not allowed", None));
    }

    if let Some(e) = err.find::<warp::reject::MissingHeader>() {
        return Ok(error_reply(StatusCode::BAD_REQUEST, e.to_string(), None));
    }

    if let Some(e) = err.find::<warp::reject::InvalidHeader>() {
        return Ok(error_reply(StatusCode::BAD_REQUEST, e.to_string(), None));
    }

    warn!("Unhandled rejection: {:?}", err);
    Ok(error_reply(StatusCode::INTERNAL_SERVER_ERROR, "internal error", None))
}

/// Create all routes served by the gateway
pub fn create_routes(
    gateway: CalcGateway,
) -> impl Filter<Extract = impl Reply, Error = Infallible> + Clone + Send + Sync + 'static {
    let heartbeat = gateway.config().server.heartbeat();
    let channel_capacity = gateway.config().hub.channel_capacity;
    let gateway_filter = warp::any().map(move || gateway.clone());

    // Calculation endpoint
    let calc = warp::path("calc")
        .and(warp::path::end())
        .and(warp::post())
        .and(gateway_filter.clone())
        .and(warp::query::<CalcParams>())
        .and(warp::header::optional::<String>("content-type"))
        .and(warp::body::bytes())
        .and_then(submit_calculation);

    // Live history feed
    let ws = warp::path("ws")
        .and(warp::path::end())
        .and(warp::ws())
        .and(gateway_filter.clone())
        .map(move |ws: warp::ws::Ws, gateway: CalcGateway| {
            let handler = WebSocketHandler::new(gateway.hub(), heartbeat, channel_capacity);
            ws.on_upgrade(move |socket| handler.handle(socket))
        });

    // History snapshot endpoint
    let history = warp::path("history")
        .and(warp::path::end())
        .and(warp::get())
        .and(gateway_filter.clone())
        .and_then(get_history);

    // Health check endpoint
    let health = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .and(gateway_filter)
        .and_then(get_health);

    calc.or(ws)
        .or(history)
        .or(health)
        .recover(handle_rejection)
        .with(warp::trace::request())
}
