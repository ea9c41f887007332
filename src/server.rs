use std::net::IpAddr;
use std::sync::Arc;

use rocket::data::{ByteUnit, Limits};
use rocket::http::{ContentType, Status};
use rocket::{catch, catchers, post, routes, Build, Rocket, State};
use serde_json::Value;
use tracing::{debug, warn};

use crate::address::RawAddressRecord;
use crate::config::AppConfig;
use crate::errors::{AppError, AppResult, ValidationError};
use crate::pipeline::ValidationOrchestrator;

pub const VALIDATE_PATH: &str = "/validateAddress";
const NOT_FOUND_BODY: &str = "Route not found";
const TOO_LARGE_BODY: &str = "Request body too large";

/// Status plus a JSON or plain-text body.
pub type Reply = (Status, (ContentType, String));

/// Builds the web service: `POST /validateAddress` plus plain-text catchers.
///
/// Request bodies are capped at `max_body_bytes`; larger bodies get a 413.
pub fn rocket_instance(
    orchestrator: Arc<ValidationOrchestrator>,
    config: &AppConfig,
) -> AppResult<Rocket<Build>> {
    let address: IpAddr = config.bind_address.parse().map_err(|err| {
        AppError::Config(format!("invalid bind address {}: {err}", config.bind_address))
    })?;
    let limits = Limits::default().limit("bytes", ByteUnit::from(config.max_body_bytes as u64));

    let figment = rocket::Config::figment()
        .merge(("address", address))
        .merge(("port", config.port))
        .merge(("limits", limits))
        .merge(("log_level", "critical"));

    Ok(rocket::custom(figment)
        .manage(orchestrator)
        .mount("/", routes![validate_address])
        .register("/", catchers![not_found, payload_too_large]))
}

#[post("/validateAddress", data = "<body>")]
async fn validate_address(
    orchestrator: &State<Arc<ValidationOrchestrator>>,
    body: Vec<u8>,
) -> Reply {
    debug!(target: "http", bytes = body.len(), "validation request received");
    validate_body(orchestrator.inner(), &body).await
}

#[catch(404)]
fn not_found() -> &'static str {
    NOT_FOUND_BODY
}

#[catch(413)]
fn payload_too_large() -> &'static str {
    TOO_LARGE_BODY
}

/// Runs one request body through the pipeline. Every failure is a 400 with
/// the error's message as plain text.
pub async fn validate_body(orchestrator: &ValidationOrchestrator, body: &[u8]) -> Reply {
    let outcome = match parse_batch(body) {
        Ok(batch) => orchestrator.validate(&batch).await.map_err(AppError::from),
        Err(err) => Err(err),
    };

    match outcome.and_then(|results| Ok(serde_json::to_string(&results)?)) {
        Ok(json) => (Status::Ok, (ContentType::JSON, json)),
        Err(err) => {
            if err.is_client_error() {
                debug!(target: "http", error = %err, "validation request rejected");
            } else {
                warn!(target: "http", error = %err, "validation request failed");
            }
            (Status::BadRequest, (ContentType::Plain, err.to_string()))
        }
    }
}

/// Parses a request body into a batch. Absent or empty input is an empty batch.
pub fn parse_batch(body: &[u8]) -> AppResult<Vec<RawAddressRecord>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ValidationError::EmptyBatch.into());
    }

    let value: Value = serde_json::from_slice(body)?;
    match value {
        Value::Null => Err(ValidationError::EmptyBatch.into()),
        Value::Array(items) if items.is_empty() => Err(ValidationError::EmptyBatch.into()),
        Value::Object(map) if map.is_empty() => Err(ValidationError::EmptyBatch.into()),
        Value::Array(items) => Ok(items.into_iter().map(RawAddressRecord::from_value).collect()),
        _ => Err(AppError::BadRequest(
            "Request body must be a JSON array of addresses".into(),
        )),
    }
}
