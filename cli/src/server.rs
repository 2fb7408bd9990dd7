// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Orchestrator-facing HTTP surface
//!
//! The external controller loop drives the engine through a minimal JSON
//! capability pair:
//!
//! - `POST /v1/volumes`: provision; returns the published volume descriptor
//! - `DELETE /v1/volumes`: delete, given a previously published descriptor
//! - `GET /healthz`: liveness
//!
//! Request-fault errors (ownership mismatches, malformed parameters, path
//! mismatches) map to 422; environmental IO failures map to 500. Nothing is
//! retried here; retry policy belongs to the orchestrator.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use efs_provisioner_core::application::Provisioner;
use efs_provisioner_core::domain::{ProvisionError, ProvisionedVolume, VolumeRequest};
use std::sync::Arc;
use tracing::warn;

type Engine = Arc<dyn Provisioner>;

pub fn router(engine: Engine) -> Router {
    Router::new()
        .route("/v1/volumes", post(provision_volume).delete(delete_volume))
        .route("/healthz", get(healthz))
        .with_state(engine)
}

async fn provision_volume(
    State(engine): State<Engine>,
    Json(request): Json<VolumeRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let volume = engine.provision(request).await?;
    Ok((StatusCode::CREATED, Json(describe(&volume)?)))
}

/// The descriptor plus the GID annotation pair when group isolation is in
/// effect. Deletion accepts the result as-is; unknown fields are ignored on
/// the way back in.
fn describe(volume: &ProvisionedVolume) -> Result<serde_json::Value, ApiError> {
    let mut body = serde_json::to_value(volume).map_err(|e| {
        ApiError(ProvisionError::Metadata {
            path: volume.path.clone(),
            reason: format!("failed to serialize volume descriptor: {e}"),
        })
    })?;
    if let Some((key, value)) = volume.gid_annotation() {
        body["annotations"] = serde_json::json!({ key: value });
    }
    Ok(body)
}

async fn delete_volume(
    State(engine): State<Engine>,
    Json(volume): Json<ProvisionedVolume>,
) -> Result<StatusCode, ApiError> {
    engine.delete(volume).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn healthz() -> &'static str {
    "ok"
}

struct ApiError(ProvisionError);

impl From<ProvisionError> for ApiError {
    fn from(err: ProvisionError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = if self.0.is_request_fault() {
            StatusCode::UNPROCESSABLE_ENTITY
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        warn!("request failed: {}", self.0);
        (
            status,
            Json(serde_json::json!({ "error": self.0.to_string() })),
        )
            .into_response()
    }
}
