use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{validation, AppError, AppResult, OptionExt, RpcErrorBody};
use crate::state::AppState;
use crate::types::{CatalogQuery, ProjectPatch, ScanConfig};

/// One request over the opaque transport: a method name plus JSON params.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcRequest {
    #[serde(default)]
    pub request_id: Option<String>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// Tagged success/error envelope returned for every request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl RpcResponse {
    pub fn ok(request_id: Option<String>, data: Value) -> Self {
        Self { success: true, data: Some(data), error: None, request_id }
    }

    pub fn err(request_id: Option<String>, error: &AppError) -> Self {
        Self { success: false, data: None, error: Some(error.to_rpc_body()), request_id }
    }
}

/// Entry point for transport hosts: dispatches one request and renders the
/// envelope. Validation failures come back as `INVALID_INPUT`, unknown
/// failures as `INTERNAL_ERROR` — this function never panics on bad input.
pub async fn handle(state: &AppState, request: RpcRequest) -> RpcResponse {
    let RpcRequest { request_id, method, params } = request;
    match dispatch(state, &method, params).await {
        Ok(data) => RpcResponse::ok(request_id, data),
        Err(e) => RpcResponse::err(request_id, &e),
    }
}

pub async fn dispatch(state: &AppState, method: &str, params: Value) -> AppResult<Value> {
    match method {
        "projects.getAll" => {
            let query: CatalogQuery = parse_params(params)?;
            let page = state.index.get_all(&query).await;
            Ok(serde_json::to_value(page)?)
        }
        "projects.search" => {
            let query = require_str(&params, "query")?;
            let limit = params.get("limit").and_then(Value::as_u64).unwrap_or(50) as usize;
            let hits = state.index.search(&query, limit).await;
            Ok(serde_json::to_value(hits)?)
        }
        "projects.get" => {
            let id = require_str(&params, "id")?;
            let project = state.store.get(&id).await.ok_or_not_found("project")?;
            Ok(serde_json::to_value(project)?)
        }
        "projects.update" => {
            let id = require_str(&params, "id")?;
            let patch: ProjectPatch = parse_params(params.get("fields").cloned().unwrap_or_default())?;
            if let Some(importance) = patch.importance {
                validation::validate_importance(importance)?;
            }
            let updated = state.store.update_fields(&id, patch).await?;
            // Index nach jeder Mutation neu aufbauen
            state.index.build_index(state.store.all().await).await;
            Ok(serde_json::to_value(updated)?)
        }
        "projects.delete" => {
            let id = require_str(&params, "id")?;
            let deleted = state.store.delete(&id).await;
            if deleted {
                state.index.build_index(state.store.all().await).await;
            }
            Ok(json!({ "deleted": deleted }))
        }
        "scan.start" => {
            let config: ScanConfig = parse_params(params)?;
            let job_id = state.jobs.start_scan(config).await?;
            Ok(json!({ "jobId": job_id }))
        }
        "scan.status" => {
            let id = require_uuid(&params, "jobId")?;
            match state.jobs.job_status(id).await {
                Some(job) => Ok(serde_json::to_value(job)?),
                None => Ok(Value::Null),
            }
        }
        "scan.cancel" => {
            let id = require_uuid(&params, "jobId")?;
            let cancelled = state.jobs.cancel(id).await;
            Ok(json!({ "cancelled": cancelled }))
        }
        "settings.get" => state.settings.get().await,
        "settings.update" => {
            let settings = params
                .get("settings")
                .cloned()
                .ok_or_else(|| AppError::InvalidInput("missing parameter: settings".into()))?;
            state.settings.update(settings.clone()).await?;
            Ok(settings)
        }
        "git.available" => {
            let available = state.git.is_available().await;
            Ok(json!({ "available": available }))
        }
        "git.checkoutBranch" => {
            let path = require_str(&params, "path")?;
            validation::validate_path(&path)?;
            let branch = require_str(&params, "branch")?;
            state.git.checkout_branch(std::path::Path::new(&path), &branch).await?;
            Ok(json!({ "path": path, "branch": branch }))
        }
        "metrics.get" => Ok(serde_json::to_value(state.metrics.get_snapshot())?),
        other => Err(AppError::NotFound(format!("unknown method: {}", other))),
    }
}

fn parse_params<T: serde::de::DeserializeOwned + Default>(params: Value) -> AppResult<T> {
    if params.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(params)
        .map_err(|e| AppError::InvalidInput(format!("invalid parameters: {}", e)))
}

fn require_str(params: &Value, key: &str) -> AppResult<String> {
    params
        .get(key)
        .and_then(Value::as_str)
        .map(|s| s.to_string())
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| AppError::InvalidInput(format!("missing parameter: {}", key)))
}

fn require_uuid(params: &Value, key: &str) -> AppResult<Uuid> {
    let raw = require_str(params, key)?;
    Uuid::parse_str(&raw)
        .map_err(|_| AppError::InvalidInput(format!("invalid uuid in parameter: {}", key)))
}
