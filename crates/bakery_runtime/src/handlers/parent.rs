use bakery_core::batching::compute_batch_plan;
use bakery_core::contract::{
    normalize_request, request_fingerprint, stable_contract_json, BatchPayload, DispatchRecord,
    ParentAcceptedResponse, RecipeRequest, RunContext, ORCHESTRATION_SCHEMA_VERSION,
};
use bakery_core::storage_keys::run_context_object_key;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::adapters::dispatch::{queue_ids, BatchDispatcher};
use crate::adapters::object_store::OutcomeStore;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiGatewayResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub headers: Value,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentHandlerConfig {
    pub dispatch_target: Option<String>,
    pub prefix: String,
    pub run_date: String,
}

pub fn build_run_context(run_id: impl Into<String>, request_fingerprint: String) -> RunContext {
    RunContext {
        run_id: run_id.into(),
        schema_version: ORCHESTRATION_SCHEMA_VERSION.to_string(),
        request_fingerprint,
    }
}

/// Validate a recipe request, record its run context, and enqueue one
/// payload per batch in plan order.
pub fn handle_parent_event(
    event: Value,
    config: &ParentHandlerConfig,
    dispatcher: &dyn BatchDispatcher,
    outcome_store: &dyn OutcomeStore,
) -> ApiGatewayResponse {
    let payload = match normalize_apigw_event(event) {
        Ok(value) => value,
        Err(message) => return validation_error_response(&message),
    };

    let request = match serde_json::from_value::<RecipeRequest>(payload) {
        Ok(value) => value,
        Err(error) => return validation_error_response(&format!("Malformed request: {error}")),
    };

    let normalized = match normalize_request(request) {
        Ok(value) => value,
        Err(error) => return validation_error_response(error.message()),
    };

    let dispatch_target = match config.dispatch_target.as_deref() {
        Some(value) if !value.trim().is_empty() => value,
        _ => {
            return error_response(
                500,
                json!({
                    "error": "misconfiguration",
                    "message": "BATCH_QUEUE_URL must be configured",
                }),
            );
        }
    };

    let run_context =
        build_run_context(normalized.run_id.clone(), request_fingerprint(&normalized));
    let batch_plan = match compute_batch_plan(&normalized) {
        Ok(value) => value,
        Err(error) => return validation_error_response(error.message()),
    };

    let context_key = run_context_object_key(
        &config.prefix,
        &config.run_date,
        &normalized.run_id,
        "accepted",
    );
    if let Err(error) =
        outcome_store.write_object(&context_key, stable_contract_json(&run_context).as_bytes())
    {
        return error_response(
            502,
            json!({
                "error": "run_context_write_failed",
                "message": error,
                "run_context": run_context,
            }),
        );
    }

    let batch_count = batch_plan.len();
    let mut dispatches = Vec::with_capacity(batch_count);
    for assignment in batch_plan {
        let batch_payload = BatchPayload {
            run_id: normalized.run_id.clone(),
            run_date: Some(config.run_date.clone()),
            batch_id: assignment.batch_id,
            batch_count,
            start_index: assignment.start_index,
            end_index_exclusive: assignment.end_index_exclusive,
            sources: normalized.sources[assignment.start_index..assignment.end_index_exclusive]
                .to_vec(),
            target: normalized.target.clone(),
            append_dim: normalized.append_dim.clone(),
            concat_dim: normalized.concat_dim.clone(),
        };

        let bytes = match serde_json::to_vec(&batch_payload) {
            Ok(value) => value,
            Err(error) => {
                return error_response(
                    500,
                    json!({
                        "error": "serialization_error",
                        "message": error.to_string(),
                    }),
                );
            }
        };

        let (group_id, deduplication_id) = queue_ids(&batch_payload);
        if let Err(error) = dispatcher.dispatch_batch(&group_id, &deduplication_id, &bytes) {
            // Batches already enqueued still run; the store keeps their prefix.
            warn!(
                component = "parent_handler",
                event = "dispatch_failed",
                run_id = %normalized.run_id,
                batch_id = batch_payload.batch_id,
                batches_enqueued = dispatches.len(),
                error = %error,
                "batch dispatch failed"
            );
            return error_response(
                502,
                json!({
                    "error": "dispatch_failed",
                    "message": error,
                    "dispatch_target": dispatch_target,
                    "batches_enqueued": dispatches.len(),
                    "run_context": run_context,
                }),
            );
        }

        dispatches.push(DispatchRecord {
            batch_id: batch_payload.batch_id,
            status_code: 202,
        });
    }

    info!(
        component = "parent_handler",
        event = "dispatch_submitted",
        run_id = %normalized.run_id,
        store = %normalized.target,
        batches_dispatched = dispatches.len(),
        "recipe dispatched"
    );

    let response = ParentAcceptedResponse {
        run_id: normalized.run_id,
        target: normalized.target,
        total_sources: normalized.sources.len(),
        batches_dispatched: dispatches.len(),
        dispatches,
        status: "dispatch_submitted".to_string(),
        schema_version: ORCHESTRATION_SCHEMA_VERSION.to_string(),
    };
    success_response(202, response)
}

fn normalize_apigw_event(event: Value) -> Result<Value, String> {
    let Some(object) = event.as_object() else {
        return Err("Request payload must be a JSON object".to_string());
    };

    let Some(body) = object.get("body") else {
        return Ok(event);
    };

    match body {
        Value::Null => Ok(json!({})),
        Value::Object(_) => Ok(body.clone()),
        Value::String(text) => {
            serde_json::from_str(text).map_err(|error| format!("Malformed JSON body: {error}"))
        }
        _ => Err("Request body must be a JSON object".to_string()),
    }
}

fn validation_error_response(message: &str) -> ApiGatewayResponse {
    error_response(
        400,
        json!({
            "error": "validation_error",
            "message": message,
        }),
    )
}

fn success_response(status_code: u16, payload: impl Serialize) -> ApiGatewayResponse {
    match serde_json::to_string(&payload) {
        Ok(body) => ApiGatewayResponse {
            status_code,
            headers: json!({"Content-Type": "application/json"}),
            body,
        },
        Err(error) => error_response(
            500,
            json!({
                "error": "serialization_error",
                "message": error.to_string(),
            }),
        ),
    }
}

fn error_response(status_code: u16, payload: Value) -> ApiGatewayResponse {
    ApiGatewayResponse {
        status_code,
        headers: json!({"Content-Type": "application/json"}),
        body: payload.to_string(),
    }
}
