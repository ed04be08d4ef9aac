use std::sync::Arc;

use bakery_array::Resolver;
use bakery_core::contract::BatchPayload;
use bakery_runtime::adapters::dispatch::SqsDispatcher;
use bakery_runtime::adapters::object_store::S3ObjectStore;
use bakery_runtime::config::RuntimeConfig;
use bakery_runtime::handlers::batch::{handle_batch_payload_with_resolver, BatchHandlerConfig};
use bakery_runtime::handlers::parent::{handle_parent_event, ApiGatewayResponse, ParentHandlerConfig};
use bakery_runtime::telemetry::init_tracing;
use chrono::Utc;
use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde_json::{json, Value};
use tracing::warn;

const S3_SCHEME: &str = "s3";

#[derive(Clone)]
struct RuntimeDependencies {
    config: RuntimeConfig,
    resolver: Resolver,
    sqs_client: aws_sdk_sqs::Client,
}

async fn handle_request(event: LambdaEvent<Value>) -> Result<Value, Error> {
    let config = RuntimeConfig::from_env().map_err(|error| Error::from(error.to_string()))?;
    let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let s3_store = S3ObjectStore::new(aws_sdk_s3::Client::new(&aws_config));
    let deps = RuntimeDependencies {
        config,
        resolver: Resolver::new().with_backend(S3_SCHEME, Arc::new(s3_store)),
        sqs_client: aws_sdk_sqs::Client::new(&aws_config),
    };

    if is_sqs_event(&event.payload) {
        let failed = handle_sqs_event(&event.payload, &deps)?;
        Ok(batch_item_failures(&failed))
    } else {
        let outcome_store = deps
            .resolver
            .mapper(&deps.config.outcomes_locator())
            .map_err(|error| Error::from(error.to_string()))?;
        let dispatcher = SqsDispatcher::new(deps.sqs_client.clone(), deps.config.queue_url.clone());
        let parent_config = ParentHandlerConfig {
            dispatch_target: Some(deps.config.queue_url.clone()),
            prefix: deps.config.outcomes_prefix.clone(),
            run_date: Utc::now().format("%Y-%m-%d").to_string(),
        };
        let response: ApiGatewayResponse =
            handle_parent_event(event.payload, &parent_config, &dispatcher, &outcome_store);
        serde_json::to_value(response)
            .map_err(|error| Error::from(format!("failed to serialize api response: {error}")))
    }
}

fn is_sqs_event(event: &Value) -> bool {
    event
        .get("Records")
        .and_then(Value::as_array)
        .map(|records| {
            !records.is_empty()
                && records.iter().all(|record| {
                    record
                        .get("eventSource")
                        .and_then(Value::as_str)
                        .map(|source| source == "aws:sqs")
                        .unwrap_or(false)
                })
        })
        .unwrap_or(false)
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SqsRecord {
    message_id: String,
    body: String,
}

/// Returns the message ids SQS must redeliver. Requires
/// `ReportBatchItemFailures` on the event source mapping.
fn handle_sqs_event(event: &Value, deps: &RuntimeDependencies) -> Result<Vec<String>, Error> {
    let records = decode_sqs_records(event)?;

    let now = Utc::now();
    let fallback_run_date = now.format("%Y-%m-%d").to_string();
    let event_time = now.to_rfc3339();

    let outcome_store = deps
        .resolver
        .mapper(&deps.config.outcomes_locator())
        .map_err(|error| Error::from(error.to_string()))?;

    Ok(process_sqs_records(&records, |payload| {
        let config = BatchHandlerConfig {
            prefix: deps.config.outcomes_prefix.clone(),
            run_date: resolve_run_date(payload, &fallback_run_date),
            event_time: event_time.clone(),
        };
        handle_batch_payload_with_resolver(payload, &config, &deps.resolver, &outcome_store)
            .map(|_| ())
            .map_err(|error| error.to_string())
    }))
}

/// Run records in order and stop at the first failure. The failing record
/// and every record after it are reported; records before it are
/// acknowledged so their batches are never appended twice.
fn process_sqs_records<F>(records: &[SqsRecord], mut run: F) -> Vec<String>
where
    F: FnMut(&BatchPayload) -> Result<(), String>,
{
    for (index, record) in records.iter().enumerate() {
        let outcome = serde_json::from_str::<BatchPayload>(&record.body)
            .map_err(|error| format!("invalid batch payload: {error}"))
            .and_then(|payload| run(&payload));
        if let Err(error) = outcome {
            warn!(
                component = "sqs_handler",
                event = "record_failed",
                message_id = %record.message_id,
                records_returned = records.len() - index,
                error = %error,
                "batch record failed"
            );
            return records[index..]
                .iter()
                .map(|record| record.message_id.clone())
                .collect();
        }
    }
    Vec::new()
}

fn batch_item_failures(message_ids: &[String]) -> Value {
    let failures: Vec<Value> = message_ids
        .iter()
        .map(|id| json!({ "itemIdentifier": id }))
        .collect();
    json!({ "batchItemFailures": failures })
}

fn resolve_run_date(payload: &BatchPayload, fallback_run_date: &str) -> String {
    payload
        .run_date
        .clone()
        .unwrap_or_else(|| fallback_run_date.to_string())
}

fn decode_sqs_records(event: &Value) -> Result<Vec<SqsRecord>, Error> {
    let records = event
        .get("Records")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::from("SQS event must include Records array"))?;

    records
        .iter()
        .map(|record| {
            let message_id = record
                .get("messageId")
                .and_then(Value::as_str)
                .ok_or_else(|| Error::from("SQS record messageId must be a string"))?;
            let body = record
                .get("body")
                .and_then(Value::as_str)
                .ok_or_else(|| Error::from("SQS record body must be a string"))?;
            Ok(SqsRecord {
                message_id: message_id.to_string(),
                body: body.to_string(),
            })
        })
        .collect()
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    init_tracing();
    lambda_runtime::run(service_fn(handle_request)).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_payload(run_date: Option<&str>) -> BatchPayload {
        BatchPayload {
            run_id: "run-123".to_string(),
            run_date: run_date.map(str::to_string),
            batch_id: 0,
            batch_count: 1,
            start_index: 0,
            end_index_exclusive: 1,
            sources: vec!["s3://bucket/cache/0.parquet".to_string()],
            target: "s3://bucket/air.zarr".to_string(),
            append_dim: "time".to_string(),
            concat_dim: "time".to_string(),
        }
    }

    #[test]
    fn detects_sqs_event_shape() {
        let event = json!({
            "Records": [
                {"eventSource": "aws:sqs", "body": "{}"}
            ]
        });
        assert!(is_sqs_event(&event));
    }

    #[test]
    fn rejects_non_sqs_records() {
        let event = json!({
            "Records": [
                {"eventSource": "aws:s3", "body": "{}"}
            ]
        });
        assert!(!is_sqs_event(&event));
        assert!(!is_sqs_event(&json!({"body": "{}"})));
    }

    fn record(message_id: &str, payload: &BatchPayload) -> Value {
        json!({
            "messageId": message_id,
            "eventSource": "aws:sqs",
            "body": serde_json::to_string(payload).expect("serialize"),
        })
    }

    fn payload_for(batch_id: usize) -> BatchPayload {
        let mut payload = sample_payload(None);
        payload.batch_id = batch_id;
        payload.batch_count = 3;
        payload
    }

    #[test]
    fn decodes_records_in_order() {
        let event = json!({
            "Records": [record("m-0", &payload_for(0)), record("m-1", &payload_for(1))]
        });

        let records = decode_sqs_records(&event).expect("records should decode");
        assert_eq!(
            records.iter().map(|r| r.message_id.as_str()).collect::<Vec<_>>(),
            vec!["m-0", "m-1"]
        );
    }

    #[test]
    fn rejects_record_without_body_string() {
        let event = json!({
            "Records": [
                {"messageId": "m-0", "eventSource": "aws:sqs", "body": 42}
            ]
        });

        let error = decode_sqs_records(&event).expect_err("non-string body should fail");
        assert!(error
            .to_string()
            .contains("SQS record body must be a string"));
    }

    #[test]
    fn rejects_record_without_message_id() {
        let event = json!({
            "Records": [{"eventSource": "aws:sqs", "body": "{}"}]
        });

        let error = decode_sqs_records(&event).expect_err("missing messageId should fail");
        assert!(error.to_string().contains("messageId"));
    }

    #[test]
    fn failure_reports_failing_record_and_everything_after_it() {
        let event = json!({
            "Records": [
                record("m-0", &payload_for(0)),
                record("m-1", &payload_for(1)),
                record("m-2", &payload_for(2)),
            ]
        });
        let records = decode_sqs_records(&event).expect("records should decode");

        let mut executed = Vec::new();
        let failed = process_sqs_records(&records, |payload| {
            executed.push(payload.batch_id);
            if payload.batch_id == 1 {
                Err("store rejected write".to_string())
            } else {
                Ok(())
            }
        });

        assert_eq!(executed, vec![0, 1]);
        assert_eq!(failed, vec!["m-1".to_string(), "m-2".to_string()]);
        assert_eq!(
            batch_item_failures(&failed),
            json!({"batchItemFailures": [
                {"itemIdentifier": "m-1"},
                {"itemIdentifier": "m-2"}
            ]})
        );
    }

    #[test]
    fn all_records_succeeding_reports_nothing() {
        let records = decode_sqs_records(&json!({
            "Records": [record("m-0", &payload_for(0)), record("m-1", &payload_for(1))]
        }))
        .expect("records should decode");

        let failed = process_sqs_records(&records, |_| Ok(()));
        assert!(failed.is_empty());
        assert_eq!(batch_item_failures(&failed), json!({"batchItemFailures": []}));
    }

    #[test]
    fn undecodable_body_is_reported_without_running_later_records() {
        let records = vec![
            SqsRecord {
                message_id: "m-0".to_string(),
                body: serde_json::to_string(&payload_for(0)).expect("serialize"),
            },
            SqsRecord {
                message_id: "m-1".to_string(),
                body: "{\"run_id\":\"x\"}".to_string(),
            },
            SqsRecord {
                message_id: "m-2".to_string(),
                body: serde_json::to_string(&payload_for(2)).expect("serialize"),
            },
        ];

        let mut executed = Vec::new();
        let failed = process_sqs_records(&records, |payload| {
            executed.push(payload.batch_id);
            Ok(())
        });

        assert_eq!(executed, vec![0]);
        assert_eq!(failed, vec!["m-1".to_string(), "m-2".to_string()]);
    }

    #[test]
    fn run_date_prefers_payload_value() {
        let resolved = resolve_run_date(&sample_payload(Some("2026-02-14")), "2026-02-15");
        assert_eq!(resolved, "2026-02-14");
    }

    #[test]
    fn run_date_falls_back_when_payload_missing() {
        let resolved = resolve_run_date(&sample_payload(None), "2026-02-15");
        assert_eq!(resolved, "2026-02-15");
    }
}
