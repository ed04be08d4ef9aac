use std::sync::Arc;
use std::time::Instant;

use arrow::array::{ArrayRef, StringArray, UInt64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use bakery_array::{combine_and_write_report, BakeryError, CombineReport, Resolver};
use bakery_core::contract::{
    BatchOutcomeRecord, BatchOutputMetadata, BatchPayload, OutcomeError,
    OUTCOME_RECORD_SCHEMA_VERSION,
};
use bakery_core::storage_keys::{failure_outcome_object_key, success_outcome_object_key};
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::adapters::object_store::OutcomeStore;

const COMPONENT: &str = "batch_handler";

pub trait BatchExecutor {
    fn execute_batch(&self, payload: &BatchPayload) -> Result<CombineReport, BakeryError>;
}

/// Runs the batch through `combine_and_write` against the resolver's backends.
#[derive(Debug, Clone)]
pub struct ArrayBatchExecutor {
    resolver: Resolver,
}

impl ArrayBatchExecutor {
    pub fn new(resolver: Resolver) -> Self {
        Self { resolver }
    }
}

impl BatchExecutor for ArrayBatchExecutor {
    fn execute_batch(&self, payload: &BatchPayload) -> Result<CombineReport, BakeryError> {
        combine_and_write_report(
            &self.resolver,
            &payload.sources,
            &payload.target,
            &payload.append_dim,
            &payload.concat_dim,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchHandlerConfig {
    pub prefix: String,
    pub run_date: String,
    pub event_time: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchSuccessResponse {
    pub status: String,
    pub batch_id: usize,
    pub target: String,
    pub write_mode: String,
    pub outcome_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchHandlerError {
    pub message: String,
    pub error_code: String,
    pub failure_key: Option<String>,
}

impl std::fmt::Display for BatchHandlerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error_code, self.message)
    }
}

impl std::error::Error for BatchHandlerError {}

pub fn handle_batch_payload(
    payload: &BatchPayload,
    config: &BatchHandlerConfig,
    executor: &impl BatchExecutor,
    outcome_store: &impl OutcomeStore,
) -> Result<BatchSuccessResponse, BatchHandlerError> {
    let started_at = Instant::now();
    info!(
        component = COMPONENT,
        event = "batch_started",
        run_id = %payload.run_id,
        batch_id = payload.batch_id,
        batch_count = payload.batch_count,
        start_index = payload.start_index,
        end_index_exclusive = payload.end_index_exclusive,
        "batch started"
    );

    validate_payload(payload)?;

    let report = match executor.execute_batch(payload) {
        Ok(report) => report,
        Err(execution_error) => {
            return Err(record_failure(
                payload,
                config,
                execution_error.code(),
                execution_error.to_string(),
                started_at,
                outcome_store,
            ));
        }
    };

    match write_success(payload, config, &report, outcome_store) {
        Ok(response) => {
            info!(
                component = COMPONENT,
                event = "batch_completed",
                run_id = %payload.run_id,
                batch_id = payload.batch_id,
                write_mode = %response.write_mode,
                sources_processed = report.sources_processed,
                append_length = report.append_length,
                duration_ms = started_at.elapsed().as_millis() as u64,
                outcome_key = %response.outcome_key,
                "batch completed"
            );
            Ok(response)
        }
        Err(message) => Err(record_failure(
            payload,
            config,
            "outcome_write_failed",
            message,
            started_at,
            outcome_store,
        )),
    }
}

pub fn handle_batch_payload_with_resolver(
    payload: &BatchPayload,
    config: &BatchHandlerConfig,
    resolver: &Resolver,
    outcome_store: &impl OutcomeStore,
) -> Result<BatchSuccessResponse, BatchHandlerError> {
    handle_batch_payload(
        payload,
        config,
        &ArrayBatchExecutor::new(resolver.clone()),
        outcome_store,
    )
}

fn validate_payload(payload: &BatchPayload) -> Result<(), BatchHandlerError> {
    let invalid = |message: &str| BatchHandlerError {
        message: message.to_string(),
        error_code: "invalid_argument".to_string(),
        failure_key: None,
    };

    if payload.start_index >= payload.end_index_exclusive {
        return Err(invalid("Invalid batch bounds"));
    }
    if payload.batch_id >= payload.batch_count {
        return Err(invalid("batch_id must be less than batch_count"));
    }
    if payload.sources.len() != payload.end_index_exclusive - payload.start_index {
        return Err(invalid("sources do not match batch bounds"));
    }
    Ok(())
}

fn write_success(
    payload: &BatchPayload,
    config: &BatchHandlerConfig,
    report: &CombineReport,
    outcome_store: &impl OutcomeStore,
) -> Result<BatchSuccessResponse, String> {
    let outcome_key = success_outcome_object_key(
        &config.prefix,
        &config.run_date,
        &payload.run_id,
        payload.batch_id,
    );

    let record = BatchOutcomeRecord {
        run_id: payload.run_id.clone(),
        batch_id: payload.batch_id,
        status: "success".to_string(),
        start_index: payload.start_index,
        end_index_exclusive: payload.end_index_exclusive,
        event_time: config.event_time.clone(),
        record_schema: OUTCOME_RECORD_SCHEMA_VERSION.to_string(),
        output_metadata: Some(BatchOutputMetadata {
            target: report.target.clone(),
            write_mode: report.write_mode.as_str().to_string(),
            sources_processed: report.sources_processed,
            append_length: report.append_length,
        }),
        error: None,
    };

    let body = serialize_outcome_parquet(&record)
        .map_err(|error| format!("Failed to serialize success outcome parquet: {error}"))?;
    outcome_store
        .write_object(&outcome_key, &body)
        .map_err(|error| format!("Failed to persist success outcome: {error}"))?;

    Ok(BatchSuccessResponse {
        status: "ok".to_string(),
        batch_id: payload.batch_id,
        target: report.target.clone(),
        write_mode: report.write_mode.as_str().to_string(),
        outcome_key,
    })
}

/// Persist a failure record and build the error returned to the caller.
/// A failure record that cannot be written is folded into the message.
fn record_failure(
    payload: &BatchPayload,
    config: &BatchHandlerConfig,
    error_code: &str,
    message: String,
    started_at: Instant,
    outcome_store: &impl OutcomeStore,
) -> BatchHandlerError {
    let key = failure_outcome_object_key(
        &config.prefix,
        &config.run_date,
        &payload.run_id,
        payload.batch_id,
    );

    let record = BatchOutcomeRecord {
        run_id: payload.run_id.clone(),
        batch_id: payload.batch_id,
        status: "failure".to_string(),
        start_index: payload.start_index,
        end_index_exclusive: payload.end_index_exclusive,
        event_time: config.event_time.clone(),
        record_schema: OUTCOME_RECORD_SCHEMA_VERSION.to_string(),
        output_metadata: None,
        error: Some(OutcomeError {
            error_code: error_code.to_string(),
            error_message: message.clone(),
        }),
    };

    let persisted = serialize_outcome_parquet(&record)
        .map_err(|error| format!("Failed to serialize failure outcome parquet: {error}"))
        .and_then(|body| {
            outcome_store
                .write_object(&key, &body)
                .map_err(|error| format!("Failed to persist failure outcome: {error}"))
        });

    error!(
        component = COMPONENT,
        event = "batch_failed",
        run_id = %payload.run_id,
        batch_id = payload.batch_id,
        error_code,
        duration_ms = started_at.elapsed().as_millis() as u64,
        error = %message,
        failure_record_written = persisted.is_ok(),
        "batch failed"
    );

    let message = match persisted {
        Ok(()) => message,
        Err(persist_error) => format!("{message}; {persist_error}"),
    };
    BatchHandlerError {
        message,
        error_code: error_code.to_string(),
        failure_key: Some(key),
    }
}

fn serialize_outcome_parquet(record: &BatchOutcomeRecord) -> Result<Vec<u8>, String> {
    let schema = Arc::new(Schema::new(vec![
        Field::new("run_id", DataType::Utf8, false),
        Field::new("batch_id", DataType::UInt64, false),
        Field::new("status", DataType::Utf8, false),
        Field::new("start_index", DataType::UInt64, false),
        Field::new("end_index_exclusive", DataType::UInt64, false),
        Field::new("event_time", DataType::Utf8, false),
        Field::new("record_schema", DataType::Utf8, false),
        Field::new("target", DataType::Utf8, true),
        Field::new("write_mode", DataType::Utf8, true),
        Field::new("sources_processed", DataType::UInt64, true),
        Field::new("append_length", DataType::UInt64, true),
        Field::new("error_code", DataType::Utf8, true),
        Field::new("error_message", DataType::Utf8, true),
    ]));

    let output = record.output_metadata.as_ref();
    let failure = record.error.as_ref();

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(StringArray::from(vec![record.run_id.clone()])) as ArrayRef,
            Arc::new(UInt64Array::from(vec![record.batch_id as u64])),
            Arc::new(StringArray::from(vec![record.status.clone()])),
            Arc::new(UInt64Array::from(vec![record.start_index as u64])),
            Arc::new(UInt64Array::from(vec![record.end_index_exclusive as u64])),
            Arc::new(StringArray::from(vec![record.event_time.clone()])),
            Arc::new(StringArray::from(vec![record.record_schema.clone()])),
            Arc::new(StringArray::from(vec![output.map(|meta| meta.target.clone())])),
            Arc::new(StringArray::from(vec![output.map(|meta| meta.write_mode.clone())])),
            Arc::new(UInt64Array::from(vec![
                output.map(|meta| meta.sources_processed as u64)
            ])),
            Arc::new(UInt64Array::from(vec![
                output.map(|meta| meta.append_length as u64)
            ])),
            Arc::new(StringArray::from(vec![failure.map(|error| error.error_code.clone())])),
            Arc::new(StringArray::from(vec![
                failure.map(|error| error.error_message.clone())
            ])),
        ],
    )
    .map_err(|error| format!("Failed to build outcome parquet record batch: {error}"))?;

    let mut buffer = Vec::new();
    let props = WriterProperties::builder().build();
    let mut writer =
        ArrowWriter::try_new(&mut buffer, schema, Some(props)).map_err(|error| error.to_string())?;
    writer
        .write(&batch)
        .map_err(|error| format!("Failed to write outcome parquet batch: {error}"))?;
    writer
        .close()
        .map_err(|error| format!("Failed to close outcome parquet writer: {error}"))?;

    Ok(buffer)
}
