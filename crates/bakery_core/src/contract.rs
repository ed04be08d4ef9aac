use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const ORCHESTRATION_SCHEMA_VERSION: &str = "v1";
pub const OUTCOME_RECORD_SCHEMA_VERSION: &str = "v1";
pub const MAX_RECIPE_SOURCES: usize = 100_000;
pub const DEFAULT_MAX_BATCHES: usize = 1_000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunContext {
    pub run_id: String,
    pub schema_version: String,
    pub request_fingerprint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchAssignment {
    pub batch_id: usize,
    pub start_index: usize,
    pub end_index_exclusive: usize,
}

impl BatchAssignment {
    pub fn len(&self) -> usize {
        self.end_index_exclusive - self.start_index
    }

    pub fn is_empty(&self) -> bool {
        self.start_index == self.end_index_exclusive
    }
}

/// A request to build one target store from an ordered list of sources.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecipeRequest {
    pub run_id: String,
    pub sources: Vec<String>,
    pub target: String,
    pub append_dim: String,
    pub concat_dim: String,
    pub batch_size: usize,
    #[serde(default = "default_max_batches")]
    pub max_batches: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NormalizedRecipeRequest {
    pub run_id: String,
    pub sources: Vec<String>,
    pub target: String,
    pub append_dim: String,
    pub concat_dim: String,
    pub batch_size: usize,
    pub max_batches: usize,
}

/// One unit of work: a contiguous slice of the recipe's sources.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchPayload {
    pub run_id: String,
    #[serde(default)]
    pub run_date: Option<String>,
    pub batch_id: usize,
    pub batch_count: usize,
    pub start_index: usize,
    pub end_index_exclusive: usize,
    pub sources: Vec<String>,
    pub target: String,
    pub append_dim: String,
    pub concat_dim: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DispatchRecord {
    pub batch_id: usize,
    pub status_code: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParentAcceptedResponse {
    pub run_id: String,
    pub target: String,
    pub total_sources: usize,
    pub batches_dispatched: usize,
    pub dispatches: Vec<DispatchRecord>,
    pub status: String,
    pub schema_version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutcomeError {
    pub error_code: String,
    pub error_message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchOutputMetadata {
    pub target: String,
    pub write_mode: String,
    pub sources_processed: usize,
    pub append_length: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchOutcomeRecord {
    pub run_id: String,
    pub batch_id: usize,
    pub status: String,
    pub start_index: usize,
    pub end_index_exclusive: usize,
    pub event_time: String,
    pub record_schema: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_metadata: Option<BatchOutputMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<OutcomeError>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ValidationError {}

pub fn default_max_batches() -> usize {
    DEFAULT_MAX_BATCHES
}

pub fn normalize_request(payload: RecipeRequest) -> Result<NormalizedRecipeRequest, ValidationError> {
    let run_id = payload.run_id.trim().to_string();
    if run_id.is_empty() {
        return Err(ValidationError::new("run_id cannot be empty"));
    }

    if payload.sources.is_empty() {
        return Err(ValidationError::new("sources cannot be empty"));
    }

    if payload.sources.len() > MAX_RECIPE_SOURCES {
        return Err(ValidationError::new(format!(
            "Recipe exceeds MAX_RECIPE_SOURCES={MAX_RECIPE_SOURCES}"
        )));
    }

    if let Some(position) = payload
        .sources
        .iter()
        .position(|source| source.trim().is_empty())
    {
        return Err(ValidationError::new(format!(
            "Source at position {position} must be a non-empty URL"
        )));
    }

    let target = payload.target.trim().to_string();
    if target.is_empty() {
        return Err(ValidationError::new("target cannot be empty"));
    }

    let append_dim = payload.append_dim.trim().to_string();
    if append_dim.is_empty() {
        return Err(ValidationError::new("append_dim cannot be empty"));
    }

    let concat_dim = payload.concat_dim.trim().to_string();
    if concat_dim.is_empty() {
        return Err(ValidationError::new("concat_dim cannot be empty"));
    }

    if payload.batch_size == 0 {
        return Err(ValidationError::new(
            "batch_size must be a positive integer",
        ));
    }

    if payload.max_batches == 0 {
        return Err(ValidationError::new(
            "max_batches must be a positive integer",
        ));
    }

    // Source order is the append order; it is kept exactly as submitted.
    Ok(NormalizedRecipeRequest {
        run_id,
        sources: payload.sources,
        target,
        append_dim,
        concat_dim,
        batch_size: payload.batch_size,
        max_batches: payload.max_batches,
    })
}

pub fn request_fingerprint(request: &NormalizedRecipeRequest) -> String {
    let mut hasher = Sha256::new();
    hasher.update(stable_contract_json(request));
    format!("{:x}", hasher.finalize())
}

/// FIFO message group for a target store; batches of one target execute in
/// enqueue order. Hashed so arbitrary locators fit the queue's id limits.
pub fn message_group_id(target: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(target.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn message_deduplication_id(run_id: &str, batch_id: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{run_id}-{batch_id}").as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn stable_contract_json(value: impl Serialize) -> String {
    serde_json::to_string(&value).expect("serialization of contract value should not fail")
}
