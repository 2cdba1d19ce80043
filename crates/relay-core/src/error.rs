use thiserror::Error;

/// Top-level error type for the Relay library.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Resume error: {0}")]
    Resume(#[from] ResumeError),

    #[error("Run timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("Run cancelled")]
    Cancelled,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl RelayError {
    /// Errors raised while loading or validating a paused run.
    pub fn is_resume_error(&self) -> bool {
        matches!(self, RelayError::Resume(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, RelayError::Timeout { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RelayError::Cancelled)
    }

    /// Short machine-readable kind, used by transports in error payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::Model(ModelError::MalformedOutput(_)) => "malformed_output",
            RelayError::Model(_) => "model",
            RelayError::Tool(_) => "tool",
            RelayError::Graph(_) => "graph",
            RelayError::Resume(_) => "resume",
            RelayError::Timeout { .. } => "timeout",
            RelayError::Cancelled => "cancelled",
            RelayError::Serialization(_) => "serialization",
            RelayError::Other(_) => "other",
        }
    }
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("API request failed: {0}")]
    ApiRequest(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The model was expected to produce a structured decision and did not.
    #[error("Malformed structured output: {0}")]
    MalformedOutput(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Rate limited: retry after {retry_after_secs:?}s")]
    RateLimited { retry_after_secs: Option<u64> },
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
}

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Invalid graph: {0}")]
    InvalidGraph(String),

    #[error("Event '{tag}' is accepted by more than one step: {steps:?}")]
    AmbiguousRoute { tag: String, steps: Vec<String> },

    #[error("No step accepts event '{tag}'")]
    NoConsumer { tag: String },

    #[error("Step '{step}' produced undeclared event '{tag}'")]
    UndeclaredEvent { step: String, tag: String },

    #[error("Event queue exhausted without a stop event")]
    QueueExhausted,

    #[error("Step limit ({limit}) exceeded")]
    StepLimit { limit: usize },

    #[error("Step error in '{step}': {source}")]
    StepExecution {
        step: String,
        source: Box<RelayError>,
    },

    #[error("Snapshot error: {0}")]
    Snapshot(String),
}

#[derive(Debug, Error)]
pub enum ResumeError {
    #[error("Snapshot not found: {0}")]
    SnapshotNotFound(String),

    #[error("Workflow not resumable: {0}")]
    NotResumable(String),

    #[error("Unsupported snapshot version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },
}

pub type Result<T> = std::result::Result<T, RelayError>;
