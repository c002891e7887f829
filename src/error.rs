use thiserror::Error;

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Query parse failed: {0}")]
    Parse(String),

    #[error("Operation not found in document: {}", .0.as_deref().unwrap_or("<anonymous>"))]
    UnknownOperation(Option<String>),

    #[error("Fragment not found in document: {0}")]
    UnknownFragment(String),

    #[error("Fragment spreads form a cycle through '{0}'")]
    FragmentCycle(String),

    #[error("Query traversal exceeded {0} field nodes")]
    TraversalBudget(usize),

    #[error("Metrics sink rejected '{metric}': {message}")]
    Sink { metric: String, message: String },

    #[error("Metrics exporter error: {0}")]
    Exporter(String),
}

pub type Result<T> = std::result::Result<T, TelemetryError>;
