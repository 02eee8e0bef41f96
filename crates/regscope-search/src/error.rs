use thiserror::Error;

#[derive(Debug, Error)]
pub enum SearchError {
    #[cfg(feature = "http")]
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("tool {tool} reported an error: {message}")]
    ToolFailed { tool: String, message: String },

    #[error("tool {tool} timed out after {seconds:.1}s")]
    Timeout { tool: String, seconds: f64 },

    #[error("unparseable tool payload: {0}")]
    Payload(String),

    #[error("discovery failed for provider {provider}: {message}")]
    Discovery { provider: String, message: String },
}
