//! Conductor SDK error types

use thiserror::Error;

/// Conductor SDK error type
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connection error (only surfaced once the client has been stopped)
    #[error("Connection error: {0}")]
    Connection(String),

    /// A tool was invoked by a name the facade does not expose
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// A tool was invoked with missing or malformed arguments
    #[error("Invalid arguments for {tool}: {message}")]
    InvalidArguments { tool: String, message: String },

    /// An outbound handler failed to deliver an envelope
    #[error("Outbound error: {0}")]
    Outbound(String),

    /// Backend HTTP API error
    #[error("Backend API error: {message}")]
    BackendApi {
        message: String,
        status_code: Option<u16>,
        details: Option<serde_json::Value>,
    },

    /// A git command exited unsuccessfully
    #[error("Git error: {0}")]
    Git(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML config parse error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// TOML config parse error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// WebSocket protocol error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

impl Error {
    /// Short machine-readable name of the error category
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Connection(_) => "connection",
            Self::UnknownTool(_) => "unknown_tool",
            Self::InvalidArguments { .. } => "invalid_arguments",
            Self::Outbound(_) => "outbound",
            Self::BackendApi { .. } => "backend_api",
            Self::Git(_) => "git",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
            Self::Yaml(_) | Self::Toml(_) => "config",
            Self::Http(_) => "http",
            Self::WebSocket(_) => "websocket",
        }
    }
}

/// Result type alias for Conductor SDK operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_arguments_message() {
        let err = Error::InvalidArguments {
            tool: "send_message".to_string(),
            message: "missing field `content`".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid arguments for send_message: missing field `content`"
        );
        assert_eq!(err.kind(), "invalid_arguments");
    }

    #[test]
    fn test_unknown_tool_names_the_tool() {
        let err = Error::UnknownTool("delete_everything".to_string());
        assert!(err.to_string().contains("delete_everything"));
        assert_eq!(err.kind(), "unknown_tool");
    }
}
