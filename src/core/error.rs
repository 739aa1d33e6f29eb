use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExporterError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid span data: {0}")]
    InvalidSpan(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] prost::EncodeError),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Collector responded with HTTP {status}: {message}")]
    HttpStatus { status: u16, message: String },

    #[error("GRPC error: {0}")]
    Grpc(#[from] tonic::Status),

    #[error("Timeout error: operation took longer than {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Export call was cancelled")]
    Cancelled,

    #[error("Transport has been disposed")]
    Disposed,
}

/// Result type alias for exporter operations
pub type Result<T> = std::result::Result<T, ExporterError>;

impl ExporterError {
    /// Creates a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a new network error
    pub fn network<S: Into<String>>(msg: S) -> Self {
        Self::Network(msg.into())
    }

    /// Creates a new invalid span error
    pub fn invalid_span<S: Into<String>>(msg: S) -> Self {
        Self::InvalidSpan(msg.into())
    }

    /// Returns true if a later attempt with the same batch could succeed.
    ///
    /// Follows the OTLP retry guidance: HTTP 408/429/502/503/504 and the
    /// transient gRPC codes are retryable, other collector rejections are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout { .. } | Self::Cancelled => true,
            Self::HttpStatus { status, .. } => matches!(status, 408 | 429 | 502 | 503 | 504),
            Self::Grpc(status) => matches!(
                status.code(),
                tonic::Code::Cancelled
                    | tonic::Code::DeadlineExceeded
                    | tonic::Code::ResourceExhausted
                    | tonic::Code::Aborted
                    | tonic::Code::OutOfRange
                    | tonic::Code::Unavailable
                    | tonic::Code::DataLoss
            ),
            _ => false,
        }
    }

    /// Returns true if the collector received the data and refused it permanently
    pub fn is_permanent_rejection(&self) -> bool {
        matches!(self, Self::HttpStatus { .. } | Self::Grpc(_)) && !self.is_retryable()
    }

    /// Returns the error category for metrics/logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::InvalidSpan(_) => "validation",
            Self::Serialization(_) => "serialization",
            Self::Network(_) | Self::HttpStatus { .. } | Self::Grpc(_) => "network",
            Self::Timeout { .. } => "timeout",
            Self::Cancelled | Self::Disposed => "lifecycle",
        }
    }
}
