use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    #[serde(rename = "ERR_ELEMENT_NOT_FOUND")]
    ElementNotFound,
    #[serde(rename = "ERR_INVALID_ARGUMENT")]
    InvalidArgument,
    #[serde(rename = "ERR_TRANSPORT_TIMEOUT")]
    TransportTimeout,
    #[serde(rename = "ERR_TRANSPORT_FAILURE")]
    TransportFailure,
    #[serde(rename = "ERR_CANCELLED")]
    Cancelled,
    #[serde(rename = "ERR_DEPENDENCY")]
    Dependency,
    #[serde(rename = "ERR_SYSTEM")]
    System,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ElementNotFound => "ERR_ELEMENT_NOT_FOUND",
            Self::InvalidArgument => "ERR_INVALID_ARGUMENT",
            Self::TransportTimeout => "ERR_TRANSPORT_TIMEOUT",
            Self::TransportFailure => "ERR_TRANSPORT_FAILURE",
            Self::Cancelled => "ERR_CANCELLED",
            Self::Dependency => "ERR_DEPENDENCY",
            Self::System => "ERR_SYSTEM",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppError {
    pub error: String,
    pub code: ErrorCode,
    pub trace_id: String,
}

impl AppError {
    pub fn new(code: ErrorCode, message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            code,
            trace_id: trace_id.into(),
        }
    }

    pub fn element_not_found(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ErrorCode::ElementNotFound, message, trace_id)
    }

    pub fn invalid_argument(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidArgument, message, trace_id)
    }

    pub fn transport_timeout(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ErrorCode::TransportTimeout, message, trace_id)
    }

    pub fn transport_failure(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ErrorCode::TransportFailure, message, trace_id)
    }

    pub fn cancelled(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ErrorCode::Cancelled, message, trace_id)
    }

    pub fn dependency(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ErrorCode::Dependency, message, trace_id)
    }

    pub fn system(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ErrorCode::System, message, trace_id)
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = trace_id.into();
        self
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.error, self.code)
    }
}

impl std::error::Error for AppError {}
