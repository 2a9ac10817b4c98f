use serde::Serialize;
use std::fmt;

pub const ERR_VALIDATION: &str = "ERR_VALIDATION";
pub const ERR_SYSTEM: &str = "ERR_SYSTEM";
pub const ERR_TIMEOUT: &str = "ERR_TIMEOUT";
pub const ERR_TOOL_MISSING: &str = "ERR_TOOL_MISSING";
pub const ERR_ENCODING: &str = "ERR_ENCODING";
pub const ERR_CONNECT: &str = "ERR_CONNECT";
pub const ERR_HEURISTIC: &str = "ERR_HEURISTIC";
pub const ERR_NOT_CONNECTED: &str = "ERR_NOT_CONNECTED";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppError {
    pub error: String,
    pub code: String,
    pub trace_id: String,
}

impl AppError {
    pub fn new(code: impl Into<String>, message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            code: code.into(),
            trace_id: trace_id.into(),
        }
    }

    pub fn validation(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ERR_VALIDATION, message, trace_id)
    }

    pub fn system(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ERR_SYSTEM, message, trace_id)
    }

    pub fn timeout(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ERR_TIMEOUT, message, trace_id)
    }

    pub fn tool_missing(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ERR_TOOL_MISSING, message, trace_id)
    }

    pub fn encoding(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ERR_ENCODING, message, trace_id)
    }

    pub fn connect(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ERR_CONNECT, message, trace_id)
    }

    /// The action ran but its output lacked the expected marker. The device-side
    /// outcome is unknown rather than known to have failed.
    pub fn heuristic(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ERR_HEURISTIC, message, trace_id)
    }

    pub fn not_connected(trace_id: impl Into<String>) -> Self {
        Self::new(ERR_NOT_CONNECTED, "Device is not connected", trace_id)
    }

    pub fn is(&self, code: &str) -> bool {
        self.code == code
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.error, self.code)
    }
}

impl std::error::Error for AppError {}
