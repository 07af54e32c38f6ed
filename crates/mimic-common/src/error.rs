/// Errors reported by a UI backend (element lookup, input injection, window management).
#[derive(thiserror::Error, Debug, Clone)]
pub enum BackendError {
    // ============================================================
    // Element Errors
    // ============================================================
    #[error("Element {id} not found")]
    ElementNotFound { id: u32 },

    #[error("Element {id} is disabled")]
    ElementDisabled { id: u32 },

    #[error("Element {id} is not focusable")]
    NotFocusable { id: u32 },

    #[error("Invalid selector: {selector}")]
    SelectorInvalid { selector: String },

    // ============================================================
    // Window Errors
    // ============================================================
    #[error("Window not found: {0}")]
    WindowNotFound(String),

    #[error("Unknown application: {0}")]
    UnknownApplication(String),

    // ============================================================
    // System Errors
    // ============================================================
    #[error("Input injection failed: {0}")]
    Injection(String),

    #[error("Not ready")]
    NotReady,

    #[error("Cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Not supported: {0}")]
    NotSupported(String),
}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        BackendError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(err: serde_json::Error) -> Self {
        BackendError::Serialization(err.to_string())
    }
}

impl BackendError {
    /// Stable error code for log lines.
    pub fn code(&self) -> &'static str {
        match self {
            BackendError::ElementNotFound { .. } => "ELEMENT_NOT_FOUND",
            BackendError::ElementDisabled { .. } => "ELEMENT_DISABLED",
            BackendError::NotFocusable { .. } => "NOT_FOCUSABLE",
            BackendError::SelectorInvalid { .. } => "SELECTOR_INVALID",
            BackendError::WindowNotFound(_) => "WINDOW_NOT_FOUND",
            BackendError::UnknownApplication(_) => "UNKNOWN_APPLICATION",
            BackendError::Injection(_) => "INJECTION_ERROR",
            BackendError::NotReady => "NOT_READY",
            BackendError::Cancelled => "CANCELLED",
            BackendError::Io(_) => "IO_ERROR",
            BackendError::Serialization(_) => "SERIALIZATION_ERROR",
            BackendError::NotSupported(_) => "NOT_SUPPORTED",
        }
    }

    pub fn recovery_hint(&self) -> &'static str {
        match self {
            BackendError::ElementNotFound { .. } => "Take a fresh snapshot and resolve again",
            BackendError::ElementDisabled { .. } => "Wait for element to become enabled",
            BackendError::SelectorInvalid { .. } => "Fix selector syntax",
            BackendError::WindowNotFound(_) => "Check the window id or open the app first",
            _ => "Check command parameters",
        }
    }
}
