pub mod analyzer;
pub mod session_log;

pub use crate::config::schema::AnalyzerConfig;
pub use analyzer::{AnalysisError, PatternAnalyzer};
pub use session_log::{SessionLog, SessionLogError};
