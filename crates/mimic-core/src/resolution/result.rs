use std::fmt;
use thiserror::Error;

/// Element lookup strategies, in the order they are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Selector,
    Text,
    Signature,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Strategy::Selector => "selector",
            Strategy::Text => "text",
            Strategy::Signature => "signature",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Resolution failed for target '{target}': {reason}")]
pub struct ResolutionError {
    pub target: String,
    pub reason: String,
    pub attempted: Vec<Strategy>, // Strategies tried
}
