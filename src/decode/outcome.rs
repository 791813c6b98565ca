use thiserror::Error;

use super::backend::Symbol;
use crate::DecodedValue;

/// Non-fatal failure of one decode attempt.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{backend}: {message}")]
pub struct DecodeError {
    pub backend: String,
    pub message: String,
}

impl DecodeError {
    pub fn new(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// The decoder dropped its job without completing it.
    pub(crate) fn abandoned() -> Self {
        Self::new("decoder", "decode job abandoned without a result")
    }
}

/// Result of decoding one frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecodeOutcome {
    /// At least one value, in decoder order.
    Values(Vec<DecodedValue>),
    /// Nothing readable in the frame.
    Empty,
    Failed(DecodeError),
}

impl DecodeOutcome {
    /// Build an outcome from raw symbols, skipping unreadable and empty payloads.
    pub fn from_symbols(symbols: Vec<Symbol>) -> Self {
        let values: Vec<DecodedValue> = symbols
            .into_iter()
            .filter_map(|symbol| symbol.raw_value.and_then(DecodedValue::new))
            .collect();
        Self::from_values(values)
    }

    pub fn from_values(values: Vec<DecodedValue>) -> Self {
        if values.is_empty() {
            DecodeOutcome::Empty
        } else {
            DecodeOutcome::Values(values)
        }
    }

    pub fn from_backend_result(backend: &str, result: anyhow::Result<Vec<Symbol>>) -> Self {
        match result {
            Ok(symbols) => Self::from_symbols(symbols),
            Err(e) => DecodeOutcome::Failed(DecodeError::new(backend, format!("{:#}", e))),
        }
    }

    /// First value in decoder order.
    pub fn first(&self) -> Option<&DecodedValue> {
        match self {
            DecodeOutcome::Values(values) => values.first(),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, DecodeOutcome::Empty)
    }
}
