use thiserror::Error;

/// Failure taxonomy shared by the engine and the gateway.
///
/// `Validation`, `NotFound` and `InsufficientFunds` are client-correctable;
/// `Storage` is infrastructure and is surfaced as a generic failure.
#[derive(Debug, Error)]
pub enum EconomyError {
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Not enough points: {required} required, {available} available")]
    InsufficientFunds { required: f64, available: f64 },

    #[error("storage failure: {0}")]
    Storage(#[from] anyhow::Error),
}

impl EconomyError {
    pub fn validation(message: impl Into<String>) -> Self {
        EconomyError::Validation(message.into())
    }
}

/// A kind name that doesn't match any variant.
#[derive(Debug, Clone, Error)]
#[error("unknown {kind} type '{value}'")]
pub struct UnknownKind {
    pub kind: &'static str,
    pub value: String,
}
