use miette::Diagnostic;
use thiserror::Error;

use crate::rules::RuleError;

#[derive(Debug, Error, Diagnostic)]
pub enum AppError {
    #[error("Serialization error: {0}")]
    #[diagnostic(code(georules::serde))]
    Serde(#[from] serde_json::Error),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Rules(#[from] RuleError),
}
