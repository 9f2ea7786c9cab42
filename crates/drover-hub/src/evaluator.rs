//! Submission evaluation seam.
//!
//! The transcript hub accepts text submissions and hands them to an
//! [`Evaluator`] for execution. Production wires this to the plane's
//! command engine; tests substitute scripted implementations.

use async_trait::async_trait;
use thiserror::Error;

use drover_core::ScopeId;

/// Why an evaluation produced no output.
#[derive(Debug, Error)]
pub enum EvalError {
    /// The scope cannot execute submissions (for example a pool scope with
    /// no execution backend).
    #[error("scope does not accept submissions")]
    Unsupported,
    /// The backend failed; the message is surfaced verbatim in the
    /// transcript notice.
    #[error("{0}")]
    Failed(String),
}

/// Executes a transcript submission and produces its output text.
#[async_trait]
pub trait Evaluator: Send + Sync {
    /// Evaluate `input` in the context of `scope`.
    async fn evaluate(&self, scope: &ScopeId, input: &str) -> Result<String, EvalError>;
}

/// Evaluator that echoes its input back, for wiring tests and demos.
#[derive(Debug, Default)]
pub struct EchoEvaluator;

#[async_trait]
impl Evaluator for EchoEvaluator {
    async fn evaluate(&self, _scope: &ScopeId, input: &str) -> Result<String, EvalError> {
        Ok(input.to_owned())
    }
}
