//! Typed error hierarchy for the workflow execution engine.
//!
//! One enum per subsystem, composed into [`EngineError`] at the top. Library
//! entry points (`Orchestrator::run`, `PhaseRunner::run_phase`, ...) return
//! `Result<_, EngineError>`; callers that just want a human-readable failure
//! can convert via `anyhow`.

use thiserror::Error;

use crate::model::ExecutionId;

/// Errors raised while resolving or validating workflow configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no template specified and no default template is configured")]
    NoDefaultTemplate,

    #[error("template {0} not found")]
    TemplateNotFound(String),

    #[error("invalid provider kind: {0}")]
    InvalidProviderKind(String),

    #[error("failed to read config file at {path}: {source}")]
    ReadFailed {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    ParseFailed(String),

    #[error(transparent)]
    InvalidTemplate(#[from] crate::model::TemplateValidationError),
}

/// Errors raised by the provider abstraction (spec.md §4.5, §7).
#[derive(Debug, Error, Clone)]
pub enum ProviderError {
    #[error("transient provider error: {0}")]
    Transient(String),

    #[error("fatal provider error: {0}")]
    Fatal(String),

    #[error("provider call timed out after {0}s")]
    Timeout(u64),

    #[error("provider kind {0:?} has no wire-protocol implementation configured")]
    Unconfigured(crate::model::ProviderKind),
}

/// Errors raised while debiting or reading budget ledgers.
#[derive(Debug, Error)]
pub enum BudgetError {
    #[error("budget exceeded for {scope:?}/{scope_id}: spent {spent:.4}, limit {limit:.4}")]
    Exceeded {
        scope: crate::model::BudgetScope,
        scope_id: String,
        spent: f64,
        limit: f64,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors raised by the approval coordinator.
#[derive(Debug, Error)]
pub enum ApprovalError {
    #[error("approval for execution {0} was rejected")]
    Rejected(ExecutionId),

    #[error("approval for execution {0} timed out")]
    TimedOut(ExecutionId),

    #[error("no pending approval request for execution {0}")]
    NoPendingRequest(ExecutionId),

    #[error("approval for execution {0} was cancelled")]
    Cancelled(ExecutionId),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors raised by the document store / artifact store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("io error at {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised while running a single phase (spec.md §4.2, §7).
#[derive(Debug, Error)]
pub enum PhaseError {
    #[error("phase {phase_id} has no known dependency {dependency}")]
    UnknownDependency { phase_id: String, dependency: String },

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Budget(#[from] BudgetError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Top-level error returned from orchestrator operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Phase(#[from] PhaseError),

    #[error(transparent)]
    Budget(#[from] BudgetError),

    #[error(transparent)]
    Approval(#[from] ApprovalError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("execution {0} not found")]
    ExecutionNotFound(ExecutionId),

    #[error("execution {0} has a pending approval; skip_phase is not allowed until it resolves")]
    ApprovalPending(ExecutionId),

    #[error("cannot skip phase {phase_id}: it is not the current phase or cannot be skipped")]
    CannotSkip { phase_id: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BudgetScope;

    #[test]
    fn budget_error_carries_scope_and_amounts() {
        let err = BudgetError::Exceeded {
            scope: BudgetScope::Execution,
            scope_id: "abc12345".into(),
            spent: 1.5,
            limit: 1.0,
        };
        assert!(err.to_string().contains("abc12345"));
    }

    #[test]
    fn phase_error_converts_from_provider_error() {
        let inner = ProviderError::Timeout(30);
        let phase_err: PhaseError = inner.into();
        matches!(phase_err, PhaseError::Provider(ProviderError::Timeout(30)));
    }

    #[test]
    fn engine_error_converts_from_phase_error() {
        let inner = PhaseError::Provider(ProviderError::Fatal("bad request".into()));
        let engine_err: EngineError = inner.into();
        assert!(engine_err.to_string().contains("bad request"));
    }

    #[test]
    fn approval_error_variants_are_distinct() {
        let id: ExecutionId = "deadbeef".into();
        let rejected = ApprovalError::Rejected(id.clone());
        let timed_out = ApprovalError::TimedOut(id);
        assert_ne!(rejected.to_string(), timed_out.to_string());
    }
}
