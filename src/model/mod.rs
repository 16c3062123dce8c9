//! Data model (spec.md §3): identifiers, provider configuration, workflow
//! templates and phases, artifacts, and the execution/phase-execution
//! records.

mod artifact;
mod execution;
mod phase;
mod provider_config;
mod template;

pub use artifact::{Artifact, ArtifactType};
pub use execution::{
    PhaseExecution, PhaseExecutionId, PhaseStatus, TriggerMode, WorkflowExecution, WorkflowStatus,
};
pub use phase::{PhaseRole, WorkflowPhase};
pub use provider_config::{ProviderConfig, ProviderKind};
pub use template::{FailureBehavior, IterationBehavior, TemplateValidationError, WorkflowTemplate};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Generate an opaque id: the first 8 hex characters of a fresh UUIDv4.
///
/// Ported from the original's `generate_id()` (`str(uuid.uuid4())[:8]`).
/// Uniqueness, not structure, is the only contract (spec.md §3).
pub fn generate_id() -> String {
    let raw = uuid::Uuid::new_v4().simple().to_string();
    raw[..8].to_string()
}

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new() -> Self {
                Self(generate_id())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

id_newtype!(ExecutionId);
id_newtype!(PhaseId);
id_newtype!(TemplateId);
id_newtype!(ArtifactId);

/// One of the three budget-ledger scopes (spec.md §3, §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetScope {
    Execution,
    Project,
    Global,
}

impl fmt::Display for BudgetScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BudgetScope::Execution => write!(f, "execution"),
            BudgetScope::Project => write!(f, "project"),
            BudgetScope::Global => write!(f, "global"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_id_is_8_hex_chars() {
        let id = generate_id();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn generate_id_is_not_trivially_repeated() {
        let a = generate_id();
        let b = generate_id();
        assert_ne!(a, b);
    }

    #[test]
    fn execution_id_round_trips_through_json() {
        let id = ExecutionId::from("cafebabe");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"cafebabe\"");
        let back: ExecutionId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
