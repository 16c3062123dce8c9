//! Budget Tracker (spec.md §4.3): multi-scope spending ledger with atomic
//! check-and-debit. Cost table ported verbatim from
//! `original_source/src/workflow/models.py`'s `TOKEN_COSTS` /
//! `estimate_cost()`.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::errors::BudgetError;
use crate::model::BudgetScope;
use crate::store::{BudgetRow, DocumentStore};

/// Price per 1000 tokens, input and output.
#[derive(Debug, Clone, Copy)]
struct ModelPrice {
    input_per_1k: f64,
    output_per_1k: f64,
}

/// Static per-model price table, ported verbatim from `TOKEN_COSTS`. Unknown
/// models fall back to `FALLBACK_PRICE`; the zero-cost entries are the
/// Antigravity models routed through Cloud Code Assist (billed against the
/// caller's existing subscription, not per-token) in the original.
const FALLBACK_PRICE: ModelPrice = ModelPrice { input_per_1k: 0.001, output_per_1k: 0.002 };

fn price_for(model: &str) -> ModelPrice {
    match model {
        "gemini-1.5-pro" => ModelPrice { input_per_1k: 0.00125, output_per_1k: 0.005 },
        "gemini-1.5-flash" => ModelPrice { input_per_1k: 0.000075, output_per_1k: 0.0003 },
        "gemini-2.0-flash" => ModelPrice { input_per_1k: 0.0001, output_per_1k: 0.0004 },
        "gpt-4-turbo" => ModelPrice { input_per_1k: 0.01, output_per_1k: 0.03 },
        "gpt-4o" => ModelPrice { input_per_1k: 0.005, output_per_1k: 0.015 },
        "gpt-4o-mini" => ModelPrice { input_per_1k: 0.00015, output_per_1k: 0.0006 },
        "claude-3-5-sonnet" => ModelPrice { input_per_1k: 0.003, output_per_1k: 0.015 },
        "claude-3-opus" => ModelPrice { input_per_1k: 0.015, output_per_1k: 0.075 },
        "claude-sonnet-4-5"
        | "claude-sonnet-4-5-thinking"
        | "claude-opus-4-5-thinking"
        | "gemini-3-pro"
        | "gemini-3-flash"
        | "gemini-2.5-pro"
        | "gemini-2.5-flash" => ModelPrice { input_per_1k: 0.0, output_per_1k: 0.0 },
        _ => FALLBACK_PRICE,
    }
}

/// `cost = tokens_in/1000 × price_in + tokens_out/1000 × price_out` (spec.md
/// §4.3).
pub fn estimate_cost(model: &str, tokens_in: u64, tokens_out: u64) -> f64 {
    let price = price_for(model);
    (tokens_in as f64 / 1000.0) * price.input_per_1k + (tokens_out as f64 / 1000.0) * price.output_per_1k
}

/// Outcome of [`BudgetTracker::record_execution_usage`].
#[derive(Debug, Clone, Copy)]
pub struct UsageRecord {
    pub cost_usd: f64,
    /// Composite ok: true only if all applicable scopes (execution, project
    /// if present, global) remain within their limits post-debit.
    pub ok: bool,
}

/// Maintains spending ledgers at three scopes. A single `tokio::Mutex`
/// serializes every debit so a (execution, project, global) triple either
/// all update or none do (spec.md §4.3 "Atomicity"); the engine is
/// single-process so this satisfies the invariant without a distributed
/// transaction, mirroring the original's in-process `budget_tracker.py`.
pub struct BudgetTracker {
    store: Arc<dyn DocumentStore>,
    debit_lock: tokio::sync::Mutex<()>,
    /// Per-model `(input_per_1k, output_per_1k)` overrides from
    /// [`crate::config::EngineConfig`], consulted before the built-in table.
    cost_overrides: HashMap<String, (f64, f64)>,
}

impl BudgetTracker {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store, debit_lock: tokio::sync::Mutex::new(()), cost_overrides: HashMap::new() }
    }

    pub fn with_cost_overrides(store: Arc<dyn DocumentStore>, cost_overrides: HashMap<String, (f64, f64)>) -> Self {
        Self { store, debit_lock: tokio::sync::Mutex::new(()), cost_overrides }
    }

    fn cost_for(&self, model: &str, tokens_in: u64, tokens_out: u64) -> f64 {
        match self.cost_overrides.get(model) {
            Some(&(input_per_1k, output_per_1k)) => {
                (tokens_in as f64 / 1000.0) * input_per_1k + (tokens_out as f64 / 1000.0) * output_per_1k
            }
            None => estimate_cost(model, tokens_in, tokens_out),
        }
    }

    /// `ok=true` if limit is null or `limit - spent - additional_cost >= 0`.
    pub async fn check(&self, scope: BudgetScope, scope_id: &str, additional_cost: f64) -> Result<(bool, f64), BudgetError> {
        let row = self.store.get_or_create_budget_row(scope, scope_id).await?;
        Ok(Self::evaluate(&row, additional_cost))
    }

    fn evaluate(row: &BudgetRow, additional_cost: f64) -> (bool, f64) {
        match row.budget_limit {
            None => (true, f64::INFINITY),
            Some(limit) => {
                let remaining = limit - row.total_spent - additional_cost;
                (remaining >= 0.0, remaining)
            }
        }
    }

    /// Compute cost, atomically debit execution, project (if non-null), and
    /// global ledgers, and return the composite post-debit `ok`.
    pub async fn record_execution_usage(
        &self,
        execution_id: &str,
        project_id: Option<&str>,
        model: &str,
        tokens_in: u64,
        tokens_out: u64,
    ) -> Result<UsageRecord, BudgetError> {
        let cost = self.cost_for(model, tokens_in, tokens_out);
        let _guard = self.debit_lock.lock().await;

        let exec_row = self.debit(BudgetScope::Execution, execution_id, cost, tokens_in, tokens_out).await?;
        let project_row = match project_id {
            Some(pid) => Some(self.debit(BudgetScope::Project, pid, cost, tokens_in, tokens_out).await?),
            None => None,
        };
        let global_row = self.debit(BudgetScope::Global, "global", cost, tokens_in, tokens_out).await?;

        let ok = Self::evaluate(&exec_row, 0.0).0
            && project_row.as_ref().map_or(true, |r| Self::evaluate(r, 0.0).0)
            && Self::evaluate(&global_row, 0.0).0;

        if ok {
            debug!(execution_id, cost_usd = cost, tokens_in, tokens_out, "budget debited");
        } else {
            warn!(execution_id, cost_usd = cost, "budget debit pushed a scope over its limit");
        }

        Ok(UsageRecord { cost_usd: cost, ok })
    }

    async fn debit(&self, scope: BudgetScope, scope_id: &str, cost: f64, tokens_in: u64, tokens_out: u64) -> Result<BudgetRow, BudgetError> {
        Ok(self.store.increment_budget_row(scope, scope_id, cost, tokens_in, tokens_out).await?)
    }

    pub async fn set_limit(&self, scope: BudgetScope, scope_id: &str, limit: Option<f64>) -> Result<(), BudgetError> {
        self.store.set_budget_limit(scope, scope_id, limit).await?;
        Ok(())
    }

    pub async fn summary(&self, scope: BudgetScope, scope_id: &str) -> Result<BudgetSummary, BudgetError> {
        let row = self.store.get_or_create_budget_row(scope, scope_id).await?;
        let (_, remaining) = Self::evaluate(&row, 0.0);
        Ok(BudgetSummary {
            total_spent: row.total_spent,
            budget_limit: row.budget_limit,
            remaining,
            tokens_input: row.token_count_input,
            tokens_output: row.token_count_output,
            total_tokens: row.token_count_input + row.token_count_output,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BudgetSummary {
    pub total_spent: f64,
    pub budget_limit: Option<f64>,
    pub remaining: f64,
    pub tokens_input: u64,
    pub tokens_output: u64,
    pub total_tokens: u64,
}
