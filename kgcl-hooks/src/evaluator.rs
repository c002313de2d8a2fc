//! Condition evaluation
//!
//! Evaluation is semantically synchronous over the store but exposed as an
//! awaitable so the controller can bound it with a timeout. The cache is
//! keyed by `(variant, canonical parameters, context digest)` and honors a
//! per-call TTL; timed-out evaluations are never cached.

use crate::conditions::{Aggregation, CompositeOp, Condition, ConditionResult, DeltaKind};
use crate::{HookError, HookResult};
use chrono::{DateTime, Utc};
use kgcl_store::{CoreShaclValidator, GraphStore, ShaclValidator};
use lru::LruCache;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::num::NonZeroUsize;

/// One timestamped measurement for window conditions
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Scalar state the evaluator reads alongside the graph
#[derive(Debug, Clone, Default)]
pub struct EvaluationContext {
    /// Current scalar variables (thresholds)
    pub variables: BTreeMap<String, f64>,
    /// Previous scalars, keyed by delta-condition query
    pub previous: BTreeMap<String, f64>,
    /// Time series per variable (windows)
    pub samples: BTreeMap<String, Vec<Sample>>,
    /// Evaluation instant for window cutoffs
    pub now: DateTime<Utc>,
}

impl EvaluationContext {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now,
            ..Self::default()
        }
    }

    /// Digest over the scalar state, part of every cache key
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for (k, v) in &self.variables {
            hasher.update(k.as_bytes());
            hasher.update(v.to_le_bytes());
        }
        for (k, v) in &self.previous {
            hasher.update(k.as_bytes());
            hasher.update(v.to_le_bytes());
        }
        for (k, series) in &self.samples {
            hasher.update(k.as_bytes());
            for s in series {
                hasher.update(s.timestamp.timestamp_millis().to_le_bytes());
                hasher.update(s.value.to_le_bytes());
            }
        }
        hex::encode(hasher.finalize())
    }
}

struct CacheEntry {
    result: ConditionResult,
    expires_at: DateTime<Utc>,
}

/// Evaluator with an LRU result cache
pub struct ConditionEvaluator {
    cache: Mutex<LruCache<String, CacheEntry>>,
    validator: Box<dyn ShaclValidator>,
    /// Bindings exposed in select-condition metadata
    max_bindings: usize,
}

impl ConditionEvaluator {
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
            validator: Box::new(CoreShaclValidator::new()),
            max_bindings: 100,
        }
    }

    pub fn with_validator(mut self, validator: Box<dyn ShaclValidator>) -> Self {
        self.validator = validator;
        self
    }

    /// Evaluate a condition, bounded by `timeout_s`
    pub async fn evaluate(
        &self,
        condition: &Condition,
        store: &GraphStore,
        ctx: &EvaluationContext,
        timeout_s: f64,
    ) -> HookResult<ConditionResult> {
        let work = async {
            // Yield first so a zero timeout is observable even though the
            // evaluation itself never awaits
            tokio::task::yield_now().await;
            self.eval_inner(condition, store, ctx)
        };
        match tokio::time::timeout(std::time::Duration::from_secs_f64(timeout_s), work).await {
            Ok(result) => result,
            Err(_) => Err(HookError::ConditionTimeout { timeout_s }),
        }
    }

    /// Evaluate with caching: a hit within `cache_ttl_s` skips evaluation
    pub async fn evaluate_cached(
        &self,
        condition: &Condition,
        store: &GraphStore,
        ctx: &EvaluationContext,
        timeout_s: f64,
        cache_ttl_s: u64,
    ) -> HookResult<ConditionResult> {
        let key = format!(
            "{}:{}:{}",
            condition.discriminant(),
            condition.canonical_params(),
            ctx.digest()
        );

        {
            let mut cache = self.cache.lock();
            if let Some(entry) = cache.get(&key) {
                if entry.expires_at > ctx.now {
                    return Ok(entry.result.clone());
                }
            }
        }

        let result = self.evaluate(condition, store, ctx, timeout_s).await?;

        let mut cache = self.cache.lock();
        cache.put(
            key,
            CacheEntry {
                result: result.clone(),
                expires_at: ctx.now + chrono::Duration::seconds(cache_ttl_s as i64),
            },
        );
        Ok(result)
    }

    fn eval_inner(
        &self,
        condition: &Condition,
        store: &GraphStore,
        ctx: &EvaluationContext,
    ) -> HookResult<ConditionResult> {
        match condition {
            Condition::SparqlAsk { query } => {
                let triggered = store.ask(query)?;
                Ok(ConditionResult::bare(triggered))
            }

            Condition::SparqlSelect { query, min_rows } => {
                let rows = store.select(query)?;
                let mut metadata = Map::new();
                metadata.insert("result_count".to_string(), json!(rows.len()));
                let bindings: Vec<Value> = rows
                    .iter()
                    .take(self.max_bindings)
                    .map(|r| json!(r))
                    .collect();
                metadata.insert("bindings".to_string(), Value::Array(bindings));
                Ok(ConditionResult {
                    triggered: rows.len() >= *min_rows,
                    metadata,
                })
            }

            Condition::Shacl { shapes } => {
                let report = self.validator.validate(store, shapes)?;
                let mut metadata = Map::new();
                metadata.insert(
                    "violations".to_string(),
                    serde_json::to_value(&report.violations).unwrap_or(Value::Null),
                );
                Ok(ConditionResult {
                    triggered: report.conforms,
                    metadata,
                })
            }

            Condition::Delta { query, kind } => {
                let current = store.select(query)?.len() as f64;
                let previous = ctx.previous.get(query).copied();
                let mut metadata = Map::new();
                metadata.insert("current".to_string(), json!(current));
                metadata.insert("previous".to_string(), json!(previous));

                let triggered = match previous {
                    None => false,
                    Some(prev) => {
                        let delta = current - prev;
                        metadata.insert("delta".to_string(), json!(delta));
                        match kind {
                            DeltaKind::Any => delta != 0.0,
                            DeltaKind::Increase => delta > 0.0,
                            DeltaKind::Decrease => delta < 0.0,
                        }
                    }
                };
                Ok(ConditionResult { triggered, metadata })
            }

            Condition::Threshold {
                variable,
                op,
                value,
            } => {
                let mut metadata = Map::new();
                let Some(actual) = ctx.variables.get(variable) else {
                    metadata.insert("missing_variable".to_string(), json!(variable));
                    return Ok(ConditionResult::not_triggered(metadata));
                };
                metadata.insert("value".to_string(), json!(actual));
                Ok(ConditionResult {
                    triggered: op.compare(*actual, *value),
                    metadata,
                })
            }

            Condition::Window {
                variable,
                window_seconds,
                aggregation,
                threshold,
                op,
            } => {
                let cutoff = ctx.now - chrono::Duration::seconds(*window_seconds as i64);
                let values: Vec<f64> = ctx
                    .samples
                    .get(variable)
                    .map(|series| {
                        series
                            .iter()
                            .filter(|s| s.timestamp >= cutoff)
                            .map(|s| s.value)
                            .collect()
                    })
                    .unwrap_or_default();

                let aggregated = aggregate(*aggregation, &values);
                let mut metadata = Map::new();
                metadata.insert("sample_count".to_string(), json!(values.len()));
                metadata.insert("aggregated".to_string(), json!(aggregated));
                Ok(ConditionResult {
                    triggered: op.compare(aggregated, *threshold),
                    metadata,
                })
            }

            Condition::Composite { op, children } => self.eval_composite(*op, children, store, ctx),
        }
    }

    fn eval_composite(
        &self,
        op: CompositeOp,
        children: &[Condition],
        store: &GraphStore,
        ctx: &EvaluationContext,
    ) -> HookResult<ConditionResult> {
        match op {
            CompositeOp::And => {
                for child in children {
                    let result = self.eval_inner(child, store, ctx)?;
                    if !result.triggered {
                        return Ok(ConditionResult::bare(false));
                    }
                }
                Ok(ConditionResult::bare(!children.is_empty()))
            }
            CompositeOp::Or => {
                for child in children {
                    let result = self.eval_inner(child, store, ctx)?;
                    if result.triggered {
                        return Ok(ConditionResult::bare(true));
                    }
                }
                Ok(ConditionResult::bare(false))
            }
            CompositeOp::Not => {
                let Some(child) = children.first() else {
                    return Err(HookError::Evaluation(
                        "Not condition requires exactly one child".to_string(),
                    ));
                };
                if children.len() != 1 {
                    return Err(HookError::Evaluation(
                        "Not condition requires exactly one child".to_string(),
                    ));
                }
                let result = self.eval_inner(child, store, ctx)?;
                Ok(ConditionResult {
                    triggered: !result.triggered,
                    metadata: result.metadata,
                })
            }
        }
    }
}

impl Default for ConditionEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

fn aggregate(aggregation: Aggregation, values: &[f64]) -> f64 {
    if values.is_empty() {
        return match aggregation {
            Aggregation::Count | Aggregation::Sum => 0.0,
            _ => f64::NAN,
        };
    }
    match aggregation {
        Aggregation::Sum => values.iter().sum(),
        Aggregation::Avg => values.iter().sum::<f64>() / values.len() as f64,
        Aggregation::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
        Aggregation::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        Aggregation::Count => values.len() as f64,
    }
}
