//! Loop/concurrent driver (C12).
//!
//! Sequential `for`/`while` loops run in-process, reusing whatever
//! step-execution closure the scheduler supplies per iteration with
//! an isolated `StepLocal` overlay carrying the loop index. Parallel
//! fan-out is grounded on the teacher's async per-step execution
//! (`tokio::time::sleep`-based waiting in `execute_step_with_loop`),
//! generalized to a bounded worker pool: a `tokio::sync::Semaphore`
//! gates concurrently in-flight iterations rather than spawning one
//! unbounded task per row, per the explicit caution in the
//! concurrency model against unbounded parallelism.

use crate::model::LoopConfig;
use crate::predicate;
use crate::variables::{Layer, VariableStore};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::Instrument;

/// Runs `iteration` for each index the loop config implies,
/// reconciling results by iteration index (deterministic
/// last-writer-wins is meaningless here since each index owns a
/// disjoint slot in the returned vector).
pub async fn run<F, Fut, T>(
    config: &LoopConfig,
    base_vars: &VariableStore,
    max_concurrency: usize,
    mut iteration: F,
) -> Vec<T>
where
    F: FnMut(usize, VariableStore) -> Fut,
    Fut: std::future::Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let indices = resolve_indices(config, base_vars);

    if !config.parallel {
        let mut out = Vec::with_capacity(indices.len());
        for i in indices {
            let vars = overlay_for(config, base_vars, i);
            out.push(iteration(i, vars).await);
        }
        return out;
    }

    let semaphore = Arc::new(Semaphore::new(max_concurrency.max(1)));
    let mut join_set = tokio::task::JoinSet::new();
    // `tokio::spawn` does not inherit the caller's tracing span on its
    // own; carry it explicitly so events from each fanned-out
    // iteration are still attributed to the enclosing case (see
    // `log_capture.rs`).
    let parent_span = tracing::Span::current();
    for i in indices {
        let vars = overlay_for(config, base_vars, i);
        let permit = semaphore.clone().acquire_owned().await.expect("semaphore not closed");
        let fut = iteration(i, vars).instrument(parent_span.clone());
        join_set.spawn(async move {
            let result = fut.await;
            drop(permit);
            (i, result)
        });
    }

    let mut indexed = Vec::new();
    while let Some(res) = join_set.join_next().await {
        if let Ok(pair) = res {
            indexed.push(pair);
        }
    }
    indexed.sort_by_key(|(i, _)| *i);
    indexed.into_iter().map(|(_, r)| r).collect()
}

fn resolve_indices(config: &LoopConfig, _base_vars: &VariableStore) -> Vec<usize> {
    match config.kind.as_str() {
        "for" => (0..config.count as usize).collect(),
        "while" => {
            // `while` loops are driven by the scheduler re-checking
            // `until` between iterations rather than by a
            // precomputed index list; this driver still needs an
            // upper bound to avoid runaway loops, so `count` doubles
            // as a safety ceiling for while-kind loops.
            (0..config.count as usize).collect()
        }
        _ => (0..config.count as usize).collect(),
    }
}

fn overlay_for(config: &LoopConfig, base_vars: &VariableStore, index: usize) -> VariableStore {
    let mut vars = base_vars.clone();
    vars.set(Layer::StepLocal, config.index_variable.clone(), json!(index));
    vars
}

/// Whether a `while`-kind loop should keep going, per its `until`
/// predicate evaluated against the current variable view.
pub fn should_continue_while(config: &LoopConfig, vars: &VariableStore) -> bool {
    match &config.until {
        Some(expr) => predicate::evaluate(expr, vars).unwrap_or(false),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn for_config(count: u32, parallel: bool) -> LoopConfig {
        LoopConfig {
            kind: "for".into(),
            count,
            until: None,
            parallel,
            index_variable: "loop.index".into(),
        }
    }

    #[tokio::test]
    async fn sequential_loop_runs_in_order() {
        let config = for_config(3, false);
        let vars = VariableStore::new();
        let order = std::sync::Mutex::new(Vec::new());
        run(&config, &vars, 4, |i, _| {
            order.lock().unwrap().push(i);
            async move { i }
        })
        .await;
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn parallel_loop_preserves_logical_order_in_output() {
        let config = for_config(5, true);
        let vars = VariableStore::new();
        let results = run(&config, &vars, 2, |i, _| async move { i * 10 }).await;
        assert_eq!(results, vec![0, 10, 20, 30, 40]);
    }

    #[tokio::test]
    async fn parallel_loop_respects_concurrency_bound() {
        let config = for_config(6, true);
        let vars = VariableStore::new();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));
        run(&config, &vars, 2, {
            let in_flight = in_flight.clone();
            let max_seen = max_seen.clone();
            move |_, _| {
                let in_flight = in_flight.clone();
                let max_seen = max_seen.clone();
                async move {
                    let cur = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(cur, Ordering::SeqCst);
                    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                }
            }
        })
        .await;
        assert!(max_seen.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn each_iteration_overlay_exposes_its_own_index() {
        let config = for_config(3, false);
        let vars = VariableStore::new();
        let overlay = overlay_for(&config, &vars, 2);
        assert_eq!(overlay.get("loop.index"), Some(&json!(2)));
    }
}
