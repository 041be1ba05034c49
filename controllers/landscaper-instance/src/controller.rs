//! Controller runtime glue
//!
//! Runs `kube_runtime::Controller` over LandscaperInstances. The runtime
//! serializes attempts per instance and requeues them; this module maps
//! reconcile outcomes to actions, records metrics and keeps the per-instance
//! error counts the Fibonacci backoff is derived from. Counts are dropped on
//! success and when the instance is gone.

use crate::backoff::FibonacciBackoff;
use crate::error::ControllerError;
use crate::metrics::{Metrics, ReconcileResult};
use crate::reconciler::{ReconcileOutcome, Reconciler, instance_key};
use crds::LandscaperInstance;
use futures::StreamExt;
use kube::{Api, ResourceExt};
use kube_runtime::controller::{self, Action, Config as ControllerConfig};
use kube_runtime::{Controller, watcher};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{Instrument, debug, error, info, info_span, warn};

/// Shared state of all reconcile attempts
#[derive(Debug)]
pub struct Context {
    reconciler: Reconciler,
    metrics: Arc<Metrics>,
    backoff: FibonacciBackoff,
    error_counts: Mutex<HashMap<String, u32>>,
}

impl Context {
    pub fn new(reconciler: Reconciler, metrics: Arc<Metrics>) -> Self {
        Self {
            reconciler,
            metrics,
            backoff: FibonacciBackoff::default(),
            error_counts: Mutex::new(HashMap::new()),
        }
    }

    fn error_counts(&self) -> MutexGuard<'_, HashMap<String, u32>> {
        self.error_counts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Counts one more consecutive failure of `key` and returns the retry delay.
    fn record_error(&self, key: &str) -> Duration {
        let mut counts = self.error_counts();
        let count = counts.entry(key.to_string()).or_insert(0);
        *count += 1;
        self.backoff.delay(*count)
    }

    fn reset_errors(&self, key: &str) {
        self.error_counts().remove(key);
    }

    /// Consecutive failures of `key` so far
    pub fn error_count(&self, key: &str) -> u32 {
        self.error_counts().get(key).copied().unwrap_or(0)
    }
}

fn action_for(outcome: ReconcileOutcome) -> Action {
    match outcome {
        ReconcileOutcome::Done => Action::await_change(),
        ReconcileOutcome::RequeueAfter(delay) => Action::requeue(delay),
    }
}

async fn reconcile(instance: Arc<LandscaperInstance>, ctx: Arc<Context>) -> Result<Action, ControllerError> {
    let key = instance_key(&instance);
    let span = info_span!("reconcile", instance = %key);

    async move {
        let started = Instant::now();
        let namespace = instance.namespace().unwrap_or_default();
        let result = ctx.reconciler.reconcile(&namespace, &instance.name_any()).await;

        let label = match &result {
            Ok(ReconcileOutcome::Done) => ReconcileResult::Done,
            Ok(ReconcileOutcome::RequeueAfter(_)) => ReconcileResult::Requeue,
            Err(_) => ReconcileResult::Error,
        };
        ctx.metrics.observe(label, started.elapsed());

        let outcome = result?;
        ctx.reset_errors(&key);
        debug!("Reconciliation finished: {:?}", outcome);
        Ok(action_for(outcome))
    }
    .instrument(span)
    .await
}

fn error_policy(instance: Arc<LandscaperInstance>, error: &ControllerError, ctx: Arc<Context>) -> Action {
    let key = instance_key(&instance);
    let delay = ctx.record_error(&key);
    warn!(
        "Reconciliation of LandscaperInstance {} failed (attempt {}), retrying in {:?}: {}",
        key,
        ctx.error_count(&key),
        delay,
        error
    );
    Action::requeue(delay)
}

/// Drops the error count of an instance the runtime no longer knows about.
fn forget_missing<T, E: 'static, Q: 'static>(ctx: &Context, result: &Result<T, controller::Error<E, Q>>) {
    if let Err(controller::Error::ObjectNotFound(object)) = result {
        let key = format!("{}/{}", object.namespace.as_deref().unwrap_or_default(), object.name);
        debug!("LandscaperInstance {} is gone, forgetting its failures", key);
        ctx.reset_errors(&key);
    }
}

fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(object) => debug!(?object, "{} reconciliation completed", controller_name),
            Err(e) => error!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}

/// Watches `api` and reconciles every LandscaperInstance until a shutdown signal arrives.
pub async fn run(api: Api<LandscaperInstance>, ctx: Arc<Context>) {
    info!("Starting LandscaperInstance controller");

    let log = log_reconcile_result("LandscaperInstance");
    Controller::new(api, watcher::Config::default())
        .with_config(ControllerConfig::default().debounce(Duration::from_secs(1)))
        .shutdown_on_signal()
        .run(reconcile, error_policy, Arc::clone(&ctx))
        .for_each(|result| {
            forget_missing(&ctx, &result);
            log(result)
        })
        .await;

    info!("LandscaperInstance controller stopped");
}
