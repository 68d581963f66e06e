//! Fixture resolution, worker-scope caching and guaranteed teardown

use futures::FutureExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

use super::{
    Deferred, FixtureDef, FixtureGraph, FixtureKey, FixtureValue, Fixtures, Scope, TeardownFn,
};
use crate::error::{panic_message, E2eError, E2eResult};

/// One failed compensating action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeardownFailure {
    pub fixture: &'static str,
    pub reason: String,
}

/// Outcome of a teardown pass
///
/// Failures are collected here and logged; they never become the result
/// of the test that owned the fixtures.
#[derive(Debug, Default)]
pub struct TeardownReport {
    /// Fixtures whose teardown completed, in the order they ran
    pub completed: Vec<&'static str>,
    pub failures: Vec<TeardownFailure>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn into_errors(self) -> Vec<E2eError> {
        self.failures
            .into_iter()
            .map(|f| E2eError::Teardown {
                fixture: f.fixture.to_string(),
                reason: f.reason,
            })
            .collect()
    }
}

/// Fixtures resolved for one test invocation
///
/// Must be finished with [`teardown`](Self::teardown); dropping it with
/// pending teardowns skips them and logs an error.
pub struct ResolvedSet {
    fixtures: Fixtures,
    teardowns: Vec<(&'static str, TeardownFn)>,
    teardown_timeout: Option<Duration>,
}

impl ResolvedSet {
    fn new(teardown_timeout: Option<Duration>) -> Self {
        Self {
            fixtures: Fixtures::default(),
            teardowns: Vec::new(),
            teardown_timeout,
        }
    }

    pub fn fixtures(&self) -> &Fixtures {
        &self.fixtures
    }

    pub fn get<T: Send + Sync + 'static>(&self, key: FixtureKey<T>) -> E2eResult<Arc<T>> {
        self.fixtures.get(key)
    }

    /// Run the registered teardowns in reverse construction order
    pub async fn teardown(mut self) -> TeardownReport {
        let teardowns = std::mem::take(&mut self.teardowns);
        run_teardowns(teardowns, self.teardown_timeout).await
    }
}

impl std::fmt::Debug for ResolvedSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSet")
            .field("fixtures", &self.fixtures)
            .field("pending_teardowns", &self.teardowns.len())
            .finish()
    }
}

impl Drop for ResolvedSet {
    fn drop(&mut self) {
        if !self.teardowns.is_empty() {
            let names: Vec<_> = self.teardowns.iter().map(|(n, _)| *n).collect();
            error!(
                "Resolved fixtures dropped without teardown; skipped: {}",
                names.join(", ")
            );
        }
    }
}

/// Owner of worker-scope fixture instances
///
/// Test invocations may run concurrently on one worker; each gets its own
/// test-scope instances while worker-scope ones are built once and shared.
pub struct Worker {
    graph: Arc<FixtureGraph>,
    shared: HashMap<&'static str, Arc<OnceCell<FixtureValue>>>,
    shared_teardowns: Mutex<Vec<(&'static str, TeardownFn)>>,
    closed: AtomicBool,
}

impl Worker {
    pub fn new(graph: Arc<FixtureGraph>) -> Self {
        let shared = graph
            .worker_scoped()
            .map(|name| (name, Arc::new(OnceCell::new())))
            .collect();
        Self {
            graph,
            shared,
            shared_teardowns: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn graph(&self) -> &FixtureGraph {
        &self.graph
    }

    /// Construct the requested fixtures and their dependencies
    ///
    /// When a setup fails, the fixtures already constructed for this call
    /// are torn down before the error is returned.
    pub async fn resolve(&self, requested: &[&str]) -> E2eResult<ResolvedSet> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(E2eError::Configuration(
                "worker already shut down".to_string(),
            ));
        }

        let plan = self.graph.plan(requested)?;
        let mut resolved = ResolvedSet::new(self.graph.teardown_timeout());

        for name in plan {
            let def = self.graph.def(name).ok_or_else(|| {
                E2eError::Configuration(format!("fixture `{}` vanished from graph", name))
            })?;
            let deps = resolved.fixtures.subset(&def.deps);

            let outcome = match def.scope {
                Scope::Test => match self.construct(def, deps).await {
                    Ok((value, teardowns)) => {
                        resolved
                            .teardowns
                            .extend(teardowns.into_iter().map(|t| (name, t)));
                        Ok(value)
                    }
                    Err(e) => Err(e),
                },
                Scope::Worker => self.shared_instance(def, deps).await,
            };

            match outcome {
                Ok(value) => resolved.fixtures.insert(name, value),
                Err(e) => {
                    error!("Fixture `{}` setup failed: {}", name, e);
                    let report = resolved.teardown().await;
                    if !report.is_clean() {
                        warn!(
                            "{} teardown failure(s) while unwinding `{}`",
                            report.failures.len(),
                            name
                        );
                    }
                    return Err(E2eError::setup(name, e));
                }
            }
        }

        Ok(resolved)
    }

    /// Resolve, run `body`, then tear down whatever the body's outcome
    ///
    /// A panicking body is resumed after teardown; teardown failures are
    /// logged and never replace the body's result.
    pub async fn run<R, F, Fut>(&self, requested: &[&str], body: F) -> E2eResult<R>
    where
        F: FnOnce(Fixtures) -> Fut,
        Fut: Future<Output = E2eResult<R>>,
    {
        let resolved = self.resolve(requested).await?;
        let fixtures = resolved.fixtures().clone();

        let outcome = AssertUnwindSafe(async move { body(fixtures).await })
            .catch_unwind()
            .await;

        let report = resolved.teardown().await;
        if !report.is_clean() {
            warn!(
                "Ignoring {} teardown failure(s); test outcome is kept",
                report.failures.len()
            );
        }

        match outcome {
            Ok(result) => result,
            Err(payload) => std::panic::resume_unwind(payload),
        }
    }

    /// Tear down worker-scope fixtures in reverse construction order
    ///
    /// Later calls return an empty report, and later resolutions fail.
    pub async fn shutdown(&self) -> TeardownReport {
        if self.closed.swap(true, Ordering::SeqCst) {
            return TeardownReport::default();
        }
        let teardowns = std::mem::take(&mut *self.shared_teardowns.lock());
        info!("Shutting down worker ({} worker-scope teardown(s))", teardowns.len());
        run_teardowns(teardowns, self.graph.teardown_timeout()).await
    }

    /// Run one setup; its teardowns come back in construction order
    ///
    /// Actions the setup deferred before failing are run here, so a side
    /// effect caused before a timeout or panic is still reversed.
    async fn construct(
        &self,
        def: &FixtureDef,
        deps: Fixtures,
    ) -> E2eResult<(FixtureValue, Vec<TeardownFn>)> {
        debug!("Setting up {}-scope fixture `{}`", def.scope, def.name);
        let deferred = Deferred::default();
        let deps = deps.with_deferred(deferred.clone());
        let setup = AssertUnwindSafe(async { (def.setup)(deps).await }).catch_unwind();

        let outcome = match self.graph.setup_timeout_for(def) {
            Some(limit) => match tokio::time::timeout(limit, setup).await {
                Ok(caught) => caught,
                Err(_) => Ok(Err(E2eError::timeout(
                    format!("setup of fixture `{}`", def.name),
                    limit,
                ))),
            },
            None => setup.await,
        };
        let outcome = outcome
            .unwrap_or_else(|payload| Err(E2eError::Panic(panic_message(&*payload))));

        let mut teardowns = std::mem::take(&mut *deferred.lock());
        match outcome {
            Ok((value, teardown)) => {
                teardowns.extend(teardown);
                debug!("Fixture `{}` ready", def.name);
                Ok((value, teardowns))
            }
            Err(e) => {
                if !teardowns.is_empty() {
                    let named = teardowns.into_iter().map(|t| (def.name, t)).collect();
                    let report = run_teardowns(named, self.graph.teardown_timeout()).await;
                    if !report.is_clean() {
                        warn!(
                            "{} deferred teardown(s) of `{}` failed after its setup failed",
                            report.failures.len(),
                            def.name
                        );
                    }
                }
                Err(e)
            }
        }
    }

    async fn shared_instance(&self, def: &FixtureDef, deps: Fixtures) -> E2eResult<FixtureValue> {
        let cell = self.shared.get(def.name).cloned().ok_or_else(|| {
            E2eError::Configuration(format!("fixture `{}` is not worker-scoped", def.name))
        })?;

        let value = cell
            .get_or_try_init(|| async {
                let (value, teardowns) = self.construct(def, deps).await?;
                self.shared_teardowns
                    .lock()
                    .extend(teardowns.into_iter().map(|t| (def.name, t)));
                info!("Worker-scope fixture `{}` constructed", def.name);
                Ok::<_, E2eError>(value)
            })
            .await?;

        Ok(value.clone())
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        let pending = self.shared_teardowns.get_mut();
        if !self.closed.load(Ordering::SeqCst) && !pending.is_empty() {
            error!(
                "Worker dropped without shutdown; {} worker-scope teardown(s) skipped",
                pending.len()
            );
        }
    }
}

async fn run_teardowns(
    teardowns: Vec<(&'static str, TeardownFn)>,
    limit: Option<Duration>,
) -> TeardownReport {
    let mut report = TeardownReport::default();

    for (name, teardown) in teardowns.into_iter().rev() {
        debug!("Tearing down fixture `{}`", name);
        let action = AssertUnwindSafe(async move { teardown().await }).catch_unwind();

        let outcome = match limit {
            Some(limit) => match tokio::time::timeout(limit, action).await {
                Ok(caught) => caught,
                Err(_) => Ok(Err(E2eError::timeout(format!("teardown of `{}`", name), limit))),
            },
            None => action.await,
        };

        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(payload) => Some(format!("panicked: {}", panic_message(&*payload))),
        };

        match failure {
            None => report.completed.push(name),
            Some(reason) => {
                warn!("Teardown of fixture `{}` failed: {}", name, reason);
                report.failures.push(TeardownFailure {
                    fixture: name,
                    reason,
                });
            }
        }
    }

    report
}
