//! Fixture definitions
//!
//! A fixture is a named, typed test resource: a setup procedure over its
//! already-resolved dependencies, an optional teardown registered by that
//! setup, and a [`Scope`] deciding whether an instance lives for one test
//! or for the whole worker.
//!
//! ```text
//! FixtureGraph::builder()          registration, validated by build()
//!   .register(FixtureDef)          name + scope + deps + setup
//!   .build()? -> FixtureGraph      cycles / unknown deps / scope mismatch
//!
//! Worker::new(graph)               worker-scope cache
//!   .run(names, body)              resolve -> body -> teardown (reverse)
//!   .shutdown()                    worker-scope teardown (reverse)
//! ```

use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{E2eError, E2eResult};

pub mod catalog;
pub mod graph;
pub mod worker;

pub use graph::{FixtureGraph, FixtureGraphBuilder};
pub use worker::{ResolvedSet, TeardownFailure, TeardownReport, Worker};

/// Type-erased fixture instance
pub type FixtureValue = Arc<dyn Any + Send + Sync>;

pub(crate) type TeardownFn = Box<dyn FnOnce() -> BoxFuture<'static, E2eResult<()>> + Send>;

/// Compensating actions registered while a setup is still running
pub(crate) type Deferred = Arc<Mutex<Vec<TeardownFn>>>;

type SetupOutput = (FixtureValue, Option<TeardownFn>);
pub(crate) type SetupFn =
    Arc<dyn Fn(Fixtures) -> BoxFuture<'static, E2eResult<SetupOutput>> + Send + Sync>;

/// Name of a fixture together with the type of value it yields
pub struct FixtureKey<T> {
    name: &'static str,
    _value: PhantomData<fn() -> T>,
}

impl<T> FixtureKey<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _value: PhantomData,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for FixtureKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for FixtureKey<T> {}

impl<T> fmt::Debug for FixtureKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FixtureKey({})", self.name)
    }
}

/// Lifetime boundary of a fixture instance
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Constructed for, and torn down after, each requesting test
    #[default]
    Test,
    /// Constructed once per worker and torn down at worker shutdown
    Worker,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Test => write!(f, "test"),
            Scope::Worker => write!(f, "worker"),
        }
    }
}

/// Value produced by a setup procedure, plus its compensating action
pub struct Fixture<T> {
    value: T,
    teardown: Option<TeardownFn>,
}

impl<T> Fixture<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            teardown: None,
        }
    }

    /// Register the action that reverses this fixture's side effects
    ///
    /// It runs after every dependent fixture has been torn down, whatever
    /// the test outcome was.
    pub fn with_teardown<F, Fut>(mut self, teardown: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = E2eResult<()>> + Send + 'static,
    {
        self.teardown = Some(Box::new(move || Box::pin(teardown())));
        self
    }
}

/// Resolved fixture instances visible to a setup procedure or test body
#[derive(Clone, Default)]
pub struct Fixtures {
    values: HashMap<&'static str, FixtureValue>,
    deferred: Option<Deferred>,
}

impl Fixtures {
    pub(crate) fn insert(&mut self, name: &'static str, value: FixtureValue) {
        self.values.insert(name, value);
    }

    pub(crate) fn subset(&self, names: &[&'static str]) -> Self {
        let values = names
            .iter()
            .filter_map(|n| self.values.get(n).map(|v| (*n, v.clone())))
            .collect();
        Self {
            values,
            deferred: None,
        }
    }

    pub(crate) fn with_deferred(mut self, deferred: Deferred) -> Self {
        self.deferred = Some(deferred);
        self
    }

    /// Register a compensating action before causing the side effect it reverses
    ///
    /// Only setup procedures may call this. The action joins the fixture's
    /// teardown when the setup succeeds. When the setup fails, panics or
    /// runs out of time, it runs before the error is reported. It must
    /// tolerate the side effect never having happened.
    pub fn defer_teardown<F, Fut>(&self, teardown: F) -> E2eResult<()>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = E2eResult<()>> + Send + 'static,
    {
        let deferred = self.deferred.as_ref().ok_or_else(|| {
            E2eError::Configuration("teardowns can only be deferred during setup".to_string())
        })?;
        deferred.lock().push(Box::new(move || Box::pin(teardown())));
        Ok(())
    }

    /// Instance of a requested (or declared) fixture
    pub fn get<T: Send + Sync + 'static>(&self, key: FixtureKey<T>) -> E2eResult<Arc<T>> {
        let value = self.values.get(key.name()).ok_or_else(|| {
            E2eError::Configuration(format!(
                "fixture `{}` was neither requested nor declared as a dependency",
                key.name()
            ))
        })?;
        value.clone().downcast::<T>().map_err(|_| {
            E2eError::Configuration(format!(
                "fixture `{}` does not hold a {}",
                key.name(),
                std::any::type_name::<T>()
            ))
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.values.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for Fixtures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.values.keys().collect();
        names.sort();
        f.debug_struct("Fixtures").field("names", &names).finish()
    }
}

/// Registration of one fixture
pub struct FixtureDef {
    pub(crate) name: &'static str,
    pub(crate) scope: Scope,
    pub(crate) deps: Vec<&'static str>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) setup: SetupFn,
}

impl FixtureDef {
    /// Define `key` with the given setup procedure
    ///
    /// The setup only sees the fixtures declared with [`depends_on`](Self::depends_on).
    pub fn new<T, F, Fut>(key: FixtureKey<T>, setup: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(Fixtures) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = E2eResult<Fixture<T>>> + Send + 'static,
    {
        let setup: SetupFn = Arc::new(move |deps| {
            let fut = setup(deps);
            Box::pin(async move {
                let fixture = fut.await?;
                let value: FixtureValue = Arc::new(fixture.value);
                Ok((value, fixture.teardown))
            })
        });

        Self {
            name: key.name(),
            scope: Scope::Test,
            deps: Vec::new(),
            timeout: None,
            setup,
        }
    }

    pub fn depends_on<U>(mut self, key: FixtureKey<U>) -> Self {
        if !self.deps.contains(&key.name()) {
            self.deps.push(key.name());
        }
        self
    }

    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn worker_scoped(self) -> Self {
        self.scope(Scope::Worker)
    }

    /// Bound for the whole setup procedure; defaults to the graph's
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn dependencies(&self) -> &[&'static str] {
        &self.deps
    }
}

impl fmt::Debug for FixtureDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixtureDef")
            .field("name", &self.name)
            .field("scope", &self.scope)
            .field("deps", &self.deps)
            .field("timeout", &self.timeout)
            .finish()
    }
}
