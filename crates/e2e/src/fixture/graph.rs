//! Static fixture graph: registration, validation and resolution plans

use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::debug;

use super::{FixtureDef, Scope};
use crate::error::{E2eError, E2eResult};

/// Collects fixture definitions; [`build`](Self::build) validates them
#[derive(Default)]
pub struct FixtureGraphBuilder {
    defs: Vec<FixtureDef>,
    setup_timeout: Option<Duration>,
    teardown_timeout: Option<Duration>,
}

impl FixtureGraphBuilder {
    pub fn register(mut self, def: FixtureDef) -> Self {
        self.defs.push(def);
        self
    }

    /// Default bound for fixtures without their own timeout
    pub fn setup_timeout(mut self, timeout: Duration) -> Self {
        self.setup_timeout = Some(timeout);
        self
    }

    /// Bound for each teardown action
    pub fn teardown_timeout(mut self, timeout: Duration) -> Self {
        self.teardown_timeout = Some(timeout);
        self
    }

    /// Validate the registrations and freeze them into a graph
    ///
    /// Fails with [`E2eError::Configuration`] on duplicate names, unknown
    /// dependencies, dependency cycles, or worker-scope fixtures depending
    /// on test-scope ones.
    pub fn build(self) -> E2eResult<FixtureGraph> {
        let mut defs: HashMap<&'static str, FixtureDef> = HashMap::new();
        let mut registration = Vec::with_capacity(self.defs.len());

        for def in self.defs {
            if defs.contains_key(def.name) {
                return Err(E2eError::Configuration(format!(
                    "fixture `{}` registered twice",
                    def.name
                )));
            }
            registration.push(def.name);
            defs.insert(def.name, def);
        }

        for name in &registration {
            let def = &defs[name];
            for dep in &def.deps {
                let Some(dep_def) = defs.get(dep) else {
                    return Err(E2eError::Configuration(format!(
                        "fixture `{}` depends on unregistered fixture `{}`",
                        name, dep
                    )));
                };
                if def.scope == Scope::Worker && dep_def.scope == Scope::Test {
                    return Err(E2eError::Configuration(format!(
                        "worker-scope fixture `{}` cannot depend on test-scope fixture `{}`",
                        name, dep
                    )));
                }
            }
        }

        let order = topological_order(&registration, &defs)?;
        debug!("Fixture graph built: {}", order.join(", "));

        Ok(FixtureGraph {
            defs,
            order,
            setup_timeout: self.setup_timeout,
            teardown_timeout: self.teardown_timeout,
        })
    }
}

/// Validated, immutable set of fixture definitions
pub struct FixtureGraph {
    defs: HashMap<&'static str, FixtureDef>,
    /// Every fixture after all of its dependencies
    order: Vec<&'static str>,
    setup_timeout: Option<Duration>,
    teardown_timeout: Option<Duration>,
}

impl FixtureGraph {
    pub fn builder() -> FixtureGraphBuilder {
        FixtureGraphBuilder::default()
    }

    pub(crate) fn def(&self, name: &str) -> Option<&FixtureDef> {
        self.defs.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.defs.contains_key(name)
    }

    pub fn scope_of(&self, name: &str) -> Option<Scope> {
        self.defs.get(name).map(|d| d.scope)
    }

    /// Names of all worker-scope fixtures
    pub fn worker_scoped(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.order
            .iter()
            .copied()
            .filter(|n| self.defs[n].scope == Scope::Worker)
    }

    pub(crate) fn setup_timeout_for(&self, def: &FixtureDef) -> Option<Duration> {
        def.timeout.or(self.setup_timeout)
    }

    pub(crate) fn teardown_timeout(&self) -> Option<Duration> {
        self.teardown_timeout
    }

    /// Construction order for the requested fixtures and everything they need
    pub fn plan(&self, requested: &[&str]) -> E2eResult<Vec<&'static str>> {
        let mut needed: HashSet<&'static str> = HashSet::new();
        let mut stack: Vec<&'static str> = Vec::new();

        for name in requested {
            let (static_name, _) = self.defs.get_key_value(*name).ok_or_else(|| {
                E2eError::Configuration(format!("requested unknown fixture `{}`", name))
            })?;
            stack.push(*static_name);
        }

        while let Some(name) = stack.pop() {
            if needed.insert(name) {
                stack.extend(self.defs[name].deps.iter().copied());
            }
        }

        Ok(self
            .order
            .iter()
            .copied()
            .filter(|n| needed.contains(n))
            .collect())
    }
}

/// Depth-first post-order over the registrations, rejecting cycles
fn topological_order(
    registration: &[&'static str],
    defs: &HashMap<&'static str, FixtureDef>,
) -> E2eResult<Vec<&'static str>> {
    let mut order = Vec::with_capacity(registration.len());
    let mut done = HashSet::new();
    let mut rec_stack = HashSet::new();
    let mut path = Vec::new();

    for name in registration {
        visit(*name, defs, &mut done, &mut rec_stack, &mut path, &mut order)?;
    }
    Ok(order)
}

fn visit(
    name: &'static str,
    defs: &HashMap<&'static str, FixtureDef>,
    done: &mut HashSet<&'static str>,
    rec_stack: &mut HashSet<&'static str>,
    path: &mut Vec<&'static str>,
    order: &mut Vec<&'static str>,
) -> E2eResult<()> {
    if done.contains(name) {
        return Ok(());
    }
    if rec_stack.contains(name) {
        let start = path.iter().position(|n| *n == name).unwrap_or(0);
        let mut cycle: Vec<&str> = path[start..].to_vec();
        cycle.push(name);
        return Err(E2eError::Configuration(format!(
            "fixture dependency cycle: {}",
            cycle.join(" -> ")
        )));
    }

    rec_stack.insert(name);
    path.push(name);
    for dep in &defs[name].deps {
        visit(*dep, defs, done, rec_stack, path, order)?;
    }
    path.pop();
    rec_stack.remove(name);

    done.insert(name);
    order.push(name);
    Ok(())
}
