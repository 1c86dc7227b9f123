//! Persistent graph: the dependency graph recorded from the last run
//!
//! Comparing it with the declared graph tells which stacks were removed
//! from configuration and must be destroyed.

use std::collections::BTreeSet;
use std::sync::Arc;

use stackgraph::{Graph, GraphDict, SharedAction, Step};

use crate::backend::{ObjectStore, Tags};
use crate::error::{Error, Result};
use crate::location::GraphLocation;
use crate::lock::{LOCK_TAG, LockManager};

/// Steps to add to and remove from the persistent graph
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// Declared but never recorded
    pub to_add: BTreeSet<String>,
    /// Recorded but no longer declared; these get destroyed
    pub to_remove: BTreeSet<String>,
}

impl Reconciliation {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// Compare the declared graph with the persistent one by step name
pub fn reconcile(declared: &Graph, persisted: &Graph) -> Reconciliation {
    let declared_names: BTreeSet<&str> = declared.step_names().into_iter().collect();
    let persisted_names: BTreeSet<&str> = persisted.step_names().into_iter().collect();

    Reconciliation {
        to_add: declared_names
            .difference(&persisted_names)
            .map(|s| (*s).to_string())
            .collect(),
        to_remove: persisted_names
            .difference(&declared_names)
            .map(|s| (*s).to_string())
            .collect(),
    }
}

/// Add removed steps to a deploy graph so they are destroyed in it.
///
/// Each removed step runs `destroy`. Edges come from the persistent graph,
/// reversed so dependents are destroyed before their dependencies; edges to
/// steps that are still declared are dropped.
pub fn schedule_removals(
    graph: &mut Graph,
    persisted: &Graph,
    to_remove: &BTreeSet<String>,
    destroy: &SharedAction,
) -> Result<()> {
    for name in to_remove {
        graph.add_step(Step::new(name.clone()).with_action(Arc::clone(destroy)))?;
    }
    for name in to_remove {
        let dependents = persisted
            .required_by(name)
            .into_iter()
            .filter(|dependent| to_remove.contains(dependent));
        graph.add_dependencies(name, dependents)?;
    }
    Ok(())
}

/// Add removed steps to a graph walked in reverse (a destroy run).
///
/// The walk already runs dependents first, so the persistent graph's
/// edges are kept as they are, including edges to declared steps.
pub fn include_removals(
    graph: &mut Graph,
    persisted: &Graph,
    to_remove: &BTreeSet<String>,
    destroy: &SharedAction,
) -> Result<()> {
    for name in to_remove {
        graph.add_step(Step::new(name.clone()).with_action(Arc::clone(destroy)))?;
    }
    for name in to_remove {
        let dependencies: Vec<String> = persisted
            .requires(name)
            .into_iter()
            .filter(|dep| graph.contains(dep))
            .collect();
        graph.add_dependencies(name, dependencies)?;
    }
    Ok(())
}

/// Reads and writes one namespace's persistent graph
pub struct PersistentGraphStore {
    store: Arc<dyn ObjectStore>,
    location: GraphLocation,
    locks: LockManager,
}

impl PersistentGraphStore {
    pub fn new(store: Arc<dyn ObjectStore>, location: GraphLocation) -> Self {
        let locks = LockManager::new(Arc::clone(&store));
        Self {
            store,
            location,
            locks,
        }
    }

    pub fn location(&self) -> &GraphLocation {
        &self.location
    }

    pub fn lock_manager(&self) -> &LockManager {
        &self.locks
    }

    /// Fetch the persistent graph.
    ///
    /// A missing object is created empty so it can be locked; the result is
    /// then an empty graph.
    pub fn load(&self) -> Result<Graph> {
        let bucket = self.location.bucket();
        let key = self.location.key();

        let body = match self.store.get_object(bucket, key) {
            Ok(body) => body,
            Err(err) if err.is_not_found() => {
                log::info!("persistent graph {} not found, creating it", self.location);
                self.store.put_object(bucket, key, b"{}", &Tags::new())?;
                return Ok(Graph::new());
            }
            Err(err) => return Err(err),
        };

        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Graph::new());
        }
        let dict: GraphDict = serde_json::from_slice(&body)?;
        let graph = Graph::from_dict(&dict)?;
        log::debug!(
            "loaded persistent graph {} with {} step(s)",
            self.location,
            graph.len()
        );
        Ok(graph)
    }

    /// Write `graph`, which requires holding the lock under `lock_code`.
    ///
    /// An empty graph deletes the object instead.
    pub fn save(&self, graph: &Graph, lock_code: &str) -> Result<()> {
        match self.locks.lock_code(&self.location)? {
            None => {
                return Err(Error::PersistentGraphUnlocked {
                    location: self.location.to_string(),
                });
            }
            Some(held) if held != lock_code => {
                return Err(Error::PersistentGraphLockCodeMismatch {
                    location: self.location.to_string(),
                    held,
                    provided: lock_code.to_string(),
                });
            }
            Some(_) => {}
        }

        let bucket = self.location.bucket();
        let key = self.location.key();
        if graph.is_empty() {
            log::info!("persistent graph {} is empty, removing it", self.location);
            return self.store.delete_object(bucket, key);
        }

        let mut tags = self.store.get_tagging(bucket, key)?;
        tags.insert(LOCK_TAG.to_string(), lock_code.to_string());
        let body = graph.dumps(false)?;
        self.store.put_object(bucket, key, body.as_bytes(), &tags)?;
        log::debug!("saved persistent graph {} ({} step(s))", self.location, graph.len());
        Ok(())
    }
}
