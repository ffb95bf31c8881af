use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use crate::plugin_system::dependency::DependencyError;
use crate::plugin_system::error::PluginSystemError;
use crate::plugin_system::traits::{Plugin, PluginStatus};

/// Table of loaded plugins plus their statuses and load order.
///
/// Not internally locked; the manager guards it with its own mutex.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: HashMap<String, Arc<dyn Plugin>>,
    status: HashMap<String, PluginStatus>,
    load_order: Vec<String>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a loaded plugin. Re-registering an id without unloading first
    /// is rejected.
    pub fn register(&mut self, id: &str, plugin: Arc<dyn Plugin>) -> Result<(), PluginSystemError> {
        if self.plugins.contains_key(id) {
            return Err(PluginSystemError::DuplicatePlugin(id.to_string()));
        }
        self.plugins.insert(id.to_string(), plugin);
        self.status.insert(id.to_string(), PluginStatus::Loaded);
        self.load_order.push(id.to_string());
        Ok(())
    }

    /// Remove a plugin, returning it for final cleanup.
    pub fn remove(&mut self, id: &str) -> Result<Arc<dyn Plugin>, PluginSystemError> {
        let plugin = self
            .plugins
            .remove(id)
            .ok_or_else(|| PluginSystemError::PluginNotFound(id.to_string()))?;
        self.status.insert(id.to_string(), PluginStatus::Unloaded);
        self.load_order.retain(|entry| entry != id);
        Ok(plugin)
    }

    pub fn has(&self, id: &str) -> bool {
        self.plugins.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Plugin>> {
        self.plugins.get(id).cloned()
    }

    pub fn set_status(&mut self, id: &str, status: PluginStatus) {
        self.status.insert(id.to_string(), status);
    }

    pub fn status_of(&self, id: &str) -> Option<PluginStatus> {
        self.status.get(id).copied()
    }

    /// Loaded plugin ids, in load order.
    pub fn loaded_ids(&self) -> Vec<String> {
        self.load_order.clone()
    }

    /// Ids currently in the active state.
    pub fn active_ids(&self) -> Vec<String> {
        self.load_order
            .iter()
            .filter(|id| self.status.get(*id) == Some(&PluginStatus::Active))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

/// Order candidates so every plugin loads after its plugin-kind dependencies
/// (Kahn's algorithm). Edges outside the candidate set are ignored; the
/// validator has already vetted those against the loaded table.
///
/// `candidates` maps plugin id -> declared plugin dependencies, and
/// `discovery_order` fixes the tie-break between unordered plugins.
pub fn topological_order(
    candidates: &HashMap<String, Vec<String>>,
    discovery_order: &[String],
) -> Result<Vec<String>, DependencyError> {
    let ids: HashSet<&String> = candidates.keys().collect();

    // in-degree = number of in-set dependencies; reverse edges find dependents.
    let mut in_degree: HashMap<&String, usize> = HashMap::new();
    let mut dependents: HashMap<&String, Vec<&String>> = HashMap::new();
    for id in discovery_order {
        in_degree.entry(id).or_insert(0);
    }
    for (id, deps) in candidates {
        for dep in deps {
            if ids.contains(dep) {
                *in_degree.entry(id).or_insert(0) += 1;
                dependents.entry(dep).or_default().push(id);
            }
        }
    }

    let mut queue: VecDeque<&String> = discovery_order
        .iter()
        .filter(|id| in_degree.get(*id) == Some(&0))
        .collect();
    let mut sorted = Vec::with_capacity(candidates.len());

    while let Some(id) = queue.pop_front() {
        sorted.push(id.clone());
        if let Some(deps) = dependents.get(id) {
            for dependent in deps {
                if let Some(degree) = in_degree.get_mut(*dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(*dependent);
                    }
                }
            }
        }
    }

    if sorted.len() == candidates.len() {
        Ok(sorted)
    } else {
        // Anything not sorted sits on a cycle.
        let cycle_nodes: Vec<String> = discovery_order
            .iter()
            .filter(|id| !sorted.contains(id))
            .cloned()
            .collect();
        Err(DependencyError::CyclicDependency(cycle_nodes))
    }
}
