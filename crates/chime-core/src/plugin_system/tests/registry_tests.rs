// crates/chime-core/src/plugin_system/tests/registry_tests.rs
#![cfg(test)]

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::plugin_system::error::PluginSystemError;
use crate::plugin_system::registry::{topological_order, PluginRegistry};
use crate::plugin_system::traits::{Plugin, PluginContext, PluginStatus};

#[derive(Debug)]
struct StubPlugin {
    id: String,
}

#[async_trait]
impl Plugin for StubPlugin {
    fn id(&self) -> &str {
        &self.id
    }
    async fn initialize(&self, _context: &PluginContext) -> Result<(), PluginSystemError> {
        Ok(())
    }
    async fn activate(&self) -> Result<(), PluginSystemError> {
        Ok(())
    }
    async fn deactivate(&self) -> Result<(), PluginSystemError> {
        Ok(())
    }
    async fn cleanup(&self) -> Result<(), PluginSystemError> {
        Ok(())
    }
}

fn stub(id: &str) -> Arc<dyn Plugin> {
    Arc::new(StubPlugin { id: id.to_string() })
}

#[test]
fn test_register_and_duplicate_rejection() {
    let mut registry = PluginRegistry::new();
    registry.register("weather", stub("weather")).unwrap();
    assert!(registry.has("weather"));
    assert_eq!(registry.status_of("weather"), Some(PluginStatus::Loaded));

    let err = registry.register("weather", stub("weather")).unwrap_err();
    assert!(matches!(err, PluginSystemError::DuplicatePlugin(_)));
}

#[test]
fn test_remove_updates_status_and_order() {
    let mut registry = PluginRegistry::new();
    registry.register("a", stub("a")).unwrap();
    registry.register("b", stub("b")).unwrap();
    assert_eq!(registry.loaded_ids(), vec!["a", "b"]);

    registry.remove("a").unwrap();
    assert_eq!(registry.loaded_ids(), vec!["b"]);
    assert_eq!(registry.status_of("a"), Some(PluginStatus::Unloaded));

    assert!(matches!(
        registry.remove("a"),
        Err(PluginSystemError::PluginNotFound(_))
    ));
}

#[test]
fn test_active_ids_follow_status() {
    let mut registry = PluginRegistry::new();
    registry.register("a", stub("a")).unwrap();
    registry.register("b", stub("b")).unwrap();
    registry.set_status("b", PluginStatus::Active);
    assert_eq!(registry.active_ids(), vec!["b"]);
}

fn graph(edges: &[(&str, &[&str])]) -> (HashMap<String, Vec<String>>, Vec<String>) {
    let mut map = HashMap::new();
    let mut order = Vec::new();
    for (id, deps) in edges {
        map.insert(
            id.to_string(),
            deps.iter().map(|d| d.to_string()).collect(),
        );
        order.push(id.to_string());
    }
    (map, order)
}

#[test]
fn test_topological_order_puts_dependencies_first() {
    let (candidates, discovery) = graph(&[
        ("dashboard", &["weather", "timetable"][..]),
        ("weather", &[][..]),
        ("timetable", &["weather"][..]),
    ]);
    let order = topological_order(&candidates, &discovery).unwrap();

    let pos = |id: &str| order.iter().position(|x| x == id).unwrap();
    assert!(pos("weather") < pos("timetable"));
    assert!(pos("timetable") < pos("dashboard"));
}

#[test]
fn test_topological_order_ignores_out_of_set_edges() {
    // "core" is already loaded, not part of this batch.
    let (candidates, discovery) = graph(&[("panel", &["core"][..])]);
    let order = topological_order(&candidates, &discovery).unwrap();
    assert_eq!(order, vec!["panel"]);
}

#[test]
fn test_topological_order_detects_cycles() {
    let (candidates, discovery) = graph(&[("a", &["b"][..]), ("b", &["a"][..])]);
    let err = topological_order(&candidates, &discovery).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("Circular dependency"), "got: {}", msg);
}

#[test]
fn test_topological_order_is_stable_for_independent_plugins() {
    let (candidates, discovery) = graph(&[
        ("c", &[][..]),
        ("a", &[][..]),
        ("b", &[][..]),
    ]);
    let order = topological_order(&candidates, &discovery).unwrap();
    // Discovery order is the tie-break.
    assert_eq!(order, vec!["c", "a", "b"]);
}
