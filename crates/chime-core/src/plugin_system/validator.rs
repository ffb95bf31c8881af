use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, warn};
use tokio::sync::Mutex;

use crate::kernel::component::{ComponentStats, ManagerComponent};
use crate::kernel::constants;
use crate::kernel::error::Result;
use crate::plugin_system::dependency::{DependencyKind, PluginDependency};
use crate::plugin_system::manifest::PluginMetadata;
use crate::plugin_system::version::VersionRange;

/// The validator's verdict on a plugin's loadability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompatibilityLevel {
    Compatible,
    PartiallyCompatible,
    Incompatible,
    Unknown,
}

impl fmt::Display for CompatibilityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CompatibilityLevel::Compatible => "compatible",
            CompatibilityLevel::PartiallyCompatible => "partially-compatible",
            CompatibilityLevel::Incompatible => "incompatible",
            CompatibilityLevel::Unknown => "unknown",
        };
        write!(f, "{}", label)
    }
}

/// A dependency whose target exists at an unacceptable version.
#[derive(Debug, Clone)]
pub struct VersionConflict {
    pub dependency_name: String,
    pub kind: DependencyKind,
    pub required: String,
    pub available: String,
}

/// Outcome of validating one plugin's dependency list.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub plugin_id: String,
    pub valid: bool,
    pub compatibility: CompatibilityLevel,
    pub missing: Vec<PluginDependency>,
    pub conflicts: Vec<VersionConflict>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ValidationResult {
    fn new(plugin_id: &str) -> Self {
        Self {
            plugin_id: plugin_id.to_string(),
            valid: true,
            compatibility: CompatibilityLevel::Unknown,
            missing: Vec::new(),
            conflicts: Vec::new(),
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Any error or missing dependency is incompatible; conflicts or
    /// warnings alone degrade to partially-compatible.
    fn finalize(&mut self) {
        self.valid = self.errors.is_empty();
        self.compatibility = if !self.errors.is_empty() || !self.missing.is_empty() {
            CompatibilityLevel::Incompatible
        } else if !self.conflicts.is_empty() || !self.warnings.is_empty() {
            CompatibilityLevel::PartiallyCompatible
        } else {
            CompatibilityLevel::Compatible
        };
    }

    pub fn error_summary(&self) -> String {
        self.errors.join("; ")
    }
}

/// Notification emitted after each validation run.
#[derive(Debug, Clone)]
pub enum ValidationNotice {
    Completed { plugin_id: String, valid: bool },
    Failed { plugin_id: String, errors: String },
}

/// Identifier for a registered validation observer.
pub type ObserverId = u64;

/// Callback invoked with each validation notice.
pub type ValidationObserver = Arc<dyn Fn(&ValidationNotice) + Send + Sync>;

/// Host capabilities available as `system` dependency targets.
#[derive(Debug, Clone, Default)]
pub struct SystemCapabilities {
    values: HashMap<String, String>,
}

impl SystemCapabilities {
    pub fn new() -> Self {
        Self::default()
    }

    /// Detect the host environment: OS, architecture, app and API versions.
    ///
    /// Non-semver capabilities (os/arch) are recorded with a placeholder
    /// version and only support presence checks.
    pub fn detect() -> Self {
        let mut caps = Self::new();
        caps.insert(std::env::consts::OS, "0.0.0");
        caps.insert(std::env::consts::ARCH, "0.0.0");
        caps.insert("app", constants::APP_VERSION);
        caps.insert("plugin_api", constants::API_VERSION);
        caps
    }

    pub fn insert(&mut self, name: &str, version: &str) {
        self.values.insert(name.to_string(), version.to_string());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }
}

#[derive(Default)]
struct ValidatorState {
    /// Known plugin versions, id -> semver string
    known_plugins: HashMap<String, String>,
    /// Known service versions, name -> semver string
    known_services: HashMap<String, String>,
    /// Host capability table, populated at initialization
    system: SystemCapabilities,
    /// Packages resolvable in the host environment
    host_packages: HashSet<String>,
    /// Directed graph: plugin id -> its plugin-kind dependency ids
    graph: HashMap<String, Vec<String>>,
    /// Cache keyed by (plugin id, hash of the dependency name tuple)
    cache: HashMap<(String, u64), ValidationResult>,
    observers: Vec<(ObserverId, ValidationObserver)>,
    next_observer: ObserverId,
}

/// Decides whether a plugin's declared dependencies allow it to load.
///
/// The result cache is invalidated only by [`clear_cache`](Self::clear_cache);
/// registry changes do not invalidate it.
pub struct DependencyValidator {
    state: Mutex<ValidatorState>,
    stats: Arc<ComponentStats>,
    initialized: AtomicBool,
}

impl Default for DependencyValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl DependencyValidator {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ValidatorState::default()),
            stats: Arc::new(ComponentStats::new()),
            initialized: AtomicBool::new(false),
        }
    }

    pub fn stats(&self) -> &Arc<ComponentStats> {
        &self.stats
    }

    /// Record a plugin version as known (loaded or about to load).
    pub async fn register_plugin_version(&self, id: &str, version: &str) {
        let mut state = self.state.lock().await;
        state.known_plugins.insert(id.to_string(), version.to_string());
    }

    /// Forget a plugin and its outgoing graph edges.
    pub async fn unregister_plugin(&self, id: &str) {
        let mut state = self.state.lock().await;
        state.known_plugins.remove(id);
        state.graph.remove(id);
    }

    pub async fn register_service_version(&self, name: &str, version: &str) {
        let mut state = self.state.lock().await;
        state.known_services.insert(name.to_string(), version.to_string());
    }

    pub async fn unregister_service(&self, name: &str) {
        let mut state = self.state.lock().await;
        state.known_services.remove(name);
    }

    /// Declare a package resolvable in the host environment.
    pub async fn register_host_package(&self, name: &str) {
        let mut state = self.state.lock().await;
        state.host_packages.insert(name.to_string());
    }

    /// Seed the dependency graph with a plugin's declared edges ahead of
    /// validation, so cycles spanning a batch are visible from the first
    /// validation run.
    pub async fn record_plugin_dependencies(
        &self,
        plugin_id: &str,
        dependencies: &[PluginDependency],
    ) {
        let mut state = self.state.lock().await;
        let plugin_deps: Vec<String> = dependencies
            .iter()
            .filter(|d| d.kind == DependencyKind::Plugin)
            .map(|d| d.name.clone())
            .collect();
        state.graph.insert(plugin_id.to_string(), plugin_deps);
    }

    /// Register an observer for validation notices.
    pub async fn subscribe(&self, observer: ValidationObserver) -> ObserverId {
        let mut state = self.state.lock().await;
        state.next_observer += 1;
        let id = state.next_observer;
        state.observers.push((id, observer));
        id
    }

    pub async fn unsubscribe(&self, id: ObserverId) -> bool {
        let mut state = self.state.lock().await;
        let before = state.observers.len();
        state.observers.retain(|(obs_id, _)| *obs_id != id);
        state.observers.len() < before
    }

    /// Drop all cached validation results.
    pub async fn clear_cache(&self) {
        let mut state = self.state.lock().await;
        state.cache.clear();
    }

    /// Validate a plugin's dependency list against the known registries.
    pub async fn validate_dependencies(
        &self,
        plugin_id: &str,
        dependencies: &[PluginDependency],
    ) -> ValidationResult {
        self.stats.record_operation();
        let cache_key = (plugin_id.to_string(), hash_dependency_names(dependencies));

        let (result, observers) = {
            let mut state = self.state.lock().await;
            if let Some(cached) = state.cache.get(&cache_key) {
                self.stats.record_cache_hit();
                debug!("validation cache hit for plugin '{}'", plugin_id);
                return cached.clone();
            }
            self.stats.record_cache_miss();

            // Keep the graph current before looking for cycles.
            let plugin_deps: Vec<String> = dependencies
                .iter()
                .filter(|d| d.kind == DependencyKind::Plugin)
                .map(|d| d.name.clone())
                .collect();
            state.graph.insert(plugin_id.to_string(), plugin_deps);

            let mut result = ValidationResult::new(plugin_id);
            for dependency in dependencies {
                check_dependency(&state, dependency, &mut result);
            }

            if let Some(cycle) = find_cycle(&state.graph, plugin_id) {
                result
                    .errors
                    .push(format!("Circular dependency detected: {}", cycle.join(" -> ")));
            }

            result.finalize();
            if !result.valid {
                self.stats.record_error();
            }
            state.cache.insert(cache_key, result.clone());

            let observers: Vec<ValidationObserver> =
                state.observers.iter().map(|(_, obs)| obs.clone()).collect();
            (result, observers)
        };

        // Observers run outside the lock so they may call back in.
        let completed = ValidationNotice::Completed {
            plugin_id: plugin_id.to_string(),
            valid: result.valid,
        };
        for observer in &observers {
            observer(&completed);
        }
        if !result.valid {
            let failed = ValidationNotice::Failed {
                plugin_id: plugin_id.to_string(),
                errors: result.error_summary(),
            };
            for observer in &observers {
                observer(&failed);
            }
        }

        result
    }

    /// Validate a metadata record: its dependency list plus the app-version
    /// bounds. App gating applies to the returned copy only, so the cache
    /// stays keyed on the dependency set alone.
    pub async fn validate_metadata(&self, metadata: &PluginMetadata) -> ValidationResult {
        let mut result = self
            .validate_dependencies(&metadata.id, &metadata.dependencies)
            .await;

        check_app_bounds(metadata, &mut result);
        result.finalize();
        result
    }
}

impl fmt::Debug for DependencyValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependencyValidator").finish_non_exhaustive()
    }
}

#[async_trait]
impl ManagerComponent for DependencyValidator {
    fn name(&self) -> &'static str {
        "DependencyValidator"
    }

    async fn initialize(&self) -> Result<()> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let mut state = self.state.lock().await;
        state.system = SystemCapabilities::detect();
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        if !self.initialized.load(Ordering::SeqCst) {
            self.initialize().await?;
        }
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.clear_cache().await;
        Ok(())
    }
}

/// Hash of the dependency name tuple, order-sensitive.
fn hash_dependency_names(dependencies: &[PluginDependency]) -> u64 {
    let mut hasher = DefaultHasher::new();
    for dependency in dependencies {
        dependency.name.hash(&mut hasher);
    }
    hasher.finish()
}

fn check_dependency(state: &ValidatorState, dependency: &PluginDependency, result: &mut ValidationResult) {
    match dependency.kind {
        DependencyKind::Plugin => check_versioned(
            dependency,
            state.known_plugins.get(&dependency.name).map(String::as_str),
            result,
        ),
        DependencyKind::Service => check_versioned(
            dependency,
            state.known_services.get(&dependency.name).map(String::as_str),
            result,
        ),
        DependencyKind::System => {
            check_versioned(dependency, state.system.get(&dependency.name), result)
        }
        DependencyKind::ExternalPackage => {
            if state.host_packages.contains(&dependency.name) {
                result.warnings.push(format!(
                    "external package '{}' found; version not verified",
                    dependency.name
                ));
            } else if dependency.optional {
                result.warnings.push(format!(
                    "optional external package '{}' not found",
                    dependency.name
                ));
            } else {
                result.missing.push(dependency.clone());
                result
                    .errors
                    .push(format!("required external package '{}' not found", dependency.name));
            }
        }
        DependencyKind::RuntimeApi => {
            // Accepted unconditionally; API-surface checks are not implemented.
            result.warnings.push(format!(
                "runtime API dependency '{}' accepted without verification",
                dependency.name
            ));
        }
    }
}

fn check_versioned(
    dependency: &PluginDependency,
    available: Option<&str>,
    result: &mut ValidationResult,
) {
    match available {
        None => {
            if dependency.optional {
                result.warnings.push(format!(
                    "optional {} dependency '{}' not found",
                    dependency.kind, dependency.name
                ));
            } else {
                result.missing.push(dependency.clone());
                result.errors.push(format!(
                    "required {} dependency '{}' not found",
                    dependency.kind, dependency.name
                ));
            }
        }
        Some(version) => {
            if !dependency.is_satisfied_by(version) {
                let required = dependency
                    .version_range
                    .as_ref()
                    .map(|r| r.constraint_string().to_string())
                    .unwrap_or_else(|| "*".to_string());
                result.conflicts.push(VersionConflict {
                    dependency_name: dependency.name.clone(),
                    kind: dependency.kind,
                    required: required.clone(),
                    available: version.to_string(),
                });
                if dependency.optional {
                    result.warnings.push(format!(
                        "optional {} dependency '{}' at '{}' does not satisfy '{}'",
                        dependency.kind, dependency.name, version, required
                    ));
                } else {
                    result.errors.push(format!(
                        "{} dependency '{}' requires '{}' but found '{}'",
                        dependency.kind, dependency.name, required, version
                    ));
                }
            }
        }
    }
}

fn check_app_bounds(metadata: &PluginMetadata, result: &mut ValidationResult) {
    let app_version = constants::APP_VERSION;
    if let Some(min) = &metadata.min_app_version {
        if let Ok(range) = VersionRange::from_constraint(&format!(">={}", min)) {
            if !range.includes_str(app_version) {
                result.conflicts.push(VersionConflict {
                    dependency_name: "app".to_string(),
                    kind: DependencyKind::System,
                    required: format!(">={}", min),
                    available: app_version.to_string(),
                });
                result.errors.push(format!(
                    "plugin '{}' requires app version >={} but running {}",
                    metadata.id, min, app_version
                ));
            }
        } else {
            warn!(
                "plugin '{}' declares unparsable min_app_version '{}'",
                metadata.id, min
            );
            result
                .warnings
                .push(format!("unparsable min_app_version '{}'", min));
        }
    }
    if let Some(max) = &metadata.max_app_version {
        if let Ok(range) = VersionRange::from_constraint(&format!("<={}", max)) {
            if !range.includes_str(app_version) {
                result.conflicts.push(VersionConflict {
                    dependency_name: "app".to_string(),
                    kind: DependencyKind::System,
                    required: format!("<={}", max),
                    available: app_version.to_string(),
                });
                result.errors.push(format!(
                    "plugin '{}' requires app version <={} but running {}",
                    metadata.id, max, app_version
                ));
            }
        } else {
            warn!(
                "plugin '{}' declares unparsable max_app_version '{}'",
                metadata.id, max
            );
            result
                .warnings
                .push(format!("unparsable max_app_version '{}'", max));
        }
    }
}

/// Depth-first search from `start`; a back-edge into the recursion stack is a
/// cycle. Returns the cycle path when one exists.
fn find_cycle(graph: &HashMap<String, Vec<String>>, start: &str) -> Option<Vec<String>> {
    let mut visited = HashSet::new();
    let mut stack = Vec::new();
    dfs(graph, start, &mut visited, &mut stack)
}

fn dfs(
    graph: &HashMap<String, Vec<String>>,
    node: &str,
    visited: &mut HashSet<String>,
    stack: &mut Vec<String>,
) -> Option<Vec<String>> {
    if let Some(pos) = stack.iter().position(|n| n == node) {
        let mut cycle: Vec<String> = stack[pos..].to_vec();
        cycle.push(node.to_string());
        return Some(cycle);
    }
    if !visited.insert(node.to_string()) {
        return None;
    }
    stack.push(node.to_string());
    if let Some(neighbors) = graph.get(node) {
        for neighbor in neighbors {
            if let Some(cycle) = dfs(graph, neighbor, visited, stack) {
                return Some(cycle);
            }
        }
    }
    stack.pop();
    None
}
