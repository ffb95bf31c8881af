use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info, warn};
use serde_json::json;
use tokio::sync::Mutex;

use crate::event::bus::CommunicationBus;
use crate::event::types::EventType;
use crate::kernel::component::{ComponentStats, ManagerComponent};
use crate::kernel::constants;
use crate::kernel::error::Result;
use crate::messaging::bus::MessageBus;
use crate::plugin_system::dependency::{DependencyError, DependencyKind};
use crate::plugin_system::error::PluginSystemError;
use crate::plugin_system::manifest::{self, PluginMetadata};
use crate::plugin_system::registry::{topological_order, PluginRegistry};
use crate::plugin_system::traits::{Plugin, PluginContext, PluginFactory, PluginStatus};
use crate::plugin_system::validator::{DependencyValidator, ValidationResult};
use crate::services::registry::ServiceRegistry;
use crate::storage::config::{ConfigCache, ConfigStore};

struct ManagerState {
    registry: PluginRegistry,
    metadata: HashMap<String, PluginMetadata>,
    validation: HashMap<String, ValidationResult>,
    factories: HashMap<String, Arc<dyn PluginFactory>>,
}

/// Orchestrates the full plugin lifecycle: discovery, metadata loading,
/// dependency validation, topologically-ordered instantiation, activation,
/// and unloading, wiring the validator, service registry, and both buses
/// together.
pub struct PluginManager {
    state: Mutex<ManagerState>,
    validator: Arc<DependencyValidator>,
    services: Arc<ServiceRegistry>,
    messages: Arc<MessageBus>,
    events: Arc<CommunicationBus>,
    config: Arc<dyn ConfigStore>,
    config_cache: Arc<ConfigCache>,
    stats: Arc<ComponentStats>,
    initialized: AtomicBool,
    running: AtomicBool,
}

impl PluginManager {
    pub fn new(config: Arc<dyn ConfigStore>) -> Self {
        let messages = Arc::new(MessageBus::new());
        let events = Arc::new(CommunicationBus::with_message_bus(Some(messages.clone())));
        Self {
            state: Mutex::new(ManagerState {
                registry: PluginRegistry::new(),
                metadata: HashMap::new(),
                validation: HashMap::new(),
                factories: HashMap::new(),
            }),
            validator: Arc::new(DependencyValidator::new()),
            services: Arc::new(ServiceRegistry::new()),
            messages,
            events,
            config_cache: Arc::new(ConfigCache::new(config.clone())),
            config,
            stats: Arc::new(ComponentStats::new()),
            initialized: AtomicBool::new(false),
            running: AtomicBool::new(false),
        }
    }

    // --- Sub-component accessors for privileged callers ---

    pub fn validator(&self) -> &Arc<DependencyValidator> {
        &self.validator
    }

    pub fn service_registry(&self) -> &Arc<ServiceRegistry> {
        &self.services
    }

    pub fn message_bus(&self) -> &Arc<MessageBus> {
        &self.messages
    }

    pub fn communication_bus(&self) -> &Arc<CommunicationBus> {
        &self.events
    }

    pub fn config_cache(&self) -> &Arc<ConfigCache> {
        &self.config_cache
    }

    pub fn stats(&self) -> &Arc<ComponentStats> {
        &self.stats
    }

    /// The handle bundle passed to plugins at initialization.
    pub fn context(&self) -> PluginContext {
        PluginContext {
            services: self.services.clone(),
            messages: self.messages.clone(),
            events: self.events.clone(),
            config: self.config.clone(),
        }
    }

    /// Register a static plugin factory, keyed by its entry point.
    pub async fn register_factory(&self, factory: Arc<dyn PluginFactory>) {
        let mut state = self.state.lock().await;
        let key = factory.entry_point().to_string();
        if state.factories.insert(key.clone(), factory).is_some() {
            warn!("replacing plugin factory for entry point '{}'", key);
        }
    }

    // --- Accessors ---

    pub async fn plugin(&self, id: &str) -> Option<Arc<dyn Plugin>> {
        let state = self.state.lock().await;
        state.registry.get(id)
    }

    pub async fn metadata_of(&self, id: &str) -> Option<PluginMetadata> {
        let state = self.state.lock().await;
        state.metadata.get(id).cloned()
    }

    pub async fn status_of(&self, id: &str) -> Option<PluginStatus> {
        let state = self.state.lock().await;
        state.registry.status_of(id)
    }

    pub async fn validation_result(&self, id: &str) -> Option<ValidationResult> {
        let state = self.state.lock().await;
        state.validation.get(id).cloned()
    }

    pub async fn loaded_plugin_ids(&self) -> Vec<String> {
        let state = self.state.lock().await;
        state.registry.loaded_ids()
    }

    pub async fn active_plugin_ids(&self) -> Vec<String> {
        let state = self.state.lock().await;
        state.registry.active_ids()
    }

    // --- Loading pipeline ---

    /// Find candidate manifest files under the given directories.
    async fn discover_manifests(&self, dirs: &[PathBuf]) -> Vec<PathBuf> {
        let mut found = Vec::new();
        for dir in dirs {
            let mut entries = match tokio::fs::read_dir(dir).await {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("cannot read plugin directory '{}': {}", dir.display(), e);
                    continue;
                }
            };
            loop {
                match entries.next_entry().await {
                    Ok(Some(entry)) => {
                        let manifest = entry.path().join(constants::MANIFEST_FILE_NAME);
                        if tokio::fs::metadata(&manifest).await.is_ok() {
                            found.push(manifest);
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!("error walking '{}': {}", dir.display(), e);
                        break;
                    }
                }
            }
        }
        found.sort();
        found
    }

    /// Discover, validate, and load every plugin under the given directories.
    ///
    /// Valid plugins load in dependency order; one plugin's failure never
    /// aborts the batch. Returns the ids that finished loading.
    pub async fn load_plugins(&self, dirs: &[PathBuf]) -> Result<Vec<String>> {
        self.stats.record_operation();
        let manifests = self.discover_manifests(dirs).await;
        debug!("discovered {} plugin manifests", manifests.len());

        // Phase 1: parse manifests, rejecting duplicates up front.
        let mut candidates: Vec<PluginMetadata> = Vec::new();
        for path in manifests {
            match manifest::load_manifest(&path).await {
                Ok(meta) => {
                    let duplicate = {
                        let state = self.state.lock().await;
                        state.registry.has(&meta.id)
                            || candidates.iter().any(|c| c.id == meta.id)
                    };
                    if duplicate {
                        warn!("skipping duplicate plugin id '{}'", meta.id);
                        self.stats.record_error();
                        continue;
                    }
                    let mut state = self.state.lock().await;
                    state
                        .registry
                        .set_status(&meta.id, PluginStatus::MetadataLoaded);
                    candidates.push(meta);
                }
                Err(e) => {
                    warn!("skipping plugin at '{}': {}", path.display(), e);
                    self.stats.record_error();
                }
            }
        }

        // Announce candidate versions and dependency edges up front so
        // same-batch dependencies resolve and batch-spanning cycles are
        // visible to every validation run.
        for meta in &candidates {
            self.validator
                .register_plugin_version(&meta.id, &meta.version)
                .await;
            self.validator
                .record_plugin_dependencies(&meta.id, &meta.dependencies)
                .await;
        }

        // Phase 2: dependency validation.
        let mut valid: Vec<PluginMetadata> = Vec::new();
        for meta in candidates {
            let result = self.validator.validate_metadata(&meta).await;
            let ok = result.valid;
            {
                let mut state = self.state.lock().await;
                state.metadata.insert(meta.id.clone(), meta.clone());
                state.validation.insert(meta.id.clone(), result.clone());
                let status = if ok {
                    PluginStatus::Validated
                } else {
                    PluginStatus::Failed
                };
                state.registry.set_status(&meta.id, status);
            }
            if ok {
                valid.push(meta);
            } else {
                warn!(
                    "plugin '{}' failed validation: {}",
                    meta.id,
                    result.error_summary()
                );
                self.validator.unregister_plugin(&meta.id).await;
                self.stats.record_error();
            }
        }

        // Phase 3: order by plugin-kind dependencies.
        let order = self.dependency_order(&valid).await;

        // Phase 4: instantiate and initialize, isolating failures.
        let auto_activate = self.config_cache.get_or("plugins.auto_activate", false);
        let mut loaded = Vec::new();
        for id in order {
            match self.load_validated(&id).await {
                Ok(()) => {
                    if auto_activate {
                        if let Err(e) = self.activate_plugin(&id).await {
                            warn!("auto-activation of '{}' failed: {}", id, e);
                        }
                    }
                    loaded.push(id);
                }
                Err(e) => {
                    warn!("failed to load plugin '{}': {}", id, e);
                    self.stats.record_error();
                }
            }
        }
        info!("loaded {} plugins", loaded.len());
        Ok(loaded)
    }

    /// Load a single plugin from its directory or manifest path, for
    /// on-demand installs.
    pub async fn load_plugin(&self, path: &Path) -> Result<String> {
        self.stats.record_operation();
        let manifest_path = if path.ends_with(constants::MANIFEST_FILE_NAME) {
            path.to_path_buf()
        } else {
            path.join(constants::MANIFEST_FILE_NAME)
        };
        let meta = manifest::load_manifest(&manifest_path).await?;
        let id = meta.id.clone();

        {
            let state = self.state.lock().await;
            if state.registry.has(&id) {
                return Err(PluginSystemError::DuplicatePlugin(id).into());
            }
        }

        self.validator
            .register_plugin_version(&id, &meta.version)
            .await;
        let result = self.validator.validate_metadata(&meta).await;
        let ok = result.valid;
        let details = result.error_summary();
        {
            let mut state = self.state.lock().await;
            state.metadata.insert(id.clone(), meta);
            state.validation.insert(id.clone(), result);
            let status = if ok {
                PluginStatus::Validated
            } else {
                PluginStatus::Failed
            };
            state.registry.set_status(&id, status);
        }
        if !ok {
            self.validator.unregister_plugin(&id).await;
            self.stats.record_error();
            return Err(PluginSystemError::ValidationFailed {
                plugin_id: id,
                details,
            }
            .into());
        }

        self.load_validated(&id).await?;
        Ok(id)
    }

    /// Topological order over the validated batch (Kahn's algorithm);
    /// discovery order breaks ties. Cycle members are dropped with an error
    /// logged; the validator has normally rejected them already.
    async fn dependency_order(&self, valid: &[PluginMetadata]) -> Vec<String> {
        let graph: HashMap<String, Vec<String>> = valid
            .iter()
            .map(|meta| {
                let deps = meta
                    .dependencies
                    .iter()
                    .filter(|d| d.kind == DependencyKind::Plugin)
                    .map(|d| d.name.clone())
                    .collect();
                (meta.id.clone(), deps)
            })
            .collect();
        let discovery_order: Vec<String> = valid.iter().map(|meta| meta.id.clone()).collect();

        match topological_order(&graph, &discovery_order) {
            Ok(order) => order,
            Err(DependencyError::CyclicDependency(nodes)) => {
                warn!(
                    "dependency cycle among plugins [{}]; skipping them",
                    nodes.join(", ")
                );
                let mut state = self.state.lock().await;
                for id in &nodes {
                    state.registry.set_status(id, PluginStatus::Failed);
                }
                discovery_order
                    .into_iter()
                    .filter(|id| !nodes.contains(id))
                    .collect()
            }
            Err(other) => {
                warn!("dependency ordering failed: {}", other);
                discovery_order
            }
        }
    }

    /// Instantiate a validated plugin and run its initialization.
    async fn load_validated(&self, id: &str) -> Result<()> {
        let meta = {
            let state = self.state.lock().await;
            state
                .metadata
                .get(id)
                .cloned()
                .ok_or_else(|| PluginSystemError::PluginNotFound(id.to_string()))?
        };
        let factory = {
            let state = self.state.lock().await;
            state.factories.get(&meta.entry_point).cloned()
        };
        let factory = match factory {
            Some(factory) => factory,
            None => {
                let e = PluginSystemError::FactoryNotFound {
                    plugin_id: id.to_string(),
                    entry_point: meta.entry_point.clone(),
                };
                self.mark_failed(id).await;
                self.validator.unregister_plugin(id).await;
                self.publish_plugin_error(id, &e.to_string()).await;
                return Err(e.into());
            }
        };

        let plugin = match factory.create() {
            Ok(plugin) => plugin,
            Err(e) => {
                self.mark_failed(id).await;
                self.validator.unregister_plugin(id).await;
                self.publish_plugin_error(id, &e.to_string()).await;
                return Err(e.into());
            }
        };
        if plugin.id() != meta.id {
            let e = PluginSystemError::InitializationError {
                plugin_id: id.to_string(),
                message: format!(
                    "factory produced plugin id '{}', manifest declares '{}'",
                    plugin.id(),
                    meta.id
                ),
            };
            self.mark_failed(id).await;
            self.validator.unregister_plugin(id).await;
            self.publish_plugin_error(id, &e.to_string()).await;
            return Err(e.into());
        }

        {
            let mut state = self.state.lock().await;
            state.registry.register(id, plugin.clone())?;
        }

        let context = self.context();
        if let Err(e) = plugin.initialize(&context).await {
            {
                let mut state = self.state.lock().await;
                let _ = state.registry.remove(id);
                state.registry.set_status(id, PluginStatus::Failed);
            }
            self.validator.unregister_plugin(id).await;
            self.publish_plugin_error(id, &e.to_string()).await;
            return Err(PluginSystemError::InitializationError {
                plugin_id: id.to_string(),
                message: e.to_string(),
            }
            .into());
        }

        info!("plugin '{}' loaded", id);
        self.events
            .publish_system_event(
                EventType::PluginLoaded,
                json!({ "plugin": id, "version": meta.version }),
                Vec::new(),
            )
            .await;
        Ok(())
    }

    /// Bring a loaded plugin into service. Re-activating an active plugin is
    /// a no-op success; the plugin's `activate` runs once.
    pub async fn activate_plugin(&self, id: &str) -> Result<()> {
        self.stats.record_operation();
        let (plugin, status) = {
            let state = self.state.lock().await;
            let plugin = state
                .registry
                .get(id)
                .ok_or_else(|| PluginSystemError::PluginNotFound(id.to_string()))?;
            (plugin, state.registry.status_of(id))
        };
        if status == Some(PluginStatus::Active) {
            debug!("plugin '{}' already active", id);
            return Ok(());
        }

        plugin
            .activate()
            .await
            .map_err(|e| PluginSystemError::ActivationError {
                plugin_id: id.to_string(),
                message: e.to_string(),
            })?;

        // Publish the plugin's service, if it carries the capability.
        if let Some(provider) = plugin.service_provider() {
            let interface = provider.service_interface();
            let (name, version) = (interface.name.clone(), interface.version.clone());
            match self.services.register_service(provider).await {
                Ok(()) => {
                    self.validator
                        .register_service_version(&name, &version)
                        .await;
                }
                Err(e) => {
                    warn!("plugin '{}' service registration failed: {}", id, e);
                    self.stats.record_error();
                }
            }
        }

        {
            let mut state = self.state.lock().await;
            state.registry.set_status(id, PluginStatus::Active);
        }
        self.events
            .publish_system_event(
                EventType::SystemEvent,
                json!({ "action": "plugin_activated", "plugin": id }),
                Vec::new(),
            )
            .await;
        Ok(())
    }

    /// Take an active plugin out of service; a no-op when not active.
    pub async fn deactivate_plugin(&self, id: &str) -> Result<()> {
        self.stats.record_operation();
        let (plugin, status) = {
            let state = self.state.lock().await;
            let plugin = state
                .registry
                .get(id)
                .ok_or_else(|| PluginSystemError::PluginNotFound(id.to_string()))?;
            (plugin, state.registry.status_of(id))
        };
        if status != Some(PluginStatus::Active) {
            debug!("plugin '{}' not active; nothing to deactivate", id);
            return Ok(());
        }

        // Withdraw services before the plugin itself winds down.
        if let Some(provider) = plugin.service_provider() {
            let name = provider.service_interface().name;
            if let Err(e) = self.services.unregister_service(&name).await {
                debug!("service '{}' already unregistered: {}", name, e);
            }
            self.validator.unregister_service(&name).await;
        }

        plugin
            .deactivate()
            .await
            .map_err(|e| PluginSystemError::DeactivationError {
                plugin_id: id.to_string(),
                message: e.to_string(),
            })?;

        {
            let mut state = self.state.lock().await;
            state.registry.set_status(id, PluginStatus::Inactive);
        }
        self.events
            .publish_system_event(
                EventType::SystemEvent,
                json!({ "action": "plugin_deactivated", "plugin": id }),
                Vec::new(),
            )
            .await;
        Ok(())
    }

    /// Fully remove a plugin: deactivate, drop its subscriptions and message
    /// handlers, run its cleanup, and forget it.
    pub async fn unload_plugin(&self, id: &str) -> Result<()> {
        self.stats.record_operation();
        let status = {
            let state = self.state.lock().await;
            if !state.registry.has(id) {
                return Err(PluginSystemError::PluginNotFound(id.to_string()).into());
            }
            state.registry.status_of(id)
        };
        if status == Some(PluginStatus::Active) {
            self.deactivate_plugin(id).await?;
        }

        let dropped_subs = self.events.unsubscribe_plugin(id).await;
        let dropped_handlers = self.messages.unregister_plugin(id).await;
        debug!(
            "plugin '{}': removed {} event subscriptions, {} message handlers",
            id, dropped_subs, dropped_handlers
        );

        let plugin = {
            let mut state = self.state.lock().await;
            let plugin = state.registry.remove(id)?;
            state.metadata.remove(id);
            state.validation.remove(id);
            plugin
        };
        if let Err(e) = plugin.cleanup().await {
            warn!("plugin '{}' cleanup reported: {}", id, e);
            self.stats.record_error();
        }
        self.validator.unregister_plugin(id).await;

        info!("plugin '{}' unloaded", id);
        self.events
            .publish_system_event(EventType::PluginUnloaded, json!({ "plugin": id }), Vec::new())
            .await;
        Ok(())
    }

    /// Unload everything, newest first. Failures are isolated per plugin.
    pub async fn unload_all_plugins(&self) -> usize {
        let ids: Vec<String> = {
            let state = self.state.lock().await;
            state.registry.loaded_ids()
        };
        let mut unloaded = 0;
        for id in ids.into_iter().rev() {
            match self.unload_plugin(&id).await {
                Ok(()) => unloaded += 1,
                Err(e) => {
                    warn!("failed to unload plugin '{}': {}", id, e);
                    self.stats.record_error();
                }
            }
        }
        unloaded
    }

    async fn mark_failed(&self, id: &str) {
        let mut state = self.state.lock().await;
        state.registry.set_status(id, PluginStatus::Failed);
    }

    async fn publish_plugin_error(&self, id: &str, message: &str) {
        self.events
            .publish_system_event(
                EventType::SystemEvent,
                json!({ "action": "plugin_error", "plugin": id, "error": message }),
                Vec::new(),
            )
            .await;
    }
}

impl fmt::Debug for PluginManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginManager").finish_non_exhaustive()
    }
}

#[async_trait]
impl ManagerComponent for PluginManager {
    fn name(&self) -> &'static str {
        "PluginManager"
    }

    async fn initialize(&self) -> Result<()> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.validator.initialize().await?;
        self.services.initialize().await?;
        self.messages.initialize().await?;
        self.events.initialize().await?;

        // Service lifecycle notices become communication events.
        self.events.bind_service_registry(&self.services).await;

        // Store changes invalidate the matching config-cache section.
        let cache = self.config_cache.clone();
        self.config.subscribe_changes(Arc::new(move |section, _| {
            cache.invalidate_section(section);
        }));
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        if !self.initialized.load(Ordering::SeqCst) {
            self.initialize().await?;
        }
        self.messages.start().await?;
        self.validator.start().await?;
        self.services.start().await?;
        self.events.start().await?;
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        self.unload_all_plugins().await;
        self.events.stop().await?;
        self.services.stop().await?;
        self.messages.stop().await?;
        self.validator.stop().await?;
        Ok(())
    }
}
