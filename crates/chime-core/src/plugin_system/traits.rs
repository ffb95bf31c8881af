use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::event::bus::CommunicationBus;
use crate::messaging::bus::MessageBus;
use crate::plugin_system::error::PluginSystemError;
use crate::services::provider::ServiceProvider;
use crate::services::registry::ServiceRegistry;
use crate::storage::config::ConfigStore;

/// Lifecycle states a managed plugin moves through.
///
/// `discovered -> metadata-loaded -> validated -> loaded -> active <-> inactive
/// -> unloaded`, with `failed` reachable from the metadata, validation, and
/// load steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginStatus {
    Discovered,
    MetadataLoaded,
    Validated,
    Loaded,
    Active,
    Inactive,
    Unloaded,
    Failed,
}

impl fmt::Display for PluginStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PluginStatus::Discovered => "discovered",
            PluginStatus::MetadataLoaded => "metadata-loaded",
            PluginStatus::Validated => "validated",
            PluginStatus::Loaded => "loaded",
            PluginStatus::Active => "active",
            PluginStatus::Inactive => "inactive",
            PluginStatus::Unloaded => "unloaded",
            PluginStatus::Failed => "failed",
        };
        write!(f, "{}", label)
    }
}

/// Handles a plugin receives at initialization.
///
/// Everything a plugin talks to goes through here; plugins hold no direct
/// references to each other.
#[derive(Clone)]
pub struct PluginContext {
    pub services: Arc<ServiceRegistry>,
    pub messages: Arc<MessageBus>,
    pub events: Arc<CommunicationBus>,
    pub config: Arc<dyn ConfigStore>,
}

impl fmt::Debug for PluginContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginContext").finish_non_exhaustive()
    }
}

/// Core trait that all plugins must implement
#[async_trait]
pub trait Plugin: Send + Sync {
    /// The unique id of the plugin; must match its manifest
    fn id(&self) -> &str;

    /// Called once after loading, before activation
    async fn initialize(&self, context: &PluginContext) -> Result<(), PluginSystemError>;

    /// Bring the plugin into service
    async fn activate(&self) -> Result<(), PluginSystemError>;

    /// Take the plugin out of service; must be reversible by `activate`
    async fn deactivate(&self) -> Result<(), PluginSystemError>;

    /// Final teardown before the plugin is dropped
    async fn cleanup(&self) -> Result<(), PluginSystemError>;

    /// The service-provider capability, if this plugin publishes one.
    ///
    /// Checked once at activation; `None` means the plugin only consumes.
    fn service_provider(&self) -> Option<Arc<dyn ServiceProvider>> {
        None
    }
}

/// Static factory a plugin crate registers with the manager.
///
/// Replaces scanning loaded code for an entry-point type: the manifest's
/// `entry_point` names a factory registered ahead of time, and instantiation
/// is an explicit call.
pub trait PluginFactory: Send + Sync {
    /// Factory key matched against manifest `entry_point` fields
    fn entry_point(&self) -> &str;

    /// Construct a fresh plugin instance
    fn create(&self) -> Result<Arc<dyn Plugin>, PluginSystemError>;
}
