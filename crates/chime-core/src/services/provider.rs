use async_trait::async_trait;

use crate::services::error::ServiceError;
use crate::services::interface::ServiceInterface;
use crate::services::registry::ServiceRegistry;

/// Capability a plugin implements to publish a service.
///
/// Handed to [`ServiceRegistry::register_service`]; the registry calls the
/// hooks around storage so a provider can allocate and release resources
/// tied to its registration.
#[async_trait]
pub trait ServiceProvider: Send + Sync {
    /// The interface this provider publishes.
    fn service_interface(&self) -> ServiceInterface;

    /// Called after interface validation, before the service becomes
    /// discoverable. A failure aborts registration.
    async fn initialize_service(&self, registry: &ServiceRegistry) -> Result<(), ServiceError> {
        let _ = registry;
        Ok(())
    }

    /// Called after the service has been removed from the registry.
    async fn cleanup_service(&self) {}
}
