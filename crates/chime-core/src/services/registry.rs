use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info, warn};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::kernel::component::{ComponentStats, ManagerComponent};
use crate::kernel::error::Result as KernelResult;
use crate::services::error::ServiceError;
use crate::services::interface::{ServiceArgs, ServiceInterface, ServiceType};
use crate::services::provider::ServiceProvider;

/// Notification emitted on registry mutations and invocations.
#[derive(Debug, Clone)]
pub enum ServiceNotice {
    Registered { name: String, provider: String },
    Unregistered { name: String, provider: String },
    Called { service: String, method: String },
}

/// Identifier for a registered registry observer.
pub type ObserverId = u64;

/// Callback invoked with each service notice.
pub type ServiceObserver = Arc<dyn Fn(&ServiceNotice) + Send + Sync>;

struct RegisteredService {
    interface: ServiceInterface,
    provider: Arc<dyn ServiceProvider>,
}

#[derive(Default)]
struct RegistryState {
    services: HashMap<String, RegisteredService>,
    /// Discovery cache: service type -> service names
    by_type: HashMap<ServiceType, HashSet<String>>,
    /// (service, method) -> invocation count
    call_counts: HashMap<(String, String), u64>,
    observers: Vec<(ObserverId, ServiceObserver)>,
    next_observer: ObserverId,
}

/// Catalog of published services and the cross-plugin invocation path.
///
/// Method callables are invoked with no registry lock held, so a service
/// method may itself call back into the registry.
pub struct ServiceRegistry {
    state: Mutex<RegistryState>,
    stats: Arc<ComponentStats>,
    initialized: AtomicBool,
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            stats: Arc::new(ComponentStats::new()),
            initialized: AtomicBool::new(false),
        }
    }

    pub fn stats(&self) -> &Arc<ComponentStats> {
        &self.stats
    }

    /// Register an observer for service notices.
    pub async fn subscribe(&self, observer: ServiceObserver) -> ObserverId {
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

    /// Publish a provider's service.
    ///
    /// Validates the interface, rejects name collisions, runs the provider's
    /// `initialize_service` hook, then makes the service discoverable.
    pub async fn register_service(
        &self,
        provider: Arc<dyn ServiceProvider>,
    ) -> Result<(), ServiceError> {
        self.stats.record_operation();
        let interface = provider.service_interface();
        interface.validate().inspect_err(|_| self.stats.record_error())?;

        let name = interface.name.clone();
        let provider_id = interface.provider.clone();
        let service_type = interface.service_type.clone();

        // Reserve the name before the hook so concurrent registrations of
        // the same name cannot both pass the collision check.
        {
            let mut state = self.state.lock().await;
            if state.services.contains_key(&name) {
                self.stats.record_error();
                return Err(ServiceError::DuplicateService(name));
            }
            state.services.insert(
                name.clone(),
                RegisteredService {
                    interface,
                    provider: provider.clone(),
                },
            );
        }

        if let Err(e) = provider.initialize_service(self).await {
            warn!("service '{}' failed to initialize: {}", name, e);
            let mut state = self.state.lock().await;
            state.services.remove(&name);
            self.stats.record_error();
            return Err(ServiceError::HookFailed {
                service: name,
                message: e.to_string(),
            });
        }

        let observers = {
            let mut state = self.state.lock().await;
            state
                .by_type
                .entry(service_type)
                .or_default()
                .insert(name.clone());
            state
                .observers
                .iter()
                .map(|(_, obs)| obs.clone())
                .collect::<Vec<_>>()
        };

        info!("service '{}' registered by plugin '{}'", name, provider_id);
        let notice = ServiceNotice::Registered {
            name,
            provider: provider_id,
        };
        for observer in observers {
            observer(&notice);
        }
        Ok(())
    }

    /// Remove a service by name, running the provider's cleanup hook.
    pub async fn unregister_service(&self, name: &str) -> Result<(), ServiceError> {
        self.stats.record_operation();
        let (registered, observers) = {
            let mut state = self.state.lock().await;
            let registered = state.services.remove(name).ok_or_else(|| {
                self.stats.record_error();
                ServiceError::UnknownService(name.to_string())
            })?;
            let service_type = registered.interface.service_type.clone();
            if let Some(names) = state.by_type.get_mut(&service_type) {
                names.remove(name);
                if names.is_empty() {
                    state.by_type.remove(&service_type);
                }
            }
            let observers: Vec<ServiceObserver> =
                state.observers.iter().map(|(_, obs)| obs.clone()).collect();
            (registered, observers)
        };

        registered.provider.cleanup_service().await;
        info!(
            "service '{}' unregistered (provider '{}')",
            name, registered.interface.provider
        );
        let notice = ServiceNotice::Unregistered {
            name: name.to_string(),
            provider: registered.interface.provider.clone(),
        };
        for observer in observers {
            observer(&notice);
        }
        Ok(())
    }

    /// All registered interfaces, optionally filtered by category.
    pub async fn discover_services(&self, service_type: Option<&ServiceType>) -> Vec<ServiceInterface> {
        let state = self.state.lock().await;
        match service_type {
            None => state
                .services
                .values()
                .map(|s| s.interface.clone())
                .collect(),
            Some(wanted) => state
                .by_type
                .get(wanted)
                .map(|names| {
                    names
                        .iter()
                        .filter_map(|name| state.services.get(name))
                        .map(|s| s.interface.clone())
                        .collect()
                })
                .unwrap_or_default(),
        }
    }

    /// Look up a single interface by name.
    pub async fn get_service(&self, name: &str) -> Option<ServiceInterface> {
        let state = self.state.lock().await;
        state.services.get(name).map(|s| s.interface.clone())
    }

    /// Whether a service name currently has a provider.
    pub async fn has_service(&self, name: &str) -> bool {
        let state = self.state.lock().await;
        state.services.contains_key(name)
    }

    /// Invoke a method on a registered service.
    ///
    /// Fails with [`ServiceError::UnknownService`] or
    /// [`ServiceError::UnknownMethod`] when the lookup misses; argument
    /// binding errors surface before the callable runs.
    pub async fn call_service_method(
        &self,
        service_name: &str,
        method_name: &str,
        mut args: ServiceArgs,
    ) -> Result<Value, ServiceError> {
        self.stats.record_operation();
        let (callable, observers) = {
            let mut state = self.state.lock().await;
            let registered = state.services.get(service_name).ok_or_else(|| {
                self.stats.record_error();
                ServiceError::UnknownService(service_name.to_string())
            })?;
            let method = registered
                .interface
                .get_method(method_name)
                .ok_or_else(|| {
                    self.stats.record_error();
                    ServiceError::UnknownMethod {
                        service: service_name.to_string(),
                        method: method_name.to_string(),
                    }
                })?;
            method.bind_args(&mut args).inspect_err(|_| self.stats.record_error())?;
            let callable = method.callable();

            let key = (service_name.to_string(), method_name.to_string());
            *state.call_counts.entry(key).or_insert(0) += 1;

            let observers: Vec<ServiceObserver> =
                state.observers.iter().map(|(_, obs)| obs.clone()).collect();
            (callable, observers)
        };

        debug!("calling service method {}.{}", service_name, method_name);
        let outcome = (callable)(args).await;
        if outcome.is_err() {
            self.stats.record_error();
        }

        let notice = ServiceNotice::Called {
            service: service_name.to_string(),
            method: method_name.to_string(),
        };
        for observer in observers {
            observer(&notice);
        }
        outcome
    }

    /// How many times a method has been invoked since registration.
    pub async fn call_count(&self, service_name: &str, method_name: &str) -> u64 {
        let state = self.state.lock().await;
        state
            .call_counts
            .get(&(service_name.to_string(), method_name.to_string()))
            .copied()
            .unwrap_or(0)
    }

    pub async fn service_count(&self) -> usize {
        let state = self.state.lock().await;
        state.services.len()
    }
}

impl fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRegistry").finish_non_exhaustive()
    }
}

#[async_trait]
impl ManagerComponent for ServiceRegistry {
    fn name(&self) -> &'static str {
        "ServiceRegistry"
    }

    async fn initialize(&self) -> KernelResult<()> {
        self.initialized.swap(true, Ordering::SeqCst);
        Ok(())
    }

    async fn start(&self) -> KernelResult<()> {
        if !self.initialized.load(Ordering::SeqCst) {
            self.initialize().await?;
        }
        Ok(())
    }

    async fn stop(&self) -> KernelResult<()> {
        // Unregister everything still published, provider hooks included.
        let names: Vec<String> = {
            let state = self.state.lock().await;
            state.services.keys().cloned().collect()
        };
        for name in names {
            if let Err(e) = self.unregister_service(&name).await {
                warn!("failed to unregister service '{}' on stop: {}", name, e);
            }
        }
        Ok(())
    }
}
