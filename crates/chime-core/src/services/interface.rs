use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;

use crate::services::error::ServiceError;

/// Category a service advertises itself under, used for discovery filtering.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ServiceType {
    /// Supplies data to other plugins (weather, timetable feeds, ...)
    DataProvider,
    /// Delivers notifications to the user
    NotificationChannel,
    /// Contributes a panel or surface to the host UI
    UiPanel,
    /// General-purpose helpers
    Utility,
    /// Anything else, labeled
    Custom(String),
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceType::DataProvider => write!(f, "data_provider"),
            ServiceType::NotificationChannel => write!(f, "notification_channel"),
            ServiceType::UiPanel => write!(f, "ui_panel"),
            ServiceType::Utility => write!(f, "utility"),
            ServiceType::Custom(label) => write!(f, "{}", label),
        }
    }
}

/// Declared descriptor for one method parameter.
///
/// Descriptors are declared at registration, not introspected: a parameter
/// without a default is required at call time.
#[derive(Debug, Clone)]
pub struct ParameterSpec {
    pub name: String,
    pub required: bool,
    pub default: Option<Value>,
    pub description: Option<String>,
}

impl ParameterSpec {
    /// A parameter the caller must supply.
    pub fn required(name: &str) -> Self {
        Self {
            name: name.to_string(),
            required: true,
            default: None,
            description: None,
        }
    }

    /// A parameter with a fallback value.
    pub fn with_default(name: &str, default: Value) -> Self {
        Self {
            name: name.to_string(),
            required: false,
            default: Some(default),
            description: None,
        }
    }

    pub fn describe(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }
}

/// Named arguments passed to a service method.
#[derive(Debug, Clone, Default)]
pub struct ServiceArgs {
    values: HashMap<String, Value>,
}

impl ServiceArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: Value) -> Self {
        self.values.insert(name.to_string(), value);
        self
    }

    pub fn insert(&mut self, name: &str, value: Value) {
        self.values.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Future returned by a service method callable.
pub type MethodFuture = Pin<Box<dyn Future<Output = Result<Value, ServiceError>> + Send>>;

/// The callable backing a service method.
pub type MethodCallable = Arc<dyn Fn(ServiceArgs) -> MethodFuture + Send + Sync>;

/// Wrap an async closure into a [`MethodCallable`].
pub fn method_callable<F, Fut>(f: F) -> MethodCallable
where
    F: Fn(ServiceArgs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ServiceError>> + Send + 'static,
{
    Arc::new(move |args| Box::pin(f(args)))
}

/// One callable entry of a service interface.
#[derive(Clone)]
pub struct ServiceMethod {
    pub name: String,
    pub description: Option<String>,
    pub parameters: Vec<ParameterSpec>,
    /// Human-readable label of the return shape
    pub returns: Option<String>,
    callable: MethodCallable,
}

impl ServiceMethod {
    pub fn new(name: &str, callable: MethodCallable) -> Self {
        Self {
            name: name.to_string(),
            description: None,
            parameters: Vec::new(),
            returns: None,
            callable,
        }
    }

    pub fn describe(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn parameter(mut self, spec: ParameterSpec) -> Self {
        self.parameters.push(spec);
        self
    }

    pub fn returning(mut self, label: &str) -> Self {
        self.returns = Some(label.to_string());
        self
    }

    /// Check names against the declared descriptors and apply defaults.
    pub fn bind_args(&self, args: &mut ServiceArgs) -> Result<(), ServiceError> {
        for name in args.names() {
            if !self.parameters.iter().any(|p| p.name == name) {
                return Err(ServiceError::UnexpectedArgument {
                    method: self.name.clone(),
                    parameter: name.to_string(),
                });
            }
        }
        for spec in &self.parameters {
            if !args.contains(&spec.name) {
                match (&spec.default, spec.required) {
                    (Some(default), _) => args.insert(&spec.name, default.clone()),
                    (None, true) => {
                        return Err(ServiceError::MissingArgument {
                            method: self.name.clone(),
                            parameter: spec.name.clone(),
                        })
                    }
                    (None, false) => {}
                }
            }
        }
        Ok(())
    }

    pub(crate) fn callable(&self) -> MethodCallable {
        self.callable.clone()
    }
}

impl fmt::Debug for ServiceMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceMethod")
            .field("name", &self.name)
            .field("parameters", &self.parameters.len())
            .finish_non_exhaustive()
    }
}

/// A named, versioned capability published by exactly one provider plugin.
#[derive(Clone)]
pub struct ServiceInterface {
    /// Globally unique while registered
    pub name: String,
    pub version: String,
    /// Id of the providing plugin
    pub provider: String,
    pub service_type: ServiceType,
    methods: HashMap<String, ServiceMethod>,
    /// Event names this service may publish
    pub events: Vec<String>,
    /// Service-level dependency names
    pub dependencies: Vec<String>,
    /// Free-form metadata
    pub metadata: HashMap<String, Value>,
}

impl ServiceInterface {
    pub fn new(name: &str, version: &str, provider: &str, service_type: ServiceType) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            provider: provider.to_string(),
            service_type,
            methods: HashMap::new(),
            events: Vec::new(),
            dependencies: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    pub fn method(mut self, method: ServiceMethod) -> Self {
        self.methods.insert(method.name.clone(), method);
        self
    }

    pub fn event(mut self, event: &str) -> Self {
        self.events.push(event.to_string());
        self
    }

    pub fn dependency(mut self, name: &str) -> Self {
        self.dependencies.push(name.to_string());
        self
    }

    pub fn metadata_entry(mut self, key: &str, value: Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    pub fn get_method(&self, name: &str) -> Option<&ServiceMethod> {
        self.methods.get(name)
    }

    pub fn method_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.methods.keys().cloned().collect();
        names.sort();
        names
    }

    /// Structural checks run before registration.
    pub fn validate(&self) -> Result<(), ServiceError> {
        for (field, value) in [
            ("name", &self.name),
            ("version", &self.version),
            ("provider", &self.provider),
        ] {
            if value.trim().is_empty() {
                return Err(ServiceError::InvalidInterface {
                    name: self.name.clone(),
                    reason: format!("field '{}' is empty", field),
                });
            }
        }
        for (key, method) in &self.methods {
            if method.name.trim().is_empty() || key != &method.name {
                return Err(ServiceError::InvalidInterface {
                    name: self.name.clone(),
                    reason: format!("method entry '{}' has a mismatched or empty name", key),
                });
            }
        }
        Ok(())
    }
}

impl fmt::Debug for ServiceInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceInterface")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("provider", &self.provider)
            .field("service_type", &self.service_type)
            .field("methods", &self.method_names())
            .finish_non_exhaustive()
    }
}
