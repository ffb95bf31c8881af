//! Weather plugin for Chime.
//!
//! Publishes `weather_service`, a data-provider service the floating widget
//! and dashboard panels query for current conditions. Conditions are seeded
//! from the `weather.*` config section; a real deployment would refresh them
//! from a network provider outside this crate.
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use log::{debug, info};
use serde_json::{json, Value};

use chime_core::plugin_system::error::PluginSystemError;
use chime_core::plugin_system::traits::{Plugin, PluginContext, PluginFactory};
use chime_core::services::error::ServiceError;
use chime_core::services::interface::{
    method_callable, ParameterSpec, ServiceInterface, ServiceMethod, ServiceType,
};
use chime_core::services::provider::ServiceProvider;
use chime_core::services::registry::ServiceRegistry;
use chime_core::storage::config::ConfigStore;

pub const PLUGIN_ID: &str = "weather";
pub const SERVICE_NAME: &str = "weather_service";

#[derive(Default)]
struct ConditionTable {
    by_city: RwLock<HashMap<String, Value>>,
    default_city: RwLock<String>,
}

impl ConditionTable {
    fn lookup(&self, city: Option<&str>) -> Value {
        let default_city = self.default_city.read().unwrap_or_else(|e| e.into_inner());
        let city = city.unwrap_or(default_city.as_str()).to_string();
        drop(default_city);
        let table = self.by_city.read().unwrap_or_else(|e| e.into_inner());
        match table.get(&city) {
            Some(entry) => json!({"city": city, "conditions": entry}),
            None => json!({"city": city, "conditions": null}),
        }
    }
}

struct WeatherServiceProvider {
    conditions: Arc<ConditionTable>,
}

#[async_trait]
impl ServiceProvider for WeatherServiceProvider {
    fn service_interface(&self) -> ServiceInterface {
        let current = self.conditions.clone();
        let cities = self.conditions.clone();
        ServiceInterface::new(SERVICE_NAME, "1.0.0", PLUGIN_ID, ServiceType::DataProvider)
            .method(
                ServiceMethod::new(
                    "current",
                    method_callable(move |args| {
                        let table = current.clone();
                        async move {
                            let city = args.get("city").and_then(Value::as_str).map(String::from);
                            Ok(table.lookup(city.as_deref()))
                        }
                    }),
                )
                .describe("Current conditions for a city")
                .parameter(ParameterSpec::with_default("city", Value::Null))
                .returning("object"),
            )
            .method(
                ServiceMethod::new(
                    "known_cities",
                    method_callable(move |_args| {
                        let table = cities.clone();
                        async move {
                            let mut names: Vec<String> = {
                                let map =
                                    table.by_city.read().unwrap_or_else(|e| e.into_inner());
                                map.keys().cloned().collect()
                            };
                            names.sort();
                            Ok(json!(names))
                        }
                    }),
                )
                .returning("array of city names"),
            )
            .event("weather.updated")
    }

    async fn initialize_service(&self, _registry: &ServiceRegistry) -> Result<(), ServiceError> {
        debug!("weather service initialized");
        Ok(())
    }

    async fn cleanup_service(&self) {
        self.conditions
            .by_city
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

/// The plugin itself: seeds the condition table from config at
/// initialization and hands out its service provider at activation.
pub struct WeatherPlugin {
    conditions: Arc<ConditionTable>,
    provider: Arc<WeatherServiceProvider>,
}

impl WeatherPlugin {
    pub fn new() -> Self {
        let conditions = Arc::new(ConditionTable::default());
        Self {
            provider: Arc::new(WeatherServiceProvider {
                conditions: conditions.clone(),
            }),
            conditions,
        }
    }
}

impl Default for WeatherPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Plugin for WeatherPlugin {
    fn id(&self) -> &str {
        PLUGIN_ID
    }

    async fn initialize(&self, context: &PluginContext) -> Result<(), PluginSystemError> {
        let default_city = context
            .config
            .get("weather.default_city")
            .and_then(|v| v.as_str().map(String::from))
            .unwrap_or_else(|| "Helsinki".to_string());
        *self
            .conditions
            .default_city
            .write()
            .unwrap_or_else(|e| e.into_inner()) = default_city;

        if let Some(Value::Object(seed)) = context.config.get("weather.seed") {
            let mut table = self
                .conditions
                .by_city
                .write()
                .unwrap_or_else(|e| e.into_inner());
            for (city, entry) in seed {
                table.insert(city, entry);
            }
        }

        info!("weather plugin initialized");
        Ok(())
    }

    async fn activate(&self) -> Result<(), PluginSystemError> {
        debug!("weather plugin activated");
        Ok(())
    }

    async fn deactivate(&self) -> Result<(), PluginSystemError> {
        debug!("weather plugin deactivated");
        Ok(())
    }

    async fn cleanup(&self) -> Result<(), PluginSystemError> {
        self.conditions
            .by_city
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        Ok(())
    }

    fn service_provider(&self) -> Option<Arc<dyn ServiceProvider>> {
        Some(self.provider.clone())
    }
}

/// Factory the host registers at startup; the manifest's `entry_point`
/// names it.
pub struct WeatherPluginFactory;

impl PluginFactory for WeatherPluginFactory {
    fn entry_point(&self) -> &str {
        PLUGIN_ID
    }

    fn create(&self) -> Result<Arc<dyn Plugin>, PluginSystemError> {
        Ok(Arc::new(WeatherPlugin::new()))
    }
}
