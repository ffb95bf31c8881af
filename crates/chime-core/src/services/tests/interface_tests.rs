// crates/chime-core/src/services/tests/interface_tests.rs
#![cfg(test)]

use serde_json::json;

use crate::services::error::ServiceError;
use crate::services::interface::{
    method_callable, ParameterSpec, ServiceArgs, ServiceInterface, ServiceMethod, ServiceType,
};

fn noop_method(name: &str) -> ServiceMethod {
    ServiceMethod::new(name, method_callable(|_args| async { Ok(json!(null)) }))
}

#[test]
fn test_interface_validation_accepts_complete_interface() {
    let interface = ServiceInterface::new(
        "weather_service",
        "1.0.0",
        "weather",
        ServiceType::DataProvider,
    )
    .method(noop_method("current"))
    .event("weather.updated");

    assert!(interface.validate().is_ok());
    assert_eq!(interface.method_names(), vec!["current"]);
}

#[test]
fn test_interface_validation_rejects_empty_fields() {
    let interface =
        ServiceInterface::new("", "1.0.0", "weather", ServiceType::DataProvider);
    assert!(matches!(
        interface.validate(),
        Err(ServiceError::InvalidInterface { .. })
    ));

    let interface =
        ServiceInterface::new("svc", "", "weather", ServiceType::DataProvider);
    assert!(interface.validate().is_err());

    let interface = ServiceInterface::new("svc", "1.0.0", "", ServiceType::Utility);
    assert!(interface.validate().is_err());
}

#[test]
fn test_bind_args_applies_defaults() {
    let method = noop_method("forecast")
        .parameter(ParameterSpec::required("city"))
        .parameter(ParameterSpec::with_default("days", json!(3)));

    let mut args = ServiceArgs::new().with("city", json!("Helsinki"));
    method.bind_args(&mut args).unwrap();
    assert_eq!(args.get("days"), Some(&json!(3)));
    assert_eq!(args.get("city"), Some(&json!("Helsinki")));
}

#[test]
fn test_bind_args_missing_required() {
    let method = noop_method("forecast").parameter(ParameterSpec::required("city"));
    let mut args = ServiceArgs::new();
    let err = method.bind_args(&mut args).unwrap_err();
    assert!(matches!(
        err,
        ServiceError::MissingArgument { ref parameter, .. } if parameter == "city"
    ));
}

#[test]
fn test_bind_args_rejects_unknown_argument() {
    let method = noop_method("forecast").parameter(ParameterSpec::required("city"));
    let mut args = ServiceArgs::new()
        .with("city", json!("Helsinki"))
        .with("zoom", json!(9));
    let err = method.bind_args(&mut args).unwrap_err();
    assert!(matches!(
        err,
        ServiceError::UnexpectedArgument { ref parameter, .. } if parameter == "zoom"
    ));
}

#[test]
fn test_service_type_display() {
    assert_eq!(ServiceType::DataProvider.to_string(), "data_provider");
    assert_eq!(
        ServiceType::Custom("tide_tables".to_string()).to_string(),
        "tide_tables"
    );
}
