// ABOUTME: Tests for the BackendRegistry and BackendFactory pattern.
// ABOUTME: Validates runtime provider selection and creation.

use chatrelay_llm::backends::mock::MockBackend;
use chatrelay_llm::{BackendConfig, BackendRegistry, CompletionBackend};
use std::sync::Arc;

#[test]
fn test_registry_creates_mock_backend() {
    let registry = BackendRegistry::default();
    let backend = registry.create("mock", &BackendConfig::default()).unwrap();
    assert_eq!(backend.name(), "mock");
}

#[test]
fn test_registry_creates_openai_backend() {
    let registry = BackendRegistry::default();
    let config = BackendConfig {
        api_key: "sk-test".to_string(),
        ..Default::default()
    };
    let backend = registry.create_from_config(&config).unwrap();
    assert_eq!(backend.name(), "openai");
}

#[test]
fn test_registry_lists_available_backends() {
    let registry = BackendRegistry::default();
    assert_eq!(registry.available(), vec!["mock", "openai"]);
}

#[test]
fn test_registry_unknown_backend_errors() {
    let registry = BackendRegistry::default();
    match registry.create("nonexistent", &BackendConfig::default()) {
        Err(err) => assert!(err
            .to_string()
            .contains("Unknown completion provider: nonexistent")),
        Ok(_) => panic!("Expected error for unknown provider"),
    }
}

#[test]
fn test_registry_custom_factory() {
    let registry = BackendRegistry::new().register("scripted", |_config: &BackendConfig| {
        let backend: Arc<dyn CompletionBackend> =
            Arc::new(MockBackend::new().on_any().respond_text("canned"));
        Ok(backend)
    });
    let backend = registry.create("scripted", &BackendConfig::default()).unwrap();
    assert_eq!(backend.name(), "mock");
}

#[test]
fn test_backend_config_from_toml_section() {
    let config: BackendConfig = toml::from_str(
        r#"
            provider = "mock"
            api_url = "http://localhost:11434/v1"
            timeout_secs = 30
        "#,
    )
    .unwrap();
    assert_eq!(config.provider, "mock");
    assert_eq!(config.timeout_secs, 30);
    let backend = BackendRegistry::default().create_from_config(&config).unwrap();
    assert_eq!(backend.name(), "mock");
}
