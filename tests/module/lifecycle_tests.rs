//! Module lifecycle tests
//!
//! Tests for install, start, stop, lazy activation, update, uninstall and
//! container launch/shutdown.

use modwire::config::ContainerConfig;
use modwire::module::{
    CapabilityDescription, ContainerEventType, ModuleError, ModuleEventType, ModuleState,
    RevisionDescription, Settings, StartOptions, StopOptions,
};
use std::time::Duration;

use crate::module::test_utils::*;

#[tokio::test]
async fn test_install_publishes_installed() {
    let fixture = ContainerFixture::new();
    let (_, mut events) = fixture.container.module_event_collector().await;

    let module = fixture
        .container
        .install("file:a", &RevisionDescription::new())
        .await
        .unwrap();

    assert_eq!(module.state(), ModuleState::Installed);
    assert_eq!(module.location(), "file:a");
    assert_eq!(event_types(&events.drain(), module.id()), vec![ModuleEventType::Installed]);
}

#[tokio::test]
async fn test_install_same_location_is_idempotent() {
    let fixture = ContainerFixture::new();
    let first = fixture.install("file:a", RevisionDescription::new()).await;
    let (_, mut events) = fixture.container.module_event_collector().await;

    let second = fixture.install("file:a", provider("svc", "other")).await;

    assert_eq!(first, second);
    assert!(events.drain().is_empty());
    assert_eq!(fixture.container.modules().await.len(), 2);
}

#[tokio::test]
async fn test_install_rejects_invalid_filter() {
    let fixture = ContainerFixture::new();
    let result = fixture
        .container
        .install("file:bad", &consumer("svc", "(name=foo"))
        .await;
    assert!(matches!(result, Err(ModuleError::InvalidFilter(_))));
    assert!(fixture.container.module_by_location("file:bad").await.is_none());
}

#[tokio::test]
async fn test_start_resolves_and_activates() {
    let fixture = ContainerFixture::new();
    let (_, mut events) = fixture.container.module_event_collector().await;
    let id = fixture.install("file:a", RevisionDescription::new()).await;

    fixture.container.start(id, StartOptions::empty()).await.unwrap();

    let module = fixture.container.module(id).await.unwrap();
    assert_eq!(module.state(), ModuleState::Active);
    assert!(module.settings().contains(Settings::AUTO_START));
    assert_eq!(fixture.activator.start_count(id), 1);
    assert_eq!(
        event_types(&events.drain(), id),
        vec![
            ModuleEventType::Installed,
            ModuleEventType::Resolved,
            ModuleEventType::Starting,
            ModuleEventType::Started,
        ]
    );
}

#[tokio::test]
async fn test_transient_start_keeps_settings() {
    let fixture = ContainerFixture::new();
    let id = fixture.install("file:a", RevisionDescription::new()).await;

    fixture.container.start(id, StartOptions::TRANSIENT).await.unwrap();

    let module = fixture.container.module(id).await.unwrap();
    assert_eq!(module.state(), ModuleState::Active);
    assert!(!module.settings().contains(Settings::AUTO_START));
}

#[tokio::test]
async fn test_start_active_module_is_noop() {
    let fixture = ContainerFixture::new();
    let id = fixture.install("file:a", RevisionDescription::new()).await;
    fixture.container.start(id, StartOptions::TRANSIENT).await.unwrap();
    let (_, mut events) = fixture.container.module_event_collector().await;

    fixture.container.start(id, StartOptions::empty()).await.unwrap();

    assert!(events.drain().is_empty());
    assert_eq!(fixture.activator.start_count(id), 1);
    let module = fixture.container.module(id).await.unwrap();
    assert!(module.settings().contains(Settings::AUTO_START));
}

#[tokio::test]
async fn test_stop_returns_to_resolved() {
    let fixture = ContainerFixture::new();
    let id = fixture.install("file:a", RevisionDescription::new()).await;
    fixture.container.start(id, StartOptions::empty()).await.unwrap();
    let (_, mut events) = fixture.container.module_event_collector().await;

    fixture.container.stop(id, StopOptions::empty()).await.unwrap();

    let module = fixture.container.module(id).await.unwrap();
    assert_eq!(module.state(), ModuleState::Resolved);
    assert!(!module.settings().contains(Settings::AUTO_START));
    assert_eq!(fixture.activator.stops(), vec![id]);
    assert_eq!(
        event_types(&events.drain(), id),
        vec![ModuleEventType::Stopping, ModuleEventType::Stopped]
    );
}

#[tokio::test]
async fn test_transient_stop_keeps_auto_start() {
    let fixture = ContainerFixture::new();
    let id = fixture.install("file:a", RevisionDescription::new()).await;
    fixture.container.start(id, StartOptions::empty()).await.unwrap();

    fixture.container.stop(id, StopOptions::TRANSIENT).await.unwrap();

    let module = fixture.container.module(id).await.unwrap();
    assert_eq!(module.state(), ModuleState::Resolved);
    assert!(module.settings().contains(Settings::AUTO_START));
}

#[tokio::test]
async fn test_failed_activation_rolls_back() {
    let fixture = ContainerFixture::new();
    let id = fixture.install("file:a", RevisionDescription::new()).await;
    fixture.activator.fail_start(id);
    let (_, mut events) = fixture.container.module_event_collector().await;
    let (_, mut container_events) = fixture.container.container_event_collector().await;

    let result = fixture.container.start(id, StartOptions::TRANSIENT).await;

    assert!(matches!(result, Err(ModuleError::ActivationFailed { module, .. }) if module == id));
    assert_eq!(fixture.container.module(id).await.unwrap().state(), ModuleState::Resolved);
    assert_eq!(
        event_types(&events.drain(), id),
        vec![
            ModuleEventType::Resolved,
            ModuleEventType::Starting,
            ModuleEventType::Stopping,
            ModuleEventType::Stopped,
        ]
    );
    let errors = container_events.drain();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].event_type, ContainerEventType::Error);
    assert_eq!(errors[0].module, Some(id));
    assert!(errors[0].error.is_some());
}

#[tokio::test]
async fn test_activator_timeout_fails_start() {
    let mut config = ContainerConfig::default();
    config.lifecycle.activator_timeout_ms = Some(20);
    let fixture = ContainerFixture::with_activator(config, RecordingActivator::slow(Duration::from_millis(500)));
    let id = fixture.install("file:slow", RevisionDescription::new()).await;

    let result = fixture.container.start(id, StartOptions::TRANSIENT).await;

    assert!(matches!(result, Err(ModuleError::ActivationFailed { .. })));
    assert_eq!(fixture.container.module(id).await.unwrap().state(), ModuleState::Resolved);
}

#[tokio::test]
async fn test_failed_stop_still_reaches_resolved() {
    let fixture = ContainerFixture::new();
    let id = fixture.install("file:a", RevisionDescription::new()).await;
    fixture.container.start(id, StartOptions::TRANSIENT).await.unwrap();
    fixture.activator.fail_stop(id);

    let result = fixture.container.stop(id, StopOptions::TRANSIENT).await;

    assert!(matches!(result, Err(ModuleError::ActivationFailed { .. })));
    assert_eq!(fixture.container.module(id).await.unwrap().state(), ModuleState::Resolved);
}

#[tokio::test]
async fn test_lazy_activation() {
    let fixture = ContainerFixture::new();
    let (_, mut events) = fixture.container.module_event_collector().await;
    let id = fixture.install("file:lazy", RevisionDescription::new().lazy()).await;

    fixture
        .container
        .start(id, StartOptions::USE_ACTIVATION_POLICY)
        .await
        .unwrap();

    let module = fixture.container.module(id).await.unwrap();
    assert_eq!(module.state(), ModuleState::LazyStarting);
    assert!(module.settings().contains(Settings::USE_ACTIVATION_POLICY));
    assert_eq!(fixture.activator.start_count(id), 0);

    fixture.container.trigger_lazy_activation(id).await.unwrap();

    assert_eq!(module.state(), ModuleState::Active);
    assert_eq!(fixture.activator.start_count(id), 1);
    assert_eq!(
        event_types(&events.drain(), id),
        vec![
            ModuleEventType::Installed,
            ModuleEventType::Resolved,
            ModuleEventType::LazyActivation,
            ModuleEventType::Starting,
            ModuleEventType::Started,
        ]
    );
}

#[tokio::test]
async fn test_lazy_revision_starts_eagerly_without_policy() {
    let fixture = ContainerFixture::new();
    let id = fixture.install("file:lazy", RevisionDescription::new().lazy()).await;

    fixture.container.start(id, StartOptions::TRANSIENT).await.unwrap();

    assert_eq!(fixture.container.module(id).await.unwrap().state(), ModuleState::Active);
}

#[tokio::test]
async fn test_trigger_lazy_activation_requires_lazy_starting() {
    let fixture = ContainerFixture::new();
    let id = fixture.install("file:a", RevisionDescription::new()).await;
    let result = fixture.container.trigger_lazy_activation(id).await;
    assert!(matches!(result, Err(ModuleError::InvalidTransition { .. })));
}

#[tokio::test]
async fn test_operations_on_uninstalled_module_fail() {
    let fixture = ContainerFixture::new();
    let id = fixture.install("file:a", RevisionDescription::new()).await;
    fixture.container.uninstall(id).await.unwrap();
    let (_, mut events) = fixture.container.module_event_collector().await;

    let start = fixture.container.start(id, StartOptions::empty()).await;
    let stop = fixture.container.stop(id, StopOptions::empty()).await;
    let uninstall = fixture.container.uninstall(id).await;

    for result in [start, stop, uninstall] {
        assert!(matches!(
            result,
            Err(ModuleError::InvalidTransition {
                state: ModuleState::Uninstalled,
                ..
            })
        ));
    }
    assert!(events.drain().is_empty());
}

#[tokio::test]
async fn test_unknown_module_not_found() {
    let fixture = ContainerFixture::new();
    let result = fixture.container.start(42, StartOptions::empty()).await;
    assert!(matches!(result, Err(ModuleError::ModuleNotFound(_))));
}

#[tokio::test]
async fn test_uninstall_active_module() {
    let fixture = ContainerFixture::new();
    let (_, mut events) = fixture.container.module_event_collector().await;
    let id = fixture.install("file:a", RevisionDescription::new()).await;
    fixture.container.start(id, StartOptions::TRANSIENT).await.unwrap();
    let module = fixture.container.module(id).await.unwrap();

    fixture.container.uninstall(id).await.unwrap();

    assert_eq!(module.state(), ModuleState::Uninstalled);
    assert!(fixture.container.module(id).await.is_none());
    assert!(fixture.container.module_by_location("file:a").await.is_none());
    let types = event_types(&events.drain(), id);
    assert_eq!(types.last(), Some(&ModuleEventType::Uninstalled));
    assert!(is_valid_event_sequence(&types));
}

#[tokio::test]
async fn test_system_module_cannot_be_removed() {
    let fixture = ContainerFixture::new();
    assert!(matches!(
        fixture.container.uninstall(0).await,
        Err(ModuleError::InvalidTransition { .. })
    ));
    assert!(matches!(
        fixture.container.update(0, &RevisionDescription::new()).await,
        Err(ModuleError::InvalidTransition { .. })
    ));
}

#[tokio::test]
async fn test_update_restarts_active_module() {
    let fixture = ContainerFixture::new();
    let id = fixture.install("file:a", provider("svc", "v1")).await;
    fixture.container.start(id, StartOptions::TRANSIENT).await.unwrap();
    let before = fixture.container.current_revision(id).await.unwrap().id();
    let (_, mut events) = fixture.container.module_event_collector().await;

    fixture.container.update(id, &provider("svc", "v2")).await.unwrap();

    let module = fixture.container.module(id).await.unwrap();
    assert_eq!(module.state(), ModuleState::Active);
    let after = fixture.container.current_revision(id).await.unwrap();
    assert!(after.id() > before);
    assert_eq!(fixture.container.revisions(id).await.len(), 1);
    assert_eq!(
        event_types(&events.drain(), id),
        vec![
            ModuleEventType::Stopping,
            ModuleEventType::Stopped,
            ModuleEventType::Unresolved,
            ModuleEventType::Updated,
            ModuleEventType::Resolved,
            ModuleEventType::Starting,
            ModuleEventType::Started,
        ]
    );
}

#[tokio::test]
async fn test_update_validates_before_stopping() {
    let fixture = ContainerFixture::new();
    let id = fixture.install("file:a", RevisionDescription::new()).await;
    fixture.container.start(id, StartOptions::TRANSIENT).await.unwrap();

    let result = fixture.container.update(id, &consumer("svc", "not a filter")).await;

    assert!(result.is_err());
    assert_eq!(fixture.container.module(id).await.unwrap().state(), ModuleState::Active);
}

#[tokio::test]
async fn test_launch_starts_auto_start_modules_in_level_order() {
    let fixture = ContainerFixture::new();
    let late = fixture
        .container
        .install_at_level("file:late", &RevisionDescription::new(), 5, Settings::AUTO_START)
        .await
        .unwrap()
        .id();
    let early = fixture
        .container
        .install_at_level("file:early", &RevisionDescription::new(), 2, Settings::AUTO_START)
        .await
        .unwrap()
        .id();
    let manual = fixture.install("file:manual", RevisionDescription::new()).await;
    let (_, mut container_events) = fixture.container.container_event_collector().await;

    fixture.container.launch().await.unwrap();

    assert_eq!(fixture.activator.starts(), vec![early, late]);
    assert_eq!(
        fixture.container.module(manual).await.unwrap().state(),
        ModuleState::Resolved
    );
    let started = container_events.drain();
    assert_eq!(started.last().map(|e| e.event_type), Some(ContainerEventType::Started));

    fixture.container.shutdown().await.unwrap();

    assert_eq!(fixture.activator.stops(), vec![late, early]);
    assert_eq!(
        container_events.drain().last().map(|e| e.event_type),
        Some(ContainerEventType::Stopped)
    );
}

#[tokio::test]
async fn test_launch_reports_failed_auto_start() {
    let fixture = ContainerFixture::new();
    let broken = fixture
        .container
        .install_at_level("file:broken", &RevisionDescription::new(), 1, Settings::AUTO_START)
        .await
        .unwrap()
        .id();
    fixture.activator.fail_start(broken);
    let (_, mut container_events) = fixture.container.container_event_collector().await;

    fixture.container.launch().await.unwrap();

    let events = container_events.drain();
    assert!(events
        .iter()
        .any(|e| e.event_type == ContainerEventType::Error && e.module == Some(broken)));
    assert_eq!(events.last().map(|e| e.event_type), Some(ContainerEventType::Started));
}

#[tokio::test]
async fn test_install_from_content_provider() {
    struct StaticContent;

    impl modwire::module::ContentProvider for StaticContent {
        fn revision_description(&self, location: &str) -> Result<RevisionDescription, ModuleError> {
            Ok(RevisionDescription::new()
                .with_capability(CapabilityDescription::new("svc").attribute("name", location)))
        }
    }

    let fixture = ContainerFixture::new();
    assert!(matches!(
        fixture.container.install_from("file:none").await,
        Err(ModuleError::ConfigError(_))
    ));

    let container = modwire::module::ModuleContainer::with_defaults()
        .with_content_provider(std::sync::Arc::new(StaticContent));
    let module = container.install_from("file:content").await.unwrap();
    let revision = container.current_revision(module.id()).await.unwrap();
    assert_eq!(revision.capabilities(Some("svc")).count(), 1);
}
