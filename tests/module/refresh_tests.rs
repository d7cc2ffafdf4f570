//! Refresh tests
//!
//! Tests for removal-pending revisions, dependency-closure refresh and the
//! refresh notification.

use modwire::config::ContainerConfig;
use modwire::module::{ContainerEventType, ModuleError, ModuleEventType, ModuleState, StartOptions};

use crate::module::test_utils::*;

#[tokio::test]
async fn test_uninstalled_provider_then_refresh_leaves_consumer_installed() {
    let fixture = ContainerFixture::new();
    let b = fixture.install("file:b", provider("svc", "foo")).await;
    let a = fixture.install("file:a", consumer("svc", "(name=foo)")).await;
    fixture.container.resolve(&[a]).await.unwrap();
    assert_eq!(fixture.container.wires(a).await.len(), 1);

    fixture.container.uninstall(b).await.unwrap();

    // still wired to the zombie revision until refreshed
    assert_eq!(fixture.container.module(a).await.unwrap().state(), ModuleState::Resolved);
    assert_eq!(fixture.container.wires(a).await.len(), 1);
    let pending = fixture.container.removal_pending().await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].module(), b);

    let (_, mut events) = fixture.container.module_event_collector().await;
    let report = fixture.container.refresh(&[a], &[]).await.unwrap();

    assert_eq!(fixture.container.module(a).await.unwrap().state(), ModuleState::Installed);
    assert!(fixture.container.wires(a).await.is_empty());
    assert_eq!(report.modules().into_iter().collect::<Vec<_>>(), vec![a]);
    assert_eq!(event_types(&events.drain(), a), vec![ModuleEventType::Unresolved]);
}

#[tokio::test]
async fn test_refresh_without_roots_purges_pending_revisions() {
    let fixture = ContainerFixture::new();
    let b = fixture.install("file:b", provider("svc", "foo")).await;
    let a = fixture.install("file:a", consumer("svc", "(name=foo)")).await;
    fixture.container.resolve(&[a]).await.unwrap();
    fixture.container.uninstall(b).await.unwrap();

    fixture.container.refresh(&[], &[]).await.unwrap();

    assert!(fixture.container.removal_pending().await.is_empty());
    assert!(fixture.container.revisions(b).await.is_empty());
    assert_eq!(fixture.container.module(a).await.unwrap().state(), ModuleState::Installed);
}

#[tokio::test]
async fn test_refresh_rewires_and_restarts_consumers() {
    let mut config = ContainerConfig::default();
    config.lifecycle.refresh_on_update = false;
    let fixture = ContainerFixture::with_config(config);
    let b = fixture.install("file:b", provider("svc", "foo")).await;
    let a = fixture.install("file:a", consumer("svc", "(name=foo)")).await;
    fixture.container.start(a, StartOptions::TRANSIENT).await.unwrap();
    let old_b = fixture.container.current_revision(b).await.unwrap().id();

    fixture.container.update(b, &provider("svc", "foo")).await.unwrap();

    let new_b = fixture.container.current_revision(b).await.unwrap().id();
    assert_ne!(old_b, new_b);
    assert_eq!(fixture.container.revisions(b).await.len(), 2);
    assert_eq!(fixture.container.wires(a).await[0].provider(), old_b);

    let (_, mut events) = fixture.container.module_event_collector().await;
    let report = fixture.container.refresh(&[b], &[]).await.unwrap();

    assert!(report.is_empty());
    assert_eq!(fixture.container.module(a).await.unwrap().state(), ModuleState::Active);
    assert_eq!(fixture.container.wires(a).await[0].provider(), new_b);
    assert_eq!(fixture.container.revisions(b).await.len(), 1);
    assert_eq!(fixture.activator.start_count(a), 2);

    let a_events = event_types(&events.drain(), a);
    assert_eq!(
        a_events,
        vec![
            ModuleEventType::Stopping,
            ModuleEventType::Stopped,
            ModuleEventType::Unresolved,
            ModuleEventType::Resolved,
            ModuleEventType::Starting,
            ModuleEventType::Started,
        ]
    );
}

#[tokio::test]
async fn test_update_rewires_resolved_consumers() {
    let fixture = ContainerFixture::new();
    let b = fixture.install("file:b", provider("svc", "foo")).await;
    let a = fixture.install("file:a", consumer("svc", "(name=foo)")).await;
    fixture.container.resolve(&[a]).await.unwrap();

    fixture.container.update(b, &provider("svc", "foo")).await.unwrap();

    let new_b = fixture.container.current_revision(b).await.unwrap().id();
    assert!(fixture.container.removal_pending().await.is_empty());
    assert_eq!(fixture.container.revisions(b).await.len(), 1);
    assert_eq!(fixture.container.module(a).await.unwrap().state(), ModuleState::Resolved);
    assert_eq!(fixture.container.wires(a).await[0].provider(), new_b);
}

#[tokio::test]
async fn test_update_restarts_active_consumers_on_new_revision() {
    let fixture = ContainerFixture::new();
    let b = fixture.install("file:b", provider("svc", "foo")).await;
    let a = fixture.install("file:a", consumer("svc", "(name=foo)")).await;
    fixture.container.start(a, StartOptions::TRANSIENT).await.unwrap();
    let (_, mut events) = fixture.container.module_event_collector().await;

    fixture.container.update(b, &provider("svc", "foo")).await.unwrap();

    let new_b = fixture.container.current_revision(b).await.unwrap().id();
    assert_eq!(fixture.container.module(a).await.unwrap().state(), ModuleState::Active);
    assert_eq!(fixture.container.wires(a).await[0].provider(), new_b);
    assert_eq!(fixture.activator.start_count(a), 2);
    assert!(event_types(&events.drain(), a).contains(&ModuleEventType::Unresolved));
}

#[tokio::test]
async fn test_update_without_refresh_keeps_old_wiring() {
    let mut config = ContainerConfig::default();
    config.lifecycle.refresh_on_update = false;
    let fixture = ContainerFixture::with_config(config);
    let b = fixture.install("file:b", provider("svc", "foo")).await;
    let a = fixture.install("file:a", consumer("svc", "(name=foo)")).await;
    fixture.container.resolve(&[a]).await.unwrap();
    let old_b = fixture.container.current_revision(b).await.unwrap().id();

    fixture.container.update(b, &provider("svc", "foo")).await.unwrap();

    assert_eq!(fixture.container.wires(a).await[0].provider(), old_b);
    assert_eq!(fixture.container.removal_pending().await.len(), 1);
}

#[tokio::test]
async fn test_refresh_event_targets_listeners() {
    let fixture = ContainerFixture::new();
    let a = fixture.install("file:a", provider("svc", "foo")).await;
    let (target, mut targeted) = fixture.container.container_event_collector().await;
    let (_, mut bystander) = fixture.container.container_event_collector().await;

    fixture.container.refresh(&[a], &[target]).await.unwrap();

    let received = targeted.drain();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].event_type, ContainerEventType::Refresh);
    assert_eq!(received[0].listeners, vec![target]);
    assert!(bystander.drain().is_empty());

    fixture.container.refresh(&[a], &[]).await.unwrap();

    assert_eq!(targeted.drain().len(), 1);
    assert_eq!(bystander.drain().len(), 1);
}

#[tokio::test]
async fn test_refresh_unknown_module() {
    let fixture = ContainerFixture::new();
    let result = fixture.container.refresh(&[99], &[]).await;
    assert!(matches!(result, Err(ModuleError::ModuleNotFound(_))));
}
