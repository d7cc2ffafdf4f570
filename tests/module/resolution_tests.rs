//! Resolution tests
//!
//! Tests for wiring requirements to capabilities through the container:
//! provider selection, failure reporting and all-or-nothing application.

use modwire::module::model::SERVICE_NAMESPACE;
use modwire::module::resolver::FailureReason;
use modwire::module::{
    CapabilityDescription, ModuleError, ModuleEventType, ModuleState, RequirementDescription,
    RevisionDescription,
};
use semver::Version;

use crate::module::test_utils::*;

fn versioned(namespace: &str, name: &str, version: Version) -> RevisionDescription {
    RevisionDescription::new().with_capability(
        CapabilityDescription::new(namespace)
            .attribute("name", name)
            .attribute("version", version),
    )
}

#[tokio::test]
async fn test_resolve_wires_requirement_to_provider() {
    let fixture = ContainerFixture::new();
    let (_, mut events) = fixture.container.module_event_collector().await;
    let b = fixture.install("file:b", provider("svc", "foo")).await;
    let a = fixture.install("file:a", consumer("svc", "(name=foo)")).await;

    fixture.container.resolve(&[a]).await.unwrap();

    let wires = fixture.container.wires(a).await;
    assert_eq!(wires.len(), 1);
    let b_revision = fixture.container.current_revision(b).await.unwrap().id();
    assert_eq!(wires[0].provider(), b_revision);
    assert_eq!(wires[0].requirement.index, 0);
    assert_eq!(fixture.container.consumers(b).await, wires);

    assert_eq!(fixture.container.module(a).await.unwrap().state(), ModuleState::Resolved);
    assert_eq!(fixture.container.module(b).await.unwrap().state(), ModuleState::Resolved);

    // providers resolve before their consumers
    let resolved: Vec<_> = events
        .drain()
        .into_iter()
        .filter(|e| e.event_type == ModuleEventType::Resolved)
        .map(|e| e.module)
        .collect();
    assert_eq!(resolved, vec![b, a]);
}

#[tokio::test]
async fn test_missing_mandatory_requirement_is_reported() {
    let fixture = ContainerFixture::new();
    let c = fixture.install("file:c", consumer("svc", "(name=absent)")).await;
    let (_, mut events) = fixture.container.module_event_collector().await;

    let result = fixture.container.resolve(&[c]).await;

    let Err(ModuleError::ResolutionFailed(report)) = result else {
        panic!("expected a resolution failure, got {:?}", result);
    };
    let entries: Vec<_> = report.for_module(c).collect();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].namespace, "svc");
    assert_eq!(entries[0].filter.as_deref(), Some("(name=absent)"));
    assert_eq!(entries[0].reason, FailureReason::NoCandidates);

    assert_eq!(fixture.container.module(c).await.unwrap().state(), ModuleState::Installed);
    assert!(events.drain().is_empty());
}

#[tokio::test]
async fn test_resolution_is_all_or_nothing() {
    let fixture = ContainerFixture::new();
    let b = fixture
        .install(
            "file:b",
            provider("svc", "foo").with_requirement(RequirementDescription::new("missing")),
        )
        .await;
    let a = fixture.install("file:a", consumer("svc", "(name=foo)")).await;
    let (_, mut events) = fixture.container.module_event_collector().await;

    let result = fixture.container.resolve(&[a]).await;

    let Err(ModuleError::ResolutionFailed(report)) = result else {
        panic!("expected a resolution failure, got {:?}", result);
    };
    assert!(report.modules().contains(&a));
    for id in [a, b] {
        assert_eq!(fixture.container.module(id).await.unwrap().state(), ModuleState::Installed);
        assert!(fixture.container.wires(id).await.is_empty());
    }
    assert!(events.drain().is_empty());
}

#[tokio::test]
async fn test_optional_requirement_resolves_without_provider() {
    let fixture = ContainerFixture::new();
    let a = fixture
        .install(
            "file:a",
            RevisionDescription::new().with_requirement(RequirementDescription::new("svc").optional()),
        )
        .await;

    fixture.container.resolve(&[a]).await.unwrap();

    assert_eq!(fixture.container.module(a).await.unwrap().state(), ModuleState::Resolved);
    assert!(fixture.container.wires(a).await.is_empty());
}

#[tokio::test]
async fn test_resolve_all_is_best_effort() {
    let fixture = ContainerFixture::new();
    let good = fixture.install("file:good", provider("svc", "foo")).await;
    let user = fixture.install("file:user", consumer("svc", "(name=foo)")).await;
    let broken = fixture.install("file:broken", consumer("svc", "(name=bar)")).await;

    let report = fixture.container.resolve_all().await.unwrap();

    assert_eq!(report.modules().into_iter().collect::<Vec<_>>(), vec![broken]);
    for id in [good, user] {
        assert_eq!(fixture.container.module(id).await.unwrap().state(), ModuleState::Resolved);
    }
    assert_eq!(fixture.container.module(broken).await.unwrap().state(), ModuleState::Installed);
}

#[tokio::test]
async fn test_resolving_resolved_module_is_silent() {
    let fixture = ContainerFixture::new();
    let a = fixture.install("file:a", RevisionDescription::new()).await;
    fixture.container.resolve(&[a]).await.unwrap();
    let (_, mut events) = fixture.container.module_event_collector().await;

    fixture.container.resolve(&[a]).await.unwrap();

    assert!(events.drain().is_empty());
}

#[tokio::test]
async fn test_higher_version_preferred() {
    let fixture = ContainerFixture::new();
    fixture.install("file:v1", versioned("svc", "foo", Version::new(1, 0, 0))).await;
    let v2 = fixture.install("file:v2", versioned("svc", "foo", Version::new(2, 0, 0))).await;
    let a = fixture.install("file:a", consumer("svc", "(name=foo)")).await;

    fixture.container.resolve(&[a]).await.unwrap();

    let v2_revision = fixture.container.current_revision(v2).await.unwrap().id();
    assert_eq!(fixture.container.wires(a).await[0].provider(), v2_revision);
}

#[tokio::test]
async fn test_resolved_provider_preferred_over_newer_version() {
    let fixture = ContainerFixture::new();
    let v1 = fixture.install("file:v1", versioned("svc", "foo", Version::new(1, 0, 0))).await;
    fixture.container.resolve(&[v1]).await.unwrap();
    fixture.install("file:v2", versioned("svc", "foo", Version::new(2, 0, 0))).await;
    let a = fixture.install("file:a", consumer("svc", "(name=foo)")).await;

    fixture.container.resolve(&[a]).await.unwrap();

    let v1_revision = fixture.container.current_revision(v1).await.unwrap().id();
    assert_eq!(fixture.container.wires(a).await[0].provider(), v1_revision);
}

#[tokio::test]
async fn test_version_range_limits_candidates() {
    let fixture = ContainerFixture::new();
    let v1 = fixture.install("file:v1", versioned("svc", "foo", Version::new(1, 4, 0))).await;
    fixture.install("file:v2", versioned("svc", "foo", Version::new(2, 0, 0))).await;
    let a = fixture
        .install(
            "file:a",
            RevisionDescription::new().with_requirement(
                RequirementDescription::new("svc")
                    .filter("(name=foo)")
                    .version_range(">=1.0, <2.0"),
            ),
        )
        .await;

    fixture.container.resolve(&[a]).await.unwrap();

    let v1_revision = fixture.container.current_revision(v1).await.unwrap().id();
    assert_eq!(fixture.container.wires(a).await[0].provider(), v1_revision);
}

#[tokio::test]
async fn test_multiple_cardinality_wires_every_provider() {
    let fixture = ContainerFixture::new();
    fixture.install("file:p1", provider(SERVICE_NAMESPACE, "log")).await;
    fixture.install("file:p2", provider(SERVICE_NAMESPACE, "log")).await;
    let a = fixture
        .install(
            "file:a",
            RevisionDescription::new().with_requirement(
                RequirementDescription::new(SERVICE_NAMESPACE)
                    .filter("(name=log)")
                    .multiple(),
            ),
        )
        .await;

    fixture.container.resolve(&[a]).await.unwrap();

    assert_eq!(fixture.container.wires(a).await.len(), 2);
}

#[tokio::test]
async fn test_find_providers() {
    let fixture = ContainerFixture::new();
    let b = fixture.install("file:b", provider("svc", "foo")).await;
    fixture.install("file:c", provider("svc", "bar")).await;

    let providers = fixture
        .container
        .find_providers(&RequirementDescription::new("svc").filter("(name=foo)"))
        .await
        .unwrap();

    assert_eq!(providers.len(), 1);
    assert_eq!(providers[0].module(), b);
}
