use std::sync::Arc;

use super::*;
use super::cases::ImportBeforeLiteral;
use crate::connected_pair;

struct AlwaysFails;

#[async_trait::async_trait]
impl LiveTest for AlwaysFails {
    async fn run(&self, _ctx: &TestContext) -> std::result::Result<(), TestFailure> {
        Err(TestFailure::new("deliberate"))
    }
}

#[test]
fn test_register_builtin() {
    let registry = TestRegistry::new();
    register_builtin(&registry).expect("fresh registry");

    assert_eq!(registry.len(), 11);
    let names = registry.names();
    let mut sorted = names.clone();
    sorted.sort();
    assert_eq!(names, sorted);
    assert!(names.iter().all(|n| n.starts_with("Live.Tests.")));
    assert!(registry.contains("Live.Tests.ChildParentRelationshipTest"));

    assert!(registry.contains("Live.Tests.ImportBeforeLiteralJavaScript"));

    let (_, fixture) = registry.get("Live.Tests.ClientToServerAsyncExceptionResult").expect("registered");
    assert_eq!(fixture, Fixture::Raise);
    assert!(registry.get("Live.Tests.Nope").is_none());
}

#[test]
fn test_duplicate_names_rejected() {
    let registry = TestRegistry::new();
    registry
        .register("Live.Tests.Once", || Arc::new(AlwaysFails), Fixture::Inert)
        .expect("first registration");

    assert_eq!(
        registry.register("Live.Tests.Once", || Arc::new(AlwaysFails), Fixture::Echo),
        Err(Error::DuplicateName("Live.Tests.Once".into()))
    );
    assert_eq!(registry.len(), 1);

    // Registering the bundle twice trips on its first name.
    let registry = TestRegistry::new();
    register_builtin(&registry).expect("fresh registry");
    assert!(matches!(register_builtin(&registry), Err(Error::DuplicateName(_))));
}

#[tokio::test]
async fn test_run_reports_failures_and_cleans_up() {
    let (initiator, responder) = connected_pair();
    let registry = TestRegistry::new();
    registry
        .register("Live.Tests.AlwaysFails", || Arc::new(AlwaysFails), Fixture::Echo)
        .expect("registration");

    match registry.run("Live.Tests.AlwaysFails", &initiator, &responder).await {
        Err(Error::Failed { name, failure }) => {
            assert_eq!(name, "Live.Tests.AlwaysFails");
            assert_eq!(failure.message, "deliberate");
        }
        other => panic!("Expected failure, got {:?}", other),
    }
    assert!(initiator.registry().is_empty());
    assert!(responder.registry().is_empty());

    assert_eq!(
        registry.run("Live.Tests.Missing", &initiator, &responder).await,
        Err(Error::UnknownCase("Live.Tests.Missing".into()))
    );
}

#[tokio::test]
async fn test_case_without_reverse() {
    let (initiator, responder) = connected_pair();
    let case = initiator.export(Arc::new(TestCase::new("Live.Tests.AlwaysFails", Arc::new(AlwaysFails))));

    let err = responder.call(case, "reverse", vec![]).await.unwrap_err();
    assert!(err.message().is_some_and(|m| m.contains("no such method")), "got {}", err);
}

#[test]
fn test_ensure_eq() {
    assert_eq!(TestFailure::ensure_eq("n", 1, 1), Ok(()));
    let failure = TestFailure::ensure_eq("n", 1, 2).unwrap_err();
    assert_eq!(failure.message, "n: expected 2, got 1");
}

#[tokio::test]
async fn test_import_before_literal_needs_the_flag() {
    let (initiator, responder) = connected_pair();
    let registry = TestRegistry::new();
    registry
        .register("Live.Tests.Loaded", || Arc::new(ImportBeforeLiteral { loaded: || true }), Fixture::Inert)
        .expect("registration");
    registry
        .register("Live.Tests.NotLoaded", || Arc::new(ImportBeforeLiteral { loaded: || false }), Fixture::Inert)
        .expect("registration");

    assert_eq!(registry.run("Live.Tests.Loaded", &initiator, &responder).await, Ok(()));
    match registry.run("Live.Tests.NotLoaded", &initiator, &responder).await {
        Err(Error::Failed { failure, .. }) => assert!(failure.message.contains("loaded-before"), "got {}", failure.message),
        other => panic!("Expected failure, got {:?}", other),
    }
}
