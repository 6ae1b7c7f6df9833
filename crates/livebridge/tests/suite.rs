//! The bundled live test cases, run across an in-process connection.

use std::sync::Once;

use anyhow::Result;
use livebridge::connected_pair;
use livebridge::environment::LoadedBefore;
use livebridge::suite::TestRegistry;
use livebridge::suite::register_builtin;
use livebridge::suite::run_case;

fn global() -> &'static TestRegistry {
    static REGISTER: Once = Once::new();
    REGISTER.call_once(|| {
        register_builtin(TestRegistry::global()).expect("builtin cases register once");
    });
    TestRegistry::global()
}

#[tokio::test]
async fn test_every_builtin_case_passes() -> Result<()> {
    livebridge::telemetry::init_for_tests();
    LoadedBefore::mark();
    let (initiator, responder) = connected_pair();

    let report = global().run_all(&initiator, &responder).await;
    assert_eq!(report.len(), 11);
    for (name, outcome) in &report {
        assert!(outcome.is_ok(), "{} failed: {:?}", name, outcome);
    }

    assert!(initiator.registry().is_empty());
    assert!(responder.registry().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_run_case_by_name() -> Result<()> {
    livebridge::telemetry::init_for_tests();
    global();
    let (initiator, responder) = connected_pair();

    run_case("Live.Tests.ClientToServerResultSerialization", &initiator, &responder).await?;
    run_case("Live.Tests.ServerToClientArgumentSerialization", &initiator, &responder).await?;
    run_case("Live.Tests.ChildParentRelationshipTest", &initiator, &responder).await?;
    run_case("Live.Tests.ClientToServerAsyncExceptionResult", &initiator, &responder).await?;

    // The roles are symmetric.
    run_case("Live.Tests.ServerToClientResultSerialization", &responder, &initiator).await?;
    Ok(())
}
