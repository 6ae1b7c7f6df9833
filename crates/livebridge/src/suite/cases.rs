//! The bundled live test cases.

use std::sync::Arc;

use livepack::Value;
use livepack::list;
use livepack::map;
use liverpc::ErrorInfo;

use super::Fixture;
use super::LiveTest;
use super::Result;
use super::TestContext;
use super::TestFailure;
use super::TestRegistry;
use crate::environment::LoadedBefore;
use crate::peer::CallError;
use crate::widget::RemoteWidget;

type Outcome = std::result::Result<(), TestFailure>;

const RAISED: &str = "This exception should appear on the client.";

/// Registers every bundled case under `Live.Tests.*`.
///
/// # Errors
/// Fails on the first name that is already taken.
pub fn register_builtin(registry: &TestRegistry) -> Result<()> {
    registry.register("Live.Tests.ClientToServerArgumentSerialization", || Arc::new(ArgumentSerialization), Fixture::Echo)?;
    registry.register("Live.Tests.ClientToServerResultSerialization", || Arc::new(ResultSerialization), Fixture::Echo)?;
    registry.register("Live.Tests.ClientToServerExceptionResult", || Arc::new(ExceptionResult { method: "testSync" }), Fixture::Raise)?;
    registry.register("Live.Tests.ClientToServerAsyncExceptionResult", || Arc::new(ExceptionResult { method: "testAsync" }), Fixture::Raise)?;
    registry.register("Live.Tests.ServerToClientArgumentSerialization", || Arc::new(ReverseArguments), Fixture::ReverseArgs)?;
    registry.register("Live.Tests.ServerToClientResultSerialization", || Arc::new(ReverseResult), Fixture::ReverseResult)?;
    registry.register("Live.Tests.WidgetInATable", || Arc::new(NothingToDo), Fixture::Inert)?;
    registry.register("Live.Tests.WidgetIsATable", || Arc::new(NothingToDo), Fixture::Inert)?;
    registry.register("Live.Tests.ChildParentRelationshipTest", || Arc::new(ChildParentRelationship), Fixture::WidgetTree)?;
    registry.register("Live.Tests.AutomaticClass", || Arc::new(NothingToDo), Fixture::Inert)?;
    registry.register(
        "Live.Tests.ImportBeforeLiteralJavaScript",
        || Arc::new(ImportBeforeLiteral { loaded: LoadedBefore::is_set }),
        Fixture::Inert,
    )?;
    Ok(())
}

fn sample_args() -> Vec<Value> {
    vec![
        Value::from(1),
        Value::from(1.5),
        Value::from("Hello world"),
        list![1, 1.5, "Hello world"],
        map! { "hello world" => "object value" },
    ]
}

/// Sends a mix of scalars and containers; only delivery is checked.
struct ArgumentSerialization;

#[async_trait::async_trait]
impl LiveTest for ArgumentSerialization {
    async fn run(&self, ctx: &TestContext) -> Outcome {
        ctx.call_remote("test", sample_args()).await?;
        Ok(())
    }
}

/// Sends the same mix and checks the echo element by element.
struct ResultSerialization;

#[async_trait::async_trait]
impl LiveTest for ResultSerialization {
    async fn run(&self, ctx: &TestContext) -> Outcome {
        let result = ctx.call_remote("test", sample_args()).await?;

        let at = |path: &[usize]| path.iter().try_fold(&result, |v, i| v.index(*i));
        TestFailure::ensure_eq("result[0]", at(&[0]), Some(&Value::from(1)))?;
        TestFailure::ensure_eq("result[1]", at(&[1]), Some(&Value::from(1.5)))?;
        TestFailure::ensure_eq("result[2]", at(&[2]), Some(&Value::from("Hello world")))?;
        TestFailure::ensure_eq("result[3][0]", at(&[3, 0]), Some(&Value::from(1)))?;
        TestFailure::ensure_eq("result[3][1]", at(&[3, 1]), Some(&Value::from(1.5)))?;
        TestFailure::ensure_eq("result[3][2]", at(&[3, 2]), Some(&Value::from("Hello world")))?;
        TestFailure::ensure_eq(
            "result[4]['hello world']",
            at(&[4]).and_then(|o| o.get("hello world")),
            Some(&Value::from("object value")),
        )
    }
}

/// Asks the fixture to fail and looks for the original message in the failure.
struct ExceptionResult {
    method: &'static str,
}

#[async_trait::async_trait]
impl LiveTest for ExceptionResult {
    async fn run(&self, ctx: &TestContext) -> Outcome {
        match ctx.call_remote(self.method, vec![Value::from(RAISED)]).await {
            Ok(result) => Err(TestFailure::new(format!("Erroneously received a result: {:?}", result))),
            Err(CallError::Remote(info)) if info.contains(RAISED) => Ok(()),
            Err(e) => Err(TestFailure::new(format!("Did not find expected message in error: {}", e))),
        }
    }
}

/// The fixture calls back into `reverse` with a fixed payload, which is checked here.
struct ReverseArguments;

#[async_trait::async_trait]
impl LiveTest for ReverseArguments {
    async fn run(&self, ctx: &TestContext) -> Outcome {
        ctx.call_remote("test", vec![]).await?;
        Ok(())
    }

    async fn reverse(&self, args: Vec<Value>) -> Option<std::result::Result<Value, ErrorInfo>> {
        let check = || -> Outcome {
            TestFailure::ensure_eq("argument count", args.len(), 4)?;
            TestFailure::ensure_eq("i", args.first(), Some(&Value::from(1)))?;
            TestFailure::ensure_eq("f", args.get(1), Some(&Value::from(1.5)))?;
            TestFailure::ensure_eq("s", args.get(2), Some(&Value::from("hello")))?;
            TestFailure::ensure_eq(
                "o['world']",
                args.get(3).and_then(|o| o.get("world")),
                Some(&Value::from("value")),
            )
        };
        Some(
            check()
                .map(|()| Value::Null)
                .map_err(|failure| ErrorInfo::domain(failure.message)),
        )
    }
}

/// The fixture calls back into `reverse` and checks the returned payload.
struct ReverseResult;

#[async_trait::async_trait]
impl LiveTest for ReverseResult {
    async fn run(&self, ctx: &TestContext) -> Outcome {
        ctx.call_remote("test", vec![]).await?;
        Ok(())
    }

    async fn reverse(&self, _args: Vec<Value>) -> Option<std::result::Result<Value, ErrorInfo>> {
        Some(Ok(list![1, 1.5, "hello", map! { "world" => "value" }]))
    }
}

/// Walks the fixture's widget tree across the bridge.
struct ChildParentRelationship;

#[async_trait::async_trait]
impl LiveTest for ChildParentRelationship {
    async fn run(&self, ctx: &TestContext) -> Outcome {
        let root = RemoteWidget::new(ctx.peer.clone(), ctx.counterpart);
        let count = root.child_count().await?;
        tracing::debug!(count, "discovered children");
        root.verify_subtree().await?;
        Ok(())
    }
}

/// The loader must have run before this case's code.
pub(crate) struct ImportBeforeLiteral {
    /// Reads the loaded-before flag; `LoadedBefore::is_set` outside tests.
    pub(crate) loaded: fn() -> bool,
}

#[async_trait::async_trait]
impl LiveTest for ImportBeforeLiteral {
    async fn run(&self, _ctx: &TestContext) -> Outcome {
        if (self.loaded)() {
            Ok(())
        } else {
            Err(TestFailure::new("loaded-before flag was not set"))
        }
    }
}

/// Rendering-only cases: there is nothing to check on the bridge.
struct NothingToDo;

#[async_trait::async_trait]
impl LiveTest for NothingToDo {
    async fn run(&self, _ctx: &TestContext) -> Outcome {
        Ok(())
    }
}
