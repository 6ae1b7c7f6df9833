//! # Live Test Cases
//!
//! Named, end-to-end checks that run across a real connection.
//!
//! ## Architecture
//!
//! A case has two halves:
//! - **Case** (`LiveTest`): runs on the initiating peer and drives the check.
//! - **Fixture**: exported on the responding peer; the case calls it through the bridge.
//!
//! Cases are looked up by qualified name (`"Live.Tests.WidgetIsATable"`) in an explicit
//! `TestRegistry`. Names are registered once; nothing is created implicitly.

mod cases;
mod fixtures;

#[cfg(test)]
mod tests;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::OnceLock;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use livepack::Value;
use liverpc::ErrorInfo;
use liverpc::ObjectId;

use crate::peer::CallError;
use crate::peer::CallFuture;
use crate::peer::Peer;
use crate::registry::RemoteObject;

pub use cases::register_builtin;
pub use fixtures::Fixture;
pub use fixtures::family;

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// A case with this name is already registered.
    DuplicateName(String),
    /// No case is registered under this name.
    UnknownCase(String),
    /// The case ran and its check failed.
    Failed { name: String, failure: TestFailure },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateName(name) => write!(f, "Test case already registered: {}", name),
            Self::UnknownCase(name) => write!(f, "No such test case: {}", name),
            Self::Failed { name, failure } => write!(f, "{} failed: {}", name, failure),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// A failed check inside a case.
#[derive(Debug, Clone, PartialEq)]
pub struct TestFailure {
    pub message: String,
}

impl TestFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }

    /// Fails unless `actual == expected`.
    pub fn ensure_eq<T>(what: &str, actual: T, expected: T) -> std::result::Result<(), Self>
    where
        T: PartialEq + std::fmt::Debug,
    {
        if actual == expected {
            Ok(())
        } else {
            Err(Self::new(format!("{}: expected {:?}, got {:?}", what, expected, actual)))
        }
    }
}

impl std::fmt::Display for TestFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for TestFailure {}

impl From<CallError> for TestFailure {
    fn from(e: CallError) -> Self {
        Self::new(e.to_string())
    }
}

impl From<crate::widget::Error> for TestFailure {
    fn from(e: crate::widget::Error) -> Self {
        Self::new(e.to_string())
    }
}

/// The initiator-side half of a live test case.
#[async_trait::async_trait]
pub trait LiveTest: Send + Sync + 'static {
    /// Runs the check.
    async fn run(&self, ctx: &TestContext) -> std::result::Result<(), TestFailure>;

    /// Serves a `reverse` call from the fixture. `None` means this case does not take one.
    async fn reverse(&self, _args: Vec<Value>) -> Option<std::result::Result<Value, ErrorInfo>> {
        None
    }
}

/// What a running case can see.
pub struct TestContext {
    /// The initiating peer.
    pub peer: Peer,
    /// The case's fixture on the responding peer.
    pub counterpart: ObjectId,
}

impl TestContext {
    /// Calls `method` on the fixture.
    pub fn call_remote(&self, method: &str, args: Vec<Value>) -> CallFuture {
        self.peer.call(self.counterpart, method, args)
    }
}

/// Exports a `LiveTest` so its fixture can call back into it.
pub struct TestCase {
    name: String,
    test: Arc<dyn LiveTest>,
}

impl TestCase {
    pub fn new(name: impl Into<String>, test: Arc<dyn LiveTest>) -> Self {
        Self { name: name.into(), test }
    }
}

#[async_trait::async_trait]
impl RemoteObject for TestCase {
    async fn handle_call(
        &self,
        _peer: &Peer,
        method: &str,
        args: Vec<Value>,
    ) -> std::result::Result<Value, ErrorInfo> {
        let unsupported = || ErrorInfo::domain(format!("{} has no such method: {}", self.name, method));
        match method {
            "reverse" => self.test.reverse(args).await.unwrap_or_else(|| Err(unsupported())),
            _ => Err(unsupported()),
        }
    }
}

type Factory = Arc<dyn Fn() -> Arc<dyn LiveTest> + Send + Sync>;

#[derive(Clone)]
struct Registration {
    factory: Factory,
    fixture: Fixture,
}

/// Named live test cases.
pub struct TestRegistry {
    entries: DashMap<String, Registration>,
}

impl TestRegistry {
    pub fn new() -> Self {
        Self { entries: DashMap::new() }
    }

    /// The process-wide registry.
    pub fn global() -> &'static TestRegistry {
        static GLOBAL: OnceLock<TestRegistry> = OnceLock::new();
        GLOBAL.get_or_init(TestRegistry::new)
    }

    /// Registers a case under a qualified name.
    ///
    /// # Errors
    /// Returns `Error::DuplicateName` if the name is taken.
    pub fn register<F>(&self, name: impl Into<String>, factory: F, fixture: Fixture) -> Result<()>
    where
        F: Fn() -> Arc<dyn LiveTest> + Send + Sync + 'static,
    {
        match self.entries.entry(name.into()) {
            Entry::Occupied(entry) => Err(Error::DuplicateName(entry.key().clone())),
            Entry::Vacant(entry) => {
                tracing::debug!(name = %entry.key(), ?fixture, "registered test case");
                entry.insert(Registration { factory: Arc::new(factory), fixture });
                Ok(())
            }
        }
    }

    /// Builds a fresh instance of the named case, with the fixture it runs against.
    pub fn get(&self, name: &str) -> Option<(Arc<dyn LiveTest>, Fixture)> {
        let registration = self.entries.get(name)?.value().clone();
        Some(((registration.factory)(), registration.fixture))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Runs one case: exports the case on `initiator` and its fixture on `responder`,
    /// runs the check, then disposes everything it exported.
    pub async fn run(&self, name: &str, initiator: &Peer, responder: &Peer) -> Result<()> {
        let (test, fixture) = self
            .get(name)
            .ok_or_else(|| Error::UnknownCase(name.to_string()))?;

        let case_id = initiator.export(Arc::new(TestCase::new(name, test.clone())));
        let installed = fixture.install(responder, case_id);
        let ctx = TestContext {
            peer: initiator.clone(),
            counterpart: installed.counterpart,
        };

        tracing::info!(case = name, %case_id, fixture = %installed.counterpart, "running live test");
        let outcome = test.run(&ctx).await;

        initiator.registry().dispose(case_id);
        for id in &installed.owned {
            responder.registry().dispose(*id);
        }

        match outcome {
            Ok(()) => {
                tracing::info!(case = name, "passed");
                Ok(())
            }
            Err(failure) => {
                tracing::warn!(case = name, %failure, "failed");
                Err(Error::Failed { name: name.to_string(), failure })
            }
        }
    }

    /// Runs every registered case in name order, one after another.
    pub async fn run_all(&self, initiator: &Peer, responder: &Peer) -> BTreeMap<String, Result<()>> {
        let mut report = BTreeMap::new();
        for name in self.names() {
            let outcome = self.run(&name, initiator, responder).await;
            report.insert(name, outcome);
        }
        report
    }
}

impl Default for TestRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs a case from the global registry.
pub async fn run_case(name: &str, initiator: &Peer, responder: &Peer) -> Result<()> {
    TestRegistry::global().run(name, initiator, responder).await
}
