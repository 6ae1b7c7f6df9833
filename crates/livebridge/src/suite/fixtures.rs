//! Responder-side counterparts of the bundled cases.

use std::sync::Arc;

use livepack::Value;
use livepack::list;
use livepack::map;
use liverpc::ErrorInfo;
use liverpc::ObjectId;

use crate::peer::CallError;
use crate::peer::Peer;
use crate::registry::RemoteObject;
use crate::widget::WidgetNode;
use crate::widget::WidgetTree;

/// The object a case talks to on the responding peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fixture {
    /// `test(..)` answers with its arguments as a list.
    Echo,
    /// `testSync(msg)` fails at once; `testAsync(msg)` fails after suspending.
    Raise,
    /// `test()` calls the case's `reverse` with a fixed payload.
    ReverseArgs,
    /// `test()` calls the case's `reverse` and checks what comes back.
    ReverseResult,
    /// A small widget tree; the case talks to its root.
    WidgetTree,
    /// Answers nothing.
    Inert,
}

/// What a fixture left in the responder's registry.
pub(crate) struct Installed {
    pub counterpart: ObjectId,
    pub owned: Vec<ObjectId>,
}

impl Fixture {
    pub(crate) fn install(self, responder: &Peer, case_id: ObjectId) -> Installed {
        match self {
            Fixture::WidgetTree => {
                let tree = WidgetTree::new(responder.registry().clone());
                let root = family(&tree);
                Installed {
                    counterpart: root.id(),
                    owned: root.descendants().iter().map(|node| node.id()).collect(),
                }
            }
            kind => {
                let id = responder.export(Arc::new(FixtureObject { kind, case_id }));
                Installed { counterpart: id, owned: vec![id] }
            }
        }
    }
}

/// A parent with three children; the middle child has two of its own.
pub fn family(tree: &WidgetTree) -> Arc<WidgetNode> {
    let root = tree.root("parent");
    for i in 0..3 {
        let child = tree.child(&root, format!("child-{}", i));
        if i == 1 {
            tree.child(&child, "grandchild-0");
            tree.child(&child, "grandchild-1");
        }
    }
    root
}

/// The payload both reverse fixtures exchange with the case.
pub(crate) fn reverse_payload() -> Vec<Value> {
    vec![
        Value::from(1),
        Value::from(1.5),
        Value::from("hello"),
        map! { "world" => "value" },
    ]
}

struct FixtureObject {
    kind: Fixture,
    /// The case on the initiating peer, for callbacks.
    case_id: ObjectId,
}

impl FixtureObject {
    fn no_such_method(&self, method: &str) -> ErrorInfo {
        ErrorInfo::domain(format!("{:?} fixture has no such method: {}", self.kind, method))
    }

    fn raised(args: &[Value]) -> ErrorInfo {
        let message = args.first().and_then(Value::as_str).unwrap_or("no message given");
        ErrorInfo::domain(format!("Raised on request: {}", message))
            .with_detail(list!["fixture", "raise"])
    }
}

/// Callback failures keep the remote message when there is one.
fn relay(e: CallError) -> ErrorInfo {
    match e {
        CallError::Remote(info) => info,
        other => ErrorInfo::domain(other.to_string()),
    }
}

#[async_trait::async_trait]
impl RemoteObject for FixtureObject {
    async fn handle_call(
        &self,
        peer: &Peer,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Value, ErrorInfo> {
        match (self.kind, method) {
            (Fixture::Echo, "test") => Ok(Value::List(args)),

            (Fixture::Raise, "testSync") => Err(Self::raised(&args)),
            (Fixture::Raise, "testAsync") => {
                tokio::task::yield_now().await;
                Err(Self::raised(&args))
            }

            (Fixture::ReverseArgs, "test") => {
                peer.call(self.case_id, "reverse", reverse_payload())
                    .await
                    .map_err(relay)?;
                Ok(Value::Null)
            }

            (Fixture::ReverseResult, "test") => {
                let result = peer.call(self.case_id, "reverse", vec![]).await.map_err(relay)?;
                let expected = Value::List(reverse_payload());
                if result != expected {
                    return Err(ErrorInfo::domain(format!(
                        "reverse returned {:?}, expected {:?}",
                        result, expected
                    )));
                }
                Ok(Value::Null)
            }

            _ => Err(self.no_such_method(method)),
        }
    }
}
