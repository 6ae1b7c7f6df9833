//! # Widget Tree
//!
//! A hierarchy of remotely addressable nodes.
//!
//! ## Ownership
//!
//! A node owns its children (`Arc`) and only refers to its parent (`Weak`), so parent links
//! never form a cycle. The registry also holds every exported node, so a subtree is only
//! released once `WidgetTree::dispose` has removed it from the registry and the last
//! outside handle is gone.
//!
//! ## Invariants
//! - **Set-Once Parent**: A node is attached at construction and never reparented.
//! - **Exactly Once**: A node with parent `p` appears in `p.children` exactly once.
//! - **Exported**: Every node created by a `WidgetTree` is in its registry, so the other
//!   side can query it.

use std::sync::Arc;
use std::sync::OnceLock;
use std::sync::RwLock;
use std::sync::RwLockReadGuard;
use std::sync::PoisonError;
use std::sync::Weak;

use futures::FutureExt;
use futures::future::BoxFuture;
use livepack::Value;
use liverpc::ErrorInfo;
use liverpc::ObjectId;

use crate::deferred::join_all;
use crate::peer::CallError;
use crate::peer::Peer;
use crate::registry::ObjectRegistry;
use crate::registry::RemoteObject;

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// The child already has a parent.
    AlreadyAttached(ObjectId),
    /// Attaching would make a node its own ancestor.
    Cycle(ObjectId),
    /// A node's view of its children or parent does not hold up.
    Inconsistent(String),
    /// A remote query failed.
    Call(CallError),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyAttached(id) => write!(f, "{} already has a parent", id),
            Self::Cycle(id) => write!(f, "Attaching {} would create a cycle", id),
            Self::Inconsistent(msg) => write!(f, "Inconsistent tree: {}", msg),
            Self::Call(e) => write!(f, "Remote query failed: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Call(e) => Some(e),
            _ => None,
        }
    }
}

impl From<CallError> for Error {
    fn from(e: CallError) -> Self {
        Self::Call(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// One node of a widget tree.
pub struct WidgetNode {
    id: ObjectId,
    name: String,
    parent: OnceLock<Weak<WidgetNode>>,
    children: RwLock<Vec<Arc<WidgetNode>>>,
}

impl WidgetNode {
    fn new(id: ObjectId, name: String) -> Self {
        Self {
            id,
            name,
            parent: OnceLock::new(),
            children: RwLock::new(Vec::new()),
        }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The parent, if this node has one and it is still alive.
    pub fn parent(&self) -> Option<Arc<WidgetNode>> {
        self.parent.get().and_then(Weak::upgrade)
    }

    fn read_children(&self) -> RwLockReadGuard<'_, Vec<Arc<WidgetNode>>> {
        self.children.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn children(&self) -> Vec<Arc<WidgetNode>> {
        self.read_children().clone()
    }

    pub fn child_count(&self) -> usize {
        self.read_children().len()
    }

    /// True if `candidate` is this node's parent (by identity, not by name).
    pub fn check_parent(&self, candidate: &Arc<WidgetNode>) -> bool {
        self.parent().is_some_and(|parent| Arc::ptr_eq(&parent, candidate))
    }

    /// This node and everything below it, depth-first pre-order.
    pub fn descendants(self: &Arc<Self>) -> Vec<Arc<WidgetNode>> {
        let mut out = Vec::new();
        let mut stack = vec![self.clone()];
        while let Some(node) = stack.pop() {
            stack.extend(node.read_children().iter().rev().cloned());
            out.push(node);
        }
        out
    }

    /// Checks the whole subtree: every child points back at its parent and appears
    /// among its parent's children exactly once.
    pub fn verify(self: &Arc<Self>) -> Result<()> {
        for node in self.descendants() {
            let children = node.children();
            for child in &children {
                if !child.check_parent(&node) {
                    return Err(Error::Inconsistent(format!(
                        "{} is listed under {} but does not point back",
                        child.id, node.id
                    )));
                }
                let listed = children.iter().filter(|c| Arc::ptr_eq(c, child)).count();
                if listed != 1 {
                    return Err(Error::Inconsistent(format!(
                        "{} is listed {} times under {}",
                        child.id, listed, node.id
                    )));
                }
            }
        }
        Ok(())
    }

    fn describe(&self) -> Value {
        Value::from(self.id)
    }
}

#[async_trait::async_trait]
impl RemoteObject for WidgetNode {
    async fn handle_call(
        &self,
        _peer: &Peer,
        method: &str,
        args: Vec<Value>,
    ) -> std::result::Result<Value, ErrorInfo> {
        match method {
            "getChildCount" => Ok(Value::from(self.child_count())),
            "checkParent" => {
                let candidate = args
                    .first()
                    .and_then(Value::as_u64)
                    .map(ObjectId)
                    .ok_or_else(|| ErrorInfo::domain("checkParent expects an object id"))?;
                let matches = self.parent().is_some_and(|parent| parent.id == candidate);
                Ok(Value::Bool(matches))
            }
            "getChildren" => Ok(Value::List(
                self.read_children().iter().map(|child| child.describe()).collect(),
            )),
            "getParent" => Ok(self.parent().map_or(Value::Null, |parent| parent.describe())),
            "getName" => Ok(Value::from(self.name.as_str())),
            other => Err(ErrorInfo::domain(format!("{} has no such method: {}", self.id, other))),
        }
    }
}

/// Creates nodes and exports each one into a registry.
#[derive(Clone)]
pub struct WidgetTree {
    registry: ObjectRegistry,
}

impl WidgetTree {
    pub fn new(registry: ObjectRegistry) -> Self {
        Self { registry }
    }

    /// Creates a parentless node.
    pub fn root(&self, name: impl Into<String>) -> Arc<WidgetNode> {
        let name = name.into();
        let (_, node) = self.registry.export_with(|id| WidgetNode::new(id, name));
        tracing::debug!(id = %node.id, name = %node.name, "created widget");
        node
    }

    /// Creates a node already attached under `parent`.
    pub fn child(&self, parent: &Arc<WidgetNode>, name: impl Into<String>) -> Arc<WidgetNode> {
        let node = self.root(name);
        // A brand-new node has no parent and no descendants, so attaching cannot fail.
        if let Err(e) = self.attach(parent, &node) {
            tracing::error!(error = %e, "attaching a fresh widget failed");
        }
        node
    }

    /// Appends `child` to `parent`'s children and points `child` back at `parent`.
    pub fn attach(&self, parent: &Arc<WidgetNode>, child: &Arc<WidgetNode>) -> Result<()> {
        let mut ancestor = Some(parent.clone());
        while let Some(node) = ancestor {
            if Arc::ptr_eq(&node, child) {
                return Err(Error::Cycle(child.id));
            }
            ancestor = node.parent();
        }

        child
            .parent
            .set(Arc::downgrade(parent))
            .map_err(|_| Error::AlreadyAttached(child.id))?;
        parent
            .children
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(child.clone());
        tracing::debug!(parent = %parent.id, child = %child.id, "attached widget");
        Ok(())
    }

    /// Withdraws `node` and its whole subtree from the registry.
    pub fn dispose(&self, node: &Arc<WidgetNode>) -> usize {
        node.descendants()
            .iter()
            .filter(|n| self.registry.dispose(n.id))
            .count()
    }
}

/// The caller-side view of a widget living on the other side of a connection.
#[derive(Clone)]
pub struct RemoteWidget {
    peer: Peer,
    id: ObjectId,
}

impl RemoteWidget {
    pub fn new(peer: Peer, id: ObjectId) -> Self {
        Self { peer, id }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub async fn child_count(&self) -> Result<usize> {
        let value = self.peer.call(self.id, "getChildCount", vec![]).await?;
        value
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| unexpected("getChildCount", &value))
    }

    pub async fn check_parent(&self, candidate: ObjectId) -> Result<bool> {
        let value = self.peer.call(self.id, "checkParent", vec![Value::from(candidate)]).await?;
        value.as_bool().ok_or_else(|| unexpected("checkParent", &value))
    }

    pub async fn children(&self) -> Result<Vec<RemoteWidget>> {
        let value = self.peer.call(self.id, "getChildren", vec![]).await?;
        let ids = value.as_list().ok_or_else(|| unexpected("getChildren", &value))?;
        ids.iter()
            .map(|id| {
                id.as_u64()
                    .map(|id| RemoteWidget::new(self.peer.clone(), ObjectId(id)))
                    .ok_or_else(|| unexpected("getChildren", &value))
            })
            .collect()
    }

    pub async fn parent(&self) -> Result<Option<ObjectId>> {
        let value = self.peer.call(self.id, "getParent", vec![]).await?;
        if value.is_null() {
            return Ok(None);
        }
        value
            .as_u64()
            .map(|id| Some(ObjectId(id)))
            .ok_or_else(|| unexpected("getParent", &value))
    }

    pub async fn name(&self) -> Result<String> {
        let value = self.peer.call(self.id, "getName", vec![]).await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| unexpected("getName", &value))
    }

    /// Checks the remote subtree rooted here.
    ///
    /// For every node, the reported child count must match the listed children and every
    /// child must acknowledge the node as its parent. Children are checked concurrently
    /// and the first failure wins.
    pub fn verify_subtree(&self) -> BoxFuture<'_, Result<()>> {
        async move {
            let (count, children) = tokio::try_join!(self.child_count(), self.children())?;
            tracing::debug!(id = %self.id, count, "verifying remote widget");
            if count != children.len() {
                return Err(Error::Inconsistent(format!(
                    "{} reports {} children but lists {}",
                    self.id,
                    count,
                    children.len()
                )));
            }

            let checks = join_all(children.iter().map(|child| async move {
                if !child.check_parent(self.id).await? {
                    return Err(Error::Inconsistent(format!(
                        "{} does not recognize {} as its parent",
                        child.id, self.id
                    )));
                }
                child.verify_subtree().await
            }))
            .await;

            match checks {
                Ok(_) => Ok(()),
                Err(failure) => Err(failure.into_inner().unwrap_or_else(|| {
                    Error::Inconsistent("subtree check was abandoned".into())
                })),
            }
        }
        .boxed()
    }
}

fn unexpected(method: &str, value: &Value) -> Error {
    Error::Inconsistent(format!("{} returned a {}", method, value.kind()))
}
