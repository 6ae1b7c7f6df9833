//! Widget trees queried across a connection.

use std::sync::Arc;

use anyhow::Result;
use livebridge::*;
use livepack::list;

fn setup() -> (Peer, Peer, WidgetTree) {
    livebridge::telemetry::init_for_tests();
    let (initiator, responder) = connected_pair();
    let tree = WidgetTree::new(responder.registry().clone());
    (initiator, responder, tree)
}

#[tokio::test]
async fn test_three_children() -> Result<()> {
    let (initiator, _responder, tree) = setup();
    let parent = tree.root("parent");
    let children: Vec<_> = (0..3).map(|i| tree.child(&parent, format!("child-{}", i))).collect();

    let remote = RemoteWidget::new(initiator.clone(), parent.id());
    assert_eq!(remote.child_count().await?, 3);
    assert_eq!(remote.parent().await?, None);
    assert_eq!(remote.name().await?, "parent");

    let listed = remote.children().await?;
    let ids: Vec<ObjectId> = listed.iter().map(RemoteWidget::id).collect();
    let expected: Vec<ObjectId> = children.iter().map(|c| c.id()).collect();
    assert_eq!(ids, expected);

    for child in &listed {
        assert!(child.check_parent(parent.id()).await?);
        assert!(!child.check_parent(child.id()).await?);
        assert_eq!(child.parent().await?, Some(parent.id()));
        assert_eq!(child.child_count().await?, 0);
    }

    remote.verify_subtree().await?;
    Ok(())
}

#[tokio::test]
async fn test_verify_deep_tree() -> Result<()> {
    let (initiator, _responder, tree) = setup();
    let root = livebridge::suite::family(&tree);
    RemoteWidget::new(initiator.clone(), root.id()).verify_subtree().await?;

    // Leaves verify trivially.
    let leaf = root.descendants().last().map(|n| n.id()).expect("tree has nodes");
    RemoteWidget::new(initiator, leaf).verify_subtree().await?;
    Ok(())
}

/// Reports one more child than it lists.
struct Miscount;

#[async_trait::async_trait]
impl RemoteObject for Miscount {
    async fn handle_call(&self, _peer: &Peer, method: &str, _args: Vec<Value>) -> Result<Value, ErrorInfo> {
        match method {
            "getChildCount" => Ok(Value::from(1)),
            "getChildren" => Ok(list![]),
            _ => Err(ErrorInfo::domain("no such method")),
        }
    }
}

/// Lists a real widget as its child, which does not acknowledge it.
struct Impostor(ObjectId);

#[async_trait::async_trait]
impl RemoteObject for Impostor {
    async fn handle_call(&self, _peer: &Peer, method: &str, _args: Vec<Value>) -> Result<Value, ErrorInfo> {
        match method {
            "getChildCount" => Ok(Value::from(1)),
            "getChildren" => Ok(list![self.0]),
            _ => Err(ErrorInfo::domain("no such method")),
        }
    }
}

#[tokio::test]
async fn test_verify_detects_inconsistency() -> Result<()> {
    let (initiator, responder, tree) = setup();

    let miscount = responder.export(Arc::new(Miscount));
    let err = RemoteWidget::new(initiator.clone(), miscount).verify_subtree().await.unwrap_err();
    assert!(matches!(err, widget::Error::Inconsistent(_)), "got {:?}", err);

    let parent = tree.root("real-parent");
    let child = tree.child(&parent, "child");
    let impostor = responder.export(Arc::new(Impostor(child.id())));
    let err = RemoteWidget::new(initiator.clone(), impostor).verify_subtree().await.unwrap_err();
    assert!(matches!(err, widget::Error::Inconsistent(_)), "got {:?}", err);
    Ok(())
}

#[tokio::test]
async fn test_disposed_widget() -> Result<()> {
    let (initiator, _responder, tree) = setup();
    let root = tree.root("root");
    tree.child(&root, "child");
    let remote = RemoteWidget::new(initiator, root.id());

    assert_eq!(tree.dispose(&root), 2);
    match remote.child_count().await {
        Err(widget::Error::Call(CallError::Remote(info))) => assert_eq!(info.kind, FailureKind::UnknownObject),
        other => panic!("Expected unknown object, got {:?}", other),
    }
    Ok(())
}
