//! # LiveBridge
//!
//! A live, bidirectional remote-call bridge between two cooperating peers.
//!
//! ## Architecture
//!
//! - **Transport** (`transport`, `channel`): moves opaque frames, in order, between peers.
//! - **Peer** (`peer`): correlates outbound calls with their replies and dispatches inbound
//!   calls to the local `ObjectRegistry`. Both ends of a connection are `Peer`s.
//! - **Registry** (`registry`): the objects one side exposes, addressed by `ObjectId`.
//! - **Widget Tree** (`widget`): remotely queryable hierarchies built on the registry.
//! - **Aggregator** (`deferred`): fan-in of many asynchronous outcomes into one signal.
//! - **Suite** (`suite`): named end-to-end cases run across a live connection.

pub mod channel;
pub mod config;
pub mod deferred;
pub mod environment;
pub mod peer;
pub mod registry;
pub mod suite;
pub mod telemetry;
pub mod transport;
pub mod widget;


pub use channel::DuplexChannelTransport;
pub use config::PeerConfig;
pub use deferred::AggregateFailure;
pub use deferred::Aggregator;
pub use deferred::Settled;
pub use deferred::join_all;
pub use peer::CallError;
pub use peer::CallFuture;
pub use peer::Peer;
pub use peer::PeerEvent;
pub use peer::PeerStats;
pub use registry::ObjectRegistry;
pub use registry::RemoteObject;
pub use transport::Transport;
pub use widget::RemoteWidget;
pub use widget::WidgetNode;
pub use widget::WidgetTree;

pub use livepack::Value;
pub use liverpc::ErrorInfo;
pub use liverpc::FailureKind;
pub use liverpc::ObjectId;

/// Two peers joined by an in-process duplex channel, named `initiator` and `responder`.
pub fn connected_pair() -> (Peer, Peer) {
    connected_pair_with(PeerConfig::default())
}

/// Like `connected_pair`, with both peers using `config`.
pub fn connected_pair_with(config: PeerConfig) -> (Peer, Peer) {
    let (a, b) = DuplexChannelTransport::pair();
    (
        Peer::with_config("initiator", Box::new(a), config.clone()),
        Peer::with_config("responder", Box::new(b), config),
    )
}
