//! # LiveRPC
//!
//! The request/response envelope spoken between two live-bridge peers.
//!
//! ## Architecture
//!
//! Every frame is a single `livepack` map. Calls carry a sequence number chosen by the
//! initiator, a target object id, a method name and positional arguments. Replies echo
//! the sequence number and carry either a result value or an `ErrorInfo`.
//!
//! Framing of the bytes themselves (lengths, websockets, long-polling) belongs to the
//! transport; this crate only maps frames to and from payloads.

pub mod error;
pub mod frame;

#[cfg(test)]
mod tests;

pub use error::Error;
pub use error::ErrorInfo;
pub use error::FailureKind;
pub use error::Result;

pub use frame::CallOutcome;
pub use frame::CallRequest;
pub use frame::Frame;
pub use frame::ObjectId;
pub use frame::peek_seq;

pub use livepack::Value;
