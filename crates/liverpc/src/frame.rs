//! # Protocol Frames
//!
//! Defines the structure of the RPC envelope (Call vs Reply).
//!
//! ## Wire Layout
//! ```text
//! {"kind":"call","seq":7,"target":3,"method":"reverse","args":[...]}
//! {"kind":"reply","seq":7,"ok":<value>}
//! {"kind":"reply","seq":7,"err":{"kind":"domain","message":"...","detail":<value>}}
//! ```
//!
//! ## Invariants
//! - **Panic Safety**: All decoding paths return `Result`, never panicking on unknown data.
//! - **Forward Compatibility**: Unknown fields are skipped.

use std::collections::BTreeMap;

use livepack::Value;

use crate::error::Error;
use crate::error::ErrorInfo;
use crate::error::Result;

/// Identifier of an exported object, unique within the exporting side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u64);

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "object-{}", self.0)
    }
}

impl From<ObjectId> for Value {
    fn from(id: ObjectId) -> Self {
        Value::from(id.0)
    }
}

/// An outbound or inbound call.
#[derive(Debug, Clone, PartialEq)]
pub struct CallRequest {
    pub seq: u64,
    pub target: ObjectId,
    pub method: String,
    pub args: Vec<Value>,
}

impl CallRequest {
    pub fn new(seq: u64, target: ObjectId, method: impl Into<String>, args: Vec<Value>) -> Self {
        Self { seq, target, method: method.into(), args }
    }

    fn into_value(self) -> Value {
        let mut fields = BTreeMap::new();
        fields.insert("kind".to_string(), Value::from("call"));
        fields.insert("seq".to_string(), Value::from(self.seq));
        fields.insert("target".to_string(), Value::from(self.target));
        fields.insert("method".to_string(), Value::Str(self.method));
        fields.insert("args".to_string(), Value::List(self.args));
        Value::Map(fields)
    }

    fn from_fields(mut fields: BTreeMap<String, Value>) -> Result<Self> {
        Ok(CallRequest {
            seq: take_u64(&mut fields, "seq")?,
            target: ObjectId(take_u64(&mut fields, "target")?),
            method: take_str(&mut fields, "method")?,
            args: match fields.remove("args") {
                Some(Value::List(args)) => args,
                Some(other) => return Err(mismatch("args", "list", &other)),
                None => return Err(Error::ProtocolViolation("Missing args".into())),
            },
        })
    }
}

/// The answer to a call: a value, or the marshaled failure.
#[derive(Debug, Clone, PartialEq)]
pub struct CallOutcome {
    pub seq: u64,
    pub result: std::result::Result<Value, ErrorInfo>,
}

impl CallOutcome {
    pub fn ok(seq: u64, value: Value) -> Self {
        Self { seq, result: Ok(value) }
    }

    pub fn err(seq: u64, info: ErrorInfo) -> Self {
        Self { seq, result: Err(info) }
    }

    fn into_value(self) -> Value {
        let mut fields = BTreeMap::new();
        fields.insert("kind".to_string(), Value::from("reply"));
        fields.insert("seq".to_string(), Value::from(self.seq));
        match self.result {
            Ok(value) => fields.insert("ok".to_string(), value),
            Err(info) => fields.insert("err".to_string(), info.to_value()),
        };
        Value::Map(fields)
    }

    fn from_fields(mut fields: BTreeMap<String, Value>) -> Result<Self> {
        let seq = take_u64(&mut fields, "seq")?;
        let result = match (fields.remove("ok"), fields.remove("err")) {
            (Some(value), None) => Ok(value),
            (None, Some(info)) => Err(ErrorInfo::from_value(info)?),
            (Some(_), Some(_)) => return Err(Error::ProtocolViolation("Reply carries both ok and err".into())),
            (None, None) => return Err(Error::ProtocolViolation("Missing outcome".into())),
        };
        Ok(CallOutcome { seq, result })
    }
}

/// A top-level protocol frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Call(CallRequest),
    Reply(CallOutcome),
}

impl Frame {
    /// The sequence number this frame belongs to.
    pub fn seq(&self) -> u64 {
        match self {
            Frame::Call(call) => call.seq,
            Frame::Reply(reply) => reply.seq,
        }
    }

    /// Encodes the frame into a transport payload.
    ///
    /// # Errors
    /// Fails only when a carried value cannot be encoded (a non-finite float).
    pub fn encode(self) -> Result<Vec<u8>> {
        let value = match self {
            Frame::Call(call) => call.into_value(),
            Frame::Reply(reply) => reply.into_value(),
        };
        let mut enc = livepack::Encoder::new();
        enc.value(&value)?;
        Ok(enc.into_bytes())
    }

    /// Decodes a transport payload into a frame.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut fields = frame_fields(bytes)?;
        let kind = take_str(&mut fields, "kind")?;
        match kind.as_str() {
            "call" => Ok(Frame::Call(CallRequest::from_fields(fields)?)),
            "reply" => Ok(Frame::Reply(CallOutcome::from_fields(fields)?)),
            _ => Err(Error::UnknownFrame(kind)),
        }
    }
}

impl From<CallRequest> for Frame {
    fn from(call: CallRequest) -> Self { Frame::Call(call) }
}

impl From<CallOutcome> for Frame {
    fn from(reply: CallOutcome) -> Self { Frame::Reply(reply) }
}

/// Reads just the sequence number from a raw frame.
/// This is useful for logging a frame whose body failed to decode.
pub fn peek_seq(bytes: &[u8]) -> Result<u64> {
    let mut fields = frame_fields(bytes)?;
    take_u64(&mut fields, "seq")
}

// Helper functions

fn frame_fields(bytes: &[u8]) -> Result<BTreeMap<String, Value>> {
    match livepack::decode(bytes)? {
        Value::Map(fields) => Ok(fields),
        other => Err(Error::ProtocolViolation(format!("Frame is a {}, expected map", other.kind()))),
    }
}

fn take_u64(fields: &mut BTreeMap<String, Value>, key: &str) -> Result<u64> {
    match fields.remove(key) {
        Some(value) => value.as_u64().ok_or_else(|| mismatch(key, "unsigned integer", &value)),
        None => Err(Error::ProtocolViolation(format!("Missing {}", key))),
    }
}

fn take_str(fields: &mut BTreeMap<String, Value>, key: &str) -> Result<String> {
    match fields.remove(key) {
        Some(Value::Str(s)) => Ok(s),
        Some(other) => Err(mismatch(key, "string", &other)),
        None => Err(Error::ProtocolViolation(format!("Missing {}", key))),
    }
}

fn mismatch(key: &str, expected: &str, found: &Value) -> Error {
    Error::ProtocolViolation(format!("Field {} is a {}, expected {}", key, found.kind(), expected))
}
