//! # Error Definitions
//!
//! The ledger of protocol failures, and the failure payload carried by replies.

use livepack::Value;

/// Failures of the RPC mechanism itself.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// The payload is not a well-formed value (`MalformedValue`).
    Codec(livepack::Error),
    /// The payload is a value but not a well-formed frame (e.g., missing `seq`).
    ProtocolViolation(String),
    /// The frame `kind` is not one we speak.
    UnknownFrame(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Codec(e) => write!(f, "Malformed value: {}", e),
            Self::ProtocolViolation(msg) => write!(f, "Protocol violation: {}", msg),
            Self::UnknownFrame(kind) => write!(f, "Unknown frame kind: {}", kind),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Codec(e) => Some(e),
            _ => None,
        }
    }
}

impl From<livepack::Error> for Error {
    fn from(e: livepack::Error) -> Self { Self::Codec(e) }
}

/// A specialized Result type for RPC operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Why a remote call failed (the "Err" side of a reply).
///
/// Distinct from `Error`: these describe the *remote side* failing to serve a call,
/// whereas `Error` describes the *protocol* failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The target id was never exported, or has been disposed.
    UnknownObject,
    /// The handler itself failed.
    Domain,
}

impl FailureKind {
    pub fn as_tag(&self) -> &'static str {
        match self {
            Self::UnknownObject => "unknown-object",
            Self::Domain => "domain",
        }
    }

    /// Unrecognized tags read as `Domain`, so newer peers can add kinds.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "unknown-object" => Self::UnknownObject,
            _ => Self::Domain,
        }
    }
}

/// A marshaled failure.
///
/// `message` crosses the wire verbatim. `detail` is an opaque diagnostic payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorInfo {
    pub kind: FailureKind,
    pub message: String,
    pub detail: Option<Value>,
}

impl ErrorInfo {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), detail: None }
    }

    /// A failure raised by application code.
    pub fn domain(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Domain, message)
    }

    /// A call against an id that is not (or no longer) exported.
    pub fn unknown_object(target: impl std::fmt::Display) -> Self {
        Self::new(FailureKind::UnknownObject, format!("Unknown object: {}", target))
    }

    pub fn with_detail(mut self, detail: impl Into<Value>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// True if the original diagnostic text survives somewhere in the message.
    pub fn contains(&self, needle: &str) -> bool {
        self.message.contains(needle)
    }

    pub(crate) fn to_value(&self) -> Value {
        let mut fields = std::collections::BTreeMap::new();
        fields.insert("kind".to_string(), Value::from(self.kind.as_tag()));
        fields.insert("message".to_string(), Value::from(self.message.as_str()));
        if let Some(detail) = &self.detail {
            fields.insert("detail".to_string(), detail.clone());
        }
        Value::Map(fields)
    }

    pub(crate) fn from_value(value: Value) -> Result<Self> {
        let Value::Map(mut fields) = value else {
            return Err(Error::ProtocolViolation(format!("error payload is a {}", value.kind())));
        };

        let message = match fields.remove("message") {
            Some(Value::Str(s)) => s,
            Some(other) => return Err(Error::ProtocolViolation(format!("error message is a {}", other.kind()))),
            None => return Err(Error::ProtocolViolation("Missing error message".into())),
        };
        let kind = match fields.remove("kind") {
            Some(Value::Str(tag)) => FailureKind::from_tag(&tag),
            _ => FailureKind::Domain,
        };
        let detail = fields.remove("detail").filter(|d| !d.is_null());

        Ok(Self { kind, message, detail })
    }
}

impl std::fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ErrorInfo {}
