//! # Livepack
//!
//! A small, schema-agnostic text codec for the values that cross the live bridge.
//!
//! ## Philosophy
//!
//! - **Structural**: Encoding preserves shape and leaf contents, nothing else. Two values
//!   are equal after a round trip iff their structures and leaves are equal by value.
//! - **Pure**: `encode` and `decode` are functions of their input. No global state.
//! - **Unbounded Depth**: Both directions keep an explicit scope stack instead of recursing,
//!   so nesting depth is limited by memory rather than by the call stack.
//!
//! ## Format
//!
//! A JSON dialect:
//!
//! - **Scalars**: `null`, `undefined` (read as null), `true`, `false`, integers, floats.
//! - **Strings**: double quoted; `\xHH` and `\uHHHH` escapes on top of the usual JSON set.
//! - **Containers**: `[a,b]` and `{"k":v}`.
//! - **Comments**: `/* block */` and `// line` are skipped as whitespace.
//!
//! Floats are always written with a fractional part so they read back as floats.

mod decoder;
mod encoder;
mod macros;
mod value;

#[cfg(test)]
mod tests;

pub use decoder::Decoder;
pub use encoder::Encoder;
pub use value::Value;

/// Livepack encoding and decoding errors.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Input ended where a value was expected.
    UnexpectedEnd,
    /// Input is not valid UTF-8.
    InvalidUtf8,
    /// Input does not conform to the value grammar.
    Malformed { offset: usize, reason: String },
    /// NaN and the infinities have no wire representation.
    NonFiniteFloat(f64),
}

impl Error {
    pub(crate) fn malformed(offset: usize, reason: impl Into<String>) -> Self {
        Self::Malformed { offset, reason: reason.into() }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::UnexpectedEnd => write!(f, "Unexpected end of input"),
            Error::InvalidUtf8 => write!(f, "Input is not valid UTF-8"),
            Error::Malformed { offset, reason } => write!(f, "Malformed value at byte {}: {}", offset, reason),
            Error::NonFiniteFloat(v) => write!(f, "Cannot encode non-finite float {}", v),
        }
    }
}

impl std::error::Error for Error {}

/// Specialized `Result` for Livepack operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Encodes a value into its wire text.
pub fn encode(value: &Value) -> Result<String> {
    let mut enc = Encoder::new();
    enc.value(value)?;
    Ok(enc.into_string())
}

/// Decodes exactly one value from wire bytes.
///
/// Trailing whitespace and comments are allowed; anything else after the value is an error.
pub fn decode(bytes: &[u8]) -> Result<Value> {
    let mut dec = Decoder::new(bytes)?;
    let value = dec.value()?;
    dec.finish()?;
    Ok(value)
}

/// Decodes exactly one value from wire text.
pub fn decode_str(text: &str) -> Result<Value> {
    decode(text.as_bytes())
}
