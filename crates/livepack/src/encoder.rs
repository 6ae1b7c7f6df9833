//! Text encoder.

use std::fmt::Write;

use crate::Error;
use crate::Result;
use crate::Value;

/// One pending unit of output on the encoder's work stack.
enum Step<'a> {
    Value(&'a Value),
    Key(&'a str),
    Punct(char),
}

/// An append-only text encoder.
///
/// Containers are flattened onto an explicit work stack, so encoding a deeply
/// nested value never grows the call stack.
pub struct Encoder {
    buf: String,
}

impl Encoder {
    /// Creates a new encoder with default capacity.
    pub fn new() -> Self {
        Self { buf: String::with_capacity(256) }
    }

    /// Consumes the encoder and returns the text.
    pub fn into_string(self) -> String {
        self.buf
    }

    /// Consumes the encoder and returns the UTF-8 bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf.into_bytes()
    }

    /// Returns a view of the text written so far.
    pub fn as_str(&self) -> &str {
        &self.buf
    }

    /// Appends the encoding of `value`.
    ///
    /// # Errors
    /// Returns `Error::NonFiniteFloat` if any float leaf is NaN or infinite. The buffer
    /// contents are unspecified after an error.
    pub fn value(&mut self, value: &Value) -> Result<()> {
        let mut work = vec![Step::Value(value)];

        while let Some(step) = work.pop() {
            match step {
                Step::Punct(c) => self.buf.push(c),
                Step::Key(key) => {
                    self.str(key);
                    self.buf.push(':');
                }
                Step::Value(Value::Null) => self.buf.push_str("null"),
                Step::Value(Value::Bool(true)) => self.buf.push_str("true"),
                Step::Value(Value::Bool(false)) => self.buf.push_str("false"),
                Step::Value(Value::Int(v)) => {
                    let _ = write!(self.buf, "{}", v);
                }
                Step::Value(Value::Float(v)) => self.float(*v)?,
                Step::Value(Value::Str(s)) => self.str(s),
                Step::Value(Value::List(items)) => {
                    self.buf.push('[');
                    work.push(Step::Punct(']'));
                    for (i, item) in items.iter().enumerate().rev() {
                        work.push(Step::Value(item));
                        if i > 0 {
                            work.push(Step::Punct(','));
                        }
                    }
                }
                Step::Value(Value::Map(entries)) => {
                    self.buf.push('{');
                    work.push(Step::Punct('}'));
                    for (i, (key, item)) in entries.iter().enumerate().rev() {
                        work.push(Step::Value(item));
                        work.push(Step::Key(key));
                        if i > 0 {
                            work.push(Step::Punct(','));
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Writes a float so that it always carries a fractional part.
    fn float(&mut self, v: f64) -> Result<()> {
        if !v.is_finite() {
            return Err(Error::NonFiniteFloat(v));
        }

        // Debug formatting round-trips exactly but drops the fraction in
        // exponent form ("1e300").
        let text = format!("{:?}", v);
        match text.find(['e', 'E']) {
            Some(pos) if !text[..pos].contains('.') => {
                self.buf.push_str(&text[..pos]);
                self.buf.push_str(".0");
                self.buf.push_str(&text[pos..]);
            }
            _ => self.buf.push_str(&text),
        }
        Ok(())
    }

    fn str(&mut self, s: &str) {
        self.buf.push('"');
        for c in s.chars() {
            match c {
                '"' => self.buf.push_str("\\\""),
                '\\' => self.buf.push_str("\\\\"),
                '\n' => self.buf.push_str("\\n"),
                '\r' => self.buf.push_str("\\r"),
                '\t' => self.buf.push_str("\\t"),
                '\u{08}' => self.buf.push_str("\\b"),
                '\u{0c}' => self.buf.push_str("\\f"),
                // Legal in JSON strings but line terminators in script sources.
                '\u{2028}' => self.buf.push_str("\\u2028"),
                '\u{2029}' => self.buf.push_str("\\u2029"),
                c if (c as u32) < 0x20 => {
                    let _ = write!(self.buf, "\\x{:02x}", c as u32);
                }
                c => self.buf.push(c),
            }
        }
        self.buf.push('"');
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}
