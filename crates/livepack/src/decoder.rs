//! Text decoder.
//!
//! ## Invariants
//! - **Panic Safety**: Every path returns `Result`; no input can make the decoder panic.
//! - **No Recursion**: Open containers live on an explicit stack.

use std::collections::BTreeMap;

use crate::Error;
use crate::Result;
use crate::Value;

/// A container that has been opened but not yet closed.
enum Open {
    List(Vec<Value>),
    /// Entries so far, plus the key awaiting its value.
    Map(BTreeMap<String, Value>, String),
}

/// A bounds-checked cursor over wire text.
pub struct Decoder<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Decoder<'a> {
    /// Creates a decoder over raw bytes.
    ///
    /// # Errors
    /// Returns `Error::InvalidUtf8` if the bytes are not UTF-8.
    pub fn new(bytes: &'a [u8]) -> Result<Self> {
        let text = std::str::from_utf8(bytes).map_err(|_| Error::InvalidUtf8)?;
        Ok(Self { text, pos: 0 })
    }

    /// Creates a decoder over text that is already known to be UTF-8.
    pub fn from_text(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }

    /// Byte offset of the cursor.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left after the cursor.
    pub fn remaining(&self) -> usize {
        self.text.len() - self.pos
    }

    /// Succeeds if nothing but whitespace and comments remains.
    pub fn finish(&mut self) -> Result<()> {
        self.skip_ws()?;
        if self.pos < self.text.len() {
            return Err(Error::malformed(self.pos, "trailing data after value"));
        }
        Ok(())
    }

    /// Decodes the next complete value.
    pub fn value(&mut self) -> Result<Value> {
        let mut stack: Vec<Open> = Vec::new();

        loop {
            self.skip_ws()?;
            let mut value = match self.peek() {
                None => return Err(self.end_error(&stack)),
                Some(b'[') => {
                    self.pos += 1;
                    self.skip_ws()?;
                    if self.peek() == Some(b']') {
                        self.pos += 1;
                        Value::List(Vec::new())
                    } else {
                        stack.push(Open::List(Vec::new()));
                        continue;
                    }
                }
                Some(b'{') => {
                    self.pos += 1;
                    self.skip_ws()?;
                    if self.peek() == Some(b'}') {
                        self.pos += 1;
                        Value::Map(BTreeMap::new())
                    } else {
                        let key = self.key()?;
                        stack.push(Open::Map(BTreeMap::new(), key));
                        continue;
                    }
                }
                Some(b'"') => Value::Str(self.string()?),
                Some(b'-' | b'0'..=b'9') => self.number()?,
                Some(_) => self.keyword()?,
            };

            // A value is complete: hand it to its parent, closing every container it finishes.
            loop {
                let Some(top) = stack.last_mut() else {
                    return Ok(value);
                };
                match top {
                    Open::List(items) => {
                        items.push(value);
                        self.skip_ws()?;
                        match self.bump() {
                            Some(b',') => break,
                            Some(b']') => {
                                let Some(Open::List(items)) = stack.pop() else {
                                    return Err(Error::malformed(self.pos, "scope stack corrupted"));
                                };
                                value = Value::List(items);
                            }
                            Some(_) => return Err(Error::malformed(self.pos - 1, "expected ',' or ']' in list")),
                            None => return Err(Error::malformed(self.pos, "unterminated list")),
                        }
                    }
                    Open::Map(entries, key) => {
                        // Duplicate keys: the last one wins.
                        entries.insert(std::mem::take(key), value);
                        self.skip_ws()?;
                        match self.bump() {
                            Some(b',') => {
                                self.skip_ws()?;
                                *key = self.key()?;
                                break;
                            }
                            Some(b'}') => {
                                let Some(Open::Map(entries, _)) = stack.pop() else {
                                    return Err(Error::malformed(self.pos, "scope stack corrupted"));
                                };
                                value = Value::Map(entries);
                            }
                            Some(_) => return Err(Error::malformed(self.pos - 1, "expected ',' or '}' in map")),
                            None => return Err(Error::malformed(self.pos, "unterminated map")),
                        }
                    }
                }
            }
        }
    }

    fn end_error(&self, stack: &[Open]) -> Error {
        if stack.is_empty() {
            Error::UnexpectedEnd
        } else {
            Error::malformed(self.pos, "unterminated structure")
        }
    }

    fn peek(&self) -> Option<u8> {
        self.text.as_bytes().get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    fn next_char(&mut self) -> Option<char> {
        let c = self.text[self.pos..].chars().next()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    fn slice(&self, from: usize, to: usize) -> &'a str {
        &self.text[from..to]
    }

    /// Skips whitespace, `/* block */` and `// line` comments.
    fn skip_ws(&mut self) -> Result<()> {
        loop {
            match self.peek() {
                Some(b' ' | b'\t' | b'\r' | b'\n') => self.pos += 1,
                Some(b'/') if self.rest().starts_with("/*") => {
                    let start = self.pos;
                    match self.rest()[2..].find("*/") {
                        Some(end) => self.pos += 2 + end + 2,
                        None => return Err(Error::malformed(start, "unterminated comment")),
                    }
                }
                Some(b'/') if self.rest().starts_with("//") => match self.rest().find('\n') {
                    Some(end) => self.pos += end + 1,
                    None => self.pos = self.text.len(),
                },
                _ => return Ok(()),
            }
        }
    }

    /// Reads `"key"` followed by `:`.
    fn key(&mut self) -> Result<String> {
        if self.peek() != Some(b'"') {
            return match self.peek() {
                None => Err(Error::malformed(self.pos, "unterminated map")),
                Some(_) => Err(Error::malformed(self.pos, "expected string key")),
            };
        }
        let key = self.string()?;
        self.skip_ws()?;
        match self.bump() {
            Some(b':') => Ok(key),
            Some(_) => Err(Error::malformed(self.pos - 1, "expected ':' after key")),
            None => Err(Error::malformed(self.pos, "unterminated map")),
        }
    }

    fn keyword(&mut self) -> Result<Value> {
        let start = self.pos;
        let len = self
            .rest()
            .bytes()
            .take_while(|b| b.is_ascii_alphanumeric() || *b == b'_')
            .count();
        let word = self.slice(start, start + len);

        let value = match word {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            "null" | "undefined" => Value::Null,
            "" => {
                let found = self.rest().chars().next().unwrap_or('?');
                return Err(Error::malformed(start, format!("unexpected {:?}", found)));
            }
            other => return Err(Error::malformed(start, format!("unknown token {:?}", other))),
        };
        self.pos += len;
        Ok(value)
    }

    fn digits(&mut self) -> usize {
        let len = self.rest().bytes().take_while(u8::is_ascii_digit).count();
        self.pos += len;
        len
    }

    /// Reads a number.
    ///
    /// A fractional part makes a `Float`. Otherwise the number is an `Int` when the
    /// (possibly exponent-scaled) integer is exact and fits in `i64`, and a `Float` when not.
    fn number(&mut self) -> Result<Value> {
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }

        match self.peek() {
            Some(b'0') => self.pos += 1,
            Some(b'1'..=b'9') => {
                self.digits();
            }
            _ => return Err(Error::malformed(self.pos, "expected digit")),
        }
        let mantissa_end = self.pos;

        let mut fractional = false;
        if self.peek() == Some(b'.') {
            self.pos += 1;
            if self.digits() == 0 {
                return Err(Error::malformed(self.pos, "expected digit after '.'"));
            }
            fractional = true;
        }

        let mut exponent = None;
        if let Some(b'e' | b'E') = self.peek() {
            self.pos += 1;
            let exp_start = self.pos;
            if let Some(b'+' | b'-') = self.peek() {
                self.pos += 1;
            }
            if self.digits() == 0 {
                return Err(Error::malformed(self.pos, "expected digit in exponent"));
            }
            exponent = Some(self.slice(exp_start, self.pos));
        }

        let text = self.slice(start, self.pos);
        let as_float = || {
            match text.parse::<f64>() {
                Ok(v) if v.is_finite() => Ok(Value::Float(v)),
                Ok(_) => Err(Error::malformed(start, "number out of range")),
                Err(_) => Err(Error::malformed(start, format!("invalid number {:?}", text))),
            }
        };

        if fractional {
            return as_float();
        }

        let Ok(mantissa) = self.slice(start, mantissa_end).parse::<i64>() else {
            return as_float();
        };

        match exponent {
            None => Ok(Value::Int(mantissa)),
            Some(exp) => {
                let scaled = exp
                    .parse::<i64>()
                    .ok()
                    .and_then(|e| u32::try_from(e).ok())
                    .and_then(|e| 10i64.checked_pow(e))
                    .and_then(|p| mantissa.checked_mul(p));
                match scaled {
                    Some(v) => Ok(Value::Int(v)),
                    None => as_float(),
                }
            }
        }
    }

    /// Reads a quoted string, resolving escapes.
    fn string(&mut self) -> Result<String> {
        let start = self.pos;
        self.pos += 1;
        let mut out = String::new();

        loop {
            let Some(c) = self.next_char() else {
                return Err(Error::malformed(start, "unterminated string"));
            };
            match c {
                '"' => return Ok(out),
                '\\' => out.push(self.escape()?),
                c => out.push(c),
            }
        }
    }

    fn escape(&mut self) -> Result<char> {
        let at = self.pos - 1;
        let Some(c) = self.next_char() else {
            return Err(Error::malformed(at, "unterminated string"));
        };

        match c {
            '"' => Ok('"'),
            '\\' => Ok('\\'),
            '/' => Ok('/'),
            'b' => Ok('\u{08}'),
            'f' => Ok('\u{0c}'),
            'n' => Ok('\n'),
            'r' => Ok('\r'),
            't' => Ok('\t'),
            'x' => {
                let code = self.hex(2)?;
                char::from_u32(code).ok_or_else(|| Error::malformed(at, "invalid \\x escape"))
            }
            'u' => {
                let high = self.hex(4)?;
                match high {
                    0xD800..=0xDBFF => {
                        if !self.rest().starts_with("\\u") {
                            return Err(Error::malformed(at, "unpaired surrogate"));
                        }
                        self.pos += 2;
                        let low = self.hex(4)?;
                        if !(0xDC00..=0xDFFF).contains(&low) {
                            return Err(Error::malformed(at, "unpaired surrogate"));
                        }
                        let code = 0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00);
                        char::from_u32(code).ok_or_else(|| Error::malformed(at, "invalid surrogate pair"))
                    }
                    0xDC00..=0xDFFF => Err(Error::malformed(at, "unpaired surrogate")),
                    code => char::from_u32(code).ok_or_else(|| Error::malformed(at, "invalid \\u escape")),
                }
            }
            other => Err(Error::malformed(at, format!("unknown escape \\{}", other))),
        }
    }

    fn hex(&mut self, len: usize) -> Result<u32> {
        let start = self.pos;
        let digits = self
            .rest()
            .get(..len)
            .ok_or_else(|| Error::malformed(start, "truncated hex escape"))?;
        if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::malformed(start, "invalid hex escape"));
        }
        let code = u32::from_str_radix(digits, 16)
            .map_err(|_| Error::malformed(start, "invalid hex escape"))?;
        self.pos += len;
        Ok(code)
    }
}
