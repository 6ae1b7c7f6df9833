use crate::*;
use std::collections::BTreeMap;

fn assert_roundtrip(value: Value) {
    let text = encode(&value).expect("Encoding failed");
    let decoded = decode_str(&text).expect("Decoding failed");
    assert_eq!(value, decoded, "wire text: {}", text);
    assert!(value.same_kind(&decoded), "subtype changed through {}", text);
}

fn assert_malformed(text: &str) {
    match decode_str(text) {
        Err(Error::Malformed { .. }) => {}
        other => panic!("Expected Malformed for {:?}, got {:?}", text, other),
    }
}

// ============================================================================
//  SCALARS
// ============================================================================

#[test]
fn test_scalars_roundtrip() {
    assert_roundtrip(Value::Null);
    assert_roundtrip(Value::Bool(true));
    assert_roundtrip(Value::Bool(false));
    assert_roundtrip(Value::Int(0));
    assert_roundtrip(Value::Int(i64::MIN));
    assert_roundtrip(Value::Int(i64::MAX));
    assert_roundtrip(Value::Float(1.5));
    assert_roundtrip(Value::Float(-0.25));
    assert_roundtrip(Value::Float(std::f64::consts::PI));
    assert_roundtrip(Value::Str("Hello world".into()));
    assert_roundtrip(Value::Str(String::new()));
}

#[test]
fn test_float_keeps_fraction_on_wire() -> Result<()> {
    assert_eq!(encode(&Value::Float(1.0))?, "1.0");
    assert_eq!(encode(&Value::Float(1.5))?, "1.5");

    let big = encode(&Value::Float(1e300))?;
    assert!(big.contains('.'), "exponent form lost its fraction: {}", big);
    assert!(decode_str(&big)?.same_kind(&Value::Float(1e300)));

    let tiny = encode(&Value::Float(1e-7))?;
    assert!(tiny.contains('.'), "exponent form lost its fraction: {}", tiny);
    assert_eq!(decode_str(&tiny)?, Value::Float(1e-7));
    Ok(())
}

#[test]
fn test_non_finite_float_rejected() {
    assert!(matches!(encode(&Value::Float(f64::NAN)), Err(Error::NonFiniteFloat(_))));
    assert!(matches!(encode(&Value::Float(f64::INFINITY)), Err(Error::NonFiniteFloat(_))));
    assert!(matches!(
        encode(&list![1, Value::Float(f64::NEG_INFINITY)]),
        Err(Error::NonFiniteFloat(_))
    ));
}

#[test]
fn test_numbers_compare_by_decimal_value() {
    assert_eq!(Value::Int(1), Value::Float(1.0));
    assert_ne!(Value::Int(1), Value::Float(1.5));
    assert!(!Value::Int(1).same_kind(&Value::Float(1.0)));
}

#[test]
fn test_number_grammar() -> Result<()> {
    assert!(decode_str("1")?.same_kind(&Value::Int(1)));
    assert!(decode_str("-0")?.same_kind(&Value::Int(0)));
    assert!(decode_str("1.5")?.same_kind(&Value::Float(1.5)));
    assert!(decode_str("2e3")?.same_kind(&Value::Int(2000)));
    assert!(decode_str("2E+3")?.same_kind(&Value::Int(2000)));
    assert!(decode_str("25e-1")?.same_kind(&Value::Float(2.5)));
    assert!(decode_str("1.5e2")?.same_kind(&Value::Float(150.0)));

    // Past i64 falls back to a float rather than failing.
    assert!(decode_str("99999999999999999999")?.same_kind(&Value::Float(1e20)));
    assert!(decode_str("9e40")?.same_kind(&Value::Float(9e40)));

    assert_malformed("01");
    assert_malformed("1.");
    assert_malformed(".5");
    assert_malformed("1e");
    assert_malformed("-");

    // Overflowing literals would decode to values that cannot be encoded again.
    assert_malformed("1e400");
    assert_malformed("-1.0e999");
    assert_malformed("[1.0e999]");
    assert_malformed("99999999999999999999e400");
    Ok(())
}

// ============================================================================
//  STRINGS
// ============================================================================

#[test]
fn test_string_escapes_roundtrip() {
    assert_roundtrip(Value::Str("quote \" backslash \\ slash /".into()));
    assert_roundtrip(Value::Str("line\nfeed\ttab\rreturn\u{08}\u{0c}".into()));
    assert_roundtrip(Value::Str("\u{0}\u{1}\u{1f}".into()));
    assert_roundtrip(Value::Str("separators \u{2028} \u{2029}".into()));
    assert_roundtrip(Value::Str("Hello World 🚀 ünïcødé".into()));
}

#[test]
fn test_string_encoding_is_script_safe() -> Result<()> {
    assert_eq!(encode(&Value::Str("\u{1}".into()))?, "\"\\x01\"");
    assert_eq!(encode(&Value::Str("a\u{2028}b".into()))?, "\"a\\u2028b\"");
    assert_eq!(encode(&Value::Str("\"\n".into()))?, "\"\\\"\\n\"");
    Ok(())
}

#[test]
fn test_string_escape_decoding() -> Result<()> {
    assert_eq!(decode_str(r#""\x41\u0042\/""#)?, Value::Str("AB/".into()));
    assert_eq!(decode_str(r#""\ud83e\udd80""#)?, Value::Str("🦀".into()));
    assert_eq!(decode_str("\"raw\ttab\"")?, Value::Str("raw\ttab".into()));

    assert_malformed(r#""\q""#);
    assert_malformed(r#""\x4""#);
    assert_malformed(r#""\u12G4""#);
    assert_malformed(r#""\ud83e""#);
    assert_malformed(r#""\udd80""#);
    assert_malformed(r#""unterminated"#);
    Ok(())
}

// ============================================================================
//  CONTAINERS
// ============================================================================

#[test]
fn test_containers_roundtrip() {
    assert_roundtrip(list![]);
    assert_roundtrip(map! {});
    assert_roundtrip(list![1, 1.5, "Hello world"]);
    assert_roundtrip(map! { "hello world" => "object value" });
    assert_roundtrip(list![
        1,
        1.5,
        "Hello world",
        list![1, 1.5, "Hello world"],
        map! { "hello world" => "object value" },
    ]);
    assert_roundtrip(map! {
        "nested" => map! { "deeper" => list![Value::Null, true, list![]] },
        "" => "empty key",
        "quote\"key" => 7,
    });
}

#[test]
fn test_map_encoding_is_deterministic() -> Result<()> {
    let v = map! { "b" => 2, "a" => 1, "c" => list![] };
    assert_eq!(encode(&v)?, r#"{"a":1,"b":2,"c":[]}"#);
    Ok(())
}

#[test]
fn test_duplicate_keys_last_wins() -> Result<()> {
    let v = decode_str(r#"{"k":1,"k":2}"#)?;
    assert_eq!(v, map! { "k" => 2 });
    Ok(())
}

#[test]
fn test_whitespace_and_comments() -> Result<()> {
    let text = "  /* leading */ [ 1 , // trailing comment\n  { \"a\" : true } /* inner */ ] // done";
    assert_eq!(decode_str(text)?, list![1, map! { "a" => true }]);
    assert_eq!(decode_str("undefined")?, Value::Null);
    Ok(())
}

#[test]
fn test_arbitrary_nesting_depth() -> Result<()> {
    const DEPTH: usize = 2_000;

    let text = format!("{}{}", "[".repeat(DEPTH), "]".repeat(DEPTH));
    let decoded = decode_str(&text)?;
    assert_eq!(encode(&decoded)?, text);

    let mut value = Value::Int(42);
    for i in 0..DEPTH {
        let mut entries = BTreeMap::new();
        entries.insert(format!("k{}", i % 3), value);
        value = Value::Map(entries);
    }
    assert_roundtrip(value);
    Ok(())
}

// ============================================================================
//  MALFORMED INPUT
// ============================================================================

#[test]
fn test_malformed_structures() {
    assert_malformed("[1, 2");
    assert_malformed("[1 2]");
    assert_malformed("[1,]");
    assert_malformed("{\"a\" 1}");
    assert_malformed("{\"a\":1,}");
    assert_malformed("{a:1}");
    assert_malformed("{\"a\":1");
    assert_malformed("]");
    assert_malformed("nul");
    assert_malformed("bogus");
    assert_malformed("/* never closed");
    assert_malformed("1 2");
    assert_malformed("[1]]");
}

#[test]
fn test_empty_input() {
    assert_eq!(decode(b""), Err(Error::UnexpectedEnd));
    assert_eq!(decode(b"  // nothing here"), Err(Error::UnexpectedEnd));
}

#[test]
fn test_invalid_utf8() {
    assert_eq!(decode(&[b'"', 0xFF, 0xFE, b'"']), Err(Error::InvalidUtf8));
}

#[test]
fn test_decoder_reports_offset() {
    match decode_str("[1, 2, ?]") {
        Err(Error::Malformed { offset, .. }) => assert_eq!(offset, 7),
        other => panic!("Expected Malformed, got {:?}", other),
    }
}

#[test]
fn test_accessors() {
    let v = list![1, 1.5, "s", map! { "k" => true }, Value::Null];
    assert_eq!(v.index(0).and_then(Value::as_i64), Some(1));
    assert_eq!(v.index(1).and_then(Value::as_f64), Some(1.5));
    assert_eq!(v.index(1).and_then(Value::as_i64), None);
    assert_eq!(v.index(2).and_then(Value::as_str), Some("s"));
    assert_eq!(v.index(3).and_then(|m| m.get("k")).and_then(Value::as_bool), Some(true));
    assert!(v.index(4).is_some_and(Value::is_null));
    assert!(v.index(5).is_none());
    assert_eq!(Value::Float(3.0).as_u64(), Some(3));
    assert_eq!(Value::Int(-3).as_u64(), None);
}
