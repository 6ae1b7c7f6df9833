use crate::*;
use livepack::{list, map};

fn reencode(frame: Frame) -> Frame {
    let bytes = frame.encode().expect("Encoding failed");
    Frame::decode(&bytes).expect("Decoding failed")
}

// ============================================================================
//  FRAMES
// ============================================================================

#[test]
fn test_call_frame() {
    let call = CallRequest::new(7, ObjectId(3), "reverse", vec![
        Value::from(1),
        Value::from(1.5),
        Value::from("hello"),
        map! { "world" => "value" },
    ]);

    match reencode(Frame::Call(call.clone())) {
        Frame::Call(decoded) => {
            assert_eq!(decoded, call);
            assert!(decoded.args[1].same_kind(&Value::Float(1.5)));
        }
        other => panic!("Expected call, got {:?}", other),
    }
}

#[test]
fn test_reply_frames() {
    let ok = CallOutcome::ok(9, list![1, 1.5, "Hello world"]);
    assert_eq!(reencode(Frame::Reply(ok.clone())), Frame::Reply(ok));

    let info = ErrorInfo::domain("This exception should appear on the client.")
        .with_detail(map! { "trace" => list!["frame one", "frame two"] });
    let err = CallOutcome::err(10, info);
    assert_eq!(reencode(Frame::Reply(err.clone())), Frame::Reply(err));

    let unknown = CallOutcome::err(11, ErrorInfo::unknown_object(ObjectId(42)));
    match reencode(Frame::Reply(unknown)) {
        Frame::Reply(CallOutcome { seq: 11, result: Err(info) }) => {
            assert_eq!(info.kind, FailureKind::UnknownObject);
            assert!(info.contains("object-42"));
            assert_eq!(info.detail, None);
        }
        other => panic!("Expected unknown-object failure, got {:?}", other),
    }
}

#[test]
fn test_null_result_is_not_missing() {
    let reply = CallOutcome::ok(1, Value::Null);
    assert_eq!(reencode(reply.clone().into()), Frame::Reply(reply));
}

#[test]
fn test_wire_layout() -> anyhow::Result<()> {
    let bytes = Frame::from(CallRequest::new(1, ObjectId(2), "m", vec![])).encode()?;
    assert_eq!(
        std::str::from_utf8(&bytes)?,
        r#"{"args":[],"kind":"call","method":"m","seq":1,"target":2}"#
    );
    Ok(())
}

#[test]
fn test_unknown_fields_are_skipped() -> anyhow::Result<()> {
    let text = r#"{"kind":"reply","seq":4,"ok":true,"trace_id":"abc","hops":[1,2]}"#;
    assert_eq!(Frame::decode(text.as_bytes())?, Frame::Reply(CallOutcome::ok(4, Value::Bool(true))));

    // Unknown failure kinds read as domain failures.
    let text = r#"{"kind":"reply","seq":5,"err":{"kind":"quota","message":"slow down"}}"#;
    match Frame::decode(text.as_bytes())? {
        Frame::Reply(CallOutcome { result: Err(info), .. }) => {
            assert_eq!(info.kind, FailureKind::Domain);
            assert_eq!(info.message, "slow down");
        }
        other => panic!("Expected failure, got {:?}", other),
    }
    Ok(())
}

// ============================================================================
//  REJECTION
// ============================================================================

fn assert_violation(text: &str) {
    match Frame::decode(text.as_bytes()) {
        Err(Error::ProtocolViolation(_)) => {}
        other => panic!("Expected ProtocolViolation for {}, got {:?}", text, other),
    }
}

#[test]
fn test_malformed_frames() {
    assert_violation("[1, 2]");
    assert_violation(r#"{"seq":1}"#);
    assert_violation(r#"{"kind":"call","target":1,"method":"m","args":[]}"#);
    assert_violation(r#"{"kind":"call","seq":1,"method":"m","args":[]}"#);
    assert_violation(r#"{"kind":"call","seq":1,"target":1,"args":[]}"#);
    assert_violation(r#"{"kind":"call","seq":1,"target":1,"method":"m"}"#);
    assert_violation(r#"{"kind":"call","seq":-1,"target":1,"method":"m","args":[]}"#);
    assert_violation(r#"{"kind":"call","seq":1,"target":1,"method":"m","args":{}}"#);
    assert_violation(r#"{"kind":"reply","seq":1}"#);
    assert_violation(r#"{"kind":"reply","seq":1,"ok":1,"err":{"message":"x"}}"#);
    assert_violation(r#"{"kind":"reply","seq":1,"err":"boom"}"#);
    assert_violation(r#"{"kind":"reply","seq":1,"err":{"kind":"domain"}}"#);
}

#[test]
fn test_unknown_frame_kind() {
    assert_eq!(
        Frame::decode(br#"{"kind":"ping","seq":1}"#),
        Err(Error::UnknownFrame("ping".into()))
    );
}

#[test]
fn test_codec_errors_surface() {
    assert!(matches!(Frame::decode(b"{\"kind\":"), Err(Error::Codec(_))));
    assert!(matches!(Frame::decode(&[0xFF]), Err(Error::Codec(livepack::Error::InvalidUtf8))));

    let call = CallRequest::new(1, ObjectId(1), "m", vec![Value::Float(f64::NAN)]);
    assert!(matches!(Frame::from(call).encode(), Err(Error::Codec(_))));
}

#[test]
fn test_peek_seq() -> anyhow::Result<()> {
    let bytes = Frame::from(CallOutcome::ok(77, Value::Null)).encode()?;
    assert_eq!(peek_seq(&bytes)?, 77);

    // The body is broken but the sequence number is still readable.
    assert_eq!(peek_seq(br#"{"kind":"call","seq":12,"target":"nope"}"#)?, 12);
    assert!(peek_seq(br#"{"kind":"call"}"#).is_err());
    Ok(())
}
