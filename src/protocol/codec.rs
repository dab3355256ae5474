//! Stateless translation between serial frames and MQTT messages
//!
//! [`decode`] turns one serial line into a [`DecodedFrame`] and never panics on
//! bad input; every failure comes back as a [`DecodeError`] value. [`encode`]
//! turns an MQTT command into the frame written to the cape.

use super::messages::{
    AckEvent, CommandEntry, CommandFrame, DecodedFrame, DeviceEvent, FrameKind, UnknownFrame,
    ACK_KEY, DEVICE_KEY, FIELD_DATA, FIELD_DEVICE_ID, FIELD_GROUP_ID,
};
use super::topics::output_device_segment;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Character earlier bridges appended after every outgoing frame.
///
/// Unconfirmed whether the cape firmware needs it as a delimiter or simply
/// tolerates it; see [`FrameTrailer`].
pub const LEGACY_FRAME_TRAILER: &str = ")";

/// Group written into every outgoing frame
pub const COMMAND_GROUP: &str = "0";
/// Value written into every outgoing frame
pub const COMMAND_VALUE: i64 = 0;

/// What follows the JSON object of an outgoing frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameTrailer {
    /// Append [`LEGACY_FRAME_TRAILER`], byte-compatible with deployed bridges
    #[default]
    Legacy,
    /// Append a single `\n`
    Newline,
    /// Write the bare JSON object
    None,
}

impl FrameTrailer {
    pub fn as_str(&self) -> &'static str {
        match self {
            FrameTrailer::Legacy => LEGACY_FRAME_TRAILER,
            FrameTrailer::Newline => "\n",
            FrameTrailer::None => "",
        }
    }
}

/// Recoverable failures while decoding a serial line
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DecodeError {
    #[error("malformed JSON: {0}")]
    Malformed(String),
    #[error("frame is valid JSON but not an object")]
    NotAnObject,
    #[error("{0} frame has no entries")]
    EmptyFrame(FrameKind),
    #[error("{kind} frame is missing field '{field}'")]
    MissingField { kind: FrameKind, field: &'static str },
    #[error("{kind} frame has invalid field '{field}': {value}")]
    InvalidField {
        kind: FrameKind,
        field: &'static str,
        value: String,
    },
}

impl DecodeError {
    /// Name of the offending field, if the error concerns one
    pub fn field(&self) -> Option<&'static str> {
        match self {
            DecodeError::MissingField { field, .. } | DecodeError::InvalidField { field, .. } => {
                Some(*field)
            }
            _ => None,
        }
    }
}

/// Failures while encoding an MQTT command into a serial frame
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EncodeError {
    #[error("topic '{0}' is not a ninjaCape/output/<deviceId> topic")]
    InvalidTopic(String),
    #[error("device id '{0}' is not an integer")]
    InvalidDeviceId(String),
    #[error("payload is not valid UTF-8")]
    InvalidPayload,
    #[error("failed to serialize frame: {0}")]
    Serialization(String),
}

/// Decode one serial line into a frame
///
/// # Examples
/// ```
/// use ninjacape_bridge::protocol::{decode, DecodedFrame};
///
/// let frame = decode(r#"{"DEVICE":[{"G":"0","V":0,"D":1007,"DA":"FFFF00"}]}"#).unwrap();
/// match frame {
///     DecodedFrame::Device(event) => assert_eq!(event.data, "FFFF00"),
///     other => panic!("unexpected frame {other:?}"),
/// }
/// ```
pub fn decode(line: &str) -> Result<DecodedFrame, DecodeError> {
    let value: Value = serde_json::from_str(line.trim())
        .map_err(|e| DecodeError::Malformed(e.to_string()))?;

    let Value::Object(object) = value else {
        return Err(DecodeError::NotAnObject);
    };

    if let Some(entries) = object.get(DEVICE_KEY) {
        let (device_id, group_id, data) = extract_entry(FrameKind::Device, entries)?;
        return Ok(DecodedFrame::Device(DeviceEvent {
            device_id,
            group_id,
            data,
        }));
    }

    if let Some(entries) = object.get(ACK_KEY) {
        let (device_id, group_id, data) = extract_entry(FrameKind::Ack, entries)?;
        return Ok(DecodedFrame::Ack(AckEvent {
            device_id,
            group_id,
            data,
        }));
    }

    Ok(DecodedFrame::Unknown(UnknownFrame { raw: object }))
}

/// Encode an MQTT command into the frame written to the cape
///
/// # Examples
/// ```
/// use ninjacape_bridge::protocol::{encode, FrameTrailer};
///
/// let frame = encode("ninjaCape/output/1007", b"00FF00", FrameTrailer::None).unwrap();
/// assert_eq!(frame, r#"{"DEVICE":[{"G":"0","V":0,"D":1007,"DA":"00FF00"}]}"#);
/// ```
pub fn encode(topic: &str, payload: &[u8], trailer: FrameTrailer) -> Result<String, EncodeError> {
    let segment =
        output_device_segment(topic).ok_or_else(|| EncodeError::InvalidTopic(topic.to_string()))?;
    let device: i64 = segment
        .parse()
        .map_err(|_| EncodeError::InvalidDeviceId(segment.to_string()))?;
    let data = std::str::from_utf8(payload).map_err(|_| EncodeError::InvalidPayload)?;

    let frame = CommandFrame {
        device: [CommandEntry {
            group: COMMAND_GROUP,
            value: COMMAND_VALUE,
            device,
            data,
        }],
    };

    let mut encoded =
        serde_json::to_string(&frame).map_err(|e| EncodeError::Serialization(e.to_string()))?;
    encoded.push_str(trailer.as_str());
    Ok(encoded)
}

/// Pull `D`, `G` and `DA` out of the first entry of a `DEVICE`/`ACK` array
fn extract_entry(kind: FrameKind, entries: &Value) -> Result<(i64, String, String), DecodeError> {
    let entry = entries
        .as_array()
        .and_then(|array| array.first())
        .and_then(Value::as_object)
        .ok_or(DecodeError::EmptyFrame(kind))?;

    let device_id = parse_device_id(kind, field(kind, entry, FIELD_DEVICE_ID)?)?;
    let group_id = scalar_to_string(kind, FIELD_GROUP_ID, field(kind, entry, FIELD_GROUP_ID)?)?;
    let data = scalar_to_string(kind, FIELD_DATA, field(kind, entry, FIELD_DATA)?)?;

    Ok((device_id, group_id, data))
}

fn field<'a>(
    kind: FrameKind,
    entry: &'a Map<String, Value>,
    name: &'static str,
) -> Result<&'a Value, DecodeError> {
    entry
        .get(name)
        .ok_or(DecodeError::MissingField { kind, field: name })
}

fn parse_device_id(kind: FrameKind, value: &Value) -> Result<i64, DecodeError> {
    let parsed = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| DecodeError::InvalidField {
        kind,
        field: FIELD_DEVICE_ID,
        value: value.to_string(),
    })
}

/// Strings pass through untouched; numbers and booleans are stringified
fn scalar_to_string(
    kind: FrameKind,
    name: &'static str,
    value: &Value,
) -> Result<String, DecodeError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(DecodeError::InvalidField {
            kind,
            field: name,
            value: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const DEVICE_LINE: &str = r#"{"DEVICE":[{"G":"0","V":0,"D":1007,"DA":"FFFF00"}]}"#;
    const ACK_LINE: &str = r#"{"ACK":[{"G":"0","V":0,"D":1007,"DA":"FFFF00"}]}"#;

    #[test]
    fn test_decode_device_frame() {
        let frame = decode(DEVICE_LINE).unwrap();
        assert_eq!(
            frame,
            DecodedFrame::Device(DeviceEvent {
                device_id: 1007,
                group_id: "0".to_string(),
                data: "FFFF00".to_string(),
            })
        );
    }

    #[test]
    fn test_decode_ack_frame() {
        let frame = decode(ACK_LINE).unwrap();
        assert!(matches!(
            frame,
            DecodedFrame::Ack(AckEvent { device_id: 1007, .. })
        ));
    }

    #[test]
    fn test_decode_tolerates_line_endings() {
        let line = format!("{DEVICE_LINE}\r\n");
        assert!(matches!(decode(&line), Ok(DecodedFrame::Device(_))));
    }

    #[test]
    fn test_decode_malformed() {
        assert!(matches!(decode("not json"), Err(DecodeError::Malformed(_))));
        assert!(matches!(decode(""), Err(DecodeError::Malformed(_))));
        assert!(matches!(
            decode(r#"{"DEVICE":[{"G":"0""#),
            Err(DecodeError::Malformed(_))
        ));
    }

    #[test]
    fn test_decode_not_an_object() {
        assert_eq!(decode("42"), Err(DecodeError::NotAnObject));
        assert_eq!(decode(r#"["DEVICE"]"#), Err(DecodeError::NotAnObject));
    }

    #[test]
    fn test_decode_missing_fields() {
        let cases = [
            (r#"{"DEVICE":[{"G":"0","DA":"FF"}]}"#, "D"),
            (r#"{"DEVICE":[{"D":1,"DA":"FF"}]}"#, "G"),
            (r#"{"DEVICE":[{"D":1,"G":"0"}]}"#, "DA"),
            (r#"{"ACK":[{"G":"0","DA":"FF"}]}"#, "D"),
        ];

        for (line, expected) in cases {
            let err = decode(line).unwrap_err();
            assert!(
                matches!(err, DecodeError::MissingField { .. }),
                "expected MissingField for {line}, got {err:?}"
            );
            assert_eq!(err.field(), Some(expected), "wrong field for {line}");
        }
    }

    #[test]
    fn test_decode_empty_frame() {
        assert_eq!(
            decode(r#"{"DEVICE":[]}"#),
            Err(DecodeError::EmptyFrame(FrameKind::Device))
        );
        assert_eq!(
            decode(r#"{"ACK":"nope"}"#),
            Err(DecodeError::EmptyFrame(FrameKind::Ack))
        );
    }

    #[test]
    fn test_decode_invalid_device_id() {
        let err = decode(r#"{"DEVICE":[{"G":"0","D":"abc","DA":"FF"}]}"#).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::InvalidField { field: "D", .. }
        ));
    }

    #[test]
    fn test_decode_numeric_group_and_data_are_stringified() {
        let frame = decode(r#"{"DEVICE":[{"G":2,"V":0,"D":"31","DA":25.5}]}"#).unwrap();
        assert_eq!(
            frame,
            DecodedFrame::Device(DeviceEvent {
                device_id: 31,
                group_id: "2".to_string(),
                data: "25.5".to_string(),
            })
        );
    }

    #[test]
    fn test_decode_unknown_frame() {
        let frame = decode(r#"{"PLUGIN":[{"G":"0","D":1}]}"#).unwrap();
        match frame {
            DecodedFrame::Unknown(unknown) => assert!(unknown.raw.contains_key("PLUGIN")),
            other => panic!("expected unknown frame, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_device_takes_precedence_over_ack() {
        let line = r#"{"ACK":[{"G":"0","D":1,"DA":"a"}],"DEVICE":[{"G":"0","D":2,"DA":"b"}]}"#;
        assert!(matches!(
            decode(line),
            Ok(DecodedFrame::Device(DeviceEvent { device_id: 2, .. }))
        ));
    }

    #[test]
    fn test_decode_uses_first_entry_only() {
        let line = r#"{"DEVICE":[{"G":"0","D":1,"DA":"a"},{"G":"0","D":2,"DA":"b"}]}"#;
        assert!(matches!(
            decode(line),
            Ok(DecodedFrame::Device(DeviceEvent { device_id: 1, .. }))
        ));
    }

    #[test]
    fn test_encode_frame_shape() {
        let frame = encode("ninjaCape/output/1007", b"00FF00", FrameTrailer::None).unwrap();
        assert_eq!(frame, r#"{"DEVICE":[{"G":"0","V":0,"D":1007,"DA":"00FF00"}]}"#);
    }

    #[test]
    fn test_encode_trailers() {
        let legacy = encode("ninjaCape/output/1007", b"00FF00", FrameTrailer::Legacy).unwrap();
        assert!(legacy.ends_with(r#""}]})"#));
        assert_eq!(LEGACY_FRAME_TRAILER, ")");

        let newline = encode("ninjaCape/output/1007", b"00FF00", FrameTrailer::Newline).unwrap();
        assert!(newline.ends_with("}]}\n"));
    }

    #[test]
    fn test_encode_escapes_payload() {
        let frame = encode("ninjaCape/output/5", br#"say "hi""#, FrameTrailer::None).unwrap();
        assert!(frame.contains(r#""DA":"say \"hi\"""#));
        assert!(decode(&frame).is_ok());
    }

    #[test]
    fn test_encode_rejects_bad_topics() {
        assert_eq!(
            encode("ninjaCape/input/1007", b"x", FrameTrailer::None),
            Err(EncodeError::InvalidTopic("ninjaCape/input/1007".to_string()))
        );
        assert_eq!(
            encode("ninjaCape/output/lamp", b"x", FrameTrailer::None),
            Err(EncodeError::InvalidDeviceId("lamp".to_string()))
        );
        assert_eq!(
            encode("ninjaCape/output/1007", &[0xff, 0xfe], FrameTrailer::None),
            Err(EncodeError::InvalidPayload)
        );
    }

    #[test]
    fn test_encoded_frame_decodes_to_same_device() {
        let frame = encode("ninjaCape/output/1007", b"00FF00", FrameTrailer::None).unwrap();
        assert_eq!(
            decode(&frame).unwrap(),
            DecodedFrame::Device(DeviceEvent {
                device_id: 1007,
                group_id: COMMAND_GROUP.to_string(),
                data: "00FF00".to_string(),
            })
        );
    }

    proptest! {
        #[test]
        fn decode_never_panics(line in ".*") {
            let _ = decode(&line);
        }

        #[test]
        fn decode_device_frames_follow_topic_rule(
            device in 0i64..100_000,
            group in "[0-9]{1,4}",
            data in "[A-Za-z0-9]{0,16}",
        ) {
            let line = format!(r#"{{"DEVICE":[{{"G":"{group}","V":0,"D":{device},"DA":"{data}"}}]}}"#);
            match decode(&line) {
                Ok(DecodedFrame::Device(event)) => {
                    prop_assert_eq!(event.input_topic(), format!("ninjaCape/input/{device}_{group}"));
                    prop_assert_eq!(event.data, data);
                }
                other => prop_assert!(false, "unexpected decode result {:?}", other),
            }
        }

        #[test]
        fn encode_is_pure(device in 0i64..100_000, payload in "[ -~]{0,32}") {
            let topic = format!("ninjaCape/output/{device}");
            let first = encode(&topic, payload.as_bytes(), FrameTrailer::Legacy);
            let second = encode(&topic, payload.as_bytes(), FrameTrailer::Legacy);
            prop_assert_eq!(first, second);
        }
    }
}
