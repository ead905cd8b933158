//! Wire payload published to and echoed back from the session topic
//!
//! Every payload is a UTF-8 JSON object of the shape
//! `{"message": string, "sequence": integer}`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One message of the publish/echo sequence
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EchoMessage {
    /// Free text configured for the session
    pub message: String,
    /// 1-based position of this message within the session
    pub sequence: u32,
}

/// Errors raised while decoding an inbound payload
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("Payload is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),
    #[error("Payload is not a valid echo message: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

impl EchoMessage {
    pub fn new<S: Into<String>>(message: S, sequence: u32) -> Self {
        Self {
            message: message.into(),
            sequence,
        }
    }

    /// Serialize into the JSON bytes that go on the wire
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Decode a raw payload. UTF-8 is checked before the JSON shape so the
    /// two failure modes stay distinguishable.
    pub fn decode(payload: &[u8]) -> Result<Self, PayloadError> {
        let text = std::str::from_utf8(payload)?;
        Ok(serde_json::from_str(text)?)
    }

    /// True when this message closes a session publishing `count` messages
    pub fn is_final(&self, count: u32) -> bool {
        self.sequence == count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_encode_uses_wire_field_names() {
        let msg = EchoMessage::new("Hello world!", 3);
        let json: serde_json::Value = serde_json::from_slice(&msg.encode().unwrap()).unwrap();

        assert_eq!(json["message"], "Hello world!");
        assert_eq!(json["sequence"], 3);
        assert_eq!(json.as_object().unwrap().len(), 2);
    }

    #[test]
    fn test_decode_foreign_payload() {
        let decoded = EchoMessage::decode(br#"{"sequence": 7, "message": "hi"}"#).unwrap();
        assert_eq!(decoded, EchoMessage::new("hi", 7));
    }

    #[test]
    fn test_decode_ignores_unknown_fields() {
        let decoded =
            EchoMessage::decode(br#"{"message": "hi", "sequence": 1, "extra": true}"#).unwrap();
        assert_eq!(decoded.sequence, 1);
    }

    #[test]
    fn test_decode_rejects_invalid_utf8() {
        let result = EchoMessage::decode(&[0x7b, 0xff, 0xfe, 0x7d]);
        assert!(matches!(result, Err(PayloadError::InvalidUtf8(_))));
    }

    #[test]
    fn test_decode_rejects_wrong_shape() {
        for payload in [
            &b"not json"[..],
            br#"{"message": "hi"}"#,
            br#"{"message": "hi", "sequence": "1"}"#,
            br#"{"message": "hi", "sequence": -1}"#,
            b"[]",
        ] {
            let result = EchoMessage::decode(payload);
            assert!(
                matches!(result, Err(PayloadError::InvalidJson(_))),
                "payload {:?} should be rejected",
                String::from_utf8_lossy(payload)
            );
        }
    }

    #[test]
    fn test_is_final() {
        let msg = EchoMessage::new("x", 10);
        assert!(msg.is_final(10));
        assert!(!msg.is_final(11));
        assert!(!EchoMessage::new("x", 0).is_final(10));
    }

    #[test]
    fn test_escaped_text_survives_the_wire() {
        let msg = EchoMessage::new("quote \" backslash \\ newline \n tab \t \u{0} héllo 🚀", 42);
        assert_eq!(EchoMessage::decode(&msg.encode().unwrap()).unwrap(), msg);
    }

    proptest! {
        #[test]
        fn encoded_message_decodes_to_itself(message in any::<String>(), sequence in any::<u32>()) {
            // Property: whatever text is configured, the echo decodes to the published message
            let msg = EchoMessage::new(message, sequence);
            let payload = msg.encode().unwrap();
            prop_assert_eq!(EchoMessage::decode(&payload).unwrap(), msg);
        }

        #[test]
        fn encoded_message_is_valid_utf8_json(message in "[\"\\\\/\\x00-\\x1f a-z\u{e9}\u{1F680}]*") {
            let payload = EchoMessage::new(message, 1).encode().unwrap();
            prop_assert!(std::str::from_utf8(&payload).is_ok());
            let value: serde_json::Value = serde_json::from_slice(&payload).unwrap();
            prop_assert!(value.is_object());
        }
    }
}
