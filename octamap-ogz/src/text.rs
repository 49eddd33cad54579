//! Strings as stored in map files.
//!
//! Names and values are single-byte charset text, not UTF-8, so they are kept
//! as raw bytes and written back unchanged. JSON shows them as a string when
//! the bytes happen to be valid UTF-8 and as a byte array otherwise.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct RawString(Vec<u8>);

impl RawString {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_string_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.0)
    }
}

impl AsRef<[u8]> for RawString {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for RawString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}

impl From<&str> for RawString {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

impl From<String> for RawString {
    fn from(s: String) -> Self {
        Self(s.into_bytes())
    }
}

impl From<Vec<u8>> for RawString {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for RawString {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl PartialEq<str> for RawString {
    fn eq(&self, other: &str) -> bool {
        self.0 == other.as_bytes()
    }
}

impl PartialEq<&str> for RawString {
    fn eq(&self, other: &&str) -> bool {
        self.0 == other.as_bytes()
    }
}

impl Serialize for RawString {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match std::str::from_utf8(&self.0) {
            Ok(text) => serializer.serialize_str(text),
            Err(_) => self.0.serialize(serializer),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Repr {
    Text(String),
    Bytes(Vec<u8>),
}

impl<'de> Deserialize<'de> for RawString {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Ok(match Repr::deserialize(deserializer)? {
            Repr::Text(s) => Self(s.into_bytes()),
            Repr::Bytes(b) => Self(b),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf8_shown_as_text() {
        let s = RawString::from("maptitle");
        assert_eq!(serde_json::to_value(&s).unwrap(), "maptitle");
        assert_eq!(s, "maptitle");
    }

    #[test]
    fn test_latin1_bytes_survive_json() {
        let s = RawString::new(vec![0x43, 0xE9, 0x66, 0x65]);
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json, serde_json::json!([0x43, 0xE9, 0x66, 0x65]));
        let back: RawString = serde_json::from_value(json).unwrap();
        assert_eq!(back, s);
        assert_eq!(s.to_string(), "C\u{FFFD}fe");
    }
}
