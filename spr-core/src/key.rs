use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::SprError;

/// A single logical input token delivered by the host.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyToken {
    Space,
    Enter,
    Escape,
    Backspace,
    /// A printable key, stored lowercase.
    Char(char),
}

impl KeyToken {
    /// Parses a key spec such as `" "`, `"space"`, `"Enter"` or `"j"`.
    pub fn parse(spec: &str) -> Result<Self, SprError> {
        if spec == " " {
            return Ok(KeyToken::Space);
        }
        let trimmed = spec.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "space" | "spacebar" => return Ok(KeyToken::Space),
            "enter" | "return" => return Ok(KeyToken::Enter),
            "escape" | "esc" => return Ok(KeyToken::Escape),
            "backspace" => return Ok(KeyToken::Backspace),
            _ => {}
        }
        let mut chars = trimmed.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) if !c.is_whitespace() && !c.is_control() => {
                Ok(KeyToken::Char(c.to_lowercase().next().unwrap_or(c)))
            }
            _ => Err(SprError::InvalidAdvanceKey(spec.to_string())),
        }
    }

    /// Digit value for keys `0`..`9`.
    pub fn digit(&self) -> Option<u8> {
        match self {
            KeyToken::Char(c) => c.to_digit(10).map(|d| d as u8),
            _ => None,
        }
    }
}

impl Default for KeyToken {
    fn default() -> Self {
        KeyToken::Space
    }
}

impl fmt::Display for KeyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyToken::Space => f.write_str("space"),
            KeyToken::Enter => f.write_str("enter"),
            KeyToken::Escape => f.write_str("escape"),
            KeyToken::Backspace => f.write_str("backspace"),
            KeyToken::Char(c) => write!(f, "{c}"),
        }
    }
}

impl FromStr for KeyToken {
    type Err = SprError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        KeyToken::parse(s)
    }
}

impl Serialize for KeyToken {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for KeyToken {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let spec = String::deserialize(deserializer)?;
        KeyToken::parse(&spec).map_err(serde::de::Error::custom)
    }
}

/// A discrete key press stamped with a monotonic time in nanoseconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEvent {
    pub token: KeyToken,
    pub timestamp_ns: u64,
}

impl KeyEvent {
    pub fn new(token: KeyToken, timestamp_ns: u64) -> Self {
        Self {
            token,
            timestamp_ns,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_named_keys() {
        assert_eq!(KeyToken::parse(" ").unwrap(), KeyToken::Space);
        assert_eq!(KeyToken::parse("Space").unwrap(), KeyToken::Space);
        assert_eq!(KeyToken::parse("RETURN").unwrap(), KeyToken::Enter);
        assert_eq!(KeyToken::parse("esc").unwrap(), KeyToken::Escape);
        assert_eq!(KeyToken::parse("Backspace").unwrap(), KeyToken::Backspace);
    }

    #[test]
    fn test_parse_char_is_lowercased() {
        assert_eq!(KeyToken::parse("J").unwrap(), KeyToken::Char('j'));
        assert_eq!(KeyToken::parse("3").unwrap().digit(), Some(3));
    }

    #[test]
    fn test_parse_rejects_multiple_tokens() {
        assert!(matches!(
            KeyToken::parse("ab"),
            Err(SprError::InvalidAdvanceKey(_))
        ));
        assert!(KeyToken::parse("").is_err());
        assert!(KeyToken::parse("\t").is_err());
        assert!(KeyToken::parse("j k").is_err());
    }

    #[test]
    fn test_serde_uses_key_spec() {
        let json = serde_json::to_string(&KeyToken::Space).unwrap();
        assert_eq!(json, "\"space\"");
        let key: KeyToken = serde_json::from_str("\" \"").unwrap();
        assert_eq!(key, KeyToken::Space);
        assert!(serde_json::from_str::<KeyToken>("\"shift+a\"").is_err());
    }
}
