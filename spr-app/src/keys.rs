use spr_core::KeyToken;
use winit::keyboard::{Key, KeyCode, NamedKey, PhysicalKey};

/// Maps a winit key to a token. Digit keys go by position so ratings work
/// under any keyboard layout or input method.
pub fn key_token(physical: PhysicalKey, logical: &Key) -> Option<KeyToken> {
    if let PhysicalKey::Code(code) = physical {
        let digit = match code {
            KeyCode::Digit0 | KeyCode::Numpad0 => Some('0'),
            KeyCode::Digit1 | KeyCode::Numpad1 => Some('1'),
            KeyCode::Digit2 | KeyCode::Numpad2 => Some('2'),
            KeyCode::Digit3 | KeyCode::Numpad3 => Some('3'),
            KeyCode::Digit4 | KeyCode::Numpad4 => Some('4'),
            KeyCode::Digit5 | KeyCode::Numpad5 => Some('5'),
            KeyCode::Digit6 | KeyCode::Numpad6 => Some('6'),
            KeyCode::Digit7 | KeyCode::Numpad7 => Some('7'),
            KeyCode::Digit8 | KeyCode::Numpad8 => Some('8'),
            KeyCode::Digit9 | KeyCode::Numpad9 => Some('9'),
            _ => None,
        };
        if let Some(d) = digit {
            return Some(KeyToken::Char(d));
        }
    }
    match logical {
        Key::Named(NamedKey::Space) => Some(KeyToken::Space),
        Key::Named(NamedKey::Enter) => Some(KeyToken::Enter),
        Key::Named(NamedKey::Escape) => Some(KeyToken::Escape),
        Key::Named(NamedKey::Backspace) => Some(KeyToken::Backspace),
        Key::Character(s) => KeyToken::parse(s.as_str()).ok(),
        _ => None,
    }
}
