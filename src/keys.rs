//! Keyboard definition table for event synthesis by the host: identifier →
//! `{key, code, keyCode, location, text}` for the US layout, physical codes
//! and produced keys alike. The table is a pure lookup; modifier parsing
//! (`Ctrl+`, `Shift+`) belongs to the caller, but identifiers that end in
//! `+key` are normalized to their base key.

use std::collections::HashMap;
use std::sync::OnceLock;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct KeyDefinition {
    pub key: &'static str,
    pub code: &'static str,
    pub key_code: u32,
    pub location: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<&'static str>,
}

macro_rules! key_table {
    ($( $code:literal, $key:literal, $key_code:expr, $location:expr, $text:expr; )*) => {
        const KEY_DEFINITIONS: &[KeyDefinition] = &[
            $(KeyDefinition {
                key: $key,
                code: $code,
                key_code: $key_code,
                location: $location,
                text: $text,
            },)*
        ];
    };
}

#[rustfmt::skip]
key_table! {
    // Control and navigation
    "Escape", "Escape", 27, 0, None;
    "F1", "F1", 112, 0, None;
    "F2", "F2", 113, 0, None;
    "F3", "F3", 114, 0, None;
    "F4", "F4", 115, 0, None;
    "F5", "F5", 116, 0, None;
    "F6", "F6", 117, 0, None;
    "F7", "F7", 118, 0, None;
    "F8", "F8", 119, 0, None;
    "F9", "F9", 120, 0, None;
    "F10", "F10", 121, 0, None;
    "F11", "F11", 122, 0, None;
    "F12", "F12", 123, 0, None;
    "Backspace", "Backspace", 8, 0, None;
    "Tab", "Tab", 9, 0, None;
    "Enter", "Enter", 13, 0, Some("\r");
    "ShiftLeft", "Shift", 16, 1, None;
    "ShiftRight", "Shift", 16, 2, None;
    "ControlLeft", "Control", 17, 1, None;
    "ControlRight", "Control", 17, 2, None;
    "AltLeft", "Alt", 18, 1, None;
    "AltRight", "Alt", 18, 2, None;
    "Pause", "Pause", 19, 0, None;
    "CapsLock", "CapsLock", 20, 0, None;
    "Space", " ", 32, 0, Some(" ");
    "PageUp", "PageUp", 33, 0, None;
    "PageDown", "PageDown", 34, 0, None;
    "End", "End", 35, 0, None;
    "Home", "Home", 36, 0, None;
    "ArrowLeft", "ArrowLeft", 37, 0, None;
    "ArrowUp", "ArrowUp", 38, 0, None;
    "ArrowRight", "ArrowRight", 39, 0, None;
    "ArrowDown", "ArrowDown", 40, 0, None;
    "PrintScreen", "PrintScreen", 44, 0, None;
    "Insert", "Insert", 45, 0, None;
    "Delete", "Delete", 46, 0, None;
    "MetaLeft", "Meta", 91, 1, None;
    "MetaRight", "Meta", 92, 2, None;
    "ContextMenu", "ContextMenu", 93, 0, None;
    "NumLock", "NumLock", 144, 0, None;
    "ScrollLock", "ScrollLock", 145, 0, None;
    "Select", "Select", 41, 0, None;
    "Open", "Open", 43, 0, None;
    "Help", "Help", 6, 0, None;
    "AudioVolumeMute", "AudioVolumeMute", 173, 0, None;
    "AudioVolumeDown", "AudioVolumeDown", 174, 0, None;
    "AudioVolumeUp", "AudioVolumeUp", 175, 0, None;
    "MediaTrackNext", "MediaTrackNext", 176, 0, None;
    "MediaTrackPrevious", "MediaTrackPrevious", 177, 0, None;
    "MediaStop", "MediaStop", 178, 0, None;
    "MediaPlayPause", "MediaPlayPause", 179, 0, None;

    // Digit row
    "Digit0", "0", 48, 0, Some("0");
    "Digit1", "1", 49, 0, Some("1");
    "Digit2", "2", 50, 0, Some("2");
    "Digit3", "3", 51, 0, Some("3");
    "Digit4", "4", 52, 0, Some("4");
    "Digit5", "5", 53, 0, Some("5");
    "Digit6", "6", 54, 0, Some("6");
    "Digit7", "7", 55, 0, Some("7");
    "Digit8", "8", 56, 0, Some("8");
    "Digit9", "9", 57, 0, Some("9");
    "Digit1", "!", 49, 0, Some("!");
    "Digit2", "@", 50, 0, Some("@");
    "Digit3", "#", 51, 0, Some("#");
    "Digit4", "$", 52, 0, Some("$");
    "Digit5", "%", 53, 0, Some("%");
    "Digit6", "^", 54, 0, Some("^");
    "Digit7", "&", 55, 0, Some("&");
    "Digit8", "*", 56, 0, Some("*");
    "Digit9", "(", 57, 0, Some("(");
    "Digit0", ")", 48, 0, Some(")");

    // Letters, lowercase then shifted
    "KeyA", "a", 65, 0, Some("a");
    "KeyB", "b", 66, 0, Some("b");
    "KeyC", "c", 67, 0, Some("c");
    "KeyD", "d", 68, 0, Some("d");
    "KeyE", "e", 69, 0, Some("e");
    "KeyF", "f", 70, 0, Some("f");
    "KeyG", "g", 71, 0, Some("g");
    "KeyH", "h", 72, 0, Some("h");
    "KeyI", "i", 73, 0, Some("i");
    "KeyJ", "j", 74, 0, Some("j");
    "KeyK", "k", 75, 0, Some("k");
    "KeyL", "l", 76, 0, Some("l");
    "KeyM", "m", 77, 0, Some("m");
    "KeyN", "n", 78, 0, Some("n");
    "KeyO", "o", 79, 0, Some("o");
    "KeyP", "p", 80, 0, Some("p");
    "KeyQ", "q", 81, 0, Some("q");
    "KeyR", "r", 82, 0, Some("r");
    "KeyS", "s", 83, 0, Some("s");
    "KeyT", "t", 84, 0, Some("t");
    "KeyU", "u", 85, 0, Some("u");
    "KeyV", "v", 86, 0, Some("v");
    "KeyW", "w", 87, 0, Some("w");
    "KeyX", "x", 88, 0, Some("x");
    "KeyY", "y", 89, 0, Some("y");
    "KeyZ", "z", 90, 0, Some("z");
    "KeyA", "A", 65, 0, Some("A");
    "KeyB", "B", 66, 0, Some("B");
    "KeyC", "C", 67, 0, Some("C");
    "KeyD", "D", 68, 0, Some("D");
    "KeyE", "E", 69, 0, Some("E");
    "KeyF", "F", 70, 0, Some("F");
    "KeyG", "G", 71, 0, Some("G");
    "KeyH", "H", 72, 0, Some("H");
    "KeyI", "I", 73, 0, Some("I");
    "KeyJ", "J", 74, 0, Some("J");
    "KeyK", "K", 75, 0, Some("K");
    "KeyL", "L", 76, 0, Some("L");
    "KeyM", "M", 77, 0, Some("M");
    "KeyN", "N", 78, 0, Some("N");
    "KeyO", "O", 79, 0, Some("O");
    "KeyP", "P", 80, 0, Some("P");
    "KeyQ", "Q", 81, 0, Some("Q");
    "KeyR", "R", 82, 0, Some("R");
    "KeyS", "S", 83, 0, Some("S");
    "KeyT", "T", 84, 0, Some("T");
    "KeyU", "U", 85, 0, Some("U");
    "KeyV", "V", 86, 0, Some("V");
    "KeyW", "W", 87, 0, Some("W");
    "KeyX", "X", 88, 0, Some("X");
    "KeyY", "Y", 89, 0, Some("Y");
    "KeyZ", "Z", 90, 0, Some("Z");

    // Punctuation, plain then shifted
    "Backquote", "`", 192, 0, Some("`");
    "Minus", "-", 189, 0, Some("-");
    "Equal", "=", 187, 0, Some("=");
    "BracketLeft", "[", 219, 0, Some("[");
    "BracketRight", "]", 221, 0, Some("]");
    "Backslash", "\\", 220, 0, Some("\\");
    "Semicolon", ";", 186, 0, Some(";");
    "Quote", "'", 222, 0, Some("'");
    "Comma", ",", 188, 0, Some(",");
    "Period", ".", 190, 0, Some(".");
    "Slash", "/", 191, 0, Some("/");
    "Backquote", "~", 192, 0, Some("~");
    "Minus", "_", 189, 0, Some("_");
    "Equal", "+", 187, 0, Some("+");
    "BracketLeft", "{", 219, 0, Some("{");
    "BracketRight", "}", 221, 0, Some("}");
    "Backslash", "|", 220, 0, Some("|");
    "Semicolon", ":", 186, 0, Some(":");
    "Quote", "\"", 222, 0, Some("\"");
    "Comma", "<", 188, 0, Some("<");
    "Period", ">", 190, 0, Some(">");
    "Slash", "?", 191, 0, Some("?");

    // Numeric keypad (location 3)
    "Numpad0", "0", 96, 3, Some("0");
    "Numpad1", "1", 97, 3, Some("1");
    "Numpad2", "2", 98, 3, Some("2");
    "Numpad3", "3", 99, 3, Some("3");
    "Numpad4", "4", 100, 3, Some("4");
    "Numpad5", "5", 101, 3, Some("5");
    "Numpad6", "6", 102, 3, Some("6");
    "Numpad7", "7", 103, 3, Some("7");
    "Numpad8", "8", 104, 3, Some("8");
    "Numpad9", "9", 105, 3, Some("9");
    "NumpadMultiply", "*", 106, 3, Some("*");
    "NumpadAdd", "+", 107, 3, Some("+");
    "NumpadSubtract", "-", 109, 3, Some("-");
    "NumpadDecimal", ".", 110, 3, Some(".");
    "NumpadDivide", "/", 111, 3, Some("/");
    "NumpadEnter", "Enter", 13, 3, Some("\r");
    "NumpadEqual", "=", 187, 3, Some("=");
}

fn lookup_table() -> &'static HashMap<&'static str, &'static KeyDefinition> {
    static TABLE: OnceLock<HashMap<&'static str, &'static KeyDefinition>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = HashMap::new();
        for definition in KEY_DEFINITIONS {
            // First wins: the unshifted row claims the physical code, the
            // shifted row stays reachable through its produced key.
            table.entry(definition.code).or_insert(definition);
            table.entry(definition.key).or_insert(definition);
        }
        table
    })
}

/// Number of distinct identifiers the table answers for.
pub fn key_definition_count() -> usize {
    lookup_table().len()
}

/// Look up a key definition by identifier: a physical code (`KeyA`,
/// `Numpad7`), a produced key (`a`, `%`, `Enter`), or a modifier-prefixed
/// form whose base key follows the last `+` (`Shift+A`, `Control+ArrowLeft`,
/// `Control++`).
pub fn get_key_definition(id: &str) -> Option<KeyDefinition> {
    let table = lookup_table();
    if let Some(definition) = table.get(id) {
        return Some(**definition);
    }
    if let Some(plus) = id.rfind('+') {
        let base = if plus + 1 == id.len() { "+" } else { &id[plus + 1..] };
        if !base.is_empty() && base != id {
            return table.get(base).map(|d| **d);
        }
    }
    None
}
