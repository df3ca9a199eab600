//! Validation of user supplied names, chat text and addresses.

use crate::message::payload::MAX_NAME_LEN;

/// Longest chat text accepted in either direction, in bytes.
pub const MAX_CHAT_TEXT_LEN: usize = 100;

/// Contact name validation errors. The display strings are the replies shown
/// to the user.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum NameError {
    #[error("No name added")]
    Empty,

    #[error("Name too long")]
    TooLong { max: usize },

    #[error("Name contains invalid characters")]
    ControlCharacters,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TextError {
    #[error("Message too long (max {max} bytes)")]
    TooLong { len: usize, max: usize },

    #[error("Empty message")]
    Empty,
}

/// Validate a contact name. Surrounding whitespace is ignored; the name must fit
/// the fixed wire field.
pub fn validate_contact_name(name: &str) -> Result<&str, NameError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(NameError::Empty);
    }
    if trimmed.len() > MAX_NAME_LEN {
        return Err(NameError::TooLong { max: MAX_NAME_LEN });
    }
    // NUL is the padding byte of the wire field
    if trimmed.chars().any(|c| c.is_control()) {
        return Err(NameError::ControlCharacters);
    }
    Ok(trimmed)
}

/// Check chat text against [`MAX_CHAT_TEXT_LEN`].
pub fn validate_chat_text(text: &str) -> Result<(), TextError> {
    check_chat_len(text.len())?;
    if text.trim().is_empty() {
        return Err(TextError::Empty);
    }
    Ok(())
}

/// Length-only check, shared with the receive path where the body is raw bytes.
pub fn check_chat_len(len: usize) -> Result<(), TextError> {
    if len > MAX_CHAT_TEXT_LEN {
        return Err(TextError::TooLong {
            len,
            max: MAX_CHAT_TEXT_LEN,
        });
    }
    Ok(())
}

/// Cut `input` to at most `max_bytes` without splitting a character.
pub fn truncate_utf8(input: &str, max_bytes: usize) -> &str {
    if input.len() <= max_bytes {
        return input;
    }
    let mut cut = max_bytes;
    while cut > 0 && !input.is_char_boundary(cut) {
        cut -= 1;
    }
    &input[..cut]
}

/// Parse a node address typed by the user: hexadecimal, `0x` prefix optional.
pub fn parse_node_address(arg: &str) -> Option<u16> {
    let arg = arg.trim();
    let digits = arg
        .strip_prefix("0x")
        .or_else(|| arg.strip_prefix("0X"))
        .unwrap_or(arg);
    if digits.is_empty() {
        return None;
    }
    u16::from_str_radix(digits, 16).ok()
}
