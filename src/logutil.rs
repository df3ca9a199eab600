//! Logging helpers that keep every log record on one line.
//!
//! Chat bodies and MQTT payloads arrive from other nodes and may contain control
//! characters; binary frames are shown as a bounded hex preview.

use std::fmt::Write;

use crate::message::MessageHeader;

/// Escape a string for single-line logging:
/// - `\n` => `\\n`
/// - `\r` => `\\r`
/// - `\t` => `\\t`
/// - backslash => `\\\\`
/// - any other control char => `\xNN`
///
/// Output is capped at 200 characters with an ellipsis.
pub fn escape_log(s: &str) -> String {
    const MAX_PREVIEW: usize = 200;
    let mut out = String::with_capacity(s.len().min(MAX_PREVIEW) + 8);
    for (count, ch) in s.chars().enumerate() {
        if count >= MAX_PREVIEW {
            out.push('…');
            break;
        }
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(&mut out, "\\x{:02X}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}

/// Space separated hex of at most `max` leading bytes, with the total length
/// appended when the input was cut.
pub fn hex_preview(bytes: &[u8], max: usize) -> String {
    let mut out = String::with_capacity(max.min(bytes.len()) * 3 + 12);
    for (i, b) in bytes.iter().take(max).enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(&mut out, "{:02x}", b);
    }
    if bytes.len() > max {
        let _ = write!(&mut out, " … ({} bytes)", bytes.len());
    }
    out
}

/// One-line header summary used by the dispatcher and the transports.
pub fn describe_header(h: &MessageHeader) -> String {
    format!(
        "{:04X}:{} -> {:04X}:{} id={}",
        h.addr_src,
        h.app_port_src.name(),
        h.addr_dst,
        h.app_port_dst.name(),
        h.message_id
    )
}
