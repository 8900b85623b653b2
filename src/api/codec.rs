//! batchexecute response decoding.
//!
//! A response body looks like:
//!
//! ```text
//! )]}'
//!
//! 123
//! [["wrb.fr","rpcId","<json string>",null,null,null,"generic"]]
//! 58
//! [["di",42],["af.httprm",41,"-123",1]]
//! ```
//!
//! Each block is a UTF-8 byte count on its own line followed by a JSON array
//! that may span several lines. Some servers also emit bare JSON lines. All
//! functions here are pure; malformed blocks are skipped, never fatal.

use crate::error::{NotebookError, Result};
use serde_json::Value;

/// XSSI guard prepended to every response.
pub const XSSI_PREFIX: &str = ")]}'";

/// Envelope tag for an RPC result.
pub const ENVELOPE_MARKER: &str = "wrb.fr";

// Envelope positions: [marker, callId, result, _, _, errorCodes, errorKind]
const IDX_CALL_ID: usize = 1;
const IDX_RESULT: usize = 2;
const IDX_ERROR_CODES: usize = 5;
const IDX_ERROR_KIND: usize = 6;

const GENERIC_ERROR_KIND: &str = "generic";
const AUTH_REJECTED_CODE: u64 = 16;

/// Remove a leading XSSI guard and the whitespace after it. Repeated guards
/// are all removed so the operation is idempotent.
pub fn strip_security_prefix(text: &str) -> &str {
    let mut out = text;
    while let Some(rest) = out.trim_start().strip_prefix(XSSI_PREFIX) {
        out = rest.trim_start();
    }
    out
}

/// A line is a length prefix only if it is a canonical positive integer.
fn parse_length_prefix(line: &str) -> Option<usize> {
    line.parse::<usize>()
        .ok()
        .filter(|n| *n > 0 && n.to_string() == line)
}

fn parse_array(raw: &str) -> Option<Value> {
    serde_json::from_str::<Value>(raw.trim())
        .ok()
        .filter(Value::is_array)
}

fn ceil_char_boundary(s: &str, mut idx: usize) -> usize {
    if idx >= s.len() {
        return s.len();
    }
    while !s.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}

/// Decode one length-prefixed block starting at `start`. Returns the value and
/// the offset just past what was consumed.
///
/// `byte_len` comes off the wire and is only a hint: it is clamped to the body.
fn decode_prefixed(body: &str, start: usize, byte_len: usize) -> Option<(Value, usize)> {
    let start = start.min(body.len());
    let end = ceil_char_boundary(body, start.saturating_add(byte_len));
    if let Some(value) = parse_array(&body[start..end]) {
        return Some((value, end));
    }

    // Count is off, or the value spans lines: grow one line at a time, never
    // past the next length prefix.
    let mut line_start = start;
    while line_start < body.len() {
        let line_end = body[line_start..]
            .find('\n')
            .map_or(body.len(), |i| line_start + i);
        if parse_length_prefix(body[line_start..line_end].trim()).is_some() {
            break;
        }
        if let Some(value) = parse_array(&body[start..line_end]) {
            return Some((value, line_end));
        }
        line_start = line_end + 1;
    }

    None
}

/// Decode every JSON-array block in a response body.
pub fn decode_chunks(text: &str) -> Vec<Value> {
    let body = strip_security_prefix(text);
    let len = body.len();
    let mut chunks = Vec::new();
    let mut pos = 0;

    while pos < len {
        let rest = &body[pos..];
        pos += rest.len() - rest.trim_start().len();
        if pos >= len {
            break;
        }

        let line_end = body[pos..].find('\n').map_or(len, |i| pos + i);
        let line = body[pos..line_end].trim_end();
        let after_line = (line_end + 1).min(len);

        if let Some(byte_len) = parse_length_prefix(line) {
            match decode_prefixed(body, after_line, byte_len) {
                Some((value, next)) => {
                    chunks.push(value);
                    pos = next;
                }
                None => {
                    tracing::debug!(byte_len, offset = pos, "Skipping undecodable block");
                    pos = after_line;
                }
            }
        } else {
            if let Some(value) = parse_array(line) {
                chunks.push(value);
            }
            pos = after_line;
        }
    }

    chunks
}

/// Every `wrb.fr` envelope across all chunks, in order.
pub fn envelopes(chunks: &[Value]) -> impl Iterator<Item = &Vec<Value>> {
    chunks
        .iter()
        .filter_map(Value::as_array)
        .flatten()
        .filter_map(Value::as_array)
        .filter(|env| env.first().and_then(Value::as_str) == Some(ENVELOPE_MARKER))
}

/// `errorKind == "generic"` with code 16 among the error codes.
pub fn is_auth_rejection(envelope: &[Value]) -> bool {
    let generic =
        envelope.get(IDX_ERROR_KIND).and_then(Value::as_str) == Some(GENERIC_ERROR_KIND);
    generic
        && envelope
            .get(IDX_ERROR_CODES)
            .and_then(Value::as_array)
            .is_some_and(|codes| codes.iter().any(|c| c.as_u64() == Some(AUTH_REJECTED_CODE)))
}

/// Result field with the nested JSON string decoded when possible.
pub fn decode_result_field(field: Option<&Value>) -> Value {
    match field {
        Some(Value::String(raw)) => {
            serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.clone()))
        }
        Some(other) => other.clone(),
        None => Value::Null,
    }
}

/// Locate `call_id`'s result. `Ok(None)` when no envelope matches.
///
/// The rejection marker on any envelope fails the whole response.
pub fn extract_result(chunks: &[Value], call_id: &str) -> Result<Option<Value>> {
    let mut found = None;
    let mut seen_ids = Vec::new();

    for envelope in envelopes(chunks) {
        if is_auth_rejection(envelope) {
            return Err(NotebookError::auth(
                "Authentication rejected by the server. Log in again.",
            ));
        }
        let id = envelope.get(IDX_CALL_ID).and_then(Value::as_str);
        if let Some(id) = id {
            seen_ids.push(id);
        }
        if found.is_none() && id == Some(call_id) {
            found = Some(decode_result_field(envelope.get(IDX_RESULT)));
        }
    }

    if found.is_none() {
        tracing::debug!(call_id, ?seen_ids, "No envelope for call");
    }
    Ok(found)
}

/// Strip, decode, and extract in one step.
pub fn parse_and_extract(text: &str, call_id: &str) -> Result<Option<Value>> {
    if text.trim().is_empty() {
        return Ok(None);
    }
    let chunks = decode_chunks(text);
    if chunks.is_empty() {
        let preview: String = text.chars().take(300).collect();
        tracing::error!(bytes = text.len(), %preview, "No chunks decoded from response");
        return Err(NotebookError::validation(
            "Empty or unparseable response from API",
        ));
    }
    tracing::debug!(call_id, chunks = chunks.len(), "Decoded response");
    extract_result(&chunks, call_id)
}
