//! Line-protocol text encoding.
//!
//! One record per line:
//!
//! ```text
//! measurement,tag1=val1,tag2=val2 field1=val1,field2=val2 timestamp
//! ```
//!
//! Measurement names escape `,` and space; tag keys, tag values and field
//! keys additionally escape `=`; string field values are double-quoted with
//! `\` and `"` escaped. Integer fields carry an `i` suffix. All encoders
//! append to a caller-provided scratch buffer so the hot path performs no
//! allocation once buffers are warm.

use std::io::Write;

/// Appends an escaped measurement name.
pub(crate) fn escape_measurement_into(out: &mut Vec<u8>, s: &str) {
    for b in s.bytes() {
        if matches!(b, b',' | b' ') {
            out.push(b'\\');
        }
        out.push(b);
    }
}

/// Appends an escaped tag key, tag value, or field key.
pub(crate) fn escape_key_into(out: &mut Vec<u8>, s: &str) {
    for b in s.bytes() {
        if matches!(b, b',' | b'=' | b' ') {
            out.push(b'\\');
        }
        out.push(b);
    }
}

/// Appends a quoted string field value.
pub(crate) fn write_string_field_into(out: &mut Vec<u8>, s: &str) {
    out.push(b'"');
    for b in s.bytes() {
        if matches!(b, b'\\' | b'"') {
            out.push(b'\\');
        }
        out.push(b);
    }
    out.push(b'"');
}

/// Appends a float field value.
pub(crate) fn write_f64_into(out: &mut Vec<u8>, v: f64) {
    // Vec<u8> is an infallible io::Write
    let _ = write!(out, "{v}");
}

/// Appends an integer field value with the `i` type suffix.
pub(crate) fn write_i64_into(out: &mut Vec<u8>, v: i64) {
    let _ = write!(out, "{v}i");
}

/// Appends a boolean field value.
pub(crate) fn write_bool_into(out: &mut Vec<u8>, v: bool) {
    out.extend_from_slice(if v { b"true" } else { b"false" });
}
