//! Display-safe value previews.

use crate::model::DEFAULT_PREVIEW_CHARS;

/// Number of leading bytes inspected by [`is_binary`].
pub const BINARY_SNIFF_LEN: usize = 512;

/// Appended to previews of values longer than the preview length.
pub const TRUNCATION_MARKER: &str = "...";

/// Heuristically classifies a value as binary.
///
/// Only a NUL byte within the first [`BINARY_SNIFF_LEN`] bytes counts; NULs
/// further in, or other unprintable bytes, leave the value classified as
/// text.
pub fn is_binary(value: &[u8]) -> bool {
    let sniff = &value[..value.len().min(BINARY_SNIFF_LEN)];
    sniff.contains(&0)
}

/// Renders a bounded preview of `value`.
///
/// Binary values become `[Binary <n> bytes]`. Text values are decoded
/// lossily and cut to `preview_chars` characters, with
/// [`TRUNCATION_MARKER`] appended when anything was cut. A `preview_chars`
/// of 0 selects [`DEFAULT_PREVIEW_CHARS`].
pub fn preview(value: &[u8], preview_chars: usize) -> String {
    if is_binary(value) {
        return format!("[Binary {} bytes]", value.len());
    }

    let limit = if preview_chars == 0 {
        DEFAULT_PREVIEW_CHARS
    } else {
        preview_chars
    };
    let text = String::from_utf8_lossy(value);
    match text.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}{}", &text[..cut], TRUNCATION_MARKER),
        None => text.into_owned(),
    }
}
