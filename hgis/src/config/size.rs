//! Human-readable byte sizes such as `256MB` or `2G`.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid size '{input}', expected a byte count like '256MB', '2GB' or '512KB'")]
pub struct SizeParseError {
    input: String,
}

const KB: usize = 1024;
const MB: usize = 1024 * KB;
const GB: usize = 1024 * MB;

/// Parse a size with an optional binary `K`/`M`/`G` suffix (a trailing `B`
/// is accepted, case and surrounding whitespace are ignored).
///
/// ```
/// use hgis::config::parse_size;
///
/// assert_eq!(parse_size("512").unwrap(), 512);
/// assert_eq!(parse_size("256MB").unwrap(), 256 * 1024 * 1024);
/// assert_eq!(parse_size("2 g").unwrap(), 2 * 1024 * 1024 * 1024);
/// ```
pub fn parse_size(input: &str) -> Result<usize, SizeParseError> {
    let invalid = || SizeParseError {
        input: input.to_string(),
    };
    let upper = input.trim().to_ascii_uppercase();
    let body = upper.strip_suffix('B').unwrap_or(&upper);
    let (digits, multiplier) = match body.chars().last() {
        Some('K') => (&body[..body.len() - 1], KB),
        Some('M') => (&body[..body.len() - 1], MB),
        Some('G') => (&body[..body.len() - 1], GB),
        _ => (body, 1),
    };
    let n: usize = digits.trim().parse().map_err(|_| invalid())?;
    n.checked_mul(multiplier).ok_or_else(invalid)
}

/// Format a byte count using the largest unit that divides it exactly.
pub fn format_size(bytes: usize) -> String {
    if bytes >= GB && bytes % GB == 0 {
        format!("{}GB", bytes / GB)
    } else if bytes >= MB && bytes % MB == 0 {
        format!("{}MB", bytes / MB)
    } else if bytes >= KB && bytes % KB == 0 {
        format!("{}KB", bytes / KB)
    } else {
        bytes.to_string()
    }
}
