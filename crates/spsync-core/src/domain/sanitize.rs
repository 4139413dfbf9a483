//! SharePoint-compatible name sanitization
//!
//! Document libraries reject a set of characters, leading `~`/`$`, trailing
//! periods, legacy device names and names longer than 255 characters.
//! Sanitization maps a local name onto a name the library accepts while
//! keeping it recognisable: forbidden characters become their fullwidth
//! Unicode look-alikes.

use super::newtypes::RelativePath;

/// Maximum length of a single file or folder name, in characters
pub const MAX_NAME_LEN: usize = 255;

/// Replacement used when nothing is left of a name
const UNNAMED: &str = "_unnamed";

const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

fn replacement_for(c: char) -> Option<char> {
    let r = match c {
        '#' => '＃',
        '%' => '％',
        '&' => '＆',
        '*' => '＊',
        ':' => '：',
        '<' => '＜',
        '>' => '＞',
        '?' => '？',
        '/' => '／',
        '\\' => '＼',
        '|' => '｜',
        '"' => '＂',
        '{' => '｛',
        '}' => '｝',
        '~' => '～',
        _ => return None,
    };
    Some(r)
}

/// Sanitize a single file or folder name
///
/// For files the reserved-name check applies to the text before the first
/// `.` (`con.txt` is reserved); for folders it applies to the whole name.
#[must_use]
pub fn sanitize_name(name: &str, is_folder: bool) -> String {
    let replaced: String = name
        .chars()
        .map(|c| replacement_for(c).unwrap_or(c))
        .collect();

    let trimmed = replaced
        .trim_start_matches(['~', '$', '～'])
        .trim_end_matches(['.', ' ']);

    let stem = if is_folder {
        trimmed
    } else {
        trimmed.split('.').next().unwrap_or(trimmed)
    };

    let mut sanitized = if RESERVED_NAMES
        .iter()
        .any(|r| r.eq_ignore_ascii_case(stem))
    {
        format!("_{trimmed}")
    } else {
        trimmed.to_string()
    };

    if sanitized.is_empty() {
        sanitized = UNNAMED.to_string();
    }

    truncate_preserving_extension(&sanitized)
}

fn truncate_preserving_extension(name: &str) -> String {
    let len = name.chars().count();
    if len <= MAX_NAME_LEN {
        return name.to_string();
    }

    let (stem, ext) = match name.rfind('.') {
        Some(idx) if idx > 0 => (&name[..idx], &name[idx..]),
        _ => (name, ""),
    };
    let ext_len = ext.chars().count();
    if ext_len >= MAX_NAME_LEN {
        return name.chars().take(MAX_NAME_LEN).collect();
    }

    let keep: String = stem.chars().take(MAX_NAME_LEN - ext_len).collect();
    format!("{keep}{ext}")
}

/// Sanitize every segment of a relative path
///
/// All segments but the last are folders. The last is treated as a file
/// when it contains a `.`.
#[must_use]
pub fn sanitize_path(path: &RelativePath) -> RelativePath {
    let segments: Vec<&str> = path.segments().collect();
    let last = segments.len() - 1;
    let sanitized: Vec<String> = segments
        .iter()
        .enumerate()
        .map(|(i, segment)| {
            let is_folder = i < last || !segment.contains('.');
            sanitize_name(segment, is_folder)
        })
        .collect();

    // Every sanitized segment is non-empty and free of '/', so the joined
    // path is always valid.
    RelativePath::new(sanitized.join("/")).unwrap_or_else(|_| path.clone())
}
