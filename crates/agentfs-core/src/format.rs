//! Text helpers shared by backends and tools.

use serde::{Deserialize, Serialize};

use crate::traits::{BackendError, GrepMatch};

/// Default first line (0-based) returned by a read.
pub const DEFAULT_READ_OFFSET: usize = 0;
/// Default number of lines returned by a read.
pub const DEFAULT_READ_LIMIT: usize = 10_000;
/// Longest line a read returns before truncating it.
pub const MAX_LINE_LENGTH: usize = 2_000;
/// Width of the line-number column.
pub const LINE_NUMBER_WIDTH: usize = 6;
/// Returned in place of an empty file's contents.
pub const EMPTY_CONTENT_WARNING: &str = "System reminder: File exists but has empty contents";
/// Longest tool output, in characters, before it is truncated.
pub const TOOL_RESULT_CHAR_LIMIT: usize = 80_000;
/// Appended to truncated tool output.
pub const TRUNCATION_GUIDANCE: &str =
    "... [results truncated, try being more specific with your parameters]";

/// Number `lines` in `cat -n` form starting at `start_line`, cutting each
/// line to `max_len` characters.
#[must_use]
pub fn number_lines<S: AsRef<str>>(lines: &[S], start_line: usize, max_len: usize) -> String {
    lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let line = line.as_ref();
            let shown = match line.char_indices().nth(max_len) {
                Some((cut, _)) => &line[..cut],
                None => line,
            };
            format!("{:>width$}\t{shown}", start_line + i, width = LINE_NUMBER_WIDTH)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render a slice of `content` the way `read` returns it.
///
/// # Errors
/// Returns [`BackendError::OffsetOutOfRange`] if `offset` is past the last line.
pub fn format_read(content: &str, offset: usize, limit: usize) -> Result<String, BackendError> {
    if content.trim().is_empty() {
        return Ok(EMPTY_CONTENT_WARNING.to_string());
    }

    let lines: Vec<&str> = content.lines().collect();
    if offset >= lines.len() {
        return Err(BackendError::OffsetOutOfRange {
            offset,
            lines: lines.len(),
        });
    }

    let end = offset.saturating_add(limit).min(lines.len());
    Ok(number_lines(&lines[offset..end], offset + 1, MAX_LINE_LENGTH))
}

/// Replace `old` with `new` in `content`.
///
/// Returns the new content and the number of occurrences replaced.
///
/// # Errors
/// [`BackendError::StringNotFound`] when `old` does not occur, and
/// [`BackendError::AmbiguousMatch`] when it occurs more than once and
/// `replace_all` is false.
pub fn perform_string_replacement(
    content: &str,
    old: &str,
    new: &str,
    replace_all: bool,
) -> Result<(String, usize), BackendError> {
    let occurrences = if old.is_empty() {
        0
    } else {
        content.matches(old).count()
    };

    match occurrences {
        0 => Err(BackendError::StringNotFound(old.to_string())),
        n if n > 1 && !replace_all => Err(BackendError::AmbiguousMatch {
            string: old.to_string(),
            occurrences: n,
        }),
        n if replace_all => Ok((content.replace(old, new), n)),
        _ => Ok((content.replacen(old, new, 1), 1)),
    }
}

/// Make a tool-call id safe to use as a file name.
#[must_use]
pub fn sanitize_tool_call_id(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Cap tool output at [`TOOL_RESULT_CHAR_LIMIT`] characters.
#[must_use]
pub fn truncate_if_too_long(text: String) -> String {
    match text.char_indices().nth(TOOL_RESULT_CHAR_LIMIT) {
        Some((cut, _)) => format!("{}\n{TRUNCATION_GUIDANCE}", &text[..cut]),
        None => text,
    }
}

/// How grep results are rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrepOutputMode {
    /// One path per matching file.
    #[default]
    FilesWithMatches,
    /// Matching lines grouped by file.
    Content,
    /// Match count per file.
    Count,
}

/// Render grep matches. Files keep the order of their first match.
#[must_use]
pub fn format_grep_matches(matches: &[GrepMatch], mode: GrepOutputMode) -> String {
    if matches.is_empty() {
        return "No matches found".to_string();
    }

    let mut grouped: Vec<(&str, Vec<&GrepMatch>)> = Vec::new();
    for m in matches {
        match grouped.iter_mut().find(|(path, _)| *path == m.path) {
            Some((_, hits)) => hits.push(m),
            None => grouped.push((m.path.as_str(), vec![m])),
        }
    }

    let lines: Vec<String> = match mode {
        GrepOutputMode::FilesWithMatches => grouped
            .iter()
            .map(|(path, _)| (*path).to_string())
            .collect(),
        GrepOutputMode::Count => grouped
            .iter()
            .map(|(path, hits)| format!("{path}: {}", hits.len()))
            .collect(),
        GrepOutputMode::Content => grouped
            .iter()
            .flat_map(|(path, hits)| {
                std::iter::once(format!("{path}:"))
                    .chain(hits.iter().map(|m| format!("  {}: {}", m.line, m.text)))
            })
            .collect(),
    };

    truncate_if_too_long(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(path: &str, line: usize, text: &str) -> GrepMatch {
        GrepMatch {
            path: path.to_string(),
            line,
            text: text.to_string(),
        }
    }

    #[test]
    fn test_format_read_numbers_from_offset() {
        let out = format_read("alpha\nbeta\ngamma\n", 1, 1).unwrap();
        assert_eq!(out, "     2\tbeta");

        let all = format_read("alpha\nbeta", 0, DEFAULT_READ_LIMIT).unwrap();
        assert_eq!(all, "     1\talpha\n     2\tbeta");
    }

    #[test]
    fn test_format_read_edge_cases() {
        assert_eq!(format_read("", 0, 10).unwrap(), EMPTY_CONTENT_WARNING);
        assert_eq!(format_read("  \n", 0, 10).unwrap(), EMPTY_CONTENT_WARNING);

        let err = format_read("one\ntwo", 5, 10).unwrap_err();
        assert_eq!(err.to_string(), "Line offset 5 exceeds file length (2 lines)");
    }

    #[test]
    fn test_long_lines_are_cut() {
        let long = "x".repeat(MAX_LINE_LENGTH + 50);
        let out = format_read(&long, 0, 1).unwrap();
        assert_eq!(out.len(), LINE_NUMBER_WIDTH + 1 + MAX_LINE_LENGTH);
    }

    #[test]
    fn test_string_replacement() {
        let err = perform_string_replacement("a a a", "a", "b", false).unwrap_err();
        assert!(matches!(err, BackendError::AmbiguousMatch { occurrences: 3, .. }));
        assert!(err.to_string().contains('3'));

        let (content, n) = perform_string_replacement("a a a", "a", "b", true).unwrap();
        assert_eq!(content, "b b b");
        assert_eq!(n, 3);

        let (content, n) = perform_string_replacement("hello world", "world", "rust", false).unwrap();
        assert_eq!(content, "hello rust");
        assert_eq!(n, 1);

        assert!(matches!(
            perform_string_replacement("abc", "zzz", "y", false),
            Err(BackendError::StringNotFound(_))
        ));
    }

    #[test]
    fn test_sanitize_tool_call_id() {
        assert_eq!(sanitize_tool_call_id("call_abc-123"), "call_abc-123");
        assert_eq!(sanitize_tool_call_id("toolu/01:x.y"), "toolu_01_x_y");
    }

    #[test]
    fn test_truncate_if_too_long() {
        let short = "ok".to_string();
        assert_eq!(truncate_if_too_long(short.clone()), short);

        let long = "y".repeat(TOOL_RESULT_CHAR_LIMIT + 10);
        let out = truncate_if_too_long(long);
        assert!(out.ends_with(TRUNCATION_GUIDANCE));
        assert!(out.starts_with(&"y".repeat(TOOL_RESULT_CHAR_LIMIT)));
    }

    #[test]
    fn test_grep_output_modes() {
        let matches = vec![
            hit("/b.rs", 3, "fn main()"),
            hit("/a.rs", 1, "fn helper()"),
            hit("/b.rs", 9, "fn other()"),
        ];

        assert_eq!(
            format_grep_matches(&matches, GrepOutputMode::FilesWithMatches),
            "/b.rs\n/a.rs"
        );
        assert_eq!(
            format_grep_matches(&matches, GrepOutputMode::Count),
            "/b.rs: 2\n/a.rs: 1"
        );
        assert_eq!(
            format_grep_matches(&matches, GrepOutputMode::Content),
            "/b.rs:\n  3: fn main()\n  9: fn other()\n/a.rs:\n  1: fn helper()"
        );
        assert_eq!(
            format_grep_matches(&[], GrepOutputMode::Content),
            "No matches found"
        );
    }
}
