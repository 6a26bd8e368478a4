//! Unified-diff parsing, exact application and preview rendering.
//!
//! Application is strict: every hunk must match the original text at the
//! position its header states. There is no offset search and no fuzz.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::PatchError;

static HUNK_HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@").expect("hunk header regex")
});

const NO_NEWLINE_MARKER: char = '\\';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Context,
    Remove,
    Add,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HunkLine {
    pub kind: LineKind,
    pub text: String,
    /// Followed by `\ No newline at end of file`.
    pub no_newline: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    pub old_start: usize,
    pub old_count: usize,
    pub new_start: usize,
    pub new_count: usize,
    pub lines: Vec<HunkLine>,
}

impl Hunk {
    fn old_side(&self) -> impl Iterator<Item = &HunkLine> {
        self.lines.iter().filter(|l| l.kind != LineKind::Add)
    }

    fn new_side(&self) -> impl Iterator<Item = &HunkLine> {
        self.lines.iter().filter(|l| l.kind != LineKind::Remove)
    }

    /// Zero-based index of the first original line this hunk replaces.
    fn old_index(&self) -> usize {
        if self.old_count == 0 {
            self.old_start
        } else {
            self.old_start - 1
        }
    }

    /// Zero-based index one past the last replaced original line.
    fn old_end(&self) -> Option<usize> {
        self.old_index().checked_add(self.old_count)
    }
}

/// A single-file unified diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePatch {
    pub old_path: String,
    pub new_path: String,
    pub hunks: Vec<Hunk>,
}

/// Parse a single-file unified diff. Text before the `---` header is ignored.
pub fn parse_patch(text: &str) -> Result<FilePatch, PatchError> {
    let lines = split_lines(text).0;
    let mut i = lines
        .iter()
        .position(|l| l.starts_with("--- "))
        .ok_or_else(|| PatchError::Format("missing '---' header".to_string()))?;

    let old_path = header_path(lines[i], "--- ");
    i += 1;
    let new_path = match lines.get(i) {
        Some(line) if line.starts_with("+++ ") => header_path(line, "+++ "),
        _ => return Err(PatchError::Format("missing '+++' header".to_string())),
    };
    i += 1;

    let mut hunks: Vec<Hunk> = Vec::new();
    while i < lines.len() {
        let line = lines[i];
        if line.starts_with("@@") {
            let (hunk, next) = parse_hunk(&lines, i, hunks.len() + 1)?;
            hunks.push(hunk);
            i = next;
        } else if line.starts_with("--- ") {
            return Err(PatchError::Format(
                "patch touches more than one file".to_string(),
            ));
        } else if line.trim().is_empty() {
            i += 1;
        } else {
            return Err(PatchError::Format(format!(
                "unexpected line {} outside of a hunk: {line:?}",
                i + 1
            )));
        }
    }

    if hunks.is_empty() {
        return Err(PatchError::Format("no '@@' hunks found".to_string()));
    }
    check_hunk_order(&hunks)?;

    Ok(FilePatch {
        old_path,
        new_path,
        hunks,
    })
}

fn header_path(line: &str, prefix: &str) -> String {
    let rest = line[prefix.len()..].trim_end();
    // Drop an optional tab-separated timestamp.
    rest.split('\t').next().unwrap_or(rest).to_string()
}

fn parse_hunk(lines: &[&str], at: usize, number: usize) -> Result<(Hunk, usize), PatchError> {
    let header = lines[at];
    let caps = HUNK_HEADER_RE
        .captures(header)
        .ok_or_else(|| PatchError::Format(format!("invalid hunk header {header:?}")))?;
    let number_at = |idx: usize, default: usize| -> Result<usize, PatchError> {
        match caps.get(idx) {
            Some(m) => m
                .as_str()
                .parse::<usize>()
                .map_err(|_| PatchError::Format(format!("invalid number in {header:?}"))),
            None => Ok(default),
        }
    };
    let old_start = number_at(1, 0)?;
    let old_count = number_at(2, 1)?;
    let new_start = number_at(3, 0)?;
    let new_count = number_at(4, 1)?;
    if old_count > 0 && old_start == 0 {
        return Err(PatchError::Format(format!(
            "hunk {number} starts at line 0 but removes lines"
        )));
    }
    if old_start.checked_add(old_count).is_none() || new_start.checked_add(new_count).is_none() {
        return Err(PatchError::Format(format!(
            "hunk {number} header range is out of bounds: {header:?}"
        )));
    }

    let mut old_left = old_count;
    let mut new_left = new_count;
    let mut body: Vec<HunkLine> = Vec::new();
    let mut i = at + 1;
    let short = || {
        PatchError::Format(format!(
            "hunk {number} body does not match its header counts"
        ))
    };

    while old_left > 0 || new_left > 0 {
        let Some(line) = lines.get(i) else {
            return Err(short());
        };
        let (kind, text) = match line.chars().next() {
            None => (LineKind::Context, ""),
            Some(' ') => (LineKind::Context, &line[1..]),
            Some('-') => (LineKind::Remove, &line[1..]),
            Some('+') => (LineKind::Add, &line[1..]),
            Some(NO_NEWLINE_MARKER) => {
                mark_no_newline(&mut body, number)?;
                i += 1;
                continue;
            }
            Some(_) if line.starts_with("@@") => return Err(short()),
            Some(_) => {
                return Err(PatchError::Format(format!(
                    "unexpected line in hunk {number}: {line:?}"
                )));
            }
        };
        match kind {
            LineKind::Context => {
                old_left = old_left.checked_sub(1).ok_or_else(short)?;
                new_left = new_left.checked_sub(1).ok_or_else(short)?;
            }
            LineKind::Remove => old_left = old_left.checked_sub(1).ok_or_else(short)?,
            LineKind::Add => new_left = new_left.checked_sub(1).ok_or_else(short)?,
        }
        body.push(HunkLine {
            kind,
            text: text.to_string(),
            no_newline: false,
        });
        i += 1;
    }

    // Trailing markers belong to the last line(s) of the hunk.
    while let Some(line) = lines.get(i) {
        if !line.starts_with(NO_NEWLINE_MARKER) {
            break;
        }
        mark_no_newline(&mut body, number)?;
        i += 1;
    }

    Ok((
        Hunk {
            old_start,
            old_count,
            new_start,
            new_count,
            lines: body,
        },
        i,
    ))
}

fn mark_no_newline(body: &mut [HunkLine], number: usize) -> Result<(), PatchError> {
    let last = body.last_mut().ok_or_else(|| {
        PatchError::Format(format!("hunk {number} starts with a no-newline marker"))
    })?;
    last.no_newline = true;
    Ok(())
}

fn check_hunk_order(hunks: &[Hunk]) -> Result<(), PatchError> {
    let mut cursor = 0usize;
    for (idx, hunk) in hunks.iter().enumerate() {
        let start = hunk.old_index();
        if start < cursor {
            return Err(PatchError::Format(format!(
                "hunk {} overlaps or precedes the previous hunk",
                idx + 1
            )));
        }
        cursor = hunk.old_end().ok_or_else(|| {
            PatchError::Format(format!("hunk {} range is out of bounds", idx + 1))
        })?;
    }
    Ok(())
}

/// Apply `patch_text` to `original`, requiring an exact context match.
pub fn apply_patch(original: &str, patch_text: &str) -> Result<String, PatchError> {
    let patch = parse_patch(patch_text)?;
    apply_parsed(original, &patch)
}

pub fn apply_parsed(original: &str, patch: &FilePatch) -> Result<String, PatchError> {
    let (orig, orig_newline) = split_lines(original);
    let mut out: Vec<&str> = Vec::with_capacity(orig.len());
    let mut cursor = 0usize;
    let mut eof_newline = orig_newline;

    for (idx, hunk) in patch.hunks.iter().enumerate() {
        let number = idx + 1;
        let start = hunk.old_index();
        let end = match hunk.old_end() {
            Some(end) if end <= orig.len() => end,
            _ => {
                return Err(PatchError::Conflict {
                    hunk: number,
                    line: start.saturating_add(1),
                    reason: format!(
                        "hunk needs lines {}..{} but the file has {}",
                        hunk.old_start,
                        hunk.old_start.saturating_add(hunk.old_count),
                        orig.len()
                    ),
                });
            }
        };
        for (offset, expected) in hunk.old_side().enumerate() {
            let found = orig[start + offset];
            if found != expected.text {
                return Err(PatchError::Conflict {
                    hunk: number,
                    line: start + offset + 1,
                    reason: format!("expected {:?}, found {:?}", expected.text, found),
                });
            }
        }

        out.extend_from_slice(&orig[cursor..start]);
        out.extend(hunk.new_side().map(|l| l.text.as_str()));
        cursor = end;

        if cursor == orig.len() {
            eof_newline = match hunk.new_side().last() {
                Some(last) => !last.no_newline,
                None => true,
            };
        }
    }
    out.extend_from_slice(&orig[cursor..]);

    if out.is_empty() {
        return Ok(String::new());
    }
    let mut result = out.join("\n");
    if eof_newline {
        result.push('\n');
    }
    Ok(result)
}

/// Split on `\n`, reporting whether the text ended with a newline.
///
/// Empty text reports `true` so that lines inserted into an empty file are
/// newline-terminated.
fn split_lines(text: &str) -> (Vec<&str>, bool) {
    if text.is_empty() {
        return (Vec::new(), true);
    }
    let mut lines: Vec<&str> = text.split('\n').collect();
    let trailing = text.ends_with('\n');
    if trailing {
        lines.pop();
    }
    (lines, trailing)
}

/// Render a patch for human review. Pure; fails only if the patch is malformed.
pub fn preview(patch_text: &str) -> Result<String, PatchError> {
    let patch = parse_patch(patch_text)?;
    let mut buf = String::new();
    buf.push_str(&format!("--- {}\n+++ {}\n", patch.old_path, patch.new_path));

    for (idx, hunk) in patch.hunks.iter().enumerate() {
        let removed = hunk
            .lines
            .iter()
            .filter(|l| l.kind == LineKind::Remove)
            .count();
        let added = hunk.lines.iter().filter(|l| l.kind == LineKind::Add).count();
        buf.push_str(&format!(
            "\nhunk {} (old line {}, new line {}): -{} +{}\n",
            idx + 1,
            hunk.old_start,
            hunk.new_start,
            removed,
            added
        ));

        let mut old_no = hunk.old_index().saturating_add(1);
        let mut new_no = if hunk.new_count == 0 {
            hunk.new_start.saturating_add(1)
        } else {
            hunk.new_start
        };
        for line in &hunk.lines {
            let (old_col, new_col, sign) = match line.kind {
                LineKind::Context => {
                    let cols = (old_no.to_string(), new_no.to_string(), ' ');
                    old_no = old_no.saturating_add(1);
                    new_no = new_no.saturating_add(1);
                    cols
                }
                LineKind::Remove => {
                    let cols = (old_no.to_string(), String::new(), '-');
                    old_no = old_no.saturating_add(1);
                    cols
                }
                LineKind::Add => {
                    let cols = (String::new(), new_no.to_string(), '+');
                    new_no = new_no.saturating_add(1);
                    cols
                }
            };
            buf.push_str(&format!("{old_col:>5} {new_col:>5} | {sign}{}\n", line.text));
            if line.no_newline {
                buf.push_str("            | (no newline at end of file)\n");
            }
        }
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORIGINAL: &str = "use std::io;\nuse std::fs;\n\nfn main() {\n    fs::read(\"x\");\n}\n";

    const REMOVE_IO: &str = "--- a/src/main.rs\n+++ b/src/main.rs\n@@ -1,3 +1,2 @@\n-use std::io;\n use std::fs;\n \n";

    #[test]
    fn parses_headers_and_hunks() {
        let patch = parse_patch(REMOVE_IO).expect("parse");
        assert_eq!(patch.old_path, "a/src/main.rs");
        assert_eq!(patch.new_path, "b/src/main.rs");
        assert_eq!(patch.hunks.len(), 1);
        assert_eq!(patch.hunks[0].lines.len(), 3);
        assert_eq!(patch.hunks[0].lines[0].kind, LineKind::Remove);
    }

    #[test]
    fn ignores_preamble_before_headers() {
        let text = format!("diff --git a/src/main.rs b/src/main.rs\nindex 1..2 100644\n{REMOVE_IO}");
        assert!(parse_patch(&text).is_ok());
    }

    #[test]
    fn applies_removal() {
        let out = apply_patch(ORIGINAL, REMOVE_IO).expect("apply");
        assert_eq!(out, "use std::fs;\n\nfn main() {\n    fs::read(\"x\");\n}\n");
    }

    #[test]
    fn missing_hunk_header_is_format_error() {
        let text = "--- a/x\n+++ b/x\n-use std::io;\n";
        let err = parse_patch(text).unwrap_err();
        assert!(matches!(err, PatchError::Format(_)), "{err:?}");
    }

    #[test]
    fn missing_plus_header_is_format_error() {
        let err = parse_patch("--- a/x\n@@ -1 +1 @@\n-a\n+b\n").unwrap_err();
        assert_eq!(err, PatchError::Format("missing '+++' header".to_string()));
    }

    #[test]
    fn header_counts_must_match_body() {
        let text = "--- a/x\n+++ b/x\n@@ -1,3 +1,3 @@\n-a\n+b\n";
        assert!(matches!(parse_patch(text), Err(PatchError::Format(_))));
    }

    #[test]
    fn context_mismatch_is_conflict() {
        let text = "--- a/x\n+++ b/x\n@@ -2,1 +2,1 @@\n-use std::net;\n+use std::env;\n";
        let err = apply_patch(ORIGINAL, text).unwrap_err();
        assert!(
            matches!(err, PatchError::Conflict { hunk: 1, line: 2, .. }),
            "{err:?}"
        );
    }

    #[test]
    fn wrong_position_is_conflict_not_fuzzed() {
        // Same content as REMOVE_IO but stated one line too low.
        let text = "--- a/x\n+++ b/x\n@@ -2,3 +2,2 @@\n-use std::io;\n use std::fs;\n \n";
        assert!(matches!(
            apply_patch(ORIGINAL, text),
            Err(PatchError::Conflict { .. })
        ));
    }

    #[test]
    fn overlapping_hunks_are_rejected() {
        let text = "--- a/x\n+++ b/x\n@@ -2,1 +2,1 @@\n-b\n+B\n@@ -1,1 +1,1 @@\n-a\n+A\n";
        assert!(matches!(parse_patch(text), Err(PatchError::Format(_))));
    }

    #[test]
    fn multiple_hunks_apply_in_order() {
        let original = "a\nb\nc\nd\ne\nf\n";
        let text = "--- a/x\n+++ b/x\n@@ -1,2 +1,2 @@\n-a\n+A\n b\n@@ -5,2 +5,3 @@\n e\n-f\n+F\n+g\n";
        assert_eq!(apply_patch(original, text).expect("apply"), "A\nb\nc\nd\ne\nF\ng\n");
    }

    #[test]
    fn insertion_into_empty_file() {
        let text = "--- /dev/null\n+++ b/x\n@@ -0,0 +1,2 @@\n+one\n+two\n";
        assert_eq!(apply_patch("", text).expect("apply"), "one\ntwo\n");
    }

    #[test]
    fn no_newline_marker_controls_eof() {
        let original = "a\nb\n";
        let text = "--- a/x\n+++ b/x\n@@ -2 +2 @@\n-b\n+c\n\\ No newline at end of file\n";
        assert_eq!(apply_patch(original, text).expect("apply"), "a\nc");
    }

    #[test]
    fn file_without_trailing_newline_is_preserved_when_untouched() {
        let original = "a\nb\nc";
        let text = "--- a/x\n+++ b/x\n@@ -1 +1 @@\n-a\n+A\n";
        assert_eq!(apply_patch(original, text).expect("apply"), "A\nb\nc");
    }

    #[test]
    fn huge_header_numbers_are_format_errors() {
        let max = usize::MAX;
        for text in [
            format!("--- a/x\n+++ b/x\n@@ -{max},2 +1,2 @@\n a\n b\n"),
            format!("--- a/x\n+++ b/x\n@@ -1,2 +{max},2 @@\n a\n b\n"),
            "--- a/x\n+++ b/x\n@@ -99999999999999999999999 +1 @@\n-a\n+b\n".to_string(),
        ] {
            assert!(
                matches!(parse_patch(&text), Err(PatchError::Format(_))),
                "{text:?}"
            );
            assert!(matches!(apply_patch("a\nb\n", &text), Err(PatchError::Format(_))));
            assert!(preview(&text).is_err());
        }
    }

    #[test]
    fn hunk_past_end_of_file_is_conflict() {
        let text = "--- a/x\n+++ b/x\n@@ -40,2 +40,2 @@\n a\n b\n";
        assert!(matches!(
            apply_patch("a\nb\n", text),
            Err(PatchError::Conflict { hunk: 1, line: 40, .. })
        ));
    }

    #[test]
    fn preview_lists_line_numbers() {
        let rendered = preview(REMOVE_IO).expect("preview");
        assert!(rendered.contains("hunk 1 (old line 1, new line 1): -1 +0"));
        assert!(rendered.contains("    1       | -use std::io;"));
        assert!(rendered.contains("    2     1 |  use std::fs;"));
    }
}
