//! Unified diff synthesis from two full texts.

use similar::TextDiff;

const CONTEXT_RADIUS: usize = 3;

/// Produce a unified diff turning `old` into `new`, headed `a/<label>` / `b/<label>`.
///
/// Returns an empty string when the texts are identical.
pub fn diff(old: &str, new: &str, label: &str) -> String {
    if old == new {
        return String::new();
    }
    let old_header = format!("a/{label}");
    let new_header = format!("b/{label}");
    TextDiff::from_lines(old, new)
        .unified_diff()
        .context_radius(CONTEXT_RADIUS)
        .header(&old_header, &new_header)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::patch::{apply_patch, parse_patch};

    #[test]
    fn identical_texts_produce_no_diff() {
        assert_eq!(diff("a\nb\n", "a\nb\n", "x.rs"), "");
    }

    #[test]
    fn synthesized_diff_has_headers_and_hunk() {
        let out = diff("a\nb\nc\n", "a\nB\nc\n", "src/x.rs");
        assert!(out.starts_with("--- a/src/x.rs\n+++ b/src/x.rs\n@@ "));
        let patch = parse_patch(&out).expect("parse");
        assert_eq!(patch.hunks.len(), 1);
    }

    #[test]
    fn diff_then_apply_reproduces_target() {
        let cases = [
            ("fn a() {}\nfn b() {}\n", "fn a() {}\n"),
            ("one\ntwo\nthree", "one\n2\nthree"),
            ("x\n", "x\ny"),
            ("", "new file\n"),
            ("keep\n", ""),
        ];
        for (old, new) in cases {
            let patch = diff(old, new, "f.txt");
            let applied = apply_patch(old, &patch).expect("apply synthesized diff");
            assert_eq!(applied, new, "patch was:\n{patch}");
        }
    }

    #[test]
    fn distant_edits_become_separate_hunks() {
        let old: String = (1..=30).map(|n| format!("line {n}\n")).collect();
        let new = old
            .replace("line 2\n", "line two\n")
            .replace("line 28\n", "line twenty-eight\n");
        let patch = parse_patch(&diff(&old, &new, "f.txt")).expect("parse");
        assert_eq!(patch.hunks.len(), 2);
    }
}
