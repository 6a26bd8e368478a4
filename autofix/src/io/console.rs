//! Terminal implementations of the review prompt and progress output.

use std::io::{BufRead, Write};

use anyhow::{Context, Result};

use crate::pipeline::{ReviewDecision, Reviewer, RunObserver};

/// Asks for `a`/`s`/`p` on `input`, writing prompts to `output`.
///
/// End of input counts as skip, so a closed stdin never applies anything.
pub struct TerminalReviewer<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> TerminalReviewer<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl<R: BufRead, W: Write> Reviewer for TerminalReviewer<R, W> {
    fn decide(&mut self, relative_path: &str, patch: &str) -> Result<ReviewDecision> {
        let stats = patch_stats(patch);
        loop {
            write!(
                self.output,
                "{relative_path}: {stats}. [a]pply, [s]kip, [p]review? "
            )
            .context("write review prompt")?;
            self.output.flush().context("flush review prompt")?;

            let mut line = String::new();
            let read = self
                .input
                .read_line(&mut line)
                .context("read review answer")?;
            if read == 0 {
                writeln!(self.output).context("write review prompt")?;
                return Ok(ReviewDecision::Skip);
            }
            match line.trim().to_ascii_lowercase().as_str() {
                "a" | "apply" | "y" | "yes" => return Ok(ReviewDecision::Apply),
                "s" | "skip" | "n" | "no" => return Ok(ReviewDecision::Skip),
                "p" | "preview" => return Ok(ReviewDecision::Preview),
                other => {
                    writeln!(self.output, "unrecognized answer {other:?}")
                        .context("write review prompt")?;
                }
            }
        }
    }

    fn show_preview(&mut self, _relative_path: &str, preview: &str) -> Result<()> {
        writeln!(self.output, "{preview}").context("write preview")?;
        Ok(())
    }
}

fn patch_stats(patch: &str) -> String {
    let mut added = 0usize;
    let mut removed = 0usize;
    for line in patch.lines() {
        if line.starts_with("+++ ") || line.starts_with("--- ") {
            continue;
        }
        if line.starts_with('+') {
            added += 1;
        } else if line.starts_with('-') {
            removed += 1;
        }
    }
    format!("+{added} -{removed}")
}

/// One line per file event on `output` (normally stdout).
pub struct ConsoleObserver<W> {
    output: W,
}

impl<W: Write> ConsoleObserver<W> {
    pub fn new(output: W) -> Self {
        Self { output }
    }

    fn line(&mut self, text: std::fmt::Arguments<'_>) {
        // Progress output is best effort; a closed pipe must not fail the run.
        let _ = writeln!(self.output, "{text}");
    }
}

impl<W: Write> RunObserver for ConsoleObserver<W> {
    fn on_file_progress(&mut self, index: usize, total: usize, relative_path: &str) {
        self.line(format_args!("[{index}/{total}] {relative_path}"));
    }

    fn on_file_fixed(&mut self, relative_path: &str) {
        self.line(format_args!("  fixed {relative_path}"));
    }

    fn on_file_skipped(&mut self, relative_path: &str, reason: &str) {
        self.line(format_args!("  skipped {relative_path} ({reason})"));
    }

    fn on_file_error(&mut self, relative_path: &str, message: &str) {
        self.line(format_args!("  error {relative_path}: {message}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PATCH: &str = "--- a/x\n+++ b/x\n@@ -1,2 +1,2 @@\n-a\n+b\n c\n";

    #[test]
    fn reads_answers_and_reprompts_on_garbage() {
        let input = b"what\np\nA\n".as_slice();
        let mut output = Vec::new();
        let mut reviewer = TerminalReviewer::new(input, &mut output);
        assert_eq!(
            reviewer.decide("x", PATCH).expect("decide"),
            ReviewDecision::Preview
        );
        assert_eq!(
            reviewer.decide("x", PATCH).expect("decide"),
            ReviewDecision::Apply
        );
        let text = String::from_utf8(output).expect("utf8");
        assert!(text.contains("x: +1 -1. [a]pply, [s]kip, [p]review? "));
        assert!(text.contains("unrecognized answer \"what\""));
    }

    #[test]
    fn eof_means_skip() {
        let mut reviewer = TerminalReviewer::new(b"".as_slice(), Vec::new());
        assert_eq!(
            reviewer.decide("x", PATCH).expect("decide"),
            ReviewDecision::Skip
        );
    }

    #[test]
    fn observer_writes_one_line_per_event() {
        let mut output = Vec::new();
        {
            let mut observer = ConsoleObserver::new(&mut output);
            observer.on_file_progress(1, 2, "a.rs");
            observer.on_file_fixed("a.rs");
            observer.on_file_skipped("b.rs", "no problems reported");
        }
        assert_eq!(
            String::from_utf8(output).expect("utf8"),
            "[1/2] a.rs\n  fixed a.rs\n  skipped b.rs (no problems reported)\n"
        );
    }
}
