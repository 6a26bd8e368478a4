//! Interpretation of raw collaborator responses.
//!
//! Nothing in here fails: output that cannot be understood degrades to an empty
//! report or to "no patch", and the reason is logged at `warn`/`debug`.

use std::sync::LazyLock;

use jsonschema::{Draft, Validator};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::core::patch::parse_patch;
use crate::core::types::{AnalysisReport, PatchOutcome, Problem};

const ANALYSIS_REPORT_SCHEMA: &str = include_str!("../../../schemas/analysis_report.schema.json");

/// Literal a patch stage may answer with when it has nothing to change.
pub const NO_CHANGES_SENTINEL: &str = "NO_CHANGES";
/// Literal the security stage answers with when it found nothing to fix.
pub const NO_SECURITY_ISSUES_SENTINEL: &str = "NO_SECURITY_ISSUES";

static ANALYSIS_VALIDATOR: LazyLock<Option<Validator>> = LazyLock::new(|| {
    let schema: Value = match serde_json::from_str(ANALYSIS_REPORT_SCHEMA) {
        Ok(schema) => schema,
        Err(err) => {
            warn!(err = %err, "analysis report schema is not valid json");
            return None;
        }
    };
    match jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
    {
        Ok(validator) => Some(validator),
        Err(err) => {
            warn!(err = %err, "analysis report schema failed to compile");
            None
        }
    }
});

#[derive(Debug, Deserialize)]
struct RawReport {
    #[serde(default)]
    problems: Vec<RawProblem>,
    #[serde(default, alias = "requiredFixes")]
    required_fixes: Vec<String>,
    #[serde(default, alias = "recommendedRefactors")]
    recommended_refactors: Vec<String>,
}

/// Numbers are read as `f64`: JSON Schema counts `7.0` as an integer.
#[derive(Debug, Deserialize)]
struct RawProblem {
    #[serde(default)]
    line: f64,
    #[serde(default)]
    severity: f64,
    #[serde(rename = "type", default)]
    type_name: Option<String>,
    #[serde(default)]
    kind: Option<String>,
    message: String,
}

impl RawProblem {
    fn into_problem(self) -> Problem {
        Problem {
            line: self.line.round().clamp(0.0, f64::from(u32::MAX)) as u32,
            severity: self.severity.round().clamp(1.0, 10.0) as u8,
            kind: self.type_name.or(self.kind).unwrap_or_default(),
            message: self.message,
        }
    }
}

const LINE_ENDINGS: [char; 2] = ['\n', '\r'];

const FENCE: &str = "```";

/// Remove optional Markdown code-fence wrapping (with or without a language tag).
///
/// Prose before the opening fence and anything after the closing fence are
/// dropped. Only line endings are trimmed from the end: a trailing `" "` line
/// is an empty context line in a diff and must survive.
pub fn strip_code_fence(text: &str) -> &str {
    let start = text.trim_start();
    let opening = if start.starts_with(FENCE) {
        Some(start)
    } else {
        start.find("\n```").map(|idx| &start[idx + 1..])
    };
    let Some(opening) = opening else {
        return start.trim_end_matches(LINE_ENDINGS);
    };
    let Some(newline) = opening[FENCE.len()..].find('\n') else {
        return start.trim_end_matches(LINE_ENDINGS);
    };
    let body = &opening[FENCE.len() + newline + 1..];
    let inner = if body.starts_with(FENCE) {
        ""
    } else {
        match body.find("\n```") {
            Some(idx) => &body[..idx],
            None => body,
        }
    };
    inner.trim_end_matches(LINE_ENDINGS)
}

/// Parse analyzer output into a report, degrading to an empty report.
pub fn parse_analysis(response: &str) -> AnalysisReport {
    let body = strip_code_fence(response);
    let Some(json) = json_object_slice(body) else {
        warn!("analyzer response contains no json object");
        return AnalysisReport::empty();
    };
    let value: Value = match serde_json::from_str(json) {
        Ok(value) => value,
        Err(err) => {
            warn!(err = %err, "analyzer response is not valid json");
            return AnalysisReport::empty();
        }
    };
    if let Some(validator) = ANALYSIS_VALIDATOR.as_ref() {
        let errors: Vec<String> = validator.iter_errors(&value).map(|e| e.to_string()).collect();
        if !errors.is_empty() {
            warn!(errors = %errors.join("; "), "analyzer response violates report schema");
            return AnalysisReport::empty();
        }
    }
    match serde_json::from_value::<RawReport>(value) {
        Ok(raw) => AnalysisReport::new(
            raw.problems
                .into_iter()
                .map(RawProblem::into_problem)
                .collect(),
            raw.required_fixes,
            raw.recommended_refactors,
        ),
        Err(err) => {
            warn!(err = %err, "analyzer response has unexpected shape");
            AnalysisReport::empty()
        }
    }
}

fn json_object_slice(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Parse a patch-stage response into a validated unified diff, or no patch.
pub fn parse_patch_response(response: &str) -> PatchOutcome {
    let body = strip_code_fence(response);
    if body.trim().is_empty() || body.trim().eq_ignore_ascii_case(NO_CHANGES_SENTINEL) {
        return PatchOutcome::NoPatch;
    }
    let Some(diff) = extract_diff(body) else {
        debug!("patch response contains no diff header");
        return PatchOutcome::NoPatch;
    };
    match parse_patch(diff) {
        Ok(_) => {
            let mut diff = diff.to_string();
            if !diff.ends_with('\n') {
                diff.push('\n');
            }
            PatchOutcome::Proposed(diff)
        }
        Err(err) => {
            warn!(err = %err, "discarding malformed patch response");
            PatchOutcome::NoPatch
        }
    }
}

/// Like [`parse_patch_response`], but recognizes the security sentinel.
pub fn parse_security_response(response: &str) -> PatchOutcome {
    let body = strip_code_fence(response);
    if body.trim().eq_ignore_ascii_case(NO_SECURITY_ISSUES_SENTINEL) {
        return PatchOutcome::ConfirmedClean;
    }
    parse_patch_response(body)
}

/// Drop any prose before the first `--- ` header line.
fn extract_diff(text: &str) -> Option<&str> {
    if text.starts_with("--- ") {
        return Some(text);
    }
    text.find("\n--- ").map(|idx| &text[idx + 1..])
}
