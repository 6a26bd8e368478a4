//! Pipeline stages: one collaborator call each, in a fixed order.
//!
//! Every stage sees the original file text. Patch stages additionally see the
//! previous stage's result and re-propose a full patch against the original,
//! so the last proposed patch is the one that gets applied.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use crate::core::types::{StageKind, StageResult};
use crate::io::collaborator::Collaborator;

pub mod analyzer;
pub mod fix;
pub mod prompt;
pub mod refactor;
pub mod security;

pub use analyzer::AnalyzerStage;
pub use fix::FixStage;
pub use prompt::{PromptContext, PromptEngine};
pub use refactor::RefactorStage;
pub use security::SecurityStage;

/// Input handed to a stage for one file.
#[derive(Debug, Clone, Copy)]
pub struct StageInput<'a> {
    pub relative_path: &'a str,
    /// Result of the preceding stage (`None` for the analyzer).
    pub upstream: Option<&'a StageResult>,
    /// Original file text.
    pub source: &'a str,
}

/// One step of the remediation pipeline.
pub trait AgentStage {
    fn kind(&self) -> StageKind;

    /// Issue exactly one collaborator call and interpret the response.
    ///
    /// Unusable responses degrade to an empty report or no patch; only
    /// collaborator failures and template errors are returned as errors.
    fn run(&self, collaborator: &dyn Collaborator, input: &StageInput<'_>) -> Result<StageResult>;
}

/// Analyzer, Fix, Refactor, Security sharing one prompt engine.
pub fn default_stages() -> Result<Vec<Box<dyn AgentStage>>> {
    let prompts = Arc::new(PromptEngine::new()?);
    Ok(vec![
        Box::new(AnalyzerStage::new(Arc::clone(&prompts))),
        Box::new(FixStage::new(Arc::clone(&prompts))),
        Box::new(RefactorStage::new(Arc::clone(&prompts))),
        Box::new(SecurityStage::new(prompts)),
    ])
}

/// Human-readable language name guessed from the file extension.
pub fn language_for(relative_path: &str) -> &'static str {
    let ext = Path::new(relative_path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    match ext.as_str() {
        "rs" => "Rust",
        "py" => "Python",
        "js" | "jsx" | "mjs" | "cjs" => "JavaScript",
        "ts" | "tsx" => "TypeScript",
        "go" => "Go",
        "java" => "Java",
        "kt" => "Kotlin",
        "c" | "h" => "C",
        "cpp" | "hpp" | "cc" | "cxx" => "C++",
        "cs" => "C#",
        "rb" => "Ruby",
        "php" => "PHP",
        "swift" => "Swift",
        _ => "source",
    }
}

/// Patch carried forward from the previous stage, if it proposed one.
fn upstream_patch<'a>(input: &StageInput<'a>) -> Option<&'a str> {
    input.upstream.and_then(StageResult::patch)
}
