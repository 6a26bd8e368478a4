//! Fix stage: a minimal patch addressing the analyzer's required fixes.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, instrument};

use crate::core::response::parse_patch_response;
use crate::core::types::{AnalysisReport, StageKind, StageResult};
use crate::io::collaborator::Collaborator;

use super::{AgentStage, PromptContext, PromptEngine, StageInput, language_for};

#[derive(Debug, Clone)]
pub struct FixStage {
    prompts: Arc<PromptEngine>,
}

impl FixStage {
    pub fn new(prompts: Arc<PromptEngine>) -> Self {
        Self { prompts }
    }
}

impl AgentStage for FixStage {
    fn kind(&self) -> StageKind {
        StageKind::Fix
    }

    #[instrument(skip_all, fields(path = %input.relative_path))]
    fn run(&self, collaborator: &dyn Collaborator, input: &StageInput<'_>) -> Result<StageResult> {
        let empty = AnalysisReport::empty();
        let report = match input.upstream {
            Some(StageResult::Analysis(report)) => report,
            _ => &empty,
        };
        let ctx = PromptContext::new(input.relative_path, language_for(input.relative_path))
            .with_report(report);
        let instruction = self.prompts.render(self.kind(), &ctx)?;
        let response = collaborator
            .generate(&instruction, input.source)
            .context("fix stage")?;
        let outcome = parse_patch_response(&response);
        debug!(proposed = outcome.patch().is_some(), "fix response parsed");
        Ok(StageResult::Patch(outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{PatchOutcome, Problem};
    use crate::error::GenerateError;
    use crate::test_support::ScriptedCollaborator;

    fn stage() -> FixStage {
        FixStage::new(Arc::new(PromptEngine::new().expect("engine")))
    }

    #[test]
    fn instruction_carries_analysis() {
        let report = StageResult::Analysis(AnalysisReport::new(
            vec![Problem {
                line: 1,
                severity: 5,
                kind: "unused-import".to_string(),
                message: "std::io is unused".to_string(),
            }],
            vec!["remove the import".to_string()],
            Vec::new(),
        ));
        let patch = "--- a/a.rs\n+++ b/a.rs\n@@ -1,2 +1 @@\n-use std::io;\n fn a() {}\n";
        let collaborator = ScriptedCollaborator::new(vec![Ok(format!("```diff\n{patch}```\n"))]);
        let input = StageInput {
            relative_path: "a.rs",
            upstream: Some(&report),
            source: "use std::io;\nfn a() {}\n",
        };

        let result = stage().run(&collaborator, &input).expect("run");
        assert_eq!(
            result,
            StageResult::Patch(PatchOutcome::Proposed(patch.to_string()))
        );
        assert!(collaborator.calls()[0].instruction.contains("std::io is unused"));
    }

    #[test]
    fn collaborator_failure_keeps_its_type() {
        let collaborator = ScriptedCollaborator::new(vec![Err(GenerateError::Timeout(
            std::time::Duration::from_secs(30),
        ))]);
        let input = StageInput {
            relative_path: "a.rs",
            upstream: None,
            source: "x\n",
        };
        let err = stage().run(&collaborator, &input).expect_err("timeout");
        assert!(matches!(
            err.downcast_ref::<GenerateError>(),
            Some(GenerateError::Timeout(_))
        ));
    }
}
