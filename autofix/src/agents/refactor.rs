//! Refactor stage: behavior-preserving structural cleanup.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, instrument};

use crate::core::response::parse_patch_response;
use crate::core::types::{StageKind, StageResult};
use crate::io::collaborator::Collaborator;

use super::{AgentStage, PromptContext, PromptEngine, StageInput, language_for, upstream_patch};

#[derive(Debug, Clone)]
pub struct RefactorStage {
    prompts: Arc<PromptEngine>,
}

impl RefactorStage {
    pub fn new(prompts: Arc<PromptEngine>) -> Self {
        Self { prompts }
    }
}

impl AgentStage for RefactorStage {
    fn kind(&self) -> StageKind {
        StageKind::Refactor
    }

    #[instrument(skip_all, fields(path = %input.relative_path))]
    fn run(&self, collaborator: &dyn Collaborator, input: &StageInput<'_>) -> Result<StageResult> {
        let ctx = PromptContext::new(input.relative_path, language_for(input.relative_path))
            .with_prior_patch(upstream_patch(input));
        let instruction = self.prompts.render(self.kind(), &ctx)?;
        let response = collaborator
            .generate(&instruction, input.source)
            .context("refactor stage")?;
        let outcome = parse_patch_response(&response);
        debug!(proposed = outcome.patch().is_some(), "refactor response parsed");
        Ok(StageResult::Patch(outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::PatchOutcome;
    use crate::test_support::ScriptedCollaborator;

    #[test]
    fn prior_patch_reaches_instruction_and_no_changes_is_no_patch() {
        let stage = RefactorStage::new(Arc::new(PromptEngine::new().expect("engine")));
        let prior = StageResult::Patch(PatchOutcome::Proposed(
            "--- a/a.rs\n+++ b/a.rs\n@@ -1 +1 @@\n-a\n+b\n".to_string(),
        ));
        let collaborator = ScriptedCollaborator::new(vec![Ok("NO_CHANGES\n".to_string())]);
        let input = StageInput {
            relative_path: "a.rs",
            upstream: Some(&prior),
            source: "a\n",
        };
        let result = stage.run(&collaborator, &input).expect("run");
        assert_eq!(result, StageResult::Patch(PatchOutcome::NoPatch));
        assert!(collaborator.calls()[0].instruction.contains("-a\n+b"));
    }
}
