//! Security stage: hardening pass, or an explicit all-clear.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, instrument};

use crate::core::response::parse_security_response;
use crate::core::types::{StageKind, StageResult};
use crate::io::collaborator::Collaborator;

use super::{AgentStage, PromptContext, PromptEngine, StageInput, language_for, upstream_patch};

#[derive(Debug, Clone)]
pub struct SecurityStage {
    prompts: Arc<PromptEngine>,
}

impl SecurityStage {
    pub fn new(prompts: Arc<PromptEngine>) -> Self {
        Self { prompts }
    }
}

impl AgentStage for SecurityStage {
    fn kind(&self) -> StageKind {
        StageKind::Security
    }

    #[instrument(skip_all, fields(path = %input.relative_path))]
    fn run(&self, collaborator: &dyn Collaborator, input: &StageInput<'_>) -> Result<StageResult> {
        let ctx = PromptContext::new(input.relative_path, language_for(input.relative_path))
            .with_prior_patch(upstream_patch(input));
        let instruction = self.prompts.render(self.kind(), &ctx)?;
        let response = collaborator
            .generate(&instruction, input.source)
            .context("security stage")?;
        let outcome = parse_security_response(&response);
        debug!(outcome = ?outcome, "security response parsed");
        Ok(StageResult::Patch(outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::PatchOutcome;
    use crate::test_support::ScriptedCollaborator;

    #[test]
    fn sentinel_confirms_clean() {
        let stage = SecurityStage::new(Arc::new(PromptEngine::new().expect("engine")));
        let collaborator = ScriptedCollaborator::new(vec![
            Ok("NO_SECURITY_ISSUES".to_string()),
            Ok(String::new()),
        ]);
        let input = StageInput {
            relative_path: "a.py",
            upstream: None,
            source: "print(1)\n",
        };
        assert_eq!(
            stage.run(&collaborator, &input).expect("run"),
            StageResult::Patch(PatchOutcome::ConfirmedClean)
        );
        assert_eq!(
            stage.run(&collaborator, &input).expect("run"),
            StageResult::Patch(PatchOutcome::NoPatch)
        );
    }
}
