//! Analyzer stage: structured problem report for one file.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, instrument};

use crate::core::response::parse_analysis;
use crate::core::types::{StageKind, StageResult};
use crate::io::collaborator::Collaborator;

use super::{AgentStage, PromptContext, PromptEngine, StageInput, language_for};

#[derive(Debug, Clone)]
pub struct AnalyzerStage {
    prompts: Arc<PromptEngine>,
}

impl AnalyzerStage {
    pub fn new(prompts: Arc<PromptEngine>) -> Self {
        Self { prompts }
    }
}

impl AgentStage for AnalyzerStage {
    fn kind(&self) -> StageKind {
        StageKind::Analyzer
    }

    #[instrument(skip_all, fields(path = %input.relative_path))]
    fn run(&self, collaborator: &dyn Collaborator, input: &StageInput<'_>) -> Result<StageResult> {
        let ctx = PromptContext::new(input.relative_path, language_for(input.relative_path));
        let instruction = self.prompts.render(self.kind(), &ctx)?;
        let response = collaborator
            .generate(&instruction, input.source)
            .context("analyzer stage")?;
        let report = parse_analysis(&response);
        debug!(counts = ?report.counts(), "analysis parsed");
        Ok(StageResult::Analysis(report))
    }
}
