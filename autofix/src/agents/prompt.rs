//! Stage instructions rendered from embedded templates.

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use serde::Serialize;

use crate::core::types::{AnalysisReport, Problem, StageKind};

const ANALYZER_TEMPLATE: &str = include_str!("prompts/analyzer.md");
const FIX_TEMPLATE: &str = include_str!("prompts/fix.md");
const REFACTOR_TEMPLATE: &str = include_str!("prompts/refactor.md");
const SECURITY_TEMPLATE: &str = include_str!("prompts/security.md");

/// Values a stage template may reference.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PromptContext<'a> {
    pub path: &'a str,
    pub language: &'a str,
    pub problems: &'a [Problem],
    pub required_fixes: &'a [String],
    pub recommended_refactors: &'a [String],
    /// Patch proposed by the previous stage, if any.
    pub prior_patch: Option<&'a str>,
}

impl<'a> PromptContext<'a> {
    pub fn new(path: &'a str, language: &'a str) -> Self {
        Self {
            path,
            language,
            ..Self::default()
        }
    }

    pub fn with_report(mut self, report: &'a AnalysisReport) -> Self {
        self.problems = report.problems();
        self.required_fixes = report.required_fixes();
        self.recommended_refactors = report.recommended_refactors();
        self
    }

    pub fn with_prior_patch(mut self, patch: Option<&'a str>) -> Self {
        self.prior_patch = patch.map(str::trim_end).filter(|p| !p.is_empty());
        self
    }
}

/// Template engine wrapper around minijinja, one template per stage.
#[derive(Debug)]
pub struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        for (kind, source) in [
            (StageKind::Analyzer, ANALYZER_TEMPLATE),
            (StageKind::Fix, FIX_TEMPLATE),
            (StageKind::Refactor, REFACTOR_TEMPLATE),
            (StageKind::Security, SECURITY_TEMPLATE),
        ] {
            env.add_template(kind.as_str(), source)
                .with_context(|| format!("load {} template", kind.as_str()))?;
        }
        Ok(Self { env })
    }

    pub fn render(&self, kind: StageKind, ctx: &PromptContext<'_>) -> Result<String> {
        let template = self.env.get_template(kind.as_str())?;
        let rendered = template
            .render(context! {
                path => ctx.path,
                language => ctx.language,
                problems => ctx.problems,
                required_fixes => ctx.required_fixes,
                recommended_refactors => ctx.recommended_refactors,
                prior_patch => ctx.prior_patch,
            })
            .with_context(|| format!("render {} instruction", kind.as_str()))?;
        Ok(rendered)
    }
}
