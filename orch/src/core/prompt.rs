//! Prompt rendering for the tool-driven steps.

use anyhow::{Context, Result};
use minijinja::{Environment, context};

const PLAN_TEMPLATE: &str = include_str!("prompts/plan.md");
const EXECUTE_TEMPLATE: &str = include_str!("prompts/execute.md");
const FIX_TEMPLATE: &str = include_str!("prompts/fix.md");
const REVIEW_TEMPLATE: &str = include_str!("prompts/review.md");

/// Prompt sent to the codex tool to request its usage report.
pub const STATUS_PROMPT: &str = "/status";

/// Template engine wrapper around minijinja.
pub struct Prompts {
    env: Environment<'static>,
}

impl Prompts {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("plan", PLAN_TEMPLATE)
            .context("load plan template")?;
        env.add_template("execute", EXECUTE_TEMPLATE)
            .context("load execute template")?;
        env.add_template("fix", FIX_TEMPLATE)
            .context("load fix template")?;
        env.add_template("review", REVIEW_TEMPLATE)
            .context("load review template")?;
        Ok(Self { env })
    }

    pub fn plan(&self, feature: &str) -> Result<String> {
        self.render("plan", context! { feature => feature })
    }

    pub fn execute(&self, plan: &str, feature: &str) -> Result<String> {
        self.render("execute", context! { plan => plan, feature => feature })
    }

    /// Fix prompt; `failing_output` is the most recent verification output only.
    pub fn fix(&self, failing_output: &str) -> Result<String> {
        self.render("fix", context! { failing_output => failing_output })
    }

    pub fn review(&self, plan: &str) -> Result<String> {
        self.render("review", context! { plan => plan })
    }

    fn render(&self, name: &str, ctx: minijinja::Value) -> Result<String> {
        let template = self
            .env
            .get_template(name)
            .with_context(|| format!("get {name} template"))?;
        template
            .render(ctx)
            .with_context(|| format!("render {name} prompt"))
    }
}
