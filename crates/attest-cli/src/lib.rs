//! Library interface for the attest CLI.
//!
//! The subcommand handlers live here so integration tests can drive
//! them without spawning the binary.

pub mod report;

use anyhow::{Context as _, Result};
use attest_parser::SpecDocument;
use attest_runner::{
    lcov, Coverage, CoverageEngine, HttpRequester, RunPlan, Scheduler, Target, Totals,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// What a finished `run` invocation amounted to.
#[derive(Debug)]
pub struct RunSummary {
    pub totals: Totals,
    /// Present when the document enabled RAML coverage.
    pub coverage: Option<Coverage>,
}

impl RunSummary {
    /// Whether the process should exit non-zero: any failed test, or
    /// any coverage obligation broken by observed traffic.
    pub fn failed(&self) -> bool {
        self.totals.failed > 0
            || self
                .coverage
                .as_ref()
                .is_some_and(|coverage| coverage.errored > 0)
    }
}

/// Load a document, run every test, print the report, and when the
/// document asks for it, judge RAML coverage and append LCOV records.
pub async fn run_document(path: &Path, lcov_out: Option<&Path>) -> Result<RunSummary> {
    let document = SpecDocument::from_path(path)
        .with_context(|| format!("failed to load `{}`", path.display()))?;
    for warning in &document.warnings {
        warn!("{warning}");
    }

    let requester = Arc::new(HttpRequester::new(document.options.self_signed_cert)?);
    let scheduler = Scheduler::new(
        requester,
        Target::from_document(&document),
        document.schemas.clone(),
    );
    let plan = RunPlan::from_suite(&document.root);
    info!(tests = plan.len(), "starting run");
    let outcome = scheduler.execute(plan, document.context.clone()).await;

    report::print_run(&outcome.report);

    let coverage = if document.options.raml.coverage {
        match &document.raml {
            Some(raml) => {
                let mut engine = CoverageEngine::new(raml);
                engine.record_all(outcome.observations);
                engine.validate(&document.schemas);
                let coverage = engine.coverage();
                report::print_coverage(engine.resources(), &coverage);
                if let Some(lcov_path) = lcov_out {
                    lcov::append(lcov_path, &coverage.lines).with_context(|| {
                        format!("failed to append lcov records to `{}`", lcov_path.display())
                    })?;
                    info!(path = %lcov_path.display(), "appended lcov records");
                }
                Some(coverage)
            }
            None => {
                warn!("coverage is enabled but the document declares no raml");
                None
            }
        }
    } else {
        None
    };

    Ok(RunSummary {
        totals: outcome.report.totals(),
        coverage,
    })
}

/// Parse and validate a document, print the plan, send nothing.
pub fn check_document(path: &Path) -> Result<()> {
    let document = SpecDocument::from_path(path)
        .with_context(|| format!("failed to load `{}`", path.display()))?;
    for warning in &document.warnings {
        warn!("{warning}");
    }

    let plan = RunPlan::from_suite(&document.root);
    println!("{}: {} tests", path.display(), plan.len());
    for planned in &plan.tests {
        let mark = if planned.skip { "⊘" } else { " " };
        if planned.depends_on.is_empty() {
            println!("  {mark} {}", planned.path);
        } else {
            let after: Vec<String> = planned
                .depends_on
                .iter()
                .map(|&id| plan.tests[id].path.to_string())
                .collect();
            println!("  {mark} {} (after {})", planned.path, after.join(", "));
        }
    }
    if !document.schemas.is_empty() {
        let names: Vec<&str> = document.schemas.names().collect();
        println!("schemas: {}", names.join(", "));
    }
    if let Some(raml) = &document.raml {
        println!("raml: {} resources", raml.all_resources().len());
    }
    Ok(())
}
