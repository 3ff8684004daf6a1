//! Console output for run results and coverage trees.

use attest_runner::{
    Coverage, CoverageAssertion, CoverageResource, CoverageState, RunReport, TestStatus,
};

/// Print one line per test, grouped under the top-level suite name.
pub fn print_run(report: &RunReport) {
    let mut current: Option<&str> = None;
    for result in &report.results {
        let group = result.path.0.first().map(String::as_str).unwrap_or("");
        if current != Some(group) {
            println!("\n{group}");
            current = Some(group);
        }
        match &result.status {
            TestStatus::Passed => println!("  ✓ {}", result.name),
            TestStatus::Skipped(reason) => println!("  ⊘ {} ({reason})", result.name),
            TestStatus::Failed(failure) => {
                println!("  ✗ {}", result.name);
                for line in failure.to_string().lines() {
                    println!("      {line}");
                }
            }
        }
    }
    let totals = report.totals();
    println!(
        "\n{} passed, {} failed, {} skipped",
        totals.passed, totals.failed, totals.skipped
    );
}

/// Print the judged coverage tree for every declared resource.
pub fn print_coverage(resources: &[CoverageResource], coverage: &Coverage) {
    println!(
        "\nCoverage: {:.1}% ({} of {} assertions valid, {} errored, {} not covered)",
        coverage.percent(),
        coverage.valid,
        coverage.total,
        coverage.errored,
        coverage.not_covered
    );
    for resource in resources {
        print_node(&resource.root, 0);
    }
}

fn print_node(node: &CoverageAssertion, depth: usize) {
    let glyph = match node.state {
        CoverageState::Valid => "✓",
        CoverageState::Errored => "✗",
        CoverageState::NotCovered => "-",
        CoverageState::Pending => "?",
    };
    let indent = "  ".repeat(depth + 1);
    match &node.detail {
        Some(detail) => println!("{indent}{glyph} {}: {detail}", node.name),
        None => println!("{indent}{glyph} {}", node.name),
    }
    for child in &node.children {
        print_node(child, depth + 1);
    }
}
