//! Human-readable report lines for the end of a run.

use crate::model::{OperationReport, PackageOutcome};

/// Build the closing summary printed after the console exits.
pub fn build_report_summary(report: &OperationReport) -> Vec<String> {
    let mut lines = Vec::new();

    lines.push(format!(
        "Installed {} of {} package(s) into '{}'",
        report
            .packages
            .iter()
            .filter(|p| p.outcome == PackageOutcome::Installed)
            .count(),
        report.packages.len(),
        report.root.display()
    ));
    lines.push(format!(
        "Files: {} staged, {} overwritten, {} skipped",
        report.files_staged, report.files_overwritten, report.files_skipped
    ));

    for pkg in &report.packages {
        if pkg.outcome == PackageOutcome::Failed {
            lines.push(format!("Failed: {} {}", pkg.name, pkg.version));
        }
    }

    lines
}
