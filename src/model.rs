use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Severity attached to every console entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl MessageLevel {
    /// Fixed-width label for text-mode output.
    pub fn label(self) -> &'static str {
        match self {
            MessageLevel::Debug => "DEBUG",
            MessageLevel::Info => "INFO ",
            MessageLevel::Warning => "WARN ",
            MessageLevel::Error => "ERROR",
        }
    }
}

/// What to do when a file being staged already exists at the destination.
///
/// The interactive prompt mode of the original package-manager UI is not
/// offered here; the policy is chosen up front and applied for the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum FileConflictAction {
    Overwrite,
    OverwriteAll,
    Ignore,
    IgnoreAll,
}

impl FileConflictAction {
    /// Whether the conflicting destination file should be replaced.
    pub fn overwrites(self) -> bool {
        matches!(
            self,
            FileConflictAction::Overwrite | FileConflictAction::OverwriteAll
        )
    }

    /// Whether this answer also covers every later conflict in the run.
    pub fn applies_to_all(self) -> bool {
        matches!(
            self,
            FileConflictAction::OverwriteAll | FileConflictAction::IgnoreAll
        )
    }
}

/// Message delivered to the console's owning context.
///
/// Every cross-context interaction with the console travels through this
/// enum on a single queue; the owning context is the only consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleMessage {
    /// Append one formatted entry to the transcript.
    Entry { level: MessageLevel, text: String },
    /// Close the console. Safe to deliver more than once.
    Close,
}

/// One package to stage during the operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageSpec {
    pub name: String,
    pub version: String,
    /// Paths staged under the root, relative to `<root>/<name>/`.
    pub files: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationConfig {
    pub root: PathBuf,
    pub packages: Vec<PackageSpec>,
    #[serde(with = "humantime_serde")]
    pub step_delay: Duration,
    pub conflict_action: FileConflictAction,
}

/// Outcome of a single package within the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PackageOutcome {
    Installed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageResult {
    pub name: String,
    pub version: String,
    pub outcome: PackageOutcome,
    pub files_staged: u64,
    pub files_overwritten: u64,
    pub files_skipped: u64,
}

/// Summary of a completed operation, exported by `--json` / `--report`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationReport {
    #[serde(default)]
    pub timestamp_utc: String,
    pub root: PathBuf,
    pub conflict_action: FileConflictAction,
    pub packages: Vec<PackageResult>,
    pub files_staged: u64,
    pub files_overwritten: u64,
    pub files_skipped: u64,
    pub failures: u64,
}

impl OperationReport {
    pub fn succeeded(&self) -> bool {
        self.failures == 0
    }
}
