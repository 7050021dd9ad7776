//! Package staging engine.
//!
//! Runs the install operation and reports progress only through the
//! [`OperationLogger`] it is handed; it never touches the console directly.

use crate::logger::OperationLogger;
use crate::model::MessageLevel::{Debug, Error, Info, Warning};
use crate::model::{
    FileConflictAction, OperationConfig, OperationReport, PackageOutcome, PackageResult,
    PackageSpec,
};
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

pub struct InstallEngine {
    cfg: OperationConfig,
}

impl InstallEngine {
    pub fn new(cfg: OperationConfig) -> Self {
        Self { cfg }
    }

    pub async fn run<L: OperationLogger>(self, logger: L) -> Result<OperationReport> {
        logger.log(
            Info,
            format!(
                "Installing {} package(s) into '{}'",
                self.cfg.packages.len(),
                self.cfg.root.display()
            ),
        );

        let mut report = OperationReport {
            timestamp_utc: time::OffsetDateTime::now_utc()
                .format(&time::format_description::well_known::Rfc3339)
                .unwrap_or_else(|_| "now".into()),
            root: self.cfg.root.clone(),
            conflict_action: self.cfg.conflict_action,
            packages: Vec::new(),
            files_staged: 0,
            files_overwritten: 0,
            files_skipped: 0,
            failures: 0,
        };

        // Once the resolver answers with an *All variant, later conflicts in
        // the same run reuse it without asking again.
        let mut sticky: Option<FileConflictAction> = None;

        for pkg in &self.cfg.packages {
            match self.install_package(pkg, &logger, &mut sticky).await {
                Ok(res) => {
                    report.files_staged += res.files_staged;
                    report.files_overwritten += res.files_overwritten;
                    report.files_skipped += res.files_skipped;
                    report.packages.push(res);
                }
                Err(e) => {
                    logger.log(
                        Error,
                        format!("Failed to install '{} {}': {e:#}", pkg.name, pkg.version),
                    );
                    report.failures += 1;
                    report.packages.push(PackageResult {
                        name: pkg.name.clone(),
                        version: pkg.version.clone(),
                        outcome: PackageOutcome::Failed,
                        files_staged: 0,
                        files_overwritten: 0,
                        files_skipped: 0,
                    });
                }
            }
        }

        Ok(report)
    }

    async fn install_package<L: OperationLogger>(
        &self,
        pkg: &PackageSpec,
        logger: &L,
        sticky: &mut Option<FileConflictAction>,
    ) -> Result<PackageResult> {
        logger.log(Info, format!("Installing '{} {}'", pkg.name, pkg.version));

        let pkg_dir = self.cfg.root.join(&pkg.name);
        fs::create_dir_all(&pkg_dir)
            .with_context(|| format!("create package dir '{}'", pkg_dir.display()))?;

        let mut res = PackageResult {
            name: pkg.name.clone(),
            version: pkg.version.clone(),
            outcome: PackageOutcome::Installed,
            files_staged: 0,
            files_overwritten: 0,
            files_skipped: 0,
        };

        for file in &pkg.files {
            let dest = pkg_dir.join(file);
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("create dir '{}'", parent.display()))?;
            }

            if dest.exists() {
                let action = match *sticky {
                    Some(a) => a,
                    None => {
                        let a = logger.resolve_file_conflict(&format!(
                            "File '{}' already exists in the target",
                            dest.display()
                        ));
                        if a.applies_to_all() {
                            *sticky = Some(a);
                        }
                        a
                    }
                };
                if action.overwrites() {
                    stage_file(&dest, pkg)?;
                    res.files_overwritten += 1;
                    logger.log(Warning, format!("Overwriting '{}'", dest.display()));
                } else {
                    res.files_skipped += 1;
                    logger.log(
                        Warning,
                        format!("Skipping '{}', file already exists", dest.display()),
                    );
                }
            } else {
                stage_file(&dest, pkg)?;
                res.files_staged += 1;
                logger.log(Debug, format!("Added file '{}'", dest.display()));
            }

            if !self.cfg.step_delay.is_zero() {
                tokio::time::sleep(self.cfg.step_delay).await;
            }
        }

        logger.log(
            Info,
            format!("Successfully installed '{} {}'", pkg.name, pkg.version),
        );
        Ok(res)
    }
}

fn stage_file(dest: &Path, pkg: &PackageSpec) -> Result<()> {
    fs::write(dest, format!("{} {}\n", pkg.name, pkg.version))
        .with_context(|| format!("write '{}'", dest.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MessageLevel;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Records log calls and conflict queries; answers with a fixed policy.
    struct RecordingLogger {
        action: FileConflictAction,
        entries: Mutex<Vec<(MessageLevel, String)>>,
        queries: Mutex<Vec<String>>,
    }

    impl RecordingLogger {
        fn new(action: FileConflictAction) -> Self {
            Self {
                action,
                entries: Mutex::new(Vec::new()),
                queries: Mutex::new(Vec::new()),
            }
        }

        fn query_count(&self) -> usize {
            self.queries.lock().unwrap().len()
        }

        fn levels(&self) -> Vec<MessageLevel> {
            self.entries.lock().unwrap().iter().map(|(l, _)| *l).collect()
        }
    }

    impl OperationLogger for &RecordingLogger {
        fn log(&self, level: MessageLevel, message: String) {
            self.entries.lock().unwrap().push((level, message));
        }

        fn resolve_file_conflict(&self, message: &str) -> FileConflictAction {
            self.queries.lock().unwrap().push(message.to_string());
            self.action
        }
    }

    fn config(root: &Path, action: FileConflictAction) -> OperationConfig {
        OperationConfig {
            root: root.to_path_buf(),
            packages: vec![
                PackageSpec {
                    name: "serde".into(),
                    version: "1.0.0".into(),
                    files: vec!["lib.rs".into(), "de.rs".into()],
                },
                PackageSpec {
                    name: "regex".into(),
                    version: "1.11.0".into(),
                    files: vec!["lib.rs".into()],
                },
            ],
            step_delay: Duration::ZERO,
            conflict_action: action,
        }
    }

    #[tokio::test]
    async fn clean_install_stages_every_file() {
        let dir = tempfile::tempdir().unwrap();
        let logger = RecordingLogger::new(FileConflictAction::Overwrite);

        let report = InstallEngine::new(config(dir.path(), FileConflictAction::Overwrite))
            .run(&logger)
            .await
            .unwrap();

        assert_eq!(report.files_staged, 3);
        assert_eq!(report.files_overwritten, 0);
        assert_eq!(report.files_skipped, 0);
        assert!(report.succeeded());
        assert_eq!(logger.query_count(), 0);
        assert!(dir.path().join("serde/de.rs").exists());
        assert!(dir.path().join("regex/lib.rs").exists());
    }

    #[tokio::test]
    async fn ignore_policy_keeps_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("serde")).unwrap();
        fs::write(dir.path().join("serde/lib.rs"), "local edits").unwrap();
        let logger = RecordingLogger::new(FileConflictAction::Ignore);

        let report = InstallEngine::new(config(dir.path(), FileConflictAction::Ignore))
            .run(&logger)
            .await
            .unwrap();

        assert_eq!(report.files_skipped, 1);
        assert_eq!(report.files_staged, 2);
        assert_eq!(
            fs::read_to_string(dir.path().join("serde/lib.rs")).unwrap(),
            "local edits"
        );
        // One conflict, one query, and a warning was logged for the skip.
        assert_eq!(logger.query_count(), 1);
        assert!(logger.levels().contains(&MessageLevel::Warning));
    }

    #[tokio::test]
    async fn overwrite_policy_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("serde")).unwrap();
        fs::write(dir.path().join("serde/lib.rs"), "local edits").unwrap();
        let logger = RecordingLogger::new(FileConflictAction::Overwrite);

        let report = InstallEngine::new(config(dir.path(), FileConflictAction::Overwrite))
            .run(&logger)
            .await
            .unwrap();

        assert_eq!(report.files_overwritten, 1);
        assert_eq!(
            fs::read_to_string(dir.path().join("serde/lib.rs")).unwrap(),
            "serde 1.0.0\n"
        );
    }

    #[tokio::test]
    async fn all_variant_is_cached_across_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        for (pkg, file) in [("serde", "lib.rs"), ("serde", "de.rs"), ("regex", "lib.rs")] {
            fs::create_dir_all(dir.path().join(pkg)).unwrap();
            fs::write(dir.path().join(pkg).join(file), "old").unwrap();
        }
        let logger = RecordingLogger::new(FileConflictAction::IgnoreAll);

        let report = InstallEngine::new(config(dir.path(), FileConflictAction::IgnoreAll))
            .run(&logger)
            .await
            .unwrap();

        assert_eq!(report.files_skipped, 3);
        // Three conflicts but a single query: the IgnoreAll answer sticks.
        assert_eq!(logger.query_count(), 1);
    }

    #[tokio::test]
    async fn failed_package_is_reported_and_run_continues() {
        let dir = tempfile::tempdir().unwrap();
        // A file where the package dir should go makes create_dir_all fail.
        fs::write(dir.path().join("serde"), "not a dir").unwrap();
        let logger = RecordingLogger::new(FileConflictAction::Overwrite);

        let report = InstallEngine::new(config(dir.path(), FileConflictAction::Overwrite))
            .run(&logger)
            .await
            .unwrap();

        assert_eq!(report.failures, 1);
        assert!(!report.succeeded());
        assert!(logger.levels().contains(&MessageLevel::Error));
        // The second package still installed.
        assert!(dir.path().join("regex/lib.rs").exists());
        assert_eq!(
            report.packages.iter().filter(|p| p.outcome == PackageOutcome::Installed).count(),
            1
        );
    }
}
