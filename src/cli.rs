use crate::engine::InstallEngine;
use crate::logger::{ProgressHandle, VisibleMark, DEFAULT_MIN_VISIBLE};
use crate::model::{
    ConsoleMessage, FileConflictAction, OperationConfig, OperationReport, PackageSpec,
};
use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::time::Duration;
use tokio::sync::mpsc;

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "pkg-progress",
    version,
    about = "Stage packages into a root while showing a progress log console"
)]
pub struct Cli {
    /// Packages to install, as name@version
    #[arg(value_name = "PKG", required_unless_present = "manifest")]
    pub packages: Vec<String>,

    /// JSON manifest listing the packages to install (overrides positional PKGs)
    #[arg(long)]
    pub manifest: Option<std::path::PathBuf>,

    /// Target root the packages are staged into
    #[arg(long, default_value = "./pkg-root")]
    pub root: std::path::PathBuf,

    /// Resolution applied to every file conflict during the run
    #[arg(long, value_enum, default_value_t = FileConflictAction::Overwrite)]
    pub conflict: FileConflictAction,

    /// Minimum time the console stays visible before it may close
    #[arg(long, default_value = "500ms")]
    pub min_visible: humantime::Duration,

    /// Pause between file operations
    #[arg(long, default_value = "75ms")]
    pub step_delay: humantime::Duration,

    /// Render every log entry in one plain color
    #[arg(long)]
    pub high_contrast: bool,

    /// Print log lines to stderr instead of running the TUI
    #[arg(long)]
    pub text: bool,

    /// Print the JSON report to stdout (implies --text)
    #[arg(long)]
    pub json: bool,

    /// Also write the JSON report to a file
    #[arg(long)]
    pub report: Option<std::path::PathBuf>,
}

pub async fn run(args: Cli) -> Result<OperationReport> {
    if !args.json && !args.text {
        #[cfg(feature = "tui")]
        {
            return crate::tui::run(args).await;
        }
        #[cfg(not(feature = "tui"))]
        {
            // Fallback when built without TUI support.
            return run_text(args).await;
        }
    }

    run_text(args).await
}

/// Parse a positional `name@version` package argument.
fn parse_package(arg: &str) -> Result<PackageSpec> {
    let (name, version) = arg
        .split_once('@')
        .with_context(|| format!("package '{arg}' is not of the form name@version"))?;
    if name.is_empty() || version.is_empty() {
        anyhow::bail!("package '{arg}' is not of the form name@version");
    }
    Ok(PackageSpec {
        name: name.to_string(),
        version: version.to_string(),
        files: vec!["manifest.json".to_string(), format!("{name}.pkg")],
    })
}

/// Build an `OperationConfig` from CLI arguments.
pub fn build_config(args: &Cli) -> Result<OperationConfig> {
    let packages = match args.manifest.as_deref() {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("read manifest '{}'", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("parse manifest '{}'", path.display()))?
        }
        None => args
            .packages
            .iter()
            .map(|p| parse_package(p))
            .collect::<Result<Vec<_>>>()?,
    };

    Ok(OperationConfig {
        root: args.root.clone(),
        packages,
        step_delay: Duration::from(args.step_delay),
        conflict_action: args.conflict,
    })
}

/// Minimum-visible floor for the console; the CLI default mirrors it.
pub fn min_visible(args: &Cli) -> Duration {
    let configured = Duration::from(args.min_visible);
    if configured.is_zero() {
        DEFAULT_MIN_VISIBLE
    } else {
        configured
    }
}

/// Print the report (and optionally export it) after the console has exited.
pub fn emit_report(args: &Cli, report: &OperationReport) -> Result<()> {
    if let Some(path) = args.report.as_deref() {
        let out = serde_json::to_string_pretty(report)?;
        std::fs::write(path, out)
            .with_context(|| format!("write report '{}'", path.display()))?;
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        for line in crate::summary::build_report_summary(report) {
            println!("{line}");
        }
    }
    Ok(())
}

/// Text mode: the async receive loop is the owning context and prints every
/// entry as a `LEVEL: text` line on stderr.
async fn run_text(args: Cli) -> Result<OperationReport> {
    let cfg = build_config(&args)?;
    let (out_tx, out_handle) = spawn_output_writer();
    let (msg_tx, mut msg_rx) = mpsc::unbounded_channel::<ConsoleMessage>();

    let visible = VisibleMark::new();
    let handle = ProgressHandle::new(msg_tx, visible.clone(), args.conflict, min_visible(&args));
    // Text output has no window to flash; it is visible from the start.
    visible.set_now();

    let engine = InstallEngine::new(cfg);
    let worker = handle.clone();
    let closer = handle.clone();
    let engine_task = tokio::spawn(async move {
        let res = engine.run(worker).await;
        closer.request_close();
        res
    });

    while let Some(msg) = msg_rx.recv().await {
        match msg {
            ConsoleMessage::Entry { level, text } => {
                let _ = out_tx.send(OutputLine::Stderr(format!("{} {}", level.label(), text)));
            }
            ConsoleMessage::Close => break,
        }
    }

    let report = engine_task
        .await
        .context("engine task failed")?
        .context("package operation failed")?;

    drop(out_tx);
    let _ = out_handle.await;

    emit_report(&args, &report)?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_name_at_version() {
        let pkg = parse_package("serde@1.0.216").unwrap();
        assert_eq!(pkg.name, "serde");
        assert_eq!(pkg.version, "1.0.216");
        assert_eq!(pkg.files, vec!["manifest.json".to_string(), "serde.pkg".to_string()]);
    }

    #[test]
    fn rejects_malformed_package_args() {
        assert!(parse_package("serde").is_err());
        assert!(parse_package("@1.0").is_err());
        assert!(parse_package("serde@").is_err());
    }

    #[test]
    fn manifest_overrides_positional_packages() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("pkgs.json");
        std::fs::write(
            &manifest,
            r#"[{"name": "tokio", "version": "1.41.1", "files": ["rt.rs"]}]"#,
        )
        .unwrap();

        let args = Cli::parse_from([
            "pkg-progress",
            "serde@1.0.0",
            "--manifest",
            manifest.to_str().unwrap(),
        ]);
        let cfg = build_config(&args).unwrap();
        assert_eq!(cfg.packages.len(), 1);
        assert_eq!(cfg.packages[0].name, "tokio");
    }

    #[test]
    fn zero_min_visible_falls_back_to_default() {
        let args = Cli::parse_from(["pkg-progress", "serde@1.0.0", "--min-visible", "0ms"]);
        assert_eq!(min_visible(&args), DEFAULT_MIN_VISIBLE);

        let args = Cli::parse_from(["pkg-progress", "serde@1.0.0"]);
        assert_eq!(min_visible(&args), Duration::from_millis(500));
    }
}
