mod pane;

use crate::cli::Cli;
use crate::engine::InstallEngine;
use crate::logger::{ProgressHandle, VisibleMark};
use crate::model::{ConsoleMessage, OperationReport};
use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use pane::{append_message, DisplaySurface, LogPane, Palette};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    text::Line,
    widgets::{Block, Borders, Paragraph},
    Terminal,
};
use std::{io, time::Duration, time::Instant};
use tokio::sync::mpsc::{self, UnboundedReceiver};

pub async fn run(args: Cli) -> Result<OperationReport> {
    let cfg = crate::cli::build_config(&args)?;
    // Unbounded: log producers must never block, whatever the UI is doing.
    let (msg_tx, msg_rx) = mpsc::unbounded_channel::<ConsoleMessage>();

    let visible = VisibleMark::new();
    let handle = ProgressHandle::new(
        msg_tx,
        visible.clone(),
        args.conflict,
        crate::cli::min_visible(&args),
    );

    // The console runs in a dedicated thread that owns the transcript; the
    // engine stays on the Tokio runtime and only enqueues messages.
    let high_contrast = args.high_contrast;
    let title = format!("Installing {} package(s)", cfg.packages.len());
    let ui_handle =
        std::thread::spawn(move || run_threaded(title, high_contrast, msg_rx, visible));

    let engine = InstallEngine::new(cfg);
    let worker = handle.clone();
    let engine_task = tokio::spawn(async move { engine.run(worker).await });
    let run_res = engine_task.await.context("engine task failed")?;

    // One close request per run; the handle defers it if the console has not
    // been visible long enough yet.
    handle.request_close();

    let join_res = tokio::task::spawn_blocking(move || ui_handle.join()).await;
    if let Ok(joined) = join_res {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(anyhow::anyhow!("console thread panicked")),
        }
    }

    let report = run_res.context("package operation failed")?;
    crate::cli::emit_report(&args, &report)?;
    Ok(report)
}

/// Run the console loop on a dedicated thread. This is the owning context:
/// nothing else reads or mutates the transcript.
fn run_threaded(
    title: String,
    high_contrast: bool,
    mut msg_rx: UnboundedReceiver<ConsoleMessage>,
    visible: VisibleMark,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).ok();

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;
    terminal.clear().ok();

    let palette = Palette::new(high_contrast);
    let mut pane = LogPane::new();
    let mut viewport_rows: usize = 0;

    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();

    // First paint, then mark the console visible. The minimum-visible clock
    // starts here and is set exactly once.
    terminal
        .draw(|f| viewport_rows = draw(f.area(), f, &title, &pane))
        .ok();
    visible.set_now();

    let res = loop {
        if pane.is_closed() {
            break Ok(());
        }

        // Drain without blocking; the queue serializes entries from all
        // producers and this loop applies them one at a time.
        while let Ok(msg) = msg_rx.try_recv() {
            match msg {
                ConsoleMessage::Entry { level, text } => {
                    append_message(&mut pane, &palette, level, &text);
                }
                ConsoleMessage::Close => pane.close(),
            }
        }

        if last_tick.elapsed() >= tick_rate {
            terminal
                .draw(|f| viewport_rows = draw(f.area(), f, &title, &pane))
                .ok();
            last_tick = Instant::now();
        }

        // Poll input with a short timeout to avoid blocking the render loop.
        if event::poll(Duration::from_millis(10)).unwrap_or(false) {
            if let Ok(Event::Key(k)) = event::read() {
                if k.kind != KeyEventKind::Press {
                    continue;
                }
                match (k.modifiers, k.code) {
                    (_, KeyCode::Char('q')) | (KeyModifiers::CONTROL, KeyCode::Char('c')) => {
                        // User-initiated close skips the minimum-visible wait.
                        pane.close();
                    }
                    (_, KeyCode::Up) | (_, KeyCode::Char('k')) => {
                        pane.scroll_up(viewport_rows);
                    }
                    (_, KeyCode::Down) | (_, KeyCode::Char('j')) => {
                        pane.scroll_down(viewport_rows);
                    }
                    (_, KeyCode::End) => {
                        pane.scroll_to_end();
                    }
                    _ => {}
                }
            }
        }
    };

    disable_raw_mode().ok();
    let mut stdout = io::stdout();
    execute!(stdout, LeaveAlternateScreen).ok();
    res
}

/// Draw the transcript pane plus the key hint line; returns the number of
/// rows the transcript has so scrolling can be clamped to it.
fn draw(area: Rect, f: &mut ratatui::Frame, title: &str, pane: &LogPane) -> usize {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(1)])
        .split(area);

    let inner_rows = chunks[0].height.saturating_sub(2) as usize;
    let log = Paragraph::new(pane.lines())
        .block(Block::default().borders(Borders::ALL).title(title.to_string()))
        .scroll((pane.scroll_offset(inner_rows), 0));
    f.render_widget(log, chunks[0]);

    let hints = Line::styled(
        " q close  ↑/↓ scroll  End follow",
        Style::default().fg(Color::DarkGray),
    );
    f.render_widget(Paragraph::new(hints), chunks[1]);

    inner_rows
}
