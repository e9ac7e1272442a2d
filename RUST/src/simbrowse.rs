use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use simbrowse::*;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    style::Stylize,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction as LayoutDirection, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Terminal,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "simbrowse", version, about = "Browse a batch of simulation runs by parameter")]
struct Cli {
    #[command(flatten)]
    batch: BatchArgs,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Args, Debug)]
struct BatchArgs {
    /// Folder that batch paths are resolved against
    #[arg(long, global = true, env = "SIMBROWSE_BASE_FOLDER")]
    base_folder: Option<PathBuf>,

    /// Parameter list file name inside the batch folder
    #[arg(long, global = true, env = "SIMBROWSE_PARLIST", default_value = "parlist_sim.csv")]
    parlist: String,

    #[arg(long, global = true, default_value = "png")]
    image_ext: String,

    #[arg(long, global = true, default_value = "gbf")]
    workspace_ext: String,

    #[arg(long, global = true, default_value = "gif")]
    animation_ext: String,

    /// SimNum step used with the fast modifier (Shift)
    #[arg(long, global = true, default_value_t = 10)]
    fast_step: u32,
}

impl BatchArgs {
    fn catalog_options(&self) -> CatalogOptions {
        CatalogOptions {
            parameter_list: self.parlist.clone(),
            templates: ArtifactTemplates {
                image_ext: self.image_ext.clone(),
                workspace_ext: self.workspace_ext.clone(),
                animation_ext: self.animation_ext.clone(),
            },
        }
    }

    fn folder(&self, batch: &Path) -> PathBuf {
        match &self.base_folder {
            Some(base) if batch.is_relative() => base.join(batch),
            _ => batch.to_path_buf(),
        }
    }

    fn open(&self, batch: &Path) -> Result<Browser> {
        let mut browser = Browser::new(self.catalog_options(), NavigationController::new(self.fast_step));
        let folder = self.folder(batch);
        browser
            .open_batch(&folder)
            .with_context(|| format!("opening batch {}", folder.display()))?;
        Ok(browser)
    }
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Print the simulation name, dimensions and record count
    Summary {
        batch: PathBuf,
        /// Also list every record with its parameter values
        #[arg(long)]
        records: bool,
    },

    /// Resolve a parameter selection to a single run
    Resolve {
        batch: PathBuf,
        /// Select by value: NAME=VALUE (repeatable)
        #[arg(long = "set", value_name = "NAME=VALUE")]
        values: Vec<String>,
        /// Select by value index: NAME=INDEX (repeatable)
        #[arg(long = "index", value_name = "NAME=INDEX")]
        indices: Vec<String>,
    },

    /// Print the decoded workspace metadata of one run
    Meta {
        batch: PathBuf,
        sim_num: u32,
        /// Validate CRCs while reading
        #[arg(long)]
        validate: bool,
    },

    /// Interactive browser
    Browse {
        batch: PathBuf,
        /// Start at this SimNum instead of the middle of the grid
        #[arg(long)]
        start: Option<u32>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let interactive = matches!(cli.cmd, Cmd::Browse { .. });
    init_tracing(cli.log_file.as_deref(), interactive)?;

    match &cli.cmd {
        Cmd::Summary { batch, records } => cmd_summary(&cli.batch, batch, *records),
        Cmd::Resolve {
            batch,
            values,
            indices,
        } => cmd_resolve(&cli.batch, batch, values, indices),
        Cmd::Meta {
            batch,
            sim_num,
            validate,
        } => cmd_meta(&cli.batch, batch, *sim_num, *validate),
        Cmd::Browse { batch, start } => cmd_browse(&cli.batch, batch, *start),
    }
}

/// The terminal UI owns the screen, so without a log file it stays silent.
fn init_tracing(log_file: Option<&Path>, interactive: bool) -> Result<()> {
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    match log_file {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("creating log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter())
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None if interactive => {}
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter())
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

fn session_of(browser: &mut Browser) -> Result<&mut Session> {
    browser.session_mut().ok_or_else(|| anyhow!("no batch is open"))
}

fn split_assignment(s: &str) -> Result<(&str, &str)> {
    s.split_once('=')
        .map(|(k, v)| (k.trim(), v.trim()))
        .ok_or_else(|| anyhow!("expected NAME=VALUE, got '{}'", s))
}

//
// ===== Commands =====
//

fn cmd_summary(args: &BatchArgs, batch: &Path, list_records: bool) -> Result<()> {
    let mut browser = args.open(batch)?;
    let session = session_of(&mut browser)?;
    let catalog = session.catalog();

    println!(
        "{} {}",
        "batch".cyan().bold(),
        catalog.folder().display().to_string().white().bold()
    );
    println!(
        "{} {}",
        "simulation".cyan().bold(),
        catalog.simulation_name().green().bold()
    );
    println!(
        "{} {}",
        "records".cyan().bold(),
        catalog.total_num_sims().to_string().white().bold()
    );

    let width = catalog.dimensions().iter().map(|d| d.name.len()).max().unwrap_or(0);
    for dim in catalog.dimensions() {
        let values: Vec<String> = dim.values.iter().map(|v| v.to_string()).collect();
        println!(
            "  {} {} {}",
            format!("{:<width$}", dim.name).yellow().bold(),
            format!("({})", dim.len()).dim(),
            values.join(", ")
        );
    }

    if list_records {
        println!();
        for record in catalog.records() {
            let params: Vec<String> = catalog
                .dimensions()
                .iter()
                .zip(&record.parameter_values)
                .map(|(d, v)| format!("{}={}", d.name, v))
                .collect();
            println!(
                "  {} {}",
                format!("#{:03}", record.sim_num).magenta().bold(),
                params.join("  ")
            );
        }
    }
    Ok(())
}

fn cmd_resolve(args: &BatchArgs, batch: &Path, values: &[String], indices: &[String]) -> Result<()> {
    let mut browser = args.open(batch)?;
    let session = session_of(&mut browser)?;

    for assignment in values {
        let (name, value) = split_assignment(assignment)?;
        apply_selection(session.select_value(name, value, InputChannel::Picker))
            .with_context(|| format!("selecting {assignment}"))?;
    }
    for assignment in indices {
        let (name, index) = split_assignment(assignment)?;
        let index: usize = index
            .parse()
            .with_context(|| format!("'{}' is not an index", index))?;
        apply_selection(session.select(name, index, InputChannel::Picker))
            .with_context(|| format!("selecting {assignment}"))?;
    }

    let record = session.resolve()?;
    print_record(session.catalog(), record);
    Ok(())
}

fn print_record(catalog: &BatchCatalog, record: &SimulationRecord) {
    println!(
        "{} {}",
        "simnum".cyan().bold(),
        record.sim_num.to_string().green().bold()
    );
    for (dim, value) in catalog.dimensions().iter().zip(&record.parameter_values) {
        println!("  {} = {}", dim.name.as_str().yellow().bold(), value);
    }
    for (kind, exists) in record.artifacts.existing() {
        let status = if exists { "ok".green() } else { "missing".red() };
        println!(
            "  {} {} {}",
            format!("{:<10}", kind.label()).white().bold(),
            record.artifacts.get(kind).display(),
            status
        );
    }
}

fn cmd_meta(args: &BatchArgs, batch: &Path, sim_num: u32, validate: bool) -> Result<()> {
    let mut browser = args.open(batch)?;
    let session = session_of(&mut browser)?;
    if session.goto(sim_num).is_err() {
        bail!(
            "SimNum {} is outside 1..={}",
            sim_num,
            session.catalog().total_num_sims()
        );
    }
    let view = session.metadata(&ReadOptions { validate });
    for line in view.lines() {
        println!("{}", line);
    }
    Ok(())
}

/// Resolution happens once all assignments are in, so a partial selection
/// without a run is not an error yet.
fn apply_selection(result: std::result::Result<ResolveReport, SelectError>) -> Result<()> {
    match result {
        Ok(_) | Err(SelectError::Lookup(_)) => Ok(()),
        Err(SelectError::Range(e)) => Err(e.into()),
    }
}

//
// ===== Interactive browser =====
//

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum StatusLevel {
    Info,
    Warn,
}

struct BrowseState {
    browser: Browser,
    focused_dim: usize,
    metadata_lines: Vec<String>,
    metadata_for: Option<u32>,
    metadata_scroll: u16,
    status: Option<(StatusLevel, String)>,
}

impl BrowseState {
    fn new(browser: Browser) -> Self {
        Self {
            browser,
            focused_dim: 0,
            metadata_lines: vec!["Press m to load metadata for the current run.".to_string()],
            metadata_for: None,
            metadata_scroll: 0,
            status: None,
        }
    }

    fn session(&self) -> Option<&Session> {
        self.browser.session()
    }

    fn dim_count(&self) -> usize {
        self.session().map(|s| s.catalog().dimensions().len()).unwrap_or(0)
    }

    fn move_focus(&mut self, delta: i32) {
        let n = self.dim_count();
        if n == 0 {
            return;
        }
        let next = (self.focused_dim as i32 + delta).clamp(0, n as i32 - 1);
        self.focused_dim = next as usize;
    }

    /// Shift the focused dimension by one value through `channel`.
    fn nudge(&mut self, delta: i32, channel: InputChannel) {
        let focused = self.focused_dim;
        let Some(session) = self.browser.session_mut() else { return };
        let Some(dim) = session.catalog().dimensions().get(focused) else { return };
        let name = dim.name.clone();
        let len = dim.len();
        let cur = session.selection().dimension_index(&name).unwrap_or(0);
        let next = (cur as i32 + delta).clamp(0, len as i32 - 1) as usize;
        if next == cur {
            return;
        }
        self.status = match session.select(&name, next, channel) {
            Ok(report) if report.is_ambiguous() => Some((
                StatusLevel::Warn,
                format!(
                    "selection matches SimNums {:?}; showing #{:03}",
                    report.matches, report.sim_num
                ),
            )),
            Ok(_) => None,
            Err(e) => Some((StatusLevel::Warn, e.to_string())),
        };
    }

    fn step(&mut self, direction: Direction, fast: bool) {
        let Some(session) = self.browser.session_mut() else { return };
        self.status = match session.step(direction, fast) {
            Ok(_) => None,
            Err(NavigationError::Boundary(boundary)) => Some((StatusLevel::Info, boundary.to_string())),
            Err(e) => Some((StatusLevel::Warn, e.to_string())),
        };
    }

    fn load_metadata(&mut self) {
        let Some(session) = self.browser.session() else { return };
        let view = session.metadata(&ReadOptions::default());
        self.metadata_for = session.current_sim_num();
        self.metadata_lines = view.lines();
        self.metadata_scroll = 0;
    }

    fn reload(&mut self) {
        self.status = match self.browser.reload() {
            Ok(session) => {
                session.subscribe(Box::new(TraceObserver));
                self.focused_dim = 0;
                Some((StatusLevel::Info, "batch reloaded".to_string()))
            }
            Err(e) => Some((StatusLevel::Warn, format!("reload failed, keeping previous batch: {e}"))),
        };
    }
}

fn cmd_browse(args: &BatchArgs, batch: &Path, start: Option<u32>) -> Result<()> {
    let mut browser = args.open(batch)?;
    let session = session_of(&mut browser)?;
    session.subscribe(Box::new(TraceObserver));
    if let Some(sim_num) = start {
        if session.goto(sim_num).is_err() {
            bail!(
                "SimNum {} is outside 1..={}",
                sim_num,
                session.catalog().total_num_sims()
            );
        }
    }
    let mut state = BrowseState::new(browser);
    run_browse_tui(&mut state)
}

fn run_browse_tui(state: &mut BrowseState) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen)?;

    let backend = CrosstermBackend::new(stdout);
    let mut term = Terminal::new(backend)?;

    let res = (|| -> Result<()> {
        loop {
            term.draw(|f| draw_browse_ui(f, state))?;

            if !event::poll(Duration::from_millis(120))? {
                continue;
            }
            let Event::Key(KeyEvent {
                code,
                modifiers,
                kind,
                ..
            }) = event::read()?
            else {
                continue;
            };
            if kind != KeyEventKind::Press {
                continue;
            }
            if code == KeyCode::Char('c') && modifiers.contains(KeyModifiers::CONTROL) {
                break;
            }
            let shift = modifiers.contains(KeyModifiers::SHIFT);

            match code {
                KeyCode::Char('q') | KeyCode::Esc => break,
                KeyCode::Up => state.move_focus(-1),
                KeyCode::Down => state.move_focus(1),
                KeyCode::Left => state.nudge(-1, InputChannel::Slider),
                KeyCode::Right => state.nudge(1, InputChannel::Slider),
                KeyCode::Char(',') => state.nudge(-1, InputChannel::Picker),
                KeyCode::Char('.') => state.nudge(1, InputChannel::Picker),
                KeyCode::Char('n') => state.step(Direction::Forward, shift),
                KeyCode::Char('N') => state.step(Direction::Forward, true),
                KeyCode::Char('p') => state.step(Direction::Backward, shift),
                KeyCode::Char('P') => state.step(Direction::Backward, true),
                KeyCode::Char('m') | KeyCode::Enter => state.load_metadata(),
                KeyCode::Char('r') => state.reload(),
                KeyCode::PageUp => state.metadata_scroll = state.metadata_scroll.saturating_sub(5),
                KeyCode::PageDown => state.metadata_scroll = state.metadata_scroll.saturating_add(5),
                _ => {}
            }
        }
        Ok(())
    })();

    disable_raw_mode()?;
    execute!(term.backend_mut(), LeaveAlternateScreen)?;
    term.show_cursor()?;

    res
}

fn draw_browse_ui(f: &mut ratatui::Frame<'_>, state: &BrowseState) {
    let rows = Layout::default()
        .direction(LayoutDirection::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(3)])
        .split(f.area());
    let cols = Layout::default()
        .direction(LayoutDirection::Horizontal)
        .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
        .split(rows[0]);

    draw_parameter_panel(f, cols[0], state);
    draw_record_panel(f, cols[1], state);
    draw_status_line(f, rows[1], state);
}

/// Slider glyphs for `index` out of `len` positions.
fn slider_track(index: usize, len: usize) -> String {
    (0..len)
        .map(|i| if i == index { '●' } else { '─' })
        .collect()
}

fn draw_parameter_panel(f: &mut ratatui::Frame<'_>, area: Rect, state: &BrowseState) {
    let block = Block::default().title("parameters").borders(Borders::ALL);
    let mut lines: Vec<Line> = vec![];

    match state.session() {
        None => lines.push(Line::from("No batch open.")),
        Some(session) => {
            let width = session
                .catalog()
                .dimensions()
                .iter()
                .map(|d| d.name.chars().count())
                .max()
                .unwrap_or(0);
            for (i, dim) in session.catalog().dimensions().iter().enumerate() {
                let index = session.selection().dimension_index(&dim.name).unwrap_or(0);
                let value = dim.values.get(index).map(|v| v.to_string()).unwrap_or_default();
                let focused = i == state.focused_dim;
                let name_style = if focused {
                    Style::default()
                        .fg(Color::Black)
                        .bg(Color::Cyan)
                        .add_modifier(Modifier::BOLD)
                } else {
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
                };
                // Picker and slider both render the one stored index.
                lines.push(Line::from(vec![
                    Span::styled(format!("{:<width$}", dim.name), name_style),
                    Span::raw("  ‹ "),
                    Span::styled(value, Style::default().fg(Color::Green)),
                    Span::raw(" ›"),
                ]));
                lines.push(Line::from(vec![
                    Span::raw(" ".repeat(width + 2)),
                    Span::styled(slider_track(index, dim.len()), Style::default().fg(Color::Magenta)),
                    Span::styled(
                        format!(" {}/{}", index + 1, dim.len()),
                        Style::default().fg(Color::DarkGray),
                    ),
                ]));
            }
        }
    }

    let paragraph = Paragraph::new(lines).block(block).wrap(Wrap { trim: false });
    f.render_widget(paragraph, area);
}

fn draw_record_panel(f: &mut ratatui::Frame<'_>, area: Rect, state: &BrowseState) {
    let key_style = Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD);
    let mut lines: Vec<Line> = vec![];
    let mut title = "run".to_string();

    if let Some(session) = state.session() {
        let catalog = session.catalog();
        title = format!(
            "{}  run {}/{}",
            catalog.simulation_name(),
            session
                .current_sim_num()
                .map(|n| n.to_string())
                .unwrap_or_else(|| "-".to_string()),
            catalog.total_num_sims()
        );
        match session.current_record() {
            None => lines.push(Line::from("No run matches the current selection.")),
            Some(record) => {
                for (kind, exists) in record.artifacts.existing() {
                    let path = record.artifacts.get(kind).display().to_string();
                    let status = if exists {
                        Span::styled(" ok", Style::default().fg(Color::Green))
                    } else {
                        Span::styled(" cannot load", Style::default().fg(Color::Red))
                    };
                    lines.push(Line::from(vec![
                        Span::styled(format!("{:<10}", kind.label()), key_style),
                        Span::raw(path),
                        status,
                    ]));
                }
            }
        }
        lines.push(Line::from(""));
        if state.metadata_for.is_some() && state.metadata_for != session.current_sim_num() {
            lines.push(Line::from(Span::styled(
                "metadata below is from another run; press m to refresh",
                Style::default().fg(Color::DarkGray),
            )));
        }
    }

    for s in &state.metadata_lines {
        match s.split_once(" = ") {
            Some((k, v)) => lines.push(Line::from(vec![
                Span::styled(k.to_string(), key_style),
                Span::raw(" = "),
                Span::styled(v.to_string(), Style::default().fg(Color::Green)),
            ])),
            None => lines.push(Line::from(Span::raw(s.clone()))),
        }
    }

    let block = Block::default().title(title).borders(Borders::ALL);
    let paragraph = Paragraph::new(lines)
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((state.metadata_scroll, 0));
    f.render_widget(paragraph, area);
}

fn draw_status_line(f: &mut ratatui::Frame<'_>, area: Rect, state: &BrowseState) {
    let line = match &state.status {
        Some((StatusLevel::Warn, msg)) => Line::from(Span::styled(
            format!("warning: {msg}"),
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        )),
        Some((StatusLevel::Info, msg)) => Line::from(Span::styled(msg.clone(), Style::default().fg(Color::Cyan))),
        None => Line::from(Span::styled(
            "↑/↓ parameter  ←/→ slider  ,/. value  n/p step  N/P fast  m metadata  r reload  q quit",
            Style::default().fg(Color::DarkGray),
        )),
    };
    let paragraph = Paragraph::new(line).block(Block::default().borders(Borders::ALL));
    f.render_widget(paragraph, area);
}
