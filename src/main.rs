// Copyright 2025 c-fraser
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use clap::{Parser, ValueEnum};
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use jsondiff::{
    DiffFilter, DiffKind, DiffView, DiffWriter, Row, ViewOptions, flatten, new_jsonl_writer,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Color, Modifier, Style, Stylize};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};
use std::error::Error;
use std::fs::{self, File};
use std::io::{self, IsTerminal, Read};
use std::process;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let args = Args::parse();

    let filter = DiffFilter::new(
        args.filter_added.unwrap_or_default(),
        args.filter_removed.unwrap_or_default(),
        args.filter_changed.unwrap_or_default(),
    );
    let options = ViewOptions::new(&args.left, &args.right, "json-view").with_filter(filter);
    let mut view = DiffView::new(options)?;
    view.set_left(read_input(&args.left)?);
    view.set_right(read_input(&args.right)?);
    if args.swap {
        view.swap();
    }

    // use TUI if explicitly requested or if stdout is a TTY
    let use_tui = args.output.is_none()
        && args
            .format
            .as_ref()
            .map(|f| matches!(f, OutputFormat::Tui))
            .unwrap_or_else(|| io::stdout().is_terminal());

    if use_tui {
        run_tui(view)
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .with_writer(io::stderr)
            .init();
        if !view.compare() {
            process::exit(1);
        }
        let mut writer: Box<dyn DiffWriter> = match &args.output {
            Some(path) => new_jsonl_writer(File::create(path)?),
            None => new_jsonl_writer(io::stdout()),
        };
        if let Some(diff) = view.diff() {
            for record in flatten(diff) {
                writer.write(&record)?;
            }
        }
        let summary = writer.summarize()?;
        info!(
            "Found {} differences: +{} -{} ~{} ({} suppressed)",
            summary.total(),
            summary.added,
            summary.removed,
            summary.changed,
            summary.filtered
        );
        Ok(())
    }
}

#[derive(Parser)]
#[command(name = "jsondiff", about = "JSON comparison tool", version)]
struct Args {
    /// *Left* JSON document: a file path, or '-' for stdin
    left: String,

    /// *Right* JSON document: a file path, or '-' for stdin
    right: String,

    /// Output file (implies --format=jsonl)
    #[arg(short, long)]
    output: Option<String>,

    /// Output format (default: tui if stdout is a TTY, otherwise jsonl)
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,

    /// Suppress added values with these key names (comma-separated)
    #[arg(long, value_delimiter = ',')]
    filter_added: Option<Vec<String>>,

    /// Suppress removed values with these key names (comma-separated)
    #[arg(long, value_delimiter = ',')]
    filter_removed: Option<Vec<String>>,

    /// Suppress changed values with these key names (comma-separated)
    #[arg(long, value_delimiter = ',')]
    filter_changed: Option<Vec<String>>,

    /// Exchange the left and right documents before comparing
    #[arg(long)]
    swap: bool,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    /// Interactive TUI
    Tui,
    /// JSON Lines format
    Jsonl,
}

fn read_input(source: &str) -> Result<String, Box<dyn Error + Send + Sync>> {
    if source == "-" {
        let mut text = String::new();
        io::stdin().read_to_string(&mut text)?;
        Ok(text)
    } else {
        Ok(fs::read_to_string(source)?)
    }
}

struct Tui {
    view: DiffView,
    selected: usize,
    offset: usize,
    error: Option<String>,
}

impl Tui {
    fn new(view: DiffView) -> Self {
        Self {
            view,
            selected: 0,
            offset: 0,
            error: None,
        }
    }

    fn compare(&mut self) {
        let side = if self.view.compare() {
            self.error = None;
            return;
        } else if self.view.left_invalid() {
            self.view.options().left.clone()
        } else {
            self.view.options().right.clone()
        };
        self.error = Some(format!("{side} is not valid JSON"));
    }

    fn clamp_selection(&mut self, rows: &[Row]) {
        if rows.is_empty() {
            self.selected = 0;
        } else if self.selected >= rows.len() {
            self.selected = rows.len() - 1;
        }
    }

    fn run(&mut self) -> Result<(), Box<dyn Error + Send + Sync>> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        crossterm::execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        loop {
            let rows = self.view.rows();
            self.clamp_selection(&rows);
            let summary = self.view.summary();
            let faded = self.view.faded();
            let error = self.error.clone();
            let (left_name, right_name) = {
                let options = self.view.options();
                (options.left.clone(), options.right.clone())
            };

            terminal.draw(|f| {
                // layout: header row (summary + legend), then the diff tree
                let chunks = Layout::default()
                    .direction(Direction::Vertical)
                    .constraints([Constraint::Length(5), Constraint::Min(0)])
                    .split(f.area());
                let header_chunks = Layout::default()
                    .direction(Direction::Horizontal)
                    .constraints([Constraint::Min(30), Constraint::Length(30)])
                    .split(chunks[0]);

                let status_line = if let Some(ref err) = error {
                    Line::from(Span::styled(
                        format!("Error: {err}"),
                        Style::default().fg(Color::Red).bold(),
                    ))
                } else if summary.total() == 0 {
                    Line::from(Span::styled(
                        "No differences found",
                        Style::default().fg(Color::Green).bold(),
                    ))
                } else {
                    Line::from(Span::styled(
                        format!("{} differences", summary.total()),
                        Style::default().fg(Color::Yellow).bold(),
                    ))
                };
                let summary_text = vec![
                    Line::from(vec![
                        Span::raw("Values: "),
                        Span::styled(
                            format!("-{}", summary.removed),
                            kind_style(DiffKind::Removed),
                        ),
                        Span::raw(" "),
                        Span::styled(format!("+{}", summary.added), kind_style(DiffKind::Added)),
                        Span::raw(" "),
                        Span::styled(
                            format!("~{}", summary.changed),
                            kind_style(DiffKind::Changed),
                        ),
                        Span::raw(format!(" (suppressed: {})", summary.filtered)),
                    ]),
                    Line::from(Span::raw(format!("{left_name} vs {right_name}"))),
                    status_line,
                ];

                // summary panel (left)
                let summary_widget = Paragraph::new(summary_text).block(
                    Block::default()
                        .borders(Borders::ALL)
                        .title(" Summary ")
                        .title_style(Style::default().bold()),
                );
                f.render_widget(summary_widget, header_chunks[0]);

                // legend panel (right)
                let legend_text = vec![
                    Line::from(vec![
                        Span::styled("- ", kind_style(DiffKind::Removed)),
                        Span::raw("only in left"),
                    ]),
                    Line::from(vec![
                        Span::styled("+ ", kind_style(DiffKind::Added)),
                        Span::raw("only in right"),
                    ]),
                    Line::from(vec![
                        Span::styled("~ ", kind_style(DiffKind::Changed)),
                        Span::raw("changed"),
                    ]),
                ];
                let legend_widget =
                    Paragraph::new(legend_text).block(Block::default().borders(Borders::ALL));
                f.render_widget(legend_widget, header_chunks[1]);

                // diff tree (main content area)
                let tree_area = chunks[1];
                let height = tree_area.height.saturating_sub(2) as usize;
                if self.selected < self.offset {
                    self.offset = self.selected;
                } else if height > 0 && self.selected >= self.offset + height {
                    self.offset = self.selected - height + 1;
                }
                let lines: Vec<Line> = rows
                    .iter()
                    .enumerate()
                    .skip(self.offset)
                    .take(height.max(1))
                    .map(|(i, row)| {
                        let mut line = row_line(row, faded);
                        if i == self.selected {
                            line = line.style(
                                Style::default()
                                    .add_modifier(Modifier::BOLD)
                                    .bg(Color::DarkGray),
                            );
                        }
                        line
                    })
                    .collect();
                let tree_widget = Paragraph::new(lines).block(
                    Block::default()
                        .borders(Borders::ALL)
                        .title(" Differences (↑↓ navigate, ←→ collapse/expand, q quit) ")
                        .title_style(Style::default().bold()),
                );
                f.render_widget(tree_widget, tree_area);
            })?;

            if event::poll(std::time::Duration::from_millis(100))?
                && let Event::Key(key) = event::read()?
                && key.kind == KeyEventKind::Press
            {
                match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => break,
                    KeyCode::Down | KeyCode::Char('j') => {
                        if self.selected + 1 < rows.len() {
                            self.selected += 1;
                        }
                    }
                    KeyCode::Up | KeyCode::Char('k') => {
                        self.selected = self.selected.saturating_sub(1);
                    }
                    KeyCode::Left | KeyCode::Char('h') => {
                        if let Some(row) = rows.get(self.selected)
                            && row.container
                            && !row.collapsed
                        {
                            self.view.toggle(&row.path);
                        }
                    }
                    KeyCode::Right | KeyCode::Char('l') => {
                        if let Some(row) = rows.get(self.selected)
                            && row.container
                            && row.collapsed
                        {
                            self.view.toggle(&row.path);
                        }
                    }
                    KeyCode::Enter | KeyCode::Char(' ') => {
                        if let Some(row) = rows.get(self.selected) {
                            self.view.toggle(&row.path);
                        }
                    }
                    KeyCode::Char('e') => self.view.expand_all(),
                    KeyCode::Char('c') => self.view.collapse_all(),
                    KeyCode::Char('d') => self.view.collapse(),
                    KeyCode::Char('f') => {
                        if self.view.faded() {
                            self.view.fade_in();
                        } else {
                            self.view.fade_out();
                        }
                    }
                    KeyCode::Char('s') => {
                        self.view.swap();
                        self.compare();
                        self.selected = 0;
                        self.offset = 0;
                    }
                    KeyCode::Home => self.selected = 0,
                    KeyCode::End => self.selected = rows.len().saturating_sub(1),
                    _ => {}
                }
            }
        }

        disable_raw_mode()?;
        crossterm::execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
        Ok(())
    }
}

fn run_tui(view: DiffView) -> Result<(), Box<dyn Error + Send + Sync>> {
    let mut tui = Tui::new(view);
    tui.compare();
    tui.run()
}

fn kind_style(kind: DiffKind) -> Style {
    let color = match kind {
        DiffKind::Removed => Color::Red,
        DiffKind::Added => Color::Green,
        DiffKind::Changed => Color::Yellow,
        DiffKind::Unchanged => Color::Reset,
    };
    Style::default().fg(color)
}

fn kind_prefix(kind: DiffKind) -> &'static str {
    match kind {
        DiffKind::Removed => "- ",
        DiffKind::Added => "+ ",
        DiffKind::Changed => "~ ",
        DiffKind::Unchanged => "  ",
    }
}

// formats one visible row: indent, collapse marker, diff prefix, label
fn row_line(row: &Row, faded: bool) -> Line<'static> {
    let marker = if !row.container {
        "  "
    } else if row.collapsed {
        "▸ "
    } else {
        "▾ "
    };
    let style = if row.filtered {
        Style::default()
            .fg(Color::DarkGray)
            .add_modifier(Modifier::DIM)
    } else if faded && row.kind == DiffKind::Unchanged {
        Style::default().fg(Color::DarkGray)
    } else {
        kind_style(row.kind)
    };
    Line::from(vec![
        Span::raw("  ".repeat(row.depth)),
        Span::raw(marker.to_string()),
        Span::styled(
            format!("{}{}", kind_prefix(row.kind), row.label),
            style,
        ),
    ])
}
