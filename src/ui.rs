use crate::config::AppConfig;
use crate::export::{format_currency, format_percentage};
use crate::model::BudgetData;
use crate::pl::{Period, PeriodTable, PlCalculator, PlCategory, PlStatement, Selection};
use crate::scenario::Scenario;
use crate::territory::TerritoryRegistry;
use crate::waterfall::{KeyMetrics, StepKind, Waterfall};
use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use std::io;

const PERIODS: [Period; 3] = [Period::Monthly, Period::Quarterly, Period::Annual];

fn period_title(period: Period) -> &'static str {
    match period {
        Period::Monthly => "Monthly",
        Period::Quarterly => "Quarterly",
        Period::Annual => "Annual",
    }
}

pub struct App {
    data: BudgetData,
    config: AppConfig,
    scenario: Scenario,
    /// Combined first, then every territory code
    pub selections: Vec<Selection>,
    pub selection_index: usize,
    pub period: Period,
    pub show_waterfall: bool,
    pub state: TableState,
    statement: PlStatement,
    table: PeriodTable,
}

impl App {
    pub fn new(data: BudgetData, config: AppConfig, scenario: Scenario) -> Self {
        let mut selections = vec![Selection::Combined];
        selections.extend(
            TerritoryRegistry::new()
                .codes()
                .into_iter()
                .map(|c| Selection::Territory(c.to_string())),
        );

        let mut app = Self {
            data,
            config,
            scenario,
            selections,
            selection_index: 0,
            period: Period::Monthly,
            show_waterfall: false,
            state: TableState::default(),
            statement: PlStatement::new(Vec::new()),
            table: PeriodTable {
                periods: Vec::new(),
                rows: Vec::new(),
            },
        };
        app.refresh();
        app
    }

    pub fn selection(&self) -> &Selection {
        &self.selections[self.selection_index]
    }

    pub fn table(&self) -> &PeriodTable {
        &self.table
    }

    pub fn statement(&self) -> &PlStatement {
        &self.statement
    }

    /// Recompute the statement for the current selection and period
    fn refresh(&mut self) {
        let calc = PlCalculator::new(&self.data, &self.scenario)
            .with_default_fulfilment_rate(self.config.model.default_fulfilment_rate);
        self.statement = calc.pl(&self.selections[self.selection_index]);
        self.table = self
            .statement
            .rollup(self.period, self.config.model.fiscal_year_start_month);

        let selected = self.state.selected().unwrap_or(0);
        if self.table.rows.is_empty() {
            self.state.select(None);
        } else {
            self.state.select(Some(selected.min(self.table.rows.len() - 1)));
        }
    }

    pub fn next_selection(&mut self) {
        self.selection_index = (self.selection_index + 1) % self.selections.len();
        self.refresh();
    }

    pub fn previous_selection(&mut self) {
        self.selection_index = if self.selection_index == 0 {
            self.selections.len() - 1
        } else {
            self.selection_index - 1
        };
        self.refresh();
    }

    pub fn cycle_period(&mut self) {
        let current = PERIODS.iter().position(|p| *p == self.period).unwrap_or(0);
        self.period = PERIODS[(current + 1) % PERIODS.len()];
        self.refresh();
    }

    pub fn toggle_waterfall(&mut self) {
        self.show_waterfall = !self.show_waterfall;
    }

    pub fn next(&mut self) {
        if self.table.rows.is_empty() {
            return;
        }
        let i = match self.state.selected() {
            Some(i) if i + 1 < self.table.rows.len() => i + 1,
            Some(_) => 0,
            None => 0,
        };
        self.state.select(Some(i));
    }

    pub fn previous(&mut self) {
        if self.table.rows.is_empty() {
            return;
        }
        let i = match self.state.selected() {
            Some(0) | None => self.table.rows.len() - 1,
            Some(i) => i - 1,
        };
        self.state.select(Some(i));
    }
}

pub fn run_ui(app: &mut App) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    res.map_err(Into::into)
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                KeyCode::Right | KeyCode::Char('l') => app.next_selection(),
                KeyCode::Left | KeyCode::Char('h') => app.previous_selection(),
                KeyCode::Char('p') => app.cycle_period(),
                KeyCode::Char('w') => app.toggle_waterfall(),
                KeyCode::Down | KeyCode::Char('j') => app.next(),
                KeyCode::Up | KeyCode::Char('k') => app.previous(),
                _ => {}
            }
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Selection tabs
            Constraint::Min(0),    // Statement
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    if app.show_waterfall {
        let content = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(65), Constraint::Percentage(35)])
            .split(chunks[1]);
        render_table(f, content[0], app);
        render_waterfall(f, content[1], app);
    } else {
        render_table(f, chunks[1], app);
    }

    render_status_bar(f, chunks[2], app);
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let mut spans = Vec::new();
    for (i, selection) in app.selections.iter().enumerate() {
        if i > 0 {
            spans.push(Span::raw(" │ "));
        }
        let style = if i == app.selection_index {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        spans.push(Span::styled(selection.label().to_string(), style));
    }

    let header = Paragraph::new(vec![Line::from(spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan))
            .title(" Budget P&L "),
    );
    f.render_widget(header, area);
}

fn category_color(category: PlCategory) -> Color {
    match category {
        PlCategory::Revenue => Color::Green,
        PlCategory::CoGS | PlCategory::Fulfilment | PlCategory::Overheads => Color::Red,
        PlCategory::CM1 | PlCategory::CM2 => Color::Cyan,
        PlCategory::EBITDA => Color::Yellow,
    }
}

fn render_table(f: &mut Frame, area: Rect, app: &mut App) {
    let table_data = app.table();

    let header_cells = std::iter::once("Line".to_string())
        .chain(table_data.periods.iter().cloned())
        .map(|h| {
            Cell::from(h).style(
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            )
        });
    let header = Row::new(header_cells)
        .style(Style::default().bg(Color::DarkGray))
        .height(1);

    let rows: Vec<Row> = table_data
        .rows
        .iter()
        .map(|row| {
            let color = category_color(row.category);
            let label_style = if row.line.starts_with("Total") || row.line == "EBITDA" {
                Style::default().fg(color).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(color)
            };
            let cells = std::iter::once(Cell::from(row.line.clone()).style(label_style)).chain(
                row.values
                    .iter()
                    .map(|v| Cell::from(format_currency(*v)).style(Style::default().fg(color))),
            );
            Row::new(cells).height(1)
        })
        .collect();

    let mut widths = vec![Constraint::Length(24)];
    widths.extend(table_data.periods.iter().map(|_| Constraint::Length(14)));

    let title = format!(
        " {} P&L - {} ",
        app.selection().label(),
        period_title(app.period)
    );
    let table = Table::new(rows, widths)
        .header(header)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::White))
                .title(title),
        )
        .highlight_style(
            Style::default()
                .bg(Color::DarkGray)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.state);
}

fn render_waterfall(f: &mut Frame, area: Rect, app: &App) {
    let waterfall = Waterfall::from_statement(app.statement(), None);
    let metrics = KeyMetrics::from_statement(app.statement(), None);

    let mut text = Vec::new();
    for step in &waterfall.steps {
        let color = match step.kind {
            StepKind::Absolute | StepKind::Total => Color::Cyan,
            StepKind::Relative if step.amount < 0.0 => Color::Red,
            StepKind::Relative => Color::Green,
        };
        text.push(Line::from(vec![
            Span::styled(format!("{:<12}", step.label), Style::default().fg(Color::Yellow)),
            Span::styled(format!("{:>14}", format_currency(step.amount)), Style::default().fg(color)),
            Span::styled(
                format!("  → {}", format_currency(step.end)),
                Style::default().fg(Color::DarkGray),
            ),
        ]));
    }

    text.push(Line::from(""));
    for (label, value) in [
        ("CM1 %", metrics.cm1_pct),
        ("CM2 %", metrics.cm2_pct),
        ("EBITDA %", metrics.ebitda_pct),
        ("CoGS %", metrics.cogs_pct),
    ] {
        text.push(Line::from(vec![
            Span::styled(format!("{:<12}", label), Style::default().fg(Color::Yellow)),
            Span::raw(format_percentage(value)),
        ]));
    }

    let panel = Paragraph::new(text).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan))
            .title(" Waterfall "),
    );
    f.render_widget(panel, area);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let selected = app.state.selected().map(|i| i + 1).unwrap_or(0);
    let total = app.table().rows.len();

    let mut spans = vec![Span::styled(
        format!(" Row: {}/{} ", selected, total),
        Style::default().fg(Color::Cyan),
    )];
    if !app.scenario.is_empty() {
        spans.push(Span::raw(" | "));
        spans.push(Span::styled(
            format!("Scenario: {} adjustments", app.scenario.len()),
            Style::default().fg(Color::Green),
        ));
    }
    spans.push(Span::raw(" | "));
    spans.push(Span::styled("←/→", Style::default().fg(Color::Yellow)));
    spans.push(Span::raw(" Territory | "));
    spans.push(Span::styled("p", Style::default().fg(Color::Yellow)));
    spans.push(Span::raw(" Period | "));
    spans.push(Span::styled("w", Style::default().fg(Color::Yellow)));
    spans.push(Span::raw(" Waterfall | "));
    spans.push(Span::styled("↑/↓", Style::default().fg(Color::Yellow)));
    spans.push(Span::raw(" Nav | "));
    spans.push(Span::styled("q", Style::default().fg(Color::Red)));
    spans.push(Span::raw(" Quit"));

    let status_bar = Paragraph::new(vec![Line::from(spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );
    f.render_widget(status_bar, area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pl::tests::sample_data;

    fn app() -> App {
        App::new(sample_data(), AppConfig::default(), Scenario::baseline())
    }

    #[test]
    fn test_selection_cycles_through_territories() {
        let mut app = app();
        assert_eq!(app.selection(), &Selection::Combined);
        assert_eq!(app.selections.len(), 15);

        app.next_selection();
        assert!(matches!(app.selection(), Selection::Territory(_)));

        app.previous_selection();
        app.previous_selection();
        assert_eq!(app.selection_index, app.selections.len() - 1);

        app.next_selection();
        assert_eq!(app.selection(), &Selection::Combined);
    }

    #[test]
    fn test_period_cycle_rolls_up_columns() {
        let mut app = app();
        assert_eq!(app.table().periods.len(), 3);

        app.cycle_period();
        assert_eq!(app.period, Period::Quarterly);
        assert_eq!(app.table().periods, vec!["FY27 Q1".to_string()]);

        app.cycle_period();
        assert_eq!(app.period, Period::Annual);
        assert_eq!(app.table().periods, vec!["FY27".to_string()]);

        app.cycle_period();
        assert_eq!(app.period, Period::Monthly);
    }

    #[test]
    fn test_row_navigation_wraps() {
        let mut app = app();
        let rows = app.table().rows.len();
        assert!(rows > 0);
        assert_eq!(app.state.selected(), Some(0));

        app.previous();
        assert_eq!(app.state.selected(), Some(rows - 1));
        app.next();
        assert_eq!(app.state.selected(), Some(0));
    }

    #[test]
    fn test_waterfall_toggle() {
        let mut app = app();
        assert!(!app.show_waterfall);
        app.toggle_waterfall();
        assert!(app.show_waterfall);
    }
}
