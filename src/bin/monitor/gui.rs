use crossterm::{
    event::{self, Event, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use log::warn;
use std::{
    collections::BTreeMap,
    error::Error,
    io,
    net::UdpSocket,
    time::{Duration, Instant},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    symbols,
    text::Span,
    widgets::{Axis, Block, Borders, Chart, Dataset, GraphType},
    Frame, Terminal,
};

use tactileforce::transport::Record;

const FORCE_FIELDS: [&str; 6] = ["fx", "fy", "fz", "mx", "my", "mz"];
const TACTILE_FIELDS: [&str; 4] = ["s0", "s1", "s2", "s3"];
const COLORS: [Color; 6] = [
    Color::Cyan,
    Color::Red,
    Color::Yellow,
    Color::Green,
    Color::Magenta,
    Color::Blue,
];

/// The last `window` seconds of a set of named channels.
#[derive(Debug)]
struct History {
    window: f64,
    series: BTreeMap<&'static str, Vec<(f64, f64)>>,
}

impl History {
    fn new(window: f64) -> Self {
        Self {
            window,
            series: BTreeMap::new(),
        }
    }

    /// Appends every field of `record` named in `fields`, stamped `t`.
    fn push(&mut self, t: f64, record: &Record, fields: &[&'static str]) {
        for &field in fields {
            if let Some(value) = record.get(field) {
                self.series.entry(field).or_default().push((t, value));
            }
        }
        let window = self.window;
        for points in self.series.values_mut() {
            let stale = points.partition_point(|&(t0, _)| t - t0 > window);
            points.drain(..stale);
        }
    }

    /// `[min, max]` over every stored value, padded so a flat line is visible.
    fn value_bounds(&self) -> [f64; 2] {
        let (lo, hi) = self
            .series
            .values()
            .flatten()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &(_, v)| {
                (lo.min(v), hi.max(v))
            });
        if lo > hi {
            return [-1.0, 1.0];
        }
        let pad = ((hi - lo) * 0.1).max(1e-3);
        [lo - pad, hi + pad]
    }

    fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

struct App {
    socket: UdpSocket,
    started: Instant,
    force: History,
    tactile: History,
    window: f64,
}

impl App {
    fn new(socket: UdpSocket, window: f64) -> App {
        App {
            socket,
            started: Instant::now(),
            force: History::new(window),
            tactile: History::new(window),
            window,
        }
    }

    fn now(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    /// Drains every datagram waiting on the socket.
    fn on_tick(&mut self) -> io::Result<()> {
        let mut buf = [0u8; 2048];
        loop {
            let n = match self.socket.recv(&mut buf) {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) => return Err(e),
            };
            let text = String::from_utf8_lossy(&buf[..n]);
            match Record::from_ron(&text) {
                Ok(record) => {
                    let t = self.now();
                    self.force.push(t, &record, &FORCE_FIELDS);
                    self.tactile.push(t, &record, &TACTILE_FIELDS);
                }
                Err(e) => warn!("dropping malformed record: {e}"),
            }
        }
    }
}

pub fn engage_gui(socket: UdpSocket, window: f64) -> Result<(), Box<dyn Error>> {
    // setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // create app and run it
    let tick_rate = Duration::from_millis(50);
    let app = App::new(socket, window);
    let res = run_app(&mut terminal, app, tick_rate);

    // restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    res?;
    Ok(())
}

fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    mut app: App,
    tick_rate: Duration,
) -> io::Result<()> {
    let mut last_tick = Instant::now();
    loop {
        terminal.draw(|f| ui(f, &app))?;

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or_else(|| Duration::from_secs(0));
        if crossterm::event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if let KeyCode::Char('q') = key.code {
                    return Ok(());
                }
            }
        }
        if last_tick.elapsed() >= tick_rate {
            app.on_tick()?;
            last_tick = Instant::now();
        }
    }
}

fn ui(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(f.size());

    let now = app.now();
    let time_bounds = [(now - app.window).max(0.0), now.max(app.window)];
    render_history(f, chunks[0], " Force / torque ", &app.force, time_bounds);
    render_history(f, chunks[1], " Tactile ", &app.tactile, time_bounds);
}

fn render_history(f: &mut Frame, area: Rect, title: &str, history: &History, time_bounds: [f64; 2]) {
    let datasets = history
        .series
        .iter()
        .zip(COLORS.iter().cycle())
        .map(|((name, points), &color)| {
            Dataset::default()
                .name(*name)
                .marker(symbols::Marker::Braille)
                .graph_type(GraphType::Line)
                .style(Style::default().fg(color))
                .data(points)
        })
        .collect();

    let title = if history.is_empty() {
        format!("{title}(waiting for data, q to quit) ")
    } else {
        format!("{title}(q to quit) ")
    };
    let [lo, hi] = history.value_bounds();
    let chart = Chart::new(datasets)
        .block(Block::default().title(title).borders(Borders::ALL))
        .x_axis(
            Axis::default()
                .title(Span::styled("t [s]", Style::default().fg(Color::Red)))
                .style(Style::default().fg(Color::White))
                .bounds(time_bounds)
                .labels(axis_labels(time_bounds)),
        )
        .y_axis(
            Axis::default()
                .style(Style::default().fg(Color::White))
                .bounds([lo, hi])
                .labels(axis_labels([lo, hi])),
        );

    f.render_widget(chart, area);
}

fn axis_labels([lo, hi]: [f64; 2]) -> Vec<Span<'static>> {
    [lo, (lo + hi) / 2.0, hi]
        .iter()
        .map(|v| Span::from(format!("{v:.2}")))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pairs: &[(&str, f64)]) -> Record {
        let mut record = Record::new();
        for &(k, v) in pairs {
            record.insert(k, v);
        }
        record
    }

    #[test]
    fn history_keeps_only_named_fields_in_window() {
        let mut history = History::new(1.0);
        history.push(0.0, &record(&[("s0", 1.0), ("fx", 9.0)]), &TACTILE_FIELDS);
        history.push(0.5, &record(&[("s0", 2.0)]), &TACTILE_FIELDS);
        history.push(1.6, &record(&[("s0", 3.0)]), &TACTILE_FIELDS);

        assert_eq!(history.series.len(), 1);
        assert_eq!(history.series["s0"], vec![(1.6, 3.0)]);
    }

    #[test]
    fn bounds_are_padded() {
        let mut history = History::new(10.0);
        assert_eq!(history.value_bounds(), [-1.0, 1.0]);

        history.push(0.0, &record(&[("fx", 1.0), ("fy", 3.0)]), &FORCE_FIELDS);
        let [lo, hi] = history.value_bounds();
        assert!(lo < 1.0 && hi > 3.0);
    }
}
