//! Terminal chart for a monitoring session.

use chrono::{DateTime, Local};
use crossterm::{cursor, terminal, ExecutableCommand};
use ratatui::backend::{Backend, CrosstermBackend};
use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::symbols;
use ratatui::text::{Line, Span};
use ratatui::widgets::{Axis, Block, Borders, Chart, Dataset, GraphType, List, ListItem, Paragraph};
use ratatui::Terminal;

use pidscope::analysis::{Analysis, Conclusion};
use pidscope::data::Channel;
use pidscope::monitor::{Frame as MonitorFrame, MonitorState, Renderer, Severity};
use pidscope::view::AxisBounds;

use std::io::{self, Stdout, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Switches the terminal to raw mode on the alternate screen.
pub fn setup() -> io::Result<Terminal<CrosstermBackend<Stdout>>> {
    let mut stdout = io::stdout();
    terminal::enable_raw_mode()?;
    stdout.execute(terminal::EnterAlternateScreen)?;
    stdout.execute(cursor::Hide)?;
    Terminal::new(CrosstermBackend::new(stdout))
}

/// Undoes `setup()`. Safe to call more than once, and from a panic hook.
pub fn teardown() {
    let mut stdout = io::stdout();
    let _ = stdout.execute(cursor::Show);
    let _ = stdout.execute(terminal::LeaveAlternateScreen);
    let _ = terminal::disable_raw_mode();
    let _ = stdout.flush();
}

pub struct ChartRenderer<B: Backend> {
    terminal: Terminal<B>,
    analysis: Option<Analysis>,
    show_bode: Arc<AtomicBool>,
}

impl<B: Backend> ChartRenderer<B> {
    pub fn new(terminal: Terminal<B>, analysis: Option<Analysis>) -> ChartRenderer<B> {
        ChartRenderer {
            terminal,
            analysis,
            show_bode: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag toggled from the keyboard thread to show or hide the Bode panel.
    pub fn bode_toggle(&self) -> Arc<AtomicBool> {
        self.show_bode.clone()
    }

    pub fn backend(&self) -> &B {
        self.terminal.backend()
    }
}

impl<B: Backend> Renderer for ChartRenderer<B> {
    fn render(&mut self, frame: &MonitorFrame<'_>) -> io::Result<()> {
        let bode = match &self.analysis {
            Some(a) if self.show_bode.load(Ordering::Relaxed) && !a.report.bode.is_empty() => {
                Some(a)
            }
            _ => None,
        };
        let analysis = self.analysis.as_ref();
        self.terminal.draw(|f| {
            let notice_rows = frame.notices.len().max(1) as u16 + 2;
            let mut constraints = vec![
                Constraint::Length(1),
                Constraint::Min(8),
                Constraint::Min(8),
            ];
            if bode.is_some() {
                constraints.push(Constraint::Min(8));
            }
            constraints.push(Constraint::Length(notice_rows));
            constraints.push(Constraint::Length(1));
            let rows = Layout::vertical(constraints).split(f.area());

            f.render_widget(header(frame, analysis), rows[0]);
            draw_temperature(f, rows[1], frame);
            draw_pid(f, rows[2], frame);
            let mut next = 3;
            if let Some(a) = bode {
                draw_bode(f, rows[next], a);
                next += 1;
            }
            f.render_widget(notice_list(frame), rows[next]);
            f.render_widget(footer(analysis.is_some()), rows[next + 1]);
        })?;
        Ok(())
    }
}

fn state_color(state: MonitorState) -> Color {
    match state {
        MonitorState::Streaming => Color::Green,
        MonitorState::Idle | MonitorState::Connecting => Color::Yellow,
        MonitorState::Exhausted => Color::Red,
        MonitorState::Closed => Color::DarkGray,
    }
}

fn header<'a>(frame: &MonitorFrame<'_>, analysis: Option<&Analysis>) -> Paragraph<'a> {
    let bold = Style::default().add_modifier(Modifier::BOLD);
    let mut spans = vec![
        Span::styled("pid-monitor ", bold),
        Span::styled(
            format!("[{}]", frame.state.label()),
            bold.fg(state_color(frame.state)),
        ),
        Span::raw(format!(
            " {}  samples {}/{}  rejected {}",
            frame.link,
            frame.snapshot.len(),
            frame.capacity,
            frame.stats.rejected
        )),
    ];
    if frame.stats.noisy > 0 {
        spans.push(Span::raw(format!("  noisy {}", frame.stats.noisy)));
    }

    let last = |ch: Channel| frame.snapshot.values(ch).last().copied();
    if let (Some(t), Some(sp), Some(pwm)) = (
        last(Channel::Temperature),
        last(Channel::Setpoint),
        last(Channel::PwmPercent),
    ) {
        spans.push(Span::raw(format!(
            "  T={:.2}°C SP={:.2}°C PWM={:.0}%",
            t, sp, pwm
        )));
    }

    if let Some(a) = analysis {
        let gm = match a.report.gain_margin {
            None => "∞".to_string(),
            Some(_) => format!("{:.1} dB", a.report.gain_margin_db()),
        };
        let pm = match a.report.phase_margin_deg {
            Some(pm) => format!("{:.1}°", pm),
            None => "N/A".to_string(),
        };
        let color = match a.assessment.conclusion {
            Conclusion::Robust => Color::Green,
            Conclusion::StableWithIssues => Color::Yellow,
            Conclusion::PossiblyUnstable => Color::Red,
        };
        spans.push(Span::styled(
            format!("  GM {} PM {}", gm, pm),
            Style::default().fg(color),
        ));
    }
    Paragraph::new(Line::from(spans))
}

fn panel(title: String) -> Block<'static> {
    Block::default()
        .borders(Borders::ALL)
        .title(Span::styled(
            title,
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        ))
        .border_style(Style::default().fg(Color::DarkGray))
}

/// Points outside the axis bounds are dropped by the chart widget, which
/// breaks the line. Keep them on the edge instead.
fn clamped(points: Vec<(f64, f64)>, y: &AxisBounds) -> Vec<(f64, f64)> {
    points
        .into_iter()
        .map(|(t, v)| (t, v.clamp(y.min, y.max)))
        .collect()
}

/// Maps values from `from` onto `to`, for drawing a second axis on a panel.
fn rescale(points: Vec<(f64, f64)>, from: &AxisBounds, to: &AxisBounds) -> Vec<(f64, f64)> {
    let span = from.span();
    points
        .into_iter()
        .map(|(t, v)| {
            let frac = if span > 0.0 { (v - from.min) / span } else { 0.0 };
            (t, to.min + frac.clamp(0.0, 1.0) * to.span())
        })
        .collect()
}

fn time_axis<'a>(frame: &MonitorFrame<'_>) -> Axis<'a> {
    let t = &frame.viewport.time;
    Axis::default()
        .title("s")
        .bounds(t.as_array())
        .labels(vec![
            format!("{:.0}", t.min),
            format!("{:.0}", t.min + t.span() / 2.0),
            format!("{:.0}", t.max),
        ])
        .style(Style::default().fg(Color::DarkGray))
}

fn line<'a>(name: &'a str, color: Color, data: &'a [(f64, f64)]) -> Dataset<'a> {
    Dataset::default()
        .name(name)
        .marker(symbols::Marker::Braille)
        .graph_type(GraphType::Line)
        .style(Style::default().fg(color))
        .data(data)
}

fn draw_temperature(f: &mut ratatui::Frame, area: Rect, frame: &MonitorFrame<'_>) {
    let y = &frame.viewport.temperature;
    let pwm_axis = &frame.viewport.pwm;
    let snapshot = frame.snapshot;

    let temperature = clamped(snapshot.series(Channel::Temperature), y);
    let setpoint = clamped(snapshot.series(Channel::Setpoint), y);
    let pwm = rescale(snapshot.series(Channel::PwmPercent), pwm_axis, y);

    let datasets = vec![
        line("PWM %", Color::DarkGray, &pwm),
        line("setpoint", Color::Green, &setpoint),
        line("temperature", Color::Red, &temperature),
    ];

    // Left labels carry both scales: °C and the PWM percentage at that height.
    let labels: Vec<String> = [0.0, 0.5, 1.0]
        .iter()
        .map(|frac| {
            format!(
                "{:.1} {:>3.0}%",
                y.min + frac * y.span(),
                pwm_axis.min + frac * pwm_axis.span()
            )
        })
        .collect();

    let chart = Chart::new(datasets)
        .block(panel(" Temperature °C / PWM % ".to_string()))
        .x_axis(time_axis(frame))
        .y_axis(
            Axis::default()
                .bounds(y.as_array())
                .labels(labels)
                .style(Style::default().fg(Color::DarkGray)),
        );
    f.render_widget(chart, area);
}

fn draw_pid(f: &mut ratatui::Frame, area: Rect, frame: &MonitorFrame<'_>) {
    let y = &frame.viewport.pid;
    let snapshot = frame.snapshot;

    let p = clamped(snapshot.series(Channel::PidP), y);
    let i = clamped(snapshot.series(Channel::PidI), y);
    let d = clamped(snapshot.series(Channel::PidD), y);

    let datasets = vec![
        line("P", Color::Cyan, &p),
        line("I", Color::Magenta, &i),
        line("D", Color::Blue, &d),
    ];

    let chart = Chart::new(datasets)
        .block(panel(" PID terms ".to_string()))
        .x_axis(time_axis(frame))
        .y_axis(
            Axis::default()
                .bounds(y.as_array())
                .labels(vec![
                    format!("{:.0}", y.min),
                    format!("{:.0}", y.min + y.span() / 2.0),
                    format!("{:.0}", y.max),
                ])
                .style(Style::default().fg(Color::DarkGray)),
        );
    f.render_widget(chart, area);
}

fn bounds_of(values: impl Iterator<Item = f64>) -> AxisBounds {
    let (lo, hi) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if !lo.is_finite() || !hi.is_finite() {
        AxisBounds::new(0.0, 1.0)
    } else if hi - lo < 1e-9 {
        AxisBounds::new(lo - 1.0, hi + 1.0)
    } else {
        AxisBounds::new(lo, hi)
    }
}

/// Magnitude and phase over log frequency, side by side.
fn draw_bode(f: &mut ratatui::Frame, area: Rect, analysis: &Analysis) {
    let cols = Layout::horizontal([Constraint::Ratio(1, 2), Constraint::Ratio(1, 2)]).split(area);
    let bode = &analysis.report.bode;

    let magnitude: Vec<(f64, f64)> = bode
        .iter()
        .map(|p| (p.omega.log10(), p.magnitude_db))
        .collect();
    let phase: Vec<(f64, f64)> = bode.iter().map(|p| (p.omega.log10(), p.phase_deg)).collect();

    let x = bounds_of(magnitude.iter().map(|(w, _)| *w));
    let x_labels = vec![
        format!("1e{:.0}", x.min),
        format!("1e{:.0}", x.max),
    ];

    let panels = [
        (" Bode magnitude dB ", magnitude, Color::Cyan),
        (" Bode phase ° ", phase, Color::Magenta),
    ];
    for (col, (title, points, color)) in cols.iter().zip(panels.iter()) {
        let y = bounds_of(points.iter().map(|(_, v)| *v));
        let chart = Chart::new(vec![Dataset::default()
            .marker(symbols::Marker::Braille)
            .graph_type(GraphType::Line)
            .style(Style::default().fg(*color))
            .data(points.as_slice())])
        .block(panel(title.to_string()))
        .x_axis(
            Axis::default()
                .title("rad/s")
                .bounds(x.as_array())
                .labels(x_labels.clone())
                .style(Style::default().fg(Color::DarkGray)),
        )
        .y_axis(
            Axis::default()
                .bounds(y.as_array())
                .labels(vec![format!("{:.0}", y.min), format!("{:.0}", y.max)])
                .style(Style::default().fg(Color::DarkGray)),
        );
        f.render_widget(chart, *col);
    }
}

fn notice_list<'a>(frame: &MonitorFrame<'_>) -> List<'a> {
    let items: Vec<ListItem> = frame
        .notices
        .iter()
        .map(|n| {
            let datetime: DateTime<Local> = n.timestamp.into();
            let color = match n.severity {
                Severity::Info => Color::Green,
                Severity::Warning => Color::Yellow,
                Severity::Error => Color::Red,
            };
            ListItem::new(Line::from(Span::styled(
                format!("[{}] {}", datetime.format("%H:%M:%S%.3f"), n.text),
                Style::default().fg(color),
            )))
        })
        .collect();
    List::new(items).block(panel(" Recent events ".to_string()))
}

fn footer<'a>(with_bode: bool) -> Paragraph<'a> {
    let text = if with_bode {
        "q/Esc to quit, b to toggle Bode plot"
    } else {
        "q/Esc to quit"
    };
    Paragraph::new(text).style(Style::default().fg(Color::DarkGray))
}
