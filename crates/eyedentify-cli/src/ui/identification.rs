//! Iris identification screen.

use ratatui::{
  Frame,
  layout::{Constraint, Layout, Rect},
  style::{Color, Modifier, Style},
  text::Line,
  widgets::{Gauge, Paragraph},
};

use super::{dim, field_line, pane};
use crate::app::{App, IdentifyPhase};

pub fn draw(f: &mut Frame, area: Rect, app: &App) {
  let id = &app.identification;
  let [text, gauge] =
    Layout::vertical([Constraint::Min(0), Constraint::Length(3)]).areas(area);

  let lines = match &id.phase {
    IdentifyPhase::Idle => vec![Line::from(dim(
      "Ask the citizen to face the scanner, then press Enter.",
    ))],
    IdentifyPhase::Scanning => match &id.progress {
      Some(p) if p.percent >= 100 => vec![Line::from("Searching the directory…")],
      Some(p) => vec![Line::from(format!("Step {}/{}: {}", p.step + 1, p.total, p.message))],
      None => vec![Line::from("Starting scanner…")],
    },
    IdentifyPhase::Matched(r) => vec![
      Line::styled(
        "Match found",
        Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
      ),
      Line::from(""),
      field_line("National ID", r.national_id.clone()),
      field_line("Name", r.full_name()),
      field_line("Born", format!("{} in {}", r.birth_date, r.birth_place)),
      field_line("Address", r.address.clone()),
      Line::from(""),
      Line::from(dim("Enter  scan again")),
    ],
    IdentifyPhase::NoMatch => vec![
      Line::styled(
        "No match",
        Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
      ),
      Line::from(""),
      Line::from("The iris was not found in the directory."),
      Line::from(dim("Enter  scan again")),
    ],
    IdentifyPhase::Failed(e) => vec![
      Line::styled("Identification failed", Style::default().fg(Color::Red)),
      Line::from(e.clone()),
      Line::from(dim("Enter  try again")),
    ],
  };
  f.render_widget(Paragraph::new(lines).block(pane("Identification")), text);

  let percent = match &id.phase {
    IdentifyPhase::Scanning => id.progress.as_ref().map_or(0, |p| p.percent),
    IdentifyPhase::Idle => 0,
    _ => 100,
  };
  f.render_widget(
    Gauge::default()
      .block(pane("Scan"))
      .gauge_style(Style::default().fg(Color::Cyan))
      .percent(u16::from(percent.min(100))),
    gauge,
  );
}
