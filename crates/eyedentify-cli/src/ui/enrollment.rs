//! Four-step enrollment wizard.

use eyedentify_core::wizard::{EnrollmentState, WizardStep};
use ratatui::{
  Frame,
  layout::{Constraint, Layout, Rect},
  style::{Color, Modifier, Style},
  text::{Line, Span},
  widgets::{Gauge, Paragraph, Wrap},
};
use strum::IntoEnumIterator;

use super::{dim, field_line, pane};
use crate::app::{App, FORM_FIELDS, form_text};

pub fn draw(f: &mut Frame, area: Rect, app: &App) {
  let [steps, body, footer] = Layout::vertical([
    Constraint::Length(1),
    Constraint::Min(0),
    Constraint::Length(1),
  ])
  .areas(area);

  draw_steps(f, steps, &app.enrollment.state);

  match &app.enrollment.state {
    EnrollmentState::Active(WizardStep::CollectingData) => draw_form(f, body, app),
    EnrollmentState::Active(WizardStep::CapturingPhoto) => draw_photo(f, body, app),
    EnrollmentState::Active(WizardStep::ScanningIris) => draw_scan(f, body, app),
    EnrollmentState::Active(WizardStep::Finalizing) => draw_confirm(f, body, app),
    EnrollmentState::Succeeded { national_id, record } => {
      let lines = vec![
        Line::styled(
          "Enrollment complete",
          Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
        ),
        Line::from(""),
        field_line("National ID", national_id.to_string()),
        field_line("Name", record.full_name()),
        field_line("Expires", record.expiration_date.clone()),
        Line::from(""),
        Line::from(dim("n  start a new enrollment")),
      ];
      f.render_widget(Paragraph::new(lines).block(pane("Result")), body);
    }
    EnrollmentState::Failed { message } => {
      let lines = vec![
        Line::styled(
          "Enrollment failed",
          Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        ),
        Line::from(""),
        Line::from(message.clone()),
        Line::from(""),
        Line::from(dim("r  retry from the earliest incomplete step")),
      ];
      f.render_widget(
        Paragraph::new(lines).block(pane("Result")).wrap(Wrap { trim: false }),
        body,
      );
    }
  }

  let message = match &app.enrollment.message {
    Some(m) => Span::styled(format!(" {m}"), Style::default().fg(Color::Yellow)),
    None => Span::raw(""),
  };
  f.render_widget(Paragraph::new(Line::from(message)), footer);
}

fn draw_steps(f: &mut Frame, area: Rect, state: &EnrollmentState) {
  let current = state.step();
  let mut spans = Vec::new();
  for step in WizardStep::iter() {
    let style = match current {
      Some(c) if c == step => Style::default().fg(Color::Black).bg(Color::Cyan),
      Some(c) if step < c => Style::default().fg(Color::Green),
      None => Style::default().fg(Color::Green),
      _ => Style::default().fg(Color::DarkGray),
    };
    spans.push(Span::styled(format!(" {}. {} ", step.number(), step), style));
    spans.push(Span::raw(" "));
  }
  f.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn draw_form(f: &mut Frame, area: Rect, app: &App) {
  let e = &app.enrollment;
  let mut lines = Vec::with_capacity(FORM_FIELDS.len() * 2);
  for (i, field) in FORM_FIELDS.iter().enumerate() {
    let focused = i == e.field;
    let marker = if focused { "▶ " } else { "  " };
    let label_style = if focused {
      Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
    } else {
      Style::default().fg(Color::Cyan)
    };
    let mut value = form_text(&e.form, *field);
    if focused && *field != eyedentify_core::validation::Field::Consent {
      value.push('_');
    }
    lines.push(Line::from(vec![
      Span::raw(marker),
      Span::styled(format!("{:<16}", field.label()), label_style),
      Span::raw(value),
    ]));
    if let Some(error) = e.errors.get(*field) {
      lines.push(Line::styled(
        format!("{:18}{error}", ""),
        Style::default().fg(Color::Red),
      ));
    }
  }
  lines.push(Line::from(""));
  lines.push(Line::from(dim(
    "Tab/↑↓ move  Space toggle consent  Enter validate  Date: YYYY-MM-DD  Sex: M/F",
  )));
  f.render_widget(Paragraph::new(lines).block(pane("Personal data")), area);
}

fn draw_photo(f: &mut Frame, area: Rect, app: &App) {
  let e = &app.enrollment;
  let mut lines = vec![
    Line::from("Path of the captured portrait (JPEG, PNG or WebP):"),
    Line::from(""),
    Line::from(vec![
      Span::styled(" > ", Style::default().fg(Color::Cyan)),
      Span::raw(format!("{}_", e.photo_path)),
    ]),
  ];
  if e.busy() {
    lines.push(Line::from(""));
    lines.push(Line::from(dim("Uploading…")));
  }
  f.render_widget(Paragraph::new(lines).block(pane("Photo")), area);
}

fn draw_scan(f: &mut Frame, area: Rect, app: &App) {
  let e = &app.enrollment;
  let [text, gauge] =
    Layout::vertical([Constraint::Min(0), Constraint::Length(3)]).areas(area);

  let mut lines = Vec::new();
  match (&e.progress, e.scanning()) {
    (Some(p), true) => {
      lines.push(Line::from(format!("Step {}/{}: {}", p.step + 1, p.total, p.message)));
    }
    (_, true) => lines.push(Line::from("Starting scanner…")),
    (_, false) => lines.push(Line::from(dim("Press Enter to start the iris scan."))),
  }
  f.render_widget(Paragraph::new(lines).block(pane("Iris scan")), text);

  let percent = e.progress.as_ref().map_or(0, |p| p.percent);
  f.render_widget(
    Gauge::default()
      .block(pane("Progress"))
      .gauge_style(Style::default().fg(Color::Cyan))
      .percent(u16::from(percent.min(100))),
    gauge,
  );
}

fn draw_confirm(f: &mut Frame, area: Rect, app: &App) {
  let e = &app.enrollment;
  let form = &e.form;
  let mut lines = vec![
    field_line("Name", format!("{} {}", form.given_names, form.family_name)),
    field_line("Born", format!("{} in {}", form.birth_date, form.birth_place)),
    field_line("Sex", form.sex.clone()),
    field_line("Address", form.address.clone()),
    field_line("Phone", form.phone.clone()),
  ];
  if let Some(iris) = &e.iris {
    lines.push(field_line(
      "Iris quality",
      format!("{} ({}%)", iris.quality, iris.metrics.overall),
    ));
  }
  lines.push(Line::from(""));
  lines.push(if e.busy() {
    Line::from(dim("Submitting…"))
  } else {
    Line::from(dim("Enter  submit the enrollment"))
  });
  f.render_widget(Paragraph::new(lines).block(pane("Confirmation")), area);
}
