//! Dashboard: citizen counts, audit totals, latest operations.

use ratatui::{
  Frame,
  layout::{Constraint, Layout, Rect},
  style::{Color, Style},
  text::{Line, Span},
  widgets::Paragraph,
};

use super::{dim, field_line, history::result_style, pane};
use crate::app::App;

pub fn draw(f: &mut Frame, area: Rect, app: &App) {
  let [top, bottom] =
    Layout::vertical([Constraint::Length(8), Constraint::Min(0)]).areas(area);
  let [left, right] =
    Layout::horizontal([Constraint::Percentage(50), Constraint::Percentage(50)]).areas(top);

  let c = &app.dashboard.citizens;
  let citizens = vec![
    field_line("Total", c.total.to_string()),
    field_line("Enrolled today", c.enrolled_today.to_string()),
    field_line("Male", c.male.to_string()),
    field_line("Female", c.female.to_string()),
  ];
  let block = pane("Citizens");
  f.render_widget(Paragraph::new(citizens).block(block), left);

  let a = &app.dashboard.audit;
  let audit = vec![
    field_line("Operations", a.total.to_string()),
    field_line("Today", a.today.to_string()),
    field_line("Success", a.success.to_string()),
    field_line("Not found", a.not_found.to_string()),
    field_line("Errors", a.error.to_string()),
  ];
  f.render_widget(Paragraph::new(audit).block(pane("Operations")), right);

  let recent: Vec<Line> = if app.dashboard.recent.is_empty() {
    vec![Line::from(dim("No operations recorded yet."))]
  } else {
    app
      .dashboard
      .recent
      .iter()
      .map(|op| {
        Line::from(vec![
          dim(format!("{}  ", op.recorded_at.with_timezone(&chrono::Local).format("%d/%m %H:%M"))),
          Span::styled(format!("{:<15}", op.kind.to_string()), Style::default().fg(Color::Cyan)),
          Span::styled(format!("{:<10}", op.result.to_string()), result_style(op.result)),
          Span::raw(op.national_id.clone().unwrap_or_default()),
        ])
      })
      .collect()
  };
  f.render_widget(Paragraph::new(recent).block(pane("Recent operations")), bottom);
}
