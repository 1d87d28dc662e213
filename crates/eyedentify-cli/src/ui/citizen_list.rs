//! Citizen directory list with search bar.

use ratatui::{
  Frame,
  layout::{Constraint, Direction, Layout, Rect},
  style::{Color, Modifier, Style},
  text::{Line, Span},
  widgets::{List, ListItem, ListState, Paragraph},
};

use super::{dim, pane};
use crate::app::App;

pub fn draw(f: &mut Frame, area: Rect, app: &App) {
  let list = &app.citizens;
  let rows = Layout::default()
    .direction(Direction::Vertical)
    .constraints([Constraint::Length(1), Constraint::Min(0)])
    .split(area);

  // Filter bar
  let mut bar = vec![
    Span::styled(" / ", Style::default().fg(Color::Cyan)),
    Span::raw(list.query.text.clone()),
  ];
  if list.searching {
    bar.push(Span::styled("_", Style::default().add_modifier(Modifier::SLOW_BLINK)));
  }
  bar.push(dim(format!("   sort: {}", list.query.sort)));
  if list.query.enrolled_today_only {
    bar.push(Span::styled("   today only", Style::default().fg(Color::Yellow)));
  }
  f.render_widget(Paragraph::new(Line::from(bar)), rows[0]);

  let visible = list.visible();
  let items: Vec<ListItem> = visible
    .iter()
    .map(|r| {
      ListItem::new(Line::from(vec![
        Span::styled(format!("{:<20}", r.national_id), Style::default().fg(Color::Cyan)),
        Span::raw(format!("{:<32}", r.full_name())),
        dim(r.enrolled_at.with_timezone(&chrono::Local).format("%d/%m/%Y").to_string()),
      ]))
    })
    .collect();

  let title = format!("Citizens ({}/{})", visible.len(), list.records.len());
  let widget = List::new(items)
    .block(pane(title))
    .highlight_style(
      Style::default()
        .bg(Color::Blue)
        .fg(Color::White)
        .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol("▶ ");

  let mut state = ListState::default();
  if !visible.is_empty() {
    state.select(Some(list.cursor.min(visible.len() - 1)));
  }
  f.render_stateful_widget(widget, rows[1], &mut state);
}
