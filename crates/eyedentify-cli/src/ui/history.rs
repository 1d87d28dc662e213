//! Audit history with period, type, result and text filters.

use eyedentify_core::audit::OperationResult;
use ratatui::{
  Frame,
  layout::{Constraint, Layout, Rect},
  style::{Color, Modifier, Style},
  text::{Line, Span},
  widgets::{List, ListItem, ListState, Paragraph},
};

use super::{dim, pane};
use crate::app::App;

pub(crate) fn result_style(result: OperationResult) -> Style {
  match result {
    OperationResult::Success => Style::default().fg(Color::Green),
    OperationResult::NotFound => Style::default().fg(Color::Yellow),
    OperationResult::Error => Style::default().fg(Color::Red),
  }
}

pub fn draw(f: &mut Frame, area: Rect, app: &App) {
  let h = &app.history;
  let [bar, body, detail] = Layout::vertical([
    Constraint::Length(1),
    Constraint::Min(0),
    Constraint::Length(3),
  ])
  .areas(area);

  let filter = &h.filter;
  let mut spans = vec![
    dim(" period: "),
    Span::raw(filter.period.label()),
    dim("  type: "),
    Span::raw(filter.kind.map_or_else(|| "all".to_owned(), |k| k.to_string())),
    dim("  result: "),
    Span::raw(filter.result.map_or_else(|| "all".to_owned(), |r| r.to_string())),
    dim("  / "),
    Span::raw(h.search.clone()),
  ];
  if h.searching {
    spans.push(Span::styled("_", Style::default().add_modifier(Modifier::SLOW_BLINK)));
  }
  f.render_widget(Paragraph::new(Line::from(spans)), bar);

  let entries = app.history_entries();
  let items: Vec<ListItem> = entries
    .iter()
    .map(|op| {
      ListItem::new(Line::from(vec![
        dim(format!(
          "{}  ",
          op.recorded_at.with_timezone(&chrono::Local).format("%d/%m/%Y %H:%M:%S")
        )),
        Span::styled(format!("{:<15}", op.kind.to_string()), Style::default().fg(Color::Cyan)),
        Span::styled(format!("{:<10}", op.result.to_string()), result_style(op.result)),
        Span::raw(format!("{:<22}", op.national_id.as_deref().unwrap_or("—"))),
        Span::raw(op.operator.clone()),
      ]))
    })
    .collect();

  let widget = List::new(items)
    .block(pane(format!("History ({})", entries.len())))
    .highlight_style(Style::default().bg(Color::Blue).fg(Color::White))
    .highlight_symbol("▶ ");
  let mut state = ListState::default();
  if !entries.is_empty() {
    state.select(Some(h.cursor.min(entries.len() - 1)));
  }
  f.render_stateful_widget(widget, body, &mut state);

  let selected = entries.get(h.cursor.min(entries.len().saturating_sub(1)));
  let line = match selected {
    Some(op) => {
      let duration = op
        .duration_secs
        .map(|d| format!("{d:.1}s"))
        .unwrap_or_else(|| "—".into());
      let details = op.details.as_ref().map(|d| d.to_string()).unwrap_or_default();
      Line::from(vec![dim("duration "), Span::raw(duration), dim("  "), Span::raw(details)])
    }
    None => Line::from(dim("No operations match these filters.")),
  };
  f.render_widget(Paragraph::new(line).block(pane("Details")), detail);
}
