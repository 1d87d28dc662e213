//! TUI rendering: header, screen body, status bar.

pub mod citizen_detail;
pub mod citizen_list;
pub mod dashboard;
pub mod enrollment;
pub mod history;
pub mod identification;
pub mod sign_in;

use chrono::Local;
use ratatui::{
  Frame,
  layout::{Constraint, Direction, Layout, Rect},
  style::{Color, Modifier, Style},
  text::{Line, Span},
  widgets::{Block, Paragraph},
};

use crate::app::{App, Screen};

const TABS: [(Screen, &str); 5] = [
  (Screen::Dashboard, "1 Dashboard"),
  (Screen::CitizenList, "2 Citizens"),
  (Screen::Enrollment, "3 Enroll"),
  (Screen::Identification, "4 Identify"),
  (Screen::History, "5 History"),
];

// ─── Root draw ────────────────────────────────────────────────────────────────

/// Main draw function called each frame.
pub fn draw(f: &mut Frame, app: &App) {
  let rows = Layout::default()
    .direction(Direction::Vertical)
    .constraints([
      Constraint::Length(1), // header
      Constraint::Min(0),    // body
      Constraint::Length(1), // status bar
    ])
    .split(f.area());

  draw_header(f, rows[0], app);
  match app.screen {
    Screen::SignIn => sign_in::draw(f, rows[1], app),
    Screen::Dashboard => dashboard::draw(f, rows[1], app),
    Screen::CitizenList => citizen_list::draw(f, rows[1], app),
    Screen::CitizenDetail => citizen_detail::draw(f, rows[1], app),
    Screen::Enrollment => enrollment::draw(f, rows[1], app),
    Screen::Identification => identification::draw(f, rows[1], app),
    Screen::History => history::draw(f, rows[1], app),
  }
  draw_status(f, rows[2], app);
}

// ─── Header ───────────────────────────────────────────────────────────────────

fn draw_header(f: &mut Frame, area: Rect, app: &App) {
  let date = Local::now().format("%Y-%m-%d").to_string();
  let user = app
    .session
    .current_user()
    .map(|u| u.label().to_owned())
    .unwrap_or_else(|| "not signed in".into());

  let mut spans = vec![Span::styled(
    " eyedentify ",
    Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
  )];
  if app.screen != Screen::SignIn {
    for (screen, label) in TABS {
      let active = app.screen == screen
        || (screen == Screen::CitizenList && app.screen == Screen::CitizenDetail);
      let style = if active {
        Style::default().fg(Color::Black).bg(Color::Cyan)
      } else {
        Style::default().fg(Color::Gray)
      };
      spans.push(Span::raw(" "));
      spans.push(Span::styled(format!(" {label} "), style));
    }
  }

  let right = format!("{user}  {date} ");
  let used: usize = spans.iter().map(|s| s.content.chars().count()).sum();
  let pad = (area.width as usize)
    .saturating_sub(used)
    .saturating_sub(right.chars().count());
  spans.push(Span::raw(" ".repeat(pad)));
  spans.push(Span::styled(right, Style::default().fg(Color::Gray)));

  let block = Block::default().style(Style::default().bg(Color::DarkGray));
  let inner = block.inner(area);
  f.render_widget(block, area);
  f.render_widget(Paragraph::new(Line::from(spans)), inner);
}

// ─── Status bar ───────────────────────────────────────────────────────────────

fn draw_status(f: &mut Frame, area: Rect, app: &App) {
  let (mode_label, hints) = match app.screen {
    Screen::SignIn => ("SIGN IN", "Tab switch field  Enter sign in  Esc quit"),
    Screen::Dashboard => ("HOME", "1-5 screens  g refresh  o sign out  q quit"),
    Screen::CitizenList if app.citizens.searching => {
      ("SEARCH", "Type to filter  Esc clear  Enter done")
    }
    Screen::CitizenList => (
      "CITIZENS",
      "↑↓/jk move  / search  s sort  t today  Enter detail  g reload",
    ),
    Screen::CitizenDetail => ("DETAIL", "Esc back"),
    Screen::Enrollment => ("ENROLL", "Enter continue  Esc leave  Ctrl-D discard draft"),
    Screen::Identification => ("IDENTIFY", "Enter scan  Esc leave"),
    Screen::History if app.history.searching => {
      ("SEARCH", "Operator or national ID  Enter done  Esc clear")
    }
    Screen::History => ("HISTORY", "p period  t type  r result  / search  ↑↓ move"),
  };

  let status = if app.status_msg.is_empty() {
    hints.to_string()
  } else {
    app.status_msg.clone()
  };

  let line = Line::from(vec![
    Span::styled(
      format!(" {mode_label} "),
      Style::default()
        .fg(Color::Black)
        .bg(Color::Cyan)
        .add_modifier(Modifier::BOLD),
    ),
    Span::styled(format!("  {status}"), Style::default().fg(Color::DarkGray)),
  ]);
  f.render_widget(
    Paragraph::new(line).style(Style::default().bg(Color::Black)),
    area,
  );
}

/// A bordered block with a dim frame, shared by every pane.
pub(crate) fn pane(title: impl Into<String>) -> Block<'static> {
  Block::default()
    .title(format!(" {} ", title.into()))
    .borders(ratatui::widgets::Borders::ALL)
    .border_style(Style::default().fg(Color::DarkGray))
}

/// `label  value` with a fixed-width cyan label.
pub(crate) fn field_line(label: &str, value: impl Into<String>) -> Line<'static> {
  Line::from(vec![
    Span::styled(
      format!("{label:<16}"),
      Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
    ),
    Span::raw(value.into()),
  ])
}

pub(crate) fn dim(text: impl Into<String>) -> Span<'static> {
  Span::styled(text.into(), Style::default().fg(Color::DarkGray))
}
