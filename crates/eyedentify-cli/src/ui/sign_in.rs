//! Operator sign-in form.

use ratatui::{
  Frame,
  layout::{Constraint, Flex, Layout, Rect},
  style::{Color, Style},
  text::Line,
  widgets::Paragraph,
};

use super::{dim, field_line, pane};
use crate::app::App;

pub fn draw(f: &mut Frame, area: Rect, app: &App) {
  let [row] = Layout::vertical([Constraint::Length(8)])
    .flex(Flex::Center)
    .areas(area);
  let [boxed] = Layout::horizontal([Constraint::Length(56)])
    .flex(Flex::Center)
    .areas(row);

  let form = &app.sign_in;
  let cursor = |focused: bool| if focused { "_" } else { "" };
  let mut lines = vec![
    field_line("Email", format!("{}{}", form.email, cursor(!form.password_focus))),
    field_line(
      "Password",
      format!("{}{}", "•".repeat(form.password.chars().count()), cursor(form.password_focus)),
    ),
    Line::from(""),
  ];
  match &form.error {
    Some(error) => lines.push(Line::styled(error.clone(), Style::default().fg(Color::Red))),
    None => lines.push(Line::from(dim("Sign in with your operator account."))),
  }

  let block = pane("Sign in");
  let inner = block.inner(boxed);
  f.render_widget(block, boxed);
  f.render_widget(Paragraph::new(lines), inner);
}
