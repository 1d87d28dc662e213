//! Read-only view of one citizen record.

use ratatui::{
  Frame,
  layout::Rect,
  text::Line,
  widgets::{Paragraph, Wrap},
};

use super::{dim, field_line, pane};
use crate::app::App;

pub fn draw(f: &mut Frame, area: Rect, app: &App) {
  let Some(r) = &app.detail else {
    f.render_widget(
      Paragraph::new(Line::from(dim("No citizen selected."))).block(pane("Citizen")),
      area,
    );
    return;
  };

  let opt = |v: &Option<String>| v.clone().unwrap_or_else(|| "—".into());
  let mut lines = vec![
    field_line("National ID", r.national_id.clone()),
    field_line("Card series", r.card_series.clone()),
    Line::from(""),
    field_line("Family name", r.family_name.clone()),
    field_line("Given names", r.given_names.clone()),
    field_line("Born", format!("{} in {}", r.birth_date, r.birth_place)),
    field_line("Sex", r.sex.to_string()),
    field_line("Height", format!("{} cm", r.height_cm)),
    field_line("Profession", r.profession.clone()),
    Line::from(""),
    field_line("Address", r.address.clone()),
    field_line("Phone", r.phone.clone()),
    field_line("Email", r.email.clone()),
    Line::from(""),
    field_line("Issued", r.issue_date.clone()),
    field_line("Expires", r.expiration_date.clone()),
    field_line("Authority", r.authority.clone()),
    field_line(
      "Enrolled",
      r.enrolled_at
        .with_timezone(&chrono::Local)
        .format("%d/%m/%Y %H:%M")
        .to_string(),
    ),
    Line::from(""),
    field_line("Photo", opt(&r.photo_url)),
    field_line("Left iris", opt(&r.iris_left_url)),
    field_line("Right iris", opt(&r.iris_right_url)),
  ];
  if let (Some(lat), Some(lon)) = (r.latitude, r.longitude) {
    lines.push(field_line("Location", format!("{lat:.4}, {lon:.4}")));
  }

  f.render_widget(
    Paragraph::new(lines)
      .block(pane(r.full_name()))
      .wrap(Wrap { trim: false }),
    area,
  );
}
