//! Conversions between SQLite rows and the JSON-shaped records the core
//! works with.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings (microseconds, `Z`)
//! so they sort lexically; calendar dates as `YYYY-MM-DD`.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use eyedentify_core::citizen::{Operator, RawRecord};
use rusqlite::types::ValueRef;
use serde_json::{Number, Value};

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

/// `[A-Za-z_][A-Za-z0-9_]*`; anything else is never interpolated into SQL.
pub fn is_identifier(s: &str) -> bool {
  let mut chars = s.chars();
  chars
    .next()
    .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
    && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn value_to_json(value: ValueRef<'_>) -> Value {
  match value {
    ValueRef::Null | ValueRef::Blob(_) => Value::Null,
    ValueRef::Integer(i) => Value::Number(i.into()),
    ValueRef::Real(f) => Number::from_f64(f).map_or(Value::Null, Value::Number),
    ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
  }
}

/// Read every column of `row` into a JSON object keyed by column name.
pub fn read_row(
  row: &rusqlite::Row<'_>,
  columns: &[String],
) -> rusqlite::Result<RawRecord> {
  let mut record = RawRecord::new();
  for (i, name) in columns.iter().enumerate() {
    record.insert(name.clone(), value_to_json(row.get_ref(i)?));
  }
  Ok(record)
}

/// A row from the `operators` table before conversion.
pub struct RawOperator {
  pub user_id:       String,
  pub email:         String,
  pub display_name:  String,
  pub password_hash: String,
}

impl RawOperator {
  pub const COLUMNS: &'static str = "user_id, email, display_name, password_hash";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      user_id:       row.get(0)?,
      email:         row.get(1)?,
      display_name:  row.get(2)?,
      password_hash: row.get(3)?,
    })
  }

  pub fn into_operator(self) -> Operator {
    Operator {
      user_id:      self.user_id,
      email:        self.email,
      display_name: self.display_name,
    }
  }
}
