//! Mapping of raw, schema-drifting citizen rows onto [`CitizenRecord`].
//!
//! Rows written by older schema versions use different column names for the
//! same attribute. Each [`CanonicalField`] carries its prioritised alias list;
//! the first alias holding a usable value wins and [`normalize`] is the only
//! place aliases are resolved.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

use crate::citizen::{CitizenRecord, RawRecord, Sex};

pub const NOT_AVAILABLE: &str = "N/A";
pub const DEFAULT_HEIGHT_CM: u32 = 170;
pub const DEFAULT_AUTHORITY: &str = "SIP / DAKAR-PLATEAU";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CanonicalField {
  Id,
  NationalId,
  FamilyName,
  GivenNames,
  BirthDate,
  BirthPlace,
  Sex,
  HeightCm,
  Profession,
  Address,
  Phone,
  Email,
  IssueDate,
  ExpirationDate,
  Authority,
  CardSeries,
  PhotoUrl,
  IrisLeftUrl,
  IrisRightUrl,
  Latitude,
  Longitude,
  OperatorId,
  EnrolledAt,
}

impl CanonicalField {
  /// Column names that may hold this attribute, most preferred first. The
  /// first entry is the current schema's name.
  pub const fn aliases(self) -> &'static [&'static str] {
    match self {
      Self::Id => &["id", "citizen_id"],
      Self::NationalId => {
        &["national_id", "cedeaonumber", "cni", "numero_cni", "numero_carte"]
      }
      Self::FamilyName => &["family_name", "nom", "last_name", "lastname"],
      Self::GivenNames => &["given_names", "prenoms", "first_name", "firstname"],
      Self::BirthDate => &["birth_date", "date_naissance", "date_of_birth"],
      Self::BirthPlace => &["birth_place", "lieu_naissance", "place_of_birth"],
      Self::Sex => &["sex", "sexe", "gender"],
      Self::HeightCm => &["height_cm", "taille_cm", "taille", "height"],
      Self::Profession => &["profession", "occupation", "job"],
      Self::Address => &["address", "adresse"],
      Self::Phone => &["phone", "telephone", "phone_number", "mobile"],
      Self::Email => &["email", "courriel"],
      Self::IssueDate => &["issue_date", "date_delivrance", "date_emission"],
      Self::ExpirationDate => {
        &["expiration_date", "date_expiration", "expiry_date"]
      }
      Self::Authority => &["authority", "autorite"],
      Self::CardSeries => &["card_series", "serie_carte", "serie"],
      Self::PhotoUrl => &["photo_url", "photo", "image_url"],
      Self::IrisLeftUrl => &["iris_left_url", "iris_gauche_url"],
      Self::IrisRightUrl => &["iris_right_url", "iris_droit_url"],
      Self::Latitude => &["latitude", "lat"],
      Self::Longitude => &["longitude", "lng", "lon"],
      Self::OperatorId => &["operator_id", "operateur_id"],
      Self::EnrolledAt => &["enrolled_at", "created_at", "date_enregistrement"],
    }
  }

  /// The first usable text value among this field's aliases.
  pub fn text(self, raw: &RawRecord) -> Option<String> {
    self.aliases().iter().find_map(|alias| text_value(raw.get(*alias)?))
  }

  /// The first usable numeric value among this field's aliases.
  pub fn number(self, raw: &RawRecord) -> Option<f64> {
    self.aliases().iter().find_map(|alias| number_value(raw.get(*alias)?))
  }
}

/// Empty strings, nulls and booleans count as absent.
fn text_value(value: &Value) -> Option<String> {
  match value {
    Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_owned()),
    Value::Number(n) => Some(n.to_string()),
    _ => None,
  }
}

fn number_value(value: &Value) -> Option<f64> {
  match value {
    Value::Number(n) => n.as_f64(),
    Value::String(s) => s.trim().parse().ok(),
    _ => None,
  }
}

/// The record's national ID, falling back to `ID-<row id>` for rows that
/// predate national IDs entirely.
pub fn national_id_of(raw: &RawRecord) -> String {
  CanonicalField::NationalId.text(raw).unwrap_or_else(|| {
    let id = CanonicalField::Id.text(raw);
    format!("ID-{}", id.as_deref().unwrap_or(NOT_AVAILABLE))
  })
}

/// Parse the stored enrollment timestamp in any of the shapes rows use.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
  if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
    return Some(dt.with_timezone(&Utc));
  }
  for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
      return Some(naive.and_utc());
    }
  }
  NaiveDate::parse_from_str(raw, "%Y-%m-%d")
    .ok()
    .and_then(|d| d.and_hms_opt(0, 0, 0))
    .map(|naive| naive.and_utc())
}

/// Map a raw row onto the canonical record. Never fails: absent fields take
/// their defaults, and `now` stands in for a missing enrollment timestamp.
pub fn normalize(raw: &RawRecord, now: DateTime<Utc>) -> CitizenRecord {
  use CanonicalField as F;

  let text = |field: F| field.text(raw).unwrap_or_else(|| NOT_AVAILABLE.to_owned());
  let optional = |field: F| field.text(raw);

  let enrolled_at = F::EnrolledAt
    .text(raw)
    .and_then(|s| parse_timestamp(&s))
    .unwrap_or(now);
  let today = now.with_timezone(&Local).date_naive();

  let sex = F::Sex
    .aliases()
    .iter()
    .filter_map(|alias| raw.get(*alias)?.as_str()?.trim().parse::<Sex>().ok())
    .next()
    .unwrap_or(Sex::M);

  let height_cm = F::HeightCm
    .number(raw)
    .filter(|h| *h > 0.0)
    .map(|h| h.round() as u32)
    .unwrap_or(DEFAULT_HEIGHT_CM);

  CitizenRecord {
    id: text(F::Id),
    national_id: national_id_of(raw),
    family_name: text(F::FamilyName),
    given_names: text(F::GivenNames),
    birth_date: text(F::BirthDate),
    birth_place: text(F::BirthPlace),
    sex,
    height_cm,
    profession: text(F::Profession),
    address: text(F::Address),
    phone: text(F::Phone),
    email: text(F::Email),
    issue_date: F::IssueDate
      .text(raw)
      .unwrap_or_else(|| today.format("%Y-%m-%d").to_string()),
    expiration_date: text(F::ExpirationDate),
    authority: F::Authority
      .text(raw)
      .unwrap_or_else(|| DEFAULT_AUTHORITY.to_owned()),
    card_series: text(F::CardSeries),
    photo_url: optional(F::PhotoUrl),
    iris_left_url: optional(F::IrisLeftUrl),
    iris_right_url: optional(F::IrisRightUrl),
    latitude: F::Latitude.number(raw),
    longitude: F::Longitude.number(raw),
    operator_id: optional(F::OperatorId),
    enrolled_today: enrolled_at.with_timezone(&Local).date_naive() == today,
    enrolled_at,
  }
}
