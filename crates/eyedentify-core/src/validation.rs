//! Field-level validation for the biographic step of the enrollment wizard.
//!
//! Every field is checked; failures are collected per field rather than
//! stopping at the first one so the form can show them all at once.

use std::{collections::BTreeMap, fmt};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::citizen::Sex;

pub const MIN_NAME_CHARS: usize = 2;
pub const MIN_ADDRESS_CHARS: usize = 10;
pub const MIN_PHONE_CHARS: usize = 9;
pub const HEIGHT_RANGE_CM: std::ops::RangeInclusive<u16> = 30..=272;

/// The biographic form exactly as typed by the operator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BiographicForm {
  pub given_names: String,
  pub family_name: String,
  /// `YYYY-MM-DD`.
  pub birth_date:  String,
  pub birth_place: String,
  pub sex:         String,
  pub address:     String,
  pub phone:       String,
  pub email:       String,
  pub height_cm:   String,
  pub profession:  String,
  pub consent:     bool,
}

/// Validated biographic data, stored in the enrollment draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiographicData {
  pub given_names: String,
  pub family_name: String,
  pub birth_date:  NaiveDate,
  pub birth_place: String,
  pub sex:         Sex,
  pub address:     String,
  pub phone:       String,
  pub email:       Option<String>,
  pub height_cm:   u16,
  pub profession:  String,
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  PartialOrd,
  Ord,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Field {
  GivenNames,
  FamilyName,
  BirthDate,
  BirthPlace,
  Sex,
  Address,
  Phone,
  Email,
  HeightCm,
  Profession,
  Consent,
}

impl Field {
  pub fn label(self) -> &'static str {
    match self {
      Self::GivenNames => "Given names",
      Self::FamilyName => "Family name",
      Self::BirthDate => "Birth date",
      Self::BirthPlace => "Birth place",
      Self::Sex => "Sex",
      Self::Address => "Address",
      Self::Phone => "Phone",
      Self::Email => "Email",
      Self::HeightCm => "Height (cm)",
      Self::Profession => "Profession",
      Self::Consent => "Consent",
    }
  }
}

/// Field-scoped validation failures.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationErrors(BTreeMap<Field, String>);

impl ValidationErrors {
  pub fn is_empty(&self) -> bool { self.0.is_empty() }

  pub fn len(&self) -> usize { self.0.len() }

  pub fn get(&self, field: Field) -> Option<&str> {
    self.0.get(&field).map(String::as_str)
  }

  pub fn iter(&self) -> impl Iterator<Item = (Field, &str)> {
    self.0.iter().map(|(f, m)| (*f, m.as_str()))
  }

  fn add(&mut self, field: Field, message: impl Into<String>) {
    self.0.entry(field).or_insert_with(|| message.into());
  }
}

impl fmt::Display for ValidationErrors {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for (i, (field, message)) in self.iter().enumerate() {
      if i > 0 {
        f.write_str("; ")?;
      }
      write!(f, "{field}: {message}")?;
    }
    Ok(())
  }
}

impl BiographicForm {
  /// Validate against the calendar date `today` (birth dates may not be in
  /// the future).
  pub fn validate(
    &self,
    today: NaiveDate,
  ) -> Result<BiographicData, ValidationErrors> {
    let mut errors = ValidationErrors::default();

    let given_names = min_chars(
      &mut errors,
      Field::GivenNames,
      &self.given_names,
      MIN_NAME_CHARS,
      "Given names must contain at least 2 characters",
    );
    let family_name = min_chars(
      &mut errors,
      Field::FamilyName,
      &self.family_name,
      MIN_NAME_CHARS,
      "Family name must contain at least 2 characters",
    );
    let birth_place = min_chars(
      &mut errors,
      Field::BirthPlace,
      &self.birth_place,
      MIN_NAME_CHARS,
      "Birth place is required",
    );
    let address = min_chars(
      &mut errors,
      Field::Address,
      &self.address,
      MIN_ADDRESS_CHARS,
      "The full address is required",
    );
    let phone = min_chars(
      &mut errors,
      Field::Phone,
      &self.phone,
      MIN_PHONE_CHARS,
      "Phone number is invalid",
    );
    let profession = min_chars(
      &mut errors,
      Field::Profession,
      &self.profession,
      MIN_NAME_CHARS,
      "Profession is required",
    );

    let birth_date = match self.birth_date.trim() {
      "" => {
        errors.add(Field::BirthDate, "Birth date is required");
        None
      }
      raw => match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        Ok(d) if d > today => {
          errors.add(Field::BirthDate, "Birth date cannot be in the future");
          None
        }
        Ok(d) => Some(d),
        Err(_) => {
          errors.add(Field::BirthDate, "Birth date must be written YYYY-MM-DD");
          None
        }
      },
    };

    let sex = match self.sex.trim().to_ascii_uppercase().as_str() {
      "M" => Some(Sex::M),
      "F" => Some(Sex::F),
      _ => {
        errors.add(Field::Sex, "Sex must be M or F");
        None
      }
    };

    let email = match self.email.trim() {
      "" => None,
      raw if looks_like_email(raw) => Some(raw.to_owned()),
      _ => {
        errors.add(Field::Email, "Email is invalid");
        None
      }
    };

    let height_cm = match self.height_cm.trim() {
      "" => {
        errors.add(Field::HeightCm, "Height is required");
        None
      }
      raw => match raw.parse::<u16>() {
        Ok(h) if HEIGHT_RANGE_CM.contains(&h) => Some(h),
        _ => {
          errors.add(
            Field::HeightCm,
            "Height must be a whole number of centimetres between 30 and 272",
          );
          None
        }
      },
    };

    if !self.consent {
      errors.add(
        Field::Consent,
        "Consent to the processing of personal data is required",
      );
    }

    match (
      given_names,
      family_name,
      birth_date,
      birth_place,
      sex,
      address,
      phone,
      height_cm,
      profession,
    ) {
      (
        Some(given_names),
        Some(family_name),
        Some(birth_date),
        Some(birth_place),
        Some(sex),
        Some(address),
        Some(phone),
        Some(height_cm),
        Some(profession),
      ) if errors.is_empty() => Ok(BiographicData {
        given_names,
        family_name,
        birth_date,
        birth_place,
        sex,
        address,
        phone,
        email,
        height_cm,
        profession,
      }),
      _ => Err(errors),
    }
  }
}

fn min_chars(
  errors: &mut ValidationErrors,
  field: Field,
  raw: &str,
  min: usize,
  message: &str,
) -> Option<String> {
  let trimmed = raw.trim();
  if trimmed.chars().count() < min {
    errors.add(field, message);
    return None;
  }
  Some(trimmed.to_owned())
}

fn looks_like_email(raw: &str) -> bool {
  if raw.chars().any(char::is_whitespace) {
    return false;
  }
  let Some((local, domain)) = raw.split_once('@') else {
    return false;
  };
  !local.is_empty()
    && !domain.contains('@')
    && domain
      .split_once('.')
      .is_some_and(|(host, _)| !host.is_empty())
    && !domain.ends_with('.')
}
