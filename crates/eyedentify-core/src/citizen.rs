//! Citizen records: the insert payload, the normalized read model, and the
//! operators who enroll them.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::national_id::NationalId;

/// A citizen row exactly as the record store returned it. Column names vary
/// across schema versions; see [`crate::normalize`].
pub type RawRecord = serde_json::Map<String, serde_json::Value>;

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
)]
#[strum(ascii_case_insensitive)]
pub enum Sex {
  M,
  F,
}

// ─── Insert payload ──────────────────────────────────────────────────────────

/// The canonical record written once at the end of an enrollment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCitizen {
  pub national_id:     NationalId,
  pub family_name:     String,
  pub given_names:     String,
  pub birth_date:      NaiveDate,
  pub birth_place:     String,
  pub sex:             Sex,
  pub height_cm:       u16,
  pub profession:      String,
  pub address:         String,
  pub phone:           String,
  pub email:           Option<String>,
  pub issue_date:      NaiveDate,
  pub expiration_date: NaiveDate,
  pub authority:       String,
  pub card_series:     String,
  pub photo_url:       Option<String>,
  pub iris_left_url:   Option<String>,
  pub iris_right_url:  Option<String>,
  pub latitude:        Option<f64>,
  pub longitude:       Option<f64>,
  /// `user_id` of the enrolling [`Operator`].
  pub operator_id:     String,
}

// ─── Read model ──────────────────────────────────────────────────────────────

/// A citizen record after alias resolution and defaulting. Text fields that
/// were absent hold [`crate::normalize::NOT_AVAILABLE`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CitizenRecord {
  pub id:              String,
  pub national_id:     String,
  pub family_name:     String,
  pub given_names:     String,
  pub birth_date:      String,
  pub birth_place:     String,
  pub sex:             Sex,
  pub height_cm:       u32,
  pub profession:      String,
  pub address:         String,
  pub phone:           String,
  pub email:           String,
  pub issue_date:      String,
  pub expiration_date: String,
  pub authority:       String,
  pub card_series:     String,
  pub photo_url:       Option<String>,
  pub iris_left_url:   Option<String>,
  pub iris_right_url:  Option<String>,
  pub latitude:        Option<f64>,
  pub longitude:       Option<f64>,
  pub operator_id:     Option<String>,
  pub enrolled_at:     DateTime<Utc>,
  pub enrolled_today:  bool,
}

impl CitizenRecord {
  /// `"<given names> <family name>"`.
  pub fn full_name(&self) -> String {
    format!("{} {}", self.given_names, self.family_name)
  }

  /// `"<family name> <given names>"`, the key the directory sorts names by.
  pub fn sort_name(&self) -> String {
    format!("{} {}", self.family_name, self.given_names)
  }

  pub fn coordinates(&self) -> Option<(f64, f64)> {
    Some((self.latitude?, self.longitude?))
  }
}

// ─── Operators ───────────────────────────────────────────────────────────────

/// A registered enrollment operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operator {
  pub user_id:      String,
  pub email:        String,
  pub display_name: String,
}

/// An operator together with its stored argon2 password hash.
#[derive(Debug, Clone)]
pub struct OperatorAccount {
  pub operator:      Operator,
  pub password_hash: String,
}
