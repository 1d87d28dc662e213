//! The `SN-<year>-<sequence>` national identity number.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::Error;

pub const PREFIX: &str = "SN";
/// Minimum number of digits in the sequence part; longer sequences are
/// printed unpadded.
pub const SEQUENCE_WIDTH: usize = 6;

/// A national identity number issued by the allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NationalId {
  year:     i32,
  sequence: u32,
}

impl NationalId {
  pub fn new(year: i32, sequence: u32) -> Self { Self { year, sequence } }

  pub fn year(&self) -> i32 { self.year }

  pub fn sequence(&self) -> u32 { self.sequence }

  /// The identifier immediately after this one in the same year.
  pub fn next(&self) -> Self {
    Self::new(self.year, self.sequence.saturating_add(1))
  }

  /// The sequence number of `raw` when it is an identifier issued in `year`.
  ///
  /// Anything that does not match `SN-<year>-<digits>` exactly yields `None`.
  pub fn sequence_for_year(raw: &str, year: i32) -> Option<u32> {
    let id: NationalId = raw.trim().parse().ok()?;
    (id.year == year).then_some(id.sequence)
  }
}

impl fmt::Display for NationalId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "{PREFIX}-{:04}-{:0width$}",
      self.year,
      self.sequence,
      width = SEQUENCE_WIDTH
    )
  }
}

impl FromStr for NationalId {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let invalid = || Error::InvalidNationalId(s.to_owned());
    let rest = s
      .strip_prefix(PREFIX)
      .and_then(|r| r.strip_prefix('-'))
      .ok_or_else(invalid)?;
    let (year, sequence) = rest.split_once('-').ok_or_else(invalid)?;

    let all_digits = |p: &str| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit());
    if year.len() != 4 || !all_digits(year) || !all_digits(sequence) {
      return Err(invalid());
    }

    Ok(Self {
      year:     year.parse().map_err(|_| invalid())?,
      sequence: sequence.parse().map_err(|_| invalid())?,
    })
  }
}

impl Serialize for NationalId {
  fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(self)
  }
}

impl<'de> Deserialize<'de> for NationalId {
  fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
    let raw = String::deserialize(d)?;
    raw.parse().map_err(serde::de::Error::custom)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn formats_with_zero_padded_sequence() {
    assert_eq!(NationalId::new(2025, 42).to_string(), "SN-2025-000042");
    assert_eq!(NationalId::new(2025, 1_234_567).to_string(), "SN-2025-1234567");
  }

  #[test]
  fn parses_what_it_prints() {
    let id: NationalId = "SN-2024-000123".parse().unwrap();
    assert_eq!(id.year(), 2024);
    assert_eq!(id.sequence(), 123);
    assert_eq!(id.next().to_string(), "SN-2024-000124");
  }

  #[test]
  fn rejects_malformed_identifiers() {
    for bad in ["", "SN-2024", "SN-24-000001", "XX-2024-000001", "SN-2024-", "SN-2024-12a"] {
      assert!(bad.parse::<NationalId>().is_err(), "{bad:?} should not parse");
    }
  }

  #[test]
  fn sequence_for_year_ignores_other_years() {
    assert_eq!(NationalId::sequence_for_year("SN-2025-000007", 2025), Some(7));
    assert_eq!(NationalId::sequence_for_year("SN-2024-000007", 2025), None);
    assert_eq!(NationalId::sequence_for_year("ID-17", 2025), None);
  }

  #[test]
  fn serializes_as_a_string() {
    let json = serde_json::to_string(&NationalId::new(2025, 9)).unwrap();
    assert_eq!(json, "\"SN-2025-000009\"");
    let back: NationalId = serde_json::from_str(&json).unwrap();
    assert_eq!(back, NationalId::new(2025, 9));
  }
}
