//! [`SqliteStore`], the SQLite implementation of [`CitizenStore`].

use std::path::Path;

use chrono::Utc;
use eyedentify_core::{
  citizen::{NewCitizen, Operator, OperatorAccount, RawRecord},
  store::CitizenStore,
};
use rusqlite::OptionalExtension as _;
use tracing::debug;
use uuid::Uuid;

use crate::{
  Error, Result,
  encode::{RawOperator, encode_date, encode_dt, is_identifier, read_row},
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// Citizen and operator records in a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  #[cfg(test)]
  pub(crate) fn connection(&self) -> &tokio_rusqlite::Connection { &self.conn }

  /// Column names of the `citizens` table, in table order.
  async fn citizen_columns(&self) -> Result<Vec<String>> {
    let columns = self
      .conn
      .call(|conn| {
        let stmt = conn.prepare("SELECT * FROM citizens LIMIT 0")?;
        Ok(stmt.column_names().into_iter().map(str::to_owned).collect())
      })
      .await?;
    Ok(columns)
  }

  /// Fail with [`Error::UnknownColumn`] unless `column` is a real column.
  async fn check_column(&self, column: &str) -> Result<()> {
    if is_identifier(column)
      && self.citizen_columns().await?.iter().any(|c| c == column)
    {
      Ok(())
    } else {
      Err(Error::UnknownColumn(column.to_owned()))
    }
  }

  async fn query_citizens(
    &self,
    sql: String,
    param: Option<String>,
  ) -> Result<Vec<RawRecord>> {
    let rows = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let columns: Vec<String> =
          stmt.column_names().into_iter().map(str::to_owned).collect();
        let params = rusqlite::params_from_iter(param.iter());
        let rows = stmt
          .query_map(params, |row| read_row(row, &columns))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(rows)
  }

  // ── Operators ─────────────────────────────────────────────────────────

  /// Register an operator. `password_hash` must be an argon2 PHC string.
  pub async fn add_operator(
    &self,
    email: &str,
    display_name: &str,
    password_hash: &str,
  ) -> Result<Operator> {
    let operator = Operator {
      user_id:      Uuid::new_v4().to_string(),
      email:        email.trim().to_lowercase(),
      display_name: display_name.trim().to_owned(),
    };

    let row = (
      operator.user_id.clone(),
      operator.email.clone(),
      operator.display_name.clone(),
      password_hash.to_owned(),
      encode_dt(Utc::now()),
    );
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO operators (user_id, email, display_name, password_hash, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![row.0, row.1, row.2, row.3, row.4],
        )?;
        Ok(())
      })
      .await?;
    Ok(operator)
  }

  /// The operator registered under `email` (case-insensitive), with its
  /// password hash.
  pub async fn find_operator_account(
    &self,
    email: &str,
  ) -> Result<Option<OperatorAccount>> {
    let email = email.trim().to_lowercase();
    let raw = self
      .conn
      .call(move |conn| {
        let sql =
          format!("SELECT {} FROM operators WHERE email = ?1", RawOperator::COLUMNS);
        Ok(
          conn
            .query_row(&sql, rusqlite::params![email], RawOperator::from_row)
            .optional()?,
        )
      })
      .await?;

    Ok(raw.map(|raw| {
      let password_hash = raw.password_hash.clone();
      OperatorAccount { operator: raw.into_operator(), password_hash }
    }))
  }
}

// ─── CitizenStore impl ───────────────────────────────────────────────────────

impl CitizenStore for SqliteStore {
  type Error = Error;

  async fn max_sequence_for_year(&self, year: i32) -> Result<Option<u32>> {
    let prefix = format!("SN-{year:04}-");
    let max: Option<i64> = self
      .conn
      .call(move |conn| {
        // The sequence starts right after the 8-character `SN-YYYY-` prefix.
        let max = conn.query_row(
          "SELECT MAX(CAST(substr(national_id, 9) AS INTEGER))
             FROM citizens
            WHERE national_id LIKE ?1 || '%'",
          rusqlite::params![prefix],
          |r| r.get(0),
        )?;
        Ok(max)
      })
      .await?;

    max
      .map(|m| u32::try_from(m).map_err(|_| Error::SequenceOutOfRange(m)))
      .transpose()
  }

  async fn list_citizens(&self, order_by: Option<&str>) -> Result<Vec<RawRecord>> {
    let sql = match order_by {
      Some(column) => {
        self.check_column(column).await?;
        format!("SELECT * FROM citizens ORDER BY {column} DESC, rowid DESC")
      }
      None => "SELECT * FROM citizens".to_owned(),
    };
    let rows = self.query_citizens(sql, None).await?;
    debug!(order_by, rows = rows.len(), "listed citizens");
    Ok(rows)
  }

  async fn find_citizen(
    &self,
    field: &str,
    value: &str,
  ) -> Result<Option<RawRecord>> {
    self.check_column(field).await?;
    let sql = format!("SELECT * FROM citizens WHERE {field} = ?1 LIMIT 1");
    Ok(
      self
        .query_citizens(sql, Some(value.to_owned()))
        .await?
        .into_iter()
        .next(),
    )
  }

  async fn count_citizens(&self) -> Result<u64> {
    let count: i64 = self
      .conn
      .call(|conn| {
        Ok(conn.query_row("SELECT COUNT(*) FROM citizens", [], |r| r.get(0))?)
      })
      .await?;
    Ok(count.max(0) as u64)
  }

  async fn insert_citizen(&self, c: NewCitizen) -> Result<RawRecord> {
    let id = Uuid::new_v4().to_string();
    let enrolled_at = encode_dt(Utc::now());

    let row_id = id.clone();
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO citizens (
             id, national_id, family_name, given_names, birth_date,
             birth_place, sex, height_cm, profession, address, phone, email,
             issue_date, expiration_date, authority, card_series,
             photo_url, iris_left_url, iris_right_url, latitude, longitude,
             operator_id, enrolled_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12,
                     ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23)",
          rusqlite::params![
            row_id,
            c.national_id.to_string(),
            c.family_name,
            c.given_names,
            encode_date(c.birth_date),
            c.birth_place,
            c.sex.to_string(),
            c.height_cm,
            c.profession,
            c.address,
            c.phone,
            c.email,
            encode_date(c.issue_date),
            encode_date(c.expiration_date),
            c.authority,
            c.card_series,
            c.photo_url,
            c.iris_left_url,
            c.iris_right_url,
            c.latitude,
            c.longitude,
            c.operator_id,
            enrolled_at,
          ],
        )?;
        Ok(())
      })
      .await?;

    self
      .find_citizen("id", &id)
      .await?
      .ok_or_else(|| Error::Core(eyedentify_core::Error::CitizenNotFound(id)))
  }

  async fn find_operator(&self, user_id: &str) -> Result<Option<Operator>> {
    let user_id = user_id.to_owned();
    let raw = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {} FROM operators WHERE user_id = ?1",
          RawOperator::COLUMNS
        );
        Ok(
          conn
            .query_row(&sql, rusqlite::params![user_id], RawOperator::from_row)
            .optional()?,
        )
      })
      .await?;
    Ok(raw.map(RawOperator::into_operator))
  }
}
