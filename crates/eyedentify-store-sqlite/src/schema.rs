//! SQL schema for the Eyedentify SQLite store.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS operators (
    user_id       TEXT PRIMARY KEY,
    email         TEXT NOT NULL UNIQUE,
    display_name  TEXT NOT NULL,
    password_hash TEXT NOT NULL,   -- argon2 PHC string
    created_at    TEXT NOT NULL
);

-- Citizens are written once at the end of an enrollment.
CREATE TABLE IF NOT EXISTS citizens (
    id              TEXT PRIMARY KEY,
    national_id     TEXT NOT NULL UNIQUE,   -- SN-YYYY-NNNNNN
    family_name     TEXT NOT NULL,
    given_names     TEXT NOT NULL,
    birth_date      TEXT NOT NULL,          -- YYYY-MM-DD
    birth_place     TEXT NOT NULL,
    sex             TEXT NOT NULL CHECK (sex IN ('M', 'F')),
    height_cm       INTEGER NOT NULL,
    profession      TEXT NOT NULL,
    address         TEXT NOT NULL,
    phone           TEXT NOT NULL,
    email           TEXT,
    issue_date      TEXT NOT NULL,
    expiration_date TEXT NOT NULL,
    authority       TEXT NOT NULL,
    card_series     TEXT NOT NULL,
    photo_url       TEXT,
    iris_left_url   TEXT,
    iris_right_url  TEXT,
    latitude        REAL,
    longitude       REAL,
    operator_id     TEXT NOT NULL REFERENCES operators(user_id),
    enrolled_at     TEXT NOT NULL           -- RFC 3339 UTC
);

CREATE TRIGGER IF NOT EXISTS citizens_no_update
BEFORE UPDATE ON citizens
BEGIN
    SELECT RAISE(ABORT, 'citizen records are immutable');
END;

CREATE TRIGGER IF NOT EXISTS citizens_no_delete
BEFORE DELETE ON citizens
BEGIN
    SELECT RAISE(ABORT, 'citizen records are immutable');
END;

CREATE INDEX IF NOT EXISTS citizens_enrolled_idx ON citizens(enrolled_at);

PRAGMA user_version = 1;
";
