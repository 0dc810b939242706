//! SQL schema for the Muster SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS facilities (
    facility_id TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    url         TEXT,
    api_key     TEXT UNIQUE,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS persons (
    cid                INTEGER PRIMARY KEY,
    first_name         TEXT    NOT NULL,
    last_name          TEXT    NOT NULL,
    preferred_name     TEXT,
    preferred_initials TEXT    NOT NULL DEFAULT '',
    controller_rating  INTEGER NOT NULL DEFAULT 1,
    no_staff_role      INTEGER NOT NULL DEFAULT 0,
    no_visiting        INTEGER NOT NULL DEFAULT 0,
    no_transferring    INTEGER NOT NULL DEFAULT 0,
    created_at         TEXT    NOT NULL,
    updated_at         TEXT    NOT NULL
);

-- Rows are soft-deleted; only live rows (deleted_at IS NULL) take part in
-- the uniqueness rules below.
CREATE TABLE IF NOT EXISTS memberships (
    membership_id      TEXT    PRIMARY KEY,
    cid                INTEGER NOT NULL REFERENCES persons(cid),
    facility_id        TEXT    NOT NULL REFERENCES facilities(facility_id),
    operating_initials TEXT    NOT NULL,
    kind               TEXT    NOT NULL CHECK (kind IN ('home', 'visiting')),
    status             TEXT    NOT NULL CHECK (status IN ('active', 'leave_of_absence')),
    created_at         TEXT    NOT NULL,
    updated_at         TEXT    NOT NULL,
    deleted_at         TEXT
);

CREATE UNIQUE INDEX IF NOT EXISTS memberships_live_person_idx
    ON memberships(cid, facility_id) WHERE deleted_at IS NULL;
CREATE UNIQUE INDEX IF NOT EXISTS memberships_live_initials_idx
    ON memberships(facility_id, operating_initials) WHERE deleted_at IS NULL;

CREATE TABLE IF NOT EXISTS transfer_requests (
    request_id   TEXT    PRIMARY KEY,
    cid          INTEGER NOT NULL REFERENCES persons(cid),
    facility_id  TEXT    NOT NULL REFERENCES facilities(facility_id),
    request_type TEXT    NOT NULL CHECK (request_type IN ('visiting', 'transferring')),
    status       TEXT    NOT NULL CHECK (status IN ('pending', 'accepted', 'rejected')),
    reason       TEXT    NOT NULL DEFAULT '',
    created_at   TEXT    NOT NULL,
    updated_at   TEXT    NOT NULL
);

-- membership_id is a lookup hint only: no foreign key, never cascades.
CREATE TABLE IF NOT EXISTS role_assignments (
    assignment_id TEXT    PRIMARY KEY,
    cid           INTEGER NOT NULL REFERENCES persons(cid),
    role_id       TEXT    NOT NULL,
    facility_id   TEXT    NOT NULL REFERENCES facilities(facility_id),
    membership_id TEXT,
    created_at    TEXT    NOT NULL,
    UNIQUE (cid, role_id, facility_id)
);

CREATE INDEX IF NOT EXISTS memberships_facility_idx ON memberships(facility_id);
CREATE INDEX IF NOT EXISTS requests_facility_idx    ON transfer_requests(facility_id, status);
CREATE INDEX IF NOT EXISTS roles_facility_idx       ON role_assignments(facility_id);

PRAGMA user_version = 1;
";
