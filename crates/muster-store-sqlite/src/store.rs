//! [`SqliteStore`]: the SQLite implementation of [`RosterStore`].

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension as _, TransactionBehavior};
use uuid::Uuid;

use muster_core::{
  Error as CoreError,
  assignment::{NewRoleAssignment, RoleAssignment, RoleFilter},
  error::Restriction,
  facility::{Facility, FacilityId, FacilityUpdate, NewFacility, generate_api_key},
  initials,
  membership::{Membership, MembershipFilter, MembershipUpdate, NewMembership},
  person::{Cid, NewPerson, Person, PersonUpdate},
  request::{NewTransferRequest, RequestFilter, RequestStatus, RequestType, Resolution, TransferRequest},
  store::RosterStore,
};

use crate::{
  Error, Result,
  encode::{
    RawAssignment, RawFacility, RawMembership, RawPerson, RawRequest, encode_dt, encode_kind,
    encode_request_status, encode_request_type, encode_status, encode_uuid,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Muster roster store backed by a single SQLite file.
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

  /// Open an in-memory store, useful for testing.
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

  /// Run `f` against the connection without a transaction.
  async fn read<T, F>(&self, f: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&rusqlite::Connection) -> Result<T> + Send + 'static,
  {
    self.conn.call(move |conn| Ok(f(conn))).await?
  }

  /// Run `f` inside an `IMMEDIATE` transaction, committing only if it
  /// succeeds. Any error, domain or database, rolls everything back.
  async fn write<T, F>(&self, f: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&rusqlite::Transaction<'_>) -> Result<T> + Send + 'static,
  {
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = f(&tx);
        if out.is_ok() {
          tx.commit()?;
        }
        Ok(out)
      })
      .await?
  }
}

// ─── Row helpers ─────────────────────────────────────────────────────────────
//
// Plain functions over a borrowed connection so they compose inside one
// transaction.

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
  matches!(
    err,
    rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
  )
}

/// Map a unique-constraint failure on insert to a domain conflict.
fn insert_or<F>(result: rusqlite::Result<usize>, conflict: F) -> Result<()>
where
  F: FnOnce(&rusqlite::Error) -> CoreError,
{
  match result {
    Ok(_) => Ok(()),
    Err(e) if is_constraint_violation(&e) => Err(conflict(&e).into()),
    Err(e) => Err(e.into()),
  }
}

fn select_facility(conn: &rusqlite::Connection, id: &FacilityId) -> Result<Option<Facility>> {
  conn
    .query_row(
      &format!("SELECT {} FROM facilities WHERE facility_id = ?1", RawFacility::COLUMNS),
      rusqlite::params![id.as_str()],
      RawFacility::from_row,
    )
    .optional()?
    .map(RawFacility::into_facility)
    .transpose()
}

fn require_facility(conn: &rusqlite::Connection, id: &FacilityId) -> Result<Facility> {
  select_facility(conn, id)?.ok_or_else(|| CoreError::FacilityNotFound(id.clone()).into())
}

fn select_person(conn: &rusqlite::Connection, cid: Cid) -> Result<Option<Person>> {
  conn
    .query_row(
      &format!("SELECT {} FROM persons WHERE cid = ?1", RawPerson::COLUMNS),
      rusqlite::params![cid.0],
      RawPerson::from_row,
    )
    .optional()?
    .map(RawPerson::into_person)
    .transpose()
}

fn require_person(conn: &rusqlite::Connection, cid: Cid) -> Result<Person> {
  select_person(conn, cid)?.ok_or_else(|| CoreError::PersonNotFound(cid).into())
}

fn select_membership(conn: &rusqlite::Connection, id: Uuid) -> Result<Option<Membership>> {
  conn
    .query_row(
      &format!("SELECT {} FROM memberships WHERE membership_id = ?1", RawMembership::COLUMNS),
      rusqlite::params![encode_uuid(id)],
      RawMembership::from_row,
    )
    .optional()?
    .map(RawMembership::into_membership)
    .transpose()
}

fn require_live_membership(conn: &rusqlite::Connection, id: Uuid) -> Result<Membership> {
  match select_membership(conn, id)? {
    Some(m) if m.is_live() => Ok(m),
    _ => Err(CoreError::MembershipNotFound(id).into()),
  }
}

fn live_membership_id(
  conn: &rusqlite::Connection,
  cid: Cid,
  facility: &FacilityId,
) -> Result<Option<Uuid>> {
  let id: Option<String> = conn
    .query_row(
      "SELECT membership_id FROM memberships
       WHERE cid = ?1 AND facility_id = ?2 AND deleted_at IS NULL",
      rusqlite::params![cid.0, facility.as_str()],
      |row| row.get(0),
    )
    .optional()?;
  Ok(id.map(|s| Uuid::parse_str(&s)).transpose()?)
}

/// Initials held by live memberships at `facility`, optionally ignoring one
/// membership.
fn taken_initials(
  conn: &rusqlite::Connection,
  facility: &FacilityId,
  except: Option<Uuid>,
) -> Result<Vec<String>> {
  let mut stmt = conn.prepare(
    "SELECT operating_initials FROM memberships
     WHERE facility_id = ?1 AND deleted_at IS NULL
       AND (?2 IS NULL OR membership_id != ?2)",
  )?;
  let rows = stmt
    .query_map(
      rusqlite::params![facility.as_str(), except.map(encode_uuid)],
      |row| row.get(0),
    )?
    .collect::<rusqlite::Result<Vec<String>>>()?;
  Ok(rows)
}

/// Validate explicit initials and check they are free at `facility`.
fn claim_initials(
  conn: &rusqlite::Connection,
  facility: &FacilityId,
  initials: &str,
  except: Option<Uuid>,
) -> Result<String> {
  let initials = initials::normalize(initials)?;
  if taken_initials(conn, facility, except)?.contains(&initials) {
    return Err(
      CoreError::OperatingInitialsTaken { facility: facility.clone(), initials }.into(),
    );
  }
  Ok(initials)
}

/// Create a membership. Shared by `create_membership` and request
/// acceptance so both follow the same steps inside the caller's transaction.
fn insert_membership(
  conn: &rusqlite::Connection,
  input: NewMembership,
  now: DateTime<Utc>,
) -> Result<Membership> {
  if live_membership_id(conn, input.cid, &input.facility)?.is_some() {
    return Err(
      CoreError::DuplicateMembership { cid: input.cid, facility: input.facility }.into(),
    );
  }
  let person = require_person(conn, input.cid)?;
  require_facility(conn, &input.facility)?;

  let operating_initials = match input.operating_initials {
    Some(explicit) => claim_initials(conn, &input.facility, &explicit, None)?,
    None => {
      let taken = taken_initials(conn, &input.facility, None)?;
      initials::assign(&person, taken.iter().map(String::as_str))
    }
  };

  let membership = Membership {
    id: Uuid::new_v4(),
    cid: input.cid,
    facility: input.facility,
    operating_initials,
    kind: input.kind,
    status: input.status,
    created_at: now,
    updated_at: now,
    deleted_at: None,
  };

  let result = conn.execute(
    "INSERT INTO memberships (
       membership_id, cid, facility_id, operating_initials, kind, status,
       created_at, updated_at, deleted_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, NULL)",
    rusqlite::params![
      encode_uuid(membership.id),
      membership.cid.0,
      membership.facility.as_str(),
      membership.operating_initials,
      encode_kind(membership.kind),
      encode_status(membership.status),
      encode_dt(now),
      encode_dt(now),
    ],
  );
  insert_or(result, |e| membership_conflict(e, &membership))?;

  tracing::debug!(
    cid = %membership.cid,
    facility = %membership.facility,
    initials = %membership.operating_initials,
    "membership inserted"
  );
  Ok(membership)
}

/// Which live-membership index a failed insert tripped. SQLite names the
/// index columns in the message.
fn membership_conflict(err: &rusqlite::Error, membership: &Membership) -> CoreError {
  if err.to_string().contains("operating_initials") {
    CoreError::OperatingInitialsTaken {
      facility: membership.facility.clone(),
      initials: membership.operating_initials.clone(),
    }
  } else {
    CoreError::DuplicateMembership { cid: membership.cid, facility: membership.facility.clone() }
  }
}

fn select_request(conn: &rusqlite::Connection, id: Uuid) -> Result<Option<TransferRequest>> {
  conn
    .query_row(
      &format!("SELECT {} FROM transfer_requests WHERE request_id = ?1", RawRequest::COLUMNS),
      rusqlite::params![encode_uuid(id)],
      RawRequest::from_row,
    )
    .optional()?
    .map(RawRequest::into_request)
    .transpose()
}

fn select_assignment(conn: &rusqlite::Connection, id: Uuid) -> Result<Option<RoleAssignment>> {
  conn
    .query_row(
      &format!("SELECT {} FROM role_assignments WHERE assignment_id = ?1", RawAssignment::COLUMNS),
      rusqlite::params![encode_uuid(id)],
      RawAssignment::from_row,
    )
    .optional()?
    .map(RawAssignment::into_assignment)
    .transpose()
}

fn normalize_preferred(initials: &str) -> Result<String> {
  if initials.trim().is_empty() {
    Ok(String::new())
  } else {
    Ok(initials::normalize(initials)?)
  }
}

// ─── RosterStore impl ────────────────────────────────────────────────────────

impl RosterStore for SqliteStore {
  type Error = Error;

  // ── Facilities ────────────────────────────────────────────────────────

  async fn add_facility(&self, input: NewFacility) -> Result<Facility> {
    let now = Utc::now();
    let facility = Facility {
      id:         input.id,
      name:       input.name,
      url:        input.url,
      api_key:    Some(generate_api_key()),
      created_at: now,
      updated_at: now,
    };

    let row = facility.clone();
    self
      .write(move |tx| {
        let result = tx.execute(
          "INSERT INTO facilities (facility_id, name, url, api_key, created_at, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![
            row.id.as_str(),
            row.name,
            row.url,
            row.api_key,
            encode_dt(row.created_at),
            encode_dt(row.updated_at),
          ],
        );
        insert_or(result, |_| CoreError::DuplicateFacility(row.id.clone()))
      })
      .await?;

    tracing::debug!(facility = %facility.id, "facility added");
    Ok(facility)
  }

  async fn get_facility(&self, id: FacilityId) -> Result<Option<Facility>> {
    self.read(move |conn| select_facility(conn, &id)).await
  }

  async fn list_facilities(&self) -> Result<Vec<Facility>> {
    self
      .read(|conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM facilities ORDER BY facility_id",
          RawFacility::COLUMNS
        ))?;
        let raws = stmt
          .query_map([], RawFacility::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        raws.into_iter().map(RawFacility::into_facility).collect()
      })
      .await
  }

  async fn update_facility(&self, id: FacilityId, update: FacilityUpdate) -> Result<Facility> {
    self
      .write(move |tx| {
        let mut facility = require_facility(tx, &id)?;
        if let Some(name) = update.name {
          facility.name = name;
        }
        if let Some(url) = update.url {
          facility.url = Some(url);
        }
        facility.updated_at = Utc::now();
        tx.execute(
          "UPDATE facilities SET name = ?2, url = ?3, updated_at = ?4 WHERE facility_id = ?1",
          rusqlite::params![
            facility.id.as_str(),
            facility.name,
            facility.url,
            encode_dt(facility.updated_at),
          ],
        )?;
        Ok(facility)
      })
      .await
  }

  async fn facility_by_api_key(&self, key: String) -> Result<Option<Facility>> {
    self
      .read(move |conn| {
        conn
          .query_row(
            &format!("SELECT {} FROM facilities WHERE api_key = ?1", RawFacility::COLUMNS),
            rusqlite::params![key],
            RawFacility::from_row,
          )
          .optional()?
          .map(RawFacility::into_facility)
          .transpose()
      })
      .await
  }

  // ── People ────────────────────────────────────────────────────────────

  async fn add_person(&self, input: NewPerson) -> Result<Person> {
    let now = Utc::now();
    let person = Person {
      cid:                input.cid,
      first_name:         input.first_name,
      last_name:          input.last_name,
      preferred_name:     input.preferred_name,
      preferred_initials: normalize_preferred(&input.preferred_initials)?,
      controller_rating:  input.controller_rating,
      flags:              Default::default(),
      created_at:         now,
      updated_at:         now,
    };

    let row = person.clone();
    self
      .write(move |tx| {
        let result = tx.execute(
          "INSERT INTO persons (
             cid, first_name, last_name, preferred_name, preferred_initials,
             controller_rating, created_at, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
          rusqlite::params![
            row.cid.0,
            row.first_name,
            row.last_name,
            row.preferred_name,
            row.preferred_initials,
            row.controller_rating,
            encode_dt(row.created_at),
            encode_dt(row.updated_at),
          ],
        );
        insert_or(result, |_| CoreError::DuplicatePerson(row.cid))
      })
      .await?;

    tracing::debug!(cid = %person.cid, "person added");
    Ok(person)
  }

  async fn get_person(&self, cid: Cid) -> Result<Option<Person>> {
    self.read(move |conn| select_person(conn, cid)).await
  }

  async fn update_person(&self, cid: Cid, update: PersonUpdate) -> Result<Person> {
    let preferred_initials = update
      .preferred_initials
      .as_deref()
      .map(normalize_preferred)
      .transpose()?;

    self
      .write(move |tx| {
        let mut person = require_person(tx, cid)?;
        if let Some(name) = update.preferred_name {
          person.preferred_name = Some(name).filter(|n| !n.is_empty());
        }
        if let Some(initials) = preferred_initials {
          person.preferred_initials = initials;
        }
        if let Some(rating) = update.controller_rating {
          person.controller_rating = rating;
        }
        if let Some(flags) = update.flags {
          person.flags = flags;
        }
        person.updated_at = Utc::now();

        tx.execute(
          "UPDATE persons SET
             preferred_name = ?2, preferred_initials = ?3, controller_rating = ?4,
             no_staff_role = ?5, no_visiting = ?6, no_transferring = ?7, updated_at = ?8
           WHERE cid = ?1",
          rusqlite::params![
            person.cid.0,
            person.preferred_name,
            person.preferred_initials,
            person.controller_rating,
            person.flags.no_staff_role,
            person.flags.no_visiting,
            person.flags.no_transferring,
            encode_dt(person.updated_at),
          ],
        )?;
        Ok(person)
      })
      .await
  }

  // ── Memberships ───────────────────────────────────────────────────────

  async fn create_membership(&self, input: NewMembership) -> Result<Membership> {
    self
      .write(move |tx| insert_membership(tx, input, Utc::now()))
      .await
  }

  async fn get_membership(&self, id: Uuid) -> Result<Option<Membership>> {
    self.read(move |conn| select_membership(conn, id)).await
  }

  async fn update_membership(&self, id: Uuid, update: MembershipUpdate) -> Result<Membership> {
    self
      .write(move |tx| {
        let mut membership = require_live_membership(tx, id)?;
        if let Some(status) = update.status {
          membership.status = status;
        }
        if let Some(initials) = update.operating_initials {
          membership.operating_initials =
            claim_initials(tx, &membership.facility, &initials, Some(id))?;
        }
        membership.updated_at = Utc::now();

        let result = tx.execute(
          "UPDATE memberships SET status = ?2, operating_initials = ?3, updated_at = ?4
           WHERE membership_id = ?1",
          rusqlite::params![
            encode_uuid(id),
            encode_status(membership.status),
            membership.operating_initials,
            encode_dt(membership.updated_at),
          ],
        );
        insert_or(result, |_| CoreError::OperatingInitialsTaken {
          facility: membership.facility.clone(),
          initials: membership.operating_initials.clone(),
        })?;
        Ok(membership)
      })
      .await
  }

  async fn delete_membership(&self, id: Uuid) -> Result<Membership> {
    self
      .write(move |tx| {
        let mut membership = require_live_membership(tx, id)?;
        let now = Utc::now();
        membership.deleted_at = Some(now);
        membership.updated_at = now;
        tx.execute(
          "UPDATE memberships SET deleted_at = ?2, updated_at = ?2 WHERE membership_id = ?1",
          rusqlite::params![encode_uuid(id), encode_dt(now)],
        )?;
        tracing::debug!(cid = %membership.cid, facility = %membership.facility, "membership deleted");
        Ok(membership)
      })
      .await
  }

  async fn list_memberships(&self, filter: MembershipFilter) -> Result<Vec<Membership>> {
    self
      .read(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM memberships
           WHERE (?1 IS NULL OR cid = ?1)
             AND (?2 IS NULL OR facility_id = ?2)
             AND (?3 IS NULL OR kind = ?3)
             AND (?4 OR deleted_at IS NULL)
           ORDER BY created_at, rowid",
          RawMembership::COLUMNS
        ))?;
        let raws = stmt
          .query_map(
            rusqlite::params![
              filter.cid.map(|c| c.0),
              filter.facility.as_ref().map(FacilityId::as_str),
              filter.kind.map(encode_kind),
              filter.include_deleted,
            ],
            RawMembership::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        raws.into_iter().map(RawMembership::into_membership).collect()
      })
      .await
  }

  // ── Requests ──────────────────────────────────────────────────────────

  async fn create_request(&self, input: NewTransferRequest) -> Result<TransferRequest> {
    self
      .write(move |tx| {
        let person = require_person(tx, input.cid)?;
        require_facility(tx, &input.facility)?;

        let restriction = match input.request_type {
          RequestType::Visiting if person.flags.no_visiting => Some(Restriction::NoVisiting),
          RequestType::Transferring if person.flags.no_transferring => {
            Some(Restriction::NoTransferring)
          }
          _ => None,
        };
        if let Some(restriction) = restriction {
          return Err(CoreError::Restricted { cid: person.cid, restriction }.into());
        }

        let now = Utc::now();
        let request = TransferRequest {
          id:           Uuid::new_v4(),
          cid:          input.cid,
          facility:     input.facility,
          request_type: input.request_type,
          status:       RequestStatus::Pending,
          reason:       input.reason,
          created_at:   now,
          updated_at:   now,
        };
        tx.execute(
          "INSERT INTO transfer_requests (
             request_id, cid, facility_id, request_type, status, reason, created_at, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
          rusqlite::params![
            encode_uuid(request.id),
            request.cid.0,
            request.facility.as_str(),
            encode_request_type(request.request_type),
            encode_request_status(request.status),
            request.reason,
            encode_dt(now),
            encode_dt(now),
          ],
        )?;
        Ok(request)
      })
      .await
  }

  async fn get_request(&self, id: Uuid) -> Result<Option<TransferRequest>> {
    self.read(move |conn| select_request(conn, id)).await
  }

  async fn resolve_request(
    &self,
    id: Uuid,
    resolution: Resolution,
  ) -> Result<(TransferRequest, Option<Membership>)> {
    self
      .write(move |tx| {
        let current = select_request(tx, id)?.ok_or(CoreError::RequestNotFound(id))?;
        let now = Utc::now();
        let request = current
          .resolved(&resolution, now)
          .ok_or(CoreError::RequestAlreadyResolved(id))?;

        // The membership goes in first; if it fails the request stays pending.
        let membership = match request.status {
          RequestStatus::Accepted => {
            let input = NewMembership::new(
              request.cid,
              request.facility.clone(),
              request.request_type.membership_kind(),
            );
            Some(insert_membership(tx, input, now)?)
          }
          _ => None,
        };

        let updated = tx.execute(
          "UPDATE transfer_requests SET request_type = ?2, status = ?3, reason = ?4, updated_at = ?5
           WHERE request_id = ?1 AND status = 'pending'",
          rusqlite::params![
            encode_uuid(id),
            encode_request_type(request.request_type),
            encode_request_status(request.status),
            request.reason,
            encode_dt(now),
          ],
        )?;
        if updated != 1 {
          return Err(CoreError::RequestAlreadyResolved(id).into());
        }
        Ok((request, membership))
      })
      .await
  }

  async fn list_requests(&self, filter: RequestFilter) -> Result<Vec<TransferRequest>> {
    self
      .read(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM transfer_requests
           WHERE (?1 IS NULL OR cid = ?1)
             AND (?2 IS NULL OR facility_id = ?2)
             AND (?3 IS NULL OR request_type = ?3)
             AND (?4 IS NULL OR status = ?4)
           ORDER BY created_at, rowid",
          RawRequest::COLUMNS
        ))?;
        let raws = stmt
          .query_map(
            rusqlite::params![
              filter.cid.map(|c| c.0),
              filter.facility.as_ref().map(FacilityId::as_str),
              filter.request_type.map(encode_request_type),
              filter.status.map(encode_request_status),
            ],
            RawRequest::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        raws.into_iter().map(RawRequest::into_request).collect()
      })
      .await
  }

  // ── Role assignments ──────────────────────────────────────────────────

  async fn grant_role(&self, input: NewRoleAssignment) -> Result<RoleAssignment> {
    if !input.role.is_valid() {
      return Err(CoreError::InvalidRole(input.role).into());
    }

    self
      .write(move |tx| {
        let person = require_person(tx, input.cid)?;
        if person.flags.no_staff_role {
          return Err(
            CoreError::Restricted { cid: person.cid, restriction: Restriction::NoStaffRole }.into(),
          );
        }
        require_facility(tx, &input.facility)?;

        let assignment = RoleAssignment {
          id:            Uuid::new_v4(),
          cid:           input.cid,
          membership_id: live_membership_id(tx, input.cid, &input.facility)?,
          role:          input.role,
          facility:      input.facility,
          created_at:    Utc::now(),
        };
        let result = tx.execute(
          "INSERT INTO role_assignments (
             assignment_id, cid, role_id, facility_id, membership_id, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![
            encode_uuid(assignment.id),
            assignment.cid.0,
            assignment.role.as_str(),
            assignment.facility.as_str(),
            assignment.membership_id.map(encode_uuid),
            encode_dt(assignment.created_at),
          ],
        );
        insert_or(result, |_| CoreError::DuplicateRoleAssignment {
          cid:      assignment.cid,
          role:     assignment.role.clone(),
          facility: assignment.facility.clone(),
        })?;
        Ok(assignment)
      })
      .await
  }

  async fn revoke_role(&self, id: Uuid) -> Result<RoleAssignment> {
    self
      .write(move |tx| {
        let assignment =
          select_assignment(tx, id)?.ok_or(CoreError::RoleAssignmentNotFound(id))?;
        tx.execute(
          "DELETE FROM role_assignments WHERE assignment_id = ?1",
          rusqlite::params![encode_uuid(id)],
        )?;
        Ok(assignment)
      })
      .await
  }

  async fn get_role_assignment(&self, id: Uuid) -> Result<Option<RoleAssignment>> {
    self.read(move |conn| select_assignment(conn, id)).await
  }

  async fn list_role_assignments(&self, filter: RoleFilter) -> Result<Vec<RoleAssignment>> {
    self
      .read(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM role_assignments
           WHERE (?1 IS NULL OR cid = ?1)
             AND (?2 IS NULL OR role_id = ?2)
             AND (?3 IS NULL OR facility_id = ?3)
           ORDER BY created_at, rowid",
          RawAssignment::COLUMNS
        ))?;
        let raws = stmt
          .query_map(
            rusqlite::params![
              filter.cid.map(|c| c.0),
              filter.role.as_ref().map(|r| r.as_str()),
              filter.facility.as_ref().map(FacilityId::as_str),
            ],
            RawAssignment::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        raws.into_iter().map(RawAssignment::into_assignment).collect()
      })
      .await
  }
}

#[cfg(test)]
mod tests {
  use muster_core::membership::{MembershipKind, MembershipStatus};

  use super::*;

  /// Insert a live membership row directly, bypassing the pre-checks.
  fn raw_insert(conn: &rusqlite::Connection, m: &Membership) -> Result<()> {
    let result = conn.execute(
      "INSERT INTO memberships (
         membership_id, cid, facility_id, operating_initials, kind, status,
         created_at, updated_at, deleted_at
       ) VALUES (?1, ?2, ?3, ?4, 'home', 'active', ?5, ?5, NULL)",
      rusqlite::params![
        encode_uuid(m.id),
        m.cid.0,
        m.facility.as_str(),
        m.operating_initials,
        encode_dt(m.created_at),
      ],
    );
    insert_or(result, |e| membership_conflict(e, m))
  }

  fn membership(cid: u64, initials: &str) -> Membership {
    let now = Utc::now();
    Membership {
      id:                 Uuid::new_v4(),
      cid:                Cid(cid),
      facility:           "ZDV".parse().unwrap(),
      operating_initials: initials.into(),
      kind:               MembershipKind::Home,
      status:             MembershipStatus::Active,
      created_at:         now,
      updated_at:         now,
      deleted_at:         None,
    }
  }

  fn conn() -> rusqlite::Connection {
    let conn = rusqlite::Connection::open_in_memory().unwrap();
    conn.execute_batch(SCHEMA).unwrap();
    conn
      .execute_batch(
        "INSERT INTO facilities (facility_id, name, created_at, updated_at)
           VALUES ('ZDV', 'Denver', '', '');
         INSERT INTO persons (cid, first_name, last_name, created_at, updated_at)
           VALUES (1, 'Jane', 'Doe', '', ''), (2, 'John', 'Dee', '', '');",
      )
      .unwrap();
    conn
  }

  #[test]
  fn live_initials_index_maps_to_initials_taken() {
    let conn = conn();
    raw_insert(&conn, &membership(1, "JD")).unwrap();
    let err = raw_insert(&conn, &membership(2, "JD")).unwrap_err();
    assert!(matches!(
      err,
      Error::Core(CoreError::OperatingInitialsTaken { ref initials, .. }) if initials == "JD"
    ));
  }

  #[test]
  fn live_person_index_maps_to_duplicate_membership() {
    let conn = conn();
    raw_insert(&conn, &membership(1, "JD")).unwrap();
    let err = raw_insert(&conn, &membership(1, "JX")).unwrap_err();
    assert!(matches!(err, Error::Core(CoreError::DuplicateMembership { cid: Cid(1), .. })));
  }

  #[test]
  fn removed_rows_free_both_indexes() {
    let conn = conn();
    let first = membership(1, "JD");
    raw_insert(&conn, &first).unwrap();
    conn
      .execute(
        "UPDATE memberships SET deleted_at = ?1 WHERE membership_id = ?2",
        rusqlite::params![encode_dt(Utc::now()), encode_uuid(first.id)],
      )
      .unwrap();
    raw_insert(&conn, &membership(1, "JD")).unwrap();
  }
}
