//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are RFC 3339 strings, UUIDs hyphenated lowercase strings and
//! enums short lowercase words. Rows are read into `Raw*` structs inside the
//! connection closure and decoded afterwards.

use chrono::{DateTime, Utc};
use muster_core::{
  assignment::RoleAssignment,
  facility::{Facility, FacilityId},
  membership::{Membership, MembershipKind, MembershipStatus},
  person::{Cid, Person, PersonFlags},
  request::{RequestStatus, RequestType, TransferRequest},
  role::RoleId,
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::Decode(format!("timestamp {s:?}: {e}")))
}

fn decode_facility_id(s: String) -> Result<FacilityId> {
  s.parse()
    .map_err(|e| Error::Decode(format!("facility id: {e}")))
}

// ─── Enums ───────────────────────────────────────────────────────────────────

pub fn encode_kind(kind: MembershipKind) -> &'static str {
  match kind {
    MembershipKind::Home => "home",
    MembershipKind::Visiting => "visiting",
  }
}

fn decode_kind(s: &str) -> Result<MembershipKind> {
  match s {
    "home" => Ok(MembershipKind::Home),
    "visiting" => Ok(MembershipKind::Visiting),
    other => Err(Error::Decode(format!("unknown membership kind: {other:?}"))),
  }
}

pub fn encode_status(status: MembershipStatus) -> &'static str {
  match status {
    MembershipStatus::Active => "active",
    MembershipStatus::LeaveOfAbsence => "leave_of_absence",
  }
}

fn decode_status(s: &str) -> Result<MembershipStatus> {
  match s {
    "active" => Ok(MembershipStatus::Active),
    "leave_of_absence" => Ok(MembershipStatus::LeaveOfAbsence),
    other => Err(Error::Decode(format!("unknown membership status: {other:?}"))),
  }
}

pub fn encode_request_type(rt: RequestType) -> &'static str {
  match rt {
    RequestType::Visiting => "visiting",
    RequestType::Transferring => "transferring",
  }
}

fn decode_request_type(s: &str) -> Result<RequestType> {
  match s {
    "visiting" => Ok(RequestType::Visiting),
    "transferring" => Ok(RequestType::Transferring),
    other => Err(Error::Decode(format!("unknown request type: {other:?}"))),
  }
}

pub fn encode_request_status(status: RequestStatus) -> &'static str {
  match status {
    RequestStatus::Pending => "pending",
    RequestStatus::Accepted => "accepted",
    RequestStatus::Rejected => "rejected",
  }
}

fn decode_request_status(s: &str) -> Result<RequestStatus> {
  match s {
    "pending" => Ok(RequestStatus::Pending),
    "accepted" => Ok(RequestStatus::Accepted),
    "rejected" => Ok(RequestStatus::Rejected),
    other => Err(Error::Decode(format!("unknown request status: {other:?}"))),
  }
}

// ─── Row types ───────────────────────────────────────────────────────────────

pub struct RawFacility {
  pub facility_id: String,
  pub name:        String,
  pub url:         Option<String>,
  pub api_key:     Option<String>,
  pub created_at:  String,
  pub updated_at:  String,
}

impl RawFacility {
  pub const COLUMNS: &'static str = "facility_id, name, url, api_key, created_at, updated_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      facility_id: row.get(0)?,
      name:        row.get(1)?,
      url:         row.get(2)?,
      api_key:     row.get(3)?,
      created_at:  row.get(4)?,
      updated_at:  row.get(5)?,
    })
  }

  pub fn into_facility(self) -> Result<Facility> {
    Ok(Facility {
      id:         decode_facility_id(self.facility_id)?,
      name:       self.name,
      url:        self.url,
      api_key:    self.api_key,
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}

pub struct RawPerson {
  pub cid:                u64,
  pub first_name:         String,
  pub last_name:          String,
  pub preferred_name:     Option<String>,
  pub preferred_initials: String,
  pub controller_rating:  u8,
  pub no_staff_role:      bool,
  pub no_visiting:        bool,
  pub no_transferring:    bool,
  pub created_at:         String,
  pub updated_at:         String,
}

impl RawPerson {
  pub const COLUMNS: &'static str = "cid, first_name, last_name, preferred_name, \
                                     preferred_initials, controller_rating, no_staff_role, \
                                     no_visiting, no_transferring, created_at, updated_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      cid:                row.get(0)?,
      first_name:         row.get(1)?,
      last_name:          row.get(2)?,
      preferred_name:     row.get(3)?,
      preferred_initials: row.get(4)?,
      controller_rating:  row.get(5)?,
      no_staff_role:      row.get(6)?,
      no_visiting:        row.get(7)?,
      no_transferring:    row.get(8)?,
      created_at:         row.get(9)?,
      updated_at:         row.get(10)?,
    })
  }

  pub fn into_person(self) -> Result<Person> {
    Ok(Person {
      cid:                Cid(self.cid),
      first_name:         self.first_name,
      last_name:          self.last_name,
      preferred_name:     self.preferred_name,
      preferred_initials: self.preferred_initials,
      controller_rating:  self.controller_rating,
      flags:              PersonFlags {
        no_staff_role:   self.no_staff_role,
        no_visiting:     self.no_visiting,
        no_transferring: self.no_transferring,
      },
      created_at:         decode_dt(&self.created_at)?,
      updated_at:         decode_dt(&self.updated_at)?,
    })
  }
}

pub struct RawMembership {
  pub membership_id:      String,
  pub cid:                u64,
  pub facility_id:        String,
  pub operating_initials: String,
  pub kind:               String,
  pub status:             String,
  pub created_at:         String,
  pub updated_at:         String,
  pub deleted_at:         Option<String>,
}

impl RawMembership {
  pub const COLUMNS: &'static str = "membership_id, cid, facility_id, operating_initials, kind, \
                                     status, created_at, updated_at, deleted_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      membership_id:      row.get(0)?,
      cid:                row.get(1)?,
      facility_id:        row.get(2)?,
      operating_initials: row.get(3)?,
      kind:               row.get(4)?,
      status:             row.get(5)?,
      created_at:         row.get(6)?,
      updated_at:         row.get(7)?,
      deleted_at:         row.get(8)?,
    })
  }

  pub fn into_membership(self) -> Result<Membership> {
    Ok(Membership {
      id:                 decode_uuid(&self.membership_id)?,
      cid:                Cid(self.cid),
      facility:           decode_facility_id(self.facility_id)?,
      operating_initials: self.operating_initials,
      kind:               decode_kind(&self.kind)?,
      status:             decode_status(&self.status)?,
      created_at:         decode_dt(&self.created_at)?,
      updated_at:         decode_dt(&self.updated_at)?,
      deleted_at:         self.deleted_at.as_deref().map(decode_dt).transpose()?,
    })
  }
}

pub struct RawRequest {
  pub request_id:   String,
  pub cid:          u64,
  pub facility_id:  String,
  pub request_type: String,
  pub status:       String,
  pub reason:       String,
  pub created_at:   String,
  pub updated_at:   String,
}

impl RawRequest {
  pub const COLUMNS: &'static str =
    "request_id, cid, facility_id, request_type, status, reason, created_at, updated_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      request_id:   row.get(0)?,
      cid:          row.get(1)?,
      facility_id:  row.get(2)?,
      request_type: row.get(3)?,
      status:       row.get(4)?,
      reason:       row.get(5)?,
      created_at:   row.get(6)?,
      updated_at:   row.get(7)?,
    })
  }

  pub fn into_request(self) -> Result<TransferRequest> {
    Ok(TransferRequest {
      id:           decode_uuid(&self.request_id)?,
      cid:          Cid(self.cid),
      facility:     decode_facility_id(self.facility_id)?,
      request_type: decode_request_type(&self.request_type)?,
      status:       decode_request_status(&self.status)?,
      reason:       self.reason,
      created_at:   decode_dt(&self.created_at)?,
      updated_at:   decode_dt(&self.updated_at)?,
    })
  }
}

pub struct RawAssignment {
  pub assignment_id: String,
  pub cid:           u64,
  pub role_id:       String,
  pub facility_id:   String,
  pub membership_id: Option<String>,
  pub created_at:    String,
}

impl RawAssignment {
  pub const COLUMNS: &'static str =
    "assignment_id, cid, role_id, facility_id, membership_id, created_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      assignment_id: row.get(0)?,
      cid:           row.get(1)?,
      role_id:       row.get(2)?,
      facility_id:   row.get(3)?,
      membership_id: row.get(4)?,
      created_at:    row.get(5)?,
    })
  }

  pub fn into_assignment(self) -> Result<RoleAssignment> {
    Ok(RoleAssignment {
      id:            decode_uuid(&self.assignment_id)?,
      cid:           Cid(self.cid),
      role:          RoleId::new(&self.role_id),
      facility:      decode_facility_id(self.facility_id)?,
      membership_id: self.membership_id.as_deref().map(decode_uuid).transpose()?,
      created_at:    decode_dt(&self.created_at)?,
    })
  }
}
