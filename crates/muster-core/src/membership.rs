//! Membership records: one person's standing on one facility roster.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{facility::FacilityId, person::Cid};

/// Whether a person is a home controller or a visitor at a facility.
///
/// A membership is always exactly one of the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipKind {
  Home,
  Visiting,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipStatus {
  #[default]
  Active,
  LeaveOfAbsence,
}

/// A roster entry.
///
/// At most one live (not soft-deleted) membership exists per
/// `(cid, facility)`; its operating initials are unique among the facility's
/// live memberships.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Membership {
  pub id:                 Uuid,
  pub cid:                Cid,
  pub facility:           FacilityId,
  pub operating_initials: String,
  pub kind:               MembershipKind,
  pub status:             MembershipStatus,
  pub created_at:         DateTime<Utc>,
  pub updated_at:         DateTime<Utc>,
  pub deleted_at:         Option<DateTime<Utc>>,
}

impl Membership {
  pub fn is_home(&self) -> bool { self.kind == MembershipKind::Home }

  pub fn is_visiting(&self) -> bool { self.kind == MembershipKind::Visiting }

  pub fn is_live(&self) -> bool { self.deleted_at.is_none() }
}

/// Input for [`RosterStore::create_membership`](crate::store::RosterStore::create_membership).
#[derive(Debug, Clone)]
pub struct NewMembership {
  pub cid:                Cid,
  pub facility:           FacilityId,
  pub kind:               MembershipKind,
  pub status:             MembershipStatus,
  /// Explicit initials; `None` lets the store run the assignment algorithm.
  pub operating_initials: Option<String>,
}

impl NewMembership {
  pub fn new(cid: Cid, facility: FacilityId, kind: MembershipKind) -> Self {
    Self {
      cid,
      facility,
      kind,
      status: MembershipStatus::Active,
      operating_initials: None,
    }
  }

  pub fn with_initials(mut self, initials: impl Into<String>) -> Self {
    self.operating_initials = Some(initials.into());
    self
  }
}

/// Partial update of a membership. Initials are validated but not
/// re-assigned.
#[derive(Debug, Clone, Default)]
pub struct MembershipUpdate {
  pub status:             Option<MembershipStatus>,
  pub operating_initials: Option<String>,
}

/// Parameters for [`RosterStore::list_memberships`](crate::store::RosterStore::list_memberships).
#[derive(Debug, Clone, Default)]
pub struct MembershipFilter {
  pub cid:             Option<Cid>,
  pub facility:        Option<FacilityId>,
  pub kind:            Option<MembershipKind>,
  /// Also return soft-deleted records.
  pub include_deleted: bool,
}

impl MembershipFilter {
  pub fn person(cid: Cid) -> Self { Self { cid: Some(cid), ..Self::default() } }

  pub fn facility(facility: FacilityId) -> Self {
    Self { facility: Some(facility), ..Self::default() }
  }

  pub fn with_kind(mut self, kind: MembershipKind) -> Self {
    self.kind = Some(kind);
    self
  }

  pub fn matches(&self, m: &Membership) -> bool {
    self.cid.is_none_or(|cid| m.cid == cid)
      && self.facility.as_ref().is_none_or(|f| m.facility == *f)
      && self.kind.is_none_or(|kind| m.kind == kind)
      && (self.include_deleted || m.is_live())
  }
}
