//! Error types for `muster-core`.

use std::fmt;

use thiserror::Error;
use uuid::Uuid;

use crate::{facility::FacilityId, person::Cid, role::RoleId};

#[derive(Debug, Error)]
pub enum Error {
  // ── Not found ─────────────────────────────────────────────────────────
  #[error("person not found: {0}")]
  PersonNotFound(Cid),

  #[error("facility not found: {0}")]
  FacilityNotFound(FacilityId),

  #[error("membership not found: {0}")]
  MembershipNotFound(Uuid),

  #[error("roster request not found: {0}")]
  RequestNotFound(Uuid),

  #[error("role assignment not found: {0}")]
  RoleAssignmentNotFound(Uuid),

  // ── Conflicts ─────────────────────────────────────────────────────────
  #[error("facility {0} already exists")]
  DuplicateFacility(FacilityId),

  #[error("person {0} already exists")]
  DuplicatePerson(Cid),

  #[error("{cid} is already on the {facility} roster")]
  DuplicateMembership { cid: Cid, facility: FacilityId },

  #[error("operating initials {initials:?} are already in use at {facility}")]
  OperatingInitialsTaken { facility: FacilityId, initials: String },

  #[error("roster request {0} has already been resolved")]
  RequestAlreadyResolved(Uuid),

  #[error("{cid} already holds {role} at {facility}")]
  DuplicateRoleAssignment {
    cid:      Cid,
    role:     RoleId,
    facility: FacilityId,
  },

  // ── Invalid input ─────────────────────────────────────────────────────
  #[error("unknown role: {0}")]
  InvalidRole(RoleId),

  #[error("invalid facility id: {0:?}")]
  InvalidFacilityId(String),

  #[error("invalid operating initials: {0:?}")]
  InvalidInitials(String),

  #[error("{cid} is restricted: {restriction}")]
  Restricted { cid: Cid, restriction: Restriction },

  // ── Authorization ─────────────────────────────────────────────────────
  #[error("forbidden: {action}")]
  Forbidden { action: &'static str },
}

/// A person-level flag that blocks an otherwise valid operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Restriction {
  NoStaffRole,
  NoVisiting,
  NoTransferring,
}

impl fmt::Display for Restriction {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Self::NoStaffRole => "may not hold staff roles",
      Self::NoVisiting => "may not visit other facilities",
      Self::NoTransferring => "may not transfer",
    })
  }
}

/// Coarse classification of an error, used for logging and for mapping onto
/// transport status codes at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  NotFound,
  Conflict,
  InvalidRole,
  Invalid,
  Forbidden,
  /// Storage or decoding failure below the domain layer.
  Storage,
}

impl ErrorKind {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::NotFound => "not_found",
      Self::Conflict => "conflict",
      Self::InvalidRole => "invalid_role",
      Self::Invalid => "invalid",
      Self::Forbidden => "forbidden",
      Self::Storage => "storage",
    }
  }
}

impl fmt::Display for ErrorKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Errors that can report their [`ErrorKind`].
///
/// Implemented by every store backend error so callers can tell a denial from
/// a missing record without knowing the backend.
pub trait Classify {
  fn kind(&self) -> ErrorKind;
}

impl Classify for Error {
  fn kind(&self) -> ErrorKind {
    match self {
      Self::PersonNotFound(_)
      | Self::FacilityNotFound(_)
      | Self::MembershipNotFound(_)
      | Self::RequestNotFound(_)
      | Self::RoleAssignmentNotFound(_) => ErrorKind::NotFound,
      Self::DuplicateFacility(_)
      | Self::DuplicatePerson(_)
      | Self::DuplicateMembership { .. }
      | Self::OperatingInitialsTaken { .. }
      | Self::RequestAlreadyResolved(_)
      | Self::DuplicateRoleAssignment { .. } => ErrorKind::Conflict,
      Self::InvalidRole(_) => ErrorKind::InvalidRole,
      Self::InvalidFacilityId(_)
      | Self::InvalidInitials(_)
      | Self::Restricted { .. } => ErrorKind::Invalid,
      Self::Forbidden { .. } => ErrorKind::Forbidden,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn forbidden_and_not_found_are_distinct() {
    let denied = Error::Forbidden { action: "grant role" };
    let missing = Error::PersonNotFound(Cid(1));
    assert_eq!(denied.kind(), ErrorKind::Forbidden);
    assert_eq!(missing.kind(), ErrorKind::NotFound);
  }

  #[test]
  fn restriction_message() {
    let err = Error::Restricted {
      cid:         Cid(1_293_257),
      restriction: Restriction::NoVisiting,
    };
    assert_eq!(
      err.to_string(),
      "1293257 is restricted: may not visit other facilities"
    );
    assert_eq!(err.kind(), ErrorKind::Invalid);
  }
}
