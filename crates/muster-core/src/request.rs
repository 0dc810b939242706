//! Transfer and visiting requests.
//!
//! A request starts [`RequestStatus::Pending`] and is resolved exactly once,
//! to `Accepted` or `Rejected`. Accepting a request places the person on the
//! facility roster; the membership and the status change are written
//! together or not at all.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{facility::FacilityId, membership::MembershipKind, person::Cid};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestType {
  Visiting,
  Transferring,
}

impl RequestType {
  /// The kind of membership an accepted request of this type creates.
  pub fn membership_kind(self) -> MembershipKind {
    match self {
      Self::Visiting => MembershipKind::Visiting,
      Self::Transferring => MembershipKind::Home,
    }
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
  #[default]
  Pending,
  Accepted,
  Rejected,
}

impl RequestStatus {
  pub fn is_terminal(self) -> bool { !matches!(self, Self::Pending) }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRequest {
  pub id:           Uuid,
  pub cid:          Cid,
  pub facility:     FacilityId,
  pub request_type: RequestType,
  pub status:       RequestStatus,
  pub reason:       String,
  pub created_at:   DateTime<Utc>,
  pub updated_at:   DateTime<Utc>,
}

impl TransferRequest {
  /// Apply a resolution to a pending request, returning the updated record.
  ///
  /// Returns `None` if the request is already resolved.
  pub fn resolved(&self, resolution: &Resolution, at: DateTime<Utc>) -> Option<Self> {
    if self.status.is_terminal() {
      return None;
    }
    let mut next = self.clone();
    next.status = resolution.status();
    next.updated_at = at;
    if let Resolution::Accept { request_type: Some(rt), .. } = resolution {
      next.request_type = *rt;
    }
    if let Some(reason) = resolution.reason() {
      next.reason = reason.to_owned();
    }
    Some(next)
  }
}

/// Input for [`RosterStore::create_request`](crate::store::RosterStore::create_request).
#[derive(Debug, Clone)]
pub struct NewTransferRequest {
  pub cid:          Cid,
  pub facility:     FacilityId,
  pub request_type: RequestType,
  pub reason:       String,
}

/// How staff resolve a pending request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
  /// Accept, optionally overriding the request type (e.g. accepting a
  /// transfer request as a visit).
  Accept {
    request_type: Option<RequestType>,
    reason:       Option<String>,
  },
  Reject { reason: Option<String> },
}

impl Resolution {
  pub fn accept() -> Self { Self::Accept { request_type: None, reason: None } }

  pub fn reject() -> Self { Self::Reject { reason: None } }

  pub fn status(&self) -> RequestStatus {
    match self {
      Self::Accept { .. } => RequestStatus::Accepted,
      Self::Reject { .. } => RequestStatus::Rejected,
    }
  }

  pub fn reason(&self) -> Option<&str> {
    match self {
      Self::Accept { reason, .. } | Self::Reject { reason } => reason.as_deref(),
    }
  }
}

/// Parameters for [`RosterStore::list_requests`](crate::store::RosterStore::list_requests).
/// Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct RequestFilter {
  pub cid:          Option<Cid>,
  pub facility:     Option<FacilityId>,
  pub request_type: Option<RequestType>,
  pub status:       Option<RequestStatus>,
}
