//! Role assignment records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{facility::FacilityId, person::Cid, role::RoleId};

/// A grant of `role` to a person at `facility`.
///
/// `membership_id` points at the roster entry that justified the grant when
/// it was made. It is a lookup hint only: the membership may since have been
/// removed, and removing it never removes the assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleAssignment {
  pub id:            Uuid,
  pub cid:           Cid,
  pub role:          RoleId,
  pub facility:      FacilityId,
  pub membership_id: Option<Uuid>,
  pub created_at:    DateTime<Utc>,
}

/// Input for [`RosterStore::grant_role`](crate::store::RosterStore::grant_role).
#[derive(Debug, Clone)]
pub struct NewRoleAssignment {
  pub cid:      Cid,
  pub role:     RoleId,
  pub facility: FacilityId,
}

/// Parameters for [`RosterStore::list_role_assignments`](crate::store::RosterStore::list_role_assignments).
#[derive(Debug, Clone, Default)]
pub struct RoleFilter {
  pub cid:      Option<Cid>,
  pub role:     Option<RoleId>,
  pub facility: Option<FacilityId>,
}
