//! Hierarchical authorization.
//!
//! Every decision is a pure function of one or two [`MemberSnapshot`]s. No
//! function here performs I/O or returns an error: a denial is `false`, and
//! it is up to the caller to turn that into [`Error::Forbidden`](crate::Error::Forbidden).
//!
//! A role counts as held *at* a facility only while the holder is also on
//! that facility's roster. An assignment whose membership has been removed
//! grants nothing until the person rejoins.

use crate::{
  assignment::RoleAssignment,
  facility::FacilityId,
  membership::Membership,
  person::Cid,
  role::{ManagementTier, RoleId},
};

const SENIOR_STAFF: &[RoleId] = &[
  RoleId::AIR_TRAFFIC_MANAGER,
  RoleId::DEPUTY_AIR_TRAFFIC_MANAGER,
  RoleId::TRAINING_ADMINISTRATOR,
];

const JUNIOR_STAFF: &[RoleId] = &[
  RoleId::FACILITY_ENGINEER,
  RoleId::WEBMASTER,
  RoleId::EVENT_COORDINATOR,
];

const FACILITY_EDITORS: &[RoleId] = &[
  RoleId::AIR_TRAFFIC_MANAGER,
  RoleId::DEPUTY_AIR_TRAFFIC_MANAGER,
  RoleId::WEBMASTER,
];

const DIVISION_MANAGEMENT: &[RoleId] = &[RoleId::DIVISION_MANAGEMENT];

const DIVISION_STAFF: &[RoleId] = &[RoleId::DIVISION_MANAGEMENT, RoleId::DIVISION_STAFF];

/// Everything the engine needs to know about one person: their live
/// memberships and their role assignments.
#[derive(Debug, Clone)]
pub struct MemberSnapshot {
  pub cid:         Cid,
  pub memberships: Vec<Membership>,
  pub roles:       Vec<RoleAssignment>,
}

impl MemberSnapshot {
  /// Build a snapshot, discarding soft-deleted memberships.
  pub fn new(cid: Cid, memberships: Vec<Membership>, roles: Vec<RoleAssignment>) -> Self {
    let memberships = memberships.into_iter().filter(Membership::is_live).collect();
    Self { cid, memberships, roles }
  }

  /// A snapshot of someone on no roster, holding no roles.
  pub fn empty(cid: Cid) -> Self { Self::new(cid, Vec::new(), Vec::new()) }

  pub fn is_member_of(&self, facility: &FacilityId) -> bool {
    self.memberships.iter().any(|m| m.facility == *facility)
  }

  /// Facilities where this person is a home member.
  pub fn home_facilities(&self) -> impl Iterator<Item = &FacilityId> {
    self.memberships.iter().filter(|m| m.is_home()).map(|m| &m.facility)
  }

  /// Holds any of `roles` at `facility`, and is on its roster.
  pub fn holds_any_at(&self, roles: &[RoleId], facility: &FacilityId) -> bool {
    self.is_member_of(facility)
      && self
        .roles
        .iter()
        .any(|a| a.facility == *facility && roles.contains(&a.role))
  }

  /// Holds any of `roles` at any facility whose roster they are on.
  pub fn holds_any(&self, roles: &[RoleId]) -> bool {
    self
      .roles
      .iter()
      .any(|a| roles.contains(&a.role) && self.is_member_of(&a.facility))
  }
}

// ─── Staff predicates ────────────────────────────────────────────────────────

/// On the headquarters roster.
pub fn is_org_staff(actor: &MemberSnapshot) -> bool {
  actor.is_member_of(&FacilityId::HEADQUARTERS)
}

/// Manager, deputy manager or training administrator at `facility`.
pub fn is_facility_senior_staff(actor: &MemberSnapshot, facility: &FacilityId) -> bool {
  actor.holds_any_at(SENIOR_STAFF, facility)
}

/// Senior staff, or engineer, webmaster or event coordinator at `facility`.
pub fn is_facility_staff(actor: &MemberSnapshot, facility: &FacilityId) -> bool {
  is_facility_senior_staff(actor, facility) || actor.holds_any_at(JUNIOR_STAFF, facility)
}

fn holds_org_role(actor: &MemberSnapshot, roles: &[RoleId]) -> bool {
  is_org_staff(actor) && actor.holds_any(roles)
}

// ─── Decisions ───────────────────────────────────────────────────────────────

pub fn can_view_person(actor: &MemberSnapshot, target: &MemberSnapshot) -> bool {
  actor.cid == target.cid
    || is_org_staff(actor)
    || target.home_facilities().any(|f| is_facility_staff(actor, f))
}

pub fn can_edit_person(actor: &MemberSnapshot, target: &MemberSnapshot) -> bool {
  is_org_staff(actor)
    || target
      .home_facilities()
      .any(|f| is_facility_senior_staff(actor, f))
}

pub fn can_edit_facility(actor: &MemberSnapshot, facility: &FacilityId) -> bool {
  is_org_staff(actor) || actor.holds_any_at(FACILITY_EDITORS, facility)
}

/// Add to or remove from the roster, edit memberships, and resolve requests.
pub fn can_manage_roster(actor: &MemberSnapshot, facility: &FacilityId) -> bool {
  is_org_staff(actor) || is_facility_senior_staff(actor, facility)
}

pub fn can_grant_role(actor: &MemberSnapshot, role: &RoleId, facility: &FacilityId) -> bool {
  match role.management_tier() {
    ManagementTier::Unknown => false,
    ManagementTier::DivisionManagementManaged => holds_org_role(actor, DIVISION_MANAGEMENT),
    ManagementTier::DivisionManaged => holds_org_role(actor, DIVISION_STAFF),
    ManagementTier::FacilityManaged => {
      holds_org_role(actor, DIVISION_STAFF)
        || actor.holds_any_at(role.facility_manager_roles(), facility)
    }
  }
}

/// Revocation follows the same rules as granting.
pub fn can_revoke_role(actor: &MemberSnapshot, assignment: &RoleAssignment) -> bool {
  can_grant_role(actor, &assignment.role, &assignment.facility)
}
