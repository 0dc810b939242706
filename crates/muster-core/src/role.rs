//! The role catalog.
//!
//! Every grantable role is listed in a single static table. A [`RoleId`] not
//! in the table is representable (it may arrive from an untrusted caller) but
//! is never valid: lookups on it return sentinels instead of failing.

use std::{borrow::Cow, fmt};

use serde::{Deserialize, Serialize};

// ─── Identifier ──────────────────────────────────────────────────────────────

/// A role identifier such as `ATM` or `DIVISION_STAFF`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleId(Cow<'static, str>);

impl RoleId {
  // Facility roles
  pub const AIR_TRAFFIC_MANAGER: Self = Self::from_static("ATM");
  pub const DEPUTY_AIR_TRAFFIC_MANAGER: Self = Self::from_static("DATM");
  pub const TRAINING_ADMINISTRATOR: Self = Self::from_static("TA");
  pub const EVENT_COORDINATOR: Self = Self::from_static("EC");
  pub const ASSISTANT_EVENT_COORDINATOR: Self = Self::from_static("AEC");
  pub const FACILITY_ENGINEER: Self = Self::from_static("FE");
  pub const ASSISTANT_FACILITY_ENGINEER: Self = Self::from_static("AFE");
  pub const WEBMASTER: Self = Self::from_static("WM");
  pub const ASSISTANT_WEBMASTER: Self = Self::from_static("AWM");
  pub const INSTRUCTOR: Self = Self::from_static("INS");
  pub const MENTOR: Self = Self::from_static("MTR");
  pub const FACILITY_MATERIAL_EDITOR: Self = Self::from_static("FACCBT");
  pub const EMAIL_USER: Self = Self::from_static("EMAIL");

  // Division roles
  pub const DIVISION_MANAGEMENT: Self = Self::from_static("DIVISION_MANAGEMENT");
  pub const DIVISION_STAFF: Self = Self::from_static("DIVISION_STAFF");

  // Division teams
  pub const DEVELOPER_TEAM: Self = Self::from_static("DEV");
  pub const ACE_TEAM: Self = Self::from_static("ACE");
  pub const NTMS: Self = Self::from_static("NTMS");
  pub const NTMT: Self = Self::from_static("NTMT");
  pub const SOCIAL_MEDIA_TEAM: Self = Self::from_static("SMT");
  pub const TRAINING_CONTENT_TEAM: Self = Self::from_static("TCT");
  pub const ACADEMY_MATERIAL_EDITOR: Self = Self::from_static("CBT");

  const fn from_static(id: &'static str) -> Self { Self(Cow::Borrowed(id)) }

  /// Wrap an arbitrary identifier. Input is trimmed and upper-cased; the
  /// result may still be unknown to the catalog.
  pub fn new(id: &str) -> Self { Self(Cow::Owned(id.trim().to_ascii_uppercase())) }

  pub fn as_str(&self) -> &str { &self.0 }

  fn definition(&self) -> Option<&'static RoleDefinition> {
    CATALOG.iter().find(|def| def.id == *self)
  }

  pub fn is_valid(&self) -> bool { self.definition().is_some() }

  /// Human-readable name; `None` for unknown roles.
  pub fn display_name(&self) -> Option<&'static str> {
    self.definition().map(|def| def.name)
  }

  /// Whether the role is held at a particular facility rather than
  /// division-wide. `false` for unknown roles.
  pub fn is_facility_scoped(&self) -> bool {
    self.definition().is_some_and(|def| def.facility_scoped)
  }

  /// [`ManagementTier::Unknown`] for unknown roles; callers must check
  /// [`is_valid`](Self::is_valid) before trusting the result.
  pub fn management_tier(&self) -> ManagementTier {
    self
      .definition()
      .map_or(ManagementTier::Unknown, |def| def.tier)
  }

  /// Roles whose local holders may grant and revoke this one. Only non-empty
  /// for [`ManagementTier::FacilityManaged`] roles.
  pub fn facility_manager_roles(&self) -> &'static [RoleId] {
    self.definition().map_or(NONE, |def| def.facility_managers)
  }
}

impl From<&str> for RoleId {
  fn from(id: &str) -> Self { Self::new(id) }
}

impl fmt::Display for RoleId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

// ─── Catalog ─────────────────────────────────────────────────────────────────

/// Who may grant and revoke a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManagementTier {
  /// Returned for identifiers absent from the catalog.
  Unknown,
  /// Division management only.
  DivisionManagementManaged,
  /// Division management or division staff.
  DivisionManaged,
  /// Division staff, or the facility's own holders of the manager roles.
  FacilityManaged,
}

/// One catalog entry.
#[derive(Debug, Serialize)]
pub struct RoleDefinition {
  pub id:                RoleId,
  pub name:              &'static str,
  pub facility_scoped:   bool,
  pub tier:              ManagementTier,
  pub facility_managers: &'static [RoleId],
}

const fn division(id: RoleId, name: &'static str, tier: ManagementTier) -> RoleDefinition {
  RoleDefinition { id, name, facility_scoped: false, tier, facility_managers: NONE }
}

const fn facility(
  id: RoleId,
  name: &'static str,
  tier: ManagementTier,
  facility_managers: &'static [RoleId],
) -> RoleDefinition {
  RoleDefinition { id, name, facility_scoped: true, tier, facility_managers }
}

use ManagementTier::{DivisionManaged, DivisionManagementManaged, FacilityManaged};

const ATM: RoleId = RoleId::AIR_TRAFFIC_MANAGER;
const DATM: RoleId = RoleId::DEPUTY_AIR_TRAFFIC_MANAGER;

// Manager lists are named consts so the borrowed arrays live for 'static.
const SENIOR: &[RoleId] = &[ATM, DATM];
const SENIOR_AND_EC: &[RoleId] = &[ATM, DATM, RoleId::EVENT_COORDINATOR];
const SENIOR_AND_FE: &[RoleId] = &[ATM, DATM, RoleId::FACILITY_ENGINEER];
const SENIOR_AND_WM: &[RoleId] = &[ATM, DATM, RoleId::WEBMASTER];
const SENIOR_AND_TA: &[RoleId] = &[ATM, DATM, RoleId::TRAINING_ADMINISTRATOR];
const NONE: &[RoleId] = &[];

static CATALOG: &[RoleDefinition] = &[
  // Division
  division(RoleId::DIVISION_MANAGEMENT, "Division Management", DivisionManagementManaged),
  division(RoleId::DIVISION_STAFF, "Division Staff", DivisionManagementManaged),
  division(RoleId::DEVELOPER_TEAM, "Developer Team", DivisionManaged),
  division(RoleId::ACE_TEAM, "ACE Team", DivisionManaged),
  division(RoleId::NTMS, "National Traffic Management Supervisor", DivisionManaged),
  division(RoleId::NTMT, "National Traffic Management Team", DivisionManaged),
  division(RoleId::SOCIAL_MEDIA_TEAM, "Social Media Team", DivisionManaged),
  division(RoleId::TRAINING_CONTENT_TEAM, "Training Content Team", DivisionManaged),
  division(RoleId::ACADEMY_MATERIAL_EDITOR, "Academy Material Editor", DivisionManaged),
  // Facility, division-appointed
  facility(ATM, "Air Traffic Manager", DivisionManaged, NONE),
  facility(DATM, "Deputy Air Traffic Manager", DivisionManaged, NONE),
  facility(RoleId::TRAINING_ADMINISTRATOR, "Training Administrator", DivisionManaged, NONE),
  facility(RoleId::INSTRUCTOR, "Instructor", DivisionManaged, NONE),
  // Facility, locally appointed
  facility(RoleId::EVENT_COORDINATOR, "Event Coordinator", FacilityManaged, SENIOR),
  facility(
    RoleId::ASSISTANT_EVENT_COORDINATOR,
    "Assistant Event Coordinator",
    FacilityManaged,
    SENIOR_AND_EC,
  ),
  facility(RoleId::FACILITY_ENGINEER, "Facility Engineer", FacilityManaged, SENIOR),
  facility(
    RoleId::ASSISTANT_FACILITY_ENGINEER,
    "Assistant Facility Engineer",
    FacilityManaged,
    SENIOR_AND_FE,
  ),
  facility(RoleId::WEBMASTER, "Webmaster", FacilityManaged, SENIOR),
  facility(RoleId::ASSISTANT_WEBMASTER, "Assistant Webmaster", FacilityManaged, SENIOR_AND_WM),
  facility(RoleId::MENTOR, "Mentor", FacilityManaged, SENIOR_AND_TA),
  facility(
    RoleId::FACILITY_MATERIAL_EDITOR,
    "Facility Material Editor",
    FacilityManaged,
    SENIOR_AND_TA,
  ),
  facility(RoleId::EMAIL_USER, "Email User", FacilityManaged, SENIOR),
];

/// Every role in the catalog, in declaration order.
pub fn catalog() -> impl Iterator<Item = &'static RoleDefinition> { CATALOG.iter() }
