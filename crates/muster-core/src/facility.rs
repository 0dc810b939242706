//! Facilities: the organizational subdivisions that own rosters.

use std::{borrow::Cow, fmt, str::FromStr};

use chrono::{DateTime, Utc};
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// ─── Identifier ──────────────────────────────────────────────────────────────

/// A short, stable facility code such as `ZDV` or `ZHQ`.
///
/// Always 2–4 ASCII uppercase letters or digits. Parsing upper-cases its
/// input.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FacilityId(Cow<'static, str>);

impl FacilityId {
  /// Division headquarters. Membership here makes a person division staff.
  pub const HEADQUARTERS: Self = Self::from_static("ZHQ");
  pub const ACADEMY: Self = Self::from_static("ZAE");
  pub const NON_MEMBER: Self = Self::from_static("ZZN");
  pub const INACTIVE: Self = Self::from_static("ZZI");

  /// Callers must pass an already-valid code.
  const fn from_static(code: &'static str) -> Self { Self(Cow::Borrowed(code)) }

  pub fn as_str(&self) -> &str { &self.0 }

  /// Facilities directly adjacent to this one. Empty when the facility has no
  /// published neighbours.
  pub fn tier_one_neighbors(&self) -> &'static [FacilityId] {
    TIER_ONE
      .iter()
      .find(|(id, _)| id == self)
      .map(|(_, neighbors)| *neighbors)
      .unwrap_or(&[])
  }

  pub fn is_tier_one(&self, other: &FacilityId) -> bool {
    self.tier_one_neighbors().contains(other)
  }
}

impl FromStr for FacilityId {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    let code = s.trim().to_ascii_uppercase();
    let valid = (2..=4).contains(&code.len())
      && code.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit());
    if !valid {
      return Err(Error::InvalidFacilityId(s.to_owned()));
    }
    Ok(Self(Cow::Owned(code)))
  }
}

impl TryFrom<String> for FacilityId {
  type Error = Error;

  fn try_from(value: String) -> Result<Self> { value.parse() }
}

impl From<FacilityId> for String {
  fn from(id: FacilityId) -> Self { id.0.into_owned() }
}

impl fmt::Display for FacilityId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

// ─── Tier-one adjacency ──────────────────────────────────────────────────────

const fn id(code: &'static str) -> FacilityId { FacilityId::from_static(code) }

/// Directional adjacency; only facilities with published neighbours appear.
static TIER_ONE: &[(FacilityId, &[FacilityId])] = &[
  (id("ZAB"), &[id("ZLA"), id("ZDV"), id("ZKC"), id("ZFW"), id("ZHU")]),
  (id("ZLA"), &[id("ZOA"), id("ZLC"), id("ZDV"), id("ZAB"), id("HCF")]),
  (id("ZOA"), &[id("ZSE"), id("ZLC"), id("ZLA"), id("HCF")]),
  (id("ZSE"), &[id("ZAN"), id("ZLC"), id("ZOA"), id("HCF")]),
  (id("HCF"), &[id("ZAN"), id("ZSE"), id("ZOA"), id("ZLA")]),
  (id("ZDV"), &[id("ZLC"), id("ZMP"), id("ZKC"), id("ZAB"), id("ZLA")]),
  (id("ZHU"), &[id("ZAB"), id("ZFW"), id("ZME"), id("ZJX")]),
];

// ─── Records ─────────────────────────────────────────────────────────────────

/// A facility as persisted by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Facility {
  pub id:         FacilityId,
  pub name:       String,
  pub url:        Option<String>,
  /// Long-lived credential the facility's own systems authenticate with.
  pub api_key:    Option<String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl Facility {
  /// A copy with the API key removed, safe to show to untrusted callers.
  pub fn redacted(&self) -> Self {
    Self { api_key: None, ..self.clone() }
  }
}

/// Input for [`RosterStore::add_facility`](crate::store::RosterStore::add_facility).
#[derive(Debug, Clone)]
pub struct NewFacility {
  pub id:   FacilityId,
  pub name: String,
  pub url:  Option<String>,
}

/// Partial update of a facility's mutable attributes.
#[derive(Debug, Clone, Default)]
pub struct FacilityUpdate {
  pub name: Option<String>,
  pub url:  Option<String>,
}

/// Generate a fresh facility API key: 32 random bytes, hex-encoded.
pub fn generate_api_key() -> String {
  let mut key = [0u8; 32];
  OsRng.fill_bytes(&mut key);
  hex::encode(key)
}
