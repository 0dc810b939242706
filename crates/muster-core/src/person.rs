//! People: the individuals who appear on facility rosters.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A person's numeric global identity.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Cid(pub u64);

impl fmt::Display for Cid {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { self.0.fmt(f) }
}

/// Restrictions placed on a person by division staff.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonFlags {
  /// May not be granted any role.
  pub no_staff_role:   bool,
  /// May not request visiting membership anywhere.
  pub no_visiting:     bool,
  /// May not request a transfer.
  pub no_transferring: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Person {
  pub cid:                Cid,
  pub first_name:         String,
  pub last_name:          String,
  pub preferred_name:     Option<String>,
  /// Two-character initials the person would like to operate under.
  pub preferred_initials: String,
  pub controller_rating:  u8,
  pub flags:              PersonFlags,
  pub created_at:         DateTime<Utc>,
  pub updated_at:         DateTime<Utc>,
}

impl Person {
  /// Preferred name if set, otherwise the first name.
  pub fn display_first_name(&self) -> &str {
    self.preferred_name.as_deref().unwrap_or(&self.first_name)
  }
}

/// Input for [`RosterStore::add_person`](crate::store::RosterStore::add_person).
#[derive(Debug, Clone)]
pub struct NewPerson {
  pub cid:                Cid,
  pub first_name:         String,
  pub last_name:          String,
  pub preferred_name:     Option<String>,
  pub preferred_initials: String,
  pub controller_rating:  u8,
}

impl NewPerson {
  /// Convenience constructor with no preferred name and the lowest rating.
  pub fn new(
    cid: Cid,
    first_name: impl Into<String>,
    last_name: impl Into<String>,
    preferred_initials: impl Into<String>,
  ) -> Self {
    Self {
      cid,
      first_name: first_name.into(),
      last_name: last_name.into(),
      preferred_name: None,
      preferred_initials: preferred_initials.into(),
      controller_rating: 1,
    }
  }
}

/// Partial update of a person. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct PersonUpdate {
  pub preferred_name:     Option<String>,
  pub preferred_initials: Option<String>,
  pub controller_rating:  Option<u8>,
  pub flags:              Option<PersonFlags>,
}
