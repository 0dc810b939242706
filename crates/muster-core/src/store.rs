//! The `RosterStore` trait.
//!
//! The trait is implemented by storage backends (e.g. `muster-store-sqlite`).
//! The [`engine`](crate::engine) and the CLI depend on this abstraction, not
//! on any concrete backend.
//!
//! Stores enforce the data invariants (live-membership uniqueness, initials
//! uniqueness, single resolution of requests) but never authorization: every
//! method assumes the caller has already been allowed to perform it.

use std::future::Future;

use uuid::Uuid;

use crate::{
  Classify,
  assignment::{NewRoleAssignment, RoleAssignment, RoleFilter},
  facility::{Facility, FacilityId, FacilityUpdate, NewFacility},
  membership::{Membership, MembershipFilter, MembershipUpdate, NewMembership},
  person::{Cid, NewPerson, Person, PersonUpdate},
  request::{NewTransferRequest, RequestFilter, Resolution, TransferRequest},
};

/// Abstraction over a Muster roster store backend.
///
/// All methods return `Send` futures so the trait can be used from
/// multi-threaded async runtimes.
pub trait RosterStore: Send + Sync {
  /// Backend error. Domain failures travel as [`crate::Error`] inside it and
  /// are recovered through [`Classify`].
  type Error: std::error::Error + Classify + From<crate::Error> + Send + Sync + 'static;

  // ── Facilities ────────────────────────────────────────────────────────

  /// Register a facility. A fresh API key is generated.
  fn add_facility(
    &self,
    input: NewFacility,
  ) -> impl Future<Output = Result<Facility, Self::Error>> + Send + '_;

  fn get_facility(
    &self,
    id: FacilityId,
  ) -> impl Future<Output = Result<Option<Facility>, Self::Error>> + Send + '_;

  fn list_facilities(&self) -> impl Future<Output = Result<Vec<Facility>, Self::Error>> + Send + '_;

  fn update_facility(
    &self,
    id: FacilityId,
    update: FacilityUpdate,
  ) -> impl Future<Output = Result<Facility, Self::Error>> + Send + '_;

  /// Look a facility up by its API key.
  fn facility_by_api_key(
    &self,
    key: String,
  ) -> impl Future<Output = Result<Option<Facility>, Self::Error>> + Send + '_;

  // ── People ────────────────────────────────────────────────────────────

  fn add_person(
    &self,
    input: NewPerson,
  ) -> impl Future<Output = Result<Person, Self::Error>> + Send + '_;

  fn get_person(
    &self,
    cid: Cid,
  ) -> impl Future<Output = Result<Option<Person>, Self::Error>> + Send + '_;

  fn update_person(
    &self,
    cid: Cid,
    update: PersonUpdate,
  ) -> impl Future<Output = Result<Person, Self::Error>> + Send + '_;

  // ── Memberships ───────────────────────────────────────────────────────

  /// Place a person on a facility roster.
  ///
  /// Fails with `DuplicateMembership` if a live membership already exists
  /// for the pair. Explicit initials are validated and must be free; absent
  /// initials are chosen by [`initials::assign`](crate::initials::assign).
  fn create_membership(
    &self,
    input: NewMembership,
  ) -> impl Future<Output = Result<Membership, Self::Error>> + Send + '_;

  /// Retrieve a membership by id, including soft-deleted ones.
  fn get_membership(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Membership>, Self::Error>> + Send + '_;

  fn update_membership(
    &self,
    id: Uuid,
    update: MembershipUpdate,
  ) -> impl Future<Output = Result<Membership, Self::Error>> + Send + '_;

  /// Soft-delete a membership. Role assignments that reference it are kept.
  fn delete_membership(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Membership, Self::Error>> + Send + '_;

  fn list_memberships(
    &self,
    filter: MembershipFilter,
  ) -> impl Future<Output = Result<Vec<Membership>, Self::Error>> + Send + '_;

  // ── Requests ──────────────────────────────────────────────────────────

  /// Record a new pending request.
  fn create_request(
    &self,
    input: NewTransferRequest,
  ) -> impl Future<Output = Result<TransferRequest, Self::Error>> + Send + '_;

  fn get_request(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<TransferRequest>, Self::Error>> + Send + '_;

  /// Resolve a pending request.
  ///
  /// Accepting creates the membership in the same transaction as the status
  /// change; if that fails, the request stays pending. Returns the updated
  /// request and the membership created, if any.
  fn resolve_request(
    &self,
    id: Uuid,
    resolution: Resolution,
  ) -> impl Future<Output = Result<(TransferRequest, Option<Membership>), Self::Error>>
  + Send
  + '_;

  fn list_requests(
    &self,
    filter: RequestFilter,
  ) -> impl Future<Output = Result<Vec<TransferRequest>, Self::Error>> + Send + '_;

  // ── Role assignments ──────────────────────────────────────────────────

  /// Record a role grant. Does not check authorization.
  fn grant_role(
    &self,
    input: NewRoleAssignment,
  ) -> impl Future<Output = Result<RoleAssignment, Self::Error>> + Send + '_;

  /// Delete an assignment and return it.
  fn revoke_role(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<RoleAssignment, Self::Error>> + Send + '_;

  fn get_role_assignment(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<RoleAssignment>, Self::Error>> + Send + '_;

  fn list_role_assignments(
    &self,
    filter: RoleFilter,
  ) -> impl Future<Output = Result<Vec<RoleAssignment>, Self::Error>> + Send + '_;
}
