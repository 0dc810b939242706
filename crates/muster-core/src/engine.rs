//! Principal-aware orchestration.
//!
//! [`Engine`] is the only place where authorization meets storage. Every
//! mutating method follows the same shape: resolve the records involved,
//! ask [`authz`] whether the principal may act, perform the change through
//! the [`RosterStore`], and, for role changes, inform the [`Notifier`].

use std::{fmt, sync::Arc};

use uuid::Uuid;

use crate::{
  Classify, Error,
  assignment::{NewRoleAssignment, RoleAssignment, RoleFilter},
  authz::{self, MemberSnapshot},
  facility::{Facility, FacilityId, FacilityUpdate},
  membership::{Membership, MembershipFilter, MembershipUpdate, NewMembership},
  notify::{LogNotifier, Notifier},
  person::{Cid, Person, PersonUpdate},
  request::{NewTransferRequest, RequestFilter, Resolution, TransferRequest},
  role::RoleId,
  store::RosterStore,
};

// ─── Principals ──────────────────────────────────────────────────────────────

/// Who is asking.
#[derive(Debug, Clone)]
pub enum Principal {
  /// A person acting as themselves.
  Member(MemberSnapshot),
  /// A facility's own systems, authenticated by API key. A facility may
  /// manage its own roster and requests and may never change roles.
  Facility(FacilityId),
  /// The trusted local host. Allowed everything.
  Operator,
}

impl Principal {
  /// The acting person, if any.
  pub fn cid(&self) -> Option<Cid> {
    match self {
      Self::Member(snapshot) => Some(snapshot.cid),
      Self::Facility(_) | Self::Operator => None,
    }
  }
}

impl fmt::Display for Principal {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Member(snapshot) => write!(f, "member {}", snapshot.cid),
      Self::Facility(id) => write!(f, "facility {id}"),
      Self::Operator => f.write_str("operator"),
    }
  }
}

/// Something a principal may or may not do.
#[derive(Debug, Clone)]
pub enum Capability {
  ViewPerson(Cid),
  EditPerson(Cid),
  /// Set or clear a person's restriction flags.
  RestrictPerson(Cid),
  EditFacility(FacilityId),
  /// Add, edit or remove roster entries and resolve requests.
  ManageRoster(FacilityId),
  SubmitRequest { cid: Cid, facility: FacilityId },
  GrantRole { role: RoleId, facility: FacilityId },
  RevokeRole(RoleAssignment),
  /// Read records across every facility.
  ViewDivision,
}

impl Capability {
  pub fn action(&self) -> &'static str {
    match self {
      Self::ViewPerson(_) => "view person",
      Self::EditPerson(_) => "edit person",
      Self::RestrictPerson(_) => "restrict person",
      Self::EditFacility(_) => "edit facility",
      Self::ManageRoster(_) => "manage roster",
      Self::SubmitRequest { .. } => "submit request",
      Self::GrantRole { .. } => "grant role",
      Self::RevokeRole(_) => "revoke role",
      Self::ViewDivision => "view division records",
    }
  }
}

// ─── Engine ──────────────────────────────────────────────────────────────────

pub struct Engine<S, N = LogNotifier> {
  store:    Arc<S>,
  notifier: N,
}

impl<S: RosterStore> Engine<S> {
  /// An engine that reports role changes to the log only.
  pub fn with_log_notifier(store: Arc<S>) -> Self { Self::new(store, LogNotifier) }
}

impl<S: RosterStore, N: Notifier> Engine<S, N> {
  pub fn new(store: Arc<S>, notifier: N) -> Self { Self { store, notifier } }

  pub fn store(&self) -> &S { &self.store }

  // ── Identity ──────────────────────────────────────────────────────────

  /// Live memberships and role assignments of `cid`. Unknown people get an
  /// empty snapshot.
  pub async fn snapshot(&self, cid: Cid) -> Result<MemberSnapshot, S::Error> {
    let memberships = self
      .store
      .list_memberships(MembershipFilter::person(cid))
      .await?;
    let roles = self
      .store
      .list_role_assignments(RoleFilter { cid: Some(cid), ..RoleFilter::default() })
      .await?;
    Ok(MemberSnapshot::new(cid, memberships, roles))
  }

  /// Resolve a person to a [`Principal::Member`].
  pub async fn member(&self, cid: Cid) -> Result<Principal, S::Error> {
    if self.store.get_person(cid).await?.is_none() {
      return Err(missing(Error::PersonNotFound(cid)));
    }
    Ok(Principal::Member(self.snapshot(cid).await?))
  }

  /// Resolve a facility API key to a [`Principal::Facility`].
  pub async fn facility_principal(&self, api_key: String) -> Result<Principal, S::Error> {
    match self.store.facility_by_api_key(api_key).await? {
      Some(facility) => Ok(Principal::Facility(facility.id)),
      None => {
        tracing::info!(error.kind = %crate::ErrorKind::Forbidden, "unknown facility api key");
        Err(Error::Forbidden { action: "authenticate facility" }.into())
      }
    }
  }

  // ── Decisions ─────────────────────────────────────────────────────────

  /// Whether `principal` may exercise `capability`. Never fails on a
  /// denial; only storage errors are returned.
  pub async fn permits(
    &self,
    principal: &Principal,
    capability: &Capability,
  ) -> Result<bool, S::Error> {
    let actor = match principal {
      Principal::Operator => return Ok(true),
      Principal::Facility(own) => return self.facility_permits(own, capability).await,
      Principal::Member(actor) => actor,
    };
    Ok(match capability {
      Capability::ViewPerson(cid) => authz::can_view_person(actor, &self.snapshot(*cid).await?),
      Capability::EditPerson(cid) => authz::can_edit_person(actor, &self.snapshot(*cid).await?),
      Capability::RestrictPerson(_) => authz::is_org_staff(actor),
      Capability::EditFacility(facility) => authz::can_edit_facility(actor, facility),
      Capability::ManageRoster(facility) => authz::can_manage_roster(actor, facility),
      Capability::SubmitRequest { cid, facility } => {
        *cid == actor.cid || authz::can_manage_roster(actor, facility)
      }
      Capability::GrantRole { role, facility } => authz::can_grant_role(actor, role, facility),
      Capability::RevokeRole(assignment) => authz::can_revoke_role(actor, assignment),
      Capability::ViewDivision => authz::is_org_staff(actor),
    })
  }

  async fn facility_permits(
    &self,
    own: &FacilityId,
    capability: &Capability,
  ) -> Result<bool, S::Error> {
    Ok(match capability {
      Capability::ViewPerson(cid) => self.snapshot(*cid).await?.is_member_of(own),
      Capability::EditFacility(facility)
      | Capability::ManageRoster(facility)
      | Capability::SubmitRequest { facility, .. } => facility == own,
      Capability::EditPerson(_)
      | Capability::RestrictPerson(_)
      | Capability::GrantRole { .. }
      | Capability::RevokeRole(_)
      | Capability::ViewDivision => false,
    })
  }

  async fn require(&self, principal: &Principal, capability: &Capability) -> Result<(), S::Error> {
    if self.permits(principal, capability).await? {
      return Ok(());
    }
    let action = capability.action();
    tracing::info!(
      actor = %principal,
      action,
      error.kind = %crate::ErrorKind::Forbidden,
      "authorization denied"
    );
    Err(Error::Forbidden { action }.into())
  }

  /// Gate a listing. Anyone may read records about themselves; otherwise a
  /// facility-scoped listing needs [`Capability::ManageRoster`] there and an
  /// unscoped one needs [`Capability::ViewDivision`].
  async fn require_listing(
    &self,
    principal: &Principal,
    cid: Option<Cid>,
    facility: Option<&FacilityId>,
  ) -> Result<(), S::Error> {
    if cid.is_some() && principal.cid() == cid {
      return Ok(());
    }
    let capability = match facility {
      Some(facility) => Capability::ManageRoster(facility.clone()),
      None => Capability::ViewDivision,
    };
    self.require(principal, &capability).await
  }

  // ── People and facilities ─────────────────────────────────────────────

  pub async fn view_person(&self, principal: &Principal, cid: Cid) -> Result<Person, S::Error> {
    let person = self.person(cid).await?;
    self.require(principal, &Capability::ViewPerson(cid)).await?;
    Ok(person)
  }

  /// Update a person. Changing restriction flags additionally requires
  /// [`Capability::RestrictPerson`].
  pub async fn update_person(
    &self,
    principal: &Principal,
    cid: Cid,
    update: PersonUpdate,
  ) -> Result<Person, S::Error> {
    self.person(cid).await?;
    self.require(principal, &Capability::EditPerson(cid)).await?;
    if update.flags.is_some() {
      self.require(principal, &Capability::RestrictPerson(cid)).await?;
    }
    let person = self.store.update_person(cid, update).await?;
    tracing::debug!(%cid, actor = %principal, "person updated");
    Ok(person)
  }

  pub async fn update_facility(
    &self,
    principal: &Principal,
    id: FacilityId,
    update: FacilityUpdate,
  ) -> Result<Facility, S::Error> {
    if self.store.get_facility(id.clone()).await?.is_none() {
      return Err(missing(Error::FacilityNotFound(id)));
    }
    self.require(principal, &Capability::EditFacility(id.clone())).await?;
    let facility = self.store.update_facility(id, update).await?;
    tracing::debug!(facility = %facility.id, actor = %principal, "facility updated");
    Ok(facility)
  }

  // ── Roster ────────────────────────────────────────────────────────────

  pub async fn add_to_roster(
    &self,
    principal: &Principal,
    input: NewMembership,
  ) -> Result<Membership, S::Error> {
    self
      .require(principal, &Capability::ManageRoster(input.facility.clone()))
      .await?;
    let membership = self.store.create_membership(input).await?;
    tracing::info!(
      cid = %membership.cid,
      facility = %membership.facility,
      initials = %membership.operating_initials,
      kind = ?membership.kind,
      actor = %principal,
      "added to roster"
    );
    Ok(membership)
  }

  /// List memberships. The live roster of a single facility is public;
  /// anything wider, or including removed records, goes through
  /// [`Self::require_listing`].
  pub async fn list_memberships(
    &self,
    principal: &Principal,
    filter: MembershipFilter,
  ) -> Result<Vec<Membership>, S::Error> {
    let public_roster = filter.facility.is_some() && !filter.include_deleted;
    if !public_roster {
      self
        .require_listing(principal, filter.cid, filter.facility.as_ref())
        .await?;
    }
    self.store.list_memberships(filter).await
  }

  pub async fn update_membership(
    &self,
    principal: &Principal,
    id: Uuid,
    update: MembershipUpdate,
  ) -> Result<Membership, S::Error> {
    let current = self.live_membership(id).await?;
    self
      .require(principal, &Capability::ManageRoster(current.facility))
      .await?;
    let membership = self.store.update_membership(id, update).await?;
    tracing::debug!(%id, actor = %principal, "membership updated");
    Ok(membership)
  }

  pub async fn remove_from_roster(
    &self,
    principal: &Principal,
    id: Uuid,
  ) -> Result<Membership, S::Error> {
    let current = self.live_membership(id).await?;
    self
      .require(principal, &Capability::ManageRoster(current.facility))
      .await?;
    let membership = self.store.delete_membership(id).await?;
    tracing::info!(
      cid = %membership.cid,
      facility = %membership.facility,
      actor = %principal,
      "removed from roster"
    );
    Ok(membership)
  }

  // ── Requests ──────────────────────────────────────────────────────────

  /// Submit a request on someone's behalf, or on one's own.
  pub async fn submit_request(
    &self,
    principal: &Principal,
    input: NewTransferRequest,
  ) -> Result<TransferRequest, S::Error> {
    let capability = Capability::SubmitRequest {
      cid:      input.cid,
      facility: input.facility.clone(),
    };
    self.require(principal, &capability).await?;
    let request = self.store.create_request(input).await?;
    tracing::info!(
      id = %request.id,
      cid = %request.cid,
      facility = %request.facility,
      request_type = ?request.request_type,
      "request submitted"
    );
    Ok(request)
  }

  pub async fn list_requests(
    &self,
    principal: &Principal,
    filter: RequestFilter,
  ) -> Result<Vec<TransferRequest>, S::Error> {
    self
      .require_listing(principal, filter.cid, filter.facility.as_ref())
      .await?;
    self.store.list_requests(filter).await
  }

  pub async fn resolve_request(
    &self,
    principal: &Principal,
    id: Uuid,
    resolution: Resolution,
  ) -> Result<(TransferRequest, Option<Membership>), S::Error> {
    let Some(request) = self.store.get_request(id).await? else {
      return Err(missing(Error::RequestNotFound(id)));
    };
    self
      .require(principal, &Capability::ManageRoster(request.facility))
      .await?;
    let (request, membership) = self.store.resolve_request(id, resolution).await?;
    tracing::info!(
      %id,
      cid = %request.cid,
      facility = %request.facility,
      status = ?request.status,
      actor = %principal,
      "request resolved"
    );
    Ok((request, membership))
  }

  // ── Roles ─────────────────────────────────────────────────────────────

  pub async fn grant_role(
    &self,
    principal: &Principal,
    input: NewRoleAssignment,
  ) -> Result<RoleAssignment, S::Error> {
    if !input.role.is_valid() {
      return Err(Error::InvalidRole(input.role).into());
    }
    let capability = Capability::GrantRole {
      role:     input.role.clone(),
      facility: input.facility.clone(),
    };
    self.require(principal, &capability).await?;

    let assignment = self.store.grant_role(input).await?;
    if let Err(err) = self.notifier.role_granted(&assignment, principal.cid()).await {
      tracing::warn!(
        error = %err,
        cid = %assignment.cid,
        role = %assignment.role,
        facility = %assignment.facility,
        "role grant notification failed"
      );
    }
    Ok(assignment)
  }

  pub async fn revoke_role(
    &self,
    principal: &Principal,
    id: Uuid,
  ) -> Result<RoleAssignment, S::Error> {
    let Some(current) = self.store.get_role_assignment(id).await? else {
      return Err(missing(Error::RoleAssignmentNotFound(id)));
    };
    self.require(principal, &Capability::RevokeRole(current)).await?;

    let assignment = self.store.revoke_role(id).await?;
    if let Err(err) = self.notifier.role_revoked(&assignment, principal.cid()).await {
      tracing::warn!(
        error = %err,
        cid = %assignment.cid,
        role = %assignment.role,
        facility = %assignment.facility,
        "role revoke notification failed"
      );
    }
    Ok(assignment)
  }

  pub async fn list_role_assignments(
    &self,
    principal: &Principal,
    filter: RoleFilter,
  ) -> Result<Vec<RoleAssignment>, S::Error> {
    self
      .require_listing(principal, filter.cid, filter.facility.as_ref())
      .await?;
    self.store.list_role_assignments(filter).await
  }

  // ── Lookups ───────────────────────────────────────────────────────────

  async fn person(&self, cid: Cid) -> Result<Person, S::Error> {
    self
      .store
      .get_person(cid)
      .await?
      .ok_or_else(|| missing(Error::PersonNotFound(cid)))
  }

  async fn live_membership(&self, id: Uuid) -> Result<Membership, S::Error> {
    match self.store.get_membership(id).await? {
      Some(membership) if membership.is_live() => Ok(membership),
      _ => Err(missing(Error::MembershipNotFound(id))),
    }
  }
}

fn missing<E: From<Error>>(err: Error) -> E {
  tracing::debug!(error.kind = %err.kind(), error = %err, "lookup failed");
  err.into()
}
