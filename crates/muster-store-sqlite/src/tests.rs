//! Integration tests for `SqliteStore` against an in-memory database, plus
//! the engine running on top of it.

use std::sync::{Arc, Mutex};

use muster_core::{
  Classify, Error as CoreError, ErrorKind,
  assignment::{NewRoleAssignment, RoleAssignment, RoleFilter},
  engine::{Capability, Engine, Principal},
  error::Restriction,
  facility::{FacilityId, FacilityUpdate, NewFacility},
  membership::{MembershipFilter, MembershipKind, MembershipStatus, MembershipUpdate, NewMembership},
  notify::{Notifier, NotifyError},
  person::{Cid, NewPerson, Person, PersonFlags, PersonUpdate},
  request::{NewTransferRequest, RequestFilter, RequestStatus, RequestType, Resolution},
  role::RoleId,
  store::RosterStore,
};
use uuid::Uuid;

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn fac(code: &str) -> FacilityId { code.parse().unwrap() }

/// A store with ZHQ, ZDV and ZAB registered.
async fn seeded() -> SqliteStore {
  let s = store().await;
  for (code, name) in [("ZHQ", "Headquarters"), ("ZDV", "Denver"), ("ZAB", "Albuquerque")] {
    s.add_facility(NewFacility { id: fac(code), name: name.into(), url: None })
      .await
      .unwrap();
  }
  s
}

async fn person(s: &SqliteStore, cid: u64, first: &str, last: &str, initials: &str) -> Person {
  s.add_person(NewPerson::new(Cid(cid), first, last, initials))
    .await
    .unwrap()
}

fn core(err: Error) -> CoreError {
  match err {
    Error::Core(e) => e,
    other => panic!("expected a domain error, got {other:?}"),
  }
}

// ─── Facilities ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn add_and_get_facility() {
  let s = seeded().await;

  let zdv = s.get_facility(fac("ZDV")).await.unwrap().unwrap();
  assert_eq!(zdv.name, "Denver");
  let key = zdv.api_key.expect("api key generated");
  assert_eq!(key.len(), 64);

  let by_key = s.facility_by_api_key(key).await.unwrap().unwrap();
  assert_eq!(by_key.id, fac("ZDV"));
  assert!(s.facility_by_api_key("nope".into()).await.unwrap().is_none());

  let all = s.list_facilities().await.unwrap();
  let ids: Vec<_> = all.iter().map(|f| f.id.as_str()).collect();
  assert_eq!(ids, ["ZAB", "ZDV", "ZHQ"]);
}

#[tokio::test]
async fn duplicate_facility_is_a_conflict() {
  let s = seeded().await;
  let err = s
    .add_facility(NewFacility { id: fac("zdv"), name: "Again".into(), url: None })
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Conflict);
  assert!(matches!(core(err), CoreError::DuplicateFacility(id) if id == fac("ZDV")));
}

#[tokio::test]
async fn update_facility() {
  let s = seeded().await;
  let updated = s
    .update_facility(fac("ZAB"), FacilityUpdate {
      name: None,
      url:  Some("https://zabartcc.org".into()),
    })
    .await
    .unwrap();
  assert_eq!(updated.name, "Albuquerque");
  assert_eq!(updated.url.as_deref(), Some("https://zabartcc.org"));

  let err = s
    .update_facility(fac("ZLA"), FacilityUpdate::default())
    .await
    .unwrap_err();
  assert!(matches!(core(err), CoreError::FacilityNotFound(_)));
}

// ─── People ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn add_and_update_person() {
  let s = seeded().await;
  let p = person(&s, 1_000_001, "Jane", "Doe", "jd").await;
  assert_eq!(p.preferred_initials, "JD");

  let err = s
    .add_person(NewPerson::new(Cid(1_000_001), "Jane", "Doe", "JD"))
    .await
    .unwrap_err();
  assert!(matches!(core(err), CoreError::DuplicatePerson(Cid(1_000_001))));

  let updated = s
    .update_person(Cid(1_000_001), PersonUpdate {
      preferred_name: Some("JJ".into()),
      flags: Some(PersonFlags { no_visiting: true, ..PersonFlags::default() }),
      ..PersonUpdate::default()
    })
    .await
    .unwrap();
  assert_eq!(updated.display_first_name(), "JJ");
  assert!(updated.flags.no_visiting);

  let fetched = s.get_person(Cid(1_000_001)).await.unwrap().unwrap();
  assert!(fetched.flags.no_visiting);
  assert!(!fetched.flags.no_staff_role);
}

#[tokio::test]
async fn malformed_preferred_initials_are_rejected() {
  let s = seeded().await;
  let err = s
    .add_person(NewPerson::new(Cid(2), "A", "B", "1?"))
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Invalid);
}

// ─── Memberships ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_membership_uses_preferred_initials() {
  let s = seeded().await;
  person(&s, 1, "Raaj", "Patel", "RP").await;

  let m = s
    .create_membership(NewMembership::new(Cid(1), fac("ZDV"), MembershipKind::Home))
    .await
    .unwrap();
  assert_eq!(m.operating_initials, "RP");
  assert!(m.is_home() && !m.is_visiting());
  assert_eq!(m.status, MembershipStatus::Active);

  let fetched = s.get_membership(m.id).await.unwrap().unwrap();
  assert_eq!(fetched.id, m.id);
  assert_eq!(fetched.operating_initials, "RP");
}

#[tokio::test]
async fn second_jd_gets_a_numbered_suffix() {
  let s = seeded().await;
  person(&s, 1, "John", "Dunn", "JD").await;
  person(&s, 2, "Jane", "Doe", "JD").await;

  let first = s
    .create_membership(NewMembership::new(Cid(1), fac("ZDV"), MembershipKind::Home))
    .await
    .unwrap();
  let second = s
    .create_membership(NewMembership::new(Cid(2), fac("ZDV"), MembershipKind::Home))
    .await
    .unwrap();

  assert_eq!(first.operating_initials, "JD");
  assert_eq!(second.operating_initials, "JD1");

  // Initials are per facility.
  let elsewhere = s
    .create_membership(NewMembership::new(Cid(2), fac("ZAB"), MembershipKind::Visiting))
    .await
    .unwrap();
  assert_eq!(elsewhere.operating_initials, "JD");
}

#[tokio::test]
async fn name_initials_when_preferred_is_taken() {
  let s = seeded().await;
  person(&s, 1, "Xavier", "Yu", "XY").await;
  person(&s, 2, "Alice", "Brown", "XY").await;

  s.create_membership(NewMembership::new(Cid(1), fac("ZDV"), MembershipKind::Home))
    .await
    .unwrap();
  let m = s
    .create_membership(NewMembership::new(Cid(2), fac("ZDV"), MembershipKind::Home))
    .await
    .unwrap();
  assert_eq!(m.operating_initials, "AB");
}

#[tokio::test]
async fn duplicate_live_membership_is_rejected() {
  let s = seeded().await;
  person(&s, 1, "Jane", "Doe", "JD").await;
  let input = NewMembership::new(Cid(1), fac("ZDV"), MembershipKind::Home);

  s.create_membership(input.clone()).await.unwrap();
  let err = s.create_membership(input).await.unwrap_err();
  assert!(matches!(core(err), CoreError::DuplicateMembership { cid: Cid(1), .. }));

  // Home and visiting are exclusive: no second record of the other kind.
  let err = s
    .create_membership(NewMembership::new(Cid(1), fac("ZDV"), MembershipKind::Visiting))
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Conflict);

  let live = s
    .list_memberships(MembershipFilter::person(Cid(1)))
    .await
    .unwrap();
  assert_eq!(live.len(), 1);
}

#[tokio::test]
async fn explicit_initials_are_validated_and_unique() {
  let s = seeded().await;
  person(&s, 1, "Jane", "Doe", "JD").await;
  person(&s, 2, "Kim", "Lee", "KL").await;

  let m = s
    .create_membership(
      NewMembership::new(Cid(1), fac("ZDV"), MembershipKind::Home).with_initials("ab"),
    )
    .await
    .unwrap();
  assert_eq!(m.operating_initials, "AB");

  let err = s
    .create_membership(
      NewMembership::new(Cid(2), fac("ZDV"), MembershipKind::Home).with_initials("AB"),
    )
    .await
    .unwrap_err();
  assert!(matches!(core(err), CoreError::OperatingInitialsTaken { .. }));

  let err = s
    .create_membership(
      NewMembership::new(Cid(2), fac("ZDV"), MembershipKind::Home).with_initials("A"),
    )
    .await
    .unwrap_err();
  assert!(matches!(core(err), CoreError::InvalidInitials(_)));

  // Nothing was written by the failed attempts.
  let roster = s
    .list_memberships(MembershipFilter::facility(fac("ZDV")))
    .await
    .unwrap();
  assert_eq!(roster.len(), 1);
}

#[tokio::test]
async fn membership_requires_person_and_facility() {
  let s = seeded().await;
  person(&s, 1, "Jane", "Doe", "JD").await;

  let err = s
    .create_membership(NewMembership::new(Cid(404), fac("ZDV"), MembershipKind::Home))
    .await
    .unwrap_err();
  assert!(matches!(core(err), CoreError::PersonNotFound(Cid(404))));

  let err = s
    .create_membership(NewMembership::new(Cid(1), fac("ZLA"), MembershipKind::Home))
    .await
    .unwrap_err();
  assert!(matches!(core(err), CoreError::FacilityNotFound(_)));
}

#[tokio::test]
async fn manual_initials_edit_must_not_collide() {
  let s = seeded().await;
  person(&s, 1, "Jane", "Doe", "JD").await;
  person(&s, 2, "Kim", "Lee", "KL").await;
  let jd = s
    .create_membership(NewMembership::new(Cid(1), fac("ZDV"), MembershipKind::Home))
    .await
    .unwrap();
  s.create_membership(NewMembership::new(Cid(2), fac("ZDV"), MembershipKind::Home))
    .await
    .unwrap();

  let err = s
    .update_membership(jd.id, MembershipUpdate {
      operating_initials: Some("KL".into()),
      ..MembershipUpdate::default()
    })
    .await
    .unwrap_err();
  assert!(matches!(core(err), CoreError::OperatingInitialsTaken { .. }));

  // Re-submitting one's own initials is not a collision.
  let same = s
    .update_membership(jd.id, MembershipUpdate {
      operating_initials: Some("JD".into()),
      status:             Some(MembershipStatus::LeaveOfAbsence),
    })
    .await
    .unwrap();
  assert_eq!(same.operating_initials, "JD");
  assert_eq!(same.status, MembershipStatus::LeaveOfAbsence);
}

#[tokio::test]
async fn delete_is_soft_and_frees_the_slot() {
  let s = seeded().await;
  person(&s, 1, "Jane", "Doe", "JD").await;
  person(&s, 2, "John", "Dunn", "JD").await;

  let m = s
    .create_membership(NewMembership::new(Cid(1), fac("ZDV"), MembershipKind::Home))
    .await
    .unwrap();
  let deleted = s.delete_membership(m.id).await.unwrap();
  assert!(deleted.deleted_at.is_some());

  // Still retrievable by id, but no longer live.
  let fetched = s.get_membership(m.id).await.unwrap().unwrap();
  assert!(!fetched.is_live());
  assert!(
    s.list_memberships(MembershipFilter::facility(fac("ZDV")))
      .await
      .unwrap()
      .is_empty()
  );
  let history = s
    .list_memberships(MembershipFilter {
      include_deleted: true,
      ..MembershipFilter::facility(fac("ZDV"))
    })
    .await
    .unwrap();
  assert_eq!(history.len(), 1);

  // Initials are free again, and the person may rejoin.
  let other = s
    .create_membership(NewMembership::new(Cid(2), fac("ZDV"), MembershipKind::Home))
    .await
    .unwrap();
  assert_eq!(other.operating_initials, "JD");
  let rejoined = s
    .create_membership(NewMembership::new(Cid(1), fac("ZDV"), MembershipKind::Visiting))
    .await
    .unwrap();
  assert_eq!(rejoined.operating_initials, "JD1");

  let err = s.delete_membership(m.id).await.unwrap_err();
  assert!(matches!(core(err), CoreError::MembershipNotFound(_)));
  let err = s
    .update_membership(m.id, MembershipUpdate::default())
    .await
    .unwrap_err();
  assert!(matches!(core(err), CoreError::MembershipNotFound(_)));
}

#[tokio::test]
async fn list_memberships_by_facility_and_kind() {
  let s = seeded().await;
  for (cid, first) in [(1, "Ann"), (2, "Ben"), (3, "Cat")] {
    person(&s, cid, first, "Smith", "").await;
  }
  s.create_membership(NewMembership::new(Cid(1), fac("ZDV"), MembershipKind::Home))
    .await
    .unwrap();
  s.create_membership(NewMembership::new(Cid(2), fac("ZDV"), MembershipKind::Visiting))
    .await
    .unwrap();
  s.create_membership(NewMembership::new(Cid(3), fac("ZAB"), MembershipKind::Home))
    .await
    .unwrap();
  s.create_membership(NewMembership::new(Cid(3), fac("ZDV"), MembershipKind::Visiting))
    .await
    .unwrap();

  let visitors = s
    .list_memberships(MembershipFilter::facility(fac("ZDV")).with_kind(MembershipKind::Visiting))
    .await
    .unwrap();
  let cids: Vec<_> = visitors.iter().map(|m| m.cid).collect();
  assert_eq!(cids, [Cid(2), Cid(3)]);

  let cat = s
    .list_memberships(MembershipFilter::person(Cid(3)))
    .await
    .unwrap();
  assert_eq!(cat.len(), 2);
}

// ─── Requests ────────────────────────────────────────────────────────────────

fn request(cid: u64, facility: &str, request_type: RequestType) -> NewTransferRequest {
  NewTransferRequest {
    cid: Cid(cid),
    facility: fac(facility),
    request_type,
    reason: "relocating".into(),
  }
}

#[tokio::test]
async fn accepting_a_transfer_creates_a_home_membership() {
  let s = seeded().await;
  person(&s, 1, "Jane", "Doe", "JD").await;

  let req = s
    .create_request(request(1, "ZAB", RequestType::Transferring))
    .await
    .unwrap();
  assert_eq!(req.status, RequestStatus::Pending);

  let (resolved, membership) = s.resolve_request(req.id, Resolution::accept()).await.unwrap();
  assert_eq!(resolved.status, RequestStatus::Accepted);
  let membership = membership.expect("membership created");
  assert_eq!(membership.facility, fac("ZAB"));
  assert!(membership.is_home());

  let stored = s.get_request(req.id).await.unwrap().unwrap();
  assert_eq!(stored.status, RequestStatus::Accepted);
}

#[tokio::test]
async fn accept_with_type_override() {
  let s = seeded().await;
  person(&s, 1, "Jane", "Doe", "JD").await;
  let req = s
    .create_request(request(1, "ZAB", RequestType::Transferring))
    .await
    .unwrap();

  let (resolved, membership) = s
    .resolve_request(req.id, Resolution::Accept {
      request_type: Some(RequestType::Visiting),
      reason:       Some("visit first".into()),
    })
    .await
    .unwrap();
  assert_eq!(resolved.request_type, RequestType::Visiting);
  assert_eq!(resolved.reason, "visit first");
  assert!(membership.unwrap().is_visiting());
}

#[tokio::test]
async fn rejecting_creates_nothing() {
  let s = seeded().await;
  person(&s, 1, "Jane", "Doe", "JD").await;
  let req = s
    .create_request(request(1, "ZAB", RequestType::Visiting))
    .await
    .unwrap();

  let (resolved, membership) = s.resolve_request(req.id, Resolution::reject()).await.unwrap();
  assert_eq!(resolved.status, RequestStatus::Rejected);
  assert!(membership.is_none());
  assert!(
    s.list_memberships(MembershipFilter::person(Cid(1)))
      .await
      .unwrap()
      .is_empty()
  );
}

#[tokio::test]
async fn double_accept_is_rejected_and_creates_one_membership() {
  let s = seeded().await;
  person(&s, 1, "Jane", "Doe", "JD").await;
  let req = s
    .create_request(request(1, "ZDV", RequestType::Visiting))
    .await
    .unwrap();

  s.resolve_request(req.id, Resolution::accept()).await.unwrap();
  let err = s
    .resolve_request(req.id, Resolution::accept())
    .await
    .unwrap_err();
  assert!(matches!(core(err), CoreError::RequestAlreadyResolved(id) if id == req.id));

  let err = s
    .resolve_request(req.id, Resolution::reject())
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Conflict);

  let roster = s
    .list_memberships(MembershipFilter::facility(fac("ZDV")))
    .await
    .unwrap();
  assert_eq!(roster.len(), 1);
}

#[tokio::test]
async fn failed_acceptance_leaves_the_request_pending() {
  let s = seeded().await;
  person(&s, 1, "Jane", "Doe", "JD").await;
  s.create_membership(NewMembership::new(Cid(1), fac("ZDV"), MembershipKind::Visiting))
    .await
    .unwrap();
  let req = s
    .create_request(request(1, "ZDV", RequestType::Transferring))
    .await
    .unwrap();

  let err = s
    .resolve_request(req.id, Resolution::accept())
    .await
    .unwrap_err();
  assert!(matches!(core(err), CoreError::DuplicateMembership { .. }));

  let stored = s.get_request(req.id).await.unwrap().unwrap();
  assert_eq!(stored.status, RequestStatus::Pending);
}

#[tokio::test]
async fn request_validation() {
  let s = seeded().await;
  person(&s, 1, "Jane", "Doe", "JD").await;

  let err = s
    .create_request(request(404, "ZDV", RequestType::Visiting))
    .await
    .unwrap_err();
  assert!(matches!(core(err), CoreError::PersonNotFound(_)));

  let err = s
    .create_request(request(1, "ZLA", RequestType::Visiting))
    .await
    .unwrap_err();
  assert!(matches!(core(err), CoreError::FacilityNotFound(_)));

  let err = s
    .resolve_request(Uuid::new_v4(), Resolution::accept())
    .await
    .unwrap_err();
  assert!(matches!(core(err), CoreError::RequestNotFound(_)));
}

#[tokio::test]
async fn restricted_people_cannot_request() {
  let s = seeded().await;
  person(&s, 1, "Jane", "Doe", "JD").await;
  s.update_person(Cid(1), PersonUpdate {
    flags: Some(PersonFlags { no_visiting: true, ..PersonFlags::default() }),
    ..PersonUpdate::default()
  })
  .await
  .unwrap();

  let err = s
    .create_request(request(1, "ZDV", RequestType::Visiting))
    .await
    .unwrap_err();
  assert!(matches!(
    core(err),
    CoreError::Restricted { restriction: Restriction::NoVisiting, .. }
  ));

  // Transferring is still allowed.
  s.create_request(request(1, "ZDV", RequestType::Transferring))
    .await
    .unwrap();
}

#[tokio::test]
async fn list_requests_filters() {
  let s = seeded().await;
  person(&s, 1, "Jane", "Doe", "JD").await;
  person(&s, 2, "Kim", "Lee", "KL").await;
  let a = s
    .create_request(request(1, "ZDV", RequestType::Visiting))
    .await
    .unwrap();
  s.create_request(request(2, "ZDV", RequestType::Transferring))
    .await
    .unwrap();
  s.create_request(request(2, "ZAB", RequestType::Visiting))
    .await
    .unwrap();
  s.resolve_request(a.id, Resolution::reject()).await.unwrap();

  let all = s.list_requests(RequestFilter::default()).await.unwrap();
  assert_eq!(all.len(), 3);

  let pending_zdv = s
    .list_requests(RequestFilter {
      facility: Some(fac("ZDV")),
      status: Some(RequestStatus::Pending),
      ..RequestFilter::default()
    })
    .await
    .unwrap();
  assert_eq!(pending_zdv.len(), 1);
  assert_eq!(pending_zdv[0].cid, Cid(2));

  let visiting = s
    .list_requests(RequestFilter {
      request_type: Some(RequestType::Visiting),
      ..RequestFilter::default()
    })
    .await
    .unwrap();
  assert_eq!(visiting.len(), 2);
}

// ─── Role assignments ────────────────────────────────────────────────────────

fn grant(cid: u64, role: RoleId, facility: &str) -> NewRoleAssignment {
  NewRoleAssignment { cid: Cid(cid), role, facility: fac(facility) }
}

#[tokio::test]
async fn grant_links_the_live_membership() {
  let s = seeded().await;
  person(&s, 1, "Jane", "Doe", "JD").await;
  let m = s
    .create_membership(NewMembership::new(Cid(1), fac("ZDV"), MembershipKind::Home))
    .await
    .unwrap();

  let linked = s
    .grant_role(grant(1, RoleId::WEBMASTER, "ZDV"))
    .await
    .unwrap();
  assert_eq!(linked.membership_id, Some(m.id));

  let unlinked = s
    .grant_role(grant(1, RoleId::MENTOR, "ZAB"))
    .await
    .unwrap();
  assert_eq!(unlinked.membership_id, None);

  let fetched = s.get_role_assignment(linked.id).await.unwrap().unwrap();
  assert_eq!(fetched.role, RoleId::WEBMASTER);
}

#[tokio::test]
async fn grant_validation() {
  let s = seeded().await;
  person(&s, 1, "Jane", "Doe", "JD").await;

  let err = s
    .grant_role(grant(1, RoleId::new("wizard"), "ZDV"))
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::InvalidRole);

  let err = s
    .grant_role(grant(404, RoleId::MENTOR, "ZDV"))
    .await
    .unwrap_err();
  assert!(matches!(core(err), CoreError::PersonNotFound(_)));

  let err = s
    .grant_role(grant(1, RoleId::MENTOR, "ZLA"))
    .await
    .unwrap_err();
  assert!(matches!(core(err), CoreError::FacilityNotFound(_)));

  s.grant_role(grant(1, RoleId::MENTOR, "ZDV")).await.unwrap();
  let err = s
    .grant_role(grant(1, RoleId::new("mtr"), "ZDV"))
    .await
    .unwrap_err();
  assert!(matches!(core(err), CoreError::DuplicateRoleAssignment { .. }));
}

#[tokio::test]
async fn staff_role_restriction() {
  let s = seeded().await;
  person(&s, 1, "Jane", "Doe", "JD").await;
  s.update_person(Cid(1), PersonUpdate {
    flags: Some(PersonFlags { no_staff_role: true, ..PersonFlags::default() }),
    ..PersonUpdate::default()
  })
  .await
  .unwrap();

  let err = s
    .grant_role(grant(1, RoleId::EVENT_COORDINATOR, "ZDV"))
    .await
    .unwrap_err();
  assert!(matches!(
    core(err),
    CoreError::Restricted { restriction: Restriction::NoStaffRole, .. }
  ));
}

#[tokio::test]
async fn removing_a_membership_keeps_assignments() {
  let s = seeded().await;
  person(&s, 1, "Jane", "Doe", "JD").await;
  let m = s
    .create_membership(NewMembership::new(Cid(1), fac("ZDV"), MembershipKind::Home))
    .await
    .unwrap();
  let a = s
    .grant_role(grant(1, RoleId::EVENT_COORDINATOR, "ZDV"))
    .await
    .unwrap();

  s.delete_membership(m.id).await.unwrap();
  let kept = s.get_role_assignment(a.id).await.unwrap().unwrap();
  assert_eq!(kept.membership_id, Some(m.id));
}

#[tokio::test]
async fn revoke_and_list_roles() {
  let s = seeded().await;
  person(&s, 1, "Jane", "Doe", "JD").await;
  person(&s, 2, "Kim", "Lee", "KL").await;
  let a = s
    .grant_role(grant(1, RoleId::MENTOR, "ZDV"))
    .await
    .unwrap();
  s.grant_role(grant(2, RoleId::MENTOR, "ZDV")).await.unwrap();
  s.grant_role(grant(2, RoleId::INSTRUCTOR, "ZAB"))
    .await
    .unwrap();

  let mentors = s
    .list_role_assignments(RoleFilter {
      role: Some(RoleId::MENTOR),
      facility: Some(fac("ZDV")),
      ..RoleFilter::default()
    })
    .await
    .unwrap();
  assert_eq!(mentors.len(), 2);

  let revoked = s.revoke_role(a.id).await.unwrap();
  assert_eq!(revoked.id, a.id);
  assert!(s.get_role_assignment(a.id).await.unwrap().is_none());

  let err = s.revoke_role(a.id).await.unwrap_err();
  assert!(matches!(core(err), CoreError::RoleAssignmentNotFound(_)));

  let kim = s
    .list_role_assignments(RoleFilter { cid: Some(Cid(2)), ..RoleFilter::default() })
    .await
    .unwrap();
  assert_eq!(kim.len(), 2);
}

// ─── Engine ──────────────────────────────────────────────────────────────────

/// Records notifications; optionally fails every delivery.
#[derive(Clone, Default)]
struct Recorder {
  events: Arc<Mutex<Vec<(&'static str, Cid, Option<Cid>)>>>,
  fail:   bool,
}

impl Recorder {
  fn failing() -> Self { Self { fail: true, ..Self::default() } }

  fn push(&self, event: &'static str, a: &RoleAssignment, actor: Option<Cid>) -> Result<(), NotifyError> {
    self.events.lock().unwrap().push((event, a.cid, actor));
    if self.fail {
      Err(NotifyError("queue unavailable".into()))
    } else {
      Ok(())
    }
  }

  fn events(&self) -> Vec<(&'static str, Cid, Option<Cid>)> { self.events.lock().unwrap().clone() }
}

impl Notifier for Recorder {
  async fn role_granted(&self, a: &RoleAssignment, actor: Option<Cid>) -> Result<(), NotifyError> {
    self.push("granted", a, actor)
  }

  async fn role_revoked(&self, a: &RoleAssignment, actor: Option<Cid>) -> Result<(), NotifyError> {
    self.push("revoked", a, actor)
  }
}

/// ZDV with an ATM (cid 10), a plain home member (cid 20), and HQ with a
/// division staff member (cid 30).
async fn engine(notifier: Recorder) -> Engine<SqliteStore, Recorder> {
  let s = seeded().await;
  person(&s, 10, "Alice", "Manager", "AM").await;
  person(&s, 20, "Bob", "Member", "BM").await;
  person(&s, 30, "Carol", "Staff", "CS").await;
  for (cid, facility) in [(10, "ZDV"), (20, "ZDV"), (30, "ZHQ")] {
    s.create_membership(NewMembership::new(Cid(cid), fac(facility), MembershipKind::Home))
      .await
      .unwrap();
  }
  s.grant_role(grant(10, RoleId::AIR_TRAFFIC_MANAGER, "ZDV"))
    .await
    .unwrap();
  s.grant_role(grant(30, RoleId::DIVISION_STAFF, "ZHQ"))
    .await
    .unwrap();
  Engine::new(Arc::new(s), notifier)
}

#[tokio::test]
async fn facility_manager_grants_locally_and_notifies() {
  let recorder = Recorder::default();
  let e = engine(recorder.clone()).await;
  let atm = e.member(Cid(10)).await.unwrap();

  let a = e
    .grant_role(&atm, grant(20, RoleId::EVENT_COORDINATOR, "ZDV"))
    .await
    .unwrap();
  assert_eq!(recorder.events(), [("granted", Cid(20), Some(Cid(10)))]);

  let err = e
    .grant_role(&atm, grant(20, RoleId::EVENT_COORDINATOR, "ZAB"))
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Forbidden);

  let err = e
    .grant_role(&atm, grant(20, RoleId::INSTRUCTOR, "ZDV"))
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Forbidden);

  e.revoke_role(&atm, a.id).await.unwrap();
  assert_eq!(recorder.events().len(), 2);
  assert_eq!(recorder.events()[1].0, "revoked");
}

#[tokio::test]
async fn notifier_failure_does_not_roll_back() {
  let recorder = Recorder::failing();
  let e = engine(recorder.clone()).await;
  let staff = e.member(Cid(30)).await.unwrap();

  let a = e
    .grant_role(&staff, grant(20, RoleId::INSTRUCTOR, "ZDV"))
    .await
    .unwrap();
  assert_eq!(recorder.events().len(), 1);
  assert!(e.store().get_role_assignment(a.id).await.unwrap().is_some());
}

#[tokio::test]
async fn denied_and_missing_are_distinguishable() {
  let e = engine(Recorder::default()).await;
  let bob = e.member(Cid(20)).await.unwrap();

  let denied = e
    .grant_role(&bob, grant(20, RoleId::MENTOR, "ZDV"))
    .await
    .unwrap_err();
  assert_eq!(denied.kind(), ErrorKind::Forbidden);

  let missing = e.revoke_role(&bob, Uuid::new_v4()).await.unwrap_err();
  assert_eq!(missing.kind(), ErrorKind::NotFound);

  let unknown = e
    .grant_role(&Principal::Operator, grant(20, RoleId::new("WIZARD"), "ZDV"))
    .await
    .unwrap_err();
  assert_eq!(unknown.kind(), ErrorKind::InvalidRole);
}

#[tokio::test]
async fn roster_management_is_scoped_to_the_facility() {
  let e = engine(Recorder::default()).await;
  person(e.store(), 40, "Dan", "New", "DN").await;
  let atm = e.member(Cid(10)).await.unwrap();

  let m = e
    .add_to_roster(&atm, NewMembership::new(Cid(40), fac("ZDV"), MembershipKind::Visiting))
    .await
    .unwrap();
  assert_eq!(m.operating_initials, "DN");

  let err = e
    .add_to_roster(&atm, NewMembership::new(Cid(40), fac("ZAB"), MembershipKind::Visiting))
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Forbidden);

  let updated = e
    .update_membership(&atm, m.id, MembershipUpdate {
      status: Some(MembershipStatus::LeaveOfAbsence),
      ..MembershipUpdate::default()
    })
    .await
    .unwrap();
  assert_eq!(updated.status, MembershipStatus::LeaveOfAbsence);

  let bob = e.member(Cid(20)).await.unwrap();
  let err = e.remove_from_roster(&bob, m.id).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Forbidden);
  e.remove_from_roster(&atm, m.id).await.unwrap();
}

#[tokio::test]
async fn requests_through_the_engine() {
  let e = engine(Recorder::default()).await;
  let bob = e.member(Cid(20)).await.unwrap();
  let atm = e.member(Cid(10)).await.unwrap();

  // Bob may ask for himself, not for others.
  let own = e
    .submit_request(&bob, request(20, "ZAB", RequestType::Visiting))
    .await
    .unwrap();
  let err = e
    .submit_request(&bob, request(10, "ZAB", RequestType::Visiting))
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Forbidden);

  // ZDV's manager cannot resolve a request for ZAB; the facility itself can.
  let err = e
    .resolve_request(&atm, own.id, Resolution::accept())
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Forbidden);

  let key = e
    .store()
    .get_facility(fac("ZAB"))
    .await
    .unwrap()
    .unwrap()
    .api_key
    .unwrap();
  let zab = e.facility_principal(key).await.unwrap();
  let (resolved, membership) = e
    .resolve_request(&zab, own.id, Resolution::accept())
    .await
    .unwrap();
  assert_eq!(resolved.status, RequestStatus::Accepted);
  assert!(membership.unwrap().is_visiting());

  let err = e.facility_principal("bogus".into()).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Forbidden);
}

#[tokio::test]
async fn facility_principals_never_change_roles() {
  let e = engine(Recorder::default()).await;
  let zdv = Principal::Facility(fac("ZDV"));

  assert!(
    e.permits(&zdv, &Capability::ManageRoster(fac("ZDV")))
      .await
      .unwrap()
  );
  assert!(
    !e.permits(&zdv, &Capability::ManageRoster(fac("ZAB")))
      .await
      .unwrap()
  );
  assert!(e.permits(&zdv, &Capability::ViewPerson(Cid(20))).await.unwrap());
  assert!(!e.permits(&zdv, &Capability::ViewPerson(Cid(30))).await.unwrap());

  let err = e
    .grant_role(&zdv, grant(20, RoleId::MENTOR, "ZDV"))
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Forbidden);
}

#[tokio::test]
async fn snapshots_ignore_removed_memberships() {
  let e = engine(Recorder::default()).await;
  let atm_membership = e
    .store()
    .list_memberships(MembershipFilter::person(Cid(10)))
    .await
    .unwrap()
    .remove(0);
  e.store().delete_membership(atm_membership.id).await.unwrap();

  // The ATM assignment survives but confers nothing off the roster.
  let former = e.member(Cid(10)).await.unwrap();
  let Principal::Member(snapshot) = &former else { unreachable!() };
  assert!(snapshot.memberships.is_empty());
  assert_eq!(snapshot.roles.len(), 1);

  let err = e
    .grant_role(&former, grant(20, RoleId::EVENT_COORDINATOR, "ZDV"))
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Forbidden);
}

#[tokio::test]
async fn people_views_and_edits() {
  let e = engine(Recorder::default()).await;
  person(e.store(), 50, "Eve", "Loner", "EL").await;
  let eve = e.member(Cid(50)).await.unwrap();
  let atm = e.member(Cid(10)).await.unwrap();
  let staff = e.member(Cid(30)).await.unwrap();

  // No memberships: may still see oneself, nobody else.
  assert_eq!(e.view_person(&eve, Cid(50)).await.unwrap().cid, Cid(50));
  assert_eq!(
    e.view_person(&eve, Cid(20)).await.unwrap_err().kind(),
    ErrorKind::Forbidden
  );
  assert_eq!(
    e.view_person(&eve, Cid(404)).await.unwrap_err().kind(),
    ErrorKind::NotFound
  );

  // Senior staff edit home members but may not set restrictions.
  e.update_person(&atm, Cid(20), PersonUpdate {
    controller_rating: Some(3),
    ..PersonUpdate::default()
  })
  .await
  .unwrap();
  let restrict = PersonUpdate {
    flags: Some(PersonFlags { no_staff_role: true, ..PersonFlags::default() }),
    ..PersonUpdate::default()
  };
  let err = e
    .update_person(&atm, Cid(20), restrict.clone())
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Forbidden);

  let restricted = e.update_person(&staff, Cid(20), restrict).await.unwrap();
  assert!(restricted.flags.no_staff_role);
  assert_eq!(restricted.controller_rating, 3);
}

#[tokio::test]
async fn facility_edits() {
  let e = engine(Recorder::default()).await;
  let atm = e.member(Cid(10)).await.unwrap();
  let bob = e.member(Cid(20)).await.unwrap();
  let update = FacilityUpdate { name: Some("Denver ARTCC".into()), url: None };

  let err = e
    .update_facility(&bob, fac("ZDV"), update.clone())
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Forbidden);

  let updated = e.update_facility(&atm, fac("ZDV"), update).await.unwrap();
  assert_eq!(updated.name, "Denver ARTCC");
}

#[tokio::test]
async fn listings_are_scoped_to_what_the_principal_manages() {
  let e = engine(Recorder::default()).await;
  let atm = e.member(Cid(10)).await.unwrap();
  let member = e.member(Cid(20)).await.unwrap();
  let staff = e.member(Cid(30)).await.unwrap();
  e.submit_request(&Principal::Operator, request(20, "ZAB", RequestType::Visiting))
    .await
    .unwrap();

  let at = |facility: &str| RequestFilter { facility: Some(fac(facility)), ..RequestFilter::default() };
  let own = RequestFilter { cid: Some(Cid(20)), ..RequestFilter::default() };

  let err = e.list_requests(&member, at("ZAB")).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Forbidden);
  let err = e.list_requests(&atm, at("ZAB")).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Forbidden);
  let err = e
    .list_requests(&Principal::Facility(fac("ZDV")), RequestFilter::default())
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Forbidden);

  assert_eq!(e.list_requests(&member, own).await.unwrap().len(), 1);
  assert!(e.list_requests(&atm, at("ZDV")).await.unwrap().is_empty());
  let zab = Principal::Facility(fac("ZAB"));
  assert_eq!(e.list_requests(&zab, at("ZAB")).await.unwrap().len(), 1);
  assert_eq!(e.list_requests(&staff, RequestFilter::default()).await.unwrap().len(), 1);

  // Live rosters are public; removed records are not.
  let roster = MembershipFilter::facility(fac("ZDV"));
  assert_eq!(e.list_memberships(&member, roster.clone()).await.unwrap().len(), 2);
  let history = MembershipFilter { include_deleted: true, ..roster };
  let err = e.list_memberships(&member, history.clone()).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Forbidden);
  assert_eq!(e.list_memberships(&atm, history).await.unwrap().len(), 2);
  let err = e
    .list_memberships(&member, MembershipFilter::default())
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Forbidden);

  let mine = RoleFilter { cid: Some(Cid(20)), ..RoleFilter::default() };
  assert!(e.list_role_assignments(&member, mine).await.unwrap().is_empty());
  let err = e
    .list_role_assignments(&member, RoleFilter::default())
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Forbidden);
  assert_eq!(e.list_role_assignments(&staff, RoleFilter::default()).await.unwrap().len(), 2);
}

// ─── Concurrency ─────────────────────────────────────────────────────────────

/// Two stores on one database file, with ZDV and two people who both prefer
/// `JD`.
async fn shared_file() -> (tempfile::TempDir, SqliteStore, SqliteStore) {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("muster.db");
  let a = SqliteStore::open(&path).await.unwrap();
  a.add_facility(NewFacility { id: fac("ZDV"), name: "Denver".into(), url: None })
    .await
    .unwrap();
  person(&a, 1, "Jane", "Doe", "JD").await;
  person(&a, 2, "John", "Dee", "JD").await;
  let b = SqliteStore::open(&path).await.unwrap();
  (dir, a, b)
}

#[tokio::test]
async fn concurrent_creates_leave_one_live_membership() {
  let (_dir, a, b) = shared_file().await;
  let new = || NewMembership::new(Cid(1), fac("ZDV"), MembershipKind::Home);

  let (r1, r2) = tokio::join!(a.create_membership(new()), b.create_membership(new()));
  assert_eq!(r1.is_ok() as u8 + r2.is_ok() as u8, 1);
  let err = r1.err().or(r2.err()).unwrap();
  assert_eq!(err.kind(), ErrorKind::Conflict);
  assert!(matches!(core(err), CoreError::DuplicateMembership { cid: Cid(1), .. }));

  let live = b
    .list_memberships(MembershipFilter::person(Cid(1)))
    .await
    .unwrap();
  assert_eq!(live.len(), 1);
}

#[tokio::test]
async fn concurrent_creates_never_share_initials() {
  let (_dir, a, b) = shared_file().await;

  let (r1, r2) = tokio::join!(
    a.create_membership(NewMembership::new(Cid(1), fac("ZDV"), MembershipKind::Home)),
    b.create_membership(NewMembership::new(Cid(2), fac("ZDV"), MembershipKind::Home)),
  );
  let mut initials = [r1.unwrap().operating_initials, r2.unwrap().operating_initials];
  initials.sort();
  assert_eq!(initials[0], "JD");
  assert_ne!(initials[0], initials[1]);
}

#[tokio::test]
async fn store_errors_classify_as_storage() {
  let err = Error::Decode("bad".into());
  assert_eq!(err.kind(), ErrorKind::Storage);
  let err = Error::from(CoreError::Forbidden { action: "grant role" });
  assert_eq!(err.kind(), ErrorKind::Forbidden);
}
