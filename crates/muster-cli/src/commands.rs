//! Subcommand definitions and their execution against the engine.

use anyhow::{Context as _, Result};
use clap::{Args, Subcommand, ValueEnum};
use muster_core::{
  assignment::{NewRoleAssignment, RoleFilter},
  engine::{Capability, Principal},
  facility::{FacilityId, FacilityUpdate, NewFacility},
  membership::{MembershipFilter, MembershipKind, MembershipStatus, MembershipUpdate, NewMembership},
  person::{Cid, NewPerson, PersonFlags, PersonUpdate},
  request::{NewTransferRequest, RequestFilter, RequestStatus, RequestType, Resolution},
  role::{self, RoleId},
  store::RosterStore as _,
};
use muster_store_sqlite::SqliteStore;
use serde_json::{Value, json};
use uuid::Uuid;

pub type Engine = muster_core::engine::Engine<SqliteStore>;

// ─── Command tree ────────────────────────────────────────────────────────────

#[derive(Subcommand)]
pub enum Command {
  /// Register and inspect facilities.
  #[command(subcommand)]
  Facility(FacilityCommand),
  /// Register and edit people.
  #[command(subcommand)]
  Person(PersonCommand),
  /// Manage facility rosters.
  #[command(subcommand)]
  Roster(RosterCommand),
  /// Submit and resolve transfer and visiting requests.
  #[command(subcommand)]
  Request(RequestCommand),
  /// Grant, revoke and list roles.
  #[command(subcommand)]
  Role(RoleCommand),
  /// Ask whether the acting principal holds a capability.
  #[command(subcommand)]
  Check(CheckCommand),
}

#[derive(Subcommand)]
pub enum FacilityCommand {
  Add {
    id:   FacilityId,
    name: String,
    #[arg(long)]
    url:  Option<String>,
  },
  List,
  Show {
    id:         FacilityId,
    /// Include the API key (operator only).
    #[arg(long)]
    reveal_key: bool,
  },
  Update {
    id:   FacilityId,
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    url:  Option<String>,
  },
}

#[derive(Subcommand)]
pub enum PersonCommand {
  Add {
    cid:            u64,
    first_name:     String,
    last_name:      String,
    #[arg(long, default_value = "")]
    initials:       String,
    #[arg(long)]
    preferred_name: Option<String>,
    #[arg(long, default_value_t = 1)]
    rating:         u8,
  },
  Show {
    cid: u64,
  },
  Edit {
    cid:            u64,
    #[arg(long)]
    preferred_name: Option<String>,
    #[arg(long)]
    initials:       Option<String>,
    #[arg(long)]
    rating:         Option<u8>,
  },
  /// Set or clear restriction flags; unspecified flags keep their value.
  Flag {
    cid:             u64,
    #[arg(long)]
    no_staff_role:   Option<bool>,
    #[arg(long)]
    no_visiting:     Option<bool>,
    #[arg(long)]
    no_transferring: Option<bool>,
  },
}

#[derive(Subcommand)]
pub enum RosterCommand {
  Add {
    cid:      u64,
    facility: FacilityId,
    #[arg(long)]
    visiting: bool,
    /// Explicit operating initials; chosen automatically when omitted.
    #[arg(long)]
    initials: Option<String>,
  },
  List {
    facility: FacilityId,
    #[arg(long, value_enum)]
    kind:     Option<KindArg>,
    /// Include removed entries.
    #[arg(long)]
    all:      bool,
  },
  Update {
    id:       Uuid,
    #[arg(long, value_enum)]
    status:   Option<StatusArg>,
    #[arg(long)]
    initials: Option<String>,
  },
  Remove {
    id: Uuid,
  },
}

#[derive(Subcommand)]
pub enum RequestCommand {
  Submit {
    cid:          u64,
    facility:     FacilityId,
    #[arg(value_enum)]
    request_type: RequestTypeArg,
    #[arg(long, default_value = "")]
    reason:       String,
  },
  Resolve {
    id:       Uuid,
    #[arg(value_enum)]
    decision: Decision,
    /// Accept as a different request type.
    #[arg(long = "as-type", value_enum)]
    as_type:  Option<RequestTypeArg>,
    #[arg(long)]
    reason:   Option<String>,
  },
  List(RequestListArgs),
}

#[derive(Args)]
pub struct RequestListArgs {
  #[arg(long)]
  cid:          Option<u64>,
  #[arg(long)]
  facility:     Option<FacilityId>,
  #[arg(long = "type", value_enum)]
  request_type: Option<RequestTypeArg>,
  #[arg(long, value_enum)]
  status:       Option<RequestStatusArg>,
}

#[derive(Subcommand)]
pub enum RoleCommand {
  Grant {
    cid:      u64,
    role:     RoleId,
    facility: FacilityId,
  },
  Revoke {
    id: Uuid,
  },
  List {
    #[arg(long)]
    cid:      Option<u64>,
    #[arg(long)]
    role:     Option<RoleId>,
    #[arg(long)]
    facility: Option<FacilityId>,
  },
  /// Print the role catalog.
  Catalog,
}

#[derive(Subcommand)]
pub enum CheckCommand {
  ViewPerson { cid: u64 },
  EditPerson { cid: u64 },
  EditFacility { facility: FacilityId },
  ManageRoster { facility: FacilityId },
  GrantRole { role: RoleId, facility: FacilityId },
}

// ─── Value enums ─────────────────────────────────────────────────────────────

#[derive(Clone, Copy, ValueEnum)]
pub enum KindArg {
  Home,
  Visiting,
}

impl From<KindArg> for MembershipKind {
  fn from(kind: KindArg) -> Self {
    match kind {
      KindArg::Home => Self::Home,
      KindArg::Visiting => Self::Visiting,
    }
  }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum StatusArg {
  Active,
  Loa,
}

impl From<StatusArg> for MembershipStatus {
  fn from(status: StatusArg) -> Self {
    match status {
      StatusArg::Active => Self::Active,
      StatusArg::Loa => Self::LeaveOfAbsence,
    }
  }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum RequestTypeArg {
  Visiting,
  Transferring,
}

impl From<RequestTypeArg> for RequestType {
  fn from(rt: RequestTypeArg) -> Self {
    match rt {
      RequestTypeArg::Visiting => Self::Visiting,
      RequestTypeArg::Transferring => Self::Transferring,
    }
  }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum RequestStatusArg {
  Pending,
  Accepted,
  Rejected,
}

impl From<RequestStatusArg> for RequestStatus {
  fn from(status: RequestStatusArg) -> Self {
    match status {
      RequestStatusArg::Pending => Self::Pending,
      RequestStatusArg::Accepted => Self::Accepted,
      RequestStatusArg::Rejected => Self::Rejected,
    }
  }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum Decision {
  Accept,
  Reject,
}

// ─── Execution ───────────────────────────────────────────────────────────────

impl Command {
  pub async fn run(self, engine: &Engine, principal: &Principal) -> Result<Value> {
    match self {
      Self::Facility(cmd) => cmd.run(engine, principal).await,
      Self::Person(cmd) => cmd.run(engine, principal).await,
      Self::Roster(cmd) => cmd.run(engine, principal).await,
      Self::Request(cmd) => cmd.run(engine, principal).await,
      Self::Role(cmd) => cmd.run(engine, principal).await,
      Self::Check(cmd) => cmd.run(engine, principal).await,
    }
  }
}

fn require_operator(principal: &Principal, what: &str) -> Result<()> {
  match principal {
    Principal::Operator => Ok(()),
    _ => anyhow::bail!("{what} is restricted to the operator"),
  }
}

impl FacilityCommand {
  async fn run(self, engine: &Engine, principal: &Principal) -> Result<Value> {
    let store = engine.store();
    Ok(match self {
      Self::Add { id, name, url } => {
        require_operator(principal, "registering facilities")?;
        let facility = store
          .add_facility(NewFacility { id, name, url })
          .await
          .context("failed to add facility")?;
        json!(facility)
      }
      Self::List => {
        let facilities = store
          .list_facilities()
          .await
          .context("failed to list facilities")?;
        json!(facilities.iter().map(|f| f.redacted()).collect::<Vec<_>>())
      }
      Self::Show { id, reveal_key } => {
        if reveal_key {
          require_operator(principal, "revealing API keys")?;
        }
        let facility = store
          .get_facility(id.clone())
          .await
          .context("failed to load facility")?
          .with_context(|| format!("facility {id} not found"))?;
        if reveal_key { json!(facility) } else { json!(facility.redacted()) }
      }
      Self::Update { id, name, url } => {
        let facility = engine
          .update_facility(principal, id, FacilityUpdate { name, url })
          .await
          .context("failed to update facility")?;
        json!(facility.redacted())
      }
    })
  }
}

impl PersonCommand {
  async fn run(self, engine: &Engine, principal: &Principal) -> Result<Value> {
    Ok(match self {
      Self::Add { cid, first_name, last_name, initials, preferred_name, rating } => {
        require_operator(principal, "registering people")?;
        let person = engine
          .store()
          .add_person(NewPerson {
            cid: Cid(cid),
            first_name,
            last_name,
            preferred_name,
            preferred_initials: initials,
            controller_rating: rating,
          })
          .await
          .context("failed to add person")?;
        json!(person)
      }
      Self::Show { cid } => {
        let person = engine
          .view_person(principal, Cid(cid))
          .await
          .context("failed to load person")?;
        let memberships = engine
          .store()
          .list_memberships(MembershipFilter::person(Cid(cid)))
          .await
          .context("failed to load memberships")?;
        let roles = engine
          .store()
          .list_role_assignments(RoleFilter { cid: Some(Cid(cid)), ..RoleFilter::default() })
          .await
          .context("failed to load roles")?;
        json!({ "person": person, "memberships": memberships, "roles": roles })
      }
      Self::Edit { cid, preferred_name, initials, rating } => {
        let update = PersonUpdate {
          preferred_name,
          preferred_initials: initials,
          controller_rating: rating,
          flags: None,
        };
        let person = engine
          .update_person(principal, Cid(cid), update)
          .await
          .context("failed to edit person")?;
        json!(person)
      }
      Self::Flag { cid, no_staff_role, no_visiting, no_transferring } => {
        let current = engine
          .view_person(principal, Cid(cid))
          .await
          .context("failed to load person")?
          .flags;
        let flags = PersonFlags {
          no_staff_role:   no_staff_role.unwrap_or(current.no_staff_role),
          no_visiting:     no_visiting.unwrap_or(current.no_visiting),
          no_transferring: no_transferring.unwrap_or(current.no_transferring),
        };
        let update = PersonUpdate { flags: Some(flags), ..PersonUpdate::default() };
        let person = engine
          .update_person(principal, Cid(cid), update)
          .await
          .context("failed to update flags")?;
        json!(person)
      }
    })
  }
}

impl RosterCommand {
  async fn run(self, engine: &Engine, principal: &Principal) -> Result<Value> {
    Ok(match self {
      Self::Add { cid, facility, visiting, initials } => {
        let kind = if visiting { MembershipKind::Visiting } else { MembershipKind::Home };
        let mut input = NewMembership::new(Cid(cid), facility, kind);
        input.operating_initials = initials;
        let membership = engine
          .add_to_roster(principal, input)
          .await
          .context("failed to add to roster")?;
        json!(membership)
      }
      Self::List { facility, kind, all } => {
        let filter = MembershipFilter {
          kind: kind.map(Into::into),
          include_deleted: all,
          ..MembershipFilter::facility(facility)
        };
        let roster = engine
          .list_memberships(principal, filter)
          .await
          .context("failed to list roster")?;
        json!(roster)
      }
      Self::Update { id, status, initials } => {
        let update = MembershipUpdate {
          status:             status.map(Into::into),
          operating_initials: initials,
        };
        let membership = engine
          .update_membership(principal, id, update)
          .await
          .context("failed to update membership")?;
        json!(membership)
      }
      Self::Remove { id } => {
        let membership = engine
          .remove_from_roster(principal, id)
          .await
          .context("failed to remove from roster")?;
        json!(membership)
      }
    })
  }
}

impl RequestCommand {
  async fn run(self, engine: &Engine, principal: &Principal) -> Result<Value> {
    Ok(match self {
      Self::Submit { cid, facility, request_type, reason } => {
        let input = NewTransferRequest {
          cid: Cid(cid),
          facility,
          request_type: request_type.into(),
          reason,
        };
        let request = engine
          .submit_request(principal, input)
          .await
          .context("failed to submit request")?;
        json!(request)
      }
      Self::Resolve { id, decision, as_type, reason } => {
        let resolution = match decision {
          Decision::Accept => Resolution::Accept { request_type: as_type.map(Into::into), reason },
          Decision::Reject => Resolution::Reject { reason },
        };
        let (request, membership) = engine
          .resolve_request(principal, id, resolution)
          .await
          .context("failed to resolve request")?;
        json!({ "request": request, "membership": membership })
      }
      Self::List(args) => {
        let filter = RequestFilter {
          cid:          args.cid.map(Cid),
          facility:     args.facility,
          request_type: args.request_type.map(Into::into),
          status:       args.status.map(Into::into),
        };
        let requests = engine
          .list_requests(principal, filter)
          .await
          .context("failed to list requests")?;
        json!(requests)
      }
    })
  }
}

impl RoleCommand {
  async fn run(self, engine: &Engine, principal: &Principal) -> Result<Value> {
    Ok(match self {
      Self::Grant { cid, role, facility } => {
        let assignment = engine
          .grant_role(principal, NewRoleAssignment { cid: Cid(cid), role, facility })
          .await
          .context("failed to grant role")?;
        json!(assignment)
      }
      Self::Revoke { id } => {
        let assignment = engine
          .revoke_role(principal, id)
          .await
          .context("failed to revoke role")?;
        json!(assignment)
      }
      Self::List { cid, role, facility } => {
        let assignments = engine
          .list_role_assignments(principal, RoleFilter { cid: cid.map(Cid), role, facility })
          .await
          .context("failed to list roles")?;
        json!(assignments)
      }
      Self::Catalog => json!(role::catalog().collect::<Vec<_>>()),
    })
  }
}

impl CheckCommand {
  async fn run(self, engine: &Engine, principal: &Principal) -> Result<Value> {
    let capability = match self {
      Self::ViewPerson { cid } => Capability::ViewPerson(Cid(cid)),
      Self::EditPerson { cid } => Capability::EditPerson(Cid(cid)),
      Self::EditFacility { facility } => Capability::EditFacility(facility),
      Self::ManageRoster { facility } => Capability::ManageRoster(facility),
      Self::GrantRole { role, facility } => Capability::GrantRole { role, facility },
    };
    let allowed = engine
      .permits(principal, &capability)
      .await
      .context("failed to evaluate capability")?;
    Ok(json!({
      "actor": principal.to_string(),
      "action": capability.action(),
      "allowed": allowed,
    }))
  }
}
