//! Role-change notifications.
//!
//! The engine informs a [`Notifier`] after every successful grant or revoke.
//! Delivery is best-effort: a failure is logged and never undoes the change.

use std::future::Future;

use thiserror::Error;

use crate::{assignment::RoleAssignment, person::Cid};

#[derive(Debug, Error)]
#[error("notification failed: {0}")]
pub struct NotifyError(pub String);

/// Receives role-change events.
pub trait Notifier: Send + Sync {
  /// `actor` is `None` when the change was made by a trusted operator.
  fn role_granted(
    &self,
    assignment: &RoleAssignment,
    actor: Option<Cid>,
  ) -> impl Future<Output = Result<(), NotifyError>> + Send;

  fn role_revoked(
    &self,
    assignment: &RoleAssignment,
    actor: Option<Cid>,
  ) -> impl Future<Output = Result<(), NotifyError>> + Send;
}

/// A notifier that only emits tracing events.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
  async fn role_granted(
    &self,
    assignment: &RoleAssignment,
    actor: Option<Cid>,
  ) -> Result<(), NotifyError> {
    tracing::info!(
      cid = %assignment.cid,
      role = %assignment.role,
      facility = %assignment.facility,
      actor = ?actor.map(|c| c.0),
      "role granted"
    );
    Ok(())
  }

  async fn role_revoked(
    &self,
    assignment: &RoleAssignment,
    actor: Option<Cid>,
  ) -> Result<(), NotifyError> {
    tracing::info!(
      cid = %assignment.cid,
      role = %assignment.role,
      facility = %assignment.facility,
      actor = ?actor.map(|c| c.0),
      "role revoked"
    );
    Ok(())
  }
}
