//! Core types and decision logic for the Muster roster service.
//!
//! This crate is deliberately free of HTTP and database dependencies. It
//! holds the domain records, the static role catalog, the operating-initials
//! algorithm, the authorization engine, and the [`store::RosterStore`]
//! contract that storage backends implement.

pub mod assignment;
pub mod authz;
pub mod engine;
pub mod error;
pub mod facility;
pub mod initials;
pub mod membership;
pub mod notify;
pub mod person;
pub mod request;
pub mod role;
pub mod store;

pub use error::{Classify, Error, ErrorKind, Result};
