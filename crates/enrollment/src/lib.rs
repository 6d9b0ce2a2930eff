//! Admissions portal for a pre & primary school.
//!
//! Guardians register applicant accounts, submit enrollment applications and pay the
//! application fee; staff review applications and reconcile payments. The crate owns the
//! domain model, the storage backends and the axum routers; `enrollment-api` wires them
//! into a running service.

pub mod applications;
pub mod config;
pub mod error;
pub mod identity;
pub mod payments;
pub mod portal;
pub mod site;
pub mod store;
pub mod telemetry;

#[cfg(test)]
mod fixtures;
