//! # Launchpad Control Plane Library
//!
//! Core functionality for the Launchpad tenant-provisioning and
//! schema-upgrade orchestrator, including the fleet-admin API handlers,
//! provider clients, and registry repositories.

pub mod auth;
pub mod catalog;
pub mod config;
pub mod crypto;
pub mod db;
pub mod domains;
pub mod error;
pub mod flags;
pub mod handlers;
pub mod models;
pub mod provider;
pub mod provisioner;
pub mod repositories;
pub mod server;
pub mod telemetry;
pub mod upgrade;
pub use migration;
