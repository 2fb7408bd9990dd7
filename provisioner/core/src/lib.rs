// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! EFS directory provisioner core
//!
//! Provisions and reclaims per-tenant storage directories on a pre-mounted
//! network filesystem, with group-id (GID) based access isolation between
//! tenants.
//!
//! # Architecture
//!
//! - **domain**: claim identity, request parameters, the published volume
//!   descriptor, the sidecar ownership record, and the GID allocation table.
//! - **application**: the volume lifecycle engine (create vs. reuse vs.
//!   reject, rollback, deletion).
//! - **infrastructure**: path translation, sidecar metadata IO, the startup
//!   GID reclaim scan, mount-table discovery, and group-ownership changes.

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
