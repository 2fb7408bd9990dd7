// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! GID allocation table
//!
//! Process-wide allocation state for tenant group ids, scoped per storage
//! class. The table itself is a plain sorted set over a numeric range; the
//! allocator wraps one table per class behind a mutex and primes each table
//! from on-disk metadata (via the injected [`GidReclaimer`]) the first time
//! that class allocates.
//!
//! Invariant: within a class, at most one live tenant directory holds a given
//! GID. Double allocation is a [`GidError::Conflict`], never merged.

use crate::domain::error::ProvisionError;
use parking_lot::Mutex;
use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GidError {
    #[error("gid {0} is already allocated")]
    Conflict(u32),

    #[error("gid {gid} is outside the allocation range {min}..={max}")]
    OutOfRange { gid: u32, min: u32, max: u32 },

    #[error("gid range {min}..={max} is exhausted")]
    Exhausted { min: u32, max: u32 },

    #[error("invalid gid range {min}..={max}")]
    InvalidRange { min: u32, max: u32 },
}

/// Repopulates a freshly created allocation table from persisted state.
///
/// Implementations scan previously created tenant directories and insert every
/// GID recorded for the given class. Per-directory failures must be skipped,
/// not propagated: a single corrupt directory never prevents the rest of the
/// fleet's GIDs from being reclaimed.
pub trait GidReclaimer: Send + Sync {
    fn reclaim(&self, class_name: &str, table: &mut GidTable) -> std::io::Result<()>;
}

/// In-use GIDs within an inclusive numeric range
#[derive(Debug)]
pub struct GidTable {
    min: u32,
    max: u32,
    used: BTreeSet<u32>,
}

impl GidTable {
    pub fn new(min: u32, max: u32) -> Result<Self, GidError> {
        if min > max {
            return Err(GidError::InvalidRange { min, max });
        }
        Ok(Self {
            min,
            max,
            used: BTreeSet::new(),
        })
    }

    /// Allocate the lowest free GID in the range
    pub fn allocate_next(&mut self) -> Result<u32, GidError> {
        let mut candidate = self.min;
        for used in self.used.range(self.min..=self.max) {
            if *used > candidate {
                break;
            }
            candidate = match candidate.checked_add(1) {
                Some(next) => next,
                None => {
                    return Err(GidError::Exhausted {
                        min: self.min,
                        max: self.max,
                    })
                }
            };
        }
        if candidate > self.max {
            return Err(GidError::Exhausted {
                min: self.min,
                max: self.max,
            });
        }
        self.used.insert(candidate);
        Ok(candidate)
    }

    /// Allocate a specific GID
    pub fn allocate(&mut self, gid: u32) -> Result<(), GidError> {
        if gid < self.min || gid > self.max {
            return Err(GidError::OutOfRange {
                gid,
                min: self.min,
                max: self.max,
            });
        }
        if !self.used.insert(gid) {
            return Err(GidError::Conflict(gid));
        }
        Ok(())
    }

    /// Release a GID. Idempotent: releasing a free GID is not an error.
    pub fn release(&mut self, gid: u32) -> bool {
        self.used.remove(&gid)
    }

    pub fn contains(&self, gid: u32) -> bool {
        self.used.contains(&gid)
    }

    pub fn allocated_count(&self) -> usize {
        self.used.len()
    }
}

/// Per-class GID allocation, internally synchronized.
///
/// Each class's table is created lazily on its first allocation, sized by the
/// request's range bounds, and primed synchronously by the reclaimer before
/// the first GID for that class is handed out. Later requests for the same
/// class reuse the existing table; their range bounds are not re-checked
/// (class parameters are expected to be stable).
pub struct GidAllocator {
    reclaimer: Arc<dyn GidReclaimer>,
    tables: Mutex<HashMap<String, GidTable>>,
}

impl GidAllocator {
    pub fn new(reclaimer: Arc<dyn GidReclaimer>) -> Self {
        Self {
            reclaimer,
            tables: Mutex::new(HashMap::new()),
        }
    }

    fn with_table<T>(
        &self,
        class_name: &str,
        min: u32,
        max: u32,
        f: impl FnOnce(&mut GidTable) -> Result<T, GidError>,
    ) -> Result<T, ProvisionError> {
        let mut tables = self.tables.lock();
        let table = match tables.entry(class_name.to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let mut table = GidTable::new(min, max)?;
                info!(
                    class = class_name,
                    min, max, "priming gid table from existing volume directories"
                );
                self.reclaimer.reclaim(class_name, &mut table)?;
                debug!(
                    class = class_name,
                    reclaimed = table.allocated_count(),
                    "gid table primed"
                );
                entry.insert(table)
            }
        };
        f(table).map_err(ProvisionError::from)
    }

    /// Allocate the next free GID for the class
    pub fn allocate_next(
        &self,
        class_name: &str,
        min: u32,
        max: u32,
    ) -> Result<u32, ProvisionError> {
        self.with_table(class_name, min, max, |table| table.allocate_next())
    }

    /// Allocate a specific GID for the class
    pub fn allocate(
        &self,
        class_name: &str,
        gid: u32,
        min: u32,
        max: u32,
    ) -> Result<(), ProvisionError> {
        self.with_table(class_name, min, max, |table| table.allocate(gid))
    }

    /// Release a GID for the class. Idempotent; releasing into a class whose
    /// table was never created is a no-op.
    pub fn release(&self, class_name: &str, gid: u32) {
        let mut tables = self.tables.lock();
        if let Some(table) = tables.get_mut(class_name) {
            if table.release(gid) {
                debug!(class = class_name, gid, "released gid");
            }
        }
    }

    /// Whether a GID is currently allocated within the class
    pub fn is_allocated(&self, class_name: &str, gid: u32) -> bool {
        self.tables
            .lock()
            .get(class_name)
            .map(|t| t.contains(gid))
            .unwrap_or(false)
    }
}
