// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Append-only audit trail.
//!
//! Every state-changing operation appends one [`AuditLogEntry`]. Entries are
//! never updated or deleted. A failed append never rolls back the operation
//! that triggered it; the engine reports it as a warning instead.

use crate::LedgerError;
use crate::base::UserId;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// One immutable audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: u64,
    pub user: UserId,
    /// Domain event name, e.g. `TRANSFER` or `LOAN_APPROVED`.
    pub action: String,
    pub timestamp: DateTime<Utc>,
    pub details: String,
}

/// Destination for audit records.
///
/// Implementations must be durable before returning `Ok`; the engine treats
/// a returned error as [`LedgerError::AuditWriteFailure`].
pub trait AuditSink: Send + Sync {
    fn append(&self, entry: AuditLogEntry) -> Result<(), LedgerError>;
}

/// In-memory audit log. The default sink, and the reference for tests.
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    entries: Mutex<Vec<AuditLogEntry>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all entries in append order.
    pub fn entries(&self) -> Vec<AuditLogEntry> {
        self.entries.lock().clone()
    }

    /// Entries recorded for one user, in append order.
    pub fn entries_for(&self, user: UserId) -> Vec<AuditLogEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.user == user)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl AuditSink for MemoryAuditLog {
    fn append(&self, entry: AuditLogEntry) -> Result<(), LedgerError> {
        self.entries.lock().push(entry);
        Ok(())
    }
}
