/*
 * keyceremony: key-splitting ceremony engine and shell
 * Copyright (C) 2024-2026 keyceremony authors
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

//! Session audit trail.
//!
//! Two forms are emitted into the session folder: a line-delimited text log
//! written incrementally as the ceremony runs (so a crash still leaves
//! evidence), and on finalize a structured `audit_detail_<ts>.json` with the
//! full entry sequence. Audit writes never fail a ceremony -- an unwritable
//! audit file is logged and swallowed, because the ceremony outcome matters
//! more than its paper trail.

use std::{
    fs::{File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub event_type: String,
    pub user: String,
    pub machine: String,
    pub message: String,
}

impl AuditEntry {
    /// The text-log line form:
    /// `<iso-ts> | <session_id> | <event_type> | <user>@<machine> | <message>`
    fn to_line(&self) -> String {
        format!(
            "{} | {} | {} | {}@{} | {}",
            self.timestamp.to_rfc3339(),
            self.session_id,
            self.event_type,
            self.user,
            self.machine,
            self.message
        )
    }
}

pub struct AuditLog {
    enabled: bool,
    session_id: String,
    user: String,
    machine: String,
    log_path: PathBuf,
    entries: Vec<AuditEntry>,
}

impl AuditLog {
    pub fn new(
        enabled: bool,
        session_folder: &Path,
        session_id: &str,
        user: &str,
        machine: &str,
        stamp: &str,
    ) -> Self {
        Self {
            enabled,
            session_id: session_id.to_string(),
            user: user.to_string(),
            machine: machine.to_string(),
            log_path: session_folder.join(format!("audit_{}.log", stamp)),
            entries: Vec::new(),
        }
    }

    /// Record an entry and append its line to the text log immediately.
    pub fn record(&mut self, event_type: &str, message: impl Into<String>) {
        if !self.enabled {
            return;
        }
        let entry = AuditEntry {
            timestamp: Utc::now(),
            session_id: self.session_id.clone(),
            event_type: event_type.to_string(),
            user: self.user.clone(),
            machine: self.machine.clone(),
            message: message.into(),
        };

        if let Err(err) = self.append_line(&entry) {
            warn!(
                path = %self.log_path.display(),
                error = %err,
                "audit log line could not be written"
            );
        }
        self.entries.push(entry);
    }

    fn append_line(&self, entry: &AuditEntry) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)?;
        writeln!(file, "{}", entry.to_line())
    }

    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    pub fn count_of(&self, event_type: &str) -> usize {
        self.entries
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }

    /// Write the structured detail file. Failure is reported to the caller,
    /// who logs and swallows it.
    pub fn write_detail(&self, session_folder: &Path, stamp: &str) -> std::io::Result<PathBuf> {
        let path = session_folder.join(format!("audit_detail_{}.json", stamp));
        let json = serde_json::to_string_pretty(&self.entries)
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))?;
        let mut file = File::create(&path)?;
        file.write_all(json.as_bytes())?;
        Ok(path)
    }
}
