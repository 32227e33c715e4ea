// This file is part of mediasort.
// Copyright (c) 2026 The mediasort Authors; see AUTHORS and LICENSE.
// SPDX-License-Identifier: MIT

//! Append-only JSON-array log of successful forwards.
//!
//! Single-writer, read-modify-write: acceptable because this tool is a
//! single-writer process per data directory (enforced by the `.lock`
//! sentinel the binary takes on startup).

use base::{ErrorKind, ResultExt as _};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ForwardAuditEntry {
    pub timestamp: i64,
    pub file_name: String,
    pub matched_keyword: String,
    pub topic_name: String,
    pub source_group: String,
    pub duration: Option<i64>,
    pub size_mb: f64,
}

pub struct AuditLog {
    path: std::path::PathBuf,
    lock: Mutex<()>,
}

impl AuditLog {
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        AuditLog {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Appends `entry`, rewriting the whole file under the process-local
    /// lock. An absent or empty file is treated as an empty array.
    pub fn append(&self, entry: ForwardAuditEntry) -> Result<(), base::Error> {
        let _guard = self.lock.lock().unwrap();
        let mut entries = self.read_all_locked()?;
        entries.push(entry);
        let json = serde_json::to_string_pretty(&entries).err_kind(ErrorKind::Internal)?;
        std::fs::write(&self.path, json).err_kind(ErrorKind::Internal)?;
        Ok(())
    }

    pub fn read_all(&self) -> Result<Vec<ForwardAuditEntry>, base::Error> {
        let _guard = self.lock.lock().unwrap();
        self.read_all_locked()
    }

    fn read_all_locked(&self) -> Result<Vec<ForwardAuditEntry>, base::Error> {
        match std::fs::read_to_string(&self.path) {
            Ok(s) if s.trim().is_empty() => Ok(Vec::new()),
            Ok(s) => serde_json::from_str(&s).err_kind(ErrorKind::Internal),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e).err_kind(ErrorKind::Internal),
        }
    }
}
