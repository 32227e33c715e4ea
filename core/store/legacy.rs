// This file is part of mediasort.
// Copyright (c) 2026 The mediasort Authors; see AUTHORS and LICENSE.
// SPDX-License-Identifier: MIT

//! One-shot ingestion of the legacy plaintext/JSON state files into the
//! SQLite store, run automatically the first time a data directory is
//! opened after upgrading.

use base::{ErrorKind, ResultExt as _};
use serde::Deserialize;
use std::collections::HashMap;
use std::io::{BufRead as _, BufReader};
use std::path::{Path, PathBuf};

const MESSAGES_FILE: &str = "processed-messages.txt";
const VIDEOS_FILE: &str = "processed-messages-videos.txt";
const METADATA_FILE: &str = "processed-messages-metadata.json";

#[derive(Deserialize)]
struct LegacyVideoMetadata {
    #[serde(default)]
    topic_name: Option<String>,
    #[serde(default)]
    duration_sec: Option<i64>,
    #[serde(default)]
    size_mb: Option<f64>,
    #[serde(default)]
    width: Option<i64>,
    #[serde(default)]
    height: Option<i64>,
    #[serde(default)]
    mime_type: Option<String>,
}

/// If any legacy file sits beside `db_path`, ingests all of them into `conn`
/// inside one transaction per table, then renames each legacy file with a
/// `.backup` suffix so the migration never repeats.
pub fn migrate_if_present(
    conn: &mut rusqlite::Connection,
    db_path: &Path,
) -> Result<(), base::Error> {
    let dir = db_path.parent().unwrap_or_else(|| Path::new("."));
    let messages_path = dir.join(MESSAGES_FILE);
    let videos_path = dir.join(VIDEOS_FILE);
    let metadata_path = dir.join(METADATA_FILE);

    if messages_path.exists() {
        migrate_messages(conn, &messages_path)?;
        backup(&messages_path)?;
    }
    if videos_path.exists() {
        let metadata = if metadata_path.exists() {
            read_metadata(&metadata_path)?
        } else {
            HashMap::new()
        };
        migrate_videos(conn, &videos_path, &metadata)?;
        backup(&videos_path)?;
        if metadata_path.exists() {
            backup(&metadata_path)?;
        }
    }
    Ok(())
}

fn migrate_messages(conn: &mut rusqlite::Connection, path: &Path) -> Result<(), base::Error> {
    let file = std::fs::File::open(path).err_kind(ErrorKind::Internal)?;
    let tx = conn.transaction().err_kind(ErrorKind::Internal)?;
    {
        let mut stmt = tx
            .prepare(
                "insert into processed_messages (message_key, seen_at)
                 values (?1, ?2)
                 on conflict (message_key) do nothing",
            )
            .err_kind(ErrorKind::Internal)?;
        for line in BufReader::new(file).lines() {
            let line = line.err_kind(ErrorKind::Internal)?;
            let key = line.trim();
            if key.is_empty() {
                continue;
            }
            stmt.execute(rusqlite::params![key, 0i64])
                .err_kind(ErrorKind::Internal)?;
        }
    }
    tx.commit().err_kind(ErrorKind::Internal)
}

fn migrate_videos(
    conn: &mut rusqlite::Connection,
    path: &Path,
    metadata: &HashMap<String, LegacyVideoMetadata>,
) -> Result<(), base::Error> {
    let file = std::fs::File::open(path).err_kind(ErrorKind::Internal)?;
    let tx = conn.transaction().err_kind(ErrorKind::Internal)?;
    {
        let mut stmt = tx
            .prepare(
                "insert into processed_videos
                    (file_name, normalized_name, topic_name, duration_sec,
                     size_mb, width, height, mime_type, processed_at)
                 values (?1, ?1, ?2, ?3, ?4, ?5, ?6, ?7, 0)
                 on conflict (normalized_name, topic_name) do nothing",
            )
            .err_kind(ErrorKind::Internal)?;
        for line in BufReader::new(file).lines() {
            let line = line.err_kind(ErrorKind::Internal)?;
            let name = line.trim();
            if name.is_empty() {
                continue;
            }
            let meta = metadata.get(name);
            let topic_name = meta
                .and_then(|m| m.topic_name.clone())
                .unwrap_or_else(|| "*".to_string());
            stmt.execute(rusqlite::params![
                name,
                topic_name,
                meta.and_then(|m| m.duration_sec),
                meta.and_then(|m| m.size_mb),
                meta.and_then(|m| m.width),
                meta.and_then(|m| m.height),
                meta.and_then(|m| m.mime_type.clone()),
            ])
            .err_kind(ErrorKind::Internal)?;
        }
    }
    tx.commit().err_kind(ErrorKind::Internal)
}

fn read_metadata(path: &Path) -> Result<HashMap<String, LegacyVideoMetadata>, base::Error> {
    let data = std::fs::read_to_string(path).err_kind(ErrorKind::Internal)?;
    serde_json::from_str(&data).err_kind(ErrorKind::InvalidArgument)
}

fn backup(path: &Path) -> Result<(), base::Error> {
    let backup_path: PathBuf = {
        let mut s = path.as_os_str().to_owned();
        s.push(".backup");
        PathBuf::from(s)
    };
    std::fs::rename(path, backup_path).err_kind(ErrorKind::Internal)
}
