// This file is part of mediasort.
// Copyright (c) 2026 The mediasort Authors; see AUTHORS and LICENSE.
// SPDX-License-Identifier: MIT

//! Durable, process-crash-safe record of processed messages and processed
//! videos, backed by an embedded SQLite database with a single writer.

pub mod legacy;

use crate::model::ProcessedVideo;
use base::{ErrorKind, ResultExt as _};
use rusqlite::{named_params, params, OptionalExtension};
use std::sync::Mutex;

const SCHEMA_SQL: &str = r#"
    create table if not exists processed_messages (
        message_key  text primary key,
        seen_at      integer not null
    );

    create table if not exists processed_videos (
        id               integer primary key,
        file_name        text not null,
        normalized_name  text not null,
        topic_name       text not null,
        duration_sec     integer,
        size_mb          real,
        width            integer,
        height           integer,
        mime_type        text,
        processed_at     integer not null,
        unique (normalized_name, topic_name)
    );

    create index if not exists processed_videos_normalized_name
        on processed_videos (normalized_name);
    create index if not exists processed_videos_topic_name
        on processed_videos (topic_name);
    create index if not exists processed_videos_normalized_topic
        on processed_videos (normalized_name, topic_name);
"#;

const HAS_MESSAGE_SQL: &str = r#"
    select 1 from processed_messages where message_key = :key
"#;

const PUT_MESSAGE_SQL: &str = r#"
    insert into processed_messages (message_key, seen_at)
    values (:key, :seen_at)
    on conflict (message_key) do nothing
"#;

const PUT_VIDEO_SQL: &str = r#"
    insert into processed_videos
        (file_name, normalized_name, topic_name, duration_sec, size_mb,
         width, height, mime_type, processed_at)
    values
        (:file_name, :normalized_name, :topic_name, :duration_sec, :size_mb,
         :width, :height, :mime_type, :processed_at)
    on conflict (normalized_name, topic_name) do update set
        file_name = excluded.file_name,
        duration_sec = excluded.duration_sec,
        size_mb = excluded.size_mb,
        width = excluded.width,
        height = excluded.height,
        mime_type = excluded.mime_type,
        processed_at = excluded.processed_at
"#;

const SELECT_VIDEOS_IN_TOPIC_SQL: &str = r#"
    select file_name, normalized_name, topic_name, duration_sec, size_mb,
           width, height, mime_type, processed_at
    from processed_videos
    where topic_name = :topic_name or topic_name = '*'
    order by id
"#;

const DELETE_VIDEOS_SQL_PREFIX: &str = r#"
    delete from processed_videos
    where topic_name in (:topic_name, '*')
    and normalized_name in (
"#;

const COUNT_MESSAGES_SQL: &str = r#"select count(*) from processed_messages"#;
const COUNT_VIDEOS_SQL: &str = r#"select count(*) from processed_videos"#;

/// The durable processed-state store. Single writer, guarded by a `Mutex`
/// around a blocking connection, matching this codebase's single-writer
/// database pattern: Store calls are synchronous, short, and non-suspending.
pub struct Store {
    conn: Mutex<rusqlite::Connection>,
}

impl Store {
    /// Opens (creating if absent) the database at `path`, ensures the schema
    /// exists, and runs the one-shot legacy migration if legacy files are
    /// present alongside it.
    pub fn open(path: &std::path::Path) -> Result<Store, base::Error> {
        let mut conn = rusqlite::Connection::open(path).err_kind(ErrorKind::Internal)?;
        conn.pragma_update(None, "journal_mode", "wal")
            .err_kind(ErrorKind::Internal)?;
        conn.pragma_update(None, "foreign_keys", "on")
            .err_kind(ErrorKind::Internal)?;
        conn.execute_batch(SCHEMA_SQL).err_kind(ErrorKind::Internal)?;
        legacy::migrate_if_present(&mut conn, path)?;
        Ok(Store {
            conn: Mutex::new(conn),
        })
    }

    /// Opens an in-memory store, used by tests.
    pub fn open_in_memory() -> Result<Store, base::Error> {
        let conn = rusqlite::Connection::open_in_memory().err_kind(ErrorKind::Internal)?;
        conn.execute_batch(SCHEMA_SQL).err_kind(ErrorKind::Internal)?;
        Ok(Store {
            conn: Mutex::new(conn),
        })
    }

    pub fn has_message(&self, key: &str) -> Result<bool, base::Error> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare_cached(HAS_MESSAGE_SQL)
            .err_kind(ErrorKind::Internal)?;
        stmt.query_row(named_params! { ":key": key }, |_| Ok(()))
            .optional()
            .err_kind(ErrorKind::Internal)
            .map(|r| r.is_some())
    }

    /// Idempotent: inserting an already-seen key is a silent no-op.
    pub fn put_message(&self, key: &str, seen_at: i64) -> Result<(), base::Error> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare_cached(PUT_MESSAGE_SQL)
            .err_kind(ErrorKind::Internal)?;
        stmt.execute(named_params! { ":key": key, ":seen_at": seen_at })
            .err_kind(ErrorKind::Internal)?;
        Ok(())
    }

    /// Idempotent on `(normalized_name, topic_name)`: a second call for the
    /// same key overwrites the stored metadata.
    pub fn put_video(&self, video: &ProcessedVideo) -> Result<(), base::Error> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare_cached(PUT_VIDEO_SQL)
            .err_kind(ErrorKind::Internal)?;
        stmt.execute(named_params! {
            ":file_name": video.file_name,
            ":normalized_name": video.normalized_name,
            ":topic_name": video.topic_name,
            ":duration_sec": video.duration_sec,
            ":size_mb": video.size_mb,
            ":width": video.width,
            ":height": video.height,
            ":mime_type": video.mime_type,
            ":processed_at": video.processed_at,
        })
        .err_kind(ErrorKind::Internal)?;
        Ok(())
    }

    /// Returns every processed-video row visible to `topic_name` (that topic
    /// plus the legacy `"*"` sentinel), in insertion order.
    pub fn videos_in_topic(&self, topic_name: &str) -> Result<Vec<ProcessedVideo>, base::Error> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare_cached(SELECT_VIDEOS_IN_TOPIC_SQL)
            .err_kind(ErrorKind::Internal)?;
        let rows = stmt
            .query_map(named_params! { ":topic_name": topic_name }, row_to_video)
            .err_kind(ErrorKind::Internal)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.err_kind(ErrorKind::Internal)?);
        }
        Ok(out)
    }

    /// Deletes rows whose `normalized_name` is in `names` and whose
    /// `topic_name` is `topic_name` or the legacy `"*"` sentinel. Returns the
    /// number of rows removed.
    pub fn delete_videos(&self, names: &[String], topic_name: &str) -> Result<usize, base::Error> {
        if names.is_empty() {
            return Ok(0);
        }
        let conn = self.conn.lock().unwrap();
        let placeholders = names
            .iter()
            .enumerate()
            .map(|(i, _)| format!(":n{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!("{DELETE_VIDEOS_SQL_PREFIX}{placeholders})");
        let mut stmt = conn.prepare_cached(&sql).err_kind(ErrorKind::Internal)?;
        let mut bound: Vec<(&str, &dyn rusqlite::ToSql)> = Vec::with_capacity(names.len() + 1);
        bound.push((":topic_name", &topic_name));
        let keys: Vec<String> = (0..names.len()).map(|i| format!(":n{i}")).collect();
        for (k, n) in keys.iter().zip(names.iter()) {
            bound.push((k.as_str(), n));
        }
        let count = stmt
            .execute(bound.as_slice())
            .err_kind(ErrorKind::Internal)?;
        Ok(count)
    }

    pub fn count_messages(&self) -> Result<i64, base::Error> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(COUNT_MESSAGES_SQL, params![], |r| r.get(0))
            .err_kind(ErrorKind::Internal)
    }

    pub fn count_videos(&self) -> Result<i64, base::Error> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(COUNT_VIDEOS_SQL, params![], |r| r.get(0))
            .err_kind(ErrorKind::Internal)
    }

    /// Test/debug assertion that the `(normalized_name, topic_name)`
    /// uniqueness invariant (Testable Property 2) holds, by re-deriving the
    /// duplicate set directly from the table rather than trusting the schema
    /// constraint alone.
    #[doc(hidden)]
    pub fn verify_unique_constraint(&self) -> Result<(), base::Error> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare_cached(
                "select normalized_name, topic_name, count(*) as c
                 from processed_videos
                 group by normalized_name, topic_name
                 having c > 1",
            )
            .err_kind(ErrorKind::Internal)?;
        let mut rows = stmt.query(params![]).err_kind(ErrorKind::Internal)?;
        if rows.next().err_kind(ErrorKind::Internal)?.is_some() {
            return Err(base::format_err_t!(
                Internal,
                "processed_videos uniqueness invariant violated"
            ));
        }
        Ok(())
    }
}

fn row_to_video(row: &rusqlite::Row) -> rusqlite::Result<ProcessedVideo> {
    Ok(ProcessedVideo {
        file_name: row.get(0)?,
        normalized_name: row.get(1)?,
        topic_name: row.get(2)?,
        duration_sec: row.get(3)?,
        size_mb: row.get(4)?,
        width: row.get(5)?,
        height: row.get(6)?,
        mime_type: row.get(7)?,
        processed_at: row.get(8)?,
    })
}
