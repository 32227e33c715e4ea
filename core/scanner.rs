// This file is part of mediasort.
// Copyright (c) 2026 The mediasort Authors; see AUTHORS and LICENSE.
// SPDX-License-Identifier: MIT

//! Walks one source chat's history, applies the Video Predicate, and drives
//! the dedup-then-forward loop per candidate.
//!
//! The two invariants that make this module subtle: a message is
//! pre-committed to `processed_messages` *before* anything else is done with
//! it (so a failure downstream never causes a re-forward on the next run),
//! and a new `(normalizedName, topic)` is pre-registered in the Store
//! *before* the forward fan-out is launched (so an identical candidate later
//! in the same batch sees it as a duplicate rather than forwarding again).

use crate::audit::AuditLog;
use crate::chat::{ChatClient, TopicId};
use crate::config::Config;
use crate::driver;
use crate::forwarder;
use crate::model::{message_key, ChatId, Media, ProcessedVideo};
use crate::oracle;
use crate::predicate;
use crate::report::RunSummary;
use crate::store::Store;
use crate::topic_cache::TopicCache;
use base::clock::Clocks;
use base::shutdown;
use base::{ErrorKind, ResultExt as _};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

const PAGE_SIZE: u32 = 100;
const BATCH_SLEEP: Duration = Duration::from_millis(500);

/// What one `scan_source` call accomplished, fed back into the caller's
/// running total against `maxForwards`.
pub struct ScanResult {
    pub messages_processed: u64,
    /// Cumulative forward count across the whole run, including this source.
    pub total_forwarded_after: u64,
    /// Set once the forward cap is hit; the caller should stop scanning
    /// further sources.
    pub cap_reached: bool,
}

/// Scans `source_chat_id`, forwarding matching, non-duplicate videos into
/// `dest_chat_id` under the topic named by each matched keyword.
/// `topic_anchors` maps each configured keyword to the destination topic's
/// anchor message id, as returned by `provision_topic`.
#[allow(clippy::too_many_arguments)]
pub async fn scan_source<C: ChatClient + ?Sized, Clk: Clocks>(
    client: &C,
    clocks: &Clk,
    shutdown: &shutdown::Receiver,
    store: &Store,
    audit_log: &AuditLog,
    topic_cache: &TopicCache<C>,
    config: &Config,
    source_chat_id: ChatId,
    source_group: &str,
    dest_chat_id: ChatId,
    topic_anchors: &HashMap<String, TopicId>,
    forwarded_so_far: u64,
    summary: &mut RunSummary,
) -> Result<ScanResult, base::Error> {
    let mut messages_processed: u64 = 0;
    let mut total_forwarded = forwarded_so_far;
    let mut cap_reached = false;
    let mut offset_id = None;

    'batches: loop {
        if shutdown.check().is_err() {
            break;
        }

        let page = driver::with_retries(clocks, shutdown, "get_history_page", || {
            client.get_history_page(source_chat_id, offset_id, PAGE_SIZE)
        })
        .await
        .err_kind(ErrorKind::Unavailable)?;
        if page.is_empty() {
            break;
        }
        offset_id = page.last().map(|m| m.message_id);

        for message in &page {
            if shutdown.check().is_err() {
                break 'batches;
            }
            if !matches!(message.media, Media::Video { .. }) {
                continue;
            }

            let key = message_key(message.chat_id, message.message_id);
            if store.has_message(&key)? {
                continue;
            }
            let now = realtime_secs(clocks);
            store.put_message(&key, now)?;

            let keywords = predicate::matched_keywords(
                message,
                &config.video_matches,
                &config.video_exclusions,
                config.min_video_duration_in_seconds,
            );
            if keywords.is_empty() {
                debug!(source_chat_id, message_id = message.message_id, "touched, no match");
                continue;
            }

            if total_forwarded >= config.max_forwards {
                cap_reached = true;
                break 'batches;
            }

            let candidate = predicate::to_candidate(message, config.duplicate_detection.normalize_filenames)
                .expect("Media::Video checked above");

            if let Some(max_dur) = config.max_video_duration_in_seconds {
                if candidate.duration_sec.is_some_and(|d| d > max_dur) {
                    debug!(source_chat_id, message_id = message.message_id, "skipped: over max duration");
                    continue;
                }
            }
            if let Some(min_mb) = config.min_file_size_mb {
                if candidate.size_mb < min_mb {
                    debug!(source_chat_id, message_id = message.message_id, "skipped: under min size");
                    continue;
                }
            }
            if let Some(max_mb) = config.max_file_size_mb {
                if candidate.size_mb > max_mb {
                    debug!(source_chat_id, message_id = message.message_id, "skipped: over max size");
                    continue;
                }
            }

            let mut existing_topics = Vec::new();
            let mut new_topics = Vec::new();
            for &kw in &keywords {
                match oracle::find_similar(store, &candidate, kw, &config.duplicate_detection)? {
                    Some(_) => existing_topics.push(kw),
                    None => new_topics.push(kw),
                }
            }
            if existing_topics.len() == keywords.len() {
                debug!(
                    source_chat_id,
                    message_id = message.message_id,
                    file_name = %candidate.file_name,
                    "already present in every matched topic"
                );
                continue;
            }

            if !config.dry_run {
                for &kw in &new_topics {
                    store.put_video(&ProcessedVideo {
                        file_name: candidate.file_name.clone(),
                        normalized_name: candidate.normalized_name.clone(),
                        topic_name: kw.to_string(),
                        duration_sec: candidate.duration_sec,
                        size_mb: Some(candidate.size_mb),
                        width: candidate.width,
                        height: candidate.height,
                        mime_type: candidate.mime_type.clone(),
                        processed_at: now,
                    })?;
                }
            }

            for &kw in &existing_topics {
                let Some(&topic_id) = topic_anchors.get(kw) else {
                    continue;
                };
                let dups = oracle::find_all_similar(store, &candidate, kw, &config.duplicate_detection)?;
                if dups.is_empty() {
                    continue;
                }
                let names: Vec<String> = dups.iter().map(|d| d.normalized_name.clone()).collect();
                let matched = topic_cache
                    .find_messages_by_normalized_name(
                        clocks,
                        shutdown,
                        dest_chat_id,
                        topic_id,
                        &names,
                        &candidate,
                        &config.duplicate_detection,
                    )
                    .await
                    .err_kind(ErrorKind::Unavailable)?;
                if matched.is_empty() {
                    continue;
                }
                if config.dry_run {
                    info!(topic = kw, count = matched.len(), "dry-run: would delete duplicates");
                    continue;
                }
                let message_ids: Vec<_> = matched.iter().map(|(id, _)| *id).collect();
                // DeleteFailure surfaces (per the error taxonomy) but is not
                // fatal to the candidate: the new copy is still forwarded
                // below, the stale destination message is left behind, and a
                // later Cleanup Sweeper pass removes it.
                let delete_result = driver::with_retries(clocks, shutdown, "delete_messages", || {
                    client.delete_messages(dest_chat_id, &message_ids)
                })
                .await;
                if let Err(e) = delete_result {
                    warn!(
                        topic = kw,
                        count = message_ids.len(),
                        error = %e,
                        "failed to delete duplicate(s) in destination; leaving stale copy for cleanup sweep"
                    );
                    continue;
                }
                topic_cache.forget(dest_chat_id, topic_id, &message_ids);
                let deleted = store.delete_videos(&names, kw)?;
                summary.record_deletions(deleted as u64);
                store.put_video(&ProcessedVideo {
                    file_name: candidate.file_name.clone(),
                    normalized_name: candidate.normalized_name.clone(),
                    topic_name: kw.to_string(),
                    duration_sec: candidate.duration_sec,
                    size_mb: Some(candidate.size_mb),
                    width: candidate.width,
                    height: candidate.height,
                    mime_type: candidate.mime_type.clone(),
                    processed_at: now,
                })?;
                info!(topic = kw, count = message_ids.len(), "replaced duplicate(s)");
            }

            let forwards = futures::future::join_all(keywords.iter().map(|&kw| {
                let topic_anchor = topic_anchors.get(kw).copied().unwrap_or(0);
                let candidate = &candidate;
                async move {
                    if config.dry_run {
                        info!(topic = kw, file_name = %candidate.file_name, "dry-run: would forward");
                        return (kw, true);
                    }
                    match forwarder::forward(
                        client,
                        clocks,
                        shutdown,
                        audit_log,
                        source_chat_id,
                        message.message_id,
                        dest_chat_id,
                        topic_anchor,
                        kw,
                        kw,
                        source_group,
                        candidate,
                    )
                    .await
                    {
                        Ok(ok) => (kw, ok),
                        Err(e) => {
                            warn!(topic = kw, error = %e, "forward failed");
                            (kw, false)
                        }
                    }
                }
            }))
            .await;

            let mut any_success = false;
            for (topic, ok) in forwards {
                if ok {
                    any_success = true;
                    summary.record_forward(topic);
                }
            }
            if any_success {
                total_forwarded += 1;
            }
            messages_processed += 1;
        }

        if driver::sleep_cancellable(clocks, shutdown, BATCH_SLEEP).await {
            break;
        }
    }

    summary.record_source_scanned();
    summary.record_messages_processed(messages_processed);

    Ok(ScanResult {
        messages_processed,
        total_forwarded_after: total_forwarded,
        cap_reached,
    })
}

fn realtime_secs<Clk: Clocks>(clocks: &Clk) -> i64 {
    clocks
        .realtime()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::InMemoryChatClient;
    use crate::model::{ChatKind, ChatSummary, Document, Message, VideoAttrs};
    use base::clock::SimulatedClocks;
    use std::sync::Arc;
    use std::time::SystemTime;

    fn video(chat_id: ChatId, message_id: i64, name: &str, caption: &str, duration: i64) -> Message {
        Message {
            chat_id,
            message_id,
            caption: Some(caption.to_string()),
            media: Media::Video {
                document: Document {
                    file_name: name.to_string(),
                    size_bytes: (120.0 * 1024.0 * 1024.0) as i64,
                    mime_type: Some("video/mp4".to_string()),
                },
                attrs: VideoAttrs {
                    duration_sec: Some(duration),
                    width: Some(1920),
                    height: Some(1080),
                },
            },
            reply_to_top_id: None,
        }
    }

    fn config() -> Config {
        Config {
            sorted_group_name: "Archive".to_string(),
            video_matches: vec!["keyword".to_string()],
            video_exclusions: Vec::new(),
            source_groups: Vec::new(),
            min_video_duration_in_seconds: 300,
            max_video_duration_in_seconds: None,
            min_file_size_mb: None,
            max_file_size_mb: None,
            max_forwards: 10,
            dry_run: false,
            skip_cleanup: false,
            duplicate_detection: crate::model::DuplicatePolicy {
                check_duration: false,
                check_file_size: false,
                check_resolution: false,
                check_mime_type: false,
                ..Default::default()
            },
        }
    }

    async fn run_scan(
        client: &Arc<InMemoryChatClient>,
        store: &Store,
        audit_log: &AuditLog,
        config: &Config,
        topic_anchors: &HashMap<String, TopicId>,
        forwarded_so_far: u64,
        summary: &mut RunSummary,
    ) -> ScanResult {
        let clocks = SimulatedClocks::new(SystemTime::UNIX_EPOCH);
        let (_tx, rx) = shutdown::channel();
        let cache = TopicCache::new(client.clone());
        scan_source(
            client.as_ref(),
            &clocks,
            &rx,
            store,
            audit_log,
            &cache,
            config,
            1,
            "src",
            -1,
            topic_anchors,
            forwarded_so_far,
            summary,
        )
        .await
        .unwrap()
    }

    // S1 — exact-name single-topic forward.
    #[tokio::test]
    async fn exact_name_single_topic_forward() {
        let client = Arc::new(InMemoryChatClient::new());
        client.add_chat(
            ChatSummary { id: 1, title: "src".to_string(), kind: ChatKind::Group },
            vec![video(1, 100, "Sample.Keyword.1080p.x264.mp4", "", 600)],
        );
        client.provision_forum_group("dest").await.unwrap();
        let topic_id = client.provision_topic(-1, "keyword").await.unwrap();
        let store = Store::open_in_memory().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::new(dir.path().join("forwarding-log.json"));
        let mut anchors = HashMap::new();
        anchors.insert("keyword".to_string(), topic_id);
        let mut summary = RunSummary::new();
        let result = run_scan(&client, &store, &log, &config(), &anchors, 0, &mut summary).await;
        assert_eq!(result.total_forwarded_after, 1);
        assert_eq!(store.count_videos().unwrap(), 1);
        assert_eq!(log.read_all().unwrap().len(), 1);
        let rows = store.videos_in_topic("keyword").unwrap();
        assert_eq!(rows[0].normalized_name, "samplekeyword");
    }

    // S2 — exclusion wins.
    #[tokio::test]
    async fn exclusion_wins_over_match() {
        let client = Arc::new(InMemoryChatClient::new());
        client.add_chat(
            ChatSummary { id: 1, title: "src".to_string(), kind: ChatKind::Group },
            vec![video(1, 100, "Sample.Keyword.mp4", "this is a preview", 600)],
        );
        client.provision_forum_group("dest").await.unwrap();
        let topic_id = client.provision_topic(-1, "keyword").await.unwrap();
        let store = Store::open_in_memory().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::new(dir.path().join("forwarding-log.json"));
        let mut anchors = HashMap::new();
        anchors.insert("keyword".to_string(), topic_id);
        let mut cfg = config();
        cfg.video_exclusions = vec!["preview".to_string()];
        let mut summary = RunSummary::new();
        let result = run_scan(&client, &store, &log, &cfg, &anchors, 0, &mut summary).await;
        assert_eq!(result.total_forwarded_after, 0);
        assert!(store.has_message(&message_key(1, 100)).unwrap());
        assert_eq!(store.count_videos().unwrap(), 0);
    }

    // S3 — below min duration.
    #[tokio::test]
    async fn below_min_duration_is_touched_not_forwarded() {
        let client = Arc::new(InMemoryChatClient::new());
        client.add_chat(
            ChatSummary { id: 1, title: "src".to_string(), kind: ChatKind::Group },
            vec![video(1, 100, "Sample.Keyword.mp4", "", 120)],
        );
        client.provision_forum_group("dest").await.unwrap();
        let topic_id = client.provision_topic(-1, "keyword").await.unwrap();
        let store = Store::open_in_memory().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::new(dir.path().join("forwarding-log.json"));
        let mut anchors = HashMap::new();
        anchors.insert("keyword".to_string(), topic_id);
        let mut summary = RunSummary::new();
        let result = run_scan(&client, &store, &log, &config(), &anchors, 0, &mut summary).await;
        assert_eq!(result.total_forwarded_after, 0);
        assert!(store.has_message(&message_key(1, 100)).unwrap());
    }

    // S4 — same-batch near-duplicate.
    #[tokio::test]
    async fn same_batch_near_duplicate_forwards_once() {
        let client = Arc::new(InMemoryChatClient::new());
        client.add_chat(
            ChatSummary { id: 1, title: "src".to_string(), kind: ChatKind::Group },
            vec![
                video(1, 101, "Foo.Keyword.1080p.mp4", "", 600),
                video(1, 100, "foo_keyword_720p.mp4", "", 600),
            ],
        );
        client.provision_forum_group("dest").await.unwrap();
        let topic_id = client.provision_topic(-1, "keyword").await.unwrap();
        let store = Store::open_in_memory().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::new(dir.path().join("forwarding-log.json"));
        let mut anchors = HashMap::new();
        anchors.insert("keyword".to_string(), topic_id);
        let mut summary = RunSummary::new();
        let result = run_scan(&client, &store, &log, &config(), &anchors, 0, &mut summary).await;
        assert_eq!(result.total_forwarded_after, 1);
        assert_eq!(log.read_all().unwrap().len(), 1);
        assert_eq!(store.count_videos().unwrap(), 1);
    }

    // S5 — metadata-tolerant replacement: old Store row and destination
    // message are deleted, the new version is re-registered, and the
    // candidate still forwards.
    #[tokio::test]
    async fn replacement_reregisters_store_row_and_deletes_old_message() {
        let client = Arc::new(InMemoryChatClient::new());
        client.add_chat(
            ChatSummary { id: 1, title: "src".to_string(), kind: ChatKind::Group },
            vec![Message {
                chat_id: 1,
                message_id: 200,
                caption: Some(String::new()),
                media: Media::Video {
                    document: Document {
                        file_name: "OldCut.Keyword.mp4".to_string(),
                        size_bytes: (102.0 * 1024.0 * 1024.0) as i64,
                        mime_type: Some("video/mp4".to_string()),
                    },
                    attrs: VideoAttrs {
                        duration_sec: Some(605),
                        width: Some(1920),
                        height: Some(1080),
                    },
                },
                reply_to_top_id: None,
            }],
        );
        client.provision_forum_group("dest").await.unwrap();
        let topic_id = client.provision_topic(-1, "keyword").await.unwrap();
        client.add_chat(
            ChatSummary { id: -1, title: "dest".to_string(), kind: ChatKind::Group },
            vec![Message {
                chat_id: -1,
                message_id: 900,
                caption: None,
                media: Media::Video {
                    document: Document {
                        file_name: "OldCut.Keyword.mp4".to_string(),
                        size_bytes: (100.0 * 1024.0 * 1024.0) as i64,
                        mime_type: Some("video/mp4".to_string()),
                    },
                    attrs: VideoAttrs {
                        duration_sec: Some(600),
                        width: Some(1920),
                        height: Some(1080),
                    },
                },
                reply_to_top_id: Some(topic_id),
            }],
        );

        let store = Store::open_in_memory().unwrap();
        store
            .put_video(&ProcessedVideo {
                file_name: "OldCut.Keyword.mp4".to_string(),
                normalized_name: "oldcutkeyword".to_string(),
                topic_name: "keyword".to_string(),
                duration_sec: Some(600),
                size_mb: Some(100.0),
                width: Some(1920),
                height: Some(1080),
                mime_type: Some("video/mp4".to_string()),
                processed_at: 0,
            })
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::new(dir.path().join("forwarding-log.json"));
        let mut anchors = HashMap::new();
        anchors.insert("keyword".to_string(), topic_id);
        let mut cfg = config();
        cfg.duplicate_detection = crate::model::DuplicatePolicy {
            check_duration: true,
            duration_tolerance_seconds: 30,
            check_file_size: true,
            file_size_tolerance_percent: 5.0,
            check_resolution: false,
            resolution_tolerance_percent: 10.0,
            check_mime_type: false,
            normalize_filenames: true,
        };
        let mut summary = RunSummary::new();
        let result = run_scan(&client, &store, &log, &cfg, &anchors, 0, &mut summary).await;

        assert_eq!(result.total_forwarded_after, 1);
        assert_eq!(client.deleted_calls(), vec![(-1, 900)]);
        assert_eq!(store.count_videos().unwrap(), 1);
        let rows = store.videos_in_topic("keyword").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].duration_sec, Some(605));
        assert_eq!(log.read_all().unwrap().len(), 1);
    }

    // S7 — max-forwards cap.
    #[tokio::test]
    async fn max_forwards_cap_halts_scan() {
        let client = Arc::new(InMemoryChatClient::new());
        client.add_chat(
            ChatSummary { id: 1, title: "src".to_string(), kind: ChatKind::Group },
            vec![
                video(1, 104, "Keyword.One.mp4", "", 600),
                video(1, 103, "Keyword.Two.mp4", "", 600),
                video(1, 102, "Keyword.Three.mp4", "", 600),
                video(1, 101, "Keyword.Four.mp4", "", 600),
            ],
        );
        client.provision_forum_group("dest").await.unwrap();
        let topic_id = client.provision_topic(-1, "keyword").await.unwrap();
        let store = Store::open_in_memory().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::new(dir.path().join("forwarding-log.json"));
        let mut anchors = HashMap::new();
        anchors.insert("keyword".to_string(), topic_id);
        let mut cfg = config();
        cfg.max_forwards = 2;
        let mut summary = RunSummary::new();
        let result = run_scan(&client, &store, &log, &cfg, &anchors, 0, &mut summary).await;
        assert_eq!(result.total_forwarded_after, 2);
        assert!(result.cap_reached);
        // The third candidate is pre-committed (per the pre-commit invariant)
        // before the cap check fires on it, so it counts as touched even
        // though it is never forwarded; the fourth is never reached.
        assert_eq!(store.count_messages().unwrap(), 3);
    }
}
