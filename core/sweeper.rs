// This file is part of mediasort.
// Copyright (c) 2026 The mediasort Authors; see AUTHORS and LICENSE.
// SPDX-License-Identifier: MIT

//! One-shot pre-scan pass over the destination chat: deletes messages whose
//! caption or filename matches an exclusion, then reconciles intra-topic
//! duplicates left over from prior runs, keeping only the newest copy of
//! each `(topic, lowercased file name)` pair.
//!
//! Runs once, before the Source Scanner, so the scanner's own duplicate
//! checks start from a clean destination.

use crate::chat::{ChatClient, TopicId};
use crate::config::Config;
use crate::driver;
use crate::model::{ChatId, Media, Message, MessageId};
use crate::predicate;
use base::clock::Clocks;
use base::shutdown;
use base::{ErrorKind, ResultExt as _};
use std::collections::HashMap;
use std::time::Duration;
use tracing::info;

const PAGE_SIZE: u32 = 100;
const INTER_PAGE_SLEEP: Duration = Duration::from_millis(500);
const DELETE_BATCH_SIZE: usize = 100;
const INTER_DELETE_SLEEP: Duration = Duration::from_millis(200);

pub struct SweepResult {
    pub exclusions_deleted: u64,
    pub duplicates_deleted: u64,
}

/// The "general" topic bucket, used when a message has no `reply_to_top_id`.
const GENERAL_TOPIC: TopicId = 0;

pub async fn sweep<C: ChatClient + ?Sized, Clk: Clocks>(
    client: &C,
    clocks: &Clk,
    shutdown: &shutdown::Receiver,
    config: &Config,
    dest_chat_id: ChatId,
) -> Result<SweepResult, base::Error> {
    let mut exclusions_deleted = 0u64;
    let mut buckets: HashMap<(TopicId, String), Vec<MessageId>> = HashMap::new();
    let mut offset_id: Option<MessageId> = None;

    loop {
        if shutdown.check().is_err() {
            break;
        }
        let page = driver::with_retries(clocks, shutdown, "get_history_page", || {
            client.get_history_page(dest_chat_id, offset_id, PAGE_SIZE)
        })
        .await
        .err_kind(ErrorKind::Unavailable)?;
        if page.is_empty() {
            break;
        }
        offset_id = page.last().map(|m| m.message_id);

        let mut excluded_in_page = Vec::new();
        for message in &page {
            let Some(file_name) = video_file_name(message) else {
                continue;
            };
            let caption_lower = message.caption.as_deref().unwrap_or("").to_lowercase();
            let file_name_lower = file_name.to_lowercase();
            let text = format!("{caption_lower} {file_name_lower}");
            if predicate::should_exclude(&text, file_name, &config.video_exclusions) {
                excluded_in_page.push(message.message_id);
                continue;
            }
            let topic_id = message.reply_to_top_id.unwrap_or(GENERAL_TOPIC);
            buckets
                .entry((topic_id, file_name_lower))
                .or_default()
                .push(message.message_id);
        }

        if !excluded_in_page.is_empty() {
            exclusions_deleted += excluded_in_page.len() as u64;
            delete_batch(client, clocks, shutdown, config, dest_chat_id, &excluded_in_page).await?;
        }

        if driver::sleep_cancellable(clocks, shutdown, INTER_PAGE_SLEEP).await {
            break;
        }
    }

    let mut duplicate_ids = Vec::new();
    for ((_, _), ids) in buckets {
        // `ids` is in newest-to-oldest order because pages are consumed
        // newest-first; the first entry is the one to keep.
        if ids.len() > 1 {
            duplicate_ids.extend(ids.into_iter().skip(1));
        }
    }
    let duplicates_deleted = duplicate_ids.len() as u64;

    for chunk in duplicate_ids.chunks(DELETE_BATCH_SIZE) {
        if shutdown.check().is_err() {
            break;
        }
        delete_batch(client, clocks, shutdown, config, dest_chat_id, chunk).await?;
        if driver::sleep_cancellable(clocks, shutdown, INTER_DELETE_SLEEP).await {
            break;
        }
    }

    Ok(SweepResult {
        exclusions_deleted,
        duplicates_deleted,
    })
}

fn video_file_name(message: &Message) -> Option<&str> {
    match &message.media {
        Media::Video { document, .. } if !document.file_name.is_empty() => {
            Some(document.file_name.as_str())
        }
        _ => None,
    }
}

async fn delete_batch<C: ChatClient + ?Sized, Clk: Clocks>(
    client: &C,
    clocks: &Clk,
    shutdown: &shutdown::Receiver,
    config: &Config,
    dest_chat_id: ChatId,
    ids: &[MessageId],
) -> Result<(), base::Error> {
    if ids.is_empty() {
        return Ok(());
    }
    if config.dry_run {
        info!(count = ids.len(), "dry-run: would delete during cleanup sweep");
        return Ok(());
    }
    driver::with_retries(clocks, shutdown, "delete_messages", || {
        client.delete_messages(dest_chat_id, ids)
    })
    .await
    .err_kind(ErrorKind::Unavailable)?;
    info!(count = ids.len(), "cleanup sweep deleted message(s)");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::InMemoryChatClient;
    use crate::model::{ChatKind, ChatSummary, DuplicatePolicy, Document, VideoAttrs};
    use base::clock::SimulatedClocks;
    use std::time::SystemTime;

    fn video(message_id: MessageId, name: &str, caption: &str, topic: Option<TopicId>) -> Message {
        Message {
            chat_id: -1,
            message_id,
            caption: Some(caption.to_string()),
            media: Media::Video {
                document: Document {
                    file_name: name.to_string(),
                    size_bytes: 1024,
                    mime_type: Some("video/mp4".to_string()),
                },
                attrs: VideoAttrs {
                    duration_sec: Some(60),
                    width: Some(1920),
                    height: Some(1080),
                },
            },
            reply_to_top_id: topic,
        }
    }

    fn config() -> Config {
        Config {
            sorted_group_name: "Archive".to_string(),
            video_matches: vec!["keyword".to_string()],
            video_exclusions: vec!["preview".to_string()],
            source_groups: Vec::new(),
            min_video_duration_in_seconds: 0,
            max_video_duration_in_seconds: None,
            min_file_size_mb: None,
            max_file_size_mb: None,
            max_forwards: 100,
            dry_run: false,
            skip_cleanup: false,
            duplicate_detection: DuplicatePolicy::default(),
        }
    }

    async fn run_sweep(client: &InMemoryChatClient, cfg: &Config) -> SweepResult {
        let clocks = SimulatedClocks::new(SystemTime::UNIX_EPOCH);
        let (_tx, rx) = shutdown::channel();
        sweep(client, &clocks, &rx, cfg, -1).await.unwrap()
    }

    #[tokio::test]
    async fn exclusion_match_is_deleted() {
        let client = InMemoryChatClient::new();
        client.add_chat(
            ChatSummary { id: -1, title: "dest".to_string(), kind: ChatKind::Group },
            vec![video(1, "clip.mp4", "this is a preview", Some(5))],
        );
        let result = run_sweep(&client, &config()).await;
        assert_eq!(result.exclusions_deleted, 1);
        assert_eq!(client.deleted_calls().len(), 1);
    }

    #[tokio::test]
    async fn keeps_newest_duplicate_in_same_topic() {
        let client = InMemoryChatClient::new();
        client.add_chat(
            ChatSummary { id: -1, title: "dest".to_string(), kind: ChatKind::Group },
            vec![
                video(2, "Clip.mp4", "", Some(5)),
                video(1, "clip.mp4", "", Some(5)),
            ],
        );
        let result = run_sweep(&client, &config()).await;
        assert_eq!(result.duplicates_deleted, 1);
        let deleted = client.deleted_calls();
        assert_eq!(deleted, vec![(-1, 1)]);
    }

    #[tokio::test]
    async fn different_topics_are_not_duplicates() {
        let client = InMemoryChatClient::new();
        client.add_chat(
            ChatSummary { id: -1, title: "dest".to_string(), kind: ChatKind::Group },
            vec![
                video(2, "clip.mp4", "", Some(5)),
                video(1, "clip.mp4", "", Some(6)),
            ],
        );
        let result = run_sweep(&client, &config()).await;
        assert_eq!(result.duplicates_deleted, 0);
    }

    // Testable Property 8: running the sweeper twice deletes nothing the
    // second time.
    #[tokio::test]
    async fn second_pass_is_a_fixed_point() {
        let client = InMemoryChatClient::new();
        client.add_chat(
            ChatSummary { id: -1, title: "dest".to_string(), kind: ChatKind::Group },
            vec![
                video(3, "Clip.mp4", "", Some(5)),
                video(2, "clip.mp4", "this is a preview", Some(5)),
                video(1, "clip.mp4", "", Some(5)),
            ],
        );
        let first = run_sweep(&client, &config()).await;
        assert!(first.exclusions_deleted + first.duplicates_deleted > 0);
        let second = run_sweep(&client, &config()).await;
        assert_eq!(second.exclusions_deleted, 0);
        assert_eq!(second.duplicates_deleted, 0);
    }
}
