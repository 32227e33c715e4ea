// This file is part of mediasort.
// Copyright (c) 2026 The mediasort Authors; see AUTHORS and LICENSE.
// SPDX-License-Identifier: MIT

//! Lazy in-memory snapshot of messages under one destination topic, used to
//! locate the destination message(s) backing a duplicate before deleting
//! them. Confined to one source's processing context; never persisted or
//! shared across runs.

use crate::chat::{ChatClient, ChatError, TopicId};
use crate::driver;
use crate::model::{CandidateVideo, ChatId, DuplicatePolicy, Message, MessageId};
use crate::oracle;
use base::clock::Clocks;
use base::shutdown;
use base::FastHashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

const PAGE_SIZE: u32 = 100;
/// Hard safety ceiling preventing a runaway paginated pull against a
/// pathological topic.
const MAX_PAGES: u32 = 50;
const INTER_PAGE_SLEEP: std::time::Duration = std::time::Duration::from_millis(500);

/// One destination topic's loaded message set, keyed by destination message
/// id.
struct TopicEntry {
    messages: FastHashMap<MessageId, Message>,
}

/// Caches loaded topics keyed by `(destChatId, topicId)` for the lifetime of
/// one scanner/sweeper run.
pub struct TopicCache<C: ChatClient + ?Sized> {
    client: Arc<C>,
    entries: std::sync::Mutex<HashMap<(ChatId, TopicId), TopicEntry>>,
}

impl<C: ChatClient + ?Sized> TopicCache<C> {
    pub fn new(client: Arc<C>) -> Self {
        TopicCache {
            client,
            entries: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Returns the messages in `(chat_id, topic_id)` whose normalized
    /// filename (computed the same way as the Store's `normalized_name`
    /// column, per `policy.normalize_filenames`) is in `names`, loading the
    /// topic on first access. Per §4.7 step 9, a name match alone is not
    /// enough when any metadata check is enabled: the message must also
    /// agree with `candidate` on every enabled check, the same rule
    /// `oracle::find_similar` applies against stored rows.
    pub async fn find_messages_by_normalized_name<Clk: Clocks>(
        &self,
        clocks: &Clk,
        shutdown: &shutdown::Receiver,
        chat_id: ChatId,
        topic_id: TopicId,
        names: &[String],
        candidate: &CandidateVideo,
        policy: &DuplicatePolicy,
    ) -> Result<Vec<(MessageId, String)>, ChatError> {
        self.ensure_loaded(clocks, shutdown, chat_id, topic_id).await?;
        let entries = self.entries.lock().unwrap();
        let entry = entries.get(&(chat_id, topic_id)).expect("just loaded");
        let metadata_checks_enabled = policy.any_metadata_check_enabled();
        let mut out = Vec::new();
        for (id, message) in &entry.messages {
            if let crate::model::Media::Video { document, attrs } = &message.media {
                let normalized = crate::normalize::normalize(&document.file_name, policy.normalize_filenames);
                if !names.iter().any(|n| n == &normalized) {
                    continue;
                }
                if metadata_checks_enabled {
                    let size_mb = document.size_bytes as f64 / (1024.0 * 1024.0);
                    let passes = oracle::metadata_fields_pass(
                        candidate,
                        attrs.duration_sec,
                        Some(size_mb),
                        attrs.width,
                        attrs.height,
                        document.mime_type.as_deref(),
                        policy,
                    );
                    if !passes {
                        continue;
                    }
                }
                out.push((*id, normalized));
            }
        }
        Ok(out)
    }

    /// Removes the given destination message ids from the cached topic, if
    /// loaded. Called after a successful delete RPC so the cache never
    /// offers an already-deleted message for a later duplicate decision.
    pub fn forget(&self, chat_id: ChatId, topic_id: TopicId, message_ids: &[MessageId]) {
        let mut entries = self.entries.lock().unwrap();
        if let Some(entry) = entries.get_mut(&(chat_id, topic_id)) {
            for id in message_ids {
                entry.messages.remove(id);
            }
        }
    }

    async fn ensure_loaded<Clk: Clocks>(
        &self,
        clocks: &Clk,
        shutdown: &shutdown::Receiver,
        chat_id: ChatId,
        topic_id: TopicId,
    ) -> Result<(), ChatError> {
        {
            let entries = self.entries.lock().unwrap();
            if entries.contains_key(&(chat_id, topic_id)) {
                return Ok(());
            }
        }

        let mut messages = FastHashMap::default();
        let mut offset_id: Option<MessageId> = None;
        for page_num in 0..MAX_PAGES {
            shutdown.check().map_err(|_| ChatError::Fatal("shutdown requested".into()))?;
            let client = &self.client;
            let page = driver::with_retries(clocks, shutdown, "get_replies_page", || {
                client.get_replies_page(chat_id, topic_id, offset_id, PAGE_SIZE)
            })
            .await?;
            if page.is_empty() {
                break;
            }
            let last_id = page.last().map(|m| m.message_id);
            for message in page {
                messages.insert(message.message_id, message);
            }
            offset_id = last_id;
            debug!(chat_id, topic_id, page_num, "loaded topic cache page");
            if driver::sleep_cancellable(clocks, shutdown, INTER_PAGE_SLEEP).await {
                return Err(ChatError::Fatal("shutdown requested".into()));
            }
        }

        self.entries
            .lock()
            .unwrap()
            .insert((chat_id, topic_id), TopicEntry { messages });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::InMemoryChatClient;
    use crate::model::{ChatKind, ChatSummary, Document, Media, VideoAttrs};
    use base::clock::SimulatedClocks;
    use std::time::SystemTime;

    fn video(chat_id: ChatId, message_id: MessageId, name: &str, topic: TopicId) -> Message {
        video_with_metadata(chat_id, message_id, name, topic, 1, 1, None, None)
    }

    #[allow(clippy::too_many_arguments)]
    fn video_with_metadata(
        chat_id: ChatId,
        message_id: MessageId,
        name: &str,
        topic: TopicId,
        duration_sec: i64,
        size_bytes: i64,
        width: Option<i64>,
        height: Option<i64>,
    ) -> Message {
        Message {
            chat_id,
            message_id,
            caption: None,
            media: Media::Video {
                document: Document {
                    file_name: name.to_string(),
                    size_bytes,
                    mime_type: None,
                },
                attrs: VideoAttrs {
                    duration_sec: Some(duration_sec),
                    width,
                    height,
                },
            },
            reply_to_top_id: Some(topic),
        }
    }

    fn candidate(name: &str, duration_sec: i64, size_mb: f64) -> CandidateVideo {
        CandidateVideo {
            source_chat_id: 1,
            source_message_id: 1,
            file_name: format!("{name}.mp4"),
            normalized_name: name.to_string(),
            duration_sec: Some(duration_sec),
            size_mb,
            width: None,
            height: None,
            mime_type: None,
            caption_lower: String::new(),
            file_name_lower: String::new(),
        }
    }

    fn no_metadata_checks() -> DuplicatePolicy {
        DuplicatePolicy {
            check_duration: false,
            check_file_size: false,
            check_resolution: false,
            check_mime_type: false,
            ..DuplicatePolicy::default()
        }
    }

    #[tokio::test]
    async fn loads_once_and_finds_by_lowercased_name() {
        let client = Arc::new(InMemoryChatClient::new());
        client.add_chat(
            ChatSummary {
                id: -1,
                title: "dest".to_string(),
                kind: ChatKind::Group,
            },
            vec![video(-1, 1, "Clip.mp4", 5)],
        );
        let cache = TopicCache::new(client);
        let clocks = SimulatedClocks::new(SystemTime::UNIX_EPOCH);
        let (_tx, rx) = shutdown::channel();
        let found = cache
            .find_messages_by_normalized_name(
                &clocks,
                &rx,
                -1,
                5,
                &["clip".to_string()],
                &candidate("clip", 1, 0.0),
                &no_metadata_checks(),
            )
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0, 1);
    }

    #[tokio::test]
    async fn forget_removes_from_cache() {
        let client = Arc::new(InMemoryChatClient::new());
        client.add_chat(
            ChatSummary {
                id: -1,
                title: "dest".to_string(),
                kind: ChatKind::Group,
            },
            vec![video(-1, 1, "Clip.mp4", 5)],
        );
        let cache = TopicCache::new(client);
        let clocks = SimulatedClocks::new(SystemTime::UNIX_EPOCH);
        let (_tx, rx) = shutdown::channel();
        cache
            .find_messages_by_normalized_name(
                &clocks,
                &rx,
                -1,
                5,
                &["clip".to_string()],
                &candidate("clip", 1, 0.0),
                &no_metadata_checks(),
            )
            .await
            .unwrap();
        cache.forget(-1, 5, &[1]);
        let found = cache
            .find_messages_by_normalized_name(
                &clocks,
                &rx,
                -1,
                5,
                &["clip".to_string()],
                &candidate("clip", 1, 0.0),
                &no_metadata_checks(),
            )
            .await
            .unwrap();
        assert!(found.is_empty());
    }

    // Same normalized name, but the candidate disagrees with the stored
    // message on duration beyond tolerance: with any metadata check
    // enabled, a name match alone must not be treated as a duplicate.
    #[tokio::test]
    async fn name_match_rejected_when_metadata_disagrees() {
        let client = Arc::new(InMemoryChatClient::new());
        client.add_chat(
            ChatSummary {
                id: -1,
                title: "dest".to_string(),
                kind: ChatKind::Group,
            },
            vec![video_with_metadata(-1, 1, "Clip.mp4", 5, 600, 100 * 1024 * 1024, Some(1920), Some(1080))],
        );
        let cache = TopicCache::new(client);
        let clocks = SimulatedClocks::new(SystemTime::UNIX_EPOCH);
        let (_tx, rx) = shutdown::channel();
        let policy = DuplicatePolicy {
            check_duration: true,
            duration_tolerance_seconds: 5,
            check_file_size: false,
            check_resolution: false,
            check_mime_type: false,
            ..DuplicatePolicy::default()
        };
        let found = cache
            .find_messages_by_normalized_name(
                &clocks,
                &rx,
                -1,
                5,
                &["clip".to_string()],
                &candidate("clip", 60, 100.0),
                &policy,
            )
            .await
            .unwrap();
        assert!(found.is_empty());
    }

    // Same setup, but the candidate's duration is within tolerance: the
    // metadata check passes and the message is returned as a duplicate.
    #[tokio::test]
    async fn name_match_accepted_when_metadata_agrees() {
        let client = Arc::new(InMemoryChatClient::new());
        client.add_chat(
            ChatSummary {
                id: -1,
                title: "dest".to_string(),
                kind: ChatKind::Group,
            },
            vec![video_with_metadata(-1, 1, "Clip.mp4", 5, 600, 100 * 1024 * 1024, Some(1920), Some(1080))],
        );
        let cache = TopicCache::new(client);
        let clocks = SimulatedClocks::new(SystemTime::UNIX_EPOCH);
        let (_tx, rx) = shutdown::channel();
        let policy = DuplicatePolicy {
            check_duration: true,
            duration_tolerance_seconds: 5,
            check_file_size: false,
            check_resolution: false,
            check_mime_type: false,
            ..DuplicatePolicy::default()
        };
        let found = cache
            .find_messages_by_normalized_name(
                &clocks,
                &rx,
                -1,
                5,
                &["clip".to_string()],
                &candidate("clip", 602, 100.0),
                &policy,
            )
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
    }
}
