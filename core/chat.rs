// This file is part of mediasort.
// Copyright (c) 2026 The mediasort Authors; see AUTHORS and LICENSE.
// SPDX-License-Identifier: MIT

//! The upstream chat-protocol RPC surface, abstracted behind one trait.
//!
//! The protocol itself is an external collaborator out of scope for this
//! tool's algorithmic core (see top-level design notes): this module only
//! states the shape of the calls the core depends on, plus an in-memory fake
//! used throughout the test suite. A production binary plugs in a real
//! `ChatClient` implementation; [`process::ProcessClient`] is a concrete,
//! runnable one that treats the protocol as a literal external process.

pub mod process;

use crate::model::{ChatId, ChatSummary, Message, MessageId};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use uuid::Uuid;

pub type TopicId = i64;

/// An error surfaced by a `ChatClient` call, in the shape the Rate-Limit
/// Driver recognizes.
#[derive(Clone, Debug)]
pub enum ChatError {
    /// Protocol-signaled flood-wait: `error_message == "FLOOD_WAIT"` or
    /// `code == 420`, carrying an authoritative retry-after hint.
    FloodWait { seconds: u64 },
    /// Any other transient condition: generic network failure, or a 420
    /// without an explicit `seconds` hint.
    Transient(String),
    /// Anything else. Not retried by the driver.
    Fatal(String),
}

impl std::fmt::Display for ChatError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChatError::FloodWait { seconds } => write!(f, "flood wait: retry after {seconds}s"),
            ChatError::Transient(msg) => write!(f, "transient: {msg}"),
            ChatError::Fatal(msg) => write!(f, "fatal: {msg}"),
        }
    }
}

impl std::error::Error for ChatError {}

/// The RPC surface the ingestion core depends on. Object-safe so a single
/// `Arc<dyn ChatClient>` can be shared across the scanner, sweeper and topic
/// cache without generic parameters threading through every component.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn list_accessible_chats(&self, max: usize) -> Result<Vec<ChatSummary>, ChatError>;

    /// Returns up to `limit` (≤ 100) messages, newest first, from before
    /// `offset_id` (exclusive), or from the most recent message if `None`.
    async fn get_history_page(
        &self,
        chat_id: ChatId,
        offset_id: Option<MessageId>,
        limit: u32,
    ) -> Result<Vec<Message>, ChatError>;

    /// Returns up to `limit` (≤ 100) messages posted under `topic_id`.
    async fn get_replies_page(
        &self,
        chat_id: ChatId,
        topic_id: TopicId,
        offset_id: Option<MessageId>,
        limit: u32,
    ) -> Result<Vec<Message>, ChatError>;

    /// Forwards `message_ids` from `from_chat` into `to_chat` under
    /// `top_msg_id` (the destination topic's anchor message). `nonce` must be
    /// unique per call so retries don't double-forward upstream.
    async fn forward_messages(
        &self,
        from_chat: ChatId,
        message_ids: &[MessageId],
        to_chat: ChatId,
        top_msg_id: Option<MessageId>,
        nonce: Uuid,
    ) -> Result<(), ChatError>;

    /// Deletes up to 100 messages from `chat_id`.
    async fn delete_messages(
        &self,
        chat_id: ChatId,
        message_ids: &[MessageId],
    ) -> Result<(), ChatError>;

    /// Provisions (or looks up) the destination forum group, returning its
    /// chat id. Out of scope for algorithmic testing; the core only consumes
    /// the returned id.
    async fn provision_forum_group(&self, name: &str) -> Result<ChatId, ChatError>;

    /// Provisions (or looks up) a topic within the destination forum group,
    /// returning its topic id (used as the anchor message id for forwards).
    async fn provision_topic(&self, chat_id: ChatId, name: &str) -> Result<TopicId, ChatError>;
}

/// In-memory fake used by the test suite: chats are preloaded with message
/// histories, forwards/deletes mutate those histories in place, and a queue
/// of canned errors can be injected to exercise the Rate-Limit Driver.
pub struct InMemoryChatClient {
    state: Mutex<InMemoryState>,
}

struct InMemoryState {
    /// Each chat's messages, newest first (matches `get_history_page` order).
    histories: std::collections::HashMap<ChatId, VecDeque<Message>>,
    chats: Vec<ChatSummary>,
    forum_group_id: Option<ChatId>,
    topics: std::collections::HashMap<String, TopicId>,
    next_topic_id: TopicId,
    /// Errors to return instead of the real behavior, consumed front-first,
    /// one per matching call.
    injected_errors: VecDeque<ChatError>,
    forwarded: Vec<(ChatId, MessageId, ChatId, Option<MessageId>)>,
    deleted: Vec<(ChatId, MessageId)>,
}

impl InMemoryChatClient {
    pub fn new() -> Self {
        InMemoryChatClient {
            state: Mutex::new(InMemoryState {
                histories: std::collections::HashMap::new(),
                chats: Vec::new(),
                forum_group_id: None,
                topics: std::collections::HashMap::new(),
                next_topic_id: 1,
                injected_errors: VecDeque::new(),
                forwarded: Vec::new(),
                deleted: Vec::new(),
            }),
        }
    }

    pub fn add_chat(&self, chat: ChatSummary, messages: Vec<Message>) {
        let mut s = self.state.lock().unwrap();
        s.histories.insert(chat.id, messages.into());
        s.chats.push(chat);
    }

    /// Queues one error to be returned by the next fallible call.
    pub fn inject_error(&self, err: ChatError) {
        self.state.lock().unwrap().injected_errors.push_back(err);
    }

    pub fn forwarded_calls(&self) -> Vec<(ChatId, MessageId, ChatId, Option<MessageId>)> {
        self.state.lock().unwrap().forwarded.clone()
    }

    pub fn deleted_calls(&self) -> Vec<(ChatId, MessageId)> {
        self.state.lock().unwrap().deleted.clone()
    }

    fn take_injected_error(state: &mut InMemoryState) -> Option<ChatError> {
        state.injected_errors.pop_front()
    }
}

impl Default for InMemoryChatClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatClient for InMemoryChatClient {
    async fn list_accessible_chats(&self, max: usize) -> Result<Vec<ChatSummary>, ChatError> {
        let mut s = self.state.lock().unwrap();
        if let Some(e) = Self::take_injected_error(&mut s) {
            return Err(e);
        }
        Ok(s.chats.iter().take(max).cloned().collect())
    }

    async fn get_history_page(
        &self,
        chat_id: ChatId,
        offset_id: Option<MessageId>,
        limit: u32,
    ) -> Result<Vec<Message>, ChatError> {
        let mut s = self.state.lock().unwrap();
        if let Some(e) = Self::take_injected_error(&mut s) {
            return Err(e);
        }
        let history = s.histories.get(&chat_id).cloned().unwrap_or_default();
        let start = match offset_id {
            None => 0,
            Some(offset) => history
                .iter()
                .position(|m| m.message_id < offset)
                .unwrap_or(history.len()),
        };
        Ok(history
            .into_iter()
            .skip(start)
            .take(limit as usize)
            .collect())
    }

    async fn get_replies_page(
        &self,
        chat_id: ChatId,
        topic_id: TopicId,
        offset_id: Option<MessageId>,
        limit: u32,
    ) -> Result<Vec<Message>, ChatError> {
        let mut s = self.state.lock().unwrap();
        if let Some(e) = Self::take_injected_error(&mut s) {
            return Err(e);
        }
        let history: Vec<Message> = s
            .histories
            .get(&chat_id)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|m| m.reply_to_top_id == Some(topic_id))
            .collect();
        let start = match offset_id {
            None => 0,
            Some(offset) => history
                .iter()
                .position(|m| m.message_id < offset)
                .unwrap_or(history.len()),
        };
        Ok(history.into_iter().skip(start).take(limit as usize).collect())
    }

    async fn forward_messages(
        &self,
        from_chat: ChatId,
        message_ids: &[MessageId],
        to_chat: ChatId,
        top_msg_id: Option<MessageId>,
        _nonce: Uuid,
    ) -> Result<(), ChatError> {
        let mut s = self.state.lock().unwrap();
        if let Some(e) = Self::take_injected_error(&mut s) {
            return Err(e);
        }
        for &id in message_ids {
            let source_message = s
                .histories
                .get(&from_chat)
                .and_then(|h| h.iter().find(|m| m.message_id == id).cloned());
            if let Some(mut message) = source_message {
                let new_id = s
                    .histories
                    .get(&to_chat)
                    .and_then(|h| h.iter().map(|m| m.message_id).max())
                    .unwrap_or(0)
                    + 1;
                message.chat_id = to_chat;
                message.message_id = new_id;
                message.reply_to_top_id = top_msg_id;
                s.histories.entry(to_chat).or_default().push_front(message);
            }
            s.forwarded.push((from_chat, id, to_chat, top_msg_id));
        }
        Ok(())
    }

    async fn delete_messages(
        &self,
        chat_id: ChatId,
        message_ids: &[MessageId],
    ) -> Result<(), ChatError> {
        let mut s = self.state.lock().unwrap();
        if let Some(e) = Self::take_injected_error(&mut s) {
            return Err(e);
        }
        if let Some(history) = s.histories.get_mut(&chat_id) {
            history.retain(|m| !message_ids.contains(&m.message_id));
        }
        for &id in message_ids {
            s.deleted.push((chat_id, id));
        }
        Ok(())
    }

    async fn provision_forum_group(&self, _name: &str) -> Result<ChatId, ChatError> {
        let mut s = self.state.lock().unwrap();
        if let Some(e) = Self::take_injected_error(&mut s) {
            return Err(e);
        }
        if let Some(id) = s.forum_group_id {
            return Ok(id);
        }
        let id = -1;
        s.forum_group_id = Some(id);
        s.histories.entry(id).or_default();
        Ok(id)
    }

    async fn provision_topic(&self, _chat_id: ChatId, name: &str) -> Result<TopicId, ChatError> {
        let mut s = self.state.lock().unwrap();
        if let Some(e) = Self::take_injected_error(&mut s) {
            return Err(e);
        }
        if let Some(&id) = s.topics.get(name) {
            return Ok(id);
        }
        let id = s.next_topic_id;
        s.next_topic_id += 1;
        s.topics.insert(name.to_string(), id);
        Ok(id)
    }
}
