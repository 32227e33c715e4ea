// This file is part of mediasort.
// Copyright (c) 2026 The mediasort Authors; see AUTHORS and LICENSE.
// SPDX-License-Identifier: MIT

//! Shared data types that flow between the scanner, predicate, oracle and store.

use serde::{Deserialize, Serialize};

/// Opaque identifier for a chat as seen by the upstream protocol.
pub type ChatId = i64;

/// Identifier of a message within a chat, unique only within that chat.
pub type MessageId = i64;

/// A chat accessible to the account, as returned by `list_accessible_chats`.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct ChatSummary {
    pub id: ChatId,
    pub title: String,
    pub kind: ChatKind,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    Group,
    Channel,
    Other,
}

/// A video attachment's attributes, present only on messages recognized as video.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct VideoAttrs {
    pub duration_sec: Option<i64>,
    pub width: Option<i64>,
    pub height: Option<i64>,
}

/// A document attachment: the raw shape the upstream protocol hands us.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct Document {
    pub file_name: String,
    pub size_bytes: i64,
    pub mime_type: Option<String>,
}

/// The typed sum this core operates on internally, recovered once at ingress
/// from the raw message shape rather than re-inspected via string tags at
/// every call site.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub enum Media {
    NotVideo,
    Video {
        document: Document,
        attrs: VideoAttrs,
    },
}

/// One message as seen while scanning a source chat's history.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct Message {
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub caption: Option<String>,
    pub media: Media,
    /// Top-level thread/topic this message replies to, if any. Used by the
    /// cleanup sweeper to bucket destination messages by topic.
    pub reply_to_top_id: Option<MessageId>,
}

/// The message exactly as the upstream protocol sends it: a document
/// (or none) plus two independent video signals, a protocol flag and an
/// optional video-attribute block. `Media` does not exist on the wire; it is
/// recovered from this shape once at ingress by [`classify_media`], rather
/// than re-derived from tagged fields at every call site.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RawMessage {
    pub chat_id: ChatId,
    pub message_id: MessageId,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub document: Option<Document>,
    /// The protocol's own "this document is a video" flag.
    #[serde(default)]
    pub is_video: bool,
    /// Present when the protocol attached a video-attribute block, independent of `is_video`.
    #[serde(default)]
    pub video_attrs: Option<VideoAttrs>,
    #[serde(default)]
    pub reply_to_top_id: Option<MessageId>,
}

impl From<RawMessage> for Message {
    fn from(raw: RawMessage) -> Message {
        Message {
            chat_id: raw.chat_id,
            message_id: raw.message_id,
            caption: raw.caption,
            media: classify_media(raw.document, raw.is_video, raw.video_attrs),
            reply_to_top_id: raw.reply_to_top_id,
        }
    }
}

/// The admission rule messages are classified by: a document alone is not
/// enough, it must also be either flagged as video by the protocol or carry
/// a video-attribute block with a duration. Anything else, including a bare
/// document with neither signal, is `NotVideo`.
fn classify_media(document: Option<Document>, is_video: bool, video_attrs: Option<VideoAttrs>) -> Media {
    let Some(document) = document else {
        return Media::NotVideo;
    };
    let has_duration = video_attrs.as_ref().is_some_and(|a| a.duration_sec.is_some());
    if is_video || has_duration {
        Media::Video {
            document,
            attrs: video_attrs.unwrap_or_default(),
        }
    } else {
        Media::NotVideo
    }
}

/// A message plus the fields the predicate and oracle need, computed once per
/// candidate so downstream code never re-derives them.
#[derive(Clone, Debug)]
pub struct CandidateVideo {
    pub source_chat_id: ChatId,
    pub source_message_id: MessageId,
    pub file_name: String,
    pub normalized_name: String,
    pub duration_sec: Option<i64>,
    pub size_mb: f64,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub mime_type: Option<String>,
    pub caption_lower: String,
    pub file_name_lower: String,
}

/// A row of the `processed_videos` table.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProcessedVideo {
    pub file_name: String,
    pub normalized_name: String,
    pub topic_name: String,
    pub duration_sec: Option<i64>,
    pub size_mb: Option<f64>,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub mime_type: Option<String>,
    pub processed_at: i64,
}

/// The composite key identifying a processed message, used by the Store and
/// by the pre-commit invariant in the scanner.
pub fn message_key(chat_id: ChatId, message_id: MessageId) -> String {
    format!("{chat_id}:{message_id}")
}

/// Policy flags and tolerances controlling the Duplicate Oracle.
#[derive(Clone, Copy, Debug)]
pub struct DuplicatePolicy {
    pub check_duration: bool,
    pub duration_tolerance_seconds: i64,
    pub check_file_size: bool,
    pub file_size_tolerance_percent: f64,
    pub check_resolution: bool,
    pub resolution_tolerance_percent: f64,
    pub check_mime_type: bool,
    pub normalize_filenames: bool,
}

impl Default for DuplicatePolicy {
    fn default() -> Self {
        DuplicatePolicy {
            check_duration: true,
            duration_tolerance_seconds: 30,
            check_file_size: true,
            file_size_tolerance_percent: 5.0,
            check_resolution: true,
            resolution_tolerance_percent: 10.0,
            check_mime_type: true,
            normalize_filenames: true,
        }
    }
}

impl DuplicatePolicy {
    pub fn any_metadata_check_enabled(&self) -> bool {
        self.check_duration || self.check_file_size || self.check_resolution || self.check_mime_type
    }
}
