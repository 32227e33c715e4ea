// This file is part of mediasort.
// Copyright (c) 2026 The mediasort Authors; see AUTHORS and LICENSE.
// SPDX-License-Identifier: MIT

//! Republishes one source message into a destination topic and records a
//! Forward Audit Entry. Never touches the Store: the scanner pre-registers
//! the video row before the forward attempt.

use crate::audit::{AuditLog, ForwardAuditEntry};
use crate::chat::{ChatClient, ChatError, TopicId};
use crate::driver;
use crate::model::{CandidateVideo, ChatId, MessageId};
use base::clock::Clocks;
use base::shutdown;
use tracing::{info, warn};
use uuid::Uuid;

#[allow(clippy::too_many_arguments)]
pub async fn forward<C: ChatClient + ?Sized, Clk: Clocks>(
    client: &C,
    clocks: &Clk,
    shutdown: &shutdown::Receiver,
    audit_log: &AuditLog,
    source_chat: ChatId,
    source_message: MessageId,
    dest_chat: ChatId,
    topic_anchor: TopicId,
    topic_name: &str,
    matched_keyword: &str,
    source_group: &str,
    candidate: &CandidateVideo,
) -> Result<bool, base::Error> {
    let result = driver::with_retries(clocks, shutdown, "forward_messages", || {
        client.forward_messages(
            source_chat,
            &[source_message],
            dest_chat,
            Some(topic_anchor),
            Uuid::new_v4(),
        )
    })
    .await;

    match result {
        Ok(()) => {
            info!(
                source_chat,
                source_message,
                topic = topic_name,
                file_name = %candidate.file_name,
                "forwarded"
            );
            audit_log.append(ForwardAuditEntry {
                timestamp: clocks.realtime().duration_since(std::time::UNIX_EPOCH)
                    .map(|d| d.as_secs() as i64)
                    .unwrap_or(0),
                file_name: candidate.file_name.clone(),
                matched_keyword: matched_keyword.to_string(),
                topic_name: topic_name.to_string(),
                source_group: source_group.to_string(),
                duration: candidate.duration_sec,
                size_mb: candidate.size_mb,
            })?;
            Ok(true)
        }
        Err(ChatError::Fatal(msg)) => {
            warn!(source_chat, source_message, topic = topic_name, %msg, "forward failed fatally");
            Err(base::format_err_t!(Internal, "forward failed: {}", msg))
        }
        Err(e) => {
            warn!(source_chat, source_message, topic = topic_name, error = %e, "forward budget exhausted");
            Ok(false)
        }
    }
}
