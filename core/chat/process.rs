// This file is part of mediasort.
// Copyright (c) 2026 The mediasort Authors; see AUTHORS and LICENSE.
// SPDX-License-Identifier: MIT

//! A `ChatClient` that treats the upstream chat protocol as a literal
//! external process speaking one JSON object per line on stdin/stdout.
//!
//! This is the production bridge: session/credential bootstrap and the
//! protocol's actual wire format live entirely on the other side of the
//! pipe, in whatever language/library the operator points `command` at.
//! Requests and responses are serialized one at a time; the child is
//! expected to answer each request with exactly one response line before
//! the next request is written.

use super::{ChatClient, ChatError, TopicId};
use crate::model::{ChatId, ChatSummary, Message, MessageId, RawMessage};
use async_trait::async_trait;
use base::ResultExt as _;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt as _, AsyncWriteExt as _, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Serialize)]
#[serde(tag = "method", content = "params", rename_all = "snake_case")]
enum Request<'a> {
    ListAccessibleChats {
        max: usize,
    },
    GetHistoryPage {
        chat_id: ChatId,
        offset_id: Option<MessageId>,
        limit: u32,
    },
    GetRepliesPage {
        chat_id: ChatId,
        topic_id: TopicId,
        offset_id: Option<MessageId>,
        limit: u32,
    },
    ForwardMessages {
        from_chat: ChatId,
        message_ids: &'a [MessageId],
        to_chat: ChatId,
        top_msg_id: Option<MessageId>,
        nonce: Uuid,
    },
    DeleteMessages {
        chat_id: ChatId,
        message_ids: &'a [MessageId],
    },
    ProvisionForumGroup {
        name: &'a str,
    },
    ProvisionTopic {
        chat_id: ChatId,
        name: &'a str,
    },
}

#[derive(Deserialize)]
struct Response {
    ok: bool,
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<ResponseError>,
}

#[derive(Deserialize)]
struct ResponseError {
    /// One of `"flood_wait"`, `"transient"`, or anything else (fatal).
    kind: String,
    message: String,
    #[serde(default)]
    seconds: Option<u64>,
}

impl From<ResponseError> for ChatError {
    fn from(e: ResponseError) -> Self {
        match e.kind.as_str() {
            "flood_wait" => ChatError::FloodWait {
                seconds: e.seconds.unwrap_or(1),
            },
            "transient" => ChatError::Transient(e.message),
            _ => ChatError::Fatal(e.message),
        }
    }
}

struct ProcessIo {
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

/// Bridges `ChatClient` calls to a long-lived child process over NDJSON.
pub struct ProcessClient {
    // Held so the child is killed when the client is dropped; never read
    // directly after spawn.
    _child: Child,
    io: Mutex<ProcessIo>,
}

impl ProcessClient {
    /// Spawns `command` (with `args`), wiring its stdin/stdout as the
    /// request/response channel. The child's stderr is inherited so its logs
    /// reach the operator's console unmodified.
    pub fn spawn(command: &str, args: &[String]) -> Result<ProcessClient, base::Error> {
        let mut child = Command::new(command)
            .args(args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .err_kind(base::ErrorKind::Unavailable)?;
        let stdin = child.stdin.take().expect("piped stdin");
        let stdout = child.stdout.take().expect("piped stdout");
        Ok(ProcessClient {
            _child: child,
            io: Mutex::new(ProcessIo {
                stdin,
                stdout: BufReader::new(stdout),
            }),
        })
    }

    async fn call(&self, req: Request<'_>) -> Result<serde_json::Value, ChatError> {
        let mut line = serde_json::to_string(&req)
            .map_err(|e| ChatError::Fatal(format!("encoding request: {e}")))?;
        line.push('\n');

        let mut io = self.io.lock().await;
        io.stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| ChatError::Transient(format!("writing to child: {e}")))?;
        io.stdin
            .flush()
            .await
            .map_err(|e| ChatError::Transient(format!("flushing to child: {e}")))?;

        let mut response_line = String::new();
        let n = io
            .stdout
            .read_line(&mut response_line)
            .await
            .map_err(|e| ChatError::Transient(format!("reading from child: {e}")))?;
        if n == 0 {
            return Err(ChatError::Fatal("child process closed its stdout".to_string()));
        }
        drop(io);

        let response: Response = serde_json::from_str(response_line.trim_end())
            .map_err(|e| ChatError::Fatal(format!("decoding response: {e}")))?;
        if response.ok {
            Ok(response.result.unwrap_or(serde_json::Value::Null))
        } else {
            Err(response
                .error
                .map(ChatError::from)
                .unwrap_or_else(|| ChatError::Fatal("error response missing error body".into())))
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> Result<T, ChatError> {
    serde_json::from_value(value).map_err(|e| ChatError::Fatal(format!("decoding result: {e}")))
}

#[async_trait]
impl ChatClient for ProcessClient {
    async fn list_accessible_chats(&self, max: usize) -> Result<Vec<ChatSummary>, ChatError> {
        decode(self.call(Request::ListAccessibleChats { max }).await?)
    }

    async fn get_history_page(
        &self,
        chat_id: ChatId,
        offset_id: Option<MessageId>,
        limit: u32,
    ) -> Result<Vec<Message>, ChatError> {
        let raw: Vec<RawMessage> = decode(
            self.call(Request::GetHistoryPage {
                chat_id,
                offset_id,
                limit,
            })
            .await?,
        )?;
        Ok(raw.into_iter().map(Message::from).collect())
    }

    async fn get_replies_page(
        &self,
        chat_id: ChatId,
        topic_id: TopicId,
        offset_id: Option<MessageId>,
        limit: u32,
    ) -> Result<Vec<Message>, ChatError> {
        let raw: Vec<RawMessage> = decode(
            self.call(Request::GetRepliesPage {
                chat_id,
                topic_id,
                offset_id,
                limit,
            })
            .await?,
        )?;
        Ok(raw.into_iter().map(Message::from).collect())
    }

    async fn forward_messages(
        &self,
        from_chat: ChatId,
        message_ids: &[MessageId],
        to_chat: ChatId,
        top_msg_id: Option<MessageId>,
        nonce: Uuid,
    ) -> Result<(), ChatError> {
        self.call(Request::ForwardMessages {
            from_chat,
            message_ids,
            to_chat,
            top_msg_id,
            nonce,
        })
        .await?;
        Ok(())
    }

    async fn delete_messages(
        &self,
        chat_id: ChatId,
        message_ids: &[MessageId],
    ) -> Result<(), ChatError> {
        self.call(Request::DeleteMessages {
            chat_id,
            message_ids,
        })
        .await?;
        Ok(())
    }

    async fn provision_forum_group(&self, name: &str) -> Result<ChatId, ChatError> {
        decode(self.call(Request::ProvisionForumGroup { name }).await?)
    }

    async fn provision_topic(&self, chat_id: ChatId, name: &str) -> Result<TopicId, ChatError> {
        decode(self.call(Request::ProvisionTopic { chat_id, name }).await?)
    }
}
