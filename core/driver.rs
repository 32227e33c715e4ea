// This file is part of mediasort.
// Copyright (c) 2026 The mediasort Authors; see AUTHORS and LICENSE.
// SPDX-License-Identifier: MIT

//! Wraps upstream RPCs with the retry/backoff policy derived from explicit
//! rate-limit hints, and provides the cooperative pacing sleeps used between
//! batches.

use crate::chat::ChatError;
use base::clock::Clocks;
use base::shutdown;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

const MAX_RETRIES: u32 = 3;

/// Drives a single upstream call through the retry policy: a flood-wait
/// error sleeps for the hinted duration (authoritative, not doubled);
/// anything else transient backs off exponentially (5s, 10s, 20s). Either
/// kind gives up after [`MAX_RETRIES`] attempts and surfaces the last error.
/// Every sleep observes the shutdown receiver and returns early if asked to
/// stop.
pub async fn with_retries<C, F, Fut, T>(
    clocks: &C,
    shutdown: &shutdown::Receiver,
    label: &str,
    mut call: F,
) -> Result<T, ChatError>
where
    C: Clocks,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ChatError>>,
{
    let mut attempt = 0u32;
    loop {
        match call().await {
            Ok(v) => return Ok(v),
            Err(ChatError::FloodWait { seconds }) => {
                attempt += 1;
                if attempt > MAX_RETRIES {
                    warn!(%label, attempt, seconds, "flood-wait retry budget exhausted");
                    return Err(ChatError::FloodWait { seconds });
                }
                debug!(%label, attempt, seconds, "flood-wait, sleeping");
                if sleep_cancellable(clocks, shutdown, Duration::from_secs(seconds)).await {
                    return Err(ChatError::Fatal("shutdown requested".to_string()));
                }
            }
            Err(ChatError::Transient(msg)) => {
                let backoff = 2u64.pow(attempt) * 5;
                attempt += 1;
                if attempt > MAX_RETRIES {
                    warn!(%label, attempt, %msg, "transient-error retry budget exhausted");
                    return Err(ChatError::Transient(msg));
                }
                debug!(%label, attempt, %msg, backoff, "transient error, backing off");
                if sleep_cancellable(clocks, shutdown, Duration::from_secs(backoff)).await {
                    return Err(ChatError::Fatal("shutdown requested".to_string()));
                }
            }
            Err(e @ ChatError::Fatal(_)) => return Err(e),
        }
    }
}

/// Sleeps `how_long` through `clocks`, but wakes early (returning `true`) if
/// shutdown is requested meanwhile. Used for both retry backoff and the
/// inter-batch/inter-page pacing sleeps named throughout §4.
pub async fn sleep_cancellable<C: Clocks>(
    clocks: &C,
    shutdown: &shutdown::Receiver,
    how_long: Duration,
) -> bool {
    if shutdown.check().is_err() {
        return true;
    }
    tokio::select! {
        _ = clocks.sleep(how_long) => false,
        _ = shutdown.as_future() => true,
    }
}
