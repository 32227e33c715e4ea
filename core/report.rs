// This file is part of mediasort.
// Copyright (c) 2026 The mediasort Authors; see AUTHORS and LICENSE.
// SPDX-License-Identifier: MIT

//! The per-run shutdown summary: how many messages were looked at, how many
//! were forwarded, broken down by topic.

use std::collections::BTreeMap;
use std::fmt;

/// Accumulates counters across a run for the final human-readable summary.
#[derive(Clone, Debug, Default)]
pub struct RunSummary {
    pub sources_scanned: u64,
    pub messages_processed: u64,
    pub total_forwarded: u64,
    /// Forward counts keyed by topic name, in the order first seen.
    forwarded_by_topic: BTreeMap<String, u64>,
    pub deletions: u64,
}

impl RunSummary {
    pub fn new() -> Self {
        RunSummary::default()
    }

    pub fn record_source_scanned(&mut self) {
        self.sources_scanned += 1;
    }

    pub fn record_messages_processed(&mut self, n: u64) {
        self.messages_processed += n;
    }

    /// Records one source message forwarded into `topic`. Call once per
    /// topic that a candidate was actually published to.
    pub fn record_forward(&mut self, topic: &str) {
        self.total_forwarded += 1;
        *self.forwarded_by_topic.entry(topic.to_string()).or_insert(0) += 1;
    }

    pub fn record_deletions(&mut self, n: u64) {
        self.deletions += n;
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "scanned {} source(s), processed {} message(s), forwarded {} video(s), deleted {} duplicate(s)",
            self.sources_scanned, self.messages_processed, self.total_forwarded, self.deletions
        )?;
        for (topic, count) in &self.forwarded_by_topic {
            writeln!(f, "  {topic}: {count}")?;
        }
        Ok(())
    }
}
