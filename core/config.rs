// This file is part of mediasort.
// Copyright (c) 2026 The mediasort Authors; see AUTHORS and LICENSE.
// SPDX-License-Identifier: MIT

//! The configuration shape the ingestion core consumes. Deliberately thin:
//! this module defines the struct and its literal defaults; deserializing a
//! file into it is the binary's job (`cmds::run::load_config`).

use crate::model::DuplicatePolicy;
use base::{bail_t, ErrorKind};

/// One full run's configuration, as presented to the core by an external
/// loader.
#[derive(Clone, Debug)]
pub struct Config {
    /// Destination chat's display name, consumed by the provisioner.
    pub sorted_group_name: String,
    /// Non-empty list of match keywords; each one names a destination topic.
    pub video_matches: Vec<String>,
    pub video_exclusions: Vec<String>,
    /// Source chat identifiers to scan; empty means every accessible
    /// group/channel.
    pub source_groups: Vec<i64>,
    pub min_video_duration_in_seconds: i64,
    pub max_video_duration_in_seconds: Option<i64>,
    pub min_file_size_mb: Option<f64>,
    pub max_file_size_mb: Option<f64>,
    /// Per-run forward cap across all sources.
    pub max_forwards: u64,
    /// If true, forward/delete RPCs and video pre-registration are skipped;
    /// message progress is still committed.
    pub dry_run: bool,
    /// Disables the Cleanup Sweeper entirely.
    pub skip_cleanup: bool,
    pub duplicate_detection: DuplicatePolicy,
}

impl Config {
    /// Rejects configurations that can never produce a meaningful run,
    /// before any RPC is attempted.
    pub fn validate(&self) -> Result<(), base::Error> {
        if self.video_matches.is_empty() {
            bail_t!(InvalidArgument, "videoMatches must not be empty");
        }
        if self.sorted_group_name.trim().is_empty() {
            bail_t!(InvalidArgument, "sortedGroupName must not be empty");
        }
        if let Some(max) = self.max_video_duration_in_seconds {
            if max < self.min_video_duration_in_seconds {
                bail_t!(
                    InvalidArgument,
                    "maxVideoDurationInSeconds ({}) is below minVideoDurationInSeconds ({})",
                    max,
                    self.min_video_duration_in_seconds
                );
            }
        }
        if let (Some(min), Some(max)) = (self.min_file_size_mb, self.max_file_size_mb) {
            if max < min {
                bail_t!(
                    InvalidArgument,
                    "maxFileSizeMB ({}) is below minFileSizeMB ({})",
                    max,
                    min
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            sorted_group_name: "Archive".to_string(),
            video_matches: vec!["nature".to_string()],
            video_exclusions: Vec::new(),
            source_groups: Vec::new(),
            min_video_duration_in_seconds: 60,
            max_video_duration_in_seconds: None,
            min_file_size_mb: None,
            max_file_size_mb: None,
            max_forwards: 100,
            dry_run: false,
            skip_cleanup: false,
            duplicate_detection: DuplicatePolicy::default(),
        }
    }

    #[test]
    fn empty_video_matches_is_invalid() {
        let mut cfg = base_config();
        cfg.video_matches.clear();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn inverted_duration_bounds_is_invalid() {
        let mut cfg = base_config();
        cfg.max_video_duration_in_seconds = Some(10);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn sane_config_validates() {
        assert!(base_config().validate().is_ok());
    }
}
