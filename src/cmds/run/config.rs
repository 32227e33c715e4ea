// This file is part of mediasort.
// Copyright (c) 2026 The mediasort Authors; see AUTHORS and LICENSE.
// SPDX-License-Identifier: MIT

//! Runtime configuration file (`/etc/mediasort.toml`), plus the small JSON
//! cache recording provisioned destination chat/topic ids between runs.

use base::{ErrorKind, ResultExt as _};
use engine::config::Config;
use engine::model::DuplicatePolicy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// TOML analog of `engine::model::DuplicatePolicy`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct DuplicateDetectionConfig {
    check_duration: bool,
    duration_tolerance_seconds: i64,
    check_file_size: bool,
    file_size_tolerance_percent: f64,
    check_resolution: bool,
    resolution_tolerance_percent: f64,
    check_mime_type: bool,
    normalize_filenames: bool,
}

impl Default for DuplicateDetectionConfig {
    fn default() -> Self {
        let d = DuplicatePolicy::default();
        DuplicateDetectionConfig {
            check_duration: d.check_duration,
            duration_tolerance_seconds: d.duration_tolerance_seconds,
            check_file_size: d.check_file_size,
            file_size_tolerance_percent: d.file_size_tolerance_percent,
            check_resolution: d.check_resolution,
            resolution_tolerance_percent: d.resolution_tolerance_percent,
            check_mime_type: d.check_mime_type,
            normalize_filenames: d.normalize_filenames,
        }
    }
}

impl From<DuplicateDetectionConfig> for DuplicatePolicy {
    fn from(c: DuplicateDetectionConfig) -> Self {
        DuplicatePolicy {
            check_duration: c.check_duration,
            duration_tolerance_seconds: c.duration_tolerance_seconds,
            check_file_size: c.check_file_size,
            file_size_tolerance_percent: c.file_size_tolerance_percent,
            check_resolution: c.check_resolution,
            resolution_tolerance_percent: c.resolution_tolerance_percent,
            check_mime_type: c.check_mime_type,
            normalize_filenames: c.normalize_filenames,
        }
    }
}

fn no_forward_cap() -> u64 {
    u64::MAX
}

/// Top-level configuration file object: everything the binary needs beyond
/// what `engine::config::Config` models, namely where to keep state and how to
/// reach the chat protocol bridge process.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    data_dir: PathBuf,
    chat_command: String,
    #[serde(default)]
    chat_args: Vec<String>,

    sorted_group_name: String,
    video_matches: Vec<String>,
    #[serde(default)]
    video_exclusions: Vec<String>,
    #[serde(default)]
    source_groups: Vec<i64>,
    #[serde(default)]
    min_video_duration_in_seconds: i64,
    #[serde(default)]
    max_video_duration_in_seconds: Option<i64>,
    #[serde(default)]
    min_file_size_mb: Option<f64>,
    #[serde(default)]
    max_file_size_mb: Option<f64>,
    #[serde(default = "no_forward_cap")]
    max_forwards: u64,
    #[serde(default)]
    dry_run: bool,
    #[serde(default)]
    skip_cleanup: bool,
    #[serde(default)]
    duplicate_detection: DuplicateDetectionConfig,
}

/// The binary-only settings a `ConfigFile` carries alongside the engine's own
/// `Config`.
pub struct RunSettings {
    pub data_dir: PathBuf,
    pub chat_command: String,
    pub chat_args: Vec<String>,
}

/// Reads and parses `path`, splitting it into the binary's own settings and
/// the engine-facing `Config`.
pub fn load_config(path: &Path) -> Result<(RunSettings, Config), base::Error> {
    let text = std::fs::read_to_string(path).err_kind(ErrorKind::NotFound)?;
    let file: ConfigFile = toml::from_str(&text).err_kind(ErrorKind::InvalidArgument)?;
    let settings = RunSettings {
        data_dir: file.data_dir,
        chat_command: file.chat_command,
        chat_args: file.chat_args,
    };
    let config = Config {
        sorted_group_name: file.sorted_group_name,
        video_matches: file.video_matches,
        video_exclusions: file.video_exclusions,
        source_groups: file.source_groups,
        min_video_duration_in_seconds: file.min_video_duration_in_seconds,
        max_video_duration_in_seconds: file.max_video_duration_in_seconds,
        min_file_size_mb: file.min_file_size_mb,
        max_file_size_mb: file.max_file_size_mb,
        max_forwards: file.max_forwards,
        dry_run: file.dry_run,
        skip_cleanup: file.skip_cleanup,
        duplicate_detection: file.duplicate_detection.into(),
    };
    Ok((settings, config))
}

/// `<dataDir>/forum-group-cache.json`: the destination chat id and the
/// per-keyword topic ids provisioned on a prior run, so `run` doesn't
/// re-provision a topic it already created.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ForumGroupCache {
    #[serde(default)]
    pub group_id: Option<i64>,
    #[serde(default)]
    pub topics: HashMap<String, i64>,
}

impl ForumGroupCache {
    /// Loads `path`, treating an absent or unparseable file as an empty
    /// cache rather than an error: the first run always has to provision
    /// everything from scratch.
    pub fn load(path: &Path) -> ForumGroupCache {
        std::fs::read(path)
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            .unwrap_or_default()
    }

    pub fn save(&self, path: &Path) -> Result<(), base::Error> {
        let bytes = serde_json::to_vec_pretty(self).err_kind(ErrorKind::Internal)?;
        std::fs::write(path, bytes).err_kind(ErrorKind::Internal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config_with_defaults() {
        let toml = r#"
            dataDir = "/var/lib/mediasort"
            chatCommand = "mediasort-chat-bridge"
            sortedGroupName = "Archive"
            videoMatches = ["nature", "wildlife"]
        "#;
        let file: ConfigFile = toml::from_str(toml).unwrap();
        assert_eq!(file.max_forwards, u64::MAX);
        assert!(!file.dry_run);
        assert!(file.video_exclusions.is_empty());
        assert!(file.duplicate_detection.check_duration);
        assert_eq!(file.duplicate_detection.duration_tolerance_seconds, 30);
    }

    #[test]
    fn parses_full_config() {
        let toml = r#"
            dataDir = "/var/lib/mediasort"
            chatCommand = "mediasort-chat-bridge"
            chatArgs = ["--session", "/etc/mediasort/session.json"]
            sortedGroupName = "Archive"
            videoMatches = ["nature"]
            videoExclusions = ["preview"]
            sourceGroups = [-1001, -1002]
            minVideoDurationInSeconds = 30
            maxVideoDurationInSeconds = 3600
            minFileSizeMB = 1.0
            maxFileSizeMB = 2048.0
            maxForwards = 500
            dryRun = true
            skipCleanup = true

            [duplicateDetection]
            checkMimeType = false
            resolutionTolerancePercent = 15.0
        "#;
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), toml).unwrap();
        let (settings, config) = load_config(tmp.path()).unwrap();
        assert_eq!(settings.chat_args, vec!["--session", "/etc/mediasort/session.json"]);
        assert_eq!(config.source_groups, vec![-1001, -1002]);
        assert_eq!(config.max_forwards, 500);
        assert!(config.dry_run);
        assert!(config.skip_cleanup);
        assert!(!config.duplicate_detection.check_mime_type);
        assert_eq!(config.duplicate_detection.resolution_tolerance_percent, 15.0);
        // Untouched duplicate-detection fields keep their documented defaults.
        assert!(config.duplicate_detection.check_duration);
        assert_eq!(config.duplicate_detection.duration_tolerance_seconds, 30);
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = load_config(Path::new("/nonexistent/mediasort.toml")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn cache_round_trips() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let mut cache = ForumGroupCache::default();
        cache.group_id = Some(-100);
        cache.topics.insert("nature".to_string(), 5);
        cache.save(tmp.path()).unwrap();
        let loaded = ForumGroupCache::load(tmp.path());
        assert_eq!(loaded.group_id, Some(-100));
        assert_eq!(loaded.topics["nature"], 5);
    }

    #[test]
    fn missing_cache_file_is_empty() {
        let cache = ForumGroupCache::load(Path::new("/nonexistent/forum-group-cache.json"));
        assert_eq!(cache.group_id, None);
        assert!(cache.topics.is_empty());
    }
}
