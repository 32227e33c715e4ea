// This file is part of mediasort.
// Copyright (c) 2026 The mediasort Authors; see AUTHORS and LICENSE.
// SPDX-License-Identifier: MIT

//! Given a candidate video and a target topic, decides whether a matching
//! row is already present, using exact-name, near-name, and
//! metadata-only-fallback passes, in that order.

use crate::model::{CandidateVideo, DuplicatePolicy, ProcessedVideo};
use crate::store::Store;

/// Finds the first processed-video row that should be considered the same
/// video as `candidate` within `topic_name`. Used by the scanner to decide
/// routing: present means "don't forward a second copy."
pub fn find_similar(
    store: &Store,
    candidate: &CandidateVideo,
    topic_name: &str,
    policy: &DuplicatePolicy,
) -> Result<Option<ProcessedVideo>, base::Error> {
    let rows = store.videos_in_topic(topic_name)?;
    Ok(find_similar_in(&rows, candidate, policy).into_iter().next())
}

/// Finds every processed-video row that should be considered the same video
/// as `candidate` within `topic_name`. Used before replacing duplicates in
/// the destination.
pub fn find_all_similar(
    store: &Store,
    candidate: &CandidateVideo,
    topic_name: &str,
    policy: &DuplicatePolicy,
) -> Result<Vec<ProcessedVideo>, base::Error> {
    let rows = store.videos_in_topic(topic_name)?;
    Ok(find_similar_in(&rows, candidate, policy))
}

fn find_similar_in(
    rows: &[ProcessedVideo],
    candidate: &CandidateVideo,
    policy: &DuplicatePolicy,
) -> Vec<ProcessedVideo> {
    let metadata_checks_enabled = policy.any_metadata_check_enabled();

    // 1. Exact-name path.
    let exact: Vec<ProcessedVideo> = rows
        .iter()
        .filter(|row| row.normalized_name == candidate.normalized_name)
        .filter(|row| {
            !metadata_checks_enabled || metadata_checks_pass(candidate, row, policy)
        })
        .cloned()
        .collect();
    if !exact.is_empty() {
        return exact;
    }

    // 2. Near-name path: only applies when at least one metadata check is on.
    if metadata_checks_enabled {
        let near: Vec<ProcessedVideo> = rows
            .iter()
            .filter(|row| similarity(&candidate.normalized_name, &row.normalized_name) >= 0.85)
            .filter(|row| metadata_checks_pass(candidate, row, policy))
            .cloned()
            .collect();
        if !near.is_empty() {
            return near;
        }

        // 3. Metadata-only fallback: only if the first two paths found nothing.
        let fallback: Vec<ProcessedVideo> = rows
            .iter()
            .filter(|row| metadata_checks_pass(candidate, row, policy))
            .cloned()
            .collect();
        if !fallback.is_empty() {
            return fallback;
        }
    }

    Vec::new()
}

/// Every enabled check must independently pass; a check passes only when
/// both sides carry the relevant data and the difference is within
/// tolerance. Missing data on an enabled check rejects the row.
fn metadata_checks_pass(
    candidate: &CandidateVideo,
    row: &ProcessedVideo,
    policy: &DuplicatePolicy,
) -> bool {
    metadata_fields_pass(
        candidate,
        row.duration_sec,
        row.size_mb,
        row.width,
        row.height,
        row.mime_type.as_deref(),
        policy,
    )
}

/// Same rule as [`metadata_checks_pass`], against explicit metadata fields
/// rather than a [`ProcessedVideo`] row. Used by the Topic Cache to compare a
/// candidate against a live destination message before deleting it as a
/// duplicate (§4.7 step 9), which has no `ProcessedVideo` row to compare
/// against.
#[allow(clippy::too_many_arguments)]
pub(crate) fn metadata_fields_pass(
    candidate: &CandidateVideo,
    duration_sec: Option<i64>,
    size_mb: Option<f64>,
    width: Option<i64>,
    height: Option<i64>,
    mime_type: Option<&str>,
    policy: &DuplicatePolicy,
) -> bool {
    if policy.check_duration {
        match (candidate.duration_sec, duration_sec) {
            (Some(a), Some(b)) => {
                if (a - b).abs() > policy.duration_tolerance_seconds {
                    return false;
                }
            }
            _ => return false,
        }
    }
    if policy.check_file_size {
        match size_mb {
            Some(b) => {
                let a = candidate.size_mb;
                let denom = a.max(b);
                if denom <= 0.0 || (a - b).abs() / denom * 100.0 > policy.file_size_tolerance_percent
                {
                    return false;
                }
            }
            None => return false,
        }
    }
    if policy.check_resolution {
        match (candidate.width, candidate.height, width, height) {
            (Some(aw), Some(ah), Some(bw), Some(bh)) => {
                let a_area = (aw * ah) as f64;
                let b_area = (bw * bh) as f64;
                let denom = a_area.max(b_area);
                if denom <= 0.0
                    || (a_area - b_area).abs() / denom * 100.0 > policy.resolution_tolerance_percent
                {
                    return false;
                }
            }
            _ => return false,
        }
    }
    if policy.check_mime_type {
        match mime_type {
            Some(b) => {
                if !candidate
                    .mime_type
                    .as_deref()
                    .is_some_and(|a| a.eq_ignore_ascii_case(b))
                {
                    return false;
                }
            }
            None => return false,
        }
    }
    true
}

/// Weighted prefix-length + Jaccard similarity between two normalized names,
/// in `[0.0, 1.0]`.
fn similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    let (shorter_len, longer_len) = if a.len() <= b.len() {
        (a.len(), b.len())
    } else {
        (b.len(), a.len())
    };
    if longer_len == 0 {
        return 0.0;
    }
    let length_ratio = shorter_len as f64 / longer_len as f64;
    if length_ratio < 0.7 {
        return 0.0;
    }
    if a.contains(b) || b.contains(a) {
        return length_ratio;
    }
    let prefix_len = a
        .chars()
        .zip(b.chars())
        .take_while(|(x, y)| x == y)
        .count();
    let prefix_score = prefix_len as f64 / longer_len as f64;
    let jaccard_score = jaccard_char_sets(a, b);
    0.7 * prefix_score + 0.3 * jaccard_score
}

fn jaccard_char_sets(a: &str, b: &str) -> f64 {
    let set_a: std::collections::HashSet<char> = a.chars().collect();
    let set_b: std::collections::HashSet<char> = b.chars().collect();
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CandidateVideo;

    fn candidate(name: &str) -> CandidateVideo {
        CandidateVideo {
            source_chat_id: 1,
            source_message_id: 1,
            file_name: format!("{name}.mp4"),
            normalized_name: name.to_string(),
            duration_sec: Some(120),
            size_mb: 100.0,
            width: Some(1920),
            height: Some(1080),
            mime_type: Some("video/mp4".to_string()),
            caption_lower: String::new(),
            file_name_lower: String::new(),
        }
    }

    fn row(name: &str, topic: &str) -> ProcessedVideo {
        ProcessedVideo {
            file_name: format!("{name}.mp4"),
            normalized_name: name.to_string(),
            topic_name: topic.to_string(),
            duration_sec: Some(120),
            size_mb: Some(100.0),
            width: Some(1920),
            height: Some(1080),
            mime_type: Some("video/mp4".to_string()),
            processed_at: 0,
        }
    }

    #[test]
    fn exact_name_match_without_metadata_checks() {
        let policy = DuplicatePolicy {
            check_duration: false,
            check_file_size: false,
            check_resolution: false,
            check_mime_type: false,
            ..DuplicatePolicy::default()
        };
        let rows = vec![row("clip", "nature")];
        let result = find_similar_in(&rows, &candidate("clip"), &policy);
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn exact_name_rejected_when_metadata_missing() {
        let policy = DuplicatePolicy::default();
        let mut stored = row("clip", "nature");
        stored.duration_sec = None;
        let result = find_similar_in(&[stored], &candidate("clip"), &policy);
        assert!(result.is_empty());
    }

    #[test]
    fn near_name_path_requires_metadata_checks_enabled() {
        let policy = DuplicatePolicy {
            check_duration: false,
            check_file_size: false,
            check_resolution: false,
            check_mime_type: false,
            ..DuplicatePolicy::default()
        };
        let rows = vec![row("clipextra", "nature")];
        let result = find_similar_in(&rows, &candidate("clip"), &policy);
        assert!(result.is_empty());
    }

    #[test]
    fn metadata_only_fallback_matches_differently_named_row() {
        let policy = DuplicatePolicy::default();
        let rows = vec![row("totallydifferentname", "nature")];
        let result = find_similar_in(&rows, &candidate("clip"), &policy);
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn similarity_is_symmetric_and_bounded() {
        let s = similarity("wildlifedoc", "wildlifedocumentary");
        assert!(s >= 0.0 && s <= 1.0);
        assert_eq!(similarity("a", "a"), 1.0);
    }

    #[test]
    fn short_vs_long_names_never_similar() {
        assert_eq!(similarity("ab", "abcdefghij"), 0.0);
    }
}
