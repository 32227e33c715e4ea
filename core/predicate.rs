// This file is part of mediasort.
// Copyright (c) 2026 The mediasort Authors; see AUTHORS and LICENSE.
// SPDX-License-Identifier: MIT

//! Decides whether a message is a candidate video, and which of the
//! configured match keywords it satisfies.

use crate::model::{CandidateVideo, Media, Message};
use crate::normalize::normalize;

/// Returns the subset of `matches` (in their original spelling, input order)
/// that apply to `message`, or an empty vector if the message is not a
/// candidate at all.
pub fn matched_keywords<'a>(
    message: &Message,
    matches: &'a [String],
    exclusions: &[String],
    min_duration_sec: i64,
) -> Vec<&'a str> {
    let Media::Video { document, attrs } = &message.media else {
        return Vec::new();
    };
    let Some(duration) = attrs.duration_sec else {
        return Vec::new();
    };
    if duration < min_duration_sec {
        return Vec::new();
    }

    let caption_lower = message.caption.as_deref().unwrap_or("").to_lowercase();
    let file_name_lower = document.file_name.to_lowercase();
    let text = format!("{caption_lower} {file_name_lower}");

    if should_exclude(&text, &document.file_name, exclusions) {
        return Vec::new();
    }

    matches
        .iter()
        .filter(|kw| {
            let kw = kw.trim().to_lowercase();
            !kw.is_empty() && text.contains(&kw)
        })
        .map(|kw| kw.as_str())
        .collect()
}

/// The exclusion half of the predicate, also used standalone by the Cleanup
/// Sweeper (which has no keyword matches to consider).
pub fn should_exclude(text: &str, _file_name: &str, exclusions: &[String]) -> bool {
    exclusions.iter().any(|ex| {
        let ex = ex.trim().to_lowercase();
        !ex.is_empty() && text.contains(&ex)
    })
}

/// Builds a [`CandidateVideo`] from a message already known to carry a video,
/// applying size/resolution bounds the caller enforces separately.
pub fn to_candidate(message: &Message, normalize_filenames: bool) -> Option<CandidateVideo> {
    let Media::Video { document, attrs } = &message.media else {
        return None;
    };
    let caption_lower = message.caption.as_deref().unwrap_or("").to_lowercase();
    let file_name_lower = document.file_name.to_lowercase();
    Some(CandidateVideo {
        source_chat_id: message.chat_id,
        source_message_id: message.message_id,
        file_name: document.file_name.clone(),
        normalized_name: normalize(&document.file_name, normalize_filenames),
        duration_sec: attrs.duration_sec,
        size_mb: document.size_bytes as f64 / (1024.0 * 1024.0),
        width: attrs.width,
        height: attrs.height,
        mime_type: document.mime_type.clone(),
        caption_lower,
        file_name_lower,
    })
}
