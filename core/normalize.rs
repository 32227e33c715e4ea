// This file is part of mediasort.
// Copyright (c) 2026 The mediasort Authors; see AUTHORS and LICENSE.
// SPDX-License-Identifier: MIT

//! Canonicalizes a filename into a comparison key for duplicate detection.
//!
//! The result is never reversed back into a filename; it exists only so two
//! differently-named releases of the same video compare equal.

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "avi", "mov", "wmv", "flv", "webm"];

const CODEC_TOKENS: &[&str] = &[
    "x264", "x265", "hevc", "h264", "h265", "avc", "av1", "aac", "ac3", "dts", "mp3", "flac",
];

const RELEASE_TOKENS: &[&str] = &["rss", "web-dl", "hdtv", "bluray", "brrip", "webrip"];

const DOMAIN_SUFFIXES: &[&str] = &[".xxx", ".com", ".net", ".org"];

/// Normalizes `file_name` for duplicate comparison. When `normalize` is
/// `false` this degrades to a plain lowercase, matching the configuration
/// escape hatch for operators who don't want the aggressive token-stripping.
pub fn normalize(file_name: &str, normalize: bool) -> String {
    let lower = file_name.to_lowercase();
    if !normalize {
        return lower;
    }

    let mut s = strip_extension(&lower);
    strip_bracketed_tokens(&mut s, is_resolution_token);
    strip_bracketed_tokens(&mut s, |t| CODEC_TOKENS.contains(&t));
    strip_bracketed_release_tokens(&mut s);
    strip_domain_suffixes(&mut s);
    collapse_separators(&mut s);
    keep_alphanumeric_and_space(&mut s);
    s.retain(|c| c != ' ');
    s
}

fn strip_extension(lower: &str) -> String {
    for ext in VIDEO_EXTENSIONS {
        let suffix = format!(".{ext}");
        if let Some(stripped) = lower.strip_suffix(&suffix) {
            return stripped.to_string();
        }
    }
    lower.to_string()
}

fn is_resolution_token(t: &str) -> bool {
    if t == "uhd" || t == "fhd" || t == "hd" || t == "sd" {
        return true;
    }
    if let Some(digits) = t.strip_suffix('p') {
        if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
            return true;
        }
    }
    if let Some(digits) = t.strip_suffix('k') {
        if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
            return true;
        }
    }
    false
}

/// Removes tokens recognized by `is_token`, whether bare or wrapped in
/// `[]`/`()`/`{}`, by scanning separator-delimited and bracket-delimited runs.
fn strip_bracketed_tokens(s: &mut String, is_token: impl Fn(&str) -> bool) {
    let mut out = String::with_capacity(s.len());
    let mut rest = s.as_str();
    loop {
        let (token, open_len, close_len) = next_token(rest);
        if token.is_empty() {
            out.push_str(rest);
            break;
        }
        let idx = rest.find(token).unwrap();
        out.push_str(&rest[..idx.saturating_sub(open_len)]);
        if !is_token(token) {
            if open_len > 0 {
                out.push_str(&rest[idx - open_len..idx + token.len() + close_len]);
            } else {
                out.push_str(token);
            }
        }
        rest = &rest[idx + token.len() + close_len..];
    }
    *s = out;
}

/// Finds the next bracketed-or-bare alphanumeric token in `s`. Returns the
/// token text and the lengths of any surrounding bracket characters.
fn next_token(s: &str) -> (&str, usize, usize) {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
        if c == '[' || c == '(' || c == '{' {
            let close = match c {
                '[' => ']',
                '(' => ')',
                _ => '}',
            };
            if let Some(end) = s[i + 1..].find(close) {
                let inner = &s[i + 1..i + 1 + end];
                if !inner.is_empty() && inner.chars().all(|c| c.is_ascii_alphanumeric()) {
                    return (inner, 1, 1);
                }
            }
            i += 1;
            continue;
        }
        if c.is_ascii_alphanumeric() {
            let start = i;
            while i < bytes.len() && (bytes[i] as char).is_ascii_alphanumeric() {
                i += 1;
            }
            return (&s[start..i], 0, 0);
        }
        i += 1;
    }
    ("", 0, 0)
}

/// Removes a `RELEASE_TOKENS` entry only when it appears as the entire
/// contents of a `[]`/`()`/`{}` group, e.g. `[RSS]` or `(WEB-DL)`. Unlike
/// [`strip_bracketed_tokens`], a bare, unbracketed occurrence is left alone:
/// release tags are common substrings of ordinary words and titles, so
/// stripping them without the bracket marking them as a tag would be too
/// aggressive.
fn strip_bracketed_release_tokens(s: &mut String) {
    let mut out = String::with_capacity(s.len());
    let mut rest = s.as_str();
    loop {
        let Some(open_idx) = rest.find(['[', '(', '{']) else {
            out.push_str(rest);
            break;
        };
        let open_char = rest[open_idx..].chars().next().unwrap();
        let close_char = match open_char {
            '[' => ']',
            '(' => ')',
            _ => '}',
        };
        let inner_start = open_idx + open_char.len_utf8();
        let Some(close_rel) = rest[inner_start..].find(close_char) else {
            out.push_str(rest);
            break;
        };
        let inner_end = inner_start + close_rel;
        let inner = &rest[inner_start..inner_end];
        out.push_str(&rest[..open_idx]);
        if !RELEASE_TOKENS.contains(&inner) {
            out.push_str(&rest[open_idx..inner_end + close_char.len_utf8()]);
        }
        rest = &rest[inner_end + close_char.len_utf8()..];
    }
    *s = out;
}

fn strip_domain_suffixes(s: &mut String) {
    for suffix in DOMAIN_SUFFIXES {
        let pat = suffix.to_string();
        while let Some(idx) = s.find(&pat) {
            let after = idx + pat.len();
            let followed_by_sep_or_eol = s[after..]
                .chars()
                .next()
                .map(|c| matches!(c, '_' | '-' | '.' | ' '))
                .unwrap_or(true);
            if followed_by_sep_or_eol {
                s.replace_range(idx..after, "");
            } else {
                break;
            }
        }
    }
}

fn collapse_separators(s: &mut String) {
    let mut out = String::with_capacity(s.len());
    let mut last_was_sep = false;
    for c in s.chars() {
        if matches!(c, '[' | ' ' | '_' | '-' | '.' | ']' | '(' | ')' | '{' | '}') {
            if !last_was_sep {
                out.push(' ');
                last_was_sep = true;
            }
        } else {
            out.push(c);
            last_was_sep = false;
        }
    }
    *s = out.trim().to_string();
}

fn keep_alphanumeric_and_space(s: &mut String) {
    s.retain(|c| c.is_ascii_alphanumeric() || c == ' ');
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_extension_and_quality_tokens() {
        assert_eq!(
            normalize("Some.Show.S01E02.1080p.x264.mkv", true),
            "someshows01e02"
        );
    }

    #[test]
    fn release_token_stripped_only_when_bracketed() {
        assert_eq!(normalize("Show.Name.[RSS].mkv", true), "showname");
        assert_eq!(normalize("Show.Name.RSS.mkv", true), "shownamerss");
    }

    #[test]
    fn hyphenated_release_token_stripped_when_bracketed() {
        assert_eq!(normalize("Show.Name.[WEB-DL].mkv", true), "showname");
    }

    #[test]
    fn collapses_separators_and_strips_punctuation() {
        assert_eq!(normalize("my__video---clip!!.mp4", true), "myvideoclip");
    }

    #[test]
    fn plain_lowercase_when_disabled() {
        assert_eq!(
            normalize("My.Video.1080p.mp4", false),
            "my.video.1080p.mp4"
        );
    }

    #[test]
    fn punctuation_only_names_normalize_to_empty() {
        assert_eq!(normalize("....mp4", true), "");
        assert_eq!(normalize("!!!!.mp4", true), "");
    }

    #[test]
    fn domain_suffix_is_removed_before_separator_collapse() {
        assert_eq!(normalize("release.xxx.mp4", true), "release");
    }
}
