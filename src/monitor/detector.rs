//! # Change Detection
//! Pure comparison primitives over already-filtered content buffers.
//!
//! The owning monitor decides what to feed in (filtered, optionally
//! whitespace-normalized) and what to do with the verdict; everything here
//! is deterministic and side-effect free.

use sha2::{Digest, Sha256};

use crate::monitor::types::{CheckMethod, CompareFn};

/// Bytes of surrounding context shown on each side of a difference.
const DIFF_CONTEXT: usize = 20;

/// Compare two observations with the given method.
///
/// Returns `(changed, details)`; `details` is only present on a change.
pub fn compare(
    method: CheckMethod,
    compare_fn: Option<&CompareFn>,
    previous: &[u8],
    current: &[u8],
) -> (bool, Option<String>) {
    match method {
        CheckMethod::Hash => {
            if Sha256::digest(previous) != Sha256::digest(current) {
                (true, Some(first_difference(previous, current)))
            } else {
                (false, None)
            }
        }
        CheckMethod::Length => {
            if previous.len() != current.len() {
                let details = format!(
                    "content length changed from {} to {} bytes",
                    previous.len(),
                    current.len()
                );
                (true, Some(details))
            } else {
                (false, None)
            }
        }
        CheckMethod::Custom => match compare_fn {
            Some(f) => {
                let (changed, details) = f.call(previous, current);
                if changed {
                    (true, Some(details))
                } else {
                    (false, None)
                }
            }
            None => (false, None),
        },
    }
}

/// Describe where two buffers first diverge.
///
/// Scans for the first differing byte index; if none differs but the lengths
/// do, the shorter length is the divergence point. Shows up to
/// [`DIFF_CONTEXT`] bytes of context on each side, clipped to buffer bounds.
pub fn first_difference(old: &[u8], new: &[u8]) -> String {
    let common = old.len().min(new.len());
    let diff_pos = (0..common).find(|&i| old[i] != new[i]);

    if diff_pos.is_none() && old.len() == new.len() {
        return "content changed but no specific difference found".to_owned();
    }

    let pos = diff_pos.unwrap_or(common);
    let start = pos.saturating_sub(DIFF_CONTEXT);
    let old_end = (pos + DIFF_CONTEXT).min(old.len());
    let new_end = (pos + DIFF_CONTEXT).min(new.len());

    format!(
        "content differs at position {}\nold: ...{}...\nnew: ...{}...",
        pos,
        String::from_utf8_lossy(&old[start..old_end]),
        String::from_utf8_lossy(&new[start..new_end]),
    )
}

/// Convert CRLF and lone CR line endings to LF.
pub fn normalize_line_endings(content: &[u8]) -> Vec<u8> {
    let text = String::from_utf8_lossy(content);
    text.replace("\r\n", "\n").replace('\r', "\n").into_bytes()
}

/// Full whitespace normalization: unify line endings, collapse whitespace
/// runs to single spaces, trim the ends.
pub fn normalize_whitespace(content: &[u8]) -> Vec<u8> {
    if content.is_empty() {
        return Vec::new();
    }
    let unified = normalize_line_endings(content);
    let text = String::from_utf8_lossy(&unified);
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .into_bytes()
}
