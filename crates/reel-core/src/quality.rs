//! Quality ladder ranking and selection
//!
//! Resolution labels coming from the backend are free-form ("1080p",
//! "1280x720", "4K"), so selection works on a derived numeric rank instead of
//! the label itself.

use crate::types::VideoQuality;
use std::cmp::{Ordering, Reverse};
use tracing::debug;

/// Derive the vertical pixel count from a resolution label (0 if unknown)
pub fn resolution_rank(label: &str) -> u32 {
    let label = label.trim().to_ascii_lowercase();

    match label.as_str() {
        "8k" => return 4320,
        "4k" | "uhd" => return 2160,
        "2k" | "qhd" => return 1440,
        "fhd" | "full hd" | "fullhd" => return 1080,
        "hd" => return 720,
        "sd" => return 480,
        _ => {}
    }

    // "1920x1080" carries the height after the separator
    if let Some((_, height)) = label.split_once(['x', '×']) {
        return leading_number(height.trim());
    }

    // "1080p", "1080i", "720"
    leading_number(&label)
}

fn leading_number(s: &str) -> u32 {
    let digits: String = s.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().unwrap_or(0)
}

/// Total order used for best / next-lower decisions
fn ladder_cmp(a: &VideoQuality, b: &VideoQuality) -> Ordering {
    (a.rank(), a.bitrate_kbps).cmp(&(b.rank(), b.bitrate_kbps))
}

/// Highest ranked quality, earliest entry on ties
pub fn best_quality(qualities: &[VideoQuality]) -> Option<&VideoQuality> {
    qualities
        .iter()
        .enumerate()
        .max_by(|(ia, a), (ib, b)| ladder_cmp(a, b).then(ib.cmp(ia)))
        .map(|(_, q)| q)
}

/// The quality ranked directly below `current_id`, if any
pub fn next_lower_quality(qualities: &[VideoQuality], current_id: u64) -> Option<&VideoQuality> {
    let current = qualities.iter().find(|q| q.id == current_id)?;
    qualities
        .iter()
        .filter(|q| q.id != current_id && ladder_cmp(q, current) == Ordering::Less)
        .max_by(|a, b| ladder_cmp(a, b))
}

/// Policy choosing the quality a session starts with
///
/// Implementations must be deterministic for a given input.
pub trait QualityPolicy: Send + Sync {
    /// Index into `qualities` of the initial rendition
    fn initial_quality(&self, qualities: &[VideoQuality], bandwidth_hint_kbps: Option<u32>) -> usize;

    /// Get policy name
    fn name(&self) -> &'static str;
}

/// Highest bitrate that fits the bandwidth hint, else the first entry
#[derive(Debug, Clone, Copy, Default)]
pub struct HighestFittingBitrate;

impl QualityPolicy for HighestFittingBitrate {
    fn initial_quality(&self, qualities: &[VideoQuality], bandwidth_hint_kbps: Option<u32>) -> usize {
        let selected = qualities
            .iter()
            .enumerate()
            .filter(|(_, q)| bandwidth_hint_kbps.map_or(true, |hint| q.bitrate_kbps <= hint))
            .max_by_key(|(i, q)| (q.bitrate_kbps, Reverse(*i)))
            .map(|(i, _)| i)
            .unwrap_or(0);

        debug!(
            index = selected,
            hint_kbps = ?bandwidth_hint_kbps,
            candidates = qualities.len(),
            "Initial quality selected"
        );

        selected
    }

    fn name(&self) -> &'static str {
        "highest_fitting_bitrate"
    }
}

/// Always start from the cheapest rendition
#[derive(Debug, Clone, Copy, Default)]
pub struct LowestBitrate;

impl QualityPolicy for LowestBitrate {
    fn initial_quality(&self, qualities: &[VideoQuality], _bandwidth_hint_kbps: Option<u32>) -> usize {
        qualities
            .iter()
            .enumerate()
            .min_by_key(|(i, q)| (q.bitrate_kbps, *i))
            .map(|(i, _)| i)
            .unwrap_or(0)
    }

    fn name(&self) -> &'static str {
        "lowest_bitrate"
    }
}
