// SPDX-License-Identifier: MIT
//! # Split Boundaries
//!
//! Math for cutting one tall composed image into an ordered sequence of parts.
//!
//! ## Units
//!
//! A boundary is a row offset in CSS pixels measured from the top of the
//! composed image's content region (any footer band is excluded). The
//! splitter maps boundaries to raw pixel rows with [`pixel_cuts`].
//!
//! ## Default Boundary Algorithm
//!
//! When the caller supplies no boundaries, [`default_boundaries`] aims for
//! parts of equal *final* height, where a part's final height includes the
//! footer band it will carry:
//! 1. Sum content height and all per-part footer heights
//! 2. Divide by the part count, handing the remainder out one pixel at a time
//!    to the earliest parts
//! 3. Subtract each part's footer height to get its content share, clamped so
//!    every part (including the ones still to come) keeps at least 1px
//!
//! Everything is integer arithmetic so results are identical on every
//! platform.

use crate::presets::FooterScope;

/// Minimum distance between two kept boundaries, in CSS pixels.
pub const MIN_BOUNDARY_GAP: u32 = 40;

/// Height of the informational footer band, in CSS pixels.
pub const FOOTER_HEIGHT: u32 = 220;

/// Clean a set of candidate boundaries against a content height.
///
/// Non-finite values are discarded, the rest floored; values outside
/// `(0, total_height)` are dropped, the remainder sorted and kept only when at
/// least [`MIN_BOUNDARY_GAP`] beyond the previously kept value.
pub fn normalize_boundaries(raw: &[f64], total_height: u32) -> Vec<u32> {
    let total = f64::from(total_height);
    let mut clean: Vec<u32> = raw
        .iter()
        .filter(|v| v.is_finite())
        .map(|v| v.floor())
        .filter(|v| *v > 0.0 && *v < total)
        .map(|v| v as u32)
        .collect();
    clean.sort_unstable();

    let mut kept: Vec<u32> = Vec::with_capacity(clean.len());
    for value in clean {
        match kept.last() {
            Some(&last) if value - last < MIN_BOUNDARY_GAP => {}
            _ => kept.push(value),
        }
    }
    kept
}

/// Per-part footer heights for a split with `grid_count` parts.
///
/// Without a footer link every part gets 0 regardless of scope.
pub fn footer_heights(
    grid_count: usize,
    has_footer_link: bool,
    scope: FooterScope,
    footer_height: u32,
) -> Vec<u32> {
    (0..grid_count)
        .map(|index| {
            if has_footer_link && scope.applies_to(index, grid_count) {
                footer_height
            } else {
                0
            }
        })
        .collect()
}

/// Evenly distributed boundaries for `footer_heights.len()` parts.
///
/// Returns `part_count - 1` cumulative content offsets; a single part (or
/// none) yields no boundaries.
pub fn default_boundaries(total_content_height: u32, footer_heights: &[u32]) -> Vec<u32> {
    let parts = footer_heights.len() as u64;
    if parts <= 1 {
        return Vec::new();
    }

    let total = u64::from(total_content_height);
    let total_final = total + footer_heights.iter().map(|h| u64::from(*h)).sum::<u64>();
    let base_final = total_final / parts;
    let mut remainder = total_final % parts;
    let mut accumulated = 0u64;
    let mut result = Vec::with_capacity(footer_heights.len() - 1);

    for (index, footer) in footer_heights.iter().take(footer_heights.len() - 1).enumerate() {
        let final_height = base_final + u64::from(remainder > 0);
        remainder = remainder.saturating_sub(1);
        let parts_after = parts - index as u64 - 1;
        let desired = final_height.saturating_sub(u64::from(*footer)).max(1);
        let available = total
            .saturating_sub(accumulated)
            .saturating_sub(parts_after)
            .max(1);
        accumulated += desired.min(available);
        result.push(accumulated.min(u64::from(u32::MAX)) as u32);
    }
    result
}

/// Raw pixel cut rows `[0, b1, ..., content_pixel_height]` for normalized boundaries.
///
/// Boundaries that land on or before the previous cut, or at/after the end,
/// are skipped so the returned rows are strictly increasing.
pub fn pixel_cuts(boundaries: &[u32], pixel_ratio: f64, content_pixel_height: u32) -> Vec<u32> {
    let ratio = if pixel_ratio.is_finite() && pixel_ratio > 0.0 {
        pixel_ratio
    } else {
        1.0
    };
    let mut cuts = Vec::with_capacity(boundaries.len() + 2);
    cuts.push(0u32);
    for boundary in boundaries {
        let row = (f64::from(*boundary) * ratio).round() as u32;
        let last = cuts.last().copied().unwrap_or(0);
        if row > last && row < content_pixel_height {
            cuts.push(row);
        }
    }
    if content_pixel_height > cuts.last().copied().unwrap_or(0) {
        cuts.push(content_pixel_height);
    }
    cuts
}

/// Convert a CSS-pixel footer height into raw rows at `pixel_ratio`.
pub fn footer_pixel_height(footer_height: u32, pixel_ratio: f64) -> u32 {
    let ratio = if pixel_ratio.is_finite() && pixel_ratio > 0.0 {
        pixel_ratio
    } else {
        1.0
    };
    (f64::from(footer_height) * ratio).round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_sorts_and_enforces_gap() {
        assert_eq!(
            normalize_boundaries(&[150.0, 100.0, 900.0, 905.0], 1000),
            vec![100, 150, 900]
        );
    }

    #[test]
    fn normalize_drops_out_of_range_and_non_finite() {
        let raw = [
            0.0,
            -10.0,
            1000.0,
            1200.0,
            f64::NAN,
            f64::INFINITY,
            499.9,
        ];
        assert_eq!(normalize_boundaries(&raw, 1000), vec![499]);
    }

    #[test]
    fn normalize_collapses_duplicates() {
        assert_eq!(normalize_boundaries(&[300.0, 300.0, 339.0, 340.0], 1000), vec![300, 340]);
    }

    #[test]
    fn footer_heights_follow_scope() {
        assert_eq!(footer_heights(3, true, FooterScope::None, 220), vec![0, 0, 0]);
        assert_eq!(footer_heights(3, true, FooterScope::Last, 220), vec![0, 0, 220]);
        assert_eq!(footer_heights(3, true, FooterScope::All, 220), vec![220, 220, 220]);
        assert_eq!(footer_heights(3, false, FooterScope::All, 220), vec![0, 0, 0]);
    }

    #[test]
    fn default_boundaries_split_evenly_without_footers() {
        let cuts = default_boundaries(900, &[0, 0, 0]);
        assert_eq!(cuts, vec![300, 600]);
    }

    #[test]
    fn default_boundaries_hand_remainder_to_earliest_parts() {
        let cuts = default_boundaries(1001, &[0, 0, 0]);
        assert_eq!(cuts, vec![334, 668]);
    }

    #[test]
    fn default_boundaries_balance_final_heights_with_last_footer() {
        let footers = [0, 0, 220];
        let cuts = default_boundaries(900, &footers);
        assert_eq!(cuts, vec![374, 747]);
        let last_final = 900 - 747 + 220;
        assert_eq!(last_final, 373);
    }

    #[test]
    fn default_boundaries_never_starve_later_parts() {
        let cuts = default_boundaries(5, &[220, 220, 220, 220]);
        assert_eq!(cuts.len(), 3);
        assert!(cuts.windows(2).all(|w| w[0] < w[1]));
        assert!(*cuts.last().unwrap_or(&0) < 5);
    }

    #[test]
    fn single_part_has_no_boundaries() {
        assert!(default_boundaries(900, &[0]).is_empty());
        assert!(default_boundaries(900, &[]).is_empty());
    }

    #[test]
    fn pixel_cuts_scale_and_close_range() {
        assert_eq!(pixel_cuts(&[100, 200], 1.5, 600), vec![0, 150, 300, 600]);
        assert_eq!(pixel_cuts(&[], 2.0, 400), vec![0, 400]);
        assert_eq!(pixel_cuts(&[350], 2.0, 600), vec![0, 600]);
    }

    #[test]
    fn footer_pixel_height_rounds() {
        assert_eq!(footer_pixel_height(FOOTER_HEIGHT, 1.5), 330);
        assert_eq!(footer_pixel_height(FOOTER_HEIGHT, 1.25), 275);
        assert_eq!(footer_pixel_height(FOOTER_HEIGHT, 0.0), 220);
    }
}
