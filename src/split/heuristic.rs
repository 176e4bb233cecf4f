//! Heuristic Split Detector
//!
//! Fast, oracle-free split estimate used by interactive review. Only the
//! center band of a small analysis copy is searched, and any failure to
//! obtain pixels degrades to the center split rather than an error.

use super::profile::{profile_columns, ColumnProfile, ProfileParams};
use super::raster::GrayRaster;
use super::types::{to_permille, HeuristicSplit, MAX_POSITION};

/// Default analysis width in pixels
pub const DEFAULT_ANALYSIS_WIDTH: u32 = 500;

/// Center band searched for the gutter (fractions of width)
const BAND_START: f64 = 0.35;
const BAND_END: f64 = 0.65;

const BRIGHTNESS_WEIGHT: f64 = 0.3;
const DARK_RUN_WEIGHT: f64 = 0.35;
const TRANSITION_WEIGHT: f64 = 0.2;

/// Above this many transitions the column is considered busy
const TEXT_TRANSITIONS: u32 = 30;
/// Below this dark-run percentage the column is not a continuous line
const TEXT_MAX_DARK_RUN_PERCENT: f64 = 40.0;

/// Best-scoring column of the center band
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandPick {
    /// Column index in the analysis raster
    pub column: usize,
    pub score: f64,
    pub dark_run_percent: f64,
    pub transitions: u32,
}

impl BandPick {
    pub fn has_text(&self) -> bool {
        self.transitions > TEXT_TRANSITIONS && self.dark_run_percent < TEXT_MAX_DARK_RUN_PERCENT
    }
}

/// Gutter score of one column: darker, longer dark runs and fewer
/// transitions all raise it.
pub fn column_score(profile: &ColumnProfile, height: u32) -> f64 {
    let brightness = (255.0 - profile.p10 as f64) / 2.55;
    let dark_run = dark_run_percent(profile, height);
    let calm = (100.0 - profile.transitions as f64 / 5.0).max(0.0);

    BRIGHTNESS_WEIGHT * brightness + DARK_RUN_WEIGHT * dark_run + TRANSITION_WEIGHT * calm
}

fn dark_run_percent(profile: &ColumnProfile, height: u32) -> f64 {
    if height == 0 {
        return 0.0;
    }
    profile.max_dark_run as f64 / height as f64 * 100.0
}

/// Pick the highest scoring column in the center band.
///
/// The scan runs left to right and only a strictly greater score replaces
/// the current pick, so the first column reaching the maximum wins.
pub fn pick_center_column(profiles: &[ColumnProfile], height: u32) -> Option<BandPick> {
    let width = profiles.len();
    if width == 0 {
        return None;
    }

    let start = (width as f64 * BAND_START).floor() as usize;
    let end = ((width as f64 * BAND_END).ceil() as usize).min(width);

    let mut best: Option<BandPick> = None;
    for (column, profile) in profiles.iter().enumerate().take(end).skip(start) {
        let score = column_score(profile, height);
        if best.map_or(true, |b| score > b.score) {
            best = Some(BandPick {
                column,
                score,
                dark_run_percent: dark_run_percent(profile, height),
                transitions: profile.transitions,
            });
        }
    }
    best
}

/// Interactive split detector
#[derive(Debug, Clone, Copy)]
pub struct HeuristicDetector {
    analysis_width: u32,
    params: ProfileParams,
}

impl Default for HeuristicDetector {
    fn default() -> Self {
        Self::new(DEFAULT_ANALYSIS_WIDTH)
    }
}

impl HeuristicDetector {
    pub fn new(analysis_width: u32) -> Self {
        Self {
            analysis_width,
            params: ProfileParams::new(128),
        }
    }

    pub fn with_params(mut self, params: ProfileParams) -> Self {
        self.params = params;
        self
    }

    /// Detect the split on an already decoded raster
    pub fn detect(&self, raster: &GrayRaster) -> HeuristicSplit {
        let small = raster.downsample(self.analysis_width);
        let profiles = profile_columns(&small, self.params);

        let Some(pick) = pick_center_column(&profiles, small.height()) else {
            tracing::warn!("Empty raster passed to heuristic detector, using center split");
            return HeuristicSplit::FALLBACK;
        };

        let position = to_permille(pick.column as f64, small.width())
            .round()
            .clamp(0.0, MAX_POSITION as f64) as i32;

        tracing::debug!(
            "Heuristic split at column {} of {} (score {:.1}, transitions {}, dark run {:.1}%)",
            pick.column,
            small.width(),
            pick.score,
            pick.transitions,
            pick.dark_run_percent
        );

        HeuristicSplit {
            split_position: position,
            has_text_warning: pick.has_text(),
        }
    }

    /// Decode and detect; undecodable input yields the center fallback
    pub fn detect_bytes(&self, image_data: &[u8]) -> HeuristicSplit {
        match GrayRaster::decode(image_data) {
            Ok(raster) => self.detect(&raster),
            Err(e) => {
                tracing::warn!("Heuristic split fell back to center: {}", e);
                HeuristicSplit::FALLBACK
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAPER: u8 = 235;
    const INK: u8 = 25;

    /// Uniform pages with a dark vertical gutter over `gutter`
    fn gutter_raster(width: u32, height: u32, gutter: std::ops::Range<u32>) -> GrayRaster {
        GrayRaster::from_fn(width, height, |x, _| if gutter.contains(&x) { INK } else { PAPER })
    }

    /// Text lines 8px tall every 16px, glyphs 4px wide every 6px
    fn is_glyph(x: u32, y: u32) -> bool {
        y % 16 < 8 && x % 6 < 4
    }

    #[test]
    fn test_gutter_column_is_chosen() {
        let raster = gutter_raster(500, 400, 240..260);
        let profiles = profile_columns(&raster, ProfileParams::default());
        let pick = pick_center_column(&profiles, raster.height()).unwrap();
        assert!((240..260).contains(&pick.column));
        assert_eq!(pick.column, 240);
        assert!(!pick.has_text());

        let split = HeuristicDetector::default().detect(&raster);
        assert_eq!(split.split_position, 480);
        assert!(!split.has_text_warning);
    }

    #[test]
    fn test_text_across_center_raises_warning() {
        let raster = GrayRaster::from_fn(400, 700, |x, y| if is_glyph(x, y) { INK } else { PAPER });
        let split = HeuristicDetector::default().detect(&raster);
        assert!(split.has_text_warning);
        assert!((350..=650).contains(&split.split_position));
    }

    #[test]
    fn test_mirrored_columns_with_gutter_end_to_end() {
        // Two text columns mirrored around a 20px gutter at x=500
        let raster = GrayRaster::from_fn(1000, 700, |x, y| {
            if (490..510).contains(&x) {
                INK
            } else if ((100..450).contains(&x) && is_glyph(x, y))
                || ((550..900).contains(&x) && is_glyph(999 - x, y))
            {
                INK
            } else {
                PAPER
            }
        });

        let split = HeuristicDetector::new(500).detect(&raster);
        assert!(
            (490..=510).contains(&split.split_position),
            "split at {}",
            split.split_position
        );
        assert!(!split.has_text_warning);
    }

    #[test]
    fn test_tie_break_prefers_leftmost() {
        let raster = GrayRaster::from_fn(100, 50, |_, _| PAPER);
        let profiles = profile_columns(&raster, ProfileParams::default());
        let pick = pick_center_column(&profiles, raster.height()).unwrap();
        assert_eq!(pick.column, 35);
    }

    #[test]
    fn test_output_within_scale() {
        for width in [1u32, 2, 3, 17, 500, 640] {
            let raster = GrayRaster::from_fn(width, 30, |x, y| ((x * 7 + y * 13) % 256) as u8);
            let split = HeuristicDetector::default().detect(&raster);
            assert!((0..=1000).contains(&split.split_position));
        }
    }

    #[test]
    fn test_undecodable_bytes_fall_back() {
        let split = HeuristicDetector::default().detect_bytes(b"not an image");
        assert_eq!(split, HeuristicSplit::FALLBACK);
    }

    #[test]
    fn test_empty_raster_falls_back() {
        let raster = GrayRaster::from_fn(0, 0, |_, _| 0);
        assert_eq!(HeuristicDetector::default().detect(&raster), HeuristicSplit::FALLBACK);
    }

    #[test]
    fn test_column_score_weights() {
        let gutter = ColumnProfile {
            p10: 0,
            max_dark_run: 100,
            transitions: 0,
        };
        assert!((column_score(&gutter, 100) - 85.0).abs() < 1e-9);

        let blank = ColumnProfile {
            p10: 255,
            max_dark_run: 0,
            transitions: 0,
        };
        assert!((column_score(&blank, 100) - 20.0).abs() < 1e-9);
    }
}
