//! Split Feature Extraction
//!
//! Computes the multi-region feature vector that trains and feeds the
//! split model. Unlike the heuristic detector this path raises on bad
//! input: degenerate features would poison the training corpus.
//!
//! Positions are reported on the 0-1000 permille scale, except the two
//! center-band indices which are percentages of the band (0-100).

use std::borrow::Cow;

use serde::{Deserialize, Deserializer, Serialize};

use super::profile::{profile_columns, ColumnProfile, ProfileParams};
use super::raster::GrayRaster;
use super::types::{to_permille, BookContext, SplitError};

/// Smallest raster the extractor accepts
const MIN_WIDTH: u32 = 20;
const MIN_HEIGHT: u32 = 8;

/// Center band (fractions of width)
const BAND_START: f64 = 0.40;
const BAND_END: f64 = 0.60;

/// Edge strips (fraction of width, per side)
const EDGE_FRACTION: f64 = 0.05;

/// Center brighter than edges by more than this means a bright gutter
const INVERTED_DIFF: f64 = 30.0;

/// Rightward correction applied to dark gutters (fraction of width)
const DARK_GUTTER_BIAS: f64 = 0.005;

/// p10 distance from the extreme column still counted as gutter
const GUTTER_TOLERANCE: u8 = 20;

/// Columns with more transitions than this are text candidates
const TEXT_TRANSITIONS: u32 = 20;

/// Majority-vote window (fraction of width, minimum columns)
const TEXT_WINDOW_FRACTION: f64 = 0.01;
const TEXT_WINDOW_MIN: usize = 3;

/// Feature vector for one scanned image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SplitFeatures {
    // Center band
    #[serde(deserialize_with = "lenient_f64")]
    pub center_darkest_idx: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub center_brightest_idx: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub center_darkest_p10: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub center_brightest_p10: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub center_mean_p10: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub center_variance_p10: f64,

    // Edges
    #[serde(deserialize_with = "lenient_f64")]
    pub edge_left_p10: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub edge_right_p10: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub edge_center_diff: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub is_inverted: f64,

    // Predicted gutter
    #[serde(deserialize_with = "lenient_f64")]
    pub predicted_position: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub gutter_width: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub predicted_p10: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub predicted_dark_run: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub predicted_transitions: f64,

    // Text boundaries
    #[serde(deserialize_with = "lenient_f64")]
    pub left_page_text_end: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub right_page_text_start: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub text_gap_width: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub text_gap_center: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub left_margin: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub right_margin: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub margin_bias: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub ideal_split_from_text: f64,

    // Image
    #[serde(deserialize_with = "lenient_f64")]
    pub aspect_ratio: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub width: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub height: f64,

    // Book context
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_position: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub book_size_category: Option<f64>,
}

/// Missing features deserialize as NaN so validation can reject them
impl Default for SplitFeatures {
    fn default() -> Self {
        Self {
            center_darkest_idx: f64::NAN,
            center_brightest_idx: f64::NAN,
            center_darkest_p10: f64::NAN,
            center_brightest_p10: f64::NAN,
            center_mean_p10: f64::NAN,
            center_variance_p10: f64::NAN,
            edge_left_p10: f64::NAN,
            edge_right_p10: f64::NAN,
            edge_center_diff: f64::NAN,
            is_inverted: f64::NAN,
            predicted_position: f64::NAN,
            gutter_width: f64::NAN,
            predicted_p10: f64::NAN,
            predicted_dark_run: f64::NAN,
            predicted_transitions: f64::NAN,
            left_page_text_end: f64::NAN,
            right_page_text_start: f64::NAN,
            text_gap_width: f64::NAN,
            text_gap_center: f64::NAN,
            left_margin: f64::NAN,
            right_margin: f64::NAN,
            margin_bias: f64::NAN,
            ideal_split_from_text: f64::NAN,
            aspect_ratio: f64::NAN,
            width: f64::NAN,
            height: f64::NAN,
            page_position: None,
            book_size_category: None,
        }
    }
}

/// Accept null and non-numeric JSON as NaN
fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(value.as_f64().unwrap_or(f64::NAN))
}

impl SplitFeatures {
    /// Values every usable example needs
    pub fn core_values(&self) -> [f64; 26] {
        [
            self.center_darkest_idx,
            self.center_brightest_idx,
            self.center_darkest_p10,
            self.center_brightest_p10,
            self.center_mean_p10,
            self.center_variance_p10,
            self.edge_left_p10,
            self.edge_right_p10,
            self.edge_center_diff,
            self.is_inverted,
            self.predicted_position,
            self.gutter_width,
            self.predicted_p10,
            self.predicted_dark_run,
            self.predicted_transitions,
            self.left_page_text_end,
            self.right_page_text_start,
            self.text_gap_width,
            self.text_gap_center,
            self.left_margin,
            self.right_margin,
            self.margin_bias,
            self.ideal_split_from_text,
            self.aspect_ratio,
            self.width,
            self.height,
        ]
    }

    /// All core values are finite and present optional values are too
    pub fn is_finite(&self) -> bool {
        self.core_values().iter().all(|v| v.is_finite())
            && self.page_position.map_or(true, f64::is_finite)
            && self.book_size_category.map_or(true, f64::is_finite)
    }
}

/// Center-band statistics
#[derive(Debug, Clone, Copy, PartialEq)]
struct BandStats {
    start: usize,
    end: usize,
    darkest: usize,
    brightest: usize,
    mean: f64,
    variance: f64,
}

impl BandStats {
    fn compute(profiles: &[ColumnProfile]) -> Self {
        let width = profiles.len();
        let start = (width as f64 * BAND_START).floor() as usize;
        let end = ((width as f64 * BAND_END).ceil() as usize).clamp(start + 1, width);

        let band = &profiles[start..end];
        let mut darkest = 0;
        let mut brightest = 0;
        for (i, profile) in band.iter().enumerate() {
            if profile.p10 < band[darkest].p10 {
                darkest = i;
            }
            if profile.p10 > band[brightest].p10 {
                brightest = i;
            }
        }

        let n = band.len() as f64;
        let mean = band.iter().map(|p| p.p10 as f64).sum::<f64>() / n;
        let variance = band
            .iter()
            .map(|p| (p.p10 as f64 - mean).powi(2))
            .sum::<f64>()
            / n;

        Self {
            start,
            end,
            darkest,
            brightest,
            mean,
            variance,
        }
    }

    fn len(&self) -> usize {
        self.end - self.start
    }

    /// Index within the band as a percentage of the band
    fn band_percent(&self, index: usize) -> f64 {
        if self.len() <= 1 {
            return 50.0;
        }
        index as f64 / (self.len() - 1) as f64 * 100.0
    }
}

/// Where each page's text begins and ends (column indices)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextBoundaries {
    pub left_page_text_start: usize,
    pub left_page_text_end: usize,
    pub right_page_text_start: usize,
    pub right_page_text_end: usize,
}

impl TextBoundaries {
    /// Scan for text from the outer edges and from the center outwards.
    ///
    /// Left-side scans never pass the center column and right-side scans
    /// start at it, so the left end never exceeds the right start. A side
    /// without text collapses onto the center.
    pub fn scan(profiles: &[ColumnProfile]) -> Self {
        let width = profiles.len();
        let center = width / 2;
        let has_text = text_votes(profiles);

        let left_page_text_start = (0..center).find(|&i| has_text[i]).unwrap_or(center);
        let left_page_text_end = (0..center).rev().find(|&i| has_text[i]).unwrap_or(center);
        let right_page_text_start = (center..width).find(|&i| has_text[i]).unwrap_or(center);
        let right_page_text_end = (center..width).rev().find(|&i| has_text[i]).unwrap_or(center);

        Self {
            left_page_text_start,
            left_page_text_end,
            right_page_text_start,
            right_page_text_end,
        }
    }
}

/// Sliding-window majority vote over `transitions > TEXT_TRANSITIONS`
fn text_votes(profiles: &[ColumnProfile]) -> Vec<bool> {
    let width = profiles.len();
    let window = ((width as f64 * TEXT_WINDOW_FRACTION).round() as usize).max(TEXT_WINDOW_MIN);
    let half = window / 2;

    let mut prefix = Vec::with_capacity(width + 1);
    prefix.push(0usize);
    for profile in profiles {
        let busy = usize::from(profile.transitions > TEXT_TRANSITIONS);
        prefix.push(prefix[prefix.len() - 1] + busy);
    }

    (0..width)
        .map(|i| {
            let lo = i.saturating_sub(half);
            let hi = (i + half + 1).min(width);
            let votes = prefix[hi] - prefix[lo];
            votes * 2 > hi - lo
        })
        .collect()
}

/// Feature extractor for the training and inference path
#[derive(Debug, Clone, Copy)]
pub struct FeatureExtractor {
    params: ProfileParams,
    max_width: Option<u32>,
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new(None)
    }
}

impl FeatureExtractor {
    /// `max_width` of `None` analyzes at full resolution
    pub fn new(max_width: Option<u32>) -> Self {
        Self {
            params: ProfileParams::new(100),
            max_width,
        }
    }

    pub fn with_params(mut self, params: ProfileParams) -> Self {
        self.params = params;
        self
    }

    /// Decode and extract
    pub fn extract_bytes(
        &self,
        image_data: &[u8],
        context: Option<BookContext>,
    ) -> Result<SplitFeatures, SplitError> {
        let raster = GrayRaster::decode(image_data)?;
        self.extract(&raster, context)
    }

    /// Extract features from a decoded raster
    pub fn extract(
        &self,
        raster: &GrayRaster,
        context: Option<BookContext>,
    ) -> Result<SplitFeatures, SplitError> {
        if raster.width() < MIN_WIDTH || raster.height() < MIN_HEIGHT {
            return Err(SplitError::RasterTooSmall {
                width: raster.width(),
                height: raster.height(),
            });
        }

        let analysis: Cow<'_, GrayRaster> = match self.max_width {
            Some(max) if raster.width() > max => Cow::Owned(raster.downsample(max)),
            _ => Cow::Borrowed(raster),
        };

        let width = analysis.width() as usize;
        let height = analysis.height();
        let profiles = profile_columns(&analysis, self.params);
        let permille = |column: f64| to_permille(column, analysis.width());

        let band = BandStats::compute(&profiles);
        let darkest = &profiles[band.start + band.darkest];
        let brightest = &profiles[band.start + band.brightest];

        let edge_columns = ((width as f64 * EDGE_FRACTION).round() as usize).max(1);
        let edge_left = mean_p10(&profiles[..edge_columns]);
        let edge_right = mean_p10(&profiles[width - edge_columns..]);
        let edge_center_diff = band.mean - (edge_left + edge_right) / 2.0;
        let inverted = edge_center_diff > INVERTED_DIFF;

        let predicted = if inverted {
            band.start + band.brightest
        } else {
            let bias = (width as f64 * DARK_GUTTER_BIAS).round() as usize;
            (band.start + band.darkest + bias).min(width - 1)
        };
        let predicted_profile = &profiles[predicted];

        let gutter_width = gutter_run(&profiles, &band, inverted);

        let text = TextBoundaries::scan(&profiles);
        let left_end = text.left_page_text_end as f64;
        let right_start = text.right_page_text_start as f64;
        let gap_width = (right_start - left_end).max(0.0);
        let gap_center = (left_end + right_start) / 2.0;

        let left_margin = text.left_page_text_start as f64;
        let right_margin = (width - 1).saturating_sub(text.right_page_text_end) as f64;
        let margin_bias = (left_margin - right_margin) / 2.0;
        let ideal_split = (gap_center + margin_bias).clamp(0.0, width as f64);

        tracing::debug!(
            "Split features: {}x{}, band mean {:.1}, edge diff {:.1}, inverted {}, predicted column {}, text gap {}..{}",
            width,
            height,
            band.mean,
            edge_center_diff,
            inverted,
            predicted,
            text.left_page_text_end,
            text.right_page_text_start
        );

        Ok(SplitFeatures {
            center_darkest_idx: band.band_percent(band.darkest),
            center_brightest_idx: band.band_percent(band.brightest),
            center_darkest_p10: darkest.p10 as f64,
            center_brightest_p10: brightest.p10 as f64,
            center_mean_p10: band.mean,
            center_variance_p10: band.variance,
            edge_left_p10: edge_left,
            edge_right_p10: edge_right,
            edge_center_diff,
            is_inverted: if inverted { 1.0 } else { 0.0 },
            predicted_position: permille(predicted as f64),
            gutter_width: permille(gutter_width as f64),
            predicted_p10: predicted_profile.p10 as f64,
            predicted_dark_run: predicted_profile.max_dark_run as f64 / height as f64 * 100.0,
            predicted_transitions: predicted_profile.transitions as f64,
            left_page_text_end: permille(left_end),
            right_page_text_start: permille(right_start),
            text_gap_width: permille(gap_width),
            text_gap_center: permille(gap_center),
            left_margin: permille(left_margin),
            right_margin: permille(right_margin),
            margin_bias: permille(margin_bias),
            ideal_split_from_text: permille(ideal_split),
            aspect_ratio: raster.aspect_ratio(),
            width: raster.width() as f64,
            height: raster.height() as f64,
            page_position: context.map(|c| c.page_position()),
            book_size_category: context.map(|c| c.book_size().category()),
        })
    }
}

fn mean_p10(profiles: &[ColumnProfile]) -> f64 {
    if profiles.is_empty() {
        return 0.0;
    }
    profiles.iter().map(|p| p.p10 as f64).sum::<f64>() / profiles.len() as f64
}

/// Contiguous band columns around the extreme column that share its polarity
fn gutter_run(profiles: &[ColumnProfile], band: &BandStats, inverted: bool) -> usize {
    let anchor = band.start + if inverted { band.brightest } else { band.darkest };
    let reference = profiles[anchor].p10;
    let in_gutter = |p: &ColumnProfile| {
        if inverted {
            p.p10.saturating_add(GUTTER_TOLERANCE) >= reference
        } else {
            p.p10 <= reference.saturating_add(GUTTER_TOLERANCE)
        }
    };

    let mut left = anchor;
    while left > band.start && in_gutter(&profiles[left - 1]) {
        left -= 1;
    }
    let mut right = anchor;
    while right + 1 < band.end && in_gutter(&profiles[right + 1]) {
        right += 1;
    }
    right - left + 1
}
