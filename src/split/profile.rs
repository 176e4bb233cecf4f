//! Column Profiler
//!
//! Reduces a grayscale raster to one summary per pixel column. Both the
//! interactive heuristic and the feature extractor consume these profiles,
//! each with its own dark threshold.

use serde::Serialize;

use super::raster::GrayRaster;

/// Percentile used for column brightness
const BRIGHTNESS_PERCENTILE: f64 = 0.10;

/// Summary statistics for one pixel column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnProfile {
    /// 10th-percentile brightness (0-255, lower = darker)
    pub p10: u8,
    /// Longest run of consecutive pixels below the dark threshold
    pub max_dark_run: u32,
    /// Number of dark/light threshold crossings down the column
    pub transitions: u32,
}

/// Profiler parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileParams {
    /// Pixels strictly below this value count as dark
    pub dark_threshold: u8,
}

impl ProfileParams {
    pub const fn new(dark_threshold: u8) -> Self {
        Self { dark_threshold }
    }
}

impl Default for ProfileParams {
    fn default() -> Self {
        Self::new(128)
    }
}

/// Profile every column of `raster`
pub fn profile_columns(raster: &GrayRaster, params: ProfileParams) -> Vec<ColumnProfile> {
    let mut scratch = Vec::with_capacity(raster.height() as usize);
    (0..raster.width())
        .map(|x| {
            scratch.clear();
            scratch.extend(raster.column(x));
            profile_column(&mut scratch, params)
        })
        .collect()
}

/// Profile a single column. `values` is reordered in place.
pub fn profile_column(values: &mut [u8], params: ProfileParams) -> ColumnProfile {
    if values.is_empty() {
        return ColumnProfile {
            p10: u8::MAX,
            max_dark_run: 0,
            transitions: 0,
        };
    }

    let mut max_dark_run = 0u32;
    let mut run = 0u32;
    let mut transitions = 0u32;
    let mut previous_dark: Option<bool> = None;

    for &value in values.iter() {
        let dark = value < params.dark_threshold;
        if dark {
            run += 1;
            max_dark_run = max_dark_run.max(run);
        } else {
            run = 0;
        }
        if let Some(previous) = previous_dark {
            if previous != dark {
                transitions += 1;
            }
        }
        previous_dark = Some(dark);
    }

    // Scan order matters above; the selection below scrambles the slice
    let rank = ((values.len() - 1) as f64 * BRIGHTNESS_PERCENTILE).floor() as usize;
    let (_, p10, _) = values.select_nth_unstable(rank);

    ColumnProfile {
        p10: *p10,
        max_dark_run,
        transitions,
    }
}
