//! Split Detection Types
//!
//! Shared types for two-page spread split detection.

use serde::{Deserialize, Serialize};

/// Permille position of the image center
pub const CENTER_POSITION: i32 = 500;

/// Upper bound of the permille split scale
pub const MAX_POSITION: i32 = 1000;

/// Convert a column index into the permille split scale
pub fn to_permille(column: f64, width: u32) -> f64 {
    if width == 0 {
        return CENTER_POSITION as f64;
    }
    column / width as f64 * MAX_POSITION as f64
}

/// Output of the interactive heuristic detector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeuristicSplit {
    /// Split position on the 0-1000 permille scale
    pub split_position: i32,
    /// The chosen column looks busy (likely cutting through glyphs)
    pub has_text_warning: bool,
}

impl HeuristicSplit {
    /// Deterministic answer used when the image cannot be analyzed
    pub const FALLBACK: HeuristicSplit = HeuristicSplit {
        split_position: CENTER_POSITION,
        has_text_warning: false,
    };
}

impl Default for HeuristicSplit {
    fn default() -> Self {
        Self::FALLBACK
    }
}

/// Size bucket of the book a page belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookSize {
    /// Fewer than 50 pages
    Small,
    /// 50 to 299 pages
    Medium,
    /// 300 pages or more
    Large,
}

impl BookSize {
    pub fn from_page_count(page_count: usize) -> Self {
        match page_count {
            0..=49 => Self::Small,
            50..=299 => Self::Medium,
            _ => Self::Large,
        }
    }

    /// Numeric category fed to the model
    pub fn category(self) -> f64 {
        match self {
            Self::Small => 0.0,
            Self::Medium => 1.0,
            Self::Large => 2.0,
        }
    }
}

/// Where a page sits inside its book
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookContext {
    /// Page index (0-indexed)
    pub page_index: usize,
    /// Total pages in the book
    pub page_count: usize,
}

impl BookContext {
    /// Relative position of the page in the book (0-1)
    pub fn page_position(&self) -> f64 {
        if self.page_count <= 1 {
            return 0.0;
        }
        (self.page_index.min(self.page_count - 1)) as f64 / (self.page_count - 1) as f64
    }

    pub fn book_size(&self) -> BookSize {
        BookSize::from_page_count(self.page_count)
    }
}

/// Split detection error types
#[derive(Debug, thiserror::Error)]
pub enum SplitError {
    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Failed to fetch image: {0}")]
    Fetch(String),

    #[error("Invalid raster: {0}")]
    InvalidRaster(String),

    #[error("Raster too small for analysis: {width}x{height}")]
    RasterTooSmall { width: u32, height: u32 },
}

impl From<image::ImageError> for SplitError {
    fn from(err: image::ImageError) -> Self {
        SplitError::Decode(err.to_string())
    }
}
