//! Grayscale Rasters
//!
//! Owned 8-bit luma buffers that the column profiler works on, plus the
//! ways of getting one: decoding bytes, fetching a URL, downsampling.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use image::{imageops::FilterType, GrayImage};

use super::types::SplitError;

/// Row-major grayscale raster (0 = black, 255 = white)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrayRaster {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl GrayRaster {
    /// Wrap an existing pixel buffer
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, SplitError> {
        let expected = width as usize * height as usize;
        if pixels.len() != expected {
            return Err(SplitError::InvalidRaster(format!(
                "expected {} pixels for {}x{}, got {}",
                expected,
                width,
                height,
                pixels.len()
            )));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Build a raster by evaluating `f(x, y)` for every pixel
    pub fn from_fn(width: u32, height: u32, f: impl Fn(u32, u32) -> u8) -> Self {
        let mut pixels = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                pixels.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            pixels,
        }
    }

    /// Decode an encoded image (PNG, JPEG, ...) into grayscale
    pub fn decode(data: &[u8]) -> Result<Self, SplitError> {
        let img = image::load_from_memory(data)?;
        Ok(Self::from(img.to_luma8()))
    }

    /// Download and decode an image
    pub async fn fetch(client: &reqwest::Client, url: &str) -> Result<Self, SplitError> {
        let bytes = fetch_bytes(client, url).await?;
        Self::decode(&bytes)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Pixel value at (x, y)
    pub fn get(&self, x: u32, y: u32) -> u8 {
        self.pixels[y as usize * self.width as usize + x as usize]
    }

    /// Iterate one column top to bottom
    pub fn column(&self, x: u32) -> impl Iterator<Item = u8> + '_ {
        let stride = self.width as usize;
        self.pixels
            .iter()
            .skip(x as usize)
            .step_by(stride.max(1))
            .copied()
    }

    /// Width divided by height
    pub fn aspect_ratio(&self) -> f64 {
        if self.height == 0 {
            return 0.0;
        }
        self.width as f64 / self.height as f64
    }

    /// Resample to `target_width` columns, keeping the aspect ratio.
    ///
    /// Rasters already at or below the target are returned unchanged.
    pub fn downsample(&self, target_width: u32) -> GrayRaster {
        if target_width == 0 || self.width <= target_width {
            return self.clone();
        }

        let scale = target_width as f64 / self.width as f64;
        let target_height = ((self.height as f64 * scale).round() as u32).max(1);

        let Some(img) = GrayImage::from_raw(self.width, self.height, self.pixels.clone()) else {
            return self.clone();
        };
        let resized = image::imageops::resize(&img, target_width, target_height, FilterType::Triangle);
        Self::from(resized)
    }
}

impl From<GrayImage> for GrayRaster {
    fn from(img: GrayImage) -> Self {
        let (width, height) = img.dimensions();
        Self {
            width,
            height,
            pixels: img.into_raw(),
        }
    }
}

async fn fetch_bytes(client: &reqwest::Client, url: &str) -> Result<Vec<u8>, SplitError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| SplitError::Fetch(format!("{}: {}", url, e)))?;

    if !response.status().is_success() {
        return Err(SplitError::Fetch(format!(
            "{} returned {}",
            url,
            response.status()
        )));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| SplitError::Fetch(format!("{}: {}", url, e)))?;
    Ok(bytes.to_vec())
}

/// Where an image comes from
#[derive(Debug, Clone)]
pub enum ImageSource {
    /// Remote image addressed by URL
    Url(String),
    /// Encoded image bytes
    Bytes(Vec<u8>),
}

impl ImageSource {
    /// Build a source from base64 text (a `data:` prefix is tolerated)
    pub fn from_base64(encoded: &str) -> Result<Self, SplitError> {
        let payload = encoded
            .split_once(";base64,")
            .map(|(_, rest)| rest)
            .unwrap_or(encoded);
        let bytes = BASE64
            .decode(payload.trim())
            .map_err(|e| SplitError::Decode(format!("invalid base64: {}", e)))?;
        Ok(Self::Bytes(bytes))
    }

    /// Load the encoded image bytes
    pub async fn load(&self, client: &reqwest::Client) -> Result<Vec<u8>, SplitError> {
        match self {
            Self::Url(url) => fetch_bytes(client, url).await,
            Self::Bytes(bytes) => Ok(bytes.clone()),
        }
    }
}
