//! Image preprocessing for the binary face classifier.
//!
//! Both strategies produce an NHWC `f32` tensor scaled to [0, 1], matching
//! the way the models were trained. Which one applies depends on the model:
//! the RGB path mirrors a Keras `load_img` pipeline (nearest-neighbour
//! resize), the grayscale path an OpenCV one (luma first, bilinear resize).

use image::imageops::FilterType;
use image::DynamicImage;
use ndarray::Array4;
use serde::Serialize;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

const PIXEL_SCALE: f32 = 255.0;
const DEFAULT_RGB_SIZE: u32 = 128;
const DEFAULT_GRAYSCALE_SIZE: u32 = 100;

#[derive(Error, Debug)]
pub enum PreprocessError {
    #[error("image decode failed: {0}")]
    Decode(#[from] image::ImageError),
    #[error("unknown preprocessing strategy: {0} (expected \"rgb\" or \"grayscale\")")]
    UnknownStrategy(String),
    #[error("input size must be non-zero")]
    ZeroSize,
}

/// How raw image bytes become a model input tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PreprocessStrategy {
    /// 3-channel RGB, `[1, size, size, 3]`.
    Rgb { size: u32 },
    /// Single-channel luma, `[1, size, size, 1]`.
    Grayscale { size: u32 },
}

impl Default for PreprocessStrategy {
    fn default() -> Self {
        PreprocessStrategy::Rgb { size: DEFAULT_RGB_SIZE }
    }
}

impl FromStr for PreprocessStrategy {
    type Err = PreprocessError;

    /// Parse a strategy name with its default input size.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rgb" | "color" => Ok(PreprocessStrategy::Rgb { size: DEFAULT_RGB_SIZE }),
            "grayscale" | "gray" | "grey" => Ok(PreprocessStrategy::Grayscale {
                size: DEFAULT_GRAYSCALE_SIZE,
            }),
            other => Err(PreprocessError::UnknownStrategy(other.to_string())),
        }
    }
}

impl PreprocessStrategy {
    /// Same strategy with a different square input size.
    pub fn with_size(self, size: u32) -> Result<Self, PreprocessError> {
        if size == 0 {
            return Err(PreprocessError::ZeroSize);
        }
        Ok(match self {
            PreprocessStrategy::Rgb { .. } => PreprocessStrategy::Rgb { size },
            PreprocessStrategy::Grayscale { .. } => PreprocessStrategy::Grayscale { size },
        })
    }

    pub fn size(&self) -> u32 {
        match *self {
            PreprocessStrategy::Rgb { size } | PreprocessStrategy::Grayscale { size } => size,
        }
    }

    pub fn channels(&self) -> usize {
        match self {
            PreprocessStrategy::Rgb { .. } => 3,
            PreprocessStrategy::Grayscale { .. } => 1,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PreprocessStrategy::Rgb { .. } => "rgb",
            PreprocessStrategy::Grayscale { .. } => "grayscale",
        }
    }

    /// Decode an encoded image (JPEG, PNG, ...) and build the input tensor.
    pub fn preprocess_bytes(&self, bytes: &[u8]) -> Result<Array4<f32>, PreprocessError> {
        let img = image::load_from_memory(bytes)?;
        Ok(self.preprocess_image(&img))
    }

    /// Load an image file and build the input tensor.
    pub fn preprocess_path(&self, path: &Path) -> Result<Array4<f32>, PreprocessError> {
        let img = image::open(path)?;
        Ok(self.preprocess_image(&img))
    }

    /// Build the input tensor from an already decoded image.
    pub fn preprocess_image(&self, img: &DynamicImage) -> Array4<f32> {
        match *self {
            PreprocessStrategy::Rgb { size } => {
                let resized = img.resize_exact(size, size, FilterType::Nearest).to_rgb8();
                let s = size as usize;
                let mut tensor = Array4::<f32>::zeros((1, s, s, 3));
                for (x, y, pixel) in resized.enumerate_pixels() {
                    for c in 0..3 {
                        tensor[[0, y as usize, x as usize, c]] = pixel[c] as f32 / PIXEL_SCALE;
                    }
                }
                tensor
            }
            PreprocessStrategy::Grayscale { size } => {
                let luma = DynamicImage::ImageLuma8(img.to_luma8());
                let resized = luma.resize_exact(size, size, FilterType::Triangle).to_luma8();
                let s = size as usize;
                let mut tensor = Array4::<f32>::zeros((1, s, s, 1));
                for (x, y, pixel) in resized.enumerate_pixels() {
                    tensor[[0, y as usize, x as usize, 0]] = pixel[0] as f32 / PIXEL_SCALE;
                }
                tensor
            }
        }
    }
}

/// Summary statistics of a tensor, for diagnosing normalization problems.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TensorStats {
    pub shape: Vec<usize>,
    pub min: f32,
    pub max: f32,
    pub mean: f32,
    pub has_nan: bool,
}

impl TensorStats {
    pub fn of(tensor: &Array4<f32>) -> Self {
        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;
        let mut sum = 0.0f64;
        let mut counted = 0usize;
        let mut has_nan = false;

        for &v in tensor.iter() {
            if v.is_nan() {
                has_nan = true;
                continue;
            }
            min = min.min(v);
            max = max.max(v);
            sum += v as f64;
            counted += 1;
        }

        // NaNs are excluded from every statistic except `has_nan`.
        let (min, max, mean) = if counted == 0 {
            (0.0, 0.0, 0.0)
        } else {
            (min, max, (sum / counted as f64) as f32)
        };

        Self {
            shape: tensor.shape().to_vec(),
            min,
            max,
            mean,
            has_nan,
        }
    }

    /// True when every value lies in the [0, 1] range the models expect.
    pub fn is_unit_range(&self) -> bool {
        !self.has_nan && self.min >= 0.0 && self.max <= 1.0
    }
}
