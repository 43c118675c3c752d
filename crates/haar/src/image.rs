//! Preprocessing helpers turning decoded images into training windows.
//!
//! The pipeline is letterbox to a square window, Rec.709 luminance,
//! optional zero-mean/unit-variance normalization, then the summed-area
//! table consumed by `haar-core`.

use haar_core::{IntegralImage, TrainError};
use image::{
    imageops::{self, FilterType},
    DynamicImage, GrayImage, RgbImage,
};

/// Square single-channel window of `f64` intensities, row-major.
#[derive(Clone, Debug, PartialEq)]
pub struct Window {
    pub size: usize,
    pub values: Vec<f64>,
}

/// Resize so the longer side equals `resolution` and center the result on a
/// black `resolution × resolution` canvas.
pub fn letterbox(img: &DynamicImage, resolution: u32) -> RgbImage {
    let rgb = img.to_rgb8();
    let (w, h) = rgb.dimensions();
    let longest = w.max(h).max(1) as f64;
    let scale = resolution as f64 / longest;
    let nw = ((w as f64 * scale).round() as u32).clamp(1, resolution);
    let nh = ((h as f64 * scale).round() as u32).clamp(1, resolution);

    let resized = if (nw, nh) == (w, h) {
        rgb
    } else {
        imageops::resize(&rgb, nw, nh, FilterType::Triangle)
    };

    let mut canvas = RgbImage::new(resolution, resolution);
    let ox = (resolution - nw) / 2;
    let oy = (resolution - nh) / 2;
    imageops::overlay(&mut canvas, &resized, ox as i64, oy as i64);
    canvas
}

/// Rec.709 luma of every pixel, in `[0, 255]`.
pub fn luminance(img: &RgbImage) -> Vec<f64> {
    img.pixels()
        .map(|p| {
            let [r, g, b] = p.0;
            0.2126 * r as f64 + 0.7152 * g as f64 + 0.0722 * b as f64
        })
        .collect()
}

/// Shift to zero mean and scale to unit population standard deviation.
///
/// A flat input (stdev 0) is only mean-centered. Returns `(mean, stdev)` of
/// the input.
pub fn normalize(values: &mut [f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    let stdev = var.sqrt();

    for v in values.iter_mut() {
        *v -= mean;
        if stdev > 0.0 {
            *v /= stdev;
        }
    }
    (mean, stdev)
}

/// Flip a row-major `w × h` buffer left to right.
pub fn mirror(values: &[f64], w: usize, h: usize) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    for row in values.chunks_exact(w).take(h) {
        out.extend(row.iter().rev());
    }
    out
}

impl Window {
    /// Run the full pipeline on a decoded image.
    pub fn from_image(img: &DynamicImage, resolution: u32, normalized: bool) -> Self {
        let boxed = letterbox(img, resolution);
        let mut values = luminance(&boxed);
        if normalized {
            normalize(&mut values);
        }
        Self {
            size: resolution as usize,
            values,
        }
    }

    pub fn mirrored(&self) -> Self {
        Self {
            size: self.size,
            values: mirror(&self.values, self.size, self.size),
        }
    }

    pub fn integral(&self) -> Result<IntegralImage, TrainError> {
        IntegralImage::from_intensities(self.size, self.size, &self.values)
    }
}

/// Summed-area table of a raw 8-bit image.
pub fn integral_image(img: &GrayImage) -> Result<IntegralImage, TrainError> {
    let px: Vec<f64> = img.as_raw().iter().map(|&v| v as f64).collect();
    IntegralImage::from_intensities(img.width() as usize, img.height() as usize, &px)
}
