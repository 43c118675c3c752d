//! Read-only summed-area tables.
use crate::error::TrainError;

/// Largest width or height accepted for a sample.
pub const MAX_DIMENSION: usize = 16384;

/// Integral image in row-major layout.
///
/// `value(x, y)` is the sum of all source intensities in `[0, x] × [0, y]`
/// (inclusive, no padding row or column).
#[derive(Clone, Debug, PartialEq)]
pub struct IntegralImage {
    w: usize,
    h: usize,
    data: Vec<f64>,
}

impl IntegralImage {
    /// Wrap a precomputed table.
    pub fn new(w: usize, h: usize, data: Vec<f64>) -> Result<Self, TrainError> {
        check_dimensions(w, h)?;
        if data.len() != w * h {
            return Err(TrainError::ValueCountMismatch {
                width: w,
                height: h,
                expected: w * h,
                actual: data.len(),
            });
        }
        Ok(Self { w, h, data })
    }

    /// Build the table from raw row-major intensities.
    pub fn from_intensities(w: usize, h: usize, pixels: &[f64]) -> Result<Self, TrainError> {
        check_dimensions(w, h)?;
        if pixels.len() != w * h {
            return Err(TrainError::ValueCountMismatch {
                width: w,
                height: h,
                expected: w * h,
                actual: pixels.len(),
            });
        }

        let mut data = vec![0.0f64; w * h];
        for y in 0..h {
            let mut row_sum = 0.0;
            for x in 0..w {
                row_sum += pixels[y * w + x];
                let above = if y > 0 { data[(y - 1) * w + x] } else { 0.0 };
                data[y * w + x] = above + row_sum;
            }
        }

        Ok(Self { w, h, data })
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.w
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.h
    }

    /// Table value at an integer coordinate; requires `x < width` and
    /// `y < height`.
    #[inline]
    pub fn value(&self, x: usize, y: usize) -> f64 {
        debug_assert!(
            x < self.w && y < self.h,
            "({x}, {y}) outside {}x{} integral image",
            self.w,
            self.h
        );
        self.data[y * self.w + x]
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Sum of the source intensities in the `w × h` rectangle at `(x, y)`.
    ///
    /// Terms that would index row or column `-1` are omitted. `w` and `h`
    /// must be at least 1 and the rectangle must lie inside the image.
    #[inline]
    pub fn rect_sum(&self, x: usize, y: usize, w: usize, h: usize) -> f64 {
        let x1 = x + w - 1;
        let y1 = y + h - 1;

        let mut sum = self.value(x1, y1);
        if x > 0 {
            sum -= self.value(x - 1, y1);
        }
        if y > 0 {
            sum -= self.value(x1, y - 1);
        }
        if x > 0 && y > 0 {
            sum += self.value(x - 1, y - 1);
        }
        sum
    }
}

fn check_dimensions(w: usize, h: usize) -> Result<(), TrainError> {
    if w == 0 || h == 0 || w > MAX_DIMENSION || h > MAX_DIMENSION {
        return Err(TrainError::DimensionOutOfRange {
            width: w,
            height: h,
            max: MAX_DIMENSION,
        });
    }
    Ok(())
}
