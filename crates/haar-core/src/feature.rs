//! Haar-like feature shapes, feature-space enumeration and evaluation.
//!
//! Every shape is a signed combination of equally sized rectangles that tile
//! the feature's bounding box exactly. Evaluation uses four-corner lookups on
//! an [`IntegralImage`], so each rectangle costs O(1) regardless of size.
use crate::error::TrainError;
use crate::integral::IntegralImage;

/// The closed set of supported shapes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FeatureKind {
    /// Left half minus right half.
    TwoHorizontal,
    /// Top half minus bottom half.
    TwoVertical,
    /// Center third minus the left and right thirds.
    ThreeHorizontal,
    /// Middle third minus the top and bottom thirds.
    ThreeVertical,
    /// Main-diagonal quadrants minus anti-diagonal quadrants.
    Checkerboard,
}

impl FeatureKind {
    /// All shapes in enumeration order.
    pub const ALL: [FeatureKind; 5] = [
        FeatureKind::TwoHorizontal,
        FeatureKind::TwoVertical,
        FeatureKind::ThreeHorizontal,
        FeatureKind::ThreeVertical,
        FeatureKind::Checkerboard,
    ];

    /// Number of sub-rectangles along (x, y). Width and height must be
    /// multiples of these.
    #[inline]
    pub fn cells(self) -> (u16, u16) {
        match self {
            FeatureKind::TwoHorizontal => (2, 1),
            FeatureKind::TwoVertical => (1, 2),
            FeatureKind::ThreeHorizontal => (3, 1),
            FeatureKind::ThreeVertical => (1, 3),
            FeatureKind::Checkerboard => (2, 2),
        }
    }

    /// Smallest generated (width, height).
    fn min_size(self) -> (u16, u16) {
        match self {
            FeatureKind::ThreeHorizontal => (3, 4),
            FeatureKind::ThreeVertical => (4, 3),
            _ => (4, 4),
        }
    }

    /// Three-rectangle shapes carry an unbalanced area (one positive third,
    /// two negative thirds) and need a mean correction on raw windows.
    #[inline]
    pub fn is_three_way(self) -> bool {
        matches!(self, FeatureKind::ThreeHorizontal | FeatureKind::ThreeVertical)
    }
}

/// Axis-aligned rectangle relative to a window origin.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rect {
    pub x: u16,
    pub y: u16,
    pub w: u16,
    pub h: u16,
}

/// Immutable feature descriptor: a shape plus its placement in the window.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Feature {
    kind: FeatureKind,
    width: u16,
    height: u16,
    x: u16,
    y: u16,
}

impl Feature {
    /// Create a feature at `(x, y)` with the given size. Fails if the size is
    /// zero or does not split evenly into the shape's sub-rectangles.
    pub fn new(
        kind: FeatureKind,
        x: u16,
        y: u16,
        width: u16,
        height: u16,
    ) -> Result<Self, TrainError> {
        let (cx, cy) = kind.cells();
        if width == 0 || height == 0 || width % cx != 0 || height % cy != 0 {
            return Err(TrainError::InvalidFeature { kind, width, height });
        }
        Ok(Self {
            kind,
            width,
            height,
            x,
            y,
        })
    }

    #[inline]
    pub fn kind(&self) -> FeatureKind {
        self.kind
    }

    #[inline]
    pub fn width(&self) -> u16 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u16 {
        self.height
    }

    /// Top-left offset inside the training window.
    #[inline]
    pub fn origin(&self) -> (u16, u16) {
        (self.x, self.y)
    }

    /// Signed sub-rectangles; `evaluate` computes `Σ sign · sum(rect)`.
    pub fn rects(&self) -> Vec<(Rect, f64)> {
        let (x, y, w, h) = (self.x, self.y, self.width, self.height);
        let r = |x, y, w, h| Rect { x, y, w, h };
        match self.kind {
            FeatureKind::TwoHorizontal => {
                let hw = w / 2;
                vec![(r(x, y, hw, h), 1.0), (r(x + hw, y, hw, h), -1.0)]
            }
            FeatureKind::TwoVertical => {
                let hh = h / 2;
                vec![(r(x, y, w, hh), 1.0), (r(x, y + hh, w, hh), -1.0)]
            }
            FeatureKind::ThreeHorizontal => {
                let tw = w / 3;
                vec![
                    (r(x + tw, y, tw, h), 1.0),
                    (r(x, y, tw, h), -1.0),
                    (r(x + 2 * tw, y, tw, h), -1.0),
                ]
            }
            FeatureKind::ThreeVertical => {
                let th = h / 3;
                vec![
                    (r(x, y + th, w, th), 1.0),
                    (r(x, y, w, th), -1.0),
                    (r(x, y + 2 * th, w, th), -1.0),
                ]
            }
            FeatureKind::Checkerboard => {
                let (hw, hh) = (w / 2, h / 2);
                vec![
                    (r(x, y, hw, hh), 1.0),
                    (r(x + hw, y + hh, hw, hh), 1.0),
                    (r(x + hw, y, hw, hh), -1.0),
                    (r(x, y + hh, hw, hh), -1.0),
                ]
            }
        }
    }

    /// Feature value for the window whose top-left corner is `(ox, oy)` in `ii`.
    #[inline]
    pub fn evaluate(&self, ii: &IntegralImage, ox: usize, oy: usize) -> f64 {
        let x = ox + self.x as usize;
        let y = oy + self.y as usize;
        let w = self.width as usize;
        let h = self.height as usize;

        match self.kind {
            FeatureKind::TwoHorizontal => {
                let hw = w / 2;
                ii.rect_sum(x, y, hw, h) - ii.rect_sum(x + hw, y, hw, h)
            }
            FeatureKind::TwoVertical => {
                let hh = h / 2;
                ii.rect_sum(x, y, w, hh) - ii.rect_sum(x, y + hh, w, hh)
            }
            FeatureKind::ThreeHorizontal => {
                let tw = w / 3;
                ii.rect_sum(x + tw, y, tw, h)
                    - ii.rect_sum(x, y, tw, h)
                    - ii.rect_sum(x + 2 * tw, y, tw, h)
            }
            FeatureKind::ThreeVertical => {
                let th = h / 3;
                ii.rect_sum(x, y + th, w, th)
                    - ii.rect_sum(x, y, w, th)
                    - ii.rect_sum(x, y + 2 * th, w, th)
            }
            FeatureKind::Checkerboard => {
                let (hw, hh) = (w / 2, h / 2);
                ii.rect_sum(x, y, hw, hh) + ii.rect_sum(x + hw, y + hh, hw, hh)
                    - ii.rect_sum(x + hw, y, hw, hh)
                    - ii.rect_sum(x, y + hh, hw, hh)
            }
        }
    }

    /// Uniformly scale position and size by `factor` for a window of side
    /// `resolution`.
    ///
    /// Positions are rounded; width and height are rounded to the nearest
    /// multiple of the shape's cell count (never below one cell) so the
    /// result still tiles. The result is then pulled back inside the window:
    /// sizes are capped at the largest whole number of cells that fits and
    /// the origin is shifted left or up until the feature ends at the window
    /// edge. `factor` must be positive and finite.
    pub fn rescale(&self, factor: f64, resolution: u16) -> Feature {
        let (cx, cy) = self.kind.cells();
        let width = scale_multiple(self.width, factor, cx, resolution);
        let height = scale_multiple(self.height, factor, cy, resolution);
        Feature {
            kind: self.kind,
            width,
            height,
            x: scale_round(self.x, factor).min(resolution.saturating_sub(width)),
            y: scale_round(self.y, factor).min(resolution.saturating_sub(height)),
        }
    }

    /// Whether the feature lies inside a `resolution × resolution` window.
    pub fn fits(&self, resolution: u16) -> bool {
        self.x as u32 + self.width as u32 <= resolution as u32
            && self.y as u32 + self.height as u32 <= resolution as u32
    }
}

fn scale_round(v: u16, factor: f64) -> u16 {
    (v as f64 * factor).round().clamp(0.0, u16::MAX as f64) as u16
}

fn scale_multiple(v: u16, factor: f64, cell: u16, resolution: u16) -> u16 {
    let cells = (v as f64 * factor / cell as f64).round().max(1.0);
    let max_cells = (resolution / cell).max(1) as f64;
    (cells.min(max_cells) * cell as f64) as u16
}

/// Enumerate every feature that fits a `resolution × resolution` window.
///
/// Order is shape, then height, then width, then y, then x. The boosting scan
/// breaks error ties by this order. Two-rectangle shapes step by 2 along the
/// split axis, three-rectangle shapes by 3, the checkerboard by 2 on both
/// axes, and every other axis by 1.
pub fn generate_features(resolution: u16) -> Vec<Feature> {
    let mut out = Vec::new();

    for kind in FeatureKind::ALL {
        let (min_w, min_h) = kind.min_size();
        let (step_w, step_h) = kind.cells();

        let mut height = min_h;
        while height <= resolution {
            let mut width = min_w;
            while width <= resolution {
                for y in 0..=(resolution - height) {
                    for x in 0..=(resolution - width) {
                        out.push(Feature {
                            kind,
                            width,
                            height,
                            x,
                            y,
                        });
                    }
                }
                width += step_w;
            }
            height += step_h;
        }
    }

    out
}
