/// Target size produced by the bounding rule. Values may be fractional.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaledDimensions {
    pub width: f64,
    pub height: f64,
}

impl ScaledDimensions {
    /// 長辺が `bound` を超える場合のみ縮小する (拡大はしない)
    pub fn fit_within(width: u32, height: u32, bound: u32) -> Self {
        let (w, h, b) = (width as f64, height as f64, bound as f64);
        if width >= height && width > bound {
            Self { width: b, height: h * b / w }
        } else if height > bound {
            Self { width: w * b / h, height: b }
        } else {
            Self { width: w, height: h }
        }
    }

    pub fn is_fractional(&self) -> bool {
        self.width.fract() != 0.0 || self.height.fract() != 0.0
    }

    /// Integral pixel surface for the resampler.
    ///
    /// Fractional sides are truncated, the way a canvas element truncates an
    /// assigned width/height. Each side is at least one pixel.
    pub fn surface_size(&self) -> (u32, u32) {
        let truncate = |v: f64| (v.trunc() as u32).max(1);
        (truncate(self.width), truncate(self.height))
    }

    pub fn requires_resize(&self, width: u32, height: u32) -> bool {
        self.surface_size() != (width, height)
    }
}
