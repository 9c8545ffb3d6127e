use serde::{Deserialize, Serialize};

use crate::app::adb::parse::{parse_wm_density, parse_wm_size};
use crate::app::ui::geometry::{round_one_decimal, to_dp, DensityBucket};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScreenMetrics {
    pub width_px: u32,
    pub height_px: u32,
    pub density_dpi: u32,
    pub width_dp: f64,
    pub height_dp: f64,
    pub aspect_ratio: String,
    pub density_bucket: DensityBucket,
}

impl ScreenMetrics {
    pub fn from_parts(width_px: u32, height_px: u32, density_dpi: u32) -> Self {
        Self {
            width_px,
            height_px,
            density_dpi,
            width_dp: round_one_decimal(to_dp(width_px, density_dpi)),
            height_dp: round_one_decimal(to_dp(height_px, density_dpi)),
            aspect_ratio: format!("{width_px}:{height_px}"),
            density_bucket: DensityBucket::from_dpi(density_dpi),
        }
    }

    /// Builds metrics from raw `wm size` + `wm density` output. Missing values become 0.
    pub fn from_raw(raw: &str) -> Self {
        let (width, height) = parse_wm_size(raw).unwrap_or((0, 0));
        let density = parse_wm_density(raw).unwrap_or(0);
        Self::from_parts(width, height, density)
    }
}
