use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

/// Pixel rectangle as reported by the dump: `[x1,y1][x2,y2]`.
///
/// Coordinates are non-negative but ordering is not enforced; an inverted rectangle yields
/// a negative size and a center between the two corners.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Bounds {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl Bounds {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn center(&self) -> Point {
        Point {
            x: floor_mid(self.x1, self.x2),
            y: floor_mid(self.y1, self.y2),
        }
    }

    pub fn size(&self) -> Size {
        Size {
            width: self.x2 - self.x1,
            height: self.y2 - self.y1,
        }
    }

    pub fn is_inverted(&self) -> bool {
        self.x1 > self.x2 || self.y1 > self.y2
    }
}

impl fmt::Display for Bounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{},{}][{},{}]", self.x1, self.y1, self.x2, self.y2)
    }
}

fn floor_mid(a: i32, b: i32) -> i32 {
    // widened so two large coordinates cannot overflow
    ((i64::from(a) + i64::from(b)).div_euclid(2)) as i32
}

pub fn to_dp(px: u32, dpi: u32) -> f64 {
    if dpi == 0 {
        return 0.0;
    }
    f64::from(px) / f64::from(dpi) * 160.0
}

pub fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum DensityBucket {
    Ldpi,
    Mdpi,
    Hdpi,
    Xhdpi,
    Xxhdpi,
    Xxxhdpi,
}

impl DensityBucket {
    /// Upper bounds are inclusive: 120 is ldpi, 121 is mdpi.
    pub fn from_dpi(dpi: u32) -> Self {
        match dpi {
            0..=120 => Self::Ldpi,
            121..=160 => Self::Mdpi,
            161..=240 => Self::Hdpi,
            241..=320 => Self::Xhdpi,
            321..=480 => Self::Xxhdpi,
            _ => Self::Xxxhdpi,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ldpi => "ldpi",
            Self::Mdpi => "mdpi",
            Self::Hdpi => "hdpi",
            Self::Xhdpi => "xhdpi",
            Self::Xxhdpi => "xxhdpi",
            Self::Xxxhdpi => "xxxhdpi",
        }
    }
}

impl fmt::Display for DensityBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn center_and_size_use_floor_division() {
        let bounds = Bounds::new(100, 200, 300, 250);
        assert_eq!(bounds.center(), Point::new(200, 225));
        assert_eq!(bounds.size(), Size { width: 200, height: 50 });

        let odd = Bounds::new(0, 0, 3, 5);
        assert_eq!(odd.center(), Point::new(1, 2));
    }

    #[test]
    fn inverted_bounds_keep_their_geometry() {
        let bounds = Bounds::new(300, 250, 100, 200);
        assert!(bounds.is_inverted());
        assert_eq!(bounds.center(), Point::new(200, 225));
        assert_eq!(bounds.size(), Size { width: -200, height: -50 });
    }

    #[test]
    fn large_coordinates_do_not_overflow() {
        let bounds = Bounds::new(i32::MAX, i32::MAX, i32::MAX, i32::MAX);
        assert_eq!(bounds.center(), Point::new(i32::MAX, i32::MAX));
    }

    #[test]
    fn converts_px_to_dp() {
        assert_eq!(to_dp(320, 160), 320.0);
        assert_eq!(to_dp(100, 0), 0.0);
        assert_eq!(round_one_decimal(to_dp(1080, 420)), 411.4);
    }

    #[test]
    fn density_bucket_boundaries_belong_to_lower_bucket() {
        let table = [
            (120, DensityBucket::Ldpi),
            (121, DensityBucket::Mdpi),
            (160, DensityBucket::Mdpi),
            (161, DensityBucket::Hdpi),
            (240, DensityBucket::Hdpi),
            (241, DensityBucket::Xhdpi),
            (320, DensityBucket::Xhdpi),
            (321, DensityBucket::Xxhdpi),
            (480, DensityBucket::Xxhdpi),
            (481, DensityBucket::Xxxhdpi),
        ];
        for (dpi, expected) in table {
            assert_eq!(DensityBucket::from_dpi(dpi), expected, "dpi {dpi}");
        }
        assert_eq!(DensityBucket::from_dpi(0), DensityBucket::Ldpi);
        assert_eq!(DensityBucket::Xxxhdpi.to_string(), "xxxhdpi");
    }
}
