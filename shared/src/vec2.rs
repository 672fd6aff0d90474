/// 2D vector utilities for the toroidal play area.
/// Screen coordinates: x grows right, y grows down.

#[derive(Debug, Clone, Copy, Default, serde::Serialize, serde::Deserialize, PartialEq, ts_rs::TS)]
#[ts(export, export_to = "../../web/src/generated/")]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn to_array(self) -> [f64; 2] {
        [self.x, self.y]
    }
}

/// Shorthand constructor
pub fn vec2(x: f64, y: f64) -> Vec2 {
    Vec2::new(x, y)
}

/// Add two vectors
pub fn add(a: Vec2, b: Vec2) -> Vec2 {
    Vec2::new(a.x + b.x, a.y + b.y)
}

/// Subtract vectors (a - b)
pub fn sub(a: Vec2, b: Vec2) -> Vec2 {
    Vec2::new(a.x - b.x, a.y - b.y)
}

/// Scale vector by scalar
pub fn scale(v: Vec2, s: f64) -> Vec2 {
    Vec2::new(v.x * s, v.y * s)
}

/// Vector length
pub fn length(v: Vec2) -> f64 {
    (v.x * v.x + v.y * v.y).sqrt()
}

/// Euclidean distance between two points
pub fn distance(a: Vec2, b: Vec2) -> f64 {
    length(sub(a, b))
}

/// Normalize vector to unit length. Degenerate input maps to +x.
pub fn normalize(v: Vec2) -> Vec2 {
    let len = length(v);
    if len < 1e-10 || !len.is_finite() {
        return Vec2::new(1.0, 0.0);
    }
    Vec2::new(v.x / len, v.y / len)
}

/// Unit vector pointing along `angle` (radians).
pub fn from_angle(angle: f64) -> Vec2 {
    Vec2::new(angle.cos(), angle.sin())
}

/// Wrap a coordinate into `[0, extent)`.
///
/// Non-finite input is pinned to 0 so a bad value never propagates through
/// later frames.
pub fn wrap_coord(value: f64, extent: f64) -> f64 {
    if !value.is_finite() || !extent.is_finite() || extent <= 0.0 {
        return 0.0;
    }
    let wrapped = value.rem_euclid(extent);
    // rem_euclid can round up to `extent` for tiny negative inputs
    if wrapped >= extent {
        0.0
    } else {
        wrapped
    }
}

/// Wrap a point onto the torus `[0, width) x [0, height)`.
pub fn wrap(p: Vec2, width: f64, height: f64) -> Vec2 {
    Vec2::new(wrap_coord(p.x, width), wrap_coord(p.y, height))
}

/// True if the point lies inside `[0, width) x [0, height)`.
pub fn in_bounds(p: Vec2, width: f64, height: f64) -> bool {
    p.x >= 0.0 && p.x < width && p.y >= 0.0 && p.y < height
}
