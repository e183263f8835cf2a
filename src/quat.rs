//! Quaternion helpers shared by the capture pipeline.
//!
//! Composition follows the capture source's convention: `multiply(a, b)` is
//! "rotate by `a`, then by `b`", so a joint's world rotation is
//! `multiply(local, parent_world)`.

use crate::types::{Euler, Quaternion};
use cgmath::InnerSpace;
use std::f64::consts::FRAC_PI_2;

/// `x*y + z*w` above this is treated as looking straight at a pole.
pub const POLE_THRESHOLD: f64 = 0.499;

/// Above this cosine slerp falls back to a normalised lerp.
const SLERP_LINEAR_THRESHOLD: f64 = 0.9995;

pub fn identity() -> Quaternion {
    Quaternion::new(1.0, 0.0, 0.0, 0.0)
}

pub fn zero() -> Quaternion {
    Quaternion::new(0.0, 0.0, 0.0, 0.0)
}

/// True for the all-zero quaternion the sensor sends for untracked joints.
pub fn is_zero(q: Quaternion) -> bool {
    q.s == 0.0 && q.v.x == 0.0 && q.v.y == 0.0 && q.v.z == 0.0
}

/// Zero-quaternion in, zero-quaternion out.
pub fn normalize(q: Quaternion) -> Quaternion {
    let magnitude = q.magnitude();
    if magnitude == 0.0 {
        return zero();
    }
    q / magnitude
}

/// Conjugate over squared norm. The zero quaternion maps to itself.
pub fn inverse(q: Quaternion) -> Quaternion {
    let norm2 = q.magnitude2();
    if norm2 == 0.0 {
        return zero();
    }
    q.conjugate() / norm2
}

/// Rotation `first` followed by `then` (Hamilton product `then * first`).
pub fn multiply(first: Quaternion, then: Quaternion) -> Quaternion {
    then * first
}

/// Shortest-arc spherical interpolation. `t` is clamped to `[0, 1]` and the
/// endpoints are returned unchanged.
pub fn slerp(from: Quaternion, to: Quaternion, t: f64) -> Quaternion {
    if t <= 0.0 {
        return from;
    }
    if t >= 1.0 {
        return to;
    }

    let mut to = to;
    let mut cos_theta = from.dot(to);
    if cos_theta < 0.0 {
        to = -to;
        cos_theta = -cos_theta;
    }

    if cos_theta > SLERP_LINEAR_THRESHOLD {
        return normalize(from * (1.0 - t) + to * t);
    }

    let theta = cos_theta.acos();
    let sin_theta = theta.sin();
    from * (((1.0 - t) * theta).sin() / sin_theta) + to * ((t * theta).sin() / sin_theta)
}

/// Decompose a rotation into heading (`x`), attitude (`y`) and bank (`z`).
///
/// The rotation is reconstructed as heading about Y, then attitude about Z,
/// then bank about X (see [`from_euler_zyx`]). Near the poles only the
/// heading is meaningful and bank is pinned to zero.
pub fn to_euler_zyx(q: Quaternion) -> Euler {
    let q = normalize(q);
    let (x, y, z, w) = (q.v.x, q.v.y, q.v.z, q.s);

    let test = x * y + z * w;
    if test > POLE_THRESHOLD {
        // singularity at north pole
        return Euler::new(2.0 * x.atan2(w), FRAC_PI_2, 0.0);
    }
    if test < -POLE_THRESHOLD {
        // singularity at south pole
        return Euler::new(-2.0 * x.atan2(w), -FRAC_PI_2, 0.0);
    }

    let sqx = x * x;
    let sqy = y * y;
    let sqz = z * z;
    let heading = (2.0 * y * w - 2.0 * x * z).atan2(1.0 - 2.0 * sqy - 2.0 * sqz);
    let attitude = (2.0 * test).clamp(-1.0, 1.0).asin();
    let bank = (2.0 * x * w - 2.0 * y * z).atan2(1.0 - 2.0 * sqx - 2.0 * sqz);
    Euler::new(heading, attitude, bank)
}

/// Inverse of [`to_euler_zyx`] away from the poles.
pub fn from_euler_zyx(euler: Euler) -> Quaternion {
    let c1 = (euler.x * 0.5).cos();
    let c2 = (euler.y * 0.5).cos();
    let c3 = (euler.z * 0.5).cos();
    let s1 = (euler.x * 0.5).sin();
    let s2 = (euler.y * 0.5).sin();
    let s3 = (euler.z * 0.5).sin();

    Quaternion::new(
        c1 * c2 * c3 - s1 * s2 * s3,
        s1 * s2 * c3 + c1 * c2 * s3,
        s1 * c2 * c3 + c1 * s2 * s3,
        c1 * s2 * c3 - s1 * c2 * s3,
    )
}
