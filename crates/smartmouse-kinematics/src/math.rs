//! Angle helpers shared by the pose, fusion and motion code.

use core::f64::consts::PI;
use libm::fmod;

/// Wrap an angle into `[-PI, PI)`.
///
/// Angles at `PI` will be wrapped to `-PI`.
///
/// # Arguments
///
/// * `angle`: The angle in radians to wrap.
///
/// # Returns
///
/// The wrapped angle in radians.
pub fn wrap_angle(angle: f64) -> f64 {
    let a = fmod(angle, 2.0 * PI);
    if a >= PI {
        a - 2.0 * PI
    } else if a < -PI {
        a + 2.0 * PI
    } else {
        a
    }
}

/// Signed shortest rotation that takes `from` onto `to`, in `[-PI, PI)`.
pub fn yaw_diff(from: f64, to: f64) -> f64 {
    wrap_angle(to - from)
}
