//! Jerk-limited velocity profiles.
//!
//! A speed change from `v0` to `vf` is a single constant-jerk ramp: the jerk
//! sign points toward `vf` and the acceleration grows linearly from `a0`.
//! Integrating twice gives
//!
//! ```text
//! v(t) = v0 + a0*t + j*t^2/2
//! x(t) = v0*t + a0*t^2/2 + j*t^3/6
//! ```
//!
//! and the ramp ends at the non-negative root of `j*t^2/2 + a0*t + (v0 - vf) = 0`.
//!
//! A [`VelocityProfile`] covers a commanded displacement with an accelerating
//! ramp to a peak speed, an optional cruise at that speed, and a decelerating
//! ramp to the final speed. When the displacement is too short to reach the
//! cruise speed the peak is lowered until both ramps exactly fill it, so the
//! profile has no cruise phase.

use libm::{fabs, sqrt};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::GlobalPose;
use crate::error::KinematicsError;

/// Bisection steps used to find the peak speed of a short profile.
const PEAK_SEARCH_ITERATIONS: usize = 60;

fn signed_jerk(v0: f64, vf: f64, jerk_mag: f64) -> f64 {
    if vf > v0 { jerk_mag } else { -jerk_mag }
}

/// Time needed to ramp from `v0` (with acceleration `a0`) to `vf` under constant
/// jerk of magnitude `jerk_mag`.
///
/// Returns the smallest non-negative real root of the ramp equation, or `0.0`
/// when there is none (already at `vf`, or a non-positive jerk).
pub fn ramp_time(v0: f64, vf: f64, a0: f64, jerk_mag: f64) -> f64 {
    if !(jerk_mag > 0.0) {
        return 0.0;
    }
    let j = signed_jerk(v0, vf, jerk_mag);
    let a = 0.5 * j;
    let b = a0;
    let c = v0 - vf;
    let discriminant = b * b - 4.0 * a * c;
    if discriminant < 0.0 {
        return 0.0;
    }
    let root = sqrt(discriminant);
    let t1 = (-b - root) / (2.0 * a);
    let t2 = (-b + root) / (2.0 * a);
    match (t1 >= 0.0, t2 >= 0.0) {
        (true, true) => t1.min(t2),
        (true, false) => t1,
        (false, true) => t2,
        (false, false) => 0.0,
    }
}

/// Distance covered while ramping from `v0` (with acceleration `a0`) to `vf`
/// under constant jerk of magnitude `jerk_mag`.
pub fn distance_needed(v0: f64, vf: f64, a0: f64, jerk_mag: f64) -> f64 {
    let j = signed_jerk(v0, vf, jerk_mag);
    let t = ramp_time(v0, vf, a0, jerk_mag);
    v0 * t + 0.5 * a0 * t * t + j * t * t * t / 6.0
}

/// One constant-jerk ramp starting at zero acceleration.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
struct Ramp {
    v0: f64,
    jerk: f64,
    duration: f64,
    distance: f64,
}

impl Ramp {
    fn new(v0: f64, vf: f64, jerk_mag: f64) -> Self {
        Ramp {
            v0,
            jerk: signed_jerk(v0, vf, jerk_mag),
            duration: ramp_time(v0, vf, 0.0, jerk_mag),
            distance: distance_needed(v0, vf, 0.0, jerk_mag),
        }
    }

    fn velocity(&self, t: f64) -> f64 {
        let t = t.clamp(0.0, self.duration);
        self.v0 + 0.5 * self.jerk * t * t
    }

    fn displacement(&self, t: f64) -> f64 {
        let t = t.clamp(0.0, self.duration);
        self.v0 * t + self.jerk * t * t * t / 6.0
    }
}

/// Limits a profile must respect.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProfileLimits {
    /// Speed held during the cruise phase (cu/s).
    pub cruise_speed: f64,
    /// Jerk magnitude of both ramps (cu/s^3).
    pub jerk: f64,
}

impl ProfileLimits {
    /// Construct profile limits.
    pub const fn new(cruise_speed: f64, jerk: f64) -> Self {
        ProfileLimits { cruise_speed, jerk }
    }
}

/// A jerk-limited motion law covering `goal_disp` from `v0` to `vf`.
///
/// Speeds are magnitudes along the direction of travel; negative inputs are
/// treated as zero.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VelocityProfile {
    start: GlobalPose,
    goal_disp: f64,
    v0: f64,
    vf: f64,
    peak: f64,
    accel: Ramp,
    cruise_time: f64,
    decel: Ramp,
}

impl VelocityProfile {
    /// Plan a profile from `start` over `goal_disp` cell units.
    ///
    /// A `goal_disp` that is not positive yields an empty profile that commands `vf`
    /// immediately. A `goal_disp` shorter than ramping straight from `v0` to `vf`
    /// yields a profile that overshoots it; the caller stops on its displacement error.
    ///
    /// # Errors
    ///
    /// Returns `Err(KinematicsError::InvalidProfile)` if the limits are not positive or any
    /// input is not finite.
    pub fn new(
        start: GlobalPose,
        goal_disp: f64,
        v0: f64,
        vf: f64,
        limits: ProfileLimits,
    ) -> Result<Self, KinematicsError> {
        if !(limits.jerk > 0.0) || !limits.jerk.is_finite() {
            return Err(KinematicsError::InvalidProfile("jerk must be positive"));
        }
        if !(limits.cruise_speed > 0.0) || !limits.cruise_speed.is_finite() {
            return Err(KinematicsError::InvalidProfile("cruise speed must be positive"));
        }
        if !goal_disp.is_finite() || !v0.is_finite() || !vf.is_finite() {
            return Err(KinematicsError::InvalidProfile("inputs must be finite"));
        }
        let v0 = v0.max(0.0);
        let vf = vf.max(0.0);

        if goal_disp <= 0.0 {
            return Ok(VelocityProfile {
                start,
                goal_disp,
                v0,
                vf,
                peak: vf,
                accel: Ramp { v0: vf, ..Ramp::default() },
                cruise_time: 0.0,
                decel: Ramp { v0: vf, ..Ramp::default() },
            });
        }

        let j = limits.jerk;
        let ramps = |peak: f64| distance_needed(v0, peak, 0.0, j) + distance_needed(peak, vf, 0.0, j);

        let low = v0.max(vf);
        let high = limits.cruise_speed.max(low);
        let (peak, cruise_time) = if ramps(high) <= goal_disp {
            (high, (goal_disp - ramps(high)) / high)
        } else if ramps(low) >= goal_disp {
            (low, 0.0)
        } else {
            // ramp distance grows monotonically with the peak speed
            let (mut lo, mut hi) = (low, high);
            for _ in 0..PEAK_SEARCH_ITERATIONS {
                let mid = 0.5 * (lo + hi);
                if ramps(mid) > goal_disp {
                    hi = mid;
                } else {
                    lo = mid;
                }
            }
            (lo, 0.0)
        };

        Ok(VelocityProfile {
            start,
            goal_disp,
            v0,
            vf,
            peak,
            accel: Ramp::new(v0, peak, j),
            cruise_time,
            decel: Ramp::new(peak, vf, j),
        })
    }

    /// Commanded forward speed `t` seconds after the profile started.
    pub fn compute_forward_velocity(&self, t: f64) -> f64 {
        if !(t > 0.0) {
            return self.v0;
        }
        let t_cruise_start = self.accel.duration;
        let t_decel_start = t_cruise_start + self.cruise_time;
        if t < t_cruise_start {
            self.accel.velocity(t)
        } else if t < t_decel_start {
            self.peak
        } else if t < self.duration() {
            self.decel.velocity(t - t_decel_start)
        } else {
            self.vf
        }
    }

    /// Displacement commanded by the profile `t` seconds after it started.
    pub fn displacement_at(&self, t: f64) -> f64 {
        if !(t > 0.0) {
            return 0.0;
        }
        let t_cruise_start = self.accel.duration;
        let t_decel_start = t_cruise_start + self.cruise_time;
        if t < t_cruise_start {
            self.accel.displacement(t)
        } else if t < t_decel_start {
            self.accel.distance + self.peak * (t - t_cruise_start)
        } else {
            let past_end = (t - self.duration()).max(0.0);
            self.accel.distance
                + self.peak * self.cruise_time
                + self.decel.displacement(t - t_decel_start)
                + self.vf * past_end
        }
    }

    /// Total planned displacement of the three phases.
    pub fn planned_disp(&self) -> f64 {
        self.accel.distance + self.peak * self.cruise_time + self.decel.distance
    }

    /// Total duration of the three phases (s).
    pub fn duration(&self) -> f64 {
        self.accel.duration + self.cruise_time + self.decel.duration
    }

    /// Duration of the cruise phase (s), zero for a short profile.
    pub fn cruise_time(&self) -> f64 {
        self.cruise_time
    }

    /// Highest speed reached.
    pub fn peak_speed(&self) -> f64 {
        self.peak
    }

    /// Commanded displacement.
    pub fn goal_disp(&self) -> f64 {
        self.goal_disp
    }

    /// Pose at which the profile started.
    pub fn start(&self) -> GlobalPose {
        self.start
    }

    /// Whether the speed law reaches its goal displacement within `tolerance`.
    pub fn covers_goal(&self, tolerance: f64) -> bool {
        self.goal_disp <= 0.0 || fabs(self.planned_disp() - self.goal_disp) <= tolerance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    const EPSILON: f64 = 1e-6;

    /// Integrate `v(t)` of a single ramp with the trapezoid rule.
    fn integrate_ramp(v0: f64, vf: f64, jerk_mag: f64) -> f64 {
        let j = if vf > v0 { jerk_mag } else { -jerk_mag };
        let t_end = ramp_time(v0, vf, 0.0, jerk_mag);
        let steps = 20_000;
        let h = t_end / steps as f64;
        let v = |t: f64| v0 + 0.5 * j * t * t;
        (0..steps)
            .map(|i| {
                let t = i as f64 * h;
                0.5 * h * (v(t) + v(t + h))
            })
            .sum()
    }

    #[test]
    fn test_profile_displacement_law() {
        for (v0, vf) in [(0.0, 1.0), (1.0, 0.0), (0.5, 0.5)] {
            let planned = distance_needed(v0, vf, 0.0, 20.0);
            let integrated = integrate_ramp(v0, vf, 20.0);
            assert!((planned - integrated).abs() < EPSILON, "v0 {} vf {}", v0, vf);
        }
        assert!((distance_needed(0.0, 1.0, 0.0, 20.0) - 20.0 * 0.1f64.powf(1.5) / 6.0).abs() < EPSILON);
        assert_eq!(distance_needed(0.5, 0.5, 0.0, 20.0), 0.0);
    }

    #[test]
    fn test_ramp_time_root_is_non_negative_and_reaches_vf() {
        for (v0, vf, a0) in [(0.0, 1.0, 0.0), (1.0, 0.0, 0.0), (0.2, 0.8, 0.5), (0.8, 0.2, -0.5), (0.3, 0.9, -1.0)] {
            let t = ramp_time(v0, vf, a0, 20.0);
            assert!(t >= 0.0);
            let j = if vf > v0 { 20.0 } else { -20.0 };
            let v_end = v0 + a0 * t + 0.5 * j * t * t;
            assert!((v_end - vf).abs() < EPSILON, "v0 {} vf {} a0 {}", v0, vf, a0);
        }
        assert_eq!(ramp_time(0.0, 1.0, 0.0, 0.0), 0.0);
    }

    #[test]
    fn test_long_profile_cruises() {
        let limits = ProfileLimits::new(1.0, 20.0);
        let profile = VelocityProfile::new(GlobalPose::default(), 3.0, 0.0, 0.0, limits).unwrap();
        assert!((profile.peak_speed() - 1.0).abs() < EPSILON);
        assert!(profile.cruise_time() > 0.0);
        assert!(profile.covers_goal(EPSILON));
        assert!((profile.displacement_at(profile.duration()) - 3.0).abs() < EPSILON);
        assert!((profile.compute_forward_velocity(profile.duration() / 2.0) - 1.0).abs() < EPSILON);
        assert_eq!(profile.compute_forward_velocity(profile.duration() + 1.0), 0.0);
    }

    #[test]
    fn test_short_profile_collapses_without_cruise() {
        let limits = ProfileLimits::new(1.0, 20.0);
        // ramping 0 -> 1 -> 0 needs about 0.316 cu
        let profile = VelocityProfile::new(GlobalPose::default(), 0.1, 0.0, 0.0, limits).unwrap();
        assert_eq!(profile.cruise_time(), 0.0);
        assert!(profile.peak_speed() < 1.0);
        assert!(profile.peak_speed() > 0.0);
        assert!(profile.covers_goal(1e-9));
        for i in 0..=100 {
            let t = profile.duration() * i as f64 / 100.0;
            let v = profile.compute_forward_velocity(t);
            assert!(v.is_finite() && v >= -EPSILON && v <= profile.peak_speed() + EPSILON);
        }
    }

    #[test]
    fn test_velocity_is_continuous() {
        let limits = ProfileLimits::new(0.8, 20.0);
        let profile = VelocityProfile::new(GlobalPose::default(), 2.0, 0.2, 0.1, limits).unwrap();
        let steps = 10_000;
        let dt = profile.duration() / steps as f64;
        let mut last = profile.compute_forward_velocity(0.0);
        for i in 1..=steps {
            let v = profile.compute_forward_velocity(i as f64 * dt);
            // constant jerk bounds the per-step change by the largest acceleration times dt
            assert!((v - last).abs() < 20.0 * profile.duration() * dt + EPSILON);
            last = v;
        }
        assert!((last - 0.1).abs() < 1e-3);
    }

    #[test]
    fn test_degenerate_goals_never_produce_nan() {
        let limits = ProfileLimits::new(1.0, 20.0);
        let empty = VelocityProfile::new(GlobalPose::default(), -0.5, 0.4, 0.0, limits).unwrap();
        assert_eq!(empty.duration(), 0.0);
        assert_eq!(empty.compute_forward_velocity(0.1), 0.0);

        // shorter than ramping 0.9 -> 0 at all: no cruise, peak stays at v0
        let overshoot = VelocityProfile::new(GlobalPose::default(), 0.01, 0.9, 0.0, limits).unwrap();
        assert_eq!(overshoot.cruise_time(), 0.0);
        assert!((overshoot.peak_speed() - 0.9).abs() < EPSILON);
        assert!(overshoot.compute_forward_velocity(0.05).is_finite());
    }

    #[test]
    fn test_invalid_limits() {
        let pose = GlobalPose::default();
        assert!(VelocityProfile::new(pose, 1.0, 0.0, 0.0, ProfileLimits::new(1.0, 0.0)).is_err());
        assert!(VelocityProfile::new(pose, 1.0, 0.0, 0.0, ProfileLimits::new(-1.0, 20.0)).is_err());
        assert!(VelocityProfile::new(pose, f64::NAN, 0.0, 0.0, ProfileLimits::new(1.0, 20.0)).is_err());
    }
}
