//! Adaptive timestep selection.
use crate::error::NumericalError;

/// Timestep from the two stability bounds, clamped to `[min_dt, max_dt]` and
/// to the time left before `t_end`.
///
/// Bounds above one year are rounded down to whole years (`round(c − 0.5)`).
/// The remaining-time limit is applied both before and after the clamp, so
/// the final step may be shorter than `min_dt` but never overshoots `t_end`.
/// Pass `t_end − t_now` as `hillslope_cfl` when diffusion is disabled.
pub fn adaptive_timestep(
    hillslope_cfl: f64,
    flow_cfl: f64,
    t_now: f64,
    t_end: f64,
    min_dt: f64,
    max_dt: f64,
) -> Result<f64, NumericalError> {
    let remaining = t_end - t_now;
    let mut dt = hillslope_cfl.min(flow_cfl);
    if dt.is_nan() {
        return Err(NumericalError::InvalidTimestep { dt, t_now, t_end });
    }
    if dt > 1.0 {
        dt = (dt - 0.5).round();
    }
    dt = dt.min(remaining).max(min_dt).min(max_dt).min(remaining);
    if !(dt > 0.0) || !dt.is_finite() {
        return Err(NumericalError::InvalidTimestep { dt, t_now, t_end });
    }
    Ok(dt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn remaining_time_caps_the_step() {
        let dt = adaptive_timestep(1500.0, 2000.0, 950.0, 1000.0, 1.0, 1000.0).unwrap();
        assert_eq!(dt, 50.0);
    }

    #[test]
    fn fractional_remaining_time_is_not_rounded() {
        // Rounding applies to the stability bounds only; the remaining-time
        // cap comes after it, so the last step lands exactly on t_end.
        let dt = adaptive_timestep(1500.0, 2000.0, 0.0, 50.7, 1.0, 1000.0).unwrap();
        assert_eq!(dt, 50.7);
    }

    #[test]
    fn bounds_above_one_year_drop_their_fraction() {
        let dt = adaptive_timestep(12.7, 40.0, 0.0, 1.0e4, 0.1, 1.0e3).unwrap();
        assert_eq!(dt, 12.0);
        let dt = adaptive_timestep(7.5, 40.0, 0.0, 1.0e4, 0.1, 1.0e3).unwrap();
        assert_eq!(dt, 7.0);
    }

    #[test]
    fn short_bounds_are_kept_then_clamped() {
        assert_eq!(adaptive_timestep(0.4, 0.9, 0.0, 100.0, 0.1, 10.0).unwrap(), 0.4);
        assert_eq!(adaptive_timestep(0.04, 0.9, 0.0, 100.0, 0.1, 10.0).unwrap(), 0.1);
        assert_eq!(adaptive_timestep(5.0e5, f64::INFINITY, 0.0, 1.0e6, 1.0, 250.0).unwrap(), 250.0);
    }

    #[test]
    fn disabled_hillslope_falls_back_to_remaining_time() {
        let (t_now, t_end) = (200.0, 260.0);
        let dt = adaptive_timestep(t_end - t_now, f64::INFINITY, t_now, t_end, 1.0, 100.0).unwrap();
        assert_eq!(dt, 60.0);
    }

    #[test]
    fn last_step_may_undercut_min_dt() {
        let dt = adaptive_timestep(500.0, 500.0, 999.75, 1000.0, 1.0, 100.0).unwrap();
        assert_eq!(dt, 0.25);
    }

    #[test]
    fn no_time_left_is_an_error() {
        let err = adaptive_timestep(10.0, 10.0, 100.0, 100.0, 1.0, 50.0).unwrap_err();
        assert!(matches!(err, NumericalError::InvalidTimestep { .. }));
        let err = adaptive_timestep(f64::NAN, f64::NAN, 0.0, 100.0, 1.0, 50.0).unwrap_err();
        assert!(matches!(err, NumericalError::InvalidTimestep { .. }));
    }

    #[test]
    fn step_stays_within_bounds() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..500 {
            let t_now = rng.gen_range(0.0..1.0e5);
            let t_end = t_now + rng.gen_range(1.0e-3..1.0e4);
            let min_dt = rng.gen_range(1.0e-3..10.0);
            let max_dt = min_dt + rng.gen_range(0.0..1.0e3);
            let h = rng.gen_range(1.0e-4..1.0e5);
            let f = rng.gen_range(1.0e-4..1.0e5);
            let dt = adaptive_timestep(h, f, t_now, t_end, min_dt, max_dt).unwrap();
            let remaining = t_end - t_now;
            assert!(dt > 0.0);
            assert!(dt <= max_dt && dt <= remaining, "dt {dt} exceeds limits");
            assert!(dt >= min_dt || dt == remaining, "dt {dt} below min_dt {min_dt}");
        }
    }
}
