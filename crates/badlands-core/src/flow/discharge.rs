//! Water discharge accumulated along the stack.

/// Discharge (m³/yr) at every node: local input `cv · water` plus everything
/// draining through it. `stack` must list receivers before donors, so walking
/// it backwards visits donors first.
pub fn accumulate_discharge(
    stack: &[usize],
    receivers: &[usize],
    control_volumes: &[f64],
    water: &[f64],
) -> Vec<f64> {
    let mut discharge: Vec<f64> = control_volumes
        .iter()
        .zip(water)
        .map(|(&cv, &w)| (cv * w).max(0.0))
        .collect();
    for &i in stack.iter().rev() {
        let r = receivers[i];
        if r != i {
            discharge[r] += discharge[i];
        }
    }
    discharge
}
