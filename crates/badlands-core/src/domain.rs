//! Valid simulation domain: the axis-aligned rectangle of the background
//! regular grid. TIN nodes outside it (padding added around the grid) are
//! never eroded, filled with sediment or diffused.
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DomainRect {
    pub min: [f64; 2],
    pub max: [f64; 2],
}

impl DomainRect {
    /// Rectangle spanned by the background grid's x and y coordinates.
    /// `None` when either axis is empty.
    pub fn from_grid(reg_x: &[f64], reg_y: &[f64]) -> Option<Self> {
        let span = |v: &[f64]| -> Option<(f64, f64)> {
            let lo = v.iter().copied().reduce(f64::min)?;
            let hi = v.iter().copied().reduce(f64::max)?;
            Some((lo, hi))
        };
        let (x0, x1) = span(reg_x)?;
        let (y0, y1) = span(reg_y)?;
        Some(Self { min: [x0, y0], max: [x1, y1] })
    }

    /// Closed-interval containment test.
    #[inline]
    pub fn contains(&self, [x, y]: [f64; 2]) -> bool {
        x >= self.min[0] && x <= self.max[0] && y >= self.min[1] && y <= self.max[1]
    }

    pub fn mask(&self, coords: &[[f64; 2]]) -> Vec<bool> {
        coords.iter().map(|&p| self.contains(p)).collect()
    }
}

/// Zero every entry of `field` whose node lies outside the domain.
pub fn apply_mask(field: &mut [f64], inside: &[bool]) {
    for (v, &keep) in field.iter_mut().zip(inside) {
        if !keep {
            *v = 0.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rectangle_spans_the_grid_axes() {
        let rect = DomainRect::from_grid(&[10.0, 20.0, 30.0], &[-5.0, 0.0, 5.0, 10.0]).unwrap();
        assert_eq!(rect.min, [10.0, -5.0]);
        assert_eq!(rect.max, [30.0, 10.0]);
        assert!(DomainRect::from_grid(&[], &[1.0]).is_none());
    }

    #[test]
    fn edges_count_as_inside() {
        let rect = DomainRect { min: [0.0, 0.0], max: [4.0, 2.0] };
        let mask = rect.mask(&[[0.0, 0.0], [4.0, 2.0], [2.0, 1.0], [-0.1, 1.0], [2.0, 2.5]]);
        assert_eq!(mask, vec![true, true, true, false, false]);
    }

    #[test]
    fn exterior_entries_are_zeroed() {
        let mut flux = vec![1.0, -2.0, 3.0, 4.0];
        apply_mask(&mut flux, &[true, false, true, false]);
        assert_eq!(flux, vec![1.0, 0.0, 3.0, 0.0]);
    }
}
