use crate::traits::PowerSumOps;
use ndarray::{Array1, Array2, ArrayBase, Axis, Data, Ix2};
use std::ops::Sub;

/// Row-wise sufficient statistics `(s0, s1, s2)` over a subset of
/// columns: the number of columns, the sum, and the sum of squares.
///
/// Keeping the raw power sums lets us derive the statistics of the
/// complement without touching the data again:
/// `background = total - foreground`.
#[derive(Debug, Clone, PartialEq)]
pub struct RowPowerSums {
    /// number of columns accumulated (shared by every row)
    pub s0: f64,
    /// row sums
    pub s1: Array1<f64>,
    /// row sums of squares
    pub s2: Array1<f64>,
}

impl RowPowerSums {
    /// Row means. Callers must make sure `s0 > 0`.
    pub fn mean(&self) -> Array1<f64> {
        &self.s1 / self.s0
    }

    /// Population variance `E[x^2] - E[x]^2`, clamped at zero to absorb
    /// rounding errors
    pub fn variance(&self) -> Array1<f64> {
        let mean = self.mean();
        (&self.s2 / self.s0 - &mean * &mean).mapv(|v| v.max(0.0))
    }

    /// Population standard deviation
    pub fn std(&self) -> Array1<f64> {
        self.variance().mapv(f64::sqrt)
    }

    /// `(mean, std)` in one go
    pub fn mean_std(&self) -> (Array1<f64>, Array1<f64>) {
        (self.mean(), self.std())
    }

    /// Keep the statistics of `rows` only
    pub fn select(&self, rows: &[usize]) -> RowPowerSums {
        RowPowerSums {
            s0: self.s0,
            s1: self.s1.select(Axis(0), rows),
            s2: self.s2.select(Axis(0), rows),
        }
    }
}

impl Sub for &RowPowerSums {
    type Output = RowPowerSums;

    fn sub(self, other: &RowPowerSums) -> RowPowerSums {
        RowPowerSums {
            s0: self.s0 - other.s0,
            s1: &self.s1 - &other.s1,
            s2: &self.s2 - &other.s2,
        }
    }
}

impl<S> PowerSumOps for ArrayBase<S, Ix2>
where
    S: Data<Elem = f64>,
{
    fn row_power_sums(&self, columns: &[usize]) -> RowPowerSums {
        let sub: Array2<f64> = self.select(Axis(1), columns);
        RowPowerSums {
            s0: columns.len() as f64,
            s1: sub.sum_axis(Axis(1)),
            s2: sub.mapv(|x| x * x).sum_axis(Axis(1)),
        }
    }

    fn row_power_sums_all(&self) -> RowPowerSums {
        RowPowerSums {
            s0: self.ncols() as f64,
            s1: self.sum_axis(Axis(1)),
            s2: self.mapv(|x| x * x).sum_axis(Axis(1)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn complement_matches_direct_computation() {
        let xx = array![[1.0, 2.0, 3.0, 4.0], [0.0, 0.0, 5.0, 5.0]];

        let total = xx.row_power_sums_all();
        let fg = xx.row_power_sums(&[2, 3]);
        let bg = &total - &fg;
        let direct = xx.row_power_sums(&[0, 1]);

        assert_abs_diff_eq!(bg.s0, direct.s0);
        assert_abs_diff_eq!(bg.s1, direct.s1, epsilon = 1e-12);
        assert_abs_diff_eq!(bg.s2, direct.s2, epsilon = 1e-12);

        let (mu, sig) = fg.mean_std();
        assert_abs_diff_eq!(mu, array![3.5, 5.0], epsilon = 1e-12);
        assert_abs_diff_eq!(sig, array![0.5, 0.0], epsilon = 1e-12);

        let second = total.select(&[1]);
        assert_abs_diff_eq!(second.s1, array![10.0]);
        assert_abs_diff_eq!(second.s2, array![50.0]);
    }
}
