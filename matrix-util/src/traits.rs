/// Row-wise summary statistics that can be updated by subtraction,
/// e.g., background = total - foreground
pub trait PowerSumOps {
    /// `(count, sum, sum of squares)` accumulated over the selected columns
    fn row_power_sums(&self, columns: &[usize]) -> crate::ndarray_stat::RowPowerSums;

    /// `(count, sum, sum of squares)` accumulated over all columns
    fn row_power_sums_all(&self) -> crate::ndarray_stat::RowPowerSums;
}
