//! Moving between "all states" and "all states but one" index spaces.
//!
//! Free energies are only determined up to an additive constant, so one state (the baseline) is
//! pinned to zero and the optimizer works on the remaining coordinates. [`IndexMap`] keeps the
//! explicit full ↔ reduced index arrays for that removal and uses them to insert the pinned value
//! back into vectors and matrices, or to drop it again.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

/// Index mapping between `0..len` and the same range with the position `removed` taken out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMap {
    len: usize,
    /// `kept[r]` is the full index of reduced index `r`
    kept: Vec<usize>,
}

impl IndexMap {
    /// Create the mapping for a full range of `len` indices with `removed` taken out
    ///
    /// # Panics
    ///
    /// Panics if `removed >= len`.
    pub fn new(len: usize, removed: usize) -> Self {
        assert!(
            removed < len,
            "removed index {} out of range for length {}",
            removed,
            len
        );
        let kept = (0..len).filter(|&i| i != removed).collect();
        Self { len, kept }
    }

    /// Length of the reduced index range
    pub fn reduced_len(&self) -> usize {
        self.len - 1
    }

    /// Insert `value` at the removed position of a reduced vector
    pub fn insert(&self, reduced: ArrayView1<'_, f64>, value: f64) -> Array1<f64> {
        debug_assert_eq!(reduced.len(), self.reduced_len());
        let mut full = Array1::from_elem(self.len, value);
        for (r, &f) in self.kept.iter().enumerate() {
            full[f] = reduced[r];
        }
        full
    }

    /// Drop the removed position from a full vector
    pub fn delete(&self, full: ArrayView1<'_, f64>) -> Array1<f64> {
        debug_assert_eq!(full.len(), self.len);
        full.select(Axis(0), &self.kept)
    }

    /// Insert a row (`Axis(0)`) or column (`Axis(1)`) filled with `value` at the removed position
    pub fn insert_axis(&self, reduced: ArrayView2<'_, f64>, axis: Axis, value: f64) -> Array2<f64> {
        debug_assert_eq!(reduced.len_of(axis), self.reduced_len());
        let mut shape = reduced.raw_dim();
        shape[axis.index()] = self.len;
        let mut full = Array2::from_elem(shape, value);
        for (r, &f) in self.kept.iter().enumerate() {
            full.index_axis_mut(axis, f)
                .assign(&reduced.index_axis(axis, r));
        }
        full
    }

    /// Drop the removed row (`Axis(0)`) or column (`Axis(1)`) from a full matrix
    pub fn delete_axis(&self, full: ArrayView2<'_, f64>, axis: Axis) -> Array2<f64> {
        debug_assert_eq!(full.len_of(axis), self.len);
        full.select(axis, &self.kept)
    }

    /// Insert a row and a column filled with `value` at the removed position of a square matrix
    pub fn insert_square(&self, reduced: ArrayView2<'_, f64>, value: f64) -> Array2<f64> {
        let rows = self.insert_axis(reduced, Axis(0), value);
        self.insert_axis(rows.view(), Axis(1), value)
    }

    /// Drop the removed row and column from a square matrix
    pub fn delete_square(&self, full: ArrayView2<'_, f64>) -> Array2<f64> {
        full.select(Axis(0), &self.kept).select(Axis(1), &self.kept)
    }
}
