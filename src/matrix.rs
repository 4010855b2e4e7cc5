//! Class-keyed matrices with explicit row and column order.
//!
//! Rows are ground-truth classes in the test set's declared order, columns
//! are predicted classes in the training set's declared order. Every cell is
//! allocated up front, so a pair that never occurred still reads as zero.

use serde::{Deserialize, Serialize};
use std::ops::AddAssign;

/// Dense matrix indexed by (ground-truth class, predicted class) names
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMatrix<T> {
    rows: Vec<String>,
    columns: Vec<String>,
    cells: Vec<Vec<T>>,
}

impl<T: Copy + Default> ClassMatrix<T> {
    /// Create a matrix with every cell set to `T::default()`
    #[must_use]
    pub fn zeros(rows: &[String], columns: &[String]) -> Self {
        Self {
            rows: rows.to_vec(),
            columns: columns.to_vec(),
            cells: vec![vec![T::default(); columns.len()]; rows.len()],
        }
    }

    /// Row labels in declared order
    #[must_use]
    pub fn rows(&self) -> &[String] {
        &self.rows
    }

    /// Column labels in declared order
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Cell value, `None` if either class is not part of the matrix
    #[must_use]
    pub fn get(&self, row: &str, column: &str) -> Option<T> {
        let (r, c) = self.position(row, column)?;
        self.cells.get(r)?.get(c).copied()
    }

    /// Mutable cell access, `None` if either class is not part of the matrix
    pub fn get_mut(&mut self, row: &str, column: &str) -> Option<&mut T> {
        let (r, c) = self.position(row, column)?;
        self.cells.get_mut(r)?.get_mut(c)
    }

    /// All cells of one row, in column order
    #[must_use]
    pub fn row(&self, row: &str) -> Option<&[T]> {
        let r = self.rows.iter().position(|name| name == row)?;
        self.cells.get(r).map(Vec::as_slice)
    }

    /// Mutable row access, in column order
    pub fn row_mut(&mut self, row: &str) -> Option<&mut [T]> {
        let r = self.rows.iter().position(|name| name == row)?;
        self.cells.get_mut(r).map(Vec::as_mut_slice)
    }

    /// Iterate `(row, column, value)` in row-major declared order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, T)> + '_ {
        self.rows.iter().zip(&self.cells).flat_map(move |(row, cells)| {
            self.columns
                .iter()
                .zip(cells)
                .map(move |(column, value)| (row.as_str(), column.as_str(), *value))
        })
    }

    fn position(&self, row: &str, column: &str) -> Option<(usize, usize)> {
        let r = self.rows.iter().position(|name| name == row)?;
        let c = self.columns.iter().position(|name| name == column)?;
        Some((r, c))
    }
}

impl<T: Copy + Default + AddAssign> ClassMatrix<T> {
    /// Add `value` to a cell; returns `false` if the cell does not exist
    pub fn add(&mut self, row: &str, column: &str, value: T) -> bool {
        self.get_mut(row, column).map_or(false, |cell| {
            *cell += value;
            true
        })
    }
}

impl ClassMatrix<u64> {
    /// Sum of all cells
    #[must_use]
    pub fn total(&self) -> u64 {
        self.cells.iter().flatten().sum()
    }

    /// Sum of one row
    #[must_use]
    pub fn row_total(&self, row: &str) -> Option<u64> {
        self.row(row).map(|cells| cells.iter().sum())
    }

    /// Sum of cells whose row and column name the same class
    #[must_use]
    pub fn matching_total(&self) -> u64 {
        self.iter()
            .filter(|(row, column, _)| row == column)
            .map(|(_, _, count)| count)
            .sum()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    fn names(labels: &[&str]) -> Vec<String> {
        labels.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_zeros_allocates_every_cell() {
        let m: ClassMatrix<u64> = ClassMatrix::zeros(&names(&["A", "B"]), &names(&["A", "B", "C"]));
        assert_eq!(m.iter().count(), 6);
        assert!(m.iter().all(|(_, _, v)| v == 0));
        assert_eq!(m.get("B", "C"), Some(0));
        assert_eq!(m.get("C", "A"), None);
    }

    #[test]
    fn test_iteration_follows_declared_order() {
        let m: ClassMatrix<u64> = ClassMatrix::zeros(&names(&["z", "a"]), &names(&["m", "b"]));
        let order: Vec<(&str, &str)> = m.iter().map(|(r, c, _)| (r, c)).collect();
        assert_eq!(order, vec![("z", "m"), ("z", "b"), ("a", "m"), ("a", "b")]);
    }

    #[test]
    fn test_add_and_totals() {
        let labels = names(&["A", "B"]);
        let mut m: ClassMatrix<u64> = ClassMatrix::zeros(&labels, &labels);
        assert!(m.add("A", "A", 2));
        assert!(m.add("A", "B", 1));
        assert!(m.add("B", "B", 3));
        assert!(!m.add("A", "Z", 1));
        assert_eq!(m.total(), 6);
        assert_eq!(m.row_total("A"), Some(3));
        assert_eq!(m.matching_total(), 5);
    }

    #[test]
    fn test_row_mut() {
        let labels = names(&["A", "B"]);
        let mut m: ClassMatrix<f64> = ClassMatrix::zeros(&labels, &labels);
        m.row_mut("B").unwrap().copy_from_slice(&[0.25, 0.75]);
        assert_eq!(m.row("B").unwrap(), &[0.25, 0.75]);
        assert_eq!(m.get("B", "B"), Some(0.75));
    }

    #[test]
    fn test_serde_roundtrip() {
        let labels = names(&["A", "B"]);
        let mut m: ClassMatrix<u64> = ClassMatrix::zeros(&labels, &labels);
        m.add("B", "A", 4);
        let json = serde_json::to_string(&m).unwrap();
        let parsed: ClassMatrix<u64> = serde_json::from_str(&json).unwrap();
        assert_eq!(m, parsed);
    }
}
