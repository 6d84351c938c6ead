//! Row-wise sparse builder and CSR helpers.

use nalgebra_sparse::{CooMatrix, CsrMatrix};

use crate::space::ordering::{Ordering, dof_to_vdof};

/// Sparse matrix assembled row by row; entries with the same column are summed.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SparseRows {
    ncols: usize,
    rows: Vec<Vec<(usize, f64)>>,
}

impl SparseRows {
    pub fn new(nrows: usize, ncols: usize) -> Self {
        Self {
            ncols,
            rows: vec![Vec::new(); nrows],
        }
    }

    pub fn nrows(&self) -> usize {
        self.rows.len()
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    pub fn add(&mut self, row: usize, col: usize, value: f64) {
        let r = &mut self.rows[row];
        match r.iter_mut().find(|(c, _)| *c == col) {
            Some((_, v)) => *v += value,
            None => r.push((col, value)),
        }
    }

    pub fn row(&self, row: usize) -> &[(usize, f64)] {
        &self.rows[row]
    }

    pub fn row_is_empty(&self, row: usize) -> bool {
        self.rows[row].is_empty()
    }

    pub fn set_row(&mut self, row: usize, entries: Vec<(usize, f64)>) {
        self.rows[row] = entries;
    }

    pub fn num_nonzeros(&self) -> usize {
        self.rows.iter().map(Vec::len).sum()
    }

    pub fn to_csr(&self) -> CsrMatrix<f64> {
        let mut coo = CooMatrix::new(self.rows.len(), self.ncols);
        for (i, row) in self.rows.iter().enumerate() {
            for &(j, v) in row {
                coo.push(i, j, v);
            }
        }
        CsrMatrix::from(&coo)
    }
}

/// `y_i = OR_j (A_ij != 0 && x_j)`.
pub fn boolean_mult(a: &CsrMatrix<f64>, x: &[bool]) -> Vec<bool> {
    a.row_iter()
        .map(|row| {
            row.col_indices()
                .iter()
                .zip(row.values())
                .any(|(&j, &v)| v != 0.0 && x.get(j).copied().unwrap_or(false))
        })
        .collect()
}

/// `y_j = OR_i (A_ij != 0 && x_i)`.
pub fn boolean_mult_transpose(a: &CsrMatrix<f64>, x: &[bool]) -> Vec<bool> {
    let mut y = vec![false; a.ncols()];
    for (row, &xi) in a.row_iter().zip(x) {
        if !xi {
            continue;
        }
        for (&j, &v) in row.col_indices().iter().zip(row.values()) {
            if v != 0.0 {
                y[j] = true;
            }
        }
    }
    y
}

/// Block-diagonal expansion of a scalar operator to `vdim` components, with
/// rows and columns laid out by `ordering`.
pub fn make_vdim_matrix(a: &CsrMatrix<f64>, vdim: usize, ordering: Ordering) -> CsrMatrix<f64> {
    if vdim == 1 {
        return a.clone();
    }
    let (h, w) = (a.nrows(), a.ncols());
    let mut coo = CooMatrix::new(h * vdim, w * vdim);
    for (i, j, &v) in a.triplet_iter() {
        for c in 0..vdim {
            let r = dof_to_vdof(i as i64, c, h, vdim, ordering) as usize;
            let k = dof_to_vdof(j as i64, c, w, vdim, ordering) as usize;
            coo.push(r, k, v);
        }
    }
    CsrMatrix::from(&coo)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_columns_accumulate() {
        let mut s = SparseRows::new(1, 2);
        s.add(0, 1, 0.5);
        s.add(0, 1, 0.25);
        assert_eq!(s.row(0), &[(1, 0.75)]);
        assert_eq!(s.num_nonzeros(), 1);
    }

    #[test]
    fn boolean_products() {
        let mut s = SparseRows::new(2, 3);
        s.add(0, 2, 1.0);
        s.add(1, 0, 1.0);
        let a = s.to_csr();
        assert_eq!(boolean_mult(&a, &[true, false, false]), vec![false, true]);
        assert_eq!(boolean_mult_transpose(&a, &[true, false]), vec![false, false, true]);
    }

    #[test]
    fn vdim_expansion_by_ordering() {
        let mut s = SparseRows::new(2, 1);
        s.add(1, 0, 3.0);
        let a = s.to_csr();
        let node = make_vdim_matrix(&a, 2, Ordering::NodeMajor);
        let comp = make_vdim_matrix(&a, 2, Ordering::ComponentMajor);
        let node_t: Vec<_> = node.triplet_iter().map(|(i, j, &v)| (i, j, v)).collect();
        let comp_t: Vec<_> = comp.triplet_iter().map(|(i, j, &v)| (i, j, v)).collect();
        assert_eq!(node_t, vec![(1, 0, 3.0), (3, 1, 3.0)]);
        assert_eq!(comp_t, vec![(2, 0, 3.0), (3, 1, 3.0)]);
    }
}
