use nalgebra::storage::StorageMut;
use nalgebra::{DMatrix, Dim, Matrix, Scalar};

/// Clones the upper triangle entries into the lower triangle entries.
///
/// The primary use case for this is to construct a full symmetric matrix from a symmetric
/// matrix represented only by its upper triangular entries.
pub(crate) fn clone_upper_to_lower<T, R, C, S>(matrix: &mut Matrix<T, R, C, S>)
where
    T: Scalar,
    R: Dim,
    C: Dim,
    S: StorageMut<T, R, C>,
{
    for j in 0..matrix.ncols() {
        for i in (j + 1)..matrix.nrows() {
            matrix[(i, j)] = matrix[(j, i)].clone();
        }
    }
}

/// Adds `value * I` to the `m x m` diagonal block coupling entity `i` and entity `j`.
///
/// `offset` is the (row, column) position of the DOF block the entities belong to. Entities are
/// stored entity-major, so component `c` of entity `i` sits at `offset.0 + m * i + c`.
#[allow(non_snake_case)]
pub(crate) fn add_to_diagonal_block(
    matrix: &mut DMatrix<f64>,
    offset: (usize, usize),
    (i, j): (usize, usize),
    m: usize,
    value: f64,
) {
    let mut M_ij = matrix.view_mut((offset.0 + m * i, offset.1 + m * j), (m, m));
    for c in 0..m {
        M_ij[(c, c)] += value;
    }
}

/// Iterates the coefficients of component `c` from entity-major local values.
pub(crate) fn component(values: &[f64], m: usize, c: usize) -> impl Iterator<Item = f64> + '_ {
    values.iter().skip(c).step_by(m).copied()
}
