//! # Matrix Blocks
//!
//! One rectangular shard of V or W, held either densely or in compressed-column
//! (CSC) form.
//!
//! ## Orientation
//! The rows axis of a block is always the partitioned axis of the logical
//! matrix. A V shard covering `m_i` rows of an `m×n` target is an `m_i×n`
//! block, so a sparse V shard carries `n + 1` column pointers. Loaders that
//! hold the row-compressed layout go through [`MatrixBlock::from_csr`]; nothing
//! in this crate transposes implicitly.

use ndarray::{Array2, ArrayView1, Axis};

use crate::error::{KlError, Result};

/// Compressed-column storage for a sparse block
///
/// Entries of column `j` live at `col_ptr[j]..col_ptr[j + 1]` of `row_idx` and
/// `values`. Row indices within a column are unique but not necessarily sorted.
#[derive(Debug, Clone, PartialEq)]
pub struct CscBlock {
    nrows: usize,
    ncols: usize,
    col_ptr: Vec<usize>,
    row_idx: Vec<usize>,
    values: Vec<f32>,
}

impl CscBlock {
    pub fn new(
        nrows: usize,
        ncols: usize,
        col_ptr: Vec<usize>,
        row_idx: Vec<usize>,
        values: Vec<f32>,
    ) -> Result<Self> {
        let ptr_len = ncols.checked_add(1).ok_or_else(|| {
            KlError::ShapeMismatch(format!("column count {} overflows", ncols))
        })?;
        if col_ptr.len() != ptr_len {
            return Err(KlError::ShapeMismatch(format!(
                "column pointer has length {}, expected {} for {} columns",
                col_ptr.len(),
                ptr_len,
                ncols
            )));
        }
        if row_idx.len() != values.len() {
            return Err(KlError::ShapeMismatch(format!(
                "{} row indices but {} values",
                row_idx.len(),
                values.len()
            )));
        }
        if col_ptr[0] != 0 || col_ptr[ncols] != values.len() {
            return Err(KlError::ShapeMismatch(format!(
                "column pointer must span 0..{}, got {}..{}",
                values.len(),
                col_ptr[0],
                col_ptr[ncols]
            )));
        }
        if col_ptr.windows(2).any(|w| w[0] > w[1]) {
            return Err(KlError::ShapeMismatch(
                "column pointer is not monotonically non-decreasing".to_string(),
            ));
        }

        let mut sorted = Vec::new();
        for col in 0..ncols {
            sorted.clear();
            sorted.extend_from_slice(&row_idx[col_ptr[col]..col_ptr[col + 1]]);
            sorted.sort_unstable();
            if let Some(&row) = sorted.last().filter(|&&row| row >= nrows) {
                return Err(KlError::ShapeMismatch(format!(
                    "row index {} in column {} exceeds {} rows",
                    row, col, nrows
                )));
            }
            if let Some(pair) = sorted.windows(2).find(|pair| pair[0] == pair[1]) {
                return Err(KlError::ShapeMismatch(format!(
                    "duplicate row index {} in column {}",
                    pair[0], col
                )));
            }
        }

        Ok(Self {
            nrows,
            ncols,
            col_ptr,
            row_idx,
            values,
        })
    }

    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Row indices and values of column `col`. Caller guarantees `col < ncols`.
    fn column(&self, col: usize) -> (&[usize], &[f32]) {
        let range = self.col_ptr[col]..self.col_ptr[col + 1];
        (&self.row_idx[range.clone()], &self.values[range])
    }

    fn get(&self, row: usize, col: usize) -> f32 {
        let (rows, values) = self.column(col);
        rows.iter()
            .position(|&r| r == row)
            .map(|pos| values[pos])
            .unwrap_or(0.0)
    }
}

/// A dense or sparse rectangular block of `f32` values
#[derive(Debug, Clone, PartialEq)]
pub enum MatrixBlock {
    Dense(Array2<f32>),
    Sparse(CscBlock),
}

impl MatrixBlock {
    /// Dense block from a row-major buffer of length `rows * cols`
    ///
    /// # Example
    /// ```
    /// use bwmf::block::MatrixBlock;
    /// let b = MatrixBlock::dense(2, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
    /// assert_eq!(b.get(1, 0).unwrap(), 3.0);
    /// ```
    pub fn dense(rows: usize, cols: usize, values: Vec<f32>) -> Result<Self> {
        let len = rows.checked_mul(cols).ok_or_else(|| {
            KlError::ShapeMismatch(format!("dense shape {}x{} overflows", rows, cols))
        })?;
        if values.len() != len {
            return Err(KlError::ShapeMismatch(format!(
                "dense buffer has {} values, expected {}x{} = {}",
                values.len(),
                rows,
                cols,
                len
            )));
        }
        Array2::from_shape_vec((rows, cols), values)
            .map(MatrixBlock::Dense)
            .map_err(|e| KlError::ShapeMismatch(e.to_string()))
    }

    pub fn from_array(data: Array2<f32>) -> Self {
        MatrixBlock::Dense(data)
    }

    /// Sparse block from a compressed-column triplet
    pub fn sparse(
        rows: usize,
        cols: usize,
        col_ptr: Vec<usize>,
        row_idx: Vec<usize>,
        values: Vec<f32>,
    ) -> Result<Self> {
        CscBlock::new(rows, cols, col_ptr, row_idx, values).map(MatrixBlock::Sparse)
    }

    /// Sparse block from a compressed-row triplet, converted to CSC
    ///
    /// `row_ptr` has `rows + 1` entries and `col_idx` holds column indices.
    pub fn from_csr(
        rows: usize,
        cols: usize,
        row_ptr: Vec<usize>,
        col_idx: Vec<usize>,
        values: Vec<f32>,
    ) -> Result<Self> {
        let ptr_len = rows
            .checked_add(1)
            .ok_or_else(|| KlError::ShapeMismatch(format!("row count {} overflows", rows)))?;
        let col_ptr_len = cols
            .checked_add(1)
            .ok_or_else(|| KlError::ShapeMismatch(format!("column count {} overflows", cols)))?;
        if row_ptr.len() != ptr_len {
            return Err(KlError::ShapeMismatch(format!(
                "row pointer has length {}, expected {} for {} rows",
                row_ptr.len(),
                ptr_len,
                rows
            )));
        }
        if col_idx.len() != values.len()
            || row_ptr[0] != 0
            || row_ptr[rows] != values.len()
            || row_ptr.windows(2).any(|w| w[0] > w[1])
        {
            return Err(KlError::ShapeMismatch(
                "row pointer does not describe the given entries".to_string(),
            ));
        }
        if let Some(&col) = col_idx.iter().find(|&&c| c >= cols) {
            return Err(KlError::ShapeMismatch(format!(
                "column index {} exceeds {} columns",
                col, cols
            )));
        }

        let mut col_ptr = vec![0usize; col_ptr_len];
        for &col in &col_idx {
            col_ptr[col + 1] += 1;
        }
        for col in 0..cols {
            col_ptr[col + 1] += col_ptr[col];
        }

        let mut next = col_ptr.clone();
        let mut row_idx = vec![0usize; values.len()];
        let mut csc_values = vec![0.0f32; values.len()];
        for row in 0..rows {
            for pos in row_ptr[row]..row_ptr[row + 1] {
                let col = col_idx[pos];
                row_idx[next[col]] = row;
                csc_values[next[col]] = values[pos];
                next[col] += 1;
            }
        }

        Self::sparse(rows, cols, col_ptr, row_idx, csc_values)
    }

    /// Sparse copy of a dense array, dropping exact zeros
    pub fn sparse_from_dense(data: &Array2<f32>) -> Self {
        let (rows, cols) = data.dim();
        let mut col_ptr = Vec::with_capacity(cols + 1);
        let mut row_idx = Vec::new();
        let mut values = Vec::new();
        col_ptr.push(0);
        for column in data.axis_iter(Axis(1)) {
            for (row, &v) in column.iter().enumerate() {
                if v != 0.0 {
                    row_idx.push(row);
                    values.push(v);
                }
            }
            col_ptr.push(values.len());
        }
        MatrixBlock::Sparse(CscBlock {
            nrows: rows,
            ncols: cols,
            col_ptr,
            row_idx,
            values,
        })
    }

    pub fn nrows(&self) -> usize {
        match self {
            MatrixBlock::Dense(data) => data.nrows(),
            MatrixBlock::Sparse(csc) => csc.nrows,
        }
    }

    pub fn ncols(&self) -> usize {
        match self {
            MatrixBlock::Dense(data) => data.ncols(),
            MatrixBlock::Sparse(csc) => csc.ncols,
        }
    }

    pub fn is_sparse(&self) -> bool {
        matches!(self, MatrixBlock::Sparse(_))
    }

    /// Number of stored entries (rows × cols for dense blocks)
    pub fn nnz(&self) -> usize {
        match self {
            MatrixBlock::Dense(data) => data.len(),
            MatrixBlock::Sparse(csc) => csc.nnz(),
        }
    }

    /// Value at `(row, col)`, zero for unlisted sparse entries
    pub fn get(&self, row: usize, col: usize) -> Result<f32> {
        self.check_col(col)?;
        if row >= self.nrows() {
            return Err(KlError::IndexOutOfRange {
                index: row,
                len: self.nrows(),
            });
        }
        Ok(match self {
            MatrixBlock::Dense(data) => data[(row, col)],
            MatrixBlock::Sparse(csc) => csc.get(row, col),
        })
    }

    /// Nonzero entries of column `col` as `(row, value)` pairs
    pub fn column_entries(&self, col: usize) -> Result<ColumnEntries<'_>> {
        self.check_col(col)?;
        Ok(match self {
            MatrixBlock::Dense(data) => ColumnEntries::Dense {
                column: data.column(col),
                row: 0,
            },
            MatrixBlock::Sparse(csc) => {
                let (rows, values) = csc.column(col);
                ColumnEntries::Sparse {
                    rows,
                    values,
                    pos: 0,
                }
            }
        })
    }

    pub fn to_dense(&self) -> Array2<f32> {
        match self {
            MatrixBlock::Dense(data) => data.clone(),
            MatrixBlock::Sparse(csc) => {
                let mut out = Array2::zeros((csc.nrows, csc.ncols));
                for col in 0..csc.ncols {
                    let (rows, values) = csc.column(col);
                    for (&row, &v) in rows.iter().zip(values) {
                        out[(row, col)] = v;
                    }
                }
                out
            }
        }
    }

    fn check_col(&self, col: usize) -> Result<()> {
        if col >= self.ncols() {
            Err(KlError::IndexOutOfRange {
                index: col,
                len: self.ncols(),
            })
        } else {
            Ok(())
        }
    }
}

/// Iterator over the nonzero `(row, value)` entries of one block column
pub enum ColumnEntries<'a> {
    Dense {
        column: ArrayView1<'a, f32>,
        row: usize,
    },
    Sparse {
        rows: &'a [usize],
        values: &'a [f32],
        pos: usize,
    },
}

impl<'a> Iterator for ColumnEntries<'a> {
    type Item = (usize, f32);

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            ColumnEntries::Dense { column, row } => {
                while *row < column.len() {
                    let current = *row;
                    *row += 1;
                    let v = column[current];
                    if v != 0.0 {
                        return Some((current, v));
                    }
                }
                None
            }
            ColumnEntries::Sparse { rows, values, pos } => {
                let current = *pos;
                if current < rows.len() {
                    *pos += 1;
                    Some((rows[current], values[current]))
                } else {
                    None
                }
            }
        }
    }
}
