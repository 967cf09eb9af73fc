use rand::distributions::Open01;
use rand::Rng;
use std::ops::{Add, Mul, Sub};

/// Dense row-major matrix of `f64`.
///
/// Column vectors are plain `n x 1` matrices; the engine never needs a
/// separate vector type.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<Vec<f64>>,
}

impl Matrix {
    pub fn zeros(rows: usize, cols: usize) -> Matrix {
        Matrix {
            rows,
            cols,
            data: vec![vec![0.0; cols]; rows],
        }
    }

    /// Samples every entry independently from the open interval
    /// `(-bound, bound)`.
    pub fn uniform<R: Rng + ?Sized>(rows: usize, cols: usize, bound: f64, rng: &mut R) -> Matrix {
        let mut res = Matrix::zeros(rows, cols);

        for i in 0..rows {
            for j in 0..cols {
                let u: f64 = rng.sample(Open01);
                res.data[i][j] = u * 2.0 * bound - bound;
            }
        }

        res
    }

    /// Builds an `n x 1` column vector.
    pub fn column(values: &[f64]) -> Matrix {
        Matrix {
            rows: values.len(),
            cols: 1,
            data: values.iter().map(|&v| vec![v]).collect(),
        }
    }

    /// Builds a matrix from nested rows. Returns `None` for empty or ragged
    /// input, since neither has a well-defined shape.
    pub fn from_rows(data: Vec<Vec<f64>>) -> Option<Matrix> {
        let cols = data.first()?.len();
        if cols == 0 || data.iter().any(|row| row.len() != cols) {
            return None;
        }

        Some(Matrix {
            rows: data.len(),
            cols,
            data,
        })
    }

    pub fn transpose(&self) -> Matrix {
        let mut res = Matrix::zeros(self.cols, self.rows);

        for i in 0..res.rows {
            for j in 0..res.cols {
                res.data[i][j] = self.data[j][i];
            }
        }

        res
    }

    pub fn map<F>(&self, functor: F) -> Matrix
    where
        F: Fn(f64) -> f64,
    {
        Matrix {
            rows: self.rows,
            cols: self.cols,
            data: self
                .data
                .iter()
                .map(|row| row.iter().map(|&x| functor(x)).collect())
                .collect(),
        }
    }

    /// Element-wise (Hadamard) product of two same-shape matrices.
    pub fn hadamard(&self, rhs: &Matrix) -> Matrix {
        assert_same_shape(self, rhs);

        Matrix {
            rows: self.rows,
            cols: self.cols,
            data: self
                .data
                .iter()
                .zip(rhs.data.iter())
                .map(|(a, b)| a.iter().zip(b.iter()).map(|(x, y)| x * y).collect())
                .collect(),
        }
    }

    /// In place `self += factor * other`.
    pub fn add_scaled(&mut self, other: &Matrix, factor: f64) {
        assert_same_shape(self, other);

        for (row, other_row) in self.data.iter_mut().zip(other.data.iter()) {
            for (x, y) in row.iter_mut().zip(other_row.iter()) {
                *x += factor * y;
            }
        }
    }

    /// Row index of the largest entry in the first column. The scan runs top
    /// to bottom and only moves on a strictly greater value, so ties resolve
    /// to the lowest index.
    pub fn argmax(&self) -> usize {
        let mut best = 0;
        for i in 1..self.rows {
            if self.data[i][0] > self.data[best][0] {
                best = i;
            }
        }
        best
    }

    /// Copies the first column out as a flat vector.
    pub fn column_values(&self) -> Vec<f64> {
        self.data.iter().map(|row| row[0]).collect()
    }

    pub fn is_finite(&self) -> bool {
        self.data.iter().flatten().all(|x| x.is_finite())
    }
}

fn assert_same_shape(a: &Matrix, b: &Matrix) {
    if a.rows != b.rows || a.cols != b.cols {
        panic!(
            "Matrices are of incorrect sizes: {}x{} vs {}x{}",
            a.rows, a.cols, b.rows, b.cols
        )
    }
}

impl Add for &Matrix {
    type Output = Matrix;

    fn add(self, rhs: Self) -> Self::Output {
        assert_same_shape(self, rhs);

        let mut res = Matrix::zeros(self.rows, self.cols);

        for i in 0..self.rows {
            for j in 0..self.cols {
                res.data[i][j] = self.data[i][j] + rhs.data[i][j];
            }
        }

        res
    }
}

impl Sub for &Matrix {
    type Output = Matrix;

    fn sub(self, rhs: Self) -> Self::Output {
        assert_same_shape(self, rhs);

        let mut res = Matrix::zeros(self.rows, self.cols);

        for i in 0..self.rows {
            for j in 0..self.cols {
                res.data[i][j] = self.data[i][j] - rhs.data[i][j];
            }
        }

        res
    }
}

impl Mul for &Matrix {
    type Output = Matrix;

    fn mul(self, rhs: Self) -> Self::Output {
        if self.cols != rhs.rows {
            panic!(
                "Matrices are of incorrect sizes: {}x{} * {}x{}",
                self.rows, self.cols, rhs.rows, rhs.cols
            )
        }

        let mut res = Matrix::zeros(self.rows, rhs.cols);

        for i in 0..res.rows {
            for j in 0..res.cols {
                let mut sum = 0.0;

                for k in 0..self.cols {
                    sum += self.data[i][k] * rhs.data[k][j];
                }

                res.data[i][j] = sum;
            }
        }

        res
    }
}
