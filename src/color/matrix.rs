//! Row-major 3x3 color transform matrix.

use std::fmt;

/// A 3x3 color-transform matrix stored row-major.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix3(pub [f32; 9]);

impl Matrix3 {
    pub const IDENTITY: Matrix3 = Matrix3([1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]);

    /// Matrix scaling each channel independently.
    pub fn diagonal(r: f32, g: f32, b: f32) -> Self {
        Matrix3([r, 0.0, 0.0, 0.0, g, 0.0, 0.0, 0.0, b])
    }

    /// Element at `row`, `col`.
    pub fn at(&self, row: usize, col: usize) -> f32 {
        self.0[row * 3 + col]
    }

    pub fn multiply(&self, other: &Matrix3) -> Matrix3 {
        let mut out = [0.0f32; 9];
        for row in 0..3 {
            for col in 0..3 {
                out[row * 3 + col] = (0..3).map(|k| self.at(row, k) * other.at(k, col)).sum();
            }
        }
        Matrix3(out)
    }
}

impl fmt::Display for Matrix3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = &self.0;
        write!(
            f,
            "[{:.4}, {:.4}, {:.4} | {:.4}, {:.4}, {:.4} | {:.4}, {:.4}, {:.4}]",
            m[0], m[1], m[2], m[3], m[4], m[5], m[6], m[7], m[8]
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_is_neutral() {
        let m = Matrix3::diagonal(0.5, 0.25, 2.0);
        assert_eq!(Matrix3::IDENTITY.multiply(&m), m);
        assert_eq!(m.multiply(&Matrix3::IDENTITY), m);
    }

    #[test]
    fn test_diagonal_product() {
        let a = Matrix3::diagonal(0.5, 1.0, 0.0);
        let b = Matrix3::diagonal(0.8, 0.8, 0.8);
        assert_eq!(a.multiply(&b), Matrix3::diagonal(0.4, 0.8, 0.0));
    }
}
