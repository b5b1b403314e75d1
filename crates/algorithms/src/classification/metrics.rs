//! Accuracy assessment of binary classifications

use serde::Serialize;

/// Error (confusion) matrix of a binary classifier.
///
/// `matrix[actual][predicted]`. Producer's accuracy is per actual class
/// (recall), consumer's accuracy per predicted class (precision). A class
/// with no support reports NaN.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorMatrix {
    pub matrix: [[usize; 2]; 2],
    pub total: usize,
    pub overall_accuracy: f64,
    pub kappa: f64,
    pub producers_accuracy: [f64; 2],
    pub consumers_accuracy: [f64; 2],
}

impl ErrorMatrix {
    /// Build from `(actual, predicted)` label pairs in {0, 1}.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (u8, u8)>) -> Self {
        let mut m = [[0usize; 2]; 2];
        for (a, p) in pairs {
            m[(a.min(1)) as usize][(p.min(1)) as usize] += 1;
        }
        Self::from_matrix(m)
    }

    pub fn from_matrix(matrix: [[usize; 2]; 2]) -> Self {
        let total: usize = matrix.iter().flatten().sum();
        let n = total as f64;
        let diag = (matrix[0][0] + matrix[1][1]) as f64;
        let row = [matrix[0][0] + matrix[0][1], matrix[1][0] + matrix[1][1]];
        let col = [matrix[0][0] + matrix[1][0], matrix[0][1] + matrix[1][1]];

        let overall_accuracy = if total > 0 { diag / n } else { f64::NAN };
        let expected = if total > 0 {
            (row[0] * col[0] + row[1] * col[1]) as f64 / (n * n)
        } else {
            f64::NAN
        };
        let kappa = if expected < 1.0 {
            (overall_accuracy - expected) / (1.0 - expected)
        } else {
            // every sample in one class on both axes
            1.0
        };

        let ratio = |num: usize, den: usize| if den > 0 { num as f64 / den as f64 } else { f64::NAN };
        Self {
            matrix,
            total,
            overall_accuracy,
            kappa,
            producers_accuracy: [ratio(matrix[0][0], row[0]), ratio(matrix[1][1], row[1])],
            consumers_accuracy: [ratio(matrix[0][0], col[0]), ratio(matrix[1][1], col[1])],
        }
    }
}
