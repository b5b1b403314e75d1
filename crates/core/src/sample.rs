//! Pixel samples and the tabular training data built from them

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Label of a flood-prone (positive) sample
pub const FLOOD: u8 = 1;
/// Label of a non-flood or still-unlabeled sample
pub const NON_FLOOD: u8 = 0;

/// One sampled pixel: location, covariate values and label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplePoint {
    /// Cell center in grid CRS units
    pub x: f64,
    pub y: f64,
    pub row: usize,
    pub col: usize,
    /// One value per covariate, in table column order
    pub features: Vec<f64>,
    pub label: u8,
}

/// A flat table of samples sharing one covariate schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleTable {
    /// Covariate column names
    pub columns: Vec<String>,
    pub points: Vec<SamplePoint>,
}

impl SampleTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            points: Vec::new(),
        }
    }

    /// Add a sample; its feature vector must match the schema width.
    pub fn push(&mut self, point: SamplePoint) -> Result<()> {
        if point.features.len() != self.columns.len() {
            return Err(Error::Algorithm(format!(
                "sample at ({}, {}) has {} features, table has {} columns",
                point.row,
                point.col,
                point.features.len(),
                self.columns.len()
            )));
        }
        self.points.push(point);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn count_label(&self, label: u8) -> usize {
        self.points.iter().filter(|p| p.label == label).count()
    }

    pub fn with_label(&self, label: u8) -> impl Iterator<Item = &SamplePoint> {
        self.points.iter().filter(move |p| p.label == label)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Copy of the table restricted to `columns`, in that order.
    pub fn project<S: AsRef<str>>(&self, columns: &[S]) -> Result<SampleTable> {
        let idx = columns
            .iter()
            .map(|c| {
                self.column_index(c.as_ref()).ok_or_else(|| Error::MissingColumn {
                    table: "samples".to_string(),
                    column: c.as_ref().to_string(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let points = self
            .points
            .iter()
            .map(|p| SamplePoint {
                features: idx.iter().map(|&i| p.features[i]).collect(),
                ..p.clone()
            })
            .collect();

        Ok(SampleTable {
            columns: columns.iter().map(|c| c.as_ref().to_string()).collect(),
            points,
        })
    }

    /// Feature rows and labels, borrowed.
    pub fn xy(&self) -> (Vec<&[f64]>, Vec<u8>) {
        self.points
            .iter()
            .map(|p| (p.features.as_slice(), p.label))
            .unzip()
    }
}
