//! CSV exchange of sample tables and report records
//!
//! Layout: `x, y, row, col, <covariates...>, <label column>`. The label
//! column is `class` for sampler output and `new_class` after PU
//! refinement, which lets the refinement run in another process.

use crate::error::{Error, Result};
use crate::sample::{SamplePoint, SampleTable};
use serde::Serialize;
use std::path::Path;

/// Label column written by the label sampler
pub const CLASS_COLUMN: &str = "class";
/// Label column written after PU refinement
pub const REFINED_CLASS_COLUMN: &str = "new_class";

const LOCATION_COLUMNS: [&str; 4] = ["x", "y", "row", "col"];

/// Write a sample table with the given label column name.
pub fn write_samples<P: AsRef<Path>>(path: P, table: &SampleTable, label_column: &str) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path.as_ref())?;

    let mut header: Vec<&str> = LOCATION_COLUMNS.to_vec();
    header.extend(table.columns.iter().map(String::as_str));
    header.push(label_column);
    wtr.write_record(&header)?;

    for p in &table.points {
        let mut record = vec![
            p.x.to_string(),
            p.y.to_string(),
            p.row.to_string(),
            p.col.to_string(),
        ];
        record.extend(p.features.iter().map(|v| v.to_string()));
        record.push(p.label.to_string());
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Read a sample table, checking that every expected covariate and the
/// label column are present. Extra columns are ignored; covariates are
/// returned in `covariates` order regardless of file order.
pub fn read_samples<P: AsRef<Path>, S: AsRef<str>>(
    path: P,
    covariates: &[S],
    label_column: &str,
) -> Result<SampleTable> {
    let table_name = path.as_ref().display().to_string();
    let mut rdr = csv::Reader::from_path(path.as_ref())?;
    let headers = rdr.headers()?.clone();

    let find = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim() == name)
            .ok_or_else(|| Error::MissingColumn {
                table: table_name.clone(),
                column: name.to_string(),
            })
    };

    let loc: Vec<usize> = LOCATION_COLUMNS.iter().map(|c| find(c)).collect::<Result<_>>()?;
    let cov: Vec<usize> = covariates
        .iter()
        .map(|c| find(c.as_ref()))
        .collect::<Result<_>>()?;
    let label_idx = find(label_column)?;

    let mut table = SampleTable::new(covariates.iter().map(|c| c.as_ref().to_string()).collect());

    for (line, record) in rdr.records().enumerate() {
        let record = record?;
        let field = |i: usize| -> Result<f64> {
            let raw = record.get(i).unwrap_or("").trim();
            raw.parse::<f64>().map_err(|_| {
                Error::Other(format!(
                    "{}: row {}, column '{}': cannot parse '{}' as a number",
                    table_name,
                    line + 2,
                    headers.get(i).unwrap_or("?"),
                    raw
                ))
            })
        };

        let label = field(label_idx)?;
        if label != 0.0 && label != 1.0 {
            return Err(Error::invalid_param(
                "label",
                label,
                format!("{}: row {} label must be 0 or 1", table_name, line + 2),
            ));
        }

        table.push(SamplePoint {
            x: field(loc[0])?,
            y: field(loc[1])?,
            row: field(loc[2])? as usize,
            col: field(loc[3])? as usize,
            features: cov.iter().map(|&i| field(i)).collect::<Result<_>>()?,
            label: label as u8,
        })?;
    }

    Ok(table)
}

/// Write serialisable records (hotspot metadata, weights) as CSV.
pub fn write_records<P: AsRef<Path>, R: Serialize>(path: P, records: &[R]) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path.as_ref())?;
    for r in records {
        wtr.serialize(r)?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn table() -> SampleTable {
        let mut t = SampleTable::new(vec!["elevation".into(), "hand".into()]);
        t.push(SamplePoint {
            x: 330005.0,
            y: 7399995.0,
            row: 0,
            col: 0,
            features: vec![742.5, 1.25],
            label: 1,
        })
        .unwrap();
        t.push(SamplePoint {
            x: 330015.0,
            y: 7399995.0,
            row: 0,
            col: 1,
            features: vec![760.0, 9.0],
            label: 0,
        })
        .unwrap();
        t
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("samples.csv");
        write_samples(&path, &table(), CLASS_COLUMN).unwrap();
        let back = read_samples(&path, &["elevation", "hand"], CLASS_COLUMN).unwrap();
        assert_eq!(back, table());
    }

    #[test]
    fn test_reordered_and_extra_columns() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("refined.csv");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "new_class,hand,extra,col,row,y,x,elevation").unwrap();
        writeln!(f, "1.0,0.5,zz,3,2,10,20,700").unwrap();
        drop(f);

        let t = read_samples(&path, &["elevation", "hand"], REFINED_CLASS_COLUMN).unwrap();
        assert_eq!(t.points[0].features, vec![700.0, 0.5]);
        assert_eq!((t.points[0].row, t.points[0].col), (2, 3));
        assert_eq!(t.points[0].label, 1);
    }

    #[test]
    fn test_missing_covariate_named() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("samples.csv");
        write_samples(&path, &table(), CLASS_COLUMN).unwrap();
        let err = read_samples(&path, &["elevation", "twi"], CLASS_COLUMN).unwrap_err();
        match err {
            Error::MissingColumn { column, .. } => assert_eq!(column, "twi"),
            other => panic!("unexpected error {other}"),
        }
    }
}
