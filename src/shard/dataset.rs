//! Training dataset for shard sampling.

use crate::core::config::DatasetConfig;
use crate::core::{Error, Result};

/// Numeric feature records loaded once at startup.
#[derive(Clone, Debug, Default)]
pub struct Dataset {
    records: Vec<Vec<f64>>,
    feature_count: usize,
}

impl Dataset {
    /// Build from in-memory records. All records must have the same length.
    pub fn from_records(records: Vec<Vec<f64>>) -> Result<Self> {
        let feature_count = records.first().map(Vec::len).unwrap_or(0);
        if let Some((i, r)) = records
            .iter()
            .enumerate()
            .find(|(_, r)| r.len() != feature_count)
        {
            return Err(Error::Dataset(format!(
                "record {} has {} features, expected {}",
                i,
                r.len(),
                feature_count
            )));
        }
        Ok(Self {
            records,
            feature_count,
        })
    }

    /// Load from a CSV file with a header row.
    pub fn load(config: &DatasetConfig) -> Result<Self> {
        let text = std::fs::read_to_string(&config.path).map_err(|e| {
            Error::Dataset(format!("cannot read {}: {}", config.path.display(), e))
        })?;
        Self::parse_csv(&text, config)
    }

    /// Parse CSV text. The first line is a header; at most `max_rows` data
    /// rows are read.
    pub fn parse_csv(text: &str, config: &DatasetConfig) -> Result<Self> {
        let wanted = config.skip_columns + config.feature_count;
        let records = text
            .lines()
            .skip(1)
            .filter(|line| !line.trim().is_empty())
            .take(config.max_rows)
            .enumerate()
            .map(|(i, line)| {
                let fields: Vec<&str> = line.split(',').collect();
                if fields.len() < wanted {
                    return Err(Error::Dataset(format!(
                        "row {} has {} columns, expected at least {}",
                        i + 1,
                        fields.len(),
                        wanted
                    )));
                }
                fields[config.skip_columns..wanted]
                    .iter()
                    .map(|f| {
                        f.trim().parse::<f64>().map_err(|_| {
                            Error::Dataset(format!("row {}: non-numeric value {:?}", i + 1, f))
                        })
                    })
                    .collect::<Result<Vec<f64>>>()
            })
            .collect::<Result<Vec<_>>>()?;

        let dataset = Self::from_records(records)?;
        tracing::info!(
            records = dataset.len(),
            features = dataset.feature_count,
            "loaded training dataset"
        );
        Ok(dataset)
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the dataset has no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Features per record.
    pub fn feature_count(&self) -> usize {
        self.feature_count
    }

    /// Record by index.
    pub fn record(&self, index: usize) -> Option<&[f64]> {
        self.records.get(index).map(Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn config(features: usize, max_rows: usize) -> DatasetConfig {
        DatasetConfig {
            path: PathBuf::from("unused.csv"),
            skip_columns: 2,
            feature_count: features,
            max_rows,
        }
    }

    #[test]
    fn test_parse_csv() {
        let text = "id,pkg,f1,f2\n1,com.a,0.5,1\n2,com.b,1.5,0\n";
        let ds = Dataset::parse_csv(text, &config(2, 1000)).unwrap();
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.feature_count(), 2);
        assert_eq!(ds.record(1), Some(&[1.5, 0.0][..]));
    }

    #[test]
    fn test_parse_csv_row_cap() {
        let text = "h\n0,0,1\n0,0,2\n0,0,3\n";
        let ds = Dataset::parse_csv(text, &config(1, 2)).unwrap();
        assert_eq!(ds.len(), 2);
    }

    #[test]
    fn test_parse_csv_extra_columns_ignored() {
        let text = "h\n0,0,1,label\n";
        let ds = Dataset::parse_csv(text, &config(1, 10)).unwrap();
        assert_eq!(ds.record(0), Some(&[1.0][..]));
    }

    #[test]
    fn test_parse_csv_short_row() {
        let text = "h\n0,0,1\n0,0\n";
        let err = Dataset::parse_csv(text, &config(1, 10)).unwrap_err();
        assert!(err.to_string().contains("row 2"));
    }

    #[test]
    fn test_parse_csv_non_numeric() {
        let text = "h\n0,0,abc\n";
        assert!(matches!(
            Dataset::parse_csv(text, &config(1, 10)),
            Err(Error::Dataset(_))
        ));
    }

    #[test]
    fn test_from_records_ragged() {
        assert!(Dataset::from_records(vec![vec![1.0, 2.0], vec![1.0]]).is_err());
        assert!(Dataset::from_records(vec![]).unwrap().is_empty());
    }

    #[test]
    fn test_load_missing_file() {
        let mut cfg = config(1, 10);
        cfg.path = PathBuf::from("/definitely/not/here.csv");
        assert!(matches!(Dataset::load(&cfg), Err(Error::Dataset(_))));
    }
}
