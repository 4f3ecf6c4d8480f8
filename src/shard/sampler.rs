//! Random training shards for clients.

use crate::core::{Error, Result};
use crate::shard::cipher::ShardCipher;
use crate::shard::dataset::Dataset;
use std::sync::Arc;

/// Encrypted rows handed to one client.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EncryptedShard {
    rows: Vec<String>,
}

impl EncryptedShard {
    /// Encrypted rows, one per record.
    pub fn rows(&self) -> &[String] {
        &self.rows
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the shard is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Newline-joined transport text.
    pub fn to_text(&self) -> String {
        self.rows.join("\n")
    }
}

/// Draws standardized, encrypted batches from the dataset.
#[derive(Clone, Debug)]
pub struct ShardSampler {
    dataset: Arc<Dataset>,
    cipher: ShardCipher,
}

impl ShardSampler {
    /// Create a sampler over a dataset.
    pub fn new(dataset: Arc<Dataset>, cipher: ShardCipher) -> Self {
        Self { dataset, cipher }
    }

    /// Draw `size` distinct records, standardize them over the batch and
    /// encrypt each row.
    pub fn sample(&self, size: usize) -> Result<EncryptedShard> {
        let available = self.dataset.len();
        if size > available {
            return Err(Error::InsufficientData {
                requested: size,
                available,
            });
        }
        if size == 0 {
            return Ok(EncryptedShard::default());
        }

        let mut rng = rand::thread_rng();
        let batch: Vec<Vec<f64>> = rand::seq::index::sample(&mut rng, available, size)
            .into_iter()
            .filter_map(|i| self.dataset.record(i).map(<[f64]>::to_vec))
            .collect();

        let rows = standardize(&batch)
            .iter()
            .map(|record| self.cipher.encrypt(&format_row(record)))
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(size, "sampled training shard");
        Ok(EncryptedShard { rows })
    }
}

/// Scale each column of the batch to zero mean and unit (population)
/// variance. Columns with zero variance become all zeros.
pub fn standardize(batch: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let n = batch.len();
    if n == 0 {
        return Vec::new();
    }
    let width = batch[0].len();

    let (means, stds): (Vec<f64>, Vec<f64>) = (0..width)
        .map(|col| {
            let mean = batch.iter().map(|r| r[col]).sum::<f64>() / n as f64;
            let var = batch.iter().map(|r| (r[col] - mean).powi(2)).sum::<f64>() / n as f64;
            let std = var.sqrt();
            (mean, if std > 0.0 { std } else { 1.0 })
        })
        .unzip();

    batch
        .iter()
        .map(|r| {
            r.iter()
                .zip(means.iter().zip(&stds))
                .map(|(v, (mean, std))| (v - mean) / std)
                .collect()
        })
        .collect()
}

fn format_row(record: &[f64]) -> String {
    record
        .iter()
        .map(|v| (*v as f32).to_string())
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sampler(records: Vec<Vec<f64>>) -> ShardSampler {
        let dataset = Arc::new(Dataset::from_records(records).unwrap());
        ShardSampler::new(dataset, ShardCipher::new(&[9u8; 32]))
    }

    fn decrypt_rows(sampler: &ShardSampler, shard: &EncryptedShard) -> Vec<Vec<f64>> {
        shard
            .rows()
            .iter()
            .map(|row| {
                sampler
                    .cipher
                    .decrypt(row)
                    .unwrap()
                    .split(',')
                    .map(|v| v.parse().unwrap())
                    .collect()
            })
            .collect()
    }

    #[test]
    fn test_standardize() {
        let out = standardize(&[vec![1.0, 5.0], vec![3.0, 5.0]]);
        assert!((out[0][0] + 1.0).abs() < 1e-9);
        assert!((out[1][0] - 1.0).abs() < 1e-9);
        // Constant column
        assert_eq!(out[0][1], 0.0);
        assert_eq!(out[1][1], 0.0);
    }

    #[test]
    fn test_standardize_empty() {
        assert!(standardize(&[]).is_empty());
    }

    #[test]
    fn test_sample_size_and_scaling() {
        let records: Vec<Vec<f64>> = (0..50).map(|i| vec![i as f64, (i * i) as f64]).collect();
        let s = sampler(records);

        let shard = s.sample(10).unwrap();
        assert_eq!(shard.len(), 10);
        assert_eq!(shard.to_text().lines().count(), 10);

        let rows = decrypt_rows(&s, &shard);
        for col in 0..2 {
            let mean: f64 = rows.iter().map(|r| r[col]).sum::<f64>() / 10.0;
            let var: f64 = rows.iter().map(|r| (r[col] - mean).powi(2)).sum::<f64>() / 10.0;
            assert!(mean.abs() < 1e-4);
            assert!((var - 1.0).abs() < 1e-3);
        }
    }

    #[test]
    fn test_sample_records_are_distinct() {
        // With a single feature equal to the record index, a sample of the
        // whole dataset must contain every record exactly once.
        let records: Vec<Vec<f64>> = (0..5).map(|i| vec![i as f64]).collect();
        let s = sampler(records);
        let shard = s.sample(5).unwrap();
        let mut values: Vec<f64> = decrypt_rows(&s, &shard).into_iter().map(|r| r[0]).collect();
        values.sort_by(|a, b| a.partial_cmp(b).unwrap());
        values.dedup_by(|a, b| (*a - *b).abs() < 1e-6);
        assert_eq!(values.len(), 5);
    }

    #[test]
    fn test_insufficient_data() {
        let s = sampler(vec![vec![1.0]; 3]);
        let err = s.sample(4).unwrap_err();
        assert!(matches!(
            err,
            Error::InsufficientData {
                requested: 4,
                available: 3
            }
        ));
    }

    #[test]
    fn test_empty_sample() {
        let s = sampler(vec![vec![1.0]; 3]);
        let shard = s.sample(0).unwrap();
        assert!(shard.is_empty());
        assert_eq!(shard.to_text(), "");
    }
}
