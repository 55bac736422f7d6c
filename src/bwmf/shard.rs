/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Row-sharded matrices.

use borsh::{BorshDeserialize, BorshSerialize};
use rand::Rng;

/// One row of a shard: the global index of the row, and one value per latent topic.
#[derive(Clone, Debug, PartialEq, BorshSerialize, BorshDeserialize)]
pub struct ShardRow {
    pub index: u64,
    pub values: Vec<f64>,
}

/// The rows of a matrix owned by one node.
#[derive(Clone, Debug, Default, PartialEq, BorshSerialize, BorshDeserialize)]
pub struct Shard {
    rows: Vec<ShardRow>,
}

impl Shard {
    /// Create a shard of `rows` zero-filled rows of `width` values each, whose global indices start at
    /// `start_index`.
    pub fn zeros(rows: usize, width: usize, start_index: u64) -> Shard {
        Self {
            rows: (0..rows as u64)
                .map(|offset| ShardRow {
                    index: start_index + offset,
                    values: vec![0.0; width],
                })
                .collect(),
        }
    }

    pub fn from_rows(rows: Vec<ShardRow>) -> Shard {
        Self { rows }
    }

    /// Overwrite every value of the shard with a value drawn uniformly from `[0, 1)`.
    pub fn random_fill<R: Rng>(&mut self, rng: &mut R) {
        for row in &mut self.rows {
            for value in &mut row.values {
                *value = rng.gen::<f64>();
            }
        }
    }

    pub fn rows(&self) -> &[ShardRow] {
        &self.rows
    }

    pub fn rows_mut(&mut self) -> &mut [ShardRow] {
        &mut self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Get the number of values per row, or `None` for an empty shard.
    pub fn width(&self) -> Option<usize> {
        self.rows.first().map(|row| row.values.len())
    }
}
