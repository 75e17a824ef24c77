use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use thiserror::Error;

pub const DEFAULT_SIZE: usize = 32;
/// Row 68 holds the first coefficient that no longer fits in a `u64`.
pub const MAX_SIZE: usize = 68;

#[derive(Error, Debug)]
pub enum CombError {
    #[error("C({n}, {k}) does not fit in 64 bits")]
    Overflow { n: usize, k: usize },
    #[error("I/O error writing table: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error writing table: {0}")]
    Json(#[from] serde_json::Error),
}

/// Square lookup table where `table[n][k]` is the binomial coefficient
/// `C(n, k)`, and zero whenever `k > n`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CombTable {
    table: Vec<Vec<u64>>,
}

impl CombTable {
    pub fn new(size: usize) -> Result<Self, CombError> {
        if size > MAX_SIZE {
            return Err(CombError::Overflow {
                n: MAX_SIZE,
                k: MAX_SIZE / 2,
            });
        }
        let mut table = Vec::with_capacity(size);
        for n in 0..size {
            let mut row = vec![0u64; size];
            row[0] = 1;
            for k in 1..=n {
                // Exact: C(n, k-1) * (n-k+1) is always divisible by k.
                let wide = u128::from(row[k - 1]) * (n - k + 1) as u128 / k as u128;
                row[k] = u64::try_from(wide).map_err(|_| CombError::Overflow { n, k })?;
            }
            table.push(row);
        }
        Ok(Self { table })
    }

    pub fn size(&self) -> usize {
        self.table.len()
    }

    pub fn get(&self, n: usize, k: usize) -> Option<u64> {
        self.table.get(n)?.get(k).copied()
    }

    pub fn rows(&self) -> &[Vec<u64>] {
        &self.table
    }

    pub fn write_json<W: Write>(&self, writer: W) -> Result<(), CombError> {
        serde_json::to_writer(writer, self)?;
        Ok(())
    }

    pub fn write_to_path(&self, path: &Path) -> Result<(), CombError> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }
        let mut writer = BufWriter::new(File::create(path)?);
        self.write_json(&mut writer)?;
        writer.flush()?;
        Ok(())
    }
}
