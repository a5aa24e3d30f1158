//! Numeric CSV flat files (header row + one record per line).
//!
//! These are the intermediate files the pipeline hands from one unit to the
//! next, plus the embedded reference datasets. Every write goes through
//! [`write_atomic`] so a rerun replaces a file in one step.

use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use tracing::debug;

use crate::error::{ArborError, Result};

/// A parsed numeric CSV file
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub header: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

impl Table {
    pub fn new(header: Vec<String>, rows: Vec<Vec<f64>>) -> Result<Self> {
        if let Some((idx, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != header.len())
        {
            return Err(ArborError::Dataset(format!(
                "row {idx} has {} values, header has {}",
                row.len(),
                header.len()
            )));
        }
        Ok(Self { header, rows })
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.header.iter().position(|h| h == name)
    }

    /// First header name out of `candidates` that is present
    pub fn find_column(&self, candidates: &[&str]) -> Option<usize> {
        candidates.iter().find_map(|c| self.column_index(c))
    }

    pub fn column(&self, name: &str) -> Result<Vec<f64>> {
        let idx = self
            .column_index(name)
            .ok_or_else(|| ArborError::Dataset(format!("missing column {name}")))?;
        Ok(self.rows.iter().map(|r| r[idx]).collect())
    }

    /// Project the table onto `names`, in that order
    pub fn select(&self, names: &[String]) -> Result<Vec<Vec<f64>>> {
        let indices = names
            .iter()
            .map(|n| {
                self.column_index(n)
                    .ok_or_else(|| ArborError::Dataset(format!("missing column {n}")))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(self
            .rows
            .iter()
            .map(|r| indices.iter().map(|&i| r[i]).collect())
            .collect())
    }

    /// Every column except `excluded`, keeping header order
    pub fn drop_columns(&self, excluded: &[&str]) -> Result<Table> {
        let kept: Vec<String> = self
            .header
            .iter()
            .filter(|h| !excluded.contains(&h.as_str()))
            .cloned()
            .collect();
        let rows = self.select(&kept)?;
        Table::new(kept, rows)
    }
}

fn clean_cell(cell: &str) -> &str {
    cell.trim().trim_matches('"')
}

/// Parse numeric CSV content. `origin` only feeds error messages.
pub fn parse_numeric_csv(content: &str, origin: &str) -> Result<Table> {
    let mut lines = content
        .lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty());

    let (_, header_line) = lines
        .next()
        .ok_or_else(|| ArborError::Dataset(format!("{origin}: empty file")))?;
    let header: Vec<String> = header_line
        .split(',')
        .map(|h| clean_cell(h).to_string())
        .collect();

    let mut rows = Vec::new();
    for (i, line) in lines {
        let parts: Vec<&str> = line.split(',').collect();
        if parts.len() != header.len() {
            return Err(ArborError::Dataset(format!(
                "{origin}:{}: expected {} columns, found {}",
                i + 1,
                header.len(),
                parts.len()
            )));
        }
        let row = parts
            .iter()
            .zip(&header)
            .map(|(cell, name)| {
                let cell = clean_cell(cell);
                cell.parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| {
                        ArborError::Dataset(format!(
                            "{origin}:{}: column {name} has non-numeric value {cell:?}",
                            i + 1
                        ))
                    })
            })
            .collect::<Result<Vec<f64>>>()?;
        rows.push(row);
    }

    Ok(Table { header, rows })
}

/// Read a numeric CSV file from disk
pub fn read_numeric_csv<P: AsRef<Path>>(path: P) -> Result<Table> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut content = String::new();
    for line in reader.lines() {
        content.push_str(&line?);
        content.push('\n');
    }
    let table = parse_numeric_csv(&content, &path.display().to_string())?;
    debug!(path = %path.display(), rows = table.rows.len(), "read flat file");
    Ok(table)
}

/// Write a numeric CSV file atomically
pub fn write_numeric_csv<P: AsRef<Path>>(path: P, table: &Table) -> Result<()> {
    let mut out = String::with_capacity(table.rows.len() * 16 * table.header.len().max(1));
    out.push_str(&table.header.join(","));
    out.push('\n');
    for row in &table.rows {
        let line = row
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(",");
        out.push_str(&line);
        out.push('\n');
    }
    write_atomic(path.as_ref(), out.as_bytes())?;
    debug!(path = %path.as_ref().display(), rows = table.rows.len(), "wrote flat file");
    Ok(())
}

/// Write `bytes` to a sibling temp file, then rename it over `path`.
///
/// Readers see either the previous content or the new content, never a
/// partial write. Two concurrent writers still race; the last rename wins.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file_name = path
        .file_name()
        .ok_or_else(|| ArborError::Internal(format!("{} has no file name", path.display())))?
        .to_string_lossy();
    let tmp = path.with_file_name(format!(".{file_name}.{}.tmp", uuid::Uuid::new_v4()));

    let write = || -> std::io::Result<()> {
        let mut file = File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        std::fs::rename(&tmp, path)
    };
    write().map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        ArborError::Io(e)
    })
}
