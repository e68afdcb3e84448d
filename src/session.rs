//! Per-invocation context: the loaded dataset plus the resolved settings.
//!
//! Commands receive a `Session` instead of reaching for process-wide state,
//! so a second table (the newer snapshot of a diff) is loaded with exactly
//! the same options as the first.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use encoding_rs::Encoding;
use log::{debug, info};

use crate::{
    config::ProfileConfig,
    ingest::{self, ColumnType, IngestOptions, Ingested, Table},
};

#[derive(Debug)]
pub struct Session {
    source: PathBuf,
    ingested: Ingested,
    config: ProfileConfig,
    options: IngestOptions,
}

impl Session {
    pub fn open(
        path: &Path,
        config: ProfileConfig,
        delimiter: Option<u8>,
        encoding: &'static Encoding,
    ) -> Result<Self> {
        let options = IngestOptions {
            delimiter,
            encoding,
            missing_tokens: config.ingest.missing_tokens.clone(),
            inference: config.ingest.inference.clone(),
        };
        let ingested = ingest::read_table(path, &options)
            .with_context(|| format!("Loading dataset {path:?}"))?;
        info!(
            "Loaded {} row(s) x {} column(s) from {:?}",
            ingested.table.row_count(),
            ingested.table.column_count(),
            path
        );
        if !ingested.dropped_columns.is_empty() {
            debug!("Dropped columns: {:?}", ingested.dropped_columns);
        }
        Ok(Self {
            source: path.to_path_buf(),
            ingested,
            config,
            options,
        })
    }

    /// Wraps an in-memory table; used by tests and benchmarks.
    pub fn from_table(table: Table, config: ProfileConfig) -> Self {
        let options = IngestOptions {
            missing_tokens: config.ingest.missing_tokens.clone(),
            inference: config.ingest.inference.clone(),
            ..IngestOptions::default()
        };
        Self {
            source: PathBuf::from("-"),
            ingested: Ingested {
                table,
                dropped_columns: Vec::new(),
                blank_rows: 0,
                delimiter: b',',
            },
            config,
            options,
        }
    }

    /// Reads another file with this session's ingest options.
    pub fn load_companion(&self, path: &Path) -> Result<Ingested> {
        ingest::read_table(path, &self.options)
            .with_context(|| format!("Loading dataset {path:?}"))
    }

    pub fn table(&self) -> &Table {
        &self.ingested.table
    }

    pub fn config(&self) -> &ProfileConfig {
        &self.config
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn source_name(&self) -> String {
        self.source
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "stdin".to_string())
    }

    pub fn delimiter(&self) -> u8 {
        self.ingested.delimiter
    }

    pub fn dropped_columns(&self) -> &[String] {
        &self.ingested.dropped_columns
    }

    pub fn blank_rows(&self) -> usize {
        self.ingested.blank_rows
    }

    /// Columns that were read as something other than plain text.
    pub fn conversions(&self) -> Vec<(String, ColumnType)> {
        self.table()
            .columns()
            .iter()
            .filter(|c| c.column_type != ColumnType::Text)
            .map(|c| (c.name.clone(), c.column_type))
            .collect()
    }
}
