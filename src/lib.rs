pub mod cardinality;
pub mod cli;
pub mod compare;
pub mod completeness;
pub mod config;
pub mod correctness;
pub mod data;
pub mod distribution;
pub mod error;
pub mod export;
pub mod expr;
pub mod ingest;
pub mod io_utils;
pub mod report;
pub mod session;
pub mod summary;
pub mod table;

use std::{env, path::Path, sync::OnceLock};

use anyhow::Result;
use clap::Parser;
use log::{LevelFilter, debug};

use crate::{
    cli::{Cli, Commands, ReadOptions},
    config::ProfileConfig,
    session::Session,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("csv_quality", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Summary(args) => {
            let session = open_session(&args.input, &args.read)?;
            summary::execute(&session, &args)
        }
        Commands::Completeness(args) => {
            let session = open_session(&args.input, &args.read)?;
            completeness::execute(&session, &args)
        }
        Commands::Cardinality(args) => {
            let session = open_session(&args.input, &args.read)?;
            cardinality::execute(&session, &args)
        }
        Commands::Distribution(args) => {
            let session = open_session(&args.input, &args.read)?;
            distribution::execute(&session, &args)
        }
        Commands::Correctness(args) => {
            let session = match &args.input {
                Some(input) if !args.list_presets => open_session(input, &args.read)?,
                _ => Session::from_table(ingest::Table::new(Vec::new())?, ProfileConfig::default()),
            };
            correctness::execute(&session, &args)
        }
        Commands::Diff(args) => {
            let session = open_session(&args.old, &args.read)?;
            compare::execute(&session, &args)
        }
    }
}

fn open_session(input: &Path, read: &ReadOptions) -> Result<Session> {
    let config = ProfileConfig::load_or_default(read.config.as_deref())?;
    let encoding = io_utils::resolve_encoding(read.input_encoding.as_deref())?;
    debug!(
        "Opening {:?} (delimiter {}, encoding {})",
        input,
        read.delimiter
            .map(printable_delimiter)
            .unwrap_or_else(|| "auto".to_string()),
        encoding.name()
    );
    Session::open(input, config, read.delimiter, encoding)
}

pub(crate) fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b',' => ",".to_string(),
        b'\t' => "\\t".to_string(),
        b'\n' => "\\n".to_string(),
        other => (other as char).to_string(),
    }
}
