//! I/O utilities for reading uploads, resolving delimiters and writing exports.
//!
//! Inputs are decoded up front into a UTF-8 `String` (tables are profiled
//! in memory anyway), which lets the delimiter be sniffed from the header
//! line before the CSV reader is built.
//!
//! - **Delimiter resolution**: explicit override, then `.tsv` extension, then
//!   the most frequent candidate in the header line, then comma.
//! - **Encoding**: `encoding_rs_io` decodes the input, honouring a BOM and
//!   replacing invalid sequences; defaults to UTF-8.
//! - **stdin/stdout**: the `-` path convention routes through standard streams.

use std::{
    fs::File,
    io::{BufReader, BufWriter, Read, Write},
    path::Path,
};

use anyhow::{Context, Result, anyhow};
use csv::QuoteStyle;
use encoding_rs::{Encoding, UTF_8};
use encoding_rs_io::DecodeReaderBytesBuilder;

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';

const SNIFF_CANDIDATES: &[u8] = b",;\t|";

pub fn is_dash(path: &Path) -> bool {
    path == Path::new("-")
}

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    if let Some(value) = label {
        Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))
    } else {
        Ok(UTF_8)
    }
}

/// Picks the delimiter for `path`; `text` is the decoded file contents and is
/// only consulted when neither an override nor a `.tsv` extension applies.
pub fn resolve_input_delimiter(path: &Path, provided: Option<u8>, text: &str) -> u8 {
    if let Some(delimiter) = provided {
        return delimiter;
    }
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => DEFAULT_TSV_DELIMITER,
        _ => sniff_delimiter(text).unwrap_or(DEFAULT_CSV_DELIMITER),
    }
}

/// Counts candidate delimiters outside quotes on the first non-blank line.
pub fn sniff_delimiter(text: &str) -> Option<u8> {
    let header = text.lines().find(|line| !line.trim().is_empty())?;
    let mut counts = [0usize; SNIFF_CANDIDATES.len()];
    let mut in_quotes = false;
    for byte in header.bytes() {
        if byte == b'"' {
            in_quotes = !in_quotes;
            continue;
        }
        if in_quotes {
            continue;
        }
        if let Some(idx) = SNIFF_CANDIDATES.iter().position(|c| *c == byte) {
            counts[idx] += 1;
        }
    }
    // Comma is first in the candidate list, so it wins ties.
    let (best, count) = counts
        .iter()
        .enumerate()
        .fold((0usize, 0usize), |best, (idx, count)| {
            if *count > best.1 { (idx, *count) } else { best }
        });
    (count > 0).then_some(SNIFF_CANDIDATES[best])
}

pub fn read_input_text(path: &Path, encoding: &'static Encoding) -> Result<String> {
    let source: Box<dyn Read> = if is_dash(path) {
        Box::new(std::io::stdin().lock())
    } else {
        Box::new(BufReader::new(
            File::open(path).with_context(|| format!("Opening input file {path:?}"))?,
        ))
    };
    let mut decoder = DecodeReaderBytesBuilder::new()
        .encoding(Some(encoding))
        .bom_override(true)
        .strip_bom(true)
        .build(source);
    let mut text = String::new();
    decoder
        .read_to_string(&mut text)
        .with_context(|| format!("Decoding input {path:?} as {}", encoding.name()))?;
    Ok(text)
}

/// Builds a reader that tolerates ragged rows so ingestion can report the
/// offending line itself instead of surfacing a bare csv error.
pub fn open_csv_reader<R>(reader: R, delimiter: u8) -> csv::Reader<R>
where
    R: Read,
{
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(true)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(true);
    builder.from_reader(reader)
}

pub fn open_csv_writer(path: Option<&Path>, delimiter: u8) -> Result<csv::Writer<Box<dyn Write>>> {
    let writer: Box<dyn Write> = match path {
        Some(p) if !is_dash(p) => Box::new(BufWriter::new(
            File::create(p).with_context(|| format!("Creating output file {p:?}"))?,
        )),
        _ => Box::new(std::io::stdout()),
    };

    let mut builder = csv::WriterBuilder::new();
    builder
        .delimiter(delimiter)
        .quote_style(QuoteStyle::Necessary)
        .double_quote(true);
    Ok(builder.from_writer(writer))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniff_prefers_most_frequent_candidate() {
        assert_eq!(sniff_delimiter("a;b;c\n1;2;3\n"), Some(b';'));
        assert_eq!(sniff_delimiter("a\tb\n"), Some(b'\t'));
        assert_eq!(sniff_delimiter("\n\nid|name\n"), Some(b'|'));
        assert_eq!(sniff_delimiter("single\n1\n"), None);
    }

    #[test]
    fn sniff_ignores_quoted_delimiters() {
        assert_eq!(sniff_delimiter("\"a;b;c\",d,e\n"), Some(b','));
    }

    #[test]
    fn override_and_extension_win_over_sniffing() {
        let text = "a;b\n1;2\n";
        assert_eq!(
            resolve_input_delimiter(Path::new("data.csv"), Some(b','), text),
            b','
        );
        assert_eq!(
            resolve_input_delimiter(Path::new("data.TSV"), None, text),
            b'\t'
        );
        assert_eq!(resolve_input_delimiter(Path::new("data.csv"), None, text), b';');
        assert_eq!(
            resolve_input_delimiter(Path::new("data.csv"), None, "single\n"),
            b','
        );
    }

    #[test]
    fn resolve_encoding_rejects_unknown_labels() {
        assert_eq!(resolve_encoding(None).unwrap(), UTF_8);
        assert!(resolve_encoding(Some("windows-1252")).is_ok());
        assert!(resolve_encoding(Some("not-an-encoding")).is_err());
    }
}
