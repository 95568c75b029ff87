use std::io::BufRead;
use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::fileio::open_text;
use crate::types::Strand;

/// One repeat-catalog entry (RepeatMasker `.out` convention).
#[derive(Debug, Clone, PartialEq)]
pub struct RepeatRecord {
    pub family: String,
    pub member: String,
    pub chrom: String,
    pub start: u32,
    pub end: u32,
    pub strand: Strand,
}

/// Streaming reader for the whitespace-delimited repeat catalog. The
/// three-line header is skipped; coordinates are converted from the file's
/// 1-based starts to 0-based half-open.
pub struct RepeatReader {
    reader: Box<dyn BufRead>,
    source: String,
    line_no: u64,
}

impl RepeatReader {
    pub fn open(path: &Path) -> Result<RepeatReader> {
        Ok(RepeatReader {
            reader: open_text(path)?,
            source: path.display().to_string(),
            line_no: 0,
        })
    }

    pub fn from_reader(reader: Box<dyn BufRead>) -> RepeatReader {
        RepeatReader {
            reader,
            source: "<reader>".to_string(),
            line_no: 0,
        }
    }

    pub fn records(mut self) -> impl Iterator<Item = Result<RepeatRecord>> {
        std::iter::from_fn(move || loop {
            let mut buf = String::new();
            match self.reader.read_line(&mut buf) {
                Ok(0) => return None,
                Ok(_) => self.line_no += 1,
                Err(e) => return Some(Err(e.into())),
            }

            // 3-line header
            if self.line_no <= 3 {
                continue;
            }
            let line = buf.trim();
            if line.is_empty() {
                continue;
            }

            return Some(
                parse_repeat_line(line)
                    .with_context(|| format!("{} line {}", self.source, self.line_no)),
            );
        })
    }
}

fn parse_repeat_line(line: &str) -> Result<RepeatRecord> {
    let cols: Vec<&str> = line.split_whitespace().collect();
    if cols.len() < 11 {
        bail!("repeat line needs at least 11 columns: {line}");
    }

    let start_1: u32 = cols[5].parse().context("unparsable repeat start")?;
    let end: u32 = cols[6].parse().context("unparsable repeat end")?;
    if start_1 == 0 || end < start_1 {
        bail!("bad repeat coordinates: {line}");
    }

    Ok(RepeatRecord {
        family: cols[10].to_string(),
        member: cols[9].to_string(),
        chrom: cols[4].to_string(),
        start: start_1 - 1,
        end,
        strand: if cols[8] == "+" {
            Strand::Plus
        } else {
            Strand::Minus
        },
    })
}
