use std::io::BufRead;
use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::fileio::open_text;
use crate::types::Strand;

/// One BED interval. Name, score, and strand are optional columns; strand
/// defaults to `+` so stranded counting still has an orientation to match.
#[derive(Debug, Clone, PartialEq)]
pub struct BedRecord {
    pub chrom: String,
    pub start: u32,
    pub end: u32,
    pub name: String,
    pub score: String,
    pub strand: Strand,
}

/// Streaming BED reader (plain or gzipped).
pub struct BedFile {
    reader: Box<dyn BufRead>,
    source: String,
    line_no: u64,
}

impl BedFile {
    pub fn open(path: &Path) -> Result<BedFile> {
        Ok(BedFile {
            reader: open_text(path)?,
            source: path.display().to_string(),
            line_no: 0,
        })
    }

    pub fn from_reader(reader: Box<dyn BufRead>) -> BedFile {
        BedFile {
            reader,
            source: "<reader>".to_string(),
            line_no: 0,
        }
    }

    pub fn records(mut self) -> impl Iterator<Item = Result<BedRecord>> {
        std::iter::from_fn(move || loop {
            let mut buf = String::new();
            match self.reader.read_line(&mut buf) {
                Ok(0) => return None,
                Ok(_) => self.line_no += 1,
                Err(e) => return Some(Err(e.into())),
            }

            let line = buf.trim_end_matches(['\n', '\r']);
            if line.is_empty()
                || line.starts_with('#')
                || line.starts_with("track")
                || line.starts_with("browser")
            {
                continue;
            }

            return Some(
                parse_bed_line(line)
                    .with_context(|| format!("{} line {}", self.source, self.line_no)),
            );
        })
    }
}

fn parse_bed_line(line: &str) -> Result<BedRecord> {
    let cols: Vec<&str> = line.split('\t').collect();
    if cols.len() < 3 {
        bail!("BED line needs at least 3 columns: {line}");
    }

    let start: u32 = cols[1].parse().context("unparsable BED start")?;
    let end: u32 = cols[2].parse().context("unparsable BED end")?;
    if end < start {
        bail!("BED end before start: {line}");
    }

    Ok(BedRecord {
        chrom: cols[0].to_string(),
        start,
        end,
        name: cols.get(3).unwrap_or(&"").to_string(),
        score: cols.get(4).unwrap_or(&"0").to_string(),
        strand: match cols.get(5) {
            Some(&"-") => Strand::Minus,
            _ => Strand::Plus,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn read(data: &str) -> Vec<BedRecord> {
        BedFile::from_reader(Box::new(Cursor::new(data.to_string().into_bytes())))
            .records()
            .collect::<Result<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn six_column_record() {
        let recs = read("chr1\t100\t200\tpeak1\t960\t-\n");
        assert_eq!(
            recs,
            vec![BedRecord {
                chrom: "chr1".to_string(),
                start: 100,
                end: 200,
                name: "peak1".to_string(),
                score: "960".to_string(),
                strand: Strand::Minus,
            }]
        );
    }

    #[test]
    fn three_column_record_gets_defaults() {
        let recs = read("chr1\t100\t200\n");
        assert_eq!(recs[0].name, "");
        assert_eq!(recs[0].score, "0");
        assert_eq!(recs[0].strand, Strand::Plus);
    }

    #[test]
    fn track_and_comment_lines_are_skipped() {
        let recs = read("track name=test\n#c\nbrowser position chr1\nchr1\t1\t2\n");
        assert_eq!(recs.len(), 1);
    }

    #[test]
    fn malformed_line_is_an_error() {
        let it = BedFile::from_reader(Box::new(Cursor::new(b"chr1\t100\n".to_vec())));
        assert!(it.records().next().unwrap().is_err());
    }
}
