use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rust_htslib::bam::record::{Aux, Cigar};
use rust_htslib::bam::{self, FetchDefinition, Read};

use crate::types::{Span, Strand};

/// One aligned read, reduced to what the counting engine needs.
#[derive(Debug, Clone)]
pub struct ReadAlignment {
    pub name: String,
    pub strand: Strand,
    pub is_secondary: bool,
    pub is_read2: bool,
    /// Reference-aligned blocks (M/=/X/D runs, split at N skips).
    pub blocks: Vec<Span>,
    /// Reported alignment count (IH/NH tag), 1 when absent.
    pub hits: u32,
}

impl ReadAlignment {
    /// Leftmost aligned position.
    pub fn start(&self) -> u32 {
        self.blocks.first().map(|b| b.start).unwrap_or(0)
    }
}

/// Narrow interface over an alignment file.
///
/// `fetch` returns reads whose reference span overlaps [start, end). This
/// includes junction reads that skip over the interval entirely, which is
/// what the exclusion accounting relies on.
pub trait AlignmentSource {
    fn source_name(&self) -> String;

    /// Reference names and lengths, in file order.
    fn references(&self) -> &[(String, u64)];

    fn has_reference(&self, chrom: &str) -> bool {
        self.references().iter().any(|(name, _)| name == chrom)
    }

    fn fetch(&mut self, chrom: &str, start: u32, end: u32) -> Result<Vec<ReadAlignment>>;

    /// Total mapped reads in the file, with multi-mapped reads counted once
    /// by name and the optional name filters applied.
    fn mapped_count(
        &mut self,
        whitelist: Option<&HashSet<String>>,
        blacklist: Option<&HashSet<String>>,
    ) -> Result<u64>;
}

/// `AlignmentSource` over an indexed BAM file.
pub struct BamSource {
    path: PathBuf,
    reader: bam::IndexedReader,
    refs: Vec<(String, u64)>,
}

impl BamSource {
    pub fn open(path: &Path) -> Result<BamSource> {
        let reader = bam::IndexedReader::from_path(path)
            .with_context(|| format!("opening alignment file {}", path.display()))?;

        let header = reader.header();
        let mut refs = Vec::with_capacity(header.target_count() as usize);
        for (tid, name) in header.target_names().iter().enumerate() {
            let len = header
                .target_len(tid as u32)
                .with_context(|| format!("missing length for reference #{tid}"))?;
            refs.push((String::from_utf8_lossy(name).into_owned(), len));
        }

        Ok(BamSource {
            path: path.to_path_buf(),
            reader,
            refs,
        })
    }
}

impl AlignmentSource for BamSource {
    fn source_name(&self) -> String {
        self.path.display().to_string()
    }

    fn references(&self) -> &[(String, u64)] {
        &self.refs
    }

    fn fetch(&mut self, chrom: &str, start: u32, end: u32) -> Result<Vec<ReadAlignment>> {
        self.reader
            .fetch((chrom, start as i64, end as i64))
            .with_context(|| format!("fetching {chrom}:{start}-{end}"))?;

        let mut out = Vec::new();
        for record in self.reader.records() {
            let record = record?;
            if record.is_unmapped() {
                continue;
            }
            out.push(convert(&record));
        }
        Ok(out)
    }

    fn mapped_count(
        &mut self,
        whitelist: Option<&HashSet<String>>,
        blacklist: Option<&HashSet<String>>,
    ) -> Result<u64> {
        self.reader
            .fetch(FetchDefinition::All)
            .context("scanning alignment file for mapped-read count")?;

        let mut single = 0u64;
        let mut multireads: HashSet<String> = HashSet::new();

        for record in self.reader.records() {
            let record = record?;
            if record.is_unmapped() || record.is_secondary() {
                continue;
            }
            let name = String::from_utf8_lossy(record.qname()).into_owned();
            if let Some(black) = blacklist {
                if black.contains(&name) {
                    continue;
                }
            }
            if let Some(white) = whitelist {
                if !white.contains(&name) {
                    continue;
                }
            }
            if hit_count(&record) > 1 {
                multireads.insert(name);
            } else {
                single += 1;
            }
        }

        Ok(single + multireads.len() as u64)
    }
}

fn convert(record: &bam::Record) -> ReadAlignment {
    ReadAlignment {
        name: String::from_utf8_lossy(record.qname()).into_owned(),
        strand: if record.is_reverse() {
            Strand::Minus
        } else {
            Strand::Plus
        },
        is_secondary: record.is_secondary(),
        is_read2: record.is_last_in_template(),
        blocks: cigar_blocks(record),
        hits: hit_count(record),
    }
}

/// Reference-aligned blocks from the cigar: M/=/X/D extend the current
/// block, N closes it, everything else consumes no reference.
fn cigar_blocks(record: &bam::Record) -> Vec<Span> {
    let mut blocks = Vec::new();
    let mut start = record.pos().max(0) as u32;
    let mut end = start;

    for op in record.cigar().iter() {
        match *op {
            Cigar::Match(len) | Cigar::Equal(len) | Cigar::Diff(len) | Cigar::Del(len) => {
                end += len;
            }
            Cigar::RefSkip(len) => {
                if end > start {
                    blocks.push(Span::new(start, end));
                }
                start = end + len;
                end = start;
            }
            Cigar::Ins(_) | Cigar::SoftClip(_) | Cigar::HardClip(_) | Cigar::Pad(_) => {}
        }
    }
    if end > start {
        blocks.push(Span::new(start, end));
    }

    blocks
}

fn hit_count(record: &bam::Record) -> u32 {
    for tag in [b"IH", b"NH"] {
        if let Ok(aux) = record.aux(tag) {
            match aux {
                Aux::U8(v) => return v as u32,
                Aux::U16(v) => return v as u32,
                Aux::U32(v) => return v,
                Aux::I8(v) if v > 0 => return v as u32,
                Aux::I16(v) if v > 0 => return v as u32,
                Aux::I32(v) if v > 0 => return v as u32,
                _ => {}
            }
        }
    }
    1
}
