pub mod engine;
pub mod models;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::io::Write;

use anyhow::Result;
use clap::ValueEnum;

use crate::bam::AlignmentSource;
use crate::count::engine::{coverage_stats, fetch_reads};
use crate::types::Strand;

/// How multi-mapped reads (IH/NH > 1) contribute to a count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum MultiPolicy {
    /// Count the full read at every location it was assigned to.
    #[default]
    Complete,
    /// Count 1/hits at each location.
    Partial,
    /// Skip multi-mapped reads entirely.
    Ignore,
}

impl fmt::Display for MultiPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MultiPolicy::Complete => "complete",
            MultiPolicy::Partial => "partial",
            MultiPolicy::Ignore => "ignore",
        };
        write!(f, "{s}")
    }
}

/// Library-size normalization basis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Normalization {
    /// Total mapped reads in the alignment file.
    All,
    /// Sum of the counts this model produced.
    Mapped,
}

impl fmt::Display for Normalization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Normalization::All => "all",
            Normalization::Mapped => "mapped",
        };
        write!(f, "{s}")
    }
}

/// Counting configuration shared by every model.
#[derive(Debug, Clone, Default)]
pub struct CountOptions {
    pub stranded: bool,
    pub coverage: bool,
    pub uniq_only: bool,
    pub rpkm: bool,
    pub norm: Option<Normalization>,
    pub multiple: MultiPolicy,
    pub whitelist: Option<HashSet<String>>,
    pub blacklist: Option<HashSet<String>>,
    pub rev_read2: bool,
    pub start_only: bool,
}

/// Per-request callback: called once with the request's own count and read
/// set, returns the post-column sets for one output row per sub-region.
pub type RowCallback = Box<
    dyn FnOnce(
        &mut dyn AlignmentSource,
        f64,
        &HashMap<String, f64>,
        &CountOptions,
    ) -> Result<Vec<Vec<String>>>,
>;

/// One unit of counting work emitted by a model.
pub struct CountRequest {
    pub chrom: String,
    pub starts: Vec<u32>,
    pub ends: Vec<u32>,
    pub strand: Strand,
    /// Display prefix columns, matching the model's `headers()`.
    pub columns: Vec<String>,
    pub callback: Option<RowCallback>,
}

pub type RegionIter = Box<dyn Iterator<Item = Result<CountRequest>>>;

/// A source of regions to count.
///
/// `count` has a default implementation (the shared driver below); the
/// repeat-family model replaces it wholesale because its aggregation is
/// keyed by family, not by one region at a time.
pub trait RegionModel {
    fn name(&self) -> &'static str;
    fn source(&self) -> String;
    fn headers(&self) -> Vec<&'static str>;
    fn post_headers(&self) -> Option<Vec<&'static str>> {
        None
    }

    /// A lazy, finite, single-pass sequence of count requests. `refs` is
    /// the alignment source's reference list (the bin model derives its
    /// windows from it).
    fn regions(&self, refs: &[(String, u64)], opts: &CountOptions) -> Result<RegionIter>;

    fn count(
        &self,
        src: &mut dyn AlignmentSource,
        opts: &CountOptions,
        out: &mut dyn Write,
    ) -> Result<()> {
        default_count(self, src, opts, out)
    }
}

struct Row {
    columns: Vec<String>,
    length: u64,
    count: f64,
    coverage: Option<(f64, f64, f64)>,
    post: Vec<String>,
}

/// The shared counting driver: drain the model's requests, count each one,
/// then write the table (rows are buffered because the `mapped`
/// normalization basis is only known at the end).
fn default_count<M: RegionModel + ?Sized>(
    model: &M,
    src: &mut dyn AlignmentSource,
    opts: &CountOptions,
    out: &mut dyn Write,
) -> Result<()> {
    let refs = src.references().to_vec();

    let mut rows: Vec<Row> = Vec::new();
    let mut total_count = 0.0;

    for request in model.regions(&refs, opts)? {
        let request = request?;
        let length: u64 = request
            .starts
            .iter()
            .zip(request.ends.iter())
            .map(|(&s, &e)| (e.saturating_sub(s)) as u64)
            .sum();

        let strand = if opts.stranded {
            Some(request.strand)
        } else {
            None
        };

        let (count, reads) = fetch_reads(
            src,
            &request.chrom,
            strand,
            &request.starts,
            &request.ends,
            opts,
        )?;
        total_count += count;

        let coverage = if opts.coverage {
            Some(coverage_stats(
                src,
                &request.chrom,
                strand,
                &request.starts,
                &request.ends,
                opts,
            )?)
        } else {
            None
        };

        match request.callback {
            Some(callback) => {
                for post in callback(src, count, &reads, opts)? {
                    rows.push(Row {
                        columns: request.columns.clone(),
                        length,
                        count,
                        coverage,
                        post,
                    });
                }
            }
            None => rows.push(Row {
                columns: request.columns,
                length,
                count,
                coverage,
                post: Vec::new(),
            }),
        }
    }

    let basis = match opts.norm {
        None => None,
        Some(Normalization::All) => Some(
            src.mapped_count(opts.whitelist.as_ref(), opts.blacklist.as_ref())? as f64,
        ),
        Some(Normalization::Mapped) => Some(total_count),
    };
    let factor = basis.map(|b| b / 1_000_000.0);

    write_preamble(out, &src.source_name(), model.name(), &model.source(), opts, basis)?;

    write!(out, "#{}", model.headers().join("\t"))?;
    write!(out, "\tlength\tcount")?;
    if factor.is_some() {
        write!(out, "\tcount (CPM)")?;
        if opts.rpkm {
            write!(out, "\tRPKM")?;
        }
    }
    if opts.coverage {
        write!(out, "\tcoverage mean\tcoverage stdev\tcoverage median")?;
    }
    if let Some(post) = model.post_headers() {
        write!(out, "\t{}", post.join("\t"))?;
    }
    writeln!(out)?;

    for row in rows {
        write!(out, "{}", row.columns.join("\t"))?;
        write!(out, "\t{}\t{}", row.length, fmt_count(row.count))?;
        if let Some(factor) = factor {
            let cpm = row.count / factor;
            write!(out, "\t{}", cpm)?;
            if opts.rpkm {
                if row.length > 0 {
                    write!(out, "\t{}", cpm / (row.length as f64 / 1000.0))?;
                } else {
                    write!(out, "\t")?;
                }
            }
        }
        if let Some((mean, stdev, median)) = row.coverage {
            write!(out, "\t{mean:.2}\t{stdev:.2}\t{median:.2}")?;
        }
        if !row.post.is_empty() {
            write!(out, "\t{}", row.post.join("\t"))?;
        }
        writeln!(out)?;
    }

    Ok(())
}

/// `##`-commented preamble shared by the default driver and the
/// repeat-family override.
pub(crate) fn write_preamble(
    out: &mut dyn Write,
    input: &str,
    model_name: &str,
    model_source: &str,
    opts: &CountOptions,
    basis: Option<f64>,
) -> Result<()> {
    writeln!(out, "## input {input}")?;
    writeln!(out, "## model {model_name} {model_source}")?;
    writeln!(out, "## stranded {}", opts.stranded)?;
    writeln!(out, "## multiple {}", opts.multiple)?;
    if let (Some(norm), Some(basis)) = (opts.norm, basis) {
        writeln!(out, "## norm {} {}", norm, fmt_count(basis))?;
        writeln!(out, "## CPM-factor {}", basis / 1_000_000.0)?;
    }
    Ok(())
}

/// Integral counts print without a trailing `.0`; fractional (partial
/// multi-map) counts keep their full value.
pub(crate) fn fmt_count(count: f64) -> String {
    if count.fract() == 0.0 && count.abs() < 9e15 {
        format!("{}", count as i64)
    } else {
        format!("{}", count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fmt_count_trims_integral_values() {
        assert_eq!(fmt_count(0.0), "0");
        assert_eq!(fmt_count(12.0), "12");
        assert_eq!(fmt_count(1.25), "1.25");
    }

    #[test]
    fn cpm_factor_is_basis_over_a_million() {
        let basis = 2_500_000.0;
        let factor = basis / 1_000_000.0;
        assert_eq!(factor, 2.5);
        // a region with 10 reads at that depth
        assert_eq!(10.0 / factor, 4.0);
    }
}
