use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{bail, Result};

use crate::annotation::GeneSet;
use crate::bam::AlignmentSource;
use crate::bed::BedFile;
use crate::count::engine::{fetch_reads, fetch_reads_excluding};
use crate::count::{
    fmt_count, write_preamble, CountOptions, CountRequest, Normalization, RegionIter,
    RegionModel, RowCallback,
};
use crate::model::{Gene, Region};
use crate::progress;
use crate::repeats::RepeatReader;
use crate::types::{Span, Strand};

fn gene_columns(gene: &Gene) -> Vec<String> {
    vec![
        gene.gene_name.clone(),
        gene.gene_id.clone(),
        gene.isoform_id.clone(),
        gene.chrom.clone(),
        gene.strand.to_string(),
        gene.start.to_string(),
        gene.end.to_string(),
    ]
}

/// Whole-gene counting over the segmented exonic regions.
pub struct GtfModel {
    pub path: PathBuf,
    pub cache: bool,
}

impl RegionModel for GtfModel {
    fn name(&self) -> &'static str {
        "gtf"
    }

    fn source(&self) -> String {
        self.path.display().to_string()
    }

    fn headers(&self) -> Vec<&'static str> {
        vec!["gene", "geneid", "isoid", "chrom", "strand", "txstart", "txend"]
    }

    fn regions(&self, _refs: &[(String, u64)], _opts: &CountOptions) -> Result<RegionIter> {
        let set = GeneSet::from_path(&self.path, self.cache)?;
        let order = set.ordered_indices();

        let pb = progress::bar(order.len() as u64);
        let msg = pb.clone();

        let iter = order.into_iter().map(move |i| -> Result<CountRequest> {
            let gene = set.gene(i);
            msg.set_message(gene.gene_name.clone());

            // the regions already cover every exon of every transcript
            let (starts, ends): (Vec<u32>, Vec<u32>) =
                gene.regions().map(|(_, r)| (r.start, r.end)).unzip();

            Ok(CountRequest {
                chrom: gene.chrom.clone(),
                starts,
                ends,
                strand: gene.strand,
                columns: gene_columns(gene),
                callback: None,
            })
        });

        Ok(Box::new(progress::wrap(iter, pb)))
    }
}

/// Exon-level counting: one output row per constant/alternative sub-region,
/// with inclusion/exclusion splicing evidence.
pub struct ExonModel {
    pub path: PathBuf,
    pub cache: bool,
}

impl RegionModel for ExonModel {
    fn name(&self) -> &'static str {
        "exon"
    }

    fn source(&self) -> String {
        self.path.display().to_string()
    }

    fn headers(&self) -> Vec<&'static str> {
        vec!["gene", "geneid", "isoid", "chrom", "strand", "txstart", "txend"]
    }

    fn post_headers(&self) -> Option<Vec<&'static str>> {
        Some(vec![
            "regionstart",
            "regionend",
            "const_count",
            "region_num",
            "const_alt",
            "count",
            "excl_count",
            "incl_pct",
            "excl_pct",
            "alt-index",
        ])
    }

    fn regions(&self, _refs: &[(String, u64)], _opts: &CountOptions) -> Result<RegionIter> {
        let set = GeneSet::from_path(&self.path, self.cache)?;
        let order = set.ordered_indices();

        let pb = progress::bar(order.len() as u64);
        let msg = pb.clone();

        let iter = order.into_iter().map(move |i| -> Result<CountRequest> {
            let gene = set.gene(i);
            msg.set_message(gene.gene_name.clone());

            let regions: Vec<(usize, Region)> =
                gene.regions().map(|(n, r)| (n, r.clone())).collect();
            let (starts, ends): (Vec<u32>, Vec<u32>) =
                regions.iter().map(|(_, r)| (r.start, r.end)).unzip();

            Ok(CountRequest {
                chrom: gene.chrom.clone(),
                starts,
                ends,
                strand: gene.strand,
                columns: gene_columns(gene),
                callback: Some(exon_callback(gene, regions)),
            })
        });

        Ok(Box::new(progress::wrap(iter, pb)))
    }
}

/// Build the per-gene callback that expands one count request into one
/// output row per sub-region.
fn exon_callback(gene: &Gene, regions: Vec<(usize, Region)>) -> RowCallback {
    let chrom = gene.chrom.clone();
    let gene_strand = gene.strand;

    // Contiguous groups of constant regions. Counting each group as one
    // multi-interval query catches junction reads spanning two constant
    // exons.
    let mut const_spans: Vec<Vec<Span>> = Vec::new();
    let mut last_const = false;
    for (_, region) in &regions {
        if region.constant {
            if !last_const {
                const_spans.push(Vec::new());
            }
            if let Some(group) = const_spans.last_mut() {
                group.push(region.span());
            }
        }
        last_const = region.constant;
    }

    Box::new(move |src, _common_count, common_reads, opts| {
        let strand = if opts.stranded { Some(gene_strand) } else { None };

        let mut const_count = 0.0;
        for group in &const_spans {
            let (starts, ends): (Vec<u32>, Vec<u32>) =
                group.iter().map(|s| (s.start, s.end)).unzip();
            let (count, _) = fetch_reads(src, &chrom, strand, &starts, &ends, opts)?;
            const_count += count;
        }

        let mut rows = Vec::with_capacity(regions.len());
        for (num, region) in &regions {
            let (mut count, mut reads) =
                fetch_reads(src, &chrom, strand, &[region.start], &[region.end], opts)?;
            let (excl_count, excl_reads) =
                fetch_reads_excluding(src, &chrom, strand, region.start, region.end, opts)?;

            // a read on both sides is inclusion/exclusion double counting;
            // drop it from the inclusion side at the weight it contributed
            for name in excl_reads.keys() {
                if let Some(weight) = reads.remove(name) {
                    count -= weight;
                }
            }

            let neither = common_reads
                .keys()
                .filter(|n| !reads.contains_key(n.as_str()) && !excl_reads.contains_key(n.as_str()))
                .count();

            let alt_index = if neither > 0 {
                ((count - excl_count) / neither as f64).to_string()
            } else {
                String::new()
            };

            let (incl_pct, excl_pct) = if const_count > 0.0 {
                (
                    (count / const_count).to_string(),
                    (excl_count / const_count).to_string(),
                )
            } else {
                (String::new(), String::new())
            };

            rows.push(vec![
                region.start.to_string(),
                region.end.to_string(),
                fmt_count(const_count),
                num.to_string(),
                if region.constant { "const" } else { "alt" }.to_string(),
                fmt_count(count),
                fmt_count(excl_count),
                incl_pct,
                excl_pct,
                alt_index,
            ]);
        }

        Ok(rows)
    })
}

/// Fixed-width windows over every reference sequence.
pub struct BinModel {
    pub binsize: u32,
}

impl RegionModel for BinModel {
    fn name(&self) -> &'static str {
        "bin"
    }

    fn source(&self) -> String {
        self.binsize.to_string()
    }

    fn headers(&self) -> Vec<&'static str> {
        vec!["chrom", "start", "end", "strand"]
    }

    fn regions(&self, refs: &[(String, u64)], opts: &CountOptions) -> Result<RegionIter> {
        if self.binsize == 0 {
            bail!("bin size must be greater than zero");
        }
        let binsize = self.binsize;
        let stranded = opts.stranded;

        let per_strand = if stranded { 2u64 } else { 1 };
        let total: u64 = refs
            .iter()
            .map(|(_, len)| (len + binsize as u64 - 1) / binsize as u64 * per_strand)
            .sum();
        let pb = progress::bar(total);

        let refs = refs.to_vec();
        let iter = refs.into_iter().flat_map(move |(chrom, len)| {
            let len = len.min(u32::MAX as u64) as u32;
            let nbins = ((len as u64 + binsize as u64 - 1) / binsize as u64) as u32;

            (0..nbins).flat_map(move |bin| {
                let start = bin * binsize;
                let end = (start as u64 + binsize as u64).min(len as u64) as u32;

                let mut requests: Vec<Result<CountRequest>> =
                    vec![Ok(bin_request(&chrom, start, end, Strand::Plus))];
                if stranded {
                    requests.push(Ok(bin_request(&chrom, start, end, Strand::Minus)));
                }
                requests
            })
        });

        Ok(Box::new(progress::wrap(iter, pb)))
    }
}

fn bin_request(chrom: &str, start: u32, end: u32, strand: Strand) -> CountRequest {
    CountRequest {
        chrom: chrom.to_string(),
        starts: vec![start],
        ends: vec![end],
        strand,
        columns: vec![
            chrom.to_string(),
            start.to_string(),
            end.to_string(),
            strand.to_string(),
        ],
        callback: None,
    }
}

/// Arbitrary intervals from a BED file.
pub struct BedModel {
    pub path: PathBuf,
}

impl RegionModel for BedModel {
    fn name(&self) -> &'static str {
        "bed"
    }

    fn source(&self) -> String {
        self.path.display().to_string()
    }

    fn headers(&self) -> Vec<&'static str> {
        vec!["chrom", "start", "end", "name", "score", "strand"]
    }

    fn regions(&self, _refs: &[(String, u64)], _opts: &CountOptions) -> Result<RegionIter> {
        let bed = BedFile::open(&self.path)?;
        let pb = progress::spinner();

        let iter = bed.records().map(|rec| {
            rec.map(|r| CountRequest {
                starts: vec![r.start],
                ends: vec![r.end],
                strand: r.strand,
                columns: vec![
                    r.chrom.clone(),
                    r.start.to_string(),
                    r.end.to_string(),
                    r.name,
                    r.score,
                    r.strand.to_string(),
                ],
                chrom: r.chrom,
                callback: None,
            })
        });

        Ok(Box::new(progress::wrap(iter, pb)))
    }
}

/// Per-element rows from a repeat catalog.
pub struct RepeatModel {
    pub path: PathBuf,
}

impl RegionModel for RepeatModel {
    fn name(&self) -> &'static str {
        "repeat"
    }

    fn source(&self) -> String {
        self.path.display().to_string()
    }

    fn headers(&self) -> Vec<&'static str> {
        vec!["family", "repeat", "chrom", "start", "end", "strand"]
    }

    fn regions(&self, _refs: &[(String, u64)], _opts: &CountOptions) -> Result<RegionIter> {
        let reader = RepeatReader::open(&self.path)?;
        let pb = progress::spinner();

        let iter = reader.records().map(|rec| {
            rec.map(|r| CountRequest {
                starts: vec![r.start],
                ends: vec![r.end],
                strand: r.strand,
                columns: vec![
                    r.family,
                    r.member,
                    r.chrom.clone(),
                    r.start.to_string(),
                    r.end.to_string(),
                    r.strand.to_string(),
                ],
                chrom: r.chrom,
                callback: None,
            })
        });

        Ok(Box::new(progress::wrap(iter, pb)))
    }
}

/// Family-level aggregation across non-contiguous repeat locations.
///
/// Counting is keyed by (family, member) and (family, "*") instead of one
/// region at a time, so the shared driver does not apply; `count` is
/// replaced wholesale.
pub struct RepeatFamilyModel {
    pub path: PathBuf,
}

impl RegionModel for RepeatFamilyModel {
    fn name(&self) -> &'static str {
        "repeatfam"
    }

    fn source(&self) -> String {
        self.path.display().to_string()
    }

    fn headers(&self) -> Vec<&'static str> {
        vec!["family", "repeat"]
    }

    fn regions(&self, _refs: &[(String, u64)], _opts: &CountOptions) -> Result<RegionIter> {
        let reader = RepeatReader::open(&self.path)?;

        let iter = reader.records().map(|rec| {
            rec.map(|r| CountRequest {
                starts: vec![r.start],
                ends: vec![r.end],
                strand: r.strand,
                columns: vec![r.family, r.member],
                chrom: r.chrom,
                callback: None,
            })
        });

        Ok(Box::new(iter))
    }

    fn count(
        &self,
        src: &mut dyn AlignmentSource,
        opts: &CountOptions,
        out: &mut dyn Write,
    ) -> Result<()> {
        if opts.coverage {
            bail!("coverage calculations are not supported with repeat family models");
        }

        // (family, member) -> (summed size, summed count); member "*" is the
        // family-level aggregate.
        let mut repeats: BTreeMap<(String, String), (u64, f64)> = BTreeMap::new();
        let mut total_count = 0.0;

        for rec in RepeatReader::open(&self.path)?.records() {
            let rec = rec?;

            repeats
                .entry((rec.family.clone(), rec.member.clone()))
                .or_insert((0, 0.0));
            repeats
                .entry((rec.family.clone(), "*".to_string()))
                .or_insert((0, 0.0));

            if !src.has_reference(&rec.chrom) {
                continue;
            }

            let strand = if opts.stranded { Some(rec.strand) } else { None };
            let (count, _) =
                fetch_reads(src, &rec.chrom, strand, &[rec.start], &[rec.end], opts)?;
            let size = (rec.end - rec.start) as u64;

            for key in [
                (rec.family.clone(), "*".to_string()),
                (rec.family, rec.member),
            ] {
                if let Some(entry) = repeats.get_mut(&key) {
                    entry.0 += size;
                    entry.1 += count;
                }
            }
            total_count += count;
        }

        let basis = match opts.norm {
            None => None,
            Some(Normalization::All) => Some(src.mapped_count(
                opts.whitelist.as_ref(),
                opts.blacklist.as_ref(),
            )? as f64),
            Some(Normalization::Mapped) => Some(total_count),
        };
        let factor = basis.map(|b| b / 1_000_000.0);

        write_preamble(out, &src.source_name(), self.name(), &self.source(), opts, basis)?;

        write!(out, "#{}", self.headers().join("\t"))?;
        write!(out, "\tlength\tcount")?;
        if factor.is_some() {
            write!(out, "\tcount (CPM)")?;
            if opts.rpkm {
                write!(out, "\tRPKM")?;
            }
        }
        writeln!(out)?;

        // family-level rows first, then members
        for family_level in [true, false] {
            for ((family, member), (size, count)) in &repeats {
                if family_level != (member == "*") {
                    continue;
                }
                write!(out, "{family}\t{member}\t{size}\t{}", fmt_count(*count))?;
                if let Some(factor) = factor {
                    let cpm = count / factor;
                    write!(out, "\t{cpm}")?;
                    if opts.rpkm {
                        if *size > 0 {
                            write!(out, "\t{}", cpm / (*size as f64 / 1000.0))?;
                        } else {
                            write!(out, "\t")?;
                        }
                    }
                }
                writeln!(out)?;
            }
        }

        Ok(())
    }
}
