use std::collections::HashMap;

use anyhow::Result;

use crate::bam::{AlignmentSource, ReadAlignment};
use crate::count::{CountOptions, MultiPolicy};
use crate::types::Strand;

/// Count reads overlapping the union of sub-intervals.
///
/// Reads are de-duplicated by query name across sub-intervals, and each
/// contributes a weight set by the multi-mapping policy: 1 (`complete`),
/// 1/hits (`partial`), or nothing at all for multi-mapped reads under
/// `ignore`. Returns the total weight plus the name -> weight map so callers
/// can subtract individual reads at the weight they contributed.
///
/// Unknown chromosomes yield zero counts.
pub fn fetch_reads(
    src: &mut dyn AlignmentSource,
    chrom: &str,
    strand: Option<Strand>,
    starts: &[u32],
    ends: &[u32],
    opts: &CountOptions,
) -> Result<(f64, HashMap<String, f64>)> {
    let mut reads: HashMap<String, f64> = HashMap::new();
    let mut count = 0.0;

    if !src.has_reference(chrom) {
        return Ok((count, reads));
    }

    for (&start, &end) in starts.iter().zip(ends.iter()) {
        for read in src.fetch(chrom, start, end)? {
            if !passes_name_filters(&read.name, opts) {
                continue;
            }
            if opts.uniq_only && read.hits > 1 {
                continue;
            }
            if let Some(required) = strand {
                if !required.matches(effective_strand(&read, opts.rev_read2)) {
                    continue;
                }
            }
            if opts.start_only && !(start <= read.start() && read.start() < end) {
                continue;
            }
            if reads.contains_key(&read.name) {
                continue;
            }

            let weight = match opts.multiple {
                MultiPolicy::Complete => 1.0,
                MultiPolicy::Partial => 1.0 / read.hits.max(1) as f64,
                MultiPolicy::Ignore => {
                    if read.hits > 1 {
                        continue;
                    }
                    1.0
                }
            };

            count += weight;
            reads.insert(read.name, weight);
        }
    }

    Ok((count, reads))
}

/// Count reads fetched over [start, end) none of whose aligned blocks fall
/// inside it: junction reads spanning around the interval, the positive
/// evidence that an alternative region is skipped.
pub fn fetch_reads_excluding(
    src: &mut dyn AlignmentSource,
    chrom: &str,
    strand: Option<Strand>,
    start: u32,
    end: u32,
    opts: &CountOptions,
) -> Result<(f64, HashMap<String, f64>)> {
    let mut reads: HashMap<String, f64> = HashMap::new();
    let mut count = 0.0;

    if !src.has_reference(chrom) {
        return Ok((count, reads));
    }

    for read in src.fetch(chrom, start, end)? {
        if !passes_name_filters(&read.name, opts) {
            continue;
        }
        if let Some(required) = strand {
            if !required.matches(effective_strand(&read, opts.rev_read2)) {
                continue;
            }
        }
        if read.blocks.iter().any(|b| b.overlaps_range(start, end)) {
            continue;
        }
        if reads.contains_key(&read.name) {
            continue;
        }

        let weight = match opts.multiple {
            MultiPolicy::Complete => 1.0,
            MultiPolicy::Partial => 1.0 / read.hits.max(1) as f64,
            MultiPolicy::Ignore => {
                if read.hits > 1 {
                    continue;
                }
                1.0
            }
        };

        count += weight;
        reads.insert(read.name, weight);
    }

    Ok((count, reads))
}

/// Per-base depth statistics (mean, stdev, median) over the union of
/// sub-intervals, from the aligned blocks of eligible reads.
pub fn coverage_stats(
    src: &mut dyn AlignmentSource,
    chrom: &str,
    strand: Option<Strand>,
    starts: &[u32],
    ends: &[u32],
    opts: &CountOptions,
) -> Result<(f64, f64, f64)> {
    let total: usize = starts
        .iter()
        .zip(ends.iter())
        .map(|(&s, &e)| (e.saturating_sub(s)) as usize)
        .sum();
    if total == 0 {
        return Ok((0.0, 0.0, 0.0));
    }

    let mut depth = vec![0u32; total];

    if src.has_reference(chrom) {
        let mut seen: std::collections::HashSet<String> = std::collections::HashSet::new();
        let mut offset = 0usize;
        let mut offsets = Vec::with_capacity(starts.len());
        for (&s, &e) in starts.iter().zip(ends.iter()) {
            offsets.push(offset);
            offset += (e - s) as usize;
        }

        for (&start, &end) in starts.iter().zip(ends.iter()) {
            for read in src.fetch(chrom, start, end)? {
                if !passes_name_filters(&read.name, opts) {
                    continue;
                }
                if opts.uniq_only && read.hits > 1 {
                    continue;
                }
                if let Some(required) = strand {
                    if !required.matches(effective_strand(&read, opts.rev_read2)) {
                        continue;
                    }
                }
                if seen.contains(&read.name) {
                    continue;
                }

                for block in &read.blocks {
                    for (i, (&s, &e)) in starts.iter().zip(ends.iter()).enumerate() {
                        let lo = block.start.max(s);
                        let hi = block.end.min(e);
                        for pos in lo..hi {
                            depth[offsets[i] + (pos - s) as usize] += 1;
                        }
                    }
                }
                seen.insert(read.name);
            }
        }
    }

    let n = depth.len() as f64;
    let mean = depth.iter().map(|&d| d as f64).sum::<f64>() / n;
    let var = depth
        .iter()
        .map(|&d| {
            let diff = d as f64 - mean;
            diff * diff
        })
        .sum::<f64>()
        / n;

    let mut sorted = depth;
    sorted.sort_unstable();
    let median = sorted[sorted.len() / 2] as f64;

    Ok((mean, var.sqrt(), median))
}

fn passes_name_filters(name: &str, opts: &CountOptions) -> bool {
    if let Some(black) = &opts.blacklist {
        if black.contains(name) {
            return false;
        }
    }
    if let Some(white) = &opts.whitelist {
        if !white.contains(name) {
            return false;
        }
    }
    true
}

/// Read orientation seen by the strand filter; second mates are flipped in
/// `rev_read2` libraries.
fn effective_strand(read: &ReadAlignment, rev_read2: bool) -> Strand {
    if rev_read2 && read.is_read2 {
        read.strand.flip()
    } else {
        read.strand
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bam::ReadAlignment;
    use crate::types::Span;
    use std::collections::HashSet;

    /// In-memory alignment source; fetch returns reads whose reference span
    /// overlaps the query, mirroring indexed BAM fetch semantics.
    struct MemSource {
        refs: Vec<(String, u64)>,
        reads: Vec<(String, ReadAlignment)>,
    }

    impl MemSource {
        fn new(reads: Vec<(&str, ReadAlignment)>) -> Self {
            Self {
                refs: vec![("chr1".to_string(), 10_000)],
                reads: reads
                    .into_iter()
                    .map(|(c, r)| (c.to_string(), r))
                    .collect(),
            }
        }
    }

    impl AlignmentSource for MemSource {
        fn source_name(&self) -> String {
            "<mem>".to_string()
        }

        fn references(&self) -> &[(String, u64)] {
            &self.refs
        }

        fn fetch(&mut self, chrom: &str, start: u32, end: u32) -> Result<Vec<ReadAlignment>> {
            Ok(self
                .reads
                .iter()
                .filter(|(c, r)| {
                    if c != chrom || r.blocks.is_empty() {
                        return false;
                    }
                    let span_start = r.blocks[0].start;
                    let span_end = r.blocks[r.blocks.len() - 1].end;
                    span_start < end && start < span_end
                })
                .map(|(_, r)| r.clone())
                .collect())
        }

        fn mapped_count(
            &mut self,
            _whitelist: Option<&HashSet<String>>,
            _blacklist: Option<&HashSet<String>>,
        ) -> Result<u64> {
            Ok(self.reads.len() as u64)
        }
    }

    fn read(name: &str, blocks: &[(u32, u32)]) -> ReadAlignment {
        ReadAlignment {
            name: name.to_string(),
            strand: Strand::Plus,
            is_secondary: false,
            is_read2: false,
            blocks: blocks.iter().map(|&(s, e)| Span::new(s, e)).collect(),
            hits: 1,
        }
    }

    fn multi(name: &str, blocks: &[(u32, u32)], hits: u32) -> ReadAlignment {
        ReadAlignment {
            hits,
            ..read(name, blocks)
        }
    }

    fn reverse(name: &str, blocks: &[(u32, u32)]) -> ReadAlignment {
        ReadAlignment {
            strand: Strand::Minus,
            ..read(name, blocks)
        }
    }

    #[test]
    fn counts_overlapping_reads_once_per_name() {
        let mut src = MemSource::new(vec![
            ("chr1", read("r1", &[(100, 150)])),
            ("chr1", read("r2", &[(140, 190)])),
            ("chr1", read("r3", &[(500, 550)])),
        ]);
        let opts = CountOptions::default();

        // two sub-intervals both catching r2: counted once
        let (count, reads) =
            fetch_reads(&mut src, "chr1", None, &[100, 160], &[160, 200], &opts).unwrap();
        assert_eq!(count, 2.0);
        assert!(reads.contains_key("r1") && reads.contains_key("r2"));
    }

    #[test]
    fn unknown_chromosome_counts_zero() {
        let mut src = MemSource::new(vec![("chr1", read("r1", &[(100, 150)]))]);
        let opts = CountOptions::default();
        let (count, reads) =
            fetch_reads(&mut src, "chrUn", None, &[100], &[200], &opts).unwrap();
        assert_eq!(count, 0.0);
        assert!(reads.is_empty());
    }

    #[test]
    fn strand_filter_with_rev_read2() {
        let mate2 = ReadAlignment {
            is_read2: true,
            ..reverse("m2", &[(100, 150)])
        };
        let mut src = MemSource::new(vec![
            ("chr1", read("f1", &[(100, 150)])),
            ("chr1", reverse("b1", &[(100, 150)])),
            ("chr1", mate2),
        ]);

        let opts = CountOptions::default();
        let (count, _) =
            fetch_reads(&mut src, "chr1", Some(Strand::Plus), &[100], &[200], &opts).unwrap();
        assert_eq!(count, 1.0);

        let opts = CountOptions {
            rev_read2: true,
            ..CountOptions::default()
        };
        // the reverse second mate now reads as forward
        let (count, reads) =
            fetch_reads(&mut src, "chr1", Some(Strand::Plus), &[100], &[200], &opts).unwrap();
        assert_eq!(count, 2.0);
        assert!(reads.contains_key("m2"));
    }

    #[test]
    fn multimap_policies() {
        let mut src = MemSource::new(vec![
            ("chr1", read("u1", &[(100, 150)])),
            ("chr1", multi("m1", &[(100, 150)], 4)),
        ]);

        let complete = CountOptions::default();
        let (count, _) = fetch_reads(&mut src, "chr1", None, &[100], &[200], &complete).unwrap();
        assert_eq!(count, 2.0);

        let partial = CountOptions {
            multiple: MultiPolicy::Partial,
            ..CountOptions::default()
        };
        let (count, reads) =
            fetch_reads(&mut src, "chr1", None, &[100], &[200], &partial).unwrap();
        assert_eq!(count, 1.25);
        assert_eq!(reads["m1"], 0.25);

        let ignore = CountOptions {
            multiple: MultiPolicy::Ignore,
            ..CountOptions::default()
        };
        let (count, reads) =
            fetch_reads(&mut src, "chr1", None, &[100], &[200], &ignore).unwrap();
        assert_eq!(count, 1.0);
        assert!(!reads.contains_key("m1"));

        let uniq = CountOptions {
            uniq_only: true,
            ..CountOptions::default()
        };
        let (count, _) = fetch_reads(&mut src, "chr1", None, &[100], &[200], &uniq).unwrap();
        assert_eq!(count, 1.0);
    }

    #[test]
    fn whitelist_and_blacklist_gate_reads() {
        let mut src = MemSource::new(vec![
            ("chr1", read("keep", &[(100, 150)])),
            ("chr1", read("drop", &[(100, 150)])),
        ]);

        let opts = CountOptions {
            blacklist: Some(HashSet::from(["drop".to_string()])),
            ..CountOptions::default()
        };
        let (count, _) = fetch_reads(&mut src, "chr1", None, &[100], &[200], &opts).unwrap();
        assert_eq!(count, 1.0);

        let opts = CountOptions {
            whitelist: Some(HashSet::from(["keep".to_string()])),
            ..CountOptions::default()
        };
        let (count, reads) = fetch_reads(&mut src, "chr1", None, &[100], &[200], &opts).unwrap();
        assert_eq!(count, 1.0);
        assert!(reads.contains_key("keep"));
    }

    #[test]
    fn start_only_requires_alignment_start_inside() {
        let mut src = MemSource::new(vec![
            ("chr1", read("inside", &[(120, 170)])),
            ("chr1", read("before", &[(90, 130)])),
        ]);
        let opts = CountOptions {
            start_only: true,
            ..CountOptions::default()
        };
        let (count, reads) =
            fetch_reads(&mut src, "chr1", None, &[100], &[200], &opts).unwrap();
        assert_eq!(count, 1.0);
        assert!(reads.contains_key("inside"));
    }

    #[test]
    fn excluding_keeps_only_spanning_junction_reads() {
        // j1 splices around [150,200); r1 lands inside it.
        let mut src = MemSource::new(vec![
            ("chr1", read("j1", &[(100, 150), (200, 250)])),
            ("chr1", read("r1", &[(150, 200)])),
        ]);
        let opts = CountOptions::default();

        let (count, reads) =
            fetch_reads_excluding(&mut src, "chr1", None, 150, 200, &opts).unwrap();
        assert_eq!(count, 1.0);
        assert!(reads.contains_key("j1"));
        assert!(!reads.contains_key("r1"));
    }

    #[test]
    fn coverage_stats_over_sub_intervals() {
        let mut src = MemSource::new(vec![
            ("chr1", read("r1", &[(100, 110)])),
            ("chr1", read("r2", &[(100, 110)])),
        ]);
        let opts = CountOptions::default();

        let (mean, stdev, median) =
            coverage_stats(&mut src, "chr1", None, &[100], &[110], &opts).unwrap();
        assert_eq!(mean, 2.0);
        assert_eq!(stdev, 0.0);
        assert_eq!(median, 2.0);

        // empty region: no crash, all zeros
        let (mean, _, median) =
            coverage_stats(&mut src, "chr1", None, &[500], &[510], &opts).unwrap();
        assert_eq!(mean, 0.0);
        assert_eq!(median, 0.0);
    }
}
