use crate::types::Span;

/// A maximal sub-interval of a gene span over which the set of covering
/// transcripts is constant.
///
/// `names` is the comma-joined list of contributing transcript ids, in
/// transcript insertion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub start: u32,
    pub end: u32,
    pub constant: bool,
    pub names: String,
}

impl Region {
    pub fn span(&self) -> Span {
        Span::new(self.start, self.end)
    }

    pub fn len(&self) -> u32 {
        self.end - self.start
    }
}

/// Split a gene span into constant/alternative regions.
///
/// Each transcript gets one bit; every base of every exon sets that
/// transcript's bit in a per-base mask. Maximal runs of identical mask value
/// become regions; zero-mask runs (introns, uncovered gaps) are dropped.
///
/// The mask is an array of u64 words per base, so more than 64 transcripts
/// per gene are handled without widening tricks elsewhere.
///
/// Classification: a region is constant iff every transcript whose own
/// exon-derived span fully contains the region also covers it. Transcripts
/// that do not span the region are left out of the decision entirely, so a
/// short isoform does not mark 5'/3' boundary regions of its siblings as
/// alternative. Contributors are the bit-set transcripts among those
/// considered.
pub fn calc_regions(
    span_start: u32,
    span_end: u32,
    transcripts: &[(String, Vec<Span>)],
) -> Vec<Region> {
    if span_end <= span_start || transcripts.is_empty() {
        return Vec::new();
    }

    let bases = (span_end - span_start) as usize;
    let words = (transcripts.len() + 63) / 64;
    let mut mask = vec![0u64; bases * words];

    // Per-transcript exon-derived span, for the containment test below.
    let mut tx_spans: Vec<(u32, u32)> = Vec::with_capacity(transcripts.len());

    for (i, (_, exons)) in transcripts.iter().enumerate() {
        let word = i / 64;
        let bit = 1u64 << (i % 64);

        let mut tx_start = u32::MAX;
        let mut tx_end = 0u32;

        for exon in exons {
            tx_start = tx_start.min(exon.start);
            tx_end = tx_end.max(exon.end);

            let lo = exon.start.max(span_start);
            let hi = exon.end.min(span_end);
            for pos in lo..hi {
                mask[(pos - span_start) as usize * words + word] |= bit;
            }
        }

        tx_spans.push((tx_start, tx_end));
    }

    let base = |i: usize| &mask[i * words..(i + 1) * words];

    let mut regions = Vec::new();
    let mut run_start = 0usize;

    for i in 1..=bases {
        if i < bases && base(i) == base(i - 1) {
            continue;
        }

        let value = base(run_start);
        if value.iter().any(|&w| w != 0) {
            regions.push(classify(
                span_start + run_start as u32,
                span_start + i as u32,
                value,
                transcripts,
                &tx_spans,
            ));
        }
        run_start = i;
    }

    regions
}

fn classify(
    start: u32,
    end: u32,
    value: &[u64],
    transcripts: &[(String, Vec<Span>)],
    tx_spans: &[(u32, u32)],
) -> Region {
    let mut constant = true;
    let mut names: Vec<&str> = Vec::new();

    for (i, (name, _)) in transcripts.iter().enumerate() {
        let (tx_start, tx_end) = tx_spans[i];
        if tx_start <= start && end <= tx_end {
            if value[i / 64] & (1u64 << (i % 64)) == 0 {
                constant = false;
            } else {
                names.push(name);
            }
        }
    }

    Region {
        start,
        end,
        constant,
        names: names.join(","),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(name: &str, spans: &[(u32, u32)]) -> (String, Vec<Span>) {
        (
            name.to_string(),
            spans.iter().map(|&(s, e)| Span::new(s, e)).collect(),
        )
    }

    fn region(start: u32, end: u32, constant: bool, names: &str) -> Region {
        Region {
            start,
            end,
            constant,
            names: names.to_string(),
        }
    }

    #[test]
    fn single_transcript_is_all_constant() {
        let txs = vec![tx("foo", &[(100, 110), (125, 135)])];
        let regions = calc_regions(100, 135, &txs);
        assert_eq!(
            regions,
            vec![region(100, 110, true, "foo"), region(125, 135, true, "foo")]
        );
    }

    #[test]
    fn three_transcripts_shared_and_alternative() {
        let txs = vec![
            tx("foo", &[(100, 110), (125, 135), (150, 160), (175, 200)]),
            tx("bar", &[(100, 110), (125, 135), (175, 200)]),
            tx("baz", &[(100, 110), (150, 160), (175, 200)]),
        ];
        let regions = calc_regions(100, 200, &txs);
        assert_eq!(
            regions,
            vec![
                region(100, 110, true, "foo,bar,baz"),
                region(125, 135, false, "foo,bar"),
                region(150, 160, false, "foo,baz"),
                region(175, 200, true, "foo,bar,baz"),
            ]
        );
    }

    #[test]
    fn overhangs_split_boundary_regions() {
        // baz has a 3' overhang at 110-120 and a 5' overhang at 170-175.
        let txs = vec![
            tx("foo", &[(100, 110), (125, 135), (150, 160), (175, 200)]),
            tx("bar", &[(100, 110), (125, 135), (175, 200)]),
            tx("baz", &[(100, 120), (150, 160), (170, 200)]),
        ];
        let regions = calc_regions(100, 200, &txs);
        assert_eq!(
            regions,
            vec![
                region(100, 110, true, "foo,bar,baz"),
                region(110, 120, false, "baz"),
                region(125, 135, false, "foo,bar"),
                region(150, 160, false, "foo,baz"),
                region(170, 175, false, "baz"),
                region(175, 200, true, "foo,bar,baz"),
            ]
        );
    }

    #[test]
    fn skipped_exon_is_alternative() {
        let txs = vec![
            tx("foo", &[(100, 110), (120, 130), (140, 150)]),
            tx("bar", &[(100, 110), (140, 150)]),
        ];
        let regions = calc_regions(100, 150, &txs);
        assert_eq!(
            regions,
            vec![
                region(100, 110, true, "foo,bar"),
                region(120, 130, false, "foo"),
                region(140, 150, true, "foo,bar"),
            ]
        );
    }

    #[test]
    fn three_prime_exon_overhang() {
        let txs = vec![
            tx("foo", &[(100, 110), (120, 130), (140, 150)]),
            tx("bar", &[(100, 115), (140, 150)]),
        ];
        let regions = calc_regions(100, 150, &txs);
        assert_eq!(
            regions,
            vec![
                region(100, 110, true, "foo,bar"),
                region(110, 115, false, "bar"),
                region(120, 130, false, "foo"),
                region(140, 150, true, "foo,bar"),
            ]
        );
    }

    #[test]
    fn five_prime_exon_overhang() {
        let txs = vec![
            tx("foo", &[(100, 110), (120, 130), (140, 150)]),
            tx("bar", &[(100, 110), (135, 150)]),
        ];
        let regions = calc_regions(100, 150, &txs);
        assert_eq!(
            regions,
            vec![
                region(100, 110, true, "foo,bar"),
                region(120, 130, false, "foo"),
                region(135, 140, false, "bar"),
                region(140, 150, true, "foo,bar"),
            ]
        );
    }

    #[test]
    fn segmentation_is_idempotent() {
        let txs = vec![
            tx("foo", &[(100, 110), (125, 135), (150, 160), (175, 200)]),
            tx("bar", &[(100, 110), (125, 135), (175, 200)]),
        ];
        let first = calc_regions(100, 200, &txs);
        let second = calc_regions(100, 200, &txs);
        assert_eq!(first, second);
    }

    #[test]
    fn regions_are_ordered_nonoverlapping_and_within_span() {
        let txs = vec![
            tx("foo", &[(100, 110), (125, 135), (150, 160), (175, 200)]),
            tx("bar", &[(100, 110), (125, 135), (175, 200)]),
            tx("baz", &[(100, 120), (150, 160), (170, 200)]),
        ];
        let regions = calc_regions(100, 200, &txs);

        let mut last_end = 0;
        let mut covered = 0u32;
        for r in &regions {
            assert!(r.start < r.end);
            assert!(r.start >= last_end);
            last_end = r.end;
            covered += r.len();
        }
        assert!(covered <= 100);
    }

    #[test]
    fn more_than_sixty_four_transcripts() {
        // 70 identical transcripts exercise the multi-word mask path.
        let txs: Vec<_> = (0..70)
            .map(|i| tx(&format!("t{i}"), &[(100, 110)]))
            .collect();
        let regions = calc_regions(100, 110, &txs);
        assert_eq!(regions.len(), 1);
        assert!(regions[0].constant);
        assert_eq!(regions[0].names.split(',').count(), 70);
    }

    #[test]
    fn empty_inputs_produce_no_regions() {
        assert!(calc_regions(100, 100, &[tx("a", &[(100, 110)])]).is_empty());
        assert!(calc_regions(100, 200, &[]).is_empty());
    }
}
