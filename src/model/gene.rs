use std::cell::OnceCell;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::regions::{calc_regions, Region};
use crate::model::transcript::Transcript;
use crate::types::{Span, Strand};

/// One gene/isoform-group from the annotation.
///
/// `gid` is the grouping key: the `isoform_id` attribute when the file
/// carries one, otherwise the raw `gene_id`. Transcripts are kept in
/// insertion order; segmentation output depends on that order only through
/// the contributor name lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gene {
    pub gid: String,
    pub gene_id: String,
    pub gene_name: String,
    pub isoform_id: String,
    pub chrom: String,
    pub source: String,
    pub strand: Strand,
    pub start: u32,
    pub end: u32,
    transcripts: Vec<Transcript>,
    tx_index: HashMap<String, usize>,
    // Memory-expensive, so computed lazily on first access. Not part of the
    // cache payload; reloaded gene sets recompute on demand.
    #[serde(skip)]
    regions: OnceCell<Vec<Region>>,
}

impl Gene {
    pub fn new(
        gid: impl Into<String>,
        chrom: impl Into<String>,
        source: impl Into<String>,
        gene_id: impl Into<String>,
        gene_name: Option<&str>,
        isoform_id: Option<&str>,
        strand: Strand,
        start: u32,
        end: u32,
    ) -> Self {
        let gene_id = gene_id.into();
        Self {
            gid: gid.into(),
            gene_name: gene_name.unwrap_or(&gene_id).to_string(),
            isoform_id: isoform_id.unwrap_or(&gene_id).to_string(),
            gene_id,
            chrom: chrom.into(),
            source: source.into(),
            strand,
            start,
            end,
            transcripts: Vec::new(),
            tx_index: HashMap::new(),
            regions: OnceCell::new(),
        }
    }

    /// Fold one annotation record into the gene.
    ///
    /// The gene and transcript spans grow to cover every feature, so a file
    /// with only e.g. `gene` records still yields usable spans. Unrecognized
    /// feature types contribute nothing beyond the span.
    pub fn add_feature(
        &mut self,
        transcript_id: &str,
        feature: &str,
        start: u32,
        end: u32,
        strand: Strand,
    ) {
        if start < self.start {
            self.start = start;
        }
        if end > self.end {
            self.end = end;
        }

        let idx = match self.tx_index.get(transcript_id) {
            Some(&i) => {
                self.transcripts[i].grow(start, end);
                i
            }
            None => {
                let i = self.transcripts.len();
                self.transcripts
                    .push(Transcript::new(transcript_id, strand, start, end));
                self.tx_index.insert(transcript_id.to_string(), i);
                i
            }
        };

        let t = &mut self.transcripts[idx];
        match feature {
            "exon" => t.add_exon(Span::new(start, end)),
            "CDS" => t.add_cds(Span::new(start, end)),
            "start_codon" => t.set_start_codon(Span::new(start, end)),
            "stop_codon" => t.set_stop_codon(Span::new(start, end)),
            _ => {}
        }
    }

    pub fn span(&self) -> Span {
        Span::new(self.start, self.end)
    }

    pub fn transcripts(&self) -> &[Transcript] {
        &self.transcripts
    }

    pub fn transcript(&self, transcript_id: &str) -> Option<&Transcript> {
        self.tx_index
            .get(transcript_id)
            .map(|&i| &self.transcripts[i])
    }

    /// Constant/alternative regions with their 1-based ordinal, in genomic
    /// order. Computed once, on first call.
    pub fn regions(&self) -> impl Iterator<Item = (usize, &Region)> {
        self.regions
            .get_or_init(|| {
                let exons: Vec<(String, Vec<Span>)> = self
                    .transcripts
                    .iter()
                    .map(|t| (t.transcript_id.clone(), t.exons()))
                    .collect();
                calc_regions(self.start, self.end, &exons)
            })
            .iter()
            .enumerate()
            .map(|(i, r)| (i + 1, r))
    }
}
