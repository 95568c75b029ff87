use serde::{Deserialize, Serialize};

use crate::types::{Span, Strand};

/// One transcript (isoform) of a gene.
///
/// Exons and CDS spans are kept in file order; they are not sorted, merged,
/// or deduplicated here. Merging is a consumer concern during segmentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub transcript_id: String,
    pub strand: Strand,
    pub start: u32,
    pub end: u32,
    exons: Vec<Span>,
    cds: Vec<Span>,
    start_codon: Option<Span>,
    stop_codon: Option<Span>,
}

impl Transcript {
    pub fn new(transcript_id: impl Into<String>, strand: Strand, start: u32, end: u32) -> Self {
        Self {
            transcript_id: transcript_id.into(),
            strand,
            start,
            end,
            exons: Vec::new(),
            cds: Vec::new(),
            start_codon: None,
            stop_codon: None,
        }
    }

    /// Extend the transcript span. The span only ever grows.
    pub fn grow(&mut self, start: u32, end: u32) {
        if start < self.start {
            self.start = start;
        }
        if end > self.end {
            self.end = end;
        }
    }

    pub fn add_exon(&mut self, span: Span) {
        self.exons.push(span);
    }

    pub fn add_cds(&mut self, span: Span) {
        self.cds.push(span);
    }

    pub fn set_start_codon(&mut self, span: Span) {
        self.start_codon = Some(span);
    }

    pub fn set_stop_codon(&mut self, span: Span) {
        self.stop_codon = Some(span);
    }

    pub fn span(&self) -> Span {
        Span::new(self.start, self.end)
    }

    /// Exon spans in file order. A transcript without exon records
    /// degenerates to its own span.
    pub fn exons(&self) -> Vec<Span> {
        if self.exons.is_empty() {
            vec![self.span()]
        } else {
            self.exons.clone()
        }
    }

    /// CDS spans in file order, degrading to the transcript span.
    pub fn cds(&self) -> Vec<Span> {
        if self.cds.is_empty() {
            vec![self.span()]
        } else {
            self.cds.clone()
        }
    }

    /// Explicit start codon, or a 3-base window at the transcript start.
    pub fn start_codon(&self) -> Span {
        self.start_codon
            .unwrap_or_else(|| Span::new(self.start, self.start + 3))
    }

    /// Explicit stop codon, or a 3-base window at the transcript end.
    pub fn stop_codon(&self) -> Span {
        self.stop_codon
            .unwrap_or_else(|| Span::new(self.end.saturating_sub(3), self.end))
    }
}
