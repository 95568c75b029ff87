//! splicecount
//!
//! Sequencing-read coverage over interchangeable region models: annotated
//! genes and their exonic sub-regions, fixed-width genome bins, arbitrary
//! BED intervals, and repeat catalogs.
//!
//! The gene model splits each gene span into maximal constant/alternative
//! regions shared by subsets of its transcripts (bitmask segmentation), and
//! the exon model layers inclusion/exclusion splicing evidence on top of
//! plain overlap counts. All coordinates are 0-based, half-open.

pub mod annotation;
pub mod bam;
pub mod bed;
pub mod count;
pub mod fileio;
pub mod model;
pub mod progress;
pub mod repeats;
pub mod types;

pub use annotation::{GeneSet, GtfReader, GtfRecord, ParseError};
pub use bam::{AlignmentSource, BamSource, ReadAlignment};
pub use count::models::{
    BedModel, BinModel, ExonModel, GtfModel, RepeatFamilyModel, RepeatModel,
};
pub use count::{CountOptions, CountRequest, MultiPolicy, Normalization, RegionModel};
pub use model::{calc_regions, Gene, Region, Transcript};
pub use types::{Span, Strand};
