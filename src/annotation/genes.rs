use std::collections::{BTreeMap, HashMap};
use std::io::BufRead;
use std::path::Path;

use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::annotation::cache;
use crate::annotation::io::{GtfReader, ParseError};
use crate::fileio::open_text;
use crate::model::Gene;
use crate::types::Strand;

/// The parsed gene collection plus its lookup indexes.
///
/// Genes are grouped by `isoform_id` when the annotation carries one,
/// otherwise by `gene_id` (with a one-time warning, since that treats every
/// transcript group as an unrelated top-level entity and degrades
/// splicing-region quality).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneSet {
    genes: Vec<Gene>,
    gid_to_idx: HashMap<String, usize>,
    /// chrom -> (gene start, gene index), sorted by start. Drives both
    /// `find` range queries and the global iteration order.
    gene_order: BTreeMap<String, Vec<(u32, usize)>>,
    gene_names: HashMap<String, Vec<usize>>,
    /// raw gene_id -> index, for ids that differ from the grouping key.
    gene_ids: HashMap<String, usize>,
}

impl GeneSet {
    /// Parse an annotation file, going through the side-car cache when
    /// `cache_enabled` (any cache failure falls back to a fresh parse).
    pub fn from_path(path: &Path, cache_enabled: bool) -> Result<GeneSet> {
        let cache_file = cache::cache_path(path);

        if cache_enabled {
            if let Some(cache_file) = &cache_file {
                if let Some(set) = cache::load(cache_file) {
                    log::info!(
                        "loaded {} gene models from cache {}",
                        set.len(),
                        cache_file.display()
                    );
                    return Ok(set);
                }
            }
        }

        let reader = open_text(path)?;
        let set = GeneSet::from_reader(reader)
            .with_context(|| format!("parsing annotation {}", path.display()))?;

        if cache_enabled {
            if let Some(cache_file) = &cache_file {
                cache::store(cache_file, &set);
            }
        }

        Ok(set)
    }

    /// Build the gene collection from a GTF record stream.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<GeneSet, ParseError> {
        let mut genes: Vec<Gene> = Vec::new();
        let mut gid_to_idx: HashMap<String, usize> = HashMap::new();
        let mut warned = false;

        for rec in GtfReader::new(reader).records() {
            let rec = rec?;

            let gene_id = rec.attr("gene_id").ok_or(ParseError::MissingAttribute {
                line_no: rec.line_no,
                key: "gene_id",
            })?;
            let transcript_id =
                rec.attr("transcript_id")
                    .ok_or(ParseError::MissingAttribute {
                        line_no: rec.line_no,
                        key: "transcript_id",
                    })?;

            let gid = match rec.attr("isoform_id") {
                Some(iso) => iso,
                None => {
                    if !warned {
                        warn!(
                            "annotation is missing isoform ids; each transcript group \
                             will be treated separately ({})",
                            gene_id
                        );
                        warned = true;
                    }
                    gene_id
                }
            };

            let idx = match gid_to_idx.get(gid) {
                // A gid reappearing on a different chromosome replaces the
                // previous record (last one wins).
                Some(&i) if genes[i].chrom == rec.chrom => i,
                Some(&i) => {
                    genes[i] = Gene::new(
                        gid,
                        &rec.chrom,
                        &rec.source,
                        gene_id,
                        rec.attr("gene_name"),
                        rec.attr("isoform_id"),
                        rec.strand,
                        rec.start,
                        rec.end,
                    );
                    i
                }
                None => {
                    let i = genes.len();
                    genes.push(Gene::new(
                        gid,
                        &rec.chrom,
                        &rec.source,
                        gene_id,
                        rec.attr("gene_name"),
                        rec.attr("isoform_id"),
                        rec.strand,
                        rec.start,
                        rec.end,
                    ));
                    gid_to_idx.insert(gid.to_string(), i);
                    i
                }
            };

            genes[idx].add_feature(transcript_id, &rec.feature, rec.start, rec.end, rec.strand);
        }

        let mut gene_order: BTreeMap<String, Vec<(u32, usize)>> = BTreeMap::new();
        let mut gene_names: HashMap<String, Vec<usize>> = HashMap::new();
        let mut gene_ids: HashMap<String, usize> = HashMap::new();

        for (i, gene) in genes.iter().enumerate() {
            gene_order
                .entry(gene.chrom.clone())
                .or_default()
                .push((gene.start, i));
            gene_names.entry(gene.gene_name.clone()).or_default().push(i);
            if gene.gid != gene.gene_id {
                gene_ids.insert(gene.gene_id.clone(), i);
            }
        }
        for order in gene_order.values_mut() {
            order.sort_unstable();
        }

        Ok(GeneSet {
            genes,
            gid_to_idx,
            gene_order,
            gene_names,
            gene_ids,
        })
    }

    pub fn len(&self) -> usize {
        self.genes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }

    pub fn gene(&self, idx: usize) -> &Gene {
        &self.genes[idx]
    }

    /// Gene indexes in output order: chromosomes sorted lexicographically,
    /// genes by start within each chromosome.
    pub fn ordered_indices(&self) -> Vec<usize> {
        self.gene_order
            .values()
            .flat_map(|v| v.iter().map(|&(_, i)| i))
            .collect()
    }

    /// All genes, in output order.
    pub fn genes(&self) -> impl Iterator<Item = &Gene> {
        self.gene_order
            .values()
            .flat_map(move |v| v.iter().map(move |&(_, i)| &self.genes[i]))
    }

    /// Genes overlapping [start, end) on `chrom`, optionally restricted to
    /// one strand, in start order.
    pub fn find(
        &self,
        chrom: &str,
        start: u32,
        end: u32,
        strand: Option<Strand>,
    ) -> impl Iterator<Item = &Gene> {
        self.gene_order
            .get(chrom)
            .into_iter()
            .flat_map(move |v| v.iter().map(move |&(_, i)| &self.genes[i]))
            .filter(move |g| {
                if let Some(s) = strand {
                    if g.strand != s {
                        return false;
                    }
                }
                g.start < end && start < g.end
            })
    }

    /// Look up by grouping key or raw gene_id.
    pub fn get_by_id(&self, id: &str) -> Option<&Gene> {
        self.gene_ids
            .get(id)
            .or_else(|| self.gid_to_idx.get(id))
            .map(|&i| &self.genes[i])
    }

    pub fn get_by_name(&self, name: &str) -> impl Iterator<Item = &Gene> {
        self.gene_names
            .get(name)
            .into_iter()
            .flat_map(move |v| v.iter().map(move |&i| &self.genes[i]))
    }
}
