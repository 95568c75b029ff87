use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{ArgGroup, Args, Parser, Subcommand};
use log::info;

use splicecount::{
    BamSource, BedModel, BinModel, CountOptions, ExonModel, GeneSet, GtfModel, MultiPolicy,
    Normalization, RegionModel, RepeatFamilyModel, RepeatModel,
};

/// Count aligned reads over gene, bin, interval, or repeat region models.
#[derive(Parser, Debug)]
#[command(name = "splicecount")]
#[command(author, version, about)]
struct Cli {
    /// Logging verbosity
    #[arg(long, global = true, default_value_t = log::Level::Info)]
    level: log::Level,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Count reads from an indexed BAM over a region model
    Count(CountArgs),

    /// Parse an annotation and print the segmented gene regions
    Regions(RegionsArgs),
}

#[derive(Args, Debug)]
#[command(group(
    ArgGroup::new("model")
        .required(true)
        .args(["gtf", "exons", "bins", "bed", "repeats", "repeat_families"])
))]
struct CountArgs {
    /// Indexed alignment file (.bam with .bai)
    #[arg(long, short)]
    bam: PathBuf,

    /// Count whole genes from a GTF annotation
    #[arg(long, value_name = "GTF")]
    gtf: Option<PathBuf>,

    /// Count per exonic sub-region from a GTF annotation
    #[arg(long, value_name = "GTF")]
    exons: Option<PathBuf>,

    /// Count fixed-width windows of this size over every reference
    #[arg(long, value_name = "SIZE")]
    bins: Option<u32>,

    /// Count intervals from a BED file
    #[arg(long, value_name = "BED")]
    bed: Option<PathBuf>,

    /// Count repeat elements from a RepeatMasker-style catalog
    #[arg(long, value_name = "OUT")]
    repeats: Option<PathBuf>,

    /// Aggregate repeat counts by family
    #[arg(long, value_name = "OUT")]
    repeat_families: Option<PathBuf>,

    /// Only count reads matching the region strand
    #[arg(long)]
    stranded: bool,

    /// Reject multi-mapped reads (IH/NH > 1)
    #[arg(long)]
    uniq: bool,

    /// How multi-mapped reads contribute to counts
    #[arg(long, value_enum, default_value_t = MultiPolicy::Complete)]
    multiple: MultiPolicy,

    /// Library-size normalization basis (adds a CPM column)
    #[arg(long, value_enum)]
    norm: Option<Normalization>,

    /// Also emit a length-normalized RPKM column (requires --norm)
    #[arg(long)]
    rpkm: bool,

    /// Append per-base coverage mean/stdev/median columns
    #[arg(long)]
    coverage: bool,

    /// Only count reads whose alignment start falls inside the region
    #[arg(long)]
    start_only: bool,

    /// Invert the strand of second mates before the strand filter
    #[arg(long)]
    rev_read2: bool,

    /// File of query names; only these reads are counted
    #[arg(long, value_name = "FILE")]
    whitelist: Option<PathBuf>,

    /// File of query names to skip
    #[arg(long, value_name = "FILE")]
    blacklist: Option<PathBuf>,

    /// Do not read or write the annotation side-car cache
    #[arg(long)]
    no_cache: bool,

    /// Output file (default: stdout)
    #[arg(long, short)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct RegionsArgs {
    /// Input annotation file (.gtf, optionally gzipped)
    #[arg(long, short)]
    annotation: PathBuf,

    /// Do not read or write the annotation side-car cache
    #[arg(long)]
    no_cache: bool,

    /// Output file (default: stdout)
    #[arg(long, short)]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    simple_logger::init_with_level(cli.level)
        .map_err(|e| anyhow::anyhow!("logger init failed: {e}"))?;

    match cli.cmd {
        Command::Count(args) => run_count(args),
        Command::Regions(args) => run_regions(args),
    }
}

fn run_count(args: CountArgs) -> Result<()> {
    let cache = !args.no_cache;

    let model: Box<dyn RegionModel> = if let Some(path) = args.gtf {
        Box::new(GtfModel { path, cache })
    } else if let Some(path) = args.exons {
        Box::new(ExonModel { path, cache })
    } else if let Some(binsize) = args.bins {
        Box::new(BinModel { binsize })
    } else if let Some(path) = args.bed {
        Box::new(BedModel { path })
    } else if let Some(path) = args.repeats {
        Box::new(RepeatModel { path })
    } else if let Some(path) = args.repeat_families {
        Box::new(RepeatFamilyModel { path })
    } else {
        unreachable!("clap enforces the model group");
    };

    let opts = CountOptions {
        stranded: args.stranded,
        coverage: args.coverage,
        uniq_only: args.uniq,
        rpkm: args.rpkm,
        norm: args.norm,
        multiple: args.multiple,
        whitelist: args.whitelist.as_deref().map(read_name_list).transpose()?,
        blacklist: args.blacklist.as_deref().map(read_name_list).transpose()?,
        rev_read2: args.rev_read2,
        start_only: args.start_only,
    };

    let mut bam = BamSource::open(&args.bam)?;

    info!(
        "counting {} model over {}",
        model.name(),
        args.bam.display()
    );

    let mut out = open_output(args.output.as_deref())?;
    model.count(&mut bam, &opts, &mut out)?;
    out.flush()?;

    Ok(())
}

fn run_regions(args: RegionsArgs) -> Result<()> {
    let set = GeneSet::from_path(&args.annotation, !args.no_cache)?;

    let mut out = open_output(args.output.as_deref())?;

    writeln!(
        out,
        "#gene\tgeneid\tisoid\tchrom\tstrand\tregion_num\tstart\tend\tconst_alt\ttranscripts"
    )?;
    for gene in set.genes() {
        for (num, region) in gene.regions() {
            writeln!(
                out,
                "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
                gene.gene_name,
                gene.gene_id,
                gene.isoform_id,
                gene.chrom,
                gene.strand,
                num,
                region.start,
                region.end,
                if region.constant { "const" } else { "alt" },
                region.names,
            )?;
        }
    }
    out.flush()?;

    Ok(())
}

fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>> {
    match path {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("creating output file {}", path.display()))?;
            Ok(Box::new(BufWriter::new(file)))
        }
        None => Ok(Box::new(BufWriter::new(std::io::stdout()))),
    }
}

fn read_name_list(path: &Path) -> Result<HashSet<String>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading name list {}", path.display()))?;
    Ok(text
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .map(|l| l.to_string())
        .collect())
}
