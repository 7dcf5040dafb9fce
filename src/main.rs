use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{info, LevelFilter};

use junction_annotate::junctions::io::{JunctionReader, JunctionWriter};
use junction_annotate::sequence::{FastaSequences, SequenceProvider};
use junction_annotate::{AnnotateOptions, AnnotationBuilder, IdNameKeys, JunctionsAnnotator};

/// Annotate splice junctions against a gene model.
#[derive(Parser, Debug)]
#[command(name = "junction-annotate")]
#[command(author, version, about)]
struct Cli {
    /// Only log warnings and errors
    #[arg(long, short, global = true)]
    quiet: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Annotate a BED file of junctions
    Annotate(AnnotateArgs),

    /// Parse a GTF/GFF annotation and save it as a reusable index
    Index(IndexArgs),
}

#[derive(Args, Debug)]
struct AnnotateArgs {
    /// Junctions in BED6 or BED12 format (.gz allowed)
    #[arg(long, short)]
    junctions: PathBuf,

    /// Gene model: GTF/GFF3 (.gz allowed) or an index written by `index`
    #[arg(long, short)]
    annotation: PathBuf,

    /// Indexed reference FASTA for splice-site bases (needs <fasta>.fai)
    #[arg(long, short)]
    reference: Option<PathBuf>,

    /// Output file [default: stdout]
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Also use single-exon transcripts for gene/transcript overlaps
    #[arg(long = "keep-single-exon-genes", short = 'S')]
    keep_single_exon_genes: bool,

    /// Append a variant_info column
    #[arg(long)]
    variant_info: bool,

    #[command(flatten)]
    model: ModelArgs,
}

#[derive(Args, Debug)]
struct IndexArgs {
    /// Input annotation file (.gtf/.gff/.gff3, optionally .gz)
    #[arg(long, short)]
    annotation: PathBuf,

    /// Output serialized index file
    #[arg(long, short)]
    index: PathBuf,

    #[command(flatten)]
    model: ModelArgs,
}

#[derive(Args, Debug)]
struct ModelArgs {
    /// Bin width of the transcript lookup in base pairs
    #[arg(long, default_value_t = 1_000_000)]
    bin_width: u32,

    /// Attribute keys to use for gene ID (repeatable)
    #[arg(long = "gene-id-key", value_name = "KEY", num_args = 1.., default_values_t = vec!["gene_id".to_string()])]
    gene_id_keys: Vec<String>,

    /// Attribute keys for the gene name reported in output (repeatable)
    #[arg(long = "gene-name-key", value_name = "KEY", num_args = 1.., default_values_t = vec!["gene_name".to_string()])]
    gene_name_keys: Vec<String>,

    /// Attribute keys to use for transcript ID (repeatable)
    #[arg(long = "transcript-id-key", value_name = "KEY", num_args = 1.., default_values_t = vec!["transcript_id".to_string()])]
    transcript_id_keys: Vec<String>,

    /// GFF3 exon->transcript linkage keys (repeatable)
    #[arg(long = "parent-key", value_name = "KEY", num_args = 1.., default_values_t = vec!["Parent".to_string()])]
    parent_keys: Vec<String>,

    /// Feature types that count as exon blocks (repeatable)
    #[arg(long = "exon-feature-type", value_name = "TYPE", num_args = 1.., default_values_t = vec!["exon".to_string()])]
    exon_feature_types: Vec<String>,
}

impl ModelArgs {
    fn builder(&self) -> AnnotationBuilder {
        AnnotationBuilder::new(self.bin_width).keys(IdNameKeys {
            gene_id_keys: self.gene_id_keys.clone(),
            gene_name_keys: self.gene_name_keys.clone(),
            transcript_id_keys: self.transcript_id_keys.clone(),
            parent_keys: self.parent_keys.clone(),
            exon_feature_types: self.exon_feature_types.clone(),
        })
    }
}

fn annotate(args: AnnotateArgs) -> Result<()> {
    let index = args
        .model
        .builder()
        .open(&args.annotation)
        .with_context(|| format!("loading gene model {}", args.annotation.display()))?;

    let reader = JunctionReader::from_path(&args.junctions)
        .with_context(|| format!("opening junctions {}", args.junctions.display()))?;

    let mut reference = args
        .reference
        .as_ref()
        .map(|p| FastaSequences::open(p).with_context(|| format!("opening reference {}", p.display())))
        .transpose()?;

    let out: Box<dyn Write> = match &args.output {
        Some(p) => Box::new(BufWriter::new(
            File::create(p).with_context(|| format!("creating output {}", p.display()))?,
        )),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };
    let mut writer = JunctionWriter::new(out).with_variant_info(args.variant_info);

    let options = AnnotateOptions {
        skip_single_exon_genes: !args.keep_single_exon_genes,
    };
    let annotator = JunctionsAnnotator::new(&index, options);

    let stats = annotator
        .run(
            reader,
            &mut writer,
            reference.as_mut().map(|r| r as &mut dyn SequenceProvider),
        )
        .with_context(|| format!("annotating {}", args.junctions.display()))?;

    if stats.splice_site_failures > 0 {
        info!("{} junctions without splice-site bases", stats.splice_site_failures);
    }
    Ok(())
}

fn index(args: IndexArgs) -> Result<()> {
    let idx = args
        .model
        .builder()
        .build_from_path(&args.annotation)
        .with_context(|| format!("building index from {}", args.annotation.display()))?;

    info!("{idx}");

    idx.save(&args.index)
        .with_context(|| format!("writing index to {}", args.index.display()))?;

    info!("index written to {}", args.index.display());
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.quiet { LevelFilter::Warn } else { LevelFilter::Info };
    pretty_env_logger::formatted_builder()
        .filter_level(level)
        .parse_default_env()
        .init();

    match cli.cmd {
        Command::Annotate(args) => annotate(args),
        Command::Index(args) => index(args),
    }
}
