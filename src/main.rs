//! minmt translation CLI
//!
//! Beam-search decoding of a test set with optional target prefixes.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use minmt::DecoderConfig;
use minmt::data::{TestSet, read_lines};
use minmt::inference::Inference;
use minmt::tokenizer::Vocab;
use minmt::weights::loader as weights_loader;

/// Translate a test set with constrained beam search.
#[derive(Debug, Parser)]
#[command(
    name = "minmt-translate",
    version,
    about = "Translate tokenized sentences with constrained beam search",
    long_about = "Decodes every input line with beam search and writes the n-best hypotheses as \
                  tab-separated records.\n\n\
                  Format characters: p (input position), n (n-best rank), c (score), \
                  s (source), j (source ids), t (hypothesis), i (hypothesis ids)."
)]
struct Cli {
    /// Score oracle weights (safetensors with a `transitions` tensor)
    #[arg(short, long)]
    model: PathBuf,

    /// Source vocabulary, one token per line
    #[arg(long)]
    src_vocab: PathBuf,

    /// Target vocabulary, one token per line
    #[arg(long)]
    tgt_vocab: PathBuf,

    /// Tokenized source sentences, one per line ("-" reads stdin)
    #[arg(short, long, default_value = "-")]
    input: String,

    /// Tokenized target prefixes, one per input line
    #[arg(long)]
    prefix: Option<PathBuf>,

    /// Output file ("-" writes stdout)
    #[arg(short, long, default_value = "-")]
    output: String,

    /// Sentences decoded together
    #[arg(long, default_value = "32")]
    batch_size: usize,

    /// JSON decoder config; flags below override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Beam width (K)
    #[arg(short = 'k', long)]
    beam_size: Option<usize>,

    /// Maximum hypothesis length, begin/end tokens included
    #[arg(long)]
    max_size: Option<usize>,

    /// Hypotheses written per sentence (N <= K)
    #[arg(short, long)]
    n_best: Option<usize>,

    /// Length-normalization exponent (0 disables)
    #[arg(short, long)]
    alpha: Option<f32>,

    /// Output fields, e.g. "pnct"
    #[arg(short, long)]
    format: Option<String>,

    /// Do not force a prefix token when the model's 1-best is <msk>
    #[arg(long)]
    mask_prefix: bool,

    /// Log level (debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(&cli.log_level);

    let tic = Instant::now();
    let config = decoder_config(&cli)?;
    info!(?config, "Options");

    let device = candle_core::Device::Cpu;
    let src_vocab = Vocab::load(&cli.src_vocab).context("load source vocabulary")?;
    let tgt_vocab = Vocab::load(&cli.tgt_vocab).context("load target vocabulary")?;
    let oracle = weights_loader::load_bigram_oracle(&cli.model, &device)
        .context("Failed to load score oracle")?;

    let inference = Inference::new(&oracle, &src_vocab, &tgt_vocab, config)?;

    let src_lines = read_input(&cli.input)?;
    let pre_lines = cli
        .prefix
        .as_deref()
        .map(|p| open_lines(p).with_context(|| format!("read prefix {}", p.display())))
        .transpose()?;
    let testset = TestSet::from_lines(
        &src_lines,
        pre_lines.as_deref(),
        &src_vocab,
        &tgt_vocab,
        cli.batch_size,
    )?;
    info!(sentences = testset.len(), prefix = testset.has_prefix(), "Read test set");

    if cli.output == "-" {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        inference.translate(&testset, &mut out)?;
    } else {
        let file = File::create(&cli.output)
            .with_context(|| format!("create output {}", cli.output))?;
        let mut out = BufWriter::new(file);
        inference.translate(&testset, &mut out)?;
        out.flush()?;
    }

    info!("Done ({:.2} seconds)", tic.elapsed().as_secs_f64());
    Ok(())
}

fn setup_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

/// Start from the config file (or defaults) and apply command-line overrides.
fn decoder_config(cli: &Cli) -> Result<DecoderConfig> {
    let mut config = match &cli.config {
        Some(path) => DecoderConfig::from_file(path)
            .with_context(|| format!("load config {}", path.display()))?,
        None => DecoderConfig::default(),
    };
    if let Some(v) = cli.beam_size {
        config.beam_size = v;
    }
    if let Some(v) = cli.max_size {
        config.max_size = v;
    }
    if let Some(v) = cli.n_best {
        config.n_best = v;
    }
    if let Some(v) = cli.alpha {
        config.alpha = v;
    }
    if let Some(v) = &cli.format {
        config.format.clone_from(v);
    }
    if cli.mask_prefix {
        config.mask_prefix = true;
    }
    config.validate()?;
    Ok(config)
}

fn read_input(input: &str) -> Result<Vec<String>> {
    if input == "-" {
        return Ok(read_lines(io::stdin().lock())?);
    }
    open_lines(Path::new(input)).with_context(|| format!("read input {input}"))
}

fn open_lines(path: &Path) -> Result<Vec<String>> {
    let file = File::open(path)?;
    Ok(read_lines(BufReader::new(file))?)
}
