//! signal-dann CLI
//!
//! Builds the domain-adversarial network from a JSON configuration, prints its
//! structure, and runs forward passes on synthetic series.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use burn::{
    config::Config,
    module::Module,
    tensor::{Distribution, Tensor},
};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use signal_dann::backend::{backend_name, resolve_device, DefaultBackend};
use signal_dann::model::config::{FC_WIDTHS, MAX_FC_LAYERS};
use signal_dann::model::{
    BackboneKind, CellInit, DannNetworkConfig, FeatureExtractorConfig, TemporalKind,
};
use signal_dann::utils::logging::{init_logging, LogConfig};
use signal_dann::utils::{format_number, format_params};
use signal_dann::DannError;

/// Domain-adversarial regression over multi-channel signal windows
#[derive(Parser, Debug)]
#[command(name = "signal-dann")]
#[command(version)]
#[command(about = "Conv + LSTM domain-adversarial network built with Burn", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a network configuration file
    InitConfig {
        /// Output path for the JSON configuration
        #[arg(short, long, default_value = "dann_config.json")]
        output: PathBuf,

        /// Window length in samples
        #[arg(long, default_value = "32")]
        time_len: usize,

        /// Number of input channels
        #[arg(long, default_value = "3")]
        channels: usize,

        /// Regression output dimension
        #[arg(long, default_value = "1")]
        output_dim: usize,

        /// Backbone family
        #[arg(long, default_value = "resnet")]
        backbone: String,

        /// Backbone depth
        #[arg(long, default_value = "18")]
        depth: usize,

        /// Temporal aggregator
        #[arg(long, default_value = "lstm")]
        temporal: String,

        /// Fully connected depth of both heads (1-5)
        #[arg(long, default_value = "3")]
        fc_layers: usize,

        /// Mark the model for GPU placement
        #[arg(long, default_value = "false")]
        gpu: bool,

        /// Enable dropout in the heads
        #[arg(long, default_value = "false")]
        dropout: bool,

        /// Copy the hidden-state draw into the LSTM cell state on reset
        #[arg(long, default_value = "false")]
        mirror_cell: bool,

        /// Seed for window sampling
        #[arg(long, default_value = "42")]
        seed: u64,
    },

    /// Build the network and print its structure
    Summary {
        /// Path to the JSON configuration
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Run one forward pass on synthetic uniform noise
    Forward {
        /// Path to the JSON configuration
        #[arg(short, long)]
        config: PathBuf,

        /// Series length (must be a multiple of the window length)
        #[arg(long, default_value = "128")]
        series_len: usize,

        /// Batch size
        #[arg(short, long, default_value = "2")]
        batch: usize,

        /// Gradient reversal coefficient
        #[arg(long, default_value = "1.0")]
        alpha: f64,

        /// Override the configured sampling seed
        #[arg(long)]
        seed: Option<u64>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::default()
    };
    init_logging(&log_config).map_err(anyhow::Error::msg)?;

    match cli.command {
        Commands::InitConfig {
            output,
            time_len,
            channels,
            output_dim,
            backbone,
            depth,
            temporal,
            fc_layers,
            gpu,
            dropout,
            mirror_cell,
            seed,
        } => {
            let backbone = BackboneKind::from_parts(&backbone, depth)?;
            let temporal: TemporalKind = temporal.parse()?;
            let cell_init = if mirror_cell {
                CellInit::MirrorHidden
            } else {
                CellInit::Independent
            };

            let extractor = FeatureExtractorConfig::new(time_len, channels, output_dim)
                .with_backbone(backbone)
                .with_temporal(temporal)
                .with_fc_layers(fc_layers)
                .with_use_gpu(gpu)
                .with_dropout(dropout)
                .with_cell_init(cell_init);
            extractor.validate()?;

            let config = DannNetworkConfig::new(extractor).with_seed(seed);
            config
                .save(&output)
                .with_context(|| format!("writing {}", output.display()))?;

            println!("{} {}", "Wrote".green().bold(), output.display());
        }

        Commands::Summary { config } => {
            let config = load_config(&config)?;
            print_summary(&config)?;
        }

        Commands::Forward {
            config,
            series_len,
            batch,
            alpha,
            seed,
        } => {
            let mut config = load_config(&config)?;
            if let Some(seed) = seed {
                config.seed = seed;
            }
            run_forward(&config, series_len, batch, alpha)?;
        }
    }

    Ok(())
}

fn load_config(path: &Path) -> Result<DannNetworkConfig> {
    DannNetworkConfig::load(path)
        .map_err(DannError::from)
        .with_context(|| format!("loading {}", path.display()))
}

fn print_summary(config: &DannNetworkConfig) -> Result<()> {
    let device = resolve_device(config.extractor.use_gpu);
    let network = config.init::<DefaultBackend>(&device)?;
    let extractor = &config.extractor;

    println!("{}", "Domain-adversarial network".bold());
    println!("  Backend:        {}", backend_name());
    println!("  Backbone:       {}", extractor.backbone);
    println!("  Temporal:       {}", extractor.temporal);
    println!(
        "  Window:         {} samples x {} channels",
        extractor.time_len, extractor.sequence_num
    );
    println!("  Embedding dim:  {}", network.fc_dim());
    println!("  Cell init:      {:?}", extractor.cell_init);

    let hidden: Vec<String> = FC_WIDTHS
        .iter()
        .take(extractor.fc_layers.min(MAX_FC_LAYERS))
        .map(|w| w.to_string())
        .collect();
    println!(
        "  Regressioner:   {} -> [{}] -> {} (sigmoid)",
        network.fc_dim(),
        hidden.join(", "),
        extractor.output_dim
    );
    println!(
        "  Classifier:     GRL -> {} -> [{}] -> 2 (log-softmax)",
        network.fc_dim(),
        hidden.join(", ")
    );

    println!("{}", "Parameters".bold());
    println!(
        "  Extractor:      {} ({})",
        format_number(network.extractor.num_params()),
        format_params(network.extractor.num_params())
    );
    println!("  Regressioner:   {}", format_number(network.regressor.num_params()));
    println!("  Classifier:     {}", format_number(network.classifier.num_params()));
    println!(
        "  Total:          {}",
        format_params(network.num_params()).cyan().bold()
    );

    Ok(())
}

fn run_forward(config: &DannNetworkConfig, series_len: usize, batch: usize, alpha: f64) -> Result<()> {
    let device = resolve_device(config.extractor.use_gpu);
    let network = config.init::<DefaultBackend>(&device)?;
    let mut rng = config.rng();

    let series = Tensor::<DefaultBackend, 3>::random(
        [batch, config.extractor.sequence_num, series_len],
        Distribution::Default,
        &device,
    );
    info!("Running forward on series {:?} with alpha={}", series.dims(), alpha);

    let output = network.forward(series, alpha, &mut rng)?;

    let prediction = output
        .prediction
        .clone()
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| anyhow::anyhow!("{:?}", e))?;
    let domain = output
        .domain_log_probs
        .clone()
        .exp()
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| anyhow::anyhow!("{:?}", e))?;

    println!("{}", "Forward pass".bold());
    println!("  Embedding:      {:?}", output.embedding.dims());
    println!("  Prediction:     {:?}", output.prediction.dims());
    for (i, stage) in output.activations.iter().enumerate() {
        println!("    stage {}:      {:?}", i, stage.dims());
    }
    println!("  Domain probs:   {:?}", output.domain_log_probs.dims());

    let min = prediction.iter().cloned().fold(f32::INFINITY, f32::min);
    let max = prediction.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    println!("  Prediction range: [{:.4}, {:.4}]", min, max);
    for (row, probs) in domain.chunks(2).enumerate() {
        println!("  sample {}: p(domain 0)={:.4} p(domain 1)={:.4}", row, probs[0], probs[1]);
    }

    Ok(())
}
