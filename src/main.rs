//! Latent conditional GAN for hyperspectral imagery
//!
//! Main entry point providing CLI interface for:
//! - Writing a default configuration
//! - Training on synthetic data (smoke runs)
//! - Generating samples from a checkpoint

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use tch::{Kind, Tensor};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use lcgan_hyperspectral::{
    data::DataLoader,
    model::{Lcgan, SpectralAutoencoder},
    training::{Sampler, Trainer},
    utils::{checkpoint::find_latest_checkpoint, ensure_config_exists, load_checkpoint, Config, TensorFileRenderer},
};

/// Latent conditional GAN for hyperspectral imagery
#[derive(Parser)]
#[command(name = "lcgan")]
#[command(version = "0.1.0")]
#[command(about = "Train a class-conditional spectrally normalized GAN on hyperspectral cubes")]
struct Cli {
    /// Path to configuration file (.toml or .json)
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Verbosity level
    #[arg(short, long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize default configuration file
    Init,

    /// Train on randomly generated cubes
    TrainSynthetic {
        /// Number of synthetic samples
        #[arg(short, long, default_value = "256")]
        num_samples: usize,

        /// Override the configured number of epochs
        #[arg(short, long)]
        epochs: Option<usize>,
    },

    /// Generate samples from the latest checkpoint
    Generate {
        /// Directory containing checkpoint_epoch_* directories
        #[arg(short, long)]
        checkpoints: PathBuf,

        /// Class label to generate
        #[arg(short, long, default_value = "0")]
        label: i64,

        /// Output tensor file
        #[arg(short, long, default_value = "samples.pt")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = match cli.verbosity.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Init => {
            let config = ensure_config_exists(&cli.config)?;
            config.validate()?;
            info!("Configuration ready at {}", cli.config.display());
        }
        Commands::TrainSynthetic { num_samples, epochs } => {
            train_synthetic(&cli.config, num_samples, epochs)?;
        }
        Commands::Generate {
            checkpoints,
            label,
            output,
        } => {
            generate_samples(&cli.config, &checkpoints, label, &output)?;
        }
    }

    Ok(())
}

fn build_model(config: &Config) -> Result<Lcgan> {
    let device = config.get_device();
    tch::manual_seed(config.training.seed as i64);

    let mut model = Lcgan::new(config.generator.clone(), config.discriminator.clone(), device)?;
    if let Some(ae_config) = &config.autoencoder {
        let autoencoder = SpectralAutoencoder::from_config(ae_config.clone(), device)?;
        model = model.with_codec(Box::new(autoencoder));
    }
    Ok(model)
}

fn train_synthetic(config_path: &Path, num_samples: usize, epochs: Option<usize>) -> Result<()> {
    let mut config = ensure_config_exists(config_path)?;
    if let Some(epochs) = epochs {
        config.training.epochs = epochs;
    }
    config.validate()?;

    let bands = config
        .autoencoder
        .as_ref()
        .map(|ae| ae.bands)
        .unwrap_or(config.generator.bands);
    let size = config.generator.resolution();

    info!(
        "Training on {} synthetic cubes of {}x{}x{}",
        num_samples, bands, size, size
    );

    let mut loader = DataLoader::synthetic(
        num_samples,
        bands as usize,
        size as usize,
        config.generator.num_classes,
        config.training.batch_size.dis as usize,
        config.training.seed,
    )?;

    let model = build_model(&config)?;
    let save_path = PathBuf::from(&config.training.save_path);
    std::fs::create_dir_all(&save_path)?;
    config.save_toml(&save_path.join("config.toml"))?;

    let mut renderer = TensorFileRenderer::new(&save_path);
    let mut trainer = Trainer::new(model, config.training.clone())?;
    let metrics = trainer.train(&mut loader, None, Some(&mut renderer))?;

    info!(
        "Training finished after {} epochs, final G_loss={:.4}",
        metrics.num_epochs(),
        metrics.latest("gen_loss").unwrap_or(f64::NAN)
    );

    Ok(())
}

fn generate_samples(config_path: &Path, checkpoints: &Path, label: i64, output: &Path) -> Result<()> {
    let config = ensure_config_exists(config_path)?;
    config.validate()?;

    let checkpoint = find_latest_checkpoint(checkpoints)
        .ok_or_else(|| anyhow::anyhow!("no checkpoint found in {}", checkpoints.display()))?;

    let mut model = build_model(&config)?;
    let (epoch, _) = load_checkpoint(&mut model, &checkpoint)?;
    info!("Loaded generator from epoch {}", epoch);

    let batch_size = config.training.batch_size.gen;
    let mut z = Sampler::latent(
        batch_size,
        config.generator.latent_dim,
        config.training.latent_mean,
        config.training.latent_var,
        config.training.seed,
        model.device,
    )?;
    let y = Tensor::full([batch_size], label, (Kind::Int64, model.device));

    let samples = model.generate(z.sample_(), &y)?;
    samples.to_device(tch::Device::Cpu).save(output)?;
    info!("Saved {} samples to {}", batch_size, output.display());

    Ok(())
}
