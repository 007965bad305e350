//! recrename: rename recorded ISDB transport streams.
//!
//! Each input is identified from its broadcast tables, matched against the
//! Syobocal guide and moved to a path built from the configured templates.

use std::path::PathBuf;

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use recrename::config::{load_config, ConfigFile, Options, DEFAULT_CONFIG_FILE};
use recrename::Renamer;
use recrename_guide::SyobocalClient;

mod context;
mod logging;

use context::Args;

const DEFAULT_RETENTION_DAYS: u64 = 7;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load config file: explicit path > auto-detect > default
    let config_path = args.config.clone().or_else(|| {
        let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
        default_path.exists().then_some(default_path)
    });
    let file_config = match &config_path {
        Some(path) => match load_config(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load config file: {}", e);
                return Err(e.into());
            }
        },
        None => ConfigFile::default(),
    };

    let log_dir = args.log_dir.clone().or_else(|| file_config.logging.log_dir.clone());
    let guard = logging::init_logging(
        log_dir.as_deref(),
        file_config
            .logging
            .retention_days
            .unwrap_or(DEFAULT_RETENTION_DAYS),
        args.verbose,
        file_config.logging.level.as_deref(),
    )?;
    if let Some(path) = &config_path {
        info!("Loaded config from: {}", path.display());
    }

    let mut options = Options::from_config(&file_config)?;
    args.apply_to(&mut options)?;

    let mut guide = SyobocalClient::new(options.guide_user.as_str())?;
    if let Some(base_url) = &options.guide_base_url {
        guide = guide.with_base_url(base_url.as_str());
    }

    let renamer = Renamer::new(&options, &guide);
    let style = ProgressStyle::with_template(
        "{spinner} {msg} [{bar:40}] {bytes}/{total_bytes} ({eta})",
    )?
    .progress_chars("=> ");

    let mut failed = 0usize;
    for input in &args.inputs {
        info!("Processing {}", input.display());

        let bar = ProgressBar::new(0)
            .with_style(style.clone())
            .with_message("Checking drops");
        let mut progress = |done: u64, total: u64| {
            bar.set_length(total);
            bar.set_position(done);
        };
        let result = renamer.run(input, &mut progress).await;
        bar.finish_and_clear();

        match result {
            Ok(outcome) => {
                if let Some(category) = outcome.failure {
                    warn!("{} routed to error output ({})", input.display(), category);
                    failed += 1;
                }
            }
            Err(e) => {
                error!("{}: {}", input.display(), e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        error!("{} of {} inputs failed", failed, args.inputs.len());
        drop(guard);
        std::process::exit(1);
    }

    info!("Done");
    Ok(())
}
