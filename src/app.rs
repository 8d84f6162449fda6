//! CLI surface and process wiring.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;

use crate::config::{Config, FileConfigProvider, OutputFormat};
use crate::flow::FlowEngine;
use crate::fonts::{FontHandle, FontResolver};
use crate::input;
use crate::render::Renderer;
use crate::telegram::{InboundMessage, TelegramChannel, spawn_supervised_listener};

/// `stampbot` - Telegram bot that stamps an amount and timestamp onto a template image.
#[derive(Parser, Debug)]
#[command(name = "stampbot")]
#[command(version = "0.1.0")]
#[command(about = "Telegram bot that stamps an amount and timestamp onto a template image.", long_about = None)]
pub struct Cli {
    /// Path to the TOML config file
    #[arg(long, default_value = "config.toml", global = true)]
    pub config: PathBuf,

    /// Verbose logging (DEBUG level)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the bot (default when no subcommand is given)
    Run,

    /// Check config, template, fonts, and Telegram connectivity
    Doctor,

    /// Render one stamp without Telegram, for placement tuning
    Render {
        /// Amount text, e.g. "320,5" or "-1000"
        #[arg(long)]
        amount: String,

        /// Timestamp in the configured format
        #[arg(long)]
        time: String,

        /// Output file (defaults to stamp.<ext> in the working directory)
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

pub async fn dispatch(cli: Cli) -> Result<()> {
    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(&cli.config).await,
        Commands::Doctor => doctor(&cli.config).await,
        Commands::Render { amount, time, out } => {
            render_once(&cli.config, &amount, &time, out.as_deref())
        }
    }
}

/// Start the listener and drive the dispatch loop until ctrl-c.
async fn run(config_path: &Path) -> Result<()> {
    let config = Config::load(config_path)?;
    config.validate()?;
    config.apply_locale();
    let token = config.require_token()?.to_string();

    let channel = Arc::new(TelegramChannel::new(
        token,
        config.telegram.allowed_users.clone(),
    ));
    let provider = Arc::new(FileConfigProvider::new(config_path.to_path_buf()));
    let engine = FlowEngine::new(provider, Arc::clone(&channel) as _);

    println!("◆ {}", t!("run.title"));
    println!("  {}", t!("run.listening"));

    let (tx, mut rx) = mpsc::channel::<InboundMessage>(100);
    let listener = spawn_supervised_listener(Arc::clone(&channel), tx);

    let dispatch = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Err(e) = engine.handle(msg.chat, &msg.text).await {
                tracing::error!("delivery failed for chat {}: {e}", msg.chat);
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received, draining");

    // Stop the intake first; the dispatch loop then drains and exits once
    // the listener's sender is gone.
    listener.abort();
    let _ = listener.await;
    let _ = dispatch.await;
    Ok(())
}

/// Report on each dependency of a successful render and exit non-zero if
/// any hard requirement is missing.
async fn doctor(config_path: &Path) -> Result<()> {
    let loaded = Config::load(config_path);
    if let Ok(config) = &loaded {
        config.apply_locale();
    }

    println!("◆ {}", t!("doctor.title"));
    println!();

    let mut failures = 0_u32;

    let config = match loaded {
        Ok(config) => Some(config),
        Err(e) => {
            failures += 1;
            println!("  ✗ {}", t!("doctor.config_bad", error = e));
            None
        }
    };

    if let Some(config) = &config {
        match config.validate() {
            Ok(()) => println!("  ✓ {}", t!("doctor.config_ok", path = config_path.display())),
            Err(e) => {
                failures += 1;
                println!("  ✗ {}", t!("doctor.config_bad", error = e));
            }
        }

        let template = config.render.template_path();
        match image::open(&template) {
            Ok(img) => println!(
                "  ✓ {}",
                t!(
                    "doctor.template_ok",
                    path = template.display(),
                    width = img.width(),
                    height = img.height()
                )
            ),
            Err(e) => {
                failures += 1;
                println!(
                    "  ✗ {}",
                    t!("doctor.template_bad", path = template.display(), error = e)
                );
            }
        }

        let resolver = FontResolver::new(config.render.base_dir.clone());
        for (role, placement) in [("amount", &config.render.amount), ("time", &config.render.time)]
        {
            match resolver.load(placement.font.as_deref(), placement.size) {
                FontHandle::Scalable(_) => {
                    println!("  ✓ {}", t!("doctor.font_scalable", role = role));
                }
                FontHandle::Bitmap(_) => {
                    println!("  ! {}", t!("doctor.font_bitmap", role = role));
                }
            }
        }

        match config.require_token() {
            Ok(token) => {
                let channel =
                    TelegramChannel::new(token, config.telegram.allowed_users.clone());
                match channel.get_me().await {
                    Ok(username) => {
                        println!("  ✓ {}", t!("doctor.telegram_ok", username = username));
                    }
                    Err(e) => {
                        failures += 1;
                        println!("  ✗ {}", t!("doctor.telegram_bad", error = e));
                    }
                }
            }
            Err(e) => {
                failures += 1;
                println!("  ✗ {}", t!("doctor.token_missing", error = e));
            }
        }
    }

    println!();
    if failures == 0 {
        println!("{}", t!("doctor.all_good"));
        Ok(())
    } else {
        anyhow::bail!(t!("doctor.failures", count = failures))
    }
}

/// One render through the same pipeline the bot uses, written to `out`.
fn render_once(
    config_path: &Path,
    amount_raw: &str,
    time_raw: &str,
    out: Option<&Path>,
) -> Result<()> {
    let config = Config::load(config_path)?;
    config.validate()?;

    let Some(canonical) = input::normalize_amount(amount_raw) else {
        anyhow::bail!("invalid amount: {amount_raw:?}");
    };
    let pattern = config.render.time_format.clone();
    let Some(parsed) = input::parse_time(time_raw, &pattern) else {
        anyhow::bail!("invalid time {time_raw:?}, expected the pattern {pattern:?}");
    };
    let Some(time_text) = input::format_time(parsed, &pattern) else {
        anyhow::bail!("time format pattern {pattern:?} is not renderable");
    };

    let extension = OutputFormat::parse(&config.render.output_format)
        .map_or("jpg", OutputFormat::extension);
    let dest = out.map_or_else(|| PathBuf::from(format!("stamp.{extension}")), Path::to_path_buf);

    let renderer = Renderer::new(config.render);
    let artifact = renderer.render(&input::format_amount_display(&canonical), &time_text)?;

    // Artifacts live in the temp dir; move the result where asked. Copy and
    // remove instead of rename so crossing filesystems works.
    std::fs::copy(&artifact, &dest)?;
    std::fs::remove_file(&artifact)?;
    println!("{}", dest.display());
    Ok(())
}
