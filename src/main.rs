use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use console::style;
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};
use polysub::audio::check_ffmpeg;
use polysub::config::{Config, FailurePolicy, OutputFormat};
use polysub::languages::SUPPORTED_LANGUAGES;
use polysub::{
    print_summary, CancelFlag, ProgressEvent, ProgressReporter, TranslateRequest, VideoTranslator,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "polysub")]
#[command(version, about = "Translate a video's speech into subtitles in several languages")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate translated subtitle files for a video
    Translate(TranslateArgs),
    /// List supported language codes
    Languages,
    /// Print the version
    Version,
}

#[derive(Args)]
struct TranslateArgs {
    /// Input video file
    video: PathBuf,

    /// Target language code; repeat or comma-separate for several
    #[arg(short = 'l', long = "language", value_delimiter = ',')]
    languages: Vec<String>,

    /// Output directory for subtitle files
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Subtitle format: srt, vtt
    #[arg(short, long)]
    format: Option<String>,

    /// Configuration file (TOML, or JSON with a .json extension)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Skip the confirmation for unrecognized video extensions
    #[arg(short = 'y', long)]
    yes: bool,

    /// Keep going when one language fails and write the others
    #[arg(long)]
    keep_going: bool,
}

/// Console logging plus a daily log file in `log_dir`.
fn init_logging(verbose: bool, config: &Config) -> Result<WorkerGuard> {
    let filter = if verbose {
        EnvFilter::new("polysub=debug")
    } else {
        EnvFilter::try_new(format!("polysub={}", config.log_level))
            .unwrap_or_else(|_| EnvFilter::new("polysub=info"))
    };

    let file_appender = tracing_appender::rolling::daily(&config.log_dir, "polysub.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact();

    let file_layer = fmt::layer()
        .with_writer(file_writer)
        .with_target(false)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(guard)
}

/// Fold command line flags into the loaded configuration.
fn apply_overrides(config: &mut Config, args: &TranslateArgs) -> Result<()> {
    if let Some(ref dir) = args.output_dir {
        config.output_dir = dir.clone();
    }
    if let Some(ref format) = args.format {
        config.subtitle_format = format
            .parse::<OutputFormat>()
            .map_err(|e| anyhow::anyhow!(e))?;
    }
    let languages: Vec<String> = args
        .languages
        .iter()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect();
    if !languages.is_empty() {
        config.target_languages = languages;
    }
    if args.keep_going {
        config.failure_policy = FailurePolicy::Isolate;
    }
    Ok(())
}

fn progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(100);
    let style = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>3}% {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("█▓░");
    pb.set_style(style);
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn confirm_extension(video: &Path, config: &Config) -> Result<bool> {
    warn!(
        "{} does not have a known video extension ({})",
        video.display(),
        config.video_extensions.join(", ")
    );
    Confirm::new()
        .with_prompt("Process it anyway?")
        .default(false)
        .interact()
        .context("Failed to read confirmation")
}

async fn run_translate(args: TranslateArgs) -> Result<()> {
    let (mut config, source) =
        Config::resolve(args.config.as_deref()).context("Failed to load configuration")?;
    apply_overrides(&mut config, &args)?;
    config
        .ensure_directories()
        .context("Failed to create working directories")?;

    let _guard = init_logging(args.verbose, &config)?;
    source.log();

    config.validate().context("Configuration validation failed")?;

    if !args.video.exists() {
        anyhow::bail!("Input file not found: {}", args.video.display());
    }
    if !config.is_supported_video(&args.video) && !args.yes && !confirm_extension(&args.video, &config)? {
        println!("Cancelled.");
        return Ok(());
    }

    check_ffmpeg().await?;

    info!("Input:     {}", args.video.display());
    info!("Output:    {}", config.output_dir.display());
    info!("Format:    {}", config.subtitle_format);
    info!("Languages: {}", config.target_languages.join(", "));

    let pipeline = VideoTranslator::from_config(config)?;
    let request = TranslateRequest::from_config(&args.video, pipeline.config());

    let pb = progress_bar();
    let bar = pb.clone();
    let reporter = ProgressReporter::new(Arc::new(move |event: &ProgressEvent| {
        if let Some(percent) = event.percent {
            bar.set_position((percent * 100.0).round() as u64);
        }
        bar.set_message(format!("{}: {}", event.stage, event.message));
    }));

    let cancel = CancelFlag::new();
    let handler_flag = cancel.clone();
    ctrlc::set_handler(move || {
        eprintln!("\nCancelling after the current stage...");
        handler_flag.cancel();
    })
    .context("Failed to install Ctrl+C handler")?;

    let result = pipeline.process_video(&request, &reporter, &cancel).await;

    match result {
        Ok(result) => {
            pb.finish_with_message("Done");
            print_summary(&result);
            Ok(())
        }
        Err(e) => {
            pb.abandon_with_message("Failed");
            Err(e).context(format!("Failed to process {}", args.video.display()))
        }
    }
}

fn print_languages() {
    println!("{}", style("Supported languages").bold());
    println!();
    for (code, name) in SUPPORTED_LANGUAGES {
        println!("  {:<8} {}", style(code).cyan(), name);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Translate(args) => run_translate(args).await,
        Commands::Languages => {
            print_languages();
            Ok(())
        }
        Commands::Version => {
            println!("polysub {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn translate_args(argv: &[&str]) -> TranslateArgs {
        let cli = Cli::try_parse_from(argv).unwrap();
        match cli.command {
            Commands::Translate(args) => args,
            _ => panic!("expected translate subcommand"),
        }
    }

    #[test]
    fn test_language_flags_repeat_and_split() {
        let args = translate_args(&["polysub", "translate", "talk.mp4", "-l", "fr,de", "-l", "ja"]);
        assert_eq!(args.languages, vec!["fr", "de", "ja"]);
        assert_eq!(args.video, PathBuf::from("talk.mp4"));
    }

    #[test]
    fn test_apply_overrides() {
        let args = translate_args(&[
            "polysub",
            "translate",
            "talk.mp4",
            "-l",
            "es",
            "-o",
            "/tmp/subs",
            "-f",
            "vtt",
            "--keep-going",
        ]);
        let mut config = Config::default();
        apply_overrides(&mut config, &args).unwrap();

        assert_eq!(config.target_languages, vec!["es"]);
        assert_eq!(config.output_dir, PathBuf::from("/tmp/subs"));
        assert_eq!(config.subtitle_format, OutputFormat::Vtt);
        assert_eq!(config.failure_policy, FailurePolicy::Isolate);
    }

    #[test]
    fn test_overrides_keep_config_languages_when_flag_absent() {
        let args = translate_args(&["polysub", "translate", "talk.mp4"]);
        let mut config = Config {
            target_languages: vec!["ko".to_string()],
            ..Default::default()
        };
        apply_overrides(&mut config, &args).unwrap();
        assert_eq!(config.target_languages, vec!["ko"]);
        assert_eq!(config.failure_policy, FailurePolicy::Abort);
    }

    #[test]
    fn test_bad_format_is_rejected() {
        let args = translate_args(&["polysub", "translate", "talk.mp4", "-f", "ass"]);
        assert!(apply_overrides(&mut Config::default(), &args).is_err());
    }

    #[test]
    fn test_subcommands_parse() {
        assert!(matches!(
            Cli::try_parse_from(["polysub", "languages"]).unwrap().command,
            Commands::Languages
        ));
        assert!(matches!(
            Cli::try_parse_from(["polysub", "version"]).unwrap().command,
            Commands::Version
        ));
    }
}
