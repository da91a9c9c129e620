use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use clipshrink::config::Config;
use clipshrink::engine::{max_search_attempts, read_header, shrink_files, BatchOutcome, Source};
use clipshrink::notify::format_bytes;
use std::path::{Path, PathBuf};

/// Keep clipboard images under a pixel and byte budget.
#[derive(Parser, Debug)]
#[command(name = "clipshrink", version)]
#[command(about = "Shrink oversized clipboard images in place")]
struct Cli {
    /// Config file (default: <config dir>/clipshrink/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Longer-side limit in pixels, overrides the config file
    #[arg(long, global = true)]
    max_dimension: Option<u32>,

    /// Byte limit, overrides the config file
    #[arg(long, global = true)]
    max_bytes: Option<usize>,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Watch the system clipboard and replace oversized images
    Watch {
        /// Also save every encoded result to the output directory
        #[arg(long)]
        save_outputs: bool,

        /// Directory for saved results
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Do not keep a history log
        #[arg(long)]
        no_history: bool,

        /// Process the image already on the clipboard at startup
        #[arg(long)]
        process_existing: bool,
    },
    /// Shrink image files into a directory
    Shrink {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Output directory
        #[arg(short, long, default_value = "shrunk")]
        output_dir: PathBuf,
    },
    /// Show dimensions and format of an image and whether it fits the limits
    Inspect { file: PathBuf },
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load(cli.config.as_deref()).context("failed to load config")?;
    if let Some(max_dimension) = cli.max_dimension {
        config.max_dimension = max_dimension;
    }
    if let Some(max_bytes) = cli.max_bytes {
        config.max_bytes = max_bytes;
    }
    config.validate()?;
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    clipshrink::logging::init(cli.verbose);
    let config = load_config(&cli)?;

    match cli.command {
        Command::Watch {
            save_outputs,
            ref output_dir,
            no_history,
            process_existing,
        } => {
            let mut config = config;
            config.save_outputs |= save_outputs;
            if output_dir.is_some() {
                config.output_dir = output_dir.clone();
            }
            watch(&config, !no_history, process_existing)
        }
        Command::Shrink {
            ref files,
            ref output_dir,
        } => shrink(&config, files, output_dir),
        Command::Inspect { ref file } => inspect(&config, file),
    }
}

#[cfg(feature = "system-clipboard")]
fn watch(config: &Config, keep_history: bool, process_existing: bool) -> Result<()> {
    use clipshrink::clipboard::SystemClipboard;
    use clipshrink::history::HistoryLog;
    use clipshrink::notify::{LogNotifier, NotificationSink, SilentNotifier};
    use clipshrink::watcher::ClipboardWatcher;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    fn run_with<N: NotificationSink>(
        config: &Config,
        notifier: N,
        history: Option<Arc<HistoryLog>>,
        process_existing: bool,
    ) -> Result<()> {
        let clipboard = SystemClipboard::new().context("cannot open the system clipboard")?;
        let mut watcher = ClipboardWatcher::new(clipboard, notifier, config.constraints()?)
            .with_settings(config.encode_settings())
            .with_poll_interval(config.poll_interval())
            .with_self_write_grace(config.self_write_grace())
            .process_existing(process_existing);
        if let Some(history) = history {
            watcher = watcher.with_history(history);
        }
        // Runs until the process is interrupted.
        let stop = AtomicBool::new(false);
        watcher.run(&stop);
        Ok(())
    }

    let history = if keep_history {
        let mut log = HistoryLog::open(config.history_path(), config.max_history_entries)
            .context("failed to open history log")?;
        if config.save_outputs {
            log = log.with_output_dir(config.output_dir());
        }
        Some(Arc::new(log))
    } else {
        None
    };

    if config.notifications {
        run_with(config, LogNotifier, history, process_existing)
    } else {
        run_with(config, SilentNotifier, history, process_existing)
    }
}

#[cfg(not(feature = "system-clipboard"))]
fn watch(_config: &Config, _keep_history: bool, _process_existing: bool) -> Result<()> {
    anyhow::bail!("clipshrink was built without the `system-clipboard` feature")
}

fn shrink(config: &Config, files: &[PathBuf], output_dir: &Path) -> Result<()> {
    let results = shrink_files(
        files,
        output_dir,
        &config.constraints()?,
        &config.encode_settings(),
    )?;

    let mut failures = 0usize;
    for result in &results {
        match &result.outcome {
            Ok(BatchOutcome::Unchanged {
                width,
                height,
                bytes,
            }) => println!(
                "{}: {width}×{height} {} already within limits",
                result.source.display(),
                format_bytes(*bytes)
            ),
            Ok(BatchOutcome::Written {
                path,
                format,
                original,
                resized,
                original_bytes,
                new_bytes,
            }) => println!(
                "{}: {}×{} → {}×{} · {} → {} ({format}) → {}",
                result.source.display(),
                original.0,
                original.1,
                resized.0,
                resized.1,
                format_bytes(*original_bytes),
                format_bytes(*new_bytes),
                path.display()
            ),
            Err(message) => {
                failures += 1;
                eprintln!("{}: {message}", result.source.display());
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{failures} of {} files failed", results.len());
    }
    Ok(())
}

fn inspect(config: &Config, file: &Path) -> Result<()> {
    let source = Source::open(file)?;
    let header = read_header(source.as_bytes())
        .with_context(|| format!("cannot read image header of {}", file.display()))?;
    let constraints = config.constraints()?;

    let format = header
        .format
        .map(|f| format!("{f:?}").to_lowercase())
        .unwrap_or_else(|| "unknown".to_string());
    println!("file:       {}", file.display());
    println!("format:     {format}");
    println!("dimensions: {}×{}", header.width, header.height);
    println!("size:       {}", format_bytes(source.len()));

    let fits = constraints.fits_dimension(header.width, header.height)
        && source.len() <= constraints.max_bytes;
    if fits {
        println!("status:     within limits");
    } else {
        println!(
            "status:     exceeds limits ({}px, {}); up to {} resize tiers before fallback",
            constraints.max_dimension,
            format_bytes(constraints.max_bytes),
            max_search_attempts(constraints.max_dimension)
        );
    }
    Ok(())
}
