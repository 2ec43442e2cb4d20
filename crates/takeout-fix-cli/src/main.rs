use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use takeout_fix_core::{ProcessOptions, ProcessResult};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "takeout-fix",
    version,
    about = "Remove duplicates from an extracted photo export and restore capture dates"
)]
struct Cli {
    /// Extracted export folder
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Output directory
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Load options from a JSON file; --input/--output override it
    #[arg(long)]
    options: Option<PathBuf>,

    /// Organize into YYYY/MM subdirectories
    #[arg(long)]
    divide_to_dates: bool,

    /// Do not delete byte-identical duplicates from the input
    #[arg(long)]
    keep_duplicates: bool,

    /// Skip -edited, -effects and similar derivative images
    #[arg(long)]
    skip_extras: bool,

    /// Disable date guessing from filenames
    #[arg(long)]
    no_guess: bool,

    /// Write albums.json for folders that carry album metadata
    #[arg(long)]
    albums: bool,

    /// Output path for albums.json (default: <output>/albums.json)
    #[arg(long)]
    album_json: Option<PathBuf>,

    /// Directory for the diagnostic lists (default: <output>)
    #[arg(long)]
    report_dir: Option<PathBuf>,

    /// Interpret timestamps in the local time zone instead of UTC
    #[arg(long)]
    local_time: bool,

    /// Copy files as they are, without restoring dates
    #[arg(long)]
    dont_fix: bool,

    /// Only deduplicate and report; write no output files
    #[arg(long)]
    dont_copy: bool,

    /// More log output (-v debug, -vv trace); RUST_LOG wins when set
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn into_options(self) -> anyhow::Result<ProcessOptions> {
        let mut options = match &self.options {
            Some(path) => {
                let text = fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))?;
                serde_json::from_str(&text).with_context(|| format!("invalid options file {}", path.display()))?
            }
            None => ProcessOptions::default(),
        };

        if let Some(input) = self.input {
            options.input = input;
        }
        if let Some(output) = self.output {
            options.output = output;
        }
        anyhow::ensure!(!options.input.as_os_str().is_empty(), "no input folder given (--input)");
        anyhow::ensure!(!options.output.as_os_str().is_empty(), "no output folder given (--output)");

        options.divide_to_dates |= self.divide_to_dates;
        options.keep_duplicates |= self.keep_duplicates;
        options.skip_extras |= self.skip_extras;
        options.no_guess |= self.no_guess;
        options.albums |= self.albums;
        options.local_time |= self.local_time;
        options.dont_fix |= self.dont_fix;
        options.dont_copy |= self.dont_copy;
        if self.album_json.is_some() {
            options.album_json = self.album_json;
        }
        if self.report_dir.is_some() {
            options.report_dir = self.report_dir;
        }
        Ok(options)
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "takeout_fix_core=debug,info",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_summary(result: &ProcessResult, elapsed: f64) {
    let report = &result.report;
    eprintln!(
        "Done! {} media files, {} duplicates removed, {} files written, {} skipped ({:.2}s)",
        result.total_media, result.duplicates_removed, result.files_written, result.files_skipped, elapsed
    );
    for (provenance, count) in &report.dates_by_provenance {
        eprintln!("  dated from {:<18} {}", provenance.to_string(), count);
    }
    for category in report.categories() {
        eprintln!("  {:<26} {}", category.file_name, category.paths.len());
    }
    for path in &result.report_files {
        eprintln!("Report: {}", path.display());
    }
    if let Some(path) = &result.albums_json {
        eprintln!("Albums: {}", path.display());
    }
    if !result.warnings.is_empty() {
        eprintln!("{} warning(s):", result.warnings.len());
        for w in &result.warnings {
            eprintln!("  {}", w);
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let t_total = Instant::now();
    let options = cli.into_options()?;

    let pb = ProgressBar::new(0);
    pb.set_style(ProgressStyle::default_bar().template("{prefix:>6} [{bar:40.cyan/blue}] {pos}/{len} {msg}")?);

    let result = takeout_fix_core::process(&options, &|stage, current, total, message| {
        pb.set_prefix(stage.to_string());
        pb.set_length(total);
        pb.set_position(current);
        pb.set_message(message.to_string());
    });
    pb.finish_and_clear();

    print_summary(&result?, t_total.elapsed().as_secs_f64());
    Ok(())
}
