use std::{
    collections::BTreeMap,
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use clap::{CommandFactory, Parser, ValueEnum};
use clap_complete::Shell;
use colored::Colorize;
use env_logger::Env;
use geoframes::{
    AltitudeSource, ConversionOptions, ConversionPlan, ConversionSummary, Converter,
    FfmpegLogLevel, FrameSampling, FrameSource, ImageExtension, ProgressCallback, ProgressInfo,
    SkipReason, VideoFile, format_timestamp, read_telemetry_file,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::{Value, json};

const CLI_AFTER_HELP: &str = "Examples:\n  geoframes DJI_0001.SRT DJI_0001.MP4\n  geoframes DJI_0001.SRT DJI_0001.MP4 --out frames --interval 1 --progress\n  geoframes DJI_0001.SRT DJI_0001.MP4 --altitude rel --ext jpg --json\n  geoframes DJI_0001.SRT DJI_0001.MP4 --dry-run\n  geoframes --completions zsh > _geoframes";

#[derive(Debug, Parser)]
#[command(
    name = "geoframes",
    version,
    about = "Extract geotagged JPEG frames from drone video and its telemetry subtitle track",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    /// Telemetry subtitle file (.SRT) recorded with the video.
    #[arg(required_unless_present = "completions")]
    subtitle: Option<PathBuf>,

    /// Video file the telemetry belongs to.
    #[arg(required_unless_present = "completions")]
    video: Option<PathBuf>,

    /// Output directory for tagged frames.
    #[arg(long, default_value = "out")]
    out: PathBuf,

    /// Output file name prefix.
    #[arg(long, default_value = "frame")]
    prefix: String,

    /// Output image extension (jpeg, jpg).
    #[arg(long, default_value = "jpeg", value_parser = parse_extension)]
    ext: ImageExtension,

    /// JPEG quality (1-100).
    #[arg(long, default_value_t = 95, value_parser = clap::value_parser!(u8).range(1..=100))]
    quality: u8,

    /// Convert only every Nth frame.
    #[arg(long, conflicts_with = "interval")]
    every: Option<u64>,

    /// Convert one frame per interval, in seconds (e.g. 1 or 0.5).
    #[arg(long, value_parser = parse_interval)]
    interval: Option<Duration>,

    /// Altitude to tag frames with.
    #[arg(long, value_enum, default_value_t = AltitudeArg::Abs)]
    altitude: AltitudeArg,

    /// Keep frames whose telemetry reports latitude and longitude of 0 (no GPS fix).
    #[arg(long)]
    keep_zero_fix: bool,

    /// Time frames from their own timestamps instead of the declared frame rate.
    #[arg(long)]
    native_timestamps: bool,

    /// Show a progress bar.
    #[arg(long)]
    progress: bool,

    /// Show additional logging output.
    #[arg(long)]
    verbose: bool,

    /// FFmpeg log level (quiet, panic, fatal, error, warning, info, verbose, debug, trace).
    /// Defaults to error, or warning with --verbose.
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<FfmpegLogLevel>,

    /// Print the summary as machine-readable JSON.
    #[arg(long)]
    json: bool,

    /// Parse and match only; list the frames that would be written.
    #[arg(long)]
    dry_run: bool,

    /// Print a shell completion script and exit.
    #[arg(long, value_enum, value_name = "SHELL")]
    completions: Option<Shell>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum AltitudeArg {
    /// Barometric altitude (`abs_alt`).
    Abs,
    /// Height above the take-off point (`rel_alt`).
    Rel,
}

impl From<AltitudeArg> for AltitudeSource {
    fn from(value: AltitudeArg) -> Self {
        match value {
            AltitudeArg::Abs => AltitudeSource::Absolute,
            AltitudeArg::Rel => AltitudeSource::Relative,
        }
    }
}

fn parse_extension(value: &str) -> Result<ImageExtension, String> {
    value.parse()
}

fn parse_interval(value: &str) -> Result<Duration, String> {
    let seconds: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("invalid interval: {value}"))?;
    if !seconds.is_finite() || seconds <= 0.0 {
        return Err("interval must be a positive number of seconds".to_string());
    }
    Duration::try_from_secs_f64(seconds).map_err(|error| error.to_string())
}

fn sampling(every: Option<u64>, interval: Option<Duration>) -> FrameSampling {
    match (every, interval) {
        (Some(step), _) => FrameSampling::EveryNth(step),
        (None, Some(interval)) => FrameSampling::Interval(interval),
        (None, None) => FrameSampling::All,
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter))
        .format(|buf, record| {
            let level = match record.level() {
                log::Level::Error => "ERROR".bright_red(),
                log::Level::Warn => "WARN ".yellow(),
                log::Level::Info => "INFO ".green(),
                log::Level::Debug => "DEBUG".blue(),
                log::Level::Trace => "TRACE".magenta(),
            };
            writeln!(buf, "{level} {}", record.args())
        })
        .init();
}

struct TerminalProgress {
    bar: ProgressBar,
}

impl TerminalProgress {
    fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let bar = ProgressBar::new(0);
        let style =
            ProgressStyle::with_template("{spinner:.green} {bar:40.cyan/blue} {pos}/{len} {msg}")?;
        bar.set_style(style.progress_chars("##-"));
        Ok(Self { bar })
    }
}

impl ProgressCallback for TerminalProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        if let Some(total) = info.total {
            self.bar.set_length(total);
        }
        self.bar.set_position(info.current);
        self.bar
            .set_message(format!("{} written, {} skipped", info.written, info.skipped));
    }
}

fn skipped_json(skipped: &BTreeMap<SkipReason, u64>) -> Value {
    let reasons: serde_json::Map<String, Value> = SkipReason::ALL
        .iter()
        .map(|reason| {
            let count = skipped.get(reason).copied().unwrap_or(0);
            (reason.as_str().to_string(), json!(count))
        })
        .collect();
    Value::Object(reasons)
}

fn summary_json(summary: &ConversionSummary, options: &ConversionOptions) -> Value {
    json!({
        "output_directory": options.output_directory().display().to_string(),
        "written": summary.written_count(),
        "skipped": summary.skipped_count(),
        "skipped_by_reason": skipped_json(&summary.skipped),
        "files": summary
            .written
            .iter()
            .map(|path| path.display().to_string())
            .collect::<Vec<_>>(),
    })
}

fn plan_json(plan: &ConversionPlan) -> Value {
    json!({
        "frames": plan.frames.iter().map(|frame| json!({
            "frame_index": frame.frame_index,
            "timestamp": frame.timestamp.as_secs_f64(),
            "sequence_index": frame.sequence_index,
            "latitude": frame.latitude,
            "longitude": frame.longitude,
            "path": frame.path.display().to_string(),
        })).collect::<Vec<_>>(),
        "skipped_by_reason": skipped_json(&plan.skipped),
    })
}

fn print_skip_warning(skipped: &BTreeMap<SkipReason, u64>) {
    if skipped.is_empty() {
        return;
    }
    let reasons: Vec<String> = skipped
        .iter()
        .map(|(reason, count)| format!("{count} {reason}"))
        .collect();
    eprintln!(
        "{} {}",
        "warning:".yellow().bold(),
        format!("skipped {}", reasons.join(", ")).yellow()
    );
}

fn dry_run(
    cli: &Cli,
    subtitle: &Path,
    video: &Path,
    options: ConversionOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let track = read_telemetry_file(subtitle, options.parse_options())?;
    let source = if options.native_timestamps() {
        VideoFile::open_with_native_timestamps(video)?
    } else {
        VideoFile::open(video)?
    };
    let plan = Converter::new(options).plan(&track, source.timing())?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&plan_json(&plan))?);
    } else {
        for frame in &plan.frames {
            println!(
                "{}  frame {} at {}  record {}  ({:.6}, {:.6})",
                frame.path.display(),
                frame.frame_index,
                format_timestamp(frame.timestamp),
                frame.sequence_index,
                frame.latitude,
                frame.longitude
            );
        }
        print_skip_warning(&plan.skipped);
    }

    if plan.frames.is_empty() {
        return Err("no frames would be written".into());
    }
    if !cli.json {
        println!(
            "{} {}",
            "success:".green().bold(),
            format!("{} frame(s) would be written", plan.frames.len()).green()
        );
    }
    Ok(())
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Some(shell) = cli.completions {
        let mut command = Cli::command();
        clap_complete::generate(shell, &mut command, "geoframes", &mut std::io::stdout());
        return Ok(());
    }

    init_logging(cli.verbose);

    geoframes::set_ffmpeg_log_level(
        cli.log_level
            .unwrap_or_else(|| FfmpegLogLevel::for_verbosity(cli.verbose)),
    );

    let subtitle = cli.subtitle.clone().ok_or("missing SUBTITLE argument")?;
    let video = cli.video.clone().ok_or("missing VIDEO argument")?;

    let mut options = ConversionOptions::new()
        .with_output_dir(cli.out.clone())
        .with_prefix(cli.prefix.clone())
        .with_extension(cli.ext)
        .with_jpeg_quality(cli.quality)
        .with_sampling(sampling(cli.every, cli.interval))
        .with_altitude_source(cli.altitude.into())
        .with_keep_zero_fix(cli.keep_zero_fix)
        .with_native_timestamps(cli.native_timestamps);

    if cli.dry_run {
        return dry_run(&cli, &subtitle, &video, options);
    }

    let progress = if cli.progress {
        let progress = Arc::new(TerminalProgress::new()?);
        options = options.with_progress(progress.clone());
        Some(progress)
    } else {
        None
    };

    let summary = geoframes::convert(&subtitle, &video, &options)?;

    if let Some(progress) = progress {
        progress.bar.finish_with_message("done");
    }

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&summary_json(&summary, &options))?
        );
    } else {
        print_skip_warning(&summary.skipped);
        if cli.verbose {
            for path in &summary.written {
                eprintln!("wrote {}", path.display());
            }
        }
    }

    let summary = summary.into_result()?;
    if !cli.json {
        println!(
            "{} {}",
            "success:".green().bold(),
            format!(
                "Wrote {} geotagged frame(s) to {}",
                summary.written_count(),
                options.output_directory().display()
            )
            .green()
        );
    }
    Ok(())
}

fn main() {
    if let Err(error) = run() {
        eprintln!("{} {error}", "error:".red().bold());
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_interval_accepts_fractional_seconds() {
        assert_eq!(parse_interval("1").unwrap(), Duration::from_secs(1));
        assert_eq!(parse_interval("0.5").unwrap(), Duration::from_millis(500));
        assert!(parse_interval("0").is_err());
        assert!(parse_interval("-2").is_err());
        assert!(parse_interval("soon").is_err());
    }

    #[test]
    fn sampling_prefers_every_then_interval() {
        assert_eq!(sampling(None, None), FrameSampling::All);
        assert_eq!(sampling(Some(30), None), FrameSampling::EveryNth(30));
        assert_eq!(
            sampling(None, Some(Duration::from_secs(2))),
            FrameSampling::Interval(Duration::from_secs(2))
        );
    }

    #[test]
    fn cli_parses_positional_inputs_and_defaults() {
        let cli = Cli::try_parse_from(["geoframes", "clip.srt", "clip.mp4"]).unwrap();
        assert_eq!(cli.subtitle, Some(PathBuf::from("clip.srt")));
        assert_eq!(cli.video, Some(PathBuf::from("clip.mp4")));
        assert_eq!(cli.out, PathBuf::from("out"));
        assert_eq!(cli.ext, ImageExtension::Jpeg);
        assert_eq!(cli.quality, 95);
        assert_eq!(cli.altitude, AltitudeArg::Abs);
    }

    #[test]
    fn cli_rejects_conflicting_sampling_and_missing_inputs() {
        assert!(
            Cli::try_parse_from(["geoframes", "a.srt", "a.mp4", "--every", "2", "--interval", "1"])
                .is_err()
        );
        assert!(Cli::try_parse_from(["geoframes", "a.srt"]).is_err());
        assert!(Cli::try_parse_from(["geoframes", "--completions", "bash"]).is_ok());
    }

    #[test]
    fn cli_validates_quality_and_extension() {
        assert!(Cli::try_parse_from(["geoframes", "a.srt", "a.mp4", "--quality", "0"]).is_err());
        assert!(Cli::try_parse_from(["geoframes", "a.srt", "a.mp4", "--ext", "png"]).is_err());
        let cli = Cli::try_parse_from(["geoframes", "a.srt", "a.mp4", "--ext", "jpg"]).unwrap();
        assert_eq!(cli.ext, ImageExtension::Jpg);
    }

    #[test]
    fn cli_parses_ffmpeg_log_level() {
        let cli =
            Cli::try_parse_from(["geoframes", "a.srt", "a.mp4", "--log-level", "quiet"]).unwrap();
        assert_eq!(cli.log_level, Some(FfmpegLogLevel::Quiet));
        assert!(Cli::try_parse_from(["geoframes", "a.srt", "a.mp4", "--log-level", "loud"]).is_err());
    }
}
