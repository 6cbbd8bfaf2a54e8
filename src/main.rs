mod analysis;
mod capture;
mod models;
mod utils;

use clap::Parser;
use futures::StreamExt;
use log::{debug, info};
use regex::bytes::Regex;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

use crate::analysis::percentile::normalize_percentiles;
use crate::analysis::report::ReportOptions;
use crate::capture::acquire::{CaptureAcquirer, Target};
use crate::capture::credentials::{CredentialProvider, StaticCredentials, TerminalCredentials};
use crate::capture::manager::{CaptureManager, Job};
use crate::models::config::AppConfig;
use crate::utils::error::{AppError, AppResult};
use crate::utils::logging;
use crate::utils::resolve::HostResolver;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Capture queue protocol traffic and report per-operation, per-host and per-queue usage")]
struct Args {
    /// Hosts to capture on over ssh
    targets: Vec<String>,

    /// Capture on this machine instead of over ssh
    #[clap(short, long)]
    local: bool,

    /// Run tcpdump through sudo (prompts for the password once)
    #[clap(long)]
    sudo: bool,

    /// Show reverse-resolved names for source hosts
    #[clap(short = 'n', long)]
    resolve: bool,

    /// Only print reports and errors
    #[clap(short, long)]
    quiet: bool,

    /// Print debug diagnostics
    #[clap(short, long)]
    verbose: bool,

    /// Print the commands that would run, without running them
    #[clap(long)]
    dry_run: bool,

    /// Hide the all/matched/filtered table
    #[clap(long)]
    no_summary: bool,

    /// Hide the per-host table
    #[clap(long)]
    no_hosts: bool,

    /// Hide the per-queue table
    #[clap(long)]
    no_queues: bool,

    /// Only count payloads matching this regular expression
    #[clap(short, long)]
    filter: Option<String>,

    /// Track enqueue sizes and report their percentiles
    #[clap(short, long)]
    sizes: bool,

    /// Percentiles to report for enqueue sizes (implies --sizes)
    #[clap(long, value_delimiter = ',')]
    percentiles: Option<Vec<f64>>,

    /// Network interface to capture from
    #[clap(short, long)]
    interface: Option<String>,

    /// Queue server port
    #[clap(short, long)]
    port: Option<u16>,

    /// Bytes captured per packet
    #[clap(long)]
    snaplen: Option<u32>,

    /// Packets captured per host
    #[clap(short, long)]
    count: Option<u64>,

    /// Hosts processed concurrently
    #[clap(short, long)]
    jobs: Option<usize>,

    /// Keep capture files in this directory
    #[clap(long)]
    output_dir: Option<PathBuf>,

    /// JSON config file (default: ~/.queuesnoop.json)
    #[clap(long)]
    config: Option<PathBuf>,

    /// Reprocess an existing capture file instead of capturing (repeatable)
    #[clap(short = 'r', long = "read")]
    read: Vec<PathBuf>,

    /// Log level (trace, debug, info, warn, error, off)
    #[clap(long, default_value = "info")]
    log_level: String,
}

impl Args {
    /// Command-line values override the config file
    fn apply_to(&self, config: &mut AppConfig) {
        if let Some(interface) = &self.interface {
            config.interface = interface.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(snaplen) = self.snaplen {
            config.snaplen = snaplen;
        }
        if let Some(count) = self.count {
            config.count = count;
        }
        if let Some(jobs) = self.jobs {
            config.jobs = jobs;
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = Some(dir.clone());
        }
        if let Some(percentiles) = &self.percentiles {
            config.percentiles = percentiles.clone();
        }
    }

    fn jobs(&self) -> AppResult<Vec<Job>> {
        if !self.read.is_empty() {
            return Ok(self.read.iter().cloned().map(Job::Reprocess).collect());
        }
        if self.local {
            if !self.targets.is_empty() {
                return Err(AppError::ConfigError(format!(
                    "--local captures on this machine only, drop the target hosts ({})",
                    self.targets.join(", ")
                )));
            }
            return Ok(vec![Job::Capture(Target::Local)]);
        }
        if self.targets.is_empty() {
            return Err(AppError::NoTargets);
        }
        Ok(self
            .targets
            .iter()
            .map(|host| Job::Capture(Target::Remote { host: host.clone() }))
            .collect())
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    logging::init_logger(logging::effective_level(&args.log_level, args.quiet, args.verbose));
    info!("Starting queuesnoop v{}", env!("CARGO_PKG_VERSION"));

    let code = match run(args).await {
        Ok(code) => code,
        Err(e) => {
            print_error(None, &e);
            e.exit_code()
        }
    };
    std::process::exit(code);
}

/// Run every job; returns the exit code of the first failed job, or 0
async fn run(args: Args) -> AppResult<i32> {
    let mut config = AppConfig::load(args.config.as_deref())?;
    args.apply_to(&mut config);
    config.validate()?;
    debug!("Effective configuration: {:?}", config);

    let filter = args.filter.as_deref().map(Regex::new).transpose()?;
    let jobs = args.jobs()?;

    let options = ReportOptions {
        summary: !args.no_summary,
        hosts: !args.no_hosts,
        queues: !args.no_queues,
        sizes: args.sizes || args.percentiles.is_some(),
        percentiles: normalize_percentiles(&config.percentiles),
    };

    let captures = jobs.iter().any(|job| matches!(job, Job::Capture(_)));
    let acquirer = if captures {
        let secret = if args.sudo && !args.dry_run {
            Some(sudo_password()?)
        } else {
            None
        };
        Some(CaptureAcquirer::new(config.clone(), args.sudo, secret, args.dry_run)?)
    } else {
        None
    };

    let resolver = args.resolve.then(HostResolver::new);
    let manager = Arc::new(CaptureManager::new(acquirer, filter, options, resolver, config.jobs));

    let mut first_failure = None;
    let mut outcomes = std::pin::pin!(manager.run_all(jobs));
    while let Some(outcome) = outcomes.next().await {
        match outcome.result {
            Ok(Some(report)) => {
                print!("{}", report);
                println!();
            }
            Ok(None) => {}
            Err(e) => {
                print_error(Some(&outcome.label), &e);
                first_failure.get_or_insert(e.exit_code());
            }
        }
    }

    Ok(first_failure.unwrap_or(0))
}

/// Password from the environment, else prompted on the terminal
fn sudo_password() -> AppResult<String> {
    let provider: Box<dyn CredentialProvider> = match StaticCredentials::from_env() {
        Some(env) => Box::new(env),
        None => Box::new(TerminalCredentials),
    };
    provider.secret("[sudo] password for capture: ")
}

/// Fatal messages go to stderr with a red `error:` prefix
fn print_error(label: Option<&str>, error: &AppError) {
    let mut stderr = StandardStream::stderr(ColorChoice::Auto);
    let _ = stderr.set_color(ColorSpec::new().set_fg(Some(Color::Red)).set_bold(true));
    let _ = write!(stderr, "error:");
    let _ = stderr.reset();
    let _ = match label {
        Some(label) => writeln!(stderr, " {}: {}", label, error),
        None => writeln!(stderr, " {}", error),
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_targets_is_an_error() {
        let args = Args::parse_from(["queuesnoop"]);
        assert!(matches!(args.jobs(), Err(AppError::NoTargets)));
    }

    #[test]
    fn read_mode_skips_acquisition() {
        let args = Args::parse_from(["queuesnoop", "q1", "-r", "a.pcap", "-r", "b.pcap"]);
        assert_eq!(
            args.jobs().unwrap(),
            vec![Job::Reprocess("a.pcap".into()), Job::Reprocess("b.pcap".into())]
        );
    }

    #[test]
    fn targets_become_remote_captures() {
        let args = Args::parse_from(["queuesnoop", "q1", "q2"]);
        assert_eq!(
            args.jobs().unwrap(),
            vec![
                Job::Capture(Target::Remote { host: "q1".into() }),
                Job::Capture(Target::Remote { host: "q2".into() }),
            ]
        );

        let local = Args::parse_from(["queuesnoop", "--local"]);
        assert_eq!(local.jobs().unwrap(), vec![Job::Capture(Target::Local)]);
    }

    #[test]
    fn local_capture_rejects_target_hosts() {
        let args = Args::parse_from(["queuesnoop", "--local", "q1"]);
        let err = args.jobs().unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
        assert!(err.to_string().contains("q1"));
    }

    #[test]
    fn flags_override_config() {
        let args = Args::parse_from([
            "queuesnoop", "q1", "-p", "22122", "-i", "eth0", "--percentiles", "99,50,100",
        ]);
        let mut config = AppConfig::default();
        args.apply_to(&mut config);

        assert_eq!(config.port, 22122);
        assert_eq!(config.interface, "eth0");
        assert_eq!(config.count, 10000);
        assert_eq!(normalize_percentiles(&config.percentiles), vec![50.0, 99.0, 100.0]);
    }
}
