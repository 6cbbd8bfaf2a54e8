use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use uuid::Uuid;

use crate::models::config::AppConfig;
use crate::utils::error::{AppError, AppResult};

const CAPTURE_TOOL: &str = "tcpdump";
const LOCAL_LABEL: &str = "localhost";

/// Where a capture runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Local,
    Remote { host: String },
}

impl Target {
    /// Host name used in reports and file names
    pub fn label(&self) -> &str {
        match self {
            Target::Local => LOCAL_LABEL,
            Target::Remote { host } => host.as_str(),
        }
    }
}

/// Runs tcpdump on a target and brings the capture file back
pub struct CaptureAcquirer {
    config: AppConfig,
    /// sudo password when capturing with elevated privileges
    secret: Option<String>,
    elevated: bool,
    dry_run: bool,
    output_dir: PathBuf,
    /// Removed with the acquirer when no output directory is configured
    _scratch: Option<TempDir>,
}

impl CaptureAcquirer {
    pub fn new(config: AppConfig, elevated: bool, secret: Option<String>, dry_run: bool) -> AppResult<Self> {
        let (output_dir, scratch) = match &config.output_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                (dir.clone(), None)
            }
            None => {
                let scratch = tempfile::Builder::new().prefix("queuesnoop").tempdir()?;
                (scratch.path().to_path_buf(), Some(scratch))
            }
        };

        Ok(Self {
            config,
            secret,
            elevated,
            dry_run,
            output_dir,
            _scratch: scratch,
        })
    }

    /// Capture on the target; `None` in dry-run mode
    pub async fn acquire(&self, target: &Target) -> AppResult<Option<PathBuf>> {
        let local_path = self.local_path(target);
        let path = match target {
            Target::Local => self.acquire_local(&local_path).await?,
            Target::Remote { host } => self.acquire_remote(host, &local_path).await?,
        };

        match path {
            Some(path) if !path.is_file() => Err(AppError::CaptureFileMissing(path)),
            other => Ok(other),
        }
    }

    /// tcpdump invocation writing to `path`, prefixed with sudo when elevated
    pub fn capture_command(&self, path: &str) -> Vec<String> {
        let mut argv = Vec::new();
        if self.elevated {
            argv.extend(["sudo", "-S", "-p", ""].iter().map(|s| s.to_string()));
        }
        argv.push(CAPTURE_TOOL.to_string());
        argv.extend([
            "-n".to_string(),
            "-i".to_string(),
            self.config.interface.clone(),
            "-s".to_string(),
            self.config.snaplen.to_string(),
            "-c".to_string(),
            self.config.count.to_string(),
            "-w".to_string(),
            path.to_string(),
            "tcp".to_string(),
            "dst".to_string(),
            "port".to_string(),
            self.config.port.to_string(),
        ]);
        argv
    }

    async fn acquire_local(&self, local_path: &Path) -> AppResult<Option<PathBuf>> {
        let argv = self.capture_command(&local_path.to_string_lossy());
        if self.dry_run {
            announce(&argv);
            return Ok(None);
        }

        self.local_preflight().await?;

        info!("Capturing {} packets on {} locally", self.config.count, self.config.interface);
        let output = self.run(&argv, self.elevated).await?;
        if !output.status.success() {
            return Err(AppError::RemoteExecution {
                host: LOCAL_LABEL.to_string(),
                message: failure_message(&output),
            });
        }

        Ok(Some(local_path.to_path_buf()))
    }

    async fn acquire_remote(&self, host: &str, local_path: &Path) -> AppResult<Option<PathBuf>> {
        let destination = self.config.ssh_destination(host);
        let remote_path = format!(
            "{}/queuesnoop-{}.pcap",
            self.config.remote_dir.trim_end_matches('/'),
            Uuid::new_v4()
        );

        let capture = ssh_command(&destination, &self.capture_command(&remote_path));
        let copy = vec![
            "scp".to_string(),
            "-q".to_string(),
            format!("{}:{}", destination, remote_path),
            local_path.to_string_lossy().into_owned(),
        ];
        let cleanup = ssh_command(
            &destination,
            &["rm".to_string(), "-f".to_string(), remote_path.clone()],
        );

        if self.dry_run {
            announce(&capture);
            announce(&copy);
            announce(&cleanup);
            return Ok(None);
        }

        for tool in ["ssh", "scp"] {
            if !is_command_available(tool).await {
                return Err(AppError::TransportMissing(tool.to_string()));
            }
        }

        info!("Capturing {} packets on {}", self.config.count, host);
        let output = self.run(&capture, self.elevated).await?;
        if !output.status.success() {
            self.cleanup_remote(host, &cleanup).await;
            return Err(AppError::RemoteExecution {
                host: host.to_string(),
                message: failure_message(&output),
            });
        }

        debug!("Copying {}:{} to {}", host, remote_path, local_path.display());
        let output = self.run(&copy, false).await?;
        self.cleanup_remote(host, &cleanup).await;
        if !output.status.success() {
            return Err(AppError::TransferFailed {
                host: host.to_string(),
                message: failure_message(&output),
            });
        }

        Ok(Some(local_path.to_path_buf()))
    }

    /// Remove the remote capture file; failures are only logged
    async fn cleanup_remote(&self, host: &str, cleanup: &[String]) {
        match self.run(cleanup, false).await {
            Ok(output) if output.status.success() => debug!("Removed remote capture on {}", host),
            Ok(output) => warn!("Failed to remove remote capture on {}: {}", host, failure_message(&output)),
            Err(e) => warn!("Failed to remove remote capture on {}: {}", host, e),
        }
    }

    /// Run a command to completion, feeding the sudo password on stdin when asked
    async fn run(&self, argv: &[String], with_secret: bool) -> AppResult<Output> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| AppError::ConfigError("empty command".to_string()))?;
        debug!("Running: {}", argv.join(" "));

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            if with_secret {
                if let Some(secret) = &self.secret {
                    stdin.write_all(secret.as_bytes()).await?;
                    stdin.write_all(b"\n").await?;
                }
            }
        }

        Ok(child.wait_with_output().await?)
    }

    /// Tool and interface checks before a local capture. Under sudo the
    /// tool is looked up on root's PATH, so a miss here is not conclusive.
    async fn local_preflight(&self) -> AppResult<()> {
        if self.elevated {
            debug!("Skipping {} lookup, sudo resolves it", CAPTURE_TOOL);
        } else if !is_command_available(CAPTURE_TOOL).await {
            return Err(AppError::CaptureToolMissing(CAPTURE_TOOL.to_string()));
        }
        self.check_interface()
    }

    fn check_interface(&self) -> AppResult<()> {
        let wanted = &self.config.interface;
        if wanted == "any" {
            return Ok(());
        }
        if pnet_datalink::interfaces().iter().any(|iface| &iface.name == wanted) {
            Ok(())
        } else {
            Err(AppError::ConfigError(format!("no such interface: {}", wanted)))
        }
    }

    fn local_path(&self, target: &Target) -> PathBuf {
        let label: String = target
            .label()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
            .collect();
        self.output_dir.join(format!("{}-{}.pcap", label, Uuid::new_v4()))
    }
}

/// `ssh <dest> <quoted remote command>`
fn ssh_command(destination: &str, remote: &[String]) -> Vec<String> {
    let quoted: Vec<String> = remote.iter().map(|arg| shell_quote(arg)).collect();
    vec!["ssh".to_string(), destination.to_string(), quoted.join(" ")]
}

/// Quote an argument for the remote POSIX shell
fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@%+".contains(c));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

fn announce(argv: &[String]) {
    println!("would run: {}", argv.join(" "));
}

/// Last line tcpdump/ssh/scp wrote to stderr, or the exit status
fn failure_message(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr)
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(|line| line.to_string())
        .unwrap_or_else(|| output.status.to_string())
}

/// Check if a command is available on the system
async fn is_command_available(cmd: &str) -> bool {
    match Command::new("which")
        .arg(cmd)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
    {
        Ok(status) => status.success(),
        Err(_) => false,
    }
}
