//! Supervision of the WhatsApp Web sidecar process (a Node.js program that
//! drives the browser session and serves the WebSocket protocol in
//! [`crate::sidecar`]).

use std::{
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use {
    anyhow::{Context, Result, bail},
    tokio::{
        io::{AsyncBufReadExt, AsyncRead, BufReader},
        process::{Child, Command},
    },
    tracing::{Level, debug, error, info, warn},
};

/// Environment variable overriding the sidecar location.
pub const SIDECAR_DIR_ENV: &str = "WALINK_SIDECAR_DIR";

const SIDECAR_REL_DIR: &str = "sidecar/whatsapp-web";
const ENTRYPOINT: &str = "dist/index.js";
const STOP_GRACE: Duration = Duration::from_secs(5);
const STARTUP_GRACE: Duration = Duration::from_millis(500);

/// How to launch the sidecar.
#[derive(Debug, Clone)]
pub struct SidecarProcessConfig {
    /// Directory containing `package.json`.
    pub sidecar_dir: PathBuf,
    pub port: u16,
    /// Browser profile directory handed to the sidecar, if any.
    pub data_dir: Option<PathBuf>,
}

/// A running sidecar child process.
pub struct SidecarProcess {
    child: Child,
    port: u16,
}

impl SidecarProcess {
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Ask the sidecar to exit (SIGTERM on unix), killing it if it has not
    /// exited within a few seconds.
    pub async fn stop(&mut self) -> Result<()> {
        info!(port = self.port, "stopping WhatsApp sidecar");

        #[cfg(unix)]
        {
            use nix::{
                sys::signal::{Signal, kill},
                unistd::Pid,
            };
            if let Some(pid) = self.child.id()
                && let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM)
            {
                debug!(pid, error = %e, "SIGTERM to sidecar failed");
            }
        }

        #[cfg(not(unix))]
        let _ = self.child.start_kill();

        match tokio::time::timeout(STOP_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => info!(?status, "WhatsApp sidecar exited"),
            Ok(Err(e)) => warn!(error = %e, "failed to wait for sidecar"),
            Err(_) => {
                warn!("sidecar ignored SIGTERM, killing");
                self.child
                    .kill()
                    .await
                    .context("failed to kill sidecar process")?;
            },
        }
        Ok(())
    }
}

/// Locate the sidecar directory.
///
/// Tries, in order: `explicit`, `$WALINK_SIDECAR_DIR`, next to the
/// executable, then the working directory and its parents.
pub fn find_sidecar_dir(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        if has_package_json(path) {
            return Ok(path.to_path_buf());
        }
        bail!("no package.json in sidecar directory {}", path.display());
    }

    if let Ok(dir) = std::env::var(SIDECAR_DIR_ENV) {
        let path = PathBuf::from(&dir);
        if has_package_json(&path) {
            return Ok(path);
        }
        warn!(path = %dir, "{SIDECAR_DIR_ENV} is set but has no package.json");
    }

    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf));
    let mut candidates: Vec<PathBuf> = Vec::new();
    if let Some(exe_dir) = exe_dir {
        candidates.push(exe_dir.join("..").join(SIDECAR_REL_DIR));
        candidates.push(exe_dir.join("../..").join(SIDECAR_REL_DIR));
    }
    for prefix in [".", "..", "../.."] {
        candidates.push(Path::new(prefix).join(SIDECAR_REL_DIR));
    }

    candidates
        .into_iter()
        .find(|p| has_package_json(p))
        .map(|p| p.canonicalize().unwrap_or(p))
        .with_context(|| {
            format!(
                "WhatsApp sidecar not found; set {SIDECAR_DIR_ENV}, create {SIDECAR_REL_DIR}, \
                 or set whatsapp.sidecar.auto_start = false and run it yourself"
            )
        })
}

fn has_package_json(dir: &Path) -> bool {
    dir.join("package.json").is_file()
}

/// Spawn the sidecar, building it first when `dist/` is missing.
pub async fn start_sidecar(config: SidecarProcessConfig) -> Result<SidecarProcess> {
    let dir = &config.sidecar_dir;
    if !has_package_json(dir) {
        bail!(
            "WhatsApp sidecar not found at {}; run `npm install && npm run build` there",
            dir.display()
        );
    }

    if !dir.join(ENTRYPOINT).exists() {
        if !dir.join("node_modules").exists() {
            run_npm(dir, &["install"]).await?;
        }
        run_npm(dir, &["run", "build"]).await?;
    }

    info!(path = %dir.display(), port = config.port, "starting WhatsApp sidecar");

    let mut cmd = Command::new("node");
    cmd.arg(ENTRYPOINT)
        .current_dir(dir)
        .env("WALINK_SIDECAR_PORT", config.port.to_string())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(data_dir) = &config.data_dir {
        cmd.env("WALINK_SIDECAR_DATA_DIR", data_dir);
    }

    let mut child = cmd.spawn().context("failed to spawn sidecar process")?;
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(forward_logs(stdout, Level::INFO));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(forward_logs(stderr, Level::WARN));
    }

    tokio::time::sleep(STARTUP_GRACE).await;
    if let Some(status) = child
        .try_wait()
        .context("failed to poll sidecar process")?
    {
        bail!("sidecar exited right after start: {status}");
    }

    Ok(SidecarProcess {
        child,
        port: config.port,
    })
}

async fn run_npm(dir: &Path, args: &[&str]) -> Result<()> {
    let label = format!("npm {}", args.join(" "));
    info!(path = %dir.display(), "running {label} for sidecar");
    let output = Command::new("npm")
        .args(args)
        .current_dir(dir)
        .output()
        .await
        .with_context(|| format!("failed to run {label}"))?;
    if !output.status.success() {
        bail!(
            "{label} failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
    }
    Ok(())
}

/// Forward child output into tracing under the `whatsapp_sidecar` target.
async fn forward_logs(stream: impl AsyncRead + Unpin, default: Level) {
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let (level, msg) = classify_line(&line, default);
        if level == Level::ERROR {
            error!(target: "whatsapp_sidecar", "{msg}");
        } else if level == Level::WARN {
            warn!(target: "whatsapp_sidecar", "{msg}");
        } else if level == Level::INFO {
            info!(target: "whatsapp_sidecar", "{msg}");
        } else {
            debug!(target: "whatsapp_sidecar", "{msg}");
        }
    }
}

/// Pick level and text from a sidecar log line. Pino-style JSON lines carry
/// a numeric level (10..=60); anything else uses `default`.
fn classify_line(line: &str, default: Level) -> (Level, String) {
    if line.starts_with('{')
        && let Ok(log) = serde_json::from_str::<serde_json::Value>(line)
    {
        let level = match log.get("level").and_then(serde_json::Value::as_u64) {
            Some(0..=29) => Level::DEBUG,
            Some(30..=39) | None => Level::INFO,
            Some(40..=49) => Level::WARN,
            Some(_) => Level::ERROR,
        };
        let msg = log
            .get("msg")
            .and_then(serde_json::Value::as_str)
            .unwrap_or(line)
            .to_string();
        return (level, msg);
    }
    (default, line.to_string())
}
