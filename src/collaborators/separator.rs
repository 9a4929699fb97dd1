//! Vocal separation via the `audio-separator` CLI.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use tracing::{debug, info, warn};

use super::VocalSeparator;
use crate::artifacts::atomic_move;

const POLL_INTERVAL: Duration = Duration::from_millis(250);
const SEPARATOR_LOG: &str = "separator.log";
/// Headroom between killing the child and the stage giving up on the call.
const KILL_MARGIN: Duration = Duration::from_secs(10);

/// Kill deadline for a separator running under a stage deadline. The child
/// must be gone, and its stem either moved or abandoned, before the stage
/// stops waiting; otherwise a detached call could still place a vocals file
/// that a later resume would trust.
pub fn kill_deadline(stage_timeout: Option<Duration>) -> Option<Duration> {
    stage_timeout.map(|t| t.saturating_sub(KILL_MARGIN).max(t / 2))
}

#[derive(Clone, Debug)]
pub struct AudioSeparatorCli {
    pub program: String,
    pub model: String,
    pub model_dir: PathBuf,
    /// Child is killed after this long; `None` waits forever.
    pub timeout: Option<Duration>,
}

impl AudioSeparatorCli {
    fn command(&self, input: &Path, work_dir: &Path, log: fs::File) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg(input)
            .arg("--model_filename")
            .arg(&self.model)
            .arg("--model_file_dir")
            .arg(&self.model_dir)
            .arg("--output_dir")
            .arg(work_dir)
            .arg("--output_format")
            .arg("WAV")
            .arg("--single_stem")
            .arg("Vocals")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(log));
        cmd
    }
}

impl VocalSeparator for AudioSeparatorCli {
    fn separate(&self, input: &Path, work_dir: &Path, vocals_path: &Path) -> Result<Option<PathBuf>> {
        fs::create_dir_all(work_dir)
            .with_context(|| format!("Create directory {}", work_dir.display()))?;

        // A piped stderr can fill up and stall the child
        let log_path = work_dir.join(SEPARATOR_LOG);
        let log = fs::File::create(&log_path)
            .with_context(|| format!("Create {}", log_path.display()))?;

        info!(input = %input.display(), model = %self.model, "Running {}", self.program);
        let mut child = self
            .command(input, work_dir, log)
            .spawn()
            .with_context(|| format!("Failed to start {}", self.program))?;

        let started = Instant::now();
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if self.timeout.map_or(false, |t| started.elapsed() >= t) {
                warn!(program = %self.program, "Separator exceeded deadline, killing");
                let _ = child.kill();
                let _ = child.wait();
                bail!("{} killed after {}s", self.program, started.elapsed().as_secs());
            }
            thread::sleep(POLL_INTERVAL);
        };

        if !status.success() {
            let stderr = fs::read_to_string(&log_path).unwrap_or_default();
            bail!("{} exited with {}: {}", self.program, status, tail(&stderr, 400));
        }

        match find_vocals_output(work_dir, input, vocals_path)? {
            Some(produced) => {
                if produced != vocals_path {
                    debug!(from = %produced.display(), to = %vocals_path.display(), "Moving vocals");
                    atomic_move(&produced, vocals_path)?;
                }
                Ok(Some(vocals_path.to_path_buf()))
            }
            None => Ok(None),
        }
    }
}

/// The separator names its output after the input stem; take the newest
/// `(Vocals)` wav for this stem.
fn find_vocals_output(work_dir: &Path, input: &Path, expected: &Path) -> Result<Option<PathBuf>> {
    if expected.is_file() {
        return Ok(Some(expected.to_path_buf()));
    }
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut best: Option<(std::time::SystemTime, PathBuf)> = None;
    for entry in fs::read_dir(work_dir)? {
        let path = entry?.path();
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(n) => n,
            None => continue,
        };
        let is_vocals = name.starts_with(&stem)
            && name.contains("(Vocals)")
            && name.to_lowercase().ends_with(".wav");
        if !is_vocals {
            continue;
        }
        let modified = fs::metadata(&path)?.modified()?;
        if best.as_ref().map_or(true, |(t, _)| modified > *t) {
            best = Some((modified, path));
        }
    }
    Ok(best.map(|(_, p)| p))
}

fn tail(s: &str, max_chars: usize) -> &str {
    let s = s.trim();
    match s.char_indices().rev().nth(max_chars.saturating_sub(1)) {
        Some((i, _)) => &s[i..],
        None => s,
    }
}
