//! Batch runner: discover audio files, process each in order, write the CSV
//! report.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use chrono::Local;
use rustc_hash::FxHashMap;
use tracing::{error, info, warn};
use walkdir::WalkDir;

use crate::collaborators::Collaborators;
use crate::config::PipelineConfig;
use crate::paths::ArtifactPaths;
use crate::pipeline;
use crate::progress::{create_progress_bar, format_duration};
use crate::result::{FinishedResult, ReportRecord, StageFailure, StageResult};
use crate::safety::validate_report_path;

pub const AUDIO_EXTENSIONS: [&str; 2] = ["flac", "mp3"];

/// Every eligible audio file under `root`, sorted by path.
pub fn discover_inputs(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| AUDIO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
                .unwrap_or(false)
        })
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Nothing to do; not an error.
    NoFiles,
    AllSucceeded { files: usize },
    Failures { failed: usize, total: usize },
}

impl BatchOutcome {
    pub fn is_success(self) -> bool {
        !matches!(self, BatchOutcome::Failures { .. })
    }

    pub fn exit_code(self) -> u8 {
        if self.is_success() {
            0
        } else {
            1
        }
    }
}

pub struct BatchRunner<'a> {
    pub config: &'a PipelineConfig,
    pub collaborators: &'a Collaborators,
}

impl<'a> BatchRunner<'a> {
    pub fn new(config: &'a PipelineConfig, collaborators: &'a Collaborators) -> Self {
        Self {
            config,
            collaborators,
        }
    }

    /// Process every discovered file and write one report row per file.
    /// Per-file failures never abort the batch; only setup problems (missing
    /// input directory, unsafe or unwritable report path) return `Err`.
    pub fn run(&self, report_path: &Path) -> Result<BatchOutcome> {
        let input_root = &self.config.input_root;
        if !input_root.is_dir() {
            bail!("Input directory not found: {}", input_root.display());
        }

        let inputs = discover_inputs(input_root);
        if inputs.is_empty() {
            warn!(root = %input_root.display(), "No audio files found");
            return Ok(BatchOutcome::NoFiles);
        }
        validate_report_path(report_path, &inputs)?;
        info!(files = inputs.len(), root = %input_root.display(), "Starting batch");

        let start = Instant::now();
        let pb = create_progress_bar(inputs.len() as u64, "Processing");
        // Artifact folder -> first input that claimed it
        let mut claimed: FxHashMap<PathBuf, PathBuf> = FxHashMap::default();
        let mut records: Vec<ReportRecord> = Vec::with_capacity(inputs.len());
        let mut failed = 0;

        for (i, input) in inputs.iter().enumerate() {
            info!("[{}/{}] {}", i + 1, inputs.len(), input.display());
            let finished = match self.check_collision(input, &mut claimed) {
                Some(failure) => collision_result(input, failure),
                None => pipeline::process(input, self.config, self.collaborators),
            };
            if !finished.overall_success {
                failed += 1;
            }
            records.push(finished.to_record());
            pb.inc(1);
        }
        pb.finish_and_clear();

        write_report(report_path, &records)?;
        info!(
            total = records.len(),
            failed,
            elapsed = %format_duration(start.elapsed()),
            report = %report_path.display(),
            "Batch complete"
        );

        Ok(if failed == 0 {
            BatchOutcome::AllSucceeded {
                files: records.len(),
            }
        } else {
            BatchOutcome::Failures {
                failed,
                total: records.len(),
            }
        })
    }

    /// Two inputs may not share an artifact folder, e.g. `song.mp3` and
    /// `song.flac` side by side. The later one is refused.
    fn check_collision(
        &self,
        input: &Path,
        claimed: &mut FxHashMap<PathBuf, PathBuf>,
    ) -> Option<StageFailure> {
        let cfg = self.config;
        // Unresolvable paths are reported by the pipeline itself
        let paths = ArtifactPaths::resolve(input, &cfg.output_root, &cfg.temp_root, &cfg.input_root).ok()?;
        match claimed.get(&paths.song_dir) {
            Some(first) => Some(StageFailure::Setup(format!(
                "artifact directory {} already used by {}",
                paths.song_dir.display(),
                first.display()
            ))),
            None => {
                claimed.insert(paths.song_dir, input.to_path_buf());
                None
            }
        }
    }
}

fn collision_result(input: &Path, failure: StageFailure) -> FinishedResult {
    error!(path = %input.display(), "{}", failure);
    let mut result = StageResult::new(input, Local::now());
    result.fail(failure);
    result.finalize()
}

pub fn write_report(path: &Path, records: &[ReportRecord]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create report directory {}", parent.display()))?;
    }
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create report {}", path.display()))?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}
