//! Validation Pipeline - one run over a manifest
//!
//! Each entry goes read -> normalize -> decode -> validate. A failing entry is
//! recorded in the report and the run moves on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;
use thiserror::Error;
use uuid::Uuid;

use crate::config::RunConfig;
use crate::hashing::{compute_report_hash, pixel_digest};
use crate::manifest::{is_contained, Manifest, ProgramId};
use crate::normalize::{NormalizeError, NormalizeOutcome};
use crate::palette::Palette;
use crate::policy::NormalizePolicy;
use crate::validation::{decode_program, DecodeError, ValidationResult, Validator};
use crate::ENGINE_VERSION;

/// Why a single program could not be validated.
#[derive(Debug, Error)]
pub enum ProgramError {
    #[error("Program id {0:?} does not name a file below the programs directory")]
    InvalidId(ProgramId),

    #[error("Failed to read program: {0}")]
    Read(#[source] io::Error),

    #[error("Normalization failed: {0}")]
    NormalizationFailed(#[from] NormalizeError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidId,
    Read,
    NormalizationFailed,
    Decode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&ProgramError> for EntryError {
    fn from(err: &ProgramError) -> Self {
        let kind = match err {
            ProgramError::InvalidId(_) => ErrorKind::InvalidId,
            ProgramError::Read(_) => ErrorKind::Read,
            ProgramError::NormalizationFailed(_) => ErrorKind::NormalizationFailed,
            ProgramError::Decode(_) => ErrorKind::Decode,
        };
        Self {
            kind,
            message: err.to_string(),
        }
    }
}

/// A program that made it through decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckedProgram {
    pub validation: ValidationResult,
    pub normalize: NormalizeOutcome,
    pub pixel_digest: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum EntryOutcome {
    Checked(CheckedProgram),
    Failed { error: EntryError },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramReport {
    pub program: ProgramId,
    #[serde(flatten)]
    pub outcome: EntryOutcome,
}

impl ProgramReport {
    pub fn is_valid(&self) -> bool {
        matches!(&self.outcome, EntryOutcome::Checked(c) if c.validation.valid)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub engine_version: String,
    pub generated_at: DateTime<Utc>,
    pub category: String,
    pub normalize: NormalizePolicy,
    /// Manifest order.
    pub entries: Vec<ProgramReport>,
    /// sha256 of the canonical JSON of `entries`.
    pub report_hash: String,
}

impl RunReport {
    pub fn all_valid(&self) -> bool {
        self.entries.iter().all(ProgramReport::is_valid)
    }

    pub fn invalid(&self) -> impl Iterator<Item = (&ProgramId, &ValidationResult)> {
        self.entries.iter().filter_map(|e| match &e.outcome {
            EntryOutcome::Checked(c) if !c.validation.valid => Some((&e.program, &c.validation)),
            _ => None,
        })
    }

    pub fn failed(&self) -> impl Iterator<Item = (&ProgramId, &EntryError)> {
        self.entries.iter().filter_map(|e| match &e.outcome {
            EntryOutcome::Failed { error } => Some((&e.program, error)),
            _ => None,
        })
    }

    pub fn get(&self, program: &str) -> Option<&ProgramReport> {
        self.entries.iter().find(|e| e.program == program)
    }
}

/// Runs the validator over manifest entries.
pub struct ValidationRun<'p> {
    validator: Validator<'p>,
    config: RunConfig,
}

impl<'p> ValidationRun<'p> {
    pub fn new(palette: &'p Palette, config: RunConfig) -> Self {
        Self {
            validator: Validator::new(palette),
            config,
        }
    }

    /// Read, normalize per policy, decode and validate one program file.
    pub fn check_program(&self, path: &Path) -> Result<CheckedProgram, ProgramError> {
        let bytes = fs::read(path).map_err(ProgramError::Read)?;
        let normalized = self.config.normalize.apply(path, bytes)?;
        let image = decode_program(&normalized.bytes)?;
        Ok(CheckedProgram {
            validation: self.validator.validate(&image),
            normalize: normalized.outcome,
            pixel_digest: pixel_digest(&image),
        })
    }

    /// Ids that would reach outside the programs directory are refused before
    /// anything is read or rewritten.
    fn check_entry(&self, program: &ProgramId, path: &Path) -> ProgramReport {
        let checked = if is_contained(program) {
            self.check_program(path)
        } else {
            Err(ProgramError::InvalidId(program.clone()))
        };
        let outcome = match checked {
            Ok(checked) => {
                log::debug!(
                    "{}: valid={} offenders={}",
                    program,
                    checked.validation.valid,
                    checked.validation.offending_colors.len()
                );
                EntryOutcome::Checked(checked)
            }
            Err(err) => {
                log::warn!("{}: {}", program, err);
                EntryOutcome::Failed { error: EntryError::from(&err) }
            }
        };
        ProgramReport {
            program: program.clone(),
            outcome,
        }
    }

    /// Validate every program of `manifest`, resolved under `base_dir`.
    pub fn run(&self, manifest: &Manifest, base_dir: &Path) -> Result<RunReport, PipelineError> {
        let entries = manifest.resolve(base_dir);
        let workers = self.config.worker_count().min(entries.len()).max(1);
        log::info!(
            "validating {} programs in {} ({} workers, normalize={})",
            entries.len(),
            base_dir.display(),
            workers,
            self.config.normalize
        );

        let reports: Vec<ProgramReport> = if workers == 1 {
            entries.iter().map(|(id, path)| self.check_entry(id, path)).collect()
        } else {
            self.check_parallel(&entries, workers)
        };

        let report_hash = compute_report_hash(&reports)?;
        let report = RunReport {
            run_id: Uuid::new_v4(),
            engine_version: ENGINE_VERSION.to_string(),
            generated_at: Utc::now(),
            category: self.config.category.clone(),
            normalize: self.config.normalize,
            entries: reports,
            report_hash,
        };
        log::info!(
            "run {}: {} invalid, {} failed",
            report.run_id,
            report.invalid().count(),
            report.failed().count()
        );
        Ok(report)
    }

    /// Workers pull entry indices from a shared counter and send reports to
    /// this thread, which restores manifest order.
    fn check_parallel(&self, entries: &[(ProgramId, PathBuf)], workers: usize) -> Vec<ProgramReport> {
        let next = AtomicUsize::new(0);
        let (tx, rx) = mpsc::channel();

        let mut collected: Vec<(usize, ProgramReport)> = thread::scope(|s| {
            for _ in 0..workers {
                let tx = tx.clone();
                let next = &next;
                s.spawn(move || loop {
                    let idx = next.fetch_add(1, Ordering::Relaxed);
                    let Some((id, path)) = entries.get(idx) else { break };
                    if tx.send((idx, self.check_entry(id, path))).is_err() {
                        break;
                    }
                });
            }
            drop(tx);
            rx.into_iter().collect()
        });

        collected.sort_by_key(|(idx, _)| *idx);
        collected.into_iter().map(|(_, report)| report).collect()
    }
}
