//! pietcheck - palette validation for Piet program images
//!
//! A Piet program only runs as written if every codel is one of the twenty
//! palette colors. The pipeline:
//! 1. Manifest lists the programs of a category
//! 2. Normalizer strips color-management chunks that make decoders shift colors
//! 3. Validator checks every pixel against the palette
//! 4. Report lists invalid and undecodable programs, nothing else

pub mod palette;
pub mod manifest;
pub mod normalize;
pub mod policy;
pub mod validation;
pub mod hashing;
pub mod config;
pub mod pipeline;
pub mod report;

pub use palette::{Color, Palette, PaletteError, PIET_COLORS};
pub use manifest::{is_contained, Catalog, Manifest, ManifestError, ProgramId};
pub use normalize::{normalize, normalize_bytes, write_atomically, ImageFormat, NormalizeError, NormalizeOutcome};
pub use policy::NormalizePolicy;
pub use validation::{decode_program, DecodeError, ProgramImage, ValidationResult, Validator};
pub use hashing::{canonical_json, compute_report_hash, pixel_digest};
pub use config::{ConfigError, RunConfig};
pub use pipeline::{EntryOutcome, PipelineError, ProgramError, ProgramReport, RunReport, ValidationRun};
pub use report::ReportFormat;

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
