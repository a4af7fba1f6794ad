//! Report Emitter
//!
//! Valid programs produce no output, so a clean run is silent.

use std::fmt::Write as _;
use std::io::{self, Write};

use crate::pipeline::{EntryOutcome, RunReport};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}

/// Human-readable listing of invalid and failed programs, in manifest order.
pub fn render_text(report: &RunReport) -> String {
    let mut out = String::new();
    for entry in &report.entries {
        match &entry.outcome {
            EntryOutcome::Checked(checked) if !checked.validation.valid => {
                let colors: Vec<String> =
                    checked.validation.offending_colors.iter().map(|c| c.to_string()).collect();
                let _ = write!(out, "\n{}\n{{{}}}\n\n", entry.program, colors.join(", "));
            }
            EntryOutcome::Checked(_) => {}
            EntryOutcome::Failed { error } => {
                let _ = write!(out, "\n{}\nerror: {}\n\n", entry.program, error.message);
            }
        }
    }
    out
}

pub fn render_json(report: &RunReport) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(report)
}

pub fn emit<W: Write>(out: &mut W, report: &RunReport, format: ReportFormat) -> io::Result<()> {
    match format {
        ReportFormat::Text => out.write_all(render_text(report).as_bytes()),
        ReportFormat::Json => {
            let json = render_json(report).map_err(io::Error::from)?;
            writeln!(out, "{}", json)
        }
    }
}
