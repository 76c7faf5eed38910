mod exports;
mod progress;
mod styling;
mod summary;
mod tables;

use serde::Serialize;

use crate::mining::BottleneckAnalysis;
use crate::report::{KpiPrediction, ProcessMap, ProcessReport, UnavailableForecast, VariantSummary};

pub use exports::export;
pub use progress::PhaseProgress;
pub use styling::{dim, magenta_bold};

/// What a command produced, borrowed for rendering or export.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(untagged)]
pub enum CommandOutput<'a> {
    Variants(&'a VariantSummary),
    Bottlenecks(&'a BottleneckAnalysis),
    Forecasts {
        forecasts: &'a [KpiPrediction],
        unavailable_forecasts: &'a [UnavailableForecast],
    },
    Map(&'a ProcessMap),
    Report(&'a ProcessReport),
}

/// Prints the procmine banner to stderr.
pub fn print_banner() {
    eprintln!(
        r"
{} {}
  {}
",
        magenta_bold("⛏️ procmine"),
        dim(env!("CARGO_PKG_VERSION")),
        dim("Process Mining Analytics")
    );
}
