//! Process-mining analytics over business event logs.

mod analyzer;
mod bottlenecks;
mod conformance;
mod event_log;
mod forecast;
mod process_map;
mod source;
mod stats;
mod variants;

pub use analyzer::{AnalyzerSettings, ProcessAnalyzer};
pub use bottlenecks::{analyze_bottlenecks, BottleneckAnalysis, BottleneckSettings};
pub use conformance::ReferenceModel;
pub use forecast::{happy_path_share, ForecastSettings, KpiForecaster, LinearForecaster};
pub use process_map::{generate_process_map, DEFAULT_MAX_RENDERED_EDGES};
pub use source::{DateRange, EventSource, ExtractRequest, ExtractedEvents, FileEventSource};
pub use variants::correlate_variants;
