use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{info, warn};
use std::io::Write;
use std::path::PathBuf;

use crate::config::{Config, OutputFormat};
use crate::error::ProcmineError;
use crate::mining::{
    analyze_bottlenecks, correlate_variants, generate_process_map, DateRange, EventSource,
    ExtractRequest, ExtractedEvents, FileEventSource, KpiForecaster, LinearForecaster,
    ProcessAnalyzer, ReferenceModel,
};
use crate::output::{export, CommandOutput};
use crate::report::{KpiType, MapFormat, UnavailableForecast};

#[derive(Parser)]
#[command(name = "procmine")]
#[command(author, version, about = "Process Mining Analytics", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to ./procmine.toml and friends)
    #[arg(short, long, global = true, env = "PROCMINE_CONFIG")]
    config: Option<PathBuf>,

    /// Write results to this file instead of stdout
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, value_enum)]
    format: Option<OutputFormat>,

    /// Pretty-print JSON output
    #[arg(short, long, global = true, default_value_t = false)]
    pretty: bool,
}

/// Where the events come from and which of them to keep.
#[derive(Args)]
struct SourceArgs {
    /// Event export: JSON array, JSON Lines or YAML
    #[arg(short, long, env = "PROCMINE_EVENTS")]
    events: PathBuf,

    /// Only keep events of this business process
    #[arg(long)]
    process_id: Option<String>,

    /// Only keep events from this upstream system
    #[arg(long)]
    system_id: Option<String>,

    /// Only keep events within YYYY-MM-DD/YYYY-MM-DD
    #[arg(long)]
    date_range: Option<DateRange>,
}

/// Expected activity sequence for conformance checking.
#[derive(Args)]
struct ReferenceArgs {
    /// Comma-separated activities, e.g. "Create PO,Approve PO,Pay"
    #[arg(long, conflicts_with = "reference_file")]
    reference: Option<String>,

    /// JSON array or one-activity-per-line file
    #[arg(long)]
    reference_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Group cases into ranked variants and check conformance
    Variants {
        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        reference: ReferenceArgs,
    },

    /// Find activities with anomalous waits and summarize resource workload
    Bottlenecks {
        #[command(flatten)]
        source: SourceArgs,

        /// Percentile compared against the mean wait
        #[arg(long)]
        percentile: Option<f64>,

        /// Flag when the percentile wait exceeds this multiple of the mean
        #[arg(long)]
        ratio: Option<f64>,
    },

    /// Forecast KPIs from the variant statistics
    Forecast {
        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        reference: ReferenceArgs,

        /// KPI to forecast (delay, throughput, anomaly_risk, cost); repeatable
        #[arg(short, long = "kpi")]
        kpis: Vec<KpiType>,
    },

    /// Render the process map
    Map {
        #[command(flatten)]
        source: SourceArgs,

        #[arg(short = 'm', long, value_enum, default_value_t = MapFormat::Mermaid)]
        map_format: MapFormat,

        /// Maximum number of edges drawn
        #[arg(long)]
        max_edges: Option<usize>,
    },

    /// Run every analysis and produce the full report
    Analyze {
        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        reference: ReferenceArgs,

        /// KPI to forecast; repeatable (defaults to the configured list)
        #[arg(short, long = "kpi")]
        kpis: Vec<KpiType>,

        #[arg(short = 'm', long, value_enum, default_value_t = MapFormat::Mermaid)]
        map_format: MapFormat,
    },

    /// Write the effective configuration to a file as a starting point
    Init {
        /// Destination; the extension picks TOML, JSON or YAML
        #[arg(default_value = "procmine.toml")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

impl SourceArgs {
    /// Flags win over the `[source]` section of the config.
    fn request(&self, config: &Config) -> ExtractRequest {
        ExtractRequest {
            process_id: self
                .process_id
                .clone()
                .or_else(|| config.source.process_id.clone()),
            system_id: self
                .system_id
                .clone()
                .or_else(|| config.source.system_id.clone()),
            date_range: self.date_range.or(config.source.date_range),
        }
    }

    fn extract(&self, request: &ExtractRequest) -> Result<ExtractedEvents> {
        let source = FileEventSource::new(&self.events);
        let extracted = source
            .extract(request)
            .with_context(|| format!("Failed to load events from {}", source.path().display()))?;
        info!(
            "Loaded {} events from {}",
            extracted.total_events,
            source.path().display()
        );
        Ok(extracted)
    }
}

impl ReferenceArgs {
    fn load(&self) -> Result<Option<ReferenceModel>> {
        if let Some(sequence) = &self.reference {
            return Ok(Some(ReferenceModel::parse_sequence(sequence)?));
        }
        self.reference_file
            .as_deref()
            .map(|path| {
                ReferenceModel::load(path).with_context(|| {
                    format!("Failed to load reference model: {}", path.display())
                })
            })
            .transpose()
    }
}

impl Cli {
    fn write_result(&self, config: &Config, result: &CommandOutput<'_>) -> Result<()> {
        let format = self.format.unwrap_or(config.output.format);
        let pretty = self.pretty || config.output.pretty;

        if let Some(output_path) = &self.output {
            let mut file = std::fs::File::create(output_path)
                .with_context(|| format!("Failed to create {}", output_path.display()))?;
            export(result, format, pretty, &mut file)?;
            info!("Results written to: {}", output_path.display());
        } else {
            let stdout = std::io::stdout();
            let mut handle = stdout.lock();
            export(result, format, pretty, &mut handle)?;
            handle.flush()?;
        }

        Ok(())
    }

    fn execute_variants(
        &self,
        config: &Config,
        source: &SourceArgs,
        reference: &ReferenceArgs,
    ) -> Result<()> {
        let extracted = source.extract(&source.request(config))?;
        let reference = reference.load()?;

        let summary = correlate_variants(&extracted.events, reference.as_ref());
        self.write_result(config, &CommandOutput::Variants(&summary))
    }

    fn execute_bottlenecks(
        &self,
        config: &Config,
        source: &SourceArgs,
        percentile: Option<f64>,
        ratio: Option<f64>,
    ) -> Result<()> {
        let extracted = source.extract(&source.request(config))?;

        let mut settings = config.bottleneck_settings();
        if let Some(percentile) = percentile {
            settings.percentile = percentile;
        }
        if let Some(ratio) = ratio {
            settings.ratio = ratio;
        }

        let analysis = analyze_bottlenecks(&extracted.events, &settings);
        self.write_result(config, &CommandOutput::Bottlenecks(&analysis))
    }

    fn execute_forecast(
        &self,
        config: &Config,
        source: &SourceArgs,
        reference: &ReferenceArgs,
        kpis: &[KpiType],
    ) -> Result<()> {
        let extracted = source.extract(&source.request(config))?;
        let reference = reference.load()?;
        let summary = correlate_variants(&extracted.events, reference.as_ref());

        let forecaster = LinearForecaster::new(config.forecast_settings());
        let kpis = if kpis.is_empty() {
            config.forecast.kpis.as_slice()
        } else {
            kpis
        };
        info!(
            "Forecasting {} KPIs with model {}",
            kpis.len(),
            forecaster.model_version()
        );

        let mut forecasts = vec![];
        let mut unavailable = vec![];
        for kpi in kpis {
            match forecaster.forecast(&summary, kpi) {
                Ok(prediction) => forecasts.push(prediction),
                Err(ProcmineError::ForecastUnavailable { reason, .. }) => {
                    warn!("Skipping {kpi} forecast: {reason}");
                    unavailable.push(UnavailableForecast {
                        kpi_type: kpi.clone(),
                        reason,
                    });
                }
                Err(err) => return Err(err.into()),
            }
        }

        self.write_result(
            config,
            &CommandOutput::Forecasts {
                forecasts: &forecasts,
                unavailable_forecasts: &unavailable,
            },
        )
    }

    fn execute_map(
        &self,
        config: &Config,
        source: &SourceArgs,
        map_format: MapFormat,
        max_edges: Option<usize>,
    ) -> Result<()> {
        let extracted = source.extract(&source.request(config))?;
        let max_edges = max_edges.unwrap_or(config.analysis.max_rendered_edges);

        let map = generate_process_map(&extracted.events, map_format, max_edges)?;
        self.write_result(config, &CommandOutput::Map(&map))
    }

    async fn execute_analyze(
        &self,
        config: &Config,
        source: &SourceArgs,
        reference: &ReferenceArgs,
        kpis: &[KpiType],
        map_format: MapFormat,
    ) -> Result<()> {
        let request = source.request(config);
        let extracted = source.extract(&request)?;

        let mut settings = config.analyzer_settings();
        settings.map_format = map_format;
        if !kpis.is_empty() {
            settings.kpis = kpis.to_vec();
        }

        let analyzer = ProcessAnalyzer::new(settings)
            .with_reference(reference.load()?)
            .with_forecaster(std::sync::Arc::new(LinearForecaster::new(
                config.forecast_settings(),
            )))
            .with_progress(true);

        let report = analyzer.analyze(extracted, &request).await?;
        self.write_result(config, &CommandOutput::Report(&report))
    }

    fn execute_init(config: &Config, path: &std::path::Path, force: bool) -> Result<()> {
        if path.exists() && !force {
            anyhow::bail!(
                "{} already exists; pass --force to overwrite it",
                path.display()
            );
        }
        config.save(path)?;
        info!("Wrote configuration to {}", path.display());
        Ok(())
    }

    pub async fn execute(&self) -> Result<()> {
        let config = Config::load(self.config.as_deref())?;

        match &self.command {
            Commands::Variants { source, reference } => {
                self.execute_variants(&config, source, reference)
            }
            Commands::Bottlenecks {
                source,
                percentile,
                ratio,
            } => self.execute_bottlenecks(&config, source, *percentile, *ratio),
            Commands::Forecast {
                source,
                reference,
                kpis,
            } => self.execute_forecast(&config, source, reference, kpis),
            Commands::Map {
                source,
                map_format,
                max_edges,
            } => self.execute_map(&config, source, *map_format, *max_edges),
            Commands::Analyze {
                source,
                reference,
                kpis,
                map_format,
            } => {
                self.execute_analyze(&config, source, reference, kpis, *map_format)
                    .await
            }
            Commands::Init { path, force } => Self::execute_init(&config, path, *force),
        }
    }
}
