use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::mining::{
    AnalyzerSettings, BottleneckSettings, DateRange, ForecastSettings, DEFAULT_MAX_RENDERED_EDGES,
};
use crate::report::KpiType;

/// Configuration file structure for procmine.
///
/// Holds the extraction filters and analysis tunables so they can be reused
/// across runs. Command-line flags override whatever is set here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// Which events to extract
    #[serde(default)]
    pub source: SourceConfig,

    /// Bottleneck and process map parameters
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// KPI forecasting parameters
    #[serde(default)]
    pub forecast: ForecastConfig,

    /// Output format preferences
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SourceConfig {
    /// Business process to analyze (e.g., 'P2P')
    pub process_id: Option<String>,

    /// Upstream system the events come from
    pub system_id: Option<String>,

    /// Inclusive range, `YYYY-MM-DD/YYYY-MM-DD`
    pub date_range: Option<DateRange>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AnalysisConfig {
    /// Percentile of the wait distribution compared against the mean
    #[serde(default = "default_bottleneck_percentile")]
    pub bottleneck_percentile: f64,

    /// Flag an activity when its percentile wait exceeds this multiple of the mean
    #[serde(default = "default_bottleneck_ratio")]
    pub bottleneck_ratio: f64,

    /// Maximum number of edges drawn in rendered process maps
    #[serde(default = "default_max_rendered_edges")]
    pub max_rendered_edges: usize,

    /// Working seconds available to each resource; enables working-hours utilization
    pub available_seconds_per_resource: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ForecastConfig {
    /// KPIs forecast by `analyze`
    #[serde(default = "default_kpis")]
    pub kpis: Vec<KpiType>,

    /// Variant count above which the process counts as highly variable
    #[serde(default = "default_variant_threshold")]
    pub variant_threshold: usize,

    /// Cases needed before sample size stops lowering confidence
    #[serde(default = "default_min_cases_for_full_confidence")]
    pub min_cases_for_full_confidence: usize,

    /// Cost of one case in flight per hour
    pub cost_per_hour: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Default output format
    #[serde(default)]
    pub format: OutputFormat,

    /// Pretty-print JSON output
    #[serde(default)]
    pub pretty: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Summary,
    Json,
    Csv,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            bottleneck_percentile: default_bottleneck_percentile(),
            bottleneck_ratio: default_bottleneck_ratio(),
            max_rendered_edges: default_max_rendered_edges(),
            available_seconds_per_resource: None,
        }
    }
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            kpis: default_kpis(),
            variant_threshold: default_variant_threshold(),
            min_cases_for_full_confidence: default_min_cases_for_full_confidence(),
            cost_per_hour: None,
        }
    }
}

fn default_bottleneck_percentile() -> f64 {
    90.0
}

fn default_bottleneck_ratio() -> f64 {
    1.5
}

fn default_max_rendered_edges() -> usize {
    DEFAULT_MAX_RENDERED_EDGES
}

fn default_kpis() -> Vec<KpiType> {
    vec![KpiType::Delay, KpiType::Throughput, KpiType::AnomalyRisk]
}

fn default_variant_threshold() -> usize {
    10
}

fn default_min_cases_for_full_confidence() -> usize {
    30
}

const CANDIDATES: [&str; 4] = ["procmine.toml", "procmine.json", "procmine.yaml", "procmine.yml"];

impl Config {
    /// Load configuration from a file.
    ///
    /// Searches for configuration files in this order:
    /// 1. Specified path
    /// 2. ./procmine.toml, ./procmine.json, ./procmine.yaml, ./procmine.yml
    /// 3. `<config dir>/procmine/procmine.toml`
    ///
    /// Returns default configuration if no file is found.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from_path(path);
        }

        let local = CANDIDATES.iter().map(PathBuf::from);
        let user = dirs::config_dir().map(|dir| dir.join("procmine").join("procmine.toml"));

        match local.chain(user).find(|candidate| candidate.exists()) {
            Some(found) => Self::load_from_path(&found),
            None => Ok(Self::default()),
        }
    }

    /// Load configuration from a specific file path.
    fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");

        match extension {
            "toml" => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display())),
            "json" => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display())),
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display())),
            _ => toml::from_str(&contents)
                .or_else(|_| serde_json::from_str(&contents))
                .or_else(|_| serde_yaml::from_str(&contents))
                .with_context(|| format!("Failed to parse config file: {}", path.display())),
        }
    }

    /// Save configuration to a file, choosing the format from its extension.
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::to_string_pretty(self)?,
            Some("yaml" | "yml") => serde_yaml::to_string(self)?,
            _ => toml::to_string_pretty(self)?,
        };

        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    pub fn bottleneck_settings(&self) -> BottleneckSettings {
        BottleneckSettings {
            percentile: self.analysis.bottleneck_percentile,
            ratio: self.analysis.bottleneck_ratio,
            available_seconds_per_resource: self.analysis.available_seconds_per_resource,
        }
    }

    pub fn forecast_settings(&self) -> ForecastSettings {
        ForecastSettings {
            variant_threshold: self.forecast.variant_threshold,
            min_cases_for_full_confidence: self.forecast.min_cases_for_full_confidence,
            cost_per_hour: self.forecast.cost_per_hour,
        }
    }

    pub fn analyzer_settings(&self) -> AnalyzerSettings {
        AnalyzerSettings {
            bottlenecks: self.bottleneck_settings(),
            max_rendered_edges: self.analysis.max_rendered_edges,
            kpis: self.forecast.kpis.clone(),
            ..AnalyzerSettings::default()
        }
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.analysis.bottleneck_percentile, 90.0);
        assert_eq!(config.analysis.bottleneck_ratio, 1.5);
        assert_eq!(config.analysis.max_rendered_edges, 50);
        assert_eq!(config.forecast.variant_threshold, 10);
        assert_eq!(
            config.forecast.kpis,
            vec![KpiType::Delay, KpiType::Throughput, KpiType::AnomalyRisk]
        );
        assert_eq!(config.output.format, OutputFormat::Summary);
        assert!(config.source.process_id.is_none());
    }

    #[test]
    fn test_load_toml_config() {
        let mut temp_file = NamedTempFile::with_suffix(".toml").unwrap();
        let toml_content = r#"
[source]
process-id = "P2P"
system-id = "S4H"
date-range = "2025-01-01/2025-03-31"

[analysis]
bottleneck-ratio = 2.0
available-seconds-per-resource = 28800

[forecast]
kpis = ["delay", "cost", "first_time_right"]
cost-per-hour = 45.5

[output]
format = "json"
pretty = true
"#;
        write!(temp_file, "{toml_content}").unwrap();

        let config = Config::load_from_path(temp_file.path()).unwrap();
        assert_eq!(config.source.process_id.as_deref(), Some("P2P"));
        assert_eq!(
            config.source.date_range,
            Some(DateRange::parse("2025-01-01/2025-03-31").unwrap())
        );
        assert_eq!(config.analysis.bottleneck_ratio, 2.0);
        assert_eq!(config.analysis.bottleneck_percentile, 90.0);
        assert_eq!(config.analysis.available_seconds_per_resource, Some(28800.0));
        assert_eq!(
            config.forecast.kpis,
            vec![
                KpiType::Delay,
                KpiType::Cost,
                KpiType::Other("first_time_right".to_string())
            ]
        );
        assert_eq!(config.forecast.cost_per_hour, Some(45.5));
        assert_eq!(config.output.format, OutputFormat::Json);
        assert!(config.output.pretty);
    }

    #[test]
    fn test_load_json_config() {
        let mut temp_file = NamedTempFile::with_suffix(".json").unwrap();
        let json_content = r#"{
  "analysis": {
    "max-rendered-edges": 20
  },
  "output": {
    "format": "csv"
  }
}"#;
        write!(temp_file, "{json_content}").unwrap();

        let config = Config::load_from_path(temp_file.path()).unwrap();
        assert_eq!(config.analysis.max_rendered_edges, 20);
        assert_eq!(config.output.format, OutputFormat::Csv);
    }

    #[test]
    fn test_load_yaml_config() {
        let mut temp_file = NamedTempFile::with_suffix(".yaml").unwrap();
        write!(
            temp_file,
            "forecast:\n  variant-threshold: 4\n  min-cases-for-full-confidence: 100\n"
        )
        .unwrap();

        let config = Config::load_from_path(temp_file.path()).unwrap();
        assert_eq!(config.forecast.variant_threshold, 4);
        assert_eq!(config.forecast.min_cases_for_full_confidence, 100);
        assert_eq!(config.forecast.kpis.len(), 3);
    }

    #[test]
    fn test_rejects_invalid_date_range() {
        let mut temp_file = NamedTempFile::with_suffix(".toml").unwrap();
        write!(temp_file, "[source]\ndate-range = \"2025-03-31/2025-01-01\"\n").unwrap();

        assert!(Config::load_from_path(temp_file.path()).is_err());
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let err = Config::load(Some(Path::new("nonexistent-procmine.toml"))).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_save_and_reload_roundtrip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("procmine.toml");

        let mut config = Config::default();
        config.source.system_id = Some("S4H".to_string());
        config.forecast.cost_per_hour = Some(60.0);
        config.save(&path).unwrap();

        let reloaded = Config::load(Some(&path)).unwrap();
        assert_eq!(reloaded.source.system_id.as_deref(), Some("S4H"));
        assert_eq!(reloaded.forecast.cost_per_hour, Some(60.0));
        assert_eq!(reloaded.forecast.kpis, config.forecast.kpis);
    }

    #[test]
    fn test_settings_follow_config() {
        let mut config = Config::default();
        config.analysis.bottleneck_ratio = 3.0;
        config.analysis.max_rendered_edges = 7;
        config.forecast.kpis = vec![KpiType::Cost];
        config.forecast.cost_per_hour = Some(10.0);

        let analyzer = config.analyzer_settings();
        assert_eq!(analyzer.bottlenecks.ratio, 3.0);
        assert_eq!(analyzer.max_rendered_edges, 7);
        assert_eq!(analyzer.kpis, vec![KpiType::Cost]);
        assert_eq!(config.forecast_settings().cost_per_hour, Some(10.0));
    }
}
