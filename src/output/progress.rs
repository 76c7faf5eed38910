use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use super::styling::{bright, bright_green, bright_yellow};

/// Spinner per analysis phase, drawn on stderr.
///
/// A hidden instance keeps the same call sequence without drawing anything.
pub struct PhaseProgress {
    pb: ProgressBar,
    visible: bool,
}

impl PhaseProgress {
    pub fn start_correlation(visible: bool) -> Self {
        if visible {
            eprintln!("{}  {}", bright("⚙️"), bright("Phases").underlined());
        }
        let pb = create_spinner(visible, "Phase 1/3: Correlating variants");
        Self { pb, visible }
    }

    pub fn finish_correlation_start_analysis(self, variants: usize) -> Self {
        self.pb.finish_with_message(
            bright_green(format!("Phase 1/3: Correlated {variants} variants ✓")).to_string(),
        );
        let pb = create_spinner(
            self.visible,
            "Phase 2/3: Analyzing bottlenecks and process map",
        );
        Self { pb, ..self }
    }

    pub fn finish_analysis_start_forecasting(self, kpis: usize) -> Self {
        self.pb.finish_with_message(
            bright_green("Phase 2/3: Bottlenecks and process map analyzed ✓").to_string(),
        );
        let pb = create_spinner(
            self.visible,
            &format!("Phase 3/3: Forecasting {kpis} KPIs"),
        );
        Self { pb, ..self }
    }

    pub fn finish_forecasting(self) {
        self.pb
            .finish_with_message(bright_green("Phase 3/3: Forecasts complete ✓").to_string());
        if self.visible {
            eprintln!("\n");
        }
    }
}

fn create_spinner(visible: bool, message: &str) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new_spinner();
    pb.set_draw_target(ProgressDrawTarget::stderr());
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("  {msg} {spinner}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(bright_yellow(message).to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}
