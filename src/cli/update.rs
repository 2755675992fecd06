use super::{analyze, build, ui};
use crate::core::builder::DatasetBuilder;
use crate::core::config::AppConfig;
use crate::core::coverage::{Coverage, UpdateSummary};
use crate::core::output::write_json_atomic;
use anyhow::Result;
use chrono::Utc;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Debug, Clone, Default)]
pub struct UpdateOptions {
    pub skip_analysis: bool,
    /// Fail the run when any broad money value is still missing.
    pub strict: bool,
    /// Overrides `output.summary_path`.
    pub summary_path: Option<PathBuf>,
}

/// Build, write every data copy, analyze, then record coverage in the run
/// summary. The summary is written before any strict check so a failed
/// scheduled run still leaves its report behind.
pub async fn update(
    config: &AppConfig,
    builder: &DatasetBuilder<'_>,
    options: &UpdateOptions,
) -> Result<UpdateSummary> {
    info!("Rebuilding dataset");
    let dataset = build::build_dataset(builder).await?;
    let data_files = build::write_dataset(config, &dataset)?;

    let analysis_file = if options.skip_analysis {
        None
    } else {
        info!("Running macro analysis");
        analyze::write_analysis(&dataset, &config.output.analysis_path)?;
        Some(config.output.analysis_path.clone())
    };

    let coverage = Coverage::of(&dataset);
    let mut notes = vec![
        "Generated by m2tracker update.".to_string(),
        "Use --strict for scheduled runs that must fail on residual missing M2.".to_string(),
    ];
    if !dataset.fx.supplemented_years.is_empty() {
        notes.push(format!(
            "FX years taken from the fallback source for: {}",
            dataset
                .fx
                .supplemented_years
                .keys()
                .cloned()
                .collect::<Vec<_>>()
                .join(", ")
        ));
    }
    if !dataset.fx.filled_years.is_empty() {
        notes.push(format!(
            "FX gaps filled for: {}",
            dataset
                .fx
                .filled_years
                .keys()
                .cloned()
                .collect::<Vec<_>>()
                .join(", ")
        ));
    }

    let summary = UpdateSummary {
        updated_at: Utc::now(),
        data_files,
        analysis_file,
        ran_analysis: !options.skip_analysis,
        strict: options.strict,
        coverage,
        fx_fallbacks: dataset.fx.fallbacks.clone(),
        notes,
    };

    let summary_path = options
        .summary_path
        .as_ref()
        .unwrap_or(&config.output.summary_path);
    write_json_atomic(summary_path, &summary)?;
    info!("Wrote summary {}", summary_path.display());

    build::print_coverage(&dataset, &summary.coverage);
    Ok(summary)
}

pub async fn run(
    config: &AppConfig,
    builder: &DatasetBuilder<'_>,
    options: &UpdateOptions,
) -> Result<()> {
    let summary = update(config, builder, options).await?;
    let coverage = &summary.coverage;
    info!(
        "Coverage: {}-{}, countries={}, totalMissingM2={}",
        coverage.start_year, coverage.end_year, coverage.country_count, coverage.total_missing_m2
    );
    if coverage.has_gaps() && !options.strict {
        warn!("{} broad money values missing", coverage.total_missing_m2);
    }
    if summary.ran_analysis {
        println!(
            "{}",
            ui::style_text("Analysis summary refreshed", ui::StyleType::Subtle)
        );
    }
    coverage.enforce(options.strict)
}
