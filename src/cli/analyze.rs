use super::ui;
use crate::core::analysis::{self, AnalysisSummary};
use crate::core::config::AppConfig;
use crate::core::dataset::Dataset;
use crate::core::output::write_json_atomic;
use anyhow::Result;
use comfy_table::Cell;
use std::path::Path;
use tracing::info;

/// Analyzes `dataset` and writes the summary to `path`.
pub fn write_analysis(dataset: &Dataset, path: &Path) -> Result<AnalysisSummary> {
    let summary = analysis::analyze(dataset);
    write_json_atomic(path, &summary)?;
    info!("Wrote {}", path.display());
    Ok(summary)
}

pub fn run(config: &AppConfig) -> Result<()> {
    let dataset = Dataset::load(config.dataset_path())?;
    let summary = write_analysis(&dataset, &config.output.analysis_path)?;
    display(&summary);
    Ok(())
}

fn fmt2(v: f64) -> String {
    format!("{v:.2}")
}

fn fmt3(v: f64) -> String {
    format!("{v:.3}")
}

pub fn display(summary: &AnalysisSummary) {
    let sample = &summary.sample;
    println!(
        "\n{} {} rows, {} countries",
        ui::style_text("Panel", ui::StyleType::Title),
        sample.rows,
        sample.countries
    );

    let mut corr = ui::new_styled_table();
    corr.set_header(ui::header_row(&["Country", "corr(M2, rate)", "corr(M2, FX)", "Obs"]));
    for c in &summary.country_correlations {
        corr.add_row(vec![
            Cell::new(format!("{} ({})", c.country, c.code)),
            ui::format_optional_cell(c.corr_m2_interest, fmt3),
            ui::format_optional_cell(c.corr_m2_fx, fmt3),
            ui::number_cell(c.obs),
        ]);
    }
    println!("{corr}");

    match &summary.pooled_ols {
        Some(ols) => {
            println!(
                "\n{} n={} k={} R²={}",
                ui::style_text("Pooled OLS", ui::StyleType::Title),
                ols.n_obs,
                ols.n_params,
                ols.r2.map_or("N/A".to_string(), fmt3)
            );
            println!("{}", ui::style_text(&ols.formula, ui::StyleType::Subtle));
            let mut table = ui::new_styled_table();
            table.set_header(ui::header_row(&["Variable", "Coef", "Std err", "t"]));
            for coef in &ols.coefficients {
                table.add_row(vec![
                    Cell::new(&coef.variable),
                    ui::format_optional_cell(coef.coef, fmt3),
                    ui::format_optional_cell(coef.std_err, fmt3),
                    ui::format_optional_cell(coef.t_stat, fmt2),
                ]);
            }
            println!("{table}");
        }
        None => println!(
            "\n{}",
            ui::style_text("Pooled OLS: not estimable", ui::StyleType::Error)
        ),
    }

    let mut events = ui::new_styled_table();
    events.set_header(ui::header_row(&[
        "Year",
        "Event",
        "Growth (year)",
        "Growth ±1",
        "Rate ±1",
        "FX change ±1",
        "Obs",
    ]));
    for e in &summary.event_windows {
        events.add_row(vec![
            Cell::new(e.year),
            Cell::new(&e.title),
            ui::change_cell(e.mean_m2_growth_event_year),
            ui::change_cell(e.mean_m2_growth_window_pm1),
            ui::format_optional_cell(e.mean_lending_rate_window_pm1, fmt2),
            ui::change_cell(e.mean_fx_change_window_pm1),
            ui::number_cell(e.obs_window),
        ]);
    }
    println!("\n{}", ui::style_text("Event windows", ui::StyleType::Title));
    println!("{events}");

    let recent = &summary.recent_summary;
    let mut table = ui::new_styled_table();
    table.set_header(ui::header_row(&["Country", "M2 growth", "Lending rate", "FX change", "Obs"]));
    for c in &recent.countries {
        table.add_row(vec![
            Cell::new(format!("{} ({})", c.country, c.code)),
            ui::change_cell(c.mean_m2_growth_pct),
            ui::format_optional_cell(c.mean_lending_rate_pct, fmt2),
            ui::change_cell(c.mean_fx_change_pct),
            ui::number_cell(c.obs),
        ]);
    }
    println!(
        "\n{} {}-{}",
        ui::style_text("Recent period", ui::StyleType::Title),
        recent.start_year,
        recent.end_year
    );
    println!("{table}");
}
