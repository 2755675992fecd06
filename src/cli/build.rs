use super::ui;
use crate::core::builder::DatasetBuilder;
use crate::core::config::AppConfig;
use crate::core::coverage::Coverage;
use crate::core::dataset::Dataset;
use crate::core::output::write_json_atomic;
use anyhow::Result;
use chrono::Utc;
use std::path::PathBuf;
use tracing::info;

/// Runs the builder behind a progress bar.
pub async fn build_dataset(builder: &DatasetBuilder<'_>) -> Result<Dataset> {
    let pb = ui::new_progress_bar(builder.steps(), true);
    let on_step = |label: &str| {
        pb.set_message(label.to_string());
        pb.inc(1);
    };
    let dataset = builder.build(Utc::now(), &on_step).await;
    pb.finish_and_clear();
    dataset
}

/// Writes an identical copy of the dataset to every configured data path.
pub fn write_dataset(config: &AppConfig, dataset: &Dataset) -> Result<Vec<PathBuf>> {
    for path in &config.output.data_paths {
        write_json_atomic(path, dataset)?;
        info!("Wrote {}", path.display());
    }
    Ok(config.output.data_paths.clone())
}

pub async fn run(config: &AppConfig, builder: &DatasetBuilder<'_>) -> Result<()> {
    let dataset = build_dataset(builder).await?;
    let files = write_dataset(config, &dataset)?;

    print_coverage(&dataset, &Coverage::of(&dataset));
    for file in files {
        println!(
            "{}",
            ui::style_text(&format!("Wrote {}", file.display()), ui::StyleType::Subtle)
        );
    }
    Ok(())
}

/// Per-country coverage table plus FX notes.
pub fn print_coverage(dataset: &Dataset, coverage: &Coverage) {
    println!(
        "\n{} {}-{}",
        ui::style_text("Coverage", ui::StyleType::Title),
        coverage.start_year,
        coverage.end_year
    );

    let mut table = ui::new_styled_table();
    table.set_header(ui::header_row(&[
        "Country",
        "Currency",
        "Rows",
        "Valid M2",
        "Valid growth",
        "Missing M2",
        "M2 years",
        "FX source",
    ]));
    for (code, cov) in &coverage.by_country {
        let Some(country) = dataset.countries.get(code) else {
            continue;
        };
        let span = match (cov.first_year, cov.last_year) {
            (Some(first), Some(last)) => format!("{first}-{last}"),
            _ => "N/A".to_string(),
        };
        let fx_source = dataset
            .fx
            .sources
            .get(&country.currency)
            .cloned()
            .unwrap_or_else(|| "N/A".to_string());
        table.add_row(vec![
            comfy_table::Cell::new(format!("{} ({})", country.name, code)),
            comfy_table::Cell::new(&country.currency),
            ui::number_cell(cov.rows),
            ui::number_cell(cov.valid_m2),
            ui::number_cell(cov.valid_growth),
            ui::gap_cell(cov.missing_m2),
            comfy_table::Cell::new(span),
            comfy_table::Cell::new(fx_source),
        ]);
    }
    println!("{table}");

    println!(
        "{} {}",
        ui::style_text("Total missing M2:", ui::StyleType::TotalLabel),
        ui::style_text(
            &coverage.total_missing_m2.to_string(),
            if coverage.has_gaps() {
                ui::StyleType::Error
            } else {
                ui::StyleType::TotalValue
            }
        )
    );
    for fallback in &dataset.fx.fallbacks {
        println!(
            "{}",
            ui::style_text(
                &format!(
                    "FX {}: {} unavailable ({}), using {}",
                    fallback.currency, fallback.primary, fallback.reason, fallback.substitute
                ),
                ui::StyleType::Subtle
            )
        );
    }
    if !coverage.currencies_without_fx.is_empty() {
        println!(
            "{}",
            ui::style_text(
                &format!(
                    "No FX for: {}",
                    coverage.currencies_without_fx.join(", ")
                ),
                ui::StyleType::Error
            )
        );
    }
}
