use super::ui;
use crate::core::config::AppConfig;
use crate::core::dataset::{ConvertedSeries, Dataset};
use anyhow::{Result, bail};
use comfy_table::Cell;
use std::collections::BTreeSet;

/// Converts the selected countries into `base` and prints one row per year.
pub fn run(config: &AppConfig, base: &str, countries: Option<&str>) -> Result<()> {
    let dataset = Dataset::load(config.dataset_path())?;
    let base = base.trim().to_uppercase();
    if !dataset.supports_base(&base) {
        bail!("Unsupported base currency: {}", base);
    }

    let series = dataset
        .select(countries.unwrap_or_default())
        .iter()
        .map(|code| dataset.converted_series(code, &base))
        .collect::<Result<Vec<_>>>()?;

    println!(
        "\n{} billions of {}",
        ui::style_text("Broad money", ui::StyleType::Title),
        base
    );
    println!("{}", render(&series));
    Ok(())
}

fn render(series: &[ConvertedSeries]) -> comfy_table::Table {
    let mut table = ui::new_styled_table();
    let mut header = vec![ui::header_cell("Year")];
    header.extend(series.iter().map(|s| ui::header_cell(&s.code)));
    table.set_header(header);

    let years: BTreeSet<i32> = series
        .iter()
        .flat_map(|s| s.points.iter().map(|p| p.year))
        .collect();
    for year in years {
        let mut row = vec![Cell::new(year)];
        row.extend(series.iter().map(|s| {
            let value = s.points.iter().find(|p| p.year == year).and_then(|p| p.value);
            ui::format_optional_cell(value, |v| format!("{v:.1}"))
        }));
        table.add_row(row);
    }
    table
}
