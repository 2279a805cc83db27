use crate::config::AppConfig;
use crate::types::{AnnualRow, AnnualTable, ClimateData, ClimateTable};
use anyhow::{Context, Result, anyhow, bail};
use calamine::{Data, Reader, open_workbook_auto};
use csv::ReaderBuilder;
use std::path::Path;
use tracing::{info, warn};

const WORKBOOK_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xlsb", "xls", "ods"];

/// A sheet as read from disk, before any typing.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RawSheet {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Cell {
    Number(f64),
    Text(String),
    Empty,
}

pub fn load_data(config: &AppConfig) -> Result<ClimateData> {
    let input = &config.input.workbook;
    let sheets = &config.input.sheets;
    info!("Loading climate tables from {:?}", input);

    let names = [&sheets.mean, &sheets.min, &sheets.max, &sheets.annual];

    let raw: Vec<RawSheet> = if input.is_dir() {
        names
            .iter()
            .map(|name| read_csv_sheet(&input.join(format!("{name}.csv")), name))
            .collect::<Result<_>>()?
    } else {
        let extension = input.extension()
            .and_then(|e| e.to_str())
            .map(|s: &str| s.to_lowercase())
            .ok_or_else(|| anyhow!("Input workbook has no extension: {:?}", input))?;

        if !WORKBOOK_EXTENSIONS.contains(&extension.as_str()) {
            bail!("Unsupported workbook format: {}", extension);
        }
        read_workbook_sheets(input, &names)?
    };

    let [mean, min, max, annual]: [RawSheet; 4] = raw
        .try_into()
        .map_err(|_| anyhow!("Expected exactly four sheets"))?;

    let region_column = &config.input.region_column;
    let data = ClimateData {
        mean: climate_table(mean, region_column)?,
        min: climate_table(min, region_column)?,
        max: climate_table(max, region_column)?,
        annual: annual_table(annual, region_column)?,
    };

    info!(
        "Loaded {} regions x {} columns per climatology table, {} annual rows",
        data.mean.regions().len(),
        data.mean.columns().len(),
        data.annual.rows.len()
    );

    Ok(data)
}

fn read_workbook_sheets(path: &Path, names: &[&String]) -> Result<Vec<RawSheet>> {
    let mut workbook = open_workbook_auto(path)
        .with_context(|| format!("Failed to open workbook: {:?}", path))?;

    let mut sheets = Vec::with_capacity(names.len());
    for name in names {
        let range = workbook.worksheet_range(name)
            .with_context(|| format!("Failed to read sheet '{}' from {:?}", name, path))?;

        let mut rows = range.rows();
        let headers = rows
            .next()
            .ok_or_else(|| anyhow!("Sheet '{}' is empty", name))?
            .iter()
            .map(|cell| header_text(&workbook_cell(cell)))
            .collect();

        let rows = rows
            .map(|row| row.iter().map(workbook_cell).collect())
            .collect();

        sheets.push(RawSheet { name: name.to_string(), headers, rows });
    }

    Ok(sheets)
}

fn workbook_cell(data: &Data) -> Cell {
    match data {
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Float(f) => Cell::Number(*f),
        Data::DateTime(dt) => Cell::Number(dt.as_f64()),
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => text_cell(s),
        Data::Bool(b) => Cell::Text(b.to_string()),
        _ => Cell::Empty,
    }
}

fn read_csv_sheet(path: &Path, name: &str) -> Result<RawSheet> {
    let mut rdr = ReaderBuilder::new()
        .from_path(path)
        .with_context(|| format!("Failed to open CSV sheet: {:?}", path))?;
    let headers = rdr.headers()?.iter().map(|h| h.trim().to_string()).collect();

    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result.with_context(|| format!("Malformed record in {:?}", path))?;
        rows.push(record.iter().map(csv_cell).collect());
    }

    Ok(RawSheet { name: name.to_string(), headers, rows })
}

fn csv_cell(field: &str) -> Cell {
    let field = field.trim();
    match field.parse::<f64>() {
        Ok(v) => Cell::Number(v),
        Err(_) => text_cell(field),
    }
}

fn text_cell(s: &str) -> Cell {
    let s = s.trim();
    if s.is_empty() { Cell::Empty } else { Cell::Text(s.to_string()) }
}

fn header_text(cell: &Cell) -> String {
    match cell {
        Cell::Text(s) => s.clone(),
        Cell::Number(n) => number_text(*n),
        Cell::Empty => String::new(),
    }
}

/// Region identifiers are strings; integral numbers lose their `.0`.
fn region_text(cell: &Cell) -> Option<String> {
    match cell {
        Cell::Text(s) => Some(s.clone()),
        Cell::Number(n) => Some(number_text(*n)),
        Cell::Empty => None,
    }
}

fn number_text(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

fn numeric(cell: Option<&Cell>) -> Option<f64> {
    match cell {
        Some(Cell::Number(n)) => Some(*n),
        Some(Cell::Text(s)) => s.parse().ok(),
        _ => None,
    }
}

fn column_position(sheet: &RawSheet, column: &str) -> Option<usize> {
    sheet.headers.iter().position(|h| h == column)
}

pub(crate) fn climate_table(sheet: RawSheet, region_column: &str) -> Result<ClimateTable> {
    let region_idx = column_position(&sheet, region_column).ok_or_else(|| {
        anyhow!("Region column '{}' not found in sheet '{}'", region_column, sheet.name)
    })?;

    let value_columns: Vec<(usize, String)> = sheet.headers.iter().enumerate()
        .filter(|(i, h)| *i != region_idx && !h.is_empty())
        .map(|(i, h)| (i, h.clone()))
        .collect();

    let mut regions = Vec::new();
    let mut values: Vec<Vec<f64>> = vec![Vec::new(); value_columns.len()];
    let mut non_numeric = 0usize;

    for row in &sheet.rows {
        let Some(region) = row.get(region_idx).and_then(region_text) else {
            continue;
        };
        regions.push(region);

        for (slot, (idx, _)) in value_columns.iter().enumerate() {
            let value = numeric(row.get(*idx)).unwrap_or_else(|| {
                non_numeric += 1;
                f64::NAN
            });
            values[slot].push(value);
        }
    }

    if non_numeric > 0 {
        warn!("Sheet '{}' has {} non-numeric cells, stored as NaN", sheet.name, non_numeric);
    }

    let columns = value_columns.into_iter()
        .map(|(_, name)| name)
        .zip(values)
        .collect();

    Ok(ClimateTable::new(sheet.name, regions, columns))
}

pub(crate) fn annual_table(sheet: RawSheet, region_column: &str) -> Result<AnnualTable> {
    let required = |column: &str| {
        column_position(&sheet, column)
            .ok_or_else(|| anyhow!("Column '{}' not found in sheet '{}'", column, sheet.name))
    };
    let year_idx = required("year")?;
    let mean_idx = required("mean")?;
    let min_idx = required("min")?;
    let max_idx = required("max")?;
    let region_idx = column_position(&sheet, region_column)
        .or_else(|| column_position(&sheet, "region"));

    let mut rows = Vec::with_capacity(sheet.rows.len());
    for (line, row) in sheet.rows.iter().enumerate() {
        // Trailing blank lines are common in exported sheets
        if row.iter().all(|c| *c == Cell::Empty) {
            continue;
        }
        let year = numeric(row.get(year_idx))
            .ok_or_else(|| anyhow!("Non-numeric year in sheet '{}' row {}", sheet.name, line + 2))?;

        rows.push(AnnualRow {
            region: region_idx.and_then(|i| row.get(i)).and_then(region_text),
            year: year.round() as i32,
            mean: numeric(row.get(mean_idx)).unwrap_or(f64::NAN),
            min: numeric(row.get(min_idx)).unwrap_or(f64::NAN),
            max: numeric(row.get(max_idx)).unwrap_or(f64::NAN),
        });
    }

    Ok(AnnualTable { rows })
}
