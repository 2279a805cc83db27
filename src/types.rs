use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum Month {
    #[default]
    Jan,
    Feb,
    Mar,
    Apr,
    May,
    Jun,
    Jul,
    Aug,
    Sep,
    Oct,
    Nov,
    Dec,
}

impl Month {
    pub const ALL: [Month; 12] = [
        Month::Jan,
        Month::Feb,
        Month::Mar,
        Month::Apr,
        Month::May,
        Month::Jun,
        Month::Jul,
        Month::Aug,
        Month::Sep,
        Month::Oct,
        Month::Nov,
        Month::Dec,
    ];

    /// Column header used for this month in the climatology sheets.
    pub fn label(self) -> &'static str {
        match self {
            Month::Jan => "Jan",
            Month::Feb => "Feb",
            Month::Mar => "Mar",
            Month::Apr => "Apr",
            Month::May => "May",
            Month::Jun => "Jun",
            Month::Jul => "Jul",
            Month::Aug => "Aug",
            Month::Sep => "Sep",
            Month::Oct => "Oct",
            Month::Nov => "Nov",
            Month::Dec => "Dec",
        }
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown month '{0}', expected one of Jan..Dec")]
pub struct ParseMonthError(pub String);

impl FromStr for Month {
    type Err = ParseMonthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Month::ALL
            .into_iter()
            .find(|m| m.label() == s)
            .ok_or_else(|| ParseMonthError(s.to_string()))
    }
}

/// Which monthly climatology table colors the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Stat {
    #[default]
    Mean,
    Min,
    Max,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown statistic '{0}', expected mean, min or max")]
pub struct ParseStatError(pub String);

impl FromStr for Stat {
    type Err = ParseStatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mean" => Ok(Stat::Mean),
            "min" => Ok(Stat::Min),
            "max" => Ok(Stat::Max),
            _ => Err(ParseStatError(s.to_string())),
        }
    }
}

/// One row per region, one numeric column per header (the twelve months
/// for the climatology sheets).
#[derive(Debug, Clone, PartialEq)]
pub struct ClimateTable {
    name: String,
    regions: Vec<String>,
    columns: Vec<String>,
    // column-major, values[c][r]
    values: Vec<Vec<f64>>,
    row_of: HashMap<String, usize>,
}

impl ClimateTable {
    /// Builds a table from named columns. Every column must have one value per region.
    pub fn new(
        name: impl Into<String>,
        regions: Vec<String>,
        columns: Vec<(String, Vec<f64>)>,
    ) -> Self {
        debug_assert!(columns.iter().all(|(_, v)| v.len() == regions.len()));
        let row_of = regions.iter().enumerate().map(|(i, r)| (r.clone(), i)).collect();
        let (columns, values) = columns.into_iter().unzip();
        Self {
            name: name.into(),
            regions,
            columns,
            values,
            row_of,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn regions(&self) -> &[String] {
        &self.regions
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns
            .iter()
            .position(|c| c == name)
            .map(|i| self.values[i].as_slice())
    }

    pub fn row_index(&self, region: &str) -> Option<usize> {
        self.row_of.get(region).copied()
    }

    pub fn value(&self, region: &str, column: &str) -> Option<f64> {
        let row = self.row_index(region)?;
        self.column(column).map(|values| values[row])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnnualRow {
    pub region: Option<String>,
    pub year: i32,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnnualTable {
    pub rows: Vec<AnnualRow>,
}

/// Everything read from the workbook. Immutable once loaded.
#[derive(Debug, Clone)]
pub struct ClimateData {
    pub mean: ClimateTable,
    pub min: ClimateTable,
    pub max: ClimateTable,
    pub annual: AnnualTable,
}

impl ClimateData {
    pub fn table(&self, stat: Stat) -> &ClimateTable {
        match stat {
            Stat::Mean => &self.mean,
            Stat::Min => &self.min,
            Stat::Max => &self.max,
        }
    }
}
