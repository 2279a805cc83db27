//! Plotly figure builders.
//!
//! Figures are plain serializable values: the server returns them as JSON and
//! the page hands them to `Plotly.react` unchanged. Nothing here keeps state,
//! so the same inputs always produce the same figure.

use crate::region_index::{RegionIndex, UnknownRegion};
use crate::types::{AnnualRow, AnnualTable, ClimateTable};
use geojson::FeatureCollection;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;

pub const COLOR_RANGE: (f64, f64) = (-50.0, 50.0);
pub const LEGEND_TICKS: [i32; 11] = [-50, -40, -30, -20, -10, 0, 10, 20, 30, 40, 50];
pub const COLORBAR_TITLE: &str = "TEMPERATURE (°C)";
pub const MAP_HEIGHT: u32 = 450;
const BASE_OPACITY: f64 = 0.5;
const HIGHLIGHT_OPACITY: f64 = 1.0;
const COLOR_AXIS: &str = "coloraxis";

/// cmocean "balance", as sampled by plotly.
const BALANCE: [&str; 12] = [
    "rgb(23, 28, 66)",
    "rgb(41, 58, 143)",
    "rgb(11, 102, 189)",
    "rgb(69, 144, 185)",
    "rgb(142, 181, 194)",
    "rgb(210, 216, 219)",
    "rgb(230, 210, 204)",
    "rgb(213, 157, 137)",
    "rgb(196, 101, 72)",
    "rgb(172, 43, 36)",
    "rgb(120, 14, 40)",
    "rgb(60, 9, 17)",
];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FigureError {
    #[error("column '{column}' not found in table '{table}'")]
    ColumnNotFound { table: String, column: String },

    #[error(transparent)]
    UnknownRegion(#[from] UnknownRegion),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Figure {
    pub data: Vec<Trace>,
    pub layout: Layout,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum Trace {
    #[serde(rename = "choroplethmapbox")]
    Choropleth(ChoroplethTrace),
    #[serde(rename = "scatter")]
    Line(LineTrace),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChoroplethTrace {
    pub name: String,
    pub geojson: Arc<FeatureCollection>,
    pub featureidkey: String,
    pub locations: Vec<String>,
    pub z: Vec<f64>,
    pub coloraxis: &'static str,
    pub marker: Marker,
    pub hovertemplate: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Marker {
    pub opacity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineTrace {
    pub name: String,
    pub mode: &'static str,
    pub x: Vec<i32>,
    pub y: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Layout {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub margin: Option<Margin>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mapbox: Option<Mapbox>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coloraxis: Option<ColorAxis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xaxis: Option<Axis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub yaxis: Option<Axis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub legend: Option<Legend>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Margin {
    pub r: u32,
    pub t: u32,
    pub l: u32,
    pub b: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Mapbox {
    pub style: &'static str,
    pub center: LatLon,
    pub zoom: f64,
    pub bounds: Bounds,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bounds {
    pub west: f64,
    pub east: f64,
    pub south: f64,
    pub north: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColorAxis {
    pub cmin: f64,
    pub cmax: f64,
    pub colorscale: Vec<(f64, &'static str)>,
    pub colorbar: ColorBar,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColorBar {
    pub title: Title,
    pub orientation: &'static str,
    pub tickvals: Vec<i32>,
    pub ticktext: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Title {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Axis {
    pub title: Title,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Legend {
    pub title: Title,
}

impl Figure {
    pub fn choropleth_traces(&self) -> impl Iterator<Item = &ChoroplethTrace> {
        self.data.iter().filter_map(|t| match t {
            Trace::Choropleth(c) => Some(c),
            _ => None,
        })
    }
}

/// Builds the map: a half-transparent base layer over every table region,
/// plus an opaque overlay restricted to `highlight` when it is non-empty.
pub fn build_choropleth(
    table: &ClimateTable,
    index: &RegionIndex,
    column: &str,
    highlight: &BTreeSet<String>,
) -> Result<Figure, FigureError> {
    let values = table.column(column).ok_or_else(|| FigureError::ColumnNotFound {
        table: table.name().to_string(),
        column: column.to_string(),
    })?;

    let mut data = vec![Trace::Choropleth(ChoroplethTrace {
        name: column.to_string(),
        geojson: Arc::clone(index.collection()),
        featureidkey: index.feature_id_key(),
        locations: table.regions().to_vec(),
        z: values.to_vec(),
        coloraxis: COLOR_AXIS,
        marker: Marker { opacity: BASE_OPACITY },
        hovertemplate: hover_template(index.key(), column),
    })];

    if !highlight.is_empty() {
        let highlights = index.highlight_collection(highlight.iter().map(String::as_str))?;

        let (locations, z): (Vec<String>, Vec<f64>) = table
            .regions()
            .iter()
            .zip(values)
            .filter(|(region, _)| highlight.contains(*region))
            .map(|(region, value)| (region.clone(), *value))
            .unzip();

        data.push(Trace::Choropleth(ChoroplethTrace {
            name: format!("{column} (selected)"),
            geojson: Arc::new(highlights),
            featureidkey: index.feature_id_key(),
            locations,
            z,
            coloraxis: COLOR_AXIS,
            marker: Marker { opacity: HIGHLIGHT_OPACITY },
            hovertemplate: hover_template(index.key(), column),
        }));
    }

    Ok(Figure {
        data,
        layout: map_layout(),
    })
}

fn hover_template(key: &str, column: &str) -> String {
    format!("{key}=%{{location}}<br>{column}=%{{z}}<extra></extra>")
}

fn map_layout() -> Layout {
    Layout {
        margin: Some(Margin { r: 0, t: 0, l: 0, b: 0 }),
        height: Some(MAP_HEIGHT),
        mapbox: Some(Mapbox {
            style: "carto-positron",
            center: LatLon { lat: 12.8797, lon: 121.7740 },
            zoom: 4.0,
            // Philippine archipelago
            bounds: Bounds { west: 110.0, east: 140.0, south: 0.0, north: 25.0 },
        }),
        coloraxis: Some(ColorAxis {
            cmin: COLOR_RANGE.0,
            cmax: COLOR_RANGE.1,
            colorscale: balance_scale(),
            colorbar: ColorBar {
                title: Title { text: COLORBAR_TITLE.to_string() },
                orientation: "v",
                tickvals: LEGEND_TICKS.to_vec(),
                ticktext: LEGEND_TICKS.iter().map(|t| t.to_string()).collect(),
            },
        }),
        ..Layout::default()
    }
}

fn balance_scale() -> Vec<(f64, &'static str)> {
    let last = (BALANCE.len() - 1) as f64;
    BALANCE
        .iter()
        .enumerate()
        .map(|(i, color)| (i as f64 / last, *color))
        .collect()
}

/// Annual mean, min and max as three lines over the year axis.
pub fn build_line_chart(annual: &AnnualTable) -> Figure {
    let x: Vec<i32> = annual.rows.iter().map(|r| r.year).collect();
    let series: [(&str, fn(&AnnualRow) -> f64); 3] = [
        ("mean", |r| r.mean),
        ("min", |r| r.min),
        ("max", |r| r.max),
    ];

    let data = series
        .into_iter()
        .map(|(name, pick)| {
            Trace::Line(LineTrace {
                name: name.to_string(),
                mode: "lines",
                x: x.clone(),
                y: annual.rows.iter().map(pick).collect(),
            })
        })
        .collect();

    Figure {
        data,
        layout: Layout {
            xaxis: Some(Axis { title: Title { text: "year".to_string() } }),
            yaxis: Some(Axis { title: Title { text: "value".to_string() } }),
            legend: Some(Legend { title: Title { text: "variable".to_string() } }),
            ..Layout::default()
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{self, REGIONS};
    use crate::types::Month;

    fn set(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn every_month_without_selection_has_one_layer() {
        let table = test_support::monthly_table("mean-temp", 25.0);
        let index = test_support::index();

        for month in Month::ALL {
            let figure = build_choropleth(&table, &index, month.label(), &BTreeSet::new()).unwrap();
            assert_eq!(figure.data.len(), 1, "month {month}");
        }
    }

    #[test]
    fn base_layer_is_colored_by_selected_column() {
        let table = test_support::monthly_table("mean-temp", 25.0);
        let index = test_support::index();

        let figure = build_choropleth(&table, &index, "Jan", &BTreeSet::new()).unwrap();
        let base = figure.choropleth_traces().next().unwrap();

        assert_eq!(base.locations, REGIONS);
        assert_eq!(base.z, vec![25.0, 26.0, 27.0]);
        assert_eq!(base.featureidkey, "properties.REGION");
        assert_eq!(base.marker.opacity, 0.5);
        assert_eq!(base.geojson.features.len(), 3);
    }

    #[test]
    fn every_non_empty_selection_adds_one_overlay() {
        let table = test_support::monthly_table("mean-temp", 25.0);
        let index = test_support::index();

        // all non-empty subsets of the three regions
        for mask in 1u8..8 {
            let chosen: Vec<&str> = REGIONS
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, r)| *r)
                .collect();
            let highlight = set(&chosen);

            let figure = build_choropleth(&table, &index, "Jul", &highlight).unwrap();
            assert_eq!(figure.data.len(), 2);

            let overlay = figure.choropleth_traces().nth(1).unwrap();
            assert_eq!(overlay.geojson.features.len(), highlight.len());
            assert_eq!(overlay.locations.len(), highlight.len());
            assert_eq!(overlay.marker.opacity, 1.0);
        }
    }

    #[test]
    fn unknown_column_is_reported() {
        let table = test_support::monthly_table("mean-temp", 25.0);
        let index = test_support::index();

        let err = build_choropleth(&table, &index, "Annual", &BTreeSet::new()).unwrap_err();
        assert_eq!(
            err,
            FigureError::ColumnNotFound {
                table: "mean-temp".to_string(),
                column: "Annual".to_string(),
            }
        );
    }

    #[test]
    fn unknown_highlight_region_is_reported() {
        let table = test_support::monthly_table("mean-temp", 25.0);
        let index = test_support::index();

        let highlighted = set(&["NCR", "Region XIV"]);
        let err = build_choropleth(&table, &index, "Jan", &highlighted).unwrap_err();
        assert_eq!(err, FigureError::UnknownRegion(UnknownRegion("Region XIV".to_string())));
    }

    #[test]
    fn legend_and_range_are_fixed() {
        let table = test_support::monthly_table("mean-temp", 25.0);
        let index = test_support::index();

        let figure = build_choropleth(&table, &index, "Jan", &BTreeSet::new()).unwrap();
        let json = serde_json::to_value(&figure).unwrap();
        let axis = &json["layout"]["coloraxis"];

        assert_eq!(axis["cmin"], -50.0);
        assert_eq!(axis["cmax"], 50.0);
        assert_eq!(
            axis["colorbar"]["tickvals"],
            serde_json::json!([-50, -40, -30, -20, -10, 0, 10, 20, 30, 40, 50])
        );
        assert_eq!(axis["colorbar"]["ticktext"][0], "-50");
        assert_eq!(axis["colorbar"]["ticktext"][10], "50");
        assert_eq!(axis["colorscale"][0][0], 0.0);
        assert_eq!(axis["colorscale"][11][0], 1.0);
        assert_eq!(json["data"][0]["type"], "choroplethmapbox");
        assert_eq!(json["layout"]["height"], 450);
        assert_eq!(json["layout"]["mapbox"]["bounds"]["west"], 110.0);
    }

    #[test]
    fn line_chart_has_three_series_and_is_deterministic() {
        let data = test_support::climate_data();

        let first = build_line_chart(&data.annual);
        let second = build_line_chart(&data.annual);
        assert_eq!(first, second);

        let names: Vec<&str> = first
            .data
            .iter()
            .map(|t| match t {
                Trace::Line(l) => l.name.as_str(),
                Trace::Choropleth(_) => panic!("unexpected map trace"),
            })
            .collect();
        assert_eq!(names, ["mean", "min", "max"]);

        let json = serde_json::to_value(&first).unwrap();
        assert_eq!(json["data"][0]["type"], "scatter");
        assert_eq!(json["data"][0]["x"], serde_json::json!([1901, 1902, 1903, 1904, 1905]));
    }
}
