//! Small fixtures shared by the unit tests: three square regions and
//! matching climatology tables.

use crate::boundaries::parse_collection;
use crate::region_index::RegionIndex;
use crate::types::{AnnualRow, AnnualTable, ClimateData, ClimateTable, Month};
use geojson::FeatureCollection;
use serde_json::json;

pub const REGIONS: [&str; 3] = ["NCR", "Region I", "Region II"];

fn square(west: f64, south: f64, size: f64) -> serde_json::Value {
    json!({
        "type": "Polygon",
        "coordinates": [[
            [west, south],
            [west + size, south],
            [west + size, south + size],
            [west, south + size],
            [west, south]
        ]]
    })
}

fn feature(region: &str, geometry: serde_json::Value) -> serde_json::Value {
    json!({ "type": "Feature", "properties": { "REGION": region }, "geometry": geometry })
}

pub fn regions_json() -> String {
    json!({
        "type": "FeatureCollection",
        "features": [
            feature("NCR", square(120.9, 14.5, 0.2)),
            feature("Region I", square(119.5, 15.5, 1.0)),
            feature("Region II", square(121.5, 16.5, 1.0))
        ]
    })
    .to_string()
}

pub fn regions() -> FeatureCollection {
    parse_collection(&regions_json(), "fixture").unwrap()
}

pub fn index() -> RegionIndex {
    RegionIndex::new(regions(), "REGION").unwrap()
}

pub fn monthly_table(name: &str, offset: f64) -> ClimateTable {
    let columns = Month::ALL
        .iter()
        .enumerate()
        .map(|(m, month)| {
            let values = (0..REGIONS.len())
                .map(|r| offset + r as f64 + m as f64 * 0.5)
                .collect();
            (month.label().to_string(), values)
        })
        .collect();
    ClimateTable::new(name, REGIONS.iter().map(|r| r.to_string()).collect(), columns)
}

pub fn climate_data() -> ClimateData {
    ClimateData {
        mean: monthly_table("mean-temp", 25.0),
        min: monthly_table("min-temp", 20.0),
        max: monthly_table("max-temp", 30.0),
        annual: AnnualTable {
            rows: (1901..=1905)
                .map(|year| AnnualRow {
                    region: Some("Philippines".to_string()),
                    year,
                    mean: 26.0 + (year - 1901) as f64 * 0.1,
                    min: 22.0,
                    max: 31.0,
                })
                .collect(),
        },
    }
}
