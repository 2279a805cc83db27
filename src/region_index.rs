use crate::types::ClimateTable;
use geo::{BoundingRect, Contains, MultiPolygon, Point};
use geojson::{Feature, FeatureCollection};
use rstar::{RTree, RTreeObject, AABB};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegionIndexError {
    #[error("feature #{position} has no '{key}' property")]
    MissingIdentifier { position: usize, key: String },

    #[error("feature #{position} has a non-scalar '{key}' property")]
    InvalidIdentifier { position: usize, key: String },

    #[error("region '{0}' appears in more than one feature")]
    DuplicateIdentifier(String),

    #[error("feature '{id}' has unusable geometry: {message}")]
    InvalidGeometry { id: String, message: String },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("region '{0}' not found in region index")]
pub struct UnknownRegion(pub String);

// Wrapper for RTree indexing
struct RegionEnvelope {
    index: usize,
    aabb: AABB<[f64; 2]>,
}

impl RTreeObject for RegionEnvelope {
    type Envelope = AABB<[f64; 2]>;
    fn envelope(&self) -> Self::Envelope {
        self.aabb
    }
}

/// Region identifier to boundary feature, plus point-in-region lookup.
pub struct RegionIndex {
    key: String,
    collection: Arc<FeatureCollection>,
    by_id: HashMap<String, usize>,
    ids: Vec<String>,
    shapes: Vec<Option<MultiPolygon<f64>>>,
    tree: RTree<RegionEnvelope>,
}

impl RegionIndex {
    /// Indexes every feature by its `key` property. Features without the
    /// property are rejected rather than skipped.
    pub fn new(collection: FeatureCollection, key: &str) -> Result<Self, RegionIndexError> {
        let mut by_id = HashMap::with_capacity(collection.features.len());
        let mut ids = Vec::with_capacity(collection.features.len());
        let mut shapes = Vec::with_capacity(collection.features.len());
        let mut envelopes = Vec::new();

        for (position, feature) in collection.features.iter().enumerate() {
            let id_val = feature.properties.as_ref()
                .and_then(|props| props.get(key));

            let key = key.to_string();
            let id = match id_val {
                Some(serde_json::Value::String(s)) => s.clone(),
                Some(serde_json::Value::Number(n)) => n.to_string(),
                None | Some(serde_json::Value::Null) => {
                    return Err(RegionIndexError::MissingIdentifier { position, key })
                }
                Some(_) => return Err(RegionIndexError::InvalidIdentifier { position, key }),
            };

            if by_id.insert(id.clone(), position).is_some() {
                return Err(RegionIndexError::DuplicateIdentifier(id));
            }

            let shape = polygonal(feature, &id)?;
            if let Some(rect) = shape.as_ref().and_then(|s| s.bounding_rect()) {
                envelopes.push(RegionEnvelope {
                    index: position,
                    aabb: AABB::from_corners(
                        [rect.min().x, rect.min().y],
                        [rect.max().x, rect.max().y],
                    ),
                });
            }
            shapes.push(shape);
            ids.push(id);
        }

        Ok(Self {
            key: key.to_string(),
            collection: Arc::new(collection),
            by_id,
            ids,
            shapes,
            tree: RTree::bulk_load(envelopes),
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Plotly's `featureidkey` for this index.
    pub fn feature_id_key(&self) -> String {
        format!("properties.{}", self.key)
    }

    pub fn collection(&self) -> &Arc<FeatureCollection> {
        &self.collection
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn lookup(&self, id: &str) -> Result<&Feature, UnknownRegion> {
        self.by_id
            .get(id)
            .map(|&i| &self.collection.features[i])
            .ok_or_else(|| UnknownRegion(id.to_string()))
    }

    /// A copy of the source collection holding only the features for `ids`.
    pub fn highlight_collection<'a, I>(&self, ids: I) -> Result<FeatureCollection, UnknownRegion>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let features = ids
            .into_iter()
            .map(|id| self.lookup(id).cloned())
            .collect::<Result<Vec<_>, _>>()?;

        Ok(FeatureCollection {
            bbox: self.collection.bbox.clone(),
            features,
            foreign_members: self.collection.foreign_members.clone(),
        })
    }

    /// The region whose boundary contains the point, if any.
    pub fn locate(&self, lon: f64, lat: f64) -> Option<&str> {
        let point = Point::new(lon, lat);
        let envelope = AABB::from_point([lon, lat]);

        self.tree
            .locate_in_envelope_intersecting(&envelope)
            .find(|candidate| {
                self.shapes[candidate.index]
                    .as_ref()
                    .is_some_and(|shape| shape.contains(&point))
            })
            .map(|candidate| self.ids[candidate.index].as_str())
    }

    /// Table regions with no boundary feature. These rows never render.
    pub fn unmatched_regions<'t>(&self, table: &'t ClimateTable) -> Vec<&'t str> {
        table
            .regions()
            .iter()
            .filter(|r| !self.contains(r))
            .map(String::as_str)
            .collect()
    }
}

fn polygonal(feature: &Feature, id: &str) -> Result<Option<MultiPolygon<f64>>, RegionIndexError> {
    let Some(geometry) = feature.geometry.as_ref() else {
        return Ok(None);
    };
    let geometry: geo::Geometry<f64> = geometry.value.clone().try_into()
        .map_err(|e: geojson::Error| RegionIndexError::InvalidGeometry {
            id: id.to_string(),
            message: e.to_string(),
        })?;

    Ok(match geometry {
        geo::Geometry::MultiPolygon(mp) => Some(mp),
        geo::Geometry::Polygon(p) => Some(MultiPolygon::new(vec![p])),
        _ => None, // points and lines cannot be clicked into
    })
}
