use std::collections::HashSet;

use geo::{BoundingRect, MultiPolygon, Point, Rect};
use tracing::debug;

use crate::{
    error::SchemaError,
    infer::{parse_int, IdFieldStrategy, Properties},
};

/// A polygon record as it comes out of the boundary source.
#[derive(Debug, Clone)]
pub struct WardFeature {
    pub properties: Properties,
    pub geometry: MultiPolygon<f64>,
}

#[derive(Debug, Clone)]
pub struct WardPolygon {
    pub ward_id: u32,
    pub geometry: MultiPolygon<f64>,
    bbox: Option<Rect<f64>>,
}

impl WardPolygon {
    pub fn new(ward_id: u32, geometry: MultiPolygon<f64>) -> Self {
        let bbox = geometry.bounding_rect();
        Self {
            ward_id,
            geometry,
            bbox,
        }
    }

    pub fn bbox(&self) -> Option<Rect<f64>> {
        self.bbox
    }

    /// Cheap rejection before the exact test. Edges count as inside.
    pub fn may_contain(&self, p: &Point<f64>) -> bool {
        match &self.bbox {
            Some(r) => {
                p.x() >= r.min().x && p.x() <= r.max().x && p.y() >= r.min().y && p.y() <= r.max().y
            }
            None => false,
        }
    }
}

/// Picks the identifier field and turns features into ward polygons, sorted
/// by ward id so that shared-boundary points always go to the lower id.
pub fn ward_polygons<S: IdFieldStrategy>(
    features: Vec<WardFeature>,
    strategy: &S,
) -> Result<(String, Vec<WardPolygon>), SchemaError> {
    let props: Vec<Properties> = features.iter().map(|f| f.properties.clone()).collect();
    let field = strategy.infer(&props)?;
    debug!(field = %field, "ward id field");

    let mut seen = HashSet::new();
    let mut wards = Vec::with_capacity(features.len());
    for (index, feature) in features.into_iter().enumerate() {
        let raw = feature.properties.get(&field);
        let ward_id = raw
            .and_then(parse_int)
            .and_then(|x| u32::try_from(x).ok())
            .filter(|x| *x > 0)
            .ok_or_else(|| SchemaError::InvalidWardId {
                index,
                field: field.clone(),
                value: raw.map(|v| v.to_string()).unwrap_or_else(|| "nothing".to_owned()),
            })?;

        if !seen.insert(ward_id) {
            return Err(SchemaError::DuplicateWardId(ward_id));
        }
        wards.push(WardPolygon::new(ward_id, feature.geometry));
    }

    wards.sort_by_key(|w| w.ward_id);
    Ok((field, wards))
}
