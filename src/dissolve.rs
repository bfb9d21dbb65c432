//! Dissolve module: merge block polygons into one geometry per section.
//!
//! Block boundary files tag every block with the section it belongs to.
//! When a page displays sections, the blocks of each section are unioned
//! into a single Polygon, or a MultiPolygon when the blocks do not touch.
//! Coordinates are normalized to 2D before the union.
use std::collections::HashMap;

use geo::{BooleanOps, Coord, LineString, MultiPolygon, Polygon};
use geojson::feature::Id;
use geojson::{Feature, FeatureCollection, Geometry, Value};
use log::{debug, warn};
use serde::Deserialize;
use serde_json::{Map as JsonObject, Value as JsonValue};

use crate::error::IpiError;
use crate::schema::geometry;

// ── Input ───────────────────────────────────────────────────────────────────

/// Polygon coordinates as found in boundary files: rings of 2D or 3D
/// positions, sometimes wrapped in one extra array level.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawCoordinates {
    Rings(Vec<Vec<Vec<f64>>>),
    Nested(Vec<Vec<Vec<Vec<f64>>>>),
}

/// One block geometry tagged with its parent section.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockPolygon {
    pub section_id: String,
    pub geometry: MultiPolygon<f64>,
}

impl BlockPolygon {
    pub fn new(section_id: impl Into<String>, polygon: Polygon<f64>) -> Self {
        Self {
            section_id: section_id.into(),
            geometry: MultiPolygon::new(vec![polygon]),
        }
    }

    /// Build from raw coordinates, dropping any z value and treating an
    /// extra nesting level as separate polygon parts.
    pub fn from_coordinates(
        section_id: impl Into<String>,
        raw: &RawCoordinates,
    ) -> Result<Self, IpiError> {
        let polygons = match raw {
            RawCoordinates::Rings(rings) => vec![polygon_from_rings(rings)?],
            RawCoordinates::Nested(parts) => parts
                .iter()
                .map(|rings| polygon_from_rings(rings))
                .collect::<Result<Vec<_>, _>>()?,
        };
        Ok(Self {
            section_id: section_id.into(),
            geometry: MultiPolygon::new(polygons),
        })
    }

    pub fn from_json_coordinates(
        section_id: impl Into<String>,
        json: &str,
    ) -> Result<Self, IpiError> {
        let raw: RawCoordinates = serde_json::from_str(json)
            .map_err(|e| IpiError::InvalidGeometry(format!("unreadable coordinates: {e}")))?;
        Self::from_coordinates(section_id, &raw)
    }
}

fn coord_from_position(position: &[f64]) -> Result<Coord<f64>, IpiError> {
    match position {
        [x, y, ..] => Ok(Coord { x: *x, y: *y }),
        _ => Err(IpiError::InvalidGeometry(format!(
            "position with {} ordinates",
            position.len()
        ))),
    }
}

fn ring_from_positions(ring: &[Vec<f64>]) -> Result<LineString<f64>, IpiError> {
    let coords = ring
        .iter()
        .map(|p| coord_from_position(p))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(LineString::new(coords))
}

fn polygon_from_rings(rings: &[Vec<Vec<f64>>]) -> Result<Polygon<f64>, IpiError> {
    let (exterior, interiors) = rings
        .split_first()
        .ok_or_else(|| IpiError::InvalidGeometry("polygon without exterior ring".into()))?;
    let exterior = ring_from_positions(exterior)?;
    let interiors = interiors
        .iter()
        .map(|r| ring_from_positions(r))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Polygon::new(exterior, interiors))
}

fn property_as_string(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// A boundary FeatureCollection read loosely enough to accept the
/// coordinate quirks of exported block files (z values, an extra nesting
/// level) that strict GeoJSON parsing rejects.
#[derive(Debug, Clone, Deserialize)]
pub struct BoundaryCollection {
    pub features: Vec<BoundaryFeature>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BoundaryFeature {
    #[serde(default)]
    pub properties: Option<JsonObject<String, JsonValue>>,
    #[serde(default)]
    pub geometry: Option<BoundaryGeometry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BoundaryGeometry {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub coordinates: JsonValue,
}

impl BoundaryCollection {
    pub fn from_json(json: &str) -> Result<Self, IpiError> {
        Ok(serde_json::from_str(json)?)
    }
}

impl BoundaryGeometry {
    fn polygons(&self) -> Result<Vec<Polygon<f64>>, IpiError> {
        let unreadable =
            |e: serde_json::Error| IpiError::InvalidGeometry(format!("unreadable {}: {e}", self.kind));
        let raw: Vec<RawCoordinates> = match self.kind.as_str() {
            "Polygon" => vec![
                serde_json::from_value(self.coordinates.clone()).map_err(unreadable)?,
            ],
            "MultiPolygon" => {
                serde_json::from_value(self.coordinates.clone()).map_err(unreadable)?
            }
            other => {
                return Err(IpiError::InvalidGeometry(format!(
                    "expected Polygon or MultiPolygon, found {other}"
                )))
            }
        };
        let mut polygons = Vec::new();
        for part in &raw {
            match part {
                RawCoordinates::Rings(rings) => polygons.push(polygon_from_rings(rings)?),
                RawCoordinates::Nested(parts) => {
                    for rings in parts {
                        polygons.push(polygon_from_rings(rings)?);
                    }
                }
            }
        }
        Ok(polygons)
    }
}

/// Read the block features of a boundary file.
///
/// Features without geometry or without `section_property` are skipped.
/// Any geometry other than Polygon / MultiPolygon is an error.
pub fn blocks_from_geojson(
    collection: &BoundaryCollection,
    section_property: &str,
) -> Result<Vec<BlockPolygon>, IpiError> {
    let mut blocks = Vec::with_capacity(collection.features.len());
    for (i, feature) in collection.features.iter().enumerate() {
        let Some(section_id) = feature
            .properties
            .as_ref()
            .and_then(|p| p.get(section_property))
            .and_then(property_as_string)
        else {
            warn!("feature {i} has no '{section_property}' property, skipped");
            continue;
        };
        let Some(geom) = &feature.geometry else {
            warn!("feature {i} ('{section_id}') has no geometry, skipped");
            continue;
        };
        let polygons = geom.polygons().map_err(|e| match e {
            IpiError::InvalidGeometry(msg) => IpiError::InvalidGeometry(format!("feature {i}: {msg}")),
            other => other,
        })?;
        blocks.push(BlockPolygon {
            section_id,
            geometry: MultiPolygon::new(polygons),
        });
    }
    Ok(blocks)
}

// ── Output ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum DissolvedGeometry {
    Polygon(Polygon<f64>),
    MultiPolygon(MultiPolygon<f64>),
}

impl From<MultiPolygon<f64>> for DissolvedGeometry {
    fn from(mut merged: MultiPolygon<f64>) -> Self {
        if merged.0.len() == 1 {
            if let Some(polygon) = merged.0.pop() {
                return DissolvedGeometry::Polygon(polygon);
            }
        }
        DissolvedGeometry::MultiPolygon(merged)
    }
}

impl DissolvedGeometry {
    pub fn type_name(&self) -> &'static str {
        match self {
            DissolvedGeometry::Polygon(_) => "Polygon",
            DissolvedGeometry::MultiPolygon(_) => "MultiPolygon",
        }
    }

    fn to_geojson_value(&self) -> Value {
        match self {
            DissolvedGeometry::Polygon(p) => Value::Polygon(polygon_positions(p)),
            DissolvedGeometry::MultiPolygon(mp) => {
                Value::MultiPolygon(mp.0.iter().map(polygon_positions).collect())
            }
        }
    }
}

fn ring_positions(ring: &LineString<f64>) -> Vec<Vec<f64>> {
    ring.coords().map(|c| vec![c.x, c.y]).collect()
}

fn polygon_positions(polygon: &Polygon<f64>) -> Vec<Vec<Vec<f64>>> {
    std::iter::once(polygon.exterior())
        .chain(polygon.interiors())
        .map(ring_positions)
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct DissolvedSection {
    pub id: usize,
    pub section_id: String,
    pub geometry: DissolvedGeometry,
}

/// One feature per requested section, in request order.
#[derive(Debug, Clone, PartialEq)]
pub struct DissolvedCollection {
    pub features: Vec<DissolvedSection>,
}

impl DissolvedCollection {
    pub fn to_geojson(&self) -> FeatureCollection {
        let features = self
            .features
            .iter()
            .map(|f| {
                let mut properties = JsonObject::new();
                properties.insert(
                    geometry::SECTION_ID.to_string(),
                    JsonValue::String(f.section_id.clone()),
                );
                Feature {
                    bbox: None,
                    geometry: Some(Geometry::new(f.geometry.to_geojson_value())),
                    id: Some(Id::Number(f.id.into())),
                    properties: Some(properties),
                    foreign_members: None,
                }
            })
            .collect();
        FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        }
    }
}

// ── Dissolve ────────────────────────────────────────────────────────────────

// Every polygon part enters the union as its own operand, so parts of the
// same block that overlap are merged too.
fn union_all(parts: &[&MultiPolygon<f64>]) -> MultiPolygon<f64> {
    parts
        .iter()
        .flat_map(|block| block.0.iter())
        .fold(MultiPolygon::new(Vec::new()), |merged, polygon| {
            merged.union(&MultiPolygon::new(vec![polygon.clone()]))
        })
}

/// Union the blocks of each requested section.
///
/// Feature ids run from 0 in the order of `sections`. Fails with
/// `UnknownSection` if a requested section has no block.
pub fn dissolve(
    blocks: &[BlockPolygon],
    sections: &[String],
) -> Result<DissolvedCollection, IpiError> {
    let mut groups: HashMap<&str, Vec<&MultiPolygon<f64>>> = HashMap::new();
    for block in blocks {
        groups
            .entry(block.section_id.as_str())
            .or_default()
            .push(&block.geometry);
    }

    let mut features = Vec::with_capacity(sections.len());
    for (id, section_id) in sections.iter().enumerate() {
        let parts = groups
            .get(section_id.as_str())
            .ok_or_else(|| IpiError::UnknownSection(section_id.clone()))?;
        let geometry = DissolvedGeometry::from(union_all(parts));
        debug!(
            "section '{section_id}': {} blocks dissolved into a {}",
            parts.len(),
            geometry.type_name()
        );
        features.push(DissolvedSection {
            id,
            section_id: section_id.clone(),
            geometry,
        });
    }

    Ok(DissolvedCollection { features })
}
