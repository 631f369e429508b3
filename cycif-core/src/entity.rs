//! Segmented entities (cells) and the selection/subset maps the data layer
//! publishes.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use serde_json::{Map, Value};
use crate::config::FeatureFields;
use crate::transfer::Rgb;

#[derive(Clone, Debug, PartialEq)]
pub struct Entity {
    pub id: u32,
    pub x: f64,
    pub y: f64,
    pub phenotype: Option<String>,
    /// Numeric measurements keyed by channel full name.
    pub values: HashMap<String, f64>,
}

impl Entity {
    /// Build an entity from a data-layer JSON record.
    ///
    /// Returns `None` when the id or either coordinate is missing or not
    /// numeric. Every other numeric field lands in `values`.
    pub fn from_record(record: &Map<String, Value>, fields: &FeatureFields) -> Option<Self> {
        let id = record.get(&fields.id_field).and_then(as_id)?;
        let x = record.get(&fields.x_coordinate).and_then(as_number)?;
        let y = record.get(&fields.y_coordinate).and_then(as_number)?;
        let phenotype = record
            .get(&fields.phenotype_field)
            .and_then(Value::as_str)
            .map(str::to_string);
        let values = record
            .iter()
            .filter_map(|(k, v)| as_number(v).map(|n| (k.clone(), n)))
            .collect();
        Some(Self { id, x, y, phenotype, values })
    }

    pub fn value(&self, field: &str) -> Option<f64> {
        self.values.get(field).copied()
    }
}

fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_id(v: &Value) -> Option<u32> {
    match v {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub type EntityMap = HashMap<u32, Entity>;

/// Build an id-keyed map from a JSON array of records. Unusable records are
/// skipped.
pub fn entity_map_from_json(records: &[Value], fields: &FeatureFields) -> EntityMap {
    let mut map = EntityMap::with_capacity(records.len());
    for rec in records {
        match rec.as_object().and_then(|o| Entity::from_record(o, fields)) {
            Some(entity) => {
                map.insert(entity.id, entity);
            }
            None => log::warn!("skipping entity record without id/position: {rec}"),
        }
    }
    map
}

/// Current selection and subset.
///
/// Both maps are replaced wholesale. Readers grab an `Rc` snapshot and keep
/// seeing that complete map even if a replacement lands mid-render.
#[derive(Default)]
pub struct SelectionState {
    selection: RefCell<Rc<EntityMap>>,
    subset: RefCell<Rc<EntityMap>>,
}

impl SelectionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selection(&self) -> Rc<EntityMap> {
        Rc::clone(&self.selection.borrow())
    }

    pub fn subset(&self) -> Rc<EntityMap> {
        Rc::clone(&self.subset.borrow())
    }

    pub fn replace_selection(&self, map: EntityMap) {
        *self.selection.borrow_mut() = Rc::new(map);
    }

    pub fn replace_subset(&self, map: EntityMap) {
        *self.subset.borrow_mut() = Rc::new(map);
    }
}

/// Categorical attribute to display colour.
pub trait ColorScheme {
    fn phenotype_color(&self, phenotype: &str) -> Option<Rgb>;
}

/// Map-backed colour scheme.
#[derive(Clone, Debug, Default)]
pub struct PhenotypePalette {
    colors: HashMap<String, Rgb>,
}

impl PhenotypePalette {
    pub fn new(colors: HashMap<String, Rgb>) -> Self {
        Self { colors }
    }
}

impl ColorScheme for PhenotypePalette {
    fn phenotype_color(&self, phenotype: &str) -> Option<Rgb> {
        self.colors.get(phenotype).copied()
    }
}

/// Palette that can be swapped after construction (the data layer loads
/// phenotype colours asynchronously).
#[derive(Default)]
pub struct SharedPalette(RefCell<PhenotypePalette>);

impl SharedPalette {
    pub fn replace(&self, palette: PhenotypePalette) {
        *self.0.borrow_mut() = palette;
    }
}

impl ColorScheme for SharedPalette {
    fn phenotype_color(&self, phenotype: &str) -> Option<Rgb> {
        self.0.borrow().phenotype_color(phenotype)
    }
}
