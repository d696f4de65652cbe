//! The catalog of diffractometer geometries SPEC knows, and the matcher that picks the
//! geometry a scan was recorded with.
//!
//! A geometry is named `<family>.<variant>` (e.g. `fourc.kappa`); a bare family name
//! refers to the family as a whole. The catalog is bundled with the library and is read
//! once at startup.
use fxhash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use super::error::CatalogError;
use super::record::Record;
use super::value::Value;

/// Load the bundled catalog for windows
#[cfg(target_family = "windows")]
fn load_default_catalog() -> &'static str {
    include_str!("data\\diffractometer_geometries.yml")
}

/// Load the bundled catalog for macos and linux
#[cfg(target_family = "unix")]
fn load_default_catalog() -> &'static str {
    include_str!("data/diffractometer_geometries.yml")
}

/// Split a geometry name into (family, variant). Only a name with exactly one dot is split.
pub fn split_name_variation(name: &str) -> (&str, Option<&str>) {
    match name.split_once('.') {
        Some((family, variant)) if !variant.contains('.') => (family, Some(variant)),
        _ => (name, None),
    }
}

/// The whitespace separated values of one `#G<n>` line of a scan, empty if the line is absent
pub(crate) fn geometry_line<'a>(scan: &'a Record, line: &str) -> Vec<&'a str> {
    scan.value("G")
        .and_then(Value::as_map)
        .and_then(|lines| lines.get(line))
        .and_then(Value::as_text)
        .map(|text| text.split_whitespace().collect())
        .unwrap_or_default()
}

/// Every motor mnemonic declared on the `#o` lines of a header
fn motor_mnemonics(header: &Record) -> FxHashSet<&str> {
    let mut mnemonics = FxHashSet::default();
    let Some(lines) = header.value("o").and_then(Value::as_map) else {
        return mnemonics;
    };
    for value in lines.values().filter_map(Value::as_list) {
        mnemonics.extend(value.iter().filter_map(Value::as_text));
    }
    mnemonics
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryVariant {
    pub name: String,
    #[serde(default)]
    pub motors: Vec<String>,
    #[serde(default)]
    pub description: String,
}

/// One geometry family as described by the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub default: bool,
    /// Labels of the `#G0` values
    #[serde(rename = "G", default)]
    pub g: Vec<String>,
    /// Labels of the `#G4` values
    #[serde(rename = "Q", default)]
    pub q: Vec<String>,
    #[serde(default)]
    pub reflection_axes: Vec<String>,
    #[serde(default)]
    pub ub_matrix: bool,
    /// Mode names, indexed by the `g_mode` value of `#G0`
    #[serde(default)]
    pub modes: Vec<String>,
    #[serde(default)]
    pub variations: Vec<GeometryVariant>,
}

impl GeometryDefinition {
    pub fn variant(&self, name: &str) -> Option<&GeometryVariant> {
        self.variations.iter().find(|variant| variant.name == name)
    }
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    version: String,
    geometries: Vec<GeometryDefinition>,
}

/// Ordering key of a structurally consistent candidate; the larger key wins
type MatchScore = (usize, usize, usize);

/// GeometryCatalog holds every known diffractometer geometry, in catalog order.
#[derive(Debug, Clone)]
pub struct GeometryCatalog {
    geometries: Vec<GeometryDefinition>,
    by_name: FxHashMap<String, usize>,
    default: usize,
}

impl GeometryCatalog {
    /// Load the catalog bundled with the library
    pub fn new() -> Result<Self, CatalogError> {
        Self::from_yaml(load_default_catalog())
    }

    /// Load a catalog from YAML text, validating it
    pub fn from_yaml(contents: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = serde_yaml::from_str(contents)?;

        let defaults: Vec<usize> = file
            .geometries
            .iter()
            .enumerate()
            .filter(|(_, geometry)| geometry.default)
            .map(|(index, _)| index)
            .collect();
        if defaults.len() != 1 {
            return Err(CatalogError::DefaultCount(defaults.len()));
        }

        let mut by_name = FxHashMap::default();
        for (index, geometry) in file.geometries.iter().enumerate() {
            if by_name.insert(geometry.name.clone(), index).is_some() {
                return Err(CatalogError::DuplicateGeometry(geometry.name.clone()));
            }
            let mut variants = FxHashSet::default();
            for variant in geometry.variations.iter() {
                if !variants.insert(variant.name.as_str()) {
                    return Err(CatalogError::DuplicateGeometry(format!(
                        "{}.{}",
                        geometry.name, variant.name
                    )));
                }
            }
            check_labels(&geometry.name, "G", &geometry.g)?;
            check_labels(&geometry.name, "Q", &geometry.q)?;
        }

        log::debug!(
            "Loaded diffractometer geometry catalog version {} with {} geometries",
            file.version,
            file.geometries.len()
        );
        Ok(Self {
            geometries: file.geometries,
            by_name,
            default: defaults[0],
        })
    }

    /// The family definition of a geometry name. A dotted name must name a variant
    /// the family actually has.
    pub fn get(&self, name_full: &str) -> Option<&GeometryDefinition> {
        let (family, variant) = split_name_variation(name_full);
        let definition = self.by_name.get(family).map(|index| &self.geometries[*index])?;
        match variant {
            Some(variant) => definition.variant(variant).map(|_| definition),
            None => Some(definition),
        }
    }

    /// The variant a dotted geometry name refers to
    pub fn variant(&self, name_full: &str) -> Option<&GeometryVariant> {
        let (family, variant) = split_name_variation(name_full);
        self.get(family)?.variant(variant?)
    }

    pub fn has_geometry(&self, name_full: &str) -> bool {
        self.get(name_full).is_some()
    }

    /// The single geometry used when nothing more specific matches (`spec`)
    pub fn default_geometry(&self) -> &GeometryDefinition {
        &self.geometries[self.default]
    }

    /// Geometry names in plain alphabetical order: families only, or every
    /// `family.variant` combination. The default `spec` is not moved to the front.
    pub fn geometries(&self, include_variants: bool) -> Vec<String> {
        let mut names: Vec<String> = if include_variants {
            self.geometries
                .iter()
                .flat_map(|geometry| {
                    geometry
                        .variations
                        .iter()
                        .map(move |variant| format!("{}.{}", geometry.name, variant.name))
                })
                .collect()
        } else {
            self.geometries
                .iter()
                .map(|geometry| geometry.name.clone())
                .collect()
        };
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.geometries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.geometries.is_empty()
    }

    /// Find the geometry a scan was recorded with.
    ///
    /// A header without `#o` motor mnemonics predates the convention that lets variants
    /// be told apart, so only the bare default family is reported. Otherwise a variant is
    /// a candidate when the header has all of its motors and the scan's `#G0` and `#G4`
    /// lines have at least as many values as the family declares labels. Candidates are
    /// ranked by the number of exact value counts, then by declared shape size, then by
    /// motors required; ties keep catalog order. Returns None if nothing is consistent.
    pub fn match_scan(&self, scan: &Record, header: Option<&Record>) -> Option<String> {
        let mnemonics = header.map(motor_mnemonics).unwrap_or_default();
        if mnemonics.is_empty() {
            return Some(self.default_geometry().name.clone());
        }

        let g_count = geometry_line(scan, "G0").len();
        let q_count = geometry_line(scan, "G4").len();

        let mut best: Option<(MatchScore, String)> = None;
        for geometry in self.geometries.iter() {
            if g_count < geometry.g.len() || q_count < geometry.q.len() {
                continue;
            }
            let exact = usize::from(g_count == geometry.g.len())
                + usize::from(q_count == geometry.q.len());
            for variant in geometry.variations.iter() {
                if !variant
                    .motors
                    .iter()
                    .all(|motor| mnemonics.contains(motor.as_str()))
                {
                    continue;
                }
                let score = (
                    exact,
                    geometry.g.len() + geometry.q.len(),
                    variant.motors.len(),
                );
                if best.as_ref().map_or(true, |(current, _)| score > *current) {
                    best = Some((score, format!("{}.{}", geometry.name, variant.name)));
                }
            }
        }
        best.map(|(_, name)| name)
    }
}

fn check_labels(name: &str, group: &'static str, labels: &[String]) -> Result<(), CatalogError> {
    let mut seen = FxHashSet::default();
    for label in labels {
        if !seen.insert(label.as_str()) {
            return Err(CatalogError::DuplicateLabel {
                name: name.to_string(),
                group,
                label: label.clone(),
            });
        }
    }
    Ok(())
}
