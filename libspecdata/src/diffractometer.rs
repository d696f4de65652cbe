use indexmap::IndexMap;
use ndarray::Array2;
use serde::Serialize;

use super::error::GeometryError;
use super::geometry_catalog::{geometry_line, split_name_variation, GeometryCatalog};
use super::record::Record;

/// Number of values of a lattice (a, b, c, alpha, beta, gamma)
const LATTICE_ENTRIES: usize = 6;
/// Number of UB matrix elements on a `#G3` line
const UB_ENTRIES: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Lattice {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
}

impl Lattice {
    fn from_slice(values: &[f64]) -> Self {
        Self {
            a: values[0],
            b: values[1],
            c: values[2],
            alpha: values[3],
            beta: values[4],
            gamma: values[5],
        }
    }
}

/// An orientation reflection: its hkl and the axis angles it was found at
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reflection {
    pub h: f64,
    pub k: f64,
    pub l: f64,
    pub angles: IndexMap<String, f64>,
    pub wavelength: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Orientation {
    pub lattice: Lattice,
    pub reciprocal_lattice: Lattice,
    pub reflections: Vec<Reflection>,
}

/// Diffractometer describes the instrument a scan was recorded with.
///
/// It is bound to a geometry name on creation; every measured field stays unset until
/// `parse` reads them from a scan's `#G` lines.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diffractometer {
    pub geometry_name_full: String,
    pub geometry_name: String,
    pub variant: Option<String>,
    /// `#G0` values labelled by the geometry's G labels
    pub geometry: Option<IndexMap<String, f64>>,
    /// `#G4` values labelled by the geometry's Q labels
    pub constraints: Option<IndexMap<String, f64>>,
    pub orientation: Option<Orientation>,
    pub ub_matrix: Option<Array2<f64>>,
    pub wavelength: Option<f64>,
    /// Name of the `g_mode` value, when the geometry names its modes
    pub mode: Option<String>,
    /// The `g_sect` value
    pub sector: Option<i32>,
}

impl Diffractometer {
    pub fn new(geometry_name_full: &str) -> Self {
        let (family, variant) = split_name_variation(geometry_name_full);
        Self {
            geometry_name_full: geometry_name_full.to_string(),
            geometry_name: family.to_string(),
            variant: variant.map(String::from),
            geometry: None,
            constraints: None,
            orientation: None,
            ub_matrix: None,
            wavelength: None,
            mode: None,
            sector: None,
        }
    }

    /// Read the geometry fields of the scan according to the catalog entry.
    ///
    /// `#G0` and `#G4` must have at least as many values as the entry declares labels;
    /// trailing values are ignored. Orientation and UB matrix are only read when the entry
    /// defines them and the scan has enough values. On error nothing is set.
    pub fn parse(&mut self, scan: &Record, catalog: &GeometryCatalog) -> Result<(), GeometryError> {
        let definition = catalog
            .get(&self.geometry_name_full)
            .ok_or_else(|| GeometryError::UnknownGeometry(self.geometry_name_full.clone()))?;

        let geometry = self.labelled(scan, "G0", &definition.g)?;
        let constraints = self.labelled(scan, "G4", &definition.q)?;

        let orientation = if definition.reflection_axes.is_empty() {
            None
        } else {
            read_orientation(scan, &definition.reflection_axes)?
        };

        let ub_matrix = if definition.ub_matrix {
            read_ub_matrix(scan)?
        } else {
            None
        };

        let mode = geometry
            .get("g_mode")
            .filter(|mode| **mode >= 0.0)
            .and_then(|mode| definition.modes.get(*mode as usize))
            .cloned();

        self.wavelength = constraints.get("LAMBDA").copied();
        self.mode = mode;
        self.sector = geometry.get("g_sect").map(|sector| *sector as i32);
        self.geometry = Some(geometry);
        self.constraints = Some(constraints);
        self.orientation = orientation;
        self.ub_matrix = ub_matrix;
        Ok(())
    }

    fn labelled(
        &self,
        scan: &Record,
        group: &'static str,
        labels: &[String],
    ) -> Result<IndexMap<String, f64>, GeometryError> {
        let words = geometry_line(scan, group);
        if words.len() < labels.len() {
            return Err(GeometryError::GeometryShapeMismatch {
                scan: scan.id().clone(),
                geometry: self.geometry_name_full.clone(),
                group,
                expected: labels.len(),
                actual: words.len(),
            });
        }
        let values = to_numbers(scan, group, &words[..labels.len()])?;
        Ok(labels.iter().cloned().zip(values).collect())
    }
}

fn to_numbers(scan: &Record, group: &'static str, words: &[&str]) -> Result<Vec<f64>, GeometryError> {
    words
        .iter()
        .map(|word| {
            word.parse::<f64>().map_err(|_| GeometryError::BadValue {
                scan: scan.id().clone(),
                group,
                value: word.to_string(),
            })
        })
        .collect()
}

/// `#G1`: lattice, reciprocal lattice, hkl of both reflections, the axis angles of
/// both reflections, and both wavelengths
fn read_orientation(scan: &Record, axes: &[String]) -> Result<Option<Orientation>, GeometryError> {
    let words = geometry_line(scan, "G1");
    let n_axes = axes.len();
    let needed = 2 * LATTICE_ENTRIES + 6 + 2 * n_axes + 2;
    if words.len() < needed {
        return Ok(None);
    }
    let values = to_numbers(scan, "G1", &words[..needed])?;

    let lattice = Lattice::from_slice(&values[0..LATTICE_ENTRIES]);
    let reciprocal_lattice = Lattice::from_slice(&values[LATTICE_ENTRIES..2 * LATTICE_ENTRIES]);
    let hkl = &values[2 * LATTICE_ENTRIES..2 * LATTICE_ENTRIES + 6];
    let angles_start = 2 * LATTICE_ENTRIES + 6;
    let wavelengths = &values[angles_start + 2 * n_axes..];

    let reflections = (0..2)
        .map(|i| {
            let angles = &values[angles_start + i * n_axes..angles_start + (i + 1) * n_axes];
            Reflection {
                h: hkl[3 * i],
                k: hkl[3 * i + 1],
                l: hkl[3 * i + 2],
                angles: axes.iter().cloned().zip(angles.iter().copied()).collect(),
                wavelength: wavelengths[i],
            }
        })
        .collect();

    Ok(Some(Orientation {
        lattice,
        reciprocal_lattice,
        reflections,
    }))
}

/// `#G3`: the UB matrix, row-major
fn read_ub_matrix(scan: &Record) -> Result<Option<Array2<f64>>, GeometryError> {
    let words = geometry_line(scan, "G3");
    if words.len() < UB_ENTRIES {
        return Ok(None);
    }
    let values = to_numbers(scan, "G3", &words[..UB_ENTRIES])?;
    Ok(Array2::from_shape_vec((3, 3), values).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn fourc_scan() -> Record {
        let mut scan = Record::new_scan(1, 0);
        scan.set_number(String::from("1"));
        let lines = scan.map_entry("G").unwrap();
        lines.insert(
            String::from("G0"),
            Value::from("0 0 1 0 0 1 0 0 0 0 0 0 50 0 0 0 1 0 0 0 0"),
        );
        lines.insert(
            String::from("G1"),
            Value::from(
                "5.43 5.43 5.43 90 90 90 1.157 1.157 1.157 90 90 90 \
                 0 0 4 2 2 0 69.1 34.5 90 0 106.8 53.4 45 45 1.54 1.54",
            ),
        );
        lines.insert(String::from("G3"), Value::from("1 0 0 0 1 0 0 0 1"));
        lines.insert(String::from("G4"), Value::from("0 0 4 1.54 0 0 0 0 0 0"));
        scan
    }

    #[test]
    fn test_new_is_unset() {
        let gonio = Diffractometer::new("big.little");
        assert_eq!(gonio.geometry_name_full, "big.little");
        assert_eq!(gonio.geometry_name, "big");
        assert_eq!(gonio.variant.as_deref(), Some("little"));
        assert!(gonio.geometry.is_none());
        assert!(gonio.orientation.is_none());
        assert!(gonio.constraints.is_none());
        assert!(gonio.ub_matrix.is_none());
        assert!(gonio.mode.is_none());
        assert!(gonio.sector.is_none());
    }

    #[test]
    fn test_parse_fourc() {
        let catalog = GeometryCatalog::new().unwrap();
        let scan = fourc_scan();
        let mut gonio = Diffractometer::new("fourc.standard");
        gonio.parse(&scan, &catalog).unwrap();

        let definition = catalog.get("fourc.standard").unwrap();
        assert_eq!(gonio.geometry.as_ref().map(IndexMap::len), Some(definition.g.len()));
        assert_eq!(gonio.constraints.as_ref().map(IndexMap::len), Some(definition.q.len()));
        assert_eq!(gonio.wavelength, Some(1.54));
        assert_eq!(gonio.mode.as_deref(), Some("Omega equals zero"));
        assert_eq!(gonio.sector, Some(0));

        let orientation = gonio.orientation.as_ref().unwrap();
        assert_eq!(orientation.lattice.a, 5.43);
        assert_eq!(orientation.reflections.len(), 2);
        assert_eq!(orientation.reflections[1].h, 2.0);
        assert_eq!(orientation.reflections[0].angles.get("tth"), Some(&69.1));
        assert_eq!(orientation.reflections[1].angles.get("phi"), Some(&45.0));

        let ub = gonio.ub_matrix.as_ref().unwrap();
        assert_eq!(ub.shape(), &[3, 3]);
        assert_eq!(ub[[1, 1]], 1.0);
    }

    #[test]
    fn test_parse_spec_without_lines() {
        let catalog = GeometryCatalog::new().unwrap();
        let mut gonio = Diffractometer::new("spec");
        gonio.parse(&Record::new_scan(1, 0), &catalog).unwrap();
        assert_eq!(gonio.geometry.as_ref().map(IndexMap::len), Some(0));
        assert_eq!(gonio.constraints.as_ref().map(IndexMap::len), Some(0));
        assert!(gonio.orientation.is_none());
        assert!(gonio.ub_matrix.is_none());
        assert!(gonio.mode.is_none());
    }

    #[test]
    fn test_mode_names() {
        let catalog = GeometryCatalog::new().unwrap();
        let mut scan = fourc_scan();
        scan.map_entry("G").unwrap().insert(
            String::from("G0"),
            Value::from("3 1 1 0 0 1 0 0 0 0 0 0 50 0 0 0 1 0"),
        );
        let mut gonio = Diffractometer::new("fourc.standard");
        gonio.parse(&scan, &catalog).unwrap();
        assert_eq!(gonio.mode.as_deref(), Some("Phi fixed"));
        assert_eq!(gonio.sector, Some(1));

        // No mode names in the catalog entry
        let mut scan = Record::new_scan(2, 0);
        let lines = scan.map_entry("G").unwrap();
        lines.insert(String::from("G0"), Value::from("0 0"));
        lines.insert(String::from("G4"), Value::from("0 0 1 1.54"));
        let mut gonio = Diffractometer::new("twoc_old.standard");
        gonio.parse(&scan, &catalog).unwrap();
        assert!(gonio.mode.is_none());
        assert_eq!(gonio.sector, Some(0));
    }

    #[test]
    fn test_parse_errors() {
        let catalog = GeometryCatalog::new().unwrap();
        let scan = fourc_scan();

        let mut unknown = Diffractometer::new("spec.kappa");
        assert!(matches!(
            unknown.parse(&scan, &catalog),
            Err(GeometryError::UnknownGeometry(_))
        ));

        let mut too_big = Diffractometer::new("psic.standard");
        let result = too_big.parse(&scan, &catalog);
        assert!(matches!(
            result,
            Err(GeometryError::GeometryShapeMismatch { group: "G4", expected: 15, actual: 10, .. })
        ));
        assert!(too_big.geometry.is_none());
    }
}
