//! Handlers for the diffractometer lines of a scan: `#G0`..`#G4` and `#Q`.
//!
//! The raw `#G` lines are kept as text. Once the scan is complete it is matched
//! against the geometry catalog and, if a geometry fits, the lines are read into a
//! Diffractometer. Resolution problems are reported on the scan and never fail the file.
use indexmap::IndexMap;

use crate::container::{join_path, Container};
use crate::diffractometer::{Diffractometer, Orientation, Reflection};
use crate::error::{ContainerError, HandlerError};
use crate::handler::{strip_first_word, Applicability, HandlerDescriptor, HandlerModule};
use crate::record::{Record, RecordContext};
use crate::value::Value;

pub const MODULE: HandlerModule = HandlerModule {
    name: "geometry",
    descriptors,
};

const GEOMETRY_KEY: &str = "#G\\d+";

fn descriptors() -> Vec<HandlerDescriptor> {
    vec![
        HandlerDescriptor::new(GEOMETRY_KEY)
            .process(geometry_line)
            .postprocess(resolve_geometry)
            .writer(write_geometry)
            .attributes(&["G", "diffractometer"])
            .applies_to(Applicability::Scan),
        HandlerDescriptor::new("#Q")
            .process(hkl)
            .writer(write_hkl)
            .attributes(&["Q"])
            .applies_to(Applicability::Scan),
    ]
}

fn geometry_line(line: &str, record: &mut Record) -> Result<(), HandlerError> {
    let key = line
        .split_whitespace()
        .next()
        .unwrap_or("")
        .trim_start_matches('#')
        .to_string();
    record
        .map_entry("G")?
        .insert(key, Value::from(strip_first_word(line)));
    Ok(())
}

fn hkl(line: &str, record: &mut Record) -> Result<(), HandlerError> {
    record.set("Q", Value::from_words(strip_first_word(line)));
    Ok(())
}

fn resolve_geometry(record: &mut Record, context: &RecordContext<'_>) -> Result<(), HandlerError> {
    let Some(name) = context.catalog.match_scan(record, context.header) else {
        log::warn!("{} does not match any known diffractometer geometry", record.id());
        record.add_issue(GEOMETRY_KEY, String::from("no matching diffractometer geometry"));
        return Ok(());
    };

    let mut diffractometer = Diffractometer::new(&name);
    match diffractometer.parse(record, context.catalog) {
        Ok(()) => {
            log::debug!("{} was recorded with geometry {name}", record.id());
            record.set("diffractometer", Value::Geometry(Box::new(diffractometer)));
        }
        Err(e) => {
            log::warn!("Could not resolve the diffractometer of {}: {e}", record.id());
            record.add_issue(GEOMETRY_KEY, e.to_string());
        }
    }
    Ok(())
}

fn numbers(values: impl IntoIterator<Item = f64>) -> Value {
    Value::List(values.into_iter().map(Value::Number).collect())
}

fn labelled(map: &IndexMap<String, f64>) -> IndexMap<String, Value> {
    map.iter()
        .map(|(label, value)| (label.clone(), Value::Number(*value)))
        .collect()
}

fn reflection_entries(reflection: &Reflection) -> IndexMap<String, Value> {
    let mut entries = IndexMap::new();
    entries.insert(String::from("h"), Value::Number(reflection.h));
    entries.insert(String::from("k"), Value::Number(reflection.k));
    entries.insert(String::from("l"), Value::Number(reflection.l));
    entries.insert(String::from("wavelength"), Value::Number(reflection.wavelength));
    entries.extend(labelled(&reflection.angles));
    entries
}

fn write_orientation(
    container: &mut dyn Container,
    sample: &str,
    orientation: &Orientation,
) -> Result<(), ContainerError> {
    let lattice = &orientation.lattice;
    container.write_dataset(
        sample,
        "unit_cell",
        numbers([lattice.a, lattice.b, lattice.c, lattice.alpha, lattice.beta, lattice.gamma]),
    )?;
    container.write_dataset(sample, "unit_cell_abc", numbers([lattice.a, lattice.b, lattice.c]))?;
    container.write_dataset(
        sample,
        "unit_cell_alphabetagamma",
        numbers([lattice.alpha, lattice.beta, lattice.gamma]),
    )?;
    for (index, reflection) in orientation.reflections.iter().enumerate() {
        let group = join_path(sample, &format!("or{index}"));
        container.make_group(&group, "NXnote", "orientation reflection")?;
        container.write_dict(&group, &reflection_entries(reflection))?;
    }
    Ok(())
}

fn write_geometry(
    container: &mut dyn Container,
    entry: &str,
    record: &Record,
) -> Result<(), ContainerError> {
    let instrument = join_path(entry, "instrument");
    let parameters = join_path(&instrument, "geometry_parameters");

    let Some(diffractometer) = record.value("diffractometer").and_then(Value::as_geometry) else {
        // Unresolved: keep the raw lines so nothing is lost
        if let Some(lines) = record.value("G").and_then(Value::as_map) {
            container.make_group(&instrument, "NXinstrument", "")?;
            container.make_group(&parameters, "NXnote", "SPEC #G lines")?;
            container.write_dict(&parameters, lines)?;
        }
        return Ok(());
    };

    container.make_group(&instrument, "NXinstrument", "")?;
    container.write_dataset(
        &instrument,
        "name",
        Value::from(diffractometer.geometry_name_full.as_str()),
    )?;
    container.make_group(&parameters, "NXnote", "SPEC geometry arrays")?;
    container.write_dataset(
        &parameters,
        "diffractometer_simple",
        Value::from(diffractometer.geometry_name.as_str()),
    )?;
    container.write_dataset(
        &parameters,
        "diffractometer_full",
        Value::from(diffractometer.geometry_name_full.as_str()),
    )?;
    if let Some(variant) = &diffractometer.variant {
        container.write_dataset(&parameters, "diffractometer_variant", Value::from(variant.as_str()))?;
    }
    if let Some(mode) = &diffractometer.mode {
        container.write_dataset(&parameters, "mode", Value::from(mode.as_str()))?;
    }
    if let Some(sector) = diffractometer.sector {
        container.write_dataset(&parameters, "sector", Value::Number(sector as f64))?;
    }
    if let Some(geometry) = &diffractometer.geometry {
        container.write_dict(&parameters, &labelled(geometry))?;
    }
    if let Some(constraints) = &diffractometer.constraints {
        container.write_dict(&parameters, &labelled(constraints))?;
    }

    if let Some(wavelength) = diffractometer.wavelength {
        let monochromator = join_path(&instrument, "monochromator");
        container.make_group(&monochromator, "NXmonochromator", "")?;
        container.write_dataset(&monochromator, "wavelength", Value::Number(wavelength))?;
    }

    if diffractometer.orientation.is_some()
        || diffractometer.ub_matrix.is_some()
        || diffractometer.wavelength.is_some()
    {
        let sample = join_path(entry, "sample");
        container.make_group(&sample, "NXsample", "")?;
        if let Some(wavelength) = diffractometer.wavelength {
            let beam = join_path(&sample, "beam");
            container.make_group(&beam, "NXbeam", "")?;
            container.write_dataset(&beam, "incident_wavelength", Value::Number(wavelength))?;
        }
        if let Some(orientation) = &diffractometer.orientation {
            write_orientation(container, &sample, orientation)?;
        }
        if let Some(ub) = &diffractometer.ub_matrix {
            let rows = ub.rows().into_iter().map(|row| numbers(row.iter().copied())).collect();
            container.write_dataset(&sample, "ub_matrix", Value::List(rows))?;
        }
    }
    Ok(())
}

fn write_hkl(container: &mut dyn Container, entry: &str, record: &Record) -> Result<(), ContainerError> {
    if let Some(q) = record.value("Q") {
        container.write_dataset(entry, "Q", q.clone())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::UnmatchedPolicy;
    use crate::container::TreeContainer;
    use crate::geometry_catalog::GeometryCatalog;
    use crate::registry::KeyRegistry;
    use crate::spec_file::SpecDataFile;

    const FOURC: &str = "\
#F fourc.dat
#O0 Two Theta  Theta  Chi  Phi
#o0 tth th chi phi

#S 1  ascan  th 0 1 2 0.1
#G0 0 0 1 0 0 1 0 0 0 0 0 0 50 0 0 0 1 0
#G1 5.43 5.43 5.43 90 90 90 1.157 1.157 1.157 90 90 90 0 0 4 2 2 0 69.1 34.5 90 0 106.8 53.4 45 45 1.54 1.54
#G3 1 0 0 0 1 0 0 0 1
#G4 0 0 4 1.54 0 0 0 0
#Q 0 0 4
#P0 69.1 34.5 90 0

#S 2  ascan  th 0 1 2 0.1
#G0 0 x 1
#G4 0 0 4 1.54
";

    fn read(text: &str) -> SpecDataFile {
        let registry = KeyRegistry::with_builtins().unwrap();
        let catalog = GeometryCatalog::new().unwrap();
        SpecDataFile::from_text(text, &registry, &catalog, UnmatchedPolicy::Fatal).unwrap()
    }

    #[test]
    fn test_resolved_geometry() {
        let file = read(FOURC);
        let scan = file.get_scan("1").unwrap();
        let gonio = scan
            .value("diffractometer")
            .and_then(Value::as_geometry)
            .unwrap();
        assert_eq!(gonio.geometry_name_full, "fourc.standard");
        assert_eq!(gonio.geometry.as_ref().map(IndexMap::len), Some(18));
        assert_eq!(gonio.constraints.as_ref().map(IndexMap::len), Some(8));
        assert_eq!(gonio.mode.as_deref(), Some("Omega equals zero"));
        assert_eq!(gonio.sector, Some(0));
        assert!(scan.issues().is_empty());
        assert_eq!(scan.value("Q"), Some(&Value::from(vec![0.0, 0.0, 4.0])));
    }

    #[test]
    fn test_unresolved_geometry_is_not_fatal() {
        let file = read(FOURC);
        // Matches the two-circle geometry by shape, but its #G0 values are not numbers
        let scan = file.get_scan("2").unwrap();
        assert!(scan.value("diffractometer").is_none());
        assert!(scan.has("G"));
        assert_eq!(scan.issues().len(), 1);
        assert_eq!(scan.issues()[0].key, GEOMETRY_KEY);
        assert_eq!(file.scans().len(), 2);
    }

    #[test]
    fn test_write_geometry() {
        let file = read(FOURC);
        let scan = file.get_scan("1").unwrap();
        let mut container = TreeContainer::new();
        container.make_group("/S1", "NXentry", "").unwrap();
        write_geometry(&mut container, "/S1", scan).unwrap();

        let parameters = "/S1/instrument/geometry_parameters";
        assert_eq!(
            container.dataset(parameters, "diffractometer_full"),
            Some(&Value::from("fourc.standard"))
        );
        assert_eq!(container.dataset(parameters, "g_kappa"), Some(&Value::Number(50.0)));
        assert_eq!(
            container.dataset("/S1/instrument/monochromator", "wavelength"),
            Some(&Value::Number(1.54))
        );
        assert_eq!(container.dataset("/S1/sample/or1", "h"), Some(&Value::Number(2.0)));
        let ub = container.dataset("/S1/sample", "ub_matrix").and_then(Value::as_list);
        assert_eq!(ub.map(Vec::len), Some(3));

        assert_eq!(
            container.dataset("/S1/instrument", "name"),
            Some(&Value::from("fourc.standard"))
        );
        assert_eq!(
            container.dataset(parameters, "mode"),
            Some(&Value::from("Omega equals zero"))
        );
        assert_eq!(container.dataset(parameters, "sector"), Some(&Value::Number(0.0)));
        assert_eq!(
            container.dataset("/S1/sample", "unit_cell_abc"),
            Some(&Value::from(vec![5.43, 5.43, 5.43]))
        );
        assert_eq!(
            container.dataset("/S1/sample", "unit_cell_alphabetagamma"),
            Some(&Value::from(vec![90.0, 90.0, 90.0]))
        );
        assert_eq!(
            container.group("/S1/sample/beam").map(|g| g.nx_class.as_str()),
            Some("NXbeam")
        );
        assert_eq!(
            container.dataset("/S1/sample/beam", "incident_wavelength"),
            Some(&Value::Number(1.54))
        );
    }
}
