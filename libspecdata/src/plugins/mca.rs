//! Multichannel analyzer (MCA) lines.
//!
//! `#@MCA`, `#@CHANN`, `#@CTIME`, `#@ROI` and `#@CALIB` describe the analyzer and are
//! collected in the `MCA` mapping of the record they appear in. `@A` lines carry one
//! spectrum per data point, usually continued over several lines with a trailing
//! backslash. `@A` spectra are exported as `_mca_`, `@A1` spectra as `_mca1_`.
use indexmap::IndexMap;

use crate::container::{join_path, Container};
use crate::error::{ContainerError, HandlerError};
use crate::handler::{key_suffix, strip_first_word, Applicability, HandlerDescriptor, HandlerModule};
use crate::plugins::spec_common::{mesh_axes, mesh_shape, reshape_mesh};
use crate::record::{Record, RecordContext};
use crate::value::Value;

pub const MODULE: HandlerModule = HandlerModule {
    name: "mca",
    descriptors,
};

const SPECTRUM_KEY: &str = "@A\\d*";
const CALIBRATION_KEY: &str = "#@[cC][aA][lL][iI][bB]";
/// Analyzer name used by `#@CALIB` lines that do not name one
const DEFAULT_MCA: &str = "mca";

fn descriptors() -> Vec<HandlerDescriptor> {
    vec![
        HandlerDescriptor::new("#@MCA")
            .process(mca_format)
            .writer(write_mca)
            .attributes(&["MCA"]),
        HandlerDescriptor::new("#@CHANN")
            .process(channels)
            .writer(write_mca)
            .attributes(&["MCA"]),
        HandlerDescriptor::new("#@CTIME")
            .process(counting_times)
            .writer(write_mca)
            .attributes(&["MCA"]),
        HandlerDescriptor::new("#@ROI")
            .process(region_of_interest)
            .writer(write_mca)
            .attributes(&["MCA"]),
        HandlerDescriptor::new(CALIBRATION_KEY)
            .process(calibration)
            .writer(write_mca)
            .attributes(&["MCA"]),
        HandlerDescriptor::new(SPECTRUM_KEY)
            .process(spectrum)
            .postprocess(channel_numbers)
            .writer(write_spectra)
            .attributes(&["mca_spectra", "mca_channels"])
            .applies_to(Applicability::Scan),
    ]
}

fn numbers(text: &str) -> Result<Vec<f64>, HandlerError> {
    Ok(text
        .split_whitespace()
        .map(str::parse::<f64>)
        .collect::<Result<Vec<f64>, _>>()?)
}

/// The first `names.len()` numbers after the key, stored under those names
fn named_numbers(line: &str, record: &mut Record, names: &[&str]) -> Result<(), HandlerError> {
    let values = numbers(strip_first_word(line))?;
    if values.len() < names.len() {
        return Err(HandlerError::Mismatch(format!(
            "expected {} values in '{line}'",
            names.len()
        )));
    }
    let mca = record.map_entry("MCA")?;
    for (name, value) in names.iter().zip(values) {
        mca.insert(name.to_string(), Value::Number(value));
    }
    Ok(())
}

/// `#@MCA 16C`
fn mca_format(line: &str, record: &mut Record) -> Result<(), HandlerError> {
    let format = strip_first_word(line);
    record
        .map_entry("MCA")?
        .insert(String::from("format"), Value::from(format));
    Ok(())
}

/// `#@CHANN <number saved> <first> <last> <reduction>`
fn channels(line: &str, record: &mut Record) -> Result<(), HandlerError> {
    named_numbers(
        line,
        record,
        &["number_saved", "first_saved", "last_saved", "reduction_coef"],
    )
}

/// `#@CTIME <preset> <live> <real>`
fn counting_times(line: &str, record: &mut Record) -> Result<(), HandlerError> {
    named_numbers(
        line,
        record,
        &["preset_time", "elapsed_live_time", "elapsed_real_time"],
    )
}

/// `#@ROI <name> <first channel> <last channel>`
fn region_of_interest(line: &str, record: &mut Record) -> Result<(), HandlerError> {
    let text = strip_first_word(line);
    let Some((name, bounds)) = text.split_once(char::is_whitespace) else {
        return Err(HandlerError::MissingValue(line.to_string()));
    };
    let bounds = numbers(bounds)?;
    if bounds.len() != 2 {
        return Err(HandlerError::Mismatch(format!(
            "ROI {name} needs a first and last channel"
        )));
    }
    let regions = record
        .map_entry("MCA")?
        .entry(String::from("ROI"))
        .or_insert_with(|| Value::Map(IndexMap::new()));
    if let Value::Map(regions) = regions {
        regions.insert(name.to_string(), Value::from(bounds));
    }
    Ok(())
}

/// `#@CALIB <a> <b> <c> [mca name]`: energy = a + b * channel + c * channel^2
fn calibration(line: &str, record: &mut Record) -> Result<(), HandlerError> {
    let words: Vec<&str> = strip_first_word(line).split_whitespace().collect();
    if words.len() < 3 {
        return Err(HandlerError::Mismatch(format!(
            "calibration needs three coefficients: '{line}'"
        )));
    }
    let mut coefficients = IndexMap::new();
    for (name, word) in ["a", "b", "c"].into_iter().zip(&words) {
        coefficients.insert(name.to_string(), Value::Number(word.parse::<f64>()?));
    }
    let mca_name = words.get(3).copied().unwrap_or(DEFAULT_MCA);

    let calibrations = record
        .map_entry("MCA")?
        .entry(String::from("CALIB"))
        .or_insert_with(|| Value::Map(IndexMap::new()));
    if let Value::Map(calibrations) = calibrations {
        calibrations.insert(mca_name.to_string(), Value::Map(coefficients));
    }
    Ok(())
}

/// Export name of the spectra of an `@A<n>` line
fn spectrum_name(line: &str) -> String {
    format!("_mca{}_", key_suffix(line, "@A"))
}

fn spectrum(line: &str, record: &mut Record) -> Result<(), HandlerError> {
    let counts = numbers(strip_first_word(line))?;
    let spectra = record
        .map_entry("mca_spectra")?
        .entry(spectrum_name(line))
        .or_insert_with(|| Value::List(Vec::new()));
    if let Value::List(spectra) = spectra {
        spectra.push(Value::from(counts));
    }
    Ok(())
}

/// The `#@CHANN` line of the scan, or of its header
fn channel_layout(record: &Record, header: Option<&Record>) -> (f64, f64) {
    let mca = record
        .value("MCA")
        .and_then(Value::as_map)
        .filter(|mca| mca.contains_key("first_saved"))
        .or_else(|| header.and_then(|h| h.value("MCA")).and_then(Value::as_map));
    let number = |name: &str| mca.and_then(|mca| mca.get(name)).and_then(Value::as_number);
    (
        number("first_saved").unwrap_or(0.0),
        number("reduction_coef").filter(|r| *r > 0.0).unwrap_or(1.0),
    )
}

/// Channel number of every saved channel, per spectrum name
fn channel_numbers(record: &mut Record, context: &RecordContext<'_>) -> Result<(), HandlerError> {
    let (first, step) = channel_layout(record, context.header);
    let lengths: Vec<(String, usize)> = record
        .value("mca_spectra")
        .and_then(Value::as_map)
        .map(|spectra| {
            spectra
                .iter()
                .map(|(name, spectra)| {
                    let length = spectra
                        .as_list()
                        .and_then(|s| s.first())
                        .and_then(Value::as_list)
                        .map_or(0, Vec::len);
                    (name.clone(), length)
                })
                .collect()
        })
        .unwrap_or_default();

    let channels: IndexMap<String, Value> = lengths
        .into_iter()
        .map(|(name, length)| {
            let channel = (0..length).map(|index| first + index as f64 * step).collect::<Vec<f64>>();
            (name, Value::from(channel))
        })
        .collect();
    record.set("mca_channels", Value::Map(channels));
    Ok(())
}

fn write_mca(container: &mut dyn Container, entry: &str, record: &Record) -> Result<(), ContainerError> {
    let Some(mca) = record.value("MCA").and_then(Value::as_map) else {
        return Ok(());
    };
    let group = join_path(entry, "MCA");
    container.make_group(&group, "NXnote", "SPEC MCA parameters")?;
    container.write_dict(&group, mca)
}

fn write_spectra(
    container: &mut dyn Container,
    entry: &str,
    record: &Record,
) -> Result<(), ContainerError> {
    let Some(spectra) = record.value("mca_spectra").and_then(Value::as_map) else {
        return Ok(());
    };
    let channels = record.value("mca_channels").and_then(Value::as_map);
    let shape = mesh_shape(record);
    let first_label = record
        .value("L")
        .and_then(Value::as_list)
        .and_then(|labels| labels.first())
        .and_then(Value::as_text)
        .map(String::from);

    let group = join_path(entry, "data");
    container.make_group(&group, "NXdata", "SPEC scan data")?;
    for (name, points) in spectra {
        let points = points.as_list().map(Vec::as_slice).unwrap_or_default();
        let channel_name = format!("{name}channel_");

        let grid = shape.and_then(|shape| reshape_mesh(points, shape));
        let scan_axes = match (&grid, mesh_axes(record)) {
            (Some(_), Some((first, second))) => Some(format!("{first}:{second}")),
            _ => first_label.clone(),
        };
        let axes = match scan_axes {
            Some(scan_axes) => format!("{scan_axes}:{channel_name}"),
            None => channel_name.clone(),
        };

        container.write_dataset(&group, name, grid.unwrap_or_else(|| Value::List(points.to_vec())))?;
        container.write_dataset_attribute(&group, name, "axes", Value::from(axes))?;
        container.write_dataset_attribute(&group, name, "spec_name", Value::from(name.as_str()))?;
        container.write_dataset_attribute(&group, name, "units", Value::from("counts"))?;
        if let Some(numbers) = channels.and_then(|channels| channels.get(name)) {
            container.write_dataset(&group, &channel_name, numbers.clone())?;
        }
    }
    Ok(())
}
