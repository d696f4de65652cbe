//! Control lines written by the APS XPCS instrument.
//!
//! `#VA<n>`, `#VD<n>` and `#VE<n>` are numbered parameter rows collected under their
//! row number; `#XPCS` and `#CCD` are `name value...` detector parameters.
use crate::container::{join_path, Container};
use crate::error::{ContainerError, HandlerError};
use crate::handler::{key_suffix, strip_first_word, HandlerDescriptor, HandlerModule};
use crate::record::Record;
use crate::value::Value;

pub const MODULE: HandlerModule = HandlerModule {
    name: "xpcs",
    descriptors,
};

fn descriptors() -> Vec<HandlerDescriptor> {
    vec![
        HandlerDescriptor::new("#VA\\d+")
            .process(va_row)
            .writer(write_va)
            .attributes(&["VA"]),
        HandlerDescriptor::new("#VD\\d+")
            .process(vd_row)
            .writer(write_vd)
            .attributes(&["VD"]),
        HandlerDescriptor::new("#VE\\d+")
            .process(ve_row)
            .writer(write_ve)
            .attributes(&["VE"]),
        HandlerDescriptor::new("#XPCS")
            .process(xpcs_parameter)
            .attributes(&["XPCS"]),
        HandlerDescriptor::new("#CCD")
            .process(ccd_parameter)
            .attributes(&["CCD"]),
    ]
}

/// Store the rest of the line under the row number, e.g. `"3"` for `#VA3`
fn numbered_row(
    line: &str,
    record: &mut Record,
    name: &'static str,
    prefix: &str,
) -> Result<(), HandlerError> {
    let row = key_suffix(line, prefix).to_string();
    record
        .map_entry(name)?
        .insert(row, Value::from(strip_first_word(line)));
    Ok(())
}

fn va_row(line: &str, record: &mut Record) -> Result<(), HandlerError> {
    numbered_row(line, record, "VA", "#VA")
}

fn vd_row(line: &str, record: &mut Record) -> Result<(), HandlerError> {
    numbered_row(line, record, "VD", "#VD")
}

fn ve_row(line: &str, record: &mut Record) -> Result<(), HandlerError> {
    numbered_row(line, record, "VE", "#VE")
}

/// `#XPCS <name> <values...>`
fn named_parameter(line: &str, record: &mut Record, name: &'static str) -> Result<(), HandlerError> {
    let mut words = strip_first_word(line).split_whitespace();
    let parameter = words
        .next()
        .ok_or_else(|| HandlerError::MissingValue(line.to_string()))?;
    record
        .map_entry(name)?
        .insert(parameter.to_string(), Value::text_list(words));
    Ok(())
}

fn xpcs_parameter(line: &str, record: &mut Record) -> Result<(), HandlerError> {
    named_parameter(line, record, "XPCS")
}

fn ccd_parameter(line: &str, record: &mut Record) -> Result<(), HandlerError> {
    named_parameter(line, record, "CCD")
}

fn write_rows(
    container: &mut dyn Container,
    entry: &str,
    record: &Record,
    name: &str,
) -> Result<(), ContainerError> {
    let Some(rows) = record.value(name).and_then(Value::as_map) else {
        return Ok(());
    };
    let group = join_path(entry, name);
    container.make_group(&group, "NXnote", &format!("XPCS {name} parameters"))?;
    for (row, value) in rows {
        let words = value.as_text().unwrap_or_default().split_whitespace();
        container.write_dataset(&group, row, Value::text_list(words))?;
    }
    Ok(())
}

fn write_va(container: &mut dyn Container, entry: &str, record: &Record) -> Result<(), ContainerError> {
    write_rows(container, entry, record, "VA")
}

fn write_vd(container: &mut dyn Container, entry: &str, record: &Record) -> Result<(), ContainerError> {
    write_rows(container, entry, record, "VD")
}

fn write_ve(container: &mut dyn Container, entry: &str, record: &Record) -> Result<(), ContainerError> {
    write_rows(container, entry, record, "VE")
}
