//! Handlers for the control lines every SPEC data file uses.
//!
//! Header lines (`#F #E #D #C #O #o #J #j`) describe the file and its motors and
//! counters. Scan lines (`#S #D #T #M #X #P #N #L`) and the numeric data rows describe
//! one scan; `#U` and `#R` hold free-form user lines. Motor positions and data columns
//! are paired with their names once the scan has been completely read. The columns of
//! a `mesh` or `hklmesh` scan are reshaped to its grid.
use indexmap::IndexMap;
use time::macros::format_description;
use time::PrimitiveDateTime;

use crate::container::{join_path, Container};
use crate::error::{ContainerError, HandlerError};
use crate::handler::{
    split_column_labels, strip_first_word, Applicability, Boundary, HandlerDescriptor,
    HandlerModule,
};
use crate::record::{Record, RecordContext};
use crate::value::Value;

pub const MODULE: HandlerModule = HandlerModule {
    name: "spec_common",
    descriptors,
};

const POSITIONS_KEY: &str = "#P\\d+";
const DATA_KEY: &str = "scan_data";

fn descriptors() -> Vec<HandlerDescriptor> {
    vec![
        HandlerDescriptor::new("#F")
            .process(file_name)
            .writer(write_file_name)
            .attributes(&["file"])
            .applies_to(Applicability::Header)
            .boundary(Boundary::OpensHeader),
        HandlerDescriptor::new("#E")
            .process(epoch)
            .attributes(&["epoch"])
            .applies_to(Applicability::Header),
        HandlerDescriptor::new("#D")
            .process(date)
            .writer(write_date)
            .attributes(&["date"]),
        HandlerDescriptor::new("#C")
            .process(comment)
            .writer(write_comments)
            .attributes(&["comments"]),
        HandlerDescriptor::new("#O\\d+")
            .process(motor_names)
            .attributes(&["O"])
            .applies_to(Applicability::Header),
        HandlerDescriptor::new("#o\\d+")
            .process(motor_mnemonics)
            .attributes(&["o"])
            .applies_to(Applicability::Header),
        HandlerDescriptor::new("#J\\d+")
            .process(counter_names)
            .attributes(&["J"])
            .applies_to(Applicability::Header),
        HandlerDescriptor::new("#j\\d+")
            .process(counter_mnemonics)
            .attributes(&["j"])
            .applies_to(Applicability::Header),
        HandlerDescriptor::new("#S")
            .process(scan_start)
            .writer(write_scan_title)
            .attributes(&["scan_command"])
            .applies_to(Applicability::Scan)
            .boundary(Boundary::OpensScan),
        HandlerDescriptor::new("#T")
            .process(count_time)
            .writer(write_count_time)
            .attributes(&["T"])
            .applies_to(Applicability::Scan),
        HandlerDescriptor::new("#M")
            .process(monitor_count)
            .writer(write_monitor_count)
            .attributes(&["M"])
            .applies_to(Applicability::Scan),
        HandlerDescriptor::new("#X")
            .process(temperature_set_point)
            .writer(write_temperature_set_point)
            .attributes(&["TEMP_SP", "DEGC_SP"])
            .applies_to(Applicability::Scan),
        HandlerDescriptor::new("#U")
            .process(user_reserved)
            .writer(write_user_lines)
            .attributes(&["U"]),
        HandlerDescriptor::new("#R")
            .process(user_results)
            .writer(write_user_lines)
            .attributes(&["R"]),
        HandlerDescriptor::new(POSITIONS_KEY)
            .process(positions)
            .postprocess(pair_positioners)
            .writer(write_positioners)
            .attributes(&["P", "positioners"])
            .applies_to(Applicability::Scan),
        HandlerDescriptor::new("#N")
            .process(column_count)
            .attributes(&["N"])
            .applies_to(Applicability::Scan),
        HandlerDescriptor::new("#L")
            .process(column_labels)
            .attributes(&["L"])
            .applies_to(Applicability::Scan),
        HandlerDescriptor::new(DATA_KEY)
            .process(data_row)
            .postprocess(pair_data_columns)
            .writer(write_data)
            .match_key(is_data_row)
            .attributes(&["data_lines", "data"])
            .applies_to(Applicability::Scan),
    ]
}

/// The key word of a numbered line without its `#`, e.g. `O0` for `#O0 ...`
fn row_key(line: &str) -> String {
    line.split_whitespace()
        .next()
        .unwrap_or("")
        .trim_start_matches('#')
        .to_string()
}

fn required_text(line: &str) -> Result<&str, HandlerError> {
    match strip_first_word(line) {
        "" => Err(HandlerError::MissingValue(line.to_string())),
        text => Ok(text),
    }
}

fn first_number(line: &str) -> Result<f64, HandlerError> {
    let text = required_text(line)?;
    let word = text.split_whitespace().next().unwrap_or(text);
    Ok(word.parse::<f64>()?)
}

fn label_list(text: &str) -> Value {
    Value::List(split_column_labels(text).into_iter().map(Value::from).collect())
}

/// Convert a SPEC date to ISO 8601; None if the text is not a SPEC date
pub fn iso_date(text: &str) -> Option<String> {
    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
    // How SPEC writes dates, e.g. `Thu Jul 17 02:38:24 2003`
    let parsed = PrimitiveDateTime::parse(
        &normalized,
        format_description!(
            "[weekday repr:short] [month repr:short] [day padding:none] [hour]:[minute]:[second] [year]"
        ),
    )
    .ok()?;
    parsed
        .format(format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"))
        .ok()
}

fn file_name(line: &str, record: &mut Record) -> Result<(), HandlerError> {
    record.set("file", Value::from(required_text(line)?));
    Ok(())
}

fn epoch(line: &str, record: &mut Record) -> Result<(), HandlerError> {
    record.set("epoch", Value::Number(first_number(line)?));
    Ok(())
}

/// Dates SPEC did not write in its own format are kept verbatim
fn date(line: &str, record: &mut Record) -> Result<(), HandlerError> {
    let text = required_text(line)?;
    let value = iso_date(text).unwrap_or_else(|| {
        log::debug!("Could not interpret '{text}' as a SPEC date; keeping it verbatim");
        text.to_string()
    });
    record.set("date", Value::from(value));
    Ok(())
}

fn comment(line: &str, record: &mut Record) -> Result<(), HandlerError> {
    record
        .list_entry("comments")?
        .push(Value::from(strip_first_word(line)));
    Ok(())
}

fn motor_names(line: &str, record: &mut Record) -> Result<(), HandlerError> {
    record
        .map_entry("O")?
        .insert(row_key(line), label_list(strip_first_word(line)));
    Ok(())
}

fn motor_mnemonics(line: &str, record: &mut Record) -> Result<(), HandlerError> {
    record.map_entry("o")?.insert(
        row_key(line),
        Value::text_list(strip_first_word(line).split_whitespace()),
    );
    Ok(())
}

fn counter_names(line: &str, record: &mut Record) -> Result<(), HandlerError> {
    record
        .map_entry("J")?
        .insert(row_key(line), label_list(strip_first_word(line)));
    Ok(())
}

fn counter_mnemonics(line: &str, record: &mut Record) -> Result<(), HandlerError> {
    record.map_entry("j")?.insert(
        row_key(line),
        Value::text_list(strip_first_word(line).split_whitespace()),
    );
    Ok(())
}

/// `#S <number> <command>`
fn scan_start(line: &str, record: &mut Record) -> Result<(), HandlerError> {
    let text = required_text(line)?;
    let (number, command) = match text.split_once(char::is_whitespace) {
        Some((number, command)) => (number, command.trim()),
        None => (text, ""),
    };
    record.set_number(number.to_string());
    record.set("scan_command", Value::from(command));
    Ok(())
}

fn count_time(line: &str, record: &mut Record) -> Result<(), HandlerError> {
    record.set("T", Value::Number(first_number(line)?));
    Ok(())
}

fn monitor_count(line: &str, record: &mut Record) -> Result<(), HandlerError> {
    record.set("M", Value::Number(first_number(line)?));
    Ok(())
}

/// `#X <set point> [<set point in C>]`
fn temperature_set_point(line: &str, record: &mut Record) -> Result<(), HandlerError> {
    let text = required_text(line)?;
    let mut words = text.split_whitespace();
    let set_point = words.next().unwrap_or(text).parse::<f64>()?;
    record.set("TEMP_SP", Value::Number(set_point));
    if let Some(word) = words.next() {
        record.set("DEGC_SP", Value::Number(word.parse::<f64>()?));
    }
    Ok(())
}

fn user_reserved(line: &str, record: &mut Record) -> Result<(), HandlerError> {
    record.list_entry("U")?.push(Value::from(strip_first_word(line)));
    Ok(())
}

fn user_results(line: &str, record: &mut Record) -> Result<(), HandlerError> {
    record.list_entry("R")?.push(Value::from(strip_first_word(line)));
    Ok(())
}

fn positions(line: &str, record: &mut Record) -> Result<(), HandlerError> {
    record
        .map_entry("P")?
        .insert(row_key(line), Value::from_words(strip_first_word(line)));
    Ok(())
}

fn column_count(line: &str, record: &mut Record) -> Result<(), HandlerError> {
    record.set("N", Value::Number(first_number(line)?));
    Ok(())
}

fn column_labels(line: &str, record: &mut Record) -> Result<(), HandlerError> {
    record.set("L", label_list(strip_first_word(line)));
    Ok(())
}

/// A data row starts with a number
fn is_data_row(token: &str) -> bool {
    token.starts_with(|c: char| c.is_ascii_digit() || matches!(c, '-' | '+' | '.'))
        && token.parse::<f64>().is_ok()
}

fn data_row(line: &str, record: &mut Record) -> Result<(), HandlerError> {
    let row = line
        .split_whitespace()
        .map(|word| word.parse::<f64>().map(Value::Number))
        .collect::<Result<Vec<Value>, _>>()?;
    record.list_entry("data_lines")?.push(Value::List(row));
    Ok(())
}

/// Flatten the values of a mapping of numbered rows (`O0`, `O1`, ...) in row order
fn flatten_rows(value: Option<&Value>) -> Vec<Value> {
    value
        .and_then(Value::as_map)
        .map(|rows| {
            rows.values()
                .filter_map(Value::as_list)
                .flat_map(|row| row.iter().cloned())
                .collect()
        })
        .unwrap_or_default()
}

/// Grid of a `mesh` or `hklmesh` scan as (first axis points, second axis points).
///
/// Both commands read `<axis1> <start1> <end1> <intervals1> <axis2> <start2> <end2>
/// <intervals2> <time>`.
pub fn mesh_shape(record: &Record) -> Option<(usize, usize)> {
    let command = record.value("scan_command").and_then(Value::as_text)?;
    let words: Vec<&str> = command.split_whitespace().collect();
    if !matches!(words.first(), Some(&"mesh") | Some(&"hklmesh")) {
        return None;
    }
    let intervals1 = words.get(4)?.parse::<usize>().ok()?;
    let intervals2 = words.get(8)?.parse::<usize>().ok()?;
    Some((intervals1 + 1, intervals2 + 1))
}

/// Names of the two scanned axes of a mesh, in command order
pub fn mesh_axes(record: &Record) -> Option<(String, String)> {
    let command = record.value("scan_command").and_then(Value::as_text)?;
    let words: Vec<&str> = command.split_whitespace().collect();
    Some((words.get(1)?.to_string(), words.get(5)?.to_string()))
}

/// Arrange the points of a mesh as `grid[first][second]`. SPEC steps the first axis
/// fastest, so point `first + second * n_first` lands at `[first][second]`.
pub fn reshape_mesh(points: &[Value], (n_first, n_second): (usize, usize)) -> Option<Value> {
    if points.len() != n_first * n_second {
        return None;
    }
    let grid = (0..n_first)
        .map(|first| {
            Value::List(
                (0..n_second)
                    .map(|second| points[first + second * n_first].clone())
                    .collect(),
            )
        })
        .collect();
    Some(Value::List(grid))
}

/// Pair the `#P` positions with the motor names of the header's `#O` lines
fn pair_positioners(record: &mut Record, context: &RecordContext<'_>) -> Result<(), HandlerError> {
    let names = flatten_rows(context.header.and_then(|header| header.value("O")));
    if names.is_empty() {
        log::warn!("{} has #P lines but its header names no motors", record.id());
        record.add_issue(
            POSITIONS_KEY,
            String::from("no #O motor names for the #P positions"),
        );
        return Ok(());
    }
    let values = flatten_rows(record.value("P"));
    if names.len() != values.len() {
        log::warn!(
            "{} has {} motor positions for {} motor names",
            record.id(),
            values.len(),
            names.len()
        );
        record.add_issue(
            POSITIONS_KEY,
            format!("{} positions for {} motor names", values.len(), names.len()),
        );
    }

    let positioners: IndexMap<String, Value> = names
        .iter()
        .filter_map(Value::as_text)
        .map(String::from)
        .zip(values)
        .collect();
    record.set("positioners", Value::Map(positioners));
    Ok(())
}

/// Turn the data rows into columns named by the `#L` labels. Rows of the wrong width
/// are dropped.
fn pair_data_columns(record: &mut Record, _context: &RecordContext<'_>) -> Result<(), HandlerError> {
    let rows: Vec<Vec<Value>> = record
        .value("data_lines")
        .and_then(Value::as_list)
        .map(|rows| rows.iter().filter_map(Value::as_list).cloned().collect())
        .unwrap_or_default();
    let labels: Vec<String> = record
        .value("L")
        .and_then(Value::as_list)
        .map(|labels| {
            labels
                .iter()
                .filter_map(Value::as_text)
                .map(String::from)
                .collect()
        })
        .ok_or_else(|| HandlerError::MissingAttribute(String::from("L")))?;

    let mut columns: Vec<Vec<Value>> = vec![Vec::with_capacity(rows.len()); labels.len()];
    let mut skipped = 0;
    for row in rows {
        if row.len() != labels.len() {
            skipped += 1;
            continue;
        }
        for (column, value) in columns.iter_mut().zip(row) {
            column.push(value);
        }
    }
    if skipped > 0 {
        log::warn!(
            "{} has {skipped} data rows that do not match its {} column labels; they were dropped",
            record.id(),
            labels.len()
        );
        record.add_issue(
            DATA_KEY,
            format!("{skipped} data rows do not match the #L labels"),
        );
    }

    if let Some(shape) = mesh_shape(record) {
        let n_points = columns.first().map_or(0, Vec::len);
        let grids: Option<Vec<Value>> = columns
            .iter()
            .map(|column| reshape_mesh(column, shape))
            .collect();
        match grids {
            Some(grids) => {
                let data: IndexMap<String, Value> = labels.into_iter().zip(grids).collect();
                record.set("data", Value::Map(data));
                return Ok(());
            }
            None => {
                log::warn!(
                    "{} is a {}x{} mesh but has {n_points} data points; its data is kept flat",
                    record.id(),
                    shape.0,
                    shape.1
                );
                record.add_issue(
                    DATA_KEY,
                    format!("{n_points} data points for a {}x{} mesh", shape.0, shape.1),
                );
            }
        }
    }

    let data: IndexMap<String, Value> = labels
        .into_iter()
        .zip(columns.into_iter().map(Value::List))
        .collect();
    record.set("data", Value::Map(data));
    Ok(())
}

fn write_file_name(
    container: &mut dyn Container,
    entry: &str,
    record: &Record,
) -> Result<(), ContainerError> {
    if let Some(file) = record.value("file") {
        container.write_dataset(entry, "spec_file", file.clone())?;
    }
    Ok(())
}

fn write_date(container: &mut dyn Container, entry: &str, record: &Record) -> Result<(), ContainerError> {
    if let Some(date) = record.value("date") {
        container.write_dataset(entry, "start_time", date.clone())?;
    }
    Ok(())
}

fn write_comments(
    container: &mut dyn Container,
    entry: &str,
    record: &Record,
) -> Result<(), ContainerError> {
    let Some(comments) = record.value("comments") else {
        return Ok(());
    };
    let name = if record.is_scan() { "comments" } else { "file_comments" };
    container.write_dataset(entry, name, comments.clone())
}

fn write_scan_title(
    container: &mut dyn Container,
    entry: &str,
    record: &Record,
) -> Result<(), ContainerError> {
    let number = record.number().unwrap_or_default();
    let command = record
        .value("scan_command")
        .and_then(Value::as_text)
        .unwrap_or_default();
    container.write_dataset(entry, "title", Value::from(format!("{number}  {command}")))?;
    container.write_dataset(entry, "scan_number", Value::from(number))?;
    container.write_dataset(entry, "command", Value::from(command))?;
    Ok(())
}

fn write_count_time(
    container: &mut dyn Container,
    entry: &str,
    record: &Record,
) -> Result<(), ContainerError> {
    if let Some(time) = record.value("T") {
        container.write_dataset(
            entry,
            "counting_basis",
            Value::from("SPEC scan with constant counting time"),
        )?;
        container.write_dataset(entry, "T", time.clone())?;
    }
    Ok(())
}

fn write_monitor_count(
    container: &mut dyn Container,
    entry: &str,
    record: &Record,
) -> Result<(), ContainerError> {
    if let Some(monitor) = record.value("M") {
        container.write_dataset(
            entry,
            "counting_basis",
            Value::from("SPEC scan with constant monitor count"),
        )?;
        container.write_dataset(entry, "M", monitor.clone())?;
    }
    Ok(())
}

fn write_temperature_set_point(
    container: &mut dyn Container,
    entry: &str,
    record: &Record,
) -> Result<(), ContainerError> {
    for name in ["TEMP_SP", "DEGC_SP"] {
        if let Some(value) = record.value(name) {
            container.write_dataset(entry, name, value.clone())?;
        }
    }
    Ok(())
}

fn write_user_lines(
    container: &mut dyn Container,
    entry: &str,
    record: &Record,
) -> Result<(), ContainerError> {
    for name in ["U", "R"] {
        if let Some(lines) = record.value(name) {
            container.write_dataset(entry, name, lines.clone())?;
        }
    }
    Ok(())
}

fn write_positioners(
    container: &mut dyn Container,
    entry: &str,
    record: &Record,
) -> Result<(), ContainerError> {
    let Some(positioners) = record.value("positioners").and_then(Value::as_map) else {
        return Ok(());
    };
    let group = join_path(entry, "positioners");
    container.make_group(&group, "NXnote", "SPEC positioners (#P & #O lines)")?;
    container.write_dict(&group, positioners)
}

fn write_data(container: &mut dyn Container, entry: &str, record: &Record) -> Result<(), ContainerError> {
    let Some(data) = record.value("data").and_then(Value::as_map) else {
        return Ok(());
    };
    if data.is_empty() {
        return Ok(());
    }
    let group = join_path(entry, "data");
    container.make_group(&group, "NXdata", "SPEC scan data")?;
    container.write_dict(&group, data)?;
    let Some((signal, signal_values)) = data.last() else {
        return Ok(());
    };
    let gridded = signal_values
        .as_list()
        .and_then(|rows| rows.first())
        .is_some_and(|row| row.as_list().is_some());
    let axes = match mesh_axes(record) {
        Some((first, second)) if gridded => format!("{first}:{second}"),
        _ => data.first().map(|(axis, _)| axis.clone()).unwrap_or_default(),
    };
    container.write_attribute(&group, "axes", Value::from(axes))?;
    container.write_attribute(&group, "signal", Value::from(signal.as_str()))?;
    Ok(())
}
