//! UNICAT metadata: `#H` label rows in the file header paired with `#V` value rows in
//! each scan.
//!
//! Labels on an `#H` row are single words separated by whitespace. Values on a `#V` row
//! are separated by two spaces (or a tab) when they contain spaces. Values that read as
//! numbers become numbers; everything else is kept as text.
use indexmap::IndexMap;

use crate::container::{join_path, Container};
use crate::error::{ContainerError, HandlerError};
use crate::handler::{
    split_column_labels, strip_first_word, Applicability, HandlerDescriptor, HandlerModule,
};
use crate::record::{Record, RecordContext};
use crate::value::Value;

pub const MODULE: HandlerModule = HandlerModule {
    name: "unicat",
    descriptors,
};

fn descriptors() -> Vec<HandlerDescriptor> {
    vec![
        HandlerDescriptor::new("#H\\d+")
            .process(metadata_labels)
            .attributes(&["H"])
            .applies_to(Applicability::Header),
        HandlerDescriptor::new("#V\\d+")
            .process(metadata_values)
            .postprocess(pair_metadata)
            .writer(write_metadata)
            .attributes(&["V", "metadata"])
            .applies_to(Applicability::Scan),
    ]
}

fn metadata_labels(line: &str, record: &mut Record) -> Result<(), HandlerError> {
    let labels = Value::text_list(strip_first_word(line).split_whitespace());
    record.list_entry("H")?.push(labels);
    Ok(())
}

fn metadata_values(line: &str, record: &mut Record) -> Result<(), HandlerError> {
    let values = split_column_labels(strip_first_word(line))
        .into_iter()
        .map(Value::from)
        .collect();
    record.list_entry("V")?.push(Value::List(values));
    Ok(())
}

fn rows(value: Option<&Value>) -> Vec<&Vec<Value>> {
    value
        .and_then(Value::as_list)
        .map(|rows| rows.iter().filter_map(Value::as_list).collect())
        .unwrap_or_default()
}

/// Pair each `#V<n>` value with the label in the same column of the header's `#H<n>`
fn pair_metadata(record: &mut Record, context: &RecordContext<'_>) -> Result<(), HandlerError> {
    let labels = rows(context.header.and_then(|header| header.value("H")));
    if labels.is_empty() {
        return Err(HandlerError::Mismatch(format!(
            "no #H lines in the header of {}",
            record.id()
        )));
    }

    let mut metadata = IndexMap::new();
    for (row, values) in rows(record.value("V")).into_iter().enumerate() {
        let Some(row_labels) = labels.get(row) else {
            return Err(HandlerError::Mismatch(format!(
                "no #H{row} line for #V{row} in {}",
                record.id()
            )));
        };
        for (column, value) in values.iter().enumerate() {
            let Some(label) = row_labels.get(column).and_then(Value::as_text) else {
                return Err(HandlerError::Mismatch(format!(
                    "no label in #H{row} for #V{row} column {column} in {}",
                    record.id()
                )));
            };
            let value = match value.as_text() {
                Some(text) => Value::from_token(text),
                None => value.clone(),
            };
            metadata.insert(label.to_string(), value);
        }
    }
    record.set("metadata", Value::Map(metadata));
    Ok(())
}

fn write_metadata(
    container: &mut dyn Container,
    entry: &str,
    record: &Record,
) -> Result<(), ContainerError> {
    let Some(metadata) = record.value("metadata").and_then(Value::as_map) else {
        return Ok(());
    };
    if metadata.is_empty() {
        return Ok(());
    }
    let group = join_path(entry, "metadata");
    container.make_group(&group, "NXnote", "SPEC metadata (UNICAT-style #H & #V lines)")?;
    container.write_dict(&group, metadata)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::UnmatchedPolicy;
    use crate::container::TreeContainer;
    use crate::error::AssemblyError;
    use crate::geometry_catalog::GeometryCatalog;
    use crate::registry::KeyRegistry;
    use crate::spec_file::SpecDataFile;

    fn read(text: &str) -> Result<SpecDataFile, AssemblyError> {
        let registry = KeyRegistry::with_builtins().unwrap();
        let catalog = GeometryCatalog::new().unwrap();
        SpecDataFile::from_text(text, &registry, &catalog, UnmatchedPolicy::Fatal)
    }

    #[test]
    fn test_metadata_pairs_labels_and_values() {
        let file = read("#F unicat.dat\n#E 1\n\n#S 1 ascan\n#H0 a b c\n#V0 1 2 x\n").unwrap();
        let scan = file.get_scan("1").unwrap();
        let metadata = scan.value("metadata").and_then(Value::as_map).unwrap();

        let mut expected = IndexMap::new();
        expected.insert(String::from("a"), Value::Number(1.0));
        expected.insert(String::from("b"), Value::Number(2.0));
        expected.insert(String::from("c"), Value::from("x"));
        assert_eq!(metadata, &expected);

        // #H belongs to the header even when written inside a scan block
        assert!(file.headers()[0].has("H"));
        assert!(!scan.has("H"));
    }

    #[test]
    fn test_values_without_labels() {
        let result = read("#F unicat.dat\n#S 1 ascan\n#V0 1 2 x\n");
        match result {
            Err(AssemblyError::DeferredProcessing { key, record, .. }) => {
                assert_eq!(key, "#V\\d+");
                assert_eq!(record.number.as_deref(), Some("1"));
            }
            other => panic!("expected a deferred processing error, got {other:?}"),
        }

        let result = read("#F unicat.dat\n#H0 a\n#S 1 ascan\n#V0 1\n#V1 2\n");
        assert!(matches!(result, Err(AssemblyError::DeferredProcessing { .. })));

        let result = read("#F unicat.dat\n#H0 a\n#S 1 ascan\n#V0 1 2\n");
        assert!(matches!(result, Err(AssemblyError::DeferredProcessing { .. })));
    }

    #[test]
    fn test_write_metadata() {
        let file = read("#H0 ring_current  undulator_gap\n#S 7 ascan\n#V0 101.7  12.5\n").unwrap();
        let scan = file.get_scan("7").unwrap();
        let mut container = TreeContainer::new();
        container.make_group("/S7", "NXentry", "").unwrap();
        write_metadata(&mut container, "/S7", scan).unwrap();
        assert_eq!(
            container.dataset("/S7/metadata", "undulator_gap"),
            Some(&Value::Number(12.5))
        );
    }
}
