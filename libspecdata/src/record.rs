use indexmap::IndexMap;
use std::fmt::Display;

use super::error::{AttributeError, HandlerError};
use super::geometry_catalog::GeometryCatalog;
use super::handler::{PostprocessFn, WriterFn};
use super::registry::KeyRegistry;
use super::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Header,
    Scan,
}

/// Identity of a record within one file, used in every error report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordId {
    pub kind: RecordKind,
    pub ordinal: usize,
    pub number: Option<String>,
}

impl Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.kind, &self.number) {
            (RecordKind::Header, _) => write!(f, "header {}", self.ordinal),
            (RecordKind::Scan, Some(number)) => write!(f, "scan {number}"),
            (RecordKind::Scan, None) => write!(f, "scan #{}", self.ordinal),
        }
    }
}

/// A non-fatal problem found while processing a record
#[derive(Debug, Clone, PartialEq)]
pub struct RecordIssue {
    pub key: String,
    pub message: String,
}

/// Result of reading an attribute through the lazy attribute model
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Attribute<'a> {
    Value(&'a Value),
    /// Some handler declares the name, but it never fired on this record
    NotPopulated,
    /// No registered handler declares the name
    Unknown,
}

/// What a deferred callback may look at besides its own record
#[derive(Debug, Clone, Copy)]
pub struct RecordContext<'a> {
    pub header: Option<&'a Record>,
    pub catalog: &'a GeometryCatalog,
}

/// Record is either a header or a scan of a SPEC file.
///
/// Attributes are populated lazily by the handlers whose lines appear in the record.
/// Deferred callbacks and writers are keyed by the handler key that registered
/// them and keep their first registration order.
#[derive(Clone)]
pub struct Record {
    id: RecordId,
    header: Option<usize>,
    attributes: IndexMap<&'static str, Value>,
    postprocessors: IndexMap<&'static str, PostprocessFn>,
    writers: IndexMap<&'static str, WriterFn>,
    lines: Vec<String>,
    issues: Vec<RecordIssue>,
    /// Attribute names written since the last `take_touched`
    touched: Vec<&'static str>,
}

impl Record {
    pub fn new_header(ordinal: usize) -> Self {
        Self::new(
            RecordId {
                kind: RecordKind::Header,
                ordinal,
                number: None,
            },
            None,
        )
    }

    pub fn new_scan(ordinal: usize, header: usize) -> Self {
        Self::new(
            RecordId {
                kind: RecordKind::Scan,
                ordinal,
                number: None,
            },
            Some(header),
        )
    }

    fn new(id: RecordId, header: Option<usize>) -> Self {
        Self {
            id,
            header,
            attributes: IndexMap::new(),
            postprocessors: IndexMap::new(),
            writers: IndexMap::new(),
            lines: Vec::new(),
            issues: Vec::new(),
            touched: Vec::new(),
        }
    }

    pub fn id(&self) -> &RecordId {
        &self.id
    }

    pub fn kind(&self) -> RecordKind {
        self.id.kind
    }

    pub fn is_scan(&self) -> bool {
        self.id.kind == RecordKind::Scan
    }

    /// Index of the owning header in the file, for scans
    pub fn header_index(&self) -> Option<usize> {
        self.header
    }

    /// The scan number as written on the `#S` line (with a suffix for repeats)
    pub fn number(&self) -> Option<&str> {
        self.id.number.as_deref()
    }

    pub fn set_number(&mut self, number: String) {
        self.id.number = Some(number);
    }

    /// Set (or replace) an attribute
    pub fn set(&mut self, name: &'static str, value: Value) {
        self.touch(name);
        self.attributes.insert(name, value);
    }

    /// Raw access to a populated attribute, bypassing the declared-name check
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    pub fn attribute_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.attributes.keys().copied()
    }

    fn touch(&mut self, name: &'static str) {
        if !self.touched.contains(&name) {
            self.touched.push(name);
        }
    }

    /// Names written (created, replaced or mutably borrowed) since the last call
    pub(crate) fn take_touched(&mut self) -> Vec<&'static str> {
        std::mem::take(&mut self.touched)
    }

    /// Read an attribute through the lazy attribute model
    pub fn attribute(&self, name: &str, registry: &KeyRegistry) -> Attribute<'_> {
        if let Some(value) = self.attributes.get(name) {
            Attribute::Value(value)
        } else if registry.is_declared(name) {
            Attribute::NotPopulated
        } else {
            Attribute::Unknown
        }
    }

    /// Same as `attribute`, as a Result for use with `?`
    pub fn try_attribute(&self, name: &str, registry: &KeyRegistry) -> Result<&Value, AttributeError> {
        match self.attribute(name, registry) {
            Attribute::Value(value) => Ok(value),
            Attribute::NotPopulated => Err(AttributeError::NotPopulated(name.to_string())),
            Attribute::Unknown => Err(AttributeError::Unknown(name.to_string())),
        }
    }

    /// The ordered mapping stored under name, created empty on first use
    pub fn map_entry(
        &mut self,
        name: &'static str,
    ) -> Result<&mut IndexMap<String, Value>, HandlerError> {
        self.touch(name);
        match self
            .attributes
            .entry(name)
            .or_insert_with(|| Value::Map(IndexMap::new()))
        {
            Value::Map(map) => Ok(map),
            _ => Err(HandlerError::WrongValueType(name.to_string(), "map")),
        }
    }

    /// The list stored under name, created empty on first use
    pub fn list_entry(&mut self, name: &'static str) -> Result<&mut Vec<Value>, HandlerError> {
        self.touch(name);
        match self
            .attributes
            .entry(name)
            .or_insert_with(|| Value::List(Vec::new()))
        {
            Value::List(list) => Ok(list),
            _ => Err(HandlerError::WrongValueType(name.to_string(), "list")),
        }
    }

    pub fn add_postprocessor(&mut self, key: &'static str, postprocess: PostprocessFn) {
        self.postprocessors.insert(key, postprocess);
    }

    pub fn postprocessors(&self) -> impl Iterator<Item = (&'static str, PostprocessFn)> + '_ {
        self.postprocessors.iter().map(|(key, f)| (*key, *f))
    }

    pub fn add_writer(&mut self, key: &'static str, writer: WriterFn) {
        self.writers.insert(key, writer);
    }

    /// Writer registrations in the order they were first made
    pub fn writers(&self) -> impl Iterator<Item = (&'static str, WriterFn)> + '_ {
        self.writers.iter().map(|(key, f)| (*key, *f))
    }

    pub fn push_line(&mut self, line: &str) {
        self.lines.push(line.to_string());
    }

    /// The raw lines of this record, in file order
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn add_issue(&mut self, key: &str, message: String) {
        self.issues.push(RecordIssue {
            key: key.to_string(),
            message,
        });
    }

    pub fn issues(&self) -> &[RecordIssue] {
        &self.issues
    }
}

impl std::fmt::Debug for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Record")
            .field("id", &self.id)
            .field("header", &self.header)
            .field("attributes", &self.attributes)
            .field("postprocessors", &self.postprocessors.keys().collect::<Vec<_>>())
            .field("writers", &self.writers.keys().collect::<Vec<_>>())
            .field("issues", &self.issues)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{HandlerDescriptor, HandlerModule};

    fn noop(_line: &str, _record: &mut Record) -> Result<(), HandlerError> {
        Ok(())
    }

    fn my_test_descriptors() -> Vec<HandlerDescriptor> {
        vec![HandlerDescriptor::new("#MyTest").process(noop).attributes(&["MyTest"])]
    }

    #[test]
    fn test_lazy_attributes() {
        let mut registry = KeyRegistry::new();
        registry
            .register(HandlerDescriptor::new("#Z").process(noop).attributes(&["Z"]))
            .unwrap();
        let mut scan = Record::new_scan(1, 0);

        assert_eq!(scan.attribute("Z", &registry), Attribute::NotPopulated);
        assert_eq!(scan.attribute("MyTest", &registry), Attribute::Unknown);
        assert_eq!(
            scan.try_attribute("MyTest", &registry),
            Err(AttributeError::Unknown(String::from("MyTest")))
        );

        scan.set("Z", Value::from(1.0));
        assert_eq!(scan.try_attribute("Z", &registry), Ok(&Value::Number(1.0)));
    }

    #[test]
    fn test_entries_accumulate() {
        let mut header = Record::new_header(1);
        header.map_entry("VA").unwrap().insert("0".into(), "foo".into());
        header.map_entry("VA").unwrap().insert("1".into(), "bar".into());
        let keys: Vec<&String> = header.value("VA").unwrap().as_map().unwrap().keys().collect();
        assert_eq!(keys, vec!["0", "1"]);

        header.list_entry("comments").unwrap().push("first".into());
        assert!(header.map_entry("comments").is_err());
    }

    #[test]
    fn test_touched_names() {
        let mut scan = Record::new_scan(1, 0);
        scan.set("T", Value::from(1.0));
        scan.list_entry("comments").unwrap();
        scan.set("T", Value::from(2.0));
        assert_eq!(scan.take_touched(), vec!["T", "comments"]);
        assert!(scan.take_touched().is_empty());

        // Replacing an existing attribute counts as a write
        scan.set("T", Value::from(3.0));
        assert_eq!(scan.take_touched(), vec!["T"]);
    }

    #[test]
    fn test_loaded_module_declares_attribute() {
        let mut registry = KeyRegistry::with_builtins().unwrap();
        let scan = Record::new_scan(1, 0);
        assert_eq!(scan.attribute("MyTest", &registry), Attribute::Unknown);

        registry
            .load_module(&HandlerModule {
                name: "my_test",
                descriptors: my_test_descriptors,
            })
            .unwrap();
        assert_eq!(scan.attribute("MyTest", &registry), Attribute::NotPopulated);
        assert_eq!(
            scan.try_attribute("MyTest", &registry),
            Err(AttributeError::NotPopulated(String::from("MyTest")))
        );
    }

    #[test]
    fn test_record_id_display() {
        let mut scan = Record::new_scan(3, 0);
        assert_eq!(scan.id().to_string(), "scan #3");
        scan.set_number(String::from("17"));
        assert_eq!(scan.id().to_string(), "scan 17");
        assert_eq!(Record::new_header(2).id().to_string(), "header 2");
    }
}
