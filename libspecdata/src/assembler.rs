use fxhash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::dispatcher::{line_token, Dispatch, Dispatcher};
use super::error::AssemblyError;
use super::geometry_catalog::GeometryCatalog;
use super::handler::{Applicability, Boundary, HandlerDescriptor};
use super::record::{Record, RecordContext};
use super::registry::KeyRegistry;

/// What to do with a line no handler claims
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnmatchedPolicy {
    Ignore,
    #[default]
    Log,
    Fatal,
}

/// RecordAssembler builds the Header -> Scan tree of one file from its lines.
///
/// Lines must be fed in file order. A line ending in a backslash is joined with the
/// lines that follow it and dispatched once complete. Each record's deferred callbacks
/// run when the record is closed: a scan when the next scan or header begins, a header
/// when it is superseded, and both at `finish`.
#[derive(Debug)]
pub struct RecordAssembler<'r> {
    registry: &'r KeyRegistry,
    catalog: &'r GeometryCatalog,
    dispatcher: Dispatcher<'r>,
    policy: UnmatchedPolicy,
    headers: Vec<Record>,
    header_open: bool,
    open_scan: Option<Record>,
    scans: Vec<Record>,
    scan_number_counts: FxHashMap<String, usize>,
    /// First line number and text of a line still being continued
    continued: Option<(usize, String)>,
}

impl<'r> RecordAssembler<'r> {
    pub fn new(
        registry: &'r KeyRegistry,
        catalog: &'r GeometryCatalog,
        policy: UnmatchedPolicy,
    ) -> Self {
        Self {
            registry,
            catalog,
            dispatcher: Dispatcher::new(registry),
            policy,
            headers: Vec::new(),
            header_open: false,
            open_scan: None,
            scans: Vec::new(),
            scan_number_counts: FxHashMap::default(),
            continued: None,
        }
    }

    /// Feed one line of the file. Line numbers are only used for error reports.
    pub fn feed(&mut self, line_number: usize, line: &str) -> Result<(), AssemblyError> {
        let line = line.trim();
        if let Some(head) = line.strip_suffix('\\') {
            let head = head.trim_end();
            match self.continued.as_mut() {
                Some((_, text)) => {
                    text.push(' ');
                    text.push_str(head);
                }
                None => self.continued = Some((line_number, head.to_string())),
            }
            return Ok(());
        }
        if let Some((first_line, mut text)) = self.continued.take() {
            if !line.is_empty() {
                text.push(' ');
                text.push_str(line);
            }
            return self.feed_complete(first_line, text.trim());
        }
        self.feed_complete(line_number, line)
    }

    fn feed_complete(&mut self, line_number: usize, line: &str) -> Result<(), AssemblyError> {
        if line.is_empty() {
            return Ok(());
        }

        let descriptor = match self.dispatcher.dispatch(line) {
            Dispatch::Matched(descriptor) => descriptor,
            Dispatch::Unmatched => return self.unmatched(line_number, line),
        };

        match descriptor.boundary {
            Boundary::OpensHeader => {
                self.close_scan()?;
                self.close_header()?;
                self.open_header();
            }
            Boundary::OpensScan => {
                self.close_scan()?;
                self.ensure_header();
                let header_index = self.headers.len() - 1;
                self.open_scan = Some(Record::new_scan(self.scans.len() + 1, header_index));
            }
            Boundary::None => (),
        }
        self.current_record_mut().push_line(line);

        let registry = self.registry;
        let Some(record) = self.target_mut(descriptor.applies_to) else {
            log::warn!(
                "Line {line_number} ({}) only applies to scans but no scan is open; skipping it",
                descriptor.key
            );
            self.current_record_mut().add_issue(
                descriptor.key,
                format!("line {line_number} appeared outside of a scan"),
            );
            return Ok(());
        };
        process_line(registry, descriptor, record, line_number, line)?;

        if descriptor.boundary == Boundary::OpensScan {
            self.number_open_scan();
        }
        Ok(())
    }

    /// Close every open record and hand back (headers, scans)
    pub fn finish(mut self) -> Result<(Vec<Record>, Vec<Record>), AssemblyError> {
        if let Some((first_line, text)) = self.continued.take() {
            self.feed_complete(first_line, text.trim())?;
        }
        self.close_scan()?;
        self.close_header()?;
        Ok((self.headers, self.scans))
    }

    fn unmatched(&mut self, line_number: usize, line: &str) -> Result<(), AssemblyError> {
        let token = line_token(line);
        match self.policy {
            UnmatchedPolicy::Ignore => (),
            UnmatchedPolicy::Log => {
                log::info!("Line {line_number} has unrecognized key '{token}'; ignoring it")
            }
            UnmatchedPolicy::Fatal => {
                return Err(AssemblyError::Unmatched {
                    line_number,
                    token: token.to_string(),
                })
            }
        }
        self.current_record_mut().push_line(line);
        Ok(())
    }

    fn open_header(&mut self) {
        self.headers.push(Record::new_header(self.headers.len() + 1));
        self.header_open = true;
    }

    /// Files are not required to start with a header line
    fn ensure_header(&mut self) {
        if self.headers.is_empty() {
            self.open_header();
        }
    }

    fn current_record_mut(&mut self) -> &mut Record {
        self.ensure_header();
        let last = self.headers.len() - 1;
        match self.open_scan {
            Some(ref mut scan) => scan,
            None => &mut self.headers[last],
        }
    }

    fn target_mut(&mut self, applies_to: Applicability) -> Option<&mut Record> {
        self.ensure_header();
        match applies_to {
            Applicability::Header => self.headers.last_mut(),
            Applicability::Scan => self.open_scan.as_mut(),
            Applicability::Any => match self.open_scan {
                Some(ref mut scan) => Some(scan),
                None => self.headers.last_mut(),
            },
        }
    }

    /// Repeated scan numbers in one file get a `.1`, `.2`, ... suffix
    fn number_open_scan(&mut self) {
        let Some(scan) = self.open_scan.as_mut() else {
            return;
        };
        let Some(number) = scan.number().map(String::from) else {
            return;
        };
        let count = self.scan_number_counts.entry(number.clone()).or_insert(0);
        if *count > 0 {
            let renamed = format!("{number}.{count}");
            log::debug!("Scan number {number} repeats in this file; renamed to {renamed}");
            scan.set_number(renamed);
        }
        *count += 1;
    }

    fn close_scan(&mut self) -> Result<(), AssemblyError> {
        let Some(mut scan) = self.open_scan.take() else {
            return Ok(());
        };
        let context = RecordContext {
            header: scan.header_index().and_then(|index| self.headers.get(index)),
            catalog: self.catalog,
        };
        run_postprocessors(self.registry, &mut scan, &context)?;
        self.scans.push(scan);
        Ok(())
    }

    fn close_header(&mut self) -> Result<(), AssemblyError> {
        if !self.header_open {
            return Ok(());
        }
        self.header_open = false;
        let context = RecordContext {
            header: None,
            catalog: self.catalog,
        };
        match self.headers.last_mut() {
            Some(header) => run_postprocessors(self.registry, header, &context),
            None => Ok(()),
        }
    }
}

/// Run a handler's process operation and register its deferred callback and writer
fn process_line(
    registry: &KeyRegistry,
    descriptor: &HandlerDescriptor,
    record: &mut Record,
    line_number: usize,
    line: &str,
) -> Result<(), AssemblyError> {
    let Some(process) = descriptor.process else {
        // The registry refuses descriptors without a process operation
        return Ok(());
    };
    record.take_touched();
    process(line, record).map_err(|source| AssemblyError::Handler {
        line_number,
        key: descriptor.key.to_string(),
        record: record.id().clone(),
        source,
    })?;
    check_declared(registry, descriptor.key, record)?;

    if let Some(postprocess) = descriptor.postprocess {
        record.add_postprocessor(descriptor.key, postprocess);
    }
    if let Some(writer) = descriptor.writer {
        record.add_writer(descriptor.key, writer);
    }
    Ok(())
}

fn run_postprocessors(
    registry: &KeyRegistry,
    record: &mut Record,
    context: &RecordContext<'_>,
) -> Result<(), AssemblyError> {
    let queue: Vec<_> = record.postprocessors().collect();
    for (key, postprocess) in queue {
        record.take_touched();
        postprocess(record, context).map_err(|source| AssemblyError::DeferredProcessing {
            key: key.to_string(),
            record: record.id().clone(),
            source,
        })?;
        check_declared(registry, key, record)?;
    }
    Ok(())
}

/// Every attribute a handler writes, new or existing, must be one it declares
fn check_declared(
    registry: &KeyRegistry,
    key: &'static str,
    record: &mut Record,
) -> Result<(), AssemblyError> {
    let touched = record.take_touched();
    let Some(descriptor) = registry.lookup_literal(key) else {
        return Ok(());
    };
    match touched.into_iter().find(|name| !descriptor.declares(name)) {
        Some(name) => Err(AssemblyError::UndeclaredAttribute {
            key: key.to_string(),
            attribute: name.to_string(),
            record: record.id().clone(),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HandlerError;
    use crate::handler::strip_first_word;
    use crate::value::Value;

    fn open_header(_line: &str, _record: &mut Record) -> Result<(), HandlerError> {
        Ok(())
    }

    fn open_scan(line: &str, record: &mut Record) -> Result<(), HandlerError> {
        record.set_number(strip_first_word(line).to_string());
        Ok(())
    }

    fn count_line(_line: &str, record: &mut Record) -> Result<(), HandlerError> {
        record.list_entry("count")?.push(Value::Number(1.0));
        Ok(())
    }

    fn count_total(record: &mut Record, _context: &RecordContext<'_>) -> Result<(), HandlerError> {
        let total = record.value("count").and_then(Value::as_list).map_or(0, Vec::len);
        record.set("total", Value::Number(total as f64));
        Ok(())
    }

    fn always_fails(_record: &mut Record, _context: &RecordContext<'_>) -> Result<(), HandlerError> {
        Err(HandlerError::Mismatch(String::from("always")))
    }

    fn sneaky(_line: &str, record: &mut Record) -> Result<(), HandlerError> {
        record.set("undeclared", Value::Number(0.0));
        Ok(())
    }

    fn overwrite_count(_line: &str, record: &mut Record) -> Result<(), HandlerError> {
        record.set("count", Value::Number(-1.0));
        Ok(())
    }

    fn test_registry() -> KeyRegistry {
        let mut registry = KeyRegistry::new();
        registry
            .register(
                HandlerDescriptor::new("#F")
                    .process(open_header)
                    .boundary(Boundary::OpensHeader),
            )
            .unwrap();
        registry
            .register(
                HandlerDescriptor::new("#S")
                    .process(open_scan)
                    .boundary(Boundary::OpensScan)
                    .applies_to(Applicability::Scan),
            )
            .unwrap();
        registry
            .register(
                HandlerDescriptor::new("#K\\d+")
                    .process(count_line)
                    .postprocess(count_total)
                    .attributes(&["count", "total"]),
            )
            .unwrap();
        registry
            .register(
                HandlerDescriptor::new("#HK")
                    .process(count_line)
                    .attributes(&["count"])
                    .applies_to(Applicability::Header),
            )
            .unwrap();
        registry
            .register(
                HandlerDescriptor::new("#Q")
                    .process(open_header)
                    .applies_to(Applicability::Scan),
            )
            .unwrap();
        registry
    }

    fn assemble(
        registry: &KeyRegistry,
        text: &str,
        policy: UnmatchedPolicy,
    ) -> Result<(Vec<Record>, Vec<Record>), AssemblyError> {
        let catalog = GeometryCatalog::new().unwrap();
        let mut assembler = RecordAssembler::new(registry, &catalog, policy);
        for (index, line) in text.lines().enumerate() {
            assembler.feed(index + 1, line)?;
        }
        assembler.finish()
    }

    #[test]
    fn test_tree_shape() {
        let registry = test_registry();
        let text = "#F one\n#K0\n\n#S 1\n#K0\n#K1\n#HK\n#S 2\n#F two\n#S 1\n#K5\n";
        let (headers, scans) = assemble(&registry, text, UnmatchedPolicy::Fatal).unwrap();
        assert_eq!(headers.len(), 2);
        assert_eq!(scans.len(), 3);
        assert_eq!(scans[0].header_index(), Some(0));
        assert_eq!(scans[2].header_index(), Some(1));
        assert_eq!(scans[0].value("total"), Some(&Value::Number(2.0)));
        assert_eq!(scans[1].value("total"), None);
        assert_eq!(scans[2].value("total"), Some(&Value::Number(1.0)));
        // #K0 in the header and #HK while scan 1 was open both land on header 1
        assert_eq!(headers[0].value("count").and_then(Value::as_list).map(Vec::len), Some(2));
        assert_eq!(headers[0].value("total"), Some(&Value::Number(2.0)));
        assert_eq!(scans[0].lines().len(), 4);
    }

    #[test]
    fn test_implicit_header_and_repeated_numbers() {
        let registry = test_registry();
        let (headers, scans) = assemble(&registry, "#S 1\n#S 1\n#S 1\n", UnmatchedPolicy::Log).unwrap();
        assert_eq!(headers.len(), 1);
        let numbers: Vec<&str> = scans.iter().filter_map(Record::number).collect();
        assert_eq!(numbers, vec!["1", "1.1", "1.2"]);
    }

    #[test]
    fn test_unmatched_policy() {
        let registry = test_registry();
        let text = "#F one\n#Pete wrote this\n";
        assert!(assemble(&registry, text, UnmatchedPolicy::Ignore).is_ok());
        let result = assemble(&registry, text, UnmatchedPolicy::Fatal);
        assert!(matches!(
            result,
            Err(AssemblyError::Unmatched { line_number: 2, token }) if token == "#Pete"
        ));
    }

    #[test]
    fn test_scan_line_outside_scan() {
        let registry = test_registry();
        let (headers, scans) = assemble(&registry, "#F one\n#Q 1 2 3\n", UnmatchedPolicy::Fatal).unwrap();
        assert!(scans.is_empty());
        assert_eq!(headers[0].issues().len(), 1);
        assert_eq!(headers[0].issues()[0].key, "#Q");
    }

    #[test]
    fn test_deferred_failure_names_record() {
        let mut registry = test_registry();
        registry
            .register(
                HandlerDescriptor::new("#BAD")
                    .process(open_header)
                    .postprocess(always_fails),
            )
            .unwrap();
        let result = assemble(&registry, "#S 7\n#BAD\n#S 8\n", UnmatchedPolicy::Fatal);
        match result {
            Err(AssemblyError::DeferredProcessing { key, record, .. }) => {
                assert_eq!(key, "#BAD");
                assert_eq!(record.number.as_deref(), Some("7"));
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_undeclared_attribute() {
        let mut registry = test_registry();
        registry
            .register(HandlerDescriptor::new("#SNEAK").process(sneaky))
            .unwrap();
        let result = assemble(&registry, "#S 1\n#SNEAK\n", UnmatchedPolicy::Fatal);
        assert!(matches!(
            result,
            Err(AssemblyError::UndeclaredAttribute { attribute, .. }) if attribute == "undeclared"
        ));
    }

    #[test]
    fn test_overwriting_another_handlers_attribute() {
        let mut registry = test_registry();
        registry
            .register(HandlerDescriptor::new("#OVR").process(overwrite_count))
            .unwrap();
        let result = assemble(&registry, "#S 1\n#K0\n#OVR\n", UnmatchedPolicy::Fatal);
        match result {
            Err(AssemblyError::UndeclaredAttribute { key, attribute, record }) => {
                assert_eq!(key, "#OVR");
                assert_eq!(attribute, "count");
                assert_eq!(record.number.as_deref(), Some("1"));
            }
            other => panic!("unexpected result {other:?}"),
        }

        // The handler that declares it may keep adding to it
        let (_, scans) = assemble(&registry, "#S 1\n#K0\n#K1\n", UnmatchedPolicy::Fatal).unwrap();
        assert_eq!(scans[0].value("total"), Some(&Value::Number(2.0)));
    }

    #[test]
    fn test_continued_lines() {
        let registry = test_registry();
        let text = "#S 1\n#K0 1 2\\\n 3 4\\\n 5\n#K1\\\n";
        let catalog = GeometryCatalog::new().unwrap();
        let mut assembler = RecordAssembler::new(&registry, &catalog, UnmatchedPolicy::Fatal);
        for (index, line) in text.lines().enumerate() {
            assembler.feed(index + 1, line).unwrap();
        }
        let (_, scans) = assembler.finish().unwrap();
        assert_eq!(scans[0].lines(), ["#S 1", "#K0 1 2 3 4 5", "#K1"]);
        assert_eq!(scans[0].value("total"), Some(&Value::Number(2.0)));

        // The continued line is reported at the line it started on
        let result = assemble(&registry, "#F one\n#Pete\\\nwrote this\n", UnmatchedPolicy::Fatal);
        assert!(matches!(
            result,
            Err(AssemblyError::Unmatched { line_number: 2, token }) if token == "#Pete"
        ));
    }
}
