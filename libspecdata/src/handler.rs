use super::container::Container;
use super::error::{ContainerError, HandlerError};
use super::record::{Record, RecordContext};

/// Immediate processing of one line against the record it applies to
pub type ProcessFn = fn(&str, &mut Record) -> Result<(), HandlerError>;
/// Deferred processing, run once the record has been completely read
pub type PostprocessFn = fn(&mut Record, &RecordContext<'_>) -> Result<(), HandlerError>;
/// Export of a record into a writer's container, below the group at the given path
pub type WriterFn = fn(&mut dyn Container, &str, &Record) -> Result<(), ContainerError>;
/// Custom key matching, replacing the anchored pattern match
pub type MatchFn = fn(&str) -> bool;

/// Which record a handler's lines are applied to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Applicability {
    /// Always the current header, even while a scan is open
    Header,
    /// Only the open scan
    Scan,
    /// The open scan if there is one, otherwise the current header
    #[default]
    Any,
}

/// Whether a handler's line starts a new record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Boundary {
    #[default]
    None,
    OpensHeader,
    OpensScan,
}

/// HandlerDescriptor is the unit of extension: everything the engine needs to know
/// about one control-line key.
///
/// `key` is either a literal token (`#S`) or a regular expression (`#G\d+`) matched
/// against the first word of a line. The operation slots are plain function
/// pointers; a descriptor without `process` is rejected at registration.
#[derive(Clone, Copy)]
pub struct HandlerDescriptor {
    pub key: &'static str,
    pub process: Option<ProcessFn>,
    pub postprocess: Option<PostprocessFn>,
    pub writer: Option<WriterFn>,
    pub match_key: Option<MatchFn>,
    pub attributes: &'static [&'static str],
    pub applies_to: Applicability,
    pub boundary: Boundary,
}

impl HandlerDescriptor {
    pub fn new(key: &'static str) -> Self {
        Self {
            key,
            process: None,
            postprocess: None,
            writer: None,
            match_key: None,
            attributes: &[],
            applies_to: Applicability::Any,
            boundary: Boundary::None,
        }
    }

    pub fn process(mut self, process: ProcessFn) -> Self {
        self.process = Some(process);
        self
    }

    pub fn postprocess(mut self, postprocess: PostprocessFn) -> Self {
        self.postprocess = Some(postprocess);
        self
    }

    pub fn writer(mut self, writer: WriterFn) -> Self {
        self.writer = Some(writer);
        self
    }

    pub fn match_key(mut self, match_key: MatchFn) -> Self {
        self.match_key = Some(match_key);
        self
    }

    pub fn attributes(mut self, attributes: &'static [&'static str]) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn applies_to(mut self, applies_to: Applicability) -> Self {
        self.applies_to = applies_to;
        self
    }

    pub fn boundary(mut self, boundary: Boundary) -> Self {
        self.boundary = boundary;
        self
    }

    /// Does this handler declare the attribute name
    pub fn declares(&self, name: &str) -> bool {
        self.attributes.contains(&name)
    }
}

impl std::fmt::Debug for HandlerDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerDescriptor")
            .field("key", &self.key)
            .field("process", &self.process.is_some())
            .field("postprocess", &self.postprocess.is_some())
            .field("writer", &self.writer.is_some())
            .field("match_key", &self.match_key.is_some())
            .field("attributes", &self.attributes)
            .field("applies_to", &self.applies_to)
            .field("boundary", &self.boundary)
            .finish()
    }
}

/// A named set of handlers loaded together, in order
#[derive(Debug, Clone, Copy)]
pub struct HandlerModule {
    pub name: &'static str,
    pub descriptors: fn() -> Vec<HandlerDescriptor>,
}

/// Everything after the key word of a line, trimmed
pub fn strip_first_word(line: &str) -> &str {
    match line.trim().split_once(char::is_whitespace) {
        Some((_, rest)) => rest.trim(),
        None => "",
    }
}

/// The part of the key word after a fixed prefix, e.g. `"3"` for `#VA3` and `"#VA"`
pub fn key_suffix<'a>(line: &'a str, prefix: &str) -> &'a str {
    let word = line.split_whitespace().next().unwrap_or("");
    word.strip_prefix(prefix).unwrap_or(word)
}

/// Split SPEC column labels. Labels are separated by two spaces (or a tab) so that
/// a label may contain single spaces; lines without such a delimiter split on any whitespace.
pub fn split_column_labels(text: &str) -> Vec<String> {
    if text.contains("  ") || text.contains('\t') {
        text.replace('\t', "  ")
            .split("  ")
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    } else {
        text.split_whitespace().map(String::from).collect()
    }
}
