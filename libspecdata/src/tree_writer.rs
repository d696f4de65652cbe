use std::io::Write;
use std::path::{Path, PathBuf};

use super::container::{Container, TreeContainer};
use super::error::TreeWriterError;
use super::record::Record;
use super::spec_file::SpecDataFile;
use super::value::Value;

const ROOT: &str = "/";
/// This is the version of the output format
const FORMAT_VERSION: &str = "1.0";

/// Writes the export of one SPEC file as a YAML document.
///
/// Every exported scan gets an NXentry group named after its scan number. The writer
/// callbacks registered on the scan's header run first, then the scan's own, each in
/// the order they were registered.
#[derive(Debug)]
pub struct TreeWriter {
    path: PathBuf,
    container: TreeContainer,
    scans_written: usize,
}
// Structure
// / - creator, spec_file
// |---- S<number> - NXentry
// |    |---- title, scan_number, command, start_time, ...
// |    |---- positioners - NXnote
// |    |---- data - NXdata, axes, signal
// |    |---- MCA - NXnote
// |    |---- instrument - NXinstrument
// |    |    |---- geometry_parameters - NXnote
// |    |    |---- monochromator - NXmonochromator
// |    |---- sample - NXsample
// |    |    |---- beam - NXbeam
// |    |---- metadata - NXnote

impl TreeWriter {
    /// Create the writer for an output file at path
    pub fn new(path: &Path) -> Result<Self, TreeWriterError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                return Err(TreeWriterError::BadFilePath(path.to_path_buf()));
            }
        }

        let creator = format!("{}:{}", env!("CARGO_PKG_NAME"), FORMAT_VERSION);
        let mut container = TreeContainer::new();
        container.write_attribute(ROOT, "creator", Value::from(creator))?;

        Ok(Self {
            path: path.to_path_buf(),
            container,
            scans_written: 0,
        })
    }

    /// Write the scans of a file, or only the listed scan numbers. Returns the number
    /// of scans written.
    pub fn write_file(
        &mut self,
        file: &SpecDataFile,
        scans: Option<&[String]>,
    ) -> Result<usize, TreeWriterError> {
        if let Some(path) = file.path() {
            self.container.write_attribute(
                ROOT,
                "spec_file",
                Value::from(path.to_string_lossy().as_ref()),
            )?;
        }

        let before = self.scans_written;
        match scans {
            Some(numbers) => {
                for number in numbers {
                    match file.get_scan(number) {
                        Some(scan) => self.write_scan(file, scan)?,
                        None => log::warn!("Scan {number} is not in the file; skipping it"),
                    }
                }
            }
            None => {
                for scan in file.scans() {
                    self.write_scan(file, scan)?;
                }
            }
        }
        Ok(self.scans_written - before)
    }

    /// Write one scan as an NXentry group
    pub fn write_scan(&mut self, file: &SpecDataFile, scan: &Record) -> Result<(), TreeWriterError> {
        let entry = match scan.number() {
            Some(number) => format!("/S{number}"),
            None => format!("/S_{}", scan.id().ordinal),
        };
        self.container
            .make_group(&entry, "NXentry", &scan.id().to_string())?;

        if let Some(header) = file.header_of(scan) {
            for (_, writer) in header.writers() {
                writer(&mut self.container, &entry, header)?;
            }
        }
        for (_, writer) in scan.writers() {
            writer(&mut self.container, &entry, scan)?;
        }

        if !scan.issues().is_empty() {
            let issues = scan
                .issues()
                .iter()
                .map(|issue| Value::from(format!("{}: {}", issue.key, issue.message)))
                .collect();
            self.container
                .write_dataset(&entry, "issues", Value::List(issues))?;
        }
        self.scans_written += 1;
        Ok(())
    }

    pub fn container(&self) -> &TreeContainer {
        &self.container
    }

    /// Write the document to disk, consuming the writer
    pub fn close(self) -> Result<(), TreeWriterError> {
        let yaml = serde_yaml::to_string(&self.container)?;
        let mut file = std::fs::File::create(&self.path)?;
        file.write_all(yaml.as_bytes())?;
        log::info!(
            "{} scans written to {} ({})",
            self.scans_written,
            self.path.display(),
            human_bytes::human_bytes(yaml.len() as f64)
        );
        Ok(())
    }
}
