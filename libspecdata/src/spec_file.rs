use std::path::{Path, PathBuf};

use super::assembler::{RecordAssembler, UnmatchedPolicy};
use super::error::{AssemblyError, SpecFileError};
use super::geometry_catalog::GeometryCatalog;
use super::record::Record;
use super::registry::KeyRegistry;

/// SpecDataFile is the assembled record tree of one SPEC data file: its headers and,
/// in file order, the scans below them.
#[derive(Debug, Clone)]
pub struct SpecDataFile {
    path: Option<PathBuf>,
    headers: Vec<Record>,
    scans: Vec<Record>,
}

impl SpecDataFile {
    /// Read and assemble a file. Bytes that are not UTF-8 are replaced rather than rejected.
    pub fn read(
        path: &Path,
        registry: &KeyRegistry,
        catalog: &GeometryCatalog,
        policy: UnmatchedPolicy,
    ) -> Result<Self, SpecFileError> {
        if !path.exists() {
            return Err(SpecFileError::BadFilePath(path.to_path_buf()));
        }
        let bytes = std::fs::read(path)?;
        log::info!(
            "Reading SPEC file {} ({})",
            path.display(),
            human_bytes::human_bytes(bytes.len() as f64)
        );
        let text = String::from_utf8_lossy(&bytes);

        let mut file = Self::from_text(&text, registry, catalog, policy).map_err(|source| {
            SpecFileError::Assembly {
                path: path.to_path_buf(),
                source,
            }
        })?;
        file.path = Some(path.to_path_buf());
        log::info!(
            "SPEC file {} has {} scans in {} headers",
            path.display(),
            file.scans.len(),
            file.headers.len()
        );
        Ok(file)
    }

    /// Assemble a file from text already in memory
    pub fn from_text(
        text: &str,
        registry: &KeyRegistry,
        catalog: &GeometryCatalog,
        policy: UnmatchedPolicy,
    ) -> Result<Self, AssemblyError> {
        let mut assembler = RecordAssembler::new(registry, catalog, policy);
        for (index, line) in text.lines().enumerate() {
            assembler.feed(index + 1, line)?;
        }
        let (headers, scans) = assembler.finish()?;
        Ok(Self {
            path: None,
            headers,
            scans,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn headers(&self) -> &[Record] {
        &self.headers
    }

    pub fn scans(&self) -> &[Record] {
        &self.scans
    }

    /// Scan numbers in file order
    pub fn scan_numbers(&self) -> Vec<&str> {
        self.scans.iter().filter_map(Record::number).collect()
    }

    pub fn get_scan(&self, number: &str) -> Option<&Record> {
        self.scans.iter().find(|scan| scan.number() == Some(number))
    }

    pub fn last_scan(&self) -> Option<&Record> {
        self.scans.last()
    }

    /// The header a scan belongs to
    pub fn header_of(&self, scan: &Record) -> Option<&Record> {
        scan.header_index().and_then(|index| self.headers.get(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const TWO_HEADERS: &str = "\
#F first.dat
#D Thu Jul 17 02:38:24 2003

#S 1 ascan th 0 1 2 0.1
#L th  detector
0 10
1 11

#S 2 ascan th 0 1 2 0.1
#L th  detector
0 20

#F first.dat
#D Thu Jul 17 08:00:00 2003

#S 1 ascan th 0 1 2 0.1
#L th  detector
0 30
";

    fn builtins() -> (KeyRegistry, GeometryCatalog) {
        (
            KeyRegistry::with_builtins().unwrap(),
            GeometryCatalog::new().unwrap(),
        )
    }

    #[test]
    fn test_restarted_file() {
        let (registry, catalog) = builtins();
        let file =
            SpecDataFile::from_text(TWO_HEADERS, &registry, &catalog, UnmatchedPolicy::Fatal)
                .unwrap();
        assert_eq!(file.headers().len(), 2);
        assert_eq!(file.scan_numbers(), vec!["1", "2", "1.1"]);

        let restarted = file.get_scan("1.1").unwrap();
        let header = file.header_of(restarted).unwrap();
        assert_eq!(
            header.value("date").and_then(|d| d.as_text()),
            Some("2003-07-17T08:00:00")
        );
        assert_eq!(file.last_scan().and_then(Record::number), Some("1.1"));
        assert!(file.get_scan("3").is_none());
    }

    #[test]
    fn test_read_from_disk() {
        let (registry, catalog) = builtins();
        let mut spec = tempfile::NamedTempFile::new().unwrap();
        spec.write_all(TWO_HEADERS.as_bytes()).unwrap();
        // A stray latin-1 byte must not stop the read
        spec.write_all(b"#C caf\xe9\n").unwrap();

        let file =
            SpecDataFile::read(spec.path(), &registry, &catalog, UnmatchedPolicy::Log).unwrap();
        assert_eq!(file.path(), Some(spec.path()));
        assert_eq!(file.scans().len(), 3);
        assert!(file.last_scan().unwrap().has("comments"));
    }

    #[test]
    fn test_read_errors() {
        let (registry, catalog) = builtins();
        let missing = Path::new("/this/file/does/not/exist.spec");
        assert!(matches!(
            SpecDataFile::read(missing, &registry, &catalog, UnmatchedPolicy::Log),
            Err(SpecFileError::BadFilePath(_))
        ));

        let mut spec = tempfile::NamedTempFile::new().unwrap();
        spec.write_all(b"#S 1 ascan\n#Pete wrote this\n").unwrap();
        assert!(matches!(
            SpecDataFile::read(spec.path(), &registry, &catalog, UnmatchedPolicy::Fatal),
            Err(SpecFileError::Assembly { source: AssemblyError::Unmatched { .. }, .. })
        ));
    }
}
