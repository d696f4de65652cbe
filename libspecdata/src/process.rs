use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;

use super::config::Config;
use super::error::ProcessorError;
use super::geometry_catalog::GeometryCatalog;
use super::registry::KeyRegistry;
use super::spec_file::SpecDataFile;
use super::tree_writer::TreeWriter;
use super::worker_status::{BarColor, WorkerStatus};

/// Build the handler registry and geometry catalog a Config asks for. Both are read-only
/// afterwards and can be shared by every worker.
pub fn load_engine(config: &Config) -> Result<(KeyRegistry, GeometryCatalog), ProcessorError> {
    let registry = KeyRegistry::with_modules(&config.modules)?;
    log::info!(
        "Loaded {} handlers from modules {:?}",
        registry.len(),
        config.modules
    );
    let catalog = GeometryCatalog::new()?;
    log::info!("Loaded {} diffractometer geometries", catalog.len());
    Ok((registry, catalog))
}

/// Read one SPEC file and write its export. Returns the number of scans written.
pub fn process_file(
    config: &Config,
    spec_path: &Path,
    registry: &KeyRegistry,
    catalog: &GeometryCatalog,
) -> Result<usize, ProcessorError> {
    let file = SpecDataFile::read(spec_path, registry, catalog, config.unmatched)?;
    let output_path = config.get_output_file_name(spec_path)?;
    let mut writer = TreeWriter::new(&output_path)?;
    let n_scans = writer.write_file(&file, config.scans.as_deref())?;
    writer.close()?;
    Ok(n_scans)
}

/// The function to be called by a separate thread (typically the UI).
/// Processes every file in the config on one worker.
pub fn process(
    config: Config,
    tx: Sender<WorkerStatus>,
    worker_id: usize,
) -> Result<(), ProcessorError> {
    let (registry, catalog) = load_engine(&config)?;
    let paths = config.spec_paths.clone();
    process_subset(config, tx, worker_id, paths, &registry, &catalog)
}

/// Process a subset of files
///
/// A file that fails is logged and reported with a red status; the rest of the subset
/// still runs. Only a closed status channel stops the worker.
pub fn process_subset(
    config: Config,
    tx: Sender<WorkerStatus>,
    worker_id: usize,
    subset: Vec<PathBuf>,
    registry: &KeyRegistry,
    catalog: &GeometryCatalog,
) -> Result<(), ProcessorError> {
    let n_files = subset.len();
    let mut color = BarColor::CYAN;
    tx.send(WorkerStatus::new(0.0, 0, worker_id, color))?;
    for (idx, path) in subset.iter().enumerate() {
        if config.does_spec_file_exist(path) {
            log::info!("Processing file {}...", path.display());
            match process_file(&config, path, registry, catalog) {
                Ok(n_scans) => log::info!(
                    "Finished processing file {}: {n_scans} scans exported.",
                    path.display()
                ),
                Err(e) => {
                    log::error!("Failed to process file {}: {e}", path.display());
                    color = BarColor::RED;
                }
            }
        } else {
            log::info!("File {} does not exist, skipping...", path.display());
        }
        tx.send(WorkerStatus::new(
            (idx + 1) as f32 / n_files as f32,
            idx + 1,
            worker_id,
            color,
        ))?;
    }
    if color != BarColor::RED {
        tx.send(WorkerStatus::new(1.0, n_files, worker_id, BarColor::GREEN))?;
    }
    Ok(())
}

/// Divide the file list in to a set of subsets (per thread/worker)
pub fn create_subsets(config: &Config) -> Vec<Vec<PathBuf>> {
    let mut subsets: Vec<Vec<PathBuf>> = vec![Vec::new(); config.n_threads.max(1) as usize];
    let n_subsets = subsets.len();

    for (idx, path) in config.spec_paths.iter().enumerate() {
        subsets[idx % n_subsets].push(path.clone())
    }

    subsets
}
