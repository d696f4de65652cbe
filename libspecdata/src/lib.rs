//! # libspecdata
//!
//! libspecdata reads the line-oriented data files written by the SPEC beamline control
//! software and turns them into a tree of records: file headers, each owning the scans
//! recorded below it. Every line starts with a key token (`#S`, `#G0`, `#VA12`, ...)
//! and is handed to the one handler registered for that key. Handlers are grouped in
//! modules and new ones can be registered without touching the reader.
//!
//! On top of the reader sits a diffractometer geometry layer: a bundled catalog of the
//! geometries SPEC supports (`fourc`, `sixc`, `psic`, ...), a matcher that picks the
//! geometry of a scan from its `#G` lines and motor mnemonics, and a resolver that
//! extracts the geometry parameters, orientation reflections and UB matrix.
//!
//! ## Handler modules
//!
//! - `spec_common`: the core SPEC lines (`#F #E #D #C #O #o #J #j #S #T #M #X #U #R #P
//! #N #L` and the scan data rows). `mesh` and `hklmesh` data is reshaped to its grid.
//! - `geometry`: `#G` geometry lines and `#Q`, resolved against the catalog
//! - `mca`: multichannel analyzer lines (`#@MCA #@CHANN #@CTIME #@ROI #@CALIB`) and
//! the `@A` spectra
//! - `unicat`: UNICAT-style `#H` metadata labels and `#V` values
//! - `xpcs`: the APS XPCS `#VA #VD #VE #XPCS #CCD` lines
//!
//! ## Configuration
//!
//! The batch tools (see `specdata_cli`) are driven by a YAML configuration:
//!
//! ```yml
//! spec_paths:
//! - /data/sample1.dat
//! - /data/sample2.dat
//! output_path: /data/export
//! modules:
//! - spec_common
//! - geometry
//! - mca
//! - unicat
//! - xpcs
//! unmatched: log
//! scans: null
//! n_threads: 1
//! ```
//!
//! - `modules`: handler modules to load, in load order. Defaults to all of them.
//! - `unmatched`: what to do with a line no handler accepts: `ignore`, `log` or `fatal`.
//! - `scans`: export only these scan numbers (e.g. `["1", "12.1"]`). `null` exports all.
//! - `n_threads`: the files are divided amongst this many workers. Must be at least 1.
//!
//! A line ending in a backslash continues on the next line (SPEC writes long MCA
//! spectra that way).
//!
//! A scan number seen a second time in a file (SPEC restarted the numbering) is
//! renamed `<n>.1`, then `<n>.2` and so on.
//!
//! ## Output
//!
//! Each SPEC file is exported to `<output_path>/<file name>.yml`:
//!
//! ```text
//! sample1.dat.yml
//! / - creator, spec_file
//! |---- S<number> - NXentry
//! |    |---- title, scan_number, command, start_time, comments, issues, ...
//! |    |---- positioners - NXnote
//! |    |---- data - NXdata, axes, signal
//! |    |    |---- _mca_, _mca_channel_ (MCA spectra)
//! |    |---- MCA - NXnote
//! |    |---- instrument - NXinstrument, name
//! |    |    |---- geometry_parameters - NXnote
//! |    |    |---- monochromator - NXmonochromator
//! |    |---- sample - NXsample, unit_cell_abc, unit_cell_alphabetagamma
//! |    |    |---- or0, or1
//! |    |    |---- beam - NXbeam, incident_wavelength
//! |    |---- metadata - NXnote
//! ```
//!
//! Problems that do not stop a file (a geometry that could not be resolved, data rows
//! that do not match the column labels, ...) are logged and listed in the `issues`
//! dataset of the scan.
pub mod assembler;
pub mod config;
pub mod container;
pub mod diffractometer;
pub mod dispatcher;
pub mod error;
pub mod geometry_catalog;
pub mod handler;
pub mod plugins;
pub mod process;
pub mod record;
pub mod registry;
pub mod spec_file;
pub mod tree_writer;
pub mod value;
pub mod worker_status;
