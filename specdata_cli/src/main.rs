use clap::{Arg, Command};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use indicatif_log_bridge::LogWrapper;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc};

use libspecdata::config::Config;
use libspecdata::process::{create_subsets, load_engine, process_subset};
use libspecdata::worker_status::{BarColor, WorkerStatus};

fn make_template_config(path: &Path) {
    let config = Config::default();
    let yaml_str = match serde_yaml::to_string(&config) {
        Ok(s) => s,
        Err(e) => {
            log::error!("Could not serialize the template config: {e}");
            return;
        }
    };
    match File::create(path) {
        Ok(mut file) => {
            if let Err(e) = file.write_all(yaml_str.as_bytes()) {
                log::error!("Failed to write yaml data to file: {e}");
            }
        }
        Err(e) => log::error!("Could not create template config file: {e}"),
    }
}

fn bar_style(color: BarColor) -> ProgressStyle {
    let template = match color {
        BarColor::CYAN => "{prefix} [{bar:40.cyan/blue}] {percent}%",
        BarColor::GREEN => "{prefix} [{bar:40.green/blue}] {percent}%",
        BarColor::RED => "{prefix} [{bar:40.red/blue}] {percent}%",
    };
    ProgressStyle::with_template(template).unwrap_or_else(|_| ProgressStyle::default_bar())
}

fn update_bar(bar: &ProgressBar, status: &WorkerStatus) {
    bar.set_style(bar_style(status.color));
    bar.set_position((status.progress * 100.0) as u64);
}

fn main() {
    // Create a cli
    let matches = Command::new("specdata_cli")
        .arg_required_else_help(true)
        .subcommand(Command::new("new").about("Make a template configuration yaml file"))
        .arg(
            Arg::new("path")
                .short('p')
                .long("path")
                .required(true)
                .help("Path to the configuration file"),
        )
        .get_matches();

    // Initialize feedback
    let logger = simplelog::TermLogger::new(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );

    let pb_manager = MultiProgress::new();

    if let Err(e) = LogWrapper::new(pb_manager.clone(), logger).try_init() {
        eprintln!("Could not create logging/progress: {e}");
        return;
    }

    // Parse the cli
    let config_path = match matches.get_one::<String>("path") {
        Some(p) => PathBuf::from(p),
        None => {
            log::error!("A configuration path is required (-p/--path)");
            return;
        }
    };

    if let Some(("new", _)) = matches.subcommand() {
        log::info!(
            "Making a template config at {}...",
            config_path.to_string_lossy()
        );
        make_template_config(&config_path);
        log::info!("Done.");
        return;
    }

    // Load our config
    log::info!("Loading config from {}...", config_path.to_string_lossy());
    let config = match Config::read_config_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            log::error!("{e}");
            return;
        }
    };
    if !config.is_n_threads_valid() {
        log::error!("n_threads must be at least 1, found {}", config.n_threads);
        return;
    }
    log::info!("Config successfully loaded.");
    log::info!("SPEC files: {}", config.spec_paths.len());
    log::info!("Output Path: {}", config.output_path.to_string_lossy());
    log::info!("Handler modules: {}", config.modules.join(", "));
    log::info!("Unmatched lines: {:?}", config.unmatched);
    if let Some(scans) = &config.scans {
        log::info!("Exporting scans: {}", scans.join(", "));
    }

    // Registry and catalog are shared read-only by every worker
    let (registry, catalog) = match load_engine(&config) {
        Ok((r, c)) => (Arc::new(r), Arc::new(c)),
        Err(e) => {
            log::error!("{e}");
            return;
        }
    };

    // Dont make empty workers
    let subsets: Vec<Vec<PathBuf>> = create_subsets(&config)
        .into_iter()
        .filter(|subset| !subset.is_empty())
        .collect();

    let (tx, rx) = mpsc::channel::<WorkerStatus>();
    let mut bars = Vec::new();
    let mut workers = Vec::new();
    for (idx, subset) in subsets.into_iter().enumerate() {
        let bar = pb_manager.add(ProgressBar::new(100));
        bar.set_style(bar_style(BarColor::CYAN));
        bar.set_prefix(format!("Worker {idx}"));
        bars.push(bar);

        let conf = config.clone();
        let tx = tx.clone();
        let registry = Arc::clone(&registry);
        let catalog = Arc::clone(&catalog);
        workers.push(std::thread::spawn(move || {
            process_subset(conf, tx, idx, subset, &registry, &catalog)
        }));
    }
    drop(tx);

    loop {
        std::thread::sleep(std::time::Duration::from_millis(100));
        let mut disconnected = false;
        loop {
            match rx.try_recv() {
                Ok(status) => {
                    if let Some(bar) = bars.get(status.worker_id) {
                        update_bar(bar, &status);
                    }
                }
                Err(mpsc::TryRecvError::Empty) => break,
                Err(mpsc::TryRecvError::Disconnected) => {
                    disconnected = true;
                    break;
                }
            }
        }
        if disconnected || workers.iter().all(|w| w.is_finished()) {
            break;
        }
    }

    for worker in workers {
        match worker.join() {
            Ok(Ok(_)) => log::info!("Worker complete"),
            Ok(Err(e)) => log::error!("Processor error: {e}"),
            Err(_) => log::error!("An error occured joining one of the workers!"),
        }
    }

    for bar in bars {
        bar.finish();
    }

    log::info!("Done.");
}
