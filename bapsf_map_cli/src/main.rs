use clap::{Arg, Command};
use indicatif::{MultiProgress, ProgressBar};
use indicatif_log_bridge::LogWrapper;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use libbapsf_map::config::Config;
use libbapsf_map::device_map::MappedDevice;
use libbapsf_map::error::ReportError;
use libbapsf_map::file_map::FileMap;
use libbapsf_map::registry::CategoryRegistry;
use libbapsf_map::report::{map_file, Report};

fn make_template_config(path: &Path) -> Result<(), ReportError> {
    let config = Config::default();
    let yaml_str = serde_yaml::to_string(&config)?;
    let mut file = File::create(path)?;
    file.write_all(yaml_str.as_bytes())?;
    Ok(())
}

fn log_category<M: MappedDevice>(label: &str, registry: &CategoryRegistry<M>) {
    log::info!("{label}: {:?}", registry.names());
    for rejected in registry.rejected() {
        log::warn!("{label} not mapped -- {rejected}");
    }
}

fn log_summary(map: &FileMap) {
    log_category("Control devices", &map.controls);
    log_category("Digitizers", &map.digitizers);
    log_category("MSI diagnostics", &map.msi);
    match map.main_digitizer() {
        Some(digi) => log::info!("Main digitizer: {}", digi.device_name()),
        None => log::info!("Main digitizer: None"),
    }
    for unknown in map.unknowns.iter() {
        log::info!("Unknown: {unknown}");
    }
    let n_diagnostics = map.diagnostics.len()
        + map.controls.iter().map(|(_, d)| d.diagnostics().len()).sum::<usize>()
        + map.digitizers.iter().map(|(_, d)| d.diagnostics().len()).sum::<usize>()
        + map.msi.iter().map(|(_, d)| d.diagnostics().len()).sum::<usize>();
    log::info!("Diagnostics: {n_diagnostics}");
}

fn main() {
    // Create a cli
    let matches = Command::new("bapsf_map_cli")
        .arg_required_else_help(true)
        .subcommand(Command::new("new").about("Make a template configuration yaml file"))
        .arg(
            Arg::new("path")
                .short('p')
                .long("path")
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

    LogWrapper::new(pb_manager.clone(), logger)
        .try_init()
        .expect("Could not create logging/progress!");

    // Parse the cli
    let Some(config_path) = matches.get_one::<String>("path").map(PathBuf::from) else {
        log::error!("A configuration path is required (-p/--path)");
        return;
    };

    if let Some(("new", _)) = matches.subcommand() {
        log::info!(
            "Making a template config at {}...",
            config_path.to_string_lossy()
        );
        match make_template_config(&config_path) {
            Ok(()) => log::info!("Done."),
            Err(e) => log::error!("{e}"),
        }
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
    log::info!("Config successfully loaded.");
    log::info!("Files to map: {}", config.hdf_paths.len());
    log::info!("Control path: {}", config.control_path);
    log::info!("Digitizer path: {}", config.digitizer_path);
    log::info!("MSI path: {}", config.msi_path);
    if let Some(report_path) = &config.report_path {
        log::info!("Report Path: {}", report_path.to_string_lossy());
    }

    let pb = pb_manager.add(ProgressBar::new(config.hdf_paths.len() as u64));
    let mut report = Report::new();
    for path in config.hdf_paths.iter() {
        match std::fs::metadata(path) {
            Ok(meta) => log::info!(
                "Mapping {} ({})...",
                path.to_string_lossy(),
                human_bytes::human_bytes(meta.len() as f64)
            ),
            Err(_) => log::info!("Mapping {}...", path.to_string_lossy()),
        }
        match map_file(path, &config) {
            Ok(map) => {
                log_summary(&map);
                report.insert(path, map);
            }
            Err(e) => log::error!("Mapping of {} failed with error: {e}", path.to_string_lossy()),
        }
        pb.inc(1);
    }
    pb.finish();

    if let Some(report_path) = &config.report_path {
        match report.write(report_path) {
            Ok(()) => log::info!(
                "Wrote report of {} files to {}",
                report.len(),
                report_path.to_string_lossy()
            ),
            Err(e) => log::error!("Writing the report failed with error: {e}"),
        }
    }

    log::info!("Done.");
}
