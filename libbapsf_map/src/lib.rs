//! # bapsf_map
//!
//! bapsf_map maps the metadata of LaPD/BaPSF HDF5 data files, written in Rust. It
//! walks the group hierarchy written by the LaPD data acquisition and describes, for
//! every recognised device, where its data lives and what it looks like: which
//! datasets, which fields, which shapes and which element types. Nothing is read
//! besides structure and attributes; array readers consume the produced
//! [`descriptors::FieldDescriptor`]s to pull the actual samples.
//!
//! ## Installation
//!
//! The only method of install is from source. The hdf5 crate needs an HDF5
//! install; if it is not in a standard location, write the following snippet into
//! `.cargo/config.toml` in the repository:
//!
//! ```toml
//! [env]
//! HDF5_DIR="/path/to/my/hdf5/install/"
//!
//! [build]
//! rustflags="-C link-args=-Wl,-rpath,/path/to/my/hdf5/install/lib"
//! ```
//!
//! To build and install the CLI use `cargo install --path ./bapsf_map_cli`.
//!
//! ## Devices
//!
//! Devices are found below three category roots, by exact group name:
//!
//! - Digitizers (`Raw data + config`): `SIS 3301`, `SIS crate`
//! - Control devices (`Raw data + config`): `6K Compumotor`, `N5700_PS`, `NI_XYZ`,
//! `NI_XZ`, `Waveform`
//! - MSI diagnostics (`MSI`): `Discharge`, `Gas pressure`, `Heater`,
//! `Interferometer array`, `Magnetic field`
//!
//! A device whose layout can not be mapped is left out of its category and
//! reported, the rest of the file is still mapped. Recoverable anomalies end up in
//! the [`diagnostics::Diagnostics`] of the device that found them, and are logged as
//! warnings.
//!
//! ## Configuration
//!
//! The CLI is driven by a YAML file:
//!
//! ```yml
//! hdf_paths:
//! - /data/run_01.hdf5
//! control_path: Raw data + config
//! digitizer_path: Raw data + config
//! msi_path: MSI
//! report_path: /data/report.yml
//! state_patterns:
//! - device: Waveform
//!   config: null
//!   patterns:
//!   - (?P<FREQ>(\bFREQ\s)(?P<VAL>(\d+\.\d*|\.\d+|\d+\b)))
//! ```
//!
//! `state_patterns` rebuild the state values of command list control devices after
//! mapping. Each pattern must define exactly two named groups: `VAL` and the name of
//! the state value.
pub mod config;
pub mod container;
pub mod controls;
pub mod descriptors;
pub mod device_map;
pub mod diagnostics;
pub mod digitizers;
pub mod error;
pub mod file_map;
pub mod hdf5_container;
pub mod memory;
pub mod msi;
pub mod registry;
pub mod report;
