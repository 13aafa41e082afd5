//! Digitizer mappings. Each configuration lists, per adc, the boards wired up
//! and the channels recorded on each board, validated against the datasets
//! actually present in the digitizer group.
pub mod sis3301;
pub mod siscrate;

use fxhash::FxHashSet;
use serde::Serialize;
use std::collections::BTreeMap;

use super::container::Group;
use super::descriptors::{Extent, FieldDescriptor, ValueType};
use super::device_map::{DeviceCategory, DeviceInfo, DeviceMapper, MappedDevice};
use super::diagnostics::Diagnostics;
use super::error::{ArgumentError, MappingError};

pub use sis3301::Sis3301;
pub use siscrate::SisCrate;

static MAPPERS: &[&dyn DeviceMapper<DigitizerMap>] = &[&Sis3301, &SisCrate];

/// Suffix appended to a digitizer dataset name to get its header dataset
pub const HEADER_SUFFIX: &str = " headers";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DigitizerFamily {
    Sis3301,
    SisCrate,
}

impl DigitizerFamily {
    pub fn device_adcs(&self) -> &'static [&'static str] {
        match self {
            DigitizerFamily::Sis3301 => &[sis3301::ADC],
            DigitizerFamily::SisCrate => &[siscrate::ADC_3302, siscrate::ADC_3305],
        }
    }

    /// Adc assumed when a caller does not name one and the configuration has several
    fn default_adc(&self) -> &'static str {
        match self {
            DigitizerFamily::Sis3301 => sis3301::ADC,
            DigitizerFamily::SisCrate => siscrate::ADC_3302,
        }
    }

    /// Name of the dataset holding `channel` of `board`. None if the board has no dataset naming.
    pub fn dataset_name(&self, config: &str, board: u32, channel: u32, adc: &str) -> Option<String> {
        match self {
            DigitizerFamily::Sis3301 => Some(sis3301::dataset_name(config, board, channel)),
            DigitizerFamily::SisCrate => siscrate::dataset_name(config, board, channel, adc),
        }
    }
}

/// Setup of one adc board
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdcSetup {
    pub bit: u32,
    /// Base clock rate in Hz
    pub clock_rate: Option<f64>,
    pub shot_average: Option<u32>,
    pub sample_average: Option<u32>,
    pub nshotnum: Extent,
    pub nt: Extent,
}

impl AdcSetup {
    pub fn new(bit: u32, clock_rate: Option<f64>) -> Self {
        Self {
            bit,
            clock_rate,
            shot_average: None,
            sample_average: None,
            nshotnum: Extent::Unknown,
            nt: Extent::Unknown,
        }
    }
}

/// One board's wiring
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Connection {
    pub board: u32,
    pub channels: Vec<u32>,
    pub setup: AdcSetup,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DigitizerConfig {
    pub config_group_path: String,
    pub active: bool,
    pub adcs: Vec<String>,
    /// Shot number field of the header datasets
    pub shotnum: FieldDescriptor,
    pub connections: BTreeMap<String, Vec<Connection>>,
}

impl DigitizerConfig {
    pub fn new(config_group_path: &str, active: bool, shotnum_field: &str) -> Self {
        Self {
            config_group_path: config_group_path.to_string(),
            active,
            adcs: Vec::new(),
            shotnum: FieldDescriptor::new(vec![], &[shotnum_field], &[], ValueType::U32),
            connections: BTreeMap::new(),
        }
    }

    pub fn shotnum_field(&self) -> &str {
        self.shotnum
            .dataset_fields
            .first()
            .map(|f| f.as_str())
            .unwrap_or_default()
    }
}

/// Setup info for a single board/channel pair
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdcInfo {
    pub adc: String,
    pub board: u32,
    pub channel: u32,
    pub config_name: String,
    pub digitizer: String,
    pub setup: AdcSetup,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DigitizerMap {
    pub info: DeviceInfo,
    pub family: DigitizerFamily,
    pub configs: BTreeMap<String, DigitizerConfig>,
    pub diagnostics: Diagnostics,
}

impl MappedDevice for DigitizerMap {
    fn mappers() -> &'static [&'static dyn DeviceMapper<Self>] {
        MAPPERS
    }

    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }
}

/// A configuration is judged active when its name appears in any dataset name.
/// Names that are substrings of one another (config1, config10) can collide.
pub fn is_config_active(dataset_names: &[String], config_name: &str) -> bool {
    dataset_names.iter().any(|name| name.contains(config_name))
}

impl DigitizerMap {
    /// Apply the device level checks and assemble the map.
    ///
    /// Active configurations lose adcs left without connections; a digitizer
    /// without configurations, without active configurations, or with an active
    /// configuration that has nothing mapped is an error.
    pub fn assemble(
        group: &Group,
        family: DigitizerFamily,
        mut configs: BTreeMap<String, DigitizerConfig>,
        diagnostics: Diagnostics,
    ) -> Result<Self, MappingError> {
        if configs.is_empty() {
            return Err(MappingError::new(
                group.path(),
                "there are no mappable configurations",
            ));
        }
        if !configs.values().any(|c| c.active) {
            return Err(MappingError::new(
                group.path(),
                "there are no active configurations",
            ));
        }
        for (name, config) in configs.iter_mut().filter(|(_, c)| c.active) {
            if config.adcs.is_empty() {
                return Err(MappingError::new(
                    group.path(),
                    format!("active configuration '{name}' has no active adcs"),
                ));
            }
            let connections = &mut config.connections;
            config.adcs.retain(|adc| match connections.get(adc) {
                Some(conns) if !conns.is_empty() => true,
                _ => {
                    connections.remove(adc);
                    false
                }
            });
            if config.adcs.is_empty() {
                return Err(MappingError::new(
                    group.path(),
                    format!("active configuration '{name}' has no mapped connections for any adc"),
                ));
            }
        }
        Ok(Self {
            info: DeviceInfo::new(group, DeviceCategory::Digitizer),
            family,
            configs,
            diagnostics,
        })
    }

    pub fn device_name(&self) -> &str {
        &self.info.group_name
    }

    pub fn device_adcs(&self) -> &'static [&'static str] {
        self.family.device_adcs()
    }

    pub fn active_configs(&self) -> Vec<&str> {
        self.configs
            .iter()
            .filter(|(_, c)| c.active)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Resolve the configuration a caller asked for, assuming the sole active one when omitted
    fn resolve_config<'a>(
        &'a self,
        config_name: Option<&'a str>,
    ) -> Result<(&'a str, &'a DigitizerConfig), ArgumentError> {
        let name = match config_name {
            Some(name) => match self.configs.get(name) {
                None => return Err(ArgumentError::UnknownConfig(name.to_string())),
                Some(config) if !config.active => {
                    return Err(ArgumentError::InactiveConfig(name.to_string()))
                }
                Some(_) => name,
            },
            None => {
                let active = self.active_configs();
                match active.len() {
                    0 => return Err(ArgumentError::NoActiveConfig),
                    1 => {
                        spdlog::warn!("Configuration name not specified, assuming '{}'", active[0]);
                        active[0]
                    }
                    _ => {
                        return Err(ArgumentError::AmbiguousConfig(
                            active.iter().map(|s| s.to_string()).collect(),
                        ))
                    }
                }
            }
        };
        match self.configs.get_key_value(name) {
            Some((key, config)) => Ok((key.as_str(), config)),
            None => Err(ArgumentError::UnknownConfig(name.to_string())),
        }
    }

    fn resolve_adc<'a>(
        &self,
        config_name: &str,
        config: &'a DigitizerConfig,
        adc: Option<&'a str>,
    ) -> Result<&'a str, ArgumentError> {
        let adc = match adc {
            Some(adc) => adc,
            None if config.adcs.len() == 1 => {
                if self.family.device_adcs().len() > 1 {
                    spdlog::warn!("No adc specified, but only one adc used...assuming '{}'", config.adcs[0]);
                }
                config.adcs[0].as_str()
            }
            None => {
                let adc = self.family.default_adc();
                spdlog::warn!("No adc specified...assuming '{adc}'");
                adc
            }
        };
        match config.adcs.iter().find(|a| a.as_str() == adc) {
            Some(found) => Ok(found.as_str()),
            None => Err(ArgumentError::UnknownAdc {
                adc: adc.to_string(),
                config: config_name.to_string(),
            }),
        }
    }

    fn find_connection<'a>(
        config: &'a DigitizerConfig,
        adc: &str,
        board: u32,
        channel: u32,
    ) -> Option<&'a Connection> {
        config
            .connections
            .get(adc)?
            .iter()
            .find(|conn| conn.board == board && conn.channels.contains(&channel))
    }

    /// Construct the dataset name for a board/channel pair together with its setup info
    pub fn construct_dataset_name_with_info(
        &self,
        board: u32,
        channel: u32,
        config_name: Option<&str>,
        adc: Option<&str>,
    ) -> Result<(String, AdcInfo), ArgumentError> {
        let (config_name, config) = self.resolve_config(config_name)?;
        let adc = self.resolve_adc(config_name, config, adc)?;
        let conn = Self::find_connection(config, adc, board, channel)
            .ok_or(ArgumentError::InvalidConnection { board, channel })?;
        let name = self
            .family
            .dataset_name(config_name, board, channel, adc)
            .ok_or(ArgumentError::InvalidConnection { board, channel })?;
        let info = AdcInfo {
            adc: adc.to_string(),
            board,
            channel,
            config_name: config_name.to_string(),
            digitizer: self.device_name().to_string(),
            setup: conn.setup.clone(),
        };
        Ok((name, info))
    }

    pub fn construct_dataset_name(
        &self,
        board: u32,
        channel: u32,
        config_name: Option<&str>,
        adc: Option<&str>,
    ) -> Result<String, ArgumentError> {
        Ok(self
            .construct_dataset_name_with_info(board, channel, config_name, adc)?
            .0)
    }

    pub fn construct_header_dataset_name(
        &self,
        board: u32,
        channel: u32,
        config_name: Option<&str>,
        adc: Option<&str>,
    ) -> Result<String, ArgumentError> {
        let name = self.construct_dataset_name(board, channel, config_name, adc)?;
        Ok(format!("{name}{HEADER_SUFFIX}"))
    }

    /// Setup info for a board/channel pair. Unlike dataset name construction,
    /// inactive configurations are allowed (with a warning).
    pub fn get_adc_info(
        &self,
        board: u32,
        channel: u32,
        adc: Option<&str>,
        config_name: Option<&str>,
    ) -> Result<AdcInfo, ArgumentError> {
        let (config_name, config) = match config_name {
            Some(name) => {
                let (key, config) = self
                    .configs
                    .get_key_value(name)
                    .ok_or_else(|| ArgumentError::UnknownConfig(name.to_string()))?;
                if !config.active {
                    spdlog::warn!("Digitizer configuration '{name}' is not actively used");
                }
                (key.as_str(), config)
            }
            None => {
                let active = self.active_configs();
                if active.len() != 1 {
                    return Err(ArgumentError::AmbiguousConfig(
                        active.iter().map(|s| s.to_string()).collect(),
                    ));
                }
                spdlog::warn!("Configuration name not specified, assuming '{}'", active[0]);
                self.resolve_config(Some(active[0]))?
            }
        };
        let adc = match adc {
            Some(adc) => adc,
            None if config.adcs.len() == 1 => config.adcs[0].as_str(),
            None => return Err(ArgumentError::AmbiguousAdc(config_name.to_string())),
        };
        let conn = Self::find_connection(config, adc, board, channel)
            .ok_or(ArgumentError::InvalidConnection { board, channel })?;
        Ok(AdcInfo {
            adc: adc.to_string(),
            board,
            channel,
            config_name: config_name.to_string(),
            digitizer: self.device_name().to_string(),
            setup: conn.setup.clone(),
        })
    }
}

/// Second pass over the connections of an active configuration.
///
/// Every board/channel pair must have a 2D unstructured dataset and a header
/// dataset with a scalar integer shot number field and the same row count.
/// Offending channels are dropped, and boards left empty are dropped.
/// `shotnum_field` may switch to "Shot number" when `allow_fallback` is set and
/// the first board's headers lack the expected field.
#[allow(clippy::too_many_arguments)]
pub fn review_connections(
    group: &Group,
    family: DigitizerFamily,
    config_name: &str,
    adc: &str,
    connections: Vec<Connection>,
    shotnum_field: &mut String,
    allow_fallback: bool,
    diagnostics: &mut Diagnostics,
) -> Result<Vec<Connection>, MappingError> {
    let path = group.path();
    let mut reviewed = Vec::new();
    for (iconn, mut conn) in connections.into_iter().enumerate() {
        let board = conn.board;
        let mut missing = FxHashSet::default();
        for &ch in conn.channels.iter() {
            let Some(name) = family.dataset_name(config_name, board, ch, adc) else {
                missing.insert(ch);
                continue;
            };
            for dset_name in [name.clone(), format!("{name}{HEADER_SUFFIX}")] {
                if !group.is_dataset(&dset_name) {
                    diagnostics.warn(
                        path,
                        format!("dataset '{dset_name}' not found for board {board} and channel {ch}...removing combo from map"),
                    );
                    missing.insert(ch);
                }
            }
        }
        conn.channels.retain(|ch| !missing.contains(ch));
        if conn.channels.is_empty() {
            diagnostics.warn(
                path,
                format!("board {board} does not define any valid channel numbers...not adding to configs"),
            );
            continue;
        }

        let mut nshotnum = Extent::Unknown;
        let mut nt = Extent::Unknown;
        let mut dropped = FxHashSet::default();
        for &ch in conn.channels.iter() {
            let Some(name) = family.dataset_name(config_name, board, ch, adc) else {
                continue;
            };
            let dset = group.dataset(&name)?;
            if dset.is_structured() {
                diagnostics.warn(path, format!("dataset '{name}' has fields...not adding to configs"));
                dropped.insert(ch);
                continue;
            }
            if dset.ndim() != 2 {
                diagnostics.warn(path, format!("dataset '{name}' is not a 2D array...not adding to configs"));
                dropped.insert(ch);
                continue;
            }

            let prior = nt;
            nt = nt.observe(dset.shape()[1]);
            if matches!(prior, Extent::Consistent(_)) && nt == Extent::Inconsistent {
                diagnostics.warn(
                    path,
                    format!("number of time samples inconsistent across all channels for board {board}...marking nt inconsistent"),
                );
                continue;
            }
            let prior = nshotnum;
            nshotnum = nshotnum.observe(dset.shape()[0]);
            if matches!(prior, Extent::Consistent(_)) && nshotnum == Extent::Inconsistent {
                diagnostics.warn(
                    path,
                    format!("number of shot numbers inconsistent across all channels for board {board}...marking nshotnum inconsistent"),
                );
                continue;
            }

            let header_name = format!("{name}{HEADER_SUFFIX}");
            let header = group.dataset(&header_name)?;
            if !header.has_field(shotnum_field) {
                if allow_fallback && iconn == 0 && header.has_field("Shot number") {
                    *shotnum_field = String::from("Shot number");
                } else {
                    diagnostics.warn(
                        path,
                        format!("dataset '{header_name}' does not have expected shot number field '{shotnum_field}'...not adding to configs"),
                    );
                    dropped.insert(ch);
                    continue;
                }
            }
            if !header
                .field(shotnum_field)
                .is_some_and(|field| field.is_scalar_integer())
            {
                diagnostics.warn(
                    path,
                    format!("dataset '{header_name}' does not have expected shape and dtype for shot numbers...not adding to configs"),
                );
                dropped.insert(ch);
                continue;
            }
            if header.shape().first() != Some(&dset.shape()[0]) {
                diagnostics.warn(
                    path,
                    format!("dataset and header dataset for board {board} and channel {ch} do not have the same number of shot numbers...not adding to configs"),
                );
                dropped.insert(ch);
                continue;
            }
        }
        conn.channels.retain(|ch| !dropped.contains(ch));
        if conn.channels.is_empty() {
            diagnostics.warn(
                path,
                format!("board {board} does not define any valid channel numbers...not adding to configs"),
            );
            continue;
        }
        conn.setup.nshotnum = nshotnum;
        conn.setup.nt = nt;
        reviewed.push(conn);
    }
    Ok(reviewed)
}

/// Panics unless every board/channel listed by an active configuration names
/// both a data and a header dataset in `container`
#[cfg(test)]
pub(crate) fn assert_connections_resolve(map: &DigitizerMap, container: &dyn super::container::Container) {
    use super::container::{join_path, NodeKind};
    for (config_name, config) in map.configs.iter().filter(|(_, c)| c.active) {
        for (adc, conns) in config.connections.iter() {
            for conn in conns.iter() {
                for &ch in conn.channels.iter() {
                    let names = [
                        map.construct_dataset_name(conn.board, ch, Some(config_name), Some(adc)),
                        map.construct_header_dataset_name(conn.board, ch, Some(config_name), Some(adc)),
                    ];
                    for name in names {
                        let name = match name {
                            Ok(n) => n,
                            Err(e) => panic!("{e}"),
                        };
                        let path = join_path(&map.info.group_path, &name);
                        assert_eq!(container.kind(&path), Some(NodeKind::Dataset), "{path}");
                    }
                }
            }
        }
    }
}
