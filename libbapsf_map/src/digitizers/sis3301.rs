use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

use super::{
    is_config_active, review_connections, AdcSetup, Connection, DigitizerConfig,
    DigitizerFamily, DigitizerMap,
};
use crate::container::{AttrValue, Group};
use crate::device_map::DeviceMapper;
use crate::diagnostics::Diagnostics;
use crate::error::MappingError;

pub const ADC: &str = "SIS 3301";

const BIT: u32 = 14;
const CLOCK_RATE_HZ: f64 = 100.0e6;

static CONFIG_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\bConfiguration:\s)(?P<NAME>.+\b)$").expect("Invalid regex")
});
static BOARD_GROUP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Boards\[\d+\]$").expect("Invalid regex"));
static CHANNEL_GROUP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Channels\[\d+\]$").expect("Invalid regex"));
static SAMPLE_AVERAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\bAverage\s)(?P<NAME>.+)(\sSamples\b)$").expect("Invalid regex")
});

/// Configuration name from a `Configuration: <name>` group name
pub fn parse_config_name(group_name: &str) -> Option<String> {
    CONFIG_NAME
        .captures(group_name)
        .map(|caps| caps["NAME"].to_string())
}

pub fn dataset_name(config: &str, board: u32, channel: u32) -> String {
    format!("{config} [{board}:{channel}]")
}

/// Maps the SIS 3301 digitizer group
#[derive(Debug, Clone, Copy)]
pub struct Sis3301;

impl DeviceMapper<DigitizerMap> for Sis3301 {
    fn device_name(&self) -> &'static str {
        ADC
    }

    fn build(&self, group: &Group) -> Result<DigitizerMap, MappingError> {
        let mut diagnostics = Diagnostics::new();
        let dataset_names = group.dataset_names()?;
        let mut configs = BTreeMap::new();

        for member in group.subgroup_names()? {
            let Some(config_name) = parse_config_name(&member) else {
                spdlog::debug!("Skipping '{member}' in {}, not a configuration group", group.path());
                continue;
            };
            let config_group = group.group(&member)?;
            let active = is_config_active(&dataset_names, &config_name);
            let mut config = DigitizerConfig::new(config_group.path(), active, "Shot");
            config.adcs.push(ADC.to_string());

            let mut conns = find_connections(group, &config_group, active, &mut diagnostics)?;
            let setup = read_setup(&config_group, &mut diagnostics)?;
            for conn in conns.iter_mut() {
                conn.setup = setup.clone();
            }

            if active {
                let mut shotnum_field = config.shotnum_field().to_string();
                conns = review_connections(
                    group,
                    DigitizerFamily::Sis3301,
                    &config_name,
                    ADC,
                    conns,
                    &mut shotnum_field,
                    true,
                    &mut diagnostics,
                )?;
                config.shotnum.dataset_fields = vec![shotnum_field];
            }
            config.connections.insert(ADC.to_string(), conns);
            configs.insert(config_name, config);
        }

        DigitizerMap::assemble(group, DigitizerFamily::Sis3301, configs, diagnostics)
    }
}

/// Non-negative integer number stored in attribute `key`. Missing is fatal,
/// anything else unusable is a warning.
fn read_number(
    device: &Group,
    node: &Group,
    key: &str,
    diagnostics: &mut Diagnostics,
) -> Result<Option<u32>, MappingError> {
    let value = node.attr(key)?.ok_or_else(|| {
        MappingError::new(
            device.path(),
            format!("{} number attribute '{key}' missing", key.to_lowercase()),
        )
    })?;
    match value.as_int() {
        None => {
            diagnostics.warn(node.path(), format!("{key} number is not an integer"));
            Ok(None)
        }
        Some(n) => match u32::try_from(n) {
            Ok(n) => Ok(Some(n)),
            Err(_) if n < 0 => {
                diagnostics.warn(node.path(), format!("{key} number is less than 0"));
                Ok(None)
            }
            Err(_) => {
                diagnostics.warn(node.path(), format!("{key} number is above {}", u32::MAX));
                Ok(None)
            }
        },
    }
}

fn find_connections(
    device: &Group,
    config_group: &Group,
    active: bool,
    diagnostics: &mut Diagnostics,
) -> Result<Vec<Connection>, MappingError> {
    let mut conns: Vec<Connection> = Vec::new();
    for board_key in config_group.member_names()? {
        if !BOARD_GROUP.is_match(&board_key) || !config_group.is_group(&board_key) {
            diagnostics.warn(
                config_group.path(),
                format!("'{board_key}' does not match expected board group name...not adding to mapping"),
            );
            continue;
        }
        let board_group = config_group.group(&board_key)?;
        let Some(board) = read_number(device, &board_group, "Board", diagnostics)? else {
            continue;
        };
        if conns.iter().any(|c| c.board == board) {
            let why = format!(
                "'{}' defines duplicate board numbers",
                config_group.path()
            );
            if active {
                return Err(MappingError::new(device.path(), why));
            }
            diagnostics.warn(config_group.path(), why);
            continue;
        }

        let mut channels = Vec::new();
        for ch_key in board_group.member_names()? {
            if !CHANNEL_GROUP.is_match(&ch_key) || !board_group.is_group(&ch_key) {
                diagnostics.warn(
                    board_group.path(),
                    format!("'{ch_key}' does not match expected channel group name...not adding to mapping"),
                );
                continue;
            }
            let ch_group = board_group.group(&ch_key)?;
            if let Some(ch) = read_number(device, &ch_group, "Channel", diagnostics)? {
                channels.push(ch);
            }
        }

        let mut unique = channels.clone();
        unique.sort_unstable();
        unique.dedup();
        if unique.len() != channels.len() {
            diagnostics.warn(
                board_group.path(),
                "does not define a unique set of channel numbers...not adding to configs",
            );
            continue;
        }
        if channels.is_empty() {
            diagnostics.warn(
                board_group.path(),
                "does not define any valid channel numbers...not adding to configs",
            );
            continue;
        }
        conns.push(Connection {
            board,
            channels,
            setup: AdcSetup::new(BIT, Some(CLOCK_RATE_HZ)),
        });
    }
    Ok(conns)
}

/// Averaging counts of 0 or 1 mean no averaging
fn averaging(n: i64) -> Option<u32> {
    match n {
        0 | 1 => None,
        n => u32::try_from(n).ok(),
    }
}

fn read_setup(config_group: &Group, diagnostics: &mut Diagnostics) -> Result<AdcSetup, MappingError> {
    let attrs = config_group.attrs()?;
    let mut setup = AdcSetup::new(BIT, Some(CLOCK_RATE_HZ));
    setup.shot_average = attrs
        .get("Shots to average")
        .and_then(AttrValue::as_int)
        .and_then(averaging);

    let text = match (attrs.get("Samples to average"), attrs.get("Unnamed")) {
        (Some(value), _) => value.as_str(),
        (None, Some(value)) => value.as_str(),
        (None, None) => None,
    };
    if let Some(text) = text.filter(|t| *t != "No averaging") {
        if let Some(caps) = SAMPLE_AVERAGE.captures(text) {
            match caps["NAME"].parse::<i64>() {
                Ok(n) => setup.sample_average = averaging(n),
                Err(_) => diagnostics.warn(
                    config_group.path(),
                    format!(
                        "found sample averaging of '{}' but can not convert to int...using a value of None instead",
                        &caps["NAME"]
                    ),
                ),
            }
        }
    }
    Ok(setup)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{DType, Field};
    use crate::descriptors::Extent;
    use crate::digitizers::assert_connections_resolve;
    use crate::error::ArgumentError;
    use crate::memory::MemoryContainer;

    const DEVICE: &str = "/Raw data + config/SIS 3301";

    fn header_dtype(field: &str) -> DType {
        DType::Compound(vec![
            Field::scalar(field, DType::UInt(4)),
            Field::scalar("Scale", DType::Float(8)),
            Field::scalar("Offset", DType::Float(8)),
        ])
    }

    fn add_config(mc: &mut MemoryContainer, config: &str, boards: &[(u32, &[u32])], datasets: bool) {
        let config_path = format!("{DEVICE}/Configuration: {config}");
        mc.add_group(&config_path);
        mc.set_attr(&config_path, "Shots to average", 1i64);
        mc.set_attr(&config_path, "Samples to average", "Average 8 Samples");
        for (ibrd, (board, channels)) in boards.iter().enumerate() {
            let board_path = format!("{config_path}/Boards[{ibrd}]");
            mc.set_attr(&board_path, "Board", *board as i64);
            for (ich, ch) in channels.iter().enumerate() {
                mc.set_attr(&format!("{board_path}/Channels[{ich}]"), "Channel", *ch as i64);
                if datasets {
                    let name = dataset_name(config, *board, *ch);
                    mc.add_dataset(&format!("{DEVICE}/{name}"), &[10, 100], DType::Int(2));
                    mc.add_dataset(&format!("{DEVICE}/{name} headers"), &[10], header_dtype("Shot"));
                }
            }
        }
    }

    fn scenario() -> MemoryContainer {
        let mut mc = MemoryContainer::new();
        add_config(
            &mut mc,
            "config01",
            &[(0, &[0, 3, 5]), (3, &[0, 1, 2, 3]), (5, &[5, 6, 7])],
            true,
        );
        mc
    }

    fn build(mc: &MemoryContainer) -> Result<DigitizerMap, MappingError> {
        let group = match Group::open(mc, DEVICE) {
            Ok(g) => g,
            Err(_) => panic!(),
        };
        Sis3301.build(&group)
    }

    #[test]
    fn test_config_name() {
        assert_eq!(parse_config_name("Configuration: config01"), Some(String::from("config01")));
        assert_eq!(parse_config_name("config01"), None);
    }

    #[test]
    fn test_scenario() {
        let mc = scenario();
        let map = match build(&mc) {
            Ok(m) => m,
            Err(e) => panic!("{e}"),
        };
        assert_eq!(map.active_configs(), vec!["config01"]);
        let config = &map.configs["config01"];
        assert_eq!(config.adcs, vec![String::from(ADC)]);
        assert_eq!(config.shotnum_field(), "Shot");
        let conns = &config.connections[ADC];
        assert_eq!(conns.len(), 3);
        assert_eq!(conns[0].board, 0);
        assert_eq!(conns[0].channels, vec![0, 3, 5]);
        assert_eq!(conns[1].channels, vec![0, 1, 2, 3]);
        assert_eq!(conns[2].channels, vec![5, 6, 7]);
        assert_eq!(conns[0].setup.bit, 14);
        assert_eq!(conns[0].setup.clock_rate, Some(100.0e6));
        assert_eq!(conns[0].setup.shot_average, None);
        assert_eq!(conns[0].setup.sample_average, Some(8));
        assert_eq!(conns[0].setup.nshotnum, Extent::Consistent(10));
        assert_eq!(conns[0].setup.nt, Extent::Consistent(100));

        assert_connections_resolve(&map, &mc);
        assert_eq!(
            map.construct_dataset_name(0, 3, None, None),
            Ok(String::from("config01 [0:3]"))
        );
        assert_eq!(
            map.construct_header_dataset_name(0, 3, Some("config01"), Some(ADC)),
            Ok(String::from("config01 [0:3] headers"))
        );
        assert_eq!(
            map.construct_dataset_name(0, 4, None, None),
            Err(ArgumentError::InvalidConnection { board: 0, channel: 4 })
        );
        assert!(matches!(
            map.construct_dataset_name(0, 3, Some("config02"), None),
            Err(ArgumentError::UnknownConfig(_))
        ));
        assert!(matches!(
            map.construct_dataset_name(0, 3, None, Some("SIS 3302")),
            Err(ArgumentError::UnknownAdc { .. })
        ));
    }

    #[test]
    fn test_missing_channel_dataset() {
        let mut mc = scenario();
        mc.remove(&format!("{DEVICE}/config01 [5:6]"));
        let map = match build(&mc) {
            Ok(m) => m,
            Err(e) => panic!("{e}"),
        };
        let conns = &map.configs["config01"].connections[ADC];
        assert_eq!(conns[2].channels, vec![5, 7]);
        assert!(map.diagnostics.mentions("config01 [5:6]"));
        assert!(map.construct_dataset_name(5, 6, None, None).is_err());
        assert_connections_resolve(&map, &mc);
    }

    #[test]
    fn test_board_without_datasets_is_dropped() {
        let mut mc = MemoryContainer::new();
        add_config(&mut mc, "config01", &[(0, &[0, 3]), (2, &[4])], true);
        mc.remove(&format!("{DEVICE}/config01 [2:4]"));
        let map = match build(&mc) {
            Ok(m) => m,
            Err(e) => panic!("{e}"),
        };
        let conns = &map.configs["config01"].connections[ADC];
        assert_eq!(conns.len(), 1);
        assert!(conns.iter().all(|conn| conn.board != 2));
        let naming = map
            .diagnostics
            .iter()
            .filter(|d| d.message.contains("'config01 [2:4]'"))
            .count();
        assert_eq!(naming, 1);
        assert!(map.diagnostics.mentions("board 2 does not define any valid channel"));
        assert_connections_resolve(&map, &mc);
    }

    #[test]
    fn test_board_number_above_range() {
        let mut mc = scenario();
        mc.set_attr(
            &format!("{DEVICE}/Configuration: config01/Boards[2]"),
            "Board",
            i64::from(u32::MAX) + 1,
        );
        let map = match build(&mc) {
            Ok(m) => m,
            Err(e) => panic!("{e}"),
        };
        assert!(map.diagnostics.mentions("Board number is above"));
        assert!(!map.diagnostics.mentions("less than 0"));
        assert_eq!(map.configs["config01"].connections[ADC].len(), 2);
    }

    #[test]
    fn test_mapping_is_idempotent() {
        let mc = scenario();
        let first = match build(&mc) {
            Ok(m) => m,
            Err(_) => panic!(),
        };
        let second = match build(&mc) {
            Ok(m) => m,
            Err(_) => panic!(),
        };
        assert_eq!(first, second);
    }

    #[test]
    fn test_shot_number_fallback() {
        let mut mc = scenario();
        for (board, ch) in [(0, 0), (0, 3), (0, 5)] {
            let name = dataset_name("config01", board, ch);
            mc.add_dataset(&format!("{DEVICE}/{name} headers"), &[10], header_dtype("Shot number"));
        }
        let map = match build(&mc) {
            Ok(m) => m,
            Err(e) => panic!("{e}"),
        };
        let config = &map.configs["config01"];
        assert_eq!(config.shotnum_field(), "Shot number");
        // later boards still carry "Shot" and are dropped
        assert_eq!(config.connections[ADC].len(), 1);
    }

    #[test]
    fn test_inconsistent_nt() {
        let mut mc = scenario();
        mc.add_dataset(&format!("{DEVICE}/config01 [3:2]"), &[10, 50], DType::Int(2));
        let map = match build(&mc) {
            Ok(m) => m,
            Err(e) => panic!("{e}"),
        };
        let conn = &map.configs["config01"].connections[ADC][1];
        assert_eq!(conn.channels, vec![0, 1, 2, 3]);
        assert_eq!(conn.setup.nt, Extent::Inconsistent);
        assert_eq!(conn.setup.nshotnum, Extent::Consistent(10));
    }

    #[test]
    fn test_inactive_config() {
        let mut mc = scenario();
        add_config(&mut mc, "config02", &[(1, &[0])], false);
        let map = match build(&mc) {
            Ok(m) => m,
            Err(e) => panic!("{e}"),
        };
        let config = &map.configs["config02"];
        assert!(!config.active);
        assert_eq!(config.connections[ADC][0].setup.nt, Extent::Unknown);
        assert!(matches!(
            map.construct_dataset_name(1, 0, Some("config02"), None),
            Err(ArgumentError::InactiveConfig(_))
        ));
        let info = match map.get_adc_info(1, 0, None, Some("config02")) {
            Ok(i) => i,
            Err(e) => panic!("{e}"),
        };
        assert_eq!(info.board, 1);
        assert_eq!(info.digitizer, "SIS 3301");
    }

    #[test]
    fn test_failure_modes() {
        let mut mc = MemoryContainer::new();
        mc.add_group(DEVICE);
        assert!(build(&mc).is_err());

        let mut mc = MemoryContainer::new();
        add_config(&mut mc, "config01", &[(0, &[0])], false);
        assert!(build(&mc).is_err());

        let mut mc = scenario();
        mc.remove_attr(&format!("{DEVICE}/Configuration: config01/Boards[1]"), "Board");
        assert!(build(&mc).is_err());

        let mut mc = scenario();
        mc.set_attr(&format!("{DEVICE}/Configuration: config01/Boards[1]"), "Board", 0i64);
        assert!(build(&mc).is_err());
    }
}
