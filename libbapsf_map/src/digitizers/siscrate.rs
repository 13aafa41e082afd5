use fxhash::FxHashSet;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

use super::{
    is_config_active, review_connections, AdcSetup, Connection, DigitizerConfig,
    DigitizerFamily, DigitizerMap,
};
use crate::container::{AttrValue, Attributes, Group};
use crate::device_map::DeviceMapper;
use crate::diagnostics::Diagnostics;
use crate::error::MappingError;

pub const ADC_3302: &str = "SIS 3302";
pub const ADC_3305: &str = "SIS 3305";

const BOARD_TYPES: &str = "SIS crate board types";
const CONFIG_INDICES: &str = "SIS crate config indices";
const SLOT_NUMBERS: &str = "SIS crate slot numbers";

/// Slot 3 holds the crate controller
const CONTROLLER_SLOT: u32 = 3;

/// slot -> (board, adc)
const SLOT_MAP: [(u32, u32, &str); 6] = [
    (5, 1, ADC_3302),
    (7, 2, ADC_3302),
    (9, 3, ADC_3302),
    (11, 4, ADC_3302),
    (13, 1, ADC_3305),
    (15, 2, ADC_3305),
];

static CONFIG_3302: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^SIS crate 3302 configurations\[(?P<INDEX>\d+)\]$").expect("Invalid regex")
});
static CONFIG_3305: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^SIS crate 3305 configurations\[(?P<INDEX>\d+)\]$").expect("Invalid regex")
});
static ENABLED_3302: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Enabled\s(?P<CH>\d+)$").expect("Invalid regex"));
static ENABLED_FPGA1: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^FPGA 1 Enabled\s(?P<CH>\d+)$").expect("Invalid regex"));
static ENABLED_FPGA2: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^FPGA 2 Enabled\s(?P<CH>\d+)$").expect("Invalid regex"));

/// Slot number to (board, adc) for every slot that carries a digitizer board
pub fn slot_info() -> BTreeMap<u32, (u32, &'static str)> {
    SLOT_MAP
        .iter()
        .map(|(slot, board, adc)| (*slot, (*board, *adc)))
        .collect()
}

pub fn get_slot(board: u32, adc: &str) -> Option<u32> {
    SLOT_MAP
        .iter()
        .find(|(_, b, a)| *b == board && *a == adc)
        .map(|(slot, _, _)| *slot)
}

pub fn dataset_name(config: &str, board: u32, channel: u32, adc: &str) -> Option<String> {
    let slot = get_slot(board, adc)?;
    if adc == ADC_3302 {
        Some(format!("{config} [Slot {slot}: SIS 3302 ch {channel}]"))
    } else {
        let (fpga, ch) = if (1..=4).contains(&channel) {
            (1, channel)
        } else {
            (2, channel.saturating_sub(4))
        };
        Some(format!("{config} [Slot {slot}: SIS 3305 FPGA {fpga} ch {ch}]"))
    }
}

/// Maps the SIS crate digitizer group (SIS 3302 and SIS 3305 boards)
#[derive(Debug, Clone, Copy)]
pub struct SisCrate;

impl DeviceMapper<DigitizerMap> for SisCrate {
    fn device_name(&self) -> &'static str {
        "SIS crate"
    }

    fn build(&self, group: &Group) -> Result<DigitizerMap, MappingError> {
        let mut diagnostics = Diagnostics::new();
        let dataset_names = group.dataset_names()?;
        let mut configs = BTreeMap::new();

        for config_name in group.subgroup_names()? {
            let config_group = group.group(&config_name)?;
            let attrs = config_group.attrs()?;
            if ![BOARD_TYPES, CONFIG_INDICES, SLOT_NUMBERS]
                .iter()
                .all(|key| attrs.contains_key(*key))
            {
                spdlog::debug!("Skipping '{config_name}' in {}, not a configuration group", group.path());
                continue;
            }
            let active = is_config_active(&dataset_names, &config_name);
            let mut config = DigitizerConfig::new(config_group.path(), active, "Shot number");
            config.adcs = find_active_adcs(&attrs);
            let pairs = if config.adcs.is_empty() {
                Vec::new()
            } else {
                slot_pairs(group, &config_group, &attrs, &mut diagnostics)?
            };

            for adc in config.adcs.clone() {
                let mut conns = find_connections(group, &config_group, &pairs, &adc, active, &mut diagnostics)?;
                if active {
                    let mut shotnum_field = config.shotnum_field().to_string();
                    conns = review_connections(
                        group,
                        DigitizerFamily::SisCrate,
                        &config_name,
                        &adc,
                        conns,
                        &mut shotnum_field,
                        false,
                        &mut diagnostics,
                    )?;
                }
                config.connections.insert(adc, conns);
            }
            configs.insert(config_name, config);
        }

        DigitizerMap::assemble(group, DigitizerFamily::SisCrate, configs, diagnostics)
    }
}

fn find_active_adcs(attrs: &Attributes) -> Vec<String> {
    let types = attrs
        .get(BOARD_TYPES)
        .and_then(AttrValue::as_int_array)
        .map(|arr| arr.iter().copied().collect::<Vec<i64>>())
        .unwrap_or_default();
    let mut adcs = Vec::new();
    if types.contains(&2) {
        adcs.push(ADC_3302.to_string());
    }
    if types.contains(&3) {
        adcs.push(ADC_3305.to_string());
    }
    adcs
}

/// A 1D integer array attribute
fn read_index_array(attrs: &Attributes, key: &str) -> Option<Vec<i64>> {
    match attrs.get(key) {
        Some(AttrValue::IntArray(arr)) if arr.ndim() == 1 => Some(arr.iter().copied().collect()),
        _ => None,
    }
}

/// (slot, config index, board, adc) for every recognised slot
fn slot_pairs(
    device: &Group,
    config_group: &Group,
    attrs: &Attributes,
    diagnostics: &mut Diagnostics,
) -> Result<Vec<(u32, i64, u32, &'static str)>, MappingError> {
    let (Some(slots), Some(indices)) = (
        read_index_array(attrs, SLOT_NUMBERS),
        read_index_array(attrs, CONFIG_INDICES),
    ) else {
        return Err(MappingError::new(
            device.path(),
            "defined slots and configuration indices are not 1D arrays",
        ));
    };
    if slots.len() != indices.len() {
        return Err(MappingError::new(
            device.path(),
            "defined slots and configuration indices are not the same size",
        ));
    }
    let unique: FxHashSet<i64> = slots.iter().copied().collect();
    if unique.len() != slots.len() {
        return Err(MappingError::new(
            device.path(),
            "defined slot numbers are not unique",
        ));
    }

    let map = slot_info();
    let mut pairs = Vec::new();
    for (slot, index) in slots.into_iter().zip(indices) {
        let known = u32::try_from(slot).ok().and_then(|s| map.get(&s).map(|info| (s, *info)));
        match known {
            Some((s, (board, adc))) => pairs.push((s, index, board, adc)),
            None if slot == i64::from(CONTROLLER_SLOT) => (),
            None => diagnostics.warn(
                config_group.path(),
                format!("defined slot number {slot} is unexpected...not adding to configs"),
            ),
        }
    }
    Ok(pairs)
}

/// Connections of one adc in a configuration. Repeated configuration indices
/// are only checked among the slots of `adc`; two adcs may share an index.
fn find_connections(
    device: &Group,
    config_group: &Group,
    pairs: &[(u32, i64, u32, &'static str)],
    adc: &str,
    active: bool,
    diagnostics: &mut Diagnostics,
) -> Result<Vec<Connection>, MappingError> {
    let adc_pairs: Vec<_> = pairs.iter().filter(|(_, _, _, a)| *a == adc).collect();
    let mut seen = FxHashSet::default();
    if adc_pairs.iter().any(|(_, index, _, _)| !seen.insert(*index)) {
        let why = format!("the same configuration index is assigned to multiple slots of {adc}");
        if active {
            return Err(MappingError::new(device.path(), why));
        }
        diagnostics.warn(
            config_group.path(),
            format!("{why}...config not active so not adding to mapping"),
        );
        return Ok(Vec::new());
    }

    let (group_pattern, is_3302) = if adc == ADC_3302 {
        (&*CONFIG_3302, true)
    } else {
        (&*CONFIG_3305, false)
    };

    let mut conns = Vec::new();
    for name in config_group.subgroup_names()? {
        let Some(index) = group_pattern
            .captures(&name)
            .and_then(|caps| caps["INDEX"].parse::<i64>().ok())
        else {
            continue;
        };
        let Some((_, _, board, _)) = adc_pairs.iter().find(|(_, i, _, _)| *i == index) else {
            diagnostics.warn(
                config_group.path(),
                format!("board not found since config index {index} of '{name}' is not defined in the configuration group"),
            );
            continue;
        };
        let adc_group = config_group.group(&name)?;
        let adc_attrs = adc_group.attrs()?;

        let channels = enabled_channels(&adc_attrs, is_3302);
        if channels.is_empty() {
            diagnostics.warn(
                adc_group.path(),
                "does not define any valid channel numbers...not adding to configs",
            );
            continue;
        }

        let mut setup = if is_3302 {
            AdcSetup::new(16, Some(100.0e6))
        } else {
            AdcSetup::new(10, clock_rate_3305(&adc_group, &adc_attrs, diagnostics))
        };
        setup.shot_average = adc_attrs
            .get("Shot averaging (software)")
            .and_then(AttrValue::as_int)
            .filter(|n| *n > 1)
            .and_then(|n| u32::try_from(n).ok());
        if is_3302 {
            setup.sample_average = adc_attrs
                .get("Sample averaging (hardware)")
                .and_then(AttrValue::as_int)
                .filter(|n| *n > 0)
                .and_then(|n| u32::try_from(n).ok())
                .and_then(|n| 2u32.checked_pow(n));
        }
        conns.push(Connection {
            board: *board,
            channels,
            setup,
        });
    }
    Ok(conns)
}

fn enabled_channels(attrs: &Attributes, is_3302: bool) -> Vec<u32> {
    let mut channels = Vec::new();
    for (key, value) in attrs.iter() {
        if !key.contains("Enabled") || !value.is_true_flag() {
            continue;
        }
        let channel = if is_3302 {
            ENABLED_3302
                .captures(key)
                .and_then(|caps| caps["CH"].parse::<u32>().ok())
        } else if let Some(caps) = ENABLED_FPGA1.captures(key) {
            caps["CH"].parse::<u32>().ok()
        } else {
            ENABLED_FPGA2
                .captures(key)
                .and_then(|caps| caps["CH"].parse::<u32>().ok())
                .map(|ch| ch + 4)
        };
        if let Some(ch) = channel {
            channels.push(ch);
        }
    }
    channels
}

fn clock_rate_3305(group: &Group, attrs: &Attributes, diagnostics: &mut Diagnostics) -> Option<f64> {
    let mode = attrs.get("Channel mode").and_then(|value| match value {
        AttrValue::Int(n) => Some(*n),
        AttrValue::Str(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    });
    match mode {
        Some(0) => Some(1.25e9),
        Some(1) => Some(2.5e9),
        Some(2) => Some(5.0e9),
        Some(_) => None,
        None => {
            diagnostics.warn(
                group.path(),
                "does not define a clock rate mode...setting to None in the configs",
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{DType, Field};
    use crate::digitizers::assert_connections_resolve;
    use crate::error::ArgumentError;
    use crate::memory::MemoryContainer;

    const DEVICE: &str = "/Raw data + config/SIS crate";

    fn add_datasets(mc: &mut MemoryContainer, config: &str, board: u32, channels: &[u32], adc: &str) {
        for ch in channels {
            let name = match dataset_name(config, board, *ch, adc) {
                Some(n) => n,
                None => panic!(),
            };
            mc.add_dataset(&format!("{DEVICE}/{name}"), &[8, 1024], DType::Int(2));
            mc.add_dataset(
                &format!("{DEVICE}/{name} headers"),
                &[8],
                DType::Compound(vec![Field::scalar("Shot number", DType::UInt(4))]),
            );
        }
    }

    /// One 3302 board in slot 5 (channels 1, 2) and one 3305 board in slot 13 (channels 1, 6)
    fn scenario() -> MemoryContainer {
        let mut mc = MemoryContainer::new();
        let config = format!("{DEVICE}/config01");
        mc.set_attr(&config, BOARD_TYPES, vec![2i64, 3]);
        mc.set_attr(&config, CONFIG_INDICES, vec![0i64, 0]);
        mc.set_attr(&config, SLOT_NUMBERS, vec![5i64, 13]);
        let c3302 = format!("{config}/SIS crate 3302 configurations[0]");
        mc.set_attr(&c3302, "Enabled 1", "TRUE");
        mc.set_attr(&c3302, "Enabled 2", "TRUE");
        mc.set_attr(&c3302, "Enabled 3", "FALSE");
        mc.set_attr(&c3302, "Sample averaging (hardware)", 2i64);
        let c3305 = format!("{config}/SIS crate 3305 configurations[0]");
        mc.set_attr(&c3305, "FPGA 1 Enabled 1", "TRUE");
        mc.set_attr(&c3305, "FPGA 2 Enabled 2", "TRUE");
        mc.set_attr(&c3305, "Channel mode", 1i64);
        add_datasets(&mut mc, "config01", 1, &[1, 2], ADC_3302);
        add_datasets(&mut mc, "config01", 1, &[1, 6], ADC_3305);
        mc
    }

    fn build(mc: &MemoryContainer) -> Result<DigitizerMap, MappingError> {
        let group = match Group::open(mc, DEVICE) {
            Ok(g) => g,
            Err(_) => panic!(),
        };
        SisCrate.build(&group)
    }

    #[test]
    fn test_slots() {
        assert_eq!(get_slot(1, ADC_3305), Some(13));
        assert_eq!(get_slot(4, ADC_3302), Some(11));
        assert_eq!(get_slot(3, ADC_3305), None);
        assert_eq!(slot_info().get(&7), Some(&(2, ADC_3302)));
        assert_eq!(
            dataset_name("config01", 1, 2, ADC_3302),
            Some(String::from("config01 [Slot 5: SIS 3302 ch 2]"))
        );
    }

    #[test]
    fn test_scenario() {
        let mc = scenario();
        let map = match build(&mc) {
            Ok(m) => m,
            Err(e) => panic!("{e}"),
        };
        let config = &map.configs["config01"];
        assert!(config.active);
        assert_eq!(config.adcs, vec![String::from(ADC_3302), String::from(ADC_3305)]);
        assert_eq!(config.shotnum_field(), "Shot number");

        let c3302 = &config.connections[ADC_3302][0];
        assert_eq!(c3302.board, 1);
        assert_eq!(c3302.channels, vec![1, 2]);
        assert_eq!(c3302.setup.bit, 16);
        assert_eq!(c3302.setup.sample_average, Some(4));

        let c3305 = &config.connections[ADC_3305][0];
        assert_eq!(c3305.channels, vec![1, 6]);
        assert_eq!(c3305.setup.bit, 10);
        assert_eq!(c3305.setup.clock_rate, Some(2.5e9));

        assert_eq!(
            map.construct_dataset_name(1, 6, None, Some(ADC_3305)),
            Ok(String::from("config01 [Slot 13: SIS 3305 FPGA 2 ch 2]"))
        );
        // omitted adc defaults to SIS 3302 when both are used
        assert_eq!(
            map.construct_dataset_name(1, 2, None, None),
            Ok(String::from("config01 [Slot 5: SIS 3302 ch 2]"))
        );
        let (_, info) = match map.construct_dataset_name_with_info(1, 1, None, Some(ADC_3305)) {
            Ok(r) => r,
            Err(e) => panic!("{e}"),
        };
        assert_eq!(info.adc, ADC_3305);
        assert_eq!(info.digitizer, "SIS crate");
        assert_eq!(
            map.get_adc_info(1, 1, None, None),
            Err(ArgumentError::AmbiguousAdc(String::from("config01")))
        );
        assert_connections_resolve(&map, &mc);
    }

    #[test]
    fn test_board_without_datasets_is_dropped() {
        let mut mc = scenario();
        let c3302 = format!("{DEVICE}/config01/SIS crate 3302 configurations[0]");
        mc.set_attr(&c3302, "Enabled 2", "FALSE");
        mc.remove(&format!("{DEVICE}/config01 [Slot 5: SIS 3302 ch 1]"));
        let map = match build(&mc) {
            Ok(m) => m,
            Err(e) => panic!("{e}"),
        };
        let config = &map.configs["config01"];
        let boards_3302 = config
            .connections
            .get(ADC_3302)
            .map(|conns| conns.len())
            .unwrap_or_default();
        assert_eq!(boards_3302, 0);
        assert_eq!(config.adcs, vec![String::from(ADC_3305)]);
        let naming = map
            .diagnostics
            .iter()
            .filter(|d| d.message.contains("'config01 [Slot 5: SIS 3302 ch 1]'"))
            .count();
        assert_eq!(naming, 1);
        assert!(map.diagnostics.mentions("board 1 does not define any valid channel"));
        assert_connections_resolve(&map, &mc);
    }

    #[test]
    fn test_removed_datasets_leave_resolvable_connections() {
        let mut mc = scenario();
        mc.remove(&format!("{DEVICE}/config01 [Slot 5: SIS 3302 ch 2] headers"));
        mc.remove(&format!("{DEVICE}/config01 [Slot 13: SIS 3305 FPGA 1 ch 1]"));
        let map = match build(&mc) {
            Ok(m) => m,
            Err(e) => panic!("{e}"),
        };
        let config = &map.configs["config01"];
        assert_eq!(config.connections[ADC_3302][0].channels, vec![1]);
        assert_eq!(config.connections[ADC_3305][0].channels, vec![6]);
        assert_connections_resolve(&map, &mc);
    }

    #[test]
    fn test_adc_without_connections_is_pruned() {
        let mut mc = scenario();
        mc.remove(&format!("{DEVICE}/config01 [Slot 13: SIS 3305 FPGA 1 ch 1]"));
        mc.remove(&format!("{DEVICE}/config01 [Slot 13: SIS 3305 FPGA 2 ch 2]"));
        let map = match build(&mc) {
            Ok(m) => m,
            Err(e) => panic!("{e}"),
        };
        let config = &map.configs["config01"];
        assert_eq!(config.adcs, vec![String::from(ADC_3302)]);
        assert!(!config.connections.contains_key(ADC_3305));
        assert_eq!(
            map.construct_dataset_name(1, 1, None, None),
            Ok(String::from("config01 [Slot 5: SIS 3302 ch 1]"))
        );
    }

    #[test]
    fn test_bad_slots_are_fatal() {
        let mut mc = scenario();
        mc.set_attr(&format!("{DEVICE}/config01"), SLOT_NUMBERS, vec![5i64, 5]);
        assert!(build(&mc).is_err());

        let mut mc = scenario();
        mc.set_attr(&format!("{DEVICE}/config01"), SLOT_NUMBERS, vec![5i64]);
        assert!(build(&mc).is_err());
    }

    #[test]
    fn test_unexpected_slot_warns() {
        let mut mc = scenario();
        mc.set_attr(&format!("{DEVICE}/config01"), BOARD_TYPES, vec![2i64, 3, 1, 2]);
        mc.set_attr(&format!("{DEVICE}/config01"), CONFIG_INDICES, vec![0i64, 0, 0, 1]);
        mc.set_attr(&format!("{DEVICE}/config01"), SLOT_NUMBERS, vec![5i64, 13, 3, 17]);
        let map = match build(&mc) {
            Ok(m) => m,
            Err(e) => panic!("{e}"),
        };
        assert!(map.diagnostics.mentions("slot number 17"));
        assert!(!map.diagnostics.mentions("slot number 3 "));
    }
}
