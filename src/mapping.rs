/*!
    This module builds the slave configurations of a session and their sync manager and PDO mappings.

    It highlights
    - [SlaveConfiguration] created once per distinct slave position, holding the configuration handle and its last observed state
    - [Config] grouping a flat list of [SignalEntry] into `position -> sync manager -> PDO -> entries`, and applying it to the slaves

    Example

    ```ignore
    // one configuration per slave found in the entries
    let slaves = build_slaves(&driver, &entries)?;
    // sync managers and PDOs of each slave
    Config::group(&entries).apply(&driver, &slaves)?;
    // parameters applied before operational state
    apply_parameters(&driver, &slaves, &parameters)?;
    ```

    Any failure here is fatal to the session: the declared configuration does not match the bus.
*/

use crate::{
    driver::{Driver, SlaveInfo, SlaveConfigHandle, SyncDirection, WatchdogMode},
    entry::{SignalEntry, StartupParameter},
    error::{EthercatError, EthercatResult, ConfigError},
    state::SlaveConfigState,
    };
use core::sync::atomic::{AtomicU16, Ordering::*};
use std::{
    collections::HashSet,
    sync::{Mutex, MutexGuard},
    };


/// configuration of one slave on the bus
#[derive(Debug)]
pub struct SlaveConfiguration {
    /// identity reported by the bus
    pub info: SlaveInfo,
    pub handle: SlaveConfigHandle,
    /// last observed state, packed
    state: AtomicU16,
    /// held while a parameter request is in flight on this slave
    request: Mutex<()>,
}
impl SlaveConfiguration {
    pub fn new(info: SlaveInfo, handle: SlaveConfigHandle) -> Self {
        Self {
            info,
            handle,
            state: AtomicU16::new(SlaveConfigState::default().pack()),
            request: Mutex::new(()),
        }
    }
    pub fn position(&self) -> u16 {self.info.position}
    /// state observed at the last refresh
    pub fn state(&self) -> SlaveConfigState {
        SlaveConfigState::unpack(self.state.load(Acquire))
    }
    /// read the current state from the driver, and log its changes
    pub fn refresh<D: Driver + ?Sized>(&self, driver: &D) -> SlaveConfigState {
        let new = driver.slave_config_state(self.handle);
        let old = SlaveConfigState::unpack(self.state.swap(new.pack(), AcqRel));
        if old.al_state != new.al_state
            {log::info!("slave {}: state {:#04x}", self.position(), new.al_state)}
        if old.online != new.online
            {log::info!("slave {}: {}", self.position(), if new.online {"online"} else {"offline"})}
        if old.operational != new.operational
            {log::info!("slave {}: {}operational", self.position(), if new.operational {""} else {"not "})}
        new
    }
    /// reset the observed state, as after the master release
    pub(crate) fn reset(&self) {
        self.state.store(SlaveConfigState::default().pack(), Release);
    }
    /// reserve this slave for a parameter request
    pub(crate) fn lock(&self) -> MutexGuard<'_, ()> {
        // the guarded data is empty, so a poisoned lock is still usable
        self.request.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/**
    create one slave configuration per distinct position, in order of first appearance in `entries`

    The identity used for the configuration is the one reported by the bus. A slave missing on the bus is fatal.
*/
pub fn build_slaves<D: Driver + ?Sized>(driver: &D, entries: &[SignalEntry]) -> EthercatResult<Vec<SlaveConfiguration>, ConfigError> {
    log::info!("configuring slaves");
    let mut seen = HashSet::new();
    let mut slaves = Vec::new();
    for entry in entries {
        if ! seen.insert(entry.position)
            {continue}

        let position = entry.position;
        let info = fatal(driver.slave_info(position), ConfigError::SlaveInfo {position})?;
        log::debug!("slave {:2}: {:#010x} {:#010x} {}", info.position, info.vendor_id, info.product_code, info.name);
        if (entry.vendor_id != 0 && entry.vendor_id != info.vendor_id)
        || (entry.product_code != 0 && entry.product_code != info.product_code) {
            log::warn!("slave {}: declared as {:#010x}:{:#010x} but found {:#010x}:{:#010x}",
                position,
                entry.vendor_id, entry.product_code,
                info.vendor_id, info.product_code);
        }
        let handle = fatal(
            driver.slave_config(info.alias, info.position, info.vendor_id, info.product_code),
            ConfigError::SlaveConfig {position},
            )?;
        slaves.push(SlaveConfiguration::new(info, handle));
    }
    Ok(slaves)
}

/// find the configuration of the slave at the given position
pub fn find_slave(slaves: &[SlaveConfiguration], position: u16) -> Option<&SlaveConfiguration> {
    slaves.iter().find(|slave| slave.position() == position)
}

/**
    queue every startup parameter on its slave configuration

    values are sent little-endian on 1, 2 or 4 bytes depending on their declared bit size
*/
pub fn apply_parameters<D: Driver + ?Sized>(driver: &D, slaves: &[SlaveConfiguration], parameters: &[StartupParameter]) -> EthercatResult<(), ConfigError> {
    for parameter in parameters {
        let position = parameter.position;
        let slave = find_slave(slaves, position)
            .ok_or(EthercatError::Slave(()))
            .or_else(|e| fatal(Err(e), ConfigError::UnknownSlave {position}))?;
        let data = parameter.bytes();
        log::debug!("slave {}: startup parameter {:#06x}:{:#04x} = {:#x} ({} bytes)",
            position, parameter.index, parameter.subindex, parameter.value, data.len());
        fatal(
            driver.config_sdo(slave.handle, parameter.index, parameter.subindex, &data),
            ConfigError::StartupParameter {position, index: parameter.index, subindex: parameter.subindex},
            )?;
    }
    Ok(())
}

/// log a configuration failure and give it its context
pub(crate) fn fatal<T>(result: EthercatResult<T>, error: ConfigError) -> EthercatResult<T, ConfigError> {
    result.map_err(|e| {
        log::error!("{}: {}", error, e);
        e.context(error)
    })
}


/// sync manager and PDO configuration of all the slaves, grouped from a flat list of entries
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Config {
    pub slaves: Vec<ConfigSlave>,
}
/// configuration for one slave
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConfigSlave {
    pub position: u16,
    pub channels: Vec<ConfigChannel>,
}
/// configuration for a slave sync manager channel
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConfigChannel {
    pub index: u8,
    /// direction override from the first entry of the channel
    pub direction: Option<SyncDirection>,
    pub watchdog: WatchdogMode,
    pub pdos: Vec<ConfigPdo>,
}
/// configuration for a PDO assigned to a sync manager
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConfigPdo {
    pub index: u16,
    pub entries: Vec<ConfigEntry>,
}
/// object mapped in a PDO
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ConfigEntry {
    pub index: u16,
    pub subindex: u8,
    pub bitsize: u8,
}

impl Config {
    /**
        group entries by slave, sync manager and PDO, keeping the order of first appearance at each level

        entries without PDO are left to the slave default configuration. An object repeated right after itself in the same PDO, or an empty object, is not mapped.
    */
    pub fn group(entries: &[SignalEntry]) -> Self {
        let mut config = Self::default();
        for entry in entries {
            if entry.pdo_index == 0
                {continue}

            let slave = find_or_push(&mut config.slaves,
                |s| s.position == entry.position,
                || ConfigSlave {position: entry.position, channels: Vec::new()},
                );
            let channel = find_or_push(&mut slave.channels,
                |c| c.index == entry.sync_index,
                || ConfigChannel {
                    index: entry.sync_index,
                    direction: entry.direction,
                    watchdog: entry.watchdog.map(WatchdogMode::from).unwrap_or_default(),
                    pdos: Vec::new(),
                    },
                );
            let pdo = find_or_push(&mut channel.pdos,
                |p| p.index == entry.pdo_index,
                || ConfigPdo {index: entry.pdo_index, entries: Vec::new()},
                );
            let mapped = ConfigEntry {index: entry.index, subindex: entry.subindex, bitsize: entry.bitsize};
            if mapped == (ConfigEntry {index: 0, subindex: 0, bitsize: 0})
            || pdo.entries.last() == Some(&mapped)
                {continue}
            pdo.entries.push(mapped);
        }
        config
    }

    /**
        configure the sync manager of every slave, assign their PDOs and map the PDO entries

        Only the first sync manager of a slave is configured, with the direction and watchdog of its first entry. The others keep the slave defaults and only get their PDO assignment.

        slaves must have been created by [build_slaves] from the same entries. Any refused configuration is fatal.
    */
    pub fn apply<D: Driver + ?Sized>(&self, driver: &D, slaves: &[SlaveConfiguration]) -> EthercatResult<(), ConfigError> {
        log::info!("configuring sync managers and mapping PDOs");
        for config in &self.slaves {
            let position = config.position;
            let slave = find_slave(slaves, position)
                .ok_or(EthercatError::Slave(()))
                .or_else(|e| fatal(Err(e), ConfigError::UnknownSlave {position}))?;
            log::debug!("# [{}] {}", position, slave.info.name);

            // the sync manager is configured once per slave, from its first channel
            if let Some(channel) = config.channels.first() {
                let sync = channel.index;
                let direction = channel.direction
                    .or(SyncDirection::default_for(sync))
                    .ok_or(EthercatError::Protocol("no direction for this sync manager"))
                    .or_else(|e| fatal(Err(e), ConfigError::SyncManager {position, sync}))?;
                log::debug!("  > SyncManager {} {:?}", sync, direction);
                fatal(
                    driver.config_sync_manager(slave.handle, sync, direction, channel.watchdog),
                    ConfigError::SyncManager {position, sync},
                    )?;
            }
            for channel in &config.channels {
                let sync = channel.index;
                fatal(
                    driver.clear_pdo_assign(slave.handle, sync),
                    ConfigError::SyncManager {position, sync},
                    )?;

                for pdo in &channel.pdos {
                    log::debug!("    + PDO {:#06x}", pdo.index);
                    fatal(
                        driver.add_pdo_assign(slave.handle, sync, pdo.index),
                        ConfigError::PdoAssign {position, sync, pdo: pdo.index},
                        )?;
                    fatal(
                        driver.clear_pdo_mapping(slave.handle, pdo.index),
                        ConfigError::PdoAssign {position, sync, pdo: pdo.index},
                        )?;

                    for entry in &pdo.entries {
                        log::debug!("      - entry {:#06x}:{:02x} {:2} bit(s)", entry.index, entry.subindex, entry.bitsize);
                        fatal(
                            driver.add_pdo_mapping(slave.handle, pdo.index, entry.index, entry.subindex, entry.bitsize),
                            ConfigError::PdoMapping {
                                position,
                                sync,
                                pdo: pdo.index,
                                index: entry.index,
                                subindex: entry.subindex,
                                bitsize: entry.bitsize,
                                },
                            )?;
                    }
                }
            }
        }
        Ok(())
    }
}

/// item matching the predicate, or a new item pushed at the end
fn find_or_push<T>(items: &mut Vec<T>, matches: impl Fn(&T) -> bool, new: impl FnOnce() -> T) -> &mut T {
    let i = match items.iter().position(matches) {
        Some(i) => i,
        None => {
            items.push(new());
            items.len() - 1
        },
    };
    &mut items[i]
}
