/*!
    Configuration of a session: the timing settings, and the declarative description of the slaves loaded from JSON.

    The JSON document is an array of slaves, each declaring its sync managers, their PDOs and the PDO entries, plus optional startup parameters:

    ```json
    [{
        "alias": 0, "position": 2, "vendor_id": "0x00000002", "product_code": "0x07d43052",
        "syncs": [{
            "index": 2, "watchdog_enabled": true,
            "pdos": [{
                "index": "0x1600",
                "entries": [{"index": "0x7000", "subindex": 1, "size": 8, "add_to_domain": true}]
            }]
        }],
        "parameters": [{"index": "0x8000", "subindex": 1, "size": 16, "value": 500}]
    }]
    ```

    Numbers can be given as JSON integers or as hexadecimal strings, any non-hexadecimal character of a string is ignored.
*/

use crate::{
    driver::SyncDirection,
    entry::{SignalEntry, StartupParameter},
    error::{EthercatError, EthercatResult, ConfigError},
    };
use core::time::Duration;
use serde::Deserialize;
use std::path::Path;


const NSEC_PER_SEC: u32 = 1_000_000_000;

/// timing and runtime settings of a session
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    frequency: u32,
    period_ns: u32,
    /// timeout of parameter requests issued without explicit timeout
    pub sdo_timeout: Duration,
    /// number of cycles the published data can be late on the cyclic task before it blocks
    pub publish_capacity: usize,
    /// request realtime scheduling for the cyclic task
    pub realtime: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            frequency: 1000,
            period_ns: NSEC_PER_SEC / 1000,
            sdo_timeout: Duration::from_secs(1),
            publish_capacity: 16,
            realtime: true,
        }
    }
}

impl SessionConfig {
    /// cycle frequency in Hz, also the number of cycles between two state refreshes
    pub fn frequency(&self) -> u32 {self.frequency}
    pub fn period_ns(&self) -> u32 {self.period_ns}
    pub fn period(&self) -> Duration {Duration::from_nanos(self.period_ns.into())}

    pub fn set_frequency(&mut self, hz: u32) -> &mut Self {
        self.frequency = hz.clamp(1, NSEC_PER_SEC);
        self.period_ns = NSEC_PER_SEC / self.frequency;
        self
    }
    pub fn set_period(&mut self, ns: u32) -> &mut Self {
        self.period_ns = ns.clamp(1, NSEC_PER_SEC);
        self.frequency = NSEC_PER_SEC / self.period_ns;
        self
    }
    pub fn set_period_us(&mut self, us: u32) -> &mut Self {self.set_period(us.saturating_mul(1_000))}
    pub fn set_period_ms(&mut self, ms: u32) -> &mut Self {self.set_period(ms.saturating_mul(1_000_000))}
}


/// integer given either as a JSON number or as an hexadecimal string
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
enum Number {
    Int(u64),
    Hex(String),
}

impl Number {
    fn get<T: TryFrom<u64>>(&self, field: &str) -> Result<T, ConfigError> {
        let value = match self {
            Self::Int(value) => *value,
            Self::Hex(text) => {
                let digits = text.chars()
                    .filter(char::is_ascii_hexdigit)
                    .collect::<String>();
                u64::from_str_radix(&digits, 16)
                    .map_err(|_| ConfigError::Invalid(format!("{} is not an hexadecimal number: {:?}", field, text)))?
            },
        };
        T::try_from(value)
            .map_err(|_| ConfigError::Invalid(format!("{} is out of range: {}", field, value)))
    }
}

#[derive(Copy, Clone, Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum DirectionDocument {
    Input,
    Output,
}

#[derive(Clone, Debug, Deserialize)]
struct SlaveDocument {
    alias: Number,
    position: Number,
    vendor_id: Number,
    product_code: Number,
    #[serde(default)]
    syncs: Vec<SyncDocument>,
    #[serde(default)]
    parameters: Vec<ParameterDocument>,
}

#[derive(Clone, Debug, Deserialize)]
struct SyncDocument {
    index: Number,
    #[serde(default)]
    watchdog_enabled: bool,
    direction: Option<DirectionDocument>,
    pdos: Vec<PdoDocument>,
}

#[derive(Clone, Debug, Deserialize)]
struct PdoDocument {
    index: Number,
    #[serde(default)]
    entries: Vec<EntryDocument>,
}

#[derive(Clone, Debug, Deserialize)]
struct EntryDocument {
    index: Number,
    subindex: Number,
    size: Number,
    #[serde(default)]
    add_to_domain: bool,
    #[serde(default)]
    swap_endian: bool,
    #[serde(default)]
    signed: bool,
}

#[derive(Clone, Debug, Deserialize)]
struct ParameterDocument {
    index: Number,
    subindex: Number,
    size: Number,
    value: Number,
}

/**
    translate a JSON slaves description into the entries and startup parameters of a session

    Slaves are sorted by position. A slave without sync manager still produces one entry identifying it, and a PDO without entries produces one entry declaring it.
*/
pub fn parse(json: &str) -> EthercatResult<(Vec<SignalEntry>, Vec<StartupParameter>), ConfigError> {
    let mut document: Vec<SlaveDocument> = serde_json::from_str(json)
        .map_err(|e| invalid(e.to_string()))?;

    let mut slaves = Vec::with_capacity(document.len());
    for slave in document.drain(..) {
        let position: u16 = slave.position.get("position").map_err(EthercatError::Slave)?;
        slaves.push((position, slave));
    }
    slaves.sort_by_key(|(position, _)| *position);

    let mut entries = Vec::new();
    let mut parameters = Vec::new();
    for (position, slave) in slaves {
        slave_entries(position, &slave, &mut entries, &mut parameters).map_err(EthercatError::Slave)?;
    }
    log::debug!("parsed {} entries and {} startup parameters", entries.len(), parameters.len());
    Ok((entries, parameters))
}

/// read and [parse] a JSON slaves description file
pub fn load(path: impl AsRef<Path>) -> EthercatResult<(Vec<SignalEntry>, Vec<StartupParameter>), ConfigError> {
    log::info!("loading slaves from {}", path.as_ref().display());
    let content = std::fs::read_to_string(path)?;
    parse(&content)
}

fn invalid(message: String) -> EthercatError<ConfigError> {
    EthercatError::Slave(ConfigError::Invalid(message))
}

fn slave_entries(
    position: u16,
    slave: &SlaveDocument,
    entries: &mut Vec<SignalEntry>,
    parameters: &mut Vec<StartupParameter>,
    ) -> Result<(), ConfigError>
{
    let identity = SignalEntry::identity(
        slave.alias.get("alias")?,
        position,
        slave.vendor_id.get("vendor_id")?,
        slave.product_code.get("product_code")?,
        );

    if slave.syncs.is_empty() {
        entries.push(identity.clone());
    }
    for sync in &slave.syncs {
        let sync_index: u8 = sync.index.get("sync index")?;
        let direction = match sync.direction {
            Some(DirectionDocument::Input) => SyncDirection::Input,
            Some(DirectionDocument::Output) => SyncDirection::Output,
            None => SyncDirection::default_for(sync_index)
                .ok_or_else(|| ConfigError::Invalid(format!(
                    "slave {}: sync manager {} needs an explicit direction", position, sync_index)))?,
            };
        for pdo in &sync.pdos {
            let pdo_entry = identity.clone()
                .pdo(sync_index, pdo.index.get("pdo index")?)
                .direction(direction)
                .watchdog(sync.watchdog_enabled);
            if pdo.entries.is_empty() {
                entries.push(pdo_entry.clone());
            }
            for entry in &pdo.entries {
                entries.push(SignalEntry {
                    add_to_domain: entry.add_to_domain,
                    swap_endian: entry.swap_endian,
                    signed: entry.signed,
                    .. pdo_entry.clone().object(
                        entry.index.get("entry index")?,
                        entry.subindex.get("entry subindex")?,
                        entry.size.get("entry size")?,
                        )
                    });
            }
        }
    }
    for parameter in &slave.parameters {
        parameters.push(StartupParameter {
            position,
            index: parameter.index.get("parameter index")?,
            subindex: parameter.subindex.get("parameter subindex")?,
            bitsize: parameter.size.get("parameter size")?,
            value: parameter.value.get("parameter value")?,
        });
    }
    Ok(())
}
