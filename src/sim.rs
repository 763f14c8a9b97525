/*!
    In-memory bus and clock, to run sessions without hardware.

    [SimulatedBus] implements [Driver] over a set of declared slaves. It records every configuration call, allocates the domain offsets like a master would, keeps the process image in memory, answers parameter transfers from a per-slave object dictionary with a scripted [SdoBehavior], and can refuse any configuration call on demand.

    [ManualClock] is a [Clock] that only moves when polled or slept on, so timeouts and periods are deterministic.

    # Example

    ```ignore
    let bus = SimulatedBus::new()
        .with_slave(2, 0x2, 0x07d43052);
    bus.set_object(2, 0x1018, 1, &2u32.to_le_bytes());
    bus.fail_when(|call| matches!(call, SimCall::AddPdoMapping {index: 0x7000, ..}));
    ```
*/

use crate::{
    clock::Clock,
    driver::*,
    error::{EthercatError, EthercatResult},
    state::{AlState, AlMixedState, MasterState, SlaveConfigState, DomainState, WcState},
    };
use core::{
    sync::atomic::{AtomicU64, Ordering::*},
    time::Duration,
    };
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    };


/// how a simulated slave answers parameter transfers
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum SdoBehavior {
    /// requests complete at the first poll
    #[default]
    Immediate,
    /// requests stay busy for this number of polls, then complete
    BusyFor(usize),
    /// requests never leave the busy state
    BusyForever,
    /// transfers are aborted with this code, requests end in error
    Abort(u32),
    /// the first trigger of each request is lost, the request stays unused until triggered again
    UnusedOnce,
    /// triggers are always lost, requests stay unused
    UnusedForever,
}
impl SdoBehavior {
    /// state of a request after its nth trigger
    fn triggered(self, triggers: usize) -> RequestState {
        match self {
            Self::UnusedOnce if triggers == 1 => RequestState::Unused,
            Self::UnusedForever => RequestState::Unused,
            _ => RequestState::Busy,
        }
    }
}

/// configuration call received by the simulated bus
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SimCall {
    Request,
    SlaveConfig {position: u16},
    ConfigSdo {position: u16, index: u16, subindex: u8, data: Vec<u8>},
    SyncManager {position: u16, sync: u8, direction: SyncDirection, watchdog: WatchdogMode},
    ClearPdoAssign {position: u16, sync: u8},
    AddPdoAssign {position: u16, sync: u8, pdo: u16},
    ClearPdoMapping {position: u16, pdo: u16},
    AddPdoMapping {position: u16, pdo: u16, index: u16, subindex: u8, bitsize: u8},
    CreateDomain,
    Register {entries: usize},
    Activate,
    Deactivate,
    Release,
}

/// a slave on the simulated bus
#[derive(Clone, Debug)]
pub struct SimSlave {
    pub info: SlaveInfo,
    pub state: AlState,
    pub online: bool,
    pub behavior: SdoBehavior,
    /// object values, little-endian
    pub dictionary: HashMap<(u16, u8), Vec<u8>>,
}

struct SimConfig {
    position: u16,
    /// mapped entries `(index, subindex, bitsize)` per PDO
    mapping: HashMap<u16, Vec<(u16, u8, u8)>>,
}

struct SimRequest {
    config: usize,
    index: u16,
    subindex: u8,
    size: usize,
    data: Vec<u8>,
    write: bool,
    state: RequestState,
    triggers: usize,
    polls: usize,
}

type Predicate = Box<dyn Fn(&SimCall) -> bool + Send>;

#[derive(Default)]
struct SimState {
    slaves: Vec<SimSlave>,
    configs: Vec<SimConfig>,
    requests: Vec<SimRequest>,
    /// process image shared by all domains
    image: Vec<u8>,
    /// next free bit in the image
    cursor: usize,
    domains: usize,
    registered: usize,
    calls: Vec<SimCall>,
    failures: Vec<Predicate>,
    /// slaves are not brought to operational state on activation
    manual_states: bool,
    active: bool,
    /// master state polls left before deactivation completes
    deactivating: Option<usize>,
    deactivation_delay: usize,
    link_down: bool,
    cycles: usize,
}

impl SimState {
    fn record(&mut self, call: SimCall) -> EthercatResult {
        let refused = self.failures.iter().any(|refuse| refuse(&call));
        log::trace!("simulated bus: {:?}{}", call, if refused {" refused"} else {""});
        self.calls.push(call);
        if refused {Err(EthercatError::Slave(()))}
        else {Ok(())}
    }
    fn slave(&self, position: u16) -> Option<&SimSlave> {
        self.slaves.iter().find(|slave| slave.info.position == position)
    }
    fn slave_mut(&mut self, position: u16) -> Option<&mut SimSlave> {
        self.slaves.iter_mut().find(|slave| slave.info.position == position)
    }
    fn config_position(&self, config: SlaveConfigHandle) -> u16 {
        self.configs.get(config.0).map(|c| c.position).unwrap_or(u16::MAX)
    }
    fn behavior(&self, config: usize) -> SdoBehavior {
        self.configs.get(config)
            .and_then(|c| self.slave(c.position))
            .map(|slave| slave.behavior)
            .unwrap_or_default()
    }
    /// finish a request as the slave would
    fn complete(&mut self, request: usize) -> RequestState {
        let r = &self.requests[request];
        let (config, key, size, write) = (r.config, (r.index, r.subindex), r.size, r.write);
        let position = self.config_position(SlaveConfigHandle(config));
        let state = if write {
            let data = self.requests[request].data.clone();
            match self.slave_mut(position) {
                Some(slave) => {
                    slave.dictionary.insert(key, data);
                    RequestState::Success
                },
                None => RequestState::Error,
            }
        } else {
            match self.slave(position).and_then(|slave| slave.dictionary.get(&key).cloned()) {
                Some(mut value) => {
                    value.resize(size, 0);
                    self.requests[request].data = value;
                    RequestState::Success
                },
                None => RequestState::Error,
            }
        };
        self.requests[request].state = state;
        state
    }
    fn al_states(&self) -> AlMixedState {
        let bits = self.slaves.iter()
            .filter(|slave| slave.online)
            .fold(0, |bits, slave| bits | slave.state.code());
        AlMixedState::from_bits(bits)
    }
}

/// a bus of simulated slaves, see the module documentation
///
/// clones are handles to the same bus, so a test can keep one to inspect the bus given to a session
#[derive(Clone)]
pub struct SimulatedBus {
    state: Arc<Mutex<SimState>>,
}

impl Default for SimulatedBus {
    fn default() -> Self {Self::new()}
}

impl SimulatedBus {
    pub fn new() -> Self {
        Self {state: Arc::new(Mutex::new(SimState::default()))}
    }
    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// add a slave in pre-operational state at the given position
    pub fn with_slave(self, position: u16, vendor_id: u32, product_code: u32) -> Self {
        self.lock().slaves.push(SimSlave {
            info: SlaveInfo {
                position,
                alias: 0,
                vendor_id,
                product_code,
                name: format!("simulated {}", position),
                },
            state: AlState::PreOperational,
            online: true,
            behavior: SdoBehavior::default(),
            dictionary: HashMap::new(),
        });
        self
    }
    /// do not bring slaves to operational state on activation, states are only changed by [Self::set_slave_state]
    pub fn with_manual_states(self) -> Self {
        self.lock().manual_states = true;
        self
    }
    /// number of master state polls the bus stays operational after deactivation
    pub fn with_deactivation_delay(self, polls: usize) -> Self {
        self.lock().deactivation_delay = polls;
        self
    }

    pub fn set_slave_state(&self, position: u16, state: AlState) {
        if let Some(slave) = self.lock().slave_mut(position)
            {slave.state = state}
    }
    pub fn set_slave_online(&self, position: u16, online: bool) {
        if let Some(slave) = self.lock().slave_mut(position)
            {slave.online = online}
    }
    pub fn set_link(&self, up: bool) {self.lock().link_down = ! up}
    pub fn set_behavior(&self, position: u16, behavior: SdoBehavior) {
        if let Some(slave) = self.lock().slave_mut(position)
            {slave.behavior = behavior}
    }
    /// set the little-endian value of an object in a slave dictionary
    pub fn set_object(&self, position: u16, index: u16, subindex: u8, value: &[u8]) {
        if let Some(slave) = self.lock().slave_mut(position)
            {slave.dictionary.insert((index, subindex), value.to_vec());}
    }
    pub fn object(&self, position: u16, index: u16, subindex: u8) -> Option<Vec<u8>> {
        self.lock().slave(position)
            .and_then(|slave| slave.dictionary.get(&(index, subindex)).cloned())
    }
    /// refuse every configuration call matching the predicate
    pub fn fail_when(&self, predicate: impl Fn(&SimCall) -> bool + Send + 'static) {
        self.lock().failures.push(Box::new(predicate));
    }

    /// configuration calls received so far, in order
    pub fn calls(&self) -> Vec<SimCall> {self.lock().calls.clone()}
    pub fn requests_created(&self) -> usize {self.lock().requests.len()}
    /// number of frames sent
    pub fn cycles(&self) -> usize {self.lock().cycles}
    pub fn is_active(&self) -> bool {self.lock().active}

    /// write raw bytes in the process image, as slaves would for inputs
    pub fn write_image(&self, offset: u32, data: &[u8]) {
        let mut state = self.lock();
        let start = offset as usize;
        let end = start + data.len();
        if state.image.len() < end
            {state.image.resize(end, 0)}
        state.image[start .. end].copy_from_slice(data);
    }
    /// raw bytes of the process image
    pub fn read_image(&self, offset: u32, len: usize) -> Vec<u8> {
        let state = self.lock();
        (offset as usize .. offset as usize + len)
            .map(|i| state.image.get(i).copied().unwrap_or(0))
            .collect()
    }
    fn read_bytes<const N: usize>(&self, offset: u32) -> [u8; N] {
        let mut bytes = [0; N];
        bytes.copy_from_slice(&self.read_image(offset, N));
        bytes
    }
}

impl Driver for SimulatedBus {
    fn request(&self) -> EthercatResult {
        self.lock().record(SimCall::Request)
    }
    fn slave_info(&self, position: u16) -> EthercatResult<SlaveInfo> {
        self.lock().slave(position)
            .map(|slave| slave.info.clone())
            .ok_or(EthercatError::Slave(()))
    }
    fn slave_config(&self, _alias: u16, position: u16, _vendor_id: u32, _product_code: u32) -> EthercatResult<SlaveConfigHandle> {
        let mut state = self.lock();
        state.record(SimCall::SlaveConfig {position})?;
        state.configs.push(SimConfig {position, mapping: HashMap::new()});
        Ok(SlaveConfigHandle(state.configs.len() - 1))
    }
    fn config_sdo(&self, config: SlaveConfigHandle, index: u16, subindex: u8, data: &[u8]) -> EthercatResult {
        let mut state = self.lock();
        let position = state.config_position(config);
        state.record(SimCall::ConfigSdo {position, index, subindex, data: data.to_vec()})?;
        if let Some(slave) = state.slave_mut(position)
            {slave.dictionary.insert((index, subindex), data.to_vec());}
        Ok(())
    }
    fn config_sync_manager(&self, config: SlaveConfigHandle, sync: u8, direction: SyncDirection, watchdog: WatchdogMode) -> EthercatResult {
        let mut state = self.lock();
        let position = state.config_position(config);
        state.record(SimCall::SyncManager {position, sync, direction, watchdog})
    }
    fn clear_pdo_assign(&self, config: SlaveConfigHandle, sync: u8) -> EthercatResult {
        let mut state = self.lock();
        let position = state.config_position(config);
        state.record(SimCall::ClearPdoAssign {position, sync})
    }
    fn add_pdo_assign(&self, config: SlaveConfigHandle, sync: u8, pdo: u16) -> EthercatResult {
        let mut state = self.lock();
        let position = state.config_position(config);
        state.record(SimCall::AddPdoAssign {position, sync, pdo})
    }
    fn clear_pdo_mapping(&self, config: SlaveConfigHandle, pdo: u16) -> EthercatResult {
        let mut state = self.lock();
        let position = state.config_position(config);
        state.record(SimCall::ClearPdoMapping {position, pdo})?;
        if let Some(c) = state.configs.get_mut(config.0)
            {c.mapping.remove(&pdo);}
        Ok(())
    }
    fn add_pdo_mapping(&self, config: SlaveConfigHandle, pdo: u16, index: u16, subindex: u8, bitsize: u8) -> EthercatResult {
        let mut state = self.lock();
        let position = state.config_position(config);
        state.record(SimCall::AddPdoMapping {position, pdo, index, subindex, bitsize})?;
        if let Some(c) = state.configs.get_mut(config.0)
            {c.mapping.entry(pdo).or_default().push((index, subindex, bitsize));}
        Ok(())
    }

    fn create_domain(&self) -> EthercatResult<DomainHandle> {
        let mut state = self.lock();
        state.record(SimCall::CreateDomain)?;
        state.domains += 1;
        Ok(DomainHandle(state.domains - 1))
    }
    fn register_pdo_entries(&self, _domain: DomainHandle, entries: &mut [PdoEntryRegistration<'_>]) -> EthercatResult {
        let mut state = self.lock();
        state.record(SimCall::Register {entries: entries.len()})?;
        for entry in entries.iter_mut() {
            let bitsize = state.configs.iter()
                .filter(|c| c.position == entry.position)
                .flat_map(|c| c.mapping.values().flatten())
                .find(|(index, subindex, _)| *index == entry.index && *subindex == entry.subindex)
                .map(|(_, _, bitsize)| usize::from(*bitsize))
                .ok_or(EthercatError::Slave(()))?;
            if bitsize % 8 == 0
                {state.cursor = (state.cursor + 7) / 8 * 8}
            *entry.offset = (state.cursor / 8) as u32;
            *entry.bit_position = (state.cursor % 8) as u8;
            state.cursor += bitsize;
            let size = (state.cursor + 7) / 8;
            if state.image.len() < size
                {state.image.resize(size, 0)}
        }
        state.registered += entries.len();
        Ok(())
    }

    fn activate(&self) -> EthercatResult {
        let mut state = self.lock();
        state.record(SimCall::Activate)?;
        state.active = true;
        state.deactivating = None;
        if ! state.manual_states {
            let configured = state.configs.iter().map(|c| c.position).collect::<Vec<_>>();
            for slave in state.slaves.iter_mut() {
                if configured.contains(&slave.info.position)
                    {slave.state = AlState::Operational}
            }
        }
        Ok(())
    }
    fn deactivate(&self) {
        let mut state = self.lock();
        state.record(SimCall::Deactivate).ok();
        state.active = false;
        state.deactivating = Some(state.deactivation_delay);
    }
    fn release(&self) {
        self.lock().record(SimCall::Release).ok();
    }

    fn receive(&self) {}
    fn send(&self) {self.lock().cycles += 1}
    fn process(&self, _domain: DomainHandle) {}
    fn queue(&self, _domain: DomainHandle) {}

    fn master_state(&self) -> MasterState {
        let mut state = self.lock();
        let deactivating = state.deactivating;
        match deactivating {
            Some(0) => {
                for slave in state.slaves.iter_mut() {
                    if slave.state != AlState::Init
                        {slave.state = AlState::PreOperational}
                }
                state.deactivating = None;
            },
            Some(left) => state.deactivating = Some(left - 1),
            None => {},
        }
        MasterState {
            slaves_responding: state.slaves.iter().filter(|slave| slave.online).count() as u32,
            al_states: state.al_states(),
            link_up: ! state.link_down,
        }
    }
    fn domain_state(&self, _domain: DomainHandle) -> DomainState {
        let state = self.lock();
        if state.active && state.al_states().operational() {
            DomainState {working_counter: state.registered as u32, wc_state: WcState::Complete}
        } else {
            DomainState::default()
        }
    }
    fn slave_config_state(&self, config: SlaveConfigHandle) -> SlaveConfigState {
        let state = self.lock();
        match state.slave(state.config_position(config)) {
            Some(slave) => SlaveConfigState {
                online: slave.online,
                operational: slave.state == AlState::Operational,
                al_state: slave.state.code(),
                },
            None => SlaveConfigState::default(),
        }
    }

    fn create_sdo_request(&self, config: SlaveConfigHandle, index: u16, subindex: u8, size: usize) -> EthercatResult<RequestHandle> {
        let mut state = self.lock();
        if config.0 >= state.configs.len()
            {return Err(EthercatError::Slave(()))}
        state.requests.push(SimRequest {
            config: config.0,
            index,
            subindex,
            size,
            data: vec![0; size],
            write: false,
            state: RequestState::Unused,
            triggers: 0,
            polls: 0,
        });
        Ok(RequestHandle(state.requests.len() - 1))
    }
    fn sdo_request_timeout(&self, request: RequestHandle, timeout: Duration) {
        log::trace!("simulated bus: request {} timeout {:?} ignored", request.0, timeout);
    }
    fn sdo_request_read(&self, request: RequestHandle) {
        let mut state = self.lock();
        let behavior = match state.requests.get(request.0) {
            Some(r) => state.behavior(r.config),
            None => return,
        };
        let r = &mut state.requests[request.0];
        r.write = false;
        r.triggers += 1;
        r.polls = 0;
        r.state = behavior.triggered(r.triggers);
    }
    fn sdo_request_write(&self, request: RequestHandle, data: &[u8]) {
        let mut state = self.lock();
        let behavior = match state.requests.get(request.0) {
            Some(r) => state.behavior(r.config),
            None => return,
        };
        let r = &mut state.requests[request.0];
        r.write = true;
        r.data = data.to_vec();
        r.triggers += 1;
        r.polls = 0;
        r.state = behavior.triggered(r.triggers);
    }
    fn sdo_request_state(&self, request: RequestHandle) -> RequestState {
        let mut state = self.lock();
        let (config, current) = match state.requests.get(request.0) {
            Some(r) => (r.config, r.state),
            None => return RequestState::Error,
        };
        if current != RequestState::Busy
            {return current}
        match state.behavior(config) {
            SdoBehavior::BusyForever => RequestState::Busy,
            SdoBehavior::BusyFor(polls) if state.requests[request.0].polls < polls => {
                state.requests[request.0].polls += 1;
                RequestState::Busy
            },
            SdoBehavior::Abort(_) => {
                state.requests[request.0].state = RequestState::Error;
                RequestState::Error
            },
            _ => state.complete(request.0),
        }
    }
    fn sdo_request_data(&self, request: RequestHandle, dst: &mut [u8]) -> usize {
        let state = self.lock();
        match state.requests.get(request.0) {
            Some(r) => {
                let size = dst.len().min(r.data.len());
                dst[.. size].copy_from_slice(&r.data[.. size]);
                size
            },
            None => 0,
        }
    }

    fn sdo_upload(&self, position: u16, index: u16, subindex: u8, dst: &mut [u8]) -> EthercatResult<usize, u32> {
        let state = self.lock();
        let slave = state.slave(position)
            .ok_or(EthercatError::Master("no slave at this position"))?;
        if let SdoBehavior::Abort(code) = slave.behavior
            {return Err(EthercatError::Slave(code))}
        let value = slave.dictionary.get(&(index, subindex))
            .ok_or(EthercatError::Slave(0x0602_0000))?;
        let size = dst.len().min(value.len());
        dst[.. size].copy_from_slice(&value[.. size]);
        Ok(size)
    }
    fn sdo_download(&self, position: u16, index: u16, subindex: u8, data: &[u8]) -> EthercatResult<(), u32> {
        let mut state = self.lock();
        let slave = state.slave_mut(position)
            .ok_or(EthercatError::Master("no slave at this position"))?;
        if let SdoBehavior::Abort(code) = slave.behavior
            {return Err(EthercatError::Slave(code))}
        slave.dictionary.insert((index, subindex), data.to_vec());
        Ok(())
    }

    fn read_bit(&self, _domain: DomainHandle, offset: u32, bit: u8) -> bool {
        self.read_bytes::<1>(offset)[0] & (1 << bit) != 0
    }
    fn read_u8(&self, _domain: DomainHandle, offset: u32) -> u8 {
        self.read_bytes::<1>(offset)[0]
    }
    fn read_u16(&self, _domain: DomainHandle, offset: u32) -> u16 {
        u16::from_le_bytes(self.read_bytes(offset))
    }
    fn read_u32(&self, _domain: DomainHandle, offset: u32) -> u32 {
        u32::from_le_bytes(self.read_bytes(offset))
    }
    fn read_u64(&self, _domain: DomainHandle, offset: u32) -> u64 {
        u64::from_le_bytes(self.read_bytes(offset))
    }
    fn write_bit(&self, _domain: DomainHandle, offset: u32, bit: u8, value: bool) {
        let mut state = self.lock();
        let start = offset as usize;
        if state.image.len() <= start
            {state.image.resize(start + 1, 0)}
        if value {state.image[start] |= 1 << bit}
        else {state.image[start] &= ! (1 << bit)}
    }
    fn write_u8(&self, _domain: DomainHandle, offset: u32, value: u8) {
        self.write_image(offset, &[value])
    }
    fn write_u16(&self, _domain: DomainHandle, offset: u32, value: u16) {
        self.write_image(offset, &value.to_le_bytes())
    }
    fn write_u32(&self, _domain: DomainHandle, offset: u32, value: u32) {
        self.write_image(offset, &value.to_le_bytes())
    }
    fn write_u64(&self, _domain: DomainHandle, offset: u32, value: u64) {
        self.write_image(offset, &value.to_le_bytes())
    }
}


/**
    clock advancing by a fixed step each time it is read, and jumping to the deadline when slept on

    With a null step, polling loops bounded by this clock never end.
*/
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
    step: u64,
}

impl ManualClock {
    pub fn new(step: Duration) -> Self {
        Self {now: AtomicU64::new(0), step: step.as_nanos() as u64}
    }
    /// current time, without advancing
    pub fn peek(&self) -> Duration {Duration::from_nanos(self.now.load(Acquire))}
    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_nanos() as u64, AcqRel);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.now.fetch_add(self.step, AcqRel))
    }
    fn sleep_until(&self, deadline: Duration) {
        self.now.fetch_max(deadline.as_nanos() as u64, AcqRel);
    }
    fn relax(&self) {}
}
