/*!
    Interface to the fieldbus master stack owning the physical link.

    The [Driver] trait exposes the capabilities a session needs from the master: slave identification, creation of slave configurations, sync manager and PDO mapping, process data domains, cyclic frame exchange, state polling and parameter requests. It mirrors the application interface of common EtherCAT master stacks, so that an implementation can be a thin binding to such a stack, or the simulated bus of [crate::sim].

    All methods take `&self` since the driver is shared between the cyclic task and the callers issuing parameter requests, implementations must synchronize internally.
*/

use crate::{
    error::EthercatResult,
    state::{MasterState, SlaveConfigState, DomainState},
    };
use core::time::Duration;


/// handle to a slave configuration created by the driver
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct SlaveConfigHandle(pub usize);
/// handle to a process data domain created by the driver
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct DomainHandle(pub usize);
/// handle to a parameter request created by the driver
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct RequestHandle(pub usize);

/// identity of a slave found on the bus
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SlaveInfo {
    pub position: u16,
    pub alias: u16,
    pub vendor_id: u32,
    pub product_code: u32,
    pub name: String,
}

/// direction of a sync manager, seen from the master
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SyncDirection {
    /// data is read by the master
    Input,
    /// data is written by the master
    Output,
}

impl SyncDirection {
    /// conventional direction of the first sync managers: mailbox out and in, then process data out and in
    pub fn default_for(sync: u8) -> Option<Self> {
        match sync {
            0 | 2 => Some(Self::Output),
            1 | 3 => Some(Self::Input),
            _ => None,
        }
    }
}

/// watchdog setting of a sync manager
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum WatchdogMode {
    /// keep the slave's default
    #[default]
    Default,
    Enable,
    Disable,
}

impl From<bool> for WatchdogMode {
    fn from(enabled: bool) -> Self {
        if enabled {Self::Enable} else {Self::Disable}
    }
}

/**
    a PDO entry to register in a domain

    the driver computes the location of the entry in the domain and writes it back through `offset` and `bit_position`
*/
#[derive(Debug)]
pub struct PdoEntryRegistration<'a> {
    pub alias: u16,
    pub position: u16,
    pub vendor_id: u32,
    pub product_code: u32,
    pub index: u16,
    pub subindex: u8,
    /// byte offset of the entry in the domain, set by the driver
    pub offset: &'a mut u32,
    /// bit offset of the entry in its byte, set by the driver
    pub bit_position: &'a mut u8,
}

/// progress of a parameter request
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RequestState {
    /// not yet triggered
    Unused,
    /// in progress
    Busy,
    /// terminated successfully, the data is available
    Success,
    /// terminated in error
    Error,
}

/**
    capabilities of a fieldbus master stack

    configuration methods return an error with no detail when the driver refuses the operation, the caller adds the context. Process image accessors address the domain by byte offset and bit position and exchange values in host order, decoded from the bus little-endian representation.
*/
pub trait Driver: Send + Sync {
    /// reserve the master for this application
    fn request(&self) -> EthercatResult;
    /// identity of the slave at the given position on the bus
    fn slave_info(&self, position: u16) -> EthercatResult<SlaveInfo>;
    /// create a configuration for the slave at the given address
    fn slave_config(&self, alias: u16, position: u16, vendor_id: u32, product_code: u32) -> EthercatResult<SlaveConfigHandle>;
    /// queue a parameter write, applied when the slave enters pre-operational state
    fn config_sdo(&self, config: SlaveConfigHandle, index: u16, subindex: u8, data: &[u8]) -> EthercatResult;
    fn config_sync_manager(&self, config: SlaveConfigHandle, sync: u8, direction: SyncDirection, watchdog: WatchdogMode) -> EthercatResult;
    fn clear_pdo_assign(&self, config: SlaveConfigHandle, sync: u8) -> EthercatResult;
    fn add_pdo_assign(&self, config: SlaveConfigHandle, sync: u8, pdo: u16) -> EthercatResult;
    fn clear_pdo_mapping(&self, config: SlaveConfigHandle, pdo: u16) -> EthercatResult;
    fn add_pdo_mapping(&self, config: SlaveConfigHandle, pdo: u16, index: u16, subindex: u8, bitsize: u8) -> EthercatResult;

    fn create_domain(&self) -> EthercatResult<DomainHandle>;
    /// register the given entries in the domain, and write back their offsets
    fn register_pdo_entries(&self, domain: DomainHandle, entries: &mut [PdoEntryRegistration<'_>]) -> EthercatResult;

    /// apply all configurations and start bringing slaves to operational state
    fn activate(&self) -> EthercatResult;
    /// start bringing slaves back to init state
    fn deactivate(&self);
    /// give the master back, all handles are invalidated
    fn release(&self);

    /// fetch received frames
    fn receive(&self);
    /// send queued frames
    fn send(&self);
    /// take the received process data in the domain
    fn process(&self, domain: DomainHandle);
    /// queue the domain process data for the next send
    fn queue(&self, domain: DomainHandle);

    fn master_state(&self) -> MasterState;
    fn domain_state(&self, domain: DomainHandle) -> DomainState;
    fn slave_config_state(&self, config: SlaveConfigHandle) -> SlaveConfigState;

    /// create a request object of `size` bytes for a slave configuration
    fn create_sdo_request(&self, config: SlaveConfigHandle, index: u16, subindex: u8, size: usize) -> EthercatResult<RequestHandle>;
    fn sdo_request_timeout(&self, request: RequestHandle, timeout: Duration);
    /// trigger an upload of the object
    fn sdo_request_read(&self, request: RequestHandle);
    /// copy `data` in the request and trigger a download of the object
    fn sdo_request_write(&self, request: RequestHandle, data: &[u8]);
    fn sdo_request_state(&self, request: RequestHandle) -> RequestState;
    /// copy the request data to `dst`, returning the number of bytes copied
    fn sdo_request_data(&self, request: RequestHandle, dst: &mut [u8]) -> usize;

    /// blocking upload of an object, returning the number of bytes read or the abort code
    fn sdo_upload(&self, position: u16, index: u16, subindex: u8, dst: &mut [u8]) -> EthercatResult<usize, u32>;
    /// blocking download of an object, failing with the abort code
    fn sdo_download(&self, position: u16, index: u16, subindex: u8, data: &[u8]) -> EthercatResult<(), u32>;

    fn read_bit(&self, domain: DomainHandle, offset: u32, bit: u8) -> bool;
    fn read_u8(&self, domain: DomainHandle, offset: u32) -> u8;
    fn read_u16(&self, domain: DomainHandle, offset: u32) -> u16;
    fn read_u32(&self, domain: DomainHandle, offset: u32) -> u32;
    fn read_u64(&self, domain: DomainHandle, offset: u32) -> u64;
    fn write_bit(&self, domain: DomainHandle, offset: u32, bit: u8, value: bool);
    fn write_u8(&self, domain: DomainHandle, offset: u32, value: u8);
    fn write_u16(&self, domain: DomainHandle, offset: u32, value: u16);
    fn write_u32(&self, domain: DomainHandle, offset: u32, value: u32);
    fn write_u64(&self, domain: DomainHandle, offset: u32, value: u64);
}
