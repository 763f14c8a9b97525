/*!
    Parameter requests: addressed reads and writes of one object in a slave dictionnary, outside of the cyclic exchange.

    A request is driven through the driver's request object until it succeeds, fails, or stays busy longer than its timeout. The calling thread is blocked meanwhile, polling the request and relaxing the [Clock] between polls.

    Only one request at a time can be in flight on a slave configuration, concurrent callers on the same slave are serialized.

    # Example

    ```ignore
    let requests = ParameterRequest::new(&driver, &clock, &slaves);
    let mut value = [0; 2];
    requests.read(2, 0x6041, 0, &mut value, Duration::from_millis(100))?;
    ```
*/

use crate::{
    clock::Clock,
    driver::{Driver, RequestState, RequestHandle},
    error::{EthercatError, EthercatResult, SdoError},
    mapping::{SlaveConfiguration, find_slave},
    state::AlState,
    };
use bilge::prelude::*;
use core::time::Duration;


/// largest object a parameter request can transfer
pub const MAX_REQUEST_SIZE: usize = 255;
/// buffer holding the data of a parameter request
pub type SdoBuffer = heapless::Vec<u8, MAX_REQUEST_SIZE>;


/// data transfered by a request
enum Transfer<'b> {
    /// upload the object to this buffer
    Read(&'b mut [u8]),
    /// download this buffer to the object
    Write(&'b [u8]),
}
impl Transfer<'_> {
    fn size(&self) -> usize {
        match self {
            Self::Read(data) => data.len(),
            Self::Write(data) => data.len(),
        }
    }
}

/**
    engine issuing parameter requests on the slaves of a session

    It borrows everything it needs, so it is cheap to build for each request.
*/
pub struct ParameterRequest<'a, D: Driver + ?Sized> {
    driver: &'a D,
    clock: &'a dyn Clock,
    slaves: &'a [SlaveConfiguration],
}

impl<'a, D: Driver + ?Sized> ParameterRequest<'a, D> {
    pub fn new(driver: &'a D, clock: &'a dyn Clock, slaves: &'a [SlaveConfiguration]) -> Self {
        Self {driver, clock, slaves}
    }

    /// read `dst.len()` bytes of an object
    pub fn read(&self, position: u16, index: u16, subindex: u8, dst: &mut [u8], timeout: Duration) -> EthercatResult<(), SdoError> {
        self.transfer(position, index, subindex, Transfer::Read(dst), timeout)
    }
    /// write the bytes of an object
    pub fn write(&self, position: u16, index: u16, subindex: u8, src: &[u8], timeout: Duration) -> EthercatResult<(), SdoError> {
        self.transfer(position, index, subindex, Transfer::Write(src), timeout)
    }

    fn transfer(&self, position: u16, index: u16, subindex: u8, mut data: Transfer<'_>, timeout: Duration) -> EthercatResult<(), SdoError> {
        let slave = match find_slave(self.slaves, position) {
            Some(slave) => slave,
            None => {
                log::error!("slave {} does not exist ({} configured)", position, self.slaves.len());
                return Err(EthercatError::Slave(SdoError::SlaveNotFound));
            },
        };
        let _guard = slave.lock();

        let state = slave.refresh(self.driver);
        log::trace!("slave {} {:#06x}:{:02x} - online {} | op {} | state {:#04x}",
            position, index, subindex, state.online, state.operational, state.al_state);
        // requests created on a slave still in init never leave the busy state
        if state.state() == Some(AlState::Init) {
            log::error!("slave {} {:#06x}:{:02x} is in init state", position, index, subindex);
            return Err(EthercatError::Slave(SdoError::SlaveNotReady(AlState::Init)));
        }

        let request = self.driver.create_sdo_request(slave.handle, index, subindex, data.size())
            .map_err(|e| {
                log::error!("slave {}: cannot create parameter request: {}", position, e);
                e.context(SdoError::Failed)
            })?;
        self.driver.sdo_request_timeout(request, timeout);
        self.trigger(request, &data);

        let start = self.clock.now();
        let expired = || self.clock.now().saturating_sub(start) > timeout;
        loop {
            match self.driver.sdo_request_state(request) {
                RequestState::Unused => {
                    if expired() {
                        log::error!("slave {} {:#06x}:{:02x}: timeout waiting for request to start", position, index, subindex);
                        return Err(EthercatError::Timeout("parameter request never started"));
                    }
                    log::warn!("slave {} {:#06x}:{:02x}: unused request, triggering again", position, index, subindex);
                    self.trigger(request, &data);
                    self.clock.relax();
                },
                RequestState::Busy => {
                    if expired() {
                        log::error!("slave {} {:#06x}:{:02x}: timeout waiting for busy request", position, index, subindex);
                        return Err(EthercatError::Timeout("parameter request still busy"));
                    }
                    self.clock.relax();
                },
                RequestState::Success => {
                    if let Transfer::Read(dst) = &mut data {
                        let size = self.driver.sdo_request_data(request, dst);
                        if size < dst.len()
                            {log::warn!("slave {} {:#06x}:{:02x}: only {} bytes uploaded", position, index, subindex, size)}
                    }
                    return Ok(());
                },
                RequestState::Error => {
                    log::error!("slave {} {:#06x}:{:02x}: request failed", position, index, subindex);
                    return Err(EthercatError::Slave(SdoError::Failed));
                },
            }
        }
    }

    fn trigger(&self, request: RequestHandle, data: &Transfer<'_>) {
        match data {
            Transfer::Read(_) => self.driver.sdo_request_read(request),
            Transfer::Write(src) => self.driver.sdo_request_write(request, src),
        }
    }
}

/// log the abort code of a failed transfer, with its meaning when known
pub(crate) fn report_abort(position: u16, index: u16, subindex: u8, code: u32) {
    match SdoAbortCode::try_from(code) {
        Ok(known) => log::warn!("slave {} {:#06x}:{:02x}: {:#010x} - {}", position, index, subindex, code, known.message()),
        Err(_) => log::warn!("slave {} {:#06x}:{:02x}: {:#010x}", position, index, subindex, code),
    }
}


/// abort codes a slave can answer a parameter transfer with, as defined in ETG.1000.6
#[bitsize(32)]
#[derive(TryFromBits, Debug, Copy, Clone, Eq, PartialEq)]
pub enum SdoAbortCode {
    BadToggle = 0x05_03_00_00,
    Timeout = 0x05_04_00_00,
    UnsupportedCommand = 0x05_04_00_01,
    OutOfMemory = 0x05_04_00_05,
    UnsupportedAccess = 0x06_01_00_00,
    WriteOnly = 0x06_01_00_01,
    ReadOnly = 0x06_01_00_02,
    /// SI0 must be 0 for write access
    WriteError = 0x06_01_00_03,
    /// complete access to objects of variable length
    VariableLength = 0x06_01_00_04,
    ObjectTooBig = 0x06_01_00_05,
    /// object mapped to an RxPDO
    LockedByPdo = 0x06_01_00_06,
    InvalidIndex = 0x06_02_00_00,
    CannotMap = 0x06_04_00_41,
    PdoTooSmall = 0x06_04_00_42,
    IncompatibleParameter = 0x06_04_00_43,
    IncompatibleDevice = 0x06_04_00_47,
    HardwareError = 0x06_06_00_00,
    InvalidLength = 0x06_07_00_10,
    ServiceTooBig = 0x06_07_00_12,
    ServiceTooSmall = 0x06_07_00_13,
    InvalidSubIndex = 0x06_09_00_11,
    /// only for write access
    ValueOutOfRange = 0x06_09_00_30,
    ValueTooHigh = 0x06_09_00_31,
    ValueTooLow = 0x06_09_00_32,
    InvalidRange = 0x06_09_00_36,
    GeneralError = 0x08_00_00_00,
    /// general code when no further detail can be determined
    Refused = 0x08_00_00_20,
    ApplicationRefused = 0x08_00_00_21,
    StateRefused = 0x08_00_00_22,
    DictionnaryEmpty = 0x08_00_00_23,
}

impl SdoAbortCode {
    /// human readable reason
    pub fn message(self) -> &'static str {
        match self {
            Self::BadToggle => "Toggle bit not changed",
            Self::Timeout => "SDO protocol timeout",
            Self::UnsupportedCommand => "Client/Server command specifier not valid or unknown",
            Self::OutOfMemory => "Out of memory",
            Self::UnsupportedAccess => "Unsupported access to an object",
            Self::WriteOnly => "Attempt to read a write-only object",
            Self::ReadOnly => "Attempt to write a read-only object",
            Self::WriteError => "Subindex cannot be written, SI0 must be 0 for write access",
            Self::VariableLength => "Complete access not supported for objects of variable length",
            Self::ObjectTooBig => "Object length exceeds mailbox size",
            Self::LockedByPdo => "Object mapped to RxPDO, download blocked",
            Self::InvalidIndex => "This object does not exist in the object directory",
            Self::CannotMap => "The object cannot be mapped into the PDO",
            Self::PdoTooSmall => "The number and length of the objects to be mapped would exceed the PDO length",
            Self::IncompatibleParameter => "General parameter incompatibility reason",
            Self::IncompatibleDevice => "General internal incompatibility in device",
            Self::HardwareError => "Access failure due to a hardware error",
            Self::InvalidLength => "Data type does not match, length of service parameter does not match",
            Self::ServiceTooBig => "Data type does not match, length of service parameter too high",
            Self::ServiceTooSmall => "Data type does not match, length of service parameter too low",
            Self::InvalidSubIndex => "Subindex does not exist",
            Self::ValueOutOfRange => "Value range of parameter exceeded",
            Self::ValueTooHigh => "Value of parameter written too high",
            Self::ValueTooLow => "Value of parameter written too low",
            Self::InvalidRange => "Maximum value is less than minimum value",
            Self::GeneralError => "General error",
            Self::Refused => "Data cannot be transferred or stored to the application",
            Self::ApplicationRefused => "Data cannot be transferred or stored to the application because of local control",
            Self::StateRefused => "Data cannot be transferred or stored to the application because of the present device state",
            Self::DictionnaryEmpty => "Object dictionary dynamic generation fails or no object dictionary is present",
        }
    }
    pub fn object_related(self) -> bool   {u32::from(self) >> 24 == 0x06}
    pub fn device_related(self) -> bool   {u32::from(self) >> 24 == 0x08}
    pub fn protocol_related(self) -> bool {u32::from(self) >> 24 == 0x05}
}
