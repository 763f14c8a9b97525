/*!
    The session: everything built at startup from the declared slaves, and shared by the cyclic task and the callers until teardown.

    A [Session] owns the driver, the slave configurations and the process data domain. It is built in one go by [Session::new], which either returns a session ready for activation or fails with the [ConfigError] explaining why the bus does not match the declaration.

    # Example

    ```ignore
    let (entries, parameters) = config::load("slaves.json")?;
    let session = Arc::new(Session::new(driver, Arc::new(MonotonicClock), SessionConfig::default(), entries, parameters)?);
    let (cycle, mut data) = cyclic::start(session.clone())?;

    // from any thread
    session.domain_write_as(2, 0x7000, 1, 5u8)?;
    let status = session.domain_read(2, 0x6000, 1)?;
    let serial = session.sdo_read::<u32>(2, 0x1018, 4)?;
    ```
*/

use crate::{
    clock::Clock,
    config::SessionConfig,
    cyclic::CycleData,
    data::{self, PduData, Value},
    domain::{Domain, DomainSlot},
    driver::Driver,
    entry::{SignalEntry, StartupParameter, DomainKey},
    error::{EthercatError, EthercatResult, ConfigError, DomainError, SdoError},
    mapping::{self, SlaveConfiguration, Config, fatal},
    sdo::{self, ParameterRequest, SdoBuffer},
    state::MasterState,
    };
use core::{
    sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering::*},
    time::Duration,
    };
use std::sync::{Arc, Mutex, MutexGuard};


/// delay between two polls of the master state while waiting for deactivation
const DEACTIVATION_POLL: Duration = Duration::from_micros(500);

/**
    a running configuration of the bus

    All its methods take `&self`, so it is meant to be shared in an [Arc] between the cyclic task started by [crate::cyclic::start] and the callers.
*/
pub struct Session<D: Driver> {
    driver: D,
    clock: Arc<dyn Clock>,
    config: SessionConfig,
    slaves: Vec<SlaveConfiguration>,
    domain: Domain,

    /// last observed master state, packed
    master: AtomicU64,
    /// all slave configurations were operational at last refresh
    slaves_operational: AtomicBool,
    /// cycles left before the next full state refresh
    counter: AtomicU32,
    active: AtomicBool,
    released: AtomicBool,
    /// held while a cycle runs, and while the master is released
    exchange: Mutex<()>,
}

impl<D: Driver> Session<D> {
    /**
        request the master, configure the slaves, their mappings and startup parameters, then build the domain

        The entries and parameters are consumed, their content now lives in the slave configurations and the domain. The master is released if any step fails.
    */
    pub fn new(
        driver: D,
        clock: Arc<dyn Clock>,
        config: SessionConfig,
        mut entries: Vec<SignalEntry>,
        parameters: Vec<StartupParameter>,
        ) -> EthercatResult<Self, ConfigError>
    {
        log::info!("requesting master");
        fatal(driver.request(), ConfigError::Master)?;

        let built = (|| -> EthercatResult<_, ConfigError> {
            let slaves = mapping::build_slaves(&driver, &entries)?;
            Config::group(&entries).apply(&driver, &slaves)?;
            mapping::apply_parameters(&driver, &slaves, &parameters)?;
            let domain = Domain::build(&driver, &mut entries)?;
            Ok((slaves, domain))
        })();
        let (slaves, domain) = match built {
            Ok(built) => built,
            Err(err) => {
                driver.release();
                return Err(err);
            },
        };
        log::info!("master and domain initialized: {} slaves, {} domain entries", slaves.len(), domain.len());

        Ok(Self {
            driver,
            clock,
            config,
            slaves,
            domain,
            master: AtomicU64::new(MasterState::default().pack()),
            slaves_operational: AtomicBool::new(false),
            counter: AtomicU32::new(0),
            active: AtomicBool::new(false),
            released: AtomicBool::new(false),
            exchange: Mutex::new(()),
        })
    }

    pub fn driver(&self) -> &D {&self.driver}
    pub fn clock(&self) -> &dyn Clock {&*self.clock}
    pub fn config(&self) -> &SessionConfig {&self.config}
    pub fn slaves(&self) -> &[SlaveConfiguration] {&self.slaves}
    pub fn domain(&self) -> &Domain {&self.domain}

    /// apply the configuration to the bus and start bringing slaves to operational state
    pub fn activate(&self) -> EthercatResult<(), ConfigError> {
        log::info!("activating master");
        fatal(self.driver.activate(), ConfigError::Activation)?;
        self.counter.store(0, Relaxed);
        self.active.store(true, Release);
        Ok(())
    }
    pub fn is_active(&self) -> bool {self.active.load(Acquire)}

    /**
        run one exchange cycle: receive, process, refresh states, exchange the domain if operational, queue and send

        the full state refresh only happens once every [SessionConfig::frequency] cycles, the domain state is refreshed every cycle.
        Only one thread must run cycles at a time. Once the master is released, cycles no longer reach the driver and return empty data.
    */
    pub fn cycle(&self) -> CycleData {
        let _exchange = self.lock_exchange();
        if self.released.load(Acquire)
            {return CycleData::default()}
        let handle = self.domain.handle();
        self.driver.receive();
        self.driver.process(handle);
        self.domain.refresh(&self.driver);

        match self.counter.load(Relaxed) {
            0 => {
                self.counter.store(self.config.frequency() - 1, Relaxed);
                self.refresh_master();
                self.refresh_slaves();
            },
            left => self.counter.store(left - 1, Relaxed),
        }

        let operational = self.is_operational();
        if operational {
            let skipped = self.domain.exchange(&self.driver);
            if skipped != 0
                {log::trace!("{} domain entries not exchanged", skipped)}
        }

        self.driver.queue(handle);
        self.driver.send();

        CycleData {
            slots: if operational {self.domain.snapshot()} else {Vec::new()},
            states: self.master_state().al_states,
        }
    }

    /// read the master state from the driver, and log its changes
    pub fn refresh_master(&self) -> MasterState {
        let new = self.driver.master_state();
        let old = MasterState::unpack(self.master.swap(new.pack(), AcqRel));
        if old.slaves_responding != new.slaves_responding
            {log::info!("{} slave(s)", new.slaves_responding)}
        if old.al_states != new.al_states
            {log::info!("AL states: {:#04x} {}", new.al_states.bits(), new.al_states)}
        if old.link_up != new.link_up
            {log::info!("link is {}", if new.link_up {"up"} else {"down"})}
        new
    }
    /// read the state of every slave configuration from the driver, returns whether they are all operational
    pub fn refresh_slaves(&self) -> bool {
        let operational = self.slaves.iter()
            .fold(true, |operational, slave| slave.refresh(&self.driver).operational && operational);
        self.slaves_operational.store(operational, Release);
        operational
    }

    /// master state observed at the last refresh
    pub fn master_state(&self) -> MasterState {MasterState::unpack(self.master.load(Acquire))}
    /// union of the slaves application-layer states at the last refresh, as a bitmask
    pub fn application_layer_states(&self) -> u8 {self.master_state().al_states.bits()}
    /// the master reported the operational state at the last refresh, so the domain is exchanged
    pub fn is_operational(&self) -> bool {self.master_state().operational()}
    /// the master and all slave configurations were operational at the last refresh
    pub fn operational_status(&self) -> bool {
        self.is_operational() && self.slaves_operational.load(Acquire)
    }

    fn operational_slot(&self, position: u16, index: u16, subindex: u8) -> Result<&DomainSlot, DomainError> {
        if ! self.is_operational() {
            log::warn!("master is not operational");
            return Err(DomainError::NotOperational);
        }
        let key = DomainKey::new(position, index, subindex);
        self.domain.slot(key).ok_or_else(|| {
            log::warn!("no domain entry for {}", key);
            DomainError::Unmapped(key)
        })
    }

    /**
        stage a raw value for the given output, it is sent to the slave at the next cycle

        the value is written as is, only read values are byte-swapped
    */
    pub fn domain_write(&self, position: u16, index: u16, subindex: u8, value: u64) -> Result<(), DomainError> {
        let slot = self.operational_slot(position, index, subindex)?;
        if ! slot.is_output()
            {return Err(DomainError::NotOutput(slot.key))}
        slot.stage(value);
        Ok(())
    }
    /// value of the given object read at the last cycle
    pub fn domain_read(&self, position: u16, index: u16, subindex: u8) -> Result<Value, DomainError> {
        let slot = self.operational_slot(position, index, subindex)?;
        slot.value().ok_or(DomainError::Unsupported(slot.key))
    }
    /// stage a typed value for the given output
    pub fn domain_write_as<T: PduData>(&self, position: u16, index: u16, subindex: u8, value: T) -> Result<(), DomainError> {
        self.domain_write(position, index, subindex, value.to_raw())
    }
    /// value of the given object read at the last cycle, reinterpreted as `T`
    pub fn domain_read_as<T: PduData>(&self, position: u16, index: u16, subindex: u8) -> Result<T, DomainError> {
        let slot = self.operational_slot(position, index, subindex)?;
        if ! data::supported(slot.bitsize)
            {return Err(DomainError::Unsupported(slot.key))}
        Ok(T::from_raw(slot.raw()))
    }

    /// parameter requests engine on this session's slaves
    pub fn requests(&self) -> ParameterRequest<'_, D> {
        ParameterRequest::new(&self.driver, &*self.clock, &self.slaves)
    }
    /// read `size` bytes of an object through a parameter request
    pub fn parameter_read(&self, position: u16, index: u16, subindex: u8, size: usize, timeout: Duration) -> EthercatResult<SdoBuffer, SdoError> {
        let mut buffer = SdoBuffer::new();
        buffer.resize_default(size)
            .map_err(|_| EthercatError::Protocol("parameter request too big"))?;
        self.requests().read(position, index, subindex, &mut buffer, timeout)?;
        Ok(buffer)
    }
    /// write the bytes of an object through a parameter request
    pub fn parameter_write(&self, position: u16, index: u16, subindex: u8, data: &[u8], timeout: Duration) -> EthercatResult<(), SdoError> {
        if data.len() > sdo::MAX_REQUEST_SIZE
            {return Err(EthercatError::Protocol("parameter request too big"))}
        self.requests().write(position, index, subindex, data, timeout)
    }
    /// read a typed object through a parameter request, with the default timeout
    pub fn parameter_read_as<T: PduData>(&self, position: u16, index: u16, subindex: u8) -> EthercatResult<T, SdoError> {
        let buffer = self.parameter_read(position, index, subindex, T::packed_size(), self.config.sdo_timeout)?;
        Ok(T::unpack(&buffer)?)
    }
    /// write a typed object through a parameter request, with the default timeout
    pub fn parameter_write_as<T: PduData>(&self, position: u16, index: u16, subindex: u8, value: T) -> EthercatResult<(), SdoError> {
        let mut buffer = [0; 8];
        let size = T::packed_size();
        value.pack(&mut buffer[.. size])?;
        self.parameter_write(position, index, subindex, &buffer[.. size], self.config.sdo_timeout)
    }

    /// blocking upload of an object directly from the slave at the given position, returns the number of bytes read
    pub fn sdo_upload(&self, position: u16, index: u16, subindex: u8, dst: &mut [u8]) -> EthercatResult<usize, SdoError> {
        self.driver.sdo_upload(position, index, subindex, dst)
            .map_err(|e| e.map(|code| {
                sdo::report_abort(position, index, subindex, code);
                SdoError::Aborted(code)
            }))
    }
    /// blocking download of an object directly to the slave at the given position
    pub fn sdo_download(&self, position: u16, index: u16, subindex: u8, data: &[u8]) -> EthercatResult<(), SdoError> {
        self.driver.sdo_download(position, index, subindex, data)
            .map_err(|e| e.map(|code| {
                sdo::report_abort(position, index, subindex, code);
                SdoError::Aborted(code)
            }))
    }
    pub fn sdo_read<T: PduData>(&self, position: u16, index: u16, subindex: u8) -> EthercatResult<T, SdoError> {
        let mut buffer = [0; 8];
        let size = T::packed_size();
        self.sdo_upload(position, index, subindex, &mut buffer[.. size])?;
        Ok(T::unpack(&buffer[.. size])?)
    }
    pub fn sdo_write<T: PduData>(&self, position: u16, index: u16, subindex: u8, value: T) -> EthercatResult<(), SdoError> {
        let mut buffer = [0; 8];
        let size = T::packed_size();
        value.pack(&mut buffer[.. size])?;
        self.sdo_download(position, index, subindex, &buffer[.. size])
    }
    /// read a string object of at most `size` bytes, it ends at the first NUL byte
    pub fn sdo_read_string(&self, position: u16, index: u16, subindex: u8, size: usize) -> EthercatResult<String, SdoError> {
        let mut buffer = vec![0; size];
        let read = self.sdo_upload(position, index, subindex, &mut buffer)?;
        let text = &buffer[.. read.min(size)];
        let end = text.iter().position(|&b| b == 0).unwrap_or(text.len());
        Ok(String::from_utf8_lossy(&text[.. end]).into_owned())
    }

    /**
        bring the bus back from operational state and release the master

        blocks until the master does not report the operational state anymore. The session cannot be used after, this is called on drop if needed.
    */
    pub fn deactivate(&self) {
        if self.active.swap(false, AcqRel) {
            self.driver.deactivate();
            log::info!("waiting for master deactivation");
            while self.refresh_master().operational() {
                self.clock.sleep_until(self.clock.now() + DEACTIVATION_POLL);
            }
        }
        let _exchange = self.lock_exchange();
        if ! self.released.swap(true, AcqRel) {
            self.master.store(MasterState::default().pack(), Release);
            self.slaves_operational.store(false, Release);
            self.counter.store(0, Relaxed);
            self.domain.reset();
            for slave in &self.slaves
                {slave.reset()}
            self.driver.release();
            log::info!("stopped");
        }
    }

    fn lock_exchange(&self) -> MutexGuard<'_, ()> {
        self.exchange.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<D: Driver> Drop for Session<D> {
    fn drop(&mut self) {self.deactivate()}
}

impl<D: Driver> core::fmt::Debug for Session<D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Session")
            .field("slaves", &self.slaves.len())
            .field("domain", &self.domain.len())
            .field("master", &self.master_state())
            .field("active", &self.is_active())
            .finish()
    }
}
