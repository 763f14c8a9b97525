/*!
    Process data and parameter engine for EtherCAT masters.

    A [Session] is built from a flat list of [SignalEntry] describing the slaves, their sync managers, PDOs and mapped objects. It configures the slaves through a [Driver], registers the process data [Domain], and is then exchanged cyclically by the task started with [cyclic::start]. Callers read and write domain objects by `(position, index, subindex)`, and reach slave dictionaries with blocking parameter requests.

    [sim] provides an in-memory driver and clock to run sessions without hardware.
*/

pub mod error;
pub mod state;
pub mod data;
pub mod driver;
pub mod entry;
pub mod config;
pub mod mapping;
pub mod domain;
pub mod sdo;
pub mod clock;
pub mod master;
pub mod cyclic;
pub mod sim;

pub use crate::error::{EthercatError, EthercatResult, ConfigError, DomainError, SdoError};
pub use crate::state::{AlState, AlMixedState, MasterState, SlaveConfigState, DomainState, WcState};
pub use crate::data::{PduData, Value};
pub use crate::driver::*;
pub use crate::entry::{SignalEntry, StartupParameter, DomainKey};
pub use crate::config::SessionConfig;
pub use crate::domain::{Domain, DomainSlot, DomainIndex, SlotSnapshot};
pub use crate::sdo::{ParameterRequest, SdoAbortCode, SdoBuffer};
pub use crate::clock::{Clock, MonotonicClock};
pub use crate::master::Session;
pub use crate::cyclic::{CycleData, CycleHandle};
