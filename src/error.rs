//! definition of the general ethercat error type, and the operation-specific errors it can carry

use std::sync::Arc;
use core::fmt;
use crate::{
    data::PackingError,
    entry::DomainKey,
    state::AlState,
    sdo::SdoAbortCode,
    };

/**
    failure of an operation on the bus, as reported by the driver or detected by this crate

    The variant tells who is responsible for the failure, and so how to recover from it. `T` is the operation-specific reason carried by [Self::Slave], `()` when the driver gave no detail.
*/
#[derive(Clone, Debug)]
pub enum EthercatError<T=()> {
    /// the operating system refused an operation, like opening a file or a device
    Io(Arc<std::io::Error>),

    /// the operation failed for a reason specific to it, see the operation documentation for the type of `T`
    ///
    /// the configuration or the call usually has to be fixed before retrying
    Slave(T),

    /// the master driver refused the operation or is in a state not allowing it
    Master(&'static str),

    /// the data exchanged with the driver or a slave is inconsistent
    ///
    /// the session cannot be trusted anymore and has to be rebuilt
    Protocol(&'static str),

    /// the operation did not complete in time, it can be retried
    Timeout(&'static str),
}

/// result of a bus operation, `E` is the operation-specific error
pub type EthercatResult<T=(), E=()> = core::result::Result<T, EthercatError<E>>;

impl<T: fmt::Debug> fmt::Display for EthercatError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(error) => write!(f, "io error: {}", error),
            Self::Slave(reason) => write!(f, "operation failed: {:?}", reason),
            Self::Master(message) => write!(f, "master error: {}", message),
            Self::Protocol(message) => write!(f, "protocol error: {}", message),
            Self::Timeout(message) => write!(f, "timeout: {}", message),
        }
    }
}

impl<T: fmt::Debug> std::error::Error for EthercatError<T> {}

impl<T> From<std::io::Error> for EthercatError<T> {
    fn from(error: std::io::Error) -> Self {Self::Io(Arc::new(error))}
}

impl<T> From<PackingError> for EthercatError<T> {
    fn from(error: PackingError) -> Self {
        match error {
            PackingError::BadSize(_, message) | PackingError::InvalidValue(message) => Self::Protocol(message),
        }
    }
}

// `From<T> for T` already exists, so converting the operation-specific type needs explicit methods
impl<E> EthercatError<E> {
    /// convert the error if the operation specific error type allows it
    pub fn into<F>(self) -> EthercatError<F>
    where F: From<E> {
        self.map(|e| F::from(e))
    }
    /// convert the error with a callback handling the case of operation-specific error
    pub fn map<F,T>(self, callback: F) -> EthercatError<T>
    where F: Fn(E) -> T
    {
        match self {
            EthercatError::Slave(value) => EthercatError::Slave(callback(value)),
            EthercatError::Io(e) => EthercatError::Io(e),
            EthercatError::Master(message) => EthercatError::Master(message),
            EthercatError::Protocol(message) => EthercatError::Protocol(message),
            EthercatError::Timeout(message) => EthercatError::Timeout(message),
        }
    }
}
impl EthercatError<()> {
    /// convert an error with no operation-specific type into an error with any operation-specific type
    pub fn upgrade<F>(self) -> EthercatError<F> {
        match self {
            EthercatError::Slave(()) => EthercatError::Master("driver reported an unspecified failure"),
            EthercatError::Io(e) => EthercatError::Io(e),
            EthercatError::Master(message) => EthercatError::Master(message),
            EthercatError::Protocol(message) => EthercatError::Protocol(message),
            EthercatError::Timeout(message) => EthercatError::Timeout(message),
        }
    }
    /// give an operation-specific meaning to an unspecified failure, other errors are kept
    pub fn context<F>(self, error: F) -> EthercatError<F> {
        match self {
            EthercatError::Slave(()) => EthercatError::Slave(error),
            other => other.upgrade(),
        }
    }
}


/**
    reasons for a session to fail building its slave configurations, mappings or domain.

    These represent a mismatch between the declared and the actual bus topology, so a session reporting one of them cannot be used.
*/
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// the master could not be requested
    Master,
    /// the declarative configuration is malformed
    Invalid(String),
    /// no slave is answering at this position
    SlaveInfo {position: u16},
    /// the driver refused to create a configuration for this slave
    SlaveConfig {position: u16},
    /// a startup parameter references a position with no slave configuration
    UnknownSlave {position: u16},
    /// a startup parameter could not be queued
    StartupParameter {position: u16, index: u16, subindex: u8},
    SyncManager {position: u16, sync: u8},
    PdoAssign {position: u16, sync: u8, pdo: u16},
    PdoMapping {position: u16, sync: u8, pdo: u16, index: u16, subindex: u8, bitsize: u8},
    /// the same object is registered twice in the domain
    DuplicateEntry(DomainKey),
    /// the driver could not create the process data domain
    Domain,
    /// the driver could not register the domain entries
    Registration,
    /// the master could not be activated
    Activation,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Master => write!(f, "cannot request master"),
            Self::Invalid(message) => write!(f, "invalid configuration: {}", message),
            Self::SlaveInfo {position} => write!(f, "cannot get slave {} info", position),
            Self::SlaveConfig {position} => write!(f, "cannot configure slave {}", position),
            Self::UnknownSlave {position} => write!(f, "no slave configured at position {}", position),
            Self::StartupParameter {position, index, subindex} =>
                write!(f, "cannot queue startup parameter {:#06x}:{:#04x} for slave {}", index, subindex, position),
            Self::SyncManager {position, sync} =>
                write!(f, "cannot configure SM. slave {} SM{}", position, sync),
            Self::PdoAssign {position, sync, pdo} =>
                write!(f, "cannot configure PDO assign. slave {} SM{} {:#06x}", position, sync, pdo),
            Self::PdoMapping {position, sync, pdo, index, subindex, bitsize} =>
                write!(f, "cannot add PDO mapping. slave {} SM{} {:#06x} {:#06x}:{:#04x} {}", position, sync, pdo, index, subindex, bitsize),
            Self::DuplicateEntry(key) => write!(f, "domain entry {} registered twice", key),
            Self::Domain => write!(f, "cannot create domain"),
            Self::Registration => write!(f, "PDO entry registration failed"),
            Self::Activation => write!(f, "cannot activate master"),
        }
    }
}
impl std::error::Error for ConfigError {}

/// reasons for a domain access to be refused
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DomainError {
    /// the master is not in operational state, so the process image is not exchanged
    NotOperational,
    /// no domain slot is registered for this key
    Unmapped(DomainKey),
    /// the slot is an input, writing to it has no effect on the bus
    NotOutput(DomainKey),
    /// the slot bit size cannot be exchanged, so it has no value
    Unsupported(DomainKey),
}

impl fmt::Display for DomainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotOperational => write!(f, "master is not operational"),
            Self::Unmapped(key) => write!(f, "no domain entry for {}", key),
            Self::NotOutput(key) => write!(f, "domain entry {} is not an output", key),
            Self::Unsupported(key) => write!(f, "domain entry {} has an unsupported size", key),
        }
    }
}
impl std::error::Error for DomainError {}

/**
    reasons for a parameter request to fail, when the communication itself did not fail

    a request still busy after its timeout is reported as [EthercatError::Timeout]
*/
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SdoError {
    /// no slave configuration exists at the requested position
    SlaveNotFound,
    /// the slave did not leave its initial state
    SlaveNotReady(AlState),
    /// the request ended in error state
    Failed,
    /// the slave aborted the transfer with this code, see [SdoAbortCode] for known codes
    Aborted(u32),
}

impl SdoError {
    /// human readable reason of the failure, when the abort code is a known one
    pub fn reason(&self) -> Option<&'static str> {
        match self {
            Self::Aborted(code) => SdoAbortCode::try_from(*code).ok().map(SdoAbortCode::message),
            _ => None,
        }
    }
}
