/*!
    Observable states of the master, the slave configurations and the process data domain.

    These are the values the driver reports when polled. The session caches the last observed ones, so that callers can inspect them without touching the driver.
*/

use bilge::prelude::*;
use core::fmt;


/**
    application-layer state of a slave, as defined in ETG.1000.6

    The numeric values are the ones of the AL status register, each state being one bit except [Self::Bootstrap].
*/
#[bitsize(4)]
#[derive(TryFromBits, Debug, Copy, Clone, Eq, PartialEq)]
pub enum AlState {
    /// the slave is booting up and ready for nothing yet, only registers can be used
    Init = 1,
    /// mailbox communication is allowed, so parameters requests are possible
    PreOperational = 2,
    /// transitional state for firmware update
    Bootstrap = 3,
    /// inputs are exchanged, outputs sent to the slave are ignored
    SafeOperational = 4,
    /// inputs and outputs are exchanged
    Operational = 8,
}

impl AlState {
    /// decode a raw AL status value, the error bit and upper bits are ignored
    pub fn from_code(code: u8) -> Option<Self> {
        Self::try_from(u4::new(code & 0x0f)).ok()
    }
    pub fn code(self) -> u8 {
        u4::from(self).value()
    }
}

/**
    union of the states of every slave answering on the bus, as the master reports it

    several flags can be set at the same time when slaves are not all in the same state
*/
#[bitsize(4)]
#[derive(FromBits, DebugBits, Copy, Clone, Eq, PartialEq)]
pub struct AlMixedState {
    /// one slave at least is in [AlState::Init]
    pub init: bool,
    /// one slave at least is in [AlState::PreOperational]
    pub pre_operational: bool,
    /// one slave at least is in [AlState::SafeOperational]
    pub safe_operational: bool,
    /// one slave at least is in [AlState::Operational]
    pub operational: bool,
}

impl AlMixedState {
    /// build from the bitmask reported by the master, upper bits are ignored
    pub fn from_bits(bits: u8) -> Self {
        Self::from(u4::new(bits & 0x0f))
    }
    /// the bitmask as reported by the master
    pub fn bits(self) -> u8 {
        u4::from(self).value()
    }
}

impl Default for AlMixedState {
    fn default() -> Self {Self::from_bits(0)}
}

impl From<AlState> for AlMixedState {
    fn from(state: AlState) -> Self {
        Self::from(u4::from(state))
    }
}

impl fmt::Display for AlMixedState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{{")?;
        for (active, mark) in [ (self.init(), "init"),
                                (self.pre_operational(), "pre"),
                                (self.safe_operational(), "safe"),
                                (self.operational(), "op"),
                                ] {
            write!(f, " ")?;
            if active {
                write!(f, "{}", mark)?;
            } else {
                for _ in 0 .. mark.len() {write!(f, " ")?;}
            }
        }
        write!(f, " }}")?;
        Ok(())
    }
}


/// state of the whole segment as seen by the master
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct MasterState {
    /// number of slaves answering to the last frames
    pub slaves_responding: u32,
    /// union of the slaves application-layer states
    pub al_states: AlMixedState,
    /// whether the master network link is up
    pub link_up: bool,
}

impl MasterState {
    pub fn operational(&self) -> bool {self.al_states.operational()}

    pub(crate) fn pack(self) -> u64 {
        u64::from(self.slaves_responding)
            | (u64::from(self.al_states.bits()) << 32)
            | (u64::from(self.link_up) << 40)
    }
    pub(crate) fn unpack(packed: u64) -> Self {
        Self {
            slaves_responding: packed as u32,
            al_states: AlMixedState::from_bits((packed >> 32) as u8),
            link_up: packed & (1<<40) != 0,
        }
    }
}

/// state of one slave configuration as seen by the master
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct SlaveConfigState {
    /// the slave is answering on the bus
    pub online: bool,
    /// the slave reached the operational state with this configuration
    pub operational: bool,
    /// raw AL status of the slave, `0` when unknown
    pub al_state: u8,
}

impl SlaveConfigState {
    pub fn state(&self) -> Option<AlState> {AlState::from_code(self.al_state)}

    // packed forms share the states between the cyclic task and callers without locking
    pub(crate) fn pack(self) -> u16 {
        u16::from(self.al_state)
            | (u16::from(self.online) << 8)
            | (u16::from(self.operational) << 9)
    }
    pub(crate) fn unpack(packed: u16) -> Self {
        Self {
            al_state: (packed & 0xff) as u8,
            online: packed & (1<<8) != 0,
            operational: packed & (1<<9) != 0,
        }
    }
}

/// validity of the data received in the last frame, deduced from the working counter
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum WcState {
    /// no registered process data was exchanged
    #[default]
    Zero,
    /// some of the registered process data was exchanged
    Incomplete,
    /// all registered process data was exchanged
    Complete,
}

/// state of the process data domain after processing the last frame
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct DomainState {
    pub working_counter: u32,
    pub wc_state: WcState,
}

impl DomainState {
    pub(crate) fn pack(self) -> u64 {
        u64::from(self.working_counter) | (match self.wc_state {
            WcState::Zero => 0u64,
            WcState::Incomplete => 1,
            WcState::Complete => 2,
            } << 32)
    }
    pub(crate) fn unpack(packed: u64) -> Self {
        Self {
            working_counter: packed as u32,
            wc_state: match packed >> 32 {
                1 => WcState::Incomplete,
                2 => WcState::Complete,
                _ => WcState::Zero,
                },
        }
    }
}
