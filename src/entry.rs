//! Entry model: the flat description of process data signals and startup parameters a session is built from.

use crate::driver::SyncDirection;
use core::fmt;


/**
    one PDO entry, or a bit padding slot when its `index` is `0`

    entries are meant to be listed by ascending position, then by sync manager, PDO and object, as produced by [crate::config::parse]. The builders group them explicitly so an unordered list still configures every slave, but the domain layout follows the list order.
*/
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SignalEntry {
    pub alias: u16,
    /// slave ordinal on the bus
    pub position: u16,
    pub vendor_id: u32,
    pub product_code: u32,

    /// sync manager the PDO is assigned to
    pub sync_index: u8,
    /// PDO containing the entry, `0` when the slave only needs its default configuration
    pub pdo_index: u16,
    /// object mapped, `0` for padding
    pub index: u16,
    pub subindex: u8,
    pub bitsize: u8,

    /// exchange this entry cyclically in the domain
    pub add_to_domain: bool,
    /// sync manager direction override, the conventional direction of the sync manager is used when `None`
    pub direction: Option<SyncDirection>,
    /// the value is big-endian on the bus
    pub swap_endian: bool,
    pub signed: bool,
    /// sync manager watchdog, the slave default is kept when `None`
    pub watchdog: Option<bool>,
}

impl SignalEntry {
    /// entry only identifying a slave, without mapping
    pub fn identity(alias: u16, position: u16, vendor_id: u32, product_code: u32) -> Self {
        Self {alias, position, vendor_id, product_code, .. Default::default()}
    }
    /// same entry in the given PDO
    pub fn pdo(self, sync_index: u8, pdo_index: u16) -> Self {
        Self {sync_index, pdo_index, .. self}
    }
    /// same entry mapping the given object
    pub fn object(self, index: u16, subindex: u8, bitsize: u8) -> Self {
        Self {index, subindex, bitsize, .. self}
    }
    pub fn in_domain(self) -> Self {Self {add_to_domain: true, .. self}}
    pub fn direction(self, direction: SyncDirection) -> Self {Self {direction: Some(direction), .. self}}
    pub fn swapped(self) -> Self {Self {swap_endian: true, .. self}}
    pub fn signed(self) -> Self {Self {signed: true, .. self}}
    pub fn watchdog(self, enabled: bool) -> Self {Self {watchdog: Some(enabled), .. self}}

    pub fn is_padding(&self) -> bool {self.index == 0}
    pub fn key(&self) -> DomainKey {DomainKey::new(self.position, self.index, self.subindex)}
}

/// parameter written to a slave before it enters operational state
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct StartupParameter {
    pub position: u16,
    pub index: u16,
    pub subindex: u8,
    /// bit size of the value, 8 and 16 select a byte or a word, anything else a double word
    pub bitsize: u8,
    pub value: u32,
}

impl StartupParameter {
    /// little-endian bytes of the value, truncated to its size
    pub fn bytes(&self) -> heapless::Vec<u8, 4> {
        let size = match self.bitsize {
            8 => 1,
            16 => 2,
            _ => 4,
            };
        self.value.to_le_bytes()[.. size].iter().copied().collect()
    }
}

/// address of an object in the process image: slave position, object index and subindex
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct DomainKey {
    pub position: u16,
    pub index: u16,
    pub subindex: u8,
}

impl DomainKey {
    pub const fn new(position: u16, index: u16, subindex: u8) -> Self {
        Self {position, index, subindex}
    }
}

impl From<(u16, u16, u8)> for DomainKey {
    fn from((position, index, subindex): (u16, u16, u8)) -> Self {
        Self::new(position, index, subindex)
    }
}

impl fmt::Display for DomainKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:#06x}:{:#04x}", self.position, self.index, self.subindex)
    }
}
