/*!
    Process data domain: the slots exchanged cyclically with the slaves, and their lookup table.

    Each [DomainSlot] holds the last value read from the bus and the value staged by callers for the next output. Both are atomics: the cyclic task is the only writer of the read value and the only reader of the staged value, callers do the opposite. Concurrent writers of the same slot are not coordinated, the last store wins.

    The layout of the domain is decided by the driver at registration, the slots only know their byte offset and bit position in it.
*/

use crate::{
    data::{self, Value},
    driver::{Driver, DomainHandle, PdoEntryRegistration, SyncDirection},
    entry::{SignalEntry, DomainKey},
    error::{EthercatError, EthercatResult, ConfigError},
    mapping::fatal,
    state::DomainState,
    };
use core::sync::atomic::{AtomicU64, Ordering::*};
use std::collections::HashMap;


/// one object exchanged in the domain
#[derive(Debug)]
pub struct DomainSlot {
    pub key: DomainKey,
    pub bitsize: u8,
    pub direction: SyncDirection,
    pub swap_endian: bool,
    pub signed: bool,
    /// byte offset in the domain
    pub offset: u32,
    /// bit position in the byte at `offset`, only meaningful for 1 bit slots
    pub bit_position: u8,
    /// last raw value read from the bus
    value: AtomicU64,
    /// raw value to write at next exchange
    written: AtomicU64,
}

impl DomainSlot {
    fn new(entry: &SignalEntry) -> Self {
        Self {
            key: entry.key(),
            bitsize: entry.bitsize,
            direction: entry.direction
                .or(SyncDirection::default_for(entry.sync_index))
                .unwrap_or(SyncDirection::Input),
            swap_endian: entry.swap_endian,
            signed: entry.signed,
            offset: 0,
            bit_position: 0,
            value: AtomicU64::new(0),
            written: AtomicU64::new(0),
        }
    }
    pub fn is_output(&self) -> bool {self.direction == SyncDirection::Output}

    /// raw value read at the last exchange, byte-swapped if requested
    pub fn raw(&self) -> u64 {self.value.load(Acquire)}
    /// value read at the last exchange, `None` if its size cannot be exchanged
    pub fn value(&self) -> Option<Value> {Value::new(self.raw(), self.bitsize, self.signed)}
    /// raw value staged for the next exchange
    pub fn staged(&self) -> u64 {self.written.load(Acquire)}
    /// stage a raw value for the next exchange
    pub fn stage(&self, raw: u64) {self.written.store(raw, Release)}

    /// write the staged value to the domain, returns false if the slot size cannot be written
    fn write<D: Driver + ?Sized>(&self, driver: &D, domain: DomainHandle) -> bool {
        let raw = self.staged();
        match self.bitsize {
            1 => driver.write_bit(domain, self.offset, self.bit_position, raw & 1 != 0),
            8 => driver.write_u8(domain, self.offset, raw as u8),
            16 => driver.write_u16(domain, self.offset, raw as u16),
            32 => driver.write_u32(domain, self.offset, raw as u32),
            64 => driver.write_u64(domain, self.offset, raw),
            _ => return false,
        }
        true
    }
    /// read the slot value from the domain, returns false if the slot size cannot be read
    fn read<D: Driver + ?Sized>(&self, driver: &D, domain: DomainHandle) -> bool {
        let raw = match self.bitsize {
            1 => u64::from(driver.read_bit(domain, self.offset, self.bit_position)),
            8 => u64::from(driver.read_u8(domain, self.offset)),
            16 => u64::from(driver.read_u16(domain, self.offset)),
            32 => u64::from(driver.read_u32(domain, self.offset)),
            64 => driver.read_u64(domain, self.offset),
            _ => return false,
            };
        let raw = if self.swap_endian {data::swap(raw, self.bitsize)} else {raw};
        self.value.store(raw, Release);
        true
    }
}

/// content of a slot at the end of a cycle
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SlotSnapshot {
    pub position: u16,
    pub index: u16,
    pub subindex: u8,
    pub bitsize: u8,
    pub value: Option<Value>,
}


/**
    the process data domain of a session

    Its slots are in registration order, a [DomainIndex] is a position in this sequence.
*/
#[derive(Debug)]
pub struct Domain {
    handle: DomainHandle,
    slots: Vec<DomainSlot>,
    index: HashMap<DomainKey, DomainIndex>,
    /// last observed state, packed
    state: AtomicU64,
}

/// position of a slot in its domain
pub type DomainIndex = usize;

impl Domain {
    /**
        create the domain and register every entry marked for cyclic exchange

        padding entries are never registered, their `add_to_domain` flag is cleared. A failing registration, or an object registered twice, is fatal.
    */
    pub fn build<D: Driver + ?Sized>(driver: &D, entries: &mut [SignalEntry]) -> EthercatResult<Self, ConfigError> {
        log::info!("configuring domain");
        for entry in entries.iter_mut() {
            if entry.is_padding()
                {entry.add_to_domain = false}
        }
        let registered = entries.iter()
            .filter(|entry| entry.add_to_domain)
            .collect::<Vec<_>>();

        let handle = fatal(driver.create_domain(), ConfigError::Domain)?;

        // slots must not move anymore once the registrations point to them
        let mut slots = Vec::with_capacity(registered.len());
        slots.extend(registered.iter().map(|entry| DomainSlot::new(entry)));
        {
            let mut registrations = registered.iter()
                .zip(slots.iter_mut())
                .map(|(entry, slot)| PdoEntryRegistration {
                    alias: entry.alias,
                    position: entry.position,
                    vendor_id: entry.vendor_id,
                    product_code: entry.product_code,
                    index: entry.index,
                    subindex: entry.subindex,
                    offset: &mut slot.offset,
                    bit_position: &mut slot.bit_position,
                    })
                .collect::<Vec<_>>();
            fatal(driver.register_pdo_entries(handle, &mut registrations), ConfigError::Registration)?;
        }

        let mut index = HashMap::with_capacity(slots.len());
        for (i, slot) in slots.iter().enumerate() {
            log::debug!("  > domain {:3}: slave {:2} {:#06x}:{:02x} offset {:3}, bitpos {:2}, {}",
                i, slot.key.position, slot.key.index, slot.key.subindex,
                slot.offset, slot.bit_position,
                if slot.is_output() {"OUT"} else {"IN"});
            if ! data::supported(slot.bitsize)
                {log::warn!("domain entry {} has {} bits, it will not be exchanged", slot.key, slot.bitsize)}
            if index.insert(slot.key, i).is_some() {
                log::error!("domain entry {} registered twice", slot.key);
                return Err(EthercatError::Slave(ConfigError::DuplicateEntry(slot.key)));
            }
        }
        log::info!("domain has {} entries", slots.len());

        Ok(Self {
            handle,
            slots,
            index,
            state: AtomicU64::new(DomainState::default().pack()),
        })
    }

    pub fn handle(&self) -> DomainHandle {self.handle}
    pub fn slots(&self) -> &[DomainSlot] {&self.slots}
    pub fn len(&self) -> usize {self.slots.len()}
    pub fn is_empty(&self) -> bool {self.slots.is_empty()}

    /// position of the slot registered for this key
    pub fn find(&self, key: DomainKey) -> Option<DomainIndex> {
        self.index.get(&key).copied()
    }
    /// slot registered for this key
    pub fn slot(&self, key: DomainKey) -> Option<&DomainSlot> {
        self.find(key).map(|i| &self.slots[i])
    }

    /**
        write staged outputs to the process image, then read back every slot

        it must be called between processing the received frame and queuing the next one. Returns the number of slots whose size cannot be exchanged.
    */
    pub fn exchange<D: Driver + ?Sized>(&self, driver: &D) -> usize {
        let mut skipped = 0;
        for slot in &self.slots {
            let written = ! slot.is_output() || slot.write(driver, self.handle);
            let read = slot.read(driver, self.handle);
            if ! (written && read)
                {skipped += 1}
        }
        skipped
    }

    /// values of all slots, in domain order
    pub fn snapshot(&self) -> Vec<SlotSnapshot> {
        self.slots.iter()
            .map(|slot| SlotSnapshot {
                position: slot.key.position,
                index: slot.key.index,
                subindex: slot.key.subindex,
                bitsize: slot.bitsize,
                value: slot.value(),
                })
            .collect()
    }

    /// state observed at the last refresh
    pub fn state(&self) -> DomainState {DomainState::unpack(self.state.load(Acquire))}
    /// read the domain state from the driver, and log its changes
    pub fn refresh<D: Driver + ?Sized>(&self, driver: &D) -> DomainState {
        let new = driver.domain_state(self.handle);
        let old = DomainState::unpack(self.state.swap(new.pack(), AcqRel));
        if old.working_counter != new.working_counter
            {log::debug!("domain: WC {}", new.working_counter)}
        if old.wc_state != new.wc_state
            {log::debug!("domain: state {:?}", new.wc_state)}
        new
    }
    pub(crate) fn reset(&self) {
        self.state.store(DomainState::default().pack(), Release);
    }
}
