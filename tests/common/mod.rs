#![allow(dead_code)]

use std::sync::Arc;
use core::time::Duration;
use ethercycle::{
    SignalEntry, SessionConfig, Session, ConfigError, EthercatResult,
    sim::{SimulatedBus, ManualClock},
    };

pub const VENDOR: u32 = 0x0000_0002;
pub const PRODUCT: u32 = 0x07d4_3052;

pub fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// slave 2 with an 8 bit output and a 16 bit big-endian input
pub fn entries() -> Vec<SignalEntry> {
    let slave = SignalEntry::identity(0, 2, VENDOR, PRODUCT);
    vec![
        slave.clone().pdo(2, 0x1600).object(0x7000, 1, 8).in_domain(),
        slave.clone().pdo(3, 0x1a00).object(0x6000, 1, 16).in_domain().swapped(),
        ]
}

pub fn bus() -> SimulatedBus {
    SimulatedBus::new().with_slave(2, VENDOR, PRODUCT)
}

pub fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(Duration::from_millis(1)))
}

pub fn config() -> SessionConfig {
    let mut config = SessionConfig::default();
    config.realtime = false;
    config
}

pub fn session(bus: SimulatedBus, clock: Arc<ManualClock>) -> EthercatResult<Session<SimulatedBus>, ConfigError> {
    Session::new(bus, clock, config(), entries(), Vec::new())
}
