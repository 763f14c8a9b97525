/*!
    Cyclic exchange engine: the fixed-period task exchanging the process data of a session.

    The task runs on its own thread, with realtime priority when allowed. Each cycle is scheduled at an absolute time (previous wake-up plus the period) so the period does not drift. Once per cycle it publishes the slot values and the application-layer states on a bounded channel, this blocks the task if the receiver does not keep up.

    Stopping is cooperative: the stop request, or a deactivation of the session, is observed at the next period boundary, then the bus is deactivated before the thread ends.
*/

use crate::{
    clock,
    domain::SlotSnapshot,
    driver::Driver,
    error::{EthercatError, EthercatResult, ConfigError},
    master::Session,
    state::AlMixedState,
    };
use core::sync::atomic::{AtomicBool, Ordering::*};
use std::{
    sync::Arc,
    thread::JoinHandle,
    };
use tokio::sync::mpsc;


/// data published at the end of each cycle
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CycleData {
    /// values of every domain slot, empty while the bus is not operational
    pub slots: Vec<SlotSnapshot>,
    /// union of the slaves application-layer states
    pub states: AlMixedState,
}

/// handle to a running cyclic task
#[derive(Debug)]
pub struct CycleHandle {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<EthercatResult>,
}

impl CycleHandle {
    /// request the task to stop at its next period boundary
    pub fn stop(&self) {self.stop.store(true, Release)}
    pub fn is_finished(&self) -> bool {self.thread.is_finished()}
    /// wait for the task to end, the bus is deactivated when this returns
    pub fn join(self) -> EthercatResult {
        self.thread.join()
            .unwrap_or(Err(EthercatError::Master("cyclic task panicked")))
    }
}

/**
    activate the session and start its cyclic task

    returns the handle to stop the task, and the receiving end of the published cycle data. Dropping the receiver is fatal to the task.
*/
pub fn start<D: Driver + 'static>(session: Arc<Session<D>>) -> EthercatResult<(CycleHandle, mpsc::Receiver<CycleData>), ConfigError> {
    session.activate()?;

    let (sender, receiver) = mpsc::channel(session.config().publish_capacity.max(1));
    let stop = Arc::new(AtomicBool::new(false));
    let thread = {
        let stop = stop.clone();
        let task = session.clone();
        std::thread::Builder::new()
            .name("ethercat-cycle".into())
            .spawn(move || {
                if task.config().realtime
                    {set_realtime()}
                let result = run(&task, &stop, sender);
                task.deactivate();
                result
            })
            .map_err(|err| {
                log::error!("cannot start cyclic task: {}", err);
                session.deactivate();
                err
            })?
    };
    Ok((CycleHandle {stop, thread}, receiver))
}

fn run<D: Driver>(session: &Session<D>, stop: &AtomicBool, sender: mpsc::Sender<CycleData>) -> EthercatResult {
    let clock = session.clock();
    let period = session.config().period();
    let mut wake = clock::next_second(clock.now());
    log::info!("starting cyclic task, period {:?}", period);

    loop {
        clock.sleep_until(wake);
        if stop.load(Acquire) {
            log::info!("cyclic task stopping");
            return Ok(());
        }
        if ! session.is_active() {
            log::info!("session deactivated, cyclic task stopping");
            return Ok(());
        }

        let data = session.cycle();
        if sender.blocking_send(data).is_err() {
            log::error!("cycle data receiver dropped");
            return Err(EthercatError::Master("cycle data receiver dropped"));
        }
        wake += period;
    }
}

#[cfg(target_os = "linux")]
fn set_realtime() {
    if let Err(err) = thread_priority::set_thread_priority_and_policy(
            thread_priority::thread_native_id(),
            thread_priority::ThreadPriority::Max,
            thread_priority::ThreadSchedulePolicy::Realtime(thread_priority::RealtimeThreadSchedulePolicy::Fifo),
            ) {
        log::warn!("cannot set realtime scheduling: {:?}", err);
    }
    if let Err(err) = ioprio::set_priority(
            ioprio::Target::Process(ioprio::Pid::this()),
            ioprio::Priority::new(ioprio::Class::Realtime(ioprio::RtPriorityLevel::highest())),
            ) {
        log::warn!("cannot set realtime io priority: {:?}", err);
    }
}

#[cfg(not(target_os = "linux"))]
fn set_realtime() {
    log::warn!("realtime scheduling is only supported on linux");
}
