/*!
    Time sources used to schedule the cyclic exchange and bound parameter requests.

    Times are [Duration]s since an arbitrary but fixed origin of a monotonic clock. The cyclic task sleeps until absolute wake-up times, so the period does not drift with the time spent in each cycle.
*/

use core::time::Duration;


/// monotonic time source
pub trait Clock: Send + Sync {
    /// current time
    fn now(&self) -> Duration;
    /// block the calling thread until the given time, returns immediately if it is already passed
    fn sleep_until(&self, deadline: Duration);
    /// called between two polls of a busy operation
    fn relax(&self) {std::thread::yield_now()}
}

/// first whole second of the clock after `now`, used to start periodic tasks on a round time
pub fn next_second(now: Duration) -> Duration {
    Duration::from_secs(now.as_secs() + 1)
}


/// the system monotonic clock
#[derive(Copy, Clone, Debug, Default)]
pub struct MonotonicClock;

#[cfg(target_os = "linux")]
impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        let mut time: libc::timespec = unsafe {core::mem::zeroed()};
        unsafe {libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut time)};
        Duration::new(time.tv_sec as u64, time.tv_nsec as u32)
    }
    fn sleep_until(&self, deadline: Duration) {
        let mut time: libc::timespec = unsafe {core::mem::zeroed()};
        time.tv_sec = deadline.as_secs() as libc::time_t;
        time.tv_nsec = deadline.subsec_nanos() as libc::c_long;
        loop {
            let status = unsafe {libc::clock_nanosleep(
                libc::CLOCK_MONOTONIC,
                libc::TIMER_ABSTIME,
                &time,
                core::ptr::null_mut(),
                )};
            if status != libc::EINTR
                {break}
        }
    }
}

#[cfg(not(target_os = "linux"))]
impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        origin().elapsed()
    }
    fn sleep_until(&self, deadline: Duration) {
        let now = self.now();
        if deadline > now
            {std::thread::sleep(deadline - now)}
    }
}

#[cfg(not(target_os = "linux"))]
fn origin() -> std::time::Instant {
    static ORIGIN: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
    *ORIGIN.get_or_init(std::time::Instant::now)
}
