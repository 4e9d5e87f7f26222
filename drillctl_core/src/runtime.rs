//! Real-time loop setup and the top-level cycle driver.
//!
//! Mirrors the workspace's usual RT bring-up sequence — lock memory, pin to
//! a core, raise scheduling priority, pre-fault the stack — behind the `rt`
//! feature, with inert no-op twins when it's off so the same binary runs on
//! a development machine. Pacing itself uses `clock_nanosleep` with
//! `TIMER_ABSTIME` against `CLOCK_MONOTONIC` so small per-cycle jitter
//! doesn't accumulate into long-term drift.

use std::time::Instant;

use drillctl_hal::Gpio;
use tracing::{error, info, warn};

use crate::coordinator::{Coordinator, StatusSnapshot};
use crate::error::CoreError;

/// One-time RT bring-up: lock pages, pin affinity, raise scheduler priority.
#[cfg(feature = "rt")]
pub fn rt_setup(cpu_core: usize, rt_priority: i32) -> Result<(), CoreError> {
    rt_mlockall()?;
    rt_set_affinity(cpu_core)?;
    rt_set_scheduler(rt_priority)?;
    prefault_stack();
    Ok(())
}

#[cfg(not(feature = "rt"))]
pub fn rt_setup(_cpu_core: usize, _rt_priority: i32) -> Result<(), CoreError> {
    warn!("rt feature disabled — running with default OS scheduling");
    Ok(())
}

#[cfg(feature = "rt")]
fn rt_mlockall() -> Result<(), CoreError> {
    nix::sys::mman::mlockall(nix::sys::mman::MlockAllFlags::all())
        .map_err(|e| CoreError::RtSetup(format!("mlockall failed: {e}")))
}

#[cfg(feature = "rt")]
fn rt_set_affinity(cpu_core: usize) -> Result<(), CoreError> {
    let mut set = nix::sched::CpuSet::new();
    set.set(cpu_core)
        .map_err(|e| CoreError::RtSetup(format!("invalid cpu core {cpu_core}: {e}")))?;
    nix::sched::sched_setaffinity(nix::unistd::Pid::from_raw(0), &set)
        .map_err(|e| CoreError::RtSetup(format!("sched_setaffinity failed: {e}")))
}

#[cfg(feature = "rt")]
fn rt_set_scheduler(priority: i32) -> Result<(), CoreError> {
    // SAFETY: `param` is a plain-old-data struct matching libc's
    // `sched_param`; passing its address to `sched_setscheduler` is the
    // documented way to set SCHED_FIFO priority.
    unsafe {
        let param = libc::sched_param {
            sched_priority: priority,
        };
        let rc = libc::sched_setscheduler(0, libc::SCHED_FIFO, &param);
        if rc != 0 {
            return Err(CoreError::RtSetup(format!(
                "sched_setscheduler failed: {}",
                std::io::Error::last_os_error()
            )));
        }
    }
    Ok(())
}

#[cfg(feature = "rt")]
fn prefault_stack() {
    const STACK_PREFAULT_BYTES: usize = 1024 * 1024;
    let mut buf = [0u8; STACK_PREFAULT_BYTES];
    for byte in buf.iter_mut() {
        // SAFETY: plain volatile write within the local buffer, used only
        // to force the pages behind it to be resident before entering the
        // real-time loop.
        unsafe {
            std::ptr::write_volatile(byte, 0);
        }
    }
    std::hint::black_box(&buf);
}

/// Running statistics for observed cycle duration, used to log overrun
/// trends without keeping every sample.
#[derive(Debug, Default, Clone, Copy)]
pub struct CycleStats {
    count: u64,
    min_us: u64,
    max_us: u64,
    sum_us: u64,
    overruns: u64,
}

impl CycleStats {
    pub fn record(&mut self, actual_us: u64, budget_us: u64) {
        self.count += 1;
        self.sum_us += actual_us;
        self.min_us = if self.count == 1 { actual_us } else { self.min_us.min(actual_us) };
        self.max_us = self.max_us.max(actual_us);
        if actual_us > budget_us {
            self.overruns += 1;
        }
    }

    pub fn avg_us(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum_us as f64 / self.count as f64
        }
    }

    pub fn overrun_count(&self) -> u64 {
        self.overruns
    }

    pub fn max_us(&self) -> u64 {
        self.max_us
    }
}

/// Drives the coordinator at a fixed cadence until told to stop or an
/// unrecoverable error occurs.
pub struct CycleRunner {
    coordinator: Coordinator,
    cycle_time_us: u64,
}

impl CycleRunner {
    pub fn new(coordinator: Coordinator, cycle_time_us: u64) -> Self {
        Self {
            coordinator,
            cycle_time_us,
        }
    }

    /// Run until `should_continue` returns false or a cycle produces an
    /// unrecoverable error. On the `rt` feature this paces itself against
    /// `CLOCK_MONOTONIC`; otherwise it uses `Instant` + `thread::sleep` and
    /// only logs overruns instead of treating them as fatal, matching how
    /// this workspace always has a non-RT development mode for the same
    /// loop body.
    pub fn run(&mut self, gpio: &mut dyn Gpio, mut should_continue: impl FnMut() -> bool) -> Result<(), CoreError> {
        #[cfg(feature = "rt")]
        {
            self.run_rt_loop(gpio, &mut should_continue)
        }
        #[cfg(not(feature = "rt"))]
        {
            self.run_sim_loop(gpio, &mut should_continue)
        }
    }

    #[cfg(feature = "rt")]
    fn run_rt_loop(&mut self, gpio: &mut dyn Gpio, should_continue: &mut impl FnMut() -> bool) -> Result<(), CoreError> {
        use nix::time::{clock_gettime, clock_nanosleep, ClockId, ClockNanosleepFlags};

        let mut stats = CycleStats::default();
        let mut next = clock_gettime(ClockId::CLOCK_MONOTONIC)
            .map_err(|e| CoreError::RtSetup(format!("clock_gettime failed: {e}")))?;
        let period = timespec_from_us(self.cycle_time_us);

        while should_continue() {
            let started = clock_gettime(ClockId::CLOCK_MONOTONIC)
                .map_err(|e| CoreError::RtSetup(format!("clock_gettime failed: {e}")))?;

            self.tick_once(gpio, gpio.now_micros())?;

            let finished = clock_gettime(ClockId::CLOCK_MONOTONIC)
                .map_err(|e| CoreError::RtSetup(format!("clock_gettime failed: {e}")))?;
            let actual_us = timespec_diff_us(started, finished);
            stats.record(actual_us, self.cycle_time_us);
            if actual_us > self.cycle_time_us {
                return Err(CoreError::CycleOverrun {
                    actual_us,
                    budget_us: self.cycle_time_us,
                });
            }

            next = timespec_add(next, period);
            clock_nanosleep(ClockId::CLOCK_MONOTONIC, ClockNanosleepFlags::TIMER_ABSTIME, &next)
                .map_err(|e| CoreError::RtSetup(format!("clock_nanosleep failed: {e}")))?;
        }
        Ok(())
    }

    fn run_sim_loop(&mut self, gpio: &mut dyn Gpio, should_continue: &mut impl FnMut() -> bool) -> Result<(), CoreError> {
        let mut stats = CycleStats::default();
        let period = std::time::Duration::from_micros(self.cycle_time_us);

        while should_continue() {
            let started = Instant::now();
            self.tick_once(gpio, gpio.now_micros())?;
            let actual_us = started.elapsed().as_micros() as u64;
            stats.record(actual_us, self.cycle_time_us);
            if actual_us > self.cycle_time_us {
                warn!(actual_us, budget_us = self.cycle_time_us, "cycle overrun (non-RT mode, not fatal)");
            }
            let spent = started.elapsed();
            if spent < period {
                std::thread::sleep(period - spent);
            }
        }
        if stats.overrun_count() > 0 {
            info!(overruns = stats.overrun_count(), max_us = stats.max_us(), "sim loop finished with overruns");
        }
        Ok(())
    }

    fn tick_once(&mut self, gpio: &mut dyn Gpio, now_us: u64) -> Result<StatusSnapshot, CoreError> {
        match self.coordinator.tick(gpio, now_us) {
            Ok(status) => Ok(status),
            Err(e) => {
                error!(error = %e, "coordinator tick failed, forcing abort");
                self.coordinator.force_abort();
                Err(e)
            }
        }
    }
}

#[cfg(feature = "rt")]
fn timespec_from_us(us: u64) -> nix::sys::time::TimeSpec {
    nix::sys::time::TimeSpec::new((us / 1_000_000) as i64, ((us % 1_000_000) * 1000) as i64)
}

#[cfg(feature = "rt")]
fn timespec_add(a: nix::sys::time::TimeSpec, b: nix::sys::time::TimeSpec) -> nix::sys::time::TimeSpec {
    use nix::sys::time::TimeSpec;
    let mut sec = a.tv_sec() + b.tv_sec();
    let mut nsec = a.tv_nsec() + b.tv_nsec();
    if nsec >= 1_000_000_000 {
        nsec -= 1_000_000_000;
        sec += 1;
    }
    TimeSpec::new(sec, nsec)
}

#[cfg(feature = "rt")]
fn timespec_diff_us(start: nix::sys::time::TimeSpec, end: nix::sys::time::TimeSpec) -> u64 {
    let sec = end.tv_sec() - start.tv_sec();
    let nsec = end.tv_nsec() - start.tv_nsec();
    (sec * 1_000_000 + nsec / 1000).max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_stats_track_overruns_and_extremes() {
        let mut stats = CycleStats::default();
        stats.record(100, 500);
        stats.record(700, 500);
        stats.record(300, 500);
        assert_eq!(stats.overrun_count(), 1);
        assert_eq!(stats.max_us(), 700);
        assert!((stats.avg_us() - 366.666).abs() < 1.0);
    }

    #[test]
    fn rt_setup_noop_without_rt_feature() {
        #[cfg(not(feature = "rt"))]
        {
            assert!(rt_setup(0, 80).is_ok());
        }
    }
}
