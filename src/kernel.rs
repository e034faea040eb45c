//! # Kernel
//!
//! Global pipe table and the public pipe API of the EqOS kernel.
//!
//! Every pipe is an [`Engine`] held in a fixed table behind a
//! critical-section mutex, together with the kernel tick count. Thread-mode
//! callers submit requests and collect replies; the engines themselves run
//! from PendSV, so submissions return at once and the work happens in a
//! deferred, serialized context.
//!
//! ## Startup Sequence
//!
//! ```text
//! reset_handler (cortex-m-rt)
//!   └─► main()
//!         ├─► kernel::init()         ← Clear the pipe table
//!         ├─► kernel::pipe_create()  ← Register pipes (×N)
//!         └─► kernel::start()        ← Enable SysTick (no return)
//!               ├─► SysTick: kernel::tick() + pend PendSV
//!               └─► PendSV:  kernel::run_pending()
//! ```

use core::cell::RefCell;

use critical_section::Mutex;
use log::debug;

use crate::config::{PipeConfig, MAX_PIPES};
use crate::engine::Engine;
use crate::error::PipeError;
use crate::request::{CompletionPolicy, Reply, RequestId, RequestOptions};
use crate::sync;
use crate::wait::Timeout;

#[cfg(all(target_arch = "arm", target_os = "none"))]
use crate::arch::cortex_m4;

// ---------------------------------------------------------------------------
// Global kernel state
// ---------------------------------------------------------------------------

/// Handle to a pipe in the kernel pipe table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipeHandle(usize);

impl PipeHandle {
    pub const fn index(self) -> usize {
        self.0
    }
}

struct KernelState {
    pipes: [Option<Engine<'static>>; MAX_PIPES],
    /// Ticks since `init()`.
    now: u64,
}

impl KernelState {
    const NO_PIPE: Option<Engine<'static>> = None;

    const fn new() -> Self {
        Self {
            pipes: [Self::NO_PIPE; MAX_PIPES],
            now: 0,
        }
    }

    fn pipe_mut(&mut self, pipe: PipeHandle) -> Result<&mut Engine<'static>, PipeError> {
        self.pipes
            .get_mut(pipe.0)
            .and_then(Option::as_mut)
            .ok_or(PipeError::UnknownPipe(pipe.0))
    }
}

static KERNEL: Mutex<RefCell<KernelState>> = Mutex::new(RefCell::new(KernelState::new()));

// ---------------------------------------------------------------------------
// Kernel API
// ---------------------------------------------------------------------------

/// Initialize the kernel: drop every pipe and reset the tick count.
///
/// Must be called before any other kernel function.
pub fn init() {
    sync::critical_section(|cs| {
        *KERNEL.borrow_ref_mut(cs) = KernelState::new();
    });
}

/// Create a pipe whose reservoir lives in `storage`.
///
/// # Returns
/// - `Ok(handle)`: the pipe's slot in the pipe table.
/// - `Err(PipeError::NoFreePipe)`: `MAX_PIPES` reached.
pub fn pipe_create(storage: &'static mut [u8], config: PipeConfig) -> Result<PipeHandle, PipeError> {
    sync::critical_section(|cs| {
        let mut kernel = KERNEL.borrow_ref_mut(cs);
        let index = kernel
            .pipes
            .iter()
            .position(Option::is_none)
            .ok_or(PipeError::NoFreePipe)?;
        debug!("kernel: pipe {} created with {} byte reservoir", index, storage.len());
        kernel.pipes[index] = Some(Engine::new(storage, config));
        Ok(PipeHandle(index))
    })
}

/// Send `data` into a pipe.
///
/// The request completes asynchronously; its outcome is collected with
/// [`pipe_reply`]. `timeout` is relative to the current tick count.
/// A finished request keeps its slot until its reply is collected, so
/// uncollected replies eventually make this fail with `NoFreeSlot`.
///
/// # Example
/// ```ignore
/// static MSG: [u8; 5] = *b"hello";
/// let id = kernel::pipe_put(pipe, &MSG, CompletionPolicy::AllOrTimeoutOnly, Timeout::Ticks(100), 3)?;
/// ```
pub fn pipe_put(
    pipe: PipeHandle,
    data: &'static [u8],
    completion: CompletionPolicy,
    timeout: Timeout,
    priority: u8,
) -> Result<RequestId, PipeError> {
    sync::critical_section(|cs| {
        let mut kernel = KERNEL.borrow_ref_mut(cs);
        let options = RequestOptions::new(completion, timeout.into_policy(kernel.now)).with_priority(priority);
        kernel.pipe_mut(pipe)?.submit_write(data, options)
    })
}

/// Receive into `buffer` from a pipe. The buffer comes back in the reply.
pub fn pipe_get(
    pipe: PipeHandle,
    buffer: &'static mut [u8],
    completion: CompletionPolicy,
    timeout: Timeout,
    priority: u8,
) -> Result<RequestId, PipeError> {
    sync::critical_section(|cs| {
        let mut kernel = KERNEL.borrow_ref_mut(cs);
        let options = RequestOptions::new(completion, timeout.into_policy(kernel.now)).with_priority(priority);
        kernel.pipe_mut(pipe)?.submit_read(buffer, options)
    })
}

/// Take the oldest finished request of a pipe, if any.
pub fn pipe_reply(pipe: PipeHandle) -> Result<Option<Reply<'static>>, PipeError> {
    sync::critical_section(|cs| {
        let mut kernel = KERNEL.borrow_ref_mut(cs);
        Ok(kernel.pipe_mut(pipe)?.take_reply())
    })
}

/// Advance the kernel clock by one tick and notify every pipe.
///
/// Called from SysTick. Returns the new tick count.
pub fn tick() -> u64 {
    sync::critical_section(|cs| {
        let mut kernel = KERNEL.borrow_ref_mut(cs);
        kernel.now += 1;
        let now = kernel.now;
        for engine in kernel.pipes.iter_mut().flatten() {
            // A full queue drops this tick; the next one carries a later count
            let _ = engine.tick(now);
        }
        now
    })
}

/// Run every pipe engine to quiescence. Returns the total steps taken.
///
/// Called from PendSV, and from thread mode when no port is running.
pub fn run_pending() -> usize {
    sync::critical_section(|cs| {
        let mut kernel = KERNEL.borrow_ref_mut(cs);
        kernel.pipes.iter_mut().flatten().map(Engine::run).sum()
    })
}

/// Current kernel tick count.
pub fn now() -> u64 {
    sync::critical_section(|cs| KERNEL.borrow_ref(cs).now)
}

/// Start the kernel tick. **Does not return.**
///
/// Configures interrupt priorities and SysTick, then sleeps between
/// interrupts, calling `idle` after every wake-up.
///
/// # Safety
/// - `init()` must have been called.
/// - Must be called from the main thread (not from an ISR).
#[cfg(all(target_arch = "arm", target_os = "none"))]
pub fn start(mut core_peripherals: cortex_m::Peripherals, idle: fn()) -> ! {
    cortex_m4::set_interrupt_priorities();
    cortex_m4::configure_systick(&mut core_peripherals.SYST);

    loop {
        idle();
        cortex_m::asm::wfi();
    }
}

/// Request a deferred engine run (PendSV) after thread-mode submissions.
#[cfg(all(target_arch = "arm", target_os = "none"))]
pub fn schedule_run() {
    cortex_m4::trigger_pendsv();
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{Direction, RequestStatus};

    /// The pipe table is global, so the whole kernel surface is exercised
    /// from a single test.
    #[test]
    fn test_kernel_pipe_lifecycle() {
        init();
        assert_eq!(now(), 0);

        let handles: [PipeHandle; MAX_PIPES] = core::array::from_fn(|_| {
            let storage: &'static mut [u8] = Box::leak(Box::new([0u8; 16]));
            pipe_create(storage, PipeConfig::new()).unwrap()
        });
        let extra: &'static mut [u8] = Box::leak(Box::new([0u8; 4]));
        assert_eq!(pipe_create(extra, PipeConfig::new()), Err(PipeError::NoFreePipe));

        let pipe = handles[0];
        let message: &'static [u8] = b"ping";
        let buffer: &'static mut [u8] = Box::leak(Box::new([0u8; 4]));

        let reader = pipe_get(pipe, buffer, CompletionPolicy::AllOrTimeoutOnly, Timeout::Ticks(5), 1).unwrap();
        let writer = pipe_put(pipe, message, CompletionPolicy::AllOrTimeoutOnly, Timeout::NoWait, 2).unwrap();
        assert!(pipe_reply(pipe).unwrap().is_none(), "Nothing runs before run_pending");

        assert!(run_pending() > 0);
        let mut replies = [pipe_reply(pipe).unwrap(), pipe_reply(pipe).unwrap()];
        assert!(pipe_reply(pipe).unwrap().is_none());
        replies.sort_by_key(|reply| reply.as_ref().map(|r| r.direction == Direction::Writer));
        let (read, written) = match replies {
            [Some(read), Some(written)] => (read, written),
            _ => panic!("both requests replied"),
        };
        assert_eq!(read.id, reader);
        assert_eq!(written.id, writer);
        assert_eq!(read.status, RequestStatus::SatisfiedTerminal);
        assert_eq!(read.into_sink().unwrap(), b"ping");

        // A timed reader is released once the tick count passes its deadline
        let lonely: &'static mut [u8] = Box::leak(Box::new([0u8; 2]));
        let start = now();
        pipe_get(pipe, lonely, CompletionPolicy::AllOrTimeoutOnly, Timeout::Ticks(3), 0).unwrap();
        run_pending();
        for _ in 0..3 {
            tick();
        }
        assert_eq!(now(), start + 3);
        run_pending();
        let reply = pipe_reply(pipe).unwrap().expect("timed reader released");
        assert_eq!(reply.status, RequestStatus::ForcedTerminal);
        assert_eq!(reply.transferred_size, 0);

        assert_eq!(pipe_reply(PipeHandle(MAX_PIPES)).err(), Some(PipeError::UnknownPipe(MAX_PIPES)));
    }
}
