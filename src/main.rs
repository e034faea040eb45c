//! # EqPipe Example Firmware
//!
//! A producer and a consumer sharing one pipe:
//!
//! | Request | Policy | Timeout | Priority | Behavior |
//! |---------|--------|---------|----------|----------|
//! | producer `pipe_put` | AllOrTimeoutOnly | 100 ticks | 2 | Sends the next message once the previous one landed |
//! | consumer `pipe_get` | BestEffort | Forever | 1 | Takes whatever arrives, then re-arms with the same buffer |
//!
//! Messages are longer than the consumer's buffer, so they are split
//! across several reads; the reservoir absorbs the rest in between. All
//! pipe work happens in PendSV; thread mode only collects replies and
//! re-submits.

#![no_std]
#![no_main]

use core::cell::Cell;

use cortex_m_rt::entry;
use critical_section::Mutex;
use log::info;
use panic_halt as _;

use eqpipe::config::PipeConfig;
use eqpipe::kernel::{self, PipeHandle};
use eqpipe::request::{CompletionPolicy, Direction};
use eqpipe::sync;
use eqpipe::wait::Timeout;

// ---------------------------------------------------------------------------
// Demo state
// ---------------------------------------------------------------------------

static MESSAGES: [&[u8]; 3] = [
    b"sensor frame 0001: temp=21.5C",
    b"sensor frame 0002: temp=21.6C hum=40%",
    b"heartbeat",
];

/// Pipe shared by producer and consumer, set once in `main`.
static PIPE: Mutex<Cell<Option<PipeHandle>>> = Mutex::new(Cell::new(None));

/// Index of the message currently in flight.
static NEXT_MESSAGE: Mutex<Cell<usize>> = Mutex::new(Cell::new(0));

/// Submit the next producer message.
fn produce(pipe: PipeHandle) {
    let index = sync::critical_section(|cs| {
        let cell = NEXT_MESSAGE.borrow(cs);
        let index = cell.get();
        cell.set((index + 1) % MESSAGES.len());
        index
    });
    if kernel::pipe_put(pipe, MESSAGES[index], CompletionPolicy::AllOrTimeoutOnly, Timeout::Ticks(100), 2).is_err() {
        info!("producer: pipe busy, message {} dropped", index);
    }
}

/// Re-arm the consumer with its buffer.
fn consume(pipe: PipeHandle, buffer: &'static mut [u8]) {
    if kernel::pipe_get(pipe, buffer, CompletionPolicy::BestEffort, Timeout::Forever, 1).is_err() {
        info!("consumer: pipe busy");
    }
}

/// Runs in thread mode after every wake-up: collect replies and keep the
/// producer and consumer going.
fn idle() {
    let Some(pipe) = sync::critical_section(|cs| PIPE.borrow(cs).get()) else {
        return;
    };
    let mut submitted = false;
    while let Ok(Some(reply)) = kernel::pipe_reply(pipe) {
        match reply.direction {
            Direction::Writer => {
                info!("producer: {:?} after {} bytes", reply.status, reply.transferred_size);
                produce(pipe);
            }
            Direction::Reader => {
                info!("consumer: got {} bytes", reply.transferred_size);
                if let Some(buffer) = reply.into_sink() {
                    consume(pipe, buffer);
                }
            }
        }
        submitted = true;
    }
    if submitted {
        kernel::schedule_run();
    }
}

// ---------------------------------------------------------------------------
// Main entry point
// ---------------------------------------------------------------------------

/// Firmware entry point. Initializes the kernel, creates the pipe, issues
/// the first requests, and starts the kernel tick. Does not return.
#[entry]
fn main() -> ! {
    // Take ownership of core peripherals
    let cp = cortex_m::Peripherals::take().unwrap();

    kernel::init();

    let storage: &'static mut [u8; 32] = cortex_m::singleton!(: [u8; 32] = [0; 32]).unwrap();
    let rx: &'static mut [u8; 12] = cortex_m::singleton!(: [u8; 12] = [0; 12]).unwrap();

    let pipe = kernel::pipe_create(storage, PipeConfig::new()).expect("Failed to create pipe");
    sync::critical_section(|cs| PIPE.borrow(cs).set(Some(pipe)));

    consume(pipe, rx);
    produce(pipe);
    kernel::schedule_run();

    // Start the kernel tick; does not return
    kernel::start(cp, idle)
}
