//! # Cortex-M4 Port Layer
//!
//! Hardware-specific glue for the ARM Cortex-M4 (Thumb-2) processor:
//! SysTick drives the kernel clock, PendSV runs the pipe engines.
//!
//! ## Deferred Engine Run
//!
//! ```text
//!   SysTick ──► kernel::tick() ──► Tick event per pipe
//!      │
//!      └──► pend PendSV
//!                 │  (tail-chained once no other ISR is active)
//!                 ▼
//!   PendSV ──► kernel::run_pending() ──► admissions, copies, completions
//! ```
//!
//! Thread-mode submissions pend PendSV the same way through
//! `kernel::schedule_run()`.
//!
//! ## Interrupt Priorities
//!
//! - SysTick: Priority 0xFF (lowest)
//! - PendSV: Priority 0xFF (lowest), runs only when no other ISR is active
//!
//! Pipe copies can be long; at the lowest priority they never delay
//! application interrupt handlers.

use cortex_m::peripheral::syst::SystClkSource;
use cortex_m::peripheral::SCB;

use crate::config::{SYSTEM_CLOCK_HZ, TICK_HZ};
use crate::kernel;

// ---------------------------------------------------------------------------
// SysTick configuration
// ---------------------------------------------------------------------------

/// Configure the SysTick timer for the kernel tick.
///
/// Sets up SysTick to fire at `TICK_HZ` frequency using the processor
/// clock. One tick is the unit of pipe timeouts.
pub fn configure_systick(syst: &mut cortex_m::peripheral::SYST) {
    let reload = SYSTEM_CLOCK_HZ / TICK_HZ - 1;
    syst.set_reload(reload);
    syst.clear_current();
    syst.set_clock_source(SystClkSource::Core);
    syst.enable_counter();
    syst.enable_interrupt();
}

// ---------------------------------------------------------------------------
// PendSV trigger
// ---------------------------------------------------------------------------

/// Pend PendSV so the pipe engines run once no other ISR is active.
#[inline]
pub fn trigger_pendsv() {
    SCB::set_pendsv();
}

// ---------------------------------------------------------------------------
// Interrupt priority configuration
// ---------------------------------------------------------------------------

/// Set PendSV and SysTick to the lowest interrupt priority.
pub fn set_interrupt_priorities() {
    unsafe {
        // System Handler Priority Register 3 (SHPR3): 0xE000_ED20
        // Bits [23:16] = PendSV priority
        // Bits [31:24] = SysTick priority
        let shpr3: *mut u32 = 0xE000_ED20 as *mut u32;
        let val = core::ptr::read_volatile(shpr3);
        let val = val | (0xFF << 16) | (0xFF << 24);
        core::ptr::write_volatile(shpr3, val);
    }
}

// ---------------------------------------------------------------------------
// Exception handlers
// ---------------------------------------------------------------------------

/// PendSV exception handler: drain every pipe engine.
#[no_mangle]
pub extern "C" fn PendSV() {
    kernel::run_pending();
}

/// SysTick exception handler: kernel tick entry point.
///
/// Called at `TICK_HZ` frequency.
#[no_mangle]
pub extern "C" fn SysTick() {
    kernel::tick();
    trigger_pendsv();
}
