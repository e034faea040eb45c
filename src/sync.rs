//! # Synchronization Primitives
//!
//! Interrupt-safe critical section abstraction. All shared kernel state is
//! accessed within a critical section so the thread-mode API, SysTick and
//! PendSV never observe a pipe mid-update.
//!
//! On the Cortex-M4 the implementation comes from `cortex-m`
//! (`critical-section-single-core`: interrupts masked on entry, restored
//! on exit). Host test builds link the `std` implementation instead.

pub use ::critical_section::CriticalSection;

/// Execute a closure within a critical section.
///
/// # Usage
/// ```ignore
/// sync::critical_section(|cs| {
///     let state = KERNEL.borrow_ref_mut(cs);
///     // ...
/// });
/// ```
///
/// Keep critical sections short: pipe copies run inside one when
/// `kernel::run_pending` drains the engines.
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce(CriticalSection<'_>) -> R,
{
    ::critical_section::with(f)
}
