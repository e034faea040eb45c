//! # EqPipe Configuration
//!
//! Compile-time constants bounding every pipe, plus the small runtime
//! configuration each pipe is created with. All limits are fixed at compile
//! time; nothing is allocated dynamically.

/// Maximum number of pipes the kernel pipe table can hold.
pub const MAX_PIPES: usize = 4;

/// Request slots per pipe, writers and readers combined.
/// This bounds the slot arena, both FIFO lists and the reply queue: a
/// slot stays taken until its reply is collected.
pub const MAX_REQUESTS: usize = 8;

/// Move Operations a single pipe may have in flight at once. A move counts
/// from issue until both of its legs are reported, including after the
/// copy engine took it. When exhausted, movers stop and retry on the next
/// scheduler entry.
pub const MAX_MOVES: usize = 16;

/// Outstanding reservoir claims per direction (write claims, read claims).
pub const MAX_MARKERS: usize = 8;

/// Depth of the per-pipe engine event queue. The engine keeps
/// `2 * MAX_MOVES` entries free of submissions and ticks so both
/// completion legs of every in-flight move always fit.
pub const EVENT_QUEUE_DEPTH: usize = 2 * MAX_MOVES + MAX_REQUESTS + 8;

/// Upper bound on scheduler iterations in one invocation. Every iteration
/// issues a move, retires a head request, or ends the invocation, so
/// exceeding this means the scheduler state is corrupt.
pub const MAX_PROCESS_PASSES: usize = MAX_MOVES + 4 * MAX_REQUESTS + 8;

/// SysTick frequency in Hz. One tick is the unit of pipe timeouts.
pub const TICK_HZ: u32 = 1000;

/// System clock frequency in Hz (default for STM32F4 at 16 MHz HSI).
pub const SYSTEM_CLOCK_HZ: u32 = 16_000_000;

const _: () = assert!(EVENT_QUEUE_DEPTH >= 2 * MAX_MOVES + MAX_REQUESTS + 1);
const _: () = assert!(MAX_MOVES >= 2 * MAX_MARKERS);
const _: () = assert!(MAX_REQUESTS <= u8::MAX as usize);

// ---------------------------------------------------------------------------
// Runtime pipe configuration
// ---------------------------------------------------------------------------

/// When the scheduler may push bytes past an all-or-nothing request that
/// cannot currently be satisfied.
///
/// A head writer (or reader) whose full size is unreachable is "no-go": it
/// must not consume partial capacity. With an empty buffer and a peer
/// waiting on the other side, the only way to make progress is a direct
/// hand-off that partially serves the no-go request. This policy decides
/// when that hand-off is allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForcePolicy {
    /// Never force; the no-go request and its peer keep waiting.
    Never,
    /// Force only when the peer cannot wait any longer (non-blocking,
    /// best-effort with progress, or an expired deadline).
    WhenPeerCannotWait,
    /// Always force when a hand-off is possible.
    Always,
}

/// Per-pipe settings chosen at creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipeConfig {
    /// Stall-forcing threshold.
    pub force_policy: ForcePolicy,
}

impl PipeConfig {
    pub const fn new() -> Self {
        Self {
            force_policy: ForcePolicy::WhenPeerCannotWait,
        }
    }

    pub const fn with_force_policy(mut self, force_policy: ForcePolicy) -> Self {
        self.force_policy = force_policy;
        self
    }
}

impl Default for PipeConfig {
    fn default() -> Self {
        Self::new()
    }
}
