//! Runtime intrinsic implementations.
//!
//! These functions are what the intrinsic symbols declared in
//! `ingot_environ` resolve to at link time. Every entry point validates its
//! memory access before touching the cell: bounds first, then natural
//! alignment. Traps are returned, never unwound.

use crate::instance::Context;
use ingot_environ::Trap;
use std::time::{Duration, Instant};

/// Decodes a floating-point timeout, in seconds, into a deadline relative
/// to `start`. `None` means wait forever.
///
/// A NaN or infinite timeout is infinite; a non-positive timeout produces a
/// deadline of `start` itself, so the wait expires immediately.
fn deadline_from_timeout(start: Instant, timeout: f64) -> Option<Instant> {
    let timeout_milliseconds = timeout * 1000.0;
    if timeout_milliseconds.is_nan() || timeout_milliseconds.is_infinite() {
        return None;
    }
    if timeout_milliseconds <= 0.0 {
        return Some(start);
    }
    if timeout_milliseconds <= (u64::MAX - 1) as f64 {
        match start.checked_add(Duration::from_millis(timeout_milliseconds as u64)) {
            Some(deadline) => return Some(deadline),
            None => fatal!("deadline computation overflowed the monotonic clock"),
        }
    }
    None
}

/// Implementation of `wavmIntrinsics.atomic_wake`.
///
/// Wakes up to `count` threads waiting on the 32-bit cell at `offset`;
/// `u32::MAX` means all of them. Returns the number of threads woken, which
/// is `0` when `count` is `0` or nobody is waiting.
pub fn atomic_wake(
    context: &Context,
    offset: u32,
    count: u32,
    memory_id: u64,
) -> Result<u32, Trap> {
    let memory = context.runtime().memory(memory_id);
    let atomic = memory.atomic_u32(offset.into())?;
    Ok(context.runtime().parking().notify(atomic.as_ptr() as usize, count))
}

/// Implementation of `wavmIntrinsics.atomic_wait_i32`.
///
/// Returns `0` if woken, `1` if the cell did not hold `expected`, `2` on
/// timeout.
pub fn atomic_wait_i32(
    context: &Context,
    offset: u32,
    expected: i32,
    timeout: f64,
    memory_id: u64,
) -> Result<u32, Trap> {
    let memory = context.runtime().memory(memory_id);
    let atomic = memory.atomic_u32(offset.into())?;
    let deadline = deadline_from_timeout(Instant::now(), timeout);
    Ok(context
        .runtime()
        .parking()
        .wait32(atomic, expected as u32, deadline) as u32)
}

/// Implementation of `wavmIntrinsics.atomic_wait_i64`; see
/// [`atomic_wait_i32`].
pub fn atomic_wait_i64(
    context: &Context,
    offset: u32,
    expected: i64,
    timeout: f64,
    memory_id: u64,
) -> Result<u32, Trap> {
    let memory = context.runtime().memory(memory_id);
    let atomic = memory.atomic_u64(offset.into())?;
    let deadline = deadline_from_timeout(Instant::now(), timeout);
    Ok(context
        .runtime()
        .parking()
        .wait64(atomic, expected as u64, deadline) as u32)
}

/// Implementation of `wavmIntrinsics.misalignedAtomicTrap`.
///
/// Called by compiled code for atomic accesses known to be misaligned;
/// traps unconditionally.
pub fn misaligned_atomic_trap(_context: &Context, _address: u32) -> Result<(), Trap> {
    Err(Trap::MisalignedAtomicMemoryAccess)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::Runtime;
    use crate::memory::SharedMemory;
    use more_asserts::assert_ge;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::thread;

    const MEMORY_ID: u64 = 0;

    fn test_context() -> (Context, SharedMemory) {
        let runtime = Runtime::new();
        let memory = SharedMemory::with_size(64);
        runtime.register_memory(MEMORY_ID, memory.clone());
        (Context::new(runtime), memory)
    }

    #[test]
    fn infinite_and_invalid_timeouts_never_expire() {
        let start = Instant::now();
        assert_eq!(deadline_from_timeout(start, f64::NAN), None);
        assert_eq!(deadline_from_timeout(start, f64::INFINITY), None);
        assert_eq!(deadline_from_timeout(start, f64::NEG_INFINITY), None);
        assert_eq!(deadline_from_timeout(start, 1.0e300), None);
    }

    #[test]
    fn non_positive_timeouts_expire_immediately() {
        let start = Instant::now();
        assert_eq!(deadline_from_timeout(start, 0.0), Some(start));
        assert_eq!(deadline_from_timeout(start, -0.0), Some(start));
        assert_eq!(deadline_from_timeout(start, -5.0), Some(start));
    }

    #[test]
    fn positive_timeouts_are_scaled_and_truncated() {
        let start = Instant::now();
        assert_eq!(
            deadline_from_timeout(start, 0.010),
            Some(start + Duration::from_millis(10))
        );
        // Sub-millisecond remainders truncate.
        assert_eq!(
            deadline_from_timeout(start, 0.0109),
            Some(start + Duration::from_millis(10))
        );
    }

    #[test]
    fn wait_on_a_mismatched_value_returns_immediately() {
        let (context, memory) = test_context();
        memory.atomic_u32(0).unwrap().store(7, Ordering::SeqCst);

        assert_eq!(
            atomic_wait_i32(&context, 0, 8, f64::INFINITY, MEMORY_ID),
            Ok(1)
        );
        assert!(context.runtime().parking().is_empty());
    }

    #[test]
    fn wait_with_an_expired_timeout_times_out() {
        let (context, memory) = test_context();
        let expected = memory.atomic_u32(0).unwrap().load(Ordering::SeqCst) as i32;

        assert_eq!(atomic_wait_i32(&context, 0, expected, 0.0, MEMORY_ID), Ok(2));
        assert_eq!(atomic_wait_i32(&context, 0, expected, -1.0, MEMORY_ID), Ok(2));
    }

    #[test]
    fn timed_wait_lasts_at_least_the_timeout() {
        let (context, _memory) = test_context();
        let start = Instant::now();
        assert_eq!(atomic_wait_i32(&context, 0, 0, 0.010, MEMORY_ID), Ok(2));
        assert_ge!(start.elapsed(), Duration::from_millis(10));
    }

    #[test]
    fn accesses_are_validated_before_waiting() {
        let (context, memory) = test_context();
        let end = memory.current_length() as u32;

        // Misaligned i64 wait.
        assert_eq!(
            atomic_wait_i64(&context, 4, 0, f64::INFINITY, MEMORY_ID),
            Err(Trap::MisalignedAtomicMemoryAccess)
        );
        // Out-of-bounds wake, one byte past the end.
        assert_eq!(
            atomic_wake(&context, end + 1, 1, MEMORY_ID),
            Err(Trap::AccessViolation)
        );
        // An access straddling the end is out of bounds even though its
        // first byte is in range.
        assert_eq!(
            atomic_wait_i32(&context, end - 2, 0, 0.0, MEMORY_ID),
            Err(Trap::AccessViolation)
        );
        assert_eq!(
            atomic_wake(&context, 2, 1, MEMORY_ID),
            Err(Trap::MisalignedAtomicMemoryAccess)
        );
    }

    #[test]
    fn misaligned_atomic_trap_always_traps() {
        let (context, _memory) = test_context();
        assert_eq!(
            misaligned_atomic_trap(&context, 0),
            Err(Trap::MisalignedAtomicMemoryAccess)
        );
    }

    #[test]
    fn wake_of_zero_is_a_noop() {
        let (context, _memory) = test_context();
        assert_eq!(atomic_wake(&context, 0, 0, MEMORY_ID), Ok(0));
        assert_eq!(atomic_wake(&context, 0, u32::MAX, MEMORY_ID), Ok(0));
    }

    /// Two waiters, one wake, then wake-all: exactly one waiter wakes first,
    /// and the second only after the wake-all.
    #[test]
    fn wake_one_of_two_waiters() {
        let _ = env_logger::try_init();
        let (context, memory) = test_context();
        let address = memory.atomic_u32(0).unwrap().as_ptr() as usize;
        let woken = Arc::new(AtomicU32::new(0));

        let waiters: Vec<_> = (0..2)
            .map(|i| {
                let woken = woken.clone();
                let handle = {
                    let context = context.clone();
                    thread::spawn(move || {
                        assert_eq!(
                            atomic_wait_i32(&context, 0, 0, f64::INFINITY, MEMORY_ID),
                            Ok(0)
                        );
                        woken.fetch_add(1, Ordering::SeqCst);
                    })
                };
                while context.runtime().parking().parked_count(address) < i + 1 {
                    thread::yield_now();
                }
                handle
            })
            .collect();

        assert_eq!(atomic_wake(&context, 0, 1, MEMORY_ID), Ok(1));
        while woken.load(Ordering::SeqCst) < 1 {
            thread::yield_now();
        }
        assert_eq!(woken.load(Ordering::SeqCst), 1);

        assert_eq!(atomic_wake(&context, 0, u32::MAX, MEMORY_ID), Ok(1));
        for waiter in waiters {
            waiter.join().unwrap();
        }
        assert_eq!(woken.load(Ordering::SeqCst), 2);
        assert!(context.runtime().parking().is_empty());
    }
}
