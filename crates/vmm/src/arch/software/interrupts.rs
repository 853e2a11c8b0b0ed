//! Emulated interrupt masking.
//!
//! Each host thread stands in for one execution unit, so the interrupt enable
//! flag is thread-local.

use core::cell::Cell;

std::thread_local! {
    static INTERRUPTS_ENABLED: Cell<bool> = const { Cell::new(true) };
}

/// Returns whether interrupts are enabled on the current execution unit.
pub fn are_enabled() -> bool {
    INTERRUPTS_ENABLED.with(Cell::get)
}

/// Runs `f` with interrupts disabled, restoring the previous state afterwards.
pub fn without_interrupts<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    let previous = INTERRUPTS_ENABLED.with(|enabled| enabled.replace(false));
    let result = f();
    INTERRUPTS_ENABLED.with(|enabled| enabled.set(previous));
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disables_for_the_duration() {
        assert!(are_enabled());
        without_interrupts(|| assert!(!are_enabled()));
        assert!(are_enabled());
    }

    #[test]
    fn nested_sections_restore_outer_state() {
        without_interrupts(|| {
            without_interrupts(|| assert!(!are_enabled()));
            assert!(!are_enabled());
        });
        assert!(are_enabled());
    }

    #[test]
    fn returns_closure_result() {
        assert_eq!(without_interrupts(|| 42), 42);
    }
}
