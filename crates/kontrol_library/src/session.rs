//! Process-wide controller state shared by the dispatcher and the animation
//! threads.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

/// Largest octave shift in either direction.
pub const OCTAVE_LIMIT: i32 = 3;

#[derive(Debug, Default)]
pub struct Session {
    octave_shift: AtomicI32,
    animating: AtomicBool,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn octave_shift(&self) -> i32 {
        self.octave_shift.load(Ordering::SeqCst)
    }

    /// Moves the shift one octave up, stopping at `+OCTAVE_LIMIT`.
    pub fn shift_up(&self) -> i32 {
        self.step_shift(1)
    }

    /// Moves the shift one octave down, stopping at `-OCTAVE_LIMIT`.
    pub fn shift_down(&self) -> i32 {
        self.step_shift(-1)
    }

    fn step_shift(&self, step: i32) -> i32 {
        let clamp = |v: i32| (v + step).clamp(-OCTAVE_LIMIT, OCTAVE_LIMIT);
        let previous = self
            .octave_shift
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| Some(clamp(v)))
            .unwrap_or_else(|v| v);
        clamp(previous)
    }

    /// Takes the animation gate. Returns false if an animation already holds it.
    pub fn try_begin_animation(&self) -> bool {
        self.animating
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn end_animation(&self) {
        self.animating.store(false, Ordering::SeqCst);
    }

    pub fn is_animating(&self) -> bool {
        self.animating.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shift_is_clamped() {
        let session = Session::new();
        for _ in 0..6 {
            session.shift_down();
        }
        assert_eq!(session.octave_shift(), -3);
        assert_eq!(session.shift_up(), -2);

        let session = Session::new();
        let last = (0..6).map(|_| session.shift_up()).last();
        assert_eq!(last, Some(3));
        assert_eq!(session.octave_shift(), 3);
    }

    #[test]
    fn gate_admits_one_holder() {
        let session = Session::new();
        assert!(session.try_begin_animation());
        assert!(!session.try_begin_animation());
        assert!(session.is_animating());
        session.end_animation();
        assert!(session.try_begin_animation());
    }
}
