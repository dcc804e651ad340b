//! Evaluation stack of 32-bit data elements.
//!
//! The stack is sized once per compiled program to the high-water mark
//! computed during compilation. The cursor tracks the logical depth
//! even past capacity, so the bounds check in checked execution can
//! observe an overflow after the offending instruction has run, the
//! same way it observes an underflow.

use crate::scalar::Scalar;

/// Fixed-capacity stack of 32-bit data elements.
#[derive(Clone, Debug, Default)]
pub struct EvalStack {
    words: Vec<u32>,
    cursor: usize,
    faulted: bool,
}

impl EvalStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the backing storage with `capacity` zeroed elements and
    /// reset the cursor to base.
    pub fn resize(&mut self, capacity: usize) {
        self.words.clear();
        self.words.resize(capacity, 0);
        self.cursor = 0;
        self.faulted = false;
    }

    pub fn capacity(&self) -> usize {
        self.words.len()
    }

    /// Logical depth in data elements; may exceed `capacity` after an
    /// unchecked overflow.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn reset(&mut self) {
        self.cursor = 0;
        self.faulted = false;
    }

    /// True when a push or pop ever went outside the allocated window.
    pub fn faulted(&self) -> bool {
        self.faulted
    }

    /// Bounds check used after every instruction in checked execution.
    pub fn in_bounds(&self) -> bool {
        !self.faulted && self.cursor <= self.words.len()
    }

    pub fn push_word(&mut self, word: u32) {
        if self.cursor < self.words.len() {
            self.words[self.cursor] = word;
        } else {
            self.faulted = true;
        }
        self.cursor += 1;
    }

    pub fn pop_word(&mut self) -> u32 {
        if self.cursor == 0 {
            self.faulted = true;
            return 0;
        }
        self.cursor -= 1;
        if self.cursor < self.words.len() {
            self.words[self.cursor]
        } else {
            self.faulted = true;
            0
        }
    }

    pub fn push<T: Scalar>(&mut self, value: T) {
        let mut buf = [0u32; 2];
        value.store(&mut buf[..T::WORDS]);
        for &word in &buf[..T::WORDS] {
            self.push_word(word);
        }
    }

    pub fn pop<T: Scalar>(&mut self) -> T {
        let mut buf = [0u32; 2];
        for i in (0..T::WORDS).rev() {
            buf[i] = self.pop_word();
        }
        T::load(&buf[..T::WORDS])
    }

    /// Read the elements at absolute positions `[index, index + out.len())`
    /// without moving the cursor. Out-of-window positions read as zero.
    pub fn read_at(&self, index: usize, out: &mut [u32]) {
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = self.words.get(index + i).copied().unwrap_or(0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_round_trip() {
        let mut stack = EvalStack::new();
        stack.resize(4);
        stack.push(1.5f32);
        stack.push(-7i64);
        assert_eq!(stack.cursor(), 3);
        assert_eq!(stack.pop::<i64>(), -7);
        assert_eq!(stack.pop::<f32>(), 1.5);
        assert_eq!(stack.cursor(), 0);
        assert!(stack.in_bounds());
    }

    #[test]
    fn underflow_faults() {
        let mut stack = EvalStack::new();
        stack.resize(2);
        let _ = stack.pop::<u8>();
        assert!(stack.faulted());
        assert!(!stack.in_bounds());
    }

    #[test]
    fn overflow_is_observable() {
        let mut stack = EvalStack::new();
        stack.resize(1);
        stack.push(1u8);
        assert!(stack.in_bounds());
        stack.push(2u8);
        assert!(!stack.in_bounds());
    }

    #[test]
    fn multiword_layout() {
        // low element is pushed first
        let mut stack = EvalStack::new();
        stack.resize(2);
        stack.push(0x1122_3344_5566_7788u64);
        let mut words = [0u32; 2];
        stack.read_at(0, &mut words);
        assert_eq!(words, [0x5566_7788, 0x1122_3344]);
    }

    #[test]
    fn reset_clears_fault() {
        let mut stack = EvalStack::new();
        stack.resize(1);
        let _ = stack.pop::<u8>();
        assert!(stack.faulted());
        stack.reset();
        assert!(stack.in_bounds());
        assert_eq!(stack.cursor(), 0);
    }
}
