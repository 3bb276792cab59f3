//! Admission gate shared by the chunk producer and the chunk sink.

use parking_lot::{Condvar, Mutex};

/// Counting permit. At most `permits` holders at a time; holders release on drop.
pub struct AdmissionGate {
    available: Mutex<usize>,
    released: Condvar,
}

impl AdmissionGate {
    pub fn new(permits: usize) -> Self {
        AdmissionGate {
            available: Mutex::new(permits),
            released: Condvar::new(),
        }
    }

    /// Blocks until a permit is available.
    pub fn acquire(&self) -> Permit<'_> {
        let mut available = self.available.lock();
        while *available == 0 {
            self.released.wait(&mut available);
        }
        *available -= 1;

        return Permit { gate: self };
    }

    /// Takes a permit if one is available right now.
    #[cfg(test)]
    pub(crate) fn try_acquire(&self) -> Option<Permit<'_>> {
        let mut available = self.available.lock();
        if *available == 0 {
            return None;
        }
        *available -= 1;

        return Some(Permit { gate: self });
    }

    #[cfg(test)]
    pub(crate) fn available(&self) -> usize {
        *self.available.lock()
    }

    fn release(&self) {
        *self.available.lock() += 1;
        self.released.notify_one();
    }
}

impl Default for AdmissionGate {
    fn default() -> Self {
        AdmissionGate::new(1)
    }
}

/// Held admission permit.
#[must_use]
pub struct Permit<'a> {
    gate: &'a AdmissionGate,
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        self.gate.release();
    }
}
