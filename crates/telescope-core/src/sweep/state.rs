// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


//! Shared control state between the UI and the sweep thread.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// Where the sweep controller is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepStatus {
    /// No sweep running
    Idle,
    /// A sweep is running
    Scanning,
    /// Stop requested; the sweep exits at the top of its next step
    Stopping,
}

impl SweepStatus {
    const fn as_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Scanning => 1,
            Self::Stopping => 2,
        }
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Scanning,
            2 => Self::Stopping,
            _ => Self::Idle,
        }
    }
}

/// Sweep status plus the two display/logging toggles.
///
/// Each field is independent; nothing here needs to change atomically with
/// anything else, so a late read costs at most one step.
#[derive(Debug)]
pub struct ControlFlags {
    status: AtomicU8,
    recording: AtomicBool,
    spectrogram: AtomicBool,
}

impl Default for ControlFlags {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlFlags {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            status: AtomicU8::new(SweepStatus::Idle.as_u8()),
            recording: AtomicBool::new(false),
            spectrogram: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn status(&self) -> SweepStatus {
        SweepStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    /// True while a sweep thread is alive, including while it is stopping.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status() != SweepStatus::Idle
    }

    /// Idle → Scanning. Returns false if a sweep is already active.
    pub(crate) fn try_begin(&self) -> bool {
        self.status
            .compare_exchange(
                SweepStatus::Idle.as_u8(),
                SweepStatus::Scanning.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Scanning → Stopping. Returns false if nothing was scanning.
    pub fn request_stop(&self) -> bool {
        self.status
            .compare_exchange(
                SweepStatus::Scanning.as_u8(),
                SweepStatus::Stopping.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    #[must_use]
    pub fn stop_requested(&self) -> bool {
        self.status() == SweepStatus::Stopping
    }

    /// Back to Idle once the sweep thread has released its resources.
    pub(crate) fn finish(&self) {
        self.status.store(SweepStatus::Idle.as_u8(), Ordering::Release);
    }

    #[must_use]
    pub fn recording(&self) -> bool {
        self.recording.load(Ordering::Relaxed)
    }

    pub fn set_recording(&self, enabled: bool) {
        self.recording.store(enabled, Ordering::Relaxed);
    }

    /// Flip recording; returns the new value.
    pub fn toggle_recording(&self) -> bool {
        !self.recording.fetch_xor(true, Ordering::Relaxed)
    }

    #[must_use]
    pub fn spectrogram(&self) -> bool {
        self.spectrogram.load(Ordering::Relaxed)
    }

    pub fn set_spectrogram(&self, enabled: bool) {
        self.spectrogram.store(enabled, Ordering::Relaxed);
    }

    /// Flip spectrogram display; returns the new value.
    pub fn toggle_spectrogram(&self) -> bool {
        !self.spectrogram.fetch_xor(true, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions() {
        let flags = ControlFlags::new();
        assert_eq!(flags.status(), SweepStatus::Idle);
        assert!(!flags.request_stop());

        assert!(flags.try_begin());
        assert!(!flags.try_begin());
        assert_eq!(flags.status(), SweepStatus::Scanning);

        assert!(flags.request_stop());
        assert!(flags.stop_requested());
        assert!(!flags.try_begin());

        flags.finish();
        assert_eq!(flags.status(), SweepStatus::Idle);
        assert!(!flags.is_active());
    }

    #[test]
    fn test_toggles_return_new_value() {
        let flags = ControlFlags::new();
        assert!(flags.toggle_recording());
        assert!(flags.recording());
        assert!(!flags.toggle_recording());
        assert!(flags.toggle_spectrogram());
        assert!(!flags.recording());
        assert!(flags.spectrogram());
    }
}
