/*
EduTrack Attendance: roll-call sessions for the EduTrack training-center client.
Copyright (C) 2024 EduTrack

This program is free software: you can redistribute it and/or modify
it under the terms of the GNU General Public License as published by
the Free Software Foundation, either version 3 of the License, or
(at your option) any later version.

This program is distributed in the hope that it will be useful,
but WITHOUT ANY WARRANTY; without even the implied warranty of
MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
GNU General Public License for more details.

You should have received a copy of the GNU General Public License
along with this program.  If not, see <https://www.gnu.org/licenses/>.
*/
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::anyhow;
use tracing::{debug, trace};

/// Hands out exclusive access to a QR scanner / camera.
pub trait CameraProvider: Send + Sync {
    fn acquire(&self) -> anyhow::Result<CameraLease>;
}

/// Held for as long as a QR session is open. Dropping it releases the camera.
pub struct CameraLease {
    label: String,
    release: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl CameraLease {
    pub fn new(label: impl Into<String>, release: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            label: label.into(),
            release: Some(Box::new(release)),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl Drop for CameraLease {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            debug!("Releasing camera {}", self.label);
            release();
        }
    }
}

impl std::fmt::Debug for CameraLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraLease")
            .field("label", &self.label)
            .finish()
    }
}

/// Stand-in for device camera access. Tracks outstanding leases.
#[derive(Clone, Default)]
pub struct SimulatedCamera {
    active: Arc<AtomicUsize>,
    unavailable: Arc<AtomicBool>,
}

impl SimulatedCamera {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn active_leases(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

impl CameraProvider for SimulatedCamera {
    fn acquire(&self) -> anyhow::Result<CameraLease> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(anyhow!("Camera permission denied"));
        }

        let leases = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        trace!("Simulated camera acquired, {} lease(s) outstanding", leases);

        let active = Arc::clone(&self.active);
        Ok(CameraLease::new("simulated", move || {
            active.fetch_sub(1, Ordering::SeqCst);
        }))
    }
}
