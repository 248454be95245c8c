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
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::NaiveDate;
use tracing::{debug, info, trace, warn};

use super::error::{AttendanceError, AttendanceResult};
use super::record::{AttendanceOutcome, AttendanceRecord};
use crate::ids::{CourseId, ParticipantId, SessionId};
use crate::sink::RecordSink;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttendanceMode {
    Manual,
    Qr,
}

impl fmt::Display for AttendanceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttendanceMode::Manual => f.write_str("manual"),
            AttendanceMode::Qr => f.write_str("QR"),
        }
    }
}

impl FromStr for AttendanceMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "manual" => Ok(AttendanceMode::Manual),
            "qr" => Ok(AttendanceMode::Qr),
            other => Err(anyhow!("Unknown attendance mode '{}'", other)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionPhase {
    /// No roll-call is running.
    Idle,
    Open,
    /// The record has been handed to the sink and we are waiting on it.
    Finalizing,
    Finalized,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionPhase::Idle => f.write_str("idle"),
            SessionPhase::Open => f.write_str("open"),
            SessionPhase::Finalizing => f.write_str("finalizing"),
            SessionPhase::Finalized => f.write_str("finalized"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mark {
    Unmarked,
    Present,
    Absent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CheckInOutcome {
    CheckedIn(ParticipantId),
    /// Duplicate scan. Nothing changed.
    AlreadyCheckedIn(ParticipantId),
    /// Every roster participant is already present.
    NoRemainingParticipants,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttendanceSummary {
    pub total: usize,
    pub present: usize,
    pub absent: usize,
    pub unmarked: usize,
}

/// One roll-call pass over a fixed roster.
///
/// Manual sessions take explicit present/absent marks, QR sessions only take
/// check-ins. Either way anyone not present when the session is finished is
/// recorded as absent.
#[derive(Debug)]
pub struct AttendanceSession {
    id: SessionId,
    course_id: CourseId,
    date: NaiveDate,
    mode: AttendanceMode,
    roster: Vec<ParticipantId>,
    present: HashSet<ParticipantId>,
    absent: HashSet<ParticipantId>,
    last_checked_in: Option<ParticipantId>,
    phase: SessionPhase,
}

impl AttendanceSession {
    pub fn new(
        course_id: CourseId,
        roster: impl IntoIterator<Item = ParticipantId>,
        mode: AttendanceMode,
        date: NaiveDate,
    ) -> Self {
        let mut seen = HashSet::new();
        let roster: Vec<ParticipantId> = roster
            .into_iter()
            .filter(|id| seen.insert(id.clone()))
            .collect();

        let id = SessionId::generate();
        info!(
            "Starting {} attendance session {} for {} ({} participants)",
            mode,
            id,
            course_id,
            roster.len()
        );

        Self {
            id,
            course_id,
            date,
            mode,
            roster,
            present: HashSet::new(),
            absent: HashSet::new(),
            last_checked_in: None,
            phase: SessionPhase::Open,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn mode(&self) -> AttendanceMode {
        self.mode
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn roster(&self) -> &[ParticipantId] {
        &self.roster
    }

    pub fn mark_of(&self, id: &ParticipantId) -> Mark {
        if self.present.contains(id) {
            Mark::Present
        } else if self.absent.contains(id) {
            Mark::Absent
        } else {
            Mark::Unmarked
        }
    }

    #[cfg(test)]
    pub fn is_present(&self, id: &ParticipantId) -> bool {
        self.present.contains(id)
    }

    #[cfg(test)]
    pub fn present_count(&self) -> usize {
        self.present.len()
    }

    #[cfg(test)]
    pub fn last_checked_in(&self) -> Option<&ParticipantId> {
        self.last_checked_in.as_ref()
    }

    /// The participant most recently checked in by QR, cleared once shown.
    pub fn take_acknowledgement(&mut self) -> Option<ParticipantId> {
        self.last_checked_in.take()
    }

    pub fn summary(&self) -> AttendanceSummary {
        AttendanceSummary {
            total: self.roster.len(),
            present: self.present.len(),
            absent: self.absent.len(),
            unmarked: self.roster.len() - self.present.len() - self.absent.len(),
        }
    }

    pub fn mark_present(&mut self, id: &ParticipantId) -> AttendanceResult<()> {
        self.ensure_manual("mark present")?;
        self.ensure_on_roster(id)?;

        self.absent.remove(id);
        self.present.insert(id.clone());
        trace!("Marked {} present in session {}", id, self.id);
        Ok(())
    }

    pub fn mark_absent(&mut self, id: &ParticipantId) -> AttendanceResult<()> {
        self.ensure_manual("mark absent")?;
        self.ensure_on_roster(id)?;

        self.present.remove(id);
        self.absent.insert(id.clone());
        trace!("Marked {} absent in session {}", id, self.id);
        Ok(())
    }

    /// Records a QR check-in. Scanning the same participant twice is not an error.
    pub fn check_in(&mut self, id: &ParticipantId) -> AttendanceResult<CheckInOutcome> {
        self.ensure_qr("check in")?;
        self.ensure_on_roster(id)?;

        if !self.present.insert(id.clone()) {
            debug!("{} scanned again in session {}", id, self.id);
            return Ok(CheckInOutcome::AlreadyCheckedIn(id.clone()));
        }

        debug!("{} checked in to session {}", id, self.id);
        self.last_checked_in = Some(id.clone());
        Ok(CheckInOutcome::CheckedIn(id.clone()))
    }

    /// Simulated scan: checks in the first roster participant who is not present yet.
    pub fn check_in_next(&mut self) -> AttendanceResult<CheckInOutcome> {
        self.ensure_qr("check in")?;

        let next = self
            .roster
            .iter()
            .find(|id| !self.present.contains(*id))
            .cloned();

        match next {
            Some(id) => self.check_in(&id),
            None => {
                debug!("Session {} has nobody left to scan", self.id);
                Ok(CheckInOutcome::NoRemainingParticipants)
            }
        }
    }

    /// Moves the session into `Finalizing` and returns what should be persisted.
    ///
    /// Unmarked participants count as absent. Follow up with [`Self::confirm_finish`]
    /// once the record is stored, or [`Self::abort_finish`] to reopen the session.
    pub fn begin_finish(&mut self) -> AttendanceResult<AttendanceOutcome> {
        self.ensure_open("finish")?;

        let (present_ids, absent_ids): (Vec<_>, Vec<_>) = self
            .roster
            .iter()
            .cloned()
            .partition(|id| self.present.contains(id));

        self.phase = SessionPhase::Finalizing;
        self.last_checked_in = None;
        debug!(
            "Finalizing session {}: {} present, {} absent",
            self.id,
            present_ids.len(),
            absent_ids.len()
        );

        Ok(AttendanceOutcome {
            record: AttendanceRecord {
                session_id: self.id,
                course_id: self.course_id.clone(),
                date: self.date,
                present_ids,
            },
            absent_ids,
        })
    }

    pub fn confirm_finish(&mut self) -> AttendanceResult<()> {
        if self.phase != SessionPhase::Finalizing {
            return Err(AttendanceError::invalid_state("confirm finish", self.phase));
        }
        self.phase = SessionPhase::Finalized;
        info!("Attendance session {} finalized", self.id);
        Ok(())
    }

    pub fn abort_finish(&mut self) -> AttendanceResult<()> {
        if self.phase != SessionPhase::Finalizing {
            return Err(AttendanceError::invalid_state("abort finish", self.phase));
        }
        self.phase = SessionPhase::Open;
        warn!("Finalizing session {} aborted, session reopened", self.id);
        Ok(())
    }

    /// Persists the roll-call through `sink`.
    ///
    /// On failure (or if this future is dropped before the sink answers) the
    /// session goes back to `Open` with every mark intact so it can be retried.
    pub async fn finish(&mut self, sink: &dyn RecordSink) -> AttendanceResult<AttendanceOutcome> {
        let outcome = self.begin_finish()?;
        let guard = FinalizeGuard {
            session: self,
            committed: false,
        };

        match sink.persist(&outcome.record).await {
            Ok(()) => {
                guard.commit()?;
                Ok(outcome)
            }
            Err(e) => {
                warn!("Failed to persist session {}: {:#}", outcome.record.session_id, e);
                drop(guard);
                Err(AttendanceError::PersistenceFailure(e))
            }
        }
    }

    fn ensure_open(&self, operation: &'static str) -> AttendanceResult<()> {
        if self.phase != SessionPhase::Open {
            return Err(AttendanceError::invalid_state(operation, self.phase));
        }
        Ok(())
    }

    fn ensure_manual(&self, operation: &'static str) -> AttendanceResult<()> {
        self.ensure_open(operation)?;
        if self.mode != AttendanceMode::Manual {
            return Err(AttendanceError::ModeMismatch {
                operation,
                mode: self.mode,
            });
        }
        Ok(())
    }

    fn ensure_qr(&self, operation: &'static str) -> AttendanceResult<()> {
        self.ensure_open(operation)?;
        if self.mode != AttendanceMode::Qr {
            return Err(AttendanceError::ModeMismatch {
                operation,
                mode: self.mode,
            });
        }
        Ok(())
    }

    fn ensure_on_roster(&self, id: &ParticipantId) -> AttendanceResult<()> {
        if !self.roster.contains(id) {
            return Err(AttendanceError::UnknownParticipant(id.clone()));
        }
        Ok(())
    }
}

/// Reopens the session unless the sink accepted the record.
struct FinalizeGuard<'a> {
    session: &'a mut AttendanceSession,
    committed: bool,
}

impl FinalizeGuard<'_> {
    fn commit(mut self) -> AttendanceResult<()> {
        self.committed = true;
        self.session.confirm_finish()
    }
}

impl Drop for FinalizeGuard<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        if let Err(e) = self.session.abort_finish() {
            debug!("Nothing to reopen: {}", e);
        }
    }
}
