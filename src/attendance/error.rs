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
use crate::ids::{CourseId, OperatorId, ParticipantId};

use super::session::{AttendanceMode, SessionPhase};

pub type AttendanceResult<T> = Result<T, AttendanceError>;

#[derive(Debug, thiserror::Error)]
pub enum AttendanceError {
    #[error("Cannot {operation} while the session is {phase}")]
    InvalidSessionState {
        operation: &'static str,
        phase: SessionPhase,
    },

    #[error("Cannot {operation} in {mode} mode")]
    ModeMismatch {
        operation: &'static str,
        mode: AttendanceMode,
    },

    #[error("{0} is not on the roster")]
    UnknownParticipant(ParticipantId),

    #[error("{operator} may not take attendance for {course}")]
    NotAuthorized {
        operator: OperatorId,
        course: CourseId,
    },

    #[error("Could not resolve the roster for {course}")]
    RosterUnavailable {
        course: CourseId,
        #[source]
        source: anyhow::Error,
    },

    #[error("Camera unavailable")]
    CameraUnavailable(#[source] anyhow::Error),

    #[error("Attendance could not be saved")]
    PersistenceFailure(#[source] anyhow::Error),
}

impl AttendanceError {
    pub(crate) fn invalid_state(operation: &'static str, phase: SessionPhase) -> Self {
        Self::InvalidSessionState { operation, phase }
    }

    /// Failures the operator can retry without losing the roll-call.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::PersistenceFailure(_))
    }
}
