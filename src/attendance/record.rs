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
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::ids::{CourseId, ParticipantId, SessionId};

/// What gets persisted once a roll-call is finished. Absentees are `roster - present_ids`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    #[serde(rename = "sessionId")]
    pub session_id: SessionId,
    #[serde(rename = "courseId")]
    pub course_id: CourseId,
    pub date: NaiveDate,
    #[serde(rename = "presentIds")]
    pub present_ids: Vec<ParticipantId>,
}

/// The record plus the derived absentee list shown to the operator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttendanceOutcome {
    pub record: AttendanceRecord,
    pub absent_ids: Vec<ParticipantId>,
}
