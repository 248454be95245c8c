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
mod error;
mod record;
mod session;

pub use error::{AttendanceError, AttendanceResult};
pub use record::{AttendanceOutcome, AttendanceRecord};
pub use session::{
    AttendanceMode, AttendanceSession, AttendanceSummary, CheckInOutcome, Mark, SessionPhase,
};
