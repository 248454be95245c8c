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
use serde::Deserialize;

use crate::ids::{CourseId, OperatorId, ParticipantId};

#[derive(Clone, Debug, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub name: String,
    #[serde(default)]
    pub avatar: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CourseRoster {
    #[serde(rename = "courseId")]
    pub course_id: CourseId,
    pub title: String,
    #[serde(rename = "instructorId")]
    pub instructor_id: OperatorId,
    pub participants: Vec<Participant>,
}

impl CourseRoster {
    pub fn participant(&self, id: &ParticipantId) -> Option<&Participant> {
        self.participants.iter().find(|p| &p.id == id)
    }

    pub fn participant_ids(&self) -> impl Iterator<Item = &ParticipantId> {
        self.participants.iter().map(|p| &p.id)
    }
}

/// A single permission an operator can hold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Run roll-calls for courses the operator teaches.
    ManageCourse,
    /// Send notifications to everyone.
    Broadcast,
    /// Run roll-calls for any course.
    AdminOverride,
}

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct CapabilitySet: u8 {
        const MANAGE_COURSE = 1 << 0;
        const BROADCAST = 1 << 1;
        const ADMIN_OVERRIDE = 1 << 2;
    }
}

impl Capability {
    pub const fn as_set(self) -> CapabilitySet {
        match self {
            Self::ManageCourse => CapabilitySet::MANAGE_COURSE,
            Self::Broadcast => CapabilitySet::BROADCAST,
            Self::AdminOverride => CapabilitySet::ADMIN_OVERRIDE,
        }
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        let mut set = CapabilitySet::empty();
        for cap in iter {
            set |= cap.as_set();
        }
        set
    }
}

#[derive(Clone, Debug, Deserialize)]
struct RawOperator {
    id: OperatorId,
    name: String,
    #[serde(default)]
    capabilities: Vec<Capability>,
}

/// Whoever is driving the client: an instructor or an administrator.
#[derive(Clone, Debug, Deserialize)]
#[serde(from = "RawOperator")]
pub struct Operator {
    pub id: OperatorId,
    pub name: String,
    pub capabilities: CapabilitySet,
}

impl From<RawOperator> for Operator {
    fn from(raw: RawOperator) -> Self {
        Self {
            id: raw.id,
            name: raw.name,
            capabilities: raw.capabilities.into_iter().collect(),
        }
    }
}

impl Operator {
    #[cfg(test)]
    pub fn new(id: impl Into<String>, name: impl Into<String>, capabilities: CapabilitySet) -> Self {
        Self {
            id: OperatorId::new(id),
            name: name.into(),
            capabilities,
        }
    }

    /// Instructor of record with course rights, or anyone with the admin override.
    pub fn can_manage_course(&self, course: &CourseRoster) -> bool {
        if self.capabilities.contains(CapabilitySet::ADMIN_OVERRIDE) {
            return true;
        }
        self.capabilities.contains(CapabilitySet::MANAGE_COURSE) && course.instructor_id == self.id
    }

    pub fn can_broadcast(&self) -> bool {
        self.capabilities.contains(CapabilitySet::BROADCAST)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn course(instructor: &str) -> CourseRoster {
        CourseRoster {
            course_id: CourseId::new("math-101"),
            title: "Math".to_string(),
            instructor_id: OperatorId::new(instructor),
            participants: Vec::new(),
        }
    }

    #[test]
    fn instructor_of_record_can_manage() {
        let instructor = Operator::new("t1", "Aylin", CapabilitySet::MANAGE_COURSE);
        assert!(instructor.can_manage_course(&course("t1")));
        assert!(!instructor.can_manage_course(&course("t2")));
    }

    #[test]
    fn admin_override_manages_any_course() {
        let admin = Operator::new("a1", "Root", CapabilitySet::ADMIN_OVERRIDE);
        assert!(admin.can_manage_course(&course("t2")));
        assert!(!admin.can_broadcast());
    }

    #[test]
    fn instructor_id_alone_is_not_enough() {
        let guest = Operator::new("t1", "Guest", CapabilitySet::empty());
        assert!(!guest.can_manage_course(&course("t1")));
    }

    #[test]
    fn operator_capabilities_deserialize_into_set() {
        let op: Operator = serde_json::from_str(
            r#"{"id": "a1", "name": "Admin", "capabilities": ["broadcast", "admin_override"]}"#,
        )
        .unwrap();
        assert_eq!(
            op.capabilities,
            CapabilitySet::BROADCAST | CapabilitySet::ADMIN_OVERRIDE
        );
        assert!(op.can_broadcast());
    }
}
