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
pub mod models;

use std::collections::HashSet;
use std::path::Path;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::ids::{CourseId, OperatorId};
use models::{CourseRoster, Operator};

/// Looks up who is enrolled in a course and who teaches it.
#[async_trait]
pub trait RosterResolver: Send + Sync {
    async fn resolve(&self, course_id: &CourseId) -> anyhow::Result<CourseRoster>;
}

/// Decides whether an operator may open a roll-call for a course.
pub trait Authorizer: Send + Sync {
    fn may_start(&self, operator: &Operator, course: &CourseRoster) -> bool;
}

pub struct CapabilityAuthorizer;

impl Authorizer for CapabilityAuthorizer {
    fn may_start(&self, operator: &Operator, course: &CourseRoster) -> bool {
        operator.can_manage_course(course)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct JsonDirectory {
    #[serde(default)]
    operators: Vec<Operator>,
    #[serde(default)]
    courses: Vec<CourseRoster>,
}

impl JsonDirectory {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read directory file {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        let mut directory: JsonDirectory =
            serde_json::from_str(raw).context("Malformed directory JSON")?;
        for course in &mut directory.courses {
            dedup_participants(course);
        }
        debug!(
            "Loaded directory with {} operators and {} courses",
            directory.operators.len(),
            directory.courses.len()
        );
        Ok(directory)
    }

    pub fn operator(&self, id: &OperatorId) -> Option<&Operator> {
        self.operators.iter().find(|op| &op.id == id)
    }
}

fn dedup_participants(course: &mut CourseRoster) {
    let mut seen = HashSet::new();
    let before = course.participants.len();
    course.participants.retain(|p| seen.insert(p.id.clone()));
    if course.participants.len() != before {
        warn!(
            "Course {} lists {} duplicate participant(s), keeping the first entry of each",
            course.course_id,
            before - course.participants.len()
        );
    }
}

#[async_trait]
impl RosterResolver for JsonDirectory {
    async fn resolve(&self, course_id: &CourseId) -> anyhow::Result<CourseRoster> {
        self.courses
            .iter()
            .find(|c| &c.course_id == course_id)
            .cloned()
            .ok_or_else(|| anyhow!("Course {} is not in the directory", course_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::models::CapabilitySet;

    const DIRECTORY: &str = r#"{
        "operators": [
            {"id": "t1", "name": "Aylin", "capabilities": ["manage_course"]}
        ],
        "courses": [
            {
                "courseId": "math-101",
                "title": "Math",
                "instructorId": "t1",
                "participants": [
                    {"id": "s1", "name": "Ali"},
                    {"id": "s2", "name": "Berk", "avatar": "berk.png"},
                    {"id": "s1", "name": "Ali again"}
                ]
            }
        ]
    }"#;

    #[tokio::test]
    async fn resolves_known_course_without_duplicates() {
        let directory = JsonDirectory::from_json(DIRECTORY).unwrap();
        let roster = directory.resolve(&CourseId::new("math-101")).await.unwrap();

        let ids: Vec<String> = roster.participant_ids().map(|id| id.to_string()).collect();
        assert_eq!(ids, vec!["s1", "s2"]);
        assert_eq!(roster.participants[0].name, "Ali");
        assert_eq!(roster.participants[1].avatar.as_deref(), Some("berk.png"));
    }

    #[tokio::test]
    async fn unknown_course_is_an_error() {
        let directory = JsonDirectory::from_json(DIRECTORY).unwrap();
        assert!(directory.resolve(&CourseId::new("art-9")).await.is_err());
    }

    #[test]
    fn looks_up_operators() {
        let directory = JsonDirectory::from_json(DIRECTORY).unwrap();
        let op = directory.operator(&OperatorId::new("t1")).unwrap();
        assert_eq!(op.capabilities, CapabilitySet::MANAGE_COURSE);
        assert!(directory.operator(&OperatorId::new("nobody")).is_none());
    }

    #[tokio::test]
    async fn capability_authorizer_follows_operator_rights() {
        let directory = JsonDirectory::from_json(DIRECTORY).unwrap();
        let op = directory.operator(&OperatorId::new("t1")).unwrap();
        let roster = directory.resolve(&CourseId::new("math-101")).await.unwrap();
        assert!(CapabilityAuthorizer.may_start(op, &roster));
    }
}
