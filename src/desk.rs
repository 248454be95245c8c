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
use std::sync::Arc;

use chrono_tz::Tz;
use tracing::{info, trace, warn};

use crate::attendance::{
    AttendanceError, AttendanceMode, AttendanceOutcome, AttendanceResult, AttendanceSession,
    AttendanceSummary, CheckInOutcome, SessionPhase,
};
use crate::camera::{CameraLease, CameraProvider, SimulatedCamera};
use crate::directory::models::{CourseRoster, Operator};
use crate::directory::{Authorizer, CapabilityAuthorizer, RosterResolver};
use crate::ids::{CourseId, ParticipantId};
use crate::sink::RecordSink;
use crate::utils::time::today;

/// A running roll-call together with everything it was started with.
pub struct ActiveSession {
    pub operator: Operator,
    pub roster: CourseRoster,
    pub session: AttendanceSession,
    camera: Option<CameraLease>,
}

impl ActiveSession {
    pub fn camera(&self) -> Option<&CameraLease> {
        self.camera.as_ref()
    }
}

/// Owns the collaborators and at most one open roll-call.
pub struct AttendanceDesk {
    resolver: Arc<dyn RosterResolver>,
    authorizer: Arc<dyn Authorizer>,
    camera: Arc<dyn CameraProvider>,
    sink: Arc<dyn RecordSink>,
    timezone: Tz,
    active: Option<ActiveSession>,
}

impl AttendanceDesk {
    pub fn new(
        resolver: Arc<dyn RosterResolver>,
        sink: Arc<dyn RecordSink>,
    ) -> Self {
        Self {
            resolver,
            authorizer: Arc::new(CapabilityAuthorizer),
            camera: Arc::new(SimulatedCamera::new()),
            sink,
            timezone: chrono_tz::UTC,
            active: None,
        }
    }

    #[cfg(test)]
    pub fn with_authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.authorizer = authorizer;
        self
    }

    #[cfg(test)]
    pub fn with_camera(mut self, camera: Arc<dyn CameraProvider>) -> Self {
        self.camera = camera;
        self
    }

    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    pub fn phase(&self) -> SessionPhase {
        self.active
            .as_ref()
            .map_or(SessionPhase::Idle, |active| active.session.phase())
    }

    pub fn active(&self) -> Option<&ActiveSession> {
        self.active.as_ref()
    }

    pub fn session(&self) -> Option<&AttendanceSession> {
        self.active.as_ref().map(|active| &active.session)
    }

    pub async fn start(
        &mut self,
        operator: &Operator,
        course_id: &CourseId,
        mode: AttendanceMode,
    ) -> AttendanceResult<&AttendanceSession> {
        if self.active.is_some() {
            return Err(AttendanceError::invalid_state("start", self.phase()));
        }

        let roster = self.resolver.resolve(course_id).await.map_err(|source| {
            AttendanceError::RosterUnavailable {
                course: course_id.clone(),
                source,
            }
        })?;

        if !self.authorizer.may_start(operator, &roster) {
            warn!("{} tried to take attendance for {}", operator.id, course_id);
            return Err(AttendanceError::NotAuthorized {
                operator: operator.id.clone(),
                course: course_id.clone(),
            });
        }

        self.open(operator.clone(), roster, mode)
    }

    /// Throws away the current roll-call and starts over on the same roster.
    pub fn restart(&mut self, mode: AttendanceMode) -> AttendanceResult<&AttendanceSession> {
        let previous = self
            .active
            .take()
            .ok_or_else(|| AttendanceError::invalid_state("restart", SessionPhase::Idle))?;
        info!(
            "Discarding session {} to restart in {} mode",
            previous.session.id(),
            mode
        );

        let ActiveSession {
            operator,
            roster,
            session,
            camera,
        } = previous;
        // The old lease has to go before a QR restart asks for a new one.
        drop(camera);
        drop(session);
        self.open(operator, roster, mode)
    }

    /// Discards the current roll-call without saving anything.
    pub fn cancel(&mut self) -> AttendanceResult<()> {
        let discarded = self
            .active
            .take()
            .ok_or_else(|| AttendanceError::invalid_state("cancel", SessionPhase::Idle))?;
        info!("Attendance session {} discarded", discarded.session.id());
        Ok(())
    }

    pub fn mark_present(&mut self, id: &ParticipantId) -> AttendanceResult<()> {
        self.session_mut("mark present")?.mark_present(id)
    }

    pub fn mark_absent(&mut self, id: &ParticipantId) -> AttendanceResult<()> {
        self.session_mut("mark absent")?.mark_absent(id)
    }

    pub fn check_in(&mut self, id: &ParticipantId) -> AttendanceResult<CheckInOutcome> {
        self.session_mut("check in")?.check_in(id)
    }

    pub fn check_in_next(&mut self) -> AttendanceResult<CheckInOutcome> {
        self.session_mut("check in")?.check_in_next()
    }

    /// Pops the pending QR acknowledgement, if any.
    pub fn take_acknowledgement(&mut self) -> Option<ParticipantId> {
        self.active
            .as_mut()
            .and_then(|active| active.session.take_acknowledgement())
    }

    pub fn summary(&self) -> AttendanceResult<AttendanceSummary> {
        self.session()
            .map(AttendanceSession::summary)
            .ok_or_else(|| AttendanceError::invalid_state("summarize", SessionPhase::Idle))
    }

    /// Saves the roll-call. On success the desk goes back to idle; on a
    /// persistence failure the session stays open so the operator can retry.
    pub async fn finish(&mut self) -> AttendanceResult<AttendanceOutcome> {
        let sink = Arc::clone(&self.sink);
        let outcome = self.session_mut("finish")?.finish(sink.as_ref()).await?;

        if let Some(done) = self.active.take() {
            trace!("Closing out session {}", done.session.id());
        }
        Ok(outcome)
    }

    fn open(
        &mut self,
        operator: Operator,
        roster: CourseRoster,
        mode: AttendanceMode,
    ) -> AttendanceResult<&AttendanceSession> {
        let camera = match mode {
            AttendanceMode::Qr => Some(
                self.camera
                    .acquire()
                    .map_err(AttendanceError::CameraUnavailable)?,
            ),
            AttendanceMode::Manual => None,
        };

        let session = AttendanceSession::new(
            roster.course_id.clone(),
            roster.participant_ids().cloned(),
            mode,
            today(self.timezone),
        );

        let active = self.active.insert(ActiveSession {
            operator,
            roster,
            session,
            camera,
        });
        Ok(&active.session)
    }

    fn session_mut(&mut self, operation: &'static str) -> AttendanceResult<&mut AttendanceSession> {
        self.active
            .as_mut()
            .map(|active| &mut active.session)
            .ok_or_else(|| AttendanceError::invalid_state(operation, SessionPhase::Idle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::models::CapabilitySet;
    use crate::directory::JsonDirectory;
    use crate::sink::MemoryRecordSink;

    const DIRECTORY: &str = r#"{
        "courses": [
            {
                "courseId": "math-101",
                "title": "Math",
                "instructorId": "t1",
                "participants": [
                    {"id": "A", "name": "Ali"},
                    {"id": "B", "name": "Berk"},
                    {"id": "C", "name": "Cem"}
                ]
            }
        ]
    }"#;

    struct Fixture {
        desk: AttendanceDesk,
        sink: Arc<MemoryRecordSink>,
        camera: SimulatedCamera,
    }

    fn fixture() -> Fixture {
        let directory = Arc::new(JsonDirectory::from_json(DIRECTORY).unwrap());
        let sink = Arc::new(MemoryRecordSink::new());
        let camera = SimulatedCamera::new();
        let desk = AttendanceDesk::new(directory, sink.clone())
            .with_camera(Arc::new(camera.clone()))
            .with_timezone(chrono_tz::Asia::Kolkata);
        Fixture { desk, sink, camera }
    }

    fn instructor() -> Operator {
        Operator::new("t1", "Aylin", CapabilitySet::MANAGE_COURSE)
    }

    fn course() -> CourseId {
        CourseId::new("math-101")
    }

    fn p(id: &str) -> ParticipantId {
        ParticipantId::new(id)
    }

    #[tokio::test]
    async fn idle_desk_rejects_session_operations() {
        let mut f = fixture();
        assert_eq!(f.desk.phase(), SessionPhase::Idle);

        for result in [
            f.desk.mark_present(&p("A")),
            f.desk.mark_absent(&p("A")),
            f.desk.cancel(),
        ] {
            assert!(matches!(
                result,
                Err(AttendanceError::InvalidSessionState {
                    phase: SessionPhase::Idle,
                    ..
                })
            ));
        }
        assert!(f.desk.check_in(&p("A")).is_err());
        assert!(f.desk.finish().await.is_err());
        assert!(f.desk.restart(AttendanceMode::Qr).is_err());
    }

    #[tokio::test]
    async fn manual_roll_call_is_persisted_and_desk_returns_to_idle() {
        let mut f = fixture();
        f.desk
            .start(&instructor(), &course(), AttendanceMode::Manual)
            .await
            .unwrap();
        f.desk.mark_present(&p("A")).unwrap();
        f.desk.mark_absent(&p("B")).unwrap();

        let outcome = f.desk.finish().await.unwrap();
        assert_eq!(outcome.record.present_ids, vec![p("A")]);
        assert_eq!(outcome.absent_ids, vec![p("B"), p("C")]);
        assert_eq!(outcome.record.date, today(chrono_tz::Asia::Kolkata));
        assert_eq!(f.desk.phase(), SessionPhase::Idle);
        assert_eq!(f.sink.records().await, vec![outcome.record]);
    }

    #[tokio::test]
    async fn qr_session_holds_the_camera_until_finished() {
        let mut f = fixture();
        f.desk
            .start(&instructor(), &course(), AttendanceMode::Qr)
            .await
            .unwrap();
        assert_eq!(f.camera.active_leases(), 1);

        f.desk.check_in(&p("C")).unwrap();
        f.desk.finish().await.unwrap();
        assert_eq!(f.camera.active_leases(), 0);
    }

    #[tokio::test]
    async fn cancel_and_restart_release_the_camera() {
        let mut f = fixture();
        f.desk
            .start(&instructor(), &course(), AttendanceMode::Qr)
            .await
            .unwrap();
        f.desk.check_in(&p("A")).unwrap();

        let restarted = f.desk.restart(AttendanceMode::Manual).unwrap();
        assert_eq!(restarted.mode(), AttendanceMode::Manual);
        assert_eq!(restarted.present_count(), 0);
        assert_eq!(f.camera.active_leases(), 0);

        f.desk.restart(AttendanceMode::Qr).unwrap();
        assert_eq!(f.camera.active_leases(), 1);
        f.desk.cancel().unwrap();
        assert_eq!(f.camera.active_leases(), 0);
        assert_eq!(f.desk.phase(), SessionPhase::Idle);
        assert!(f.sink.records().await.is_empty());
    }

    #[tokio::test]
    async fn dropping_the_desk_releases_the_camera() {
        let f = fixture();
        let Fixture {
            mut desk, camera, ..
        } = f;
        desk.start(&instructor(), &course(), AttendanceMode::Qr)
            .await
            .unwrap();
        drop(desk);
        assert_eq!(camera.active_leases(), 0);
    }

    #[tokio::test]
    async fn unavailable_camera_leaves_desk_idle() {
        let mut f = fixture();
        f.camera.set_unavailable(true);
        let err = f
            .desk
            .start(&instructor(), &course(), AttendanceMode::Qr)
            .await
            .unwrap_err();
        assert!(matches!(err, AttendanceError::CameraUnavailable(_)));
        assert_eq!(f.desk.phase(), SessionPhase::Idle);
    }

    #[tokio::test]
    async fn only_authorized_operators_may_start() {
        let mut f = fixture();
        let stranger = Operator::new("t9", "Other", CapabilitySet::MANAGE_COURSE);
        assert!(matches!(
            f.desk
                .start(&stranger, &course(), AttendanceMode::Manual)
                .await,
            Err(AttendanceError::NotAuthorized { .. })
        ));

        let admin = Operator::new("a1", "Admin", CapabilitySet::ADMIN_OVERRIDE);
        f.desk
            .start(&admin, &course(), AttendanceMode::Manual)
            .await
            .unwrap();
    }

    struct Nobody;

    impl Authorizer for Nobody {
        fn may_start(&self, _operator: &Operator, _course: &CourseRoster) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn custom_authorizer_is_consulted() {
        let f = fixture();
        let mut desk = f.desk.with_authorizer(Arc::new(Nobody));
        let admin = Operator::new("a1", "Admin", CapabilitySet::ADMIN_OVERRIDE);
        assert!(matches!(
            desk.start(&admin, &course(), AttendanceMode::Qr).await,
            Err(AttendanceError::NotAuthorized { .. })
        ));
        assert_eq!(f.camera.active_leases(), 0);
    }

    #[tokio::test]
    async fn acknowledgement_is_shown_once() {
        let mut f = fixture();
        assert_eq!(f.desk.take_acknowledgement(), None);
        f.desk
            .start(&instructor(), &course(), AttendanceMode::Qr)
            .await
            .unwrap();
        f.desk.check_in(&p("B")).unwrap();
        assert_eq!(f.desk.take_acknowledgement(), Some(p("B")));
        assert_eq!(f.desk.take_acknowledgement(), None);
    }

    #[tokio::test]
    async fn unknown_course_is_reported() {
        let mut f = fixture();
        let err = f
            .desk
            .start(&instructor(), &CourseId::new("art-9"), AttendanceMode::Manual)
            .await
            .unwrap_err();
        assert!(matches!(err, AttendanceError::RosterUnavailable { .. }));
    }

    #[tokio::test]
    async fn second_start_is_rejected_while_a_session_is_open() {
        let mut f = fixture();
        f.desk
            .start(&instructor(), &course(), AttendanceMode::Manual)
            .await
            .unwrap();
        assert!(matches!(
            f.desk
                .start(&instructor(), &course(), AttendanceMode::Qr)
                .await,
            Err(AttendanceError::InvalidSessionState {
                phase: SessionPhase::Open,
                ..
            })
        ));
        assert_eq!(f.camera.active_leases(), 0);
    }

    #[tokio::test]
    async fn persistence_failure_keeps_the_session_for_retry() {
        let mut f = fixture();
        f.sink.fail_next(1);
        f.desk
            .start(&instructor(), &course(), AttendanceMode::Qr)
            .await
            .unwrap();
        f.desk.check_in_next().unwrap();

        let err = f.desk.finish().await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(f.desk.phase(), SessionPhase::Open);
        assert_eq!(f.camera.active_leases(), 1);
        assert_eq!(f.desk.summary().unwrap().present, 1);

        let outcome = f.desk.finish().await.unwrap();
        assert_eq!(outcome.record.present_ids, vec![p("A")]);
        assert_eq!(f.desk.phase(), SessionPhase::Idle);
        assert_eq!(f.camera.active_leases(), 0);
    }
}
