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
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, trace};

use crate::attendance::AttendanceRecord;

/// Where finished roll-calls end up.
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn persist(&self, record: &AttendanceRecord) -> anyhow::Result<()>;
}

/// Posts each record as JSON to a records endpoint.
pub struct HttpRecordSink {
    client: reqwest::Client,
    url: String,
}

impl HttpRecordSink {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl RecordSink for HttpRecordSink {
    async fn persist(&self, record: &AttendanceRecord) -> anyhow::Result<()> {
        debug!("Posting attendance record {} to {}", record.session_id, self.url);
        let response = self
            .client
            .post(&self.url)
            .json(record)
            .send()
            .await
            .context("Failed to successfully post attendance record")?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "Server responded with an error: {:?}",
                response.status()
            ));
        }

        trace!("Record {} accepted", record.session_id);
        Ok(())
    }
}

/// Keeps records in memory. Used when no records endpoint is configured.
#[derive(Default)]
pub struct MemoryRecordSink {
    records: Mutex<Vec<AttendanceRecord>>,
    failures_pending: AtomicUsize,
}

impl MemoryRecordSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` persist calls fail as if the backend were unreachable.
    #[cfg(test)]
    pub fn fail_next(&self, count: usize) {
        self.failures_pending.store(count, Ordering::SeqCst);
    }

    #[cfg(test)]
    pub async fn records(&self) -> Vec<AttendanceRecord> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl RecordSink for MemoryRecordSink {
    async fn persist(&self, record: &AttendanceRecord) -> anyhow::Result<()> {
        let failing = self
            .failures_pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(anyhow!("Records store unreachable"));
        }

        self.records.lock().await.push(record.clone());
        debug!("Stored attendance record {} in memory", record.session_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{CourseId, ParticipantId, SessionId};
    use chrono::NaiveDate;

    fn record() -> AttendanceRecord {
        AttendanceRecord {
            session_id: SessionId::generate(),
            course_id: CourseId::new("math-101"),
            date: NaiveDate::from_ymd_opt(2024, 9, 2).unwrap(),
            present_ids: vec![ParticipantId::new("s1")],
        }
    }

    #[tokio::test]
    async fn memory_sink_fails_only_the_requested_number_of_times() {
        let sink = MemoryRecordSink::new();
        sink.fail_next(2);

        assert!(sink.persist(&record()).await.is_err());
        assert!(sink.persist(&record()).await.is_err());
        assert!(sink.persist(&record()).await.is_ok());
        assert_eq!(sink.records().await.len(), 1);
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_an_error() {
        let sink = HttpRecordSink::new("http://127.0.0.1:9/records");
        assert!(sink.persist(&record()).await.is_err());
    }
}
