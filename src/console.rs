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
use anyhow::{anyhow, Context as _};
use clap::{ColorChoice, Parser, Subcommand};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::attendance::{AttendanceError, AttendanceMode, CheckInOutcome, Mark};
use crate::desk::AttendanceDesk;
use crate::directory::models::Operator;
use crate::ids::{CourseId, ParticipantId};
use crate::ReloadHandle;

#[derive(Debug, Parser)]
#[command(
    name = "edutrack",
    no_binary_name = true,
    disable_version_flag = true,
    color = ColorChoice::Never
)]
struct CommandLine {
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Debug, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Open a roll-call in manual or qr mode
    Start {
        course: CourseId,
        mode: AttendanceMode,
    },
    /// Mark a participant present (manual)
    Present { id: ParticipantId },
    /// Mark a participant absent (manual)
    Absent { id: ParticipantId },
    /// QR check-in, or simulate the next scan without an id
    Scan { id: Option<ParticipantId> },
    /// Show the roll-call
    Status,
    /// Save the roll-call
    Finish,
    /// Discard the roll-call
    Cancel,
    /// Discard and start over in another mode
    Restart { mode: AttendanceMode },
    /// Change the log filter
    Log { filter: String },
    /// Show the operator
    #[command(name = "whoami")]
    WhoAmI,
    /// Leave
    #[command(alias = "exit")]
    Quit,
}

/// Parses one operator line. Blank lines yield `None`, and `help` comes back as an
/// error carrying the usage text.
pub fn parse_command(line: &str) -> anyhow::Result<Option<Command>> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let args = std::iter::once(verb.to_lowercase()).chain(words.map(str::to_string));

    let parsed = CommandLine::try_parse_from(args)?;
    Ok(Some(parsed.command))
}

pub enum Reply {
    Text(String),
    Quit,
}

pub struct Console {
    desk: AttendanceDesk,
    operator: Operator,
    log_reload_handle: Option<ReloadHandle>,
}

impl Console {
    pub fn new(desk: AttendanceDesk, operator: Operator, log_reload_handle: Option<ReloadHandle>) -> Self {
        Self {
            desk,
            operator,
            log_reload_handle,
        }
    }

    pub async fn handle(&mut self, command: Command) -> Reply {
        debug!("Handling {:?}", command);
        if command == Command::Quit {
            return Reply::Quit;
        }

        let text = match self.execute(command).await {
            Ok(text) => text,
            Err(e) => match e.downcast_ref::<AttendanceError>() {
                Some(err) if err.is_retryable() => {
                    format!("{}. Type 'finish' to try again.", err)
                }
                _ => format!("{:#}", e),
            },
        };
        Reply::Text(text)
    }

    async fn execute(&mut self, command: Command) -> anyhow::Result<String> {
        match command {
            Command::Start { course, mode } => {
                let session = self.desk.start(&self.operator, &course, mode).await?;
                let reply = format!(
                    "Started {} roll-call for {} ({} on the roster)",
                    mode,
                    course,
                    session.roster().len()
                );
                Ok(reply)
            }
            Command::Present { id } => {
                self.desk.mark_present(&id)?;
                Ok(format!("{} marked present", self.display_name(&id)))
            }
            Command::Absent { id } => {
                self.desk.mark_absent(&id)?;
                Ok(format!("{} marked absent", self.display_name(&id)))
            }
            Command::Scan { id } => {
                let outcome = match id {
                    Some(id) => self.desk.check_in(&id)?,
                    None => self.desk.check_in_next()?,
                };
                Ok(match outcome {
                    CheckInOutcome::CheckedIn(id) => {
                        format!("{} checked in", self.display_name(&id))
                    }
                    CheckInOutcome::AlreadyCheckedIn(id) => {
                        format!("{} is already checked in", self.display_name(&id))
                    }
                    CheckInOutcome::NoRemainingParticipants => {
                        "Everyone is already checked in".to_string()
                    }
                })
            }
            Command::Status => self.status(),
            Command::Finish => {
                let outcome = self.desk.finish().await?;
                info!(
                    "Saved roll-call {} for {}",
                    outcome.record.session_id, outcome.record.course_id
                );
                Ok(format!(
                    "Saved {} for {}: {} present, {} absent",
                    outcome.record.date,
                    outcome.record.course_id,
                    outcome.record.present_ids.len(),
                    outcome.absent_ids.len()
                ))
            }
            Command::Cancel => {
                self.desk.cancel()?;
                Ok("Roll-call discarded".to_string())
            }
            Command::Restart { mode } => {
                let session = self.desk.restart(mode)?;
                Ok(format!("Restarted in {} mode", session.mode()))
            }
            Command::Log { filter } => self.reload_log_filter(&filter).await,
            Command::WhoAmI => Ok(format!(
                "{} ({}), broadcast: {}",
                self.operator.name,
                self.operator.id,
                if self.operator.can_broadcast() { "yes" } else { "no" }
            )),
            Command::Quit => Ok(String::new()),
        }
    }

    fn status(&mut self) -> anyhow::Result<String> {
        let summary = self.desk.summary()?;
        let acknowledged = self.desk.take_acknowledgement();
        let active = self
            .desk
            .active()
            .ok_or_else(|| anyhow!("No roll-call is open"))?;
        let session = &active.session;

        let mut out = format!(
            "{} ({} mode, {}): {} present, {} absent, {} unmarked\n",
            active.roster.title,
            session.mode(),
            session.date(),
            summary.present,
            summary.absent,
            summary.unmarked
        );
        if let Some(camera) = active.camera() {
            out.push_str(&format!("Camera: {}\n", camera.label()));
        }
        if let Some(last) = acknowledged.and_then(|id| active.roster.participant(&id)) {
            out.push_str(&format!("Last check-in: {}\n", last.name));
        }
        for participant in &active.roster.participants {
            let mark = match session.mark_of(&participant.id) {
                Mark::Present => "present",
                Mark::Absent => "absent",
                Mark::Unmarked => "-",
            };
            match &participant.avatar {
                Some(avatar) => out.push_str(&format!(
                    "- {} {} [{}]: {}\n",
                    participant.id, participant.name, avatar, mark
                )),
                None => out.push_str(&format!("- {} {}: {}\n", participant.id, participant.name, mark)),
            }
        }
        Ok(out.trim_end().to_string())
    }

    async fn reload_log_filter(&self, filter: &str) -> anyhow::Result<String> {
        let handle = self
            .log_reload_handle
            .as_ref()
            .ok_or_else(|| anyhow!("Log filter cannot be changed in this build"))?;
        let filter = EnvFilter::try_new(filter).context("Invalid log filter")?;
        handle
            .read()
            .await
            .reload(filter)
            .context("Failed to reload the log filter")?;
        Ok("Log filter updated".to_string())
    }

    fn display_name(&self, id: &ParticipantId) -> String {
        self.desk
            .active()
            .and_then(|active| active.roster.participant(id))
            .map_or_else(|| id.to_string(), |p| p.name.clone())
    }
}

/// Reads commands line by line until `quit` or end of input.
pub async fn run<R>(console: &mut Console, input: R) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    println!("EduTrack attendance. Type 'help' for commands.");

    while let Some(line) = lines.next_line().await.context("Failed to read input")? {
        let command = match parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                println!("{}", e);
                continue;
            }
        };

        match console.handle(command).await {
            Reply::Text(text) => println!("{}", text),
            Reply::Quit => break,
        }
    }

    if let Err(e) = console.desk.cancel() {
        debug!("Nothing to discard on exit: {}", e);
    } else {
        warn!("Exited with an unsaved roll-call, it was discarded");
    }
    Ok(())
}
