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
mod attendance;
/// Camera access for QR roll-calls. A lease is held for as long as a QR session is open.
mod camera;
mod config;
/// Line-based operator front end.
mod console;
mod desk;
mod directory;
mod ids;
/// Where finished roll-calls are persisted.
mod sink;
mod utils;

use anyhow::Context as _;
use config::Config;
use console::Console;
use desk::AttendanceDesk;
use directory::JsonDirectory;
use sink::{HttpRecordSink, MemoryRecordSink, RecordSink};
use tokio::{io::BufReader, sync::RwLock};
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, reload, EnvFilter, Registry};

use std::{fs::File, sync::Arc};

pub type ReloadHandle = Arc<RwLock<reload::Handle<EnvFilter, Registry>>>;

fn setup_tracing(config: &Config) -> anyhow::Result<ReloadHandle> {
    let crate_name = env!("CARGO_CRATE_NAME");

    let (filter, reload_handle) = reload::Layer::new(EnvFilter::new(
        if config.is_production() && config.enable_debug_libraries {
            "info".to_string()
        } else if config.is_production() && !config.enable_debug_libraries {
            format!("{crate_name}=info")
        } else if config.enable_debug_libraries {
            "trace".to_string()
        } else {
            format!("{crate_name}=trace")
        },
    ));

    let log_file = File::create("edutrack.log").context("Failed to create subscriber")?;

    if !config.is_production() {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().pretty().with_writer(std::io::stderr))
            .with(fmt::layer().pretty().with_ansi(false).with_writer(log_file));

        tracing::subscriber::set_global_default(subscriber).context("Failed to set subscriber")?;
    } else {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().pretty().with_ansi(false).with_writer(log_file));

        tracing::subscriber::set_global_default(subscriber).context("Failed to set subscriber")?;
    }

    Ok(Arc::new(RwLock::new(reload_handle)))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let config = Config::from_env().context("Failed to load configuration")?;
    let reload_handle = setup_tracing(&config).context("Failed to setup tracing")?;

    info!("Tracing initialized. Continuing main...");
    let directory = Arc::new(
        JsonDirectory::load(&config.directory_path).context("Failed to load the directory")?,
    );
    let operator = directory
        .operator(&config.operator_id)
        .cloned()
        .with_context(|| format!("Operator {} is not in the directory", config.operator_id))?;

    let sink: Arc<dyn RecordSink> = match &config.records_url {
        Some(url) => Arc::new(HttpRecordSink::new(url.clone())),
        None => {
            warn!("RECORDS_URL is not set, finished roll-calls are only kept in memory");
            Arc::new(MemoryRecordSink::new())
        }
    };

    let desk = AttendanceDesk::new(directory, sink).with_timezone(config.timezone);
    let mut console = Console::new(desk, operator, Some(reload_handle));

    info!("Starting EduTrack attendance for {}...", config.operator_id);
    console::run(&mut console, BufReader::new(tokio::io::stdin())).await
}
