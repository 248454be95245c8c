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
use std::path::PathBuf;

use anyhow::Context;
use chrono_tz::Tz;

use crate::ids::OperatorId;
use crate::utils::time::parse_timezone;

/// Settings read from the environment (and `.env`, if present).
#[derive(Debug, Clone)]
pub struct Config {
    pub env: String,
    pub enable_debug_libraries: bool,
    pub directory_path: PathBuf,
    pub operator_id: OperatorId,
    pub records_url: Option<String>,
    pub timezone: Tz,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let env = lookup("EDUTRACK_RUST_ENV").context("EDUTRACK_RUST_ENV was not found in the ENV")?;
        let enable_debug_libraries: bool = lookup("ENABLE_DEBUG_LIBRARIES")
            .context("ENABLE_DEBUG_LIBRARIES was not found in the ENV")?
            .parse()
            .context("Failed to parse ENABLE_DEBUG_LIBRARIES")?;
        let directory_path: PathBuf = lookup("DIRECTORY_PATH")
            .context("DIRECTORY_PATH was not found in the ENV")?
            .into();
        let operator_id = lookup("OPERATOR_ID")
            .map(OperatorId::new)
            .context("OPERATOR_ID was not found in the ENV")?;
        let records_url = lookup("RECORDS_URL").filter(|url| !url.trim().is_empty());
        let timezone = match lookup("EDUTRACK_TIMEZONE") {
            Some(name) => parse_timezone(&name).context("Failed to parse EDUTRACK_TIMEZONE")?,
            None => chrono_tz::UTC,
        };

        Ok(Self {
            env,
            enable_debug_libraries,
            directory_path,
            operator_id,
            records_url,
            timezone,
        })
    }

    pub fn is_production(&self) -> bool {
        self.env == "production"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    const REQUIRED: [(&str, &str); 4] = [
        ("EDUTRACK_RUST_ENV", "development"),
        ("ENABLE_DEBUG_LIBRARIES", "false"),
        ("DIRECTORY_PATH", "data/directory.json"),
        ("OPERATOR_ID", "t1"),
    ];

    #[test]
    fn optional_settings_have_defaults() {
        let config = Config::from_lookup(lookup(&REQUIRED)).unwrap();
        assert!(!config.is_production());
        assert_eq!(config.timezone, chrono_tz::UTC);
        assert!(config.records_url.is_none());
        assert_eq!(config.operator_id, OperatorId::new("t1"));
    }

    #[test]
    fn reads_optional_settings() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("RECORDS_URL", "http://localhost:8080/attendance"));
        pairs.push(("EDUTRACK_TIMEZONE", "Asia/Kolkata"));
        let config = Config::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(config.timezone, chrono_tz::Asia::Kolkata);
        assert_eq!(
            config.records_url.as_deref(),
            Some("http://localhost:8080/attendance")
        );
    }

    #[test]
    fn missing_or_bad_values_are_errors() {
        assert!(Config::from_lookup(lookup(&REQUIRED[..3])).is_err());

        let mut pairs = REQUIRED.to_vec();
        pairs[1] = ("ENABLE_DEBUG_LIBRARIES", "sometimes");
        assert!(Config::from_lookup(lookup(&pairs)).is_err());
    }
}
