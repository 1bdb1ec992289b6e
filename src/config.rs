//! Configuration types.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::NaiveDate;
use chrono::format::{Item, StrftimeItems};
use secrecy::SecretString;

use crate::archive::FileNaming;
use crate::daybreak::DaybreakDocType;
use crate::error::ConfigError;
use crate::mail::folder_path;

/// Mail checker configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct CheckMailConfig {
    pub imap_host: String,
    pub imap_port: u16,
    pub username: String,
    pub password: SecretString,
    /// Folder the daybreak emails arrive in, as `a/b/c`.
    pub receiving_folder: String,
    /// Folder processed emails are moved to, as `a/b/c`.
    pub processed_folder: String,
    /// Server hierarchy delimiter used to join folder path segments.
    pub folder_delimiter: String,
    /// Staging root; daybreak files land in its `daybreak` subdirectory.
    pub staging_dir: PathBuf,
    /// Six-field cron expression for scheduled passes.
    pub cron_schedule: String,
    /// Whether the scheduler should run at all.
    pub scheduled: bool,
    /// chrono format pattern for the report date filename prefix.
    pub report_date_pattern: String,
    /// Document types a report needs before it is archived.
    pub required_types: BTreeSet<DaybreakDocType>,
    pub read_timeout: Duration,
}

impl CheckMailConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build config from any key lookup.
    ///
    /// `CHECKMAIL_HOST`, `CHECKMAIL_USER`, `CHECKMAIL_PASS` and
    /// `CHECKMAIL_PROCESSED` are required; everything else has a default.
    pub fn from_vars<F>(var: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            var(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
        };

        let imap_host = required("CHECKMAIL_HOST")?;
        let username = required("CHECKMAIL_USER")?;
        let password = SecretString::from(required("CHECKMAIL_PASS")?);
        let processed_folder = required("CHECKMAIL_PROCESSED")?;

        let imap_port = parse_or(&var, "CHECKMAIL_PORT", 993u16)?;
        let receiving_folder =
            var("CHECKMAIL_RECEIVING").unwrap_or_else(|| "INBOX".to_string());
        let folder_delimiter =
            var("CHECKMAIL_FOLDER_DELIMITER").unwrap_or_else(|| "/".to_string());
        let staging_dir = var("CHECKMAIL_STAGING_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./staging"));
        let cron_schedule =
            var("CHECKMAIL_CRON").unwrap_or_else(|| "0 */5 * * * *".to_string());
        let scheduled = parse_or(&var, "CHECKMAIL_SCHEDULED", true)?;
        let report_date_pattern =
            var("CHECKMAIL_REPORT_DATE_PATTERN").unwrap_or_else(|| "%Y%m%d".to_string());
        let read_timeout =
            Duration::from_secs(parse_or(&var, "CHECKMAIL_READ_TIMEOUT_SECS", 30u64)?);

        let required_types = match var("CHECKMAIL_REQUIRED_TYPES") {
            Some(list) => parse_doc_types(&list)?,
            None => DaybreakDocType::ALL.into_iter().collect(),
        };

        let config = Self {
            imap_host,
            imap_port,
            username,
            password,
            receiving_folder,
            processed_folder,
            folder_delimiter,
            staging_dir,
            cron_schedule,
            scheduled,
            report_date_pattern,
            required_types,
            read_timeout,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the values that cannot be caught while parsing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.required_types.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "CHECKMAIL_REQUIRED_TYPES".into(),
                message: "at least one document type is required".into(),
            });
        }
        validate_date_pattern(&self.report_date_pattern)?;
        cron::Schedule::from_str(&self.cron_schedule).map_err(|e| ConfigError::InvalidValue {
            key: "CHECKMAIL_CRON".into(),
            message: e.to_string(),
        })?;
        Ok(())
    }

    /// Receiving folder in server syntax.
    pub fn receiving_path(&self) -> String {
        folder_path(&self.receiving_folder, &self.folder_delimiter)
    }

    /// Processed folder in server syntax.
    pub fn processed_path(&self) -> String {
        folder_path(&self.processed_folder, &self.folder_delimiter)
    }

    /// Directory daybreak files are written to.
    pub fn daybreak_staging_dir(&self) -> PathBuf {
        self.staging_dir.join("daybreak")
    }
}

fn parse_or<F, T>(var: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match var(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn parse_doc_types(list: &str) -> Result<BTreeSet<DaybreakDocType>, ConfigError> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<DaybreakDocType>().map_err(|message| ConfigError::InvalidValue {
                key: "CHECKMAIL_REQUIRED_TYPES".into(),
                message,
            })
        })
        .collect()
}

/// Reject chrono patterns that would fail at format time or that would
/// not produce a plain file name.
pub fn validate_date_pattern(pattern: &str) -> Result<(), ConfigError> {
    let invalid = |message: String| ConfigError::InvalidValue {
        key: "CHECKMAIL_REPORT_DATE_PATTERN".into(),
        message,
    };
    if pattern.is_empty() || StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error)) {
        return Err(invalid(format!("invalid date pattern: {pattern:?}")));
    }

    // Time fields parse fine but fail when formatting a bare date.
    let prefix = FileNaming::new(pattern)
        .prefix(NaiveDate::default())
        .map_err(|_| invalid(format!("date pattern {pattern:?} cannot format a date")))?;
    if prefix.is_empty() || prefix.contains(['/', '\\', '\0']) {
        return Err(invalid(format!(
            "date pattern {pattern:?} does not produce a plain file name"
        )));
    }
    Ok(())
}
