use std::env;

use anyhow::{Context, Result, anyhow};
use chrono_tz::Tz;
use log::debug;

use crate::auth::CredentialSource;
use crate::http::Endpoint;
use crate::ingest::IngestSchema;
use crate::store::DEFAULT_COLLECTION;
use crate::types::{DEFAULT_LINK_TEMPLATE, LinkTemplate};

pub const DEFAULT_TIMEZONE: &str = "Europe/Kyiv";
pub const DEFAULT_LINK_COLUMN: &str = "D";
pub const DEFAULT_ANCHOR_COLUMN: &str = "A";

/// Behaviour that does not depend on any external service.
#[derive(Clone, Debug)]
pub struct Settings {
    pub schema: IngestSchema,
    pub link_template: LinkTemplate,
    pub timezone: Tz,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            schema: IngestSchema::default(),
            link_template: LinkTemplate::default(),
            timezone: chrono_tz::Europe::Kyiv,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SheetConfig {
    pub spreadsheet_id: String,
    pub sheet_name: String,
    /// Column holding proposal links, checked for duplicates.
    pub link_column: String,
    /// Column that appends are anchored to.
    pub anchor_column: String,
}

#[derive(Debug)]
pub struct Config {
    pub endpoint: Endpoint,
    pub settings: Settings,
    pub credentials: CredentialSource,
    pub project_id: Option<String>,
    pub collection: String,
    pub emulator_host: Option<String>,
    pub sheet: Option<SheetConfig>,
}

pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.parse::<Tz>()
        .map_err(|e| anyhow!("invalid timezone {name:?}: {e}"))
}

fn optional_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_or(name: &str, default: &str) -> String {
    optional_env(name).unwrap_or_else(|| default.to_owned())
}

/// Resolves the service-account key from the environment. An inline key wins over a key file.
/// With neither set, only an ingest-only process talking to the Firestore emulator may run
/// unauthenticated.
pub fn credential_source(
    endpoint: Endpoint,
    emulator_host: Option<&str>,
) -> Result<CredentialSource> {
    match CredentialSource::from_env() {
        Ok(source) => Ok(source),
        Err(_) if emulator_host.is_some() && !endpoint.reconciles() => Ok(CredentialSource::None),
        Err(e) => Err(e),
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let endpoint: Endpoint = env_or("PROPOSALSYNC_ENDPOINT", "ingest").parse()?;

        let settings = Settings {
            schema: env_or("PROPOSAL_INGEST_SCHEMA", "nested").parse()?,
            link_template: LinkTemplate::new(env_or(
                "PROPOSAL_LINK_TEMPLATE",
                DEFAULT_LINK_TEMPLATE,
            ))?,
            timezone: parse_timezone(&env_or("PROPOSAL_TIMEZONE", DEFAULT_TIMEZONE))?,
        };

        let emulator_host = optional_env("FIRESTORE_EMULATOR_HOST");
        let credentials = credential_source(endpoint, emulator_host.as_deref())?;

        let sheet = if endpoint.reconciles() {
            Some(SheetConfig {
                spreadsheet_id: env::var("SPREADSHEET_ID")
                    .context("SPREADSHEET_ID env var not set")?,
                sheet_name: env::var("SHEET_NAME").context("SHEET_NAME env var not set")?,
                link_column: env_or("SHEET_LINK_COLUMN", DEFAULT_LINK_COLUMN),
                anchor_column: env_or("SHEET_ANCHOR_COLUMN", DEFAULT_ANCHOR_COLUMN),
            })
        } else {
            None
        };

        let config = Self {
            endpoint,
            settings,
            credentials,
            project_id: optional_env("GOOGLE_CLOUD_PROJECT"),
            collection: env_or("FIRESTORE_COLLECTION", DEFAULT_COLLECTION),
            emulator_host,
            sheet,
        };
        debug!("{config:?}");

        Ok(config)
    }
}
