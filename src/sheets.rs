use std::collections::HashSet;
use std::future::Future;

use anyhow::{Context, Result, anyhow};
use log::{debug, info};
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::auth::Credentials;
use crate::config::SheetConfig;
use crate::types::ReconciliationRow;

const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const SCOPES: &[&str] = &["https://www.googleapis.com/auth/spreadsheets"];

/// Append-only sheet that records one row per reconciled proposal.
pub trait ProposalSheet {
    /// Links already present in the sheet's link column.
    fn existing_links(&self) -> impl Future<Output = Result<HashSet<String>>> + Send;

    /// Appends all rows in a single call, returning how many rows the sheet reports as written.
    fn append_rows(&self, rows: &[ReconciliationRow]) -> impl Future<Output = Result<usize>> + Send;
}

pub struct SheetsClient {
    credentials: Credentials,
    spreadsheet_url: String,
    sheet_name: String,
    link_column: String,
    anchor_column: String,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct AppendResponse {
    updates: Option<UpdatedValues>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdatedValues {
    updated_rows: Option<usize>,
}

/// Quotes a sheet name for A1 notation unless it is a plain identifier.
fn quote_sheet_name(name: &str) -> String {
    if name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        name.to_owned()
    } else {
        format!("'{}'", name.replace('\'', "''"))
    }
}

fn column_range(sheet_name: &str, column: &str) -> String {
    format!("{}!{column}:{column}", quote_sheet_name(sheet_name))
}

fn links_from(range: ValueRange) -> HashSet<String> {
    range
        .values
        .into_iter()
        .filter_map(|row| row.into_iter().next())
        .filter_map(|cell| match cell {
            Value::String(s) if !s.is_empty() => Some(s),
            _ => None,
        })
        .collect()
}

fn append_body(rows: &[ReconciliationRow]) -> Value {
    let values: Vec<[&str; 4]> = rows.iter().map(ReconciliationRow::values).collect();
    json!({
        "majorDimension": "ROWS",
        "values": values,
    })
}

impl SheetsClient {
    pub fn from_config(config: &SheetConfig, credentials: Credentials) -> Self {
        Self::new(credentials, SHEETS_API, config)
    }

    pub fn new(credentials: Credentials, api_base: &str, config: &SheetConfig) -> Self {
        Self {
            credentials,
            spreadsheet_url: format!(
                "{}/{}",
                api_base.trim_end_matches('/'),
                config.spreadsheet_id
            ),
            sheet_name: config.sheet_name.clone(),
            link_column: config.link_column.clone(),
            anchor_column: config.anchor_column.clone(),
            client: Client::new(),
        }
    }

    fn values_url(&self, segment: &str) -> Result<Url> {
        let mut url = Url::parse(&self.spreadsheet_url)?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("{} cannot be a base URL", self.spreadsheet_url))?
            .push("values")
            .push(segment);
        Ok(url)
    }

    async fn send_authenticated(&self, req: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let req = self.credentials.authorize(req, SCOPES).await?;
        Ok(req.send().await?.error_for_status()?)
    }
}

impl ProposalSheet for SheetsClient {
    async fn existing_links(&self) -> Result<HashSet<String>> {
        let range = column_range(&self.sheet_name, &self.link_column);
        let response: ValueRange = self
            .send_authenticated(self.client.get(self.values_url(&range)?))
            .await
            .with_context(|| format!("failed to read {range}"))?
            .json()
            .await?;

        let links = links_from(response);
        debug!("Found {} existing links in {range}", links.len());
        Ok(links)
    }

    async fn append_rows(&self, rows: &[ReconciliationRow]) -> Result<usize> {
        // Anchoring on the first column keeps inserted rows from drifting right.
        let range = column_range(&self.sheet_name, &self.anchor_column);
        let mut url = self.values_url(&format!("{range}:append"))?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", "RAW")
            .append_pair("insertDataOption", "INSERT_ROWS");

        let response: AppendResponse = self
            .send_authenticated(self.client.post(url).json(&append_body(rows)))
            .await
            .with_context(|| format!("failed to append {} rows to {range}", rows.len()))?
            .json()
            .await?;

        let appended = response
            .updates
            .and_then(|u| u.updated_rows)
            .unwrap_or(rows.len());
        info!("Appended {appended} rows to {range}");
        Ok(appended)
    }
}
