//! Lambda HTTP surface: one `POST` endpoint per deployment, JSON in and JSON out.

use std::str::FromStr;

use anyhow::{anyhow, bail};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use log::{error, info, warn};
use serde_json::{Value, json};

use crate::config::{Config, Settings};
use crate::error::SyncError;
use crate::ingest::{ProposalFields, store_proposal};
use crate::reconcile::{ReconcileMode, reconcile};
use crate::sheets::{ProposalSheet, SheetsClient};
use crate::store::{FirestoreClient, ProposalStore};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Endpoint {
    /// Webhook payload to the store.
    Ingest,
    /// Store to sheet.
    Reconcile,
    /// Webhook payload to the store, then a reconciliation pass once the write has completed.
    IngestAndReconcile,
}

impl Endpoint {
    pub fn reconciles(&self) -> bool {
        matches!(self, Endpoint::Reconcile | Endpoint::IngestAndReconcile)
    }
}

impl FromStr for Endpoint {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ingest" => Ok(Endpoint::Ingest),
            "reconcile" => Ok(Endpoint::Reconcile),
            "ingest-and-reconcile" => Ok(Endpoint::IngestAndReconcile),
            other => bail!(
                "unknown endpoint {other:?}, expected ingest, reconcile or ingest-and-reconcile"
            ),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: String,
    /// Body exactly as delivered; decoded by `json` when `base64_encoded` is set.
    pub body: Option<String>,
    pub base64_encoded: bool,
}

impl HttpRequest {
    /// Reads a function URL / API Gateway v2 event, falling back to the v1 `httpMethod` key.
    pub fn from_event(event: &Value) -> Self {
        let method = event
            .pointer("/requestContext/http/method")
            .or_else(|| event.get("httpMethod"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();

        let body = event.get("body").and_then(Value::as_str).map(str::to_owned);
        let base64_encoded = event
            .get("isBase64Encoded")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        Self {
            method,
            body,
            base64_encoded,
        }
    }

    fn decoded_body(&self) -> Result<Option<String>, SyncError> {
        match &self.body {
            Some(body) if self.base64_encoded => {
                let bytes = STANDARD
                    .decode(body.trim())
                    .map_err(|e| SyncError::MalformedBody(format!("invalid base64: {e}")))?;
                String::from_utf8(bytes)
                    .map(Some)
                    .map_err(|e| SyncError::MalformedBody(format!("invalid UTF-8: {e}")))
            }
            body => Ok(body.clone()),
        }
    }

    pub fn json(&self) -> Result<Value, SyncError> {
        let body = self.decoded_body()?;
        match body.as_deref().map(str::trim) {
            None | Some("") => Err(SyncError::MalformedBody("empty body".to_owned())),
            Some(body) => {
                serde_json::from_str(body).map_err(|e| SyncError::MalformedBody(e.to_string()))
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Value,
}

impl HttpResponse {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: json!({ "success": true, "message": message.into() }),
        }
    }

    pub fn error(err: &SyncError) -> Self {
        Self {
            status: err.status_code(),
            body: json!({ "success": false, "error": err.to_string() }),
        }
    }

    pub fn from_result(result: Result<String, SyncError>) -> Self {
        match result {
            Ok(message) => {
                info!("{message}");
                Self::success(message)
            }
            Err(e) if e.is_client_error() => {
                warn!("Rejected request: {e}");
                Self::error(&e)
            }
            Err(e) => {
                error!("{e}");
                Self::error(&e)
            }
        }
    }

    pub fn into_event(self) -> Value {
        json!({
            "statusCode": self.status,
            "headers": { "content-type": "application/json" },
            "body": self.body.to_string(),
            "isBase64Encoded": false,
        })
    }
}

/// Work a request asks for, decided before any external client is built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    Ingest(ProposalFields),
    Reconcile,
    IngestAndReconcile(ProposalFields),
}

/// Checks the method, body, and required fields, in that order.
pub fn prepare(
    endpoint: Endpoint,
    settings: &Settings,
    request: &HttpRequest,
) -> Result<Action, SyncError> {
    if !request.method.eq_ignore_ascii_case("POST") {
        return Err(SyncError::MethodNotAllowed(request.method.clone()));
    }
    match endpoint {
        Endpoint::Ingest => Ok(Action::Ingest(settings.schema.extract(&request.json()?)?)),
        Endpoint::Reconcile => Ok(Action::Reconcile),
        Endpoint::IngestAndReconcile => Ok(Action::IngestAndReconcile(
            settings.schema.extract(&request.json()?)?,
        )),
    }
}

pub struct Pipeline<S, T> {
    pub store: S,
    pub sheet: Option<T>,
    pub settings: Settings,
}

impl Pipeline<FirestoreClient, SheetsClient> {
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let credentials = config.credentials.load()?;
        let sheet = config
            .sheet
            .as_ref()
            .map(|sheet| SheetsClient::from_config(sheet, credentials.clone()));
        let store = FirestoreClient::from_config(config, credentials).await?;

        Ok(Self {
            store,
            sheet,
            settings: config.settings.clone(),
        })
    }
}

impl<S: ProposalStore, T: ProposalSheet> Pipeline<S, T> {
    fn sheet(&self) -> Result<&T, SyncError> {
        self.sheet
            .as_ref()
            .ok_or_else(|| SyncError::Initialization(anyhow!("no spreadsheet configured")))
    }

    pub async fn run(&self, action: Action) -> Result<String, SyncError> {
        match action {
            Action::Ingest(fields) => {
                store_proposal(&self.store, fields, &self.settings.link_template).await?;
                Ok("Data stored in Firestore successfully.".to_owned())
            }
            Action::Reconcile => {
                let report = reconcile(
                    &self.store,
                    self.sheet()?,
                    self.settings.timezone,
                    ReconcileMode::Apply,
                )
                .await?;
                Ok(report.summary())
            }
            Action::IngestAndReconcile(fields) => {
                let sheet = self.sheet()?;
                store_proposal(&self.store, fields, &self.settings.link_template).await?;
                let report =
                    reconcile(&self.store, sheet, self.settings.timezone, ReconcileMode::Apply)
                        .await?;
                Ok(format!("Data processed successfully. {}", report.summary()))
            }
        }
    }

    pub async fn handle(&self, endpoint: Endpoint, request: &HttpRequest) -> HttpResponse {
        let result = match prepare(endpoint, &self.settings, request) {
            Ok(action) => self.run(action).await,
            Err(e) => Err(e),
        };
        HttpResponse::from_result(result)
    }
}

/// Serves one Lambda event, building clients only once the request itself is known to be valid.
pub async fn respond(config: &Config, event: &Value) -> HttpResponse {
    let result = async {
        let request = HttpRequest::from_event(event);
        let action = prepare(config.endpoint, &config.settings, &request)?;
        let pipeline = Pipeline::from_config(config)
            .await
            .map_err(SyncError::Initialization)?;
        pipeline.run(action).await
    }
    .await;
    HttpResponse::from_result(result)
}
