use std::collections::HashMap;
use std::future::Future;

use anyhow::{Context, Result, anyhow};
use log::{debug, warn};
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::auth::Credentials;
use crate::config::Config;
use crate::types::{LinkTemplate, Proposal};

const FIRESTORE_API: &str = "https://firestore.googleapis.com/v1";
const SCOPES: &[&str] = &["https://www.googleapis.com/auth/datastore"];

pub const DEFAULT_COLLECTION: &str = "proposals";

const CREATED_AT: &str = "createdAt";
const SCANNER_NAME: &str = "scannerName";
const PROPOSAL_LINK: &str = "proposalLink";

/// Keyed document store holding proposals by uid.
pub trait ProposalStore {
    /// Writes the proposal under its uid, replacing whatever was there.
    fn upsert(&self, proposal: &Proposal) -> impl Future<Output = Result<()>> + Send;

    /// Every stored proposal, ascending by `createdAt`.
    fn proposals_by_creation(&self) -> impl Future<Output = Result<Vec<Proposal>>> + Send;
}

pub struct FirestoreClient {
    credentials: Credentials,
    documents_url: String,
    collection: String,
    link_template: LinkTemplate,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct RunQueryItem {
    document: Option<Document>,
}

#[derive(Debug, Deserialize)]
struct Document {
    name: String,
    #[serde(default)]
    fields: HashMap<String, FieldValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FieldValue {
    string_value: Option<String>,
    integer_value: Option<String>,
}

impl FieldValue {
    fn as_str(&self) -> Option<&str> {
        self.string_value
            .as_deref()
            .or(self.integer_value.as_deref())
    }
}

impl Document {
    fn uid(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }

    fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(FieldValue::as_str)
    }

    fn into_proposal(self, link_template: &LinkTemplate) -> Option<Proposal> {
        let uid = self.uid().to_owned();
        let Some(created_at) = self.field(CREATED_AT) else {
            warn!("Skipping stored proposal {uid}: no {CREATED_AT} field");
            return None;
        };
        Some(Proposal {
            created_at: created_at.to_owned(),
            scanner_name: self.field(SCANNER_NAME).unwrap_or_default().to_owned(),
            proposal_link: self
                .field(PROPOSAL_LINK)
                .map(str::to_owned)
                .unwrap_or_else(|| link_template.link(&uid)),
            uid,
        })
    }
}

fn document_body(proposal: &Proposal) -> Value {
    json!({
        "fields": {
            PROPOSAL_LINK: { "stringValue": proposal.proposal_link },
            CREATED_AT: { "stringValue": proposal.created_at },
            SCANNER_NAME: { "stringValue": proposal.scanner_name },
        }
    })
}

fn ordered_query(collection: &str) -> Value {
    json!({
        "structuredQuery": {
            "from": [{ "collectionId": collection }],
            "orderBy": [{
                "field": { "fieldPath": CREATED_AT },
                "direction": "ASCENDING",
            }],
        }
    })
}

impl FirestoreClient {
    /// Builds a client for the configured project, talking to the emulator when one is set.
    pub async fn from_config(config: &Config, credentials: Credentials) -> Result<Self> {
        let (api_base, credentials) = match &config.emulator_host {
            Some(host) => (format!("http://{host}/v1"), Credentials::Anonymous),
            None => (FIRESTORE_API.to_owned(), credentials),
        };

        let project_id = match &config.project_id {
            Some(p) => p.clone(),
            None => credentials
                .project_id()
                .await?
                .context("GOOGLE_CLOUD_PROJECT env var not set")?,
        };

        Ok(Self::new(
            credentials,
            &api_base,
            &project_id,
            &config.collection,
            config.settings.link_template.clone(),
        ))
    }

    pub fn new(
        credentials: Credentials,
        api_base: &str,
        project_id: &str,
        collection: &str,
        link_template: LinkTemplate,
    ) -> Self {
        Self {
            credentials,
            documents_url: format!(
                "{}/projects/{}/databases/(default)/documents",
                api_base.trim_end_matches('/'),
                project_id
            ),
            collection: collection.to_owned(),
            link_template,
            client: Client::new(),
        }
    }

    fn document_url(&self, uid: &str) -> Result<Url> {
        let mut url = Url::parse(&self.documents_url)?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("{} cannot be a base URL", self.documents_url))?
            .push(&self.collection)
            .push(uid);
        Ok(url)
    }

    fn run_query_url(&self) -> String {
        format!("{}:runQuery", self.documents_url)
    }

    async fn send_authenticated(&self, req: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let req = self.credentials.authorize(req, SCOPES).await?;
        Ok(req.send().await?.error_for_status()?)
    }
}

impl ProposalStore for FirestoreClient {
    async fn upsert(&self, proposal: &Proposal) -> Result<()> {
        let url = self.document_url(&proposal.uid)?;
        self.send_authenticated(self.client.patch(url).json(&document_body(proposal)))
            .await
            .with_context(|| format!("failed to store proposal {}", proposal.uid))?;
        debug!("Stored proposal {} in {}", proposal.uid, self.collection);
        Ok(())
    }

    async fn proposals_by_creation(&self) -> Result<Vec<Proposal>> {
        let response: Vec<RunQueryItem> = self
            .send_authenticated(
                self.client
                    .post(self.run_query_url())
                    .json(&ordered_query(&self.collection)),
            )
            .await
            .with_context(|| format!("failed to query {}", self.collection))?
            .json()
            .await?;

        let proposals: Vec<Proposal> = response
            .into_iter()
            .filter_map(|item| item.document)
            .filter_map(|doc| doc.into_proposal(&self.link_template))
            .collect();
        debug!("Fetched {} stored proposals", proposals.len());

        Ok(proposals)
    }
}
