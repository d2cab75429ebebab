use std::str::FromStr;

use anyhow::bail;
use log::{debug, info};
use serde_json::{Map, Value};

use crate::error::SyncError;
use crate::flatten::flatten;
use crate::store::ProposalStore;
use crate::types::{LinkTemplate, Proposal};

const UID: &str = "uid";
const CREATED_AT: &str = "createdAt";
const SCANNER_NAME: &str = "scannerName";

const REQUIRED_FIELDS: [&str; 3] = [UID, CREATED_AT, SCANNER_NAME];
const PROPOSAL_PATH: [&str; 2] = ["data", "proposal"];

/// How proposal fields are located in a webhook body.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum IngestSchema {
    /// Fields live under `data.proposal`.
    #[default]
    Nested,
    /// The body is flattened first and fields are read from `data_proposal_*` keys.
    Flattened,
}

impl FromStr for IngestSchema {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nested" => Ok(IngestSchema::Nested),
            "flattened" | "flat" => Ok(IngestSchema::Flattened),
            other => bail!("unknown ingest schema {other:?}, expected nested or flattened"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProposalFields {
    pub uid: String,
    pub created_at: String,
    pub scanner_name: String,
}

impl ProposalFields {
    pub fn into_proposal(self, link_template: &LinkTemplate) -> Proposal {
        Proposal {
            proposal_link: link_template.link(&self.uid),
            uid: self.uid,
            created_at: self.created_at,
            scanner_name: self.scanner_name,
        }
    }
}

/// Non-empty text for a field; numbers are accepted since some senders deliver uids unquoted.
fn field_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn nested_proposal(body: &Value) -> Option<&Map<String, Value>> {
    PROPOSAL_PATH
        .iter()
        .try_fold(body, |value, key| value.get(key))?
        .as_object()
}

impl IngestSchema {
    fn lookup(&self, body: &Value) -> [Option<String>; 3] {
        match self {
            IngestSchema::Nested => {
                let proposal = nested_proposal(body);
                REQUIRED_FIELDS.map(|field| field_text(proposal.and_then(|p| p.get(field))))
            }
            IngestSchema::Flattened => {
                let flat = body.as_object().map(flatten).unwrap_or_default();
                let prefix = PROPOSAL_PATH.join("_");
                REQUIRED_FIELDS.map(|field| field_text(flat.get(&format!("{prefix}_{field}"))))
            }
        }
    }

    /// Pulls the required fields out of a webhook body, naming every one that is missing or empty.
    pub fn extract(&self, body: &Value) -> Result<ProposalFields, SyncError> {
        let [uid, created_at, scanner_name] = self.lookup(body);
        match (uid, created_at, scanner_name) {
            (Some(uid), Some(created_at), Some(scanner_name)) => Ok(ProposalFields {
                uid,
                created_at,
                scanner_name,
            }),
            (uid, created_at, scanner_name) => {
                let present = [uid.is_some(), created_at.is_some(), scanner_name.is_some()];
                let missing = REQUIRED_FIELDS
                    .iter()
                    .zip(present)
                    .filter(|(_, present)| !present)
                    .map(|(field, _)| *field)
                    .collect();
                Err(SyncError::Validation { missing })
            }
        }
    }
}

/// Upserts already-validated fields under their uid.
pub async fn store_proposal<S: ProposalStore>(
    store: &S,
    fields: ProposalFields,
    link_template: &LinkTemplate,
) -> Result<Proposal, SyncError> {
    let proposal = fields.into_proposal(link_template);
    debug!("Ingesting proposal {}: {}", proposal.uid, proposal.proposal_link);

    store.upsert(&proposal).await.map_err(SyncError::Storage)?;
    info!("Stored proposal {}", proposal.uid);

    Ok(proposal)
}

/// Validates a webhook body and upserts the proposal it describes, keyed by uid.
pub async fn ingest<S: ProposalStore>(
    store: &S,
    schema: IngestSchema,
    link_template: &LinkTemplate,
    body: &Value,
) -> Result<Proposal, SyncError> {
    let fields = schema.extract(body)?;
    store_proposal(store, fields, link_template).await
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use anyhow::{Result, anyhow};
    use serde_json::json;

    /// In-memory store keyed by uid, counting writes.
    #[derive(Default)]
    pub(crate) struct MemoryStore {
        pub(crate) docs: Mutex<HashMap<String, Proposal>>,
        pub(crate) writes: Mutex<usize>,
        pub(crate) fail: bool,
    }

    impl MemoryStore {
        pub(crate) fn with(proposals: impl IntoIterator<Item = Proposal>) -> Self {
            let store = Self::default();
            store.docs.lock().unwrap().extend(
                proposals
                    .into_iter()
                    .map(|p| (p.uid.clone(), p)),
            );
            store
        }

        pub(crate) fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        pub(crate) fn write_count(&self) -> usize {
            *self.writes.lock().unwrap()
        }
    }

    impl ProposalStore for MemoryStore {
        async fn upsert(&self, proposal: &Proposal) -> Result<()> {
            if self.fail {
                return Err(anyhow!("store unavailable"));
            }
            *self.writes.lock().unwrap() += 1;
            self.docs
                .lock()
                .unwrap()
                .insert(proposal.uid.clone(), proposal.clone());
            Ok(())
        }

        async fn proposals_by_creation(&self) -> Result<Vec<Proposal>> {
            if self.fail {
                return Err(anyhow!("store unavailable"));
            }
            let mut proposals: Vec<Proposal> =
                self.docs.lock().unwrap().values().cloned().collect();
            proposals.sort_by(|a, b| a.created_at.cmp(&b.created_at));
            Ok(proposals)
        }
    }

    fn nested_body() -> Value {
        json!({
            "event": "proposal.created",
            "data": {
                "proposal": {
                    "uid": "12345",
                    "createdAt": "2024-03-05T12:00:00.000000Z",
                    "scannerName": "Alice",
                    "extra": { "ignored": true },
                }
            }
        })
    }

    #[test]
    fn test_schema_from_str() -> Result<()> {
        assert_eq!("nested".parse::<IngestSchema>()?, IngestSchema::Nested);
        assert_eq!("Flattened".parse::<IngestSchema>()?, IngestSchema::Flattened);
        assert!("xml".parse::<IngestSchema>().is_err());
        Ok(())
    }

    #[test]
    fn test_extract_nested() -> Result<(), SyncError> {
        let fields = IngestSchema::Nested.extract(&nested_body())?;
        assert_eq!(
            fields,
            ProposalFields {
                uid: "12345".to_owned(),
                created_at: "2024-03-05T12:00:00.000000Z".to_owned(),
                scanner_name: "Alice".to_owned(),
            }
        );
        Ok(())
    }

    #[test]
    fn test_extract_flattened_matches_nested() -> Result<(), SyncError> {
        assert_eq!(
            IngestSchema::Flattened.extract(&nested_body())?,
            IngestSchema::Nested.extract(&nested_body())?
        );
        Ok(())
    }

    #[test]
    fn test_extract_numeric_uid() -> Result<(), SyncError> {
        let body = json!({"data": {"proposal": {
            "uid": 98765,
            "createdAt": "2024-03-05T12:00:00.000000Z",
            "scannerName": "Alice",
        }}});
        assert_eq!(IngestSchema::Nested.extract(&body)?.uid, "98765");
        Ok(())
    }

    #[test]
    fn test_extract_missing_uid() {
        let body = json!({"data": {"proposal": {
            "createdAt": "2024-03-05T12:00:00.000000Z",
            "scannerName": "Alice",
        }}});
        match IngestSchema::Nested.extract(&body) {
            Err(SyncError::Validation { missing }) => assert_eq!(missing, vec!["uid"]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_extract_empty_and_null_fields_are_missing() {
        let body = json!({"data": {"proposal": {
            "uid": "1",
            "createdAt": "",
            "scannerName": null,
        }}});
        match IngestSchema::Nested.extract(&body) {
            Err(SyncError::Validation { missing }) => {
                assert_eq!(missing, vec!["createdAt", "scannerName"])
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_extract_no_proposal_object() {
        for body in [json!({}), json!({"data": "x"}), json!([1, 2]), json!(null)] {
            for schema in [IngestSchema::Nested, IngestSchema::Flattened] {
                match schema.extract(&body) {
                    Err(SyncError::Validation { missing }) => {
                        assert_eq!(missing, vec!["uid", "createdAt", "scannerName"])
                    }
                    other => panic!("unexpected {other:?}"),
                }
            }
        }
    }

    #[test]
    fn test_extract_flattened_reads_pre_flattened_keys() -> Result<(), SyncError> {
        let body = json!({
            "data_proposal_uid": "7",
            "data_proposal_createdAt": "2024-03-05T12:00:00.000000Z",
            "data_proposal_scannerName": "Bob",
        });
        assert_eq!(IngestSchema::Flattened.extract(&body)?.uid, "7");
        assert!(IngestSchema::Nested.extract(&body).is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_ingest_stores_proposal_with_link() -> Result<()> {
        let store = MemoryStore::default();
        let proposal = ingest(
            &store,
            IngestSchema::Nested,
            &LinkTemplate::default(),
            &nested_body(),
        )
        .await?;

        assert_eq!(
            proposal.proposal_link,
            "https://www.third_party_service.com/ab/proposals/12345"
        );
        assert_eq!(store.docs.lock().unwrap().get("12345"), Some(&proposal));
        Ok(())
    }

    #[tokio::test]
    async fn test_ingest_twice_is_idempotent() -> Result<()> {
        let store = MemoryStore::default();
        let template = LinkTemplate::default();
        let first = ingest(&store, IngestSchema::Nested, &template, &nested_body()).await?;
        let second = ingest(&store, IngestSchema::Nested, &template, &nested_body()).await?;

        assert_eq!(first, second);
        let docs = store.docs.lock().unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs.get("12345"), Some(&first));
        Ok(())
    }

    #[tokio::test]
    async fn test_ingest_validation_failure_writes_nothing() {
        let store = MemoryStore::default();
        let body = json!({"data": {"proposal": {
            "createdAt": "2024-03-05T12:00:00.000000Z",
            "scannerName": "Alice",
        }}});

        let result = ingest(&store, IngestSchema::Nested, &LinkTemplate::default(), &body).await;

        assert!(matches!(result, Err(SyncError::Validation { .. })));
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_ingest_store_failure_is_storage_error() {
        let store = MemoryStore::failing();
        let result = ingest(
            &store,
            IngestSchema::Nested,
            &LinkTemplate::default(),
            &nested_body(),
        )
        .await;

        assert!(matches!(result, Err(SyncError::Storage(_))));
    }
}
