use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::dao::models::{CardEntity, SessionEntity};

/// Document id prefix for session documents.
pub const SESSION_PREFIX: &str = "session::";
/// Document id prefix for inventory card documents.
pub const CARD_PREFIX: &str = "card::";
/// High sentinel closing a `_all_docs` prefix range.
pub const END_SUFFIX: &str = "\u{ffff}";

/// Payload of a `_all_docs` listing with `include_docs=true`.
#[derive(Debug, Deserialize)]
pub struct AllDocsResponse {
    /// Raw rows, one per matching document.
    pub rows: Vec<AllDocsRow>,
}

/// One row of a `_all_docs` listing.
#[derive(Debug, Deserialize)]
pub struct AllDocsRow {
    /// Document identifier.
    pub id: String,
    /// Included document body, absent for deleted docs.
    #[serde(default)]
    pub doc: Option<Value>,
}

/// CouchDB envelope around a [`SessionEntity`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchSessionDocument {
    /// CouchDB document id (`session::<uuid>`).
    #[serde(rename = "_id")]
    pub doc_id: String,
    /// CouchDB revision, absent on first write.
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    /// The session body itself.
    #[serde(flatten)]
    pub session: SessionEntity,
}

impl CouchSessionDocument {
    /// Wrap an entity for writing; the revision is filled in by the store.
    pub fn from_entity(session: SessionEntity) -> Self {
        Self {
            doc_id: session_doc_id(session.id),
            rev: None,
            session,
        }
    }
}

/// CouchDB envelope around a [`CardEntity`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchCardDocument {
    /// CouchDB document id (`card::<uuid>`).
    #[serde(rename = "_id")]
    pub doc_id: String,
    /// CouchDB revision, absent on first write.
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    /// The card body itself.
    #[serde(flatten)]
    pub card: CardEntity,
}

impl CouchCardDocument {
    /// Wrap an entity for writing; the revision is filled in by the store.
    pub fn from_entity(card: CardEntity) -> Self {
        Self {
            doc_id: card_doc_id(card.id),
            rev: None,
            card,
        }
    }
}

/// Build the document id for a session.
pub fn session_doc_id(id: Uuid) -> String {
    format!("{SESSION_PREFIX}{id}")
}

/// Build the document id for a card.
pub fn card_doc_id(id: Uuid) -> String {
    format!("{CARD_PREFIX}{id}")
}
