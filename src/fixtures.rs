//! Database collections exported as static JSON data for the site.
//!
//! The storefront reads `<collection>.json` from its data directory at build
//! time. Each file is a JSON array of the collection's documents, indented
//! with four spaces, with identifier and timestamp fields flattened to plain
//! strings:
//!
//! ```text
//! {"_id": {"$oid": "65a1..."}, "createdAt": {"$date": "2024-01-05T10:00:00.123Z"}}
//!   → {"_id": "65a1...", "createdAt": "2024-01-05 10:00:00.123000"}
//! ```
//!
//! Timestamps are written as naive UTC `YYYY-MM-DD HH:MM:SS`, with six
//! fractional digits only when the value has sub-second precision. The site
//! parses that exact shape.
//!
//! Documents come from a [`DocumentStore`]:
//!
//! - [`MongoStore`] queries the live database (`find({})` per collection).
//! - [`JsonDumpStore`] reads `mongoexport` output (array or one document per
//!   line) from a directory, for working offline.
//!
//! Both yield documents in MongoDB relaxed extended JSON, so normalisation
//! does not depend on where they came from.

use crate::config::DatabaseCredentials;
use chrono::{DateTime, Utc};
use mongodb::bson::{Bson, Document as BsonDocument, doc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

pub type Document = Map<String, Value>;

const ID_FIELD: &str = "_id";
const CREATED_AT_FIELD: &str = "createdAt";

#[derive(Error, Debug)]
pub enum FixtureError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("database error: {0}")]
    Database(#[from] mongodb::error::Error),
    #[error("no dump for collection {collection} at {}", path.display())]
    MissingDump { collection: String, path: PathBuf },
    #[error("{collection}: entry {index} is not a document")]
    NotADocument { collection: String, index: usize },
    #[error("{collection}: document {index} has no _id")]
    MissingId { collection: String, index: usize },
}

/// Source of collection documents.
pub trait DocumentStore {
    fn find_all(&self, collection: &str) -> Result<Vec<Document>, FixtureError>;
}

/// Live MongoDB database, read with the synchronous driver.
pub struct MongoStore {
    database: mongodb::sync::Database,
}

impl MongoStore {
    /// Connect and ping the server, so a bad URL or login fails here rather
    /// than on the first collection.
    pub fn connect(credentials: &DatabaseCredentials) -> Result<Self, FixtureError> {
        let client = mongodb::sync::Client::with_uri_str(credentials.connection_string())?;
        let database = client.database(&credentials.database);
        database.run_command(doc! { "ping": 1 }).run()?;
        info!(host = %credentials.host, database = %credentials.database, "connected to database");
        Ok(Self { database })
    }
}

impl DocumentStore for MongoStore {
    fn find_all(&self, collection: &str) -> Result<Vec<Document>, FixtureError> {
        let cursor = self
            .database
            .collection::<BsonDocument>(collection)
            .find(doc! {})
            .run()?;

        let mut documents = Vec::new();
        for (index, document) in cursor.enumerate() {
            match Bson::Document(document?).into_relaxed_extjson() {
                Value::Object(document) => documents.push(document),
                _ => {
                    return Err(FixtureError::NotADocument {
                        collection: collection.to_string(),
                        index,
                    });
                }
            }
        }
        debug!(collection, documents = documents.len(), "fetched");
        Ok(documents)
    }
}

/// Reads `<dir>/<collection>.json` dumps.
#[derive(Debug, Clone)]
pub struct JsonDumpStore {
    dir: PathBuf,
}

impl JsonDumpStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl DocumentStore for JsonDumpStore {
    fn find_all(&self, collection: &str) -> Result<Vec<Document>, FixtureError> {
        let path = self.dir.join(format!("{collection}.json"));
        if !path.is_file() {
            return Err(FixtureError::MissingDump {
                collection: collection.to_string(),
                path,
            });
        }
        let content = std::fs::read_to_string(&path)?;

        // `--jsonArray` dumps are one array; plain dumps are one document per line.
        let mut values = Vec::new();
        for value in serde_json::Deserializer::from_str(&content).into_iter::<Value>() {
            match value? {
                Value::Array(items) => values.extend(items),
                other => values.push(other),
            }
        }

        values
            .into_iter()
            .enumerate()
            .map(|(index, value)| match value {
                Value::Object(document) => Ok(document),
                _ => Err(FixtureError::NotADocument {
                    collection: collection.to_string(),
                    index,
                }),
            })
            .collect()
    }
}

/// Flatten `_id` (required) and `createdAt` (optional) to strings.
pub fn normalize_document(
    mut document: Document,
    collection: &str,
    index: usize,
) -> Result<Document, FixtureError> {
    let id = document
        .get_mut(ID_FIELD)
        .ok_or_else(|| FixtureError::MissingId {
            collection: collection.to_string(),
            index,
        })?;
    *id = Value::String(scalar_text(id.take()));

    if let Some(created) = document.get_mut(CREATED_AT_FIELD) {
        *created = Value::String(timestamp_text(created.take()));
    }
    Ok(document)
}

/// `{"$date": ...}` rendered as naive UTC; anything else as [`scalar_text`].
fn timestamp_text(value: Value) -> String {
    let parsed = match value.get("$date") {
        Some(Value::String(iso)) => DateTime::parse_from_rfc3339(iso)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Some(Value::Object(wrapper)) => wrapper
            .get("$numberLong")
            .and_then(Value::as_str)
            .and_then(|ms| ms.parse::<i64>().ok())
            .and_then(DateTime::from_timestamp_millis),
        Some(Value::Number(ms)) => ms.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    };
    match parsed {
        Some(dt) => format_timestamp(dt),
        None => scalar_text(value),
    }
}

fn format_timestamp(dt: DateTime<Utc>) -> String {
    let seconds = dt.format("%Y-%m-%d %H:%M:%S");
    match dt.timestamp_subsec_micros() {
        0 => seconds.to_string(),
        micros => format!("{seconds}.{micros:06}"),
    }
}

/// Text form of an identifier or timestamp, unwrapping extended JSON.
fn scalar_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Object(mut wrapper) if wrapper.len() == 1 => {
            match ["$oid", "$date", "$numberLong"]
                .iter()
                .find_map(|key| wrapper.remove(*key))
            {
                Some(inner) => scalar_text(inner),
                None => Value::Object(wrapper).to_string(),
            }
        }
        other => other.to_string(),
    }
}

/// One written fixture file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportedCollection {
    pub collection: String,
    pub documents: usize,
    pub path: PathBuf,
}

/// Write `<out_dir>/<collection>.json` for every collection, in order.
///
/// Stops at the first collection that cannot be read or written.
pub fn export_collections(
    store: &impl DocumentStore,
    collections: &[String],
    out_dir: &Path,
) -> Result<Vec<ExportedCollection>, FixtureError> {
    std::fs::create_dir_all(out_dir)?;
    let mut exported = Vec::with_capacity(collections.len());

    for collection in collections {
        let documents = store
            .find_all(collection)?
            .into_iter()
            .enumerate()
            .map(|(index, doc)| normalize_document(doc, collection, index))
            .collect::<Result<Vec<_>, _>>()?;

        let path = out_dir.join(format!("{collection}.json"));
        std::fs::write(&path, to_indented_json(&documents)?)?;
        info!(collection = %collection, documents = documents.len(), "exported");

        exported.push(ExportedCollection {
            collection: collection.clone(),
            documents: documents.len(),
            path,
        });
    }
    Ok(exported)
}

fn to_indented_json(value: &impl Serialize) -> Result<Vec<u8>, serde_json::Error> {
    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    value.serialize(&mut serializer)?;
    Ok(out)
}
