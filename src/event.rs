//! Upload notification payloads delivered by the storage webhook.
//!
//! The storage service posts a batch of "object created" records whenever an upload lands.
//! Object keys arrive URL-encoded with spaces rendered as `+`; [`normalize_object_key`]
//! restores the key exactly as it is stored in the letter record.

use serde::Deserialize;

/// Batch of object-created notifications for one webhook delivery.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadEvent {
    /// Individual object records contained in the notification.
    #[serde(rename = "Records", default)]
    pub records: Vec<ObjectRecord>,
}

/// A single object-created notification.
#[derive(Debug, Clone, Deserialize)]
pub struct ObjectRecord {
    /// Storage coordinates of the created object.
    pub s3: ObjectLocation,
}

/// Bucket and object naming for one record.
#[derive(Debug, Clone, Deserialize)]
pub struct ObjectLocation {
    /// Bucket the object was created in.
    pub bucket: BucketRef,
    /// The created object itself.
    pub object: ObjectRef,
}

/// Bucket portion of an object location.
#[derive(Debug, Clone, Deserialize)]
pub struct BucketRef {
    /// Bucket name.
    pub name: String,
}

/// Object portion of an object location.
#[derive(Debug, Clone, Deserialize)]
pub struct ObjectRef {
    /// Object key as delivered, still URL-encoded.
    pub key: String,
}

/// Decode a notification object key: `+` becomes a space, then percent-decoding is applied.
///
/// Falls back to the `+`-decoded form when the key contains invalid percent escapes.
pub fn normalize_object_key(raw: &str) -> String {
    let plus_decoded = raw.replace('+', " ");
    match urlencoding::decode(&plus_decoded) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => plus_decoded,
    }
}
