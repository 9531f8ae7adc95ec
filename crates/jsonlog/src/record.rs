use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

/// Entry type of a [`crate::Handle`].
///
/// Semantically a JSON object; the storage layer inspects only the `id`
/// field and carries the rest opaquely as raw JSON text. Records whose `id`s
/// are equal are duplicates of one another.
///
/// Upper layers bring their own schema to interpret the payload; this type
/// never materializes it into a typed value.
#[derive(Clone, Debug, Serialize)]
#[serde(transparent)]
pub struct Record {
    json: Box<RawValue>,
    #[serde(skip)]
    id: Option<String>,
}

/// Probe for the one field the storage layer interprets.
#[derive(Deserialize)]
struct IdProbe<'a> {
    #[serde(borrow, default)]
    id: Option<Cow<'a, str>>,
}

fn extract_id(json: &RawValue) -> Option<String> {
    serde_json::from_str::<IdProbe<'_>>(json.get())
        .ok()
        .and_then(|probe| probe.id)
        .map(Cow::into_owned)
}

impl Record {
    /// Parse a record from JSON text.
    ///
    /// The text must be a single JSON value. Input containing newlines
    /// (e.g. pretty-printed objects) is re-encoded compactly, as the framing
    /// below this type reserves `0x0A` as the record separator.
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        let json: Box<RawValue> = if text.contains('\n') {
            let value: serde_json::Value = serde_json::from_str(text)?;
            serde_json::value::to_raw_value(&value)?
        } else {
            serde_json::from_str(text)?
        };
        let id = extract_id(&json);

        Ok(Self { json, id })
    }

    /// Encode any serializable value as a record.
    pub fn from_value<T: Serialize>(value: &T) -> serde_json::Result<Self> {
        let json = serde_json::value::to_raw_value(value)?;
        let id = extract_id(&json);

        Ok(Self { json, id })
    }

    /// The record's `id`, if it is a JSON object with a string `id` field.
    ///
    /// Records without one are carried verbatim but cannot be deduplicated.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// The record's raw JSON text.
    pub fn as_str(&self) -> &str {
        self.json.get()
    }
}

impl<'de> Deserialize<'de> for Record {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        // Via `Value`, not `RawValue`: raw capture does not survive serde's
        // internal buffering under tagged enums and flattened structs, which
        // is exactly where records appear on the wire.
        let value = serde_json::Value::deserialize(deserializer)?;
        let json = serde_json::value::to_raw_value(&value).map_err(serde::de::Error::custom)?;
        let id = value
            .get("id")
            .and_then(serde_json::Value::as_str)
            .map(str::to_owned);
        Ok(Self { json, id })
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for Record {}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Encode a batch of records with the on-disk framing.
///
/// The logical sequence is `"\n" ++ r1 ++ "\n\n" ++ r2 ++ … ++ "\n"`: the
/// leading newline terminates any unterminated partial write left by a prior
/// crash, so the scanner resynchronizes on the first record of this batch;
/// the trailing newline commits the last record. Concatenated batches remain
/// parseable, with the scanner skipping the empty frames in between.
pub(crate) fn encode_batch(records: &[Record]) -> Vec<u8> {
    debug_assert!(!records.is_empty());

    let len = records.iter().map(|r| r.as_str().len() + 2).sum::<usize>();
    let mut buf = Vec::with_capacity(len);
    buf.push(b'\n');
    for (i, record) in records.iter().enumerate() {
        if i > 0 {
            buf.extend_from_slice(b"\n\n");
        }
        buf.extend_from_slice(record.as_str().as_bytes());
    }
    buf.push(b'\n');

    buf
}
