use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use once_cell::sync::Lazy;
use rand::RngCore;
use serde_json::{json, Value};

use crate::TypesError;

static PROCESS_UNIQUE: Lazy<[u8; 5]> = Lazy::new(|| {
    let mut bytes = [0u8; 5];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
});

static COUNTER: Lazy<AtomicU32> = Lazy::new(|| AtomicU32::new(rand::random::<u32>() & 0x00ff_ffff));

/// 12-byte identifier: 4-byte big-endian seconds, 5 process-unique bytes,
/// 3-byte counter. Used for generated document ids and for etags.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 12]);

impl ObjectId {
    pub fn new() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or_default();
        let count = COUNTER.fetch_add(1, Ordering::SeqCst) & 0x00ff_ffff;

        let mut bytes = [0u8; 12];
        bytes[..4].copy_from_slice(&secs.to_be_bytes());
        bytes[4..9].copy_from_slice(&*PROCESS_UNIQUE);
        bytes[9..].copy_from_slice(&count.to_be_bytes()[1..]);
        Self(bytes)
    }

    pub fn bytes(&self) -> [u8; 12] {
        self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn is_valid(candidate: &str) -> bool {
        candidate.len() == 24 && candidate.bytes().all(|b| b.is_ascii_hexdigit())
    }

    /// Extended JSON form: `{"$oid": "<hex>"}`.
    pub fn to_json(&self) -> Value {
        json!({ "$oid": self.to_hex() })
    }

    /// Accepts the extended JSON form only.
    pub fn from_json(value: &Value) -> Option<Self> {
        let map = value.as_object()?;
        if map.len() != 1 {
            return None;
        }
        map.get("$oid")?.as_str()?.parse().ok()
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for ObjectId {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !Self::is_valid(s) {
            return Err(TypesError::InvalidObjectId(s.to_string()));
        }
        let decoded = hex::decode(s).map_err(|_| TypesError::InvalidObjectId(s.to_string()))?;
        let mut bytes = [0u8; 12];
        bytes.copy_from_slice(&decoded);
        Ok(Self(bytes))
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}
