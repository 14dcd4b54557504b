use crate::error::StoreError;
use std::fmt;
use std::str::FromStr;

pub const OWNER_LEN: usize = 50;
pub const NOTE_LEN: usize = 255;

/// On-disk width of one record: id, owner, latitude, longitude, note, value,
/// packed with no padding.
pub const RECORD_WIDTH: usize = 4 + OWNER_LEN + 4 + 4 + NOTE_LEN + 4;

const OWNER_OFFSET: usize = 4;
const LATITUDE_OFFSET: usize = OWNER_OFFSET + OWNER_LEN;
const LONGITUDE_OFFSET: usize = LATITUDE_OFFSET + 4;
const NOTE_OFFSET: usize = LONGITUDE_OFFSET + 4;
const VALUE_OFFSET: usize = NOTE_OFFSET + NOTE_LEN;

/// Validated hunt identifier. It names a directory under the hunt root and
/// travels through line-oriented channel files, so separators, NUL, newlines
/// and leading dots are rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HuntId(String);

impl HuntId {
    pub fn new(raw: impl Into<String>) -> Result<Self, StoreError> {
        let raw = raw.into();
        let valid = !raw.is_empty()
            && !raw.starts_with('.')
            && !raw
                .chars()
                .any(|c| c == '/' || c == '\\' || c == '\0' || c == '\n' || c == '\r');
        if valid {
            Ok(Self(raw))
        } else {
            Err(StoreError::InvalidHuntId(raw))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HuntId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for HuntId {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for HuntId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// One treasure entry of a hunt.
#[derive(Debug, Clone, PartialEq)]
pub struct TreasureRecord {
    pub id: i32,
    pub owner: String,
    pub latitude: f32,
    pub longitude: f32,
    pub note: String,
    pub value: i32,
}

impl TreasureRecord {
    pub fn new(
        id: i32,
        owner: impl Into<String>,
        latitude: f32,
        longitude: f32,
        note: impl Into<String>,
        value: i32,
    ) -> Result<Self, StoreError> {
        let record = Self {
            id,
            owner: owner.into(),
            latitude,
            longitude,
            note: note.into(),
            value,
        };
        record.validate()?;
        Ok(record)
    }

    /// Text fields must fit their fixed buffers. A text that fills its buffer
    /// exactly is allowed and is stored without a terminator.
    pub fn validate(&self) -> Result<(), StoreError> {
        check_len("owner", &self.owner, OWNER_LEN)?;
        check_len("note", &self.note, NOTE_LEN)
    }

    pub fn encode(&self) -> Result<[u8; RECORD_WIDTH], StoreError> {
        self.validate()?;
        let mut buf = [0u8; RECORD_WIDTH];
        buf[..OWNER_OFFSET].copy_from_slice(&self.id.to_le_bytes());
        write_text(&mut buf[OWNER_OFFSET..LATITUDE_OFFSET], &self.owner);
        buf[LATITUDE_OFFSET..LONGITUDE_OFFSET].copy_from_slice(&self.latitude.to_le_bytes());
        buf[LONGITUDE_OFFSET..NOTE_OFFSET].copy_from_slice(&self.longitude.to_le_bytes());
        write_text(&mut buf[NOTE_OFFSET..VALUE_OFFSET], &self.note);
        buf[VALUE_OFFSET..].copy_from_slice(&self.value.to_le_bytes());
        Ok(buf)
    }

    pub fn decode(buf: &[u8; RECORD_WIDTH]) -> Self {
        Self {
            id: Self::raw_id(buf),
            owner: read_text(&buf[OWNER_OFFSET..LATITUDE_OFFSET]),
            latitude: f32::from_le_bytes(le4(buf, LATITUDE_OFFSET)),
            longitude: f32::from_le_bytes(le4(buf, LONGITUDE_OFFSET)),
            note: read_text(&buf[NOTE_OFFSET..VALUE_OFFSET]),
            value: i32::from_le_bytes(le4(buf, VALUE_OFFSET)),
        }
    }
}

impl TreasureRecord {
    /// Id of an encoded record, read without decoding the text fields.
    pub fn raw_id(buf: &[u8; RECORD_WIDTH]) -> i32 {
        i32::from_le_bytes(le4(buf, 0))
    }
}

fn check_len(field: &'static str, text: &str, max: usize) -> Result<(), StoreError> {
    if text.len() > max {
        return Err(StoreError::FieldTooLong {
            field,
            max,
            actual: text.len(),
        });
    }
    Ok(())
}

fn le4(buf: &[u8; RECORD_WIDTH], at: usize) -> [u8; 4] {
    [buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]
}

fn write_text(slot: &mut [u8], text: &str) {
    let bytes = text.as_bytes();
    slot[..bytes.len()].copy_from_slice(bytes);
}

// Bounded by the slot: a full slot has no NUL to stop at.
fn read_text(slot: &[u8]) -> String {
    let end = slot.iter().position(|&b| b == 0).unwrap_or(slot.len());
    String::from_utf8_lossy(&slot[..end]).into_owned()
}
