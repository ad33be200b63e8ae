use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Coins, WalletId};

pub type EntryId = Uuid;

pub const MAX_REFERENCE_LEN: usize = 128;
pub const MAX_METADATA_KEYS: usize = 32;
pub const MAX_METADATA_KEY_LEN: usize = 64;
pub const MAX_METADATA_STRING_LEN: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    Credit,
    Debit,
    GiftSent,
    GiftReceived,
    CommissionCollected,
    Purchase,
    AdminAdjustment,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Credit => "credit",
            EntryType::Debit => "debit",
            EntryType::GiftSent => "gift_sent",
            EntryType::GiftReceived => "gift_received",
            EntryType::CommissionCollected => "commission_collected",
            EntryType::Purchase => "purchase",
            EntryType::AdminAdjustment => "admin_adjustment",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "credit" => Some(EntryType::Credit),
            "debit" => Some(EntryType::Debit),
            "gift_sent" => Some(EntryType::GiftSent),
            "gift_received" => Some(EntryType::GiftReceived),
            "commission_collected" => Some(EntryType::CommissionCollected),
            "purchase" => Some(EntryType::Purchase),
            "admin_adjustment" => Some(EntryType::AdminAdjustment),
            _ => None,
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A metadata value. Nested objects and arrays are not representable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Text(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::Text(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Integer(value)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        MetadataValue::Float(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Bool(value)
    }
}

/// Open key-value bag attached to ledger entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(BTreeMap<String, MetadataValue>);

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&MetadataValue> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &MetadataValue)> {
        self.0.iter()
    }

    pub fn validate(&self) -> Result<(), MetadataError> {
        if self.0.len() > MAX_METADATA_KEYS {
            return Err(MetadataError::TooManyKeys(self.0.len()));
        }
        for (key, value) in &self.0 {
            let key_ok = !key.is_empty()
                && key.len() <= MAX_METADATA_KEY_LEN
                && key
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
            if !key_ok {
                return Err(MetadataError::InvalidKey(key.clone()));
            }
            match value {
                MetadataValue::Text(s) if s.len() > MAX_METADATA_STRING_LEN => {
                    return Err(MetadataError::ValueTooLong(key.clone()));
                }
                MetadataValue::Float(f) if !f.is_finite() => {
                    return Err(MetadataError::NonFiniteNumber(key.clone()));
                }
                _ => {}
            }
        }
        Ok(())
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataError {
    TooManyKeys(usize),
    InvalidKey(String),
    ValueTooLong(String),
    NonFiniteNumber(String),
}

impl fmt::Display for MetadataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataError::TooManyKeys(n) => {
                write!(f, "{} keys exceeds the limit of {}", n, MAX_METADATA_KEYS)
            }
            MetadataError::InvalidKey(k) => write!(f, "invalid key '{}'", k),
            MetadataError::ValueTooLong(k) => write!(f, "value for '{}' is too long", k),
            MetadataError::NonFiniteNumber(k) => write!(f, "value for '{}' is not finite", k),
        }
    }
}

impl std::error::Error for MetadataError {}

/// Immutable record of one balance-affecting event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionEntry {
    pub id: EntryId,
    pub wallet_id: WalletId,
    /// Position in the wallet's chain, starting at 1
    pub sequence: i64,
    pub entry_type: EntryType,
    /// Signed: positive credits, negative debits
    pub amount: Coins,
    pub balance_before: Coins,
    pub balance_after: Coins,
    /// Idempotency key, unique per wallet
    pub reference_id: String,
    pub counterparty_wallet_id: Option<WalletId>,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
}

impl TransactionEntry {
    pub fn is_consistent(&self) -> bool {
        self.balance_before.checked_add(self.amount) == Some(self.balance_after)
    }
}

/// A requested ledger mutation, before it has been applied.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEntry {
    pub wallet_id: WalletId,
    pub amount: Coins,
    pub entry_type: EntryType,
    pub reference_id: String,
    pub counterparty_wallet_id: Option<WalletId>,
    pub metadata: Metadata,
}

impl NewEntry {
    pub fn new(
        wallet_id: WalletId,
        amount: Coins,
        entry_type: EntryType,
        reference_id: impl Into<String>,
    ) -> Self {
        Self {
            wallet_id,
            amount,
            entry_type,
            reference_id: reference_id.into(),
            counterparty_wallet_id: None,
            metadata: Metadata::new(),
        }
    }

    pub fn with_counterparty(mut self, wallet_id: WalletId) -> Self {
        self.counterparty_wallet_id = Some(wallet_id);
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn has_valid_reference(&self) -> bool {
        !self.reference_id.trim().is_empty() && self.reference_id.len() <= MAX_REFERENCE_LEN
    }

    /// Whether a stored entry records this same logical operation.
    pub fn matches(&self, entry: &TransactionEntry) -> bool {
        entry.wallet_id == self.wallet_id
            && entry.reference_id == self.reference_id
            && entry.amount == self.amount
            && entry.entry_type == self.entry_type
    }

    pub fn into_entry(self, sequence: i64, balance_before: Coins) -> TransactionEntry {
        TransactionEntry {
            id: Uuid::new_v4(),
            wallet_id: self.wallet_id,
            sequence,
            entry_type: self.entry_type,
            amount: self.amount,
            balance_before,
            balance_after: balance_before + self.amount,
            reference_id: self.reference_id,
            counterparty_wallet_id: self.counterparty_wallet_id,
            metadata: self.metadata,
            created_at: Utc::now(),
        }
    }
}

/// Outcome of applying an entry: either freshly recorded or replayed.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedEntry {
    pub entry: TransactionEntry,
    pub replayed: bool,
}

/// One page of a wallet's history, newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryPage {
    pub entries: Vec<TransactionEntry>,
    /// Pass back as the cursor to continue; `None` once the oldest entry was returned
    pub next_cursor: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_type_roundtrip() {
        for et in [
            EntryType::Credit,
            EntryType::Debit,
            EntryType::GiftSent,
            EntryType::GiftReceived,
            EntryType::CommissionCollected,
            EntryType::Purchase,
            EntryType::AdminAdjustment,
        ] {
            assert_eq!(EntryType::from_str(et.as_str()), Some(et));
        }
        assert_eq!(EntryType::from_str("refund"), None);
    }

    #[test]
    fn test_metadata_json_keeps_value_types() {
        let metadata = Metadata::new()
            .with("gift_id", "rose")
            .with("rate", 30i64)
            .with("ratio", 0.5)
            .with("promo", true);

        let json = metadata.to_json().unwrap();
        let parsed = Metadata::from_json(&json).unwrap();

        assert_eq!(parsed.get("gift_id"), Some(&MetadataValue::Text("rose".into())));
        assert_eq!(parsed.get("rate"), Some(&MetadataValue::Integer(30)));
        assert_eq!(parsed.get("ratio"), Some(&MetadataValue::Float(0.5)));
        assert_eq!(parsed.get("promo"), Some(&MetadataValue::Bool(true)));
    }

    #[test]
    fn test_metadata_rejects_nested_values() {
        assert!(Metadata::from_json(r#"{"a": {"b": 1}}"#).is_err());
        assert!(Metadata::from_json(r#"{"a": [1, 2]}"#).is_err());
        assert!(Metadata::from_json(r#"{"a": null}"#).is_err());
    }

    #[test]
    fn test_metadata_validation() {
        assert!(Metadata::new().with("note", "ok").validate().is_ok());
        assert_eq!(
            Metadata::new().with("bad key", 1i64).validate(),
            Err(MetadataError::InvalidKey("bad key".into()))
        );
        assert_eq!(
            Metadata::new().with("", 1i64).validate(),
            Err(MetadataError::InvalidKey(String::new()))
        );
        let long = "x".repeat(MAX_METADATA_STRING_LEN + 1);
        assert_eq!(
            Metadata::new().with("note", long).validate(),
            Err(MetadataError::ValueTooLong("note".into()))
        );
        assert_eq!(
            Metadata::new().with("n", f64::NAN).validate(),
            Err(MetadataError::NonFiniteNumber("n".into()))
        );

        let mut crowded = Metadata::new();
        for i in 0..=MAX_METADATA_KEYS {
            crowded = crowded.with(format!("k{}", i), i as i64);
        }
        assert!(matches!(
            crowded.validate(),
            Err(MetadataError::TooManyKeys(_))
        ));
    }

    #[test]
    fn test_into_entry_computes_balance_after() {
        let wallet = Uuid::new_v4();
        let entry = NewEntry::new(wallet, -30, EntryType::Debit, "ref-1").into_entry(4, 100);
        assert_eq!(entry.sequence, 4);
        assert_eq!(entry.balance_before, 100);
        assert_eq!(entry.balance_after, 70);
        assert!(entry.is_consistent());
    }

    #[test]
    fn test_matches_requires_same_amount_and_type() {
        let wallet = Uuid::new_v4();
        let request = NewEntry::new(wallet, 50, EntryType::Purchase, "req-1");
        let stored = request.clone().into_entry(1, 0);
        assert!(request.matches(&stored));

        let different = NewEntry::new(wallet, 60, EntryType::Purchase, "req-1");
        assert!(!different.matches(&stored));
    }

    #[test]
    fn test_reference_validation() {
        let wallet = Uuid::new_v4();
        assert!(NewEntry::new(wallet, 1, EntryType::Credit, "abc").has_valid_reference());
        assert!(!NewEntry::new(wallet, 1, EntryType::Credit, "  ").has_valid_reference());
        let long = "r".repeat(MAX_REFERENCE_LEN + 1);
        assert!(!NewEntry::new(wallet, 1, EntryType::Credit, long).has_valid_reference());
    }
}
