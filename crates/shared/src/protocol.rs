//! Wire records exchanged with the link backend.
//!
//! Response records are lenient about shape (numeric or string ids, `null`
//! lists, date-only timestamps) and are converted into the domain types in
//! one place so callers never re-check optional fields.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::domain::{
    Account, AccountId, Item, ItemId, Transaction, TransactionId, User, UserId,
    UNKNOWN_INSTITUTION,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
}

/// `itemId` goes back as a JSON number when the backend issued a numeric id.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkTokenRequest {
    pub user_id: UserId,
    #[serde(serialize_with = "item_id_as_issued")]
    pub item_id: Option<ItemId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkTokenResponse {
    pub link_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeRequest {
    pub public_token: String,
    pub user_id: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    pub username: String,
}

impl From<UserRecord> for User {
    fn from(value: UserRecord) -> Self {
        Self {
            id: value.id,
            username: value.username,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountRecord {
    #[serde(deserialize_with = "flexible_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub mask: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: String,
}

impl From<AccountRecord> for Account {
    fn from(value: AccountRecord) -> Self {
        Self {
            id: AccountId(value.id),
            name: value.name,
            mask: value.mask.filter(|mask| !mask.trim().is_empty()),
            kind: value.kind,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeResponse {
    #[serde(deserialize_with = "flexible_id")]
    pub item_id: String,
    #[serde(default)]
    pub accounts: Option<Vec<AccountRecord>>,
}

/// Validated result of a public token exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeResult {
    pub item_id: ItemId,
    pub accounts: Vec<Account>,
}

impl From<ExchangeResponse> for ExchangeResult {
    fn from(value: ExchangeResponse) -> Self {
        Self {
            item_id: ItemId(value.item_id),
            accounts: into_accounts(value.accounts),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ItemRecord {
    #[serde(deserialize_with = "flexible_id")]
    pub id: String,
    #[serde(default, alias = "institution_name")]
    pub institution: Option<String>,
    #[serde(default)]
    pub plaid_institution_id: Option<String>,
    #[serde(default)]
    pub accounts: Option<Vec<AccountRecord>>,
}

impl From<ItemRecord> for Item {
    fn from(value: ItemRecord) -> Self {
        let institution = value
            .institution
            .into_iter()
            .chain(value.plaid_institution_id)
            .find(|name| !name.trim().is_empty())
            .unwrap_or_else(|| UNKNOWN_INSTITUTION.to_string());
        Self {
            id: ItemId(value.id),
            institution,
            accounts: into_accounts(value.accounts),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransactionRecord {
    #[serde(deserialize_with = "flexible_id")]
    pub id: String,
    #[serde(deserialize_with = "flexible_date")]
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub name: String,
    pub amount: Decimal,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub pending: bool,
}

impl From<TransactionRecord> for Transaction {
    fn from(value: TransactionRecord) -> Self {
        Self {
            id: TransactionId(value.id),
            date: value.date,
            name: value.name,
            amount: value.amount,
            kind: value.kind,
            category: value.category.into(),
            pending: value.pending,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransactionsResponse {
    #[serde(default)]
    pub transactions: Option<Vec<TransactionRecord>>,
}

impl TransactionsResponse {
    pub fn into_transactions(self) -> Vec<Transaction> {
        self.transactions
            .unwrap_or_default()
            .into_iter()
            .map(Transaction::from)
            .collect()
    }
}

pub fn into_accounts(records: Option<Vec<AccountRecord>>) -> Vec<Account> {
    records
        .unwrap_or_default()
        .into_iter()
        .map(Account::from)
        .collect()
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum WireId {
    Int(i64),
    Text(String),
}

impl WireId {
    /// Inverse of [`flexible_id`]: a canonical integer string becomes a number again.
    fn from_normalized(id: &str) -> Self {
        match id.parse::<i64>() {
            Ok(value) if value.to_string() == id => Self::Int(value),
            _ => Self::Text(id.to_string()),
        }
    }
}

fn item_id_as_issued<S>(item_id: &Option<ItemId>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match item_id {
        Some(item_id) => serializer.serialize_some(&WireId::from_normalized(item_id.as_str())),
        None => serializer.serialize_none(),
    }
}

fn flexible_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match WireId::deserialize(deserializer)? {
        WireId::Int(value) => Ok(value.to_string()),
        WireId::Text(value) if value.trim().is_empty() => Err(de::Error::custom("empty id")),
        WireId::Text(value) => Ok(value),
    }
}

fn flexible_date<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_wire_date(&raw).ok_or_else(|| de::Error::custom(format!("invalid date '{raw}'")))
}

fn parse_wire_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(raw) {
        return Some(timestamp.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc())
}
