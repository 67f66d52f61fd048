//! The records exchanged with the bank aggregator.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use time::Date;

use crate::transaction::DEFAULT_DESCRIPTION;

time::serde::format_description!(iso_date, Date, "[year]-[month]-[day]");

/// The page size used for transaction listings when the caller does not pick one.
pub const DEFAULT_TRANSACTION_LIMIT: u32 = 100;

/// A freshly created aggregator-side user and the token to act as them.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatorUser {
    pub auth_token: String,
    pub external_user_id: String,
}

/// What a gateway call needs to act as an aggregator-side user.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatorCredentials {
    pub external_user_id: String,
    pub auth_token: String,
}

/// The aggregator sends ids as numbers in some responses and strings in others.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(i64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(text) => text,
        RawId::Number(number) => number.to_string(),
    })
}

/// Currencies come either as a bare code or as an object with the code in `id`.
fn currency_code<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawCurrency {
        Code(String),
        Object { id: String },
    }

    Ok(match RawCurrency::deserialize(deserializer)? {
        RawCurrency::Code(code) | RawCurrency::Object { id: code } => code,
    })
}

/// The bank that holds a remote account.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct RemoteBank {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub logo_url: Option<String>,
}

/// An account as listed by the aggregator.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemoteAccount {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub balance: Decimal,
    #[serde(deserialize_with = "currency_code")]
    pub currency: String,
    #[serde(rename = "type", default)]
    pub account_type: Option<String>,
    #[serde(default)]
    pub bank: Option<RemoteBank>,
}

impl RemoteAccount {
    /// Decode one entry of an account listing.
    ///
    /// # Errors
    /// Returns a [MalformedAccount] carrying the entry's id, if it has one, when
    /// the entry does not have the shape of an account.
    pub fn from_listing_entry(entry: serde_json::Value) -> Result<Self, MalformedAccount> {
        let id = match entry.get("id") {
            Some(serde_json::Value::String(id)) => Some(id.clone()),
            Some(serde_json::Value::Number(id)) => Some(id.to_string()),
            _ => None,
        };

        serde_json::from_value(entry).map_err(|error| MalformedAccount {
            id,
            reason: error.to_string(),
        })
    }
}

/// An entry of an account listing that could not be decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct MalformedAccount {
    /// The entry's id, if it had a usable one.
    pub id: Option<String>,
    pub reason: String,
}

impl std::fmt::Display for MalformedAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.id {
            Some(id) => write!(f, "malformed account {id}: {}", self.reason),
            None => write!(f, "malformed account without id: {}", self.reason),
        }
    }
}

/// The entries of an account listing, each decoded on its own so that a bad
/// entry does not spoil the rest of the listing.
pub type AccountListing = Vec<Result<RemoteAccount, MalformedAccount>>;

/// A category label attached to a remote transaction.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemoteCategory {
    pub name: String,
}

/// A transaction as listed by the aggregator.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemoteTransaction {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(with = "iso_date")]
    pub date: Date,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub original_description: Option<String>,
    pub amount: Decimal,
    #[serde(deserialize_with = "currency_code")]
    pub currency: String,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub category: Option<RemoteCategory>,
}

impl RemoteTransaction {
    /// The first non-empty of the description and the original description,
    /// or a generic label if neither is set.
    ///
    /// Only an empty string counts as missing, whitespace is kept as sent.
    pub fn description_or_default(&self) -> String {
        [&self.description, &self.original_description]
            .into_iter()
            .flatten()
            .find(|text| !text.is_empty())
            .cloned()
            .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_owned())
    }

    pub fn is_pending(&self) -> bool {
        self.state.as_deref() == Some("pending")
    }
}

/// A bank login held by an aggregator-side user.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemoteConnection {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub last_update: Option<String>,
}

/// Which page of transactions to list and for which dates.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionQuery {
    pub min_date: Option<Date>,
    pub max_date: Option<Date>,
    pub limit: u32,
    pub offset: u32,
}

impl Default for TransactionQuery {
    fn default() -> Self {
        Self {
            min_date: None,
            max_date: None,
            limit: DEFAULT_TRANSACTION_LIMIT,
            offset: 0,
        }
    }
}

#[cfg(test)]
mod remote_record_tests {
    use rust_decimal::Decimal;
    use serde_json::json;
    use time::macros::date;

    use super::{MalformedAccount, RemoteAccount, RemoteTransaction, TransactionQuery};

    fn transaction(description: Option<&str>, original_description: Option<&str>) -> RemoteTransaction {
        serde_json::from_value(json!({
            "id": 1,
            "date": "2025-03-01",
            "description": description,
            "original_description": original_description,
            "amount": -12.5,
            "currency": "EUR",
        }))
        .unwrap()
    }

    #[test]
    fn parses_account_with_numeric_id_and_currency_object() {
        let account: RemoteAccount = serde_json::from_value(json!({
            "id": 123,
            "name": "Compte courant",
            "balance": 1234.56,
            "currency": { "id": "EUR", "symbol": "€" },
            "type": "checking",
            "bank": { "name": "Test Bank", "logo_url": null },
        }))
        .unwrap();

        assert_eq!(account.id, "123");
        assert_eq!(account.balance, Decimal::new(123456, 2));
        assert_eq!(account.currency, "EUR");
        assert_eq!(account.account_type.as_deref(), Some("checking"));
        assert_eq!(account.bank.unwrap().name.as_deref(), Some("Test Bank"));
    }

    #[test]
    fn parses_transaction() {
        let transaction: RemoteTransaction = serde_json::from_value(json!({
            "id": "tx-9",
            "date": "2025-03-01",
            "description": "CARD PAYMENT",
            "amount": "-4.20",
            "currency": "EUR",
            "state": "pending",
            "category": { "id": 3, "name": "Food" },
        }))
        .unwrap();

        assert_eq!(transaction.id, "tx-9");
        assert_eq!(transaction.date, date!(2025 - 03 - 01));
        assert_eq!(transaction.amount, Decimal::new(-420, 2));
        assert!(transaction.is_pending());
        assert_eq!(transaction.category.unwrap().name, "Food");
    }

    #[test]
    fn description_falls_back_to_original_description() {
        assert_eq!(
            transaction(Some("Coffee"), Some("COFFEE SHOP 123")).description_or_default(),
            "Coffee"
        );
        assert_eq!(
            transaction(None, Some("COFFEE SHOP 123")).description_or_default(),
            "COFFEE SHOP 123"
        );
        assert_eq!(
            transaction(Some(""), Some("COFFEE SHOP 123")).description_or_default(),
            "COFFEE SHOP 123"
        );
    }

    #[test]
    fn description_falls_back_to_generic_label() {
        assert_eq!(transaction(None, None).description_or_default(), "Transaction");
        assert_eq!(transaction(Some(""), Some("")).description_or_default(), "Transaction");
    }

    #[test]
    fn whitespace_description_is_kept() {
        assert_eq!(
            transaction(Some(" "), Some("COFFEE SHOP 123")).description_or_default(),
            " "
        );
    }

    #[test]
    fn listing_entry_with_null_balance_is_malformed() {
        let result = RemoteAccount::from_listing_entry(json!({
            "id": 7,
            "name": "Broken",
            "balance": null,
            "currency": "EUR",
        }));

        let Err(MalformedAccount { id, reason }) = &result else {
            panic!("expected a malformed account, got {result:?}");
        };
        assert_eq!(id.as_deref(), Some("7"));
        assert!(reason.contains("null"), "unexpected reason: {reason}");
    }

    #[test]
    fn listing_entry_without_id_is_malformed() {
        let result = RemoteAccount::from_listing_entry(json!({ "name": "No id" }));

        assert!(matches!(result, Err(MalformedAccount { id: None, .. })));
    }

    #[test]
    fn completed_and_missing_states_are_not_pending() {
        let mut tx = transaction(None, None);
        assert!(!tx.is_pending());

        tx.state = Some("completed".to_owned());
        assert!(!tx.is_pending());
    }

    #[test]
    fn transaction_query_defaults() {
        let query = TransactionQuery::default();

        assert_eq!(query.limit, 100);
        assert_eq!(query.offset, 0);
        assert_eq!(query.min_date, None);
    }
}
