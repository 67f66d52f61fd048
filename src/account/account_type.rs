//! The kinds of accounts the app knows about and the mapping from the
//! aggregator's account vocabulary.

use std::fmt::Display;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

/// The kind of financial account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    /// An everyday transaction account.
    Checking,
    /// A savings or deposit account.
    Savings,
    /// A credit card.
    CreditCard,
    /// A mortgage or other loan.
    Loan,
    /// Shares, funds, life insurance and other investment products.
    Investment,
    /// Anything else.
    Other,
}

impl AccountType {
    /// The string stored in the database and sent to clients.
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Checking => "checking",
            AccountType::Savings => "savings",
            AccountType::CreditCard => "credit_card",
            AccountType::Loan => "loan",
            AccountType::Investment => "investment",
            AccountType::Other => "other",
        }
    }

    fn from_stored(value: &str) -> Option<Self> {
        match value {
            "checking" => Some(AccountType::Checking),
            "savings" => Some(AccountType::Savings),
            "credit_card" => Some(AccountType::CreditCard),
            "loan" => Some(AccountType::Loan),
            "investment" => Some(AccountType::Investment),
            "other" => Some(AccountType::Other),
            _ => None,
        }
    }
}

impl Display for AccountType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql for AccountType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for AccountType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        AccountType::from_stored(text).ok_or_else(|| {
            FromSqlError::Other(format!("unknown account type \"{text}\"").into())
        })
    }
}

/// Translate an account type reported by the aggregator into an [AccountType].
///
/// The lookup ignores case. Unknown and empty strings map to [AccountType::Other].
pub fn map_account_type(external_type: &str) -> AccountType {
    match external_type.to_lowercase().as_str() {
        "checking" => AccountType::Checking,
        "savings" => AccountType::Savings,
        "card" => AccountType::CreditCard,
        "loan" => AccountType::Loan,
        "securities" | "life_insurance" | "market" => AccountType::Investment,
        _ => AccountType::Other,
    }
}
