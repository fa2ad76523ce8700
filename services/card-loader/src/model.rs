use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

/// Width of a credit card number, zero-padded
pub const CARD_NUMBER_WIDTH: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Approved,
    Declined,
    Pending,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Approved => "APPROVED",
            TransactionStatus::Declined => "DECLINED",
            TransactionStatus::Pending => "PENDING",
        }
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "APPROVED" => Ok(TransactionStatus::Approved),
            "DECLINED" => Ok(TransactionStatus::Declined),
            "PENDING" => Ok(TransactionStatus::Pending),
            other => Err(format!("unknown transaction status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: String,
    pub credit_card_no: String,
    pub transaction_time: DateTime<Utc>,
    pub merchant: String,
    pub location: String,
    pub amount: f64,
    pub items: HashMap<String, f64>,
    pub user_id: String,
    pub status: TransactionStatus,
    pub notes: Option<String>,
}

impl Transaction {
    /// Sum of the item amounts
    pub fn items_total(items: &HashMap<String, f64>) -> f64 {
        items.values().sum()
    }

    /// `amount` equals the sum of the items, within float rounding
    pub fn is_balanced(&self) -> bool {
        let total = Self::items_total(&self.items);
        (self.amount - total).abs() <= 1e-9 * total.abs().max(1.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub user_id: String,
    pub credit_card_no: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub gender: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
}

/// The `(cc_no, user_id)` projection produced by a users-table scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardHolder {
    pub credit_card_no: String,
    pub user_id: String,
}

/// Zero-pad a card number to the fixed width
pub fn format_card_number(n: u64) -> String {
    format!("{:0width$}", n, width = CARD_NUMBER_WIDTH)
}
