use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Fee;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    Pending,
    Ok,
    Failed,
    Canceled,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Ok => "ok",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Canceled => "canceled",
        }
    }
}

/// A deposit or withdrawal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Option<String>,
    pub txid: Option<String>,
    pub timestamp: Option<i64>,
    pub updated: Option<i64>,
    pub address: Option<String>,
    pub address_to: Option<String>,
    pub address_from: Option<String>,
    pub tag: Option<String>,
    pub kind: TransactionKind,
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
    pub status: Option<TransactionStatus>,
    pub fee: Option<Fee>,
    pub info: Value,
}
