use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A spreadsheet row that survived parsing, with its category resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub date: NaiveDate,
    pub amount: f64,
    pub category: String,
    pub description: Option<String>,
    pub merchant: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseResponse {
    pub success: bool,
    pub transactions: Vec<Transaction>,
    pub count: usize,
}

impl ParseResponse {
    pub fn new(transactions: Vec<Transaction>) -> Self {
        Self {
            success: true,
            count: transactions.len(),
            transactions,
        }
    }
}
