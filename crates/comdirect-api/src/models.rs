//! Wire models shared by the endpoint modules.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Paged list envelope used by the REST endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResource<T> {
    #[serde(default)]
    pub paging: Option<Paging>,
    #[serde(default = "Vec::new")]
    pub values: Vec<T>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Paging {
    pub index: u32,
    pub matches: u32,
}

/// Decimal amount with its unit. The value is kept as the decimal string sent by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmountValue {
    pub value: String,
    pub unit: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnumText {
    pub key: String,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub account_id: String,
    #[serde(default)]
    pub account_display_id: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub account_type: Option<EnumText>,
    #[serde(default)]
    pub iban: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountBalance {
    #[serde(default)]
    pub account: Option<Account>,
    pub account_id: String,
    #[serde(default)]
    pub balance: Option<AmountValue>,
    #[serde(default)]
    pub balance_eur: Option<AmountValue>,
    #[serde(default)]
    pub available_cash_amount: Option<AmountValue>,
    #[serde(default)]
    pub available_cash_amount_eur: Option<AmountValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Party {
    #[serde(default)]
    pub holder_name: Option<String>,
    #[serde(default)]
    pub iban: Option<String>,
    #[serde(default)]
    pub bic: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountTransaction {
    #[serde(default)]
    pub reference: Option<String>,
    pub booking_status: String,
    #[serde(default)]
    pub booking_date: Option<NaiveDate>,
    pub amount: AmountValue,
    #[serde(default)]
    pub remitter: Option<Party>,
    #[serde(default)]
    pub deptor: Option<Party>,
    #[serde(default)]
    pub creditor: Option<Party>,
    #[serde(default)]
    pub valuta_date: Option<String>,
    #[serde(default)]
    pub end_to_end_reference: Option<String>,
    #[serde(default)]
    pub remittance_info: Option<String>,
    #[serde(default)]
    pub transaction_type: Option<EnumText>,
}
