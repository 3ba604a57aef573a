//! Account balances and transactions.

use crate::client::{ComdirectClient, RequestContext, read_json};
use crate::error::ApiError;
use crate::models::{AccountBalance, AccountTransaction, ListResource};

/// Filters for the transaction list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TransactionQuery {
    /// `BOOKED`, `NOTBOOKED` or `BOTH`.
    pub state: Option<String>,
    /// `CREDIT`, `DEBIT` or `CREDIT_AND_DEBIT`.
    pub direction: Option<String>,
    /// Index of the first entry to return.
    pub paging_first: Option<u32>,
}

impl TransactionQuery {
    fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(state) = &self.state {
            params.push(("transactionState", state.clone()));
        }
        if let Some(direction) = &self.direction {
            params.push(("transactionDirection", direction.clone()));
        }
        if let Some(first) = self.paging_first {
            params.push(("paging-first", first.to_string()));
        }
        params
    }
}

pub async fn account_balances(
    client: &ComdirectClient,
    ctx: RequestContext<'_>,
) -> Result<ListResource<AccountBalance>, ApiError> {
    let url = client.endpoint("banking/clients/user/v2/accounts/balances")?;
    let response = client
        .authorized(client.http().get(url), ctx)
        .query(&[("without-attr", "account")])
        .send()
        .await?;
    read_json(response).await
}

pub async fn account_transactions(
    client: &ComdirectClient,
    ctx: RequestContext<'_>,
    account_id: &str,
    query: &TransactionQuery,
) -> Result<ListResource<AccountTransaction>, ApiError> {
    let url =
        client.endpoint_segments(&["banking", "v1", "accounts", account_id, "transactions"])?;
    let response = client
        .authorized(client.http().get(url), ctx)
        .query(&query.params())
        .send()
        .await?;
    read_json(response).await
}
