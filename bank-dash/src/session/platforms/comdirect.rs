//! comdirect adapter: push-TAN handshake, banking and brokerage calls.

use std::time::Duration;

use async_trait::async_trait;
use comdirect_api::models::AmountValue;
use comdirect_api::session::{AuthenticationInfo, AuthenticationState, Link, SessionStatus};
use comdirect_api::{ApiError, ComdirectClient, RequestContext, banking, brokerage, oauth, session};
use tracing::{debug, warn};

use crate::credentials::Credentials;
use crate::domain::{
    AccountBalance, AccountTransaction, Amount, LocalOrder, OrderAck, OrderType, TransactionQuery,
};
use crate::session::transport::{BankingTransport, CallContext, ChallengeTransport, TransportError};
use crate::session::types::{ChallengeDescriptor, ChallengeKind, ChallengeStatus, TokenGrant};

const LIMIT_CURRENCY: &str = "EUR";

pub struct ComdirectTransport {
    client: ComdirectClient,
}

impl ComdirectTransport {
    pub fn new(client: ComdirectClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &ComdirectClient {
        &self.client
    }
}

fn map_api_error(err: ApiError) -> TransportError {
    match err {
        ApiError::Network(e) if e.is_timeout() => TransportError::Timeout,
        ApiError::Network(e) if e.is_decode() => TransportError::Protocol(e.to_string()),
        ApiError::Network(e) => TransportError::Network(e.to_string()),
        ApiError::Status {
            status,
            message,
            retry_after,
        } => TransportError::Status {
            status,
            message,
            retry_after: retry_after.map(Duration::from_secs),
        },
        ApiError::Parse(msg) => TransportError::Protocol(msg),
        ApiError::Url(e) => TransportError::Protocol(e.to_string()),
    }
}

fn client_credentials(credentials: &Credentials) -> oauth::ClientCredentials {
    oauth::ClientCredentials {
        client_id: credentials.client_id.clone(),
        client_secret: credentials.client_secret.clone(),
    }
}

fn token_grant(response: oauth::TokenResponse) -> TokenGrant {
    TokenGrant {
        access_token: response.access_token,
        refresh_token: response.refresh_token,
        expires_in: Duration::from_secs(response.expires_in),
    }
}

/// Rebuild the bank's view of a challenge from its descriptor.
fn authentication_info(challenge: &ChallengeDescriptor) -> AuthenticationInfo {
    AuthenticationInfo {
        id: challenge.challenge_id.clone(),
        typ: match challenge.kind {
            ChallengeKind::TimedPoll => Some(session::PUSH_TAN.to_string()),
            ChallengeKind::ImmediateApproval => None,
        },
        available_types: Vec::new(),
        challenge: challenge.prompt.clone(),
        link: challenge.status_link.as_ref().map(|href| Link {
            href: href.clone(),
            rel: None,
            method: None,
        }),
    }
}

fn remote_session(challenge: &ChallengeDescriptor) -> SessionStatus {
    SessionStatus {
        identifier: challenge.remote_session_id.clone(),
        session_tan_active: false,
        activated_2fa: false,
    }
}

fn amount(value: Option<AmountValue>) -> Option<Amount> {
    value.map(|a| Amount::new(a.value, a.unit))
}

fn party_name(party: Option<comdirect_api::models::Party>) -> Option<String> {
    party.and_then(|p| p.holder_name)
}

fn convert_balance(balance: comdirect_api::models::AccountBalance) -> AccountBalance {
    let account = balance.account;
    AccountBalance {
        account_id: balance.account_id,
        display_id: account.as_ref().and_then(|a| a.account_display_id.clone()),
        account_type: account
            .and_then(|a| a.account_type)
            .map(|t| t.text.unwrap_or(t.key)),
        balance: amount(balance.balance.or(balance.balance_eur)),
        available_cash: amount(
            balance
                .available_cash_amount
                .or(balance.available_cash_amount_eur),
        ),
    }
}

/// Credits name the remitter, debits the creditor.
fn convert_transaction(tx: comdirect_api::models::AccountTransaction) -> AccountTransaction {
    let is_credit = !tx.amount.value.trim_start().starts_with('-');
    let counterparty = if is_credit {
        party_name(tx.remitter).or_else(|| party_name(tx.deptor))
    } else {
        party_name(tx.creditor)
    };
    AccountTransaction {
        reference: tx.reference,
        booking_status: tx.booking_status,
        booking_date: tx.booking_date,
        amount: Amount::new(tx.amount.value, tx.amount.unit),
        counterparty,
        remittance_info: tx.remittance_info,
        transaction_type: tx.transaction_type.map(|t| t.text.unwrap_or(t.key)),
    }
}

fn api_query(query: &TransactionQuery) -> banking::TransactionQuery {
    banking::TransactionQuery {
        state: query.state.map(|s| s.to_string()),
        direction: query.direction.map(|d| d.to_string()),
        paging_first: query.paging_first,
    }
}

fn order_request(order: &LocalOrder) -> brokerage::OrderRequest {
    let instructions = &order.instructions;
    brokerage::OrderRequest {
        depot_id: order.account_id.clone(),
        side: instructions.side.to_string(),
        instrument_id: instructions.instrument.clone(),
        order_type: instructions.order_type.to_string(),
        quantity: AmountValue {
            value: instructions.quantity.to_string(),
            unit: brokerage::PIECES_UNIT.to_string(),
        },
        limit: match instructions.order_type {
            OrderType::Limit => instructions.limit_price.map(|price| AmountValue {
                value: price.to_string(),
                unit: LIMIT_CURRENCY.to_string(),
            }),
            OrderType::Market => None,
        },
        venue_id: None,
    }
}

#[async_trait]
impl ChallengeTransport for ComdirectTransport {
    async fn primary_grant(&self, credentials: &Credentials) -> Result<TokenGrant, TransportError> {
        oauth::password_grant(
            &self.client,
            &client_credentials(credentials),
            &credentials.username,
            &credentials.password,
        )
        .await
        .map(token_grant)
        .map_err(map_api_error)
    }

    async fn validate(&self, ctx: CallContext<'_>) -> Result<ChallengeDescriptor, TransportError> {
        let session_id = ctx.session_id.to_string();
        let api_ctx = RequestContext {
            access_token: ctx.access_token,
            session_id: &session_id,
        };

        let sessions = session::session_status(&self.client, api_ctx)
            .await
            .map_err(map_api_error)?;
        let remote = sessions
            .into_iter()
            .next()
            .ok_or_else(|| TransportError::Protocol("no session returned".to_string()))?;

        let validated = session::validate_session(&self.client, api_ctx, &remote)
            .await
            .map_err(map_api_error)?;
        let auth = validated.authentication;

        let kind = match auth.typ.as_deref() {
            Some(session::PUSH_TAN) => ChallengeKind::TimedPoll,
            None => ChallengeKind::ImmediateApproval,
            Some(other) => {
                return Err(TransportError::Protocol(format!(
                    "unsupported challenge type {other}"
                )));
            }
        };
        debug!(challenge_id = %auth.id, kind = %kind, "Push-TAN challenge received");

        Ok(ChallengeDescriptor {
            remote_session_id: validated.session.identifier,
            challenge_id: auth.id,
            kind,
            prompt: auth.challenge,
            status_link: auth.link.map(|l| l.href),
        })
    }

    async fn poll_challenge(
        &self,
        ctx: CallContext<'_>,
        challenge: &ChallengeDescriptor,
    ) -> Result<ChallengeStatus, TransportError> {
        let session_id = ctx.session_id.to_string();
        let api_ctx = RequestContext {
            access_token: ctx.access_token,
            session_id: &session_id,
        };
        let state = session::authentication_status(&self.client, api_ctx, &authentication_info(challenge))
            .await
            .map_err(map_api_error)?;

        Ok(match state {
            AuthenticationState::Pending => ChallengeStatus::Pending,
            AuthenticationState::Authenticated => ChallengeStatus::Approved,
            AuthenticationState::Rejected => ChallengeStatus::Rejected,
            AuthenticationState::Expired => ChallengeStatus::Expired,
            AuthenticationState::Unknown(status) => {
                warn!(status = %status, "Unknown challenge status, still waiting");
                ChallengeStatus::Pending
            }
        })
    }

    async fn activate_challenge(
        &self,
        ctx: CallContext<'_>,
        challenge: &ChallengeDescriptor,
    ) -> Result<(), TransportError> {
        let session_id = ctx.session_id.to_string();
        let api_ctx = RequestContext {
            access_token: ctx.access_token,
            session_id: &session_id,
        };
        let activated = session::activate_session(
            &self.client,
            api_ctx,
            &remote_session(challenge),
            &authentication_info(challenge),
        )
        .await
        .map_err(map_api_error)?;

        if activated.session_tan_active {
            Ok(())
        } else {
            Err(TransportError::Status {
                status: 422,
                message: "session TAN was not activated".to_string(),
                retry_after: None,
            })
        }
    }

    async fn secondary_grant(
        &self,
        credentials: &Credentials,
        ctx: CallContext<'_>,
    ) -> Result<TokenGrant, TransportError> {
        oauth::secondary_grant(&self.client, &client_credentials(credentials), ctx.access_token)
            .await
            .map(token_grant)
            .map_err(map_api_error)
    }

    async fn refresh(
        &self,
        credentials: &Credentials,
        refresh_token: &str,
    ) -> Result<TokenGrant, TransportError> {
        oauth::refresh_grant(&self.client, &client_credentials(credentials), refresh_token)
            .await
            .map(token_grant)
            .map_err(map_api_error)
    }

    async fn revoke(&self, access_token: &str) -> Result<(), TransportError> {
        oauth::revoke(&self.client, access_token)
            .await
            .map_err(map_api_error)
    }
}

#[async_trait]
impl BankingTransport for ComdirectTransport {
    async fn fetch_balances(
        &self,
        ctx: CallContext<'_>,
    ) -> Result<Vec<AccountBalance>, TransportError> {
        let session_id = ctx.session_id.to_string();
        let api_ctx = RequestContext {
            access_token: ctx.access_token,
            session_id: &session_id,
        };
        let list = banking::account_balances(&self.client, api_ctx)
            .await
            .map_err(map_api_error)?;
        Ok(list.values.into_iter().map(convert_balance).collect())
    }

    async fn fetch_transactions(
        &self,
        ctx: CallContext<'_>,
        account_id: &str,
        query: &TransactionQuery,
    ) -> Result<Vec<AccountTransaction>, TransportError> {
        let session_id = ctx.session_id.to_string();
        let api_ctx = RequestContext {
            access_token: ctx.access_token,
            session_id: &session_id,
        };
        let list = banking::account_transactions(&self.client, api_ctx, account_id, &api_query(query))
            .await
            .map_err(map_api_error)?;
        Ok(list.values.into_iter().map(convert_transaction).collect())
    }

    async fn submit_order(
        &self,
        ctx: CallContext<'_>,
        order: &LocalOrder,
    ) -> Result<OrderAck, TransportError> {
        let session_id = ctx.session_id.to_string();
        let api_ctx = RequestContext {
            access_token: ctx.access_token,
            session_id: &session_id,
        };
        let response = brokerage::place_order(&self.client, api_ctx, &order_request(order))
            .await
            .map_err(map_api_error)?;

        let rejected = response
            .order_status
            .as_deref()
            .is_some_and(|s| s.eq_ignore_ascii_case("REJECTED"));
        Ok(OrderAck {
            remote_order_id: Some(response.order_id),
            accepted: !rejected,
            message: response.order_status,
        })
    }
}
