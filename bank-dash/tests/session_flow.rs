//! End-to-end behaviour of the session stack against a scripted bank.

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use bank_dash::clock::Clock;
use bank_dash::config::RefreshJobConfig;
use bank_dash::credentials::CredentialStore;
use bank_dash::database::models::SyncStatus;
use bank_dash::database::repositories::{OrderRepository, SyncLogRepository};
use bank_dash::domain::{OrderInstructions, OrderSide, OrderStatus, OrderType, TransactionQuery};
use bank_dash::jobs::DataRefreshJob;
use bank_dash::repository::{DataError, UnavailableCause};
use bank_dash::session::{
    AuthError, ChallengeKind, ChallengeStatus, InvalidationReason, SessionEvent, SessionPhase,
    SessionToken,
};
use tokio::task::JoinHandle;
use common::{ACCOUNT_ID, FakeBank, Harness, MemorySyncLogRepository, USER_ID, fast_handshake};

fn market_buy() -> OrderInstructions {
    OrderInstructions {
        instrument: "DE0005140008".to_string(),
        side: OrderSide::Buy,
        order_type: OrderType::Market,
        quantity: 10.0,
        limit_price: None,
        notes: None,
    }
}

mod handshake {
    use super::*;

    #[tokio::test]
    async fn test_push_tan_approved_after_two_polls() {
        let h = Harness::new();

        let token = h.scheduler.acquire_token().await.unwrap();
        assert!(h.scheduler.phase().is_active());
        assert_eq!(FakeBank::count(&h.bank().polls), 2);
        assert_eq!(FakeBank::count(&h.bank().primary_grants), 1);
        assert_eq!(FakeBank::count(&h.bank().secondary_grants), 1);
        assert!(token.access_token().starts_with("session-"));

        let balances = h.repository.balances().await.unwrap();
        assert_eq!(balances.session_id, token.session_id);
        assert!(!balances.stale);
        assert_eq!(h.bank().tokens_seen(), vec![token.access_token().to_string()]);

        let state = h.credentials.load_refresh_state(USER_ID).await.unwrap().unwrap();
        assert_eq!(state.session_id, token.session_id.to_string());
    }

    #[tokio::test]
    async fn test_immediate_approval_skips_polling() {
        let bank = FakeBank::default();
        *bank.challenge_kind.lock() = ChallengeKind::ImmediateApproval;
        let h = Harness::with_bank(bank, fast_handshake());

        h.scheduler.acquire_token().await.unwrap();
        assert_eq!(FakeBank::count(&h.bank().polls), 0);
        assert!(h.scheduler.has_active_session());
    }

    #[tokio::test]
    async fn test_rejected_challenge_leaves_no_session() {
        let bank = FakeBank::default();
        *bank.challenge_outcome.lock() = ChallengeStatus::Rejected;
        let h = Harness::with_bank(bank, fast_handshake());

        let err = h.scheduler.acquire_token().await.unwrap_err();
        assert!(matches!(err, AuthError::ChallengeRejected));
        assert!(matches!(
            h.scheduler.phase(),
            SessionPhase::Failed(AuthError::ChallengeRejected)
        ));
        assert!(!h.scheduler.has_active_session());
        assert_eq!(FakeBank::count(&h.bank().secondary_grants), 0);

        let err = h.repository.balances().await.unwrap_err();
        assert!(err.requires_relogin());
        assert_eq!(FakeBank::count(&h.bank().balance_fetches), 0);
        assert_eq!(h.repository.balance_cache_stats().entry_count, 0);
    }

    #[tokio::test]
    async fn test_unapproved_challenge_expires() {
        let bank = FakeBank::default();
        bank.polls_until_resolved.store(u32::MAX, Ordering::SeqCst);
        let handshake = bank_dash::session::HandshakeConfig {
            poll_interval: Duration::from_millis(10),
            max_challenge_wait: Duration::from_millis(50),
        };
        let h = Harness::with_bank(bank, handshake);

        let err = h.scheduler.acquire_token().await.unwrap_err();
        assert!(matches!(err, AuthError::ChallengeExpired));
        assert!(!h.scheduler.has_active_session());
    }

    #[tokio::test]
    async fn test_wrong_pin_is_invalid_credentials() {
        let h = Harness::new();
        let mut wrong_pin = common::credentials();
        wrong_pin.password = "9999".to_string();
        h.credentials.insert(wrong_pin);

        let err = h.scheduler.acquire_token().await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials { .. }));
        assert!(err.requires_relogin());
        assert_eq!(FakeBank::count(&h.bank().polls), 0);
        assert!(h.scheduler.phase().is_failed());
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_handshake() {
        let h = Harness::new();

        let callers: Vec<_> = (0..8)
            .map(|_| {
                let scheduler = h.scheduler.clone();
                tokio::spawn(async move { scheduler.acquire_token().await })
            })
            .collect();

        let mut session_ids = Vec::new();
        for caller in callers {
            session_ids.push(caller.await.unwrap().unwrap().session_id);
        }

        assert_eq!(FakeBank::count(&h.bank().primary_grants), 1);
        assert!(session_ids.windows(2).all(|w| w[0] == w[1]));
    }

    #[tokio::test]
    async fn test_cancel_ends_the_attempt() {
        let bank = FakeBank::default();
        bank.polls_until_resolved.store(u32::MAX, Ordering::SeqCst);
        let h = Harness::with_bank(bank, fast_handshake());

        let mut phases = h.scheduler.watch_phase();
        let scheduler = h.scheduler.clone();
        let attempt = tokio::spawn(async move { scheduler.acquire_token().await });

        tokio::time::timeout(
            Duration::from_secs(2),
            phases.wait_for(SessionPhase::is_awaiting_approval),
        )
        .await
        .unwrap()
        .unwrap();

        assert!(h.scheduler.cancel());
        let result = attempt.await.unwrap();
        assert!(matches!(result, Err(AuthError::Cancelled)));
        assert!(!h.scheduler.has_active_session());
        assert!(!h.scheduler.cancel());
    }
}

mod renewal {
    use super::*;

    #[tokio::test]
    async fn test_token_near_expiry_is_refreshed_in_place() {
        let h = Harness::new();
        let first = h.scheduler.acquire_token().await.unwrap();
        h.repository.balances().await.unwrap();

        // 30s left with a 60s margin.
        h.advance(570);
        let renewed = h.scheduler.acquire_token().await.unwrap();

        assert_eq!(renewed.session_id, first.session_id);
        assert_ne!(renewed.access_token(), first.access_token());
        assert_eq!(FakeBank::count(&h.bank().refreshes), 1);
        assert_eq!(FakeBank::count(&h.bank().primary_grants), 1);
        assert_eq!(h.repository.balance_cache_stats().entry_count, 1);
    }

    #[tokio::test]
    async fn test_token_with_margin_left_is_reused() {
        let h = Harness::new();
        let first = h.scheduler.acquire_token().await.unwrap();

        h.advance(500);
        let again = h.scheduler.acquire_token().await.unwrap();
        assert_eq!(again.access_token(), first.access_token());
        assert_eq!(FakeBank::count(&h.bank().refreshes), 0);
    }

    #[tokio::test]
    async fn test_failed_refresh_logs_in_again_and_evicts_old_data() {
        let h = Harness::new();
        let first = h.scheduler.acquire_token().await.unwrap();
        let old = h.repository.balances().await.unwrap();
        assert_eq!(old.session_id, first.session_id);

        let mut events = h.scheduler.subscribe_events();
        FakeBank::set(&h.bank().refresh_fails, true);
        h.advance(700);

        let fresh = h.repository.balances().await.unwrap();
        assert_ne!(fresh.session_id, first.session_id);
        assert_eq!(FakeBank::count(&h.bank().primary_grants), 2);
        assert_eq!(FakeBank::count(&h.bank().balance_fetches), 2);
        assert_eq!(h.repository.balance_cache_stats().evictions, 1);

        match events.recv().await.unwrap() {
            SessionEvent::Invalidated { session_id, reason } => {
                assert_eq!(session_id, first.session_id);
                assert_eq!(reason, InvalidationReason::RefreshFailed);
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(matches!(
            events.recv().await.unwrap(),
            SessionEvent::Established { .. }
        ));
    }

    #[tokio::test]
    async fn test_silent_acquire_never_logs_in() {
        let h = Harness::new();
        assert!(h.scheduler.acquire_token_silently().await.is_err());
        assert_eq!(FakeBank::count(&h.bank().primary_grants), 0);

        h.scheduler.acquire_token().await.unwrap();
        FakeBank::set(&h.bank().refresh_fails, true);
        h.advance(590);

        assert!(h.scheduler.acquire_token_silently().await.is_err());
        assert_eq!(FakeBank::count(&h.bank().primary_grants), 1);
        assert!(!h.scheduler.has_active_session());
    }

    #[tokio::test]
    async fn test_logout_revokes_and_evicts() {
        let h = Harness::new();
        let token = h.scheduler.acquire_token().await.unwrap();
        h.repository.balances().await.unwrap();
        h.repository
            .transactions(ACCOUNT_ID, &TransactionQuery::default())
            .await
            .unwrap();

        h.scheduler.logout().await;

        assert!(!h.scheduler.has_active_session());
        assert_eq!(FakeBank::count(&h.bank().revokes), 1);
        assert_eq!(h.repository.balance_cache_stats().entry_count, 0);
        assert_eq!(h.repository.transaction_cache_stats().entry_count, 0);
        assert!(h.credentials.load_refresh_state(USER_ID).await.unwrap().is_none());
        assert!(matches!(h.scheduler.phase(), SessionPhase::Unauthenticated));

        let next = h.scheduler.acquire_token().await.unwrap();
        assert_ne!(next.session_id, token.session_id);
    }

    /// Start a login and return once the bank granted it, while its refresh state is still being written.
    async fn granted_while_persisting(h: &Harness) -> JoinHandle<Result<SessionToken, AuthError>> {
        h.credentials.persist_delay_ms.store(300, Ordering::SeqCst);
        let mut phases = h.scheduler.watch_phase();
        let scheduler = h.scheduler.clone();
        let attempt = tokio::spawn(async move { scheduler.acquire_token().await });

        tokio::time::timeout(Duration::from_secs(2), phases.wait_for(SessionPhase::is_active))
            .await
            .unwrap()
            .unwrap();
        attempt
    }

    #[tokio::test]
    async fn test_logout_during_login_leaves_no_session() {
        let h = Harness::new();
        let attempt = granted_while_persisting(&h).await;

        h.scheduler.logout().await;

        assert!(matches!(attempt.await.unwrap(), Err(AuthError::Cancelled)));
        assert!(!h.scheduler.has_active_session());
        assert!(h.credentials.load_refresh_state(USER_ID).await.unwrap().is_none());
        // The granted token is revoked even though it was never installed.
        assert_eq!(FakeBank::count(&h.bank().revokes), 1);
    }

    #[tokio::test]
    async fn test_cancel_after_grant_discards_the_session() {
        let h = Harness::new();
        let attempt = granted_while_persisting(&h).await;

        assert!(h.scheduler.cancel());

        assert!(matches!(attempt.await.unwrap(), Err(AuthError::Cancelled)));
        assert!(!h.scheduler.has_active_session());
        assert!(h.credentials.load_refresh_state(USER_ID).await.unwrap().is_none());

        h.credentials.persist_delay_ms.store(0, Ordering::SeqCst);
        h.scheduler.acquire_token().await.unwrap();
        assert!(h.credentials.load_refresh_state(USER_ID).await.unwrap().is_some());
    }
}

mod cache {
    use super::*;

    #[tokio::test]
    async fn test_fresh_reads_are_served_from_cache() {
        let h = Harness::new();
        let first = h.repository.balances().await.unwrap();
        h.advance(200);
        let second = h.repository.balances().await.unwrap();

        assert!(Arc::ptr_eq(&first.value, &second.value));
        assert_eq!(first.fetched_at, second.fetched_at);
        assert_eq!(FakeBank::count(&h.bank().balance_fetches), 1);
        assert_eq!(h.repository.balance_cache_stats().hits, 1);
    }

    #[tokio::test]
    async fn test_refresh_bypasses_cache() {
        let h = Harness::new();
        let first = h.repository.balances().await.unwrap();
        let refreshed = h.repository.refresh_balances().await.unwrap();

        assert_eq!(FakeBank::count(&h.bank().balance_fetches), 2);
        assert_ne!(first.value, refreshed.value);
        assert_eq!(refreshed.session_id, first.session_id);
    }

    #[tokio::test]
    async fn test_transactions_are_keyed_by_query() {
        let h = Harness::new();
        let booked = TransactionQuery {
            state: Some(bank_dash::domain::TransactionState::Booked),
            ..Default::default()
        };

        h.repository
            .transactions(ACCOUNT_ID, &TransactionQuery::default())
            .await
            .unwrap();
        h.repository.transactions(ACCOUNT_ID, &booked).await.unwrap();
        h.repository.transactions(ACCOUNT_ID, &booked).await.unwrap();

        assert_eq!(FakeBank::count(&h.bank().transaction_fetches), 2);
        assert_eq!(h.repository.transaction_cache_stats().entry_count, 2);
    }

    #[tokio::test]
    async fn test_unauthorized_fetch_invalidates_session() {
        let h = Harness::new();
        let first = h.repository.balances().await.unwrap();

        FakeBank::set(&h.bank().fetch_unauthorized, true);
        let err = h.repository.refresh_balances().await.unwrap_err();
        assert!(matches!(
            err.auth_error(),
            Some(AuthError::SessionRejected { .. })
        ));
        assert!(err.requires_relogin());
        assert!(!h.scheduler.has_active_session());
        assert_eq!(h.repository.balance_cache_stats().entry_count, 0);

        FakeBank::set(&h.bank().fetch_unauthorized, false);
        let again = h.repository.balances().await.unwrap();
        assert_ne!(again.session_id, first.session_id);
        assert_eq!(FakeBank::count(&h.bank().primary_grants), 2);
    }

    #[tokio::test]
    async fn test_stale_data_served_when_bank_unreachable() {
        let h = Harness::new();
        let first = h.repository.balances().await.unwrap();

        h.advance(400);
        FakeBank::set(&h.bank().fetch_fails, true);
        let stale = h.repository.balances().await.unwrap();

        assert!(stale.stale);
        assert_eq!(stale.fetched_at, first.fetched_at);
        assert_eq!(stale.session_id, first.session_id);
        // One call plus one retry.
        assert_eq!(FakeBank::count(&h.bank().balance_fetches), 3);
    }

    #[tokio::test]
    async fn test_unreachable_bank_without_cached_data_is_unavailable() {
        let h = Harness::new();
        FakeBank::set(&h.bank().fetch_fails, true);

        let err = h.repository.balances().await.unwrap_err();
        assert!(matches!(
            err,
            DataError::Unavailable {
                cause: UnavailableCause::Transport(_),
                ..
            }
        ));
        assert!(!err.requires_relogin());
        assert!(h.scheduler.has_active_session());
    }

    #[tokio::test]
    async fn test_concurrent_cold_reads_fetch_once() {
        let h = Harness::new();
        h.scheduler.acquire_token().await.unwrap();
        h.bank().fetch_delay_ms.store(20, Ordering::SeqCst);

        let readers: Vec<_> = (0..8)
            .map(|_| {
                let repository = h.repository.clone();
                tokio::spawn(async move { repository.balances().await })
            })
            .collect();
        let mut results = Vec::new();
        for reader in readers {
            results.push(reader.await.unwrap().unwrap());
        }

        assert_eq!(FakeBank::count(&h.bank().balance_fetches), 1);
        assert!(results.windows(2).all(|w| Arc::ptr_eq(&w[0].value, &w[1].value)));
        assert_eq!(h.repository.balance_cache_stats().entry_count, 1);
    }

    #[tokio::test]
    async fn test_history_outlives_the_session_cache() {
        let h = Harness::new();
        h.repository.balances().await.unwrap();
        h.repository.refresh_balances().await.unwrap();
        h.repository
            .transactions(ACCOUNT_ID, &TransactionQuery::default())
            .await
            .unwrap();
        h.repository
            .refresh_transactions(ACCOUNT_ID, &TransactionQuery::default())
            .await
            .unwrap();

        h.scheduler.logout().await;
        assert_eq!(h.repository.balance_cache_stats().entry_count, 0);

        // One row per account, holding the latest fetch.
        let balances = h.repository.list_cached_balances().await.unwrap();
        assert_eq!(balances.len(), 1);
        assert_eq!(balances[0].balance.as_ref().unwrap().value, "200.00");
        let transactions = h.repository.list_cached_transactions(ACCOUNT_ID).await.unwrap();
        assert_eq!(transactions.len(), 2);
        assert!(h.repository.list_cached_transactions("other").await.unwrap().is_empty());

        // Cached reads never fall back to history.
        FakeBank::set(&h.bank().fetch_fails, true);
        let err = h.repository.balances().await.unwrap_err();
        assert!(matches!(err, DataError::Unavailable { .. }));
    }
}

mod orders {
    use super::*;

    #[tokio::test]
    async fn test_draft_order_is_local_until_synced() {
        let h = Harness::new();
        let order = h
            .repository
            .create_local_order(ACCOUNT_ID, market_buy())
            .await
            .unwrap();

        assert_eq!(order.status, OrderStatus::Draft);
        assert_eq!(FakeBank::count(&h.bank().primary_grants), 0);
        assert_eq!(h.repository.list_orders(Some(ACCOUNT_ID)).await.unwrap().len(), 1);

        let synced = h.repository.sync_order(&order.id).await.unwrap();
        assert_eq!(synced.status, OrderStatus::Confirmed);
        assert_eq!(synced.remote_order_id, Some(format!("remote-{}", order.id)));

        let again = h.repository.sync_order(&order.id).await.unwrap();
        assert_eq!(again.status, OrderStatus::Confirmed);
        assert_eq!(FakeBank::count(&h.bank().submits), 1);
    }

    #[tokio::test]
    async fn test_invalid_instructions_are_refused() {
        let h = Harness::new();
        let mut instructions = market_buy();
        instructions.quantity = 0.0;

        let err = h
            .repository
            .create_local_order(ACCOUNT_ID, instructions)
            .await
            .unwrap_err();
        assert!(matches!(err, DataError::Storage(bank_dash::Error::Validation(_))));
        assert!(h.repository.list_orders(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failing_submission_stays_draft_without_duplicates() {
        let h = Harness::new();
        let order = h
            .repository
            .create_local_order(ACCOUNT_ID, market_buy())
            .await
            .unwrap();

        FakeBank::set(&h.bank().submit_fails, true);
        for attempt in 1..=3 {
            let err = h.repository.sync_order(&order.id).await.unwrap_err();
            assert!(matches!(err, DataError::Unavailable { .. }));

            let stored = h.repository.get_order(&order.id).await.unwrap();
            assert_eq!(stored.status, OrderStatus::Draft);
            assert!(stored.last_sync_error.is_some());
            assert_eq!(stored.sync_attempts, attempt);
        }
        // Submissions are never retried behind the caller's back.
        assert_eq!(FakeBank::count(&h.bank().submits), 3);
        assert_eq!(FakeBank::count(&h.bank().accepted_orders), 0);

        FakeBank::set(&h.bank().submit_fails, false);
        let synced = h.repository.sync_order(&order.id).await.unwrap();
        assert_eq!(synced.status, OrderStatus::Confirmed);
        assert!(synced.last_sync_error.is_none());
        assert_eq!(FakeBank::count(&h.bank().accepted_orders), 1);
    }

    #[tokio::test]
    async fn test_refused_order_is_rejected() {
        let h = Harness::new();
        let order = h
            .repository
            .create_local_order(ACCOUNT_ID, market_buy())
            .await
            .unwrap();

        FakeBank::set(&h.bank().submit_refused, true);
        let synced = h.repository.sync_order(&order.id).await.unwrap();
        assert_eq!(synced.status, OrderStatus::Rejected);
        assert!(synced.last_sync_error.unwrap().contains("insufficient funds"));
    }

    #[tokio::test]
    async fn test_order_in_flight_is_not_resent() {
        let h = Harness::new();
        let mut order = h
            .repository
            .create_local_order(ACCOUNT_ID, market_buy())
            .await
            .unwrap();
        order.mark_submitted(h.clock.now()).unwrap();
        h.orders.update(&order).await.unwrap();

        let err = h.repository.sync_order(&order.id).await.unwrap_err();
        assert!(matches!(
            err,
            DataError::SyncConflict {
                status: OrderStatus::Submitted,
                ..
            }
        ));
        assert_eq!(FakeBank::count(&h.bank().submits), 0);

        let reopened = h.repository.reopen_order(&order.id).await.unwrap();
        assert_eq!(reopened.status, OrderStatus::Draft);
        assert_eq!(reopened.last_sync_error.as_deref(), Some("reopened by user"));
    }

    #[tokio::test]
    async fn test_unknown_order() {
        let h = Harness::new();
        let err = h.repository.sync_order("missing").await.unwrap_err();
        assert!(matches!(err, DataError::OrderNotFound(_)));
    }

    #[tokio::test]
    async fn test_order_locks_are_released() {
        let h = Harness::new();
        for _ in 0..3 {
            let order = h
                .repository
                .create_local_order(ACCOUNT_ID, market_buy())
                .await
                .unwrap();
            h.repository.sync_order(&order.id).await.unwrap();
        }
        h.repository.sync_order("missing").await.unwrap_err();

        assert_eq!(FakeBank::count(&h.bank().submits), 3);
        assert_eq!(h.repository.locked_orders(), 0);
    }
}

mod refresh_job {
    use super::*;

    fn job(h: &Harness, logs: Arc<MemorySyncLogRepository>) -> DataRefreshJob {
        DataRefreshJob::new(
            h.repository.clone(),
            logs,
            &RefreshJobConfig {
                interval: None,
                accounts: vec![ACCOUNT_ID.to_string()],
            },
        )
    }

    #[tokio::test]
    async fn test_skipped_without_session() {
        let h = Harness::new();
        let logs = Arc::new(MemorySyncLogRepository::default());

        let outcome = job(&h, logs.clone()).run_once().await;
        assert_eq!(outcome.status, SyncStatus::Skipped);
        assert_eq!(FakeBank::count(&h.bank().primary_grants), 0);

        let recorded = logs.recent(10).await.unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].status(), Some(SyncStatus::Skipped));
        assert!(recorded[0].finished_at.is_some());
    }

    #[tokio::test]
    async fn test_refreshes_everything_with_active_session() {
        let h = Harness::new();
        h.scheduler.acquire_token().await.unwrap();
        h.repository.balances().await.unwrap();
        let logs = Arc::new(MemorySyncLogRepository::default());

        let outcome = job(&h, logs.clone()).run_once().await;
        assert_eq!(outcome.status, SyncStatus::Succeeded);
        assert_eq!(FakeBank::count(&h.bank().balance_fetches), 2);
        assert_eq!(FakeBank::count(&h.bank().transaction_fetches), 1);
        assert_eq!(logs.recent(10).await.unwrap()[0].status(), Some(SyncStatus::Succeeded));
    }

    #[tokio::test]
    async fn test_failed_fetches_are_reported() {
        let h = Harness::new();
        h.scheduler.acquire_token().await.unwrap();
        FakeBank::set(&h.bank().fetch_fails, true);

        let outcome = job(&h, Arc::new(MemorySyncLogRepository::default()))
            .run_once()
            .await;
        assert_eq!(outcome.status, SyncStatus::Failed);
        let detail = outcome.detail.unwrap();
        assert!(detail.contains("balances"));
        assert!(detail.contains(ACCOUNT_ID));
    }

    #[tokio::test]
    async fn test_rejected_session_is_not_replaced_by_a_login() {
        let h = Harness::new();
        h.scheduler.acquire_token().await.unwrap();
        let polls = FakeBank::count(&h.bank().polls);
        FakeBank::set(&h.bank().fetch_unauthorized, true);

        let outcome = job(&h, Arc::new(MemorySyncLogRepository::default()))
            .run_once()
            .await;

        assert_eq!(outcome.status, SyncStatus::Failed);
        assert_eq!(FakeBank::count(&h.bank().primary_grants), 1);
        assert_eq!(FakeBank::count(&h.bank().polls), polls);
        assert!(!h.scheduler.has_active_session());
        assert!(!h.scheduler.is_renewing());
    }

    #[tokio::test]
    async fn test_start_stops_on_cancel() {
        let h = Harness::new();
        let job = Arc::new(job(&h, Arc::new(MemorySyncLogRepository::default())));
        let cancel = tokio_util::sync::CancellationToken::new();

        let handle = job.start(Duration::from_secs(3600), cancel.clone());
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
