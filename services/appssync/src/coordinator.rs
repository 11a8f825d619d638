//! Authorization flow coordinator
//!
//! Owns the flow state (and with it the single in-flight request slot)
//! behind a mutex, and executes the actions the state machine returns:
//! building the authorization URL, exchanging the code, persisting the
//! credential. Exchange and store I/O run outside the lock. Exchange
//! progress and the completed credential are published on a watch channel
//! for the listener loop.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::Secret;
use google_auth::{ClientConfig, Credential, TokenExchanger, TokenStore};
use tokio::sync::{Mutex, watch};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{FlowError, Result};
use crate::flow::{
    AuthorizationRequest, FailureReason, FlowAction, FlowEvent, FlowState, handle_event,
};

/// Exchange progress as seen by the listener loop.
#[derive(Debug, Clone, Default)]
enum Progress {
    #[default]
    Waiting,
    Exchanging,
    Completed(Credential),
    ExchangeFailed(FailureReason),
}

pub struct Coordinator {
    client: ClientConfig,
    redirect_uri: String,
    callback_timeout: Duration,
    exchanger: Arc<dyn TokenExchanger>,
    store: TokenStore,
    state: Mutex<FlowState>,
    progress: watch::Sender<Progress>,
}

impl Coordinator {
    pub fn new(
        client: ClientConfig,
        redirect_uri: impl Into<String>,
        callback_timeout: Duration,
        exchanger: Arc<dyn TokenExchanger>,
        store: TokenStore,
    ) -> Self {
        let (progress, _) = watch::channel(Progress::Waiting);
        Self {
            client,
            redirect_uri: redirect_uri.into(),
            callback_timeout,
            exchanger,
            store,
            state: Mutex::new(FlowState::Idle),
            progress,
        }
    }

    /// Begin a new flow and return the authorization URL to send the user to.
    ///
    /// Replaces any outstanding request; its callback will then be rejected.
    pub async fn start(&self) -> Result<String> {
        let state = google_auth::generate_state();
        let verifier = google_auth::generate_verifier();
        let challenge = google_auth::compute_challenge(&verifier);
        let authorization_url = google_auth::build_authorization_url(
            &self.client,
            &self.redirect_uri,
            &state,
            &challenge,
        )
        .map_err(|e| FlowError::Config(e.to_string()))?;

        let request = AuthorizationRequest {
            flow_id: Uuid::new_v4(),
            state,
            verifier: Secret::new(verifier),
            client_id: self.client.client_id.clone(),
            scopes: self.client.scopes.clone(),
            redirect_uri: self.redirect_uri.clone(),
            authorization_url,
        };
        if let Some(previous) = self.state.lock().await.pending_request() {
            warn!(flow_id = %previous.flow_id, "replacing outstanding authorization request");
        }
        info!(
            flow_id = %request.flow_id,
            client_id = %request.client_id,
            scopes = ?request.scopes,
            "authorization flow started"
        );

        match self.apply(FlowEvent::Started { request }).await {
            FlowAction::Redirect { url } => Ok(url),
            other => Err(FlowError::Config(format!(
                "unexpected action after start: {other:?}"
            ))),
        }
    }

    /// Record that the browser was sent to the provider.
    pub async fn mark_redirected(&self) {
        self.apply(FlowEvent::Redirected).await;
    }

    /// Handle the provider's redirect back to the callback route.
    ///
    /// The in-flight request is consumed whatever the outcome, so a replay of
    /// the same callback fails with `AuthorizationState`.
    pub async fn handle_callback(
        &self,
        state: String,
        code: Option<String>,
        error: Option<String>,
    ) -> Result<Credential> {
        let action = self
            .apply(FlowEvent::CallbackReceived { state, code, error })
            .await;

        match action {
            FlowAction::ExchangeCode {
                flow_id,
                code,
                verifier,
                redirect_uri,
            } => {
                info!(%flow_id, "callback accepted, exchanging code");
                self.progress.send_replace(Progress::Exchanging);
                match self.exchange(&code, &verifier, &redirect_uri).await {
                    Ok(credential) => {
                        match self.apply(FlowEvent::ExchangeSucceeded).await {
                            FlowAction::ScheduleShutdown => {
                                info!(
                                    %flow_id,
                                    path = %self.store.path().display(),
                                    "authorization completed, token stored"
                                );
                                self.progress
                                    .send_replace(Progress::Completed(credential.clone()));
                            }
                            _ => {
                                warn!(
                                    %flow_id,
                                    "token stored but a newer flow replaced this one, listener stays up"
                                );
                                self.progress.send_replace(Progress::Waiting);
                            }
                        }
                        Ok(credential)
                    }
                    Err(reason) => {
                        self.apply(FlowEvent::ExchangeFailed(reason.clone())).await;
                        let err = self.settle(reason.clone()).await;
                        self.progress.send_replace(Progress::ExchangeFailed(reason));
                        Err(err)
                    }
                }
            }
            FlowAction::Reject { reason } => Err(self.settle(reason).await),
            other => Err(FlowError::Config(format!(
                "unexpected action after callback: {other:?}"
            ))),
        }
    }

    /// Fail the outstanding flow because the callback wait expired.
    ///
    /// `None` when a code exchange is in flight or done: its outcome decides.
    pub async fn time_out(&self) -> Option<FlowError> {
        match self.apply(FlowEvent::TimedOut).await {
            FlowAction::Reject { reason } => Some(self.settle(reason).await),
            _ => None,
        }
    }

    /// Wait until a flow completes, bounded by the callback timeout.
    ///
    /// An exchange still running when the timeout fires is waited for; the
    /// HTTP client's own timeout bounds it.
    pub async fn wait_for_completion(&self) -> Result<Credential> {
        let mut rx = self.progress.subscribe();
        let waited = tokio::time::timeout(self.callback_timeout, async {
            rx.wait_for(|p| matches!(p, Progress::Completed(_)))
                .await
                .ok()
                .map(|progress| progress.clone())
        })
        .await;

        let progress = match waited {
            Ok(Some(progress)) => progress,
            Ok(None) => return Err(FlowError::Interrupted),
            Err(_) => {
                if let Some(err) = self.time_out().await {
                    return Err(err);
                }
                info!("callback timeout reached during code exchange, waiting for its result");
                let settled = rx
                    .wait_for(|p| !matches!(p, Progress::Exchanging))
                    .await
                    .ok()
                    .map(|progress| progress.clone());
                match settled {
                    Some(progress) => progress,
                    None => return Err(FlowError::Interrupted),
                }
            }
        };

        match progress {
            Progress::Completed(credential) => Ok(credential),
            Progress::ExchangeFailed(reason) => Err(self.error_for(reason)),
            Progress::Waiting | Progress::Exchanging => {
                Err(FlowError::Timeout(self.callback_timeout.as_secs()))
            }
        }
    }

    /// Label of the current state, for logs and tests.
    pub async fn state_label(&self) -> &'static str {
        self.state.lock().await.label()
    }

    /// Current state token of the outstanding request, if any.
    #[cfg(test)]
    pub async fn pending_state(&self) -> Option<String> {
        self.state
            .lock()
            .await
            .pending_request()
            .map(|request| request.state.clone())
    }

    async fn apply(&self, event: FlowEvent) -> FlowAction {
        let mut guard = self.state.lock().await;
        let current = std::mem::replace(&mut *guard, FlowState::Idle);
        let (next, action) = handle_event(current, event);
        *guard = next;
        action
    }

    /// Log a failure, settle the machine back to idle and map it to an error.
    async fn settle(&self, reason: FailureReason) -> FlowError {
        let label = self.state_label().await;
        warn!(reason = ?reason, state = label, "authorization flow failed");
        self.apply(FlowEvent::Reset).await;
        self.error_for(reason)
    }

    fn error_for(&self, reason: FailureReason) -> FlowError {
        match reason {
            FailureReason::StateMismatch => FlowError::AuthorizationState,
            FailureReason::MissingCode => FlowError::MissingParameter("code"),
            FailureReason::Denied(e) => FlowError::Denied(e),
            FailureReason::Exchange(e) => FlowError::Exchange(e),
            FailureReason::Write(e) => FlowError::Write(e),
            FailureReason::Timeout => FlowError::Timeout(self.callback_timeout.as_secs()),
        }
    }

    async fn exchange(
        &self,
        code: &str,
        verifier: &Secret<String>,
        redirect_uri: &str,
    ) -> std::result::Result<Credential, FailureReason> {
        let response = self
            .exchanger
            .exchange(code, verifier.expose(), redirect_uri)
            .await
            .map_err(|e| FailureReason::Exchange(e.to_string()))?;

        let credential = Credential::from_response(response, Utc::now());
        if !credential.is_valid() {
            return Err(FailureReason::Exchange(
                "token endpoint returned an empty access token".into(),
            ));
        }

        self.store
            .store(&credential)
            .await
            .map_err(|e| FailureReason::Write(e.to_string()))?;
        Ok(credential)
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{StubExchanger, test_client};
    use super::*;
    use std::collections::HashMap;
    use std::path::Path;

    const REDIRECT: &str = "http://localhost:8080/a/1/auth";

    fn coordinator(dir: &Path, exchanger: Arc<StubExchanger>) -> Coordinator {
        Coordinator::new(
            test_client(),
            REDIRECT,
            Duration::from_secs(600),
            exchanger,
            TokenStore::new(dir.join("token.json")),
        )
    }

    fn query(url: &str) -> HashMap<String, String> {
        url::Url::parse(url)
            .unwrap()
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    /// Arm the slot with a known state token, as if `start` had generated it.
    async fn arm(coordinator: &Coordinator, state: &str) {
        let request = AuthorizationRequest {
            flow_id: Uuid::new_v4(),
            state: state.into(),
            verifier: "verifier".into(),
            client_id: "abc".into(),
            scopes: vec![],
            redirect_uri: REDIRECT.into(),
            authorization_url: "https://provider/auth".into(),
        };
        coordinator.apply(FlowEvent::Started { request }).await;
        coordinator.mark_redirected().await;
    }

    #[tokio::test]
    async fn start_returns_url_with_stored_state() {
        let dir = tempfile::tempdir().unwrap();
        let c = coordinator(dir.path(), Arc::new(StubExchanger::new("T")));

        let url = c.start().await.unwrap();
        let params = query(&url);
        assert_eq!(params["client_id"], "abc");
        assert_eq!(params["scope"], "A B");
        assert_eq!(params["access_type"], "offline");
        assert_eq!(params["redirect_uri"], REDIRECT);
        assert_eq!(Some(params["state"].clone()), c.pending_state().await);
        assert_eq!(c.state_label().await, "awaiting_user_authorization");
    }

    #[tokio::test]
    async fn matching_callback_exchanges_and_stores_token() {
        let dir = tempfile::tempdir().unwrap();
        let exchanger = Arc::new(StubExchanger::new("T"));
        let c = coordinator(dir.path(), exchanger.clone());
        arm(&c, "st123").await;

        let credential = c
            .handle_callback("st123".into(), Some("xyz".into()), None)
            .await
            .unwrap();
        assert_eq!(credential.access_token.expose(), "T");
        assert_eq!(exchanger.exchanged(), vec!["xyz".to_string()]);

        let stored = TokenStore::new(dir.path().join("token.json"))
            .load()
            .await
            .unwrap();
        assert_eq!(stored.access_token.expose(), "T");
        assert_eq!(c.state_label().await, "completed");
        assert!(c.pending_state().await.is_none());
    }

    #[tokio::test]
    async fn replayed_callback_fails() {
        let dir = tempfile::tempdir().unwrap();
        let exchanger = Arc::new(StubExchanger::new("T"));
        let c = coordinator(dir.path(), exchanger.clone());
        arm(&c, "st123").await;

        c.handle_callback("st123".into(), Some("xyz".into()), None)
            .await
            .unwrap();
        let err = c
            .handle_callback("st123".into(), Some("xyz".into()), None)
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::AuthorizationState), "got: {err:?}");
        assert_eq!(exchanger.exchanged().len(), 1);
    }

    #[tokio::test]
    async fn mismatched_state_neither_exchanges_nor_writes() {
        let dir = tempfile::tempdir().unwrap();
        let exchanger = Arc::new(StubExchanger::new("T"));
        let c = coordinator(dir.path(), exchanger.clone());
        arm(&c, "st123").await;

        let err = c
            .handle_callback("st999".into(), Some("xyz".into()), None)
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::AuthorizationState));
        assert!(exchanger.exchanged().is_empty());
        assert!(!dir.path().join("token.json").exists());
        assert_eq!(c.state_label().await, "idle");

        // The slot is gone: even the right state now fails
        let err = c
            .handle_callback("st123".into(), Some("xyz".into()), None)
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::AuthorizationState));
    }

    #[tokio::test]
    async fn callback_without_start_fails() {
        let dir = tempfile::tempdir().unwrap();
        let exchanger = Arc::new(StubExchanger::new("T"));
        let c = coordinator(dir.path(), exchanger.clone());

        let err = c
            .handle_callback(String::new(), Some("xyz".into()), None)
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::AuthorizationState));
        assert!(exchanger.exchanged().is_empty());
    }

    #[tokio::test]
    async fn rejected_exchange_carries_provider_response() {
        let dir = tempfile::tempdir().unwrap();
        let c = coordinator(dir.path(), Arc::new(StubExchanger::new("T")));
        arm(&c, "st1").await;

        let err = c
            .handle_callback("st1".into(), Some("bad".into()), None)
            .await
            .unwrap_err();
        match err {
            FlowError::Exchange(msg) => assert!(msg.contains("invalid_grant"), "got: {msg}"),
            other => panic!("expected Exchange, got {other:?}"),
        }
        assert!(!dir.path().join("token.json").exists());
        assert_eq!(c.state_label().await, "idle");
    }

    #[tokio::test]
    async fn empty_access_token_is_exchange_error() {
        let dir = tempfile::tempdir().unwrap();
        let c = coordinator(dir.path(), Arc::new(StubExchanger::new("")));
        arm(&c, "st1").await;

        let err = c
            .handle_callback("st1".into(), Some("xyz".into()), None)
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::Exchange(_)));
        assert!(!dir.path().join("token.json").exists());
    }

    #[tokio::test]
    async fn missing_code_and_denial_fail_locally() {
        let dir = tempfile::tempdir().unwrap();
        let exchanger = Arc::new(StubExchanger::new("T"));
        let c = coordinator(dir.path(), exchanger.clone());

        arm(&c, "st1").await;
        let err = c.handle_callback("st1".into(), None, None).await.unwrap_err();
        assert!(matches!(err, FlowError::MissingParameter("code")));

        arm(&c, "st2").await;
        let err = c
            .handle_callback("st2".into(), None, Some("access_denied".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::Denied(ref e) if e == "access_denied"));

        assert!(exchanger.exchanged().is_empty());
    }

    #[tokio::test]
    async fn write_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the token's parent directory should be
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "x").unwrap();
        let c = Coordinator::new(
            test_client(),
            REDIRECT,
            Duration::from_secs(600),
            Arc::new(StubExchanger::new("T")),
            TokenStore::new(blocker.join("token.json")),
        );
        arm(&c, "st1").await;

        let err = c
            .handle_callback("st1".into(), Some("xyz".into()), None)
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::Write(_)), "got: {err:?}");
    }

    #[tokio::test]
    async fn second_start_invalidates_first_state() {
        let dir = tempfile::tempdir().unwrap();
        let c = coordinator(dir.path(), Arc::new(StubExchanger::new("T")));

        let first = query(&c.start().await.unwrap())["state"].clone();
        let second = query(&c.start().await.unwrap())["state"].clone();
        assert_ne!(first, second);

        let err = c
            .handle_callback(first, Some("xyz".into()), None)
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::AuthorizationState));
    }

    #[tokio::test]
    async fn wait_for_completion_returns_published_credential() {
        let dir = tempfile::tempdir().unwrap();
        let c = Arc::new(coordinator(dir.path(), Arc::new(StubExchanger::new("T"))));
        arm(&c, "st1").await;

        let waiter = tokio::spawn({
            let c = c.clone();
            async move { c.wait_for_completion().await }
        });
        tokio::task::yield_now().await;

        c.handle_callback("st1".into(), Some("xyz".into()), None)
            .await
            .unwrap();
        let credential = waiter.await.unwrap().unwrap();
        assert_eq!(credential.access_token.expose(), "T");
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_completion_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let c = coordinator(dir.path(), Arc::new(StubExchanger::new("T")));
        arm(&c, "st1").await;

        let err = c.wait_for_completion().await.unwrap_err();
        assert!(matches!(err, FlowError::Timeout(600)), "got: {err:?}");
        assert!(c.pending_state().await.is_none());
        assert_eq!(c.state_label().await, "idle");
    }

    #[tokio::test]
    async fn callback_runs_on_spawned_task() {
        let dir = tempfile::tempdir().unwrap();
        let c = Arc::new(coordinator(dir.path(), Arc::new(StubExchanger::new("T"))));
        arm(&c, "st1").await;

        let handled = tokio::spawn({
            let c = c.clone();
            async move { c.handle_callback("st1".into(), Some("xyz".into()), None).await }
        });
        assert!(handled.await.unwrap().is_ok());

        // Failure path goes through the logging settle step
        let failed = tokio::spawn({
            let c = c.clone();
            async move { c.handle_callback("st1".into(), Some("xyz".into()), None).await }
        });
        assert!(matches!(
            failed.await.unwrap(),
            Err(FlowError::AuthorizationState)
        ));

        let timed_out = tokio::spawn(async move { c.time_out().await });
        assert!(matches!(
            timed_out.await.unwrap(),
            Some(FlowError::Timeout(600))
        ));
    }

    fn slow_coordinator(dir: &Path, exchanger: StubExchanger) -> Arc<Coordinator> {
        Arc::new(Coordinator::new(
            test_client(),
            REDIRECT,
            Duration::from_secs(1),
            Arc::new(exchanger),
            TokenStore::new(dir.join("token.json")),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_during_exchange_waits_for_token() {
        let dir = tempfile::tempdir().unwrap();
        let c = slow_coordinator(
            dir.path(),
            StubExchanger::slow("T", Duration::from_secs(2)),
        );
        arm(&c, "st1").await;

        let waiter = tokio::spawn({
            let c = c.clone();
            async move { c.wait_for_completion().await }
        });
        tokio::task::yield_now().await;

        let callback = c
            .handle_callback("st1".into(), Some("xyz".into()), None)
            .await
            .unwrap();
        assert_eq!(callback.access_token.expose(), "T");

        let credential = waiter.await.unwrap().unwrap();
        assert_eq!(credential.access_token.expose(), "T");
        assert!(dir.path().join("token.json").exists());
        assert_eq!(c.state_label().await, "completed");
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_during_failed_exchange_reports_exchange_error() {
        let dir = tempfile::tempdir().unwrap();
        let c = slow_coordinator(
            dir.path(),
            StubExchanger::slow("T", Duration::from_secs(2)),
        );
        arm(&c, "st1").await;

        let waiter = tokio::spawn({
            let c = c.clone();
            async move { c.wait_for_completion().await }
        });
        tokio::task::yield_now().await;

        let err = c
            .handle_callback("st1".into(), Some("bad".into()), None)
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::Exchange(_)));

        let err = waiter.await.unwrap().unwrap_err();
        assert!(matches!(err, FlowError::Exchange(ref msg) if msg.contains("invalid_grant")));
        assert_eq!(c.state_label().await, "idle");
    }

    #[tokio::test(start_paused = true)]
    async fn superseded_exchange_does_not_complete_newer_flow() {
        let dir = tempfile::tempdir().unwrap();
        let c = slow_coordinator(
            dir.path(),
            StubExchanger::slow("T", Duration::from_secs(2)),
        );
        arm(&c, "st1").await;

        let callback = tokio::spawn({
            let c = c.clone();
            async move { c.handle_callback("st1".into(), Some("xyz".into()), None).await }
        });
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(c.state_label().await, "exchanging");

        // A new start lands while the first code is being exchanged
        arm(&c, "st2").await;
        assert!(callback.await.unwrap().is_ok());

        assert!(matches!(*c.progress.borrow(), Progress::Waiting));
        assert_eq!(c.state_label().await, "awaiting_callback");
        assert_eq!(c.pending_state().await.as_deref(), Some("st2"));
    }
}
