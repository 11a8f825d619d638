//! Authorization flow state machine
//!
//! Pure state machine: receives events, returns (new_state, action).
//! The coordinator executes the I/O implied by each action (token exchange,
//! token store write, listener shutdown).
//!
//! ```text
//! Idle -> AwaitingUserAuthorization -> AwaitingCallback -> Exchanging -> Completed
//!                          \                  \                \
//!                           +------------------+----------------+--> Failed
//! ```
//! `Completed` and `Failed` settle back to `Idle` on `Reset`.

use common::Secret;
use uuid::Uuid;

/// The single in-flight authorization request.
///
/// Lives only inside the awaiting states; any callback takes it out of the
/// state, so a replayed callback finds an empty slot.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    /// Log correlation id for this flow
    pub flow_id: Uuid,
    /// One-time anti-forgery value echoed back by the provider
    pub state: String,
    /// PKCE verifier matching the challenge in `authorization_url`
    pub verifier: Secret<String>,
    pub client_id: String,
    pub scopes: Vec<String>,
    pub redirect_uri: String,
    pub authorization_url: String,
}

/// Why a flow ended in `Failed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// Callback state did not match the in-flight request, or no request was in flight
    StateMismatch,
    /// Callback carried no authorization code
    MissingCode,
    /// Provider reported an error instead of a code (e.g. `access_denied`)
    Denied(String),
    /// Token endpoint rejected the code or was unreachable
    Exchange(String),
    /// Token obtained but could not be persisted
    Write(String),
    /// No callback completed the flow in time
    Timeout,
}

/// Flow states.
#[derive(Debug)]
pub enum FlowState {
    /// No flow in progress
    Idle,
    /// Authorization URL built, user not yet sent to the provider
    AwaitingUserAuthorization { request: AuthorizationRequest },
    /// User redirected to the provider, waiting for the callback
    AwaitingCallback { request: AuthorizationRequest },
    /// Callback accepted, code exchange in progress
    Exchanging { flow_id: Uuid },
    /// Token obtained and stored
    Completed { flow_id: Uuid },
    /// Terminal failure of the last flow
    Failed { reason: FailureReason },
}

impl FlowState {
    /// State label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            FlowState::Idle => "idle",
            FlowState::AwaitingUserAuthorization { .. } => "awaiting_user_authorization",
            FlowState::AwaitingCallback { .. } => "awaiting_callback",
            FlowState::Exchanging { .. } => "exchanging",
            FlowState::Completed { .. } => "completed",
            FlowState::Failed { .. } => "failed",
        }
    }

    /// The in-flight request, if one is outstanding.
    pub fn pending_request(&self) -> Option<&AuthorizationRequest> {
        match self {
            FlowState::AwaitingUserAuthorization { request }
            | FlowState::AwaitingCallback { request } => Some(request),
            _ => None,
        }
    }
}

/// Events that drive state transitions.
#[derive(Debug)]
pub enum FlowEvent {
    /// A new flow began; replaces any outstanding request
    Started { request: AuthorizationRequest },
    /// The browser was sent to the provider
    Redirected,
    /// The provider redirected back to the callback route
    CallbackReceived {
        state: String,
        code: Option<String>,
        error: Option<String>,
    },
    /// Token exchanged and stored
    ExchangeSucceeded,
    /// Token exchange or token store write failed
    ExchangeFailed(FailureReason),
    /// The callback wait expired
    TimedOut,
    /// Settle a finished flow back to idle
    Reset,
}

/// Actions the caller should execute after a state transition
#[derive(Debug)]
pub enum FlowAction {
    /// Send the browser to the provider
    Redirect { url: String },
    /// Trade the code for a token, then report the outcome
    ExchangeCode {
        flow_id: Uuid,
        code: String,
        verifier: Secret<String>,
        redirect_uri: String,
    },
    /// Report the failure to the caller
    Reject { reason: FailureReason },
    /// Stop the listener after the grace period
    ScheduleShutdown,
    /// No-op
    None,
}

/// Handle a state transition. Pure function: no I/O.
pub fn handle_event(state: FlowState, event: FlowEvent) -> (FlowState, FlowAction) {
    match (state, event) {
        // --- Start: always (re)arms the slot ---
        (_, FlowEvent::Started { request }) => {
            let url = request.authorization_url.clone();
            (
                FlowState::AwaitingUserAuthorization { request },
                FlowAction::Redirect { url },
            )
        }

        (FlowState::AwaitingUserAuthorization { request }, FlowEvent::Redirected) => {
            (FlowState::AwaitingCallback { request }, FlowAction::None)
        }

        // --- Callback: consumes the slot whatever the outcome ---
        (
            FlowState::AwaitingUserAuthorization { request }
            | FlowState::AwaitingCallback { request },
            FlowEvent::CallbackReceived { state, code, error },
        ) => {
            if state != request.state {
                return fail(FailureReason::StateMismatch);
            }
            if let Some(error) = error {
                return fail(FailureReason::Denied(error));
            }
            match code.filter(|c| !c.is_empty()) {
                Some(code) => (
                    FlowState::Exchanging {
                        flow_id: request.flow_id,
                    },
                    FlowAction::ExchangeCode {
                        flow_id: request.flow_id,
                        code,
                        verifier: request.verifier,
                        redirect_uri: request.redirect_uri,
                    },
                ),
                None => fail(FailureReason::MissingCode),
            }
        }

        // Empty slot: reject without disturbing whatever else is going on
        (state, FlowEvent::CallbackReceived { .. }) => (
            state,
            FlowAction::Reject {
                reason: FailureReason::StateMismatch,
            },
        ),

        // --- Exchanging ---
        (FlowState::Exchanging { flow_id }, FlowEvent::ExchangeSucceeded) => {
            (FlowState::Completed { flow_id }, FlowAction::ScheduleShutdown)
        }

        (FlowState::Exchanging { .. }, FlowEvent::ExchangeFailed(reason)) => fail(reason),

        // --- Timeout: an exchange in flight is left to finish ---
        (
            state @ (FlowState::Exchanging { .. } | FlowState::Completed { .. }),
            FlowEvent::TimedOut,
        ) => (state, FlowAction::None),

        (_, FlowEvent::TimedOut) => fail(FailureReason::Timeout),

        // --- Cleanup ---
        (FlowState::Completed { .. } | FlowState::Failed { .. }, FlowEvent::Reset) => {
            (FlowState::Idle, FlowAction::None)
        }

        // --- Invalid/unhandled transition: stay in current state ---
        (state, _event) => (state, FlowAction::None),
    }
}

fn fail(reason: FailureReason) -> (FlowState, FlowAction) {
    (
        FlowState::Failed {
            reason: reason.clone(),
        },
        FlowAction::Reject { reason },
    )
}
