//! Timer-driven polling of an asynchronous target.
//!
//! A [`PollingClient`] owns one [`PollTarget`] and a mutable context, invokes
//! the target on a fixed interval, and reports each outcome to an optional
//! [`PollDelegate`]. The client tracks the last successful response and the
//! last error, which lets it detect recovery transitions (the first success
//! after one or more failures) and lets consumers keep showing known-good
//! data across transient failures.
//!
//! Polls within one client never overlap: a single-flight guard is held for
//! the duration of each target invocation, and the timer task runs its poll
//! inline between ticks, delaying missed ticks rather than stacking them.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::PollError;

// ============================================================================
// PollTarget
// ============================================================================

/// An asynchronous task that can be periodically polled.
///
/// Targets signal failure by returning `Err`; a sentinel "empty" success
/// value is not treated as an error. Misconfiguration should resolve to an
/// empty response rather than erroring, so polling never fails just because
/// required settings are missing.
#[async_trait]
pub trait PollTarget<C>: Send + Sync {
    /// The response produced by a successful poll.
    type Response: Send;

    /// Performs one poll for the given context.
    async fn fetch(&self, context: &C) -> Result<Self::Response, PollError>;
}

// ============================================================================
// Events
// ============================================================================

/// Event containing details of an updated response from a polling client.
#[derive(Debug, Clone)]
pub struct PollingResponseEvent<C, R> {
    /// The context the target was polled with.
    pub context: C,
    /// The new response.
    pub response: R,
    /// The last successful response *before* this one was recorded.
    ///
    /// Consumers compare against this to suppress redundant updates when
    /// nothing changed between two polls.
    pub previous_response: Option<R>,
    /// True iff the immediately preceding attempt on this client failed.
    pub did_recover_from_error: bool,
}

/// Event containing details of an error encountered during polling.
#[derive(Debug, Clone)]
pub struct PollingErrorEvent<C, R> {
    /// The context the target was polled with.
    pub context: C,
    /// The error the target reported.
    pub error: PollError,
    /// The most recent successful response, preserved across failures.
    pub last_response: Option<R>,
}

// ============================================================================
// PollDelegate
// ============================================================================

/// Delegate to receive polling updates.
///
/// Both hooks default to no-ops. They are invoked inline within the tick
/// that produced the result; a delegate notification that lands after the
/// client has been unregistered is effectively orphaned, so delegates must
/// tolerate stale callbacks.
#[async_trait]
pub trait PollDelegate<C: Send + 'static, R: Send + 'static>: Send + Sync {
    /// Invoked when an updated response is available from the target.
    async fn on_response(&self, _event: PollingResponseEvent<C, R>) {}

    /// Invoked when an error was encountered while polling the target.
    async fn on_error(&self, _event: PollingErrorEvent<C, R>) {}
}

// ============================================================================
// PollingClient
// ============================================================================

struct ClientState<C, R> {
    context: C,
    last_response: Option<R>,
    last_error: Option<PollError>,
}

/// Periodically performs an asynchronous task and passes the response to a
/// delegate.
///
/// The client is a cheap handle over shared state; clones address the same
/// underlying client. All methods require a running tokio runtime.
pub struct PollingClient<C, R>
where
    C: Clone + Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
{
    target: Arc<dyn PollTarget<C, Response = R>>,
    delegate: Option<Arc<dyn PollDelegate<C, R>>>,
    state: Arc<Mutex<ClientState<C, R>>>,
    /// Held across each target invocation; serializes overlapping polls.
    flight: Arc<tokio::sync::Mutex<()>>,
    /// Present iff polling is active.
    timer: Arc<Mutex<Option<CancellationToken>>>,
}

impl<C, R> Clone for PollingClient<C, R>
where
    C: Clone + Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            target: self.target.clone(),
            delegate: self.delegate.clone(),
            state: self.state.clone(),
            flight: self.flight.clone(),
            timer: self.timer.clone(),
        }
    }
}

impl<C, R> PollingClient<C, R>
where
    C: Clone + Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
{
    /// Creates a client for the given target and initial context.
    pub fn new(target: impl PollTarget<C, Response = R> + 'static, context: C) -> Self {
        Self {
            target: Arc::new(target),
            delegate: None,
            state: Arc::new(Mutex::new(ClientState {
                context,
                last_response: None,
                last_error: None,
            })),
            flight: Arc::new(tokio::sync::Mutex::new(())),
            timer: Arc::new(Mutex::new(None)),
        }
    }

    /// Attaches a delegate to receive polling updates.
    pub fn with_delegate(mut self, delegate: impl PollDelegate<C, R> + 'static) -> Self {
        self.delegate = Some(Arc::new(delegate));
        self
    }

    /// Immediately polls the target, fire-and-forget.
    pub fn poll(&self) {
        let client = self.clone();
        tokio::spawn(async move {
            client.poll_once().await;
        });
    }

    /// Immediately polls the target and returns the response.
    ///
    /// On failure the error is recorded and routed to the delegate, and
    /// `None` is returned; it never propagates to the caller. Concurrent
    /// calls are serialized by the single-flight guard.
    pub async fn poll_once(&self) -> Option<R> {
        let _flight = self.flight.lock().await;

        let (context, had_error) = {
            let state = self.state.lock();
            (state.context.clone(), state.last_error.is_some())
        };

        match self.target.fetch(&context).await {
            Ok(response) => {
                let previous_response = {
                    let mut state = self.state.lock();
                    state.last_error = None;
                    state.last_response.clone()
                };
                debug!(recovered = had_error, "received updated response");

                if let Some(delegate) = &self.delegate {
                    delegate
                        .on_response(PollingResponseEvent {
                            context,
                            response: response.clone(),
                            previous_response,
                            did_recover_from_error: had_error,
                        })
                        .await;
                }

                self.state.lock().last_response = Some(response.clone());
                Some(response)
            }
            Err(error) => {
                let last_response = {
                    let mut state = self.state.lock();
                    state.last_error = Some(error.clone());
                    state.last_response.clone()
                };
                warn!(error = %error, "poll failed");

                if let Some(delegate) = &self.delegate {
                    delegate
                        .on_error(PollingErrorEvent {
                            context,
                            error,
                            last_response,
                        })
                        .await;
                }

                None
            }
        }
    }

    /// Starts a recurring task to poll the target.
    ///
    /// Performs one poll immediately, then polls every `delay`. Calling this
    /// while polling is already active is a no-op.
    ///
    /// # Panics
    ///
    /// Panics if `delay` is zero.
    pub fn start_polling(&self, delay: Duration) {
        let mut timer = self.timer.lock();
        if timer.is_some() {
            return;
        }

        let token = CancellationToken::new();
        let tick_token = token.clone();
        let client = self.clone();
        tokio::spawn(async move {
            let mut interval = time::interval(delay);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                // Cancellation is only observed between ticks, so an
                // in-flight poll always runs to completion.
                tokio::select! {
                    _ = tick_token.cancelled() => break,
                    _ = interval.tick() => {}
                }
                client.poll_once().await;
            }
        });

        *timer = Some(token);
    }

    /// Stops polling the target.
    ///
    /// Only future ticks are prevented; an in-flight poll still completes
    /// and its result still updates client state. Safe to call when not
    /// running.
    pub fn stop_polling(&self) {
        if let Some(token) = self.timer.lock().take() {
            token.cancel();
        }
    }

    /// Returns true if the polling timer is active.
    pub fn is_polling(&self) -> bool {
        self.timer.lock().is_some()
    }

    /// Retrieves the last successful response received from the target.
    pub fn last_response(&self) -> Option<R> {
        self.state.lock().last_response.clone()
    }

    /// Retrieves the currently recorded error, if the last attempt failed.
    pub fn last_error(&self) -> Option<PollError> {
        self.state.lock().last_error.clone()
    }

    /// Retrieves the current context used by polling events.
    pub fn context(&self) -> C {
        self.state.lock().context.clone()
    }

    /// Replaces the context used by future polling events.
    ///
    /// Does not itself trigger a poll.
    pub fn set_context(&self, context: C) {
        self.state.lock().context = context;
    }
}

// ============================================================================
// Tests
// ============================================================================
