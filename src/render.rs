//! Applying badge decisions: icon composition and host updates.
//!
//! [`BadgeRenderer`] is the seam between policy and pixels. The stock
//! implementation, [`IconBadgeRenderer`], composes the action icon and
//! pushes a PNG data URI through the host channel; actions with bespoke
//! display needs can substitute their own renderer. [`BadgeUpdater`] is the
//! polling delegate that ties the pieces together for count-style responses.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::badge::{self, BadgeDecision, Countable};
use crate::error::RenderError;
use crate::host::{HostNotifier, PollStatus};
use crate::icon::{BadgeOptions, ICON_SIZE, Icon};
use crate::polling::{PollDelegate, PollingErrorEvent, PollingResponseEvent};
use crate::registry::{ActionContext, ActionHandler, InstanceKey};
use crate::settings::{IconSettings, ImageEffect};

// ============================================================================
// BadgeRenderer
// ============================================================================

/// Applies a [`BadgeDecision`] to the display of one action instance.
#[async_trait]
pub trait BadgeRenderer: Send + Sync {
    /// Applies the decision for the given action instance.
    ///
    /// Must not fail: rendering problems degrade to clearing the displayed
    /// image, never to an error reaching the polling loop.
    async fn apply(&self, key: &InstanceKey, decision: BadgeDecision, icon: &IconSettings);
}

// ============================================================================
// IconBadgeRenderer
// ============================================================================

/// The stock renderer: composes the base image and badge into a bitmap and
/// sends it to the host as a PNG data URI.
pub struct IconBadgeRenderer<H: HostNotifier + ?Sized> {
    host: Arc<H>,
    /// Fallback base image used when the settings carry no custom image.
    default_image: Option<String>,
}

impl<H: HostNotifier + ?Sized> IconBadgeRenderer<H> {
    /// Creates a renderer that pushes updates through the given host.
    pub fn new(host: Arc<H>, default_image: Option<String>) -> Self {
        Self {
            host,
            default_image,
        }
    }

    /// Composes the base image with an optional badge and effect.
    async fn compose(
        &self,
        icon: &IconSettings,
        badge: Option<BadgeOptions>,
        effect: ImageEffect,
    ) -> Result<String, RenderError> {
        let source = icon
            .custom_image
            .as_deref()
            .or(self.default_image.as_deref())
            .ok_or(RenderError::NoBaseImage)?;

        let mut canvas = Icon::new();
        canvas
            .add_image(source, 0, 0, Some(ICON_SIZE), Some(ICON_SIZE), effect)
            .await?;
        if let Some(options) = badge {
            canvas.set_badge(options);
        }
        canvas.render_data_uri()
    }

    /// Composes and pushes an image, clearing the display if composition
    /// fails.
    async fn push_composed(
        &self,
        key: &InstanceKey,
        icon: &IconSettings,
        badge: Option<BadgeOptions>,
        effect: ImageEffect,
    ) {
        match self.compose(icon, badge, effect).await {
            Ok(image) => self.host.set_image(key, Some(image)),
            Err(RenderError::NoBaseImage) => self.host.set_image(key, None),
            Err(error) => {
                warn!(key = %key, error = %error, "failed to compose icon");
                self.host.set_image(key, None);
            }
        }
    }
}

#[async_trait]
impl<H: HostNotifier + ?Sized + 'static> BadgeRenderer for IconBadgeRenderer<H> {
    async fn apply(&self, key: &InstanceKey, decision: BadgeDecision, icon: &IconSettings) {
        match decision {
            BadgeDecision::Keep => {}
            BadgeDecision::Clear { effect } => {
                self.host.set_title(key, "");
                if effect == ImageEffect::None {
                    // No filter to apply, so the custom image passes through
                    // untouched (or the host default is restored).
                    self.host.set_image(key, icon.custom_image.clone());
                } else {
                    self.push_composed(key, icon, None, effect).await;
                }
            }
            BadgeDecision::Title { value } => {
                self.host.set_image(key, icon.custom_image.clone());
                self.host.set_title(key, &value);
            }
            BadgeDecision::Badge { options } => {
                self.host.set_title(key, "");
                self.push_composed(key, icon, Some(options), ImageEffect::None)
                    .await;
            }
        }
    }
}

// ============================================================================
// BadgeUpdater
// ============================================================================

/// Polling delegate that turns response/error events into badge updates.
///
/// On each event it reports poll status to the host, evaluates the badge
/// policy against the response count, and hands the decision to the
/// renderer.
pub struct BadgeUpdater<A: ActionHandler> {
    handler: Arc<A>,
    renderer: Arc<dyn BadgeRenderer>,
    host: Arc<dyn HostNotifier>,
}

impl<A: ActionHandler> BadgeUpdater<A> {
    /// Creates the delegate wiring for one action.
    pub fn new(
        handler: Arc<A>,
        renderer: Arc<dyn BadgeRenderer>,
        host: Arc<dyn HostNotifier>,
    ) -> Self {
        Self {
            handler,
            renderer,
            host,
        }
    }
}

#[async_trait]
impl<A: ActionHandler> PollDelegate<ActionContext<A::Settings>, A::Response> for BadgeUpdater<A> {
    async fn on_response(&self, event: PollingResponseEvent<ActionContext<A::Settings>, A::Response>) {
        let key = event.context.key();
        self.host.poll_status(&key, PollStatus::succeeded());

        let count = event.response.count();
        let icon = self.handler.icon_settings(&event.context.settings);
        let decision = badge::decide_response(
            count,
            event.previous_response.as_ref().map(Countable::count),
            event.did_recover_from_error,
            &icon,
        );
        debug!(key = %key, count, suppressed = decision == BadgeDecision::Keep, "updated response");
        self.renderer.apply(&key, decision, &icon).await;
    }

    async fn on_error(&self, event: PollingErrorEvent<ActionContext<A::Settings>, A::Response>) {
        let key = event.context.key();
        warn!(key = %key, error = %event.error, "received error while updating response");
        self.host
            .poll_status(&key, PollStatus::failed(event.error.message.clone()));

        let icon = self.handler.icon_settings(&event.context.settings);
        self.renderer.apply(&key, badge::decide_error(&icon), &icon).await;
    }
}

// ============================================================================
// Tests
// ============================================================================
