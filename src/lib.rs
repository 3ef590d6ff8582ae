//! deckwatch: polled status badges for key-deck style hosts
//!
//! This crate periodically queries a remote status source for each visible
//! action instance, reconciles the result against previously observed state,
//! and renders a badge icon for the host to display. Transient failures
//! never lose the last known-good state: the warning badge persists until a
//! poll succeeds again, and consumers are told when that recovery happens.
//!
//! The pipeline: a host lifecycle event makes the [`ActionRegistry`] create
//! a [`PollingClient`] bound to an [`ActionContext`]; the client invokes the
//! action's fetch on each tick; the outcome flows to the badge policy
//! ([`BadgeDecision`]); the [`Icon`] compositor renders a new bitmap; the
//! [`HostNotifier`] is told to display it.
//!
//! # Example
//!
//! ```no_run
//! use async_trait::async_trait;
//! use deckwatch::{
//!     ActionContext, ActionHandler, ActionRegistry, Counted, HostNotifier, IconSettings,
//!     InstanceKey, PollError,
//! };
//!
//! #[derive(Clone)]
//! struct IssueSettings {
//!     icon: IconSettings,
//!     query: String,
//! }
//!
//! struct IssueAction;
//!
//! #[async_trait]
//! impl ActionHandler for IssueAction {
//!     type Settings = IssueSettings;
//!     type Response = Counted<Vec<String>>;
//!
//!     async fn fetch(
//!         &self,
//!         context: &ActionContext<IssueSettings>,
//!     ) -> Result<Self::Response, PollError> {
//!         if context.settings.query.is_empty() {
//!             return Ok(Counted::new(0));
//!         }
//!         // ... call the remote service here ...
//!         Ok(Counted::new(3))
//!     }
//!
//!     fn icon_settings(&self, settings: &IssueSettings) -> IconSettings {
//!         settings.icon.clone()
//!     }
//! }
//!
//! struct Host;
//!
//! impl HostNotifier for Host {
//!     fn set_image(&self, _key: &InstanceKey, _image: Option<String>) {}
//!     fn set_title(&self, _key: &InstanceKey, _title: &str) {}
//! }
//!
//! # async fn run() {
//! let mut registry = ActionRegistry::new(IssueAction, Host);
//! registry.will_appear(
//!     "device-1",
//!     "instance-1",
//!     IssueSettings {
//!         icon: IconSettings::default(),
//!         query: "assignee = currentUser()".into(),
//!     },
//! );
//! # }
//! ```

mod badge;
mod error;
mod host;
mod icon;
mod polling;
mod registry;
mod render;
mod settings;

pub use badge::{
    BadgeDecision, Countable, Counted, INDICATOR_GLYPH, WARNING_COLOR, WARNING_GLYPH,
    WARNING_TEXT_COLOR, decide_error, decide_refresh, decide_response,
};
pub use error::{PollError, RenderError};
pub use host::{HostNotifier, PollStatus};
pub use icon::{
    BADGE_PADDING, BadgeOptions, BadgePosition, DEFAULT_BADGE_RADIUS, ICON_SIZE, Icon,
    badge_center,
};
pub use polling::{
    PollDelegate, PollTarget, PollingClient, PollingErrorEvent, PollingResponseEvent,
};
pub use registry::{
    ActionContext, ActionHandler, ActionRegistry, DEFAULT_POLLING_DELAY, HandlerClient,
    InstanceKey, KeyPress,
};
pub use render::{BadgeRenderer, BadgeUpdater, IconBadgeRenderer};
pub use settings::{BadgeSettings, BadgeType, IconSettings, ImageEffect, PollingSettings};
