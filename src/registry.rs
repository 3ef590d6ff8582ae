//! Per-instance lifecycle management of polling clients.
//!
//! The host reports action instances appearing on and disappearing from its
//! surface. [`ActionRegistry`] guarantees exactly one [`PollingClient`] per
//! visible instance, keyed by device and instance identifiers: created and
//! started on appear, stopped and removed on disappear, re-dispatched when
//! settings change.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::badge::{self, Countable};
use crate::error::PollError;
use crate::host::HostNotifier;
use crate::polling::{PollTarget, PollingClient};
use crate::render::{BadgeRenderer, BadgeUpdater, IconBadgeRenderer};
use crate::settings::IconSettings;

/// Seconds between polls when the action does not override the delay.
pub const DEFAULT_POLLING_DELAY: Duration = Duration::from_secs(120);

// ============================================================================
// InstanceKey
// ============================================================================

/// Identifies one visible action instance: a device plus an instance id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstanceKey {
    /// The device the instance is shown on.
    pub device: String,
    /// The unique id of the action instance.
    pub instance: String,
}

impl InstanceKey {
    /// Creates a key from device and instance identifiers.
    pub fn new(device: impl Into<String>, instance: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            instance: instance.into(),
        }
    }
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.device, self.instance)
    }
}

// ============================================================================
// ActionContext
// ============================================================================

/// Context for an individual instance of an action.
///
/// Owned by the polling client that wraps it; replaced wholesale when
/// settings change.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionContext<S> {
    /// The action instance id.
    pub instance: String,
    /// The device id.
    pub device: String,
    /// The instance's current settings.
    pub settings: S,
}

impl<S> ActionContext<S> {
    /// Returns the registry key for this context.
    pub fn key(&self) -> InstanceKey {
        InstanceKey::new(self.device.clone(), self.instance.clone())
    }
}

// ============================================================================
// ActionHandler
// ============================================================================

/// What happens when the action's key is pressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPress {
    /// Trigger an immediate poll.
    Refresh,
    /// The handler dealt with the press itself (opened a URL, etc.).
    Ignore,
}

/// The per-action capability seam: response fetching plus action-specific
/// configuration.
///
/// Concrete actions implement this once; the registry composes it with a
/// polling client and the badge pipeline for every visible instance.
#[async_trait]
pub trait ActionHandler: Send + Sync + 'static {
    /// The action's settings type, as delivered by the host.
    type Settings: Clone + Send + Sync + 'static;
    /// The response produced by one poll.
    type Response: Countable + Clone + Send + Sync + 'static;

    /// Fetches an updated response for the given instance.
    ///
    /// Missing or incomplete settings should resolve to an empty response
    /// (count zero) rather than an error.
    async fn fetch(
        &self,
        context: &ActionContext<Self::Settings>,
    ) -> Result<Self::Response, PollError>;

    /// Projects the icon/badge display settings out of the action settings.
    fn icon_settings(&self, settings: &Self::Settings) -> IconSettings;

    /// The delay between polls for the given settings.
    fn polling_delay(&self, _settings: &Self::Settings) -> Duration {
        DEFAULT_POLLING_DELAY
    }

    /// Path or data URI of the action's bundled default image, used when the
    /// settings carry no custom image.
    fn default_image(&self) -> Option<String> {
        None
    }

    /// Invoked when the action's key is pressed. Defaults to an immediate
    /// refresh.
    async fn on_key_press(
        &self,
        _context: &ActionContext<Self::Settings>,
        _last_response: Option<&Self::Response>,
    ) -> KeyPress {
        KeyPress::Refresh
    }
}

/// Adapts an [`ActionHandler`] to the polling client's target seam.
struct HandlerTarget<A>(Arc<A>);

#[async_trait]
impl<A: ActionHandler> PollTarget<ActionContext<A::Settings>> for HandlerTarget<A> {
    type Response = A::Response;

    async fn fetch(
        &self,
        context: &ActionContext<A::Settings>,
    ) -> Result<Self::Response, PollError> {
        self.0.fetch(context).await
    }
}

// ============================================================================
// ActionRegistry
// ============================================================================

/// Client handle type managed by the registry for a given handler.
pub type HandlerClient<A> =
    PollingClient<ActionContext<<A as ActionHandler>::Settings>, <A as ActionHandler>::Response>;

/// Maps each visible action instance to exactly one active polling client.
pub struct ActionRegistry<A: ActionHandler> {
    handler: Arc<A>,
    host: Arc<dyn HostNotifier>,
    renderer: Arc<dyn BadgeRenderer>,
    clients: HashMap<InstanceKey, HandlerClient<A>>,
}

impl<A: ActionHandler> ActionRegistry<A> {
    /// Creates a registry that renders badges through the stock icon
    /// pipeline.
    pub fn new(handler: A, host: impl HostNotifier + 'static) -> Self {
        let handler = Arc::new(handler);
        let host: Arc<dyn HostNotifier> = Arc::new(host);
        let renderer = Arc::new(IconBadgeRenderer::new(
            host.clone(),
            handler.default_image(),
        ));
        Self {
            handler,
            host,
            renderer,
            clients: HashMap::new(),
        }
    }

    /// Creates a registry with a custom badge renderer.
    pub fn with_renderer(
        handler: A,
        host: impl HostNotifier + 'static,
        renderer: impl BadgeRenderer + 'static,
    ) -> Self {
        Self {
            handler: Arc::new(handler),
            host: Arc::new(host),
            renderer: Arc::new(renderer),
            clients: HashMap::new(),
        }
    }

    /// Handles an action instance becoming visible.
    ///
    /// Builds a context from the current settings, starts a polling client
    /// at the action's delay (which polls once immediately), and stores it
    /// under the instance key.
    ///
    /// # Panics
    ///
    /// Panics if a client already exists for the key. The host pairs appear
    /// and disappear events, so a duplicate is a protocol violation on the
    /// integration side, not a runtime condition to absorb.
    pub fn will_appear(
        &mut self,
        device: impl Into<String>,
        instance: impl Into<String>,
        settings: A::Settings,
    ) {
        let key = InstanceKey::new(device, instance);
        assert!(
            !self.clients.contains_key(&key),
            "polling client already active for {key}: appear without matching disappear"
        );

        let context = ActionContext {
            instance: key.instance.clone(),
            device: key.device.clone(),
            settings,
        };
        let delay = self.handler.polling_delay(&context.settings);
        let delegate = BadgeUpdater::new(
            self.handler.clone(),
            self.renderer.clone(),
            self.host.clone(),
        );
        let client =
            PollingClient::new(HandlerTarget(self.handler.clone()), context).with_delegate(delegate);
        client.start_polling(delay);

        debug!(key = %key, ?delay, "action appeared, polling started");
        self.clients.insert(key, client);
    }

    /// Handles an action instance leaving the surface: stops its timer and
    /// removes the entry. A missing key is a safe no-op.
    pub fn will_disappear(&mut self, key: &InstanceKey) {
        if let Some(client) = self.clients.remove(key) {
            client.stop_polling();
            debug!(key = %key, "action disappeared, polling stopped");
        }
    }

    /// Handles a settings update for an instance. A missing key is a safe
    /// no-op.
    ///
    /// Replaces the context's settings wholesale, re-renders the badge from
    /// the last known response so appearance changes apply without waiting
    /// for data, then triggers one immediate poll.
    pub async fn settings_changed(&self, key: &InstanceKey, settings: A::Settings) {
        let Some(client) = self.clients.get(key) else {
            return;
        };

        let mut context = client.context();
        context.settings = settings;
        client.set_context(context.clone());

        let count = client
            .last_response()
            .map(|response| response.count())
            .unwrap_or(0);
        let icon = self.handler.icon_settings(&context.settings);
        self.renderer
            .apply(key, badge::decide_refresh(count, &icon), &icon)
            .await;

        client.poll();
    }

    /// Handles the companion settings UI becoming visible: polls once so it
    /// can show current status immediately. A missing key is a safe no-op.
    pub fn property_inspector_appeared(&self, key: &InstanceKey) {
        if let Some(client) = self.clients.get(key) {
            client.poll();
        }
    }

    /// Handles a key press on the action. A missing key is a safe no-op.
    pub async fn key_pressed(&self, key: &InstanceKey) {
        let Some(client) = self.clients.get(key) else {
            return;
        };

        let context = client.context();
        let last_response = client.last_response();
        match self
            .handler
            .on_key_press(&context, last_response.as_ref())
            .await
        {
            KeyPress::Refresh => client.poll(),
            KeyPress::Ignore => {}
        }
    }

    /// Retrieves the polling client for an instance, if one is active.
    pub fn client(&self, key: &InstanceKey) -> Option<&HandlerClient<A>> {
        self.clients.get(key)
    }

    /// The number of currently active clients.
    pub fn active_count(&self) -> usize {
        self.clients.len()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::badge::Counted;
    use crate::host::PollStatus;
    use crate::settings::{BadgeSettings, BadgeType};
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::io::Cursor;
    use tokio::time::{self, Duration};

    #[derive(Clone, Default)]
    struct QuerySettings {
        domain: String,
        query: String,
        icon: IconSettings,
        polling_delay: Option<u64>,
    }

    /// Handler that replays scripted counts, resolving empty settings to a
    /// zero-count response.
    struct QueryHandler {
        script: Mutex<VecDeque<Result<u64, PollError>>>,
    }

    impl QueryHandler {
        fn scripted(script: Vec<Result<u64, PollError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
            }
        }
    }

    #[async_trait]
    impl ActionHandler for QueryHandler {
        type Settings = QuerySettings;
        type Response = Counted<Vec<String>>;

        async fn fetch(
            &self,
            context: &ActionContext<QuerySettings>,
        ) -> Result<Self::Response, PollError> {
            if context.settings.domain.is_empty() || context.settings.query.is_empty() {
                return Ok(Counted::new(0));
            }
            match self.script.lock().pop_front() {
                Some(Ok(count)) => Ok(Counted::new(count)),
                Some(Err(error)) => Err(error),
                None => Ok(Counted::new(0)),
            }
        }

        fn icon_settings(&self, settings: &QuerySettings) -> IconSettings {
            settings.icon.clone()
        }

        fn polling_delay(&self, settings: &QuerySettings) -> Duration {
            Duration::from_secs(settings.polling_delay.unwrap_or(120))
        }
    }

    #[derive(Default)]
    struct MockHost {
        images: Mutex<Vec<(InstanceKey, Option<String>)>>,
        titles: Mutex<Vec<(InstanceKey, String)>>,
        statuses: Mutex<Vec<(InstanceKey, PollStatus)>>,
    }

    impl HostNotifier for MockHost {
        fn set_image(&self, key: &InstanceKey, image: Option<String>) {
            self.images.lock().push((key.clone(), image));
        }

        fn set_title(&self, key: &InstanceKey, title: &str) {
            self.titles.lock().push((key.clone(), title.to_string()));
        }

        fn poll_status(&self, key: &InstanceKey, status: PollStatus) {
            self.statuses.lock().push((key.clone(), status));
        }
    }

    fn png_data_uri(color: [u8; 4]) -> String {
        let img = RgbaImage::from_pixel(8, 8, Rgba(color));
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img)
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();
        format!(
            "data:image/png;base64,{}",
            STANDARD.encode(buf.into_inner())
        )
    }

    fn decode_data_uri(uri: &str) -> RgbaImage {
        let payload = uri.strip_prefix("data:image/png;base64,").unwrap();
        let bytes = STANDARD.decode(payload).unwrap();
        image::load_from_memory(&bytes).unwrap().to_rgba8()
    }

    fn configured_settings() -> QuerySettings {
        QuerySettings {
            domain: "example.atlassian.net".into(),
            query: "assignee = currentUser()".into(),
            icon: IconSettings {
                custom_image: Some(png_data_uri([0, 0, 255, 255])),
                ..IconSettings::default()
            },
            polling_delay: Some(30),
        }
    }

    async fn settle() {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn will_appear_starts_polling_immediately() {
        let host = Arc::new(MockHost::default());
        let handler = QueryHandler::scripted(vec![Ok(3)]);
        let mut registry = ActionRegistry::new(handler, host.clone());

        registry.will_appear("device-1", "instance-1", configured_settings());
        settle().await;

        assert_eq!(registry.active_count(), 1);
        let images = host.images.lock();
        assert_eq!(images.len(), 1);
        assert!(images[0].1.as_deref().unwrap().starts_with("data:image/png"));
        assert_eq!(host.statuses.lock()[0].1, PollStatus::succeeded());
    }

    #[tokio::test(start_paused = true)]
    #[should_panic(expected = "already active")]
    async fn duplicate_will_appear_is_a_logic_error() {
        let host = Arc::new(MockHost::default());
        let handler = QueryHandler::scripted(vec![]);
        let mut registry = ActionRegistry::new(handler, host);

        registry.will_appear("device-1", "instance-1", QuerySettings::default());
        registry.will_appear("device-1", "instance-1", QuerySettings::default());
    }

    #[tokio::test(start_paused = true)]
    async fn will_disappear_stops_polling_and_removes_entry() {
        let host = Arc::new(MockHost::default());
        let handler = QueryHandler::scripted(vec![Ok(1), Ok(2), Ok(3)]);
        let mut registry = ActionRegistry::new(handler, host.clone());

        registry.will_appear("device-1", "instance-1", configured_settings());
        settle().await;

        let key = InstanceKey::new("device-1", "instance-1");
        registry.will_disappear(&key);
        assert_eq!(registry.active_count(), 0);
        assert!(registry.client(&key).is_none());

        let images_before = host.images.lock().len();
        time::sleep(Duration::from_secs(300)).await;
        settle().await;
        assert_eq!(host.images.lock().len(), images_before);

        // A second disappear for the same key is a safe no-op
        registry.will_disappear(&key);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_key_operations_are_noops() {
        let host = Arc::new(MockHost::default());
        let handler = QueryHandler::scripted(vec![]);
        let registry = ActionRegistry::new(handler, host.clone());

        let key = InstanceKey::new("device-1", "missing");
        registry
            .settings_changed(&key, QuerySettings::default())
            .await;
        registry.property_inspector_appeared(&key);
        registry.key_pressed(&key).await;

        assert!(host.images.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn empty_settings_resolve_to_bare_image() {
        let host = Arc::new(MockHost::default());
        let handler = QueryHandler::scripted(vec![]);
        let mut registry = ActionRegistry::new(handler, host.clone());

        // No domain configured: the target resolves to a zero count instead
        // of erroring
        registry.will_appear("device-1", "instance-1", QuerySettings::default());
        settle().await;

        let images = host.images.lock();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].1, None);
        assert_eq!(host.titles.lock()[0].1, "");
        assert!(host.statuses.lock()[0].1.success);
    }

    #[tokio::test(start_paused = true)]
    async fn unchanged_count_suppresses_redraw() {
        let host = Arc::new(MockHost::default());
        let handler = QueryHandler::scripted(vec![Ok(3), Ok(3), Ok(5)]);
        let mut registry = ActionRegistry::new(handler, host.clone());

        registry.will_appear("device-1", "instance-1", configured_settings());
        settle().await;
        assert_eq!(host.images.lock().len(), 1);

        let key = InstanceKey::new("device-1", "instance-1");
        let client = registry.client(&key).unwrap();

        // Same count again: no recomposition
        client.poll_once().await;
        assert_eq!(host.images.lock().len(), 1);

        // Count changed: redraw
        client.poll_once().await;
        assert_eq!(host.images.lock().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn error_shows_warning_badge_and_preserves_last_response() {
        let host = Arc::new(MockHost::default());
        let handler = QueryHandler::scripted(vec![
            Ok(3),
            Err(PollError::new("Unauthorized")),
        ]);
        let mut registry = ActionRegistry::new(handler, host.clone());

        registry.will_appear("device-1", "instance-1", configured_settings());
        settle().await;

        let key = InstanceKey::new("device-1", "instance-1");
        let client = registry.client(&key).unwrap();
        client.poll_once().await;

        // The error event reached the host status feed with its message
        let statuses = host.statuses.lock();
        let last_status = &statuses.last().unwrap().1;
        assert!(!last_status.success);
        assert_eq!(last_status.status_message, "Unauthorized");

        // The warning badge is drawn in warning colors; sample inside the
        // circle but left of center, clear of the glyph
        let images = host.images.lock();
        let rendered = decode_data_uri(images.last().unwrap().1.as_deref().unwrap());
        let pixel = rendered.get_pixel(89, 35);
        assert!(
            pixel[0] > 200 && pixel[1] > 200 && pixel[2] < 100,
            "expected yellow warning badge, got {:?}",
            pixel
        );

        // The last successful response is still retrievable
        assert_eq!(client.last_response().map(|r| r.count), Some(3));
        assert!(client.last_error().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn recovery_redraws_even_with_unchanged_count() {
        let host = Arc::new(MockHost::default());
        let handler = QueryHandler::scripted(vec![
            Ok(3),
            Err(PollError::new("boom")),
            Ok(3),
        ]);
        let mut registry = ActionRegistry::new(handler, host.clone());

        registry.will_appear("device-1", "instance-1", configured_settings());
        settle().await;

        let key = InstanceKey::new("device-1", "instance-1");
        let client = registry.client(&key).unwrap();
        client.poll_once().await; // error: warning badge
        let after_error = host.images.lock().len();
        client.poll_once().await; // recovery: count badge redrawn
        assert_eq!(host.images.lock().len(), after_error + 1);
        assert!(client.last_error().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn title_mode_uses_title_instead_of_badge() {
        let host = Arc::new(MockHost::default());
        let handler = QueryHandler::scripted(vec![Ok(4)]);
        let mut registry = ActionRegistry::new(handler, host.clone());

        let mut settings = configured_settings();
        settings.icon.badge.badge_type = BadgeType::UseTitle;
        registry.will_appear("device-1", "instance-1", settings);
        settle().await;

        // The custom image passes through unmodified and the count becomes
        // the title
        let images = host.images.lock();
        assert!(images[0].1.as_deref().unwrap().starts_with("data:image/png"));
        assert_eq!(host.titles.lock()[0].1, "4");
    }

    #[tokio::test(start_paused = true)]
    async fn settings_change_rerenders_and_polls_immediately() {
        let host = Arc::new(MockHost::default());
        let handler = QueryHandler::scripted(vec![Ok(3), Ok(3)]);
        let mut registry = ActionRegistry::new(handler, host.clone());

        registry.will_appear("device-1", "instance-1", configured_settings());
        settle().await;
        assert_eq!(host.images.lock().len(), 1);

        let key = InstanceKey::new("device-1", "instance-1");
        let mut updated = configured_settings();
        updated.icon.badge = BadgeSettings {
            badge_type: BadgeType::Number,
            badge_color: Some("#00aa00".into()),
            ..BadgeSettings::default()
        };
        registry.settings_changed(&key, updated.clone()).await;
        settle().await;

        // One forced re-render from the cached response, then the immediate
        // poll reported the same count and was suppressed
        assert_eq!(host.images.lock().len(), 2);
        let client = registry.client(&key).unwrap();
        assert_eq!(client.context().settings.icon.badge.badge_color, updated.icon.badge.badge_color);
    }

    #[tokio::test(start_paused = true)]
    async fn inspector_appearance_triggers_immediate_poll() {
        let host = Arc::new(MockHost::default());
        let handler = QueryHandler::scripted(vec![Ok(1), Ok(2)]);
        let mut registry = ActionRegistry::new(handler, host.clone());

        registry.will_appear("device-1", "instance-1", configured_settings());
        settle().await;
        let statuses_before = host.statuses.lock().len();

        let key = InstanceKey::new("device-1", "instance-1");
        registry.property_inspector_appeared(&key);
        settle().await;

        assert_eq!(host.statuses.lock().len(), statuses_before + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn key_press_defaults_to_refresh() {
        let host = Arc::new(MockHost::default());
        let handler = QueryHandler::scripted(vec![Ok(1), Ok(2)]);
        let mut registry = ActionRegistry::new(handler, host.clone());

        registry.will_appear("device-1", "instance-1", configured_settings());
        settle().await;
        let statuses_before = host.statuses.lock().len();

        let key = InstanceKey::new("device-1", "instance-1");
        registry.key_pressed(&key).await;
        settle().await;

        assert_eq!(host.statuses.lock().len(), statuses_before + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_keeps_polling_at_configured_delay() {
        let host = Arc::new(MockHost::default());
        let handler = QueryHandler::scripted(vec![Ok(1), Ok(2), Ok(3)]);
        let mut registry = ActionRegistry::new(handler, host.clone());

        registry.will_appear("device-1", "instance-1", configured_settings());
        settle().await;
        assert_eq!(host.statuses.lock().len(), 1);

        // configured_settings polls every 30 seconds
        time::sleep(Duration::from_secs(31)).await;
        settle().await;
        assert_eq!(host.statuses.lock().len(), 2);

        time::sleep(Duration::from_secs(30)).await;
        settle().await;
        assert_eq!(host.statuses.lock().len(), 3);
    }

    #[test]
    fn instance_key_display_joins_device_and_instance() {
        let key = InstanceKey::new("dev", "ctx");
        assert_eq!(key.to_string(), "dev_ctx");
    }
}
