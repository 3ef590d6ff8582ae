//! Serializable action settings for badge display and polling.
//!
//! These types mirror the JSON the host delivers with its settings events.
//! Concrete actions embed them in their own settings structs (typically via
//! `#[serde(flatten)]`) and hand the icon portion back to the badge pipeline
//! through [`ActionHandler::icon_settings`](crate::ActionHandler::icon_settings).
//!
//! # Example
//!
//! ```
//! use deckwatch::{BadgePosition, BadgeType, IconSettings};
//!
//! let json = r#"{ "badgeType": "indicator", "badgePosition": "bottomleft" }"#;
//! let settings = IconSettings::from_json(json).unwrap();
//! assert_eq!(settings.badge.badge_type, BadgeType::Indicator);
//! assert_eq!(settings.badge.badge_position, BadgePosition::BottomLeft);
//! ```

use serde::{Deserialize, Serialize};

use crate::icon::BadgePosition;

// ============================================================================
// BadgeType
// ============================================================================

/// Policy selecting whether and how a count is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BadgeType {
    /// Draws a corner badge containing the count.
    #[default]
    Number,
    /// Draws the corner badge with no text, signaling "nonzero".
    Indicator,
    /// Surfaces the count as the action title instead of drawing a badge.
    #[serde(rename = "title")]
    UseTitle,
    /// No badge and no title.
    Hidden,
}

// ============================================================================
// ImageEffect
// ============================================================================

/// A whole-image filter applied to the base icon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ImageEffect {
    /// No filter.
    #[default]
    None,
    /// Converts the icon to grayscale.
    Desaturate,
}

// ============================================================================
// Settings
// ============================================================================

/// Settings for actions that show a badge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct BadgeSettings {
    /// The type of badge to show on the icon.
    #[serde(default)]
    pub badge_type: BadgeType,

    /// The corner of the icon where the badge is drawn.
    #[serde(default)]
    pub badge_position: BadgePosition,

    /// The badge fill color (CSS color string, default red).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub badge_color: Option<String>,
}

/// Settings controlling how the action icon is displayed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct IconSettings {
    /// Badge appearance settings.
    #[serde(flatten)]
    pub badge: BadgeSettings,

    /// A custom base image: a `data:` URI (or raw path) replacing the
    /// action's default icon.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_image: Option<String>,

    /// An effect applied to the icon when there are no results.
    #[serde(default)]
    pub no_results_effect: ImageEffect,
}

/// Settings for actions that periodically poll for updated data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PollingSettings {
    /// Seconds to wait between polling events. `None` uses the action's
    /// default delay.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub polling_delay: Option<u64>,
}

impl IconSettings {
    /// Serializes the settings to a JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserializes settings from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

// ============================================================================
// Tests
// ============================================================================
