//! Badge display policy.
//!
//! Given a newly observed count (or an error) and the action's display
//! settings, the functions here decide what should happen to the badge:
//! keep the current rendering, clear it, surface the value as a title, or
//! draw a badge. Decisions are pure data; applying them is the renderer's
//! job.
//!
//! The priority order is deliberate: an error always produces a redraw
//! decision, while suppression only applies to an unchanged count with no
//! recovery in progress. Display-mode branches outrank both, so `Hidden`
//! shows nothing even for errors.

use crate::icon::BadgeOptions;
use crate::settings::{BadgeType, IconSettings, ImageEffect};

/// Badge value shown when the last poll failed.
pub const WARNING_GLYPH: &str = "!";
/// Badge fill color for the warning badge.
pub const WARNING_COLOR: &str = "yellow";
/// Text color for the warning badge.
pub const WARNING_TEXT_COLOR: &str = "black";
/// Badge value drawn in indicator mode: the circle signals "nonzero"
/// without showing the exact count.
pub const INDICATOR_GLYPH: &str = " ";

// ============================================================================
// Countable
// ============================================================================

/// A response with a countable number of results.
///
/// The badge pipeline only ever needs a numeric count derived from the
/// response (the number of matching issues, alerts, tasks, and so on).
pub trait Countable {
    /// The count used to populate the badge.
    fn count(&self) -> u64;
}

impl Countable for u64 {
    fn count(&self) -> u64 {
        *self
    }
}

/// A generic response wrapper pairing a count with the original payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Counted<T> {
    /// The original response, when a consumer wants more than the count.
    pub data: Option<T>,
    /// The count resolved from the response.
    pub count: u64,
}

impl<T> Counted<T> {
    /// Creates a countable response with no payload.
    pub fn new(count: u64) -> Self {
        Self { data: None, count }
    }

    /// Creates a countable response carrying the original payload.
    pub fn with_data(data: T, count: u64) -> Self {
        Self {
            data: Some(data),
            count,
        }
    }
}

impl<T> Countable for Counted<T> {
    fn count(&self) -> u64 {
        self.count
    }
}

// ============================================================================
// BadgeDecision
// ============================================================================

/// The outcome of evaluating the badge policy for one observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BadgeDecision {
    /// Nothing changed; leave the current rendering alone.
    Keep,
    /// Show the base image with no badge and an empty title. Carries the
    /// no-results effect when the displayed count is zero.
    Clear { effect: ImageEffect },
    /// Surface the value as a textual title next to the unmodified base
    /// image instead of drawing a badge.
    Title { value: String },
    /// Draw a badge with the given options.
    Badge { options: BadgeOptions },
}

// ============================================================================
// Policy
// ============================================================================

/// Decides the badge for a successful poll.
///
/// An unchanged count with no recovery in progress suppresses the redraw
/// entirely; everything else falls through to [`decide_refresh`].
pub fn decide_response(
    count: u64,
    previous_count: Option<u64>,
    did_recover_from_error: bool,
    icon: &IconSettings,
) -> BadgeDecision {
    if !did_recover_from_error && previous_count == Some(count) {
        return BadgeDecision::Keep;
    }
    decide_refresh(count, icon)
}

/// Decides the badge for a count, never suppressing.
///
/// Used when the display must be refreshed regardless of change, such as
/// right after a settings update.
pub fn decide_refresh(count: u64, icon: &IconSettings) -> BadgeDecision {
    decide(BadgeOptions::new(count.to_string()), icon)
}

/// Decides the badge for a failed poll: the warning glyph in warning
/// colors, forced through the display-mode branches.
pub fn decide_error(icon: &IconSettings) -> BadgeDecision {
    decide(
        BadgeOptions {
            value: WARNING_GLYPH.into(),
            color: Some(WARNING_COLOR.into()),
            text_color: Some(WARNING_TEXT_COLOR.into()),
            ..BadgeOptions::default()
        },
        icon,
    )
}

fn decide(mut options: BadgeOptions, icon: &IconSettings) -> BadgeDecision {
    let zero = options.value == "0";
    if zero || options.value.is_empty() || icon.badge.badge_type == BadgeType::Hidden {
        let effect = if zero {
            icon.no_results_effect
        } else {
            ImageEffect::None
        };
        return BadgeDecision::Clear { effect };
    }

    if icon.badge.badge_type == BadgeType::UseTitle {
        return BadgeDecision::Title {
            value: options.value,
        };
    }

    if icon.badge.badge_type == BadgeType::Indicator {
        options.value = INDICATOR_GLYPH.into();
    }

    if options.color.is_none() {
        options.color = icon.badge.badge_color.clone();
    }
    if options.position.is_none() {
        options.position = Some(icon.badge.badge_position);
    }

    BadgeDecision::Badge { options }
}

// ============================================================================
// Tests
// ============================================================================
