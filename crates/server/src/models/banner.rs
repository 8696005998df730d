//! Promotional banners shown on the storefront.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sagebrush_core::BannerId;
use sagebrush_core::schedule;

use super::{ValidationError, http_url, optional_text, required_text};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Banner {
    pub id: BannerId,
    pub title: String,
    pub subtitle: Option<String>,
    pub image_url: String,
    pub link_url: Option<String>,
    pub sort_order: i32,
    pub is_active: bool,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Banner {
    /// Whether the banner should be shown at `now`.
    #[must_use]
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        schedule::is_live(self.is_active, self.starts_at, self.ends_at, now)
    }
}

/// Body for creating or replacing a banner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BannerInput {
    pub title: String,
    pub subtitle: Option<String>,
    pub image_url: String,
    pub link_url: Option<String>,
    #[serde(default)]
    pub sort_order: i32,
    #[serde(default = "default_active")]
    pub is_active: bool,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
}

const fn default_active() -> bool {
    true
}

impl BannerInput {
    /// # Errors
    ///
    /// Returns `ValidationError` for a blank title, non-http URLs, or a
    /// schedule whose start is not before its end.
    pub fn validate(self) -> Result<Self, ValidationError> {
        if !schedule::is_valid_range(self.starts_at, self.ends_at) {
            return Err(ValidationError::new("starts_at must be before ends_at"));
        }
        let link_url = match optional_text("link_url", self.link_url.as_deref(), 2048)? {
            Some(url) => Some(http_url("link_url", &url)?),
            None => None,
        };
        Ok(Self {
            title: required_text("title", &self.title, 200)?,
            subtitle: optional_text("subtitle", self.subtitle.as_deref(), 500)?,
            image_url: http_url("image_url", &self.image_url)?,
            link_url,
            ..self
        })
    }
}
