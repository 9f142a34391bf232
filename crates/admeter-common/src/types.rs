//! Campaign metadata types

use serde::{Deserialize, Serialize};

/// Where an ad was shown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    /// Feed inline slot
    Feed,
    /// Sidebar slot
    Sidebar,
    /// Search results slot
    Search,
    /// Full-screen interstitial
    Interstitial,
    /// In-chat banner
    Banner,
}

/// Coarse device class reported with an impression
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Device {
    /// Desktop browser
    Desktop,
    /// Mobile browser or app
    Mobile,
    /// Tablet
    Tablet,
    /// Anything else
    Other,
}

/// Audience/region metadata attached to tracked events
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Region code, if known
    pub region: Option<String>,
    /// Device class, if known
    pub device: Option<Device>,
    /// Audience segment label, if known
    pub audience: Option<String>,
}
