//! Dev UI card linking to the running Microcks UI.

use serde::Serialize;

use crate::config::{LaunchMode, DEFAULT_SERVICE_NAME};
use crate::devservice::{url_key, ExposedConfig, RunningDevService};
use crate::microcks::Protocol;

pub const UI_TITLE: &str = "Microcks UI";
pub const UI_ICON: &str = "font-awesome-solid:plug-circle-bolt";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DevUiLink {
    pub title: String,
    pub url: String,
    pub icon: String,
    pub html_content: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DevUiCard {
    pub pages: Vec<DevUiLink>,
}

/// Link to the default service's UI, if its HTTP URL is exported.
pub fn link_for(config: &ExposedConfig) -> Option<DevUiLink> {
    config
        .get(&url_key(DEFAULT_SERVICE_NAME, Protocol::Http))
        .map(|url| DevUiLink {
            title: UI_TITLE.to_string(),
            url: url.clone(),
            icon: UI_ICON.to_string(),
            html_content: true,
        })
}

/// Card built from the first running service. Only development launches
/// get a card with pages.
pub fn card_page(services: &[RunningDevService], mode: LaunchMode) -> DevUiCard {
    if mode != LaunchMode::Development {
        return DevUiCard::default();
    }
    DevUiCard {
        pages: services
            .first()
            .and_then(|service| link_for(&service.config))
            .into_iter()
            .collect(),
    }
}
