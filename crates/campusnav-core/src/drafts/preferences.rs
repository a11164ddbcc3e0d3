use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{LocalStore, StorageError};

const ACCESSIBILITY_KEY: &str = "accessibility";
const THEME_KEY: &str = "theme";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AccessibilitySettings {
    pub high_contrast: bool,
    pub large_text: bool,
    pub reduce_motion: bool,
    pub dyslexia_font: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    #[default]
    System,
}

/// Style classes for the given preferences. `System` follows
/// `system_prefers_dark`.
pub fn style_classes(
    settings: &AccessibilitySettings,
    theme: Theme,
    system_prefers_dark: bool,
) -> Vec<&'static str> {
    let dark = match theme {
        Theme::Light => false,
        Theme::Dark => true,
        Theme::System => system_prefers_dark,
    };

    let mut classes = vec![if dark { "theme-dark" } else { "theme-light" }];
    if settings.high_contrast {
        classes.push("high-contrast");
    }
    if settings.large_text {
        classes.push("large-text");
    }
    if settings.reduce_motion {
        classes.push("reduce-motion");
    }
    if settings.dyslexia_font {
        classes.push("dyslexia-font");
    }
    classes
}

pub struct Preferences {
    local: Arc<LocalStore>,
}

impl Preferences {
    pub fn new(local: Arc<LocalStore>) -> Self {
        Self { local }
    }

    pub fn accessibility(&self) -> Result<AccessibilitySettings, StorageError> {
        Ok(self.local.get(ACCESSIBILITY_KEY)?.unwrap_or_default())
    }

    pub fn set_accessibility(&self, settings: &AccessibilitySettings) -> Result<(), StorageError> {
        self.local.set(ACCESSIBILITY_KEY, settings)
    }

    pub fn theme(&self) -> Result<Theme, StorageError> {
        Ok(self.local.get(THEME_KEY)?.unwrap_or_default())
    }

    pub fn set_theme(&self, theme: Theme) -> Result<(), StorageError> {
        self.local.set(THEME_KEY, &theme)
    }
}
