//! Locally persisted notification preferences.
//!
//! Preferences are stored as one typed, versioned record. Devices that still
//! carry the older loose keys (`chatNotificationEnabled` as a `"true"`/`"false"`
//! string and `notification_sound` as a JSON blob) are migrated on first load.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ChatError, Result};

/// Version of the typed preferences record
pub const CURRENT_SCHEMA_VERSION: u32 = 2;

const PREFERENCES_KEY: &str = "preferences";
/// Legacy key holding `"true"` or `"false"`
pub const LEGACY_ENABLED_KEY: &str = "chatNotificationEnabled";
/// Legacy key holding `{"id": .., "file": .., "channel": ..}`
pub const LEGACY_SOUND_KEY: &str = "notification_sound";

/// One of the fixed notification sound presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SoundPreset {
    #[default]
    Default,
    Chime,
    Bell,
}

impl SoundPreset {
    pub const ALL: [Self; 3] = [Self::Default, Self::Chime, Self::Bell];

    #[must_use]
    pub const fn id(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Chime => "chime",
            Self::Bell => "bell",
        }
    }

    /// Sound file passed to the notification scheduler
    #[must_use]
    pub const fn file(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Chime => "chime.wav",
            Self::Bell => "bell.wav",
        }
    }

    /// Android notification channel bound to this preset
    #[must_use]
    pub const fn channel(self) -> &'static str {
        match self {
            Self::Default => "chat-default",
            Self::Chime => "chat-chime",
            Self::Bell => "chat-bell",
        }
    }
}

impl fmt::Display for SoundPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for SoundPreset {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|preset| preset.id() == s)
            .ok_or_else(|| ChatError::InvalidInput(format!("Unknown sound preset: {s}")))
    }
}

/// Typed notification preferences with explicit defaults
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPreferences {
    pub enabled: bool,
    pub sound: SoundPreset,
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        Self {
            enabled: true,
            sound: SoundPreset::Default,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct StoredPreferences {
    schema_version: u32,
    preferences: NotificationPreferences,
}

/// Shape of the legacy `notification_sound` blob; file and channel are
/// derived from the id
#[derive(Deserialize)]
struct LegacySound {
    id: String,
}

/// Local key-value settings store
pub struct LocalSettings {
    db: sled::Db,
}

impl LocalSettings {
    /// Open (or create) the settings store in `path`
    pub fn open(path: &Path) -> Result<Self> {
        std::fs::create_dir_all(path)?;
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    /// Throwaway store removed when dropped
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    /// Read the preferences, migrating legacy keys when no typed record exists
    pub fn load(&self) -> Result<NotificationPreferences> {
        if let Some(bytes) = self.db.get(PREFERENCES_KEY)? {
            match bincode::deserialize::<StoredPreferences>(&bytes) {
                Ok(stored) if stored.schema_version == CURRENT_SCHEMA_VERSION => {
                    return Ok(stored.preferences);
                },
                Ok(stored) => {
                    warn!(
                        version = stored.schema_version,
                        "Unsupported preferences schema version, using defaults"
                    );
                    return Ok(NotificationPreferences::default());
                },
                Err(e) => {
                    warn!(error = %e, "Corrupt preferences record, using defaults");
                    return Ok(NotificationPreferences::default());
                },
            }
        }

        self.migrate_legacy()
    }

    /// Like [`Self::load`], but any failure falls back to the defaults
    pub fn load_or_default(&self) -> NotificationPreferences {
        self.load().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to read notification preferences, using defaults");
            NotificationPreferences::default()
        })
    }

    pub fn save(&self, preferences: NotificationPreferences) -> Result<()> {
        let stored = StoredPreferences {
            schema_version: CURRENT_SCHEMA_VERSION,
            preferences,
        };
        self.db.insert(PREFERENCES_KEY, bincode::serialize(&stored)?)?;
        self.db.flush()?;
        Ok(())
    }

    pub fn set_enabled(&self, enabled: bool) -> Result<NotificationPreferences> {
        let mut preferences = self.load()?;
        preferences.enabled = enabled;
        self.save(preferences)?;
        Ok(preferences)
    }

    pub fn set_sound(&self, sound: SoundPreset) -> Result<NotificationPreferences> {
        let mut preferences = self.load()?;
        preferences.sound = sound;
        self.save(preferences)?;
        Ok(preferences)
    }

    /// Write raw legacy entries, as an older client would have left them
    pub fn write_legacy(&self, enabled: Option<&str>, sound_json: Option<&str>) -> Result<()> {
        if let Some(enabled) = enabled {
            self.db.insert(LEGACY_ENABLED_KEY, enabled.as_bytes())?;
        }
        if let Some(sound_json) = sound_json {
            self.db.insert(LEGACY_SOUND_KEY, sound_json.as_bytes())?;
        }
        self.db.flush()?;
        Ok(())
    }

    /// True if any legacy key is still present
    pub fn has_legacy_entries(&self) -> Result<bool> {
        Ok(self.db.contains_key(LEGACY_ENABLED_KEY)? || self.db.contains_key(LEGACY_SOUND_KEY)?)
    }

    fn migrate_legacy(&self) -> Result<NotificationPreferences> {
        let enabled_raw = self.db.get(LEGACY_ENABLED_KEY)?;
        let sound_raw = self.db.get(LEGACY_SOUND_KEY)?;

        if enabled_raw.is_none() && sound_raw.is_none() {
            return Ok(NotificationPreferences::default());
        }

        let mut preferences = NotificationPreferences::default();

        if let Some(raw) = enabled_raw {
            match raw.as_ref() {
                b"true" => preferences.enabled = true,
                b"false" => preferences.enabled = false,
                other => warn!(
                    value = %String::from_utf8_lossy(other),
                    "Unrecognised legacy notification flag, keeping notifications enabled"
                ),
            }
        }

        if let Some(raw) = sound_raw {
            match serde_json::from_slice::<LegacySound>(&raw) {
                Ok(legacy) => match legacy.id.parse::<SoundPreset>() {
                    Ok(sound) => preferences.sound = sound,
                    Err(e) => warn!(error = %e, "Unknown legacy sound preset, using default"),
                },
                Err(e) => warn!(error = %e, "Malformed legacy sound preference, using default"),
            }
        }

        self.save(preferences)?;
        self.db.remove(LEGACY_ENABLED_KEY)?;
        self.db.remove(LEGACY_SOUND_KEY)?;
        self.db.flush()?;
        info!(
            enabled = preferences.enabled,
            sound = %preferences.sound,
            "Migrated legacy notification settings"
        );

        Ok(preferences)
    }
}
