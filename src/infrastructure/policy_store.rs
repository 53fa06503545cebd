// Per-user settings persisted as TOML files
use crate::application::ports::PolicyStore;
use crate::domain::policy::UserSettings;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// One `<url-encoded user>.toml` file per user inside `dir`
pub struct TomlPolicyStore {
    dir: PathBuf,
    // serializes read-modify-write updates
    write_lock: Mutex<()>,
}

impl TomlPolicyStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn path_for(&self, user: &str) -> PathBuf {
        self.dir.join(format!("{}.toml", urlencoding::encode(user)))
    }

    async fn read(&self, path: &Path) -> Result<Option<UserSettings>> {
        if !tokio::fs::try_exists(path).await? {
            return Ok(None);
        }
        let contents = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        let settings = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse settings from {}", path.display()))?;
        Ok(Some(settings))
    }

    async fn write(&self, path: &Path, settings: &UserSettings) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;
        let contents = toml::to_string_pretty(settings).context("Failed to serialize settings")?;

        let tmp = path.with_extension("toml.tmp");
        tokio::fs::write(&tmp, contents)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, path)
            .await
            .with_context(|| format!("Failed to replace {}", path.display()))?;
        Ok(())
    }

    async fn update<F>(&self, user: &str, change: F) -> Result<()>
    where
        F: FnOnce(&mut UserSettings) + Send,
    {
        let _guard = self.write_lock.lock().await;
        let path = self.path_for(user);
        let mut settings = self
            .read(&path)
            .await?
            .with_context(|| format!("No settings stored for user {user}"))?;
        change(&mut settings);
        self.write(&path, &settings).await
    }
}

#[async_trait]
impl PolicyStore for TomlPolicyStore {
    async fn load(&self, user: &str) -> Result<Option<UserSettings>> {
        self.read(&self.path_for(user)).await
    }

    /// Replaces the user-editable settings. The pause flag and the reset
    /// stamp are owned by the store and survive a save.
    async fn save(&self, user: &str, settings: &UserSettings) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let path = self.path_for(user);
        let mut updated = settings.clone();
        if let Some(stored) = self.read(&path).await? {
            updated.pause_charging = stored.pause_charging;
            updated.last_force_charge_reset = stored.last_force_charge_reset;
        }
        self.write(&path, &updated).await
    }

    async fn record_force_charge_reset(&self, user: &str, at: DateTime<FixedOffset>) -> Result<()> {
        self.update(user, |settings| {
            settings.force_charge_is_on = false;
            settings.last_force_charge_reset = Some(at);
        })
        .await
    }

    async fn set_pause_charging(&self, user: &str, paused: bool) -> Result<()> {
        self.update(user, |settings| settings.pause_charging = paused)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::policy::{CarBattery, InverterKind, WallboxKind};
    use chrono::TimeZone;
    use tempfile::tempdir;

    const USER: &str = "driver@example.com";

    fn settings() -> UserSettings {
        UserSettings {
            inverter_kind: InverterKind::SolarEdge,
            wallbox_kind: WallboxKind::GoE,
            use_awattar: true,
            force_charge_is_on: true,
            auto_turn_off_force_charging: true,
            force_charge_kw: Some(7.5),
            car: CarBattery {
                capacity_kwh: 58.0,
                current_pct: 35.0,
                target_pct: 80.0,
                target_hour: 7,
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_unknown_user_loads_none() {
        let dir = tempdir().unwrap();
        let store = TomlPolicyStore::new(dir.path());
        assert_eq!(store.load(USER).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let store = TomlPolicyStore::new(dir.path().join("users"));

        store.save(USER, &settings()).await.unwrap();

        assert_eq!(store.load(USER).await.unwrap(), Some(settings()));
        assert!(dir.path().join("users/driver%40example.com.toml").exists());
    }

    #[tokio::test]
    async fn test_user_names_cannot_escape_the_directory() {
        let dir = tempdir().unwrap();
        let store = TomlPolicyStore::new(dir.path());

        store.save("../evil", &settings()).await.unwrap();

        assert!(dir.path().join("..%2Fevil.toml").exists());
        assert_eq!(store.load("../evil").await.unwrap(), Some(settings()));
    }

    #[tokio::test]
    async fn test_reset_stamp_round_trip() {
        let dir = tempdir().unwrap();
        let store = TomlPolicyStore::new(dir.path());
        store.save(USER, &settings()).await.unwrap();
        let at = FixedOffset::east_opt(3600)
            .unwrap()
            .with_ymd_and_hms(2024, 11, 5, 6, 10, 0)
            .unwrap();

        store.record_force_charge_reset(USER, at).await.unwrap();

        let loaded = store.load(USER).await.unwrap().unwrap();
        assert!(!loaded.force_charge_is_on);
        assert_eq!(loaded.last_force_charge_reset, Some(at));
        assert_eq!(loaded.force_charge_kw, Some(7.5));
    }

    #[tokio::test]
    async fn test_pause_flag_update() {
        let dir = tempdir().unwrap();
        let store = TomlPolicyStore::new(dir.path());
        store.save(USER, &settings()).await.unwrap();

        store.set_pause_charging(USER, true).await.unwrap();
        assert!(store.load(USER).await.unwrap().unwrap().pause_charging);

        assert!(store.set_pause_charging("someone-else", true).await.is_err());
    }

    #[tokio::test]
    async fn test_save_keeps_pause_flag_and_reset_stamp() {
        let dir = tempdir().unwrap();
        let store = TomlPolicyStore::new(dir.path());
        store.save(USER, &settings()).await.unwrap();
        let at = FixedOffset::east_opt(3600)
            .unwrap()
            .with_ymd_and_hms(2024, 11, 5, 6, 10, 0)
            .unwrap();
        store.record_force_charge_reset(USER, at).await.unwrap();
        store.set_pause_charging(USER, true).await.unwrap();

        // force charging switched back on from the settings page
        let edited: UserSettings = serde_json::from_value(serde_json::json!({
            "forceChargeIsOn": true,
            "autoTurnOffForceCharging": true,
            "useAwattar": true,
            "forceChargeKw": 11.0
        }))
        .unwrap();
        store.save(USER, &edited).await.unwrap();

        let loaded = store.load(USER).await.unwrap().unwrap();
        assert!(loaded.force_charge_is_on);
        assert_eq!(loaded.force_charge_kw, Some(11.0));
        assert!(loaded.pause_charging);
        assert_eq!(loaded.last_force_charge_reset, Some(at));
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("broken.toml"), "useAwattar = [").unwrap();
        let store = TomlPolicyStore::new(dir.path());

        assert!(store.load("broken").await.is_err());
    }
}
