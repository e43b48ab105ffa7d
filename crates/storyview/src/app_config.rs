//! 🔧 App Configuration -- the sacred TOML-to-struct pipeline.
//!
//! 📡 "Config not found: We looked everywhere. Under the couch. Behind the fridge.
//! In the junk drawer. Nothing." -- every developer at 3am 🦆
//!
//! 🏗️ Powered by Figment, because manually parsing env vars is a form of
//! self-harm that even the borrow checker wouldn't approve of.
//!
//! 🔒 Credentials do NOT live here. The config only names the environment
//! variables that hold them. Passwords in TOML files get screenshotted.

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

use crate::logging::LoggingConfig;
use crate::notify::{NotifierConfig, Recipients};
use crate::portal::PortalConfig;

/// 📦 The AppConfig: one struct to rule them all, one struct to find them,
/// one struct to bring them all, and in the Figment bind them.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// 📡 Where the story maps live and how hard to poke the portal.
    pub portal: PortalConfig,
    /// 📬 Who hears about it. Everybody on success, the admins on failure.
    pub recipients: Recipients,
    /// 📮 How the mail leaves the building.
    pub notifier: NotifierConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// 🔒 Reject configs that would only fail later, at a worse time.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.recipients.full.is_empty() {
            anyhow::bail!("💀 recipients.full is empty. A report nobody receives is a diary.");
        }
        if self.recipients.troubleshooting.is_empty() {
            anyhow::bail!(
                "💀 recipients.troubleshooting is empty. When things break, somebody has to be told."
            );
        }
        if self.portal.usage_window_days < 31 {
            anyhow::bail!(
                "💀 portal.usage_window_days is {}. The window ends on the report month's last day, \
                 so it needs at least 31 days to reach back to the 1st.",
                self.portal.usage_window_days
            );
        }
        if self.portal.group_id.trim().is_empty() {
            anyhow::bail!("💀 portal.group_id is blank. Which group? The void has no story maps.");
        }
        Ok(())
    }
}

/// 🚀 Load the config -- from a file, from env vars, or from the sheer power of hoping.
///
/// 🔧 Merges environment variables (`STORYVIEW_*`, with `__` for nesting, e.g.
/// `STORYVIEW_PORTAL__GROUP_ID`) with an optional TOML file. TOML wins on conflicts.
///
/// - `None` → env vars only.
/// - `Some(path)` → env vars + TOML file, merged.
pub fn load_config(config_file_name: Option<&Path>) -> anyhow::Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {:#?}",
        config_file_name.unwrap_or(Path::new(""))
    );

    let config = Figment::new().merge(Env::prefixed("STORYVIEW_").split("__"));

    let config = match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    };

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment variables (STORYVIEW_*). \
             The file exists in our hearts, but apparently not in a shape serde likes.",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables (STORYVIEW_*). \
                 No file was provided, this one's all on the environment. Classic."
            .to_string(),
    };

    let app_config: AppConfig = config.extract().context(context_msg)?;
    app_config
        .validate()
        .context("💀 The configuration parsed, but it does not make sense. Read the line above.")?;
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_test_config(contents: &str) -> tempfile::NamedTempFile {
        // 🧪 Figment wants TOML from disk, like it's method acting.
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("💀 Failed to create temp config. The filesystem said 'new phone who dis'.");
        file.write_all(contents.as_bytes())
            .expect("💀 Failed to write temp config.");
        file
    }

    const MINIMAL: &str = r#"
        [portal]
        url = "https://www.arcgis.com"
        group_id = "264e862549e24faca0bbc2ca92bc2dec"

        [recipients]
        full = ["everyone@example.org"]
        troubleshooting = ["gis-admin@example.org"]

        [notifier.File]
        file_name = "outbox.txt"
    "#;

    #[test]
    fn the_one_where_defaults_show_up_uninvited_but_helpful() {
        let file = write_test_config(MINIMAL);
        let app_config = load_config(Some(file.path()))
            .expect("💀 Minimal config should parse. Defaults should fill the rest.");

        assert_eq!(app_config.portal.username_env, "AGOL_USER");
        assert_eq!(app_config.portal.password_env, "AGOL_PASS");
        assert_eq!(app_config.portal.usage_window_days, 60);
        assert_eq!(app_config.portal.usage_parallelism, 1);
        assert_eq!(app_config.portal.page_size, 100);
        assert_eq!(app_config.logging.file_name, "storyview.log");
        assert!(app_config.logging.console);
        match app_config.notifier {
            NotifierConfig::File(file_config) => assert_eq!(file_config.file_name, "outbox.txt"),
            honestly_who_knows => panic!(
                "💀 Expected File notifier config, serde took us to {honestly_who_knows:?}. Plot twist energy."
            ),
        }
    }

    #[test]
    fn the_one_where_the_http_relay_brings_its_own_paperwork() {
        let file = write_test_config(
            r#"
            [portal]
            url = "https://wake.maps.arcgis.com"
            group_id = "g1"
            usage_parallelism = 4
            username_env = "PORTAL_USER"

            [recipients]
            full = ["a@example.org", "b@example.org"]
            troubleshooting = ["c@example.org"]

            [notifier.Http]
            url = "https://relay.example.org/send"
            from = "storymaps@example.org"
            api_key = "shh"

            [logging]
            file_name = "custom.log"
            console = false
            "#,
        );
        let app_config = load_config(Some(file.path())).expect("💀 Http config should parse.");

        assert_eq!(app_config.portal.usage_parallelism, 4);
        assert_eq!(app_config.portal.username_env, "PORTAL_USER");
        assert_eq!(app_config.recipients.full.len(), 2);
        assert!(!app_config.logging.console);
        match app_config.notifier {
            NotifierConfig::Http(http) => {
                assert_eq!(http.from, "storymaps@example.org");
                assert_eq!(http.api_key.as_deref(), Some("shh"));
            }
            other => panic!("💀 Expected Http notifier config, got {other:?}"),
        }
    }

    #[test]
    fn the_one_where_nobody_is_on_the_mailing_list() {
        let file = write_test_config(
            r#"
            [portal]
            url = "https://www.arcgis.com"
            group_id = "g1"

            [recipients]
            full = []
            troubleshooting = ["c@example.org"]

            [notifier.File]
            file_name = "outbox.txt"
            "#,
        );
        let err = load_config(Some(file.path())).expect_err("💀 Empty recipients must be rejected");
        assert!(format!("{err:#}").contains("recipients.full"));
    }

    #[test]
    fn the_one_where_the_window_is_too_short_for_a_month() {
        let file = write_test_config(
            r#"
            [portal]
            url = "https://www.arcgis.com"
            group_id = "g1"
            usage_window_days = 7

            [recipients]
            full = ["a@example.org"]
            troubleshooting = ["c@example.org"]

            [notifier.File]
            file_name = "outbox.txt"
            "#,
        );
        let err = load_config(Some(file.path())).expect_err("💀 A 7 day window cannot hold a month");
        assert!(format!("{err:#}").contains("usage_window_days"));
    }
}
