use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use terraria_pty::LaunchArgs;

// =============================================================================
// Panel config (figment-deserialized from defaults / config.toml / env vars)
// =============================================================================
//
//   config.toml:     [discord]
//                    enabled = true
//
//   env var:         PANEL_DISCORD__ENABLED=true   (double underscore = nesting)

pub const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub terraria: TerrariaFileConfig,
    #[serde(default)]
    pub web: WebFileConfig,
    #[serde(default)]
    pub discord: DiscordFileConfig,
}

/// How to launch the game server (lives under `[terraria]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TerrariaFileConfig {
    #[serde(default = "default_binary_path")]
    pub binary_path: String,
    #[serde(default = "default_world_path")]
    pub world_path: String,
    #[serde(default = "default_server_port")]
    pub port: String,
    /// Seconds to wait after the interrupt before SIGKILL on hard reset (0 = wait forever)
    #[serde(default)]
    pub reboot_kill_timeout_secs: u64,
}

impl Default for TerrariaFileConfig {
    fn default() -> Self {
        Self {
            binary_path: default_binary_path(),
            world_path: default_world_path(),
            port: default_server_port(),
            reboot_kill_timeout_secs: 0,
        }
    }
}

impl TerrariaFileConfig {
    pub fn launch_args(&self) -> LaunchArgs {
        LaunchArgs {
            binary_path: self.binary_path.clone(),
            world_path: self.world_path.clone(),
            port: self.port.clone(),
        }
    }

    pub fn kill_timeout(&self) -> Option<Duration> {
        if self.reboot_kill_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.reboot_kill_timeout_secs))
        }
    }
}

/// Control panel web server (lives under `[web]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WebFileConfig {
    #[serde(default = "default_web_host")]
    pub host: String,
    #[serde(default = "default_web_port")]
    pub port: u16,
    /// Title shown on the control page
    #[serde(default = "default_header")]
    pub header: String,
    /// Directory served for paths no route matches
    #[serde(default)]
    pub static_dir: Option<PathBuf>,
}

impl Default for WebFileConfig {
    fn default() -> Self {
        Self {
            host: default_web_host(),
            port: default_web_port(),
            header: default_header(),
            static_dir: None,
        }
    }
}

/// Discord bot settings (lives under `[discord]`).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DiscordFileConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub channel_id: String,
    #[serde(default)]
    pub bot_token: String,
}

impl DiscordFileConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        if self.channel_id.trim().is_empty() {
            anyhow::bail!("discord.enabled is set but discord.channel_id is empty");
        }
        if self.bot_token.trim().is_empty() {
            anyhow::bail!("discord.enabled is set but discord.bot_token is empty");
        }
        Ok(())
    }
}

fn default_binary_path() -> String {
    "./server/TerrariaServer.bin.x86_64".to_string()
}
fn default_world_path() -> String {
    "./server/world.wld".to_string()
}
fn default_server_port() -> String {
    "7777".to_string()
}
fn default_web_host() -> String {
    "0.0.0.0".to_string()
}
fn default_web_port() -> u16 {
    8080
}
fn default_header() -> String {
    "Terraria Control Panel".to_string()
}

/// Build a figment that layers: defaults → config.toml → PANEL_* env vars.
///
/// Env vars use double-underscore for nesting into sections:
///   `PANEL_WEB__PORT=80`  →  `web.port = 80`
pub fn load_config(data_dir: &Path) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(data_dir.join(CONFIG_FILE_NAME)))
        .merge(Env::prefixed("PANEL_").split("__"))
}

/// Write a config.toml with every default filled in, for the operator to edit.
pub fn write_default_config(data_dir: &Path, force: bool) -> Result<PathBuf> {
    let path = data_dir.join(CONFIG_FILE_NAME);
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }

    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("Failed to create data directory: {:?}", data_dir))?;
    let contents =
        toml::to_string_pretty(&FileConfig::default()).context("Failed to render default config")?;
    std::fs::write(&path, contents)
        .with_context(|| format!("Failed to write config file: {:?}", path))?;

    info!("Default config written to {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── defaults ────────────────────────────────────────────────────────

    #[test]
    fn test_terraria_defaults() {
        let d = TerrariaFileConfig::default();
        assert_eq!(d.binary_path, "./server/TerrariaServer.bin.x86_64");
        assert_eq!(d.port, "7777");
        assert!(d.kill_timeout().is_none());
    }

    #[test]
    fn test_web_defaults() {
        let d = WebFileConfig::default();
        assert_eq!(d.host, "0.0.0.0");
        assert_eq!(d.port, 8080);
        assert_eq!(d.header, "Terraria Control Panel");
        assert!(d.static_dir.is_none());
    }

    #[test]
    fn test_launch_args_from_config() {
        let fc = TerrariaFileConfig {
            binary_path: "/srv/terraria/TerrariaServer".into(),
            world_path: "/srv/worlds/Texas.wld".into(),
            port: "7778".into(),
            reboot_kill_timeout_secs: 30,
        };
        let args = fc.launch_args();
        assert_eq!(
            args.command_line(),
            "/srv/terraria/TerrariaServer -world /srv/worlds/Texas.wld -port 7778"
        );
        assert_eq!(fc.kill_timeout(), Some(Duration::from_secs(30)));
    }

    // ── discord validation ──────────────────────────────────────────────

    #[test]
    fn test_discord_disabled_needs_nothing() {
        assert!(DiscordFileConfig::default().validate().is_ok());
    }

    #[test]
    fn test_discord_enabled_requires_token() {
        let d = DiscordFileConfig {
            enabled: true,
            channel_id: "1234".into(),
            bot_token: "".into(),
        };
        let err = d.validate().unwrap_err().to_string();
        assert!(err.contains("bot_token"));
    }

    // ── load_config ─────────────────────────────────────────────────────
    //
    // Jail serializes tests that touch the process environment.

    #[test]
    fn test_load_config_defaults() {
        figment::Jail::expect_with(|jail| {
            let fc: FileConfig = load_config(jail.directory()).extract()?;
            assert!(!fc.discord.enabled);
            assert_eq!(fc.web.port, 8080);
            assert_eq!(fc.terraria.world_path, "./server/world.wld");
            Ok(())
        });
    }

    #[test]
    fn test_load_config_toml_sets_values() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
                [terraria]
                world_path = "/worlds/Texas.wld"

                [web]
                port = 80
                header = "Texas"

                [discord]
                enabled = true
                channel_id = "42"
                bot_token = "abc"
                "#,
            )?;
            let fc: FileConfig = load_config(jail.directory()).extract()?;
            assert_eq!(fc.terraria.world_path, "/worlds/Texas.wld");
            assert_eq!(fc.terraria.port, "7777");
            assert_eq!(fc.web.port, 80);
            assert_eq!(fc.web.header, "Texas");
            assert!(fc.discord.enabled);
            assert!(fc.discord.validate().is_ok());
            Ok(())
        });
    }

    #[test]
    fn test_env_overrides_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("config.toml", "[web]\nport = 80\n")?;
            jail.set_env("PANEL_WEB__PORT", "9000");
            jail.set_env("PANEL_DISCORD__ENABLED", "true");
            jail.set_env("PANEL_TERRARIA__REBOOT_KILL_TIMEOUT_SECS", "15");

            let fc: FileConfig = load_config(jail.directory()).extract()?;
            assert_eq!(fc.web.port, 9000);
            assert!(fc.discord.enabled);
            assert_eq!(fc.terraria.kill_timeout(), Some(Duration::from_secs(15)));
            Ok(())
        });
    }

    // ── write_default_config ────────────────────────────────────────────

    #[test]
    fn test_write_default_config_then_load() {
        figment::Jail::expect_with(|jail| {
            let dir = jail.directory().join("panel");
            let path = write_default_config(&dir, false).unwrap();
            assert_eq!(path, dir.join("config.toml"));

            let fc: FileConfig = load_config(&dir).extract()?;
            assert_eq!(fc.terraria.binary_path, default_binary_path());
            assert_eq!(fc.web.header, default_header());
            Ok(())
        });
    }

    #[test]
    fn test_write_default_config_refuses_overwrite() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("config.toml", "[web]\nport = 1\n")?;
            let dir = jail.directory();

            assert!(write_default_config(dir, false).is_err());
            let fc: FileConfig = load_config(dir).extract()?;
            assert_eq!(fc.web.port, 1);

            write_default_config(dir, true).unwrap();
            let fc: FileConfig = load_config(dir).extract()?;
            assert_eq!(fc.web.port, 8080);
            Ok(())
        });
    }
}
