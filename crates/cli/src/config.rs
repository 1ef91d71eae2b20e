use anyhow::{Context, Result};
use livechat_runtime_config::{CONFIG_FILE_NAME, WidgetConfig, load_from, save_to};
use std::path::{Path, PathBuf};
use tracing::info;

/// Get the config directory path (~/.config/livechat/)
pub fn config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .context("Could not determine home directory")?;
    Ok(PathBuf::from(home).join(".config").join("livechat"))
}

/// `--config` if given, else the canonical file under [`config_dir`].
pub fn resolve_path(explicit: Option<PathBuf>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path),
        None => Ok(config_dir()?.join(CONFIG_FILE_NAME)),
    }
}

pub fn load_config(path: &Path) -> Result<WidgetConfig> {
    load_from(path).with_context(|| format!("Failed to load config at {}", path.display()))
}

/// Load the config, minting and persisting a visitor id on first use so the
/// same conversation is found again next time.
pub fn load_with_identity(path: &Path) -> Result<WidgetConfig> {
    let mut config = load_config(path)?;
    let missing = config
        .identity
        .visitor_id
        .as_deref()
        .is_none_or(|id| id.trim().is_empty());
    if missing {
        let visitor_id = uuid::Uuid::new_v4().to_string();
        info!("Generated visitor id {visitor_id}");
        config.identity.visitor_id = Some(visitor_id);
        save_to(path, &config)
            .with_context(|| format!("Failed to save config at {}", path.display()))?;
    }
    Ok(config)
}

pub fn show_config(path: &Path) -> Result<()> {
    let config = load_config(path)?;
    let rendered = toml::to_string_pretty(&config).context("Failed to render config")?;
    println!("# {}", path.display());
    print!("{rendered}");
    Ok(())
}

pub fn set_config(
    path: &Path,
    chat_url: Option<String>,
    site_id: Option<String>,
    visitor_id: Option<String>,
) -> Result<()> {
    let mut config = load_config(path)?;
    apply_overrides(&mut config, chat_url, site_id, visitor_id);
    save_to(path, &config)
        .with_context(|| format!("Failed to save config at {}", path.display()))?;
    println!("Config saved to {}", path.display());
    Ok(())
}

fn apply_overrides(
    config: &mut WidgetConfig,
    chat_url: Option<String>,
    site_id: Option<String>,
    visitor_id: Option<String>,
) {
    if let Some(url) = chat_url {
        config.server.chat_url = url.trim_end_matches('/').to_string();
    }
    if let Some(site) = site_id {
        config.identity.site_id = site;
    }
    if let Some(visitor) = visitor_id {
        config.identity.visitor_id = Some(visitor).filter(|v| !v.trim().is_empty());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_load_mints_a_stable_visitor_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);

        let first = load_with_identity(&path).unwrap();
        let id = first.identity.visitor_id.clone().unwrap();
        assert!(uuid::Uuid::parse_str(&id).is_ok());
        assert!(path.exists());

        let second = load_with_identity(&path).unwrap();
        assert_eq!(second.identity.visitor_id.as_deref(), Some(id.as_str()));
    }

    #[test]
    fn set_config_updates_only_given_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);

        set_config(&path, Some("https://chat.example.com/api/chat/".into()), None, None).unwrap();
        set_config(&path, None, Some("site-9".into()), Some("v-1".into())).unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.server.chat_url, "https://chat.example.com/api/chat");
        assert_eq!(config.identity.site_id, "site-9");
        assert_eq!(config.identity.visitor_id.as_deref(), Some("v-1"));
        assert_eq!(config.polling.interval_ms, 1000);
    }

    #[test]
    fn blank_visitor_override_clears_it() {
        let mut config = WidgetConfig::default();
        config.identity.visitor_id = Some("v-1".into());
        apply_overrides(&mut config, None, None, Some("  ".into()));
        assert!(config.identity.visitor_id.is_none());
    }

    #[test]
    fn explicit_path_wins() {
        let path = PathBuf::from("/tmp/custom.toml");
        assert_eq!(resolve_path(Some(path.clone())).unwrap(), path);
    }
}
