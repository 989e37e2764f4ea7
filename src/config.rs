//! Optional config file loading. Search order: ./yireader.toml, then
//! $XDG_CONFIG_HOME/yireader/config.toml (or ~/.config/yireader/config.toml).

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Config file contents. All fields optional; only present keys override defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct Config {
    /// Directory of site rule `*.json` files. Paths are relative to CWD.
    pub rules_dir: Option<PathBuf>,
    /// HTTP User-Agent header.
    pub user_agent: Option<String>,
    /// Request timeout in seconds. No timeout when unset.
    pub timeout_secs: Option<u64>,
    /// Delay in seconds between requests (default 0).
    pub request_delay_secs: Option<u64>,
    /// Most pages followed for one chapter (default 32).
    pub max_chapter_pages: Option<usize>,
    /// Most pages followed for one catalog (default 32).
    pub max_catalog_pages: Option<usize>,
    /// Chapter output: text (default) or html.
    pub chapter_style: Option<String>,
}

/// Search order: (1) ./yireader.toml, (2) $XDG_CONFIG_HOME/yireader/config.toml.
/// Missing file returns Ok(None). Invalid TOML or I/O error reading a present file returns Err.
pub fn load_config() -> Result<Option<Config>, String> {
    let cwd = std::env::current_dir()
        .map_err(|e| format!("Cannot determine current directory: {}", e))?;
    let mut paths = vec![cwd.join("yireader.toml")];
    if let Some(d) = dirs::config_dir() {
        paths.push(d.join("yireader").join("config.toml"));
    }
    load_first(&paths)
}

/// Parse the first of `paths` that exists.
fn load_first(paths: &[PathBuf]) -> Result<Option<Config>, String> {
    for path in paths {
        if path.exists() {
            return read_config(path).map(Some);
        }
    }
    Ok(None)
}

fn read_config(path: &Path) -> Result<Config, String> {
    let s = std::fs::read_to_string(path)
        .map_err(|e| format!("Cannot read config {}: {}", path.display(), e))?;
    toml::from_str(&s).map_err(|e| format!("Invalid config {}: {}", path.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_empty_config() {
        let c: Config = toml::from_str("").unwrap();
        assert!(c.rules_dir.is_none());
        assert!(c.user_agent.is_none());
        assert!(c.timeout_secs.is_none());
        assert!(c.request_delay_secs.is_none());
        assert!(c.max_chapter_pages.is_none());
        assert!(c.max_catalog_pages.is_none());
        assert!(c.chapter_style.is_none());
    }

    #[test]
    fn parse_full_config() {
        let s = r#"
            rules_dir = "rules"
            user_agent = "Custom/1.0"
            timeout_secs = 20
            request_delay_secs = 1
            max_chapter_pages = 8
            max_catalog_pages = 4
            chapter_style = "html"
        "#;
        let c: Config = toml::from_str(s).unwrap();
        assert_eq!(c.rules_dir.as_deref(), Some(Path::new("rules")));
        assert_eq!(c.user_agent.as_deref(), Some("Custom/1.0"));
        assert_eq!(c.timeout_secs, Some(20));
        assert_eq!(c.request_delay_secs, Some(1));
        assert_eq!(c.max_chapter_pages, Some(8));
        assert_eq!(c.max_catalog_pages, Some(4));
        assert_eq!(c.chapter_style.as_deref(), Some("html"));
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let c: Config = toml::from_str("output_dir = \"out\"\nrequest_delay_secs = 2").unwrap();
        assert_eq!(c.request_delay_secs, Some(2));
    }

    #[test]
    fn invalid_toml_errors() {
        assert!(toml::from_str::<Config>("rules_dir = [").is_err());
        assert!(toml::from_str::<Config>("max_chapter_pages = \"many\"").is_err());
    }

    #[test]
    fn first_existing_file_wins() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        let local = dir.path().join("yireader.toml");
        let global = dir.path().join("config.toml");
        std::fs::write(&local, "user_agent = \"local\"").unwrap();
        std::fs::write(&global, "user_agent = \"global\"").unwrap();

        let c = load_first(&[missing.clone(), local, global.clone()]).unwrap().unwrap();
        assert_eq!(c.user_agent.as_deref(), Some("local"));
        assert!(load_first(&[missing.clone()]).unwrap().is_none());

        std::fs::write(&global, "timeout_secs = [").unwrap();
        let err = load_first(&[missing, global]).unwrap_err();
        assert!(err.starts_with("Invalid config"));
    }
}
