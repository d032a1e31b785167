// ABOUTME: Reads site-scoped secret variables from the durable secret store
// ABOUTME: Parses secrets/<site>/.env with dotenvy; malformed lines are logged and skipped

use plinth_core::{validate_site_id, Layout};
use std::collections::HashMap;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct SecretStore {
    layout: Layout,
}

impl SecretStore {
    pub fn new(layout: Layout) -> Self {
        Self { layout }
    }

    /// Secret variables for `site`; empty when the site has none or the id is invalid
    pub fn load(&self, site: &str) -> HashMap<String, String> {
        let mut vars = HashMap::new();
        if let Err(e) = validate_site_id(site) {
            warn!("Not loading secrets: {}", e);
            return vars;
        }

        let path = self.layout.secret_file(site);
        if !path.is_file() {
            return vars;
        }

        let entries = match dotenvy::from_path_iter(&path) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Failed to open secrets for {}: {}", site, e);
                return vars;
            }
        };

        for entry in entries {
            match entry {
                Ok((key, value)) => {
                    vars.insert(key, value);
                }
                Err(e) => warn!("Skipping malformed secret entry for {}: {}", site, e),
            }
        }

        debug!("Loaded {} secret variables for {}", vars.len(), site);
        vars
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_parses_quotes_and_comments() {
        let temp = TempDir::new().unwrap();
        let layout = Layout::new(temp.path());
        fs::create_dir_all(layout.secrets_dir("demo")).unwrap();
        fs::write(
            layout.secret_file("demo"),
            "# credentials\nAPI_KEY=xyz\nGREETING=\"hello world\"\n\nEMPTY=\n",
        )
        .unwrap();

        let vars = SecretStore::new(layout).load("demo");
        assert_eq!(vars.get("API_KEY").map(String::as_str), Some("xyz"));
        assert_eq!(vars.get("GREETING").map(String::as_str), Some("hello world"));
        assert_eq!(vars.get("EMPTY").map(String::as_str), Some(""));
        assert_eq!(vars.len(), 3);
    }

    #[test]
    fn test_missing_file_is_empty() {
        let temp = TempDir::new().unwrap();
        let vars = SecretStore::new(Layout::new(temp.path())).load("demo");
        assert!(vars.is_empty());
    }

    #[test]
    fn test_invalid_site_is_empty() {
        let temp = TempDir::new().unwrap();
        let vars = SecretStore::new(Layout::new(temp.path())).load("../demo");
        assert!(vars.is_empty());
    }
}
