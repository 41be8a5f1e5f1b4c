use {
    serde::Deserializer,
    crate::{
        prelude::*,
        run::Budget,
    },
};
#[cfg(unix)] use xdg::BaseDirectories;

#[cfg(unix)] const CONFIG_FILE_NAME: &str = "startgg-sheets.json";
#[cfg(unix)] const STATE_PREFIX: &str = "startgg-sheets";
#[cfg(unix)] const STATE_FILE_NAME: &str = "state.json";

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error("failed to access {}: {source}", path.display())]
    Io {
        source: io::Error,
        path: PathBuf,
    },
    #[error("invalid JSON in {}: {source}", path.display())]
    Json {
        source: serde_json::Error,
        path: PathBuf,
    },
    #[error("missing config file")]
    Missing,
    #[cfg(unix)]
    #[error("failed to create state directory: {0}")]
    StateDir(#[source] io::Error),
}

async fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, Error> {
    let buf = tokio::fs::read(path).await.map_err(|source| Error::Io { source, path: path.to_owned() })?;
    serde_json::from_slice(&buf).map_err(|source| Error::Json { source, path: path.to_owned() })
}

fn default_sheet_name() -> String { format!("Events") }
fn default_service_account_key() -> PathBuf { PathBuf::from("assets/google-client-secret.json") }
fn default_timezone() -> Tz { Tz::UTC }
fn default_time_budget_secs() -> u64 { 4 * 60 }

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Config {
    #[serde(rename = "startGgApiKey")]
    pub(crate) startgg_api_key: String,
    pub(crate) spreadsheet_id: String,
    #[serde(default = "default_sheet_name")]
    pub(crate) sheet_name: String,
    /// Google service account key with edit access to the spreadsheet.
    #[serde(default = "default_service_account_key")]
    pub(crate) service_account_key: PathBuf,
    #[serde(default = "default_timezone")]
    pub(crate) timezone: Tz,
    #[serde(default = "default_time_budget_secs")]
    pub(crate) time_budget_secs: u64,
    #[serde(default)]
    pub(crate) max_pages: Option<u32>,
}

impl Config {
    pub(crate) async fn load(path: Option<&Path>) -> Result<Self, Error> {
        if let Some(path) = path {
            return read_json(path).await
        }
        #[cfg(unix)] {
            if let Some(config_path) = BaseDirectories::new().find_config_file(CONFIG_FILE_NAME) {
                read_json(&config_path).await
            } else {
                Err(Error::Missing)
            }
        }
        #[cfg(not(unix))] {
            let config_path = Path::new("cfg/startgg-sheets.json");
            if config_path.exists() {
                read_json(config_path).await
            } else {
                Err(Error::Missing)
            }
        }
    }

    pub(crate) fn budget(&self) -> Budget {
        Budget {
            max_duration: Duration::from_secs(self.time_budget_secs),
            max_pages: self.max_pages,
        }
    }
}

/// Accepts a number or a numeric string. Anything else counts as page 0.
fn lenient_page_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()).unwrap_or_default(),
        serde_json::Value::String(s) => s.trim().parse().unwrap_or_default(),
        _ => 0,
    })
}

/// Persisted between runs.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct State {
    /// The last page of tournaments that was synced, or 0 to start over at the beginning of the window.
    #[serde(default, deserialize_with = "lenient_page_number")]
    pub(crate) page_number: u32,
}

impl State {
    pub(crate) fn path(custom: Option<&Path>) -> Result<PathBuf, Error> {
        if let Some(path) = custom {
            return Ok(path.to_owned())
        }
        #[cfg(unix)] {
            BaseDirectories::with_prefix(STATE_PREFIX).place_state_file(STATE_FILE_NAME).map_err(Error::StateDir)
        }
        #[cfg(not(unix))] {
            Ok(PathBuf::from("cfg/startgg-sheets-state.json"))
        }
    }

    /// A missing or unreadable state file is the same as a fresh start.
    pub(crate) async fn load(path: &Path) -> Result<Self, Error> {
        if !tokio::fs::try_exists(path).await.map_err(|source| Error::Io { source, path: path.to_owned() })? {
            return Ok(Self::default())
        }
        match read_json(path).await {
            Ok(state) => Ok(state),
            Err(Error::Json { source, path }) => {
                log::warn!("ignoring invalid state file {}: {source}", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e),
        }
    }

    pub(crate) async fn save(&self, path: &Path) -> Result<(), Error> {
        let buf = serde_json::to_vec_pretty(self).map_err(|source| Error::Json { source, path: path.to_owned() })?;
        tokio::fs::write(path, buf).await.map_err(|source| Error::Io { source, path: path.to_owned() })
    }
}
