use std::env;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct Config {
    pub listen: String,
    pub data_path: PathBuf,
    pub vault_path: PathBuf,
    pub ca_path: PathBuf,
    pub pipeline_path: PathBuf,
    pub admin_token: Option<String>,
    pub dev_mode: bool,
}

fn dir_or_default(var: &str, data_path: &Path, default: &str) -> PathBuf {
    env::var(var).map_or_else(|_| data_path.join(default), PathBuf::from)
}

impl Config {
    pub fn load() -> Self {
        let data_path = env::var("PIPEWRIGHT_DATA_PATH")
            .map_or_else(|_| PathBuf::from("/data/pipewright"), PathBuf::from);
        Self {
            listen: env::var("PIPEWRIGHT_LISTEN").unwrap_or_else(|_| "0.0.0.0:8080".into()),
            vault_path: dir_or_default("PIPEWRIGHT_VAULT_PATH", &data_path, "vault"),
            ca_path: dir_or_default("PIPEWRIGHT_CA_PATH", &data_path, "ca"),
            pipeline_path: dir_or_default("PIPEWRIGHT_PIPELINE_PATH", &data_path, "pipelines"),
            admin_token: env::var("PIPEWRIGHT_ADMIN_TOKEN")
                .ok()
                .filter(|v| !v.is_empty()),
            dev_mode: env::var("PIPEWRIGHT_DEV").ok().is_some_and(|v| v == "true"),
            data_path,
        }
    }

    /// Build a config rooted at a single directory. Used by tests and dev setups.
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            listen: "127.0.0.1:0".into(),
            data_path: root.to_path_buf(),
            vault_path: root.join("vault"),
            ca_path: root.join("ca"),
            pipeline_path: root.join("pipelines"),
            admin_token: None,
            dev_mode: true,
        }
    }

    /// Directory the build worker clones repositories into.
    pub fn workspace_path(&self) -> PathBuf {
        self.data_path.join("workspaces")
    }
}
