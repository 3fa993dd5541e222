//! JSON 配置读写。文件缺失时写出默认配置，保证首次运行有模板可改。

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};

use super::model::AppConfig;

const CONFIG_FILE_NAME: &str = "relay-config.json";

fn join_config_path(base: &Path) -> PathBuf {
    let mut path = base.to_path_buf();
    path.push("config");
    path.push(CONFIG_FILE_NAME);
    path
}

pub fn load_or_init_at(base_dir: &Path) -> Result<AppConfig> {
    let path = join_config_path(base_dir);
    if path.exists() {
        let data = fs::read(&path).with_context(|| format!("read config: {}", path.display()))?;
        let cfg: AppConfig = serde_json::from_slice(&data).context("parse config json")?;
        Ok(cfg)
    } else {
        let cfg = AppConfig::default();
        save_at(&cfg, base_dir)?;
        Ok(cfg)
    }
}

pub fn save_at(cfg: &AppConfig, base_dir: &Path) -> Result<()> {
    let path = join_config_path(base_dir);
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).ok();
    }
    let json = serde_json::to_string_pretty(cfg).context("serialize config")?;
    let mut file =
        fs::File::create(&path).with_context(|| format!("create config: {}", path.display()))?;
    file.write_all(json.as_bytes()).context("write config")?;
    tracing::info!(target = "app", path = %path.display(), "config saved");
    Ok(())
}
