// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

/// Runtime configuration of the tablet apply path. Owned by the tablet
/// manager rather than a process-global so differing configurations can
/// coexist in one process.
#[derive(Clone, Debug, Deserialize)]
pub struct LakeConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Optional full tracing EnvFilter expression.
    /// If set, this takes precedence over `log_level`.
    #[serde(default)]
    pub log_filter: Option<String>,

    /// When a publish step requests a primary-key rebuild, run the recover
    /// routine instead of surfacing the error.
    #[serde(default = "default_true")]
    pub enable_primary_key_recover: bool,

    /// Size-tiered compaction does not maintain the cumulative point.
    #[serde(default)]
    pub enable_size_tiered_compaction_strategy: bool,
}

impl Default for LakeConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_filter: None,
            enable_primary_key_recover: true,
            enable_size_tiered_compaction_strategy: false,
        }
    }
}

impl LakeConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("read config file: {}", path.display()))?;
        let cfg: LakeConfig =
            toml::from_str(&s).with_context(|| format!("parse toml: {}", path.display()))?;
        Ok(cfg)
    }

    pub fn load_from_env_or_default() -> Result<Self> {
        match config_path_from_env()? {
            Some(path) => Self::load_from_file(&path),
            None => Ok(Self::default()),
        }
    }
}

fn config_path_from_env() -> Result<Option<PathBuf>> {
    if let Ok(p) = std::env::var("LAKEMETA_CONFIG") {
        if !p.trim().is_empty() {
            let path = PathBuf::from(p);
            if !path.exists() {
                return Err(anyhow!(
                    "missing config file from $LAKEMETA_CONFIG: {}",
                    path.display()
                ));
            }
            return Ok(Some(path));
        }
    }
    let local = PathBuf::from("lakemeta.toml");
    if local.exists() {
        return Ok(Some(local));
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::LakeConfig;

    #[test]
    fn defaults_enable_recover_and_cumulative_point() {
        let cfg = LakeConfig::default();
        assert!(cfg.enable_primary_key_recover);
        assert!(!cfg.enable_size_tiered_compaction_strategy);
        assert_eq!(cfg.log_level, "info");
    }

    #[test]
    fn parses_partial_toml_with_defaults() {
        let cfg: LakeConfig = toml::from_str(
            r#"
            log_level = "debug"
            enable_size_tiered_compaction_strategy = true
            "#,
        )
        .expect("parse config");
        assert_eq!(cfg.log_level, "debug");
        assert!(cfg.enable_size_tiered_compaction_strategy);
        assert!(cfg.enable_primary_key_recover);
    }
}
