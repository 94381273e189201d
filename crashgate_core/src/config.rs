use crate::error::HarnessError;
use crate::gate::GateConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable naming a TOML config for harnesses built without a CLI.
pub const CONFIG_ENV_VAR: &str = "CRASHGATE_CONFIG";

pub const DEFAULT_MODULE_NAME: &str = "crashgate_module";
pub const DEFAULT_ENTRY_SYMBOL: &str = "crashgate_test_one_input";

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TargetMode {
    /// Inputs go straight to the in-process fault dispatcher.
    #[default]
    Local,
    /// Inputs are forwarded to an entry point in a shared library.
    Dynamic,
    /// Inputs are forwarded to an entry point linked into the binary.
    Linked,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct TargetConfig {
    #[serde(default)]
    pub mode: TargetMode,
    /// Undecorated library name; `lib`/`.so` and friends are added per platform.
    #[serde(default = "default_module_name")]
    pub module_name: String,
    pub module_dir: Option<PathBuf>,
    #[serde(default = "default_symbol")]
    pub symbol: String,
}

pub fn default_module_name() -> String {
    DEFAULT_MODULE_NAME.to_string()
}

pub fn default_symbol() -> String {
    DEFAULT_ENTRY_SYMBOL.to_string()
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            mode: TargetMode::default(),
            module_name: default_module_name(),
            module_dir: None,
            symbol: default_symbol(),
        }
    }
}

impl TargetConfig {
    /// Platform file name of the module, joined to `module_dir` when set.
    /// Without a directory the loader's own search path applies.
    pub fn module_path(&self) -> PathBuf {
        let file_name = libloading::library_filename(&self.module_name);
        match &self.module_dir {
            Some(dir) => dir.join(file_name),
            None => PathBuf::from(file_name),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct HarnessConfig {
    #[serde(default)]
    pub gate: GateConfig,
    #[serde(default)]
    pub target: TargetConfig,
}

impl HarnessConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, anyhow::Error> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file at {:?}: {}", path, e))?;

        let config: HarnessConfig = toml::from_str(&content).map_err(|e| {
            anyhow::anyhow!("Failed to parse TOML from config file {:?}: {}", path, e)
        })?;

        Ok(config)
    }

    /// Loads the file named by [`CONFIG_ENV_VAR`], or the defaults when unset.
    pub fn from_env() -> Result<Self, anyhow::Error> {
        match std::env::var_os(CONFIG_ENV_VAR) {
            Some(path) if !path.is_empty() => Self::load_from_file(Path::new(&path)),
            _ => Ok(Self::default()),
        }
    }

    /// Gate an input has to open to reach a fault.
    ///
    /// The `[gate]` table configures the local dispatcher only. Forwarded
    /// modules run the default gate whatever this file says.
    pub fn input_gate(&self) -> GateConfig {
        match self.target.mode {
            TargetMode::Local => self.gate.clone(),
            TargetMode::Dynamic | TargetMode::Linked => GateConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<(), HarnessError> {
        self.gate.validate()?;
        if self.target.mode != TargetMode::Local && self.target.symbol.is_empty() {
            return Err(HarnessError::InvalidConfig(
                "target symbol must not be empty".to_string(),
            ));
        }
        if self.target.mode == TargetMode::Dynamic && self.target.module_name.is_empty() {
            return Err(HarnessError::InvalidConfig(
                "dynamic mode needs a module name".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::GateCheck;
    use std::io::Write;

    #[test]
    fn empty_file_yields_defaults() {
        let config: HarnessConfig = toml::from_str("").unwrap();
        assert_eq!(config.gate, GateConfig::default());
        assert_eq!(config.target.mode, TargetMode::Local);
        assert_eq!(config.target.symbol, DEFAULT_ENTRY_SYMBOL);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn full_file_round_trips_through_load() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
            [gate]
            selector-offset = 4
            threshold = 3
            checks = [
              {{ offset = 0, expected = "F" }},
              {{ offset = 1, expected = "U" }},
              {{ offset = 2, expected = "Z" }},
              {{ offset = 3, expected = "Z" }},
            ]

            [target]
            mode = "dynamic"
            module-name = "fault_target"
            module-dir = "/opt/targets"
            symbol = "fault_entry"
            "#
        )
        .unwrap();

        let config = HarnessConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.gate.selector_offset, 4);
        assert_eq!(config.gate.threshold, Some(3));
        assert_eq!(config.gate.checks[3], GateCheck::new(3, b'Z'));
        assert_eq!(config.target.mode, TargetMode::Dynamic);
        assert_eq!(config.target.symbol, "fault_entry");
        assert_eq!(
            config.target.module_path(),
            Path::new("/opt/targets").join(libloading::library_filename("fault_target"))
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let result = toml::from_str::<HarnessConfig>("[target]\nmodle = \"dynamic\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = HarnessConfig::load_from_file(Path::new("/nonexistent/crashgate.toml"))
            .unwrap_err()
            .to_string();
        assert!(err.contains("crashgate.toml"), "{err}");
    }

    #[test]
    fn module_path_without_dir_uses_search_path() {
        let target = TargetConfig::default();
        let path = target.module_path();
        assert_eq!(path.parent(), Some(Path::new("")));
        assert!(
            path.to_string_lossy().contains(DEFAULT_MODULE_NAME),
            "{path:?}"
        );
    }

    #[test]
    fn forwarding_modes_use_the_default_input_gate() {
        let mut config: HarnessConfig = toml::from_str(
            r#"
            [gate]
            selector-offset = 2
            checks = [ { offset = 0, expected = "O" }, { offset = 1, expected = "K" } ]
            "#,
        )
        .unwrap();
        assert_eq!(config.input_gate(), config.gate);

        config.target.mode = TargetMode::Linked;
        assert_eq!(config.input_gate(), GateConfig::default());
        config.target.mode = TargetMode::Dynamic;
        assert_eq!(config.input_gate(), GateConfig::default());
    }

    #[test]
    fn validate_rejects_empty_symbol_for_forwarding_modes() {
        let mut config = HarnessConfig::default();
        config.target.symbol.clear();
        assert!(config.validate().is_ok());
        config.target.mode = TargetMode::Linked;
        assert!(matches!(
            config.validate(),
            Err(HarnessError::InvalidConfig(_))
        ));
    }
}
