use miette::{IntoDiagnostic, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    pub rules: Rules,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rules {
    /// Path of the KDL rules file. Default: data/rules.kdl
    pub path: PathBuf,
}

impl Default for Rules {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/rules.kdl"),
        }
    }
}

impl Settings {
    pub fn load(path: &str) -> Result<Self> {
        let mut builder = config::Config::builder()
            .set_default(
                "rules.path",
                Rules::default().path.to_string_lossy().to_string(),
            )
            .into_diagnostic()?;

        // Optional file
        if Path::new(path).exists() {
            builder = builder.add_source(config::File::with_name(path));
        }

        // Environment overrides: GEORULES__RULES__PATH=/srv/rules.kdl
        builder = builder.add_source(config::Environment::with_prefix("GEORULES").separator("__"));

        let cfg = builder.build().into_diagnostic()?;
        let mut s: Settings = cfg.try_deserialize().into_diagnostic()?;

        if s.rules.path.is_relative() {
            s.rules.path = std::env::current_dir()
                .into_diagnostic()?
                .join(&s.rules.path);
        }

        Ok(s)
    }
}
