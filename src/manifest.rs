use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Error;


pub const MANIFEST_FILE: &str = "package.json";


#[derive(Debug, Deserialize)]
struct PackageJson {
    name: Option<String>,
    version: Option<String>,
    scripts: Option<serde_json::Map<String, serde_json::Value>>,
}


/// The script table of a project plus the identity shown in name headers.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct Manifest {
    pub path: PathBuf,
    pub name: String,
    pub version: String,
    /// Script names and bodies in declaration order.
    pub scripts: Vec<(String, String)>,
}

impl Manifest {
    /// Reads `package.json` from `dir`.
    pub fn load(dir: &Path) -> Result<Self, Error> {
        let path = dir.join(MANIFEST_FILE);
        let text = std::fs::read_to_string(&path)
            .map_err(|err| Error::manifest(&path, err))?;
        Self::parse(path, &text)
    }

    pub fn parse(path: impl Into<PathBuf>, text: &str) -> Result<Self, Error> {
        let path = path.into();
        let body: PackageJson = serde_json::from_str(text)
            .map_err(|err| Error::manifest(&path, err))?;
        let scripts = body
            .scripts
            .ok_or_else(|| Error::manifest(&path, "no \"scripts\" field"))?
            .into_iter()
            .map(|(name, script)| {
                let script = match script {
                    serde_json::Value::String(script) => script,
                    other => other.to_string(),
                };
                (name, script)
            })
            .collect();

        tracing::debug!(path = %path.display(), "Loaded manifest");

        Ok(Self {
            path,
            name: body.name.unwrap_or_default(),
            version: body.version.unwrap_or_default(),
            scripts,
        })
    }

    pub fn task_names(&self) -> Vec<String> {
        self.scripts.iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn script(&self, name: &str) -> Option<&str> {
        self.scripts
            .iter()
            .find(|(script, _)| script == name)
            .map(|(_, body)| body.as_str())
    }
}
