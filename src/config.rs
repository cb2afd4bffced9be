use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Deserialize;

use crate::pipeline::Policy;
use crate::tool::Tool;
use crate::util;

pub const FILE_NAME: &str = "optimz.toml";

/// Contents of `optimz.toml`
///
/// Every key is optional; command line flags take precedence over anything set here.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
    /// Pass count used when `-<N>` is not given
    pub passes: Option<i64>,
    pub policy: Option<Policy>,
    pub quiet: Option<bool>,
    /// Looked at before `$PATH`
    pub search_paths: Vec<PathBuf>,
    pub remove_sections: Option<Vec<String>>,
    pub upx_args: Option<Vec<String>>,
    pub tools: Tools,
}

impl Config {
    /// Looks for `optimz.toml` in `dir` and its parents
    pub fn find(dir: &Path) -> Result<Option<(PathBuf, Self)>> {
        match util::search(dir, FILE_NAME) {
            Some(root) => {
                let path = root.join(FILE_NAME);
                let config = Config::load(&path)?;
                Ok(Some((path, config)))
            }
            None => Ok(None),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        util::parse(path)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Tools {
    pub strip: Option<ToolConfig>,
    pub objcopy: Option<ToolConfig>,
    pub patchelf: Option<ToolConfig>,
    pub sstrip: Option<ToolConfig>,
    pub upx: Option<ToolConfig>,
}

impl Tools {
    pub fn get(&self, tool: Tool) -> Option<&ToolConfig> {
        match tool {
            Tool::Strip => self.strip.as_ref(),
            Tool::Objcopy => self.objcopy.as_ref(),
            Tool::Patchelf => self.patchelf.as_ref(),
            Tool::Sstrip => self.sstrip.as_ref(),
            Tool::Upx => self.upx.as_ref(),
        }
    }
}

/// Per-capability override
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolConfig {
    /// Use exactly this program, skip the search
    pub path: Option<PathBuf>,
    /// Names to search for instead of the built-in ones
    pub candidates: Option<Vec<String>>,
    pub disabled: bool,
}
