use std::collections::BTreeMap;
use std::env;
use std::env::consts::EXE_SUFFIX;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::{ToolConfig, Tools};
use crate::probe;

/// A shrink capability backed by an external program
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tool {
    Strip,
    Objcopy,
    Patchelf,
    Sstrip,
    Upx,
}

impl Tool {
    pub const ALL: [Tool; 5] = [
        Tool::Strip,
        Tool::Objcopy,
        Tool::Patchelf,
        Tool::Sstrip,
        Tool::Upx,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Tool::Strip => "strip",
            Tool::Objcopy => "objcopy",
            Tool::Patchelf => "patchelf",
            Tool::Sstrip => "sstrip",
            Tool::Upx => "upx",
        }
    }

    /// Program names to look for, most preferred first
    pub fn candidates(self) -> &'static [&'static str] {
        match self {
            // the LLVM flavors understand every target, the GNU ones only the host
            Tool::Strip => &["llvm-strip", "strip"],
            Tool::Objcopy => &["llvm-objcopy", "objcopy"],
            Tool::Patchelf => &["patchelf"],
            Tool::Sstrip => &["sstrip"],
            Tool::Upx => &["upx"],
        }
    }
}

pub fn exe(name: &str) -> String {
    format!("{}{}", name, EXE_SUFFIX)
}

/// Directories searched for tools, in order
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SearchPath {
    dirs: Vec<PathBuf>,
}

impl SearchPath {
    pub fn new<I>(dirs: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<PathBuf>,
    {
        SearchPath {
            dirs: dirs.into_iter().map(Into::into).collect(),
        }
    }

    /// `$PATH`, or nothing at all if it's unset
    pub fn from_env() -> Self {
        match env::var_os("PATH") {
            Some(paths) => SearchPath::new(env::split_paths(&paths)),
            None => SearchPath::default(),
        }
    }

    pub fn prepend<I>(&mut self, dirs: I)
    where
        I: IntoIterator,
        I::Item: Into<PathBuf>,
    {
        let mut dirs = dirs.into_iter().map(Into::into).collect::<Vec<_>>();
        dirs.append(&mut self.dirs);
        self.dirs = dirs;
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    /// Returns the first executable `dir/name`
    ///
    /// Names are tried in order and each name is looked up in every directory before moving on
    /// to the next one, so an earlier name always wins over a later one.
    pub fn locate<S>(&self, names: &[S]) -> Option<PathBuf>
    where
        S: AsRef<str>,
    {
        names.iter().find_map(|name| {
            let exe = exe(name.as_ref());

            self.dirs
                .iter()
                .map(|dir| dir.join(&exe))
                .find(|candidate| is_executable_file(candidate))
        })
    }
}

pub fn is_executable_file(path: &Path) -> bool {
    fs::metadata(path)
        .map(|meta| meta.is_file() && probe::is_executable(path))
        .unwrap_or(false)
}

/// Located tools, one entry per available capability
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ToolSet {
    tools: BTreeMap<Tool, PathBuf>,
}

impl ToolSet {
    pub fn detect(search: &SearchPath, overrides: &Tools) -> Self {
        let mut set = ToolSet::default();

        for tool in Tool::ALL {
            let found = match overrides.get(tool) {
                Some(ToolConfig { disabled: true, .. }) => {
                    log::debug!("{}: disabled by configuration", tool.name());
                    None
                }
                Some(ToolConfig {
                    path: Some(path), ..
                }) => {
                    if is_executable_file(path) {
                        Some(path.clone())
                    } else {
                        log::warn!(
                            "{}: configured path {} is not an executable file",
                            tool.name(),
                            path.display()
                        );
                        None
                    }
                }
                Some(ToolConfig {
                    candidates: Some(names),
                    ..
                }) => search.locate(names),
                _ => search.locate(tool.candidates()),
            };

            match found {
                Some(path) => {
                    log::debug!("{}: using {}", tool.name(), path.display());
                    set.insert(tool, path);
                }
                None => log::debug!("{}: not found", tool.name()),
            }
        }

        set
    }

    pub fn insert(&mut self, tool: Tool, path: PathBuf) {
        self.tools.insert(tool, path);
    }

    pub fn get(&self, tool: Tool) -> Option<&Path> {
        self.tools.get(&tool).map(|p| &**p)
    }

    pub fn contains(&self, tool: Tool) -> bool {
        self.tools.contains_key(&tool)
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }
}

impl FromIterator<(Tool, PathBuf)> for ToolSet {
    fn from_iter<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = (Tool, PathBuf)>,
    {
        ToolSet {
            tools: iter.into_iter().collect(),
        }
    }
}

/// Human readable list of every program we look for, e.g. for "nothing found" errors
pub fn searched_names() -> String {
    Tool::ALL
        .iter()
        .map(|tool| tool.candidates().join("/"))
        .collect::<Vec<_>>()
        .join(", ")
}
