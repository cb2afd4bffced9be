use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{anyhow, Error};
use serde::Deserialize;

use crate::exec::{Invocation, Runner};
use crate::tool::{Tool, ToolSet};
use crate::util::file_size;

/// How a pass decides whether it made progress
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Policy {
    /// At least one step exited successfully *and* left the file smaller
    #[default]
    AnyStep,
    /// The pass did not grow the file and at least one step exited successfully
    WholePass,
}

impl Policy {
    pub const NAMES: [&'static str; 2] = ["any-step", "whole-pass"];

    pub fn name(self) -> &'static str {
        match self {
            Policy::AnyStep => "any-step",
            Policy::WholePass => "whole-pass",
        }
    }
}

impl FromStr for Policy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "any-step" => Ok(Policy::AnyStep),
            "whole-pass" => Ok(Policy::WholePass),
            _ => Err(anyhow!(
                "unknown policy `{}`, expected one of {}",
                s,
                Policy::NAMES.join(", ")
            )),
        }
    }
}

/// Tunables for the commands we run
#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    pub policy: Policy,
    /// Sections dropped by `objcopy --remove-section`
    pub remove_sections: Vec<String>,
    pub upx_args: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            policy: Policy::default(),
            remove_sections: [".comment", ".note", ".note.*", ".gnu_debuglink"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            upx_args: vec!["--best".to_owned(), "--lzma".to_owned()],
        }
    }
}

/// One tool invocation; the target path is appended as the last argument
#[derive(Clone, Debug, PartialEq)]
pub struct Step {
    pub tool: Tool,
    pub args: Vec<OsString>,
}

impl Step {
    fn new<I, S>(tool: Tool, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Step {
            tool,
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

/// Every step we know about, in the order they must run
///
/// Symbols go first so that the section and rpath edits see a smaller file; the packer goes last
/// because nothing else can read its output.
pub fn steps(settings: &Settings) -> Vec<Step> {
    let mut steps = vec![
        Step::new(Tool::Strip, ["--strip-unneeded"]),
        Step::new(Tool::Strip, ["--strip-all"]),
        Step::new(Tool::Objcopy, ["--strip-debug"]),
    ];

    if !settings.remove_sections.is_empty() {
        steps.push(Step::new(
            Tool::Objcopy,
            settings
                .remove_sections
                .iter()
                .map(|s| format!("--remove-section={}", s)),
        ));
    }

    steps.push(Step::new(Tool::Objcopy, ["--compress-debug-sections"]));
    steps.push(Step::new(Tool::Patchelf, ["--shrink-rpath"]));
    steps.push(Step::new(Tool::Sstrip, Vec::<String>::new()));
    steps.push(Step::new(Tool::Upx, settings.upx_args.iter().cloned()));

    steps
}

/// What a single step did to the file
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StepOutcome {
    pub tool: Tool,
    pub status: i32,
    pub before: u64,
    pub after: u64,
}

impl StepOutcome {
    pub fn succeeded(&self) -> bool {
        self.status == 0
    }

    pub fn shrank(&self) -> bool {
        self.succeeded() && self.after < self.before
    }
}

/// What a whole pass did to the file
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PassReport {
    pub start: u64,
    pub end: u64,
    pub steps: Vec<StepOutcome>,
}

impl PassReport {
    pub fn shrank(&self, policy: Policy) -> bool {
        match policy {
            Policy::AnyStep => self.steps.iter().any(StepOutcome::shrank),
            Policy::WholePass => {
                self.end <= self.start && self.steps.iter().any(StepOutcome::succeeded)
            }
        }
    }
}

/// The ordered steps whose tool is available, bound to the tool paths
#[derive(Clone, Debug)]
pub struct Pipeline {
    policy: Policy,
    steps: Vec<(Step, PathBuf)>,
}

impl Pipeline {
    pub fn new(tools: &ToolSet, settings: &Settings) -> Self {
        let steps = steps(settings)
            .into_iter()
            .filter_map(|step| {
                let path = tools.get(step.tool)?.to_owned();
                Some((step, path))
            })
            .collect();

        Pipeline {
            policy: settings.policy,
            steps,
        }
    }

    /// The commands a pass over `target` runs, in order
    pub fn invocations(&self, target: &Path) -> Vec<Invocation> {
        self.steps
            .iter()
            .map(|(step, program)| Invocation::new(program).args(&step.args).arg(target))
            .collect()
    }

    /// Runs every step once against `target`
    pub fn execute<R>(&self, target: &Path, runner: &mut R) -> PassReport
    where
        R: Runner + ?Sized,
    {
        let start = file_size(target);
        let mut size = start;
        let mut outcomes = Vec::with_capacity(self.steps.len());

        for ((step, _), invocation) in self.steps.iter().zip(self.invocations(target)) {
            let before = size;
            let status = runner.run(&invocation);
            size = file_size(target);

            let outcome = StepOutcome {
                tool: step.tool,
                status,
                before,
                after: size,
            };
            log::debug!(
                "{} {:?}: exit {}, {} -> {} bytes",
                step.tool.name(),
                step.args,
                status,
                before,
                size
            );
            outcomes.push(outcome);
        }

        eprintln!("Size: {} bytes", size);

        PassReport {
            start,
            end: size,
            steps: outcomes,
        }
    }

    /// Runs one pass, returns whether it made the file smaller
    pub fn run_pass<R>(&self, target: &Path, runner: &mut R) -> bool
    where
        R: Runner + ?Sized,
    {
        self.execute(target, runner).shrank(self.policy)
    }
}
