use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{bail, Context, Result};
use clap::{crate_description, crate_version, value_parser, Arg, ArgAction, ArgMatches, Command};
use regex::Regex;

pub mod backup;
pub mod config;
pub mod error;
pub mod exec;
pub mod passes;
pub mod pipeline;
pub mod probe;
pub mod tool;
mod util;

pub use crate::error::Error;
pub use crate::exec::{Invocation, ProcessRunner, Runner};
pub use crate::passes::{optimize, PassSummary};
pub use crate::pipeline::{Pipeline, Policy, Settings};
pub use crate::tool::{SearchPath, Tool, ToolSet};

use crate::config::Config;

const EXAMPLES: &str = "

EXAMPLES

`optimz ./a.out`          - one pass over ./a.out, original kept as ./a.out.bak
`optimz ./a.out -3`       - up to three passes, stopping once nothing shrinks
`optimz ./a.out -q`       - same, without echoing each tool invocation";

pub fn app() -> Command {
    let after_help = format!(
        "Tools are looked up in PATH: {}. Settings may also be read from `{}` in the target's \
         directory or any of its parents.{}",
        tool::searched_names(),
        config::FILE_NAME,
        EXAMPLES
    );

    Command::new("optimz")
        .about(crate_description!())
        .version(crate_version!())
        .arg(
            Arg::new("target")
                .required(true)
                .value_name("PROGRAM")
                .value_parser(value_parser!(PathBuf))
                .help("ELF executable to shrink in place"),
        )
        .arg(
            Arg::new("passes")
                .value_name("-TIMES")
                .allow_hyphen_values(true)
                .help("Maximum number of passes, e.g. `-2` [default: 1]"),
        )
        .arg(
            Arg::new("quiet")
                .long("quiet")
                .short('q')
                .action(ArgAction::SetTrue)
                .help("Don't print the tool invocations"),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .action(ArgAction::SetTrue)
                .help("Use verbose output"),
        )
        .arg(
            Arg::new("policy")
                .long("policy")
                .value_name("POLICY")
                .value_parser(Policy::NAMES)
                .help("How a pass decides it made progress [default: any-step]"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("FILE")
                .value_parser(value_parser!(PathBuf))
                .help("Read settings from FILE instead of searching for optimz.toml"),
        )
        .after_help(after_help)
}

/// Parses `-<N>`; `None` means the argument was absent
pub fn parse_passes(arg: Option<&str>) -> Result<Option<i64>> {
    let arg = match arg {
        Some(arg) => arg,
        None => return Ok(None),
    };

    if !arg.starts_with('-') {
        bail!("Second argument must be -<times> (e.g., -2)");
    }

    let re = Regex::new(r"^-([+-]?[0-9]+)$").expect("BUG: Malformed Regex");
    let count = re
        .captures(arg)
        .and_then(|cs| cs.get(1))
        .and_then(|m| m.as_str().parse::<i64>().ok());

    match count {
        Some(count) => Ok(Some(count)),
        None => bail!("Invalid optimization count: {}", arg),
    }
}

fn config_for(target: &Path, explicit: Option<&PathBuf>) -> Result<Config> {
    if let Some(path) = explicit {
        return Config::load(path);
    }

    let dir = target
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let dir = fs::canonicalize(dir).unwrap_or_else(|_| dir.to_owned());

    match Config::find(&dir)? {
        Some((path, config)) => {
            log::debug!("using configuration from {}", path.display());
            Ok(config)
        }
        None => Ok(Config::default()),
    }
}

pub fn run(matches: ArgMatches) -> Result<i32> {
    let target = matches
        .get_one::<PathBuf>("target")
        .context("missing <PROGRAM> argument")?
        .clone();
    let requested = parse_passes(matches.get_one::<String>("passes").map(String::as_str))?;

    probe::check(&target)?;

    let config = config_for(&target, matches.get_one::<PathBuf>("config"))?;

    let mut search = SearchPath::from_env();
    search.prepend(config.search_paths.iter().cloned());

    let tools = ToolSet::detect(&search, &config.tools);
    if tools.is_empty() {
        return Err(Error::NoTools {
            searched: tool::searched_names(),
        }
        .into());
    }

    let defaults = Settings::default();
    let policy = match matches.get_one::<String>("policy") {
        Some(name) => name.parse()?,
        None => config.policy.unwrap_or_default(),
    };
    let settings = Settings {
        policy,
        remove_sections: config.remove_sections.unwrap_or(defaults.remove_sections),
        upx_args: config.upx_args.unwrap_or(defaults.upx_args),
    };
    let pipeline = Pipeline::new(&tools, &settings);

    let passes = passes::clamp(requested.or(config.passes).unwrap_or(1));
    let quiet = matches.get_flag("quiet") || config.quiet.unwrap_or(false);

    backup::ensure_backup(&target)?;

    let mut runner = ProcessRunner::new(quiet);
    let summary = optimize(&target, &pipeline, &mut runner, passes);
    log::debug!(
        "{}/{} pass(es) over {}{}: {} -> {} bytes",
        summary.completed,
        summary.requested,
        target.display(),
        if summary.stopped_early { ", stopped early" } else { "" },
        summary.initial_size,
        summary.final_size
    );

    Ok(0)
}

/// Entry point of the `optimz` binary
///
/// Every failure, including usage errors, exits with status 1.
pub fn exec() -> ! {
    let matches = match app().try_get_matches() {
        Ok(matches) => matches,
        Err(e) => {
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            process::exit(code)
        }
    };

    let filter = if matches.get_flag("verbose") {
        "debug"
    } else {
        "warn"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter))
        .format_timestamp(None)
        .format_target(false)
        .init();

    match run(matches) {
        Err(e) => {
            eprintln!("error: {:#}", e);
            process::exit(1)
        }
        Ok(ec) => process::exit(ec),
    }
}
