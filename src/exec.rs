use std::ffi::{OsStr, OsString};
use std::path::PathBuf;
use std::process::Command;

/// A program plus its arguments, each argument passed through as a single token
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

impl Invocation {
    pub fn new<P>(program: P) -> Self
    where
        P: Into<PathBuf>,
    {
        Invocation {
            program: program.into(),
            args: vec![],
        }
    }

    pub fn arg<S>(mut self, arg: S) -> Self
    where
        S: AsRef<OsStr>,
    {
        self.args.push(arg.as_ref().to_owned());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_owned()));
        self
    }

    pub fn command(&self) -> Command {
        let mut c = Command::new(&self.program);
        c.args(&self.args);
        c
    }
}

/// Something that can execute an `Invocation` and report its exit status
pub trait Runner {
    fn run(&mut self, invocation: &Invocation) -> i32;
}

/// Spawns real processes, inheriting stdout and stderr
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessRunner {
    pub quiet: bool,
}

impl ProcessRunner {
    pub fn new(quiet: bool) -> Self {
        ProcessRunner { quiet }
    }
}

impl Runner for ProcessRunner {
    fn run(&mut self, invocation: &Invocation) -> i32 {
        let mut command = invocation.command();

        if !self.quiet {
            eprintln!("[exec] {:?}", command);
        }

        match command.status() {
            // killed by a signal if there's no code
            Ok(status) => status.code().unwrap_or(1),
            Err(e) => {
                log::warn!("failed to execute {}: {}", invocation.program.display(), e);
                e.raw_os_error().filter(|&code| code != 0).unwrap_or(1)
            }
        }
    }
}
