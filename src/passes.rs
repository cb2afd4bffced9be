use std::path::Path;

use crate::exec::Runner;
use crate::pipeline::Pipeline;
use crate::util::file_size;

/// Turns a requested pass count into one we can run: zero and negative counts mean one pass
pub fn clamp(requested: i64) -> u32 {
    requested.clamp(1, i64::from(u32::MAX)) as u32
}

/// How a run ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PassSummary {
    pub requested: u32,
    pub completed: u32,
    /// A pass made no progress before `requested` was reached
    pub stopped_early: bool,
    pub initial_size: u64,
    pub final_size: u64,
}

/// Repeats `pipeline` over `target` up to `passes` times, stopping after the first pass that
/// doesn't shrink the file
pub fn optimize<R>(target: &Path, pipeline: &Pipeline, runner: &mut R, passes: u32) -> PassSummary
where
    R: Runner + ?Sized,
{
    let passes = passes.max(1);
    let initial_size = file_size(target);
    let mut completed = 0;
    let mut stopped_early = false;

    for i in 1..=passes {
        eprintln!("Pass {}/{}", i, passes);
        let shrank = pipeline.run_pass(target, runner);
        completed = i;

        if !shrank {
            if i < passes {
                stopped_early = true;
            }
            eprintln!("No further changes; stopping early.");
            break;
        }
    }

    let final_size = file_size(target);
    eprintln!("Done.");

    PassSummary {
        requested: passes,
        completed,
        stopped_early,
        initial_size,
        final_size,
    }
}
