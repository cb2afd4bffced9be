use std::fs::{self, File};
use std::io::Read;
use std::path::Path;

use crate::error::Error;

/// `\x7fELF`
pub const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];

/// Whether `path` is something we are willing to shrink
pub fn is_candidate(path: &Path) -> bool {
    check(path).is_ok()
}

/// Like `is_candidate` but reports which precondition failed
pub fn check(path: &Path) -> Result<(), Error> {
    let meta = match fs::metadata(path) {
        Ok(meta) => meta,
        Err(_) => return Err(Error::TargetNotFound(path.to_owned())),
    };

    if !meta.is_file() || !is_executable(path) {
        return Err(Error::NotExecutable(path.to_owned()));
    }

    if !has_elf_magic(path) {
        return Err(Error::NotElf(path.to_owned()));
    }

    Ok(())
}

// NOTE any read error, including a file shorter than the magic, counts as "not ELF"
fn has_elf_magic(path: &Path) -> bool {
    let mut prefix = [0; 4];

    File::open(path)
        .and_then(|mut f| f.read_exact(&mut prefix))
        .map(|_| prefix == ELF_MAGIC)
        .unwrap_or(false)
}

/// Whether the effective user may execute `path`, as `faccessat(2)` with `X_OK` and
/// `AT_EACCESS` reports it
#[cfg(unix)]
pub(crate) fn is_executable(path: &Path) -> bool {
    use rustix::fs::{accessat, Access, AtFlags, CWD};

    accessat(CWD, path, Access::EXEC_OK, AtFlags::EACCESS).is_ok()
}

#[cfg(not(unix))]
pub(crate) fn is_executable(_path: &Path) -> bool {
    true
}
