//! Purpose: Resolve the absolute, symlink-free path of the current executable.
//! Exports: `executable_path`.
//! Role: Stateless collaborator used by tooling and the C ABI; unrelated to the header data flow.
//! Invariants: Failure is always reported as `ErrorKind::PathResolution`, never a default path.
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::error::{Error, ErrorKind};

pub fn executable_path() -> Result<PathBuf, Error> {
    #[cfg(target_os = "linux")]
    {
        resolve(Path::new("/proc/self/exe"), exec_fn_from_auxv)
    }
    #[cfg(any(target_os = "freebsd", target_os = "netbsd", target_os = "dragonfly"))]
    {
        resolve(Path::new("/proc/curproc/exe"), current_exe)
    }
    #[cfg(not(any(
        target_os = "linux",
        target_os = "freebsd",
        target_os = "netbsd",
        target_os = "dragonfly"
    )))]
    {
        current_exe().and_then(|path| canonical(&path))
    }
}

/// Canonicalizes `primary`, falling back to the path produced by `fallback`.
#[cfg_attr(
    not(any(
        target_os = "linux",
        target_os = "freebsd",
        target_os = "netbsd",
        target_os = "dragonfly"
    )),
    allow(dead_code)
)]
fn resolve(
    primary: &Path,
    fallback: impl FnOnce() -> Result<PathBuf, Error>,
) -> Result<PathBuf, Error> {
    match fs::canonicalize(primary) {
        Ok(path) => Ok(path),
        Err(err) => {
            tracing::debug!(path = %primary.display(), error = %err, "primary executable link unusable");
            let candidate = fallback()?;
            canonical(&candidate)
        }
    }
}

fn canonical(path: &Path) -> Result<PathBuf, Error> {
    fs::canonicalize(path).map_err(|err| {
        Error::new(ErrorKind::PathResolution)
            .with_message(format!("cannot resolve {}", path.display()))
            .with_source(err)
    })
}

#[cfg_attr(target_os = "linux", allow(dead_code))]
fn current_exe() -> Result<PathBuf, Error> {
    std::env::current_exe().map_err(|err| {
        Error::new(ErrorKind::PathResolution)
            .with_message("executable path is unavailable on this platform")
            .with_source(err)
    })
}

/// `AT_EXECFN` is unreliable when the process runs as a shebang interpreter,
/// so it is only a fallback.
#[cfg(target_os = "linux")]
fn exec_fn_from_auxv() -> Result<PathBuf, Error> {
    use std::ffi::{CStr, OsStr};
    use std::io;
    use std::os::unix::ffi::OsStrExt;

    let raw = unsafe { libc::getauxval(libc::AT_EXECFN) } as *const libc::c_char;
    if raw.is_null() {
        return Err(Error::new(ErrorKind::PathResolution)
            .with_message("AT_EXECFN is not present in the aux vector")
            .with_source(io::Error::last_os_error()));
    }
    let bytes = unsafe { CStr::from_ptr(raw) }.to_bytes();
    Ok(PathBuf::from(OsStr::from_bytes(bytes)))
}

#[cfg(test)]
mod tests {
    use super::{canonical, executable_path, resolve};
    use crate::core::error::{Error, ErrorKind};
    use std::path::{Path, PathBuf};

    #[test]
    fn executable_path_is_absolute_and_exists() {
        let path = executable_path().expect("exe path");
        assert!(path.is_absolute());
        assert!(path.exists());
    }

    #[test]
    fn failing_primary_and_fallback_is_reported() {
        let err = resolve(Path::new("/definitely/not/here/exe"), || {
            Err(Error::new(ErrorKind::PathResolution).with_message("no fallback"))
        })
        .expect_err("should fail");
        assert_eq!(err.kind(), ErrorKind::PathResolution);
    }

    #[test]
    fn fallback_that_does_not_exist_is_reported() {
        let err = resolve(Path::new("/definitely/not/here/exe"), || {
            Ok(PathBuf::from("/also/not/here"))
        })
        .expect_err("should fail");
        assert_eq!(err.kind(), ErrorKind::PathResolution);
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn fallback_is_used_when_primary_is_missing() {
        let temp = tempfile::tempdir().expect("tempdir");
        let target = temp.path().join("tool");
        std::fs::write(&target, b"").expect("write");
        let expected = canonical(&target).expect("canonical");
        let resolved = resolve(Path::new("/definitely/not/here/exe"), || Ok(target.clone()))
            .expect("resolve");
        assert_eq!(resolved, expected);
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_resolved() {
        let temp = tempfile::tempdir().expect("tempdir");
        let target = temp.path().join("real");
        std::fs::write(&target, b"").expect("write");
        let link = temp.path().join("link");
        std::os::unix::fs::symlink(&target, &link).expect("symlink");

        let resolved = resolve(&link, || unreachable!("primary resolves")).expect("resolve");
        assert_eq!(resolved, canonical(&target).expect("canonical"));
    }
}
