//! Purpose: C ABI bridge for hosts and tools written in other languages.
//! Exports: `rtdebug_header`, `rtdebug_is_populated`, `rtdebug_executable_path`,
//!   `rtdebug_string_free`, and the `rtdebug_error_*` accessors.
//! Role: Thin wrappers over `runtime` and `core::exe_path`; no logic of their own.
//! Invariants: Returned strings and errors are heap-owned by the caller and freed through the
//!   matching `*_free` function.
//! Invariants: Error kinds use the same codes as the CLI exit codes.
#![allow(non_camel_case_types)]

use std::ffi::{CString, c_char};
use std::path::PathBuf;
use std::ptr;

use crate::core::error::{Error, ErrorKind, to_exit_code};
use crate::core::exe_path::executable_path;
use crate::core::header::DebugHeader;
use crate::runtime::RuntimeDebugHeader;

#[repr(C)]
pub struct rtdebug_error {
    kind: i32,
    message: *mut c_char,
}

#[unsafe(no_mangle)]
pub extern "C" fn rtdebug_header() -> *const DebugHeader {
    &RuntimeDebugHeader
}

#[unsafe(no_mangle)]
pub extern "C" fn rtdebug_is_populated() -> u8 {
    if RuntimeDebugHeader.is_published() { 1 } else { 0 }
}

#[unsafe(no_mangle)]
pub extern "C" fn rtdebug_executable_path(
    out_path: *mut *mut c_char,
    out_err: *mut *mut rtdebug_error,
) -> i32 {
    if out_path.is_null() {
        return fail(
            out_err,
            Error::new(ErrorKind::Usage).with_message("out_path is null"),
        );
    }
    let path = match executable_path() {
        Ok(path) => path,
        Err(err) => return fail(out_err, err),
    };
    let raw = match path_to_c_string(path) {
        Ok(raw) => raw,
        Err(err) => return fail(out_err, err),
    };
    unsafe {
        *out_path = raw.into_raw();
    }
    0
}

#[unsafe(no_mangle)]
pub extern "C" fn rtdebug_string_free(value: *mut c_char) {
    if value.is_null() {
        return;
    }
    unsafe {
        drop(CString::from_raw(value));
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn rtdebug_error_kind(err: *const rtdebug_error) -> i32 {
    if err.is_null() {
        return 0;
    }
    unsafe { (*err).kind }
}

#[unsafe(no_mangle)]
pub extern "C" fn rtdebug_error_message(err: *const rtdebug_error) -> *const c_char {
    if err.is_null() {
        return ptr::null();
    }
    unsafe { (*err).message }
}

#[unsafe(no_mangle)]
pub extern "C" fn rtdebug_error_free(err: *mut rtdebug_error) {
    if err.is_null() {
        return;
    }
    unsafe {
        let err = Box::from_raw(err);
        rtdebug_string_free(err.message);
    }
}

fn fail(out_err: *mut *mut rtdebug_error, err: Error) -> i32 {
    if out_err.is_null() {
        return -1;
    }
    let error = Box::new(rtdebug_error {
        kind: to_exit_code(err.kind()),
        message: to_c_string(&err.to_string()),
    });
    unsafe {
        *out_err = Box::into_raw(error);
    }
    -1
}

/// Hands the path bytes over unchanged; a lossy conversion would name a different file.
#[cfg(unix)]
fn path_to_c_string(path: PathBuf) -> Result<CString, Error> {
    use std::os::unix::ffi::OsStringExt;
    CString::new(path.into_os_string().into_vec()).map_err(|err| {
        Error::new(ErrorKind::PathResolution)
            .with_message("executable path contains a NUL byte")
            .with_source(err)
    })
}

#[cfg(not(unix))]
fn path_to_c_string(path: PathBuf) -> Result<CString, Error> {
    let text = path.to_str().ok_or_else(|| {
        Error::new(ErrorKind::PathResolution)
            .with_message(format!("executable path {} is not valid UTF-8", path.display()))
    })?;
    CString::new(text).map_err(|err| {
        Error::new(ErrorKind::PathResolution)
            .with_message("executable path contains a NUL byte")
            .with_source(err)
    })
}

fn to_c_string(input: &str) -> *mut c_char {
    CString::new(input)
        .map(|s| s.into_raw())
        .unwrap_or(ptr::null_mut())
}

#[cfg(test)]
mod tests {
    use super::{
        rtdebug_error, rtdebug_error_free, rtdebug_error_kind, rtdebug_error_message,
        rtdebug_executable_path, rtdebug_header, rtdebug_string_free,
    };
    use crate::core::format::{COOKIE, MAJOR_VERSION};
    use std::ffi::{CStr, c_char};
    use std::ptr;

    #[test]
    fn header_pointer_is_the_exported_symbol() {
        let header = unsafe { &*rtdebug_header() };
        assert_eq!(header.cookie(), COOKIE);
        assert_eq!(header.major_version(), MAJOR_VERSION);
        assert_eq!(
            rtdebug_header(),
            &crate::runtime::RuntimeDebugHeader as *const _
        );
    }

    #[test]
    fn executable_path_round_trips_through_c_string() {
        let mut path: *mut c_char = ptr::null_mut();
        let mut err: *mut rtdebug_error = ptr::null_mut();
        let rc = rtdebug_executable_path(&mut path, &mut err);
        assert_eq!(rc, 0);
        assert!(err.is_null());
        let text = unsafe { CStr::from_ptr(path) }.to_str().expect("utf8").to_string();
        assert!(std::path::Path::new(&text).is_absolute());
        rtdebug_string_free(path);
    }

    #[test]
    fn executable_path_bytes_match_the_resolved_path() {
        let mut path: *mut c_char = ptr::null_mut();
        let mut err: *mut rtdebug_error = ptr::null_mut();
        assert_eq!(rtdebug_executable_path(&mut path, &mut err), 0);
        let returned = unsafe { CStr::from_ptr(path) }.to_bytes().to_vec();
        rtdebug_string_free(path);

        let resolved = crate::core::exe_path::executable_path().expect("resolve");
        assert_eq!(returned, resolved.as_os_str().as_encoded_bytes());
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_paths_keep_their_raw_bytes() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let raw = b"/tmp/\xffexe";
        let path = std::path::Path::new(OsStr::from_bytes(raw)).to_path_buf();
        let converted = super::path_to_c_string(path).expect("convert");
        assert_eq!(converted.as_bytes(), &raw[..]);

        let nul = std::path::PathBuf::from(OsStr::from_bytes(b"/tmp/a\0b"));
        let err = super::path_to_c_string(nul).expect_err("nul");
        assert_eq!(err.kind(), crate::core::error::ErrorKind::PathResolution);
    }

    #[test]
    fn null_out_path_reports_usage_error() {
        let mut err: *mut rtdebug_error = ptr::null_mut();
        let rc = rtdebug_executable_path(ptr::null_mut(), &mut err);
        assert_eq!(rc, -1);
        assert_eq!(rtdebug_error_kind(err), 2);
        let message = unsafe { CStr::from_ptr(rtdebug_error_message(err)) };
        assert!(message.to_str().unwrap().contains("out_path is null"));
        rtdebug_error_free(err);
    }

    #[test]
    fn null_out_err_still_returns_failure() {
        assert_eq!(rtdebug_executable_path(ptr::null_mut(), ptr::null_mut()), -1);
    }
}
