//! Registration input validation.
//!
//! The hub checks a register request in a fixed order: version first, then
//! the adaptor name, then the endpoint. The first failing rule wins and
//! nothing is dialed or installed.
//!
//! # Qualified names
//!
//! A qualified name is an optional DNS subdomain prefix followed by `/` and
//! a name part:
//!
//! ```text
//! dummy
//! adaptors.example.io/ble
//! ```
//!
//! The name part is 1 to 63 characters, starts and ends with an ASCII
//! alphanumeric character and may contain `-`, `_` and `.` in between.

use std::ffi::OsStr;
use std::path::Path;

use crate::Error;
use crate::Result;
use crate::constants::{
    DNS_SUBDOMAIN_MAX_LENGTH, QUALIFIED_NAME_MAX_LENGTH, SOCKET_SUFFIX, SUPPORTED_VERSIONS,
};

/// Checks that `version` is one of [`SUPPORTED_VERSIONS`].
pub fn validate_version(version: &str) -> Result<()> {
    if SUPPORTED_VERSIONS.contains(&version) {
        return Ok(());
    }
    Err(Error::UnsupportedVersion {
        version: version.to_string(),
        supported: SUPPORTED_VERSIONS,
    })
}

/// Checks that `name` is a qualified name.
pub fn validate_qualified_name(name: &str) -> Result<()> {
    let unqualified = |reason: &str| Error::UnqualifiedName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    let mut parts = name.split('/');
    let (prefix, local) = match (parts.next(), parts.next(), parts.next()) {
        (Some(local), None, None) => (None, local),
        (Some(prefix), Some(local), None) => (Some(prefix), local),
        _ => return Err(unqualified("must contain at most one '/'")),
    };

    if let Some(prefix) = prefix {
        if prefix.is_empty() {
            return Err(unqualified("prefix part must be non-empty"));
        }
        if !is_dns_subdomain(prefix) {
            return Err(unqualified("prefix part must be a lowercase DNS subdomain"));
        }
    }

    if local.is_empty() {
        return Err(unqualified("name part must be non-empty"));
    }
    if local.len() > QUALIFIED_NAME_MAX_LENGTH {
        return Err(unqualified("name part must be no more than 63 characters"));
    }

    let bytes = local.as_bytes();
    let edges_ok = bytes[0].is_ascii_alphanumeric() && bytes[bytes.len() - 1].is_ascii_alphanumeric();
    let body_ok = bytes
        .iter()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'));
    if !edges_ok || !body_ok {
        return Err(unqualified(
            "name part must consist of alphanumeric characters, '-', '_' or '.', \
             and must start and end with an alphanumeric character",
        ));
    }

    Ok(())
}

/// Checks that `endpoint` names a socket file.
pub fn validate_endpoint(endpoint: &str) -> Result<()> {
    if is_socket_file(endpoint) {
        Ok(())
    } else {
        Err(Error::UnrecognizedEndpoint(endpoint.to_string()))
    }
}

/// Returns `true` if `filename` is a bare file name with a non-empty stem
/// and the socket suffix.
#[must_use]
pub fn is_socket_file(filename: &str) -> bool {
    let Some(stem) = filename.strip_suffix(SOCKET_SUFFIX) else {
        return false;
    };
    !stem.is_empty()
        && !filename.contains(['/', '\\'])
        && Path::new(filename).file_name() == Some(OsStr::new(filename))
}

fn is_dns_subdomain(value: &str) -> bool {
    if value.len() > DNS_SUBDOMAIN_MAX_LENGTH {
        return false;
    }
    value.split('.').all(|label| {
        let bytes = label.as_bytes();
        !bytes.is_empty()
            && is_lower_alnum(bytes[0])
            && is_lower_alnum(bytes[bytes.len() - 1])
            && bytes.iter().all(|&b| is_lower_alnum(b) || b == b'-')
    })
}

fn is_lower_alnum(b: u8) -> bool {
    b.is_ascii_lowercase() || b.is_ascii_digit()
}
