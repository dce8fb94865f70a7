//! Build metadata captured at compile time.
//!
//! Set `TDR_GIT_SHA` and `TDR_BUILD_TIME` in the build environment to stamp a
//! release; local builds fall back to the crate version.

const GIT_SHA: Option<&str> = option_env!("TDR_GIT_SHA");
const BUILD_TIME: Option<&str> = option_env!("TDR_BUILD_TIME");

/// Revision the binary was built from.
pub fn git_sha() -> &'static str {
    GIT_SHA.unwrap_or(env!("CARGO_PKG_VERSION"))
}

/// When the binary was built, empty if unknown.
pub fn build_time() -> &'static str {
    BUILD_TIME.unwrap_or("")
}

/// Build time followed by revision, e.g. `2024-05-01T10:00:00Zab12cd3`.
pub fn snapshot_tag() -> String {
    format!("{}{}", build_time(), git_sha())
}
