use std::fmt;

use semver::{Version, VersionReq};

use crate::{Result, SchemaError};

/// Script API version a system declares when it registers
///
/// A system built for `major.minor` runs on any engine API with the same major
/// version and a minor version at least as new.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiVersion {
    pub major: u64,
    pub minor: u64,
}

impl ApiVersion {
    pub fn new(major: u64, minor: u64) -> Self {
        Self { major, minor }
    }

    /// Requirement an engine version must satisfy to host this API version
    pub fn requirement(&self) -> Result<VersionReq> {
        let text = format!(">={}.{}.0, <{}.0.0", self.major, self.minor, self.major + 1);
        VersionReq::parse(&text).map_err(|e| SchemaError::InvalidVersion(text, e))
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Check that an engine API version can host a system requesting `requested`
pub fn check_api_compatibility(
    context: &str,
    requested: ApiVersion,
    engine_version: &str,
) -> Result<()> {
    let engine = Version::parse(engine_version)
        .map_err(|e| SchemaError::InvalidVersion(engine_version.to_string(), e))?;

    if requested.requirement()?.matches(&engine) {
        Ok(())
    } else {
        Err(SchemaError::IncompatibleVersion(format!(
            "{}: requested script API {} is not supported by engine API {}",
            context, requested, engine_version
        )))
    }
}
