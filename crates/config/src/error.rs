//! Config error types.

use figment::providers::{Format, Toml};
use std::{collections::HashSet, error::Error, fmt};

/// Error returned when extracting a [`BridgeConfig`](crate::BridgeConfig) fails.
///
/// Figment may report the same problem once per provider, so duplicates are removed when
/// displayed.
#[derive(Clone, Debug, PartialEq)]
pub struct ExtractConfigError {
    pub(crate) error: figment::Error,
}

impl ExtractConfigError {
    /// Wraps the figment error
    pub fn new(error: figment::Error) -> Self {
        Self { error }
    }

    /// The key path the error occurred at, like `["popup", "width"]`.
    pub fn path(&self) -> &[String] {
        &self.error.path
    }
}

impl fmt::Display for ExtractConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut unique = HashSet::with_capacity(self.error.count());
        writeln!(f, "failed to extract wallet bridge config:")?;
        for err in self.error.clone() {
            let from_toml = err
                .metadata
                .as_ref()
                .map(|meta| meta.name.contains(Toml::NAME))
                .unwrap_or_default();
            let line = if from_toml {
                format!("{err} in {}", crate::BridgeConfig::FILE_NAME)
            } else {
                err.to_string()
            };
            if unique.insert(line.clone()) {
                writeln!(f, "{line}")?;
            }
        }
        Ok(())
    }
}

impl Error for ExtractConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Error::source(&self.error)
    }
}
