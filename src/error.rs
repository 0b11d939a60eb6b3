//! The harness error type.

use std::{fmt, io, path::PathBuf, time::Duration};

use strum::AsRefStr;
use thiserror::Error;

/// Convenience `Result` alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Boxed source error, so that any store backend can raise a query error.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The harness error type.
///
/// Variants group into the classes the runner cares about: infrastructure
/// errors abort the whole run before any case executes, query and fixture
/// errors error a single case, an assertion mismatch fails it.
#[derive(Error, AsRefStr)]
pub enum Error {
    /// The database container could not be created or started.
    #[error("database container failed to start")]
    ContainerStart(#[source] testcontainers::TestcontainersError),

    /// The database did not accept connections within the startup timeout.
    #[error("database not ready within {0:?}")]
    StartupTimeout(Duration),

    /// The database container could not be stopped or removed.
    #[error("database container failed to stop")]
    ContainerStop(#[source] testcontainers::TestcontainersError),

    /// A client connection could not be established.
    #[error("could not connect to `{url}`")]
    Connect {
        /// The URL connection was attempted against.
        url: String,
        #[source]
        source: tokio_postgres::Error,
    },

    /// A connection variable is missing, the database was likely not configured.
    #[error("{0} not set; was the database configured before connecting?")]
    MissingEnv(&'static str),

    /// A statement failed against a table: constraint violation, connection loss, ...
    #[error("query failed on table `{table}`")]
    Query {
        /// The table the statement targeted.
        table: String,
        #[source]
        source: BoxError,
    },

    /// A data-set file could not be read.
    #[error("could not read data set `{path}`")]
    FixtureRead {
        /// Path of the data-set file.
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A data-set document is not valid YAML.
    #[error("could not parse data set `{name}`")]
    FixtureParse {
        /// Name of the data set.
        name: String,
        #[source]
        source: serde_yaml::Error,
    },

    /// A data-set document is well-formed YAML of the wrong shape.
    #[error("malformed data set `{name}`: {detail}")]
    FixtureShape {
        /// Name of the data set.
        name: String,
        /// What was wrong with it.
        detail: String,
    },

    /// An export artifact could not be serialized or written.
    #[error("could not write export artifact `{path}`")]
    ExportWrite {
        /// Path of the artifact.
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    /// A row count differed from the expected value.
    #[error("expected {expected} rows in `{table}`, found {actual}")]
    Assertion {
        /// The table that was counted.
        table: String,
        /// The expected row count.
        expected: i64,
        /// The observed row count.
        actual: i64,
    },
}

impl Error {
    pub(crate) fn query(table: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Query {
            table: table.into(),
            source: source.into(),
        }
    }

    /// Whether this error fails a case (assertion mismatch) rather than erroring it.
    pub fn is_assertion(&self) -> bool {
        matches!(self, Self::Assertion { .. })
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let variant = self.as_ref();
        write!(f, "{variant}: {self}")
    }
}

#[cfg(test)]
mod tests {
    use super::Error;

    #[test]
    fn debug_prints_variant_and_message() {
        let err = Error::Assertion {
            table: "example.pet".to_string(),
            expected: 1,
            actual: 3,
        };
        assert_eq!(
            format!("{err:?}"),
            "Assertion: expected 1 rows in `example.pet`, found 3"
        );
        assert!(err.is_assertion());
        assert!(!Error::MissingEnv("SOME_VAR").is_assertion());
    }
}
