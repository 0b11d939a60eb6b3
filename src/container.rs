//! Ephemeral PostgreSQL provisioning.
//!
//! One disposable instance per test run: [`PostgresImage`] describes it,
//! [`PostgresImage::start`] brings it up and blocks until it accepts
//! connections, [`EphemeralPostgres::stop`] releases it. Dropping the handle
//! releases the container as well, so an early-exiting suite does not leak
//! instances.

use std::time::Duration;

use log::{debug, info};
use testcontainers::{
    core::WaitFor, runners::AsyncRunner, ContainerAsync, GenericImage, ImageExt,
};
use tokio::time::Instant;
use tokio_postgres::NoTls;

use crate::{
    config::DbConfig,
    error::{Error, Result},
};

/// Lifecycle state of an ephemeral instance.
#[derive(Clone, Copy, PartialEq, Eq, Debug, strum::AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum State {
    Starting,
    Running,
    Stopped,
}

/// Builder for a disposable PostgreSQL instance.
///
/// ```no_run
/// # async fn demo() -> pgrider::Result<()> {
/// use pgrider::container::PostgresImage;
///
/// let mut pg = PostgresImage::default().database("example").start().await?;
/// pg.config().publish();
/// // ... run the suite ...
/// pg.stop().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct PostgresImage {
    repository: String,
    tag: String,
    database: String,
    user: String,
    password: String,
    startup_timeout: Duration,
}

impl Default for PostgresImage {
    fn default() -> Self {
        Self {
            repository: "postgres".to_string(),
            tag: "16-alpine".to_string(),
            database: "example".to_string(),
            user: "postgres".to_string(),
            password: "pgrider".to_string(),
            startup_timeout: Duration::from_secs(60),
        }
    }
}

impl PostgresImage {
    /// Use a different image repository and tag.
    pub fn image(mut self, repository: impl Into<String>, tag: impl Into<String>) -> Self {
        self.repository = repository.into();
        self.tag = tag.into();
        self
    }

    /// Name of the database to create.
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// Superuser credentials.
    pub fn credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = user.into();
        self.password = password.into();
        self
    }

    /// Upper bound on the whole bring-up: image pull, container start and
    /// the server accepting connections.
    pub fn startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    /// Start the container and block until the server accepts connections.
    ///
    /// Fails with an infrastructure error if the image cannot be pulled or
    /// the server is not ready within the startup timeout.
    pub async fn start(self) -> Result<EphemeralPostgres> {
        info!("starting {}:{}", self.repository, self.tag);
        let deadline = Instant::now() + self.startup_timeout;

        // The server logs "ready to accept connections" once during its
        // bootstrap phase already, before it listens on the socket; the
        // port line only appears when the real server is up.
        // (cf. testcontainers-rs #674)
        let image = GenericImage::new(self.repository.clone(), self.tag.clone())
            .with_wait_for(WaitFor::message_on_stderr("port 5432"))
            .with_env_var("POSTGRES_DB", self.database.as_str())
            .with_env_var("POSTGRES_USER", self.user.as_str())
            .with_env_var("POSTGRES_PASSWORD", self.password.as_str());

        let container = tokio::time::timeout_at(deadline, image.start())
            .await
            .map_err(|_| Error::StartupTimeout(self.startup_timeout))?
            .map_err(Error::ContainerStart)?;

        let host = container.get_host().await.map_err(Error::ContainerStart)?;
        let port = container
            .get_host_port_ipv4(5432)
            .await
            .map_err(Error::ContainerStart)?;
        let url = format!(
            "postgres://{}:{}@{host}:{port}/{}",
            self.user, self.password, self.database
        );

        let mut instance = EphemeralPostgres {
            container: Some(container),
            config: DbConfig {
                url,
                user: self.user,
                password: self.password,
            },
            state: State::Starting,
        };
        instance.await_ready(deadline, self.startup_timeout).await?;
        instance.state = State::Running;
        info!("database ready at {}", instance.config.url);
        Ok(instance)
    }
}

/// A running (or stopped) disposable PostgreSQL instance.
///
/// Exactly one is shared by all cases of a run; its committed state persists
/// across cases unless a fixture cleanup intervenes.
#[derive(Debug)]
pub struct EphemeralPostgres {
    container: Option<ContainerAsync<GenericImage>>,
    config: DbConfig,
    state: State,
}

impl EphemeralPostgres {
    /// Connection coordinates of this instance.
    pub fn config(&self) -> &DbConfig {
        &self.config
    }

    /// Current lifecycle state.
    pub fn state(&self) -> State {
        self.state
    }

    /// Stop the container and release its resources.
    ///
    /// Idempotent: calling it again after a stop is a no-op.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(container) = self.container.take() else {
            debug!("database container already stopped");
            return Ok(());
        };
        info!("stopping database container");
        self.state = State::Stopped;
        container.stop().await.map_err(Error::ContainerStop)?;
        container.rm().await.map_err(Error::ContainerStop)?;
        Ok(())
    }

    // The wait-for log line does not guarantee the server is past its
    // bootstrap restart, so poll with real connections until the deadline.
    async fn await_ready(&mut self, deadline: Instant, timeout: Duration) -> Result<()> {
        loop {
            match tokio_postgres::connect(&self.config.url, NoTls).await {
                Ok(_) => return Ok(()),
                Err(err) => debug!("database not ready yet: {err}"),
            }
            if Instant::now() >= deadline {
                return Err(Error::StartupTimeout(timeout));
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Scenario: bring-up does not finish in time; the run must abort with an
    // infrastructure error rather than hang. A zero timeout forces it
    // without needing a Docker daemon, though with one present the error may
    // surface as a container error instead.
    #[tokio::test]
    async fn zero_timeout_aborts_startup() {
        let err = PostgresImage::default()
            .startup_timeout(Duration::ZERO)
            .start()
            .await
            .unwrap_err();
        assert!(
            matches!(err, Error::StartupTimeout(_) | Error::ContainerStart(_)),
            "{err:?}"
        );
    }
}
