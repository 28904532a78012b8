use std::sync::Arc;
use std::time::{Duration, Instant};

use sqlx::PgPool;
use testcontainers::core::wait::LogWaitStrategy;
use testcontainers::core::{ContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ContainerRequest, GenericImage, ImageExt, TestcontainersError};

use scratchdb_common::{
    BootstrapError, BootstrapEvent, BootstrapObserver, LogStream, ProvisionRequest, Result,
    TracingObserver,
};

use crate::endpoint::Endpoint;
use crate::readiness::{wait_until_listening, ContainerListenProbe, HostTcpProbe, PortProbe};

/// A running, reachable, connected database.
///
/// Dropping it drops the container handle, which stops and removes the
/// container. Keep it alive for as long as the tests use the pool.
pub struct ProvisionedDatabase {
    endpoint: Endpoint,
    connection_url: String,
    pool: PgPool,
    container: ContainerAsync<GenericImage>,
}

impl ProvisionedDatabase {
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Full URL including the password.
    pub fn connection_url(&self) -> &str {
        &self.connection_url
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn container(&self) -> &ContainerAsync<GenericImage> {
        &self.container
    }

    pub fn into_parts(self) -> (PgPool, ContainerAsync<GenericImage>) {
        (self.pool, self.container)
    }
}

impl std::fmt::Debug for ProvisionedDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvisionedDatabase")
            .field("endpoint", &self.endpoint)
            .field("container", &self.container.id())
            .finish_non_exhaustive()
    }
}

/// Launches disposable Postgres containers and waits until they can be used.
#[derive(Clone)]
pub struct Provisioner {
    observer: Arc<dyn BootstrapObserver>,
}

impl Default for Provisioner {
    fn default() -> Self {
        Self::new(Arc::new(TracingObserver))
    }
}

impl Provisioner {
    pub fn new(observer: Arc<dyn BootstrapObserver>) -> Self {
        Self { observer }
    }

    pub fn observer(&self) -> &dyn BootstrapObserver {
        self.observer.as_ref()
    }

    /// Launch, wait for the ready log line AND a listening port, resolve the
    /// mapped endpoint, then connect.
    ///
    /// Nothing is retried. An error after launch drops the container.
    pub async fn provision(&self, request: &ProvisionRequest) -> Result<ProvisionedDatabase> {
        request.validate()?;

        let image = request.image.to_string();
        self.observer.on_event(&BootstrapEvent::Launching {
            image: &image,
            port: request.exposed_port,
        });

        let started = Instant::now();
        let container = container_request(request)
            .start()
            .await
            .map_err(|e| launch_error(&image, e))?;
        self.observer
            .on_event(&BootstrapEvent::LogSignalSeen { image: &image });

        let endpoint = resolve_endpoint(&container, request.exposed_port).await?;
        self.observer.on_event(&BootstrapEvent::PortMapped {
            container_port: request.exposed_port,
            host: &endpoint.host,
            host_port: endpoint.port,
        });

        let in_container = ContainerListenProbe::new(&container, request.exposed_port);
        let on_host = HostTcpProbe::new(endpoint.clone());
        let probes: [&dyn PortProbe; 2] = [&in_container, &on_host];
        let attempts = wait_until_listening(
            &probes,
            request.readiness.poll_interval,
            remaining_budget(request.startup_timeout, started.elapsed()),
        )
        .await?;
        self.observer.on_event(&BootstrapEvent::PortListening {
            host: &endpoint.host,
            host_port: endpoint.port,
            attempts,
        });

        let database = request.database.as_deref();
        let connection_url = endpoint.connection_url(&request.credentials, database);
        let redacted = endpoint.redacted_url(&request.credentials, database);

        let pool = PgPool::connect(&connection_url)
            .await
            .map_err(|source| BootstrapError::ConnectionFailure {
                url: redacted.clone(),
                source,
            })?;
        self.observer
            .on_event(&BootstrapEvent::Connected { url: &redacted });

        Ok(ProvisionedDatabase {
            endpoint,
            connection_url,
            pool,
            container,
        })
    }
}

/// Provision with the default `tracing`-backed observer.
pub async fn provision(request: &ProvisionRequest) -> Result<ProvisionedDatabase> {
    Provisioner::default().provision(request).await
}

/// Translate a request into a container launch: image, exposed port, log wait, env.
pub fn container_request(request: &ProvisionRequest) -> ContainerRequest<GenericImage> {
    let readiness = &request.readiness;
    let marker = match readiness.log_stream {
        LogStream::Stdout => LogWaitStrategy::stdout(&readiness.log_marker),
        LogStream::Stderr => LogWaitStrategy::stderr(&readiness.log_marker),
    };
    let log_wait = WaitFor::log(marker.with_times(readiness.log_occurrences));

    let mut container = GenericImage::new(request.image.name.as_str(), request.image.tag.as_str())
        .with_exposed_port(ContainerPort::Tcp(request.exposed_port))
        .with_wait_for(log_wait)
        .with_env_var("POSTGRES_USER", &request.credentials.username)
        .with_env_var("POSTGRES_PASSWORD", &request.credentials.password);

    if let Some(db) = &request.database {
        container = container.with_env_var("POSTGRES_DB", db);
    }
    if let Some(timeout) = request.startup_timeout {
        container = container.with_startup_timeout(timeout);
    }
    container
}

/// What is left of the startup budget once launch and the log wait have used
/// `spent`. An exhausted budget still allows one probe round.
fn remaining_budget(total: Option<Duration>, spent: Duration) -> Option<Duration> {
    total.map(|limit| limit.saturating_sub(spent))
}

fn launch_error(image: &str, e: TestcontainersError) -> BootstrapError {
    match e {
        TestcontainersError::WaitContainer(wait) => BootstrapError::ReadinessTimeout {
            reason: format!("ready log line never observed for {image}: {wait}"),
        },
        source => BootstrapError::LaunchFailure {
            image: image.to_string(),
            source,
        },
    }
}

async fn resolve_endpoint(
    container: &ContainerAsync<GenericImage>,
    container_port: u16,
) -> Result<Endpoint> {
    let port_err = |source| BootstrapError::PortResolutionFailure {
        port: container_port,
        source,
    };

    let host = container.get_host().await.map_err(port_err)?;
    let host_port = container
        .get_host_port_ipv4(ContainerPort::Tcp(container_port))
        .await
        .map_err(port_err)?;

    Ok(Endpoint::new(host.to_string(), host_port))
}

#[cfg(test)]
mod tests {
    use super::*;
    use scratchdb_common::{Credentials, ImageRef, ReadinessPlan};

    fn request() -> ProvisionRequest {
        ProvisionRequest::builder()
            .credentials(Credentials::new("app", "secret"))
            .database("app_test")
            .build()
    }

    #[test]
    fn container_request_carries_image_port_and_env() {
        let container = container_request(&request());
        assert_eq!(container.descriptor(), "postgis/postgis:latest");
        assert_eq!(container.expose_ports(), &[ContainerPort::Tcp(5432)]);

        let env: Vec<(String, String)> = container
            .env_vars()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert!(env.contains(&("POSTGRES_USER".into(), "app".into())));
        assert!(env.contains(&("POSTGRES_PASSWORD".into(), "secret".into())));
        assert!(env.contains(&("POSTGRES_DB".into(), "app_test".into())));
    }

    #[test]
    fn container_request_waits_on_configured_log_stream() {
        let req = ProvisionRequest::builder()
            .credentials(Credentials::postgres_default())
            .image(ImageRef::new("postgres", "16-alpine"))
            .readiness(
                ReadinessPlan::builder()
                    .log_stream(LogStream::Stdout)
                    .log_marker("ready")
                    .build(),
            )
            .startup_timeout(Duration::from_secs(5))
            .build();

        let container = container_request(&req);
        let waits = container.ready_conditions();
        assert_eq!(waits.len(), 1);
        assert!(matches!(waits[0], WaitFor::Log(_)));
        assert_eq!(container.startup_timeout(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn port_wait_gets_only_what_launch_left_of_the_budget() {
        let limit = Some(Duration::from_secs(60));
        assert_eq!(
            remaining_budget(limit, Duration::from_secs(45)),
            Some(Duration::from_secs(15))
        );
        assert_eq!(
            remaining_budget(limit, Duration::from_secs(75)),
            Some(Duration::ZERO)
        );
        assert_eq!(remaining_budget(None, Duration::from_secs(600)), None);
    }

    #[tokio::test]
    async fn invalid_request_fails_before_launch() {
        let req = ProvisionRequest::builder()
            .credentials(Credentials::new("", ""))
            .build();
        let err = Provisioner::new(Arc::new(scratchdb_common::SilentObserver))
            .provision(&req)
            .await
            .unwrap_err();
        assert_eq!(err.stage(), scratchdb_common::Stage::Configure);
    }
}
