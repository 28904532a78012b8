//! Port-liveness half of the composite readiness check.
//!
//! The log half is handled by the container runtime (`WaitFor` on the image)
//! before the container handle is returned. A ready log line can precede the
//! listener binding, and a mapped host port can accept connections before the
//! server inside the container does, so the port has to be probed from both
//! sides before anyone connects.

use std::time::Duration;

use async_trait::async_trait;
use testcontainers::core::error::ExecError;
use testcontainers::core::{CmdWaitFor, ExecCommand};
use testcontainers::{ContainerAsync, GenericImage, TestcontainersError};
use tokio::net::TcpStream;
use tokio::time::Instant;

use scratchdb_common::{BootstrapError, Result};

use crate::endpoint::Endpoint;

const CONNECT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(1);

#[async_trait]
pub trait PortProbe: Send + Sync {
    fn describe(&self) -> String;

    /// `Ok(false)` means "not yet"; `Err` means probing itself is broken.
    async fn is_listening(&self) -> Result<bool>;
}

/// Accepts a TCP connection on the host-side mapped port.
pub struct HostTcpProbe {
    endpoint: Endpoint,
}

impl HostTcpProbe {
    pub fn new(endpoint: Endpoint) -> Self {
        Self { endpoint }
    }
}

#[async_trait]
impl PortProbe for HostTcpProbe {
    fn describe(&self) -> String {
        format!("host tcp {}", self.endpoint)
    }

    async fn is_listening(&self) -> Result<bool> {
        let attempt = TcpStream::connect(self.endpoint.authority());
        Ok(matches!(
            tokio::time::timeout(CONNECT_ATTEMPT_TIMEOUT, attempt).await,
            Ok(Ok(_))
        ))
    }
}

/// Looks for a LISTEN socket on the container-side port from inside the container.
pub struct ContainerListenProbe<'a> {
    container: &'a ContainerAsync<GenericImage>,
    port: u16,
}

impl<'a> ContainerListenProbe<'a> {
    pub fn new(container: &'a ContainerAsync<GenericImage>, port: u16) -> Self {
        Self { container, port }
    }

    fn command(&self) -> ExecCommand {
        let script = listen_check_script(self.port);
        ExecCommand::new(["sh", "-c", script.as_str()])
            .with_cmd_ready_condition(CmdWaitFor::exit_code(0))
    }
}

/// Shell check for a LISTEN (`0A`) entry on `port` in `/proc/net/tcp{,6}`.
pub fn listen_check_script(port: u16) -> String {
    format!(
        "cat /proc/net/tcp /proc/net/tcp6 2>/dev/null | grep -Eq ':{port:04X} [0-9A-Fa-f]+:0000 0A'"
    )
}

#[async_trait]
impl<'a> PortProbe for ContainerListenProbe<'a> {
    fn describe(&self) -> String {
        format!("container listen {}/tcp", self.port)
    }

    async fn is_listening(&self) -> Result<bool> {
        match self.container.exec(self.command()).await {
            Ok(_) => Ok(true),
            Err(TestcontainersError::Exec(ExecError::ExitCodeMismatch { .. })) => Ok(false),
            Err(e) => Err(BootstrapError::ReadinessTimeout {
                reason: format!("{} could not run: {e}", self.describe()),
            }),
        }
    }
}

/// Poll `probes` every `interval` until all of them report listening in the same round.
///
/// Returns the number of rounds taken. With `deadline` unset this never gives
/// up; callers that need a bound set one or wrap the future in a timeout.
pub async fn wait_until_listening(
    probes: &[&dyn PortProbe],
    interval: Duration,
    deadline: Option<Duration>,
) -> Result<u32> {
    let started = Instant::now();
    let mut attempts = 0u32;

    loop {
        attempts += 1;

        let mut pending = None;
        for probe in probes {
            if !probe.is_listening().await? {
                pending = Some(probe.describe());
                break;
            }
        }

        let Some(pending) = pending else {
            return Ok(attempts);
        };

        if let Some(limit) = deadline {
            if started.elapsed() >= limit {
                return Err(BootstrapError::ReadinessTimeout {
                    reason: format!(
                        "{pending} not listening after {:?} ({attempts} attempts)",
                        limit
                    ),
                });
            }
        }

        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::net::TcpListener;

    /// Reports listening from the `ready_after`-th call onward.
    struct CountingProbe {
        calls: AtomicU32,
        ready_after: u32,
    }

    impl CountingProbe {
        fn new(ready_after: u32) -> Self {
            Self {
                calls: AtomicU32::new(0),
                ready_after,
            }
        }

        fn never() -> Self {
            Self::new(u32::MAX)
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PortProbe for CountingProbe {
        fn describe(&self) -> String {
            "counting".into()
        }

        async fn is_listening(&self) -> Result<bool> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(n >= self.ready_after)
        }
    }

    struct BrokenProbe;

    #[async_trait]
    impl PortProbe for BrokenProbe {
        fn describe(&self) -> String {
            "broken".into()
        }

        async fn is_listening(&self) -> Result<bool> {
            Err(BootstrapError::ReadinessTimeout {
                reason: "probe unavailable".into(),
            })
        }
    }

    const TICK: Duration = Duration::from_millis(5);

    #[tokio::test]
    async fn returns_once_probe_reports_listening() {
        let probe = CountingProbe::new(3);
        let attempts = wait_until_listening(&[&probe], TICK, None).await.unwrap();
        assert_eq!(attempts, 3);
        assert_eq!(probe.calls(), 3);
    }

    #[tokio::test]
    async fn all_probes_must_agree() {
        let early = CountingProbe::new(1);
        let late = CountingProbe::new(4);
        let attempts = wait_until_listening(&[&early, &late], TICK, None)
            .await
            .unwrap();
        assert_eq!(attempts, 4);
        assert_eq!(late.calls(), 4);
    }

    #[tokio::test]
    async fn blocks_indefinitely_without_deadline() {
        let probe = CountingProbe::never();
        let outcome = tokio::time::timeout(
            Duration::from_millis(200),
            wait_until_listening(&[&probe], TICK, None),
        )
        .await;
        assert!(outcome.is_err(), "wait returned before any probe succeeded");
        assert!(probe.calls() > 1);
    }

    #[tokio::test]
    async fn deadline_turns_into_readiness_timeout() {
        let probe = CountingProbe::never();
        let err = wait_until_listening(&[&probe], TICK, Some(Duration::from_millis(30)))
            .await
            .unwrap_err();
        assert!(matches!(err, BootstrapError::ReadinessTimeout { .. }));
        assert!(err.to_string().contains("counting"));
    }

    #[tokio::test]
    async fn probe_errors_abort_the_wait() {
        let err = wait_until_listening(&[&BrokenProbe], TICK, None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("probe unavailable"));
    }

    #[tokio::test]
    async fn host_probe_tracks_a_real_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let probe = HostTcpProbe::new(Endpoint::new("127.0.0.1", port));
        assert!(probe.is_listening().await.unwrap());

        drop(listener);
        assert!(!probe.is_listening().await.unwrap());
    }

    #[test]
    fn listen_script_uses_uppercase_hex_port() {
        let script = listen_check_script(5432);
        assert!(script.contains(":1538 "));
        assert!(script.contains("0A"));
    }
}
