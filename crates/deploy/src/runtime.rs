//! Container runtime abstraction for testability.
//!
//! The [`ContainerRuntime`] trait abstracts the operations the sequencer needs
//! from a container manager. Production code uses [`BollardRuntime`], tests
//! use `MockRuntime`.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────┐
//! │ PhaseSequencer │
//! └───────┬────────┘
//!         │
//!         ▼
//!  ┌──────────────────┐
//!  │ContainerRuntime  │ (trait)
//!  └──────────────────┘
//!       │        │
//!       ▼        ▼
//!  ┌────────┐ ┌──────┐
//!  │Bollard │ │ Mock │
//!  └───┬────┘ └──────┘
//!      │
//!      ▼
//!  Docker Daemon
//! ```
//!
//! # Idempotency
//!
//! `remove` and `remove_volume` treat a missing object as success so pre-run
//! cleanup and teardown can be repeated safely.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::TryStreamExt;
use stackgate_core::topology::ContainerSpec;
use tracing::{debug, info};

use crate::error::DeployError;

/// Label attached to every container started by stackgate.
pub const MANAGED_LABEL: &str = "stackgate.managed";

/// Label holding the service name of a managed container.
pub const SERVICE_LABEL: &str = "stackgate.service";

/// Trait abstracting container lifecycle operations.
///
/// The trait is `Send + Sync + 'static`, allowing it to be shared across
/// the concurrent start tasks of a phase.
pub trait ContainerRuntime: Send + Sync + 'static {
    /// Creates and starts the container for `service`.
    ///
    /// Returns once the runtime has accepted the start request; readiness
    /// is the gate's concern.
    ///
    /// # Errors
    ///
    /// - `DeployError::ImagePull`: the image is missing and could not be pulled
    /// - `DeployError::StartFailed`: create or start was rejected
    fn start(
        &self,
        service: &str,
        spec: &ContainerSpec,
        default_network: &str,
    ) -> impl Future<Output = Result<(), DeployError>> + Send;

    /// Force-removes the container for `service`. Absence is success.
    fn remove(&self, service: &str) -> impl Future<Output = Result<(), DeployError>> + Send;

    /// Removes a named volume. Absence is success.
    fn remove_volume(&self, volume: &str)
    -> impl Future<Output = Result<(), DeployError>> + Send;

    /// Checks runtime connectivity.
    ///
    /// # Errors
    ///
    /// Returns `DeployError::DockerConnection` if the daemon is unreachable.
    fn ping(&self) -> impl Future<Output = Result<(), DeployError>> + Send;
}

/// Production runtime implementation using `bollard`.
///
/// Internally uses `Arc<bollard::Docker>` for sharing across async tasks.
///
/// # Examples
///
/// ```ignore
/// use stackgate_deploy::BollardRuntime;
///
/// // Connect to default Docker socket
/// let runtime = BollardRuntime::connect_local()?;
///
/// // Or connect to a specific socket
/// let runtime = BollardRuntime::connect_with_socket("/run/docker.sock")?;
/// # Ok::<(), stackgate_deploy::DeployError>(())
/// ```
pub struct BollardRuntime {
    docker: Arc<bollard::Docker>,
}

impl BollardRuntime {
    /// Connects to Docker using the default local socket.
    ///
    /// # Errors
    ///
    /// Returns `DeployError::DockerConnection` if the connection fails
    /// (e.g., socket not found, permission denied, daemon not running).
    pub fn connect_local() -> Result<Self, DeployError> {
        let docker = bollard::Docker::connect_with_local_defaults().map_err(|e| {
            DeployError::DockerConnection(format!("failed to connect to docker: {e}"))
        })?;
        Ok(Self {
            docker: Arc::new(docker),
        })
    }

    /// Connects to Docker using a specific socket path.
    ///
    /// # Errors
    ///
    /// Returns `DeployError::DockerConnection` if the connection fails.
    pub fn connect_with_socket(socket_path: &str) -> Result<Self, DeployError> {
        let docker =
            bollard::Docker::connect_with_socket(socket_path, 120, bollard::API_DEFAULT_VERSION)
                .map_err(|e| {
                    DeployError::DockerConnection(format!(
                        "failed to connect to docker at {socket_path}: {e}"
                    ))
                })?;
        Ok(Self {
            docker: Arc::new(docker),
        })
    }

    /// Connects to `socket_path`, or the platform default when it is empty.
    pub fn connect(socket_path: &str) -> Result<Self, DeployError> {
        if socket_path.trim().is_empty() {
            Self::connect_local()
        } else {
            Self::connect_with_socket(socket_path)
        }
    }

    async fn ensure_network(&self, network: &str) -> Result<(), DeployError> {
        use bollard::network::CreateNetworkOptions;

        if matches!(network, "bridge" | "host" | "none") {
            return Ok(());
        }

        let options = CreateNetworkOptions {
            name: network.to_owned(),
            check_duplicate: true,
            ..Default::default()
        };
        match self.docker.create_network(options).await {
            Ok(_) => {
                info!(network, "created docker network");
                Ok(())
            }
            Err(e) if is_status(&e, 409) => Ok(()),
            Err(e) => Err(DeployError::DockerApi(format!(
                "create network '{network}' failed: {e}"
            ))),
        }
    }

    async fn ensure_image(&self, image: &str) -> Result<(), DeployError> {
        use bollard::image::CreateImageOptions;

        match self.docker.inspect_image(image).await {
            Ok(_) => return Ok(()),
            Err(e) if is_status(&e, 404) => {}
            Err(e) => {
                return Err(DeployError::DockerApi(format!(
                    "inspect image '{image}' failed: {e}"
                )));
            }
        }

        let (from_image, tag) = split_image_reference(image);
        info!(image, "pulling image");
        let options = CreateImageOptions {
            from_image: from_image.to_owned(),
            tag: tag.to_owned(),
            ..Default::default()
        };
        self.docker
            .create_image(Some(options), None, None)
            .try_collect::<Vec<_>>()
            .await
            .map_err(|e| DeployError::ImagePull {
                image: image.to_owned(),
                reason: e.to_string(),
            })?;
        Ok(())
    }
}

impl ContainerRuntime for BollardRuntime {
    async fn start(
        &self,
        service: &str,
        spec: &ContainerSpec,
        default_network: &str,
    ) -> Result<(), DeployError> {
        use bollard::container::{Config, CreateContainerOptions, StartContainerOptions};
        use bollard::models::HostConfig;

        let network = spec.network.as_deref().unwrap_or(default_network);
        self.ensure_network(network).await?;
        self.ensure_image(&spec.image).await?;

        let bindings = port_bindings(service, &spec.ports)?;
        let exposed_ports: HashMap<String, HashMap<(), ()>> = bindings
            .keys()
            .map(|port| (port.clone(), HashMap::new()))
            .collect();

        let labels = HashMap::from([
            (MANAGED_LABEL.to_owned(), "true".to_owned()),
            (SERVICE_LABEL.to_owned(), service.to_owned()),
        ]);

        let host_config = HostConfig {
            port_bindings: (!bindings.is_empty()).then_some(bindings),
            binds: (!spec.volumes.is_empty()).then(|| spec.volumes.clone()),
            network_mode: Some(network.to_owned()),
            extra_hosts: (!spec.extra_hosts.is_empty()).then(|| spec.extra_hosts.clone()),
            ..Default::default()
        };

        let config = Config {
            image: Some(spec.image.clone()),
            hostname: Some(service.to_owned()),
            cmd: (!spec.command.is_empty()).then(|| spec.command.clone()),
            env: Some(spec.env.iter().map(|(k, v)| format!("{k}={v}")).collect()),
            exposed_ports: (!exposed_ports.is_empty()).then_some(exposed_ports),
            labels: Some(labels),
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: service.to_owned(),
            platform: None,
        };

        self.docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| DeployError::StartFailed {
                service: service.to_owned(),
                reason: format!("create failed: {e}"),
            })?;

        self.docker
            .start_container(service, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| DeployError::StartFailed {
                service: service.to_owned(),
                reason: format!("start failed: {e}"),
            })?;

        info!(service, image = %spec.image, network, "container started");
        Ok(())
    }

    async fn remove(&self, service: &str) -> Result<(), DeployError> {
        use bollard::container::RemoveContainerOptions;

        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        match self.docker.remove_container(service, Some(options)).await {
            Ok(()) => {
                debug!(service, "container removed");
                Ok(())
            }
            Err(e) if is_status(&e, 404) => Ok(()),
            Err(e) => Err(DeployError::DockerApi(format!(
                "remove container '{service}' failed: {e}"
            ))),
        }
    }

    async fn remove_volume(&self, volume: &str) -> Result<(), DeployError> {
        use bollard::volume::RemoveVolumeOptions;

        match self
            .docker
            .remove_volume(volume, Some(RemoveVolumeOptions { force: true }))
            .await
        {
            Ok(()) => {
                info!(volume, "data volume removed");
                Ok(())
            }
            Err(e) if is_status(&e, 404) => Ok(()),
            Err(e) => Err(DeployError::DockerApi(format!(
                "remove volume '{volume}' failed: {e}"
            ))),
        }
    }

    async fn ping(&self) -> Result<(), DeployError> {
        self.docker
            .ping()
            .await
            .map_err(|e| DeployError::DockerConnection(format!("ping failed: {e}")))?;
        Ok(())
    }
}

fn is_status(err: &bollard::errors::Error, status: u16) -> bool {
    matches!(
        err,
        bollard::errors::Error::DockerResponseServerError { status_code, .. } if *status_code == status
    )
}

/// Splits `registry:5000/repo/name:tag` into `(registry:5000/repo/name, tag)`.
///
/// A reference without a tag resolves to `latest`; digests are passed through
/// whole with an empty tag.
pub fn split_image_reference(image: &str) -> (&str, &str) {
    if image.contains('@') {
        return (image, "");
    }
    let name_start = image.rfind('/').map_or(0, |i| i + 1);
    match image[name_start..].rfind(':') {
        Some(i) => {
            let split = name_start + i;
            (&image[..split], &image[split + 1..])
        }
        None => (image, "latest"),
    }
}

/// Builds Docker port bindings from `host:container[/tcp|/udp]` mappings.
fn port_bindings(
    service: &str,
    ports: &[String],
) -> Result<HashMap<String, Option<Vec<bollard::models::PortBinding>>>, DeployError> {
    let mut bindings: HashMap<String, Option<Vec<bollard::models::PortBinding>>> = HashMap::new();
    for mapping in ports {
        let (host, container) = mapping
            .split_once(':')
            .ok_or_else(|| DeployError::InvalidSpec {
                service: service.to_owned(),
                reason: format!("port mapping '{mapping}' must have the form host:container"),
            })?;
        let container_port = if container.contains('/') {
            container.to_owned()
        } else {
            format!("{container}/tcp")
        };
        bindings
            .entry(container_port)
            .or_insert_with(|| Some(Vec::new()))
            .get_or_insert_with(Vec::new)
            .push(bollard::models::PortBinding {
                host_ip: None,
                host_port: Some(host.to_owned()),
            });
    }
    Ok(bindings)
}

/// 테스트용 Mock 런타임
///
/// 모든 호출을 순서대로 기록하여 "시작되지 않았음"과 같은 속성을 검증할 수
/// 있습니다.
#[cfg(test)]
#[derive(Default)]
pub struct MockRuntime {
    calls: std::sync::Mutex<Vec<RuntimeCall>>,
    fail_start: std::collections::HashSet<String>,
    fail_remove: bool,
}

/// Mock 런타임에 기록된 호출
#[cfg(test)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCall {
    Start(String),
    Remove(String),
    RemoveVolume(String),
    Ping,
}

#[cfg(test)]
impl MockRuntime {
    /// 모든 호출이 성공하는 mock 런타임을 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 지정한 서비스의 시작을 실패시킵니다.
    pub fn failing_start(mut self, service: &str) -> Self {
        self.fail_start.insert(service.to_owned());
        self
    }

    /// 모든 제거 호출을 실패시킵니다.
    pub fn failing_remove(mut self) -> Self {
        self.fail_remove = true;
        self
    }

    /// 기록된 호출 목록을 반환합니다.
    pub fn calls(&self) -> Vec<RuntimeCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// 시작된 서비스 이름 목록을 반환합니다.
    pub fn started(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                RuntimeCall::Start(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: RuntimeCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

#[cfg(test)]
impl ContainerRuntime for MockRuntime {
    async fn start(
        &self,
        service: &str,
        _spec: &ContainerSpec,
        _default_network: &str,
    ) -> Result<(), DeployError> {
        self.record(RuntimeCall::Start(service.to_owned()));
        if self.fail_start.contains(service) {
            return Err(DeployError::StartFailed {
                service: service.to_owned(),
                reason: "mock start failure".to_owned(),
            });
        }
        Ok(())
    }

    async fn remove(&self, service: &str) -> Result<(), DeployError> {
        self.record(RuntimeCall::Remove(service.to_owned()));
        if self.fail_remove {
            return Err(DeployError::DockerApi("mock remove failure".to_owned()));
        }
        Ok(())
    }

    async fn remove_volume(&self, volume: &str) -> Result<(), DeployError> {
        self.record(RuntimeCall::RemoveVolume(volume.to_owned()));
        Ok(())
    }

    async fn ping(&self) -> Result<(), DeployError> {
        self.record(RuntimeCall::Ping);
        Ok(())
    }
}
