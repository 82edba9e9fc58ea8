//! Stackgate 배포 크레이트
//!
//! 의존성 그래프를 phase 단위로 나누어 컨테이너를 시작하고, 각 서비스가
//! 준비 게이트를 통과해야 다음 phase로 넘어갑니다.
//!
//! # Module Structure
//!
//! - [`error`]: Domain error types (`DeployError`)
//! - [`runtime`]: Container runtime abstraction (`ContainerRuntime` trait, `BollardRuntime`)
//! - [`sequencer`]: Phased deployment (`PhaseSequencer`, `DeploymentResult`)
//!
//! # Architecture
//!
//! ```text
//! Topology --Plan::build--> [phase 0] [phase 1] ... [phase n]
//!                               |
//!                     ContainerRuntime.start()   (concurrent per phase)
//!                               |
//!                     ReadinessGate.wait_until_ready()
//!                               |
//!                     DeploymentResult --> verify / report
//! ```

pub mod error;
pub mod runtime;
pub mod sequencer;

// --- Public API Re-exports ---

// Error
pub use error::DeployError;

// Runtime
pub use runtime::{BollardRuntime, ContainerRuntime, MANAGED_LABEL, SERVICE_LABEL};

// Sequencer
pub use sequencer::{DeploymentResult, DeploymentStatus, PhaseReport, PhaseSequencer, teardown};
