//! Stackgate 검증 크레이트
//!
//! 배포된 스택에 대해 선언된 검증 케이스를 순서대로 실행하고,
//! 결과를 Pass/Fail/Skip으로 분류하여 보고서를 생성합니다.
//!
//! # Module Structure
//!
//! - [`error`]: Domain error types (`VerifyError`)
//! - [`suite`]: Sequential case execution (`TestSuite`, `RunReport`, `TestResult`)
//! - [`report`]: Aggregation and artifacts (`ReportGenerator`, `Summary`)
//!
//! # Architecture
//!
//! ```text
//! [[tests]] --> TestSuite.run() --> RunReport --+
//!                                               +--> ReportGenerator::summarize() --> Summary
//! DeploymentResult.readiness_outcomes() --------+                                      |
//!                                                               persist() --> run-<ts>-<id>/
//! ```

pub mod error;
pub mod report;
pub mod suite;

// --- Public API Re-exports ---

pub use error::VerifyError;
pub use report::{CategoryCounts, FailedCase, ReportGenerator, Summary};
pub use suite::{READINESS_CATEGORY, RunReport, TestResult, TestSuite};
