//! driftwatch-monitor — continuous API contract-compatibility monitoring.
//!
//! Probes every registered endpoint on a reference and a candidate
//! environment, compares the two answers structurally, and tracks
//! per-endpoint health across ticks. Endpoints that stay incompatible
//! raise a single critical alert on the way into `Alerting`.
//!
//! # Architecture
//!
//! ```text
//! Monitor (single coordinating loop, owns MonitorState)
//!   ├── per tick: JoinSet of endpoint tasks, Semaphore-bounded probes
//!   │   └── Prober::probe() × {reference, candidate} → ProbeResult
//!   ├── after join: compare() → EndpointHealth::record() → Transition
//!   ├── AlertDispatcher (append-only log, JSON-lines write-through)
//!   └── MonitoringReport (on demand, and on shutdown)
//! ```
//!
//! # Stopping
//!
//! Cancellation arrives on a `watch` channel and is only observed between
//! ticks, so a tick is never half-applied. Reaching the critical-alert
//! ceiling stops the loop after one final "monitoring stopped" alert.

pub mod alerts;
pub mod comparator;
pub mod error;
pub mod prober;
pub mod report;
pub mod scheduler;
pub mod tracker;

pub use alerts::{AlertCounts, AlertDispatcher};
pub use comparator::{compare, shape_compatible};
pub use error::PersistError;
pub use prober::{HttpProber, Prober, http_probe};
pub use report::{EndpointReport, MonitoringReport};
pub use scheduler::{Monitor, MonitorState, RunOutcome, StopReason, TickSummary};
pub use tracker::{EndpointHealth, Transition};
