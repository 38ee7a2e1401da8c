//! hapcheck-core: smoke checks for a HomeKit Accessory Protocol bridge
//!
//! Runs a fixed, ordered set of probes against a bridge and folds their
//! outcomes into a verdict suitable for `git bisect run`:
//! - TCP reachability of the HAP port
//! - pairing challenge on `/accessories`
//! - shape of the companion web API's pairing endpoint
//! - mDNS advertisement of the bridge instance
//!
//! TCP reachability and the advertisement are the critical subset: when
//! they pass, the run is a pass (possibly with warnings) even if the
//! other probes fail.

pub mod check;
pub mod config;
pub mod error;
pub mod outcome;
pub mod probe;
pub mod probe_set;
pub mod report;
pub mod telemetry;
pub mod verdict;

// Re-export key types
pub use check::Check;
pub use config::{CheckConfig, ConnectionTarget, DiscoveryConfig};
pub use error::{ProbeError, ProbeResult};
pub use outcome::{NamedProbeResult, ProbeOutcome, ProbeSetResult, ProbeStatus};
pub use probe::{
    names, AdvertisementProbe, ApiShapeProbe, ChallengeProbe, Probe, TcpReachabilityProbe,
};
pub use probe_set::ProbeSet;
pub use report::{CheckReport, ExitStatus};
pub use telemetry::init_tracing;
pub use verdict::{PolicyEvaluation, Verdict, VerdictPolicy};
