//! In-memory browser fake (testing only)
//!
//! `StaticBrowser` replays a canned observation or error without spawning
//! any process.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::error::DiscoveryError;
use crate::observation::{DiscoveryQuery, Observation, ObservedInstance};
use crate::DiscoveryBrowser;

/// What the fake should answer with.
#[derive(Debug, Clone)]
enum Canned {
    Found(Observation),
    Unavailable,
    Stalled,
}

/// Browser that always returns the same observation.
#[derive(Debug)]
pub struct StaticBrowser {
    canned: Canned,
    calls: AtomicUsize,
}

impl StaticBrowser {
    /// Answer with `instances` as if they were browsed by a real tool.
    pub fn with_instances(instances: Vec<ObservedInstance>) -> Self {
        let mut observation = Observation::new("static");
        observation.window_elapsed = true;
        for instance in instances {
            observation.record(instance);
        }
        Self {
            canned: Canned::Found(observation),
            calls: AtomicUsize::new(0),
        }
    }

    /// Answer with an empty observation.
    pub fn empty() -> Self {
        Self::with_instances(Vec::new())
    }

    /// Fail as if the browser executable were missing.
    pub fn unavailable() -> Self {
        Self {
            canned: Canned::Unavailable,
            calls: AtomicUsize::new(0),
        }
    }

    /// Never answer, ignoring window and deadline.
    pub fn stalled() -> Self {
        Self {
            canned: Canned::Stalled,
            calls: AtomicUsize::new(0),
        }
    }

    /// How many times `observe` was called.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DiscoveryBrowser for StaticBrowser {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn observe(
        &self,
        _query: &DiscoveryQuery,
        _window: Duration,
        _deadline: Instant,
    ) -> Result<Observation, DiscoveryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.canned {
            Canned::Found(observation) => Ok(observation.clone()),
            Canned::Unavailable => Err(DiscoveryError::BrowserUnavailable {
                program: "static".to_string(),
            }),
            Canned::Stalled => std::future::pending().await,
        }
    }
}
