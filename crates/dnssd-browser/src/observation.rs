//! What a browser saw during its observation window.

use crate::error::DiscoveryError;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Default service type for HomeKit accessories.
pub const HAP_SERVICE_TYPE: &str = "_hap._tcp";

/// Default browse domain.
pub const LOCAL_DOMAIN: &str = "local.";

/// A DNS-SD query: which service type to browse and which instances to resolve.
#[derive(Debug, Clone)]
pub struct DiscoveryQuery {
    /// Service type, e.g. `_hap._tcp`
    pub service_type: String,
    /// Browse domain, e.g. `local.`
    pub domain: String,
    /// Instances whose full name matches are resolved to host and port
    pub instance_pattern: Regex,
    /// Port the caller is looking for; resolution stops once a match reports it
    pub expected_port: Option<u16>,
}

impl DiscoveryQuery {
    /// Create a query. `instance_pattern` must match the whole instance name.
    pub fn new(
        service_type: &str,
        domain: &str,
        instance_pattern: &str,
    ) -> Result<Self, DiscoveryError> {
        let instance_pattern = Regex::new(&format!("^(?:{})$", instance_pattern))?;
        Ok(Self {
            service_type: service_type.to_string(),
            domain: domain.to_string(),
            instance_pattern,
            expected_port: None,
        })
    }

    pub fn with_expected_port(mut self, port: u16) -> Self {
        self.expected_port = Some(port);
        self
    }

    /// Whether an instance name is one we care about.
    pub fn matches(&self, instance: &str) -> bool {
        self.instance_pattern.is_match(instance)
    }
}

/// A single service instance seen while browsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedInstance {
    /// Unescaped instance name, e.g. `SmartThings Bridge 1A2B`
    pub name: String,
    /// Target host, if the instance was resolved
    pub host: Option<String>,
    /// Advertised port, if the instance was resolved
    pub port: Option<u16>,
}

impl ObservedInstance {
    /// An instance seen by browsing but not (yet) resolved.
    pub fn browsed(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: None,
            port: None,
        }
    }

    /// An instance resolved to a host and port.
    pub fn resolved(name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            host: Some(host.into()),
            port: Some(port),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.port.is_some()
    }
}

/// Structured result of one observation window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    /// Which strategy produced this observation
    pub browser: String,
    /// Instances of the queried service type, in order of first sighting
    pub instances: Vec<ObservedInstance>,
    /// True when at least one browser process had to be killed at the end of its window
    pub window_elapsed: bool,
}

impl Observation {
    pub fn new(browser: &str) -> Self {
        Self {
            browser: browser.to_string(),
            ..Default::default()
        }
    }

    /// Whether any instance of the service type was seen at all.
    pub fn service_type_seen(&self) -> bool {
        !self.instances.is_empty()
    }

    /// Record an instance, merging resolution data into an earlier sighting.
    pub fn record(&mut self, instance: ObservedInstance) {
        match self.instances.iter_mut().find(|i| i.name == instance.name) {
            Some(existing) => {
                if instance.is_resolved() {
                    existing.host = instance.host;
                    existing.port = instance.port;
                }
            }
            None => self.instances.push(instance),
        }
    }

    /// Drop an instance that the browser reported as removed.
    pub fn remove(&mut self, name: &str) {
        self.instances.retain(|i| i.name != name);
    }

    /// Whether a matching instance already resolved to the query's expected port.
    pub fn found_expected(&self, query: &DiscoveryQuery) -> bool {
        match query.expected_port {
            Some(port) => self.matching(query).any(|i| i.port == Some(port)),
            None => false,
        }
    }

    /// Instances whose names match the query's pattern.
    pub fn matching<'a>(
        &'a self,
        query: &'a DiscoveryQuery,
    ) -> impl Iterator<Item = &'a ObservedInstance> + 'a {
        self.instances.iter().filter(move |i| query.matches(&i.name))
    }
}

/// Undo DNS-SD presentation escaping (`\032` decimal bytes, `\.` literals).
///
/// Both `dns-sd` and `avahi-browse -p` print instance names this way.
pub fn unescape_label(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 1 < bytes.len() {
            let digits = &bytes[i + 1..bytes.len().min(i + 4)];
            if digits.len() == 3 && digits.iter().all(u8::is_ascii_digit) {
                let value = digits
                    .iter()
                    .fold(0u32, |acc, d| acc * 10 + u32::from(d - b'0'));
                if let Ok(byte) = u8::try_from(value) {
                    out.push(byte);
                    i += 4;
                    continue;
                }
            }
            out.push(bytes[i + 1]);
            i += 2;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bridge_query() -> DiscoveryQuery {
        DiscoveryQuery::new(HAP_SERVICE_TYPE, LOCAL_DOMAIN, r"SmartThings Bridge( \w+)?").unwrap()
    }

    #[test]
    fn test_unescape_decimal_space() {
        assert_eq!(
            unescape_label(r"SmartThings\032Bridge\0321A2B"),
            "SmartThings Bridge 1A2B"
        );
    }

    #[test]
    fn test_unescape_literal_dot() {
        assert_eq!(unescape_label(r"My\.Bridge"), "My.Bridge");
    }

    #[test]
    fn test_unescape_plain_passthrough() {
        assert_eq!(unescape_label("Bridge"), "Bridge");
    }

    #[test]
    fn test_query_matches_with_and_without_suffix() {
        let query = bridge_query();
        assert!(query.matches("SmartThings Bridge"));
        assert!(query.matches("SmartThings Bridge 1A2B"));
        assert!(!query.matches("Living Room Bridge"));
        assert!(!query.matches("SmartThings Bridge 1A2B extra"));
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let err = DiscoveryQuery::new(HAP_SERVICE_TYPE, LOCAL_DOMAIN, "(unclosed").unwrap_err();
        assert!(matches!(err, DiscoveryError::InvalidPattern(_)));
    }

    #[test]
    fn test_record_merges_resolution() {
        let mut obs = Observation::new("test");
        obs.record(ObservedInstance::browsed("SmartThings Bridge 1A2B"));
        obs.record(ObservedInstance::resolved(
            "SmartThings Bridge 1A2B",
            "bridge.local.",
            51826,
        ));
        assert_eq!(obs.instances.len(), 1);
        assert_eq!(obs.instances[0].port, Some(51826));
    }

    #[test]
    fn test_later_browse_does_not_clear_resolution() {
        let mut obs = Observation::new("test");
        obs.record(ObservedInstance::resolved("A", "a.local.", 1));
        obs.record(ObservedInstance::browsed("A"));
        assert_eq!(obs.instances[0].port, Some(1));
    }

    #[test]
    fn test_matching_filters_by_pattern() {
        let query = bridge_query();
        let mut obs = Observation::new("test");
        obs.record(ObservedInstance::browsed("Hue Bridge"));
        obs.record(ObservedInstance::browsed("SmartThings Bridge 9F00"));
        let names: Vec<_> = obs.matching(&query).map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["SmartThings Bridge 9F00"]);
        assert!(obs.service_type_seen());
    }

    #[test]
    fn test_found_expected_needs_port_and_match() {
        let mut obs = Observation::new("test");
        obs.record(ObservedInstance::resolved("Hue Bridge", "hue.local.", 51826));
        obs.record(ObservedInstance::resolved("SmartThings Bridge OLD1", "old.local.", 40000));
        assert!(!obs.found_expected(&bridge_query()));
        assert!(!obs.found_expected(&bridge_query().with_expected_port(51826)));

        obs.record(ObservedInstance::resolved("SmartThings Bridge 1A2B", "bridge.local.", 51826));
        assert!(obs.found_expected(&bridge_query().with_expected_port(51826)));
    }
}
