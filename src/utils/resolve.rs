use dashmap::DashMap;
use log::{debug, trace};
use std::collections::HashMap;
use std::net::IpAddr;
use std::process::{Command, Stdio};
use std::sync::Arc;

/// Reverse name lookups, cached and shared between host pipelines
#[derive(Clone, Default)]
pub struct HostResolver {
    cache: Arc<DashMap<IpAddr, String>>,
}

impl HostResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Display name for an address, falling back to the address itself
    pub fn resolve(&self, addr: IpAddr) -> String {
        if let Some(name) = self.cache.get(&addr) {
            trace!("Resolver cache hit for {}", addr);
            return name.value().clone();
        }

        let name = Self::lookup(addr).unwrap_or_else(|| addr.to_string());
        self.cache.insert(addr, name.clone());
        name
    }

    /// Resolve a batch of addresses
    pub fn resolve_all<'a, I>(&self, addrs: I) -> HashMap<IpAddr, String>
    where
        I: IntoIterator<Item = &'a IpAddr>,
    {
        addrs
            .into_iter()
            .map(|addr| (*addr, self.resolve(*addr)))
            .collect()
    }

    /// Ask the system resolver through `getent hosts`
    fn lookup(addr: IpAddr) -> Option<String> {
        let output = Command::new("getent")
            .args(["hosts", &addr.to_string()])
            .stderr(Stdio::null())
            .output();

        match output {
            Ok(output) if output.status.success() => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                parse_getent_hosts(&stdout)
            }
            Ok(_) => {
                debug!("No reverse name for {}", addr);
                None
            }
            Err(e) => {
                debug!("getent unavailable for reverse lookup of {}: {}", addr, e);
                None
            }
        }
    }
}

/// First hostname from a `getent hosts` line (`<addr> <name> [aliases...]`)
fn parse_getent_hosts(output: &str) -> Option<String> {
    output
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .map(|name| name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn getent_output_yields_first_name() {
        assert_eq!(
            parse_getent_hosts("10.1.2.3        queue-a.example.com queue-a\n"),
            Some("queue-a.example.com".to_string())
        );
        assert_eq!(parse_getent_hosts("10.1.2.3\n"), None);
        assert_eq!(parse_getent_hosts(""), None);
    }

    #[test]
    fn cached_names_are_reused() {
        let resolver = HostResolver::new();
        let addr: IpAddr = "192.0.2.7".parse().unwrap();
        resolver.cache.insert(addr, "cached-name".to_string());

        let names = resolver.resolve_all([addr].iter());
        assert_eq!(names[&addr], "cached-name");
    }
}
