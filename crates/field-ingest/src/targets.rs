//! Repeat targets for received datagrams

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// A `host:port` that receives a copy of every accepted datagram
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardTarget {
    pub host: String,
    pub port: u16,
}

impl ForwardTarget {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for ForwardTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for ForwardTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .trim()
            .rsplit_once(':')
            .ok_or_else(|| format!("missing port in target {:?}", s))?;
        let port: u16 = port
            .parse()
            .map_err(|_| format!("invalid port in target {:?}", s))?;
        if host.is_empty() || port == 0 {
            return Err(format!("invalid target {:?}", s));
        }
        Ok(Self::new(host, port))
    }
}

/// Parse a comma-separated target list, skipping malformed entries
pub fn parse_targets(list: &str) -> Vec<ForwardTarget> {
    list.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| match entry.parse::<ForwardTarget>() {
            Ok(target) => Some(target),
            Err(e) => {
                debug!("Ignoring UDP target: {}", e);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_list() {
        let targets = parse_targets(" 10.0.0.5:2237, logger.local:12060,,bad, x:0, y:port ");
        assert_eq!(
            targets,
            vec![
                ForwardTarget::new("10.0.0.5", 2237),
                ForwardTarget::new("logger.local", 12060),
            ]
        );
    }

    #[test]
    fn display_round_trips() {
        let target: ForwardTarget = "127.0.0.1:9000".parse().unwrap();
        assert_eq!(target.to_string(), "127.0.0.1:9000");
    }

    #[test]
    fn empty_list() {
        assert!(parse_targets("").is_empty());
    }
}
