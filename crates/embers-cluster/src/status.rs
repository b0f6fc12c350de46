use std::str::FromStr;

use crate::error::ClusterError;

/// Aggregate health of a cluster as reported by the nodes themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterStatus {
    Ok,
    Fail,
}

impl FromStr for ClusterStatus {
    type Err = ClusterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ok" => Ok(ClusterStatus::Ok),
            "fail" => Ok(ClusterStatus::Fail),
            other => Err(ClusterError::IllegalState(other.to_string())),
        }
    }
}

/// Extracts the aggregate state from raw `CLUSTER INFO` text; its first
/// line reads `cluster_state:<ok|fail>`.
pub fn parse_cluster_info(raw: &str) -> Result<ClusterStatus, ClusterError> {
    let first = raw.lines().next().unwrap_or_default();
    let value = first
        .split(':')
        .nth(1)
        .ok_or_else(|| ClusterError::IllegalState(first.to_string()))?;
    value.trim().parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ok() {
        assert_eq!("ok".parse::<ClusterStatus>().unwrap(), ClusterStatus::Ok);
    }

    #[test]
    fn parses_fail() {
        assert_eq!("fail".parse::<ClusterStatus>().unwrap(), ClusterStatus::Fail);
    }

    #[test]
    fn rejects_unknown_state() {
        let err = "unknown".parse::<ClusterStatus>().unwrap_err();
        assert_eq!(err.to_string(), "unexpected cluster state: unknown");
    }

    #[test]
    fn reads_the_first_info_line() {
        let raw = "cluster_state:ok\r\ncluster_slots_assigned:16384\r\n";
        assert_eq!(parse_cluster_info(raw).unwrap(), ClusterStatus::Ok);
    }

    #[test]
    fn rejects_info_without_a_state_field() {
        assert!(matches!(
            parse_cluster_info("garbage"),
            Err(ClusterError::IllegalState(_))
        ));
    }
}
