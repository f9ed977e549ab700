use serde::{Deserialize, Serialize};

/// Health of a managed service, ordered worst-to-best for the "worst wins" combinator.
///
/// `Unhealthy > Degraded > Unknown > Healthy`: combining two readings is `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum Health {
    #[default]
    Healthy,
    Unknown,
    Degraded,
    Unhealthy,
}

impl Health {
    /// Combine two health readings, keeping the worse one.
    pub fn combine(self, other: Health) -> Health {
        self.max(other)
    }
}

impl std::fmt::Display for Health {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Health::Healthy => "healthy",
            Health::Degraded => "degraded",
            Health::Unhealthy => "unhealthy",
            Health::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worst_wins() {
        assert_eq!(Health::Healthy.combine(Health::Degraded), Health::Degraded);
        assert_eq!(Health::Degraded.combine(Health::Unhealthy), Health::Unhealthy);
        assert_eq!(Health::Unhealthy.combine(Health::Healthy), Health::Unhealthy);
        assert_eq!(Health::Unknown.combine(Health::Healthy), Health::Unknown);
    }

    #[test]
    fn ordering_matches_spec() {
        assert!(Health::Unhealthy > Health::Degraded);
        assert!(Health::Degraded > Health::Unknown);
        assert!(Health::Unknown > Health::Healthy);
    }
}
