//! Dependency-ordered service startup order.
//!
//! Computes a topological sort over each service's `depends_on` set, breaking
//! ties deterministically by declared order, then by name, so the same
//! configuration always yields the same startup order.

use crate::config::ServiceConfig;
use crate::error::{CommonError, Result};
use std::collections::{BTreeSet, HashMap};

/// Compute the startup order for a set of enabled services.
///
/// Returns the service names in the order `StartService` should be called.
/// Errors with [`CommonError::Cycle`] naming every service on a cycle, or
/// [`CommonError::UnknownDependency`] if a `depends_on` entry names a service
/// that isn't configured.
pub fn startup_order(services: &[ServiceConfig]) -> Result<Vec<String>> {
    let declared_index: HashMap<&str, usize> = services
        .iter()
        .enumerate()
        .map(|(i, s)| (s.name.as_str(), i))
        .collect();

    for svc in services {
        for dep in &svc.depends_on {
            if !declared_index.contains_key(dep.as_str()) {
                return Err(CommonError::UnknownDependency {
                    service: svc.name.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }

    // Kahn's algorithm with a deterministic frontier ordered by (declared index, name).
    let mut in_degree: HashMap<&str, usize> = HashMap::new();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    for svc in services {
        in_degree.entry(svc.name.as_str()).or_insert(0);
        for dep in &svc.depends_on {
            *in_degree.entry(svc.name.as_str()).or_insert(0) += 1;
            dependents.entry(dep.as_str()).or_default().push(svc.name.as_str());
        }
    }

    let mut frontier: BTreeSet<(usize, &str)> = in_degree
        .iter()
        .filter(|(_, deg)| **deg == 0)
        .map(|(name, _)| (declared_index[name], *name))
        .collect();

    let mut order = Vec::with_capacity(services.len());
    while let Some((_, name)) = frontier.iter().next().copied() {
        frontier.remove(&(declared_index[name], name));
        order.push(name.to_string());
        if let Some(next) = dependents.get(name) {
            for &dependent in next {
                let deg = in_degree.get_mut(dependent).expect("known service");
                *deg -= 1;
                if *deg == 0 {
                    frontier.insert((declared_index[dependent], dependent));
                }
            }
        }
    }

    if order.len() != services.len() {
        let ordered: BTreeSet<&str> = order.iter().map(String::as_str).collect();
        let mut cycle_members: Vec<String> = services
            .iter()
            .map(|s| s.name.as_str())
            .filter(|n| !ordered.contains(n))
            .map(str::to_string)
            .collect();
        cycle_members.sort();
        return Err(CommonError::Cycle(cycle_members));
    }

    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn svc(name: &str, depends_on: &[&str]) -> ServiceConfig {
        ServiceConfig {
            name: name.to_string(),
            depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
            ..ServiceConfig::test_default(name)
        }
    }

    #[test]
    fn linear_chain_respects_dependencies() {
        let services = vec![svc("a", &[]), svc("b", &["a"]), svc("c", &["b"])];
        let order = startup_order(&services).unwrap();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn ties_break_by_declared_order_then_name() {
        let services = vec![svc("z", &[]), svc("a", &[]), svc("m", &[])];
        let order = startup_order(&services).unwrap();
        assert_eq!(order, vec!["z", "a", "m"]);
    }

    #[test]
    fn cycle_is_reported_with_members() {
        let services = vec![svc("a", &["b"]), svc("b", &["a"])];
        let err = startup_order(&services).unwrap_err();
        match err {
            CommonError::Cycle(members) => assert_eq!(members, vec!["a", "b"]),
            other => panic!("expected cycle error, got {other:?}"),
        }
    }

    #[test]
    fn every_dependency_precedes_its_dependent() {
        let services = vec![
            svc("core", &[]),
            svc("mesh", &["core"]),
            svc("webhook", &["core", "mesh"]),
            svc("anchor", &["core"]),
        ];
        let order = startup_order(&services).unwrap();
        let index_of = |n: &str| order.iter().position(|s| s == n).unwrap();
        for s in &services {
            for dep in &s.depends_on {
                assert!(index_of(dep) < index_of(&s.name));
            }
        }
    }

    #[test]
    fn unknown_dependency_is_rejected() {
        let services = vec![svc("a", &["ghost"])];
        assert!(matches!(
            startup_order(&services),
            Err(CommonError::UnknownDependency { .. })
        ));
    }
}
