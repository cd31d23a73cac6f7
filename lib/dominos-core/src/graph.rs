use indexmap::IndexMap;
use serde::Serialize;

use crate::Service;

/// Reverse dependency index.
///
/// Maps every service to the services that directly depend on it, i.e. the services that break when it breaks. Every
/// service name, and every name referenced as a dependency, has an entry in the index, even when nothing depends on
/// it. Entries keep insertion order, so building the index twice from the same input yields identical iteration order.
///
/// Serializes as a plain map of `name -> [dependents]`.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ReverseDependencyIndex {
    dependents: IndexMap<String, Vec<String>>,
}

impl ReverseDependencyIndex {
    /// Builds the reverse dependency index for the given services.
    ///
    /// Dependencies naming a service that is not part of `services` still get an (initially empty) entry, so the graph
    /// tolerates dangling references.
    pub fn build(services: &[Service]) -> Self {
        let mut dependents = IndexMap::with_capacity(services.len());

        for service in services {
            dependents.entry(service.name.clone()).or_insert_with(Vec::new);
        }

        for service in services {
            for dependency in &service.depends_on {
                dependents
                    .entry(dependency.clone())
                    .or_insert_with(Vec::new)
                    .push(service.name.clone());
            }
        }

        Self { dependents }
    }

    /// Returns the direct dependents of the given service.
    ///
    /// Every name reachable through the index has an entry by construction. Asking for a name that was never part of
    /// the graph is a caller bug: it trips a debug assertion, and yields no dependents in release builds.
    pub fn dependents(&self, name: &str) -> &[String] {
        let dependents = self.dependents.get(name);
        debug_assert!(
            dependents.is_some(),
            "service '{}' missing from reverse dependency index",
            name
        );

        dependents.map(Vec::as_slice).unwrap_or_default()
    }

    /// Returns `true` if the index has an entry for the given service.
    pub fn contains(&self, name: &str) -> bool {
        self.dependents.contains_key(name)
    }

    /// Returns the number of services in the index.
    pub fn len(&self) -> usize {
        self.dependents.len()
    }

    /// Returns `true` if the index has no entries.
    pub fn is_empty(&self) -> bool {
        self.dependents.is_empty()
    }

    /// Returns an iterator over each service and its direct dependents, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.dependents.iter().map(|(name, deps)| (name.as_str(), deps.as_slice()))
    }
}

#[cfg(test)]
mod tests {
    use proptest::{collection::vec as arb_vec, prelude::*};

    use super::*;

    fn chain() -> Vec<Service> {
        vec![
            Service::new("A", 0.9),
            Service::new("B", 0.9).with_dependencies(["A"]),
            Service::new("C", 0.9).with_dependencies(["B"]),
        ]
    }

    #[test]
    fn builds_dependents_for_chain() {
        let index = ReverseDependencyIndex::build(&chain());

        assert_eq!(index.len(), 3);
        assert_eq!(index.dependents("A"), ["B"]);
        assert_eq!(index.dependents("B"), ["C"]);
        assert!(index.dependents("C").is_empty());
    }

    #[test]
    fn dangling_dependency_gets_entry() {
        let services = vec![Service::new("api", 1.0).with_dependencies(["ghost"])];
        let index = ReverseDependencyIndex::build(&services);

        assert!(index.contains("ghost"));
        assert_eq!(index.dependents("ghost"), ["api"]);
        assert!(index.dependents("api").is_empty());
    }

    #[test]
    fn iteration_follows_input_order() {
        let index = ReverseDependencyIndex::build(&chain());
        let names = index.iter().map(|(name, _)| name).collect::<Vec<_>>();

        assert_eq!(names, ["A", "B", "C"]);
    }

    #[test]
    fn serializes_as_plain_map() {
        let index = ReverseDependencyIndex::build(&chain());
        let json = serde_json::to_value(&index).expect("should serialize");

        assert_eq!(json, serde_json::json!({ "A": ["B"], "B": ["C"], "C": [] }));
    }

    fn arb_services() -> impl Strategy<Value = Vec<Service>> {
        // Small name alphabet so dependencies frequently point at declared services, with a few dangling ones.
        let name = "[a-h]";
        arb_vec((name, arb_vec(name, 0..4)), 0..12).prop_map(|defs| {
            defs.into_iter()
                .map(|(name, deps)| Service::new(name, 1.0).with_dependencies(deps))
                .collect()
        })
    }

    proptest! {
        #[test]
        fn property_every_service_has_entry(services in arb_services()) {
            let index = ReverseDependencyIndex::build(&services);
            for service in &services {
                prop_assert!(index.contains(&service.name));
            }
        }

        #[test]
        fn property_every_dependency_lists_dependent(services in arb_services()) {
            let index = ReverseDependencyIndex::build(&services);
            for service in &services {
                for dep in &service.depends_on {
                    prop_assert!(index.dependents(dep).contains(&service.name));
                }
            }
        }
    }
}
