use indexmap::IndexMap;

use crate::Service;

/// Health assumed for services that only appear as someone's dependency and never declared a health of their own.
const UNDECLARED_SERVICE_HEALTH: f64 = 1.0;

/// Per-service health scores, and the rules for degrading them.
///
/// A service is *glitching* when its health sits strictly between zero and the glitch threshold: low enough to drag its
/// dependents down with it, but not yet fully failed. Services at zero are considered inert and never cascade again.
#[derive(Clone, Debug)]
pub struct HealthModel {
    health: IndexMap<String, f64>,
    threshold: f64,
    alpha: f64,
}

impl HealthModel {
    /// Creates an empty `HealthModel` with the given glitch threshold and dampening factor.
    pub fn new(threshold: f64, alpha: f64) -> Self {
        Self {
            health: IndexMap::new(),
            threshold,
            alpha,
        }
    }

    /// Creates a `HealthModel` seeded with the declared health of each service.
    ///
    /// When a name is declared more than once, the last declaration wins.
    pub fn from_services(services: &[Service], threshold: f64, alpha: f64) -> Self {
        let mut model = Self::new(threshold, alpha);
        for service in services {
            model.set(&service.name, service.health);
        }
        model
    }

    /// Returns the glitch threshold.
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Returns the dampening factor applied to impacted dependents.
    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Returns the current health of the given service.
    pub fn get(&self, service: &str) -> f64 {
        self.health.get(service).copied().unwrap_or(UNDECLARED_SERVICE_HEALTH)
    }

    /// Overrides the current health of the given service.
    pub fn set(&mut self, service: &str, health: f64) {
        match self.health.get_mut(service) {
            Some(current) => *current = health,
            None => {
                self.health.insert(service.to_owned(), health);
            }
        }
    }

    /// Degrades the given service by `amount`, returning its new health.
    ///
    /// Health never drops below zero, no matter how large `amount` is.
    pub fn degrade(&mut self, service: &str, amount: f64) -> f64 {
        let current = self
            .health
            .entry(service.to_owned())
            .or_insert(UNDECLARED_SERVICE_HEALTH);
        *current = (*current - amount).max(0.0);
        *current
    }

    /// Returns `true` if a service with the given health is glitching, and so should cascade to its dependents.
    pub fn is_glitch(&self, health: f64) -> bool {
        health > 0.0 && health < self.threshold
    }

    /// Returns the secondary degradation that a glitch on `root` inflicts on each of its impacted dependents.
    ///
    /// The further `root` has fallen below the glitch threshold, the larger the knock-on effect.
    pub fn knock_on(&self, root: &str) -> f64 {
        (self.alpha * (self.threshold - self.get(root))).max(0.0)
    }

    /// Applies the knock-on effect of a glitch on `root` to every impacted dependent, in order, returning the amount
    /// the first one was degraded by.
    ///
    /// The knock-on is recomputed from the current health of `root` for each dependent. When `root` is itself in
    /// `impacted` (it sits on a cycle), every dependent after it takes a larger hit.
    pub fn dampen_impacted(&mut self, root: &str, impacted: &[String]) -> f64 {
        let initial = self.knock_on(root);
        for service in impacted {
            let knock_on = self.knock_on(root);
            self.degrade(service, knock_on);
        }
        initial
    }

    /// Returns an iterator over every tracked service and its current health.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.health.iter().map(|(name, health)| (name.as_str(), *health))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-9;

    fn model() -> HealthModel {
        HealthModel::from_services(
            &[
                Service::new("A", 0.9),
                Service::new("B", 0.9).with_dependencies(["A"]),
                Service::new("C", 0.05).with_dependencies(["B"]),
            ],
            0.7,
            0.3,
        )
    }

    #[test]
    fn degrade_subtracts_amount() {
        let mut model = model();
        let health = model.degrade("A", 0.3);

        assert!((health - 0.6).abs() < EPSILON);
        assert!((model.get("A") - 0.6).abs() < EPSILON);
    }

    #[test]
    fn degrade_clamps_at_zero() {
        let mut model = HealthModel::new(0.7, 0.3);
        model.set("A", 0.1);

        assert_eq!(model.degrade("A", 0.9), 0.0);
        assert_eq!(model.degrade("A", 100.0), 0.0);
    }

    #[test]
    fn glitch_threshold_boundaries() {
        let model = model();

        assert!(!model.is_glitch(0.7));
        assert!(model.is_glitch(0.6999));
        assert!(model.is_glitch(0.01));
        assert!(!model.is_glitch(0.0));
        assert!(!model.is_glitch(0.95));
    }

    #[test]
    fn dampening_scales_with_root_deficit() {
        let mut model = model();
        model.set("A", 0.6);

        let knock_on = model.dampen_impacted("A", &["B".to_owned(), "C".to_owned()]);

        assert!((knock_on - 0.03).abs() < EPSILON);
        assert!((model.get("B") - 0.87).abs() < EPSILON);
        assert!((model.get("C") - 0.02).abs() < EPSILON);
    }

    #[test]
    fn dampening_clamps_dependents_at_zero() {
        let mut model = model();
        model.set("A", 0.1);

        // Knock-on of 0.3 * 0.6 = 0.18 exceeds C's remaining 0.05.
        model.dampen_impacted("A", &["C".to_owned()]);
        assert_eq!(model.get("C"), 0.0);
    }

    #[test]
    fn dampening_follows_root_through_cycle() {
        // A and B depend on each other, C depends on A: a glitch on A reaches B, then A itself, then C.
        let mut model = HealthModel::from_services(
            &[
                Service::new("A", 0.6).with_dependencies(["B"]),
                Service::new("B", 0.9).with_dependencies(["A"]),
                Service::new("C", 0.9).with_dependencies(["A"]),
            ],
            0.7,
            0.3,
        );

        let knock_on = model.dampen_impacted("A", &["B".to_owned(), "A".to_owned(), "C".to_owned()]);

        assert!((knock_on - 0.03).abs() < EPSILON);
        assert!((model.get("B") - 0.87).abs() < EPSILON);
        assert!((model.get("A") - 0.57).abs() < EPSILON);
        // A dropped to 0.57 before C was reached: 0.3 * (0.7 - 0.57) = 0.039.
        assert!((model.get("C") - 0.861).abs() < EPSILON);
    }

    #[test]
    fn undeclared_services_start_fully_healthy() {
        let mut model = model();

        assert_eq!(model.get("ghost"), 1.0);
        let health = model.degrade("ghost", 0.25);
        assert!((health - 0.75).abs() < EPSILON);
    }
}
