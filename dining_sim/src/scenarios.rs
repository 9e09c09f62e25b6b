//! Simulation scenarios.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// First meal after a cold start, then its release
    ColdStart,

    /// Stop while a philosopher is eating; resources stay held
    StopMidMeal,

    /// No stagger: neighbours go hungry at the same instant
    AdjacentContention,

    /// Equal-deadline timers fire in seed-random order
    ShuffledTies,

    /// 64 philosophers
    LargeRing,

    /// Smallest table: two philosophers sharing both resources
    Pair,

    /// Random start/stop/reset sequence
    ResetCycle,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::ColdStart,
            ScenarioId::StopMidMeal,
            ScenarioId::AdjacentContention,
            ScenarioId::ShuffledTies,
            ScenarioId::LargeRing,
            ScenarioId::Pair,
            ScenarioId::ResetCycle,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::ColdStart => "cold_start",
            ScenarioId::StopMidMeal => "stop_mid_meal",
            ScenarioId::AdjacentContention => "adjacent_contention",
            ScenarioId::ShuffledTies => "shuffled_ties",
            ScenarioId::LargeRing => "large_ring",
            ScenarioId::Pair => "pair",
            ScenarioId::ResetCycle => "reset_cycle",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::ColdStart => "First hand-off window yields a meal holding exactly its two resources",
            ScenarioId::StopMidMeal => "stop() during a meal keeps its resources and fires no further timers",
            ScenarioId::AdjacentContention => "Simultaneously hungry neighbours: one eats, the other retries",
            ScenarioId::ShuffledTies => "Same-instant timers in random order never break the ring invariants",
            ScenarioId::LargeRing => "64 philosophers, never more than 32 eating",
            ScenarioId::Pair => "Two philosophers, strictly alternating meals",
            ScenarioId::ResetCycle => "Interleaved start/stop/reset leaves no timers and clean resets",
        }
    }

    /// Returns true if the scenario replaces the table size.
    pub fn overrides_size(&self) -> bool {
        matches!(self, ScenarioId::LargeRing | ScenarioId::Pair)
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cold_start" | "coldstart" => Ok(ScenarioId::ColdStart),
            "stop_mid_meal" | "stopmidmeal" => Ok(ScenarioId::StopMidMeal),
            "adjacent_contention" | "contention" => Ok(ScenarioId::AdjacentContention),
            "shuffled_ties" | "shuffle" => Ok(ScenarioId::ShuffledTies),
            "large_ring" | "largering" => Ok(ScenarioId::LargeRing),
            "pair" => Ok(ScenarioId::Pair),
            "reset_cycle" | "resetcycle" => Ok(ScenarioId::ResetCycle),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}
