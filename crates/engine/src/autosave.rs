//! Auto-save triggers
//!
//! Two kinds of trigger feed the reserved auto-save slot: a time interval
//! accumulated from host-driven ticks, and significant-event notifications
//! published by collaborators. The event channel is a single explicit
//! funnel: collaborators publish [`SignificantEvent`]s and the save
//! manager alone consumes them, instead of ad hoc subscriptions scattered
//! across subsystems.

use std::time::Duration;

use crate::config::AutoSaveConfig;

/// A gameplay milestone that may trigger an auto-save
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignificantEvent {
    /// The in-game season rolled over
    SeasonChanged,
    /// The player discovered a new biome
    BiomeDiscovered,
    /// A quest was completed
    QuestCompleted,
    /// The weather changed
    WeatherChanged,
}

/// Interval accumulation and per-trigger enablement
#[derive(Debug, Clone)]
pub struct AutoSavePolicy {
    config: AutoSaveConfig,
    accumulated: Duration,
}

impl AutoSavePolicy {
    /// Build a policy from configuration
    pub fn new(config: AutoSaveConfig) -> Self {
        AutoSavePolicy {
            config,
            accumulated: Duration::ZERO,
        }
    }

    /// Accumulate elapsed time; returns true when the configured interval
    /// is crossed (and resets the accumulator)
    pub fn tick(&mut self, elapsed: Duration) -> bool {
        if !self.config.enabled {
            return false;
        }
        self.accumulated += elapsed;
        let interval = Duration::from_secs(self.config.interval_secs);
        if self.accumulated >= interval {
            self.accumulated = Duration::ZERO;
            true
        } else {
            false
        }
    }

    /// Whether an event kind is configured to trigger an auto-save
    pub fn event_enabled(&self, event: SignificantEvent) -> bool {
        if !self.config.enabled {
            return false;
        }
        match event {
            SignificantEvent::SeasonChanged => self.config.on_season_change,
            SignificantEvent::BiomeDiscovered => self.config.on_biome_discovery,
            SignificantEvent::QuestCompleted => self.config.on_quest_completed,
            SignificantEvent::WeatherChanged => self.config.on_weather_change,
        }
    }

    /// Reset the interval accumulator (after any save, so an explicit
    /// save postpones the next timed auto-save)
    pub fn reset_interval(&mut self) {
        self.accumulated = Duration::ZERO;
    }
}
