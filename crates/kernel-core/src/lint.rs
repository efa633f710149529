//! Consistency checks over a loaded [`ConfigRegistry`].

use std::fmt;

use contracts::{OfficialRole, ResourceKind, HOME_BASE_TYPE};
use serde::Serialize;

use crate::config::{
    ConfigRegistry, BUILDING_TYPES_FILE, COMBATANTS_FILE, HEROES_FILE, OFFICIALS_FILE,
    WALL_CONFIG_FILE,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Error,
    Warn,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigIssue {
    pub severity: Severity,
    pub file: &'static str,
    pub subject: String,
    pub message: String,
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.severity {
            Severity::Error => "ERROR",
            Severity::Warn => "WARN",
        };
        write!(f, "{label}: {}: {}: {}", self.file, self.subject, self.message)
    }
}

#[derive(Debug, Default)]
struct IssueSink {
    issues: Vec<ConfigIssue>,
}

impl IssueSink {
    fn push(
        &mut self,
        severity: Severity,
        file: &'static str,
        subject: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.issues.push(ConfigIssue {
            severity,
            file,
            subject: subject.into(),
            message: message.into(),
        });
    }
}

pub fn has_errors(issues: &[ConfigIssue]) -> bool {
    issues.iter().any(|issue| issue.severity == Severity::Error)
}

pub fn lint_registry(config: &ConfigRegistry) -> Vec<ConfigIssue> {
    let mut sink = IssueSink::default();
    lint_buildings(config, &mut sink);
    lint_walls(config, &mut sink);
    lint_personnel(config, &mut sink);
    sink.issues.sort_by(|a, b| {
        (a.severity, a.file, &a.subject).cmp(&(b.severity, b.file, &b.subject))
    });
    sink.issues
}

fn lint_buildings(config: &ConfigRegistry, sink: &mut IssueSink) {
    let file = BUILDING_TYPES_FILE;
    if config.building(HOME_BASE_TYPE).is_err() {
        sink.push(Severity::Warn, file, HOME_BASE_TYPE, "no home base type is configured");
    }

    for building in config.building_types() {
        let key = building.key.as_str();
        if building.max_level == 0 {
            sink.push(Severity::Error, file, key, "max_level must be at least 1");
        }
        if let Some((kind, len)) = building.costs.shortest_column() {
            if len < building.max_level as usize {
                sink.push(
                    Severity::Warn,
                    file,
                    key,
                    format!(
                        "{kind}_cost lists {len} levels but max_level is {}",
                        building.max_level
                    ),
                );
            }
        }
        let times = building.construction_times.len();
        if times > 0 && times < building.max_level as usize {
            sink.push(
                Severity::Warn,
                file,
                key,
                format!(
                    "construction_times lists {times} levels but max_level is {}",
                    building.max_level
                ),
            );
        }
        for (kind, descriptor) in &building.production {
            if descriptor.periodicity <= 0.0 {
                sink.push(
                    Severity::Error,
                    file,
                    key,
                    format!("{kind} production periodicity must be positive"),
                );
            }
            if descriptor.amount_multiplier <= 0.0 {
                sink.push(
                    Severity::Error,
                    file,
                    key,
                    format!("{kind} production amount_multiplier must be positive"),
                );
            }
        }
    }
}

fn lint_walls(config: &ConfigRegistry, sink: &mut IssueSink) {
    let file = WALL_CONFIG_FILE;
    for (expected, wall) in (1_u32..).zip(config.wall_generations()) {
        let subject = format!("generation {}", wall.generation);
        if wall.generation != expected {
            sink.push(
                Severity::Error,
                file,
                subject.clone(),
                format!("generations must be sequential; expected {expected}"),
            );
        }
        if wall.hp.is_empty() {
            sink.push(Severity::Error, file, subject.clone(), "hp must list at least one level");
        }
        if wall.thickness <= 0 || wall.thickness * 2 > wall.width.min(wall.length) {
            sink.push(
                Severity::Error,
                file,
                subject.clone(),
                "thickness must be positive and fit inside width and length",
            );
        }
        for kind in ResourceKind::COSTED {
            let Some(column) = wall.costs.column(kind) else {
                continue;
            };
            if column.len() != wall.hp.len() {
                sink.push(
                    Severity::Warn,
                    file,
                    subject.clone(),
                    format!(
                        "{kind}_cost lists {} levels but hp lists {}",
                        column.len(),
                        wall.hp.len()
                    ),
                );
            }
        }
    }
}

fn lint_personnel(config: &ConfigRegistry, sink: &mut IssueSink) {
    for (key, combatant) in config.combatants() {
        if combatant.max_level == 0 {
            sink.push(Severity::Error, COMBATANTS_FILE, key, "max_level must be at least 1");
        }
        if combatant.damage.is_empty() {
            sink.push(Severity::Warn, COMBATANTS_FILE, key, "no damage levels configured");
        }
    }

    for (key, hero) in config.heroes() {
        if hero.max_level == 0 {
            sink.push(Severity::Error, HEROES_FILE, key, "max_level must be at least 1");
        }
        for (effect_id, effect) in &hero.status_effects {
            let known = matches!(effect.effect_type.as_str(), "stun" | "mute" | "confuse");
            if !known {
                sink.push(
                    Severity::Warn,
                    HEROES_FILE,
                    key,
                    format!(
                        "status effect {effect_id} has unknown type '{}'; treated as {:?}",
                        effect.effect_type,
                        effect.kind()
                    ),
                );
            }
        }
    }

    for (key, official) in config.officials() {
        if official.roles.is_empty() {
            sink.push(Severity::Warn, OFFICIALS_FILE, key, "not eligible for any role");
        }
        for role in &official.roles {
            if OfficialRole::parse(role).is_none() {
                sink.push(
                    Severity::Error,
                    OFFICIALS_FILE,
                    key,
                    format!("unknown role '{role}'"),
                );
            }
        }
    }
}
