use crate::domain::models::Difficulty;
use std::collections::BTreeMap;

/// Boss name to the difficulties it can be cleared on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BossCatalog {
    bosses: BTreeMap<String, Vec<Difficulty>>,
}

impl BossCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_boss(mut self, name: impl Into<String>, difficulties: &[Difficulty]) -> Self {
        self.insert(name, difficulties);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, difficulties: &[Difficulty]) {
        let mut difficulties = difficulties.to_vec();
        difficulties.sort();
        difficulties.dedup();
        self.bosses.insert(name.into(), difficulties);
    }

    pub fn difficulties(&self, boss_name: &str) -> &[Difficulty] {
        self.bosses
            .get(boss_name)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn contains(&self, boss_name: &str) -> bool {
        self.bosses.contains_key(boss_name)
    }

    pub fn highest_priority_difficulty(&self, boss_name: &str) -> Option<Difficulty> {
        self.difficulties(boss_name)
            .iter()
            .copied()
            .max_by_key(|difficulty| (difficulty.priority(), *difficulty))
    }
}

pub fn default_catalog() -> BossCatalog {
    use Difficulty::{Chaos, Easy, Extreme, Hard, Normal};

    BossCatalog::new()
        .with_boss("Zakum", &[Easy, Normal, Chaos])
        .with_boss("Lotus", &[Normal, Hard, Extreme])
        .with_boss("Damien", &[Normal, Hard])
        .with_boss("Lucid", &[Easy, Normal, Hard])
        .with_boss("Will", &[Easy, Normal, Hard])
        .with_boss("Gloom", &[Normal, Chaos])
        .with_boss("Darknell", &[Normal, Hard])
        .with_boss("Verus Hilla", &[Normal, Hard])
        .with_boss("Black Mage", &[Hard, Extreme])
        .with_boss("Seren", &[Normal, Hard, Extreme])
        .with_boss("Kalos", &[Easy, Normal, Chaos, Extreme])
        .with_boss("Kaling", &[Easy, Normal, Hard, Extreme])
}
