use serde::Serialize;
use std::fmt;

/// Coarse module category inferred from a macro name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleCategory {
    Storage,
    Production,
    Dock,
    Defence,
    Habitation,
    Research,
    Structural,
    Other,
}

/// Substring rules, checked in order; the first hit wins
const RULES: &[(ModuleCategory, &[&str])] = &[
    (ModuleCategory::Storage, &["storage", "stor_", "container", "warehouse"]),
    (ModuleCategory::Production, &["prod_", "production", "processing", "refinery"]),
    (ModuleCategory::Dock, &["dock", "pier", "shipyard", "wharf", "buildmodule", "landing"]),
    (ModuleCategory::Defence, &["defence", "defense", "turret", "shield", "weapon"]),
    (ModuleCategory::Habitation, &["hab_", "habitat", "living", "dormitory"]),
    (ModuleCategory::Research, &["research", "lab_", "laboratory"]),
    (
        ModuleCategory::Structural,
        &["struct_", "structure", "connection", "cross", "bridge", "tube", "base_"],
    ),
];

impl ModuleCategory {
    /// Infer the category of a module macro, e.g. `storage_arg_m_solid_01_macro` -> storage
    pub fn from_macro(macro_name: &str) -> Self {
        let lower = macro_name.to_ascii_lowercase();
        RULES
            .iter()
            .find(|(_, needles)| needles.iter().any(|n| lower.contains(n)))
            .map(|(category, _)| *category)
            .unwrap_or(ModuleCategory::Other)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleCategory::Storage => "storage",
            ModuleCategory::Production => "production",
            ModuleCategory::Dock => "dock",
            ModuleCategory::Defence => "defence",
            ModuleCategory::Habitation => "habitation",
            ModuleCategory::Research => "research",
            ModuleCategory::Structural => "structural",
            ModuleCategory::Other => "other",
        }
    }
}

impl fmt::Display for ModuleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
