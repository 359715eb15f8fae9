//! Read-only species catalog.
//!
//! The catalog is loaded once at startup from a JSON array of [`Species`] entries and
//! handed around behind an `Arc<dyn SpeciesCatalog>`.

use std::collections::HashMap;
use std::path::Path;

use log::{debug, info};

use super::errors::GameError;
use super::types::{GenderRatio, Rarity, Species, SpeciesId};

pub trait SpeciesCatalog: Send + Sync {
    fn by_id(&self, id: SpeciesId) -> Option<&Species>;
    fn all(&self) -> Vec<&Species>;

    fn require(&self, id: SpeciesId) -> Result<&Species, GameError> {
        self.by_id(id)
            .ok_or_else(|| GameError::NotFound(format!("species {}", id)))
    }

    fn catchable(&self) -> Vec<&Species> {
        self.all().into_iter().filter(|s| s.catchable).collect()
    }

    fn by_rarity(&self, rarity: Rarity) -> Vec<&Species> {
        self.all()
            .into_iter()
            .filter(|s| s.rarity == rarity)
            .collect()
    }

    /// Distinct elemental types in catalog order.
    fn type_names(&self) -> Vec<String> {
        let mut seen: Vec<String> = Vec::new();
        for species in self.all() {
            for t in &species.types {
                if !seen.iter().any(|x| x.eq_ignore_ascii_case(t)) {
                    seen.push(t.clone());
                }
            }
        }
        seen
    }

    fn region_names(&self) -> Vec<String> {
        let mut seen: Vec<String> = Vec::new();
        for species in self.all() {
            if !seen.iter().any(|x| x.eq_ignore_ascii_case(&species.region)) {
                seen.push(species.region.clone());
            }
        }
        seen
    }
}

#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    entries: Vec<Species>,
    index: HashMap<SpeciesId, usize>,
}

impl StaticCatalog {
    pub fn new(entries: Vec<Species>) -> Result<Self, GameError> {
        let mut index = HashMap::with_capacity(entries.len());
        for (pos, species) in entries.iter().enumerate() {
            validate_species(species)?;
            if index.insert(species.id, pos).is_some() {
                return Err(GameError::Config(format!(
                    "duplicate species id {} in catalog",
                    species.id
                )));
            }
        }
        debug!("species catalog indexed {} entries", entries.len());
        Ok(Self { entries, index })
    }

    pub fn from_json_str(raw: &str) -> Result<Self, GameError> {
        let entries: Vec<Species> = serde_json::from_str(raw)?;
        Self::new(entries)
    }

    pub fn load_from_json(path: impl AsRef<Path>) -> Result<Self, GameError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let catalog = Self::from_json_str(&raw)?;
        info!(
            "Loaded {} species from {}",
            catalog.entries.len(),
            path.display()
        );
        Ok(catalog)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl SpeciesCatalog for StaticCatalog {
    fn by_id(&self, id: SpeciesId) -> Option<&Species> {
        self.index.get(&id).map(|&pos| &self.entries[pos])
    }

    fn all(&self) -> Vec<&Species> {
        self.entries.iter().collect()
    }
}

fn validate_species(species: &Species) -> Result<(), GameError> {
    if let GenderRatio::Split { male_percent } = species.gender_ratio {
        if !male_percent.is_finite() || !(0.0..=100.0).contains(&male_percent) {
            return Err(GameError::Config(format!(
                "species {} has invalid male percentage {}",
                species.id, male_percent
            )));
        }
    }
    if species.types.is_empty() {
        return Err(GameError::Config(format!(
            "species {} has no types",
            species.id
        )));
    }
    Ok(())
}
