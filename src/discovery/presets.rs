use crate::catalog::categories::CategoryIndex;
use crate::config::config::PresetCfg;
use crate::core::types::{CategoryId, CriteriaSpec};
use anyhow::{Context, Result};
use std::collections::BTreeMap;

pub trait PresetCatalog: Send + Sync {
    fn get(&self, name: &str) -> Option<CriteriaSpec>;
    fn names(&self) -> Vec<String>;
}

#[derive(Debug, Default, Clone)]
pub struct ConfigPresets {
    specs: BTreeMap<String, CriteriaSpec>,
}

impl ConfigPresets {
    pub fn from_cfg(presets: &[PresetCfg], categories: &dyn CategoryIndex) -> Result<Self> {
        let mut specs = BTreeMap::new();
        for preset in presets {
            let root = categories.root_of(preset.category).with_context(|| {
                format!(
                    "preset {}: category {} is not in the category tree",
                    preset.name, preset.category
                )
            })?;
            specs.insert(preset.name.clone(), Self::resolve(preset, root));
        }
        Ok(Self { specs })
    }

    fn resolve(preset: &PresetCfg, root: CategoryId) -> CriteriaSpec {
        let mut spec = CriteriaSpec::new(root)
            .with_rank_range(preset.rank)
            .with_price_range(preset.price);
        if preset.exclude_dominant_seller {
            spec = spec.excluding_dominant_seller();
        }
        if let Some(max) = preset.max_competing_sellers {
            spec = spec.with_max_competing_sellers(max);
        }
        if let Some(floor) = preset.min_margin {
            spec = spec.with_min_margin(floor);
        }
        spec
    }
}

impl PresetCatalog for ConfigPresets {
    fn get(&self, name: &str) -> Option<CriteriaSpec> {
        self.specs.get(name).cloned()
    }

    fn names(&self) -> Vec<String> {
        self.specs.keys().cloned().collect()
    }
}
