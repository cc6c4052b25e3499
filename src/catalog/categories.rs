use crate::config::config::CategoriesCfg;
use crate::core::types::CategoryId;
use std::collections::{HashMap, HashSet};

pub trait CategoryIndex: Send + Sync {
    fn is_root(&self, id: CategoryId) -> bool;

    fn root_of(&self, id: CategoryId) -> Option<CategoryId>;
}

#[derive(Debug, Clone, Default)]
pub struct StaticCategoryIndex {
    roots: HashSet<CategoryId>,
    parents: HashMap<CategoryId, CategoryId>,
}

impl StaticCategoryIndex {
    pub fn new(
        roots: impl IntoIterator<Item = CategoryId>,
        parents: impl IntoIterator<Item = (CategoryId, CategoryId)>,
    ) -> Self {
        Self {
            roots: roots.into_iter().collect(),
            parents: parents.into_iter().collect(),
        }
    }

    pub fn from_cfg(cfg: &CategoriesCfg) -> Self {
        Self::new(
            cfg.roots.iter().copied(),
            cfg.subcategories.iter().map(|s| (s.id, s.parent)),
        )
    }
}

impl CategoryIndex for StaticCategoryIndex {
    fn is_root(&self, id: CategoryId) -> bool {
        self.roots.contains(&id)
    }

    fn root_of(&self, id: CategoryId) -> Option<CategoryId> {
        let mut current = id;
        // a well-formed tree never needs more hops than it has edges
        for _ in 0..=self.parents.len() {
            if self.roots.contains(&current) {
                return Some(current);
            }
            current = *self.parents.get(&current)?;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> StaticCategoryIndex {
        // 283155 -> 1000 -> 1001
        StaticCategoryIndex::new([283155, 172282], [(1000, 283155), (1001, 1000)])
    }

    #[test]
    fn test_roots() {
        let idx = index();
        assert!(idx.is_root(283155));
        assert!(!idx.is_root(1000));
        assert!(!idx.is_root(42));
    }

    #[test]
    fn test_root_of_walks_parents() {
        let idx = index();
        assert_eq!(idx.root_of(283155), Some(283155));
        assert_eq!(idx.root_of(1001), Some(283155));
        assert_eq!(idx.root_of(42), None);
    }

    #[test]
    fn test_root_of_survives_cycles() {
        let idx = StaticCategoryIndex::new([1], [(5, 6), (6, 5)]);
        assert_eq!(idx.root_of(5), None);
    }
}
