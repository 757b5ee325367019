// Hero catalog collaborator.
//
// The coordinator only needs two questions answered about heroes: does this
// id exist, and what ids are there (in catalog order). Stat tables and
// ability definitions live elsewhere. A catalog backed by a remote service
// may be unreachable; callers treat `CatalogError` as `MissingCollaborator`
// and degrade instead of failing the request.

use std::path::Path;

use skirmish_protocol::HeroId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("hero catalog unavailable: {0}")]
    Unavailable(String),
    #[error("cannot load hero list {path}: {detail}")]
    Load { path: String, detail: String },
}

pub trait HeroCatalog: Send {
    fn exists(&self, hero: &HeroId) -> Result<bool, CatalogError>;

    /// All hero ids in catalog order.
    fn all_ids(&self) -> Result<Vec<HeroId>, CatalogError>;
}

/// In-process catalog over a fixed, ordered list of ids.
#[derive(Clone, Debug, Default)]
pub struct StaticCatalog {
    ids: Vec<HeroId>,
}

impl StaticCatalog {
    /// Build from ids; duplicates after the first occurrence are dropped.
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out: Vec<HeroId> = Vec::new();
        for id in ids {
            let id = HeroId::new(id);
            if !id.as_str().is_empty() && !out.contains(&id) {
                out.push(id);
            }
        }
        Self { ids: out }
    }

    /// Load a JSON array of hero id strings.
    pub fn from_json_file(path: &Path) -> Result<Self, CatalogError> {
        let load_err = |detail: String| CatalogError::Load {
            path: path.display().to_string(),
            detail,
        };
        let json = std::fs::read_to_string(path).map_err(|e| load_err(e.to_string()))?;
        let ids: Vec<String> = serde_json::from_str(&json).map_err(|e| load_err(e.to_string()))?;
        Ok(Self::new(ids))
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl HeroCatalog for StaticCatalog {
    fn exists(&self, hero: &HeroId) -> Result<bool, CatalogError> {
        Ok(self.ids.contains(hero))
    }

    fn all_ids(&self) -> Result<Vec<HeroId>, CatalogError> {
        Ok(self.ids.clone())
    }
}
