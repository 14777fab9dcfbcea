use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::git::slugify;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    pub path: PathBuf,
    pub base_branch: String,
}

impl Project {
    /// Prefix for every branch this project's sessions create.
    pub fn namespace(&self) -> String {
        let slug = slugify(&self.name);
        if slug.is_empty() {
            "fjord".to_string()
        } else {
            slug
        }
    }
}

pub trait ProjectRegistry: Send + Sync {
    fn get_project(&self, id: &str) -> Option<Project>;
}

impl ProjectRegistry for Vec<Project> {
    fn get_project(&self, id: &str) -> Option<Project> {
        self.iter().find(|p| p.id == id).cloned()
    }
}

/// Project list persisted as a JSON array.
#[derive(Debug, Clone)]
pub struct JsonProjectRegistry {
    path: PathBuf,
    projects: Vec<Project>,
}

impl JsonProjectRegistry {
    pub fn load(path: PathBuf) -> Result<Self> {
        let projects = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read project registry: {:?}", path))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse project registry: {:?}", path))?
        } else {
            Vec::new()
        };
        Ok(Self { path, projects })
    }

    pub fn load_from_data_dir(data_dir: &Path) -> Result<Self> {
        Self::load(data_dir.join("projects.json"))
    }

    pub fn list(&self) -> &[Project] {
        &self.projects
    }

    pub fn add(&mut self, name: &str, path: &Path, base_branch: &str) -> Result<Project> {
        let path = path
            .canonicalize()
            .with_context(|| format!("Project path does not exist: {:?}", path))?;
        if let Some(existing) = self.projects.iter().find(|p| p.path == path) {
            anyhow::bail!("{:?} is already registered as project {}", path, existing.id);
        }

        let project = Project {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            path,
            base_branch: base_branch.to_string(),
        };
        self.projects.push(project.clone());
        self.save()?;
        Ok(project)
    }

    pub fn remove(&mut self, id: &str) -> Result<Option<Project>> {
        let Some(index) = self.projects.iter().position(|p| p.id == id) else {
            return Ok(None);
        };
        let removed = self.projects.remove(index);
        self.save()?;
        Ok(Some(removed))
    }

    /// Looks a project up by id or, failing that, by name.
    pub fn find(&self, id_or_name: &str) -> Option<&Project> {
        self.projects
            .iter()
            .find(|p| p.id == id_or_name)
            .or_else(|| self.projects.iter().find(|p| p.name == id_or_name))
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {:?}", parent))?;
        }
        let json = serde_json::to_string_pretty(&self.projects)?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("Failed to write project registry: {:?}", self.path))
    }
}

impl ProjectRegistry for JsonProjectRegistry {
    fn get_project(&self, id: &str) -> Option<Project> {
        self.find(id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn project_namespace_is_slug_of_name() {
        let project = Project {
            id: "1".into(),
            name: "Min Fine App".into(),
            path: PathBuf::from("/tmp"),
            base_branch: "main".into(),
        };
        assert_eq!(project.namespace(), "min-fine-app");
    }

    #[test]
    fn registry_round_trips_through_json_file() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("projects.json");

        let mut registry = JsonProjectRegistry::load(file.clone()).unwrap();
        assert!(registry.list().is_empty());
        let project = registry.add("web", tmp.path(), "main").unwrap();

        let reloaded = JsonProjectRegistry::load(file.clone()).unwrap();
        assert_eq!(reloaded.get_project(&project.id), Some(project.clone()));
        assert_eq!(reloaded.get_project("web"), Some(project.clone()));

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&file).unwrap()).unwrap();
        assert_eq!(
            raw[0]["baseBranch"], "main",
            "JsonProjectRegistry: file format uses camelCase keys"
        );
    }

    #[test]
    fn registry_rejects_duplicate_path() {
        let tmp = TempDir::new().unwrap();
        let mut registry = JsonProjectRegistry::load(tmp.path().join("p.json")).unwrap();
        registry.add("a", tmp.path(), "main").unwrap();
        assert!(registry.add("b", tmp.path(), "main").is_err());
    }

    #[test]
    fn registry_remove_unknown_is_none() {
        let tmp = TempDir::new().unwrap();
        let mut registry = JsonProjectRegistry::load(tmp.path().join("p.json")).unwrap();
        assert_eq!(registry.remove("missing").unwrap(), None);
    }

    #[test]
    fn vec_registry_lookup() {
        let projects = vec![Project {
            id: "p1".into(),
            name: "one".into(),
            path: PathBuf::from("/repo"),
            base_branch: "main".into(),
        }];
        assert!(projects.get_project("p1").is_some());
        assert!(projects.get_project("p2").is_none());
    }
}
