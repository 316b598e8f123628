//! Labels attached to projects for grouping and filtering.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::types::UserId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectLabel {
    pub id: i64,
    pub user_id: UserId,
    pub project_key: String,
    pub label: String,
}

/// Project-to-label index for one user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectLabels {
    by_project: BTreeMap<String, BTreeSet<String>>,
    by_label: BTreeMap<String, BTreeSet<String>>,
}

impl ProjectLabels {
    pub fn new(labels: &[ProjectLabel]) -> Self {
        let mut index = Self::default();
        for label in labels {
            index
                .by_project
                .entry(label.project_key.clone())
                .or_default()
                .insert(label.label.clone());
            index
                .by_label
                .entry(label.label.clone())
                .or_default()
                .insert(label.project_key.clone());
        }
        index
    }

    pub fn is_empty(&self) -> bool {
        self.by_project.is_empty()
    }

    pub fn labels_for(&self, project: &str) -> impl Iterator<Item = &str> {
        self.by_project
            .get(project)
            .into_iter()
            .flatten()
            .map(String::as_str)
    }

    pub fn projects_for(&self, label: &str) -> impl Iterator<Item = &str> {
        self.by_label
            .get(label)
            .into_iter()
            .flatten()
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label(project: &str, label: &str) -> ProjectLabel {
        ProjectLabel {
            id: 0,
            user_id: UserId::new("alice").unwrap(),
            project_key: project.to_string(),
            label: label.to_string(),
        }
    }

    #[test]
    fn indexes_both_directions() {
        let labels = ProjectLabels::new(&[
            label("wakapi", "work"),
            label("wakapi", "oss"),
            label("dotfiles", "oss"),
        ]);
        assert_eq!(labels.labels_for("wakapi").collect::<Vec<_>>(), vec!["oss", "work"]);
        assert_eq!(labels.projects_for("oss").collect::<Vec<_>>(), vec!["dotfiles", "wakapi"]);
        assert_eq!(labels.labels_for("unlabeled").count(), 0);
    }
}
