use serde::{Deserialize, Serialize};

use crate::path::normalize_path;

/// One entry of the navigation menu, as delivered by the Auth API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuNode {
    pub name: String,

    #[serde(default)]
    pub icon: Option<String>,

    #[serde(default)]
    pub path: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<MenuNode>,
}

/// Ordered menu forest. Passed through to navigation untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MenuTree(pub Vec<MenuNode>);

impl MenuTree {
    pub fn new(nodes: Vec<MenuNode>) -> Self {
        Self(nodes)
    }

    pub fn nodes(&self) -> &[MenuNode] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Normalized paths of every node that has one, depth-first.
    pub fn paths(&self) -> Vec<&str> {
        fn walk<'a>(nodes: &'a [MenuNode], out: &mut Vec<&'a str>) {
            for node in nodes {
                if let Some(path) = node.path.as_deref().map(normalize_path) {
                    if !path.is_empty() {
                        out.push(path);
                    }
                }
                walk(&node.children, out);
            }
        }

        let mut out = Vec::new();
        walk(&self.0, &mut out);
        out
    }

    pub fn contains_path(&self, path: &str) -> bool {
        let wanted = normalize_path(path);
        self.paths().into_iter().any(|p| p == wanted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn paths_walk_children_in_order() {
        let tree: MenuTree = serde_json::from_value(json!([
            {"name": "Dashboard", "icon": "home", "path": "/dashboard"},
            {"name": "Courses", "children": [
                {"name": "All", "path": "/courses/"},
                {"name": "Categories", "path": "courses/categories"}
            ]}
        ]))
        .unwrap();

        assert_eq!(tree.paths(), vec!["dashboard", "courses", "courses/categories"]);
        assert!(tree.contains_path("/courses/categories/"));
        assert!(!tree.contains_path("users"));
    }
}
