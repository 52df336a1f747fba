use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, VecDeque};

use super::paths::join_remote;
use super::remote::RemoteFs;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTree {
    name: String,
    children: BTreeMap<String, RemoteTree>,
}

impl RemoteTree {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn children(&self) -> impl Iterator<Item = &RemoteTree> {
        self.children.values()
    }

    pub fn get_child(&self, name: &str) -> Option<&RemoteTree> {
        self.children.get(name)
    }

    pub fn get_child_mut(&mut self, name: &str) -> Option<&mut RemoteTree> {
        self.children.get_mut(name)
    }

    pub fn has_descendant(&self, path: &str) -> bool {
        let mut node = self;
        for segment in self.relative_segments(path) {
            match node.get_child(segment) {
                Some(child) => node = child,
                None => return false,
            }
        }
        true
    }

    // Lands under the deepest cached folder of `parent_path`; false on a duplicate name.
    pub fn add_child(&mut self, item: RemoteTree, parent_path: &str) -> bool {
        let segments = self.relative_segments(parent_path);
        self.insert_at(item, &segments)
    }

    pub fn remove_child(&mut self, name: &str) -> Option<RemoteTree> {
        self.children.remove(name)
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out, 0);
        out
    }

    fn render_into(&self, out: &mut String, depth: usize) {
        for _ in 0..depth {
            out.push('\t');
        }
        out.push_str("- ");
        out.push_str(&self.name);
        out.push('\n');
        for child in self.children.values() {
            child.render_into(out, depth + 1);
        }
    }

    fn insert_at(&mut self, item: RemoteTree, segments: &[&str]) -> bool {
        if let Some((first, rest)) = segments.split_first() {
            if let Some(child) = self.children.get_mut(*first) {
                return child.insert_at(item, rest);
            }
        }
        match self.children.entry(item.name.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(item);
                true
            }
        }
    }

    fn relative_segments<'p>(&self, path: &'p str) -> Vec<&'p str> {
        let own = self.name.trim_end_matches('/');
        let rest = match path.strip_prefix(own) {
            Some(rest) if !own.is_empty() && (rest.is_empty() || rest.starts_with('/')) => rest,
            _ => path,
        };
        rest.split('/').filter(|segment| !segment.is_empty()).collect()
    }
}

pub async fn scan_remote_tree<R: RemoteFs + ?Sized>(remote: &R, root: &str) -> RemoteTree {
    let mut tree = RemoteTree::new(root);
    let mut pending = VecDeque::from([root.to_string()]);
    let mut listed = 0usize;

    while let Some(current) = pending.pop_front() {
        let listing = match remote.list(&current).await {
            Ok(listing) => listing,
            Err(err) if err.is_not_found() => {
                tracing::warn!(path = %current, error = %err, "remote folder not found");
                continue;
            }
            Err(err) => {
                tracing::error!(path = %current, error = %err, "failed to list remote folder");
                continue;
            }
        };
        listed += 1;
        for (name, is_dir) in listing {
            if !is_dir {
                continue;
            }
            let child_path = join_remote(&current, &name);
            if tree.add_child(RemoteTree::new(name), &current) {
                pending.push_back(child_path);
            }
        }
    }

    tracing::debug!(root, listed, "remote tree scanned");
    tree
}
