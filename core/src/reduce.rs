//! # Tree Reducer
//!
//! Collapses an arrival-ordered queue of markup fragments into the single
//! fragment of the root component.
//!
//! Reduction runs in two passes over the parent/child tree:
//!
//! 1. **Locate**: for every parent/child edge, record a slot (byte offset in
//!    the parent's original markup) for each marker naming the child. All
//!    edges are located before anything is substituted, so children with the
//!    same name at different branches never land in the wrong parent.
//! 2. **Fill**: walk the tree post-order and splice each child's already
//!    reduced markup into every one of its slots.
//!
//! Only the root survives; fragments not reachable from it are dropped.

use crate::fragment::{Fragment, Payload};
use crate::marker::{DEFAULT_MARKER_ATTRIBUTE, insertion_points};
use serde::Deserialize;
use std::collections::HashSet;

/// Which root candidate survives the collapse.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RootPolicy {
    /// The first fragment, in queue order, without a resolvable parent.
    #[default]
    FirstSeen,
    /// The first fragment with this name. Falls back to `FirstSeen`.
    Named(String),
}

/// What happens to a fragment whose parent holds no marker for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnmatchedPolicy {
    /// Offer it once to every other fragment in queue order, then drop it.
    #[default]
    RetryOnce,
    /// Drop it straight away.
    Drop,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReduceOptions {
    /// Name of the marker attribute.
    pub attribute: String,
    pub root: RootPolicy,
    pub unmatched: UnmatchedPolicy,
}

impl Default for ReduceOptions {
    fn default() -> Self {
        Self {
            attribute: DEFAULT_MARKER_ATTRIBUTE.to_string(),
            root: RootPolicy::default(),
            unmatched: UnmatchedPolicy::default(),
        }
    }
}

impl ReduceOptions {
    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = attribute.into();
        self
    }

    pub fn with_root(mut self, root: RootPolicy) -> Self {
        self.root = root;
        self
    }

    pub fn with_unmatched(mut self, unmatched: UnmatchedPolicy) -> Self {
        self.unmatched = unmatched;
        self
    }
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    offset: usize,
    child: usize,
}

struct Tree<'a> {
    fragments: &'a [Fragment],
    attribute: &'a str,
    /// Parent resolved from the declared `parent` name.
    declared: Vec<Option<usize>>,
    /// Parent whose markup actually holds a marker for the fragment.
    adopted: Vec<Option<usize>>,
    slots: Vec<Vec<Slot>>,
    claimed: HashSet<(usize, &'a str)>,
}

impl<'a> Tree<'a> {
    fn new(fragments: &'a [Fragment], attribute: &'a str) -> Self {
        let n = fragments.len();
        let mut tree = Self {
            fragments,
            attribute,
            declared: vec![None; n],
            adopted: vec![None; n],
            slots: vec![Vec::new(); n],
            claimed: HashSet::new(),
        };
        tree.resolve_parents();
        tree
    }

    fn resolve_parents(&mut self) {
        let fragments = self.fragments;
        for child in 0..fragments.len() {
            let Some(name) = fragments[child].parent() else {
                continue;
            };
            let Some(parent) =
                (0..fragments.len()).find(|&j| j != child && fragments[j].name() == name)
            else {
                continue;
            };

            if Self::reaches(&self.declared, parent, child) {
                tracing::debug!(
                    child = fragments[child].name(),
                    parent = name,
                    "Parent link would form a cycle, treating fragment as a root candidate"
                );
                continue;
            }
            self.declared[child] = Some(parent);
        }
    }

    /// Whether walking up `links` from `from` reaches `target`.
    fn reaches(links: &[Option<usize>], from: usize, target: usize) -> bool {
        let mut current = Some(from);
        let mut steps = 0;
        while let Some(node) = current {
            if node == target {
                return true;
            }
            steps += 1;
            if steps > links.len() {
                return false;
            }
            current = links[node];
        }
        false
    }

    fn select_root(&self, policy: &RootPolicy) -> usize {
        let named = match policy {
            RootPolicy::Named(name) => {
                let found = self.fragments.iter().position(|f| f.name() == name);
                if found.is_none() {
                    tracing::warn!(root = %name, "Named root not queued, using first root candidate");
                }
                found
            }
            RootPolicy::FirstSeen => None,
        };

        named
            .or_else(|| (0..self.fragments.len()).find(|&i| self.declared[i].is_none()))
            .unwrap_or(0)
    }

    fn markup(&self, index: usize) -> &'a str {
        let fragments: &'a [Fragment] = self.fragments;
        fragments[index].payload().as_markup().unwrap_or("")
    }

    /// Record the slots of `child` inside `parent`. Returns false when the
    /// parent holds no usable marker for it.
    fn locate(&mut self, child: usize, parent: usize) -> bool {
        let fragments: &'a [Fragment] = self.fragments;
        let name = fragments[child].name();
        if self.claimed.contains(&(parent, name)) {
            return false;
        }

        let points = insertion_points(self.markup(parent), self.attribute, name);
        if points.is_empty() {
            return false;
        }

        self.claimed.insert((parent, name));
        self.slots[parent].extend(points.into_iter().map(|offset| Slot { offset, child }));
        self.adopted[child] = Some(parent);
        true
    }

    fn retry(&mut self, child: usize) -> bool {
        for candidate in 0..self.fragments.len() {
            if candidate == child
                || Some(candidate) == self.declared[child]
                || Self::reaches(&self.adopted, candidate, child)
            {
                continue;
            }
            if self.locate(child, candidate) {
                tracing::debug!(
                    child = self.fragments[child].name(),
                    parent = self.fragments[candidate].name(),
                    "Unmatched fragment adopted on retry"
                );
                return true;
            }
        }
        false
    }

    /// Post-order fill starting at `root`; returns the reduced markup and the
    /// number of fragments it absorbed (root included).
    fn fill(&self, root: usize) -> (String, usize) {
        let mut rendered: Vec<Option<String>> = vec![None; self.fragments.len()];
        let mut stack = vec![(root, false)];
        let mut absorbed = 0;

        while let Some((node, expanded)) = stack.pop() {
            if rendered[node].is_some() {
                continue;
            }
            if expanded {
                rendered[node] = Some(self.splice(node, &rendered));
                absorbed += 1;
                continue;
            }

            stack.push((node, true));
            for slot in &self.slots[node] {
                if rendered[slot.child].is_none() {
                    stack.push((slot.child, false));
                }
            }
        }

        (rendered[root].take().unwrap_or_default(), absorbed)
    }

    fn splice(&self, node: usize, rendered: &[Option<String>]) -> String {
        let markup = self.markup(node);
        let mut slots = self.slots[node].clone();
        slots.sort_by_key(|slot| slot.offset);

        let extra: usize = slots
            .iter()
            .map(|slot| rendered[slot.child].as_deref().map_or(0, str::len))
            .sum();
        let mut out = String::with_capacity(markup.len() + extra);
        let mut cursor = 0;

        for slot in slots {
            out.push_str(&markup[cursor..slot.offset]);
            out.push_str(rendered[slot.child].as_deref().unwrap_or(""));
            cursor = slot.offset;
        }
        out.push_str(&markup[cursor..]);
        out
    }
}

/// Reduce markup fragments to a single root fragment.
pub fn reduce(fragments: Vec<Fragment>, options: &ReduceOptions) -> Vec<Fragment> {
    if fragments.len() < 2 {
        return fragments
            .into_iter()
            .map(|fragment| {
                let (name, _, payload) = fragment.into_parts();
                Fragment::root(name, payload)
            })
            .collect();
    }

    let mut tree = Tree::new(&fragments, &options.attribute);
    let root = tree.select_root(&options.root);

    for child in 0..fragments.len() {
        if child == root {
            continue;
        }
        if let Some(parent) = tree.declared[child] {
            tree.locate(child, parent);
        }
    }

    if options.unmatched == UnmatchedPolicy::RetryOnce {
        for child in 0..fragments.len() {
            if child != root && tree.adopted[child].is_none() {
                tree.retry(child);
            }
        }
    }

    let (markup, absorbed) = tree.fill(root);
    let has_slots = !tree.slots[root].is_empty();
    let dropped = fragments.len() - absorbed;
    if dropped > 0 {
        tracing::debug!(dropped, "Dropping fragments without a place in the root");
    }

    let (name, _, payload) = fragments.into_iter().nth(root).map(Fragment::into_parts).unwrap_or_default();
    let payload = match payload {
        Payload::Empty if !has_slots => Payload::Empty,
        _ => Payload::Markup(markup),
    };

    vec![Fragment::root(name, payload)]
}
