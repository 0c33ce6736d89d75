//! Template trie and request lookup.
//!
//! # Responsibilities
//! - Index registered `(http method, template)` pairs in a segment trie
//! - Resolve a request path to the most specific registered route
//! - Extract variable bindings from the matched path
//! - Produce the deterministic match sequence for the route table
//!
//! # Design Decisions
//! - Lookup order per node: literal child, then `*`, then `**`
//! - A `**` node keeps consuming segments until one of its literal
//!   children matches; it may also match zero segments
//! - An exact HTTP method beats the `*` method at the same node
//! - A custom verb is a trailing trie segment; it is split from the last
//!   path segment only when some template registered that verb
//! - Registering the same method on an identical trie path is an error

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use super::bindings::VariableBinding;
use super::template::{Segment, UriTemplate};

/// Method key that matches every HTTP method.
pub const WILDCARD_METHOD: &str = "*";

/// Index of a registered route, in registration order.
pub type RouteId = usize;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MatcherError {
    #[error("duplicate http pattern `{method} {template}` (already registered as `{existing}`)")]
    DuplicateRoute {
        method: String,
        template: String,
        existing: String,
    },
}

/// A registered route and the caller's payload.
#[derive(Debug, Clone)]
pub struct RouteEntry<T> {
    pub method: String,
    pub template: UriTemplate,
    pub value: T,
}

/// Result of a successful lookup.
#[derive(Debug)]
pub struct PathMatch<'a, T> {
    pub route: RouteId,
    pub entry: &'a RouteEntry<T>,
    pub bindings: Vec<VariableBinding>,
}

#[derive(Debug, Clone, Default)]
struct TrieNode {
    literals: BTreeMap<String, TrieNode>,
    single: Option<Box<TrieNode>>,
    multi: Option<Box<TrieNode>>,
    is_multi: bool,
    /// (method, route) in registration order.
    results: Vec<(String, RouteId)>,
}

impl TrieNode {
    fn child_mut(&mut self, segment: &Segment) -> &mut TrieNode {
        match segment {
            Segment::Literal(lit) => self.literals.entry(lit.clone()).or_default(),
            Segment::Single => &mut **self.single.get_or_insert_with(Box::default),
            Segment::Multi => {
                &mut **self.multi.get_or_insert_with(|| {
                    Box::new(TrieNode { is_multi: true, ..TrieNode::default() })
                })
            }
        }
    }

    fn result_for(&self, method: &str) -> Option<RouteId> {
        self.results
            .iter()
            .find(|(m, _)| m == method)
            .or_else(|| self.results.iter().find(|(m, _)| m == WILDCARD_METHOD))
            .map(|(_, id)| *id)
    }

    fn lookup(&self, parts: &[&str], method: &str) -> Option<RouteId> {
        let Some((head, rest)) = parts.split_first() else {
            return self
                .result_for(method)
                .or_else(|| self.multi.as_ref().and_then(|m| m.result_for(method)));
        };

        if self.is_multi {
            if let Some(found) = self.literals.get(*head).and_then(|c| c.lookup(rest, method)) {
                return Some(found);
            }
            return self.lookup(rest, method);
        }

        if let Some(found) = self.literals.get(*head).and_then(|c| c.lookup(rest, method)) {
            return Some(found);
        }
        if let Some(found) = self.single.as_ref().and_then(|c| c.lookup(rest, method)) {
            return Some(found);
        }
        self.multi.as_ref().and_then(|c| c.lookup(rest, method))
    }

    fn collect(&self, out: &mut Vec<RouteId>) {
        if self.is_multi {
            self.collect_children(out);
            self.collect_results(out);
        } else {
            self.collect_results(out);
            self.collect_children(out);
        }
    }

    fn collect_results(&self, out: &mut Vec<RouteId>) {
        out.extend(
            self.results
                .iter()
                .filter(|(m, _)| m != WILDCARD_METHOD)
                .map(|(_, id)| *id),
        );
        out.extend(
            self.results
                .iter()
                .filter(|(m, _)| m == WILDCARD_METHOD)
                .map(|(_, id)| *id),
        );
    }

    fn collect_children(&self, out: &mut Vec<RouteId>) {
        for child in self.literals.values() {
            child.collect(out);
        }
        if let Some(single) = &self.single {
            single.collect(out);
        }
        if let Some(multi) = &self.multi {
            multi.collect(out);
        }
    }
}

/// Accumulates routes; `build` freezes them into a [`PathMatcher`].
#[derive(Debug)]
pub struct PathMatcherBuilder<T> {
    root: TrieNode,
    routes: Vec<RouteEntry<T>>,
    custom_verbs: BTreeSet<String>,
}

impl<T> Default for PathMatcherBuilder<T> {
    fn default() -> Self {
        Self {
            root: TrieNode::default(),
            routes: Vec::new(),
            custom_verbs: BTreeSet::new(),
        }
    }
}

impl<T> PathMatcherBuilder<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        method: &str,
        template: UriTemplate,
        value: T,
    ) -> Result<RouteId, MatcherError> {
        let method = method.to_ascii_uppercase();
        let id = self.routes.len();

        let mut node = &mut self.root;
        for segment in template.segments() {
            node = node.child_mut(segment);
        }
        if let Some(verb) = template.verb() {
            node = node.literals.entry(verb.to_string()).or_default();
        }

        if let Some((_, existing)) = node.results.iter().find(|(m, _)| *m == method) {
            return Err(MatcherError::DuplicateRoute {
                method,
                template: template.normalized(),
                existing: self.routes[*existing].template.normalized(),
            });
        }
        node.results.push((method.clone(), id));

        if let Some(verb) = template.verb() {
            self.custom_verbs.insert(verb.to_string());
        }
        self.routes.push(RouteEntry { method, template, value });
        Ok(id)
    }

    pub fn build(self) -> PathMatcher<T> {
        PathMatcher {
            root: self.root,
            routes: self.routes,
            custom_verbs: self.custom_verbs,
        }
    }
}

/// Immutable route index.
#[derive(Debug, Clone)]
pub struct PathMatcher<T> {
    root: TrieNode,
    routes: Vec<RouteEntry<T>>,
    custom_verbs: BTreeSet<String>,
}

impl<T> PathMatcher<T> {
    pub fn routes(&self) -> &[RouteEntry<T>] {
        &self.routes
    }

    pub fn custom_verbs(&self) -> &BTreeSet<String> {
        &self.custom_verbs
    }

    /// Find the most specific route for `method` and `path` (query allowed).
    pub fn lookup(&self, method: &str, path: &str) -> Option<PathMatch<'_, T>> {
        let method = method.to_ascii_uppercase();
        let parts = self.request_parts(path);
        let route = self.root.lookup(&parts, &method)?;
        let entry = &self.routes[route];
        let bindings = extract_bindings(&entry.template, &parts);
        Some(PathMatch { route, entry, bindings })
    }

    /// Split a request path into match parts.
    pub fn request_parts<'p>(&self, path: &'p str) -> Vec<&'p str> {
        let path = path.split_once('?').map_or(path, |(p, _)| p);

        let mut verb = None;
        let mut body = path;
        if let (Some(colon), Some(slash)) = (path.rfind(':'), path.rfind('/')) {
            if colon > slash && self.custom_verbs.contains(&path[colon + 1..]) {
                body = &path[..colon];
                verb = Some(&path[colon + 1..]);
            }
        }

        let body = body.strip_prefix('/').unwrap_or(body);
        let mut parts: Vec<&str> = body.split('/').collect();
        while parts.last().is_some_and(|p| p.is_empty()) {
            parts.pop();
        }
        parts.extend(verb);
        parts
    }

    /// Route ids in the order a first-match data plane must evaluate them.
    pub fn match_sequence(&self) -> Vec<RouteId> {
        let mut ordered = Vec::with_capacity(self.routes.len());
        self.root.collect(&mut ordered);

        let (mut with_verb, without_verb): (Vec<RouteId>, Vec<RouteId>) = ordered
            .into_iter()
            .partition(|id| self.routes[*id].template.verb().is_some());
        with_verb.extend(without_verb);
        with_verb
    }
}

fn extract_bindings(template: &UriTemplate, parts: &[&str]) -> Vec<VariableBinding> {
    template
        .variables()
        .iter()
        .filter_map(|var| {
            let end = var.request_end(template, parts.len());
            if var.start_segment > end || end > parts.len() {
                return None;
            }
            Some(VariableBinding {
                field_path: var.field_path.clone(),
                value: parts[var.start_segment..end].join("/"),
            })
        })
        .collect()
}
