// Copyright 2025 c-fraser
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # jsondiff
//!
//! A JSON comparison tool that classifies the differences between *left* and *right*
//! documents and renders them as a collapsible tree.
//!
//! ## Usage
//!
//! ```rust
//! use jsondiff::{DiffView, ViewOptions};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let mut view = DiffView::new(ViewOptions::new("left.json", "right.json", "results"))?;
//!     view.set_left(r#"{"version": 1}"#);
//!     view.set_right(r#"{"version": 2}"#);
//!     assert!(view.compare());
//!     for row in view.rows() {
//!         println!("{}{}", "  ".repeat(row.depth), row.label);
//!     }
//!     Ok(())
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashSet};
use std::error::Error;
use std::io::Write;
use std::mem;
use strum::VariantNames;
use strum_macros::{EnumString, IntoStaticStr, VariantNames as VariantNamesMacro};
use tracing::{debug, error, info};

/// The classification assigned to a compared value.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumString,
    IntoStaticStr,
    VariantNamesMacro,
)]
pub enum DiffKind {
    /// The value exists only in the *right* document.
    Added,
    /// The value exists only in the *left* document.
    Removed,
    /// The value exists in both documents but differs in type or scalar value.
    Changed,
    /// The value is identical on both sides.
    Unchanged,
}

impl DiffKind {
    /// Returns the name of this [`DiffKind`] variant.
    pub fn tag(&self) -> &'static str {
        self.into()
    }

    /// Returns all [`DiffKind::tag`] names.
    pub fn tags() -> &'static [&'static str] {
        Self::VARIANTS
    }
}

/// The concrete type of a JSON value, distinguishing containers from scalars.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueKind {
    Null,
    Bool,
    Number,
    String,
    Array,
    Object,
}

impl ValueKind {
    fn of(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(_) => Self::Bool,
            Value::Number(_) => Self::Number,
            Value::String(_) => Self::String,
            Value::Array(_) => Self::Array,
            Value::Object(_) => Self::Object,
        }
    }

    fn is_container(self) -> bool {
        matches!(self, Self::Array | Self::Object)
    }
}

/// Key names to render suppressed rather than highlighted, per [`DiffKind`].
///
/// A node whose classification matches its name's list is still present in the
/// diff-tree, but is marked [`DiffNode::filtered`] and collapsed by default.
#[derive(Debug, Clone, Default)]
pub struct DiffFilter {
    /// Suppress [`DiffKind::Added`] nodes with these names.
    pub added: HashSet<String>,
    /// Suppress [`DiffKind::Removed`] nodes with these names.
    pub removed: HashSet<String>,
    /// Suppress [`DiffKind::Changed`] nodes with these names.
    pub changed: HashSet<String>,
}

impl DiffFilter {
    /// Creates a new [`DiffFilter`] from the given name lists.
    pub fn new(added: Vec<String>, removed: Vec<String>, changed: Vec<String>) -> Self {
        Self {
            added: added.into_iter().collect(),
            removed: removed.into_iter().collect(),
            changed: changed.into_iter().collect(),
        }
    }

    fn suppresses(&self, kind: DiffKind, name: &str) -> bool {
        match kind {
            DiffKind::Added => self.added.contains(name),
            DiffKind::Removed => self.removed.contains(name),
            DiffKind::Changed => self.changed.contains(name),
            DiffKind::Unchanged => false,
        }
    }
}

/// The result of comparing the values at one position in the *left* and *right*
/// documents.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiffNode {
    /// The object key or array index at this position.
    pub name: String,
    /// The classification of this position.
    pub kind: DiffKind,
    /// The *left* value, absent if the *left* document lacks this position.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub left_value: Option<Value>,
    /// The *right* value, absent if the *right* document lacks this position.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub right_value: Option<Value>,
    /// Whether this node matched the caller's [`DiffFilter`].
    pub filtered: bool,
    /// Child nodes, present iff either side is an array or object. Built from
    /// the union of both sides' own keys, each key visited exactly once.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<DiffNode>>,
}

impl DiffNode {
    /// Returns `true` if either side is an array or object at this position.
    pub fn is_container(&self) -> bool {
        self.children.is_some()
    }

    /// Renders the scalar value(s) at this position: `left => right` for
    /// [`DiffKind::Changed`], the existing side's value otherwise, and an
    /// empty string for container sides.
    pub fn display_value(&self) -> String {
        match self.kind {
            DiffKind::Added => side_text(&self.right_value),
            DiffKind::Removed | DiffKind::Unchanged => side_text(&self.left_value),
            DiffKind::Changed => format!(
                "{} => {}",
                side_text(&self.left_value),
                side_text(&self.right_value)
            ),
        }
    }

    /// Renders the summary line for this position: `name: value`.
    pub fn label(&self) -> String {
        format!("{}: {}", self.name, self.display_value())
            .trim_end()
            .to_string()
    }
}

// renders a scalar value; containers and absent sides render as empty
fn side_text(value: &Option<Value>) -> String {
    match value {
        Some(Value::String(s)) => format!("\"{}\"", s),
        Some(v) if !ValueKind::of(v).is_container() => v.to_string(),
        _ => String::new(),
    }
}

/// Compares the *left* and *right* values at the position named `name`, producing
/// a classified [`DiffNode`] tree.
///
/// `None` on either side is a first-class input meaning "this position does not
/// exist in that document". Containers are expanded by the union of both sides'
/// own keys; array indices sort numerically, object keys lexicographically.
pub fn compare(
    left: Option<&Value>,
    right: Option<&Value>,
    name: &str,
    filter: &DiffFilter,
) -> DiffNode {
    let kind = match (left, right) {
        (None, _) => DiffKind::Added,
        (Some(_), None) => DiffKind::Removed,
        (Some(l), Some(r)) => {
            let (lt, rt) = (ValueKind::of(l), ValueKind::of(r));
            if lt != rt || (!lt.is_container() && l != r) {
                DiffKind::Changed
            } else {
                DiffKind::Unchanged
            }
        }
    };

    let container = left.is_some_and(|v| ValueKind::of(v).is_container())
        || right.is_some_and(|v| ValueKind::of(v).is_container());
    let children = container.then(|| {
        child_keys(left, right)
            .iter()
            .map(|key| compare(child(left, key), child(right, key), key, filter))
            .collect()
    });

    DiffNode {
        name: name.to_string(),
        kind,
        left_value: left.cloned(),
        right_value: right.cloned(),
        filtered: filter.suppresses(kind, name),
        children,
    }
}

/// Collects the deduplicated union of both sides' own keys. Arrays contribute
/// stringified indices; when every container side is an array the keys sort
/// numerically, otherwise lexicographically.
fn child_keys(left: Option<&Value>, right: Option<&Value>) -> Vec<String> {
    let mut keys = BTreeSet::new();
    let mut arrays_only = true;
    for side in [left, right] {
        match side {
            Some(Value::Array(items)) => {
                keys.extend((0..items.len()).map(|i| i.to_string()));
            }
            Some(Value::Object(map)) => {
                arrays_only = false;
                keys.extend(map.keys().cloned());
            }
            _ => {}
        }
    }
    let mut keys: Vec<String> = keys.into_iter().collect();
    if arrays_only {
        keys.sort_by_key(|key| key.parse::<usize>().unwrap_or(usize::MAX));
    }
    keys
}

// looks up a key on one side; scalar parents and missing keys are absent
fn child<'a>(value: Option<&'a Value>, key: &str) -> Option<&'a Value> {
    match value {
        Some(Value::Object(map)) => map.get(key),
        Some(Value::Array(items)) => key
            .parse::<usize>()
            .ok()
            // only exact index strings resolve; "01" is not index 1
            .filter(|i| i.to_string() == key)
            .and_then(|i| items.get(i)),
        _ => None,
    }
}

/// A row of the rendered tree wrapping one [`DiffNode`] with mutable collapse
/// state. The tree is rebuilt wholesale on every [`DiffView::compare`] call.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderNode {
    /// The key or array index at this position.
    pub name: String,
    /// The classification of this position.
    pub kind: DiffKind,
    /// Whether this row is suppressed by the view's [`DiffFilter`].
    pub filtered: bool,
    /// The `name: value` summary line.
    pub label: String,
    /// Whether this container's children are hidden.
    pub collapsed: bool,
    container: bool,
    children: Vec<RenderNode>,
}

impl RenderNode {
    fn from_diff(node: &DiffNode) -> Self {
        Self {
            name: node.name.clone(),
            kind: node.kind,
            filtered: node.filtered,
            label: node.label(),
            collapsed: false,
            container: node.is_container(),
            children: node
                .children
                .iter()
                .flatten()
                .map(Self::from_diff)
                .collect(),
        }
    }

    /// Returns `true` if either side is a container at this position.
    pub fn is_container(&self) -> bool {
        self.container
    }

    /// Returns this row's children.
    pub fn children(&self) -> &[RenderNode] {
        &self.children
    }

    /// Returns `true` if this row is an unsuppressed difference.
    pub fn highlighted(&self) -> bool {
        self.kind != DiffKind::Unchanged && !self.filtered
    }

    /// Expands this subtree, parents before children.
    pub fn expand_all(&mut self) {
        if self.container {
            self.collapsed = false;
        }
        for child in &mut self.children {
            child.expand_all();
        }
    }

    /// Collapses this subtree, children before parents.
    pub fn collapse_all(&mut self) {
        for child in &mut self.children {
            child.collapse_all();
        }
        if self.container {
            self.collapsed = true;
        }
    }

    /// Expands the minimal path to every highlighted row in this subtree and
    /// collapses every other container, searching through suppressed branches
    /// for nested highlighted rows. Returns whether the subtree holds one.
    pub fn collapse(&mut self) -> bool {
        let mut highlighted = self.highlighted();
        for child in &mut self.children {
            highlighted |= child.collapse();
        }
        if self.container {
            self.collapsed = !highlighted;
        }
        highlighted
    }
}

/// A visible row projected from a [`RenderTree`].
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// Child-index path from the root, usable with [`RenderTree::toggle`].
    pub path: Vec<usize>,
    /// Nesting depth; the root is 0.
    pub depth: usize,
    /// The `name: value` summary line.
    pub label: String,
    /// The classification of this row.
    pub kind: DiffKind,
    /// Whether this row is suppressed.
    pub filtered: bool,
    /// Whether this row is a container.
    pub container: bool,
    /// Whether this container's children are hidden.
    pub collapsed: bool,
}

/// The rendered visual tree for one comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderTree {
    root: RenderNode,
}

impl RenderTree {
    /// Materializes the diff-tree into a fully expanded [`RenderTree`].
    pub fn new(diff: &DiffNode) -> Self {
        Self {
            root: RenderNode::from_diff(diff),
        }
    }

    /// Returns the root row.
    pub fn root(&self) -> &RenderNode {
        &self.root
    }

    /// Expands every container in the tree.
    pub fn expand_all(&mut self) {
        self.root.expand_all();
    }

    /// Collapses every container in the tree.
    pub fn collapse_all(&mut self) {
        self.root.collapse_all();
    }

    /// Expands the minimal path to every unsuppressed difference and collapses
    /// everything else.
    pub fn collapse(&mut self) {
        self.root.collapse();
    }

    /// Flips the collapse state of the container at `path`. Returns `false` if
    /// `path` does not name a container.
    pub fn toggle(&mut self, path: &[usize]) -> bool {
        match self.node_mut(path) {
            Some(node) if node.container => {
                node.collapsed = !node.collapsed;
                true
            }
            _ => false,
        }
    }

    /// Returns the row at the given child-index path.
    pub fn node(&self, path: &[usize]) -> Option<&RenderNode> {
        let mut node = &self.root;
        for &index in path {
            node = node.children.get(index)?;
        }
        Some(node)
    }

    fn node_mut(&mut self, path: &[usize]) -> Option<&mut RenderNode> {
        let mut node = &mut self.root;
        for &index in path {
            node = node.children.get_mut(index)?;
        }
        Some(node)
    }

    /// Projects the tree into its visible rows, skipping the children of
    /// collapsed containers.
    pub fn visible_rows(&self) -> Vec<Row> {
        let mut rows = Vec::new();
        collect_rows(&self.root, &mut Vec::new(), &mut rows);
        rows
    }
}

fn collect_rows(node: &RenderNode, path: &mut Vec<usize>, rows: &mut Vec<Row>) {
    rows.push(Row {
        path: path.clone(),
        depth: path.len(),
        label: node.label.clone(),
        kind: node.kind,
        filtered: node.filtered,
        container: node.container,
        collapsed: node.collapsed,
    });
    if node.container && !node.collapsed {
        for (index, child) in node.children.iter().enumerate() {
            path.push(index);
            collect_rows(child, path, rows);
            path.pop();
        }
    }
}

/// Configuration for a [`DiffView`].
#[derive(Debug, Clone)]
pub struct ViewOptions {
    /// Identifier of the *left* input source.
    pub left: String,
    /// Identifier of the *right* input source.
    pub right: String,
    /// Identifier of the container hosting the rendered tree.
    pub target_id: String,
    /// Class name projected for the rendered results.
    pub results_class: String,
    /// Identifier of the generated results container.
    pub results_id: String,
    /// Identifier of the generated *left* results container.
    pub results_left_id: String,
    /// Identifier of the generated *right* results container.
    pub results_right_id: String,
    /// Names to render suppressed rather than highlighted.
    pub filter: DiffFilter,
}

impl ViewOptions {
    /// Creates [`ViewOptions`] with the required identifiers and default
    /// cosmetic settings.
    pub fn new(
        left: impl Into<String>,
        right: impl Into<String>,
        target_id: impl Into<String>,
    ) -> Self {
        Self {
            left: left.into(),
            right: right.into(),
            target_id: target_id.into(),
            results_class: "json".to_string(),
            results_id: "json-view-results".to_string(),
            results_left_id: "json-view-results-left".to_string(),
            results_right_id: "json-view-results-right".to_string(),
            filter: DiffFilter::default(),
        }
    }

    /// Sets the [`DiffFilter`].
    pub fn with_filter(mut self, filter: DiffFilter) -> Self {
        self.filter = filter;
        self
    }
}

/// An interactive comparison of two JSON text buffers.
///
/// Owns the raw input text, per-side validity markers, and the currently
/// rendered [`RenderTree`]. Every successful [`DiffView::compare`] discards and
/// rebuilds the rendered tree; a failed compare leaves the prior tree intact.
#[derive(Debug, Clone)]
pub struct DiffView {
    options: ViewOptions,
    left: String,
    right: String,
    left_invalid: bool,
    right_invalid: bool,
    faded: bool,
    diff: Option<DiffNode>,
    tree: Option<RenderTree>,
}

impl DiffView {
    /// Creates a new [`DiffView`], refusing construction if a required option
    /// is missing.
    pub fn new(options: ViewOptions) -> Result<Self, Box<dyn Error + Send + Sync>> {
        for (key, value) in [
            ("left", &options.left),
            ("right", &options.right),
            ("targetId", &options.target_id),
        ] {
            if value.is_empty() {
                return Err(format!("{key} is missing").into());
            }
        }
        Ok(Self {
            options,
            left: String::new(),
            right: String::new(),
            left_invalid: false,
            right_invalid: false,
            faded: false,
            diff: None,
            tree: None,
        })
    }

    /// Returns the view's configuration.
    pub fn options(&self) -> &ViewOptions {
        &self.options
    }

    /// Sets the *left* text buffer.
    pub fn set_left(&mut self, text: impl Into<String>) {
        self.left = text.into();
    }

    /// Sets the *right* text buffer.
    pub fn set_right(&mut self, text: impl Into<String>) {
        self.right = text.into();
    }

    /// Returns the *left* text buffer.
    pub fn left(&self) -> &str {
        &self.left
    }

    /// Returns the *right* text buffer.
    pub fn right(&self) -> &str {
        &self.right
    }

    /// Returns whether the *left* buffer failed to parse on the last compare.
    pub fn left_invalid(&self) -> bool {
        self.left_invalid
    }

    /// Returns whether the *right* buffer failed to parse on the last compare.
    pub fn right_invalid(&self) -> bool {
        self.right_invalid
    }

    /// Parses both buffers and rebuilds the rendered tree, returning `false` on
    /// a parse failure of either input.
    ///
    /// Parsing is strict and independent per side; the *right* buffer is not
    /// parsed when the *left* fails, and a failure leaves the previously
    /// rendered tree untouched. The fresh tree starts in the steady state of
    /// [`DiffView::collapse`]: differing branches open, everything else closed.
    pub fn compare(&mut self) -> bool {
        info!("Comparing {} and {}", self.options.left, self.options.right);
        let left: Value = match serde_json::from_str(&self.left) {
            Ok(value) => {
                self.left_invalid = false;
                value
            }
            Err(e) => {
                self.left_invalid = true;
                error!("Failed to parse {}: {e}", self.options.left);
                return false;
            }
        };
        let right: Value = match serde_json::from_str(&self.right) {
            Ok(value) => {
                self.right_invalid = false;
                value
            }
            Err(e) => {
                self.right_invalid = true;
                error!("Failed to parse {}: {e}", self.options.right);
                return false;
            }
        };

        let diff = compare(Some(&left), Some(&right), "root", &self.options.filter);
        let mut tree = RenderTree::new(&diff);
        tree.collapse();
        let summary = DiffSummary::of_tree(&diff);
        debug!(
            "Found {} differences ({} suppressed)",
            summary.total(),
            summary.filtered
        );
        self.diff = Some(diff);
        self.tree = Some(tree);
        true
    }

    /// Exchanges the two raw text buffers; no re-parse or re-render occurs.
    pub fn swap(&mut self) {
        mem::swap(&mut self.left, &mut self.right);
    }

    /// Clears both text buffers.
    pub fn clear(&mut self) {
        self.left.clear();
        self.right.clear();
    }

    /// Expands every container in the rendered tree.
    pub fn expand_all(&mut self) {
        if let Some(tree) = &mut self.tree {
            tree.expand_all();
        }
    }

    /// Collapses every container in the rendered tree.
    pub fn collapse_all(&mut self) {
        if let Some(tree) = &mut self.tree {
            tree.collapse_all();
        }
    }

    /// Expands the minimal path to every unsuppressed difference and collapses
    /// everything else.
    pub fn collapse(&mut self) {
        if let Some(tree) = &mut self.tree {
            tree.collapse();
        }
    }

    /// Flips the collapse state of the container at `path`.
    pub fn toggle(&mut self, path: &[usize]) -> bool {
        self.tree
            .as_mut()
            .map(|tree| tree.toggle(path))
            .unwrap_or(false)
    }

    /// De-emphasizes unchanged content in the rendered results.
    pub fn fade_out(&mut self) {
        self.faded = true;
    }

    /// Restores unchanged content in the rendered results.
    pub fn fade_in(&mut self) {
        self.faded = false;
    }

    /// Returns whether unchanged content is de-emphasized.
    pub fn faded(&self) -> bool {
        self.faded
    }

    /// Projects the class list for the results container, appending the fade
    /// marker class when faded.
    pub fn results_class(&self) -> String {
        if self.faded {
            format!("{} j-fade", self.options.results_class)
        } else {
            self.options.results_class.clone()
        }
    }

    /// Returns the diff-tree from the last successful compare.
    pub fn diff(&self) -> Option<&DiffNode> {
        self.diff.as_ref()
    }

    /// Returns the rendered tree from the last successful compare.
    pub fn tree(&self) -> Option<&RenderTree> {
        self.tree.as_ref()
    }

    /// Returns the visible rows of the rendered tree.
    pub fn rows(&self) -> Vec<Row> {
        self.tree
            .as_ref()
            .map(RenderTree::visible_rows)
            .unwrap_or_default()
    }

    /// Summarizes the last successful compare.
    pub fn summary(&self) -> DiffSummary {
        self.diff
            .as_ref()
            .map(DiffSummary::of_tree)
            .unwrap_or_default()
    }
}

/// A single difference between the documents, flattened for reporting.
#[derive(
    Debug, Clone, PartialEq, Serialize, Deserialize, EnumString, IntoStaticStr, VariantNamesMacro,
)]
#[serde(tag = "diff")]
pub enum DiffRecord {
    /// A value that exists only in the *right* document.
    Added { path: String, value: Value },
    /// A value that exists only in the *left* document.
    Removed { path: String, value: Value },
    /// A value that exists in both documents but differs.
    Changed {
        path: String,
        left: Value,
        right: Value,
    },
}

impl DiffRecord {
    /// Returns the [`serde`] *tag* name for this [`DiffRecord`] variant.
    pub fn tag(&self) -> &'static str {
        self.into()
    }

    /// Returns all [`DiffRecord::tag`] names.
    pub fn tags() -> &'static [&'static str] {
        Self::VARIANTS
    }

    /// Returns the dotted path of the difference.
    pub fn path(&self) -> &str {
        match self {
            Self::Added { path, .. } | Self::Removed { path, .. } | Self::Changed { path, .. } => {
                path
            }
        }
    }
}

/// Flattens a diff-tree into its unsuppressed differences.
///
/// Each emitted record covers its whole subtree; unchanged containers and
/// suppressed nodes are traversed, not emitted, so real differences nested
/// under them still surface.
pub fn flatten(root: &DiffNode) -> Vec<DiffRecord> {
    let mut records = Vec::new();
    collect_records(root, "", &mut records);
    records
}

fn collect_records(node: &DiffNode, prefix: &str, records: &mut Vec<DiffRecord>) {
    let path = if prefix.is_empty() {
        node.name.clone()
    } else {
        format!("{}.{}", prefix, node.name)
    };
    if node.kind == DiffKind::Unchanged || node.filtered {
        for child in node.children.iter().flatten() {
            collect_records(child, &path, records);
        }
        return;
    }
    let record = match node.kind {
        DiffKind::Added => DiffRecord::Added {
            path,
            value: node.right_value.clone().unwrap_or(Value::Null),
        },
        DiffKind::Removed => DiffRecord::Removed {
            path,
            value: node.left_value.clone().unwrap_or(Value::Null),
        },
        DiffKind::Changed => DiffRecord::Changed {
            path,
            left: node.left_value.clone().unwrap_or(Value::Null),
            right: node.right_value.clone().unwrap_or(Value::Null),
        },
        DiffKind::Unchanged => return,
    };
    records.push(record);
}

/// A summary of the differences between the documents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffSummary {
    /// The number of values that exist only in the *right* document.
    pub added: u64,
    /// The number of values that exist only in the *left* document.
    pub removed: u64,
    /// The number of values that exist in both documents but differ.
    pub changed: u64,
    /// The number of differences suppressed by the [`DiffFilter`].
    pub filtered: u64,
}

impl DiffSummary {
    /// Returns the total number of unsuppressed differences.
    pub fn total(&self) -> u64 {
        self.added + self.removed + self.changed
    }

    /// Updates the summary per the [`DiffRecord`].
    pub fn update(&mut self, record: &DiffRecord) {
        match record {
            DiffRecord::Added { .. } => self.added += 1,
            DiffRecord::Removed { .. } => self.removed += 1,
            DiffRecord::Changed { .. } => self.changed += 1,
        }
    }

    /// Summarizes a diff-tree, counting each difference subtree once.
    pub fn of_tree(root: &DiffNode) -> Self {
        let mut summary = Self::default();
        summary.scan(root);
        summary
    }

    fn scan(&mut self, node: &DiffNode) {
        if node.kind == DiffKind::Unchanged || node.filtered {
            if node.filtered {
                self.filtered += 1;
            }
            for child in node.children.iter().flatten() {
                self.scan(child);
            }
            return;
        }
        match node.kind {
            DiffKind::Added => self.added += 1,
            DiffKind::Removed => self.removed += 1,
            DiffKind::Changed => self.changed += 1,
            DiffKind::Unchanged => {}
        }
    }
}

/// Writes differences to an output destination.
pub trait DiffWriter {
    /// Writes a [`DiffRecord`] to the output.
    fn write(&mut self, record: &DiffRecord) -> Result<(), Box<dyn Error + Send + Sync>>;

    /// Finalizes the output then returns the [`DiffSummary`].
    fn summarize(&mut self) -> Result<DiffSummary, Box<dyn Error + Send + Sync>>;
}

/// Initializes a [JSON Lines](https://jsonlines.org/) [`DiffWriter`] for the `output`.
pub fn new_jsonl_writer<W: Write + 'static>(output: W) -> Box<dyn DiffWriter> {
    Box::new(JsonLinesWriter {
        output,
        summary: DiffSummary::default(),
    })
}

struct JsonLinesWriter<W: Write> {
    output: W,
    summary: DiffSummary,
}

impl<W: Write> DiffWriter for JsonLinesWriter<W> {
    fn write(&mut self, record: &DiffRecord) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.summary.update(record);
        writeln!(self.output, "{}", serde_json::to_string(record)?)?;
        Ok(())
    }

    fn summarize(&mut self) -> Result<DiffSummary, Box<dyn Error + Send + Sync>> {
        self.output.flush()?;
        Ok(self.summary.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(text: &str) -> Value {
        serde_json::from_str(text).unwrap()
    }

    fn diff(left: &str, right: &str) -> DiffNode {
        compare(
            Some(&value(left)),
            Some(&value(right)),
            "root",
            &DiffFilter::default(),
        )
    }

    fn view(left: &str, right: &str) -> DiffView {
        let mut view = DiffView::new(ViewOptions::new("left", "right", "results")).unwrap();
        view.set_left(left);
        view.set_right(right);
        view
    }

    fn assert_all_unchanged(node: &DiffNode) {
        assert_eq!(node.kind, DiffKind::Unchanged, "node {}", node.name);
        for child in node.children.iter().flatten() {
            assert_all_unchanged(child);
        }
    }

    #[test]
    fn test_identical_all_unchanged() {
        let root = diff(
            r#"{"a": 1, "b": [true, null, "x"], "c": {"d": 2.5}}"#,
            r#"{"a": 1, "b": [true, null, "x"], "c": {"d": 2.5}}"#,
        );
        assert_all_unchanged(&root);
    }

    #[test]
    fn test_left_only_removed() {
        let left = value(r#"{"a": 1}"#);
        let root = compare(Some(&left), None, "root", &DiffFilter::default());
        assert_eq!(root.kind, DiffKind::Removed);
        let children = root.children.as_ref().unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].kind, DiffKind::Removed);
    }

    #[test]
    fn test_right_only_added() {
        let right = value(r#"[1, 2]"#);
        let root = compare(None, Some(&right), "root", &DiffFilter::default());
        assert_eq!(root.kind, DiffKind::Added);
        let children = root.children.as_ref().unwrap();
        assert_eq!(children.len(), 2);
        assert!(children.iter().all(|c| c.kind == DiffKind::Added));
    }

    #[test]
    fn test_key_union() {
        let root = diff(r#"{"a": 1, "b": 2}"#, r#"{"b": 3, "c": 4}"#);
        let children = root.children.as_ref().unwrap();
        let names: Vec<_> = children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(children[0].kind, DiffKind::Removed);
        assert_eq!(children[1].kind, DiffKind::Changed);
        assert_eq!(children[1].display_value(), "2 => 3");
        assert_eq!(children[2].kind, DiffKind::Added);
    }

    #[test]
    fn test_array_positional() {
        let root = diff("[1, 2, 3]", "[1, 9]");
        let children = root.children.as_ref().unwrap();
        let names: Vec<_> = children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["0", "1", "2"]);
        assert_eq!(children[0].kind, DiffKind::Unchanged);
        assert_eq!(children[1].kind, DiffKind::Changed);
        assert_eq!(children[1].display_value(), "2 => 9");
        assert_eq!(children[2].kind, DiffKind::Removed);
        assert_eq!(children[2].left_value, Some(value("3")));
    }

    #[test]
    fn test_array_indices_sort_numerically() {
        let left = "[0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]";
        let root = diff(left, left);
        let children = root.children.as_ref().unwrap();
        let names: Vec<_> = children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names[1], "1");
        assert_eq!(names[2], "2");
        assert_eq!(names[10], "10");
        assert_eq!(names[11], "11");
    }

    #[test]
    fn test_idempotent() {
        let left = r#"{"a": {"b": [1, 2]}, "c": null}"#;
        let right = r#"{"a": {"b": [1, 3]}, "d": true}"#;
        assert_eq!(diff(left, right), diff(left, right));
    }

    #[test]
    fn test_filter_changed() {
        let filter = DiffFilter::new(vec![], vec![], vec!["b".to_string()]);
        let root = compare(
            Some(&value(r#"{"a": 1, "b": 2}"#)),
            Some(&value(r#"{"b": 3, "c": 4}"#)),
            "root",
            &filter,
        );
        let children = root.children.as_ref().unwrap();
        assert_eq!(children[1].name, "b");
        assert_eq!(children[1].kind, DiffKind::Changed);
        assert!(children[1].filtered);
        assert!(!children[0].filtered);
        assert!(!children[2].filtered);
    }

    #[test]
    fn test_container_type_mismatch() {
        // array vs object: Changed at the container, children by key union
        let root = diff("[1, 2]", r#"{"0": 1, "x": 5}"#);
        assert_eq!(root.kind, DiffKind::Changed);
        let children = root.children.as_ref().unwrap();
        let names: Vec<_> = children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["0", "1", "x"]);
        assert_eq!(children[0].kind, DiffKind::Unchanged);
        assert_eq!(children[1].kind, DiffKind::Removed);
        assert_eq!(children[2].kind, DiffKind::Added);
    }

    #[test]
    fn test_numeric_object_key_is_not_an_index() {
        // "01" parses to 1 but is a distinct key; it must not read the
        // array's index-1 element
        let root = diff("[10, 20]", r#"{"01": 5}"#);
        let children = root.children.as_ref().unwrap();
        let names: Vec<_> = children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["0", "01", "1"]);
        let key = &children[1];
        assert_eq!(key.kind, DiffKind::Added);
        assert_eq!(key.left_value, None);
        assert_eq!(key.right_value, Some(value("5")));
        let index = &children[2];
        assert_eq!(index.kind, DiffKind::Removed);
        assert_eq!(index.left_value, Some(value("20")));
    }

    #[test]
    fn test_scalar_vs_container() {
        let root = diff("1", r#"{"a": 2}"#);
        assert_eq!(root.kind, DiffKind::Changed);
        assert_eq!(root.display_value(), "1 => ");
        let children = root.children.as_ref().unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].kind, DiffKind::Added);
    }

    #[test]
    fn test_empty_containers() {
        let root = diff("{}", "[]");
        assert_eq!(root.kind, DiffKind::Changed);
        assert_eq!(root.children.as_ref().unwrap().len(), 0);
        let root = diff("{}", "{}");
        assert_eq!(root.kind, DiffKind::Unchanged);
    }

    #[test]
    fn test_null_scalars() {
        let root = diff("null", "null");
        assert_eq!(root.kind, DiffKind::Unchanged);
        let root = diff("null", "false");
        assert_eq!(root.kind, DiffKind::Changed);
    }

    #[test]
    fn test_display_quotes_strings() {
        let root = diff(r#"{"a": "x"}"#, r#"{"a": "y"}"#);
        let children = root.children.as_ref().unwrap();
        assert_eq!(children[0].display_value(), "\"x\" => \"y\"");
        assert_eq!(children[0].label(), "a: \"x\" => \"y\"");
    }

    #[test]
    fn test_container_label_has_no_value() {
        let root = diff(r#"{"a": 1}"#, r#"{"a": 1}"#);
        assert_eq!(root.label(), "root:");
    }

    #[test]
    fn test_diff_kind_tags() {
        assert_eq!(DiffKind::Added.tag(), "Added");
        assert_eq!(DiffKind::tags().len(), 4);
        assert!(DiffKind::tags().contains(&"Unchanged"));
    }

    #[test]
    fn test_view_missing_option() {
        assert!(DiffView::new(ViewOptions::new("", "right", "results")).is_err());
        assert!(DiffView::new(ViewOptions::new("left", "right", "")).is_err());
        assert!(DiffView::new(ViewOptions::new("left", "right", "results")).is_ok());
    }

    #[test]
    fn test_compare_malformed_left_preserves_tree() {
        let mut view = view(r#"{"a": 1}"#, r#"{"a": 2}"#);
        assert!(view.compare());
        let rows = view.rows();
        assert!(!rows.is_empty());

        view.set_left("{not json");
        assert!(!view.compare());
        assert!(view.left_invalid());
        // the right buffer is never parsed after the left fails
        assert!(!view.right_invalid());
        // the previously rendered tree is untouched
        assert_eq!(view.rows(), rows);

        view.set_left(r#"{"a": 1}"#);
        assert!(view.compare());
        assert!(!view.left_invalid());
    }

    #[test]
    fn test_compare_malformed_right() {
        let mut view = view(r#"{"a": 1}"#, "oops");
        assert!(!view.compare());
        assert!(!view.left_invalid());
        assert!(view.right_invalid());
        assert!(view.tree().is_none());
    }

    #[test]
    fn test_swap_exchanges_buffers_exactly() {
        let mut view = view(r#"{"a": 1}"#, r#"{"b": 2}"#);
        assert!(view.compare());
        let rows = view.rows();
        view.swap();
        assert_eq!(view.left(), r#"{"b": 2}"#);
        assert_eq!(view.right(), r#"{"a": 1}"#);
        // no re-render is triggered
        assert_eq!(view.rows(), rows);
    }

    #[test]
    fn test_clear() {
        let mut view = view(r#"{"a": 1}"#, r#"{"b": 2}"#);
        view.clear();
        assert!(view.left().is_empty());
        assert!(view.right().is_empty());
    }

    #[test]
    fn test_default_render_reveals_diffs() {
        // only "a.b" differs; "c" is unchanged and starts collapsed
        let mut view = view(
            r#"{"a": {"b": 1}, "c": {"d": 2}}"#,
            r#"{"a": {"b": 9}, "c": {"d": 2}}"#,
        );
        assert!(view.compare());
        let rows = view.rows();
        let labels: Vec<_> = rows.iter().map(|r| r.label.as_str()).collect();
        assert!(labels.contains(&"b: 1 => 9"));
        assert!(labels.contains(&"c:"));
        assert!(!labels.contains(&"d: 2"));
        let c = rows.iter().find(|r| r.label == "c:").unwrap();
        assert!(c.collapsed);
    }

    #[test]
    fn test_default_render_matches_collapse() {
        let mut view = view(
            r#"{"a": {"b": 1}, "c": {"d": 2}}"#,
            r#"{"a": {"b": 9}, "c": {"d": 2}}"#,
        );
        assert!(view.compare());
        let fresh = view.rows();
        view.expand_all();
        view.collapse();
        assert_eq!(view.rows(), fresh);
    }

    #[test]
    fn test_expand_and_collapse_all() {
        let mut view = view(
            r#"{"a": {"b": 1}, "c": {"d": 2}}"#,
            r#"{"a": {"b": 9}, "c": {"d": 2}}"#,
        );
        assert!(view.compare());
        view.expand_all();
        // root, a, b, c, d
        assert_eq!(view.rows().len(), 5);
        view.collapse_all();
        // only the root row remains visible
        assert_eq!(view.rows().len(), 1);
        assert!(view.rows()[0].collapsed);
    }

    #[test]
    fn test_collapse_hides_filtered_branch() {
        // the only difference is suppressed, so every container collapses
        let filter = DiffFilter::new(vec![], vec![], vec!["b".to_string()]);
        let mut view =
            DiffView::new(ViewOptions::new("left", "right", "results").with_filter(filter))
                .unwrap();
        view.set_left(r#"{"a": {"b": 1}}"#);
        view.set_right(r#"{"a": {"b": 2}}"#);
        assert!(view.compare());
        let rows = view.rows();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].collapsed);
    }

    #[test]
    fn test_collapse_searches_through_filtered_branch() {
        // a suppressed container holding a real difference is still opened
        let filter = DiffFilter::new(vec![], vec![], vec!["a".to_string()]);
        let mut view =
            DiffView::new(ViewOptions::new("left", "right", "results").with_filter(filter))
                .unwrap();
        view.set_left(r#"{"a": [1, {"b": 1}]}"#);
        view.set_right(r#"{"a": {"c": 2}}"#);
        assert!(view.compare());
        let labels: Vec<_> = view.rows().iter().map(|r| r.label.clone()).collect();
        assert!(labels.iter().any(|l| l.starts_with("0:")));
        assert!(labels.iter().any(|l| l.starts_with("c:")));
    }

    #[test]
    fn test_toggle() {
        let mut view = view(r#"{"a": {"b": 1}}"#, r#"{"a": {"b": 9}}"#);
        assert!(view.compare());
        let expanded = view.rows().len();
        // collapse the "a" container
        assert!(view.toggle(&[0]));
        assert!(view.rows().len() < expanded);
        assert!(view.toggle(&[0]));
        assert_eq!(view.rows().len(), expanded);
        // leaf rows and invalid paths do not toggle
        assert!(!view.toggle(&[0, 0]));
        assert!(!view.toggle(&[9]));
    }

    #[test]
    fn test_rows_have_paths_and_depths() {
        let mut view = view(r#"{"a": {"b": 1}}"#, r#"{"a": {"b": 9}}"#);
        assert!(view.compare());
        let rows = view.rows();
        assert_eq!(rows[0].path, Vec::<usize>::new());
        assert_eq!(rows[0].depth, 0);
        assert_eq!(rows[1].path, vec![0]);
        assert_eq!(rows[2].path, vec![0, 0]);
        assert_eq!(rows[2].depth, 2);
    }

    #[test]
    fn test_fade_projects_class() {
        let mut view = view("{}", "{}");
        assert_eq!(view.results_class(), "json");
        view.fade_out();
        assert!(view.faded());
        assert_eq!(view.results_class(), "json j-fade");
        view.fade_in();
        assert_eq!(view.results_class(), "json");
    }

    #[test]
    fn test_flatten_records() {
        let root = diff(r#"{"a": 1, "b": 2}"#, r#"{"b": 3, "c": 4}"#);
        let records = flatten(&root);
        assert_eq!(records.len(), 3);
        assert_eq!(
            records[0],
            DiffRecord::Removed {
                path: "root.a".to_string(),
                value: value("1"),
            }
        );
        assert_eq!(records[1].tag(), "Changed");
        assert_eq!(records[2].path(), "root.c");
    }

    #[test]
    fn test_flatten_emits_subtree_once() {
        // an added container yields one record holding the whole subtree
        let root = diff(r#"{}"#, r#"{"a": {"b": [1, 2]}}"#);
        let records = flatten(&root);
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0],
            DiffRecord::Added {
                path: "root.a".to_string(),
                value: value(r#"{"b": [1, 2]}"#),
            }
        );
    }

    #[test]
    fn test_flatten_skips_filtered_but_recurses() {
        let filter = DiffFilter::new(vec![], vec![], vec!["a".to_string()]);
        let root = compare(
            Some(&value(r#"{"a": {"b": 1}}"#)),
            Some(&value(r#"{"a": [2]}"#)),
            "root",
            &filter,
        );
        let records = flatten(&root);
        // "a" itself is suppressed; its children still surface
        assert!(records.iter().all(|r| r.path() != "root.a"));
        assert!(records.iter().any(|r| r.path() == "root.a.b"));
        assert!(records.iter().any(|r| r.path() == "root.a.0"));
    }

    #[test]
    fn test_jsonl_writer() {
        let mut buffer = Vec::new();
        {
            let mut writer = JsonLinesWriter {
                output: &mut buffer,
                summary: DiffSummary::default(),
            };
            let root = diff(r#"{"a": 1, "b": 2}"#, r#"{"b": 3, "c": 4}"#);
            for record in flatten(&root) {
                writer.write(&record).unwrap();
            }
            let summary = writer.summarize().unwrap();
            assert_eq!(summary.added, 1);
            assert_eq!(summary.removed, 1);
            assert_eq!(summary.changed, 1);
            assert_eq!(summary.total(), 3);
        }
        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        let first: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["diff"], "Removed");
        assert_eq!(first["path"], "root.a");
    }

    #[test]
    fn test_summary_counts_filtered() {
        let filter = DiffFilter::new(vec!["c".to_string()], vec![], vec![]);
        let root = compare(
            Some(&value(r#"{"a": 1, "b": 2}"#)),
            Some(&value(r#"{"b": 3, "c": 4}"#)),
            "root",
            &filter,
        );
        let summary = DiffSummary::of_tree(&root);
        assert_eq!(summary.added, 0);
        assert_eq!(summary.removed, 1);
        assert_eq!(summary.changed, 1);
        assert_eq!(summary.filtered, 1);
        assert_eq!(summary.total(), 2);
    }

    #[test]
    fn test_record_tags() {
        let tags = DiffRecord::tags();
        assert_eq!(tags.len(), 3);
        assert!(tags.contains(&"Added"));
        assert!(tags.contains(&"Removed"));
        assert!(tags.contains(&"Changed"));
    }

    #[test]
    fn test_highlighted_rows() {
        let filter = DiffFilter::new(vec![], vec![], vec!["b".to_string()]);
        let root = compare(
            Some(&value(r#"{"a": 1, "b": 2}"#)),
            Some(&value(r#"{"a": 9, "b": 3}"#)),
            "root",
            &filter,
        );
        let tree = RenderTree::new(&root);
        let a = tree.node(&[0]).unwrap();
        let b = tree.node(&[1]).unwrap();
        assert!(a.highlighted());
        assert!(!b.highlighted());
    }
}
