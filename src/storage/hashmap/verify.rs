use rustc_hash::FxHashSet;
use serde::Serialize;

use super::map::ScalableHashMap;
use super::node::{NodeKind, NodeRef};
use crate::primitives::store::{ObjectStore, Persistable};
use crate::storage::MAX_DEPTH;
use crate::types::{ObjectId, Result};

const MAX_FINDINGS: usize = 32;

/// Indicates the severity level of a verification finding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifySeverity {
    /// Suspicious but not structurally wrong.
    Warning,
    /// A broken invariant; lookups or iteration may misbehave.
    Error,
}

/// Represents a single issue discovered during verification.
#[derive(Clone, Debug, Serialize)]
pub struct VerifyFinding {
    /// The severity level of this finding.
    pub severity: VerifySeverity,
    /// Node the finding is about, when there is one.
    pub node: Option<u64>,
    /// Human-readable description of the issue.
    pub message: String,
}

/// Complete report of a verification pass.
#[derive(Clone, Debug, Default, Serialize)]
pub struct VerifyReport {
    /// Whether verification passed without finding any errors.
    pub success: bool,
    /// Issues discovered, capped at a fixed number.
    pub findings: Vec<VerifyFinding>,
    /// Leaves reached from the root.
    pub leaves_checked: u64,
    /// Directories reached from the root.
    pub directories_checked: u64,
    /// Entries inspected across all leaves.
    pub entries_checked: u64,
}

impl VerifyReport {
    fn push(&mut self, severity: VerifySeverity, node: Option<ObjectId>, message: impl Into<String>) {
        if self.findings.len() < MAX_FINDINGS {
            self.findings.push(VerifyFinding {
                severity,
                node: node.map(|id| id.0),
                message: message.into(),
            });
        }
    }

    fn error(&mut self, node: ObjectId, message: impl Into<String>) {
        self.push(VerifySeverity::Error, Some(node), message);
    }
}

struct Frame<K, V> {
    node: NodeRef<K, V>,
    parent: Option<NodeRef<K, V>>,
    /// Hash bits every key below this node shares, left-aligned.
    prefix: u32,
}

/// Top `depth` bits of `hash`.
fn leading(hash: u32, depth: u32) -> u64 {
    u64::from(hash) >> (MAX_DEPTH - depth)
}

impl<K, V> ScalableHashMap<K, V>
where
    K: Persistable,
    V: Persistable,
{
    /// Checks every structural invariant of the map.
    ///
    /// Covers directory slot partitioning, parent links, depth bounds, entry
    /// routing and ordering, per-leaf counts, and agreement between the
    /// leaf chain and the left-to-right order of leaves under the root.
    /// Store failures while reading a node become findings; the returned
    /// error is reserved for failures reading the chain start.
    pub fn verify<S: ObjectStore>(&self, store: &S) -> Result<VerifyReport> {
        let mut report = VerifyReport::default();
        let mut ordered = Vec::new();
        let mut seen = FxHashSet::default();
        let min_depth = self.options().min_depth();
        let mut pending = vec![Frame {
            node: self.root(),
            parent: None,
            prefix: 0,
        }];

        while let Some(frame) = pending.pop() {
            let id = frame.node.id();
            if !seen.insert(id) {
                report.error(id, "node reachable through more than one slot run");
                continue;
            }
            let node = match store.resolve(frame.node) {
                Ok(node) => node,
                Err(err) => {
                    report.error(id, format!("unreadable node: {err}"));
                    continue;
                }
            };
            if node.parent != frame.parent {
                report.error(id, "parent link does not match the referencing directory");
            }
            if node.depth > MAX_DEPTH {
                report.error(id, format!("depth {} exceeds {MAX_DEPTH}", node.depth));
                continue;
            }
            match &node.kind {
                NodeKind::Directory(dir) => {
                    report.directories_checked += 1;
                    if dir.width == 0 || dir.width > self.max_width(node.depth) {
                        report.error(id, format!("directory width {} out of range", dir.width));
                        continue;
                    }
                    if dir.children.len() != 1usize << dir.width {
                        report.error(id, "slot count does not match directory width");
                        continue;
                    }
                    let mut children = Vec::new();
                    let mut start = 0usize;
                    while start < dir.children.len() {
                        let child = dir.children[start];
                        let run = dir.children[start..]
                            .iter()
                            .take_while(|slot| **slot == child)
                            .count();
                        let child_depth = match store.resolve(child) {
                            Ok(child_node) => child_node.depth,
                            Err(err) => {
                                report.error(child.id(), format!("unreadable child: {err}"));
                                start += run;
                                continue;
                            }
                        };
                        let rel = child_depth.saturating_sub(node.depth);
                        if rel == 0 || rel > dir.width {
                            report.error(child.id(), "child depth outside its directory's range");
                        } else {
                            let span = 1usize << (dir.width - rel);
                            if run != span || start % span != 0 {
                                report.error(child.id(), "child slots are not one aligned run");
                            }
                            let bits = (start >> (dir.width - rel)) as u64;
                            let prefix = frame.prefix | (bits << (MAX_DEPTH - child_depth)) as u32;
                            children.push(Frame {
                                node: child,
                                parent: Some(frame.node),
                                prefix,
                            });
                        }
                        start += run;
                    }
                    pending.extend(children.into_iter().rev());
                }
                NodeKind::Leaf(leaf) => {
                    report.leaves_checked += 1;
                    ordered.push(frame.node);
                    if node.depth < min_depth {
                        report.error(id, "leaf shallower than the minimum depth");
                    }
                    let mut seen_entries = 0u32;
                    let mut last = None;
                    for (index, bucket) in leaf.buckets.iter().enumerate() {
                        for entry in bucket {
                            seen_entries += 1;
                            report.entries_checked += 1;
                            if leading(entry.hash, node.depth) != leading(frame.prefix, node.depth) {
                                report.error(id, format!("entry hash {:#010x} routed to the wrong leaf", entry.hash));
                            }
                            if leaf.bucket_index(node.depth, entry.hash) != index {
                                report.error(id, format!("entry hash {:#010x} in the wrong bucket", entry.hash));
                            }
                            if last.is_some_and(|prev| prev >= entry.order()) {
                                report.error(id, "entries out of order");
                            }
                            last = Some(entry.order());
                        }
                    }
                    if seen_entries != leaf.count {
                        report.error(
                            id,
                            format!("leaf count {} but {seen_entries} entries", leaf.count),
                        );
                    }
                }
            }
        }

        self.verify_chain(store, &ordered, &mut report)?;
        report.success = report
            .findings
            .iter()
            .all(|finding| finding.severity != VerifySeverity::Error);
        Ok(report)
    }

    fn verify_chain<S: ObjectStore>(
        &self,
        store: &S,
        ordered: &[NodeRef<K, V>],
        report: &mut VerifyReport,
    ) -> Result<()> {
        let mut previous: Option<NodeRef<K, V>> = None;
        let mut next = Some(self.leftmost(store)?);
        let mut index = 0usize;
        while let Some(leaf_ref) = next {
            if index >= ordered.len() {
                report.error(leaf_ref.id(), "leaf chain longer than the tree's leaf set");
                return Ok(());
            }
            if ordered[index] != leaf_ref {
                report.error(leaf_ref.id(), format!("leaf chain diverges from tree order at position {index}"));
                return Ok(());
            }
            let leaf = match store.resolve(leaf_ref).and_then(|node| node.as_leaf()) {
                Ok(leaf) => leaf,
                Err(err) => {
                    report.error(leaf_ref.id(), format!("unreadable chain leaf: {err}"));
                    return Ok(());
                }
            };
            if leaf.left != previous {
                report.error(leaf_ref.id(), "left link does not point at the previous leaf");
            }
            previous = Some(leaf_ref);
            next = leaf.right;
            index += 1;
        }
        if index != ordered.len() {
            report.push(
                VerifySeverity::Error,
                None,
                format!("leaf chain reaches {index} of {} leaves", ordered.len()),
            );
        }
        Ok(())
    }
}
