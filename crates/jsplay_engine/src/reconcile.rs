//! Line Reconciler.
//!
//! Maps the records of a run onto stable output slots. A slot is keyed by the
//! identity of the statement that produced it, so editing one line never
//! shifts or clears the output of another.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use jsplay_runtime::{OutputKind, OutputRecord, RecordOrigin, RenderedContent, ScopeEntry};
use log::{trace, warn};
use serde::Serialize;

use crate::preprocess::{SourceStatement, output_call_count};

/// Identity of a statement across edits.
///
/// `occurrence` tells textually identical statements apart, counted top-down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SlotKey {
    pub hash: u32,
    pub occurrence: u32,
}

impl std::fmt::Display for SlotKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:08x}#{}", self.hash, self.occurrence)
    }
}

/// Keys for `statements`, in order
pub fn slot_keys(statements: &[SourceStatement]) -> Vec<SlotKey> {
    let mut seen: HashMap<u32, u32> = HashMap::new();
    statements
        .iter()
        .map(|statement| {
            let occurrence = seen.entry(statement.content_hash).or_default();
            let key = SlotKey {
                hash: statement.content_hash,
                occurrence: *occurrence,
            };
            *occurrence += 1;
            key
        })
        .collect()
}

/// The latest output of one statement
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputSlot {
    pub key: SlotKey,
    pub line: u32,
    pub end_line: u32,
    pub kind: OutputKind,
    pub content: RenderedContent,
    pub last_record_sequence: u64,
    /// Timestamp of the newest record in the slot
    pub timestamp: String,
    /// Bumped every time the content changes
    pub revision: u32,
}

impl OutputSlot {
    fn same_output(&self, other: &OutputSlot) -> bool {
        self.kind == other.kind && self.content == other.content
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "change", content = "key", rename_all = "snake_case")]
pub enum SlotChange {
    Added(SlotKey),
    Updated(SlotKey),
    /// Same output as before; only the position may have moved
    Unchanged(SlotKey),
    /// The statement is still there but produced nothing this run
    Cleared(SlotKey),
    /// The statement is gone from the source
    Removed(SlotKey),
}

impl SlotChange {
    pub fn key(&self) -> SlotKey {
        match self {
            Self::Added(k) | Self::Updated(k) | Self::Unchanged(k) | Self::Cleared(k) | Self::Removed(k) => *k,
        }
    }
}

#[derive(Debug, Default)]
pub struct LineReconciler {
    slots: IndexMap<SlotKey, OutputSlot>,
}

impl LineReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live slots ordered by line
    pub fn slots(&self) -> Vec<OutputSlot> {
        self.slots.values().cloned().collect()
    }

    pub fn get(&self, key: &SlotKey) -> Option<&OutputSlot> {
        self.slots.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// Slots shown while a job is still running, without touching the current
    /// state. Statements that have not produced output yet keep their
    /// committed slot; only the finished run may clear it.
    pub fn preview(&self, statements: &[SourceStatement], records: &[OutputRecord]) -> Vec<OutputSlot> {
        let mut produced: HashMap<SlotKey, OutputSlot> =
            assign(statements, records).into_iter().map(|slot| (slot.key, slot)).collect();

        slot_keys(statements)
            .into_iter()
            .zip(statements)
            .filter_map(|(key, statement)| match (produced.remove(&key), self.slots.get(&key)) {
                (Some(mut slot), previous) => {
                    if let Some(previous) = previous {
                        slot.revision = previous.revision + u32::from(!previous.same_output(&slot));
                    }
                    Some(slot)
                }
                (None, Some(previous)) => Some(OutputSlot {
                    line: statement.start_line,
                    end_line: statement.end_line,
                    ..previous.clone()
                }),
                (None, None) => None,
            })
            .collect()
    }

    /// Replaces the slot state with the outcome of a finished run
    pub fn reconcile(&mut self, statements: &[SourceStatement], records: &[OutputRecord]) -> Vec<SlotChange> {
        let live: HashSet<SlotKey> = slot_keys(statements).into_iter().collect();
        let assigned = assign(statements, records);
        let produced: HashSet<SlotKey> = assigned.iter().map(|slot| slot.key).collect();

        let mut changes = vec![];
        for key in self.slots.keys() {
            if produced.contains(key) {
                continue;
            }
            if live.contains(key) {
                changes.push(SlotChange::Cleared(*key));
            } else {
                changes.push(SlotChange::Removed(*key));
            }
        }

        let mut next = IndexMap::with_capacity(assigned.len());
        for mut slot in assigned {
            let change = match self.slots.get(&slot.key) {
                None => SlotChange::Added(slot.key),
                Some(previous) if previous.same_output(&slot) => {
                    slot.revision = previous.revision;
                    SlotChange::Unchanged(slot.key)
                }
                Some(previous) => {
                    slot.revision = previous.revision + 1;
                    SlotChange::Updated(slot.key)
                }
            };
            changes.push(change);
            next.insert(slot.key, slot);
        }

        trace!("reconciled {} records into {} slots", records.len(), next.len());
        self.slots = next;
        changes
    }
}

/// Distributes `records` over `statements`.
///
/// Console records are matched by position: each output-producing statement
/// takes as many records as it has console calls, in textual order, and any
/// surplus (loops) goes to the last output-capable statement. Diagnostics go to
/// the statement containing their line hint.
fn assign(statements: &[SourceStatement], records: &[OutputRecord]) -> Vec<OutputSlot> {
    if statements.is_empty() {
        if !records.is_empty() {
            warn!("dropping {} records with no statements to attach to", records.len());
        }
        return vec![];
    }

    let keys = slot_keys(statements);
    let last = statements.len() - 1;
    let overflow_target = statements
        .iter()
        .rposition(|statement| statement.produces_output)
        .unwrap_or(last);

    // one entry per console call, in textual order
    let console_targets: Vec<usize> = statements
        .iter()
        .enumerate()
        .filter(|(_, statement)| statement.produces_output)
        .flat_map(|(index, statement)| std::iter::repeat_n(index, output_call_count(&statement.code).max(1)))
        .collect();

    let mut ordered = records.iter().collect::<Vec<_>>();
    ordered.sort_by_key(|record| record.sequence);

    let mut buckets: Vec<Vec<&OutputRecord>> = vec![vec![]; statements.len()];
    let mut console_index = 0;
    for record in ordered {
        let target = match record.origin {
            RecordOrigin::Console => {
                let target = console_targets.get(console_index).copied().unwrap_or(overflow_target);
                console_index += 1;
                target
            }
            RecordOrigin::Truncation => overflow_target,
            origin => record
                .line_hint
                .and_then(|line| statements.iter().position(|s| s.contains_line(line)))
                .unwrap_or(if origin == RecordOrigin::Syntax { 0 } else { last }),
        };
        buckets[target].push(record);
    }

    buckets
        .into_iter()
        .enumerate()
        .filter(|(_, bucket)| !bucket.is_empty())
        .map(|(index, bucket)| build_slot(keys[index], &statements[index], &bucket))
        .collect()
}

fn build_slot(key: SlotKey, statement: &SourceStatement, records: &[&OutputRecord]) -> OutputSlot {
    let (first, newest) = (records[0], records[records.len() - 1]);

    let kind = if records
        .iter()
        .any(|r| r.origin.is_diagnostic() && r.kind == OutputKind::Error)
    {
        OutputKind::Error
    } else {
        first.kind
    };

    let content = if records.len() == 1 {
        first.content.clone()
    } else {
        RenderedContent::Text(
            records
                .iter()
                .map(|r| r.content.to_text())
                .collect::<Vec<_>>()
                .join("\n"),
        )
    };

    OutputSlot {
        key,
        line: statement.start_line,
        end_line: statement.end_line,
        kind,
        content,
        last_record_sequence: newest.sequence,
        timestamp: newest.timestamp.clone(),
        revision: 0,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScopeValue {
    pub value: serde_json::Value,
    pub declared_by: SlotKey,
}

/// Variables read back from the last committed run.
///
/// Values are for introspection; they are not injected into later jobs.
#[derive(Debug, Default)]
pub struct PersistentScope {
    values: IndexMap<String, ScopeValue>,
}

impl PersistentScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every name declared at statement level, in source order
    pub fn declared_names(statements: &[SourceStatement]) -> Vec<String> {
        let mut seen = HashSet::new();
        statements
            .iter()
            .flat_map(|statement| statement.declared.iter())
            .filter(|name| seen.insert(name.as_str()))
            .cloned()
            .collect()
    }

    /// Drops variables whose declaring statement is gone
    pub fn retain_declared(&mut self, statements: &[SourceStatement]) {
        let declarations: HashSet<(SlotKey, &str)> = slot_keys(statements)
            .into_iter()
            .zip(statements)
            .flat_map(|(key, statement)| statement.declared.iter().map(move |name| (key, name.as_str())))
            .collect();

        self.values.retain(|name, value| {
            let keep = declarations.contains(&(value.declared_by, name.as_str()));
            if !keep {
                trace!("dropping scope variable {name}");
            }
            keep
        });
    }

    /// Stores `entries`, attributing each to the last statement declaring it
    pub fn commit(&mut self, entries: &[ScopeEntry], statements: &[SourceStatement]) {
        let keys = slot_keys(statements);
        for entry in entries {
            let Some(index) = statements
                .iter()
                .rposition(|statement| statement.declared.contains(&entry.name))
            else {
                continue;
            };
            self.values.insert(
                entry.name.clone(),
                ScopeValue {
                    value: entry.value.to_json(),
                    declared_by: keys[index],
                },
            );
        }
    }

    pub fn get(&self, name: &str) -> Option<&ScopeValue> {
        self.values.get(name)
    }

    pub fn snapshot(&self) -> Vec<(String, serde_json::Value)> {
        self.values
            .iter()
            .map(|(name, value)| (name.clone(), value.value.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}
