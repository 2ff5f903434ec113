//! Save-side comparison of a freshly encoded scene against the chunk it was
//! loaded from. Differences are reported and logged, never raised.

use std::fmt;

use super::{CLIP_TAG, MAIN_TAG, NAMES_TAG, ORIENTATIONS_TAG, POSITIONS_TAG};
use crate::chunk::Chunk;
use crate::tag::Tag;

/// One container whose old and new contents differ.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerMismatch {
    pub container: Tag,
    pub detail: String,
}

impl fmt::Display for ContainerMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.container, self.detail)
    }
}

/// Outcome of a save-side comparison.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveReport {
    pub mismatches: Vec<ContainerMismatch>,
}

impl SaveReport {
    pub fn is_clean(&self) -> bool {
        self.mismatches.is_empty()
    }

    fn push(&mut self, container: Tag, detail: impl Into<String>) {
        self.mismatches.push(ContainerMismatch {
            container,
            detail: detail.into(),
        });
    }
}

/// Compare the object trees and the name, position and orientation tables.
pub fn compare(previous: &Chunk, current: &Chunk) -> SaveReport {
    let mut report = SaveReport::default();
    for tag in [CLIP_TAG, MAIN_TAG] {
        match (previous.find(tag), current.find(tag)) {
            (Some(old), Some(new)) => compare_tree(tag, old, new, &mut report),
            (old, new) => report_missing(tag, old.is_some(), new.is_some(), &mut report),
        }
    }
    for tag in [NAMES_TAG, POSITIONS_TAG, ORIENTATIONS_TAG] {
        match (previous.find(tag), current.find(tag)) {
            (Some(old), Some(new)) => compare_blob(tag, old, new, &mut report),
            (old, new) => report_missing(tag, old.is_some(), new.is_some(), &mut report),
        }
    }
    for mismatch in &report.mismatches {
        log::warn!("save check: {mismatch}");
    }
    report
}

fn report_missing(tag: Tag, in_old: bool, in_new: bool, report: &mut SaveReport) {
    match (in_old, in_new) {
        (false, true) => report.push(tag, "missing from previous scene"),
        (true, false) => report.push(tag, "missing from encoded scene"),
        _ => {}
    }
}

/// Pre-order `(child count, header bytes)` of every object node.
fn flatten(container: &Chunk) -> Vec<(usize, &[u8])> {
    let mut out = Vec::new();
    let mut stack: Vec<&Chunk> = container.subchunks.iter().rev().collect();
    while let Some(node) = stack.pop() {
        out.push((node.subchunks.len(), node.raw().unwrap_or_default()));
        stack.extend(node.subchunks.iter().rev());
    }
    out
}

fn compare_tree(tag: Tag, old: &Chunk, new: &Chunk, report: &mut SaveReport) {
    if old.subchunks.len() != new.subchunks.len() {
        report.push(
            tag,
            format!(
                "{} roots before, {} after",
                old.subchunks.len(),
                new.subchunks.len()
            ),
        );
        return;
    }
    let (old, new) = (flatten(old), flatten(new));
    if let Some(n) = old.iter().zip(&new).position(|(a, b)| a.0 != b.0) {
        report.push(tag, format!("tree shape differs at object #{}", n + 1));
        return;
    }
    if old.len() != new.len() {
        report.push(tag, format!("{} objects before, {} after", old.len(), new.len()));
        return;
    }
    if let Some(n) = old.iter().zip(&new).position(|(a, b)| a.1 != b.1) {
        report.push(tag, format!("header of object #{} differs", n + 1));
    }
}

fn compare_blob(tag: Tag, old: &Chunk, new: &Chunk, report: &mut SaveReport) {
    let old = old.raw().unwrap_or_default();
    let new = new.raw().unwrap_or_default();
    if old.len() != new.len() {
        report.push(tag, format!("{} bytes before, {} after", old.len(), new.len()));
    } else if let Some(offset) = old.iter().zip(new).position(|(a, b)| a != b) {
        report.push(tag, format!("first difference at byte {offset:#x}"));
    }
}
