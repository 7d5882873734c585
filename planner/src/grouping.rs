//! Co-transfection Grouper
//!
//! Scans entries left to right. A `Co` anchor pulls in the entries that
//! immediately follow it with the same stage key; the scan stops at the first
//! entry whose key differs. Everything else is a singleton group.
//!
//! The scan is deliberately windowed: `Co` rows separated by an unrelated
//! row stay in separate groups, even when their keys match.

use serde::{Deserialize, Serialize};

use crate::address::WellAddress;
use crate::entry::{AggregatedEntry, ReagentEntry, TransfectionKind};
use crate::error::{PlanError, PlanResult};

/// Destination identity that defines a group for a given stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKey {
    DnaDestination,
    DnaAndMixDestination,
    DnaAndPlateDestination,
}

/// Anything carrying the routing fields the grouper keys on.
pub trait Groupable {
    fn kind(&self) -> TransfectionKind;
    fn dna_destination(&self) -> WellAddress;
    fn mix_destination(&self) -> Option<WellAddress>;
    fn plate_destination(&self) -> WellAddress;
}

impl GroupKey {
    pub fn key_of<T: Groupable>(self, item: &T) -> (WellAddress, Option<WellAddress>) {
        match self {
            Self::DnaDestination => (item.dna_destination(), None),
            Self::DnaAndMixDestination => (item.dna_destination(), item.mix_destination()),
            Self::DnaAndPlateDestination => {
                (item.dna_destination(), Some(item.plate_destination()))
            }
        }
    }
}

impl Groupable for ReagentEntry {
    fn kind(&self) -> TransfectionKind {
        self.kind
    }

    fn dna_destination(&self) -> WellAddress {
        self.dna_destination
    }

    fn mix_destination(&self) -> Option<WellAddress> {
        Some(self.mix_destination)
    }

    fn plate_destination(&self) -> WellAddress {
        self.plate_destination
    }
}

impl Groupable for AggregatedEntry {
    fn kind(&self) -> TransfectionKind {
        self.entry.kind
    }

    fn dna_destination(&self) -> WellAddress {
        self.entry.dna_destination
    }

    fn mix_destination(&self) -> Option<WellAddress> {
        Some(self.entry.mix_destination)
    }

    fn plate_destination(&self) -> WellAddress {
        self.entry.plate_destination
    }
}

/// Ordered indices of entries that are handled as one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferGroup {
    members: Vec<usize>,
}

impl TransferGroup {
    pub fn new(members: Vec<usize>) -> Self {
        debug_assert!(!members.is_empty(), "groups are never empty");
        Self { members }
    }

    pub fn members(&self) -> &[usize] {
        &self.members
    }

    pub fn anchor(&self) -> usize {
        self.members[0]
    }

    pub fn last(&self) -> usize {
        self.members[self.members.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Borrow the member items, failing if an index walks past the end.
    pub fn resolve<'a, T>(&self, items: &'a [T]) -> PlanResult<Vec<&'a T>> {
        self.members
            .iter()
            .map(|&index| {
                items.get(index).ok_or(PlanError::GroupingIndexOverrun {
                    index,
                    len: items.len(),
                })
            })
            .collect()
    }

    pub fn anchor_in<'a, T>(&self, items: &'a [T]) -> PlanResult<&'a T> {
        let index = self.anchor();
        items.get(index).ok_or(PlanError::GroupingIndexOverrun {
            index,
            len: items.len(),
        })
    }
}

/// Cluster entries into transfer groups for one stage.
pub fn group<T: Groupable>(items: &[T], key: GroupKey) -> Vec<TransferGroup> {
    let mut groups = Vec::new();
    let mut position = 0;

    while position < items.len() {
        let anchor = &items[position];
        let mut members = vec![position];

        if anchor.kind().is_co() {
            let anchor_key = key.key_of(anchor);
            members.extend(
                items[position + 1..]
                    .iter()
                    .take_while(|item| key.key_of(*item) == anchor_key)
                    .enumerate()
                    .map(|(offset, _)| position + 1 + offset),
            );
        }

        position += members.len();
        groups.push(TransferGroup::new(members));
    }

    groups
}
