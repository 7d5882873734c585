//! Well addressing: parse `<Row><Column>[.<Container>]` references and
//! resolve them against the containers registered on the deck.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{PlanError, PlanResult};

/// Row/column geometry shared by the tube racks and plates on the deck.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WellGrid {
    /// Number of rows, lettered from `A`
    pub rows: u8,
    /// Number of columns, numbered from 1
    pub columns: u8,
}

impl Default for WellGrid {
    /// 24-position rack / plate (A–D × 1–6)
    fn default() -> Self {
        Self { rows: 4, columns: 6 }
    }
}

impl WellGrid {
    /// Wells per container
    pub fn capacity(&self) -> usize {
        self.rows as usize * self.columns as usize
    }

    pub fn contains(&self, address: &WellAddress) -> bool {
        address.row_index() < self.rows && address.column >= 1 && address.column <= self.columns
    }

    /// Reject addresses that fall outside the grid
    pub fn check(&self, address: &WellAddress) -> PlanResult<()> {
        if address.row_index() >= self.rows {
            return Err(PlanError::malformed(
                address.to_string(),
                format!("row {} is outside A-{}", address.row, self.last_row()),
            ));
        }
        if address.column < 1 || address.column > self.columns {
            return Err(PlanError::malformed(
                address.to_string(),
                format!("column {} is outside 1-{}", address.column, self.columns),
            ));
        }
        Ok(())
    }

    /// Row-major position of a well inside its container (A1 = 0)
    pub fn linear_index(&self, address: &WellAddress) -> usize {
        address.row_index() as usize * self.columns as usize + (address.column as usize - 1)
    }

    /// The next well in row-major order within the same container
    pub fn successor(&self, address: &WellAddress) -> Option<WellAddress> {
        let next = self.linear_index(address) + 1;
        if next >= self.capacity() {
            return None;
        }
        Some(self.well_at(next, address.container_index))
    }

    fn well_at(&self, index: usize, container_index: u8) -> WellAddress {
        let columns = self.columns as usize;
        WellAddress {
            row: (b'A' + (index / columns) as u8) as char,
            column: (index % columns) as u8 + 1,
            container_index,
        }
    }

    fn last_row(&self) -> char {
        (b'A' + self.rows.saturating_sub(1)) as char
    }
}

/// A single well: row letter, column number, and 1-based container index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WellAddress {
    pub row: char,
    pub column: u8,
    pub container_index: u8,
}

impl WellAddress {
    pub fn new(row: char, column: u8, container_index: u8) -> Self {
        Self {
            row: row.to_ascii_uppercase(),
            column,
            container_index,
        }
    }

    /// Parse and bounds-check against the configured grid.
    pub fn parse(input: &str, grid: &WellGrid) -> PlanResult<Self> {
        let address: WellAddress = input.parse()?;
        grid.check(&address).map_err(|e| match e {
            PlanError::MalformedAddress { reason, .. } => PlanError::malformed(input, reason),
            other => other,
        })?;
        Ok(address)
    }

    fn row_index(&self) -> u8 {
        (self.row as u8).wrapping_sub(b'A')
    }
}

impl FromStr for WellAddress {
    type Err = PlanError;

    /// Geometry-free parse; container index defaults to 1 when omitted.
    fn from_str(input: &str) -> PlanResult<Self> {
        let trimmed = input.trim();
        let (well, container) = match trimmed.split_once('.') {
            Some((well, container)) => (well, Some(container)),
            None => (trimmed, None),
        };

        let mut chars = well.chars();
        let row = chars
            .next()
            .ok_or_else(|| PlanError::malformed(input, "empty address"))?
            .to_ascii_uppercase();
        if !row.is_ascii_uppercase() {
            return Err(PlanError::malformed(input, "row must be a letter"));
        }

        let column = parse_index(chars.as_str(), input, "column")?;
        let container_index = match container {
            Some(part) => parse_index(part, input, "container index")?,
            None => 1,
        };

        Ok(Self {
            row,
            column,
            container_index,
        })
    }
}

fn parse_index(part: &str, input: &str, what: &str) -> PlanResult<u8> {
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(PlanError::malformed(input, format!("{what} must be numeric")));
    }
    match part.parse::<u8>() {
        Ok(0) | Err(_) => Err(PlanError::malformed(
            input,
            format!("{what} must be between 1 and 255"),
        )),
        Ok(value) => Ok(value),
    }
}

impl fmt::Display for WellAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}.{}", self.row, self.column, self.container_index)
    }
}

impl Serialize for WellAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for WellAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// What sort of labware a container index refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerKind {
    TubeRack,
    Plate,
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TubeRack => write!(f, "tube rack"),
            Self::Plate => write!(f, "plate"),
        }
    }
}

/// A registered piece of labware on the deck.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRef {
    pub kind: ContainerKind,
    /// 1-based index used as the address suffix
    pub index: u8,
    pub deck_slot: u8,
    pub labware: String,
}

/// Deck slot and labware definition for one container, as configured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabwareSlot {
    pub deck_slot: u8,
    pub labware: String,
}

impl LabwareSlot {
    pub fn new(deck_slot: u8, labware: impl Into<String>) -> Self {
        Self {
            deck_slot,
            labware: labware.into(),
        }
    }
}

/// Index → container mapping for one kind of labware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerTable {
    kind: ContainerKind,
    containers: BTreeMap<u8, ContainerRef>,
}

impl ContainerTable {
    pub fn new(kind: ContainerKind) -> Self {
        Self {
            kind,
            containers: BTreeMap::new(),
        }
    }

    /// Build a table where the n-th slot becomes container index n (1-based).
    pub fn from_slots(kind: ContainerKind, slots: &[LabwareSlot]) -> PlanResult<Self> {
        if slots.len() > u8::MAX as usize {
            return Err(PlanError::config(format!(
                "at most {} {kind} containers are supported",
                u8::MAX
            )));
        }
        let mut table = Self::new(kind);
        for (position, slot) in slots.iter().enumerate() {
            table.register((position + 1) as u8, slot);
        }
        Ok(table)
    }

    pub fn register(&mut self, index: u8, slot: &LabwareSlot) {
        self.containers.insert(
            index,
            ContainerRef {
                kind: self.kind,
                index,
                deck_slot: slot.deck_slot,
                labware: slot.labware.clone(),
            },
        );
    }

    pub fn kind(&self) -> ContainerKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.containers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }

    /// Look up the container an address points into.
    pub fn resolve(&self, address: &WellAddress) -> PlanResult<&ContainerRef> {
        self.containers
            .get(&address.container_index)
            .ok_or_else(|| PlanError::UnknownContainer {
                address: address.to_string(),
                kind: self.kind,
                index: address.container_index,
            })
    }
}

/// Every container the planner may address, split by labware kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deck {
    pub racks: ContainerTable,
    pub plates: ContainerTable,
}

impl Deck {
    pub fn new(racks: &[LabwareSlot], plates: &[LabwareSlot]) -> PlanResult<Self> {
        Ok(Self {
            racks: ContainerTable::from_slots(ContainerKind::TubeRack, racks)?,
            plates: ContainerTable::from_slots(ContainerKind::Plate, plates)?,
        })
    }

    /// Number of tube racks registered (the configured container count)
    pub fn number_of_containers(&self) -> usize {
        self.racks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> WellGrid {
        WellGrid::default()
    }

    #[test]
    fn test_parse_with_container() {
        let addr = WellAddress::parse("B3.2", &grid()).unwrap();
        assert_eq!(addr, WellAddress::new('B', 3, 2));
    }

    #[test]
    fn test_parse_implicit_container() {
        let addr = WellAddress::parse("D6", &grid()).unwrap();
        assert_eq!(addr.container_index, 1);
        assert_eq!(addr, WellAddress::parse("D6.1", &grid()).unwrap());
    }

    #[test]
    fn test_parse_normalises_lowercase_and_whitespace() {
        let addr = WellAddress::parse(" a1.3 ", &grid()).unwrap();
        assert_eq!(addr.to_string(), "A1.3");
    }

    #[test]
    fn test_parse_rejects_row_outside_grid() {
        let err = WellAddress::parse("E1", &grid()).unwrap_err();
        match err {
            PlanError::MalformedAddress { input, reason } => {
                assert_eq!(input, "E1");
                assert!(reason.contains("row"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_parse_rejects_bad_parts() {
        for bad in ["", "11", "A", "A0", "A7", "Ax", "A1.", "A1.x", "A1.0", "A1.1.1", "A1.300"] {
            assert!(
                matches!(
                    WellAddress::parse(bad, &grid()),
                    Err(PlanError::MalformedAddress { .. })
                ),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_round_trip_through_display() {
        for input in ["A1", "B3.1", "C6.3", "d2.2"] {
            let parsed = WellAddress::parse(input, &grid()).unwrap();
            let reparsed = WellAddress::parse(&parsed.to_string(), &grid()).unwrap();
            assert_eq!(parsed, reparsed);
        }
    }

    #[test]
    fn test_successor_wraps_rows_and_stops_at_end() {
        let g = grid();
        let a6 = WellAddress::new('A', 6, 2);
        assert_eq!(g.successor(&a6), Some(WellAddress::new('B', 1, 2)));
        assert_eq!(g.successor(&WellAddress::new('D', 6, 1)), None);
        assert_eq!(g.linear_index(&WellAddress::new('B', 1, 1)), 6);
    }

    #[test]
    fn test_resolve_registered_and_unknown_container() {
        let deck = Deck::new(
            &[
                LabwareSlot::new(4, "tuberack"),
                LabwareSlot::new(5, "tuberack"),
            ],
            &[LabwareSlot::new(2, "plate")],
        )
        .unwrap();

        let rack = deck.racks.resolve(&WellAddress::new('A', 1, 2)).unwrap();
        assert_eq!(rack.deck_slot, 5);
        assert_eq!(deck.number_of_containers(), 2);

        let err = deck.plates.resolve(&WellAddress::new('A', 1, 2)).unwrap_err();
        assert_eq!(
            err,
            PlanError::UnknownContainer {
                address: "A1.2".into(),
                kind: ContainerKind::Plate,
                index: 2,
            }
        );
    }

    #[test]
    fn test_serde_uses_canonical_string() {
        let addr = WellAddress::new('C', 4, 1);
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, "\"C4.1\"");
        let back: WellAddress = serde_json::from_str("\"c4\"").unwrap();
        assert_eq!(back, addr);
    }
}
