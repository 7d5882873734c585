//! Design table ingestion
//!
//! Reads the spreadsheet export (CSV with the template header row) into
//! typed [`ReagentEntry`] records. Blank lines are skipped. The master-mix
//! destination column is optional; without it mix wells are allocated
//! automatically after the last DNA destination.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, Trim};
use planner::{
    assign_mix_destinations, DesignRow, PlannerConfig, ReagentEntry, TransfectionKind, WellAddress,
    WellGrid,
};
use serde::Deserialize;

use crate::error::DesignTableError;

const REQUIRED_COLUMNS: [&str; 7] = [
    "DNA source",
    "DNA destination",
    "Plate destination",
    "Transfection type",
    "Contents",
    "Concentration (ng/uL)",
    "DNA wanted (ng)",
];

/// One CSV record as written by the spreadsheet template.
#[derive(Debug, Deserialize)]
struct RawRow {
    #[serde(rename = "DNA source")]
    source: String,
    #[serde(rename = "DNA destination")]
    dna_destination: String,
    #[serde(rename = "L3K/OM MM destination", alias = "MasterMix destination", default)]
    mix_destination: Option<String>,
    #[serde(rename = "Plate destination")]
    plate_destination: String,
    #[serde(rename = "Transfection type")]
    kind: String,
    #[serde(rename = "Contents")]
    label: String,
    #[serde(rename = "Concentration (ng/uL)")]
    concentration: f64,
    #[serde(rename = "DNA wanted (ng)")]
    mass_wanted: f64,
}

impl RawRow {
    fn into_design_row(self, grid: &WellGrid) -> planner::PlanResult<DesignRow> {
        let mix_destination = match self.mix_destination.as_deref().map(str::trim) {
            Some(mix) if !mix.is_empty() => Some(WellAddress::parse(mix, grid)?),
            _ => None,
        };
        Ok(DesignRow {
            source: WellAddress::parse(&self.source, grid)?,
            dna_destination: WellAddress::parse(&self.dna_destination, grid)?,
            mix_destination,
            plate_destination: WellAddress::parse(&self.plate_destination, grid)?,
            kind: self.kind.parse::<TransfectionKind>()?,
            label: self.label,
            concentration: self.concentration,
            mass_wanted: self.mass_wanted,
        })
    }
}

fn check_headers(headers: &StringRecord) -> Result<(), DesignTableError> {
    for column in REQUIRED_COLUMNS {
        if !headers.iter().any(|h| h == column) {
            return Err(DesignTableError::MissingColumn { column });
        }
    }
    Ok(())
}

/// Parse a design table from any reader. Addresses are checked against the
/// configured grid and allocated mix wells avoid the reagent wells.
pub fn read_design<R: Read>(
    reader: R,
    config: &PlannerConfig,
) -> Result<Vec<ReagentEntry>, DesignTableError> {
    let grid = &config.grid;
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    check_headers(&headers)?;

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record?;
        if record.iter().all(|field| field.is_empty()) {
            continue;
        }
        let line = record.position().map(|p| p.line()).unwrap_or_default();
        let raw: RawRow = record.deserialize(Some(&headers))?;
        let row = raw
            .into_design_row(grid)
            .map_err(|e| DesignTableError::row(line, e))?;
        rows.push(row);
    }

    let allocated = rows.iter().filter(|r| r.mix_destination.is_none()).count();
    let reserved: Vec<WellAddress> = config
        .reagents
        .wells()
        .into_iter()
        .map(|(_, well)| well)
        .collect();
    let entries = assign_mix_destinations(rows, grid, &reserved)?;
    tracing::info!(
        rows = entries.len(),
        allocated_mix_wells = allocated,
        "Design table loaded"
    );
    Ok(entries)
}

pub fn load_design(
    path: &Path,
    config: &PlannerConfig,
) -> Result<Vec<ReagentEntry>, DesignTableError> {
    let file = File::open(path).map_err(|source| DesignTableError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    read_design(file, config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const THREE_RACK: &str = "\
DNA source,DNA destination,L3K/OM MM destination,Plate destination,Transfection type,Contents,Concentration (ng/uL),DNA wanted (ng)
A1.1,D6.1,D6.2,A1.1,Single,mNG,75,500

A2.1,A1.2,A1.3,A2.1,Single,mKO2,50,500

A1.1,A2.2,A2.3,A3.1,Co,mNG,75,250

A2.1,A2.2,A2.3,A3.1,Co,mKO2,50,250
";

    const SINGLE_RACK: &str = "\
DNA source,DNA destination,Plate destination,Transfection type,Contents,Concentration (ng/uL),DNA wanted (ng)
A1,B1,A1,Single,mNG,124.2,500
A2,B2,A2,Single,mKO2,179.9,500
A1,B3,A3,Co,mNG,124.2,250
A2,B3,A3,Co,mKO2,179.9,250
A3,B4,A4,Single,pGW0127,209,500
A4,B5,A5,Single,pGW0132,253,500
A5,B6,A6,Single,pGW0142,198,500
";

    #[test]
    fn test_reads_rows_and_skips_blank_lines() {
        let entries = read_design(THREE_RACK.as_bytes(), &PlannerConfig::default()).unwrap();
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[1].dna_destination.to_string(), "A1.2");
        assert_eq!(entries[1].mix_destination.to_string(), "A1.3");
        assert_eq!(entries[2].kind, TransfectionKind::Co);
        assert_eq!(entries[3].concentration, 50.0);
    }

    #[test]
    fn test_missing_mix_column_allocates_after_last_dna_destination() {
        let entries = read_design(SINGLE_RACK.as_bytes(), &PlannerConfig::default()).unwrap();
        let mixes: Vec<String> = entries.iter().map(|e| e.mix_destination.to_string()).collect();
        assert_eq!(
            mixes,
            vec!["C1.1", "C2.1", "C3.1", "C3.1", "C4.1", "C5.1", "C6.1"]
        );
    }

    #[test]
    fn test_mastermix_header_alias_is_accepted() {
        let csv = "\
DNA source,DNA destination,MasterMix destination,Plate destination,Transfection type,Contents,Concentration (ng/uL),DNA wanted (ng)
A1.1,B1.1,C1.1,A1.1,Poly,pool,100,500
";
        let entries = read_design(csv.as_bytes(), &PlannerConfig::default()).unwrap();
        assert_eq!(entries[0].mix_destination.to_string(), "C1.1");
        assert_eq!(entries[0].kind, TransfectionKind::Poly);
    }

    #[test]
    fn test_missing_required_column() {
        let csv = "DNA source,DNA destination\nA1,B1\n";
        let err = read_design(csv.as_bytes(), &PlannerConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            DesignTableError::MissingColumn {
                column: "Plate destination"
            }
        ));
    }

    #[test]
    fn test_bad_address_reports_line() {
        let csv = "\
DNA source,DNA destination,Plate destination,Transfection type,Contents,Concentration (ng/uL),DNA wanted (ng)
A1,B1,A1,Single,ok,100,500
Q1,B2,A2,Single,bad,100,500
";
        match read_design(csv.as_bytes(), &PlannerConfig::default()).unwrap_err() {
            DesignTableError::Row { line, source } => {
                assert_eq!(line, 3);
                assert!(matches!(source, planner::PlanError::MalformedAddress { .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_transfection_type() {
        let csv = "\
DNA source,DNA destination,Plate destination,Transfection type,Contents,Concentration (ng/uL),DNA wanted (ng)
A1,B1,A1,Triple,x,100,500
";
        let err = read_design(csv.as_bytes(), &PlannerConfig::default()).unwrap_err();
        assert!(matches!(
            err.plan_error(),
            Some(planner::PlanError::UnknownTransfectionType { .. })
        ));
    }

    #[test]
    fn test_non_numeric_concentration_is_csv_error() {
        let csv = "\
DNA source,DNA destination,Plate destination,Transfection type,Contents,Concentration (ng/uL),DNA wanted (ng)
A1,B1,A1,Single,x,lots,500
";
        let err = read_design(csv.as_bytes(), &PlannerConfig::default()).unwrap_err();
        assert!(matches!(err, DesignTableError::Csv(_)));
    }

    #[test]
    fn test_single_rack_design_running_into_reagent_tubes_is_rejected() {
        let csv = "\
DNA source,DNA destination,Plate destination,Transfection type,Contents,Concentration (ng/uL),DNA wanted (ng)
A1,C1,A1,Single,mNG,124.2,500
A2,C2,A2,Single,mKO2,179.9,500
A3,C3,A3,Single,pGW0127,209,500
A4,C4,A4,Single,pGW0132,253,500
";
        let config = PlannerConfig::single_rack();
        let err = read_design(csv.as_bytes(), &config).unwrap_err();
        assert!(matches!(
            err.plan_error(),
            Some(planner::PlanError::MixWellsExhausted { .. })
        ));

        let three = csv.lines().take(4).collect::<Vec<_>>().join("\n");
        let entries = read_design(three.as_bytes(), &config).unwrap();
        assert!(entries
            .iter()
            .all(|e| e.mix_destination != config.reagents.mix_a
                && e.mix_destination != config.reagents.mix_b));
    }
}
