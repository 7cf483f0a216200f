//! Flat CSV listing of scanned units.

use std::io::{BufRead, Write};

use serde::{Deserialize, Serialize};

use crate::{
    error::Error,
    traits::Parser,
    types::{TranslationUnit, TreeSnapshot, UnitKind},
};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct UnitRecord {
    pub key: String,
    pub kind: String,
    pub source_text: String,
    pub path: String,
    pub line: Option<usize>,
}

impl From<&TranslationUnit> for UnitRecord {
    fn from(unit: &TranslationUnit) -> Self {
        UnitRecord {
            key: unit.key.clone(),
            kind: match &unit.kind {
                UnitKind::Keyed => "keyed".to_string(),
                UnitKind::DefInjected { .. } => "def_injected".to_string(),
            },
            source_text: unit.source_text.clone(),
            path: unit.path.clone(),
            line: unit.line,
        }
    }
}

/// Rows of a CSV unit listing, header included.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitTable(pub Vec<UnitRecord>);

impl From<&TreeSnapshot> for UnitTable {
    fn from(snapshot: &TreeSnapshot) -> Self {
        UnitTable(snapshot.units.iter().map(UnitRecord::from).collect())
    }
}

impl Parser for UnitTable {
    fn from_reader<R: BufRead>(reader: R) -> Result<Self, Error> {
        let mut rdr = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);
        let mut records = Vec::new();
        for result in rdr.deserialize() {
            records.push(result?);
        }
        Ok(UnitTable(records))
    }

    fn to_writer<W: Write>(&self, writer: W) -> Result<(), Error> {
        let mut wtr = csv::WriterBuilder::new().from_writer(writer);
        for record in &self.0 {
            wtr.serialize(record)?;
        }
        wtr.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_round_trip() {
        let unit = TranslationUnit::keyed("ButtonLabel", "Start, \"now\"", "Languages/English/Keyed/UI.xml")
            .with_line(Some(3));
        let table = UnitTable(vec![UnitRecord::from(&unit)]);
        let mut out = Vec::new();
        table.to_writer(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("key,kind,source_text,path,line\n"));
        let parsed = UnitTable::from_str(&text).unwrap();
        assert_eq!(parsed, table);
    }
}
