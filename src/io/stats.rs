//! Readers for the tab-separated tables of the alignment statistics tool.
//!
//! Both tables have a fixed column layout and carry a precomputed quality letter
//! in their last column.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::errors::GapFillError;
use crate::quality::Grade;

const REF_QRY_COLUMNS: usize = 22;
const QRY_QRY_COLUMNS: usize = 21;

/// A row of the candidate-vs-reference table.
///
/// Columns: Gap, Len_gap, Chunk, k, a, Strand, Solution, Len_Q, Ref, Len_R, Start_ref,
/// End_ref, Start_qry, End_qry, Len_alignR, Len_alignQ, %_Id, %_CovR, %_CovQ, Frame_R,
/// Frame_Q, Quality
#[derive(Clone, Debug, PartialEq)]
pub struct RefQryRow {
    pub strand: String,
    pub solution: String,
    pub reference: String,
    pub quality: Grade,
}

/// A row of the candidate-vs-candidate table.
///
/// Columns: Gap, Len_gap, Chunk, k, a, Solution1, Len_Q1, Solution2, Len_Q2, Start_Q1,
/// End_Q1, Start_Q2, End_Q2, Len_align_Q1, Len_align_Q2, %_Id, %_Cov_Q1, %_Cov_Q2,
/// Frame_Q1, Frame_Q2, Quality
#[derive(Clone, Debug, PartialEq)]
pub struct QryQryRow {
    pub solution1: String,
    pub solution2: String,
    pub quality: Grade,
}

impl TryFrom<&str> for RefQryRow {
    type Error = &'static str;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let cols: Vec<&str> = value.trim_end_matches(['\r', '\n']).split('\t').collect();
        if cols.len() != REF_QRY_COLUMNS {
            return Err("Unexpected number of columns");
        }

        Ok(RefQryRow {
            strand: cols[5].to_string(),
            solution: cols[6].to_string(),
            reference: cols[8].to_string(),
            quality: Grade::try_from(cols[21])?,
        })
    }
}

impl TryFrom<&str> for QryQryRow {
    type Error = &'static str;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let cols: Vec<&str> = value.trim_end_matches(['\r', '\n']).split('\t').collect();
        if cols.len() != QRY_QRY_COLUMNS {
            return Err("Unexpected number of columns");
        }

        Ok(QryQryRow {
            solution1: cols[5].to_string(),
            solution2: cols[7].to_string(),
            quality: Grade::try_from(cols[20])?,
        })
    }
}

/// Read all rows of a statistics table. A missing table is a fatal error for the run.
pub fn read_table<T>(path: &Path) -> Result<Vec<T>, GapFillError>
where
    T: for<'a> TryFrom<&'a str, Error = &'static str>,
{
    if !path.is_file() {
        return Err(GapFillError::MissingStatistics(path.to_path_buf()));
    }

    let reader = BufReader::new(File::open(path)?);
    let mut rows = Vec::new();
    for (ix, line) in reader.lines().enumerate() {
        let line = line?;
        // header line, if the tool wrote one
        if line.trim().is_empty() || line.starts_with("Gap\t") {
            continue;
        }

        let row = T::try_from(line.as_str())
            .map_err(|reason| GapFillError::StatsParse { path: path.to_path_buf(), line: ix + 1, reason })?;
        rows.push(row);
    }

    Ok(rows)
}


#[cfg(test)]
mod tests {
    use super::*;

    const REF_ROW: &str = "g1\t500\t2000\t51\t3\tfwd\t1/1\t620\tctg1\t2000\t1898\t2000\t1\t102\t102\t102\t99.5\t100\t16.4\t1\t1\tA";
    const QRY_ROW: &str = "g1\t500\t2000\t51\t3\tfwd_1/1\t620\trev_1/1\t620\t1\t620\t620\t1\t620\t620\t100\t100\t100\t1\t-1\tB";

    #[test]
    fn test_parse_ref_row() {
        let row = RefQryRow::try_from(REF_ROW).unwrap();
        assert_eq!(row.strand, "fwd");
        assert_eq!(row.solution, "1/1");
        assert_eq!(row.reference, "ctg1");
        assert_eq!(row.quality, Grade::A);
    }

    #[test]
    fn test_parse_qry_row() {
        let row = QryQryRow::try_from(QRY_ROW).unwrap();
        assert_eq!(row.solution1, "fwd_1/1");
        assert_eq!(row.solution2, "rev_1/1");
        assert_eq!(row.quality, Grade::B);
    }

    #[test]
    fn test_bad_rows() {
        assert!(RefQryRow::try_from("g1\t500").is_err());
        assert!(QryQryRow::try_from(&QRY_ROW.replace("\tB", "\tZ")[..]).is_err());
    }

    #[test]
    fn test_read_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.ref_qry.alignment.stats");
        std::fs::write(&path, format!("{REF_ROW}\n\n{REF_ROW}\n")).unwrap();
        let rows: Vec<RefQryRow> = read_table(&path).unwrap();
        assert_eq!(rows.len(), 2);

        let missing = dir.path().join("missing.stats");
        match read_table::<QryQryRow>(&missing) {
            Err(GapFillError::MissingStatistics(p)) => assert_eq!(p, missing),
            _ => panic!("expected missing statistics error"),
        }
    }

    #[test]
    fn test_read_table_ignores_identity_values() {
        let dir = tempfile::tempdir().unwrap();
        let ref_path = dir.path().join("x.ref_qry.alignment.stats");
        let qry_path = dir.path().join("x.qry_qry.alignment.stats");
        std::fs::write(&ref_path, format!("{REF_ROW}\n{}\n", REF_ROW.replace("\t99.5\t", "\tNA\t"))).unwrap();
        std::fs::write(&qry_path, format!("{}\n", QRY_ROW.replace("\t100\t100\t100\t", "\t-\t100\t100\t"))).unwrap();

        let rows: Vec<RefQryRow> = read_table(&ref_path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].quality, Grade::A);

        let rows: Vec<QryQryRow> = read_table(&qry_path).unwrap();
        assert_eq!(rows[0].solution2, "rev_1/1");
        assert_eq!(rows[0].quality, Grade::B);
    }
}
