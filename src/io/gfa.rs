//! GFA 2 line model: the subset of record types the gap filler reads and writes.
//!
//! Segment and gap lines keep their original text so that they can be re-emitted
//! verbatim in the output graph.

use std::fmt::{self, Display, Write as _};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::errors::GapFillError;

/// Orientation of a segment reference
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Orientation {
    Forward,
    Reverse
}

impl Orientation {
    pub fn invert(self) -> Self {
        match self {
            Self::Forward => Self::Reverse,
            Self::Reverse => Self::Forward,
        }
    }

    pub fn symbol(self) -> char {
        match self {
            Self::Forward => '+',
            Self::Reverse => '-',
        }
    }
}

impl TryFrom<char> for Orientation {
    type Error = &'static str;

    fn try_from(value: char) -> Result<Self, Self::Error> {
        match value {
            '+' => Ok(Self::Forward),
            '-' => Ok(Self::Reverse),
            _ => Err("Invalid orientation")
        }
    }
}

impl Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_char(self.symbol())
    }
}

/// An oriented segment reference, e.g. `ctg1+`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SegmentRef {
    pub sid: String,
    pub orient: Orientation,
}

impl TryFrom<&str> for SegmentRef {
    type Error = &'static str;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let last = value.chars().last().ok_or("Empty segment reference")?;
        let orient = Orientation::try_from(last)?;
        let sid = &value[..value.len() - 1];
        if sid.is_empty() {
            return Err("Segment reference without identifier");
        }

        Ok(SegmentRef { sid: sid.to_string(), orient })
    }
}

impl Display for SegmentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.sid, self.orient)
    }
}

/// Represents a GFA tag and value
#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    pub tag: String,
    pub value: FieldValue
}

impl Field {
    pub fn string(tag: &str, value: impl Into<String>) -> Self {
        Field { tag: tag.to_string(), value: FieldValue::String(value.into()) }
    }

    pub fn integer(tag: &str, value: i64) -> Self {
        Field { tag: tag.to_string(), value: FieldValue::Integer(value) }
    }
}

impl TryFrom<&str> for Field {
    type Error = &'static str;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let mut parts = value.trim().splitn(3, ':');

        let tag = parts.next().ok_or("No tag")?;
        let value_type = parts.next().ok_or("No type")?;
        let value = parts.next().ok_or("No value")?;

        let value = match value_type {
            "A" | "Z" => FieldValue::String(value.to_string()),
            "i" => FieldValue::Integer(value.parse().map_err(|_| "Could not parse integer")?),
            "f" => FieldValue::Float(value.parse().map_err(|_| "Could not parse float")?),
            "J" => FieldValue::Json(value.to_string()),
            "H" | "B" => FieldValue::Raw(value_type.to_string(), value.to_string()),
            _ => return Err("Invalid tag")
        };

        Ok(Field { tag: tag.to_string(), value })
    }
}

impl Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            FieldValue::String(v) => write!(f, "{}:Z:{}", self.tag, v),
            FieldValue::Integer(v) => write!(f, "{}:i:{}", self.tag, v),
            FieldValue::Float(v) => write!(f, "{}:f:{}", self.tag, v),
            FieldValue::Json(v) => write!(f, "{}:J:{}", self.tag, v),
            FieldValue::Raw(t, v) => write!(f, "{}:{}:{}", self.tag, t, v),
        }
    }
}

/// Value of a GFA tag. Byte arrays and number lists are carried as raw text.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    String(String),
    Integer(i64),
    Float(f32),
    Json(String),
    Raw(String, String),
}

fn parse_fields(extra: Option<&str>) -> Vec<Field> {
    extra
        .map(|fields| fields.split('\t')
            .filter_map(|v| Field::try_from(v).ok())
            .collect())
        .unwrap_or_default()
}

/// Represents a GFA header
#[derive(Debug)]
pub struct Header {
    pub version: Option<String>,
    pub fields: Vec<Field>,
}

impl TryFrom<&str> for Header {
    type Error = &'static str;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let mut parts = value.trim_end().splitn(2, '\t');

        if parts.next() != Some("H") {
            return Err("Not a header line");
        }

        let fields = parse_fields(parts.next());
        let version = fields.iter()
            .find(|v| v.tag == "VN")
            .and_then(|v| match &v.value {
                FieldValue::String(s) => Some(s.clone()),
                _ => None
            });

        Ok(Header { version, fields })
    }
}

/// A GFA 2 segment, `S <sid> <slen> <sequence> <tag>*`.
///
/// GFA 1 style segments (`S <sid> <sequence> LN:i:<len>`) are accepted too.
#[derive(Debug, Clone)]
pub struct Segment {
    pub sid: String,
    pub length: usize,
    pub sequence: Option<String>,
    pub fields: Vec<Field>,
    pub raw: String,
}

impl Segment {
    /// Path of the file holding this segment's sequence, from the `UR` tag.
    pub fn sequence_path(&self) -> Option<&str> {
        self.fields.iter()
            .find(|f| f.tag == "UR")
            .and_then(|f| match &f.value {
                FieldValue::String(s) => Some(s.as_str()),
                _ => None
            })
    }
}

impl TryFrom<&str> for Segment {
    type Error = &'static str;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let line = value.trim_end();
        let mut parts = line.splitn(3, '\t');

        if parts.next() != Some("S") {
            return Err("Not a segment line");
        }

        let sid = parts.next().ok_or("No sid")?;
        let rest = parts.next().ok_or("Missing segment length or sequence")?;
        let mut rest_parts = rest.splitn(2, '\t');
        let second = rest_parts.next().ok_or("Missing segment length or sequence")?;

        let as_sequence = |s: &str| if s != "*" && !s.is_empty() { Some(s.to_ascii_uppercase()) } else { None };

        let (length, sequence, fields) = if let Ok(slen) = second.parse::<usize>() {
            let mut tail = rest_parts.next().unwrap_or("").splitn(2, '\t');
            let sequence = tail.next().and_then(as_sequence);
            (slen, sequence, parse_fields(tail.next()))
        } else {
            let sequence = as_sequence(second);
            let fields = parse_fields(rest_parts.next());
            let length = fields.iter()
                .find(|f| f.tag == "LN")
                .and_then(|f| match f.value {
                    FieldValue::Integer(v) => usize::try_from(v).ok(),
                    _ => None
                })
                .or_else(|| sequence.as_ref().map(|s| s.len()))
                .ok_or("No segment length")?;

            (length, sequence, fields)
        };

        Ok(Segment { sid: sid.to_string(), length, sequence, fields, raw: line.to_string() })
    }
}

/// A GFA 2 gap, `G <gid> <sid1><o> <sid2><o> <disp> <var> <tag>*`
#[derive(Debug, Clone)]
pub struct GapLine {
    /// `None` when the gap identifier is `*`
    pub gid: Option<String>,
    pub sid1: SegmentRef,
    pub sid2: SegmentRef,
    /// `None` when the displacement is `*`
    pub disp: Option<i64>,
    pub fields: Vec<Field>,
    pub raw: String,
    /// 1-based line number in the input graph
    pub line_no: usize,
}

impl TryFrom<&str> for GapLine {
    type Error = &'static str;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let line = value.trim_end();
        let mut parts = line.splitn(7, '\t');

        if parts.next() != Some("G") {
            return Err("Not a gap line");
        }

        let gid = parts.next().ok_or("Missing gap identifier")?;
        let sid1 = SegmentRef::try_from(parts.next().ok_or("Missing first segment reference")?)?;
        let sid2 = SegmentRef::try_from(parts.next().ok_or("Missing second segment reference")?)?;
        let disp = match parts.next().ok_or("Missing displacement")? {
            "*" => None,
            v => Some(v.parse().map_err(|_| "Could not parse displacement")?),
        };
        // variance is not used
        let _var = parts.next();
        let fields = parse_fields(parts.next());

        Ok(GapLine {
            gid: if gid == "*" { None } else { Some(gid.to_string()) },
            sid1,
            sid2,
            disp,
            fields,
            raw: line.to_string(),
            line_no: 0,
        })
    }
}

/// A position on a segment; `is_end` renders the GFA 2 `$` sentinel.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Position {
    pub value: usize,
    pub is_end: bool,
}

impl Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_end {
            write!(f, "{}$", self.value)
        } else {
            write!(f, "{}", self.value)
        }
    }
}

/// A GFA 2 edge, `E <eid> <sid1><o> <sid2><o> <beg1> <end1> <beg2> <end2> <alignment> <tag>*`
#[derive(Debug, Clone)]
pub struct Edge {
    pub eid: String,
    pub sid1: SegmentRef,
    pub sid2: SegmentRef,
    pub beg1: Position,
    pub end1: Position,
    pub beg2: Position,
    pub end2: Position,
    pub fields: Vec<Field>,
}

impl Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "E\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t*",
            self.eid, self.sid1, self.sid2, self.beg1, self.end1, self.beg2, self.end2
        )?;

        self.fields.iter().try_for_each(|field| write!(f, "\t{}", field))
    }
}

pub enum GfaLine {
    Header(Header),
    Segment(Segment),
    Gap(GapLine),
    Other(String),
}

impl TryFrom<&str> for GfaLine {
    type Error = &'static str;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let first_char = value.chars().next().ok_or("Empty line")?;

        match first_char {
            'H' => Ok(GfaLine::Header(Header::try_from(value)?)),
            'S' => Ok(GfaLine::Segment(Segment::try_from(value)?)),
            'G' => Ok(GfaLine::Gap(GapLine::try_from(value)?)),
            _ => Ok(GfaLine::Other(value.trim_end().to_string())),
        }
    }
}

/// All lines of an input graph, grouped by the role they play for gap filling
#[derive(Default)]
pub struct GraphFile {
    pub header: Option<Header>,
    pub segments: Vec<Segment>,
    pub gaps: Vec<GapLine>,
    /// Every non-empty line, in input order
    pub lines: Vec<String>,
}

impl GraphFile {
    pub fn from_reader(reader: impl BufRead) -> Result<Self, GapFillError> {
        let mut graph = GraphFile::default();

        for (ix, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            let line_no = ix + 1;
            match GfaLine::try_from(line.as_str())
                .map_err(|reason| GapFillError::GfaParse { line: line_no, reason })?
            {
                GfaLine::Header(h) => graph.header = Some(h),
                GfaLine::Segment(s) => graph.segments.push(s),
                GfaLine::Gap(mut g) => {
                    g.line_no = line_no;
                    graph.gaps.push(g)
                },
                GfaLine::Other(_) => (),
            }

            graph.lines.push(line.trim_end().to_string());
        }

        Ok(graph)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, GapFillError> {
        let file = File::open(path.as_ref())?;

        Self::from_reader(BufReader::new(file))
    }

    pub fn segment(&self, sid: &str) -> Option<&Segment> {
        self.segments.iter().find(|s| s.sid == sid)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_header() {
        let header = Header::try_from("H\tVN:Z:2.0").unwrap();
        assert_eq!(header.version, Some("2.0".to_string()));
        assert_eq!(header.fields.len(), 1);
    }

    #[test]
    fn test_parse_gfa2_segment() {
        let segment = Segment::try_from("S\tctg1\t2000\t*\tUR:Z:/data/ctg1.fasta").unwrap();
        assert_eq!(segment.sid, "ctg1");
        assert_eq!(segment.length, 2000);
        assert_eq!(segment.sequence, None);
        assert_eq!(segment.sequence_path(), Some("/data/ctg1.fasta"));
    }

    #[test]
    fn test_parse_gfa1_segment() {
        let segment = Segment::try_from("S\tseg1\tacgt\tLN:i:4").unwrap();
        assert_eq!(segment.sid, "seg1");
        assert_eq!(segment.sequence, Some("ACGT".to_string()));
        assert_eq!(segment.length, 4);
        assert_eq!(segment.fields[0].value, FieldValue::Integer(4));
    }

    #[test]
    fn test_parse_gap() {
        let gap = GapLine::try_from("G\t*\tctg1+\tctg2-\t500\t*").unwrap();
        assert_eq!(gap.gid, None);
        assert_eq!(gap.sid1, SegmentRef { sid: "ctg1".to_string(), orient: Orientation::Forward });
        assert_eq!(gap.sid2, SegmentRef { sid: "ctg2".to_string(), orient: Orientation::Reverse });
        assert_eq!(gap.disp, Some(500));
        assert_eq!(gap.raw, "G\t*\tctg1+\tctg2-\t500\t*");

        let gap = GapLine::try_from("G\tgap7\tctg1-\tctg2+\t*\t*").unwrap();
        assert_eq!(gap.gid.as_deref(), Some("gap7"));
        assert_eq!(gap.disp, None);
    }

    #[test]
    fn test_invalid_gap() {
        assert!(GapLine::try_from("G\t*\tctg1\tctg2-\t500\t*").is_err());
        assert!(GapLine::try_from("G\t*\tctg1+\tctg2-\tabc\t*").is_err());
        assert!(GapLine::try_from("S\t*\tctg1+\tctg2-\t500\t*").is_err());
    }

    #[test]
    fn test_edge_display() {
        let edge = Edge {
            eid: "e1".to_string(),
            sid1: SegmentRef::try_from("ctg1+").unwrap(),
            sid2: SegmentRef::try_from("ctg2-").unwrap(),
            beg1: Position { value: 1898, is_end: false },
            end1: Position { value: 2000, is_end: true },
            beg2: Position { value: 1698, is_end: false },
            end2: Position { value: 1800, is_end: true },
            fields: vec![Field::integer("DP", 314), Field::string("QL", "AA")],
        };

        assert_eq!(
            edge.to_string(),
            "E\te1\tctg1+\tctg2-\t1898\t2000$\t1698\t1800$\t*\tDP:i:314\tQL:Z:AA"
        );
    }

    #[test]
    fn test_graph_file() {
        let input = "H\tVN:Z:2.0\nS\tctg1\t2000\t*\nS\tctg2\t1800\t*\n\nG\t*\tctg1+\tctg2-\t500\t*\n";
        let graph = GraphFile::from_reader(input.as_bytes()).unwrap();

        assert_eq!(graph.segments.len(), 2);
        assert_eq!(graph.gaps.len(), 1);
        assert_eq!(graph.gaps[0].line_no, 5);
        assert_eq!(graph.lines.len(), 4);
        assert_eq!(graph.segment("ctg2").map(|s| s.length), Some(1800));
    }

    #[test]
    fn test_graph_file_reports_line() {
        let input = "H\tVN:Z:2.0\nS\tctg1\n";
        match GraphFile::from_reader(input.as_bytes()) {
            Err(GapFillError::GfaParse { line, .. }) => assert_eq!(line, 2),
            _ => panic!("expected a parse error"),
        }
    }

    #[test]
    fn test_graph_file_keeps_unknown_records() {
        let input = "H\tVN:Z:2.0\nS\tctg1\t2000\t*\nX\tcustom\tfoo\nS\tctg2\t1800\t*\nG\t*\tctg1+\tctg2-\t500\t*\n";
        let graph = GraphFile::from_reader(input.as_bytes()).unwrap();

        assert_eq!(graph.segments.len(), 2);
        assert_eq!(graph.gaps.len(), 1);
        assert_eq!(graph.gaps[0].line_no, 5);
        assert_eq!(graph.lines[2], "X\tcustom\tfoo");
    }
}
