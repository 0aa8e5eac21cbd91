use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use flate2::read::MultiGzDecoder;
use noodles::fasta::{self as fasta, record::{Definition, Sequence}, Record};
use noodles::fastq;

use crate::errors::GapFillError;


/// A named sequence with an optional description, as read from or written to FASTA
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SequenceRecord {
    pub name: String,
    pub description: Option<String>,
    pub sequence: Vec<u8>,
}

impl SequenceRecord {
    pub fn new(name: impl Into<String>, description: Option<String>, sequence: Vec<u8>) -> Self {
        Self { name: name.into(), description, sequence }
    }
}

pub fn open_reader(path: &Path) -> Result<Box<dyn BufRead>, GapFillError> {
    let is_gzipped = path.extension().is_some_and(|ext| ext == "gz");

    let reader: Box<dyn BufRead> = if is_gzipped {
        Box::new(File::open(path).map(MultiGzDecoder::new).map(BufReader::new)?)
    } else {
        Box::new(File::open(path).map(BufReader::new)?)
    };

    Ok(reader)
}

fn parse_error(path: &Path) -> impl Fn(std::io::Error) -> GapFillError + '_ {
    move |source| GapFillError::SequenceParse { path: path.to_path_buf(), source }
}

pub fn read_records(path: &Path) -> Result<Vec<SequenceRecord>, GapFillError> {
    let mut reader = fasta::io::Reader::new(open_reader(path)?);

    reader.records()
        .map(|result| {
            let record = result.map_err(parse_error(path))?;

            Ok(SequenceRecord {
                name: String::from_utf8_lossy(record.name()).into_owned(),
                description: record.description()
                    .map(|d| String::from_utf8_lossy(d).into_owned()),
                sequence: record.sequence().as_ref().to_vec(),
            })
        })
        .collect()
}

/// Look up a sequence in a FASTA file, either by record name or, if `name` is
/// `None`, the first record of the file.
pub fn find_sequence(path: &Path, name: Option<&str>) -> Result<Option<Vec<u8>>, GapFillError> {
    let mut reader = fasta::io::Reader::new(open_reader(path)?);

    for result in reader.records() {
        let record = result.map_err(parse_error(path))?;
        let record_name: &[u8] = record.name();

        if name.map_or(true, |n| record_name == n.as_bytes()) {
            return Ok(Some(record.sequence().as_ref().to_ascii_uppercase()));
        }
    }

    Ok(None)
}

pub fn write_records<'a, W, I>(output: W, records: I) -> Result<(), GapFillError>
where
    W: Write,
    I: IntoIterator<Item = &'a SequenceRecord>,
{
    let mut writer = fasta::io::Writer::new(output);

    for rec in records {
        let header = match &rec.description {
            Some(desc) => format!(">{} {}", rec.name, desc),
            None => format!(">{}", rec.name),
        };
        let definition: Definition = header.parse()
            .map_err(|_| GapFillError::InvalidInput(format!("invalid FASTA record name '{}'", rec.name)))?;

        let record = Record::new(definition, Sequence::from(rec.sequence.clone()));
        writer.write_record(&record)?;
    }

    Ok(())
}

pub fn write_records_to_path<'a, I>(path: &Path, records: I) -> Result<(), GapFillError>
where
    I: IntoIterator<Item = &'a SequenceRecord>,
{
    let mut file = File::create(path).map(BufWriter::new)?;
    write_records(&mut file, records)?;
    file.flush()?;

    Ok(())
}

/// Number of FASTQ records in a file. A missing file holds no reads.
pub fn count_fastq_records(path: &Path) -> Result<usize, GapFillError> {
    if !path.exists() {
        return Ok(0);
    }

    let mut reader = fastq::io::Reader::new(open_reader(path)?);
    let mut n = 0;
    for result in reader.records() {
        result.map_err(parse_error(path))?;
        n += 1;
    }

    Ok(n)
}

pub fn complement(base: u8) -> u8 {
    match base {
        b'A' => b'T',
        b'C' => b'G',
        b'G' => b'C',
        b'T' => b'A',
        b'a' => b't',
        b'c' => b'g',
        b'g' => b'c',
        b't' => b'a',
        b'R' => b'Y',
        b'Y' => b'R',
        b'K' => b'M',
        b'M' => b'K',
        b'B' => b'V',
        b'V' => b'B',
        b'D' => b'H',
        b'H' => b'D',
        other => other,
    }
}

pub fn reverse_complement(seq: &[u8]) -> Vec<u8> {
    seq.iter().rev().map(|b| complement(*b)).collect()
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reverse_complement() {
        assert_eq!(reverse_complement(b"AACGTN"), b"NACGTT".to_vec());
        assert_eq!(reverse_complement(b"acg"), b"cgt".to_vec());
        assert!(reverse_complement(b"").is_empty());
    }

    #[test]
    fn test_write_and_find() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seqs.fasta");
        let records = vec![
            SequenceRecord::new("first", None, b"ACGT".to_vec()),
            SequenceRecord::new("second", Some("Quality AB".to_string()), b"ttgg".to_vec()),
        ];
        write_records_to_path(&path, &records).unwrap();

        assert_eq!(find_sequence(&path, None).unwrap(), Some(b"ACGT".to_vec()));
        assert_eq!(find_sequence(&path, Some("second")).unwrap(), Some(b"TTGG".to_vec()));
        assert_eq!(find_sequence(&path, Some("third")).unwrap(), None);

        let read_back = read_records(&path).unwrap();
        assert_eq!(read_back.len(), 2);
        assert_eq!(read_back[1].description.as_deref(), Some("Quality AB"));
    }

    #[test]
    fn test_count_fastq() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reads.fastq");
        std::fs::write(&path, "@r1\nACGT\n+\nIIII\n@r2\nTTTT\n+\nIIII\n").unwrap();

        assert_eq!(count_fastq_records(&path).unwrap(), 2);
        assert_eq!(count_fastq_records(&dir.path().join("missing.fastq")).unwrap(), 0);
    }
}
