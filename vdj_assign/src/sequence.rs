//! Input nucleotide sequences.

use bio::alphabets::dna::revcomp;
use bio::io::fasta;
use serde::Serialize;
use sha2::{Digest, Sha256};
use vdj_types::Strand;

/// A query nucleotide sequence together with its identity and orientation.
///
/// The working sequence is upper-cased with whitespace removed; `input` keeps the
/// raw text as it was read. A `Sequence` is never modified: orientation changes
/// produce a new value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Sequence {
    id: String,
    sequence: String,
    input: String,
    strand: Strand,
}

impl Sequence {
    pub fn new(id: impl Into<String>, input: impl Into<String>) -> Self {
        let input = input.into();
        let sequence = input
            .chars()
            .filter(|c| !c.is_whitespace())
            .map(|c| c.to_ascii_uppercase())
            .collect();
        Sequence {
            id: id.into(),
            sequence,
            input,
            strand: Strand::Plus,
        }
    }

    /// A sequence without an id. The id is the SHA-256 digest of the
    /// normalized sequence, so the same sequence always gets the same id.
    pub fn from_raw(input: impl Into<String>) -> Self {
        let mut seq = Sequence::new(String::new(), input);
        seq.id = hex::encode(Sha256::digest(seq.sequence.as_bytes()));
        seq
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn sequence(&self) -> &str {
        &self.sequence
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn strand(&self) -> Strand {
        self.strand
    }

    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    /// `sequence[start..end]`, with `end` defaulting to the full length. Out of
    /// range bounds are clamped and never panic.
    pub fn region(&self, start: usize, end: Option<usize>) -> &str {
        let end = end.unwrap_or(self.len()).min(self.len());
        let start = start.min(end);
        self.sequence.get(start..end).unwrap_or_default()
    }

    /// The same sequence read from the opposite strand.
    pub fn reverse_complement(&self) -> Sequence {
        Sequence {
            id: self.id.clone(),
            sequence: reverse_complement(&self.sequence),
            input: self.input.clone(),
            strand: self.strand.flip(),
        }
    }

    /// Single record FASTA text of the region starting at `start`.
    pub fn as_fasta(&self, start: usize) -> String {
        format!(">{}\n{}", self.id, self.region(start, None))
    }

    /// A new sequence with the same id made from a sub-region of this one.
    pub fn subsequence(&self, start: usize) -> Sequence {
        Sequence {
            id: self.id.clone(),
            sequence: self.region(start, None).to_string(),
            input: self.region(start, None).to_string(),
            strand: self.strand,
        }
    }
}

/// Reverse complement of a nucleotide string. Gap characters are kept.
pub fn reverse_complement(seq: &str) -> String {
    String::from_utf8_lossy(&revcomp(seq.as_bytes())).into_owned()
}

impl From<(&str, &str)> for Sequence {
    fn from((id, seq): (&str, &str)) -> Self {
        Sequence::new(id, seq)
    }
}

impl From<&fasta::Record> for Sequence {
    fn from(record: &fasta::Record) -> Self {
        Sequence::new(record.id(), String::from_utf8_lossy(record.seq()))
    }
}
