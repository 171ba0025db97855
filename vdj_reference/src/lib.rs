//!
//! Per-species germline gene databases and helper functions
//!
// Warning groups (as of rust 1.55)
#![deny(
    future_incompatible,
    nonstandard_style,
    rust_2018_compatibility,
    rust_2021_compatibility,
    rust_2018_idioms
)]

use anyhow::{Context, Result};
use bio::io::fasta;
use errors::{header_lines, GermlineReferenceErrors, HeaderErrors};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub mod errors;
pub use vdj_types::{GeneType, Segment, VdjChain};

pub(crate) const ALLOWED_NUCLEOTIDES: &str = "ACGTURYKMSWBDHVN";

/// A single germline allele, e.g. `IGHV3-23*01`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GermlineGene {
    name: String,
    segment: Segment,
    sequence: Vec<u8>,
}

impl GermlineGene {
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn segment(&self) -> Segment {
        self.segment
    }
    pub fn seq(&self) -> &[u8] {
        &self.sequence
    }
    pub fn len(&self) -> usize {
        self.sequence.len()
    }
    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }
}

/// Check that a record id names a gene of a known chain and of the given segment.
fn check_gene_name(gene_name: &str, segment: Segment) -> Result<(), HeaderErrors> {
    // +1 skips the '>' of the header line
    let range = 1..gene_name.len() + 1;
    if VdjChain::from_gene_name(gene_name).is_none() {
        return Err(HeaderErrors::UnknownChain {
            range,
            gene_name: gene_name.to_string(),
        });
    }
    if !gene_name.starts_with("VH") && GeneType::from_gene_name(gene_name) != Some(segment.gene_type())
    {
        return Err(HeaderErrors::WrongSegment {
            range,
            gene_name: gene_name.to_string(),
            expected: segment,
        });
    }
    Ok(())
}

/// All germline alleles of one segment for one species.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GermlineSet {
    segment: Segment,
    genes: Vec<GermlineGene>,
    index: HashMap<String, usize>,
}

impl GermlineSet {
    /// Load and validate a germline fasta file. Every header must name a gene of
    /// `segment`, gene names must be unique and sequences may only contain
    /// nucleotide codes. Lower case sequences are upper-cased.
    pub fn from_fasta(fa_file: &Path, segment: Segment) -> Result<Self> {
        if !fa_file.exists() {
            return Err(GermlineReferenceErrors::MissingFasta {
                segment,
                fa_file: fa_file.to_path_buf(),
            }
            .into());
        }
        let reader = fasta::Reader::from_file(fa_file)
            .with_context(|| format!("unable to open {}", fa_file.display()))?;
        let headers = header_lines(fa_file)?;

        let mut genes = Vec::new();
        let mut index = HashMap::new();
        let mut line_of_gene: HashMap<String, Option<usize>> = HashMap::new();
        let mut header_errors = Vec::new();

        for (i, record) in reader.records().enumerate() {
            let record = record.map_err(|error| GermlineReferenceErrors::CannotReadFastaRecord {
                fa_file: fa_file.to_path_buf(),
                last_read: i.checked_sub(1).and_then(|last| headers.get(last)).cloned(),
                error,
            })?;
            let header = headers.get(i);

            let sequence = record.seq().to_ascii_uppercase();
            if sequence.is_empty() {
                return Err(GermlineReferenceErrors::EmptySequence {
                    fa_file: fa_file.to_path_buf(),
                    header: header.cloned(),
                }
                .into());
            }
            if let Some((pos, base)) = sequence
                .iter()
                .enumerate()
                .find(|(_, base)| !ALLOWED_NUCLEOTIDES.as_bytes().contains(base))
            {
                return Err(GermlineReferenceErrors::InvalidBaseInSequence {
                    fa_file: fa_file.to_path_buf(),
                    header: header.cloned(),
                    base: *base as char,
                    offset: pos + 1,
                }
                .into());
            }

            let name = record.id().to_string();
            if let Err(e) = check_gene_name(&name, segment) {
                header_errors.push((header.cloned(), e));
                continue;
            }
            if let Some(&last_line) = line_of_gene.get(&name) {
                header_errors.push((
                    header.cloned(),
                    HeaderErrors::DuplicateGene {
                        range: 1..name.len() + 1,
                        gene_name: name,
                        last_line,
                    },
                ));
                continue;
            }
            line_of_gene.insert(name.clone(), header.map(|h| h.line_num));
            index.insert(name.clone(), genes.len());
            genes.push(GermlineGene {
                name,
                segment,
                sequence,
            });
        }
        if !header_errors.is_empty() {
            return Err(GermlineReferenceErrors::InvalidHeader {
                fa_file: fa_file.to_path_buf(),
                errors: header_errors,
            }
            .into());
        }
        Ok(GermlineSet {
            segment,
            genes,
            index,
        })
    }

    pub fn segment(&self) -> Segment {
        self.segment
    }
    pub fn len(&self) -> usize {
        self.genes.len()
    }
    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }
    pub fn iter(&self) -> impl Iterator<Item = &GermlineGene> {
        self.genes.iter()
    }
    pub fn get(&self, gene_name: &str) -> Option<&GermlineGene> {
        self.index.get(gene_name).map(|&i| &self.genes[i])
    }
    /// Total number of nucleotides in the set, i.e. the database length used
    /// for e-values.
    pub fn total_len(&self) -> usize {
        self.genes.iter().map(GermlineGene::len).sum()
    }
}

impl<'a> IntoIterator for &'a GermlineSet {
    type IntoIter = std::slice::Iter<'a, GermlineGene>;
    type Item = &'a GermlineGene;

    fn into_iter(self) -> Self::IntoIter {
        self.genes.iter()
    }
}

/// The V, D and J germline databases of one species, loaded from
/// `{dir}/{species}_V.fasta`, `{dir}/{species}_D.fasta` and `{dir}/{species}_J.fasta`.
/// Blast formatted copies live under `{dir}/blast/{species}_gl_{segment}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GermlineReference {
    species: String,
    dir: PathBuf,
    v: GermlineSet,
    d: GermlineSet,
    j: GermlineSet,
}

impl GermlineReference {
    pub fn fasta_path(dir: &Path, species: &str, segment: Segment) -> PathBuf {
        dir.join(format!("{}_{segment}.fasta", species.to_lowercase()))
    }

    pub fn load(dir: &Path, species: &str) -> Result<Self> {
        let load = |segment| {
            let fa_file = GermlineReference::fasta_path(dir, species, segment);
            GermlineSet::from_fasta(&fa_file, segment)
                .with_context(|| format!("invalid {species} {segment} germline database"))
        };
        Ok(GermlineReference {
            species: species.to_lowercase(),
            dir: dir.to_path_buf(),
            v: load(Segment::V)?,
            d: load(Segment::D)?,
            j: load(Segment::J)?,
        })
    }

    pub fn species(&self) -> &str {
        &self.species
    }

    pub fn germlines(&self, segment: Segment) -> &GermlineSet {
        match segment {
            Segment::V => &self.v,
            Segment::D => &self.d,
            Segment::J => &self.j,
        }
    }

    pub fn get(&self, segment: Segment, gene_name: &str) -> Option<&GermlineGene> {
        self.germlines(segment).get(gene_name)
    }

    pub fn blast_db(&self, segment: Segment) -> PathBuf {
        self.dir
            .join("blast")
            .join(format!("{}_gl_{segment}", self.species))
    }
}
