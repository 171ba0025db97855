#![allow(clippy::enum_glob_use)]
use anyhow::Result;
use itertools::Itertools;
use std::fmt::{self, Write};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::ops::Range;
use std::path::{Path, PathBuf};
use vdj_types::Segment;

/// A header line of a FASTA file, used to point errors at a record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeaderLine {
    pub line_num: usize,
    pub header: String,
}

impl fmt::Display for HeaderLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LINE {:5}: {}", self.line_num + 1, self.header)
    }
}

/// Header lines of a FASTA file in record order, so that record `i` is
/// described by element `i`.
pub fn header_lines(fa_file: &Path) -> Result<Vec<HeaderLine>> {
    let mut headers = Vec::new();
    for (line_num, line) in BufReader::new(File::open(fa_file)?).lines().enumerate() {
        let line = line?;
        if line.starts_with('>') {
            headers.push(HeaderLine {
                line_num,
                header: line.trim_end().to_string(),
            });
        }
    }
    Ok(headers)
}

fn describe(header: Option<&HeaderLine>) -> String {
    header.map_or_else(String::new, ToString::to_string)
}

#[derive(Debug)]
pub enum GermlineReferenceErrors {
    MissingFasta {
        segment: Segment,
        fa_file: PathBuf,
    },
    CannotReadFastaRecord {
        fa_file: PathBuf,
        last_read: Option<HeaderLine>,
        error: std::io::Error,
    },
    InvalidBaseInSequence {
        fa_file: PathBuf,
        header: Option<HeaderLine>,
        base: char,
        offset: usize,
    },
    EmptySequence {
        fa_file: PathBuf,
        header: Option<HeaderLine>,
    },
    InvalidHeader {
        fa_file: PathBuf,
        errors: Vec<(Option<HeaderLine>, HeaderErrors)>,
    },
}

impl fmt::Display for GermlineReferenceErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use GermlineReferenceErrors::*;

        fn reading(fa_file: &Path) -> String {
            format!(
                "Error reading the germline fasta file \"{}\" due to:",
                fa_file.display()
            )
        }

        let msg = match self {
            MissingFasta { segment, fa_file } => format!(
                "The germline database for the {segment} segment is missing. Expected a fasta file at \"{}\".",
                fa_file.display()
            ),
            CannotReadFastaRecord {
                fa_file,
                last_read,
                error,
            } => {
                let position_msg = match last_read {
                    Some(header) => format!("The last successfully read record is:\n{header}\n"),
                    None => "No germline records were read successfully!".to_string(),
                };
                format!("{}\n\n- {error}\n\n{position_msg}\n", reading(fa_file))
            }
            InvalidBaseInSequence {
                fa_file,
                header,
                base,
                offset,
            } => format!(
                "{}\n\n\
                - Invalid character '{base}' in the sequence at position {offset}. Only {} characters are allowed. \
                Please correct the sequence associated with the following header:\n\n{}\n",
                reading(fa_file),
                crate::ALLOWED_NUCLEOTIDES,
                describe(header.as_ref()),
            ),
            EmptySequence { fa_file, header } => format!(
                "{}\n\n- The following record has an empty sequence:\n\n{}\n",
                reading(fa_file),
                describe(header.as_ref()),
            ),
            InvalidHeader { fa_file, errors } => {
                let num_errors = errors.len();
                let sep = "....................";

                let error_msg = errors
                    .iter()
                    .enumerate()
                    .map(|(i, (header, err))| {
                        format!(
                            "{sep}\nError {}/{num_errors}\n{sep}\n\n{}\n{}\n",
                            i + 1,
                            describe(header.as_ref()),
                            match header {
                                Some(line) => err.with_highlight(&line.header),
                                None => err.to_string(),
                            }
                        )
                    })
                    .join("\n");

                format!("{}\n\n{error_msg}", reading(fa_file))
            }
        };

        write!(f, "{msg}")
    }
}

impl std::error::Error for GermlineReferenceErrors {}

#[derive(Debug)]
pub enum HeaderErrors {
    UnknownChain {
        range: Range<usize>,
        gene_name: String,
    },
    WrongSegment {
        range: Range<usize>,
        gene_name: String,
        expected: Segment,
    },
    DuplicateGene {
        range: Range<usize>,
        gene_name: String,
        last_line: Option<usize>,
    },
}

impl HeaderErrors {
    fn with_highlight(&self, header: &str) -> String {
        let mut result = String::new();
        let hl_range = self.highlight_range();
        const LINE_NUM_PREFIX_LEN: usize = 12;
        result.push_str(&" ".repeat(LINE_NUM_PREFIX_LEN));
        for i in 0..header.len() {
            result.push(if hl_range.contains(&i) { '^' } else { ' ' });
        }
        result.push('\n');
        result.push_str(&" ".repeat(LINE_NUM_PREFIX_LEN + hl_range.start));
        let _ = write!(&mut result, "{self}");
        result
    }

    fn highlight_range(&self) -> Range<usize> {
        use HeaderErrors::*;
        match self {
            UnknownChain { range, .. }
            | WrongSegment { range, .. }
            | DuplicateGene { range, .. } => range.clone(),
        }
    }
}

impl std::error::Error for HeaderErrors {}

impl fmt::Display for HeaderErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use HeaderErrors::*;
        let msg = match self {
            UnknownChain { gene_name, .. } => format!(
                "The gene name '{gene_name}' does not start with a supported gene family: [IGH, IGK, IGL, VH]."
            ),
            WrongSegment {
                gene_name,
                expected,
                ..
            } => format!(
                "The gene name '{gene_name}' is not a {expected} gene. The 4th character of the name must be '{expected}'."
            ),
            DuplicateGene {
                gene_name,
                last_line,
                ..
            } => format!(
                "The gene '{}' is duplicated. {}",
                gene_name,
                last_line.map_or(String::new(), |line| format!(
                    "The same gene was encountered in line {}.",
                    line + 1
                ))
            ),
        };
        write!(f, "{msg}")
    }
}
