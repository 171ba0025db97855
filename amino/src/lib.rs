//! amino
// Copyright (c) 2019 10x Genomics, Inc. All rights reserved.
#![deny(missing_docs)]

/// Amino acid emitted for a codon that contains anything other than A, C, G or T.
pub const UNKNOWN_AA: u8 = b'X';

/// Convert a codon to an amino acid. Codons with ambiguous or gap
/// characters translate to `X`.
pub fn codon_to_aa(codon: &[u8]) -> u8 {
    assert!(codon.len() == 3);

    match codon {
        b"GGT" => b'G',
        b"GGC" => b'G',
        b"GGA" => b'G',
        b"GGG" => b'G',
        b"TGG" => b'W',
        b"TGT" => b'C',
        b"TGC" => b'C',
        b"TTT" => b'F',
        b"TTC" => b'F',
        b"TTA" => b'L',
        b"TTG" => b'L',
        b"CTT" => b'L',
        b"CTC" => b'L',
        b"CTA" => b'L',
        b"CTG" => b'L',
        b"ATT" => b'I',
        b"ATC" => b'I',
        b"ATA" => b'I',
        b"GTT" => b'V',
        b"GTC" => b'V',
        b"GTA" => b'V',
        b"GTG" => b'V',
        b"TCT" => b'S',
        b"TCC" => b'S',
        b"TCA" => b'S',
        b"TCG" => b'S',
        b"AGT" => b'S',
        b"AGC" => b'S',
        b"CCT" => b'P',
        b"CCC" => b'P',
        b"CCA" => b'P',
        b"CCG" => b'P',
        b"ACT" => b'T',
        b"ACC" => b'T',
        b"ACA" => b'T',
        b"ACG" => b'T',
        b"GCT" => b'A',
        b"GCC" => b'A',
        b"GCA" => b'A',
        b"GCG" => b'A',
        b"TAT" => b'Y',
        b"TAC" => b'Y',
        b"CAT" => b'H',
        b"CAC" => b'H',
        b"CAA" => b'Q',
        b"CAG" => b'Q',
        b"AAT" => b'N',
        b"AAC" => b'N',
        b"AAA" => b'K',
        b"AAG" => b'K',
        b"GAT" => b'D',
        b"GAC" => b'D',
        b"GAA" => b'E',
        b"GAG" => b'E',
        b"CGT" => b'R',
        b"CGC" => b'R',
        b"CGA" => b'R',
        b"CGG" => b'R',
        b"AGA" => b'R',
        b"AGG" => b'R',
        b"ATG" => b'M',
        b"TAG" => b'*',
        b"TAA" => b'*',
        b"TGA" => b'*',
        _ => UNKNOWN_AA,
    }
}

/// Convert a given DNA sequence to amino acids, starting at a given position.
/// A trailing partial codon is dropped.
pub fn nucleotide_to_aminoacid_sequence(dna_seq: &[u8], start: usize) -> Vec<u8> {
    let mut a = Vec::<u8>::new();
    if dna_seq.len() >= 3 {
        for pos in (start..dna_seq.len() - 3 + 1).step_by(3) {
            if dna_seq[pos] == b'-' && dna_seq[pos + 1] == b'-' && dna_seq[pos + 2] == b'-' {
                a.push(b'-');
            } else {
                a.push(codon_to_aa(&dna_seq[pos..pos + 3]));
            }
        }
    }
    a
}

/// Translate `dna_seq` from `start` and return the protein as a `String`.
pub fn aa_seq(dna_seq: &[u8], start: usize) -> String {
    String::from_utf8(nucleotide_to_aminoacid_sequence(dna_seq, start))
        .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

/// Return whether a translated sequence contains a stop codon.
pub fn has_stop_codon(aa: &[u8]) -> bool {
    aa.contains(&b'*')
}

/// Find the reading frame (0, 1 or 2) in which the translation of `dna_seq`
/// carries `motif`, where `.` in the motif matches any residue. Returns the
/// frame together with the amino acid index of the first match.
pub fn find_motif_frame(dna_seq: &[u8], motif: &[u8]) -> Option<(usize, usize)> {
    (0..3).find_map(|frame| {
        let aa = nucleotide_to_aminoacid_sequence(dna_seq, frame);
        find_motif(&aa, motif, 0).map(|pos| (frame, pos))
    })
}

/// Index of the first occurrence of `motif` in `aa` at or after `from`.
/// `.` in the motif matches any residue.
pub fn find_motif(aa: &[u8], motif: &[u8], from: usize) -> Option<usize> {
    if motif.is_empty() || aa.len() < motif.len() {
        return None;
    }
    (from..=aa.len() - motif.len()).find(|&i| {
        motif
            .iter()
            .zip(&aa[i..i + motif.len()])
            .all(|(&m, &a)| m == b'.' || m == a)
    })
}
