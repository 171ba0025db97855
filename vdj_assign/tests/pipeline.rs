use pretty_assertions::assert_eq;
use serde_json::Value;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use vdj_assign::sequence::reverse_complement;
use vdj_assign::{AssignParameters, Assigner, NRegion, Sequence};
use vdj_reference::GermlineReference;
use vdj_types::{Segment, Strand, VdjChain};

const RANDOM: &str = "ACGGTGTATCAGGGGATGGCCGGTCGCGGGAGGACGTGCGCTCGCACAATCGACTCCCAAGGGCTGTGTGTTTACAGCCACGTGGCGGTATTCACCAGAAAGCTTGATTGCACCCGTGACTACATTATCGCACATGTAAGTAATGTAGACAACGGCGGGTTCATGATGTGGTAAGAACACTGGTTGGTGAAGCTTCATGCTGGGTTACTTAATGTGAGCGTCGTAAAGTGATGGCAGAATTCTTATGCGCGTCGTCTTCCATCAACAATGACTCCCCAGTTCCTCATTGAGCGTATATGG";

fn germline_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../vdj_reference/test_resources/germlines")
}

fn reference() -> Arc<GermlineReference> {
    Arc::new(GermlineReference::load(&germline_dir(), "human").unwrap())
}

fn germline(reference: &GermlineReference, segment: Segment, gene: &str) -> String {
    String::from_utf8_lossy(reference.get(segment, gene).unwrap().seq()).into_owned()
}

/// Unmutated rearrangements of the test germlines, plus one unrelated sequence.
fn queries(reference: &GermlineReference) -> Vec<(&'static str, String)> {
    let v = |gene: &str| germline(reference, Segment::V, gene);
    let j = |gene: &str| germline(reference, Segment::J, gene);
    let kappa = format!("{}CT{}", v("IGKV1-39*01"), j("IGKJ1*01"));
    vec![
        (
            "heavy_d",
            format!(
                "{}GGTACTATGGTTCGGGGAGTTC{}",
                v("IGHV1-3*01"),
                j("IGHJ4*02")
            ),
        ),
        ("heavy_exact", format!("{}{}", v("IGHV3-23*01"), j("IGHJ4*02"))),
        ("kappa_rc", reverse_complement(&kappa)),
        ("kappa", kappa),
        ("random", RANDOM.to_string()),
        ("lambda", format!("{}GG{}", v("IGLV2-14*01"), j("IGLJ2*01"))),
    ]
}

#[test]
fn test_assign_batch() {
    let reference = reference();
    let sequences: Vec<Sequence> = queries(&reference)
        .into_iter()
        .map(|(id, seq)| Sequence::new(id, seq))
        .collect();
    let assigner = Assigner::native(reference, AssignParameters::default());
    let assignment = assigner.assign(sequences).unwrap();

    assert_eq!(assignment.sequences, 6);
    assert_eq!(assignment.v_failures, 1);
    assert_eq!(assignment.j_failures, 0);
    assert_eq!(assignment.failed_rearrangements(), 0);
    assert_eq!(assignment.productive(), 5);

    let by_id: HashMap<&str, _> = assignment
        .rearrangements
        .iter()
        .map(|r| (r.id(), r))
        .collect();
    assert!(!by_id.contains_key("random"));

    let heavy = by_id["heavy_d"];
    assert!(heavy.has_diversity());
    assert_eq!(heavy.v.top_germline(), "IGHV1-3*01");
    assert_eq!(heavy.j.top_germline(), "IGHJ4*02");
    let attrs = heavy.attributes.as_ref().unwrap();
    assert!(matches!(attrs.boundaries.n, NRegion::Split(..)));
    assert_eq!(attrs.region_map.len(), attrs.boundaries.j.end);
    assert!(attrs.region_map.contains("VNNDDD"));
    assert_eq!(attrs.junction.as_ref().unwrap().aa, "CARGTMVRGVHYFDYW");

    let exact = by_id["heavy_exact"];
    assert!(exact.rearrangement);
    assert!(exact.d.is_none());
    let attrs = exact.attributes.as_ref().unwrap();
    assert!(matches!(attrs.boundaries.n, NRegion::Single(n) if n.is_empty()));
    assert_eq!(attrs.junction.as_ref().unwrap().aa, "CAKDYFDYW");

    for id in ["kappa", "kappa_rc"] {
        let kappa = by_id[id];
        assert!(kappa.rearrangement);
        assert!(!kappa.has_diversity());
        let attrs = kappa.attributes.as_ref().unwrap();
        assert_eq!(attrs.chain, VdjChain::Kappa);
        assert!(!attrs.region_map.contains('D'));
        assert_eq!(attrs.junction.as_ref().unwrap().aa, "CQQSYSTPLWTF");
    }
    assert_eq!(by_id["kappa"].v.strand, Strand::Plus);
    assert_eq!(by_id["kappa_rc"].v.strand, Strand::Minus);
    assert_eq!(by_id["kappa_rc"].sequence.sequence(), by_id["kappa"].sequence.sequence());
    assert_eq!(by_id["kappa_rc"].sequence.strand(), Strand::Minus);

    let lambda = by_id["lambda"];
    assert_eq!(lambda.attributes.as_ref().unwrap().chain, VdjChain::Lambda);
    assert_eq!(lambda.attributes.as_ref().unwrap().junction.as_ref().unwrap().aa, "CSSYTSSSTLGVVF");
}

#[test]
fn test_short_v_tail_and_missing_j() {
    let reference = reference();
    let v = germline(&reference, Segment::V, "IGHV3-23*01");
    let j = germline(&reference, Segment::J, "IGHJ4*02");
    let sequences = vec![
        // one nucleotide short of what must follow the V gene
        Sequence::new("short_tail", format!("{v}ACGTACGTAC")),
        // long enough after V, but nothing there resembles a J gene
        Sequence::new("no_j", format!("{v}CCCCCCCCCCC")),
        Sequence::new("heavy_exact", format!("{v}{j}")),
    ];
    let assigner = Assigner::native(reference, AssignParameters::default());
    let assignment = assigner.assign(sequences).unwrap();

    assert_eq!(assignment.sequences, 3);
    assert_eq!(assignment.v_failures, 1);
    assert_eq!(assignment.j_failures, 1);
    assert_eq!(assignment.rearrangements.len(), 1);
    let exact = &assignment.rearrangements[0];
    assert_eq!(exact.id(), "heavy_exact");
    assert!(exact.rearrangement);
    assert_eq!(exact.j.top_germline(), "IGHJ4*02");
}

#[test]
fn test_run_writes_json_lines() {
    let reference = reference();
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("seqs.fasta");
    let mut fasta = std::fs::File::create(&input).unwrap();
    for (id, seq) in queries(&reference) {
        writeln!(fasta, ">{id}\n{seq}").unwrap();
    }
    drop(fasta);

    let params = AssignParameters {
        uaid_len: 6,
        ..AssignParameters::default()
    };
    let assigner = Assigner::native(reference, params);
    let summary = assigner.run(&input, dir.path()).unwrap();
    assert_eq!(summary.output, dir.path().join("seqs.fasta.json"));
    assert_eq!(summary.sequences, 6);
    assert_eq!(summary.v_failures, 1);
    assert_eq!(summary.rearrangements, 5);
    assert_eq!(summary.productive, 5);

    let text = std::fs::read_to_string(&summary.output).unwrap();
    let records: Vec<Value> = text
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(records.len(), 5);
    let ids: Vec<&str> = records.iter().map(|r| r["seq_id"].as_str().unwrap()).collect();
    assert_eq!(ids, vec!["heavy_d", "heavy_exact", "kappa_rc", "kappa", "lambda"]);

    let heavy = &records[0];
    assert_eq!(heavy["chain"], "heavy");
    assert_eq!(heavy["strand"], "plus");
    assert_eq!(heavy["uaid"].as_str().unwrap().len(), 6);
    assert_eq!(heavy["d_gene"]["top_germline"], "IGHD3-10*01");
    assert_eq!(heavy["d_gene"]["reading_frame"], 2);
    assert!(heavy["boundaries"]["n"]["split"].is_array());
    assert_eq!(heavy["junction_aa"], "CARGTMVRGVHYFDYW");
    assert_eq!(heavy["productive"], true);
    assert_eq!(heavy["rearrangement"], true);
    assert!(heavy["v_gene"]["evalue"].is_number());
    assert!(heavy["d_gene"]["evalue"].is_null());

    let kappa_rc = &records[2];
    assert_eq!(kappa_rc["strand"], "minus");
    let kappa = &records[3];
    assert_eq!(kappa_rc["oriented_sequence"], kappa["oriented_sequence"]);
    assert_eq!(kappa["raw_input"], kappa["oriented_sequence"]);
    assert_ne!(kappa_rc["raw_input"], kappa_rc["oriented_sequence"]);
    assert_eq!(
        kappa_rc["raw_input"].as_str().unwrap(),
        reverse_complement(kappa["raw_input"].as_str().unwrap())
    );
    assert!(kappa_rc["d_gene"].is_null());
    assert!(kappa_rc["boundaries"]["n"]["single"].is_object());
}

#[test]
fn test_search_failure_fails_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("seqs.fasta");
    std::fs::write(&input, format!(">random\n{RANDOM}\n")).unwrap();
    let params = AssignParameters {
        blastn: Some(dir.path().join("no-such-blastn")),
        ..AssignParameters::default()
    };
    let assigner = Assigner::blastn(reference(), params);
    let err = assigner.run(&input, dir.path()).unwrap_err();
    let chain: Vec<String> = err.chain().map(ToString::to_string).collect();
    assert!(chain[0].starts_with("germline search failed for"));
    assert!(chain[1].starts_with("failed to launch"));
    assert!(!dir.path().join("seqs.fasta.json").exists());
}

#[test]
fn test_missing_input_file() {
    let dir = tempfile::tempdir().unwrap();
    let assigner = Assigner::native(reference(), AssignParameters::default());
    assert!(assigner
        .process_sequence_file(&dir.path().join("missing.fasta"))
        .is_err());
}
