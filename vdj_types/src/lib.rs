//! vdj_types
// Copyright (c) 2021 10x Genomics, Inc. All rights reserved.

use serde::{Deserialize, Serialize};
use std::fmt;

// From https://danielkeep.github.io/tlborm/book/blk-counting.html
macro_rules! replace_expr {
    ($_t:tt $sub:expr) => {
        $sub
    };
}

macro_rules! count_tts {
    ($($tts:tt)*) => {0usize $(+ replace_expr!($tts 1usize))*};
}

macro_rules! make_enum {
    (
        name: $name:ident,
        variants:[$( ($field:ident, $lit: literal) ,)*],
        const_var_name: $const_var_name:ident,
    ) => {
        pub const $const_var_name: [&str; count_tts!($($field)*)] = [
            $($lit,)*
        ];

        #[derive(
            Debug,
            Copy,
            Clone,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Serialize,
            Deserialize,
            Hash,
        )]
        pub enum $name {
            $(
                #[serde(rename = $lit)]
                $field,
            )*
        }

        impl $name {
            pub fn all() -> [Self; count_tts!($($field)*)] {
                [
                    $($name::$field,)*
                ]
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", match self {
                    $(
                        $name::$field => $lit,
                    )*
                })
            }
        }

        impl From<$name> for &'static str {
            fn from(src: $name) -> &'static str {
                match src {
                    $(
                        $name::$field => $lit,
                    )*
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $(
                        $lit => Ok($name::$field),
                    )*
                    unknown => Err(
                        format!("Unknown variant '{}' for {}. Supported variants are: [{}]", unknown, stringify!($name), $const_var_name.join(", "))
                    )
                }
            }
        }
    };
}

make_enum! {
    name: VdjChain,
    variants: [
        (Heavy, "heavy"),
        (Kappa, "kappa"),
        (Lambda, "lambda"),
    ],
    const_var_name: VDJ_CHAINS,
}

impl VdjChain {
    /// Infer the chain from the gene family prefix of a germline gene name,
    /// e.g. `IGHV3-23*01` is heavy. Some legacy databases name heavy chain
    /// V genes `VH...`, which is accepted as well.
    pub fn from_gene_name(gene: &str) -> Option<VdjChain> {
        if gene.starts_with("IGH") || gene.starts_with("VH") {
            Some(VdjChain::Heavy)
        } else if gene.starts_with("IGK") {
            Some(VdjChain::Kappa)
        } else if gene.starts_with("IGL") {
            Some(VdjChain::Lambda)
        } else {
            None
        }
    }

    /// Only heavy chains recombine a D segment.
    pub fn has_diversity(self) -> bool {
        self == VdjChain::Heavy
    }

    /// Residue that opens the conserved `[WF]G.G` motif of the J segment.
    pub fn j_anchor_residue(self) -> u8 {
        match self {
            VdjChain::Heavy => b'W',
            VdjChain::Kappa | VdjChain::Lambda => b'F',
        }
    }
}

make_enum! {
    name: Segment,
    variants: [
        (V, "V"),
        (D, "D"),
        (J, "J"),
    ],
    const_var_name: SEGMENTS,
}

impl Segment {
    pub fn gene_type(self) -> GeneType {
        match self {
            Segment::V => GeneType::Variable,
            Segment::D => GeneType::Diversity,
            Segment::J => GeneType::Joining,
        }
    }

    pub fn region(self) -> VdjRegion {
        match self {
            Segment::V => VdjRegion::V,
            Segment::D => VdjRegion::D,
            Segment::J => VdjRegion::J,
        }
    }
}

make_enum! {
    name: GeneType,
    variants: [
        (Variable, "variable"),
        (Diversity, "diversity"),
        (Joining, "joining"),
    ],
    const_var_name: GENE_TYPES,
}

impl GeneType {
    /// The 4th character of an IMGT gene name carries the segment (`IGHV`, `IGKJ`, ...).
    pub fn from_gene_name(gene: &str) -> Option<GeneType> {
        match gene.as_bytes().get(3) {
            Some(b'V') => Some(GeneType::Variable),
            Some(b'D') => Some(GeneType::Diversity),
            Some(b'J') => Some(GeneType::Joining),
            _ => None,
        }
    }
}

make_enum! {
    name: Strand,
    variants: [
        (Plus, "plus"),
        (Minus, "minus"),
    ],
    const_var_name: STRANDS,
}

impl Strand {
    pub fn flip(self) -> Strand {
        match self {
            Strand::Plus => Strand::Minus,
            Strand::Minus => Strand::Plus,
        }
    }
}

make_enum! {
    name: VdjRegion,
    variants: [
        (V, "V-REGION"), // Variable region
        (N, "N-REGION"), // Non-templated nucleotides between segments
        (D, "D-REGION"), // Diversity region
        (J, "J-REGION"), // Joining region
    ],
    const_var_name: VDJ_REGIONS,
}

impl VdjRegion {
    /// Single character used for this region in a region map string.
    pub fn code(self) -> char {
        match self {
            VdjRegion::V => 'V',
            VdjRegion::N => 'N',
            VdjRegion::D => 'D',
            VdjRegion::J => 'J',
        }
    }
}
