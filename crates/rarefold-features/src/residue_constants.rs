//! Residue and atom tables shared by the pipeline transforms.
//!
//! Residue types use the model's alphabet (`ARNDCQEGHILKMFPSTWYV`, then `X`),
//! MSAs arrive in the HHblits alphabet and are remapped on the way in.
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

/// Number of standard residue types.
pub const RESTYPE_NUM: usize = 20;
/// Residue types plus unknown (`X`).
pub const RESTYPE_WITH_X: usize = 21;
/// Residue types plus unknown and gap (`-`).
pub const RESTYPE_WITH_X_AND_GAP: usize = 22;
/// MSA classes including the BERT mask token.
pub const MSA_CLASSES: usize = 23;
pub const MASK_TOKEN: i64 = 22;
pub const GAP_TOKEN: i64 = 21;

pub const ATOM_TYPE_NUM: usize = 37;
pub const ATOM14_NUM: usize = 14;

/// HHblits residue index (`ACDEFGHIKLMNPQRSTVWYX-`) to model residue index.
#[rustfmt::skip]
pub const MAP_HHBLITS_AATYPE_TO_OUR_AATYPE: [i64; 22] = [
    0, 4, 3, 6, 13, 7, 8, 9, 11, 10, 12, 2, 14, 5, 1, 15, 16, 19, 17, 18, 20, 21,
];

/// Atom types in atom37 order.
#[rustfmt::skip]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter)]
pub enum AAAtom {
    N = 0,    CA = 1,   C = 2,    CB = 3,   O = 4,
    CG = 5,   CG1 = 6,  CG2 = 7,  OG = 8,   OG1 = 9,
    SG = 10,  CD = 11,  CD1 = 12, CD2 = 13, ND1 = 14,
    ND2 = 15, OD1 = 16, OD2 = 17, SD = 18,  CE = 19,
    CE1 = 20, CE2 = 21, CE3 = 22, NE = 23,  NE1 = 24,
    NE2 = 25, OE1 = 26, OE2 = 27, CH2 = 28, NH1 = 29,
    NH2 = 30, OH = 31,  CZ = 32,  CZ2 = 33, CZ3 = 34,
    NZ = 35,  OXT = 36,
    Unknown = -1,
}

impl AAAtom {
    /// atom37 slot, `None` for the padding atom.
    pub fn to_index(&self) -> Option<usize> {
        match self {
            AAAtom::Unknown => None,
            atom => Some(*atom as usize),
        }
    }
}

macro_rules! define_residues {
    ($($name:ident: $idx:expr, [$($atom:ident),*]),* $(,)?) => {
        #[derive(Debug, Copy, Clone, PartialEq, Eq, EnumIter)]
        pub enum Residue {
            $($name),*
        }

        impl Residue {
            /// Heavy atoms in atom14 order.
            pub fn atoms14(&self) -> [AAAtom; ATOM14_NUM] {
                match self {
                    $(Self::$name => {
                        let named: &[AAAtom] = &[$(AAAtom::$atom),*];
                        let mut slots = [AAAtom::Unknown; ATOM14_NUM];
                        slots[..named.len()].copy_from_slice(named);
                        slots
                    }),*
                }
            }
            pub fn from_int(value: i64) -> Self {
                match value {
                    $($idx => Self::$name,)*
                    _ => Self::UNK
                }
            }
            pub fn to_int(&self) -> i64 {
                match self {
                    $(Self::$name => $idx),*
                }
            }
        }
    }
}

define_residues! {
    ALA: 0,  [N, CA, C, O, CB],
    ARG: 1,  [N, CA, C, O, CB, CG, CD, NE, CZ, NH1, NH2],
    ASN: 2,  [N, CA, C, O, CB, CG, OD1, ND2],
    ASP: 3,  [N, CA, C, O, CB, CG, OD1, OD2],
    CYS: 4,  [N, CA, C, O, CB, SG],
    GLN: 5,  [N, CA, C, O, CB, CG, CD, OE1, NE2],
    GLU: 6,  [N, CA, C, O, CB, CG, CD, OE1, OE2],
    GLY: 7,  [N, CA, C, O],
    HIS: 8,  [N, CA, C, O, CB, CG, ND1, CD2, CE1, NE2],
    ILE: 9,  [N, CA, C, O, CB, CG1, CG2, CD1],
    LEU: 10, [N, CA, C, O, CB, CG, CD1, CD2],
    LYS: 11, [N, CA, C, O, CB, CG, CD, CE, NZ],
    MET: 12, [N, CA, C, O, CB, CG, SD, CE],
    PHE: 13, [N, CA, C, O, CB, CG, CD1, CD2, CE1, CE2, CZ],
    PRO: 14, [N, CA, C, O, CB, CG, CD],
    SER: 15, [N, CA, C, O, CB, OG],
    THR: 16, [N, CA, C, O, CB, OG1, CG2],
    TRP: 17, [N, CA, C, O, CB, CG, CD1, CD2, NE1, CE2, CE3, CZ2, CZ3, CH2],
    TYR: 18, [N, CA, C, O, CB, CG, CD1, CD2, CE1, CE2, CZ, OH],
    VAL: 19, [N, CA, C, O, CB, CG1, CG2],
    UNK: 20, [],
}

/// Per-residue atom14/atom37 index maps and existence masks.
#[derive(Debug, Clone, PartialEq)]
pub struct AtomMaps {
    pub atom14_to_atom37: [i64; ATOM14_NUM],
    pub atom37_to_atom14: [i64; ATOM_TYPE_NUM],
    pub atom14_exists: [f32; ATOM14_NUM],
    pub atom37_exists: [f32; ATOM_TYPE_NUM],
}

impl Residue {
    /// Index maps between the compact and full atom layouts. Empty slots map
    /// to 0 and are masked out.
    pub fn atom_maps(&self) -> AtomMaps {
        let mut maps = AtomMaps {
            atom14_to_atom37: [0; ATOM14_NUM],
            atom37_to_atom14: [0; ATOM_TYPE_NUM],
            atom14_exists: [0.0; ATOM14_NUM],
            atom37_exists: [0.0; ATOM_TYPE_NUM],
        };
        for (slot14, atom) in self.atoms14().iter().enumerate() {
            if let Some(slot37) = atom.to_index() {
                maps.atom14_to_atom37[slot14] = slot37 as i64;
                maps.atom37_to_atom14[slot37] = slot14 as i64;
                maps.atom14_exists[slot14] = 1.0;
                maps.atom37_exists[slot37] = 1.0;
            }
        }
        maps
    }
}

/// Atom maps for every residue type, indexed by residue index.
pub fn atom_maps_table() -> Vec<AtomMaps> {
    Residue::iter().map(|r| r.atom_maps()).collect()
}
