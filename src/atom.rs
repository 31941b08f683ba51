use serde::{Deserialize, Serialize};

use crate::element::Element;

/// Geometry family of a non-tetrahedral stereo descriptor such as `@SP2` or `@OH17`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChiralClass {
    Tetrahedral,
    Allene,
    SquarePlanar,
    TrigonalBipyramidal,
    Octahedral,
}

impl ChiralClass {
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "TH" => Some(Self::Tetrahedral),
            "AL" => Some(Self::Allene),
            "SP" => Some(Self::SquarePlanar),
            "TB" => Some(Self::TrigonalBipyramidal),
            "OH" => Some(Self::Octahedral),
            _ => None,
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            Self::Tetrahedral => "TH",
            Self::Allene => "AL",
            Self::SquarePlanar => "SP",
            Self::TrigonalBipyramidal => "TB",
            Self::Octahedral => "OH",
        }
    }

    /// Highest permutation index the class defines.
    pub fn max_index(self) -> u8 {
        match self {
            Self::Tetrahedral | Self::Allene => 2,
            Self::SquarePlanar => 3,
            Self::TrigonalBipyramidal => 20,
            Self::Octahedral => 30,
        }
    }
}

/// Stereo marker on an atom.
///
/// `CounterClockwise` (`@`) and `Clockwise` (`@@`) are stored relative to a
/// fixed reference order of the atom's ligands: the implicit hydrogen first
/// when the atom carries one, then bonded neighbors by ascending atom id.
/// Parser and generator translate to and from the textual neighbor order.
/// Extended descriptors are kept verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Chirality {
    #[default]
    None,
    CounterClockwise,
    Clockwise,
    Extended { class: ChiralClass, index: u8 },
}

impl Chirality {
    pub fn is_tetrahedral(self) -> bool {
        matches!(self, Self::CounterClockwise | Self::Clockwise)
    }

    /// The opposite handedness; non-tetrahedral markers are returned unchanged.
    pub fn inverted(self) -> Self {
        match self {
            Self::CounterClockwise => Self::Clockwise,
            Self::Clockwise => Self::CounterClockwise,
            other => other,
        }
    }
}

/// A node of the molecular graph.
///
/// Hydrogens are normally not graph nodes: `hydrogen_count` holds implicit
/// and bracket-explicit hydrogens together. `ring_ids` indexes into the
/// molecule's [`RingInfo`](crate::rings::RingInfo) and is empty until ring
/// perception has run.
///
/// ```
/// use chemgraph::{Atom, Element};
///
/// let oxygen = Atom {
///     formal_charge: -1,
///     ..Atom::new(Element::O)
/// };
/// assert_eq!(oxygen.atomic_num(), 8);
/// assert!(!oxygen.is_aromatic);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Atom {
    pub element: Element,
    pub formal_charge: i8,
    /// Mass number; `None` for natural abundance.
    pub isotope: Option<u16>,
    pub hydrogen_count: u8,
    /// True only for members of a ring confirmed aromatic by perception.
    pub is_aromatic: bool,
    pub chirality: Chirality,
    pub atom_class: u32,
    pub ring_ids: Vec<usize>,
    /// Set when bonds plus hydrogens match none of the element's valences.
    pub invalid_valence: bool,
}

impl Atom {
    pub fn new(element: Element) -> Self {
        Self {
            element,
            formal_charge: 0,
            isotope: None,
            hydrogen_count: 0,
            is_aromatic: false,
            chirality: Chirality::None,
            atom_class: 0,
            ring_ids: Vec::new(),
            invalid_valence: false,
        }
    }

    pub fn atomic_num(&self) -> u8 {
        self.element.atomic_num()
    }

    pub fn in_ring(&self) -> bool {
        !self.ring_ids.is_empty()
    }
}
