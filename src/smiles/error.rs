use thiserror::Error;

use crate::kekulize::KekulizeError;
use crate::valence::ValenceError;

/// The five error families a SMILES string can fall into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Syntax,
    RingClosure,
    UnsupportedElement,
    Valence,
    Kekulization,
}

/// Errors produced when parsing a SMILES string.
///
/// Positions are character offsets into the whole input, not into the
/// `.`-separated fragment.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SmilesError {
    /// Input ended before a complete token could be read.
    #[error("unexpected end of SMILES at position {pos}")]
    UnexpectedEnd { pos: usize },
    /// An unexpected character was encountered at the given position.
    #[error("unexpected character '{ch}' at position {pos}")]
    UnexpectedChar { pos: usize, ch: char },
    /// An element symbol that is unknown, or not allowed outside brackets.
    #[error("invalid element '{text}' at position {pos}")]
    InvalidElement { pos: usize, text: String },
    /// A bracket atom `[` was opened but never closed with `]`.
    #[error("unclosed bracket atom starting at position {pos}")]
    UnclosedBracket { pos: usize },
    #[error("invalid charge at position {pos}")]
    InvalidCharge { pos: usize },
    #[error("invalid isotope at position {pos}")]
    InvalidIsotope { pos: usize },
    #[error("invalid hydrogen count at position {pos}")]
    InvalidHydrogenCount { pos: usize },
    #[error("invalid atom class at position {pos}")]
    InvalidAtomClass { pos: usize },
    #[error("invalid chirality at position {pos}")]
    InvalidChirality { pos: usize },
    /// A parenthesis was opened without a matching close, or vice versa.
    #[error("unmatched parenthesis at position {pos}")]
    UnmatchedParen { pos: usize },
    #[error("empty branch at position {pos}")]
    EmptyBranch { pos: usize },
    /// A bond symbol with no atom on one of its sides.
    #[error("dangling bond at position {pos}")]
    DanglingBond { pos: usize },
    #[error("empty fragment at position {pos}")]
    EmptyFragment { pos: usize },
    /// The input string was empty or contained only whitespace.
    #[error("empty SMILES string")]
    EmptyInput,
    #[error("expected one molecule, found {count}")]
    MultipleFragments { count: usize },
    /// A ring-opening digit was never matched by a ring-closing digit.
    #[error("unclosed ring {digit} opened at position {pos}")]
    UnclosedRing { digit: u32, pos: usize },
    /// A ring closure with no atom before it.
    #[error("ring bond {digit} at position {pos} has no atom")]
    InvalidRingBond { digit: u32, pos: usize },
    #[error("ring {digit} closes on its own atom at position {pos}")]
    SelfLoopRing { digit: u32, pos: usize },
    #[error("ring {digit} at position {pos} duplicates an existing bond")]
    DuplicateBond { digit: u32, pos: usize },
    /// Two ring-closure bonds on the same digit specify conflicting bond types.
    #[error("conflicting bond types on ring closure {digit} at position {pos}")]
    RingBondConflict { digit: u32, pos: usize },
    #[error(transparent)]
    Valence(#[from] ValenceError),
    /// Kekulization of the aromatic system failed.
    #[error(transparent)]
    Kekulize(#[from] KekulizeError),
}

impl SmilesError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidElement { .. } => ErrorKind::UnsupportedElement,
            Self::UnclosedRing { .. }
            | Self::InvalidRingBond { .. }
            | Self::SelfLoopRing { .. }
            | Self::DuplicateBond { .. }
            | Self::RingBondConflict { .. } => ErrorKind::RingClosure,
            Self::Valence(_) => ErrorKind::Valence,
            Self::Kekulize(_) => ErrorKind::Kekulization,
            _ => ErrorKind::Syntax,
        }
    }

    /// Errors that leave the fragment unusable. Valence problems do not.
    pub fn is_fatal(&self) -> bool {
        self.kind() != ErrorKind::Valence
    }
}

/// An error tied to the zero-based `.`-separated fragment it came from.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("fragment {fragment}: {error}")]
pub struct ParseError {
    pub fragment: usize,
    #[source]
    pub error: SmilesError,
}

impl ParseError {
    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }
}
