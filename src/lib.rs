//! Molecular graphs from SMILES: parsing with hydrogen completion, SSSR
//! ring perception, Hückel aromaticity, kekulization, Morgan-style
//! canonical ranking and SMILES generation.
//!
//! ```
//! use chemgraph::{generate, parse_one};
//!
//! let kekule = parse_one("OC1=CC=CC=C1").unwrap();
//! let aromatic = parse_one("c1ccccc1O").unwrap();
//! assert_eq!(kekule.atom_count(), 7);
//! assert_eq!(generate(&kekule, true), generate(&aromatic, true));
//! ```

pub mod aromaticity;
pub mod atom;
pub mod bond;
pub mod cache;
pub mod canonical;
pub mod element;
pub mod graph_ops;
pub mod kekulize;
pub mod molecule;
pub mod options;
pub mod rings;
pub mod smiles;
pub mod stereo;
pub mod valence;

pub use aromaticity::{perceive_aromaticity, perceive_aromaticity_with};
pub use atom::{Atom, ChiralClass, Chirality};
pub use bond::{Bond, BondOrder, BondStereo};
pub use cache::{CanonicalCache, DerivedCache};
pub use canonical::{CanonicalForm, canonicalize, canonicalize_with};
pub use element::Element;
pub use kekulize::{KekulizeError, kekulize, kekulize_with};
pub use molecule::{AtomId, BondId, Molecule, MoleculeError, MoleculeKey};
pub use options::{
    AromaticityOptions, CanonicalOptions, Config, ConfigError, KekulizeOptions, ParseOptions,
    WriteOptions,
};
pub use rings::{RingInfo, perceive_rings};
pub use smiles::{
    ErrorKind, ParseError, ParseResult, SmilesError, generate, generate_all, generate_with, parse,
    parse_one, parse_one_with, parse_with,
};
pub use valence::ValenceError;
