mod builder;
pub mod error;
mod parse_tree;
mod tokenizer;
pub(crate) mod writer;

pub use error::{ErrorKind, ParseError, SmilesError};

use std::borrow::Cow;

use tracing::{debug, instrument, warn};

use crate::aromaticity::perceive_aromaticity_with;
use crate::bond::BondOrder;
use crate::canonical::canonicalize_with;
use crate::kekulize::{joins_aromatic_atoms, kekulize_unflagged, kekulize_with};
use crate::molecule::{BondId, Molecule};
use crate::options::{KekulizeOptions, ParseOptions, WriteOptions};
use crate::rings::perceive_rings;
use crate::stereo::{cleanup_bond_stereo, cleanup_chirality};
use crate::valence::flag_invalid_valences;

/// Everything recovered from one SMILES string.
///
/// A fragment that fails fatally contributes an error but no molecule, so
/// `molecules` can be shorter than the number of `.`-separated fragments.
/// Valence problems are reported here too, next to the molecule they
/// describe.
#[derive(Debug, Clone, Default)]
pub struct ParseResult {
    pub molecules: Vec<Molecule>,
    pub errors: Vec<ParseError>,
}

impl ParseResult {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_fatal_errors(&self) -> bool {
        self.errors.iter().any(|e| e.error.is_fatal())
    }
}

pub fn parse(text: &str) -> ParseResult {
    parse_with(text, &ParseOptions::default())
}

/// Parses every `.`-separated fragment of `text` independently.
///
/// Surrounding whitespace is ignored. An error in one fragment does not
/// stop the others from being parsed.
#[instrument(level = "debug", skip_all, fields(len = text.len()))]
pub fn parse_with(text: &str, opts: &ParseOptions) -> ParseResult {
    let mut result = ParseResult::default();
    let chars: Vec<char> = text.chars().collect();

    let Some(start) = chars.iter().position(|c| !c.is_whitespace()) else {
        warn!("empty SMILES input");
        result.errors.push(ParseError {
            fragment: 0,
            error: SmilesError::EmptyInput,
        });
        return result;
    };
    let end = chars
        .iter()
        .rposition(|c| !c.is_whitespace())
        .map_or(start, |last| last + 1);

    let mut fragment = 0;
    let mut frag_start = start;
    for i in start..=end {
        if i < end && chars[i] != '.' {
            continue;
        }
        match parse_fragment(&chars[frag_start..i], frag_start, opts) {
            Ok((mol, warnings)) => {
                debug!(
                    fragment,
                    atoms = mol.atom_count(),
                    bonds = mol.bond_count(),
                    "parsed fragment"
                );
                for error in warnings {
                    warn!(fragment, %error, "valence warning");
                    result.errors.push(ParseError { fragment, error });
                }
                result.molecules.push(mol);
            }
            Err(error) => {
                warn!(fragment, %error, "fragment rejected");
                result.errors.push(ParseError { fragment, error });
            }
        }
        fragment += 1;
        frag_start = i + 1;
    }
    result
}

pub fn parse_one(text: &str) -> Result<Molecule, SmilesError> {
    parse_one_with(text, &ParseOptions::default())
}

/// Parses text that must hold exactly one fragment.
///
/// Valence warnings are tolerated; the returned atoms carry
/// `invalid_valence` instead.
pub fn parse_one_with(text: &str, opts: &ParseOptions) -> Result<Molecule, SmilesError> {
    let result = parse_with(text, opts);
    if let Some(err) = result.errors.into_iter().find(|e| e.error.is_fatal()) {
        return Err(err.error);
    }
    let count = result.molecules.len();
    let mut molecules = result.molecules.into_iter();
    match (molecules.next(), count) {
        (Some(mol), 1) => Ok(mol),
        _ => Err(SmilesError::MultipleFragments { count }),
    }
}

/// Runs one fragment through the whole pipeline. `base` is the offset of
/// the fragment's first character in the full input.
fn parse_fragment(
    chars: &[char],
    base: usize,
    opts: &ParseOptions,
) -> Result<(Molecule, Vec<SmilesError>), SmilesError> {
    let tokens = tokenizer::tokenize(chars, base)?;
    let tree = parse_tree::build_parse_tree(&tokens, base, base + chars.len())?;
    let mut mol = builder::build_molecule(&tree)?;

    let warnings: Vec<SmilesError> = flag_invalid_valences(&mut mol)
        .into_iter()
        .map(SmilesError::from)
        .collect();

    let rings = perceive_rings(&mol);
    let stray: Vec<BondId> = mol
        .bonds()
        .filter(|&b| mol.bond(b).order == BondOrder::Aromatic && !rings.is_ring_bond(b))
        .collect();
    for bond in stray {
        mol.bond_mut(bond).order = BondOrder::Single;
    }
    mol.attach_ring_info(rings);

    let kekule = if mol.bonds().any(|b| mol.bond(b).order == BondOrder::Aromatic) {
        kekulize_with(&mol, &opts.kekulize)?
    } else {
        mol
    };
    let rings = match kekule.ring_info() {
        Some(info) => info.clone(),
        None => perceive_rings(&kekule),
    };
    let mut mol = perceive_aromaticity_with(&kekule, &rings, &opts.aromaticity);
    cleanup_chirality(&mut mol);
    cleanup_bond_stereo(&mut mol);
    Ok((mol, warnings))
}

pub fn generate(mol: &Molecule, canonical: bool) -> String {
    generate_with(
        mol,
        &WriteOptions {
            canonical,
            ..WriteOptions::default()
        },
    )
}

/// Writes `mol` as SMILES.
///
/// Canonical output ranks the aromatic form, so the Kekulé and aromatic
/// spellings of one molecule start from the same atom order. If the
/// molecule cannot be kekulized the aromatic form is written instead.
#[instrument(level = "debug", skip_all, fields(atoms = mol.atom_count()))]
pub fn generate_with(mol: &Molecule, opts: &WriteOptions) -> String {
    let written = writable(mol, &opts.kekulize);
    let ranking = opts
        .canonical
        .then(|| canonicalize_with(&written, &opts.ranking).ranking);
    if opts.kekule {
        match kekulize_with(&written, &opts.kekulize) {
            Ok(kekule) => {
                return writer::write_molecule(&without_aromatic_flags(kekule), ranking.as_ref());
            }
            Err(error) => warn!(%error, "writing aromatic form"),
        }
    }
    writer::write_molecule(&written, ranking.as_ref())
}

/// Only bonds between two aromatic atoms are spelled aromatic. Any other
/// aromatic-order bond is kekulized, or written single when that fails.
fn writable<'a>(mol: &'a Molecule, opts: &KekulizeOptions) -> Cow<'a, Molecule> {
    let stray: Vec<BondId> = mol
        .bonds()
        .filter(|&b| mol.bond(b).order == BondOrder::Aromatic && !joins_aromatic_atoms(mol, b))
        .collect();
    if stray.is_empty() {
        return Cow::Borrowed(mol);
    }
    match kekulize_unflagged(mol, opts) {
        Ok(kekule) => Cow::Owned(kekule),
        Err(error) => {
            warn!(%error, bonds = stray.len(), "writing unflagged aromatic bonds as single");
            let mut out = mol.clone();
            for bond in stray {
                out.bond_mut(bond).order = BondOrder::Single;
            }
            Cow::Owned(out)
        }
    }
}

/// Writes each molecule and joins them with `.`. Canonical mode sorts the
/// pieces so the result does not depend on input order.
pub fn generate_all(mols: &[Molecule], canonical: bool) -> String {
    let mut parts: Vec<String> = mols
        .iter()
        .filter(|m| !m.is_empty())
        .map(|m| generate(m, canonical))
        .collect();
    if canonical {
        parts.sort();
    }
    parts.join(".")
}

fn without_aromatic_flags(mut mol: Molecule) -> Molecule {
    let atoms: Vec<_> = mol.atoms().collect();
    for atom in atoms {
        mol.atom_mut(atom).is_aromatic = false;
    }
    let bonds: Vec<_> = mol.bonds().collect();
    for bond in bonds {
        mol.bond_mut(bond).is_aromatic = false;
    }
    mol
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::{Atom, Chirality};
    use crate::bond::{Bond, BondStereo};
    use crate::element::Element;
    use crate::molecule::AtomId;
    use crate::stereo::double_bond_stereo;

    fn n(i: usize) -> AtomId {
        AtomId::new(i)
    }

    fn atom(mol: &Molecule, i: usize) -> &Atom {
        mol.atom(n(i))
    }

    fn mol(s: &str) -> Molecule {
        parse_one(s).unwrap_or_else(|e| panic!("{s}: {e}"))
    }

    // ---- Simple organic atoms ----

    #[test]
    fn methane() {
        let mol = mol("C");
        assert_eq!(mol.atom_count(), 1);
        assert_eq!(mol.bond_count(), 0);
        assert_eq!(atom(&mol, 0).element, Element::C);
        assert_eq!(atom(&mol, 0).hydrogen_count, 4);
    }

    #[test]
    fn ethanol() {
        let mol = mol("CCO");
        assert_eq!(mol.atom_count(), 3);
        assert_eq!(mol.bond_count(), 2);
        assert_eq!(atom(&mol, 0).hydrogen_count, 3);
        assert_eq!(atom(&mol, 1).hydrogen_count, 2);
        assert_eq!(atom(&mol, 2).hydrogen_count, 1);
    }

    #[test]
    fn acetic_acid() {
        let mol = mol("CC(=O)O");
        assert_eq!(mol.atom_count(), 4);
        let double = mol.bond_between(n(1), n(2)).unwrap();
        assert_eq!(mol.bond(double).order, BondOrder::Double);
        assert_eq!(atom(&mol, 1).hydrogen_count, 0);
        assert_eq!(atom(&mol, 3).hydrogen_count, 1);
    }

    #[test]
    fn isobutane() {
        let mol = mol("CC(C)C");
        assert_eq!(mol.bond_count(), 3);
        assert_eq!(atom(&mol, 1).hydrogen_count, 1);
        assert_eq!(atom(&mol, 3).hydrogen_count, 3);
    }

    #[test]
    fn cyclohexane() {
        let mol = mol("C1CCCCC1");
        assert_eq!(mol.bond_count(), 6);
        assert_eq!(mol.ring_info().map(|r| r.num_rings()), Some(1));
        assert!(mol.atoms().all(|a| mol.atom(a).hydrogen_count == 2));
        assert!(mol.atoms().all(|a| !mol.atom(a).is_aromatic));
    }

    #[test]
    fn multi_digit_ring() {
        let mol = mol("C%10CC%10");
        assert_eq!(mol.atom_count(), 3);
        assert_eq!(mol.bond_count(), 3);
    }

    #[test]
    fn charges_and_isotopes() {
        let ammonium = mol("[NH4+]");
        assert_eq!(atom(&ammonium, 0).formal_charge, 1);
        assert_eq!(atom(&ammonium, 0).hydrogen_count, 4);
        let c13 = mol("[13CH4]");
        assert_eq!(atom(&c13, 0).isotope, Some(13));
        let deuterium = mol("[2H]");
        assert_eq!(atom(&deuterium, 0).element, Element::H);
        assert_eq!(atom(&deuterium, 0).isotope, Some(2));
        assert_eq!(atom(&mol("[O-2]"), 0).formal_charge, -2);
        assert_eq!(atom(&mol("[Fe++]"), 0).formal_charge, 2);
    }

    #[test]
    fn atom_class_kept() {
        assert_eq!(atom(&mol("[CH3:7]C"), 0).atom_class, 7);
    }

    #[test]
    fn default_valences() {
        for (smi, h) in [("P", 3), ("S", 2), ("B", 3), ("I", 1), ("N", 3), ("O", 2), ("Cl", 1)] {
            assert_eq!(atom(&mol(smi), 0).hydrogen_count, h, "{smi}");
        }
        assert_eq!(atom(&mol("CS(=O)C"), 1).hydrogen_count, 0);
        assert_eq!(atom(&mol("P(=O)(O)(O)O"), 0).hydrogen_count, 0);
    }

    // ---- Aromatic systems ----

    #[test]
    fn benzene() {
        let mol = mol("c1ccccc1");
        assert_eq!(mol.atom_count(), 6);
        for a in mol.atoms() {
            assert!(mol.atom(a).is_aromatic);
            assert_eq!(mol.atom(a).hydrogen_count, 1);
        }
        for b in mol.bonds() {
            assert_eq!(mol.bond(b).order, BondOrder::Aromatic);
            assert!(mol.bond(b).is_aromatic);
        }
    }

    #[test]
    fn kekule_benzene_is_perceived_aromatic() {
        let mol = mol("C1=CC=CC=C1");
        assert!(mol.atoms().all(|a| mol.atom(a).is_aromatic));
        assert!(mol.bonds().all(|b| mol.bond(b).order == BondOrder::Aromatic));
        assert_eq!(generate(&mol, true), "c1ccccc1");
    }

    #[test]
    fn heteroaromatics() {
        for smi in ["c1ccncc1", "o1cccc1", "[nH]1cccc1", "s1cccc1", "c1nccn1O"] {
            let mol = mol(smi);
            assert!(
                mol.ring_info().is_some_and(|r| r.num_aromatic_rings() >= 1),
                "{smi}"
            );
        }
        // An N-alkyl ring nitrogen only donates one electron.
        let methylated = mol("c1nccn1C");
        assert!(methylated.atoms().all(|a| !methylated.atom(a).is_aromatic));
        let pyrrole = mol("[nH]1cccc1");
        assert_eq!(atom(&pyrrole, 0).hydrogen_count, 1);
        assert!(atom(&pyrrole, 0).is_aromatic);
    }

    #[test]
    fn phenol_link_is_single() {
        let mol = mol("Oc1ccccc1");
        let link = mol.bond_between(n(0), n(1)).unwrap();
        assert_eq!(mol.bond(link).order, BondOrder::Single);
        assert!(!atom(&mol, 0).is_aromatic);
    }

    #[test]
    fn cyclohexadiene_is_not_aromatic() {
        let mol = mol("C1=CCC=CC1");
        assert!(mol.atoms().all(|a| !mol.atom(a).is_aromatic));
    }

    #[test]
    fn aromatic_bond_outside_ring_demoted() {
        let mol = mol("c1ccccc1c1ccccc1");
        let link = mol.bond_between(n(5), n(6)).unwrap();
        assert_eq!(mol.bond(link).order, BondOrder::Single);
        assert!(!mol.bond(link).is_aromatic);
    }

    #[test]
    fn unkekulizable_fragment_is_fatal() {
        let result = parse("c1cccc1");
        assert!(result.molecules.is_empty());
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].kind(), ErrorKind::Kekulization);
    }

    // ---- Stereochemistry ----

    #[test]
    fn tetrahedral_marks() {
        let ccw = mol("[C@](F)(Cl)(Br)I");
        assert_eq!(atom(&ccw, 0).chirality, Chirality::CounterClockwise);
        let cw = mol("[C@@](F)(Cl)(Br)I");
        assert_eq!(atom(&cw, 0).chirality, Chirality::Clockwise);
        let with_h = mol("[C@@H](F)(Cl)Br");
        assert_ne!(atom(&with_h, 0).chirality, Chirality::None);
        assert_eq!(atom(&with_h, 0).hydrogen_count, 1);
    }

    #[test]
    fn chirality_on_non_center_is_dropped() {
        assert_eq!(atom(&mol("F[C@H2]Cl"), 1).chirality, Chirality::None);
        assert_eq!(atom(&mol("[C@H]F"), 0).chirality, Chirality::None);
    }

    #[test]
    fn ez_double_bonds() {
        for (smi, trans) in [
            ("F/C=C/F", true),
            ("F/C=C\\F", false),
            ("Cl/C=C/Cl", true),
            ("Cl/C=C\\Cl", false),
        ] {
            let mol = mol(smi);
            let double = mol.bond_between(n(1), n(2)).unwrap();
            let config = double_bond_stereo(&mol, double).unwrap();
            assert_eq!(config.trans, trans, "{smi}");
        }
    }

    #[test]
    fn stray_direction_marker_removed() {
        let mol = mol("F/CC");
        let bond = mol.bond_between(n(0), n(1)).unwrap();
        assert_eq!(mol.bond(bond).stereo, BondStereo::None);
    }

    // ---- Fragments and errors ----

    #[test]
    fn sodium_chloride() {
        let result = parse("[Na+].[Cl-]");
        assert!(result.is_ok());
        assert_eq!(result.molecules.len(), 2);
        assert_eq!(atom(&result.molecules[0], 0).element, Element::Na);
        assert_eq!(atom(&result.molecules[1], 0).formal_charge, -1);
        assert_eq!(
            parse_one("[Na+].[Cl-]").unwrap_err(),
            SmilesError::MultipleFragments { count: 2 }
        );
    }

    #[test]
    fn bad_fragment_does_not_stop_others() {
        let result = parse("CC.C1CC.O");
        assert_eq!(result.molecules.len(), 2);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].fragment, 1);
        assert_eq!(
            result.errors[0].error,
            SmilesError::UnclosedRing { digit: 1, pos: 4 }
        );
    }

    #[test]
    fn positions_are_absolute() {
        let result = parse("  C.C(C");
        assert_eq!(
            result.errors[0].error,
            SmilesError::UnmatchedParen { pos: 5 }
        );
    }

    #[test]
    fn empty_inputs() {
        assert_eq!(parse_one("").unwrap_err(), SmilesError::EmptyInput);
        assert_eq!(parse_one("   ").unwrap_err(), SmilesError::EmptyInput);
        let result = parse("C..C");
        assert_eq!(result.molecules.len(), 2);
        assert_eq!(
            result.errors[0].error,
            SmilesError::EmptyFragment { pos: 2 }
        );
    }

    #[test]
    fn error_kinds() {
        let kind = |s: &str| parse(s).errors[0].kind();
        assert_eq!(kind("C)C"), ErrorKind::Syntax);
        assert_eq!(kind("[C"), ErrorKind::Syntax);
        assert_eq!(kind("C1CC"), ErrorKind::RingClosure);
        assert_eq!(kind("X"), ErrorKind::UnsupportedElement);
        assert_eq!(kind("*C"), ErrorKind::Syntax);
        assert_eq!(kind("C(C)(C)(C)(C)C"), ErrorKind::Valence);
    }

    #[test]
    fn valence_warning_keeps_molecule() {
        let result = parse("C(C)(C)(C)(C)C");
        assert_eq!(result.molecules.len(), 1);
        assert!(!result.has_fatal_errors());
        assert!(atom(&result.molecules[0], 0).invalid_valence);
        assert!(parse_one("C(C)(C)(C)(C)C").is_ok());
    }

    // ---- Generation ----

    #[test]
    fn generate_kekule_form() {
        let benzene = mol("c1ccccc1");
        let out = generate_with(
            &benzene,
            &WriteOptions {
                canonical: true,
                kekule: true,
                ..WriteOptions::default()
            },
        );
        assert_eq!(out.matches('=').count(), 3);
        assert!(out.chars().all(|c| !c.is_ascii_lowercase()), "{out}");
        assert_eq!(generate(&mol(&out), true), "c1ccccc1");
    }

    /// Carbons joined by aromatic-order bonds but never flagged aromatic.
    fn unflagged_aromatic(n: usize, edges: &[(usize, usize)], hydrogens: &[u8]) -> Molecule {
        let mut mol = Molecule::new();
        let atoms: Vec<AtomId> = (0..n)
            .map(|i| {
                let mut atom = Atom::new(Element::C);
                atom.hydrogen_count = hydrogens[i];
                mol.add_atom(atom)
            })
            .collect();
        for &(a, b) in edges {
            mol.add_bond(atoms[a], atoms[b], Bond::new(BondOrder::Aromatic))
                .unwrap();
        }
        mol
    }

    #[test]
    fn unflagged_aromatic_bonds_are_written_kekule() {
        let ethene = unflagged_aromatic(2, &[(0, 1)], &[2, 2]);
        assert_eq!(generate(&ethene, false), "C=C");

        let edges = [(3, 4), (0, 1), (1, 2), (4, 5), (2, 4), (0, 3), (0, 2)];
        let fused = unflagged_aromatic(6, &edges, &[0, 1, 0, 1, 0, 2]);
        for canonical in [false, true] {
            let out = generate(&fused, canonical);
            assert!(!out.contains(':'), "{out}");
            assert_eq!(out.matches('=').count(), 3, "{out}");
            assert_eq!(mol(&out).atom_count(), 6);
        }
    }

    #[test]
    fn unkekulizable_unflagged_bonds_are_written_single() {
        let edges = [(0, 1), (1, 2), (2, 3), (3, 4), (4, 0)];
        let ring = unflagged_aromatic(5, &edges, &[1; 5]);
        let out = generate(&ring, false);
        assert!(!out.contains(':') && !out.contains('='), "{out}");
        let back = mol(&out);
        assert!(back.bonds().all(|b| back.bond(b).order == BondOrder::Single));
    }

    #[test]
    fn flagged_rings_keep_lowercase_next_to_unflagged_bonds() {
        let mut phenyl = mol("c1ccccc1");
        let first = phenyl.atoms().next().unwrap();
        phenyl.atom_mut(first).hydrogen_count = 0;
        let vinyl = [2u8, 1].map(|h| {
            let mut atom = Atom::new(Element::C);
            atom.hydrogen_count = h;
            phenyl.add_atom(atom)
        });
        phenyl
            .add_bond(vinyl[0], vinyl[1], Bond::new(BondOrder::Aromatic))
            .unwrap();
        phenyl
            .add_bond(vinyl[1], first, Bond::new(BondOrder::Single))
            .unwrap();
        let out = generate(&phenyl, true);
        assert_eq!(out.matches('=').count(), 1, "{out}");
        assert_eq!(out.chars().filter(|c| *c == 'c').count(), 6, "{out}");
    }

    #[test]
    fn config_write_options_drive_generation() {
        let config = crate::options::Config::from_toml_str(
            "[canonical]\nmax_iterations = 8\n[kekulize]\nmax_steps = 1\n[write]\ncanonical = true\nkekule = true\n",
        )
        .unwrap();
        let opts = config.write_options();
        let azulene = mol("c1cc2cccccc2c1");
        let out = generate_with(&azulene, &opts);
        assert_eq!(out.matches('=').count(), 5, "{out}");
        assert!(out.chars().all(|c| !c.is_ascii_lowercase()), "{out}");
        assert_eq!(generate(&mol(&out), true), generate(&azulene, true));
    }

    #[test]
    fn generate_all_canonical_sorts() {
        let a = generate_all(&parse("O.[Na+].[Cl-]").molecules, true);
        let b = generate_all(&parse("[Cl-].O.[Na+]").molecules, true);
        assert_eq!(a, b);
    }

    #[test]
    fn larger_molecules_round_trip() {
        for smi in [
            "Cn1cnc2c1c(=O)n(c(=O)n2C)C",
            "c1ccc2ccccc2c1",
            "C[N+](=O)[O-]",
            "C1CC2C1CC2",
        ] {
            let first = mol(smi);
            let again = mol(&generate(&first, false));
            assert_eq!(first.atom_count(), again.atom_count(), "{smi}");
            assert_eq!(first.bond_count(), again.bond_count(), "{smi}");
            assert_eq!(generate(&first, true), generate(&again, true), "{smi}");
        }
    }
}
