use thiserror::Error;

use crate::bond::BondOrder;
use crate::element::Element;
use crate::molecule::{AtomId, Molecule};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("atom {atom} ({element}): valence {actual} not in {allowed:?}")]
pub struct ValenceError {
    pub atom: usize,
    pub element: Element,
    pub actual: u8,
    pub allowed: Vec<u8>,
}

/// Valences an element may show at a given formal charge.
///
/// A charged atom behaves like its isoelectronic neutral neighbor: N⁺ like
/// C, O⁻ like F, S⁺ like P. Elements without a valence table (metals,
/// noble gases) return an empty slice and are never checked.
pub fn allowed_valences(element: Element, charge: i8) -> &'static [u8] {
    let defaults = element.default_valences();
    if charge == 0 || defaults.is_empty() {
        return defaults;
    }
    if element == Element::H {
        return &[0];
    }
    let electrons = i16::from(element.outer_electrons()) - i16::from(charge);
    if element.period() <= 2 {
        match electrons {
            1 => &[1],
            2 => &[2],
            3 | 5 => &[3],
            4 => &[4],
            6 => &[2],
            7 => &[1],
            _ => &[0],
        }
    } else {
        match electrons {
            1 => &[1],
            2 => &[2],
            3 => &[3],
            4 => &[4],
            5 => &[3, 5],
            6 => &[2, 4, 6],
            7 => &[1, 3, 5, 7],
            _ => &[0],
        }
    }
}

/// Hydrogens an unbracketed atom receives.
///
/// Picks the smallest default valence that accommodates `bond_sum`. A
/// lowercase (aromatic) atom gives one of the remaining slots to its pi bond.
pub fn implicit_hydrogens(element: Element, lowercase: bool, bond_sum: u8) -> u8 {
    let Some(&target) = element
        .default_valences()
        .iter()
        .find(|&&v| v >= bond_sum)
    else {
        return 0;
    };
    let h = target - bond_sum;
    if lowercase && h > 0 { h - 1 } else { h }
}

/// Bonds plus hydrogens, aromatic bonds counting one.
pub fn used_valence(mol: &Molecule, id: AtomId) -> u8 {
    mol.bond_order_sum(id)
        .saturating_add(mol.atom(id).hydrogen_count)
}

pub(crate) fn has_aromatic_bond(mol: &Molecule, id: AtomId) -> bool {
    mol.bonds_of(id)
        .any(|b| mol.bond(b).order == BondOrder::Aromatic)
}

/// Distance from the used valence up to the nearest allowed one.
pub(crate) fn valence_gap(mol: &Molecule, id: AtomId) -> Option<u8> {
    let atom = mol.atom(id);
    let used = used_valence(mol, id);
    allowed_valences(atom.element, atom.formal_charge)
        .iter()
        .find(|&&v| v >= used)
        .map(|&v| v - used)
}

/// True if the atom sits on an aromatic bond and still has valence left
/// for one double bond.
pub(crate) fn needs_double_bond(mol: &Molecule, id: AtomId) -> bool {
    has_aromatic_bond(mol, id) && valence_gap(mol, id).is_some_and(|g| g >= 1)
}

pub fn check_atom(mol: &Molecule, id: AtomId) -> Result<(), ValenceError> {
    let atom = mol.atom(id);
    let allowed = allowed_valences(atom.element, atom.formal_charge);
    if allowed.is_empty() {
        return Ok(());
    }
    let used = used_valence(mol, id);
    if allowed.contains(&used) {
        return Ok(());
    }
    // One aromatic bond per atom becomes double after kekulization.
    if has_aromatic_bond(mol, id) && allowed.contains(&used.saturating_add(1)) {
        return Ok(());
    }
    Err(ValenceError {
        atom: id.index(),
        element: atom.element,
        actual: used,
        allowed: allowed.to_vec(),
    })
}

pub fn check_valence(mol: &Molecule) -> Result<(), Vec<ValenceError>> {
    let errors: Vec<ValenceError> = mol
        .atoms()
        .filter_map(|id| check_atom(mol, id).err())
        .collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Runs [`check_atom`] on every atom, records the outcome in
/// `Atom::invalid_valence` and returns the violations.
pub fn flag_invalid_valences(mol: &mut Molecule) -> Vec<ValenceError> {
    let ids: Vec<AtomId> = mol.atoms().collect();
    let mut errors = Vec::new();
    for id in ids {
        let result = check_atom(mol, id);
        mol.atom_mut(id).invalid_valence = result.is_err();
        if let Err(e) = result {
            errors.push(e);
        }
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smiles::parse;

    #[test]
    fn neutral_valences_are_defaults() {
        assert_eq!(allowed_valences(Element::C, 0), &[4]);
        assert_eq!(allowed_valences(Element::S, 0), &[2, 4, 6]);
        assert!(allowed_valences(Element::Fe, 0).is_empty());
    }

    #[test]
    fn charged_valences_follow_isoelectronic_neighbor() {
        assert_eq!(allowed_valences(Element::N, 1), &[4]);
        assert_eq!(allowed_valences(Element::N, -1), &[2]);
        assert_eq!(allowed_valences(Element::O, -1), &[1]);
        assert_eq!(allowed_valences(Element::O, 1), &[3]);
        assert_eq!(allowed_valences(Element::C, -1), &[3]);
        assert_eq!(allowed_valences(Element::C, 1), &[3]);
        assert_eq!(allowed_valences(Element::B, -1), &[4]);
        assert_eq!(allowed_valences(Element::S, 1), &[3, 5]);
        assert_eq!(allowed_valences(Element::P, 1), &[4]);
        assert_eq!(allowed_valences(Element::Cl, -1), &[0]);
    }

    #[test]
    fn implicit_h_counts() {
        assert_eq!(implicit_hydrogens(Element::C, false, 0), 4);
        assert_eq!(implicit_hydrogens(Element::C, false, 2), 2);
        assert_eq!(implicit_hydrogens(Element::N, false, 4), 1);
        assert_eq!(implicit_hydrogens(Element::S, false, 3), 1);
        assert_eq!(implicit_hydrogens(Element::C, true, 2), 1);
        assert_eq!(implicit_hydrogens(Element::N, true, 2), 0);
        assert_eq!(implicit_hydrogens(Element::C, false, 5), 0);
        assert_eq!(implicit_hydrogens(Element::Na, false, 0), 0);
    }

    #[test]
    fn pentavalent_carbon_is_flagged() {
        let result = parse("C(C)(C)(C)(C)C");
        assert_eq!(result.molecules.len(), 1);
        let mol = &result.molecules[0];
        let bad: Vec<_> = mol.atoms().filter(|&a| mol.atom(a).invalid_valence).collect();
        assert_eq!(bad.len(), 1);
        assert_eq!(result.errors.len(), 1);
    }

    #[test]
    fn ordinary_molecules_pass() {
        for smi in ["CCO", "c1ccccc1", "[NH4+]", "C[N+](=O)[O-]", "CS(=O)(=O)C", "[Na+].[Cl-]"] {
            let result = parse(smi);
            assert!(result.errors.is_empty(), "{smi}: {:?}", result.errors);
            for mol in &result.molecules {
                assert!(check_valence(mol).is_ok(), "{smi}");
            }
        }
    }
}
