use crate::atom::Atom;
use crate::bond::{Bond, BondOrder, BondStereo};
use crate::molecule::{AtomId, Ligand, Molecule, is_even_permutation};
use crate::smiles::error::SmilesError;
use crate::smiles::parse_tree::ParseTree;
use crate::smiles::tokenizer::BondToken;
use crate::valence::implicit_hydrogens;

/// Turns a parse tree into a molecule with hydrogens filled in and
/// chirality expressed against the stored reference order.
///
/// Bonds written without a symbol between two lowercase atoms are
/// aromatic; every other unwritten bond is single.
pub fn build_molecule(tree: &ParseTree) -> Result<Molecule, SmilesError> {
    let mut mol = Molecule::new();
    let ids: Vec<AtomId> = tree
        .atoms
        .iter()
        .map(|parse_atom| {
            let tok = &parse_atom.token;
            mol.add_atom(Atom {
                formal_charge: tok.charge,
                isotope: tok.isotope,
                atom_class: tok.atom_class,
                ..Atom::new(tok.element)
            })
        })
        .collect();

    for parse_bond in &tree.bonds {
        let from = &tree.atoms[parse_bond.from].token;
        let to = &tree.atoms[parse_bond.to].token;
        let (order, stereo) = resolve_bond(parse_bond.bond, from.lowercase && to.lowercase);
        let bond = Bond {
            stereo,
            ..Bond::new(order)
        };
        mol.add_bond(ids[parse_bond.from], ids[parse_bond.to], bond)
            .map_err(|_| SmilesError::DuplicateBond {
                digit: parse_bond.ring.unwrap_or(0),
                pos: parse_bond.pos,
            })?;
    }

    resolve_hydrogen_counts(&mut mol, tree, &ids);
    resolve_chirality(&mut mol, tree, &ids);
    Ok(mol)
}

fn resolve_bond(bond: Option<BondToken>, both_lowercase: bool) -> (BondOrder, BondStereo) {
    match bond {
        Some(BondToken::Single) => (BondOrder::Single, BondStereo::None),
        Some(BondToken::Double) => (BondOrder::Double, BondStereo::None),
        Some(BondToken::Triple) => (BondOrder::Triple, BondStereo::None),
        Some(BondToken::Aromatic) => (BondOrder::Aromatic, BondStereo::None),
        Some(BondToken::Up) => (BondOrder::Single, BondStereo::Up),
        Some(BondToken::Down) => (BondOrder::Single, BondStereo::Down),
        None if both_lowercase => (BondOrder::Aromatic, BondStereo::None),
        None => (BondOrder::Single, BondStereo::None),
    }
}

fn resolve_hydrogen_counts(mol: &mut Molecule, tree: &ParseTree, ids: &[AtomId]) {
    for (parse_atom, &id) in tree.atoms.iter().zip(ids) {
        let tok = &parse_atom.token;
        let count = if tok.is_bracket {
            tok.hcount.unwrap_or(0)
        } else {
            implicit_hydrogens(tok.element, tok.lowercase, mol.bond_order_sum(id))
        };
        mol.atom_mut(id).hydrogen_count = count;
    }
}

/// `@`/`@@` describe the ligands in textual order: the preceding atom, the
/// bracket hydrogen, then ring closures and branches as written. That
/// order is compared against [`Molecule::stereo_reference`] and the mark
/// inverted on an odd permutation.
fn resolve_chirality(mol: &mut Molecule, tree: &ParseTree, ids: &[AtomId]) {
    for (parse_atom, &id) in tree.atoms.iter().zip(ids) {
        let chirality = parse_atom.token.chirality;
        if !chirality.is_tetrahedral() {
            mol.atom_mut(id).chirality = chirality;
            continue;
        }

        let mut textual: Vec<Ligand> = parse_atom
            .neighbors
            .iter()
            .map(|&n| Ligand::Atom(ids[n]))
            .collect();
        if mol.atom(id).hydrogen_count > 0 {
            let at = usize::from(parse_atom.has_parent).min(textual.len());
            textual.insert(at, Ligand::ImplicitH);
        }

        let reference = mol.stereo_reference(id);
        mol.atom_mut(id).chirality = if is_even_permutation(&textual, &reference) {
            chirality
        } else {
            chirality.inverted()
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::Chirality;
    use crate::element::Element;
    use crate::smiles::parse_tree::build_parse_tree;
    use crate::smiles::tokenizer::tokenize;

    fn build(s: &str) -> Molecule {
        let chars: Vec<char> = s.chars().collect();
        let tokens = tokenize(&chars, 0).unwrap();
        let tree = build_parse_tree(&tokens, 0, chars.len()).unwrap();
        build_molecule(&tree).unwrap()
    }

    fn hydrogens(mol: &Molecule) -> Vec<u8> {
        mol.atoms().map(|a| mol.atom(a).hydrogen_count).collect()
    }

    #[test]
    fn methane_h_count() {
        let mol = build("C");
        assert_eq!(mol.atom_count(), 1);
        assert_eq!(hydrogens(&mol), vec![4]);
    }

    #[test]
    fn chain_h_counts() {
        assert_eq!(hydrogens(&build("CC")), vec![3, 3]);
        assert_eq!(hydrogens(&build("C=C")), vec![2, 2]);
        assert_eq!(hydrogens(&build("C#N")), vec![1, 0]);
        assert_eq!(hydrogens(&build("CS(=O)(=O)C")), vec![3, 0, 0, 0, 3]);
    }

    #[test]
    fn bracket_atom_h() {
        assert_eq!(hydrogens(&build("[CH4]")), vec![4]);
        assert_eq!(hydrogens(&build("[C]")), vec![0]);
        assert_eq!(hydrogens(&build("[NH4+]")), vec![4]);
    }

    #[test]
    fn aromatic_carbons_get_one_hydrogen() {
        let mol = build("c1ccccc1");
        assert_eq!(hydrogens(&mol), vec![1; 6]);
        assert!(mol.bonds().all(|b| mol.bond(b).order == BondOrder::Aromatic));
        // Builder leaves the flag to perception.
        assert!(mol.atoms().all(|a| !mol.atom(a).is_aromatic));
    }

    #[test]
    fn pyridine_nitrogen_has_no_hydrogen() {
        assert_eq!(hydrogens(&build("n1ccccc1")), vec![0, 1, 1, 1, 1, 1]);
    }

    #[test]
    fn lowercase_next_to_uppercase_is_single() {
        let mol = build("Cc1ccccc1");
        let ids: Vec<AtomId> = mol.atoms().collect();
        let bond = mol.bond_between(ids[0], ids[1]).unwrap();
        assert_eq!(mol.bond(bond).order, BondOrder::Single);
    }

    #[test]
    fn directional_markers_follow_bond_direction() {
        let mol = build("F/C=C\\F");
        let ids: Vec<AtomId> = mol.atoms().collect();
        let first = mol.bond_between(ids[0], ids[1]).unwrap();
        let last = mol.bond_between(ids[2], ids[3]).unwrap();
        assert_eq!(mol.bond(first).stereo, BondStereo::Up);
        assert_eq!(mol.bond(last).stereo, BondStereo::Down);
    }

    #[test]
    fn chirality_relative_to_reference_order() {
        // Textual order F, H, Cl, Br; reference order H, F, Cl, Br is odd.
        let mol = build("F[C@H](Cl)Br");
        let ids: Vec<AtomId> = mol.atoms().collect();
        assert_eq!(mol.atom(ids[1]).chirality, Chirality::Clockwise);
        // Leading hydrogen: textual order equals the reference.
        let mol = build("[C@H](F)(Cl)Br");
        let ids: Vec<AtomId> = mol.atoms().collect();
        assert_eq!(mol.atom(ids[0]).chirality, Chirality::CounterClockwise);
    }

    #[test]
    fn extended_chirality_kept() {
        let mol = build("F[Pt@SP1](F)(Cl)Cl");
        let ids: Vec<AtomId> = mol.atoms().collect();
        assert!(matches!(
            mol.atom(ids[1]).chirality,
            Chirality::Extended { index: 1, .. }
        ));
        assert_eq!(mol.atom(ids[1]).element, Element::Pt);
    }
}
