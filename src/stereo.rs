use crate::atom::Chirality;
use crate::bond::{BondOrder, BondStereo};
use crate::molecule::{AtomId, BondId, Molecule};

/// Geometry of a stereo double bond `a=b`, read from the directional
/// markers on one substituent bond at each end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DoubleBondStereo {
    pub a: AtomId,
    pub b: AtomId,
    pub ref_a: AtomId,
    pub ref_b: AtomId,
    /// `ref_a` and `ref_b` sit on opposite sides.
    pub trans: bool,
}

/// Marker on `bond` as seen walking from `from` to its other end.
pub fn direction_from(mol: &Molecule, bond: BondId, from: AtomId) -> BondStereo {
    let stereo = mol.bond(bond).stereo;
    match mol.bond_endpoints(bond) {
        Some((source, _)) if source == from => stereo,
        _ => stereo.flipped(),
    }
}

fn marked_substituent(mol: &Molecule, center: AtomId, partner: AtomId) -> Option<(AtomId, BondStereo)> {
    mol.sorted_neighbors(center)
        .into_iter()
        .filter(|&n| n != partner)
        .find_map(|n| {
            let bond = mol.bond_between(center, n)?;
            match direction_from(mol, bond, center) {
                BondStereo::None => None,
                dir => Some((n, dir)),
            }
        })
}

/// E/Z configuration of a double bond, if both ends carry a marker.
pub fn double_bond_stereo(mol: &Molecule, bond: BondId) -> Option<DoubleBondStereo> {
    if mol.bond(bond).order != BondOrder::Double {
        return None;
    }
    let (a, b) = mol.bond_endpoints(bond)?;
    let (ref_a, dir_a) = marked_substituent(mol, a, b)?;
    let (ref_b, dir_b) = marked_substituent(mol, b, a)?;
    Some(DoubleBondStereo {
        a,
        b,
        ref_a,
        ref_b,
        trans: dir_a != dir_b,
    })
}

/// Whether `x` and `y`, substituents on the two ends of `config`, are trans.
/// `None` if either is not a substituent of that end.
pub fn is_trans(mol: &Molecule, config: &DoubleBondStereo, x: AtomId, y: AtomId) -> Option<bool> {
    let flip_a = side_flip(mol, config.a, config.b, config.ref_a, x)?;
    let flip_b = side_flip(mol, config.b, config.a, config.ref_b, y)?;
    Some(config.trans ^ flip_a ^ flip_b)
}

fn side_flip(mol: &Molecule, center: AtomId, partner: AtomId, reference: AtomId, x: AtomId) -> Option<bool> {
    if x == reference {
        return Some(false);
    }
    if x != partner && mol.bond_between(center, x).is_some() {
        return Some(true);
    }
    None
}

/// Drops tetrahedral marks on atoms that cannot be stereocenters: fewer
/// than three ligands, or two or more hydrogens.
pub fn cleanup_chirality(mol: &mut Molecule) {
    let indices: Vec<AtomId> = mol.atoms().collect();
    for idx in indices {
        let atom = mol.atom(idx);
        if !atom.chirality.is_tetrahedral() {
            continue;
        }
        let ligands = mol.degree(idx) + usize::from(atom.hydrogen_count);
        if ligands < 3 || ligands > 4 || atom.hydrogen_count > 1 {
            mol.atom_mut(idx).chirality = Chirality::None;
        }
    }
}

/// Clears directional markers that do not belong to any stereo double
/// bond, e.g. `C/C-C` or the markers left on a ring double bond's
/// neighbors in a small ring.
pub fn cleanup_bond_stereo(mol: &mut Molecule) {
    let mut keep: Vec<BondId> = Vec::new();
    let doubles: Vec<BondId> = mol
        .bonds()
        .filter(|&b| mol.bond(b).order == BondOrder::Double)
        .collect();
    for bond in doubles {
        let Some(config) = double_bond_stereo(mol, bond) else {
            continue;
        };
        for (center, partner) in [(config.a, config.b), (config.b, config.a)] {
            for n in mol.neighbors(center) {
                if n == partner {
                    continue;
                }
                if let Some(b) = mol.bond_between(center, n) {
                    keep.push(b);
                }
            }
        }
    }
    let marked: Vec<BondId> = mol
        .bonds()
        .filter(|&b| mol.bond(b).stereo != BondStereo::None && !keep.contains(&b))
        .collect();
    for bond in marked {
        mol.bond_mut(bond).stereo = BondStereo::None;
    }
}
