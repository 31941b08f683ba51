use std::collections::HashSet;

use tracing::{debug, instrument, trace};

use crate::bond::BondOrder;
use crate::element::Element;
use crate::molecule::{AtomId, BondId, Molecule};
use crate::options::AromaticityOptions;
use crate::rings::RingInfo;
use crate::valence::{has_aromatic_bond, valence_gap};

/// Flags atoms and bonds of Hückel-aromatic rings.
///
/// Works on both the Kekulé form and the aromatic-order form. Bonds of
/// confirmed rings become [`BondOrder::Aromatic`]; every other atom and
/// bond has its aromatic flag cleared, whatever the input said.
pub fn perceive_aromaticity(mol: &Molecule, rings: &RingInfo) -> Molecule {
    perceive_aromaticity_with(mol, rings, &AromaticityOptions::default())
}

#[instrument(level = "debug", skip_all, fields(rings = rings.num_rings()))]
pub fn perceive_aromaticity_with(
    mol: &Molecule,
    rings: &RingInfo,
    opts: &AromaticityOptions,
) -> Molecule {
    let candidates: Vec<usize> = (0..rings.num_rings())
        .filter(|&i| {
            let ring = &rings.rings()[i];
            (opts.min_ring_size..=opts.max_ring_size).contains(&ring.len())
                && ring.iter().all(|&a| mol.get_atom(a).is_some())
        })
        .collect();

    let mut aromatic = vec![false; rings.num_rings()];
    for &i in &candidates {
        let ring = &rings.rings()[i];
        let pi = ring_pi_electrons(mol, rings, ring);
        trace!(ring = i, size = ring.len(), ?pi, "ring pi count");
        aromatic[i] = pi.is_some_and(is_huckel);
    }

    if opts.fused_envelopes {
        for (k, &i) in candidates.iter().enumerate() {
            for &j in &candidates[k + 1..] {
                if aromatic[i] && aromatic[j] {
                    continue;
                }
                if envelope_is_aromatic(mol, rings, i, j) {
                    debug!(first = i, second = j, "fused envelope is aromatic");
                    aromatic[i] = true;
                    aromatic[j] = true;
                }
            }
        }
    }

    let mut aromatic_bonds: HashSet<BondId> = HashSet::new();
    let mut aromatic_atoms: HashSet<AtomId> = HashSet::new();
    for (i, _) in aromatic.iter().enumerate().filter(|(_, a)| **a) {
        aromatic_atoms.extend(rings.rings()[i].iter().copied());
        if let Some(bonds) = rings.ring_bonds(i) {
            aromatic_bonds.extend(bonds.iter().copied());
        }
    }

    let mut out = mol.clone();
    let atom_ids: Vec<AtomId> = out.atoms().collect();
    for id in atom_ids {
        out.atom_mut(id).is_aromatic = aromatic_atoms.contains(&id);
    }
    let bond_ids: Vec<BondId> = out.bonds().collect();
    for id in bond_ids {
        let bond = out.bond_mut(id);
        if aromatic_bonds.contains(&id) {
            bond.order = BondOrder::Aromatic;
            bond.is_aromatic = true;
        } else {
            bond.is_aromatic = false;
        }
    }

    let mut info = rings.clone();
    for (i, &flag) in aromatic.iter().enumerate() {
        info.set_aromatic(i, flag);
    }
    out.attach_ring_info(info);
    out
}

/// Shared-bond envelope of rings `i` and `j`, if they share a bond.
fn envelope_is_aromatic(mol: &Molecule, rings: &RingInfo, i: usize, j: usize) -> bool {
    let (Some(bi), Some(bj)) = (rings.ring_bonds(i), rings.ring_bonds(j)) else {
        return false;
    };
    if !bi.iter().any(|b| bj.contains(b)) {
        return false;
    }
    let mut atoms: Vec<AtomId> = rings.rings()[i].clone();
    for &a in &rings.rings()[j] {
        if !atoms.contains(&a) {
            atoms.push(a);
        }
    }
    ring_pi_electrons(mol, rings, &atoms).is_some_and(is_huckel)
}

fn ring_pi_electrons(mol: &Molecule, rings: &RingInfo, atoms: &[AtomId]) -> Option<u8> {
    let mut total: u8 = 0;
    for &atom in atoms {
        total = total.saturating_add(pi_electrons(mol, rings, atom, atoms)?);
    }
    Some(total)
}

/// Pi electrons `atom` donates to the ring made of `members`, or `None` if it
/// breaks conjugation.
fn pi_electrons(mol: &Molecule, rings: &RingInfo, atom: AtomId, members: &[AtomId]) -> Option<u8> {
    let data = mol.atom(atom);
    if !data.element.is_pi_capable() {
        return None;
    }

    let mut double_in_ring_system = false;
    let mut exocyclic_carbonyl = false;
    for bond in mol.bonds_of(atom) {
        let other = mol.other_atom(bond, atom)?;
        match mol.bond(bond).order {
            BondOrder::Triple => return None,
            BondOrder::Double if rings.is_ring_atom(other) => double_in_ring_system = true,
            BondOrder::Double => match mol.atom(other).element {
                Element::O | Element::N | Element::S => exocyclic_carbonyl = true,
                _ => return None,
            },
            _ => {}
        }
    }
    if double_in_ring_system {
        return Some(1);
    }
    if exocyclic_carbonyl {
        return Some(0);
    }
    if has_aromatic_bond(mol, atom) && valence_gap(mol, atom).is_some_and(|g| g >= 1) {
        return Some(1);
    }

    let charge = data.formal_charge;
    match data.element {
        Element::C => match charge {
            c if c < 0 => Some(2),
            c if c > 0 => Some(0),
            _ => None,
        },
        Element::N | Element::P | Element::As => {
            if charge < 0 || data.hydrogen_count > 0 {
                return Some(2);
            }
            if charge > 0 {
                return Some(0);
            }
            // Any neighbour outside this ring is a substituent, cyclic or not.
            let mut exocyclic = mol
                .neighbors(atom)
                .filter(|n| !members.contains(n))
                .peekable();
            if exocyclic.peek().is_none() {
                return Some(2);
            }
            let electronegative = exocyclic.all(|n| {
                matches!(
                    mol.atom(n).element,
                    Element::O | Element::N | Element::F | Element::Cl
                )
            });
            Some(if electronegative { 2 } else { 1 })
        }
        Element::O | Element::S | Element::Se | Element::Te => {
            (mol.degree(atom) == 2 && data.hydrogen_count == 0).then_some(2)
        }
        Element::B => Some(0),
        _ => None,
    }
}

fn is_huckel(pi_electrons: u8) -> bool {
    if pi_electrons < 2 {
        return false;
    }
    (pi_electrons - 2).is_multiple_of(4)
}
