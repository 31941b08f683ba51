use std::collections::{HashMap, HashSet};

use crate::molecule::{AtomId, BondId, Ligand, Molecule, MoleculeError, is_even_permutation};
use crate::rings::perceive_rings;

/// Dense re-indexing of a molecule's atoms and bonds.
///
/// Stable graph ids may have holes; algorithms that want `Vec`-indexed
/// state work on positions `0..n` instead. Atoms and bonds are numbered in
/// ascending id order, and each adjacency list is sorted by neighbor
/// position so traversals are deterministic.
pub(crate) struct Topology {
    pub atoms: Vec<AtomId>,
    pub bonds: Vec<BondId>,
    pub bond_ends: Vec<(usize, usize)>,
    pub adj: Vec<Vec<(usize, usize)>>,
    atom_pos: Vec<usize>,
}

impl Topology {
    pub fn new(mol: &Molecule) -> Self {
        let atoms: Vec<AtomId> = mol.atoms().collect();
        let bonds: Vec<BondId> = mol.bonds().collect();
        let atom_bound = atoms.iter().map(|a| a.index() + 1).max().unwrap_or(0);

        let mut atom_pos = vec![usize::MAX; atom_bound];
        for (i, a) in atoms.iter().enumerate() {
            atom_pos[a.index()] = i;
        }
        let mut bond_ends = Vec::with_capacity(bonds.len());
        let mut adj = vec![Vec::new(); atoms.len()];
        for (i, &b) in bonds.iter().enumerate() {
            if let Some((u, v)) = mol.bond_endpoints(b) {
                let (pu, pv) = (atom_pos[u.index()], atom_pos[v.index()]);
                bond_ends.push((pu, pv));
                adj[pu].push((pv, i));
                adj[pv].push((pu, i));
            }
        }
        for list in &mut adj {
            list.sort_unstable();
        }

        Self {
            atoms,
            bonds,
            bond_ends,
            adj,
            atom_pos,
        }
    }

    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn atom_pos(&self, id: AtomId) -> usize {
        self.atom_pos[id.index()]
    }

    pub fn bond_between(&self, a: usize, b: usize) -> Option<usize> {
        self.adj[a]
            .binary_search_by_key(&b, |&(n, _)| n)
            .ok()
            .map(|i| self.adj[a][i].1)
    }
}

/// Connected components, each sorted by id, ordered by their smallest atom.
pub fn connected_components(mol: &Molecule) -> Vec<Vec<AtomId>> {
    let topo = Topology::new(mol);
    let n = topo.len();
    let mut visited = vec![false; n];
    let mut components = Vec::new();
    for start in 0..n {
        if visited[start] {
            continue;
        }
        let mut component = Vec::new();
        let mut stack = vec![start];
        while let Some(current) = stack.pop() {
            if visited[current] {
                continue;
            }
            visited[current] = true;
            component.push(topo.atoms[current]);
            for &(nb, _) in &topo.adj[current] {
                if !visited[nb] {
                    stack.push(nb);
                }
            }
        }
        component.sort();
        components.push(component);
    }
    components
}

/// One molecule per connected component, atoms kept in id order.
pub fn fragments(mol: &Molecule) -> Vec<Molecule> {
    connected_components(mol)
        .iter()
        .map(|component| copy_atoms(mol, component))
        .collect()
}

/// Copies `mol` with atoms inserted in `new_order` (a permutation of its
/// atom ids). Chirality is re-expressed against the new ids so the copy
/// describes the same stereoisomer.
pub fn renumber_atoms(mol: &Molecule, new_order: &[AtomId]) -> Result<Molecule, MoleculeError> {
    let mut seen: HashSet<AtomId> = HashSet::with_capacity(new_order.len());
    for &id in new_order {
        if mol.get_atom(id).is_none() {
            return Err(MoleculeError::MissingAtom(id.index()));
        }
        seen.insert(id);
    }
    if new_order.len() != mol.atom_count() || seen.len() != new_order.len() {
        return Err(MoleculeError::BadPermutation {
            expected: mol.atom_count(),
            got: new_order.len(),
        });
    }
    Ok(copy_atoms(mol, new_order))
}

fn copy_atoms(mol: &Molecule, order: &[AtomId]) -> Molecule {
    let mut out = Molecule::new();
    let mut old_to_new: HashMap<AtomId, AtomId> = HashMap::with_capacity(order.len());
    for &old in order {
        let mut atom = mol.atom(old).clone();
        atom.ring_ids.clear();
        old_to_new.insert(old, out.add_atom(atom));
    }

    for bond in mol.bonds() {
        let Some((a, b)) = mol.bond_endpoints(bond) else {
            continue;
        };
        let (Some(&na), Some(&nb)) = (old_to_new.get(&a), old_to_new.get(&b)) else {
            continue;
        };
        let mut copy = mol.bond(bond).clone();
        copy.ring_ids.clear();
        // Endpoint order is preserved, so directional markers stay valid.
        let _ = out.add_bond(na, nb, copy);
    }

    for (&old, &new) in &old_to_new {
        let chirality = mol.atom(old).chirality;
        if !chirality.is_tetrahedral() {
            continue;
        }
        let mapped: Vec<Ligand> = mol
            .stereo_reference(old)
            .into_iter()
            .map(|l| match l {
                Ligand::Atom(id) => Ligand::Atom(old_to_new[&id]),
                Ligand::ImplicitH => Ligand::ImplicitH,
            })
            .collect();
        let reference = out.stereo_reference(new);
        if !is_even_permutation(&mapped, &reference) {
            out.atom_mut(new).chirality = chirality.inverted();
        }
    }

    if mol.ring_info().is_some() {
        let info = perceive_rings(&out).with_aromatic_flags_from(&out);
        out.attach_ring_info(info);
    }
    out
}
