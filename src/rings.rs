use std::collections::{HashMap, VecDeque};

use tracing::{instrument, trace};

use crate::graph_ops::Topology;
use crate::molecule::{AtomId, BondId, Molecule};

/// Smallest set of smallest rings plus membership lookups.
///
/// Rings are stored normalized (starting at the smallest atom id, walking
/// toward the smaller of its two ring neighbors) and sorted by size, then
/// by atom sequence. Ring indices in `atom_rings`/`bond_rings` refer to
/// that order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RingInfo {
    rings: Vec<Vec<AtomId>>,
    ring_bonds: Vec<Vec<BondId>>,
    atom_rings: HashMap<AtomId, Vec<usize>>,
    bond_rings: HashMap<BondId, Vec<usize>>,
    aromatic: Vec<bool>,
}

/// Computes the SSSR of `mol`.
pub fn perceive_rings(mol: &Molecule) -> RingInfo {
    RingInfo::sssr(mol)
}

impl RingInfo {
    /// Minimal cycle basis from Horton candidates and GF(2) elimination.
    ///
    /// Runs in polynomial time: one BFS tree per atom, one candidate per
    /// (root, bond) pair, and incremental elimination over bond bitsets.
    #[instrument(level = "debug", skip_all, fields(atoms = mol.atom_count(), bonds = mol.bond_count()))]
    pub fn sssr(mol: &Molecule) -> Self {
        let topo = Topology::new(mol);
        let expected = cycle_rank(&topo);
        if expected == 0 {
            return Self::from_rings(&topo, Vec::new());
        }

        let candidates = horton_candidates(&topo);
        trace!(expected, candidates = candidates.len(), "selecting ring basis");
        let rings = select_independent_rings(&topo, &candidates, expected);
        Self::from_rings(&topo, rings)
    }

    fn from_rings(topo: &Topology, rings: Vec<Vec<usize>>) -> Self {
        let mut info = Self::default();
        for (ring_idx, ring) in rings.iter().enumerate() {
            let atoms: Vec<AtomId> = ring.iter().map(|&p| topo.atoms[p]).collect();
            let len = ring.len();
            let bonds: Vec<BondId> = (0..len)
                .filter_map(|i| topo.bond_between(ring[i], ring[(i + 1) % len]))
                .map(|b| topo.bonds[b])
                .collect();
            for &a in &atoms {
                info.atom_rings.entry(a).or_default().push(ring_idx);
            }
            for &b in &bonds {
                info.bond_rings.entry(b).or_default().push(ring_idx);
            }
            info.rings.push(atoms);
            info.ring_bonds.push(bonds);
        }
        info.aromatic = vec![false; info.rings.len()];
        info
    }

    /// Marks each ring aromatic iff every one of its bonds carries the
    /// aromatic flag in `mol`.
    pub fn with_aromatic_flags_from(mut self, mol: &Molecule) -> Self {
        self.aromatic = self
            .ring_bonds
            .iter()
            .map(|bonds| {
                !bonds.is_empty()
                    && bonds
                        .iter()
                        .all(|&b| mol.graph().edge_weight(b).is_some_and(|bond| bond.is_aromatic))
            })
            .collect();
        self
    }

    pub(crate) fn set_aromatic(&mut self, ring: usize, aromatic: bool) {
        if let Some(flag) = self.aromatic.get_mut(ring) {
            *flag = aromatic;
        }
    }

    pub fn num_rings(&self) -> usize {
        self.rings.len()
    }

    pub fn rings(&self) -> &[Vec<AtomId>] {
        &self.rings
    }

    pub fn ring(&self, idx: usize) -> Option<&[AtomId]> {
        self.rings.get(idx).map(Vec::as_slice)
    }

    /// Bonds of ring `idx`, in walking order starting from its first atom.
    pub fn ring_bonds(&self, idx: usize) -> Option<&[BondId]> {
        self.ring_bonds.get(idx).map(Vec::as_slice)
    }

    pub fn is_ring_atom(&self, atom: AtomId) -> bool {
        self.atom_rings.contains_key(&atom)
    }

    pub fn is_ring_bond(&self, bond: BondId) -> bool {
        self.bond_rings.contains_key(&bond)
    }

    pub fn num_atom_rings(&self, atom: AtomId) -> usize {
        self.atom_rings.get(&atom).map_or(0, Vec::len)
    }

    pub fn num_bond_rings(&self, bond: BondId) -> usize {
        self.bond_rings.get(&bond).map_or(0, Vec::len)
    }

    /// Indices of the rings containing `atom`.
    pub fn atom_rings(&self, atom: AtomId) -> &[usize] {
        self.atom_rings.get(&atom).map_or(&[], Vec::as_slice)
    }

    pub fn bond_rings(&self, bond: BondId) -> &[usize] {
        self.bond_rings.get(&bond).map_or(&[], Vec::as_slice)
    }

    pub fn rings_of_size(&self, size: usize) -> Vec<usize> {
        (0..self.rings.len())
            .filter(|&i| self.rings[i].len() == size)
            .collect()
    }

    pub fn smallest_ring_size(&self, atom: AtomId) -> Option<usize> {
        self.atom_rings(atom)
            .iter()
            .map(|&r| self.rings[r].len())
            .min()
    }

    pub fn is_aromatic_ring(&self, idx: usize) -> bool {
        self.aromatic.get(idx).copied().unwrap_or(false)
    }

    pub fn num_aromatic_rings(&self) -> usize {
        self.aromatic.iter().filter(|&&a| a).count()
    }

    /// Bonds shared by two or more rings, ascending.
    pub fn fused_bonds(&self) -> Vec<BondId> {
        let mut out: Vec<BondId> = self
            .bond_rings
            .iter()
            .filter(|(_, rings)| rings.len() > 1)
            .map(|(&b, _)| b)
            .collect();
        out.sort();
        out
    }

    /// Cycle rank `E − V + C`: the number of rings any basis must have.
    pub fn expected_ring_count(mol: &Molecule) -> usize {
        cycle_rank(&Topology::new(mol))
    }
}

fn cycle_rank(topo: &Topology) -> usize {
    let n = topo.len();
    let mut seen = vec![false; n];
    let mut components = 0;
    for start in 0..n {
        if seen[start] {
            continue;
        }
        components += 1;
        let mut stack = vec![start];
        seen[start] = true;
        while let Some(cur) = stack.pop() {
            for &(nb, _) in &topo.adj[cur] {
                if !seen[nb] {
                    seen[nb] = true;
                    stack.push(nb);
                }
            }
        }
    }
    (topo.bonds.len() + components).saturating_sub(n)
}

struct BfsTree {
    dist: Vec<u32>,
    pred: Vec<Option<usize>>,
}

fn bfs_tree(topo: &Topology, root: usize) -> BfsTree {
    let n = topo.len();
    let mut dist = vec![u32::MAX; n];
    let mut pred = vec![None; n];
    dist[root] = 0;
    let mut queue = VecDeque::from([root]);
    while let Some(cur) = queue.pop_front() {
        for &(nb, _) in &topo.adj[cur] {
            if dist[nb] == u32::MAX {
                dist[nb] = dist[cur] + 1;
                pred[nb] = Some(cur);
                queue.push_back(nb);
            }
        }
    }
    BfsTree { dist, pred }
}

fn path_to_root(tree: &BfsTree, root: usize, dst: usize) -> Vec<usize> {
    let mut path = vec![dst];
    let mut cur = dst;
    while cur != root {
        match tree.pred[cur] {
            Some(p) => {
                path.push(p);
                cur = p;
            }
            None => return Vec::new(),
        }
    }
    path.reverse();
    path
}

fn paths_share_internal_node(path_u: &[usize], path_v: &[usize]) -> bool {
    if path_u.len() < 2 || path_v.len() < 2 {
        return false;
    }
    path_u[1..].iter().any(|node| path_v[1..].contains(node))
}

/// One candidate cycle per (root, bond): root → u, bond u–v, v → root.
fn horton_candidates(topo: &Topology) -> Vec<Vec<usize>> {
    let n = topo.len();
    let mut candidates: Vec<Vec<usize>> = Vec::new();

    for root in 0..n {
        let tree = bfs_tree(topo, root);
        for &(u, v) in &topo.bond_ends {
            let (du, dv) = (tree.dist[u], tree.dist[v]);
            if du == u32::MAX || dv == u32::MAX {
                continue;
            }
            if du as usize + dv as usize + 1 < 3 {
                continue;
            }
            let path_u = path_to_root(&tree, root, u);
            let path_v = path_to_root(&tree, root, v);
            if path_u.is_empty() || path_v.is_empty() || paths_share_internal_node(&path_u, &path_v) {
                continue;
            }
            let mut ring = path_u;
            ring.extend(path_v[1..].iter().rev());
            candidates.push(normalize_ring(&ring));
        }
    }

    candidates.sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
    candidates.dedup();
    candidates
}

fn ring_to_edge_bitvector(topo: &Topology, ring: &[usize]) -> Vec<u64> {
    let mut bv = vec![0u64; topo.bonds.len().div_ceil(64)];
    let len = ring.len();
    for i in 0..len {
        if let Some(b) = topo.bond_between(ring[i], ring[(i + 1) % len]) {
            bv[b / 64] |= 1u64 << (b % 64);
        }
    }
    bv
}

fn select_independent_rings(
    topo: &Topology,
    candidates: &[Vec<usize>],
    num_needed: usize,
) -> Vec<Vec<usize>> {
    let mut result = Vec::with_capacity(num_needed);
    let mut basis: Vec<Vec<u64>> = Vec::with_capacity(num_needed);

    for ring in candidates {
        if result.len() >= num_needed {
            break;
        }
        let bv = ring_to_edge_bitvector(topo, ring);
        if bv.iter().all(|&w| w == 0) {
            continue;
        }
        if try_add_to_basis(&mut basis, bv) {
            result.push(ring.clone());
        }
    }

    result.sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
    result
}

/// Reduces `candidate` against the basis; keeps it if anything survives.
fn try_add_to_basis(basis: &mut Vec<Vec<u64>>, candidate: Vec<u64>) -> bool {
    let mut v = candidate;
    for row in basis.iter() {
        if let Some(p) = leading_bit(row) {
            if v[p / 64] & (1u64 << (p % 64)) != 0 {
                xor_into(&mut v, row);
            }
        }
    }
    if v.iter().all(|&w| w == 0) {
        return false;
    }
    basis.push(v);
    true
}

fn leading_bit(bv: &[u64]) -> Option<usize> {
    bv.iter()
        .enumerate()
        .find(|(_, w)| **w != 0)
        .map(|(i, w)| i * 64 + w.trailing_zeros() as usize)
}

fn xor_into(a: &mut [u64], b: &[u64]) {
    for (aw, bw) in a.iter_mut().zip(b) {
        *aw ^= *bw;
    }
}

fn normalize_ring(ring: &[usize]) -> Vec<usize> {
    let Some(min_pos) = ring
        .iter()
        .enumerate()
        .min_by_key(|&(_, v)| v)
        .map(|(i, _)| i)
    else {
        return Vec::new();
    };
    let len = ring.len();
    let mut normalized: Vec<usize> = (0..len).map(|i| ring[(min_pos + i) % len]).collect();
    if len > 2 && normalized[1] > normalized[len - 1] {
        normalized[1..].reverse();
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smiles::parse_one;

    fn sssr(smiles: &str) -> (Molecule, RingInfo) {
        let mol = parse_one(smiles).unwrap();
        let info = perceive_rings(&mol);
        (mol, info)
    }

    fn sizes(info: &RingInfo) -> Vec<usize> {
        info.rings().iter().map(Vec::len).collect()
    }

    #[test]
    fn cyclohexane() {
        let (_, ri) = sssr("C1CCCCC1");
        assert_eq!(ri.num_rings(), 1);
        assert_eq!(sizes(&ri), vec![6]);
    }

    #[test]
    fn cyclopropane() {
        let (_, ri) = sssr("C1CC1");
        assert_eq!(sizes(&ri), vec![3]);
    }

    #[test]
    fn acyclic() {
        let (mol, ri) = sssr("CCCC");
        assert_eq!(ri.num_rings(), 0);
        assert!(mol.atoms().all(|a| !ri.is_ring_atom(a)));
    }

    #[test]
    fn naphthalene_shares_one_bond() {
        let (mol, ri) = sssr("c1ccc2ccccc2c1");
        assert_eq!(sizes(&ri), vec![6, 6]);
        let shared: Vec<AtomId> = mol.atoms().filter(|&a| ri.num_atom_rings(a) == 2).collect();
        assert_eq!(shared.len(), 2);
        assert_eq!(ri.fused_bonds().len(), 1);
    }

    #[test]
    fn anthracene() {
        let (_, ri) = sssr("c1ccc2cc3ccccc3cc2c1");
        assert_eq!(sizes(&ri), vec![6, 6, 6]);
    }

    #[test]
    fn spiro_shares_one_atom() {
        let (mol, ri) = sssr("C1CCC2(CC1)CCC2");
        assert_eq!(sizes(&ri), vec![4, 6]);
        assert!(ri.fused_bonds().is_empty());
        let spiro: Vec<AtomId> = mol.atoms().filter(|&a| ri.num_atom_rings(a) == 2).collect();
        assert_eq!(spiro.len(), 1);
    }

    #[test]
    fn norbornane_is_bridged() {
        let (_, ri) = sssr("C1CC2CC1CC2");
        assert_eq!(sizes(&ri), vec![5, 5]);
    }

    #[test]
    fn adamantane() {
        let (mol, ri) = sssr("C1C2CC3CC1CC(C2)C3");
        assert_eq!(RingInfo::expected_ring_count(&mol), 3);
        assert_eq!(sizes(&ri), vec![6, 6, 6]);
    }

    #[test]
    fn cubane() {
        let (mol, ri) = sssr("C12C3C4C1C5C3C4C25");
        assert_eq!(RingInfo::expected_ring_count(&mol), 5);
        assert_eq!(sizes(&ri), vec![4, 4, 4, 4, 4]);
    }

    #[test]
    fn decalin() {
        let (_, ri) = sssr("C1CCC2CCCCC2C1");
        assert_eq!(sizes(&ri), vec![6, 6]);
    }

    #[test]
    fn rank_matches_cycle_rank() {
        for smi in [
            "C1CCCCC1",
            "c1ccc2ccccc2c1",
            "C12C3C4C1C5C3C4C25",
            "C1CC2CC1CC2",
            "c1cc2ccc3ccc4ccc5ccc6ccc1c7c2c3c4c5c67",
            "C1CC1C1CC1",
        ] {
            let mol = parse_one(smi).unwrap();
            let ri = perceive_rings(&mol);
            assert_eq!(
                ri.num_rings(),
                mol.bond_count() + 1 - mol.atom_count(),
                "{smi}"
            );
        }
    }

    #[test]
    fn rings_are_normalized() {
        let (_, ri) = sssr("C1CCCCC1");
        let ring = ri.ring(0).unwrap();
        assert_eq!(ring[0], *ring.iter().min().unwrap());
        assert!(ring[1] < ring[5]);
    }

    #[test]
    fn membership_queries() {
        let (mol, ri) = sssr("Oc1ccccc1");
        let ids: Vec<AtomId> = mol.atoms().collect();
        assert!(!ri.is_ring_atom(ids[0]));
        assert!(ids[1..].iter().all(|&a| ri.is_ring_atom(a)));
        assert_eq!(ri.smallest_ring_size(ids[1]), Some(6));
        assert_eq!(ri.smallest_ring_size(ids[0]), None);
        let exo = mol.bond_between(ids[0], ids[1]).unwrap();
        assert!(!ri.is_ring_bond(exo));
        assert_eq!(ri.ring_bonds(0).unwrap().len(), 6);
        assert_eq!(ri.rings_of_size(6), vec![0]);
        assert!(ri.rings_of_size(5).is_empty());
    }

    #[test]
    fn works_with_holes_in_ids() {
        let mut mol = parse_one("CC1CCCCC1").unwrap();
        let first = mol.atoms().next().unwrap();
        mol.remove_atom(first);
        let ri = perceive_rings(&mol);
        assert_eq!(sizes(&ri), vec![6]);
    }

    #[test]
    fn deterministic_basis() {
        let a = perceive_rings(&parse_one("C12C3C4C1C5C3C4C25").unwrap());
        let b = perceive_rings(&parse_one("C12C3C4C1C5C3C4C25").unwrap());
        assert_eq!(a.rings(), b.rings());
    }
}
