use std::sync::atomic::{AtomicU64, Ordering};

use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableUnGraph};
use petgraph::visit::EdgeRef;
use thiserror::Error;

use crate::atom::Atom;
use crate::bond::Bond;
use crate::rings::RingInfo;

/// Stable atom handle. Survives removal of other atoms.
pub type AtomId = NodeIndex;
/// Stable bond handle.
pub type BondId = EdgeIndex;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MoleculeError {
    #[error("atom {0} does not exist")]
    MissingAtom(usize),
    #[error("atom {0} cannot be bonded to itself")]
    SelfBond(usize),
    #[error("atoms {0} and {1} are already bonded")]
    DuplicateBond(usize, usize),
    #[error("permutation of length {got} does not cover {expected} atoms")]
    BadPermutation { expected: usize, got: usize },
}

/// Identity of a molecule value at one point of its history.
///
/// Two keys compare equal only if they name the same molecule object and no
/// mutation happened in between. Used by [`DerivedCache`](crate::cache::DerivedCache).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MoleculeKey {
    pub id: u64,
    pub generation: u64,
}

fn next_molecule_id() -> u64 {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// One ligand position around a stereocenter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Ligand {
    ImplicitH,
    Atom(AtomId),
}

/// A connected molecular graph.
///
/// Atoms and bonds live in a stable undirected graph so ids stay valid
/// across removals. Every mutable accessor bumps the generation counter,
/// which is what keyed caches compare against.
pub struct Molecule {
    graph: StableUnGraph<Atom, Bond>,
    ring_info: Option<RingInfo>,
    id: u64,
    generation: u64,
}

impl Molecule {
    pub fn new() -> Self {
        Self {
            graph: StableUnGraph::default(),
            ring_info: None,
            id: next_molecule_id(),
            generation: 0,
        }
    }

    pub fn graph(&self) -> &StableUnGraph<Atom, Bond> {
        &self.graph
    }

    pub fn key(&self) -> MoleculeKey {
        MoleculeKey {
            id: self.id,
            generation: self.generation,
        }
    }

    fn touch(&mut self) {
        self.generation += 1;
    }

    pub fn atom(&self, id: AtomId) -> &Atom {
        &self.graph[id]
    }

    pub fn get_atom(&self, id: AtomId) -> Option<&Atom> {
        self.graph.node_weight(id)
    }

    pub fn atom_mut(&mut self, id: AtomId) -> &mut Atom {
        self.touch();
        &mut self.graph[id]
    }

    pub fn bond(&self, id: BondId) -> &Bond {
        &self.graph[id]
    }

    pub fn bond_mut(&mut self, id: BondId) -> &mut Bond {
        self.touch();
        &mut self.graph[id]
    }

    pub fn add_atom(&mut self, atom: Atom) -> AtomId {
        self.touch();
        self.ring_info = None;
        self.graph.add_node(atom)
    }

    pub fn add_bond(&mut self, a: AtomId, b: AtomId, bond: Bond) -> Result<BondId, MoleculeError> {
        for id in [a, b] {
            if !self.graph.contains_node(id) {
                return Err(MoleculeError::MissingAtom(id.index()));
            }
        }
        if a == b {
            return Err(MoleculeError::SelfBond(a.index()));
        }
        if self.graph.find_edge(a, b).is_some() {
            return Err(MoleculeError::DuplicateBond(a.index(), b.index()));
        }
        self.touch();
        self.ring_info = None;
        Ok(self.graph.add_edge(a, b, bond))
    }

    /// Removes an atom and its bonds. Other ids are unaffected.
    pub fn remove_atom(&mut self, id: AtomId) -> Option<Atom> {
        self.touch();
        self.ring_info = None;
        self.graph.remove_node(id)
    }

    pub fn remove_bond(&mut self, id: BondId) -> Option<Bond> {
        self.touch();
        self.ring_info = None;
        self.graph.remove_edge(id)
    }

    pub fn atom_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn bond_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Atom ids in ascending order.
    pub fn atoms(&self) -> impl Iterator<Item = AtomId> + '_ {
        self.graph.node_indices()
    }

    /// Bond ids in ascending order.
    pub fn bonds(&self) -> impl Iterator<Item = BondId> + '_ {
        self.graph.edge_indices()
    }

    pub fn neighbors(&self, id: AtomId) -> impl Iterator<Item = AtomId> + '_ {
        self.graph.neighbors(id)
    }

    /// Neighbors by ascending id.
    pub fn sorted_neighbors(&self, id: AtomId) -> Vec<AtomId> {
        let mut out: Vec<AtomId> = self.graph.neighbors(id).collect();
        out.sort();
        out
    }

    pub fn bonds_of(&self, id: AtomId) -> impl Iterator<Item = BondId> + '_ {
        self.graph.edges(id).map(|e| e.id())
    }

    pub fn degree(&self, id: AtomId) -> usize {
        self.graph.edges(id).count()
    }

    pub fn bond_between(&self, a: AtomId, b: AtomId) -> Option<BondId> {
        self.graph.find_edge(a, b)
    }

    /// Endpoints in stored (source, target) order.
    pub fn bond_endpoints(&self, id: BondId) -> Option<(AtomId, AtomId)> {
        self.graph.edge_endpoints(id)
    }

    /// The endpoint of `bond` that is not `atom`.
    pub fn other_atom(&self, bond: BondId, atom: AtomId) -> Option<AtomId> {
        let (a, b) = self.graph.edge_endpoints(bond)?;
        if a == atom {
            Some(b)
        } else if b == atom {
            Some(a)
        } else {
            None
        }
    }

    /// Sum of bond orders at `id`, aromatic bonds counting one.
    pub fn bond_order_sum(&self, id: AtomId) -> u8 {
        self.graph
            .edges(id)
            .map(|e| e.weight().order.valence())
            .fold(0u8, u8::saturating_add)
    }

    pub fn ring_info(&self) -> Option<&RingInfo> {
        self.ring_info.as_ref()
    }

    /// Stores `info` and copies ring membership onto atoms and bonds.
    pub fn attach_ring_info(&mut self, info: RingInfo) {
        self.touch();
        for id in self.graph.node_indices().collect::<Vec<_>>() {
            self.graph[id].ring_ids = info.atom_rings(id).to_vec();
        }
        for id in self.graph.edge_indices().collect::<Vec<_>>() {
            self.graph[id].ring_ids = info.bond_rings(id).to_vec();
        }
        self.ring_info = Some(info);
    }

    pub fn is_connected(&self) -> bool {
        crate::graph_ops::connected_components(self).len() <= 1
    }

    /// Splits into one molecule per connected component.
    pub fn fragments(&self) -> Vec<Molecule> {
        crate::graph_ops::fragments(self)
    }

    /// Copy with atoms inserted in `order`, which must list every atom id
    /// exactly once.
    pub fn renumbered(&self, order: &[AtomId]) -> Result<Molecule, MoleculeError> {
        crate::graph_ops::renumber_atoms(self, order)
    }

    /// Ligand order that tetrahedral chirality is stored against.
    pub(crate) fn stereo_reference(&self, center: AtomId) -> Vec<Ligand> {
        let mut out = Vec::with_capacity(4);
        if self.graph[center].hydrogen_count > 0 {
            out.push(Ligand::ImplicitH);
        }
        out.extend(self.sorted_neighbors(center).into_iter().map(Ligand::Atom));
        out
    }
}

impl Clone for Molecule {
    /// Copies the graph; the copy is a distinct cache identity.
    fn clone(&self) -> Self {
        Self {
            graph: self.graph.clone(),
            ring_info: self.ring_info.clone(),
            id: next_molecule_id(),
            generation: 0,
        }
    }
}

impl Default for Molecule {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Molecule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Molecule")
            .field("atom_count", &self.atom_count())
            .field("bond_count", &self.bond_count())
            .field("rings", &self.ring_info.as_ref().map(|r| r.num_rings()))
            .finish()
    }
}

/// True if `to` is an even permutation of `from`. Both must hold the same
/// distinct elements.
pub(crate) fn is_even_permutation<T: Eq>(from: &[T], to: &[T]) -> bool {
    let n = from.len();
    if n != to.len() {
        return true;
    }
    let perm: Vec<usize> = from
        .iter()
        .map(|f| to.iter().position(|t| t == f).unwrap_or(0))
        .collect();
    let mut visited = vec![false; n];
    let mut swaps = 0usize;
    for i in 0..n {
        if visited[i] {
            continue;
        }
        let mut cycle_len = 0;
        let mut j = i;
        while !visited[j] {
            visited[j] = true;
            j = perm[j];
            cycle_len += 1;
        }
        swaps += cycle_len - 1;
    }
    swaps % 2 == 0
}
