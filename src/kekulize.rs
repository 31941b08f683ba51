//! Kekulization assigns alternating single and double bonds to aromatic systems.
//!
//! Every atom that touches an aromatic bond and still has valence to spare
//! must receive exactly one double bond among its aromatic bonds; all other
//! aromatic bonds become single. The search is a deterministic backtracking
//! pass over the aromatic bonds (fusion bonds first) with an undo trail. If
//! it runs past its step budget, a maximum matching (Edmonds' blossom
//! algorithm) decides instead, so the answer never depends on the budget.
//!
//! If no valid assignment exists (e.g. `c1cccc1`, five carbons each wanting
//! a partner), [`kekulize`] returns a [`KekulizeError`].

use std::collections::VecDeque;

use thiserror::Error;
use tracing::{debug, instrument};

use crate::bond::BondOrder;
use crate::graph_ops::Topology;
use crate::molecule::{AtomId, BondId, Molecule};
use crate::options::KekulizeOptions;
use crate::rings::{RingInfo, perceive_rings};
use crate::valence::needs_double_bond;

/// Error returned when no valid Kekulé structure exists.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KekulizeError {
    /// The given atoms could not be assigned a double bond.
    #[error("cannot kekulize aromatic system: unmatched atoms [{}]", join_ids(.atoms))]
    Unkekulizable { atoms: Vec<AtomId> },
}

fn join_ids(atoms: &[AtomId]) -> String {
    atoms
        .iter()
        .map(|a| a.index().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Replaces every aromatic bond with an explicit single or double bond.
///
/// Atom and bond aromatic flags are kept; only bond orders change. A
/// molecule without aromatic bonds comes back unchanged.
pub fn kekulize(mol: &Molecule) -> Result<Molecule, KekulizeError> {
    kekulize_with(mol, &KekulizeOptions::default())
}

#[instrument(level = "debug", skip_all, fields(atoms = mol.atom_count()))]
pub fn kekulize_with(mol: &Molecule, opts: &KekulizeOptions) -> Result<Molecule, KekulizeError> {
    assign_double_bonds(mol, opts, &|_| true)
}

/// Kekulizes only the aromatic-order bonds that do not join two aromatic
/// atoms; flagged aromatic systems keep their bonds.
pub(crate) fn kekulize_unflagged(
    mol: &Molecule,
    opts: &KekulizeOptions,
) -> Result<Molecule, KekulizeError> {
    assign_double_bonds(mol, opts, &|bond| !joins_aromatic_atoms(mol, bond))
}

pub(crate) fn joins_aromatic_atoms(mol: &Molecule, bond: BondId) -> bool {
    mol.bond_endpoints(bond)
        .is_some_and(|(a, b)| mol.atom(a).is_aromatic && mol.atom(b).is_aromatic)
}

fn assign_double_bonds(
    mol: &Molecule,
    opts: &KekulizeOptions,
    selected: &dyn Fn(BondId) -> bool,
) -> Result<Molecule, KekulizeError> {
    let topo = Topology::new(mol);
    let slots = ordered_aromatic_bonds(mol, &topo, selected);
    if slots.is_empty() {
        return Ok(mol.clone());
    }

    // An atom that keeps an unselected aromatic bond already has its share.
    let needy: Vec<bool> = topo
        .atoms
        .iter()
        .map(|&a| {
            needs_double_bond(mol, a)
                && mol
                    .bonds_of(a)
                    .all(|b| mol.bond(b).order != BondOrder::Aromatic || selected(b))
        })
        .collect();
    let ends: Vec<(usize, usize)> = slots.iter().map(|&b| topo.bond_ends[b]).collect();

    let doubles = match Search::new(&ends, &needy).run(opts.max_steps) {
        Outcome::Found(doubles) => doubles,
        outcome => {
            if matches!(outcome, Outcome::Exhausted) {
                debug!(
                    budget = opts.max_steps,
                    "kekulize backtracking budget exhausted, using matching"
                );
            }
            let matched = maximum_matching(&topo, &slots, &needy);
            let unmatched: Vec<AtomId> = (0..topo.len())
                .filter(|&a| needy[a] && matched[a].is_none())
                .map(|a| topo.atoms[a])
                .collect();
            if !unmatched.is_empty() {
                return Err(KekulizeError::Unkekulizable { atoms: unmatched });
            }
            slots
                .iter()
                .map(|&b| {
                    let (u, _) = topo.bond_ends[b];
                    matched[u] == Some(b)
                })
                .collect()
        }
    };

    let mut out = mol.clone();
    for (&slot, &double) in slots.iter().zip(&doubles) {
        out.bond_mut(topo.bonds[slot]).order = if double {
            BondOrder::Double
        } else {
            BondOrder::Single
        };
    }
    Ok(out)
}

/// Aromatic bond positions: fusion bonds, then ring bonds by their lowest
/// ring index, then bonds outside rings; ties by bond id.
fn ordered_aromatic_bonds(
    mol: &Molecule,
    topo: &Topology,
    selected: &dyn Fn(BondId) -> bool,
) -> Vec<usize> {
    let perceived;
    let rings: &RingInfo = match mol.ring_info() {
        Some(info) => info,
        None => {
            perceived = perceive_rings(mol);
            &perceived
        }
    };

    let mut slots: Vec<(u8, usize, usize)> = topo
        .bonds
        .iter()
        .enumerate()
        .filter(|&(_, &b)| mol.bond(b).order == BondOrder::Aromatic && selected(b))
        .map(|(pos, &b)| {
            let member_of = rings.bond_rings(b);
            let category = match member_of.len() {
                0 => 2,
                1 => 1,
                _ => 0,
            };
            let first_ring = member_of.iter().copied().min().unwrap_or(usize::MAX);
            (category, first_ring, pos)
        })
        .collect();
    slots.sort_unstable();
    slots.into_iter().map(|(_, _, pos)| pos).collect()
}

enum Outcome {
    Found(Vec<bool>),
    DeadEnd,
    Exhausted,
}

struct Decision {
    slot: usize,
    double: bool,
    /// The single-bond branch of this slot is still untried.
    alternative: bool,
}

/// Backtracking state. `matched` is the only mutable assignment besides
/// the decision trail, and every change to it is undone from the trail.
struct Search<'a> {
    ends: &'a [(usize, usize)],
    needy: &'a [bool],
    incident: Vec<Vec<usize>>,
    matched: Vec<bool>,
    trail: Vec<Decision>,
}

impl<'a> Search<'a> {
    fn new(ends: &'a [(usize, usize)], needy: &'a [bool]) -> Self {
        let mut incident = vec![Vec::new(); needy.len()];
        for (slot, &(u, v)) in ends.iter().enumerate() {
            incident[u].push(slot);
            incident[v].push(slot);
        }
        Self {
            ends,
            needy,
            incident,
            matched: vec![false; needy.len()],
            trail: Vec::with_capacity(ends.len()),
        }
    }

    fn open(&self, atom: usize) -> bool {
        self.needy[atom] && !self.matched[atom]
    }

    /// An open atom must keep at least one undecided bond to another open atom.
    fn can_still_match(&self, atom: usize, next_slot: usize) -> bool {
        if !self.open(atom) {
            return true;
        }
        self.incident[atom].iter().any(|&s| {
            if s < next_slot {
                return false;
            }
            let (u, v) = self.ends[s];
            let other = if u == atom { v } else { u };
            self.open(other)
        })
    }

    fn consistent_after(&self, slot: usize) -> bool {
        let (u, v) = self.ends[slot];
        let next = slot + 1;
        if !self.can_still_match(u, next) || !self.can_still_match(v, next) {
            return false;
        }
        // A new double bond may have taken the last partner of a neighbor.
        for atom in [u, v] {
            for &s in &self.incident[atom] {
                if s < next {
                    continue;
                }
                let (a, b) = self.ends[s];
                let other = if a == atom { b } else { a };
                if !self.can_still_match(other, next) {
                    return false;
                }
            }
        }
        true
    }

    fn decide(&mut self, slot: usize) {
        let (u, v) = self.ends[slot];
        let double = self.open(u) && self.open(v);
        if double {
            self.matched[u] = true;
            self.matched[v] = true;
        }
        self.trail.push(Decision {
            slot,
            double,
            alternative: double,
        });
    }

    /// Unwinds to the latest decision with an untried single branch and
    /// takes it. Returns the next slot, or `None` when nothing is left.
    fn backtrack(&mut self) -> Option<usize> {
        while let Some(decision) = self.trail.pop() {
            let (u, v) = self.ends[decision.slot];
            if decision.double {
                self.matched[u] = false;
                self.matched[v] = false;
            }
            if decision.alternative {
                self.trail.push(Decision {
                    slot: decision.slot,
                    double: false,
                    alternative: false,
                });
                if self.consistent_after(decision.slot) {
                    return Some(decision.slot + 1);
                }
            }
        }
        None
    }

    fn run(mut self, max_steps: usize) -> Outcome {
        let mut next = 0;
        let mut steps = 0usize;
        loop {
            steps += 1;
            if steps > max_steps {
                return Outcome::Exhausted;
            }
            if next == self.ends.len() {
                if (0..self.needy.len()).all(|a| !self.open(a)) {
                    let mut doubles = vec![false; self.ends.len()];
                    for d in &self.trail {
                        doubles[d.slot] = d.double;
                    }
                    return Outcome::Found(doubles);
                }
                match self.backtrack() {
                    Some(slot) => next = slot,
                    None => return Outcome::DeadEnd,
                }
                continue;
            }
            self.decide(next);
            if self.consistent_after(next) {
                next += 1;
            } else {
                match self.backtrack() {
                    Some(slot) => next = slot,
                    None => return Outcome::DeadEnd,
                }
            }
        }
    }
}

/// Maximum matching over aromatic bonds between needy atoms, found with
/// Edmonds' blossom contraction. Returns the matched bond position per atom
/// position.
fn maximum_matching(topo: &Topology, slots: &[usize], needy: &[bool]) -> Vec<Option<usize>> {
    let n = topo.len();
    let mut adj: Vec<Vec<(usize, usize)>> = vec![Vec::new(); n];
    for &b in slots {
        let (u, v) = topo.bond_ends[b];
        if needy[u] && needy[v] {
            adj[u].push((v, b));
            adj[v].push((u, b));
        }
    }

    let mut matching = Blossom::new(&adj);
    for root in 0..n {
        if needy[root] && matching.mate[root].is_none() {
            if let Some(end) = matching.find_augmenting_path(root) {
                matching.augment(end);
            }
        }
    }

    (0..n)
        .map(|u| {
            let v = matching.mate[u]?;
            adj[u].iter().find(|&&(w, _)| w == v).map(|&(_, b)| b)
        })
        .collect()
}

/// Search state for one augmenting-path pass. `base` maps each vertex to
/// the base of the contracted blossom it currently belongs to.
struct Blossom<'a> {
    adj: &'a [Vec<(usize, usize)>],
    mate: Vec<Option<usize>>,
    parent: Vec<Option<usize>>,
    base: Vec<usize>,
    outer: Vec<bool>,
    queue: VecDeque<usize>,
}

impl<'a> Blossom<'a> {
    fn new(adj: &'a [Vec<(usize, usize)>]) -> Self {
        let n = adj.len();
        Self {
            adj,
            mate: vec![None; n],
            parent: vec![None; n],
            base: (0..n).collect(),
            outer: vec![false; n],
            queue: VecDeque::new(),
        }
    }

    /// Grows an alternating tree from `root`; returns the free vertex that
    /// ends an augmenting path, if one exists.
    fn find_augmenting_path(&mut self, root: usize) -> Option<usize> {
        let adj = self.adj;
        let n = adj.len();
        self.parent.fill(None);
        self.outer.fill(false);
        for (i, b) in self.base.iter_mut().enumerate() {
            *b = i;
        }
        self.queue.clear();
        self.outer[root] = true;
        self.queue.push_back(root);

        while let Some(v) = self.queue.pop_front() {
            for &(to, _) in &adj[v] {
                if self.base[v] == self.base[to] || self.mate[v] == Some(to) {
                    continue;
                }
                let closes_odd_cycle =
                    to == root || self.mate[to].is_some_and(|m| self.parent[m].is_some());
                if closes_odd_cycle {
                    let base = self.common_base(v, to);
                    let mut in_blossom = vec![false; n];
                    self.mark_path(v, base, to, &mut in_blossom);
                    self.mark_path(to, base, v, &mut in_blossom);
                    for i in 0..n {
                        if in_blossom[self.base[i]] {
                            self.base[i] = base;
                            if !self.outer[i] {
                                self.outer[i] = true;
                                self.queue.push_back(i);
                            }
                        }
                    }
                } else if self.parent[to].is_none() {
                    self.parent[to] = Some(v);
                    let Some(next) = self.mate[to] else {
                        return Some(to);
                    };
                    self.outer[next] = true;
                    self.queue.push_back(next);
                }
            }
        }
        None
    }

    /// Base of the innermost blossom containing both tree paths to the root.
    fn common_base(&self, a: usize, b: usize) -> usize {
        let mut on_path = vec![false; self.adj.len()];
        let mut a = a;
        loop {
            a = self.base[a];
            on_path[a] = true;
            match self.mate[a].and_then(|m| self.parent[m]) {
                Some(up) => a = up,
                None => break,
            }
        }
        let mut b = b;
        loop {
            b = self.base[b];
            if on_path[b] {
                return b;
            }
            match self.mate[b].and_then(|m| self.parent[m]) {
                Some(up) => b = up,
                None => return b,
            }
        }
    }

    fn mark_path(&mut self, v: usize, base: usize, child: usize, in_blossom: &mut [bool]) {
        let (mut v, mut child) = (v, child);
        while self.base[v] != base {
            let Some(m) = self.mate[v] else {
                break;
            };
            in_blossom[self.base[v]] = true;
            in_blossom[self.base[m]] = true;
            self.parent[v] = Some(child);
            child = m;
            let Some(up) = self.parent[m] else {
                break;
            };
            v = up;
        }
    }

    /// Flips matched and unmatched edges along the path ending at `end`.
    fn augment(&mut self, end: usize) {
        let mut cur = Some(end);
        while let Some(v) = cur {
            let Some(p) = self.parent[v] else {
                break;
            };
            let next = self.mate[p];
            self.mate[v] = Some(p);
            self.mate[p] = Some(v);
            cur = next;
        }
    }
}
