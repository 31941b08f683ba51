use std::collections::{BTreeMap, HashMap};
use std::hash::{Hash, Hasher};

use tracing::{instrument, trace};

use crate::atom::Chirality;
use crate::bond::BondOrder;
use crate::graph_ops::{Topology, connected_components, renumber_atoms};
use crate::molecule::{AtomId, Ligand, Molecule, is_even_permutation};
use crate::options::CanonicalOptions;
use crate::smiles::writer;
use crate::stereo::double_bond_stereo;

/// A molecule together with its canonical atom ranking.
///
/// The molecule is an unchanged copy of the input; `ranking` maps each
/// atom id to a rank in `0..atom_count`. Isomorphic inputs get rankings
/// that induce the same labeled graph.
#[derive(Debug, Clone)]
pub struct CanonicalForm {
    pub molecule: Molecule,
    pub ranking: BTreeMap<AtomId, usize>,
}

impl CanonicalForm {
    pub fn rank(&self, atom: AtomId) -> Option<usize> {
        self.ranking.get(&atom).copied()
    }

    /// Atom ids by ascending rank.
    pub fn ordered_atoms(&self) -> Vec<AtomId> {
        let mut atoms: Vec<(usize, AtomId)> = self.ranking.iter().map(|(&a, &r)| (r, a)).collect();
        atoms.sort_unstable();
        atoms.into_iter().map(|(_, a)| a).collect()
    }

    /// Copy whose atoms are inserted in rank order, so atom `i` of the copy
    /// has rank `i`.
    pub fn renumbered(&self) -> Molecule {
        renumber_atoms(&self.molecule, &self.ordered_atoms())
            .unwrap_or_else(|_| self.molecule.clone())
    }
}

pub fn canonicalize(mol: &Molecule) -> CanonicalForm {
    canonicalize_with(mol, &CanonicalOptions::default())
}

/// Ranks every atom. Disconnected input is ranked per component, and the
/// components follow each other in the order of their canonical SMILES.
#[instrument(level = "debug", skip_all, fields(atoms = mol.atom_count()))]
pub fn canonicalize_with(mol: &Molecule, opts: &CanonicalOptions) -> CanonicalForm {
    let components = connected_components(mol);
    let ranking = if components.len() <= 1 {
        rank_connected(mol, opts)
    } else {
        rank_components(mol, &components, opts)
    };
    CanonicalForm {
        molecule: mol.clone(),
        ranking,
    }
}

fn rank_connected(mol: &Molecule, opts: &CanonicalOptions) -> BTreeMap<AtomId, usize> {
    let topo = Topology::new(mol);
    canonical_ordering(mol, &topo, opts)
        .into_iter()
        .enumerate()
        .map(|(pos, rank)| (topo.atoms[pos], rank))
        .collect()
}

fn rank_components(
    mol: &Molecule,
    components: &[Vec<AtomId>],
    opts: &CanonicalOptions,
) -> BTreeMap<AtomId, usize> {
    // Fragment atom `i` is `component[i]` of the source.
    let mut ranked: Vec<(String, usize, BTreeMap<AtomId, usize>)> = mol
        .fragments()
        .iter()
        .enumerate()
        .map(|(i, frag)| {
            let local = rank_connected(frag, opts);
            (writer::write_molecule(frag, Some(&local)), i, local)
        })
        .collect();
    ranked.sort();

    let mut ranking = BTreeMap::new();
    let mut offset = 0;
    for (_, i, local) in &ranked {
        for (frag_atom, &rank) in local {
            ranking.insert(components[*i][frag_atom.index()], offset + rank);
        }
        offset += components[*i].len();
    }
    ranking
}

struct Fnv1aHasher(u64);

impl Fnv1aHasher {
    fn new() -> Self {
        Self(0xcbf29ce484222325)
    }
}

impl Hasher for Fnv1aHasher {
    fn finish(&self) -> u64 {
        self.0
    }

    fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 ^= b as u64;
            self.0 = self.0.wrapping_mul(0x100000001b3);
        }
    }
}

#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct AtomInvariant {
    atomic_num: u8,
    formal_charge: i8,
    isotope: u16,
    is_aromatic: bool,
    degree: usize,
    ring_count: usize,
    hydrogen_count: u8,
    singles: u8,
    doubles: u8,
    triples: u8,
    aromatic_bonds: u8,
}

fn atom_invariant(mol: &Molecule, id: AtomId) -> AtomInvariant {
    let atom = mol.atom(id);
    let mut counts = [0u8; 4];
    for bond in mol.bonds_of(id) {
        counts[bond_code(mol.bond(bond).order) as usize - 1] += 1;
    }
    let ring_count = match mol.ring_info() {
        Some(info) => info.num_atom_rings(id),
        None => atom.ring_ids.len(),
    };
    AtomInvariant {
        atomic_num: atom.atomic_num(),
        formal_charge: atom.formal_charge,
        isotope: atom.isotope.unwrap_or(0),
        is_aromatic: atom.is_aromatic,
        degree: mol.degree(id),
        ring_count,
        hydrogen_count: atom.hydrogen_count,
        singles: counts[0],
        doubles: counts[1],
        triples: counts[2],
        aromatic_bonds: counts[3],
    }
}

fn bond_code(order: BondOrder) -> u8 {
    match order {
        BondOrder::Single => 1,
        BondOrder::Double => 2,
        BondOrder::Triple => 3,
        BondOrder::Aromatic => 4,
    }
}

/// Rank of each key: the position of its first occurrence in sorted order.
fn ranks_from_keys<K: Ord>(keys: &[K]) -> Vec<usize> {
    let n = keys.len();
    let mut indices: Vec<usize> = (0..n).collect();
    indices.sort_by(|&a, &b| keys[a].cmp(&keys[b]));
    let mut ranks = vec![0usize; n];
    for i in 1..n {
        ranks[indices[i]] = if keys[indices[i]] == keys[indices[i - 1]] {
            ranks[indices[i - 1]]
        } else {
            i
        };
    }
    ranks
}

fn count_distinct(ranks: &[usize]) -> usize {
    let mut sorted: Vec<usize> = ranks.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    sorted.len()
}

struct TetrahedralCenter {
    pos: usize,
    /// Reference-order ligands as positions; `None` is the implicit H.
    ligands: Vec<Option<usize>>,
    clockwise: bool,
}

struct StereoDoubleBond {
    a: usize,
    b: usize,
    subs_a: Vec<usize>,
    subs_b: Vec<usize>,
    ref_a: usize,
    ref_b: usize,
    trans: bool,
}

/// Refinement state over dense atom positions.
struct Refiner<'a> {
    topo: &'a Topology,
    bond_codes: Vec<u8>,
    centers: Vec<TetrahedralCenter>,
    double_bonds: Vec<StereoDoubleBond>,
    max_iterations: usize,
}

impl<'a> Refiner<'a> {
    fn new(mol: &Molecule, topo: &'a Topology, opts: &CanonicalOptions) -> Self {
        let bond_codes = topo
            .bonds
            .iter()
            .map(|&b| bond_code(mol.bond(b).order))
            .collect();

        let centers = topo
            .atoms
            .iter()
            .enumerate()
            .filter_map(|(pos, &id)| {
                let clockwise = match mol.atom(id).chirality {
                    Chirality::CounterClockwise => false,
                    Chirality::Clockwise => true,
                    _ => return None,
                };
                let ligands = mol
                    .stereo_reference(id)
                    .into_iter()
                    .map(|l| match l {
                        Ligand::ImplicitH => None,
                        Ligand::Atom(a) => Some(topo.atom_pos(a)),
                    })
                    .collect();
                Some(TetrahedralCenter {
                    pos,
                    ligands,
                    clockwise,
                })
            })
            .collect();

        let double_bonds = topo
            .bonds
            .iter()
            .filter_map(|&b| double_bond_stereo(mol, b))
            .map(|config| {
                let (a, b) = (topo.atom_pos(config.a), topo.atom_pos(config.b));
                let subs = |center: usize, partner: usize| -> Vec<usize> {
                    topo.adj[center]
                        .iter()
                        .map(|&(n, _)| n)
                        .filter(|&n| n != partner)
                        .collect()
                };
                StereoDoubleBond {
                    a,
                    b,
                    subs_a: subs(a, b),
                    subs_b: subs(b, a),
                    ref_a: topo.atom_pos(config.ref_a),
                    ref_b: topo.atom_pos(config.ref_b),
                    trans: config.trans,
                }
            })
            .collect();

        Self {
            topo,
            bond_codes,
            centers,
            double_bonds,
            max_iterations: opts.max_iterations.max(1),
        }
    }

    fn neighbor_signature(&self, pos: usize, ranks: &[usize]) -> Vec<(usize, u8)> {
        let mut sig: Vec<(usize, u8)> = self.topo.adj[pos]
            .iter()
            .map(|&(n, b)| (ranks[n], self.bond_codes[b]))
            .collect();
        sig.sort_unstable();
        sig
    }

    /// Splits classes by the ranks of their neighbors until stable.
    fn morgan_refine(&self, ranks: &mut Vec<usize>) {
        let mut distinct = count_distinct(ranks);
        for _ in 0..self.max_iterations {
            let keys: Vec<(usize, Vec<(usize, u8)>)> = (0..ranks.len())
                .map(|i| (ranks[i], self.neighbor_signature(i, ranks)))
                .collect();
            let next = ranks_from_keys(&keys);
            let next_distinct = count_distinct(&next);
            if next_distinct <= distinct {
                return;
            }
            *ranks = next;
            distinct = next_distinct;
        }
    }

    /// 0 when the ligands are not all distinguished yet, else 1 or 2 for the
    /// handedness seen from the ranks.
    fn tetrahedral_code(&self, center: &TetrahedralCenter, ranks: &[usize]) -> u8 {
        let ligand_ranks: Vec<usize> = center
            .ligands
            .iter()
            .map(|l| l.map_or(usize::MAX, |p| ranks[p]))
            .collect();
        let mut sorted = ligand_ranks.clone();
        sorted.sort_unstable();
        if sorted.windows(2).any(|w| w[0] == w[1]) {
            return 0;
        }
        if is_even_permutation(&ligand_ranks, &sorted) ^ center.clockwise {
            1
        } else {
            2
        }
    }

    fn double_bond_code(&self, db: &StereoDoubleBond, ranks: &[usize]) -> u8 {
        let highest = |subs: &[usize]| -> Option<usize> {
            let top = *subs.iter().max_by_key(|&&s| ranks[s])?;
            let tied = subs.iter().filter(|&&s| ranks[s] == ranks[top]).count() > 1;
            (!tied).then_some(top)
        };
        let (Some(ha), Some(hb)) = (highest(&db.subs_a), highest(&db.subs_b)) else {
            return 0;
        };
        if db.trans ^ (ha != db.ref_a) ^ (hb != db.ref_b) {
            2
        } else {
            1
        }
    }

    fn stereo_codes(&self, ranks: &[usize]) -> Vec<u8> {
        let mut codes = vec![0u8; ranks.len()];
        for center in &self.centers {
            codes[center.pos] = self.tetrahedral_code(center, ranks);
        }
        for db in &self.double_bonds {
            let code = self.double_bond_code(db, ranks);
            if code != 0 {
                codes[db.a] = code;
                codes[db.b] = code;
            }
        }
        codes
    }

    /// Folds stereo codes into the ranks. Returns whether a class split.
    fn stereo_refine(&self, ranks: &mut Vec<usize>) -> bool {
        if self.centers.is_empty() && self.double_bonds.is_empty() {
            return false;
        }
        let codes = self.stereo_codes(ranks);
        let keys: Vec<(usize, u8)> = ranks.iter().copied().zip(codes).collect();
        let next = ranks_from_keys(&keys);
        if count_distinct(&next) <= count_distinct(ranks) {
            return false;
        }
        *ranks = next;
        true
    }

    fn refine(&self, ranks: &mut Vec<usize>) {
        self.morgan_refine(ranks);
        for _ in 0..ranks.len() {
            if !self.stereo_refine(ranks) {
                break;
            }
            self.morgan_refine(ranks);
        }
    }

    fn trace(&self, ranks: &[usize], invariants: &[AtomInvariant]) -> Vec<u64> {
        let codes = self.stereo_codes(ranks);
        let mut order: Vec<usize> = (0..ranks.len()).collect();
        order.sort_by_key(|&i| (ranks[i], i));
        order
            .iter()
            .map(|&i| {
                let mut h = Fnv1aHasher::new();
                invariants[i].hash(&mut h);
                self.neighbor_signature(i, ranks).hash(&mut h);
                codes[i].hash(&mut h);
                h.finish()
            })
            .collect()
    }

    fn lowest_tied_rank(&self, ranks: &[usize]) -> Option<usize> {
        let mut counts: HashMap<usize, usize> = HashMap::new();
        for &r in ranks {
            *counts.entry(r).or_insert(0) += 1;
        }
        let tied: Vec<usize> = counts
            .into_iter()
            .filter(|&(_, count)| count > 1)
            .map(|(rank, _)| rank)
            .collect();
        let is_center = |r: usize| self.centers.iter().any(|c| ranks[c.pos] == r);
        tied.iter()
            .copied()
            .filter(|&r| !is_center(r))
            .min()
            .or_else(|| tied.iter().copied().min())
    }

    fn break_ties(&self, ranks: &mut Vec<usize>, invariants: &[AtomInvariant]) {
        let n = ranks.len();
        let mut round = 0;
        while count_distinct(ranks) < n {
            let Some(class) = self.lowest_tied_rank(ranks) else {
                return;
            };
            let tied: Vec<usize> = (0..n).filter(|&i| ranks[i] == class).collect();
            trace!(round, class, members = tied.len(), "breaking tie");
            round += 1;

            let mut best: Option<(Vec<u64>, Vec<usize>)> = None;
            for &candidate in &tied {
                let mut trial = ranks.clone();
                trial[candidate] = n;
                self.refine(&mut trial);
                let trace = self.trace(&trial, invariants);
                if best.as_ref().is_none_or(|(t, _)| trace < *t) {
                    best = Some((trace, trial));
                }
            }
            match best {
                Some((_, trial)) => *ranks = trial,
                None => return,
            }
        }
    }
}

/// Canonical rank of every atom position in `topo`, dense in `0..n`.
fn canonical_ordering(mol: &Molecule, topo: &Topology, opts: &CanonicalOptions) -> Vec<usize> {
    let n = topo.len();
    if n == 0 {
        return Vec::new();
    }

    let invariants: Vec<AtomInvariant> = topo.atoms.iter().map(|&a| atom_invariant(mol, a)).collect();
    let refiner = Refiner::new(mol, topo, opts);
    let mut ranks = ranks_from_keys(&invariants);
    refiner.refine(&mut ranks);
    if count_distinct(&ranks) < n {
        refiner.break_ties(&mut ranks, &invariants);
    }

    let mut indices: Vec<usize> = (0..n).collect();
    indices.sort_by_key(|&i| (ranks[i], i));
    let mut final_ranks = vec![0usize; n];
    for (rank, &pos) in indices.iter().enumerate() {
        final_ranks[pos] = rank;
    }
    final_ranks
}
