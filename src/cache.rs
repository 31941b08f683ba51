use std::collections::HashMap;
use std::collections::hash_map::Entry;

use crate::canonical::canonicalize;
use crate::molecule::{AtomId, Molecule, MoleculeKey};
use crate::smiles::generate;

/// A caller-owned side table of values derived from molecules.
///
/// Entries are keyed by molecule identity and remember the generation they
/// were computed at. Any mutation of the molecule bumps its generation, so a
/// stale entry is never returned; it is simply recomputed on the next
/// [`get_or_insert_with`](Self::get_or_insert_with).
///
/// ```
/// use chemgraph::cache::DerivedCache;
/// use chemgraph::smiles::parse_one;
///
/// let mut mol = parse_one("CCO").unwrap();
/// let mut counts = DerivedCache::new();
/// assert_eq!(*counts.get_or_insert_with(&mol, |m| m.atom_count()), 3);
///
/// let first = mol.atoms().next().unwrap();
/// mol.atom_mut(first).formal_charge = 1;
/// assert!(counts.get(&mol).is_none());
/// ```
#[derive(Debug, Clone)]
pub struct DerivedCache<V> {
    entries: HashMap<u64, (u64, V)>,
}

impl<V> Default for DerivedCache<V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<V> DerivedCache<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached value, if it was computed for the molecule as it is now.
    pub fn get(&self, mol: &Molecule) -> Option<&V> {
        let MoleculeKey { id, generation } = mol.key();
        match self.entries.get(&id) {
            Some((stored, value)) if *stored == generation => Some(value),
            _ => None,
        }
    }

    pub fn get_or_insert_with(&mut self, mol: &Molecule, compute: impl FnOnce(&Molecule) -> V) -> &V {
        let MoleculeKey { id, generation } = mol.key();
        match self.entries.entry(id) {
            Entry::Occupied(mut slot) => {
                if slot.get().0 != generation {
                    slot.insert((generation, compute(mol)));
                }
                &slot.into_mut().1
            }
            Entry::Vacant(slot) => &slot.insert((generation, compute(mol))).1,
        }
    }

    /// Stores `value` for the molecule's current generation, returning any
    /// value previously stored for the same molecule.
    pub fn insert(&mut self, mol: &Molecule, value: V) -> Option<V> {
        let MoleculeKey { id, generation } = mol.key();
        self.entries.insert(id, (generation, value)).map(|(_, old)| old)
    }

    pub fn invalidate(&mut self, mol: &Molecule) -> Option<V> {
        self.entries.remove(&mol.key().id).map(|(_, value)| value)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of stored entries, stale ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Memoized canonical ranking and canonical SMILES.
#[derive(Debug, Clone, Default)]
pub struct CanonicalCache {
    rankings: DerivedCache<Vec<(AtomId, usize)>>,
    smiles: DerivedCache<String>,
}

impl CanonicalCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atom ids paired with their canonical rank, in id order.
    pub fn ranking(&mut self, mol: &Molecule) -> &[(AtomId, usize)] {
        self.rankings
            .get_or_insert_with(mol, |m| canonicalize(m).ranking.into_iter().collect())
    }

    pub fn smiles(&mut self, mol: &Molecule) -> &str {
        self.smiles.get_or_insert_with(mol, |m| generate(m, true))
    }

    pub fn invalidate(&mut self, mol: &Molecule) {
        self.rankings.invalidate(mol);
        self.smiles.invalidate(mol);
    }

    pub fn clear(&mut self) {
        self.rankings.clear();
        self.smiles.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::Atom;
    use crate::bond::{Bond, BondOrder};
    use crate::element::Element;
    use crate::smiles::parse_one;

    #[test]
    fn computes_once_per_generation() {
        let mol = parse_one("CCO").unwrap();
        let mut cache = DerivedCache::new();
        let mut calls = 0;
        for _ in 0..3 {
            cache.get_or_insert_with(&mol, |m| {
                calls += 1;
                m.bond_count()
            });
        }
        assert_eq!(calls, 1);
        assert_eq!(cache.get(&mol), Some(&2));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn mutation_invalidates() {
        let mut mol = parse_one("CC").unwrap();
        let mut cache = DerivedCache::new();
        cache.insert(&mol, mol.atom_count());

        let o = mol.add_atom(Atom::new(Element::O));
        let first = mol.atoms().next().unwrap();
        mol.add_bond(first, o, Bond::new(BondOrder::Single)).unwrap();

        assert!(cache.get(&mol).is_none());
        assert_eq!(*cache.get_or_insert_with(&mol, |m| m.atom_count()), 3);
        // Recomputing replaces the stale entry instead of adding one.
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn clones_do_not_share_entries() {
        let mol = parse_one("CC").unwrap();
        let copy = mol.clone();
        let mut cache = DerivedCache::new();
        cache.insert(&mol, "original");
        assert!(cache.get(&copy).is_none());
        assert_eq!(cache.get(&mol), Some(&"original"));
    }

    #[test]
    fn invalidate_and_clear() {
        let a = parse_one("C").unwrap();
        let b = parse_one("O").unwrap();
        let mut cache = DerivedCache::new();
        cache.insert(&a, 1);
        cache.insert(&b, 2);
        assert_eq!(cache.invalidate(&a), Some(1));
        assert!(cache.get(&a).is_none());
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn canonical_cache_tracks_edits() {
        let mut mol = parse_one("OCC").unwrap();
        let mut cache = CanonicalCache::new();
        assert_eq!(cache.smiles(&mol), "CCO");
        assert_eq!(cache.ranking(&mol).len(), 3);

        let oxygen = mol.atoms().next().unwrap();
        mol.atom_mut(oxygen).element = Element::N;
        mol.atom_mut(oxygen).hydrogen_count = 2;
        assert_eq!(cache.smiles(&mol), "CCN");

        cache.invalidate(&mol);
        cache.clear();
        assert_eq!(cache.smiles(&mol), "CCN");
    }
}
