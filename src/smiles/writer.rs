use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::atom::{Atom, Chirality};
use crate::bond::{BondOrder, BondStereo};
use crate::graph_ops::Topology;
use crate::molecule::{AtomId, Ligand, Molecule, is_even_permutation};
use crate::stereo::{double_bond_stereo, is_trans};
use crate::valence::{has_aromatic_bond, implicit_hydrogens};

/// Writes every component of `mol`, joined by `.`.
///
/// With `ranks`, each component starts at its lowest-ranked atom,
/// neighbors are visited by rank and components follow their lowest rank.
/// Without, atom ids play the same role.
pub(crate) fn write_molecule(mol: &Molecule, ranks: Option<&BTreeMap<AtomId, usize>>) -> String {
    let topo = Topology::new(mol);
    let key: Vec<usize> = (0..topo.len())
        .map(|p| {
            ranks
                .and_then(|r| r.get(&topo.atoms[p]).copied())
                .unwrap_or(p)
        })
        .collect();

    let plan = Plan::new(&topo, &key);
    let directions = assign_bond_directions(mol, &topo, &plan);
    let lowercase: Vec<bool> = topo
        .atoms
        .iter()
        .map(|&id| mol.atom(id).is_aromatic && has_aromatic_bond(mol, id))
        .collect();

    let mut parts = Vec::with_capacity(plan.roots.len());
    for &root in &plan.roots {
        let mut emitter = Emitter {
            mol,
            topo: &topo,
            plan: &plan,
            lowercase: &lowercase,
            directions: &directions,
            open_digits: HashMap::new(),
            in_use: BTreeSet::new(),
            out: String::new(),
        };
        emitter.write_atom(root);
        parts.push(emitter.out);
    }
    parts.join(".")
}

/// Depth-first spanning forest plus the ring bonds it leaves over.
struct Plan {
    roots: Vec<usize>,
    parent: Vec<Option<usize>>,
    children: Vec<Vec<usize>>,
    /// Non-tree bonds per atom as `(partner, bond)`.
    rings: Vec<Vec<(usize, usize)>>,
    /// Position of each atom in the output text.
    preorder: Vec<usize>,
}

impl Plan {
    fn new(topo: &Topology, key: &[usize]) -> Self {
        let n = topo.len();
        let neighbor_lists: Vec<Vec<(usize, usize)>> = topo
            .adj
            .iter()
            .map(|list| {
                let mut sorted = list.clone();
                sorted.sort_by_key(|&(nb, _)| (key[nb], nb));
                sorted
            })
            .collect();
        let mut starts: Vec<usize> = (0..n).collect();
        starts.sort_by_key(|&p| (key[p], p));

        let mut plan = Plan {
            roots: Vec::new(),
            parent: vec![None; n],
            children: vec![Vec::new(); n],
            rings: vec![Vec::new(); n],
            preorder: vec![usize::MAX; n],
        };
        let mut visited = vec![false; n];
        let mut ring_seen = vec![false; topo.bonds.len()];
        let mut counter = 0;

        for start in starts {
            if visited[start] {
                continue;
            }
            plan.roots.push(start);
            visited[start] = true;
            plan.preorder[start] = counter;
            counter += 1;
            let mut stack: Vec<(usize, usize)> = vec![(start, 0)];

            while let Some((node, next)) = stack.last_mut() {
                let node = *node;
                let Some(&(nb, bond)) = neighbor_lists[node].get(*next) else {
                    stack.pop();
                    continue;
                };
                *next += 1;

                if !visited[nb] {
                    visited[nb] = true;
                    plan.parent[nb] = Some(node);
                    plan.children[node].push(nb);
                    plan.preorder[nb] = counter;
                    counter += 1;
                    stack.push((nb, 0));
                } else if plan.parent[node] != Some(nb) && !ring_seen[bond] {
                    ring_seen[bond] = true;
                    plan.rings[node].push((nb, bond));
                    plan.rings[nb].push((node, bond));
                }
            }
        }
        plan
    }

    /// Ring bonds of `atom` in the order their digits are written: rings
    /// closing here first, then rings opening here.
    fn ring_order(&self, atom: usize) -> Vec<(usize, usize)> {
        let mut entries = self.rings[atom].clone();
        let here = self.preorder[atom];
        entries.sort_by_key(|&(partner, _)| (self.preorder[partner] > here, self.preorder[partner]));
        entries
    }

    /// Neighbors of `atom` in written order: parent, ring partners, children.
    fn written_neighbors(&self, atom: usize) -> Vec<usize> {
        let mut out: Vec<usize> = self.parent[atom].into_iter().collect();
        out.extend(self.ring_order(atom).into_iter().map(|(partner, _)| partner));
        out.extend(self.children[atom].iter().copied());
        out
    }
}

/// Picks the `/` `\` marks that reproduce every stereo double bond.
///
/// Returned stereo is relative to each bond's stored endpoint order, like
/// [`Bond::stereo`](crate::bond::Bond::stereo). A single bond shared by
/// two conjugated double bonds keeps the mark the first one gave it.
fn assign_bond_directions(mol: &Molecule, topo: &Topology, plan: &Plan) -> HashMap<usize, BondStereo> {
    let mut doubles = Vec::new();
    for (pos, &bond) in topo.bonds.iter().enumerate() {
        let Some(config) = double_bond_stereo(mol, bond) else {
            continue;
        };
        let (u, v) = topo.bond_ends[pos];
        let (first, second) = if plan.preorder[u] < plan.preorder[v] { (u, v) } else { (v, u) };
        doubles.push((plan.preorder[first], plan.preorder[second], first, second, config));
    }
    doubles.sort_by_key(|&(a, b, ..)| (a, b));

    let mut directions: HashMap<usize, BondStereo> = HashMap::new();
    let walk = |dirs: &HashMap<usize, BondStereo>, bond: usize, from: usize| {
        dirs.get(&bond).map(|&stored| {
            if topo.bond_ends[bond].0 == from {
                stored
            } else {
                stored.flipped()
            }
        })
    };

    for (_, _, first, second, config) in doubles {
        let Some((sub_a, bond_a)) = substituent(mol, topo, plan, first, second) else {
            continue;
        };
        let Some((sub_b, bond_b)) = substituent(mol, topo, plan, second, first) else {
            continue;
        };
        let (x, y) = if topo.atoms[first] == config.a {
            (topo.atoms[sub_a], topo.atoms[sub_b])
        } else {
            (topo.atoms[sub_b], topo.atoms[sub_a])
        };
        let Some(trans) = is_trans(mol, &config, x, y) else {
            continue;
        };
        let opposite = |d: BondStereo| if trans { d.flipped() } else { d };

        let (dir_a, dir_b) = match (walk(&directions, bond_a, first), walk(&directions, bond_b, second)) {
            (Some(_), Some(_)) => continue,
            (Some(a), None) => (a, opposite(a)),
            (None, Some(b)) => (opposite(b), b),
            (None, None) => {
                // The first mark is written as '/'.
                let a = if plan.preorder[first] < plan.preorder[sub_a] {
                    BondStereo::Up
                } else {
                    BondStereo::Down
                };
                (a, opposite(a))
            }
        };
        for (bond, from, dir) in [(bond_a, first, dir_a), (bond_b, second, dir_b)] {
            let stored = if topo.bond_ends[bond].0 == from { dir } else { dir.flipped() };
            directions.insert(bond, stored);
        }
    }
    directions
}

/// First single-bonded neighbor of `center` other than `partner`, in
/// written order.
fn substituent(
    mol: &Molecule,
    topo: &Topology,
    plan: &Plan,
    center: usize,
    partner: usize,
) -> Option<(usize, usize)> {
    plan.written_neighbors(center)
        .into_iter()
        .filter(|&nb| nb != partner)
        .find_map(|nb| {
            let bond = topo.bond_between(center, nb)?;
            (mol.bond(topo.bonds[bond]).order == BondOrder::Single).then_some((nb, bond))
        })
}

struct Emitter<'a> {
    mol: &'a Molecule,
    topo: &'a Topology,
    plan: &'a Plan,
    lowercase: &'a [bool],
    directions: &'a HashMap<usize, BondStereo>,
    /// Digit of each ring bond opened but not yet closed.
    open_digits: HashMap<usize, u32>,
    in_use: BTreeSet<u32>,
    out: String,
}

impl Emitter<'_> {
    fn write_atom(&mut self, atom: usize) {
        let ring_order = self.plan.ring_order(atom);
        let chirality = self.written_chirality(atom, &ring_order);
        self.write_atom_symbol(atom, chirality);

        let mut released = Vec::new();
        for &(partner, bond) in &ring_order {
            if let Some(digit) = self.open_digits.remove(&bond) {
                write_ring_digit(digit, &mut self.out);
                released.push(digit);
            } else {
                let digit = (1u32..).find(|d| !self.in_use.contains(d)).unwrap_or(1);
                self.in_use.insert(digit);
                self.open_digits.insert(bond, digit);
                self.write_bond(bond, atom, partner);
                write_ring_digit(digit, &mut self.out);
            }
        }
        for digit in released {
            self.in_use.remove(&digit);
        }

        let plan = self.plan;
        let kids = &plan.children[atom];
        let Some(last) = kids.len().checked_sub(1) else {
            return;
        };
        for (i, &child) in kids.iter().enumerate() {
            let is_branch = i < last;
            if is_branch {
                self.out.push('(');
            }
            if let Some(bond) = self.topo.bond_between(atom, child) {
                self.write_bond(bond, atom, child);
            }
            self.write_atom(child);
            if is_branch {
                self.out.push(')');
            }
        }
    }

    /// Symbol for `bond` as read from `from` (written first) to `to`.
    fn write_bond(&mut self, bond: usize, from: usize, to: usize) {
        let order = self.mol.bond(self.topo.bonds[bond]).order;
        if order == BondOrder::Single {
            if let Some(&stored) = self.directions.get(&bond) {
                let dir = if self.topo.bond_ends[bond].0 == from {
                    stored
                } else {
                    stored.flipped()
                };
                let mark = match dir {
                    BondStereo::Up => Some('/'),
                    BondStereo::Down => Some('\\'),
                    BondStereo::None => None,
                };
                if let Some(mark) = mark {
                    self.out.push(mark);
                    return;
                }
            }
        }
        let both_lower = self.lowercase[from] && self.lowercase[to];
        match order {
            BondOrder::Single if both_lower => self.out.push('-'),
            BondOrder::Single => {}
            BondOrder::Double => self.out.push('='),
            BondOrder::Triple => self.out.push('#'),
            BondOrder::Aromatic if both_lower => {}
            BondOrder::Aromatic => self.out.push(':'),
        }
    }

    /// Re-expresses stored tetrahedral chirality for the written ligand
    /// order: parent, hydrogen, ring partners, children.
    fn written_chirality(&self, atom: usize, ring_order: &[(usize, usize)]) -> Chirality {
        let id = self.topo.atoms[atom];
        let data = self.mol.atom(id);
        if !data.chirality.is_tetrahedral() {
            return data.chirality;
        }
        let as_ligand = |p: usize| Ligand::Atom(self.topo.atoms[p]);
        let mut textual: Vec<Ligand> = self.plan.parent[atom].map(as_ligand).into_iter().collect();
        if data.hydrogen_count > 0 {
            textual.push(Ligand::ImplicitH);
        }
        textual.extend(ring_order.iter().map(|&(partner, _)| as_ligand(partner)));
        textual.extend(self.plan.children[atom].iter().map(|&c| as_ligand(c)));

        if is_even_permutation(&textual, &self.mol.stereo_reference(id)) {
            data.chirality
        } else {
            data.chirality.inverted()
        }
    }

    fn write_atom_symbol(&mut self, atom: usize, chirality: Chirality) {
        let id = self.topo.atoms[atom];
        let data = self.mol.atom(id);
        let lower = self.lowercase[atom];
        if can_write_bare(data, lower, chirality, self.mol.bond_order_sum(id)) {
            push_symbol(data, lower, &mut self.out);
        } else {
            write_bracket_atom(data, lower, chirality, &mut self.out);
        }
    }
}

/// An atom may go without brackets when reading it back bare gives the
/// same element, charge and hydrogen count.
fn can_write_bare(atom: &Atom, lowercase: bool, chirality: Chirality, bond_sum: u8) -> bool {
    atom.element.is_organic_subset()
        && atom.isotope.is_none()
        && atom.formal_charge == 0
        && chirality == Chirality::None
        && atom.atom_class == 0
        && atom.hydrogen_count == implicit_hydrogens(atom.element, lowercase, bond_sum)
}

fn push_symbol(atom: &Atom, lowercase: bool, out: &mut String) {
    let symbol = atom.element.symbol();
    if lowercase {
        out.push_str(&symbol.to_ascii_lowercase());
    } else {
        out.push_str(symbol);
    }
}

fn write_bracket_atom(atom: &Atom, lowercase: bool, chirality: Chirality, out: &mut String) {
    out.push('[');
    if let Some(isotope) = atom.isotope {
        out.push_str(&isotope.to_string());
    }
    push_symbol(atom, lowercase, out);

    match chirality {
        Chirality::None => {}
        Chirality::CounterClockwise => out.push('@'),
        Chirality::Clockwise => out.push_str("@@"),
        Chirality::Extended { class, index } => {
            out.push('@');
            out.push_str(class.tag());
            out.push_str(&index.to_string());
        }
    }

    if atom.hydrogen_count > 0 {
        out.push('H');
        if atom.hydrogen_count > 1 {
            out.push_str(&atom.hydrogen_count.to_string());
        }
    }

    if atom.formal_charge > 0 {
        out.push('+');
        if atom.formal_charge > 1 {
            out.push_str(&atom.formal_charge.to_string());
        }
    } else if atom.formal_charge < 0 {
        out.push('-');
        if atom.formal_charge < -1 {
            out.push_str(&atom.formal_charge.unsigned_abs().to_string());
        }
    }

    if atom.atom_class != 0 {
        out.push(':');
        out.push_str(&atom.atom_class.to_string());
    }
    out.push(']');
}

fn write_ring_digit(digit: u32, out: &mut String) {
    match digit {
        0..=9 => out.push_str(&digit.to_string()),
        10..=99 => {
            out.push('%');
            out.push_str(&digit.to_string());
        }
        _ => {
            out.push_str("%(");
            out.push_str(&digit.to_string());
            out.push(')');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bond::Bond;
    use crate::element::Element;
    use crate::smiles::{generate, parse_one};

    fn round_trip(smiles: &str) -> (Molecule, Molecule, String) {
        let mol1 = parse_one(smiles).unwrap();
        let written = write_molecule(&mol1, None);
        let mol2 = parse_one(&written).unwrap_or_else(|e| {
            panic!("Failed to re-parse '{written}' (from '{smiles}'): {e}");
        });
        (mol1, mol2, written)
    }

    fn assert_same_structure(mol1: &Molecule, mol2: &Molecule, ctx: &str) {
        assert_eq!(mol1.atom_count(), mol2.atom_count(), "{ctx}: atom count");
        assert_eq!(mol1.bond_count(), mol2.bond_count(), "{ctx}: bond count");
        let mut e1: Vec<Element> = mol1.atoms().map(|n| mol1.atom(n).element).collect();
        let mut e2: Vec<Element> = mol2.atoms().map(|n| mol2.atom(n).element).collect();
        e1.sort();
        e2.sort();
        assert_eq!(e1, e2, "{ctx}: elements");
        let h1: u32 = mol1.atoms().map(|n| u32::from(mol1.atom(n).hydrogen_count)).sum();
        let h2: u32 = mol2.atoms().map(|n| u32::from(mol2.atom(n).hydrogen_count)).sum();
        assert_eq!(h1, h2, "{ctx}: hydrogens");
    }

    fn canonical(smiles: &str) -> String {
        generate(&parse_one(smiles).unwrap(), true)
    }

    #[test]
    fn as_parsed_output() {
        for (input, expected) in [
            ("C", "C"),
            ("CC", "CC"),
            ("C=C", "C=C"),
            ("C#N", "C#N"),
            ("C1CCCCC1", "C1CCCCC1"),
            ("c1ccccc1", "c1ccccc1"),
            ("O", "O"),
            ("CC(=O)O", "CC(=O)O"),
            ("[Fe]", "[Fe]"),
            ("[13C]", "[13C]"),
            ("[NH4+]", "[NH4+]"),
            ("[O-2]", "[O-2]"),
            ("[CH3:7]C", "[CH3:7]C"),
            ("c1cc[nH]c1", "c1cc[nH]c1"),
        ] {
            let (m1, m2, s) = round_trip(input);
            assert_eq!(s, expected, "{input}");
            assert_same_structure(&m1, &m2, input);
        }
    }

    #[test]
    fn structures_survive_round_trip() {
        for smi in [
            "c1ccc2ccccc2c1",
            "c1ccncc1",
            "Oc1ccccc1",
            "CS(=O)(=O)C",
            "C[N+](=O)[O-]",
            "C1CC2CCC1C2",
            "O=c1cccc[nH]1",
            "c1ccc(-c2ccccc2)cc1",
            "Cn1cnc2c1c(=O)n(C)c(=O)n2C",
            "[se]1cccc1",
            "C12C3C4C1C5C2C3C45",
        ] {
            let (m1, m2, _) = round_trip(smi);
            assert_same_structure(&m1, &m2, smi);
        }
    }

    #[test]
    fn ring_digits_are_reused() {
        let mol = parse_one("C1CC1C1CC1").unwrap();
        let s = write_molecule(&mol, None);
        assert_eq!(s, "C1CC1C1CC1");
    }

    #[test]
    fn many_open_rings_use_percent_forms() {
        let mut mol = Molecule::new();
        let hub = mol.add_atom(Atom::new(Element::C));
        let mut spokes = Vec::new();
        for _ in 0..12 {
            let s = mol.add_atom(Atom::new(Element::C));
            spokes.push(s);
        }
        // A hub bonded to the first spoke, spokes chained, and every
        // spoke bonded back to the hub: eleven rings open at once.
        for w in spokes.windows(2) {
            mol.add_bond(w[0], w[1], Bond::new(BondOrder::Single)).unwrap();
        }
        for &s in &spokes {
            mol.add_bond(hub, s, Bond::new(BondOrder::Single)).unwrap();
        }
        let s = write_molecule(&mol, None);
        assert!(s.contains("%10"), "{s}");
        let back = parse_one(&s).unwrap();
        assert_eq!(back.bond_count(), mol.bond_count());
    }

    #[test]
    fn percent_paren_digit_form() {
        let mut out = String::new();
        write_ring_digit(7, &mut out);
        write_ring_digit(42, &mut out);
        write_ring_digit(123, &mut out);
        assert_eq!(out, "7%42%(123)");
    }

    #[test]
    fn biphenyl_link_is_explicit_single() {
        let (_, _, s) = round_trip("c1ccccc1-c1ccccc1");
        assert!(s.contains('-'), "{s}");
    }

    #[test]
    fn three_fragments() {
        let result = crate::smiles::parse("[Na+].[Cl-].O");
        let joined = crate::smiles::generate_all(&result.molecules, false);
        assert_eq!(joined, "[Na+].[Cl-].O");
    }

    #[test]
    fn tetrahedral_survives_round_trip() {
        for smi in ["F[C@H](Cl)Br", "F[C@@H](Cl)Br", "[C@@H](F)(Cl)Br", "C[C@H]1CCCC1O", "N[C@@H](C)C(=O)O"] {
            let (m1, _, s) = round_trip(smi);
            assert_eq!(canonical(smi), canonical(&s), "{smi} -> {s}");
            assert!(s.contains('@'), "{s}");
            let mirror = smi.replace("@@", "!").replace('@', "@@").replace('!', "@");
            assert_ne!(canonical(&mirror), canonical(&s), "{smi}");
            assert!(m1.atoms().any(|a| m1.atom(a).chirality.is_tetrahedral()));
        }
    }

    #[test]
    fn ez_survives_round_trip() {
        for smi in ["F/C=C/F", "F/C=C\\F", "Cl/C=C/Cl", "C(\\F)=C/F", "F/C=C/C=C/F", "C/C=C(/C)C"] {
            let (_, _, s) = round_trip(smi);
            assert_eq!(canonical(smi), canonical(&s), "{smi} -> {s}");
        }
        let (_, _, s) = round_trip("F/C=C/F");
        assert_eq!(s, "F/C=C/F");
    }

    #[test]
    fn canonical_ez_keeps_marks() {
        for smi in ["F/C=C/F", "F/C=C\\F"] {
            let s = canonical(smi);
            assert!(s.contains('/') || s.contains('\\'), "{s}");
        }
    }

    #[test]
    fn extended_chirality_written_verbatim() {
        let (_, _, s) = round_trip("F[Pt@SP2](F)(Cl)Cl");
        assert!(s.contains("@SP2"), "{s}");
    }

    #[test]
    fn empty_molecule() {
        assert_eq!(write_molecule(&Molecule::new(), None), "");
    }

    #[test]
    fn canonical_toluene_orderings() {
        let a = canonical("Cc1ccccc1");
        assert_eq!(a, canonical("c1ccccc1C"));
        assert_eq!(a, canonical("c1ccc(C)cc1"));
    }

    #[test]
    fn canonical_idempotent() {
        for smi in ["CCO", "c1ccccc1", "CC(=O)O", "c1ccncc1", "F/C=C\\Cl", "N[C@@H](C)C(=O)O"] {
            let first = canonical(smi);
            assert_eq!(first, canonical(&first), "{smi}");
        }
    }
}
