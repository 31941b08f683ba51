use std::collections::HashMap;

use crate::smiles::error::SmilesError;
use crate::smiles::tokenizer::{AtomToken, BondToken, Token};

#[derive(Debug, Clone)]
pub struct ParseAtom {
    pub token: AtomToken,
    /// Neighbors in the order they appear in the text. A ring closure takes
    /// its place at the digit on both ends.
    pub neighbors: Vec<usize>,
    /// Bonded to an earlier atom by the chain (not a ring closure).
    pub has_parent: bool,
}

/// A bond as written: `bond` describes walking from `from` to `to`.
#[derive(Debug, Clone)]
pub struct ParseBond {
    pub from: usize,
    pub to: usize,
    pub bond: Option<BondToken>,
    pub ring: Option<u32>,
    pub pos: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ParseTree {
    pub atoms: Vec<ParseAtom>,
    pub bonds: Vec<ParseBond>,
}

struct OpenRing {
    atom: usize,
    slot: usize,
    bond: Option<BondToken>,
    pos: usize,
}

/// Builds the atom/bond skeleton of one fragment. `start` and `end` are
/// the fragment's absolute bounds, used for errors with no token to blame.
pub fn build_parse_tree(tokens: &[Token], start: usize, end: usize) -> Result<ParseTree, SmilesError> {
    let mut tree = ParseTree::default();
    let mut stack: Vec<(usize, usize)> = Vec::new();
    let mut current: Option<usize> = None;
    let mut pending_bond: Option<(BondToken, usize)> = None;
    let mut open_rings: HashMap<u32, OpenRing> = HashMap::new();
    let mut last_was_open = false;

    for token in tokens {
        let was_open = std::mem::replace(&mut last_was_open, false);
        match token {
            Token::Atom(atom_tok) => {
                let idx = tree.atoms.len();
                tree.atoms.push(ParseAtom {
                    token: atom_tok.clone(),
                    neighbors: Vec::new(),
                    has_parent: current.is_some(),
                });
                let bond = pending_bond.take();
                match current {
                    Some(cur) => {
                        tree.atoms[cur].neighbors.push(idx);
                        tree.atoms[idx].neighbors.push(cur);
                        tree.bonds.push(ParseBond {
                            from: cur,
                            to: idx,
                            bond: bond.map(|(b, _)| b),
                            ring: None,
                            pos: bond.map_or(atom_tok.pos, |(_, p)| p),
                        });
                    }
                    None => {
                        if let Some((_, pos)) = bond {
                            return Err(SmilesError::DanglingBond { pos });
                        }
                    }
                }
                current = Some(idx);
            }
            Token::Bond { bond, pos } => {
                if current.is_none() || pending_bond.is_some() {
                    return Err(SmilesError::DanglingBond { pos: *pos });
                }
                pending_bond = Some((*bond, *pos));
            }
            Token::RingClosure { bond, digit, pos } => {
                if let Some((_, bond_pos)) = pending_bond {
                    return Err(SmilesError::DanglingBond { pos: bond_pos });
                }
                let cur = current.ok_or(SmilesError::InvalidRingBond {
                    digit: *digit,
                    pos: *pos,
                })?;
                match open_rings.remove(digit) {
                    Some(open) => close_ring(&mut tree, open, cur, *bond, *digit, *pos)?,
                    None => {
                        let slot = tree.atoms[cur].neighbors.len();
                        // Filled in when the ring closes.
                        tree.atoms[cur].neighbors.push(usize::MAX);
                        open_rings.insert(
                            *digit,
                            OpenRing {
                                atom: cur,
                                slot,
                                bond: *bond,
                                pos: *pos,
                            },
                        );
                    }
                }
            }
            Token::OpenParen(pos) => {
                if let Some((_, bond_pos)) = pending_bond {
                    return Err(SmilesError::DanglingBond { pos: bond_pos });
                }
                let cur = current.ok_or(SmilesError::UnexpectedChar { pos: *pos, ch: '(' })?;
                stack.push((cur, *pos));
                last_was_open = true;
            }
            Token::CloseParen(pos) => {
                if was_open {
                    return Err(SmilesError::EmptyBranch { pos: *pos });
                }
                if let Some((_, bond_pos)) = pending_bond {
                    return Err(SmilesError::DanglingBond { pos: bond_pos });
                }
                let (branch_point, _) = stack.pop().ok_or(SmilesError::UnmatchedParen { pos: *pos })?;
                current = Some(branch_point);
            }
        }
    }

    if let Some((_, pos)) = pending_bond {
        return Err(SmilesError::DanglingBond { pos });
    }
    if let Some(&(_, pos)) = stack.last() {
        return Err(SmilesError::UnmatchedParen { pos });
    }
    if let Some((digit, open)) = open_rings.iter().min_by_key(|(_, open)| open.pos) {
        return Err(SmilesError::UnclosedRing {
            digit: *digit,
            pos: open.pos,
        });
    }
    if tree.atoms.is_empty() {
        return Err(if tokens.is_empty() && start == end {
            SmilesError::EmptyFragment { pos: start }
        } else {
            SmilesError::UnexpectedEnd { pos: end }
        });
    }

    Ok(tree)
}

fn close_ring(
    tree: &mut ParseTree,
    open: OpenRing,
    cur: usize,
    closing_bond: Option<BondToken>,
    digit: u32,
    pos: usize,
) -> Result<(), SmilesError> {
    if open.atom == cur {
        return Err(SmilesError::SelfLoopRing { digit, pos });
    }
    if tree.atoms[cur].neighbors.contains(&open.atom) {
        return Err(SmilesError::DuplicateBond { digit, pos });
    }

    // A symbol at the closing digit is read walking from the closing atom.
    let bond = match (open.bond, closing_bond) {
        (None, None) => None,
        (Some(b), None) => Some(b),
        (None, Some(b)) => Some(flip(b)),
        (Some(a), Some(b)) if a == b => Some(a),
        (Some(a), Some(b)) if a.is_directional() && b.is_directional() => Some(a),
        _ => return Err(SmilesError::RingBondConflict { digit, pos }),
    };

    tree.atoms[open.atom].neighbors[open.slot] = cur;
    tree.atoms[cur].neighbors.push(open.atom);
    tree.bonds.push(ParseBond {
        from: open.atom,
        to: cur,
        bond,
        ring: Some(digit),
        pos,
    });
    Ok(())
}

fn flip(bond: BondToken) -> BondToken {
    match bond {
        BondToken::Up => BondToken::Down,
        BondToken::Down => BondToken::Up,
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smiles::tokenizer::tokenize;

    fn tree(s: &str) -> Result<ParseTree, SmilesError> {
        let chars: Vec<char> = s.chars().collect();
        let tokens = tokenize(&chars, 0)?;
        build_parse_tree(&tokens, 0, chars.len())
    }

    #[test]
    fn ethane_tree() {
        let tree = tree("CC").unwrap();
        assert_eq!(tree.atoms.len(), 2);
        assert_eq!(tree.atoms[0].neighbors, vec![1]);
        assert!(!tree.atoms[0].has_parent);
        assert!(tree.atoms[1].has_parent);
    }

    #[test]
    fn cyclohexane_tree() {
        let tree = tree("C1CCCCC1").unwrap();
        assert_eq!(tree.atoms.len(), 6);
        assert_eq!(tree.bonds.len(), 6);
        for atom in &tree.atoms {
            assert_eq!(atom.neighbors.len(), 2);
        }
    }

    #[test]
    fn branch_tree() {
        let tree = tree("CC(C)C").unwrap();
        assert_eq!(tree.atoms.len(), 4);
        assert_eq!(tree.atoms[1].neighbors, vec![0, 2, 3]);
    }

    #[test]
    fn ring_partner_keeps_opening_position() {
        // Atom 1 opens ring 1 before its branch and chain neighbors.
        let tree = tree("CC1(F)CCC1").unwrap();
        assert_eq!(tree.atoms[1].neighbors, vec![0, 5, 2, 3]);
    }

    #[test]
    fn ring_bond_symbols() {
        let t = tree("C=1CC1").unwrap();
        assert_eq!(t.bonds[2].bond, Some(BondToken::Double));
        let t = tree("C1CC=1").unwrap();
        assert_eq!(t.bonds[2].bond, Some(BondToken::Double));
        let t = tree("C1CC/1").unwrap();
        assert_eq!(t.bonds[2].bond, Some(BondToken::Down));
        assert!(matches!(
            tree("C=1CC#1"),
            Err(SmilesError::RingBondConflict { digit: 1, pos: 6 })
        ));
    }

    #[test]
    fn ring_closure_errors() {
        assert_eq!(
            tree("C1CC").unwrap_err(),
            SmilesError::UnclosedRing { digit: 1, pos: 1 }
        );
        assert_eq!(
            tree("C11").unwrap_err(),
            SmilesError::SelfLoopRing { digit: 1, pos: 2 }
        );
        assert_eq!(
            tree("C1C1").unwrap_err(),
            SmilesError::DuplicateBond { digit: 1, pos: 3 }
        );
        assert_eq!(
            tree("1CC").unwrap_err(),
            SmilesError::InvalidRingBond { digit: 1, pos: 0 }
        );
    }

    #[test]
    fn digit_reuse_after_closure() {
        let tree = tree("C1CC1C1CC1").unwrap();
        assert_eq!(tree.bonds.len(), 7);
    }

    #[test]
    fn paren_errors() {
        assert_eq!(tree("C(C").unwrap_err(), SmilesError::UnmatchedParen { pos: 1 });
        assert_eq!(tree("CC)C").unwrap_err(), SmilesError::UnmatchedParen { pos: 2 });
        assert_eq!(tree("C()C").unwrap_err(), SmilesError::EmptyBranch { pos: 2 });
    }

    #[test]
    fn dangling_bonds() {
        assert_eq!(tree("=CC").unwrap_err(), SmilesError::DanglingBond { pos: 0 });
        assert_eq!(tree("CC=").unwrap_err(), SmilesError::DanglingBond { pos: 2 });
        assert_eq!(tree("C(=)C").unwrap_err(), SmilesError::DanglingBond { pos: 2 });
        assert_eq!(tree("C==C").unwrap_err(), SmilesError::DanglingBond { pos: 2 });
    }

    #[test]
    fn empty_fragment() {
        assert_eq!(tree("").unwrap_err(), SmilesError::EmptyFragment { pos: 0 });
    }
}
