use crate::atom::{ChiralClass, Chirality};
use crate::element::Element;
use crate::smiles::error::SmilesError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Atom(AtomToken),
    Bond { bond: BondToken, pos: usize },
    RingClosure {
        bond: Option<BondToken>,
        digit: u32,
        pos: usize,
    },
    OpenParen(usize),
    CloseParen(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtomToken {
    pub element: Element,
    /// Written with a lowercase symbol.
    pub lowercase: bool,
    pub isotope: Option<u16>,
    pub chirality: Chirality,
    pub hcount: Option<u8>,
    pub charge: i8,
    pub atom_class: u32,
    pub is_bracket: bool,
    pub pos: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BondToken {
    Single,
    Double,
    Triple,
    Aromatic,
    Up,
    Down,
}

impl BondToken {
    pub fn is_directional(self) -> bool {
        matches!(self, Self::Up | Self::Down)
    }
}

/// Tokenizes one `.`-free fragment. `base` is the fragment's offset in the
/// full input so reported positions are absolute.
pub fn tokenize(chars: &[char], base: usize) -> Result<Vec<Token>, SmilesError> {
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let pos = base + i;
        match chars[i] {
            '[' => {
                let (tok, next) = parse_bracket_atom(chars, i, base)?;
                tokens.push(Token::Atom(tok));
                i = next;
            }
            'B' if chars.get(i + 1) == Some(&'r') => {
                tokens.push(Token::Atom(bare_atom(Element::Br, false, pos)));
                i += 2;
            }
            'C' if chars.get(i + 1) == Some(&'l') => {
                tokens.push(Token::Atom(bare_atom(Element::Cl, false, pos)));
                i += 2;
            }
            c @ ('B' | 'C' | 'N' | 'O' | 'P' | 'S' | 'F' | 'I') => {
                if let Some(text) = bracket_only_symbol(chars, i) {
                    return Err(SmilesError::InvalidElement { pos, text });
                }
                let element = Element::from_symbol(&c.to_string())
                    .ok_or(SmilesError::UnexpectedChar { pos, ch: c })?;
                tokens.push(Token::Atom(bare_atom(element, false, pos)));
                i += 1;
            }
            c @ ('b' | 'c' | 'n' | 'o' | 'p' | 's') => {
                let element = Element::from_aromatic_symbol(&c.to_string())
                    .ok_or(SmilesError::UnexpectedChar { pos, ch: c })?;
                tokens.push(Token::Atom(bare_atom(element, true, pos)));
                i += 1;
            }
            c if c.is_ascii_alphabetic() => {
                return Err(SmilesError::InvalidElement {
                    pos,
                    text: unknown_symbol(chars, i),
                });
            }
            '-' => push_bond(&mut tokens, BondToken::Single, pos, &mut i),
            '=' => push_bond(&mut tokens, BondToken::Double, pos, &mut i),
            '#' => push_bond(&mut tokens, BondToken::Triple, pos, &mut i),
            ':' => push_bond(&mut tokens, BondToken::Aromatic, pos, &mut i),
            '/' => push_bond(&mut tokens, BondToken::Up, pos, &mut i),
            '\\' => push_bond(&mut tokens, BondToken::Down, pos, &mut i),
            '(' => {
                tokens.push(Token::OpenParen(pos));
                i += 1;
            }
            ')' => {
                tokens.push(Token::CloseParen(pos));
                i += 1;
            }
            '%' => {
                let (digit, next) = parse_percent_ring(chars, i, base)?;
                let bond = take_pending_bond(&mut tokens);
                tokens.push(Token::RingClosure { bond, digit, pos });
                i = next;
            }
            d @ '0'..='9' => {
                let bond = take_pending_bond(&mut tokens);
                tokens.push(Token::RingClosure {
                    bond,
                    digit: d.to_digit(10).unwrap_or(0),
                    pos,
                });
                i += 1;
            }
            ch => return Err(SmilesError::UnexpectedChar { pos, ch }),
        }
    }

    Ok(tokens)
}

fn push_bond(tokens: &mut Vec<Token>, bond: BondToken, pos: usize, i: &mut usize) {
    tokens.push(Token::Bond { bond, pos });
    *i += 1;
}

fn bare_atom(element: Element, lowercase: bool, pos: usize) -> AtomToken {
    AtomToken {
        element,
        lowercase,
        isotope: None,
        chirality: Chirality::None,
        hcount: None,
        charge: 0,
        atom_class: 0,
        is_bracket: false,
        pos,
    }
}

/// Text of an element-like token that may not appear outside brackets.
fn unknown_symbol(chars: &[char], i: usize) -> String {
    let first = chars[i];
    match chars.get(i + 1) {
        Some(&next) if first.is_ascii_uppercase() && next.is_ascii_lowercase() => {
            let two: String = [first, next].iter().collect();
            if Element::from_symbol(&two).is_some() {
                return two;
            }
            first.to_string()
        }
        _ => first.to_string(),
    }
}

/// `Na`, `Cu` and the like: an organic-subset letter followed by a
/// lowercase letter that cannot start an atom of its own.
fn bracket_only_symbol(chars: &[char], i: usize) -> Option<String> {
    let next = *chars.get(i + 1)?;
    if !next.is_ascii_lowercase() || matches!(next, 'b' | 'c' | 'n' | 'o' | 'p' | 's') {
        return None;
    }
    let two: String = [chars[i], next].iter().collect();
    Element::from_symbol(&two).map(|_| two)
}

fn take_pending_bond(tokens: &mut Vec<Token>) -> Option<BondToken> {
    if let Some(Token::Bond { bond, .. }) = tokens.last() {
        let bond = *bond;
        tokens.pop();
        return Some(bond);
    }
    None
}

/// `%nn` or `%(n...)`.
fn parse_percent_ring(chars: &[char], start: usize, base: usize) -> Result<(u32, usize), SmilesError> {
    let mut i = start + 1;
    if chars.get(i) == Some(&'(') {
        i += 1;
        let digits_start = i;
        let mut value: u32 = 0;
        while let Some(d) = chars.get(i).and_then(|c| c.to_digit(10)) {
            value = value
                .checked_mul(10)
                .and_then(|v| v.checked_add(d))
                .ok_or(SmilesError::UnexpectedChar {
                    pos: base + i,
                    ch: chars[i],
                })?;
            i += 1;
        }
        return match chars.get(i) {
            Some(')') if i > digits_start => Ok((value, i + 1)),
            Some(&ch) => Err(SmilesError::UnexpectedChar { pos: base + i, ch }),
            None => Err(SmilesError::UnexpectedEnd { pos: base + i }),
        };
    }

    let mut value = 0;
    for offset in 0..2 {
        match chars.get(i + offset) {
            Some(c) if c.is_ascii_digit() => value = value * 10 + c.to_digit(10).unwrap_or(0),
            Some(&ch) => return Err(SmilesError::UnexpectedChar { pos: base + i + offset, ch }),
            None => return Err(SmilesError::UnexpectedEnd { pos: base + i + offset }),
        }
    }
    Ok((value, i + 2))
}

fn parse_bracket_atom(
    chars: &[char],
    start: usize,
    base: usize,
) -> Result<(AtomToken, usize), SmilesError> {
    if !chars[start..].contains(&']') {
        return Err(SmilesError::UnclosedBracket { pos: base + start });
    }
    let mut i = start + 1;

    let isotope = parse_isotope(chars, &mut i, base)?;
    let (element, lowercase) = parse_bracket_element(chars, &mut i, base)?;
    let chirality = parse_chirality(chars, &mut i, base)?;
    let hcount = parse_hcount(chars, &mut i, base)?;
    let charge = parse_charge(chars, &mut i, base)?;
    let atom_class = parse_atom_class(chars, &mut i, base)?;

    match chars.get(i) {
        Some(']') => {}
        Some(&ch) => return Err(SmilesError::UnexpectedChar { pos: base + i, ch }),
        None => return Err(SmilesError::UnclosedBracket { pos: base + start }),
    }
    i += 1;

    Ok((
        AtomToken {
            element,
            lowercase,
            isotope,
            chirality,
            hcount: Some(hcount.unwrap_or(0)),
            charge,
            atom_class,
            is_bracket: true,
            pos: base + start,
        },
        i,
    ))
}

fn parse_isotope(chars: &[char], i: &mut usize, base: usize) -> Result<Option<u16>, SmilesError> {
    let start = *i;
    let mut value: u16 = 0;
    while let Some(d) = chars.get(*i).and_then(|c| c.to_digit(10)) {
        value = value
            .checked_mul(10)
            .and_then(|v| v.checked_add(d as u16))
            .ok_or(SmilesError::InvalidIsotope { pos: base + start })?;
        *i += 1;
    }
    Ok((*i > start).then_some(value))
}

fn parse_bracket_element(
    chars: &[char],
    i: &mut usize,
    base: usize,
) -> Result<(Element, bool), SmilesError> {
    let Some(&first) = chars.get(*i) else {
        return Err(SmilesError::UnexpectedEnd { pos: base + *i });
    };

    if first.is_ascii_lowercase() {
        if let Some(&second) = chars.get(*i + 1) {
            let two: String = [first, second].iter().collect();
            if let Some(e) = Element::from_aromatic_symbol(&two) {
                *i += 2;
                return Ok((e, true));
            }
        }
        if let Some(e) = Element::from_aromatic_symbol(&first.to_string()) {
            *i += 1;
            return Ok((e, true));
        }
        return Err(SmilesError::InvalidElement {
            pos: base + *i,
            text: first.to_string(),
        });
    }

    if !first.is_ascii_uppercase() {
        return Err(SmilesError::UnexpectedChar {
            pos: base + *i,
            ch: first,
        });
    }
    if let Some(&second) = chars.get(*i + 1).filter(|c| c.is_ascii_lowercase()) {
        let two: String = [first, second].iter().collect();
        if let Some(e) = Element::from_symbol(&two) {
            *i += 2;
            return Ok((e, false));
        }
    }
    match Element::from_symbol(&first.to_string()) {
        Some(e) => {
            *i += 1;
            Ok((e, false))
        }
        None => Err(SmilesError::InvalidElement {
            pos: base + *i,
            text: unknown_symbol(chars, *i),
        }),
    }
}

/// `@`, `@@`, or `@` followed by a class tag and index such as `@TB12`.
/// `@TH1` and `@TH2` are the same as `@` and `@@`.
fn parse_chirality(chars: &[char], i: &mut usize, base: usize) -> Result<Chirality, SmilesError> {
    if chars.get(*i) != Some(&'@') {
        return Ok(Chirality::None);
    }
    let start = *i;
    *i += 1;
    if chars.get(*i) == Some(&'@') {
        *i += 1;
        return Ok(Chirality::Clockwise);
    }

    let tag: String = chars[*i..].iter().take(2).collect();
    let Some(class) = ChiralClass::from_tag(&tag) else {
        return Ok(Chirality::CounterClockwise);
    };
    *i += 2;
    let digits_start = *i;
    let mut index: u8 = 0;
    while let Some(d) = chars.get(*i).and_then(|c| c.to_digit(10)) {
        index = index
            .checked_mul(10)
            .and_then(|v| v.checked_add(d as u8))
            .ok_or(SmilesError::InvalidChirality { pos: base + start })?;
        *i += 1;
    }
    if *i == digits_start || index == 0 || index > class.max_index() {
        return Err(SmilesError::InvalidChirality { pos: base + start });
    }
    Ok(match (class, index) {
        (ChiralClass::Tetrahedral, 1) => Chirality::CounterClockwise,
        (ChiralClass::Tetrahedral, _) => Chirality::Clockwise,
        _ => Chirality::Extended { class, index },
    })
}

fn parse_hcount(chars: &[char], i: &mut usize, base: usize) -> Result<Option<u8>, SmilesError> {
    if chars.get(*i) != Some(&'H') {
        return Ok(None);
    }
    let start = *i;
    *i += 1;
    let digits_start = *i;
    let mut count: u8 = 0;
    while let Some(d) = chars.get(*i).and_then(|c| c.to_digit(10)) {
        count = count
            .checked_mul(10)
            .and_then(|v| v.checked_add(d as u8))
            .ok_or(SmilesError::InvalidHydrogenCount { pos: base + start })?;
        *i += 1;
    }
    Ok(Some(if *i == digits_start { 1 } else { count }))
}

fn parse_charge(chars: &[char], i: &mut usize, base: usize) -> Result<i8, SmilesError> {
    let sign: i8 = match chars.get(*i) {
        Some('+') => 1,
        Some('-') => -1,
        _ => return Ok(0),
    };
    let symbol = chars[*i];
    let start = *i;
    let invalid = SmilesError::InvalidCharge { pos: base + start };
    *i += 1;

    if chars.get(*i) == Some(&symbol) {
        let mut magnitude: i8 = 1;
        while chars.get(*i) == Some(&symbol) {
            magnitude = magnitude.checked_add(1).ok_or(invalid.clone())?;
            *i += 1;
        }
        return Ok(sign * magnitude);
    }

    let digits_start = *i;
    let mut magnitude: i8 = 0;
    while let Some(d) = chars.get(*i).and_then(|c| c.to_digit(10)) {
        magnitude = magnitude
            .checked_mul(10)
            .and_then(|v| v.checked_add(d as i8))
            .ok_or(invalid.clone())?;
        *i += 1;
    }
    if *i == digits_start {
        return Ok(sign);
    }
    Ok(sign * magnitude)
}

fn parse_atom_class(chars: &[char], i: &mut usize, base: usize) -> Result<u32, SmilesError> {
    if chars.get(*i) != Some(&':') {
        return Ok(0);
    }
    let start = *i;
    *i += 1;
    let digits_start = *i;
    let mut value: u32 = 0;
    while let Some(d) = chars.get(*i).and_then(|c| c.to_digit(10)) {
        value = value
            .checked_mul(10)
            .and_then(|v| v.checked_add(d))
            .ok_or(SmilesError::InvalidAtomClass { pos: base + start })?;
        *i += 1;
    }
    if *i == digits_start {
        return Err(SmilesError::InvalidAtomClass { pos: base + start });
    }
    Ok(value)
}
