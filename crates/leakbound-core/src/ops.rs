//! Bit-level operators
//!
//! Every operator folds constants eagerly and only allocates a new bit when
//! the result is unknown. New unknown bits record their unknown operands as
//! dependencies (and, through [`BitArena::derive`], the active control
//! conditions), which is the only way edges enter the dependency graph.
//!
//! Comparison results are two-bit values `[r, 0]` so they read as the
//! non-negative integers 0 and 1.

use crate::lattice::{BitArena, BitId, Compare, Gate, Origin, Value, B};
use serde::{Deserialize, Serialize};
use smallvec::smallvec;

/// Binary operators understood by [`binary`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinOp {
    And,
    Or,
    Xor,
    Add,
    Sub,
    Mul,
    Eq,
    Neq,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    Shl,
    Shr,
}

/// Unary operators understood by [`unary`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnOp {
    /// Bitwise complement
    Not,
    /// Two's complement negation
    Neg,
}

fn gate(arena: &mut BitArena, gate: Gate, a: BitId, b: BitId) -> BitId {
    arena.derive(
        B::U,
        Origin::Gate {
            gate,
            operands: smallvec![a, b],
        },
        &[a, b],
    )
}

pub fn and(arena: &mut BitArena, a: BitId, b: BitId) -> BitId {
    let (va, vb) = (arena.val(a), arena.val(b));
    if va == B::Zero || vb == B::Zero {
        return arena.constant(false);
    }
    if va == B::One {
        return b;
    }
    if vb == B::One {
        return a;
    }
    if va == B::X || vb == B::X {
        return BitId::BOT;
    }
    if a == b {
        return a;
    }
    gate(arena, Gate::And, a, b)
}

pub fn or(arena: &mut BitArena, a: BitId, b: BitId) -> BitId {
    let (va, vb) = (arena.val(a), arena.val(b));
    if va == B::One || vb == B::One {
        return arena.constant(true);
    }
    if va == B::Zero {
        return b;
    }
    if vb == B::Zero {
        return a;
    }
    if va == B::X || vb == B::X {
        return BitId::BOT;
    }
    if a == b {
        return a;
    }
    gate(arena, Gate::Or, a, b)
}

pub fn xor(arena: &mut BitArena, a: BitId, b: BitId) -> BitId {
    let (va, vb) = (arena.val(a), arena.val(b));
    if va == B::X || vb == B::X {
        return BitId::BOT;
    }
    if va.is_constant() && vb.is_constant() {
        return arena.constant(va != vb);
    }
    match (va, vb) {
        (B::Zero, _) => b,
        (_, B::Zero) => a,
        (B::One, _) => not(arena, b),
        (_, B::One) => not(arena, a),
        _ if a == b => arena.constant(false),
        _ => gate(arena, Gate::Xor, a, b),
    }
}

pub fn not(arena: &mut BitArena, a: BitId) -> BitId {
    match arena.val(a) {
        B::X => BitId::BOT,
        B::U => arena.derive(
            B::U,
            Origin::Gate {
                gate: Gate::Not,
                operands: smallvec![a],
            },
            &[a],
        ),
        constant => arena.constant(constant == B::Zero),
    }
}

/// Join of two alternatives under the branch condition `cond`
///
/// Under an unknown condition, alternatives with different values (`X`
/// included) give an unknown bit.
pub fn phi(arena: &mut BitArena, a: BitId, b: BitId, cond: BitId) -> BitId {
    if a == b {
        return a;
    }
    let (va, vb) = (arena.val(a), arena.val(b));
    let val = if va != vb && arena.is_unknown(cond) {
        B::U
    } else {
        va.join(vb)
    };
    arena.derive(val, Origin::Phi, &[a, b, cond])
}

/// Fresh bit observed at an output, depending only on `bit`
pub fn wrap(arena: &mut BitArena, bit: BitId) -> BitId {
    let val = arena.val(bit);
    arena.derive(val, Origin::Output, &[bit])
}

pub fn wrap_value(arena: &mut BitArena, value: &Value) -> Value {
    value.map_bits(|b| wrap(arena, b))
}

/// Element-wise application of a binary gate
pub fn bitwise(arena: &mut BitArena, op: Gate, x: &Value, y: &Value) -> Value {
    let n = x.len().max(y.len());
    (0..n)
        .map(|i| {
            let (a, b) = (x.get(i), y.get(i));
            match op {
                Gate::And => and(arena, a, b),
                Gate::Or => or(arena, a, b),
                Gate::Xor => xor(arena, a, b),
                Gate::Not => not(arena, a),
            }
        })
        .collect()
}

pub fn not_value(arena: &mut BitArena, x: &Value) -> Value {
    x.map_bits(|b| not(arena, b))
}

/// Phi of two values; append-only histories are padded with bottom bits
pub fn phi_value(arena: &mut BitArena, x: &Value, y: &Value, cond: BitId) -> Value {
    let n = x.len().max(y.len());
    let append_only = x.is_append_only() || y.is_append_only();
    let pick = |v: &Value, i: usize| {
        if append_only {
            v.bits().get(i).copied().unwrap_or(BitId::BOT)
        } else {
            v.get(i)
        }
    };
    let joined: Value = (0..n).map(|i| phi(arena, pick(x, i), pick(y, i), cond)).collect();
    if append_only {
        joined.into_append_only()
    } else {
        joined
    }
}

/// Ripple-carry adder truncated to `width` bits
pub fn add_with_carry(arena: &mut BitArena, x: &Value, y: &Value, carry_in: BitId, width: usize) -> Value {
    let n = (x.len().max(y.len()) + 1).min(width.max(1));
    let mut carry = carry_in;
    let mut bits = Vec::with_capacity(n);
    for i in 0..n {
        let (a, b) = (x.get(i), y.get(i));
        let half = xor(arena, a, b);
        let c1 = and(arena, a, b);
        bits.push(xor(arena, half, carry));
        let c2 = and(arena, half, carry);
        carry = or(arena, c1, c2);
    }
    Value::new(bits)
}

pub fn add(arena: &mut BitArena, x: &Value, y: &Value, width: usize) -> Value {
    let zero = arena.constant(false);
    add_with_carry(arena, x, y, zero, width)
}

pub fn sub(arena: &mut BitArena, x: &Value, y: &Value, width: usize) -> Value {
    let inverted = not_value(arena, y);
    let one = arena.constant(true);
    add_with_carry(arena, x, &inverted, one, width)
}

pub fn neg(arena: &mut BitArena, x: &Value, width: usize) -> Value {
    let zero = Value::constant(arena, 0, width);
    sub(arena, &zero, x, width)
}

/// Every result bit depends on every unknown bit of `operands`
pub fn unknown_value(arena: &mut BitArena, operands: &[&Value], len: usize) -> Value {
    let deps: Vec<BitId> = operands
        .iter()
        .flat_map(|v| v.iter())
        .filter(|&b| arena.is_unknown(b))
        .collect();
    if deps.is_empty() && arena.control().is_empty() {
        return Value::bot(len);
    }
    (0..len.max(1)).map(|_| arena.derive(B::U, Origin::Unknown, &deps)).collect()
}

pub fn mul(arena: &mut BitArena, x: &Value, y: &Value, width: usize) -> Value {
    match (x.as_constant(arena), y.as_constant(arena)) {
        (Some(a), Some(b)) => Value::constant(arena, a.wrapping_mul(b), width),
        (_, Some(k)) => mul_constant(arena, x, k, width),
        (Some(k), _) => mul_constant(arena, y, k, width),
        _ => unknown_value(arena, &[x, y], width),
    }
}

/// Shift-and-add over the set bits of `k`; negative factors negate the product
fn mul_constant(arena: &mut BitArena, x: &Value, k: i64, width: usize) -> Value {
    let magnitude = k.unsigned_abs();
    let mut product = Value::constant(arena, 0, width);
    for shift in (0..width.min(64)).filter(|i| magnitude >> i & 1 == 1) {
        let term = shl(arena, x, shift, width);
        product = add(arena, &product, &term, width);
    }
    if k < 0 {
        neg(arena, &product, width)
    } else {
        product
    }
}

pub fn shl(arena: &mut BitArena, x: &Value, shift: usize, width: usize) -> Value {
    let len = (x.len() + shift).min(width.max(1));
    (0..len)
        .map(|i| if i < shift { arena.constant(false) } else { x.get(i - shift) })
        .collect()
}

/// Arithmetic right shift
pub fn shr(x: &Value, shift: usize) -> Value {
    let len = x.len().saturating_sub(shift).max(1);
    (0..len).map(|i| x.get(i + shift)).collect()
}

fn shift(arena: &mut BitArena, x: &Value, amount: &Value, left: bool, width: usize) -> Value {
    let Some(k) = amount.as_constant(arena) else {
        return unknown_value(arena, &[x, amount], x.len());
    };
    let left = if k < 0 { !left } else { left };
    let k = k.unsigned_abs() as usize;
    if left && k >= width {
        return Value::constant(arena, 0, width);
    }
    if left {
        shl(arena, x, k, width)
    } else {
        shr(x, k)
    }
}

fn comparison(arena: &mut BitArena, r: BitId) -> Value {
    let zero = arena.constant(false);
    Value::new(vec![r, zero])
}

fn compare_origin(compare: Compare, x: &Value, y: &Value, n: usize) -> Origin {
    Origin::Compare {
        compare,
        lhs: (0..n).map(|i| x.get(i)).collect(),
        rhs: (0..n).map(|i| y.get(i)).collect(),
    }
}

fn equality_bit(arena: &mut BitArena, compare: Compare, x: &Value, y: &Value) -> BitId {
    let n = x.len().max(y.len());
    let mut decided_equal = true;
    for i in 0..n {
        let (a, b) = (x.get(i), y.get(i));
        let (va, vb) = (arena.val(a), arena.val(b));
        if va.is_constant() && vb.is_constant() {
            if va != vb {
                return arena.constant(compare == Compare::Neq);
            }
        } else if a != b {
            decided_equal = false;
        }
    }
    if decided_equal {
        return arena.constant(compare == Compare::Eq);
    }
    let operands: Vec<BitId> = (0..n).flat_map(|i| [x.get(i), y.get(i)]).collect();
    let origin = compare_origin(compare, x, y, n);
    arena.derive(B::U, origin, &operands)
}

/// Signed `x < y`, unknown unless decidable from constant bits
fn less_bit(arena: &mut BitArena, x: &Value, y: &Value) -> BitId {
    if let (Some(a), Some(b)) = (x.as_constant(arena), y.as_constant(arena)) {
        return arena.constant(a < b);
    }
    let n = x.len().max(y.len());
    if n == 0 {
        return arena.constant(false);
    }
    let (sx, sy) = (arena.val(x.get(n - 1)), arena.val(y.get(n - 1)));
    if sx.is_constant() && sy.is_constant() {
        if sx != sy {
            return arena.constant(sx == B::One);
        }
        // same sign: the highest differing magnitude bit decides
        for i in (0..n.saturating_sub(1)).rev() {
            let (a, b) = (x.get(i), y.get(i));
            let (va, vb) = (arena.val(a), arena.val(b));
            if a == b || (va.is_constant() && va == vb) {
                continue;
            }
            if va.is_constant() && vb.is_constant() {
                return arena.constant(vb == B::One);
            }
            break;
        }
    }
    let operands: Vec<BitId> = (0..n).flat_map(|i| [x.get(i), y.get(i)]).collect();
    let origin = compare_origin(Compare::Less, x, y, n);
    arena.derive(B::U, origin, &operands)
}

pub fn eq(arena: &mut BitArena, x: &Value, y: &Value) -> Value {
    let r = equality_bit(arena, Compare::Eq, x, y);
    comparison(arena, r)
}

pub fn neq(arena: &mut BitArena, x: &Value, y: &Value) -> Value {
    let r = equality_bit(arena, Compare::Neq, x, y);
    comparison(arena, r)
}

pub fn less(arena: &mut BitArena, x: &Value, y: &Value) -> Value {
    let r = less_bit(arena, x, y);
    comparison(arena, r)
}

fn not_less(arena: &mut BitArena, x: &Value, y: &Value) -> Value {
    let r = less_bit(arena, x, y);
    let r = not(arena, r);
    comparison(arena, r)
}

/// Single bit of `x` as a `[bit, 0]` value
pub fn select(arena: &mut BitArena, x: &Value, index: usize) -> Value {
    let bit = x.get(index);
    comparison(arena, bit)
}

/// Truth of a value used as a condition: the disjunction of its bits
pub fn truth_bit(arena: &mut BitArena, x: &Value) -> BitId {
    let mut bits = x.iter();
    let Some(first) = bits.next() else {
        return arena.constant(false);
    };
    bits.fold(first, |acc, b| or(arena, acc, b))
}

pub fn binary(arena: &mut BitArena, op: BinOp, x: &Value, y: &Value, width: usize) -> Value {
    match op {
        BinOp::And => bitwise(arena, Gate::And, x, y),
        BinOp::Or => bitwise(arena, Gate::Or, x, y),
        BinOp::Xor => bitwise(arena, Gate::Xor, x, y),
        BinOp::Add => add(arena, x, y, width),
        BinOp::Sub => sub(arena, x, y, width),
        BinOp::Mul => mul(arena, x, y, width),
        BinOp::Eq => eq(arena, x, y),
        BinOp::Neq => neq(arena, x, y),
        BinOp::Less => less(arena, x, y),
        BinOp::LessEq => not_less(arena, y, x),
        BinOp::Greater => less(arena, y, x),
        BinOp::GreaterEq => not_less(arena, x, y),
        BinOp::Shl => shift(arena, x, y, true, width),
        BinOp::Shr => shift(arena, x, y, false, width),
    }
}

pub fn unary(arena: &mut BitArena, op: UnOp, x: &Value, width: usize) -> Value {
    match op {
        UnOp::Not => not_value(arena, x),
        UnOp::Neg => neg(arena, x, width),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant(arena: &mut BitArena, n: i64) -> Value {
        Value::constant(arena, n, 32)
    }

    #[test]
    fn test_and_with_zero_is_constant() {
        let mut arena = BitArena::new();
        let x = Value::unknown(&mut arena, 8, Origin::Input);
        let zero = constant(&mut arena, 0);
        let r = binary(&mut arena, BinOp::And, &x, &zero, 32);
        assert_eq!(r.len(), 8);
        assert!(r.iter().all(|b| arena.val(b) == B::Zero));
        assert!(r.iter().all(|b| arena.deps(b).is_empty()));
    }

    #[test]
    fn test_or_with_mask() {
        let mut arena = BitArena::new();
        let l = Value::from_pattern(&mut arena, "0b0u", Origin::Input).unwrap();
        let mask = Value::from_pattern(&mut arena, "0b11", Origin::Input).unwrap();
        let r = binary(&mut arena, BinOp::Or, &l, &mask, 32);
        assert_eq!(r.repr(&arena), "0b11");
        let r = binary(&mut arena, BinOp::And, &l, &mask, 32);
        assert_eq!(r.repr(&arena), "0b0u");
        assert_eq!(r.get(0), l.get(0));
    }

    #[test]
    fn test_unknown_gate_records_operands() {
        let mut arena = BitArena::new();
        let a = arena.fresh(Origin::Input);
        let b = arena.fresh(Origin::Input);
        let r = and(&mut arena, a, b);
        assert_eq!(arena.val(r), B::U);
        assert_eq!(arena.deps(r), &[a, b]);
        let same = xor(&mut arena, a, a);
        assert_eq!(arena.val(same), B::Zero);
    }

    #[test]
    fn test_constant_arithmetic() {
        let mut arena = BitArena::new();
        let (one, zero, two) = (constant(&mut arena, 1), constant(&mut arena, 0), constant(&mut arena, 2));
        let r = add(&mut arena, &one, &zero, 32);
        assert_eq!(r.as_constant(&arena), Some(1));
        let r = sub(&mut arena, &one, &two, 32);
        assert_eq!(r.as_constant(&arena), Some(-1));
        let r = mul(&mut arena, &two, &two, 32);
        assert_eq!(r.as_constant(&arena), Some(4));
        let r = neg(&mut arena, &two, 32);
        assert_eq!(r.as_constant(&arena), Some(-2));
        let r = binary(&mut arena, BinOp::Shl, &one, &two, 32);
        assert_eq!(r.as_constant(&arena), Some(4));
        let r = binary(&mut arena, BinOp::Shr, &two, &one, 32);
        assert_eq!(r.as_constant(&arena), Some(1));
    }

    #[test]
    fn test_comparisons_with_constants() {
        let mut arena = BitArena::new();
        let (one, two, minus) = (constant(&mut arena, 1), constant(&mut arena, 2), constant(&mut arena, -3));
        assert_eq!(less(&mut arena, &one, &two).as_constant(&arena), Some(1));
        assert_eq!(less(&mut arena, &two, &one).as_constant(&arena), Some(0));
        assert_eq!(less(&mut arena, &minus, &one).as_constant(&arena), Some(1));
        assert_eq!(eq(&mut arena, &two, &two).as_constant(&arena), Some(1));
        assert_eq!(neq(&mut arena, &two, &one).as_constant(&arena), Some(1));
        let le = binary(&mut arena, BinOp::LessEq, &two, &two, 32);
        assert_eq!(le.as_constant(&arena), Some(1));
    }

    #[test]
    fn test_less_decided_by_high_bits() {
        let mut arena = BitArena::new();
        let x = Value::from_pattern(&mut arena, "0b00u", Origin::Input).unwrap();
        let four = constant(&mut arena, 4);
        assert_eq!(less(&mut arena, &x, &four).as_constant(&arena), Some(1));
        let y = Value::from_pattern(&mut arena, "0b0u0", Origin::Input).unwrap();
        let one = constant(&mut arena, 1);
        let r = less(&mut arena, &y, &one);
        assert_eq!(arena.val(r.get(0)), B::U);
    }

    #[test]
    fn test_equality_of_identical_unknowns() {
        let mut arena = BitArena::new();
        let x = Value::unknown(&mut arena, 4, Origin::Input);
        assert_eq!(eq(&mut arena, &x, &x).as_constant(&arena), Some(1));
        let y = Value::unknown(&mut arena, 4, Origin::Input);
        let r = eq(&mut arena, &x, &y);
        assert_eq!(arena.val(r.get(0)), B::U);
        assert_eq!(arena.deps(r.get(0)).len(), 8);
    }

    #[test]
    fn test_phi_joins_alternatives() {
        let mut arena = BitArena::new();
        let cond = arena.fresh(Origin::Input);
        let (one, zero) = (arena.constant(true), arena.constant(false));
        let p = phi(&mut arena, one, zero, cond);
        assert_eq!(arena.val(p), B::U);
        assert_eq!(arena.deps(p), &[cond]);
        let other_zero = arena.constant(false);
        let q = phi(&mut arena, zero, other_zero, cond);
        assert_eq!(arena.val(q), B::Zero);
        assert_eq!(phi(&mut arena, cond, cond, cond), cond);
    }

    #[test]
    fn test_phi_with_bottom_depends_on_condition() {
        let mut arena = BitArena::new();
        let cond = arena.fresh(Origin::Input);
        let one = arena.constant(true);
        let p = phi(&mut arena, one, BitId::BOT, cond);
        assert_eq!(arena.val(p), B::U);
        assert_eq!(arena.deps(p), &[cond]);
        let known = arena.constant(false);
        let q = phi(&mut arena, one, BitId::BOT, known);
        assert_eq!(arena.val(q), B::One);
    }

    #[test]
    fn test_mul_by_constant_factors() {
        let mut arena = BitArena::new();
        let x = Value::unknown(&mut arena, 4, Origin::Input);
        let zero = constant(&mut arena, 0);
        let r = mul(&mut arena, &x, &zero, 32);
        assert_eq!(r.as_constant(&arena), Some(0));
        let r = mul(&mut arena, &zero, &x, 32);
        assert_eq!(r.as_constant(&arena), Some(0));

        let low = Value::from_pattern(&mut arena, "0b0u", Origin::Input).unwrap();
        let three = constant(&mut arena, 3);
        let r = mul(&mut arena, &low, &three, 8);
        assert_eq!(r.get(0), low.get(0));
        assert_eq!(r.get(1), low.get(0));
        assert!(r.unknown_bits(&arena).all(|b| b == low.get(0)));

        let minus = constant(&mut arena, -1);
        let r = mul(&mut arena, &low, &minus, 8);
        assert!(!r.is_constant(&arena));
        assert!(r.unknown_bits(&arena).next().is_some());
    }

    #[test]
    fn test_truth_bit_of_comparison() {
        let mut arena = BitArena::new();
        let l = Value::from_pattern(&mut arena, "0b0u", Origin::Input).unwrap();
        let c = truth_bit(&mut arena, &l);
        assert_eq!(c, l.get(0));
    }

    #[test]
    fn test_wrap_creates_single_edge() {
        let mut arena = BitArena::new();
        let x = arena.fresh(Origin::Input);
        let y = wrap(&mut arena, x);
        assert_ne!(x, y);
        assert_eq!(arena.deps(y), &[x]);
        let edges: Vec<_> = arena.edges().collect();
        assert_eq!(edges, vec![(x, y)]);
    }
}
