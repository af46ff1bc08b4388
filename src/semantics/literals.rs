//! Numeric literal evaluation and constant folding over literals.

use crate::ast::{BinaryOp, Literal, NumberSuffix, UnaryOp};
use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiteralError {
    #[error("digit outside base")]
    Malformed,
    #[error("value does not fit its type")]
    Overflow,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoldError {
    #[error("division by zero")]
    DivisionByZero,
    #[error("overflow while folding")]
    Overflow,
}

/// Evaluate a scanned numeric literal. Underscores separate digit groups.
///
/// An unsuffixed integer that does not fit `int` becomes a `long`.
pub fn evaluate_number<'a>(text: &str, base: u32, suffix: NumberSuffix) -> Result<Literal<'a>, LiteralError> {
    let digits: String = text.chars().filter(|c| *c != '_').collect();
    if digits.is_empty() {
        return Err(LiteralError::Malformed);
    }

    let floating = matches!(suffix, NumberSuffix::Float | NumberSuffix::Double)
        || (base == 10 && digits.contains(['.', 'e', 'E']));
    if floating {
        if base != 10 {
            return Err(LiteralError::Malformed);
        }
        return match suffix {
            NumberSuffix::Float => {
                let value: f32 = digits.parse().map_err(|_| LiteralError::Malformed)?;
                if value.is_finite() {
                    Ok(Literal::Float(value))
                } else {
                    Err(LiteralError::Overflow)
                }
            }
            _ => {
                let value: f64 = digits.parse().map_err(|_| LiteralError::Malformed)?;
                if value.is_finite() {
                    Ok(Literal::Double(value))
                } else {
                    Err(LiteralError::Overflow)
                }
            }
        };
    }

    let mut value: u64 = 0;
    let mut overflow = false;
    for c in digits.chars() {
        let digit = c
            .to_digit(36)
            .filter(|d| *d < base)
            .ok_or(LiteralError::Malformed)?;
        // Keep scanning after an overflow so a bad digit still wins.
        match value
            .checked_mul(u64::from(base))
            .and_then(|v| v.checked_add(u64::from(digit)))
        {
            Some(v) => value = v,
            None => overflow = true,
        }
    }
    if overflow {
        return Err(LiteralError::Overflow);
    }

    match suffix {
        NumberSuffix::Byte => u8::try_from(value).map(Literal::Byte).map_err(|_| LiteralError::Overflow),
        NumberSuffix::Short => i16::try_from(value).map(Literal::Short).map_err(|_| LiteralError::Overflow),
        NumberSuffix::Long => i64::try_from(value).map(Literal::Long).map_err(|_| LiteralError::Overflow),
        NumberSuffix::None => match i32::try_from(value) {
            Ok(v) => Ok(Literal::Int(v)),
            Err(_) => i64::try_from(value).map(Literal::Long).map_err(|_| LiteralError::Overflow),
        },
        NumberSuffix::Float | NumberSuffix::Double => Err(LiteralError::Malformed),
    }
}

#[derive(Debug, Clone, Copy)]
enum Num {
    Int(i64, bool),
    Float(f64, bool),
}

fn as_num(lit: &Literal<'_>) -> Option<Num> {
    Some(match *lit {
        Literal::Byte(v) => Num::Int(i64::from(v), false),
        Literal::Short(v) => Num::Int(i64::from(v), false),
        Literal::Int(v) => Num::Int(i64::from(v), false),
        Literal::Long(v) => Num::Int(v, true),
        Literal::Float(v) => Num::Float(f64::from(v), false),
        Literal::Double(v) => Num::Float(v, true),
        _ => return None,
    })
}

fn int_literal<'a>(value: i64, long: bool) -> Result<Literal<'a>, FoldError> {
    if long {
        Ok(Literal::Long(value))
    } else {
        i32::try_from(value).map(Literal::Int).map_err(|_| FoldError::Overflow)
    }
}

/// Fold `lhs op rhs`. `None` when the pair is not foldable.
pub fn fold_binary<'a>(op: BinaryOp, lhs: &Literal<'a>, rhs: &Literal<'a>) -> Option<Result<Literal<'a>, FoldError>> {
    if let (Literal::Bool(l), Literal::Bool(r)) = (lhs, rhs) {
        return Some(Ok(Literal::Bool(match op {
            BinaryOp::And => *l && *r,
            BinaryOp::Or => *l || *r,
            BinaryOp::Eq => l == r,
            BinaryOp::Ne => l != r,
            _ => return None,
        })));
    }

    match (as_num(lhs)?, as_num(rhs)?) {
        (Num::Int(l, ll), Num::Int(r, rl)) => {
            let long = ll || rl;
            let value = match op {
                BinaryOp::Add => l.checked_add(r),
                BinaryOp::Sub => l.checked_sub(r),
                BinaryOp::Mul => l.checked_mul(r),
                BinaryOp::Div | BinaryOp::Mod if r == 0 => return Some(Err(FoldError::DivisionByZero)),
                BinaryOp::Div => l.checked_div(r),
                BinaryOp::Mod => l.checked_rem(r),
                BinaryOp::BitAnd => Some(l & r),
                BinaryOp::BitOr => Some(l | r),
                BinaryOp::BitXor => Some(l ^ r),
                BinaryOp::Shl | BinaryOp::Shr => return None,
                _ => return Some(Ok(Literal::Bool(compare(op, l.cmp(&r))?))),
            };
            Some(value.ok_or(FoldError::Overflow).and_then(|v| int_literal(v, long)))
        }
        (l, r) => {
            let (l, lw) = float_of(l);
            let (r, rw) = float_of(r);
            let wide = lw || rw;
            let value = match op {
                BinaryOp::Add => l + r,
                BinaryOp::Sub => l - r,
                BinaryOp::Mul => l * r,
                BinaryOp::Div if r == 0.0 => return Some(Err(FoldError::DivisionByZero)),
                BinaryOp::Div => l / r,
                BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                    return Some(Ok(Literal::Bool(compare(op, l.partial_cmp(&r)?)?)));
                }
                _ => return None,
            };
            Some(Ok(if wide {
                Literal::Double(value)
            } else {
                Literal::Float(value as f32)
            }))
        }
    }
}

fn float_of(num: Num) -> (f64, bool) {
    match num {
        Num::Int(v, _) => (v as f64, false),
        Num::Float(v, wide) => (v, wide),
    }
}

fn compare(op: BinaryOp, ordering: std::cmp::Ordering) -> Option<bool> {
    use std::cmp::Ordering::*;
    Some(match op {
        BinaryOp::Eq => ordering == Equal,
        BinaryOp::Ne => ordering != Equal,
        BinaryOp::Lt => ordering == Less,
        BinaryOp::Le => ordering != Greater,
        BinaryOp::Gt => ordering == Greater,
        BinaryOp::Ge => ordering != Less,
        _ => return None,
    })
}

pub fn fold_unary<'a>(op: UnaryOp, operand: &Literal<'a>) -> Option<Literal<'a>> {
    Some(match (op, *operand) {
        (UnaryOp::Not, Literal::Bool(v)) => Literal::Bool(!v),
        (UnaryOp::Neg, Literal::Int(v)) => Literal::Int(v.checked_neg()?),
        (UnaryOp::Neg, Literal::Long(v)) => Literal::Long(v.checked_neg()?),
        (UnaryOp::Neg, Literal::Float(v)) => Literal::Float(-v),
        (UnaryOp::Neg, Literal::Double(v)) => Literal::Double(-v),
        (UnaryOp::BitNot, Literal::Int(v)) => Literal::Int(!v),
        (UnaryOp::BitNot, Literal::Long(v)) => Literal::Long(!v),
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evaluates_bases() {
        assert_eq!(evaluate_number("ff", 16, NumberSuffix::None), Ok(Literal::Int(255)));
        assert_eq!(evaluate_number("1_000", 10, NumberSuffix::None), Ok(Literal::Int(1000)));
        assert_eq!(evaluate_number("101", 2, NumberSuffix::Byte), Ok(Literal::Byte(5)));
        assert_eq!(evaluate_number("2.5", 10, NumberSuffix::None), Ok(Literal::Double(2.5)));
    }

    #[test]
    fn test_digit_beyond_base_is_malformed() {
        assert_eq!(evaluate_number("12", 2, NumberSuffix::None), Err(LiteralError::Malformed));
        assert_eq!(evaluate_number("9", 8, NumberSuffix::None), Err(LiteralError::Malformed));
    }

    #[test]
    fn test_overflow() {
        assert_eq!(evaluate_number("256", 10, NumberSuffix::Byte), Err(LiteralError::Overflow));
        assert_eq!(
            evaluate_number("3000000000", 10, NumberSuffix::None),
            Ok(Literal::Long(3_000_000_000))
        );
        assert_eq!(
            evaluate_number("99999999999999999999", 10, NumberSuffix::None),
            Err(LiteralError::Overflow)
        );
    }

    #[test]
    fn test_fold_integers() {
        assert_eq!(
            fold_binary(BinaryOp::Mul, &Literal::Int(6), &Literal::Int(7)),
            Some(Ok(Literal::Int(42)))
        );
        assert_eq!(
            fold_binary(BinaryOp::Div, &Literal::Int(1), &Literal::Int(0)),
            Some(Err(FoldError::DivisionByZero))
        );
        assert_eq!(
            fold_binary(BinaryOp::Add, &Literal::Int(i32::MAX), &Literal::Int(1)),
            Some(Err(FoldError::Overflow))
        );
        assert_eq!(
            fold_binary(BinaryOp::Lt, &Literal::Int(1), &Literal::Long(2)),
            Some(Ok(Literal::Bool(true)))
        );
    }

    #[test]
    fn test_fold_booleans_and_mixed() {
        assert_eq!(
            fold_binary(BinaryOp::And, &Literal::Bool(true), &Literal::Bool(false)),
            Some(Ok(Literal::Bool(false)))
        );
        assert_eq!(
            fold_binary(BinaryOp::Add, &Literal::Int(1), &Literal::Double(0.5)),
            Some(Ok(Literal::Double(1.5)))
        );
        assert_eq!(fold_binary(BinaryOp::Add, &Literal::Str("a"), &Literal::Int(1)), None);
    }
}
