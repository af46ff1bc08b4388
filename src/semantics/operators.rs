//! Static operand-kind validation for operators.
//!
//! Only the kinds of the operands are checked. An operand whose type is
//! unknown, or a named (user-declared) type, is always accepted.

use crate::ast::{BinaryOp, DataType, OperatorCategory, PrimitiveType, UnaryOp};

/// Operand kind as far as operator validation cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Unknown,
    Null,
    Bool,
    Str,
    Integral,
    Floating,
    Char,
    Void,
}

fn kind_of(ty: Option<DataType<'_>>) -> Kind {
    match ty {
        None | Some(DataType::Named(_)) => Kind::Unknown,
        Some(DataType::Null) => Kind::Null,
        Some(DataType::Primitive(p)) => match p {
            PrimitiveType::Bool => Kind::Bool,
            PrimitiveType::String => Kind::Str,
            PrimitiveType::Char => Kind::Char,
            PrimitiveType::Void => Kind::Void,
            PrimitiveType::Float | PrimitiveType::Double => Kind::Floating,
            PrimitiveType::Int | PrimitiveType::Long | PrimitiveType::Short | PrimitiveType::Byte => {
                Kind::Integral
            }
        },
    }
}

fn is_numeric(kind: Kind) -> bool {
    matches!(kind, Kind::Integral | Kind::Floating | Kind::Char)
}

fn is_primitive(kind: Kind) -> bool {
    !matches!(kind, Kind::Unknown | Kind::Null)
}

/// Whether `lhs op rhs` is a meaningful combination of operand kinds.
pub fn binary_operands_valid(op: BinaryOp, lhs: Option<DataType<'_>>, rhs: Option<DataType<'_>>) -> bool {
    let (l, r) = (kind_of(lhs), kind_of(rhs));
    if l == Kind::Void || r == Kind::Void {
        return false;
    }
    let each = |f: fn(Kind) -> bool| (l == Kind::Unknown || f(l)) && (r == Kind::Unknown || f(r));

    match op.category() {
        OperatorCategory::Comparison => each(is_numeric),
        OperatorCategory::Arithmetic => {
            if op == BinaryOp::Add && (l == Kind::Str || r == Kind::Str) {
                return l != Kind::Null && r != Kind::Null && l != Kind::Bool && r != Kind::Bool;
            }
            each(is_numeric)
        }
        OperatorCategory::Logical => each(|k| k == Kind::Bool),
        OperatorCategory::Bitwise => each(|k| matches!(k, Kind::Integral | Kind::Char)),
        OperatorCategory::Equality => match (l, r) {
            (Kind::Unknown, _) | (_, Kind::Unknown) => true,
            (Kind::Null, Kind::Null) => true,
            (Kind::Null, other) | (other, Kind::Null) => !is_primitive(other) || other == Kind::Str,
            (Kind::Bool, other) | (other, Kind::Bool) => other == Kind::Bool,
            (Kind::Str, other) | (other, Kind::Str) => other == Kind::Str,
            _ => true,
        },
    }
}

pub fn unary_operand_valid(op: UnaryOp, operand: Option<DataType<'_>>) -> bool {
    match kind_of(operand) {
        Kind::Unknown => true,
        kind => match op {
            UnaryOp::Neg => matches!(kind, Kind::Integral | Kind::Floating),
            UnaryOp::Not => kind == Kind::Bool,
            UnaryOp::BitNot => kind == Kind::Integral,
        },
    }
}

fn rank(p: PrimitiveType) -> u8 {
    match p {
        PrimitiveType::Byte => 1,
        PrimitiveType::Short => 2,
        PrimitiveType::Char | PrimitiveType::Int => 3,
        PrimitiveType::Long => 4,
        PrimitiveType::Float => 5,
        PrimitiveType::Double => 6,
        _ => 0,
    }
}

/// Type of a valid binary expression, when it can be told from the operands.
pub fn binary_result_type<'a>(
    op: BinaryOp,
    lhs: Option<DataType<'a>>,
    rhs: Option<DataType<'a>>,
) -> Option<DataType<'a>> {
    match op.category() {
        OperatorCategory::Comparison | OperatorCategory::Equality | OperatorCategory::Logical => {
            Some(DataType::Primitive(PrimitiveType::Bool))
        }
        OperatorCategory::Arithmetic | OperatorCategory::Bitwise => {
            let (l, r) = (lhs?.primitive()?, rhs?.primitive()?);
            if l == PrimitiveType::String || r == PrimitiveType::String {
                return Some(DataType::Primitive(PrimitiveType::String));
            }
            // Narrow integers promote to int.
            let wider = if rank(l) >= rank(r) { l } else { r };
            let wider = if rank(wider) <= 3 { PrimitiveType::Int } else { wider };
            Some(DataType::Primitive(wider))
        }
    }
}

/// Human-readable operand kind for diagnostic arguments.
pub fn type_name(ty: Option<DataType<'_>>) -> String {
    match ty {
        None => "?".to_string(),
        Some(DataType::Null) => "null".to_string(),
        Some(DataType::Primitive(p)) => p.as_str().to_string(),
        Some(DataType::Named(path)) => path.join("."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOOL: Option<DataType<'static>> = Some(DataType::Primitive(PrimitiveType::Bool));
    const INT: Option<DataType<'static>> = Some(DataType::Primitive(PrimitiveType::Int));
    const DOUBLE: Option<DataType<'static>> = Some(DataType::Primitive(PrimitiveType::Double));
    const STR: Option<DataType<'static>> = Some(DataType::Primitive(PrimitiveType::String));
    const NULL: Option<DataType<'static>> = Some(DataType::Null);

    #[test]
    fn test_comparison_rejects_non_numeric() {
        assert!(binary_operands_valid(BinaryOp::Lt, INT, DOUBLE));
        assert!(!binary_operands_valid(BinaryOp::Lt, BOOL, BOOL));
        assert!(!binary_operands_valid(BinaryOp::Ge, STR, INT));
        assert!(!binary_operands_valid(BinaryOp::Gt, NULL, INT));
        assert!(binary_operands_valid(BinaryOp::Lt, None, INT));
    }

    #[test]
    fn test_logical_requires_bool() {
        assert!(binary_operands_valid(BinaryOp::And, BOOL, BOOL));
        assert!(!binary_operands_valid(BinaryOp::And, STR, BOOL));
        assert!(!binary_operands_valid(BinaryOp::Or, INT, BOOL));
    }

    #[test]
    fn test_string_concatenation_only_with_plus() {
        assert!(binary_operands_valid(BinaryOp::Add, STR, INT));
        assert!(!binary_operands_valid(BinaryOp::Sub, STR, INT));
        assert!(!binary_operands_valid(BinaryOp::Add, STR, NULL));
        assert_eq!(
            binary_result_type(BinaryOp::Add, STR, INT),
            Some(DataType::Primitive(PrimitiveType::String))
        );
    }

    #[test]
    fn test_equality_kinds() {
        assert!(binary_operands_valid(BinaryOp::Eq, INT, DOUBLE));
        assert!(!binary_operands_valid(BinaryOp::Eq, BOOL, INT));
        assert!(!binary_operands_valid(BinaryOp::Ne, NULL, INT));
        assert!(binary_operands_valid(BinaryOp::Eq, NULL, STR));
    }

    #[test]
    fn test_arithmetic_promotion() {
        let short = Some(DataType::Primitive(PrimitiveType::Short));
        assert_eq!(binary_result_type(BinaryOp::Mul, short, short), INT);
        assert_eq!(binary_result_type(BinaryOp::Add, INT, DOUBLE), DOUBLE);
    }
}
