//! Set-algebra wire types.
//!
//! These types describe range/set queries evaluated by the query layer;
//! the core stores and routes them opaquely, so they live here only as
//! part of the wire surface.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How the key sets of the sources are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum SetOpType {
    Union = 0,
    Intersection = 1,
    Difference = 2,
    Xor = 3,
}

impl SetOpType {
    /// Decode a wire value. An unknown value is a programmer error.
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => SetOpType::Union,
            1 => SetOpType::Intersection,
            2 => SetOpType::Difference,
            3 => SetOpType::Xor,
            other => panic!("unknown SetOpType {}", other),
        }
    }
}

impl fmt::Display for SetOpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SetOpType::Union => "U",
            SetOpType::Intersection => "I",
            SetOpType::Difference => "D",
            SetOpType::Xor => "X",
        })
    }
}

/// How the value lists of matching keys are merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum SetOpMerge {
    Append = 0,
    ConCat = 1,
    IntegerSum = 2,
    IntegerSub = 3,
    IntegerDiv = 4,
    IntegerMul = 5,
    FloatSum = 6,
    FloatSub = 7,
    FloatDiv = 8,
    FloatMul = 9,
    BigIntAdd = 10,
    BigIntAndNot = 11,
    BigIntDiv = 12,
    BigIntMod = 13,
    BigIntMul = 14,
    BigIntOr = 15,
    BigIntRem = 16,
    BigIntSub = 17,
    BigIntXor = 18,
}

impl SetOpMerge {
    /// Decode a wire value. An unknown value is a programmer error.
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => SetOpMerge::Append,
            1 => SetOpMerge::ConCat,
            2 => SetOpMerge::IntegerSum,
            3 => SetOpMerge::IntegerSub,
            4 => SetOpMerge::IntegerDiv,
            5 => SetOpMerge::IntegerMul,
            6 => SetOpMerge::FloatSum,
            7 => SetOpMerge::FloatSub,
            8 => SetOpMerge::FloatDiv,
            9 => SetOpMerge::FloatMul,
            10 => SetOpMerge::BigIntAdd,
            11 => SetOpMerge::BigIntAndNot,
            12 => SetOpMerge::BigIntDiv,
            13 => SetOpMerge::BigIntMod,
            14 => SetOpMerge::BigIntMul,
            15 => SetOpMerge::BigIntOr,
            16 => SetOpMerge::BigIntRem,
            17 => SetOpMerge::BigIntSub,
            18 => SetOpMerge::BigIntXor,
            other => panic!("unknown SetOpMerge {}", other),
        }
    }
}

impl fmt::Display for SetOpMerge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SetOpMerge::Append => "Append",
            SetOpMerge::ConCat => "ConCat",
            SetOpMerge::IntegerSum => "IntegerSum",
            SetOpMerge::IntegerSub => "IntegerSub",
            SetOpMerge::IntegerDiv => "IntegerDiv",
            SetOpMerge::IntegerMul => "IntegerMul",
            SetOpMerge::FloatSum => "FloatSum",
            SetOpMerge::FloatSub => "FloatSub",
            SetOpMerge::FloatDiv => "FloatDiv",
            SetOpMerge::FloatMul => "FloatMul",
            SetOpMerge::BigIntAdd => "BigIntAdd",
            SetOpMerge::BigIntAndNot => "BigIntAndNot",
            SetOpMerge::BigIntDiv => "BigIntDiv",
            SetOpMerge::BigIntMod => "BigIntMod",
            SetOpMerge::BigIntMul => "BigIntMul",
            SetOpMerge::BigIntOr => "BigIntOr",
            SetOpMerge::BigIntRem => "BigIntRem",
            SetOpMerge::BigIntSub => "BigIntSub",
            SetOpMerge::BigIntXor => "BigIntXor",
        })
    }
}

/// One input to a set operation: a stored key or a nested operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SetOpSource {
    Key(Vec<u8>),
    Op(Box<SetOp>),
}

impl fmt::Display for SetOpSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetOpSource::Key(key) => write!(f, "{}", String::from_utf8_lossy(key)),
            SetOpSource::Op(op) => write!(f, "{}", op),
        }
    }
}

/// A set operation over stored keys and nested operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetOp {
    pub sources: Vec<SetOpSource>,
    pub op: SetOpType,
    pub merge: SetOpMerge,
}

impl fmt::Display for SetOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sources: Vec<String> = self.sources.iter().map(|s| s.to_string()).collect();
        write!(f, "({} {})", self.op, sources.join(" "))
    }
}

/// A set operation plus the range and destination it applies to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetExpression {
    pub op: SetOp,
    pub min: Vec<u8>,
    pub max: Vec<u8>,
    pub min_inc: bool,
    pub max_inc: bool,
    pub len: usize,
    pub dest: Vec<u8>,
}

/// One row of a set operation result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetOpResult {
    pub key: Vec<u8>,
    pub values: Vec<Vec<u8>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_rendering() {
        assert_eq!(SetOpType::Union.to_string(), "U");
        assert_eq!(SetOpType::Intersection.to_string(), "I");
        assert_eq!(SetOpType::Difference.to_string(), "D");
        assert_eq!(SetOpType::Xor.to_string(), "X");
    }

    #[test]
    fn test_merge_rendering() {
        assert_eq!(SetOpMerge::Append.to_string(), "Append");
        assert_eq!(SetOpMerge::FloatMul.to_string(), "FloatMul");
        assert_eq!(SetOpMerge::BigIntXor.to_string(), "BigIntXor");
    }

    #[test]
    fn test_from_u8_roundtrip() {
        for v in 0..4u8 {
            assert_eq!(SetOpType::from_u8(v) as u8, v);
        }
        for v in 0..19u8 {
            assert_eq!(SetOpMerge::from_u8(v) as u8, v);
        }
    }

    #[test]
    #[should_panic(expected = "unknown SetOpType")]
    fn test_unknown_type_fails_fast() {
        SetOpType::from_u8(4);
    }

    #[test]
    #[should_panic(expected = "unknown SetOpMerge")]
    fn test_unknown_merge_fails_fast() {
        SetOpMerge::from_u8(19);
    }

    #[test]
    fn test_op_rendering() {
        let op = SetOp {
            sources: vec![
                SetOpSource::Key(b"a".to_vec()),
                SetOpSource::Op(Box::new(SetOp {
                    sources: vec![
                        SetOpSource::Key(b"b".to_vec()),
                        SetOpSource::Key(b"c".to_vec()),
                    ],
                    op: SetOpType::Intersection,
                    merge: SetOpMerge::Append,
                })),
            ],
            op: SetOpType::Union,
            merge: SetOpMerge::Append,
        };
        assert_eq!(op.to_string(), "(U a (I b c))");
    }
}
