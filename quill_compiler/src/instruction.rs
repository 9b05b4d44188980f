//! The instruction set.
//!
//! Each instruction serializes as a single-entry map from its opcode name
//! to its operand (`null` for operand-less opcodes, a `[signature,
//! source-offset]` pair for lambda loads). That single-entry-map shape is
//! the persisted bytecode format and must round-trip losslessly.

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// One bytecode instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// Push `none`.
    LoadNone,
    /// Push an integer literal.
    LoadInt(i64),
    /// Push a float literal.
    LoadFloat(f64),
    /// Push a bool literal.
    LoadBool(bool),
    /// Push a string literal.
    LoadString(String),
    /// Pop a defaults tuple, push a Lambda for the named block.
    LoadLambda { signature: String, offset: u32 },
    /// Pop N values, push a Tuple (receiver wiring happens here).
    BuildTuple(u32),
    /// Pop value and key, push a KeyValue pair.
    BuildKeyVal,
    /// Pop value and key, push a Named pair.
    BuildNamed,
    /// Pop a value, push it boxed in a mutable cell.
    BuildWrap,
    /// Pop rhs and lhs, apply the named operator, push the result.
    BinaryOp(String),
    /// Pop one operand, apply the named sign operator, push the result.
    UnaryOp(String),
    /// Bind the top of stack (without popping) under a fresh name in the
    /// innermost frame.
    LetVal(String),
    /// Push the storage cell bound to a name.
    GetVal(String),
    /// Pop value and target location, write through, push the value.
    SetVal,
    /// Pop key and target, push a lazy attribute path.
    GetAttr,
    /// Pop index and target, push a lazy index path.
    IndexOf,
    /// Pop a pair (or lambda), push its key half (or parameter template).
    KeyOf,
    /// Pop a pair, push its value half.
    ValueOf,
    /// Pop a lambda, push its bound receiver.
    SelfOf,
    /// Pop an argument tuple and a callee, invoke.
    Call,
    /// Pop the result, unwind to the call boundary, resume the caller.
    Return,
    /// As `Return` with a synthesized `none` result.
    ReturnNone,
    /// Open a plain block frame.
    NewFrame,
    /// Close the innermost frame, preserving the top of stack.
    PopFrame,
    /// Unconditional relative jump.
    JumpOffset(i32),
    /// Pop a bool; relative jump when false.
    JumpIfFalse(i32),
    /// Truncate the operand stack to the innermost frame's entry depth.
    ResetStack,
    /// Pop a value, push a deep copy.
    CopyVal,
    /// Pop a location, push a Ref to it.
    RefVal,
    /// Pop a Ref, push the referenced location.
    DerefVal,
    /// Pop a bool, raise unless it is `true`.
    Assert,
    /// Record a source offset for diagnostics. No stack effect.
    DebugInfo(u32),
    /// Pop a path string, execute the module it names, push its export.
    Import,
}

impl Instruction {
    /// The serialized opcode name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::LoadNone => "LOAD_NONE",
            Self::LoadInt(_) => "LOAD_INT",
            Self::LoadFloat(_) => "LOAD_FLOAT",
            Self::LoadBool(_) => "LOAD_BOOL",
            Self::LoadString(_) => "LOAD_STRING",
            Self::LoadLambda { .. } => "LOAD_LAMBDA",
            Self::BuildTuple(_) => "BUILD_TUPLE",
            Self::BuildKeyVal => "BUILD_KEY_VAL",
            Self::BuildNamed => "BUILD_NAMED",
            Self::BuildWrap => "BUILD_WRAP",
            Self::BinaryOp(_) => "BINARY_OP",
            Self::UnaryOp(_) => "UNARY_OP",
            Self::LetVal(_) => "LET_VAL",
            Self::GetVal(_) => "GET_VAL",
            Self::SetVal => "SET_VAL",
            Self::GetAttr => "GET_ATTR",
            Self::IndexOf => "INDEX_OF",
            Self::KeyOf => "KEY_OF",
            Self::ValueOf => "VALUE_OF",
            Self::SelfOf => "SELF_OF",
            Self::Call => "CALL",
            Self::Return => "RETURN",
            Self::ReturnNone => "RETURN_NONE",
            Self::NewFrame => "NEW_FRAME",
            Self::PopFrame => "POP_FRAME",
            Self::JumpOffset(_) => "JUMP_OFFSET",
            Self::JumpIfFalse(_) => "JUMP_IF_FALSE",
            Self::ResetStack => "RESET_STACK",
            Self::CopyVal => "COPY_VAL",
            Self::RefVal => "REF_VAL",
            Self::DerefVal => "DEREF_VAL",
            Self::Assert => "ASSERT",
            Self::DebugInfo(_) => "DEBUG_INFO",
            Self::Import => "IMPORT",
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LoadInt(v) => write!(f, "LOAD_INT {v}"),
            Self::LoadFloat(v) => write!(f, "LOAD_FLOAT {v}"),
            Self::LoadBool(v) => write!(f, "LOAD_BOOL {v}"),
            Self::LoadString(v) => write!(f, "LOAD_STRING {v:?}"),
            Self::LoadLambda { signature, offset } => {
                write!(f, "LOAD_LAMBDA {signature} @{offset}")
            }
            Self::BuildTuple(n) => write!(f, "BUILD_TUPLE {n}"),
            Self::BinaryOp(op) => write!(f, "BINARY_OP {op}"),
            Self::UnaryOp(op) => write!(f, "UNARY_OP {op}"),
            Self::LetVal(name) => write!(f, "LET_VAL {name}"),
            Self::GetVal(name) => write!(f, "GET_VAL {name}"),
            Self::JumpOffset(off) => write!(f, "JUMP_OFFSET {off:+}"),
            Self::JumpIfFalse(off) => write!(f, "JUMP_IF_FALSE {off:+}"),
            Self::DebugInfo(off) => write!(f, "DEBUG_INFO {off}"),
            other => f.write_str(other.name()),
        }
    }
}

impl Serialize for Instruction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        match self {
            Self::LoadInt(v) => map.serialize_entry(self.name(), v)?,
            Self::LoadFloat(v) => map.serialize_entry(self.name(), v)?,
            Self::LoadBool(v) => map.serialize_entry(self.name(), v)?,
            Self::LoadString(v) | Self::BinaryOp(v) | Self::UnaryOp(v) | Self::LetVal(v)
            | Self::GetVal(v) => map.serialize_entry(self.name(), v)?,
            Self::LoadLambda { signature, offset } => {
                map.serialize_entry(self.name(), &(signature, offset))?;
            }
            Self::BuildTuple(n) => map.serialize_entry(self.name(), n)?,
            Self::JumpOffset(off) | Self::JumpIfFalse(off) => {
                map.serialize_entry(self.name(), off)?;
            }
            Self::DebugInfo(off) => map.serialize_entry(self.name(), off)?,
            other => map.serialize_entry(other.name(), &())?,
        }
        map.end()
    }
}

struct InstructionVisitor;

impl<'de> Visitor<'de> for InstructionVisitor {
    type Value = Instruction;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a single-entry map from opcode name to operand")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let Some(opcode) = map.next_key::<String>()? else {
            return Err(de::Error::invalid_length(0, &self));
        };
        let instruction = match opcode.as_str() {
            "LOAD_NONE" => {
                map.next_value::<()>()?;
                Instruction::LoadNone
            }
            "LOAD_INT" => Instruction::LoadInt(map.next_value()?),
            "LOAD_FLOAT" => Instruction::LoadFloat(map.next_value()?),
            "LOAD_BOOL" => Instruction::LoadBool(map.next_value()?),
            "LOAD_STRING" => Instruction::LoadString(map.next_value()?),
            "LOAD_LAMBDA" => {
                let (signature, offset) = map.next_value::<(String, u32)>()?;
                Instruction::LoadLambda { signature, offset }
            }
            "BUILD_TUPLE" => Instruction::BuildTuple(map.next_value()?),
            "BUILD_KEY_VAL" => {
                map.next_value::<()>()?;
                Instruction::BuildKeyVal
            }
            "BUILD_NAMED" => {
                map.next_value::<()>()?;
                Instruction::BuildNamed
            }
            "BUILD_WRAP" => {
                map.next_value::<()>()?;
                Instruction::BuildWrap
            }
            "BINARY_OP" => Instruction::BinaryOp(map.next_value()?),
            "UNARY_OP" => Instruction::UnaryOp(map.next_value()?),
            "LET_VAL" => Instruction::LetVal(map.next_value()?),
            "GET_VAL" => Instruction::GetVal(map.next_value()?),
            "SET_VAL" => {
                map.next_value::<()>()?;
                Instruction::SetVal
            }
            "GET_ATTR" => {
                map.next_value::<()>()?;
                Instruction::GetAttr
            }
            "INDEX_OF" => {
                map.next_value::<()>()?;
                Instruction::IndexOf
            }
            "KEY_OF" => {
                map.next_value::<()>()?;
                Instruction::KeyOf
            }
            "VALUE_OF" => {
                map.next_value::<()>()?;
                Instruction::ValueOf
            }
            "SELF_OF" => {
                map.next_value::<()>()?;
                Instruction::SelfOf
            }
            "CALL" => {
                map.next_value::<()>()?;
                Instruction::Call
            }
            "RETURN" => {
                map.next_value::<()>()?;
                Instruction::Return
            }
            "RETURN_NONE" => {
                map.next_value::<()>()?;
                Instruction::ReturnNone
            }
            "NEW_FRAME" => {
                map.next_value::<()>()?;
                Instruction::NewFrame
            }
            "POP_FRAME" => {
                map.next_value::<()>()?;
                Instruction::PopFrame
            }
            "JUMP_OFFSET" => Instruction::JumpOffset(map.next_value()?),
            "JUMP_IF_FALSE" => Instruction::JumpIfFalse(map.next_value()?),
            "RESET_STACK" => {
                map.next_value::<()>()?;
                Instruction::ResetStack
            }
            "COPY_VAL" => {
                map.next_value::<()>()?;
                Instruction::CopyVal
            }
            "REF_VAL" => {
                map.next_value::<()>()?;
                Instruction::RefVal
            }
            "DEREF_VAL" => {
                map.next_value::<()>()?;
                Instruction::DerefVal
            }
            "ASSERT" => {
                map.next_value::<()>()?;
                Instruction::Assert
            }
            "DEBUG_INFO" => Instruction::DebugInfo(map.next_value()?),
            "IMPORT" => {
                map.next_value::<()>()?;
                Instruction::Import
            }
            other => {
                return Err(de::Error::unknown_variant(
                    other,
                    &["LOAD_NONE", "LOAD_INT", "CALL", "..."],
                ))
            }
        };
        if map.next_key::<String>()?.is_some() {
            return Err(de::Error::custom("instruction map must have one entry"));
        }
        Ok(instruction)
    }
}

impl<'de> Deserialize<'de> for Instruction {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(InstructionVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_shapes() {
        let json = serde_json::to_string(&Instruction::LoadInt(42)).unwrap();
        assert_eq!(json, r#"{"LOAD_INT":42}"#);
        let json = serde_json::to_string(&Instruction::Call).unwrap();
        assert_eq!(json, r#"{"CALL":null}"#);
        let json = serde_json::to_string(&Instruction::LoadLambda {
            signature: "__main__::__function_0__".into(),
            offset: 7,
        })
        .unwrap();
        assert_eq!(json, r#"{"LOAD_LAMBDA":["__main__::__function_0__",7]}"#);
    }

    #[test]
    fn test_round_trip() {
        let instructions = vec![
            Instruction::LoadNone,
            Instruction::LoadInt(-3),
            Instruction::LoadFloat(2.5),
            Instruction::LoadBool(true),
            Instruction::LoadString("hi".into()),
            Instruction::LoadLambda {
                signature: "m::__function_1__".into(),
                offset: 12,
            },
            Instruction::BuildTuple(3),
            Instruction::BinaryOp("+".into()),
            Instruction::UnaryOp("-".into()),
            Instruction::LetVal("x".into()),
            Instruction::GetVal("x".into()),
            Instruction::SetVal,
            Instruction::JumpOffset(-4),
            Instruction::JumpIfFalse(2),
            Instruction::DebugInfo(99),
            Instruction::Import,
        ];
        let json = serde_json::to_string(&instructions).unwrap();
        let back: Vec<Instruction> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, instructions);
    }

    #[test]
    fn test_unknown_opcode_rejected() {
        assert!(serde_json::from_str::<Instruction>(r#"{"NO_SUCH_OP":null}"#).is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(Instruction::LoadInt(1).to_string(), "LOAD_INT 1");
        assert_eq!(Instruction::JumpOffset(-2).to_string(), "JUMP_OFFSET -2");
        assert_eq!(Instruction::JumpIfFalse(3).to_string(), "JUMP_IF_FALSE +3");
        assert_eq!(Instruction::Call.to_string(), "CALL");
    }
}
