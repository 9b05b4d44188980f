//! The per-module function table.
//!
//! Blocks are kept in insertion order (nested functions first, `__main__`
//! last) so the persisted artifact round-trips byte-for-byte and linking
//! is deterministic.

use crate::instruction::Instruction;
use indexmap::IndexMap;
use quill_core::{QuillError, RuntimeErrorKind};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Named instruction blocks, one per function body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FunctionTable {
    blocks: IndexMap<String, Vec<Instruction>>,
}

impl FunctionTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a block. Signatures are generated, so a duplicate is an
    /// internal invariant violation.
    pub fn insert(
        &mut self,
        signature: String,
        instructions: Vec<Instruction>,
    ) -> Result<(), QuillError> {
        if self
            .blocks
            .insert(signature.clone(), instructions)
            .is_some()
        {
            return Err(QuillError::internal(format!(
                "duplicate function signature '{signature}'"
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn get(&self, signature: &str) -> Option<&[Instruction]> {
        self.blocks.get(signature).map(Vec::as_slice)
    }

    #[must_use]
    pub fn contains(&self, signature: &str) -> bool {
        self.blocks.contains_key(signature)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Instruction])> {
        self.blocks.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Flatten every block into one instruction array with a
    /// signature-to-entry-offset table.
    #[must_use]
    pub fn link(&self) -> ModuleCode {
        let mut instructions = Vec::new();
        let mut offsets = FxHashMap::default();
        for (signature, block) in &self.blocks {
            offsets.insert(signature.clone(), instructions.len());
            instructions.extend(block.iter().cloned());
        }
        ModuleCode {
            instructions,
            offsets,
        }
    }

    /// Serialize to the persisted JSON artifact.
    pub fn export_json(&self) -> Result<String, QuillError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| QuillError::internal(format!("bytecode export failed: {e}")))
    }

    /// Deserialize a persisted artifact.
    pub fn import_json(json: &str) -> Result<Self, QuillError> {
        serde_json::from_str(json).map_err(|e| {
            QuillError::runtime(
                RuntimeErrorKind::ImportError,
                format!("malformed bytecode: {e}"),
            )
        })
    }
}

/// A linked module: the flat instruction array plus entry offsets.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleCode {
    pub instructions: Vec<Instruction>,
    pub offsets: FxHashMap<String, usize>,
}

impl ModuleCode {
    /// Entry offset of a signature.
    pub fn entry(&self, signature: &str) -> Result<usize, QuillError> {
        self.offsets.get(signature).copied().ok_or_else(|| {
            QuillError::internal(format!("unknown function signature '{signature}'"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FunctionTable {
        let mut table = FunctionTable::new();
        table
            .insert(
                "__main__::__function_0__".into(),
                vec![Instruction::GetVal("x".into()), Instruction::Return],
            )
            .unwrap();
        table
            .insert(
                "__main__".into(),
                vec![
                    Instruction::LoadInt(1),
                    Instruction::LetVal("x".into()),
                    Instruction::Return,
                ],
            )
            .unwrap();
        table
    }

    #[test]
    fn test_duplicate_signature_rejected() {
        let mut table = sample();
        assert!(table.insert("__main__".into(), Vec::new()).is_err());
    }

    #[test]
    fn test_link_offsets() {
        let linked = sample().link();
        assert_eq!(linked.instructions.len(), 5);
        assert_eq!(linked.entry("__main__::__function_0__").unwrap(), 0);
        assert_eq!(linked.entry("__main__").unwrap(), 2);
        assert!(linked.entry("nope").is_err());
    }

    #[test]
    fn test_export_import_round_trip() {
        let table = sample();
        let json = table.export_json().unwrap();
        let back = FunctionTable::import_json(&json).unwrap();
        assert_eq!(back, table);
        // Lossless: exporting the reimported table reproduces the artifact.
        assert_eq!(back.export_json().unwrap(), json);
    }

    #[test]
    fn test_import_error_kind() {
        let err = FunctionTable::import_json("{ not json").unwrap_err();
        assert!(err.to_string().starts_with("ImportError"));
    }
}
