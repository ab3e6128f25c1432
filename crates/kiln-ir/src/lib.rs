//! Kiln's IR surface: opcodes, data types, trees, and symbols.
//!
//! This crate is deliberately dependency-light. It defines the vocabulary the
//! lowering engine in `kiln-codegen` consumes:
//! - [`Opcode`]: the abstract operation tags, one dense numeric space shared by
//!   every backend's dispatch table.
//! - [`Tree`]/[`Node`]: an arena-allocated expression tree with an ordered
//!   statement (root) list and branch labels.
//! - [`SymbolTable`]: data and function symbols referenced by loads, stores,
//!   and calls.
//!
//! Trees are immutable once handed to a backend; all per-lowering state
//! (evaluation caches, use counts, result registers) lives in the backend's
//! `CodeGenerator`, so one tree can be lowered for several targets.

pub mod datatype;
pub mod node;
pub mod opcode;
pub mod symbol;

pub use datatype::DataType;
pub use node::{LabelId, Node, NodeId, Payload, SwitchCases, Tree};
pub use opcode::{Opcode, OpFlags, PayloadKind};
pub use symbol::{SymRef, Symbol, SymbolKind, SymbolTable};
