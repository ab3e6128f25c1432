//! Data and function symbols.

use std::fmt;

use crate::DataType;

/// Reference to an entry in a [`SymbolTable`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SymRef(pub u32);

impl SymRef {
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for SymRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sym#{}", self.0)
    }
}

#[derive(Clone, Debug)]
pub enum SymbolKind {
    /// A data location at a fixed byte offset in the unit's flat memory.
    Data { offset: u32, ty: DataType },
    /// A callable function, addressed by its index in the host's function
    /// table. The index doubles as the value an indirect call target
    /// evaluates to.
    Func { index: u32 },
}

#[derive(Clone, Debug)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
}

/// Per-compilation-unit symbol table.
#[derive(Clone, Debug, Default)]
pub struct SymbolTable {
    syms: Vec<Symbol>,
}

impl SymbolTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn data(&mut self, name: impl Into<String>, offset: u32, ty: DataType) -> SymRef {
        self.push(Symbol {
            name: name.into(),
            kind: SymbolKind::Data { offset, ty },
        })
    }

    pub fn func(&mut self, name: impl Into<String>, index: u32) -> SymRef {
        self.push(Symbol {
            name: name.into(),
            kind: SymbolKind::Func { index },
        })
    }

    fn push(&mut self, sym: Symbol) -> SymRef {
        let r = SymRef(u32::try_from(self.syms.len()).expect("symbol table overflow"));
        self.syms.push(sym);
        r
    }

    #[must_use]
    pub fn get(&self, sym: SymRef) -> &Symbol {
        &self.syms[sym.index()]
    }

    /// Byte offset of a data symbol. Panics if `sym` names a function.
    #[must_use]
    pub fn data_offset(&self, sym: SymRef) -> u32 {
        match self.get(sym).kind {
            SymbolKind::Data { offset, .. } => offset,
            SymbolKind::Func { .. } => {
                panic!("symbol {} ({}) is not a data symbol", sym, self.get(sym).name)
            }
        }
    }

    /// Function-table index of a function symbol. Panics on data symbols.
    #[must_use]
    pub fn func_index(&self, sym: SymRef) -> u32 {
        match self.get(sym).kind {
            SymbolKind::Func { index } => index,
            SymbolKind::Data { .. } => {
                panic!("symbol {} ({}) is not a function", sym, self.get(sym).name)
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (SymRef, &Symbol)> {
        self.syms
            .iter()
            .enumerate()
            .map(|(i, s)| (SymRef(i as u32), s))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.syms.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.syms.is_empty()
    }
}
