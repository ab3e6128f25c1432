//! Expression trees: arena-allocated nodes, statement roots, branch labels.

use std::fmt;

use crate::{Opcode, PayloadKind, SymRef, SymbolTable};

/// Handle to a node in a [`Tree`]'s arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(pub u32);

impl NodeId {
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Branch target. Labels are bound to positions in the root list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LabelId(pub u32);

impl LabelId {
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Debug)]
pub struct SwitchCases {
    pub cases: Box<[(i32, LabelId)]>,
    pub default: LabelId,
}

#[derive(Clone, Debug)]
pub enum Payload {
    None,
    Int(i64),
    Float(f32),
    Double(f64),
    Sym(SymRef),
    Offset(i32),
    Label(LabelId),
    Cases(SwitchCases),
    Lanes([u8; 4]),
}

impl Payload {
    fn kind(&self) -> PayloadKind {
        match self {
            Payload::None => PayloadKind::None,
            Payload::Int(_) => PayloadKind::Int,
            Payload::Float(_) => PayloadKind::Float,
            Payload::Double(_) => PayloadKind::Double,
            Payload::Sym(_) => PayloadKind::Sym,
            Payload::Offset(_) => PayloadKind::Offset,
            Payload::Label(_) => PayloadKind::Label,
            Payload::Cases(_) => PayloadKind::Cases,
            Payload::Lanes(_) => PayloadKind::Lanes,
        }
    }
}

/// One IR operation: an opcode, its children, and an optional payload.
///
/// Nodes carry no evaluation state; the backend's `CodeGenerator` keeps the
/// evaluated flag, remaining-use counts, and cached result registers in side
/// tables so a tree can be lowered more than once.
#[derive(Clone, Debug)]
pub struct Node {
    opcode: Opcode,
    children: Box<[NodeId]>,
    payload: Payload,
}

impl Node {
    #[must_use]
    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    #[must_use]
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    #[must_use]
    pub fn child(&self, i: usize) -> NodeId {
        self.children[i]
    }

    #[must_use]
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Integer payload (constants). Panics if the payload is not an int.
    #[must_use]
    pub fn int_value(&self) -> i64 {
        match self.payload {
            Payload::Int(v) => v,
            _ => panic!("{} has no integer payload", self.opcode.name()),
        }
    }

    #[must_use]
    pub fn float_value(&self) -> f32 {
        match self.payload {
            Payload::Float(v) => v,
            _ => panic!("{} has no float payload", self.opcode.name()),
        }
    }

    #[must_use]
    pub fn double_value(&self) -> f64 {
        match self.payload {
            Payload::Double(v) => v,
            _ => panic!("{} has no double payload", self.opcode.name()),
        }
    }

    #[must_use]
    pub fn sym(&self) -> SymRef {
        match self.payload {
            Payload::Sym(s) => s,
            _ => panic!("{} has no symbol payload", self.opcode.name()),
        }
    }

    #[must_use]
    pub fn offset(&self) -> i32 {
        match self.payload {
            Payload::Offset(d) => d,
            _ => panic!("{} has no offset payload", self.opcode.name()),
        }
    }

    #[must_use]
    pub fn label(&self) -> LabelId {
        match self.payload {
            Payload::Label(l) => l,
            _ => panic!("{} has no label payload", self.opcode.name()),
        }
    }

    #[must_use]
    pub fn cases(&self) -> &SwitchCases {
        match &self.payload {
            Payload::Cases(c) => c,
            _ => panic!("{} has no cases payload", self.opcode.name()),
        }
    }

    #[must_use]
    pub fn lanes(&self) -> [u8; 4] {
        match self.payload {
            Payload::Lanes(l) => l,
            _ => panic!("{} has no lanes payload", self.opcode.name()),
        }
    }
}

/// One compilation unit's IR: the node arena, the ordered statement (root)
/// list the backend walks, label bindings, and the symbol table.
#[derive(Clone, Debug, Default)]
pub struct Tree {
    nodes: Vec<Node>,
    roots: Vec<NodeId>,
    // Label -> position in `roots` the label precedes (may equal
    // `roots.len()` for an end label). `None` until placed.
    labels: Vec<Option<usize>>,
    pub symbols: SymbolTable,
}

impl Tree {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a payload-free node. Arity is checked eagerly: handing a
    /// malformed tree to a backend is an IR-construction bug, not a
    /// recoverable condition.
    pub fn node(&mut self, opcode: Opcode, children: &[NodeId]) -> NodeId {
        self.node_with(opcode, children, Payload::None)
    }

    pub fn node_with(&mut self, opcode: Opcode, children: &[NodeId], payload: Payload) -> NodeId {
        if opcode.is_variadic() {
            assert!(
                children.len() >= opcode.arity(),
                "{} takes at least {} children, got {}",
                opcode.name(),
                opcode.arity(),
                children.len()
            );
        } else {
            assert!(
                children.len() == opcode.arity(),
                "{} takes {} children, got {}",
                opcode.name(),
                opcode.arity(),
                children.len()
            );
        }
        assert!(
            payload.kind() == opcode.payload_kind(),
            "{} expects a {:?} payload, got {:?}",
            opcode.name(),
            opcode.payload_kind(),
            payload.kind()
        );
        for &c in children {
            assert!(c.index() < self.nodes.len(), "child {c} out of range");
        }

        let id = NodeId(u32::try_from(self.nodes.len()).expect("node id space exhausted"));
        self.nodes.push(Node {
            opcode,
            children: children.into(),
            payload,
        });
        id
    }

    // Convenience constructors for the common leaves.

    pub fn iconst(&mut self, v: i32) -> NodeId {
        self.node_with(Opcode::IConst, &[], Payload::Int(v as i64))
    }

    pub fn lconst(&mut self, v: i64) -> NodeId {
        self.node_with(Opcode::LConst, &[], Payload::Int(v))
    }

    pub fn fconst(&mut self, v: f32) -> NodeId {
        self.node_with(Opcode::FConst, &[], Payload::Float(v))
    }

    pub fn dconst(&mut self, v: f64) -> NodeId {
        self.node_with(Opcode::DConst, &[], Payload::Double(v))
    }

    pub fn aconst(&mut self, v: u64) -> NodeId {
        self.node_with(Opcode::AConst, &[], Payload::Int(v as i64))
    }

    #[must_use]
    pub fn get(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Appends a statement to the evaluation order.
    pub fn root(&mut self, id: NodeId) {
        assert!(id.index() < self.nodes.len(), "root {id} out of range");
        self.roots.push(id);
    }

    #[must_use]
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Reserves a label to be placed later with [`Tree::place_label`].
    pub fn def_label(&mut self) -> LabelId {
        let id = LabelId(u32::try_from(self.labels.len()).expect("label id space exhausted"));
        self.labels.push(None);
        id
    }

    /// Binds `label` to the position just before the next root appended.
    pub fn place_label(&mut self, label: LabelId) {
        let slot = &mut self.labels[label.index()];
        assert!(slot.is_none(), "label placed twice");
        *slot = Some(self.roots.len());
    }

    /// Root-list position a label is bound to. Panics on unplaced labels:
    /// a branch to nowhere is an IR-construction bug.
    #[must_use]
    pub fn label_position(&self, label: LabelId) -> usize {
        self.labels[label.index()]
            .unwrap_or_else(|| panic!("label {} was never placed", label.0))
    }

    #[must_use]
    pub fn label_count(&self) -> usize {
        self.labels.len()
    }

    /// Remaining-consumer count per node: one per parent edge plus one per
    /// root-list appearance. The backend decrements these as evaluators
    /// consume children; zero makes the node's result register reclaimable.
    #[must_use]
    pub fn use_counts(&self) -> Vec<u32> {
        let mut counts = vec![0u32; self.nodes.len()];
        for node in &self.nodes {
            for &c in node.children() {
                counts[c.index()] += 1;
            }
        }
        for &r in &self.roots {
            counts[r.index()] += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_subexpressions_are_counted_per_consumer() {
        let mut t = Tree::new();
        let a = t.iconst(1);
        let b = t.iconst(2);
        let sum = t.node(Opcode::IAdd, &[a, b]);
        let doubled = t.node(Opcode::IAdd, &[sum, sum]);
        t.root(doubled);

        let counts = t.use_counts();
        assert_eq!(counts[sum.index()], 2);
        assert_eq!(counts[a.index()], 1);
        assert_eq!(counts[doubled.index()], 1);
    }

    #[test]
    #[should_panic(expected = "takes 2 children")]
    fn arity_is_checked_eagerly() {
        let mut t = Tree::new();
        let a = t.iconst(1);
        let _ = t.node(Opcode::IAdd, &[a]);
    }

    #[test]
    #[should_panic(expected = "expects a Label payload")]
    fn payload_kind_is_checked_eagerly() {
        let mut t = Tree::new();
        let _ = t.node(Opcode::Goto, &[]);
    }

    #[test]
    fn labels_bind_to_root_positions() {
        let mut t = Tree::new();
        let l = t.def_label();
        let c = t.iconst(0);
        let ret = t.node(Opcode::IReturn, &[c]);
        t.place_label(l);
        t.root(ret);
        assert_eq!(t.label_position(l), 0);
    }
}
