// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Validated type descriptors.
//!
//! A [`TypeDescriptor`] owns the instruction stream and key descriptor of one
//! type. Construction runs a verifier over the program, so the interpreters
//! can follow jump targets and key paths without re-checking them. Anything
//! the verifier lets through is trusted from then on; wire data never is.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ops::{Adr, Case, Op, TypeCode};
use crate::core::{CodecError, Result as CoreResult, Value, XcdrVersion};

/// Reasons an instruction stream is rejected at registration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProgramError {
    /// The program has no instructions.
    #[error("instruction stream is empty")]
    Empty,

    /// A jump operand points past the end of the program.
    #[error("jump target {target} at op {at} is outside the program ({len} ops)")]
    JumpOutOfRange {
        /// Instruction holding the jump
        at: usize,
        /// Jump target
        target: usize,
        /// Program length
        len: usize,
    },

    /// An instruction of the wrong kind was found.
    #[error("op {at}: expected {expected}, found {found}")]
    UnexpectedOp {
        /// Offending instruction
        at: usize,
        /// What was expected there
        expected: &'static str,
        /// What was found
        found: &'static str,
    },

    /// A body runs off the end of the program without `RTS`.
    #[error("body starting at op {start} is not terminated by RTS")]
    Unterminated {
        /// Body start
        start: usize,
    },

    /// Enum or bitmask width outside the allowed set.
    #[error("op {at}: invalid {kind} width {width}")]
    BadWidth {
        /// Offending instruction
        at: usize,
        /// "enum" or "bitmask"
        kind: &'static str,
        /// Declared width
        width: u8,
    },

    /// Union discriminant is not an integral type of at most 4 bytes.
    #[error("op {at}: union discriminant must be an integral type of at most 4 bytes")]
    BadDiscriminant {
        /// Offending instruction
        at: usize,
    },

    /// More than one case of a union is marked default.
    #[error("op {at}: union has more than one default case")]
    MultipleDefaults {
        /// Offending instruction
        at: usize,
    },

    /// A structure contains itself by value.
    #[error("body at op {body} contains itself by value")]
    RecursiveType {
        /// Body on the cycle
        body: usize,
    },

    /// A key path is empty or does not follow nested members.
    #[error("key '{name}': {reason}")]
    BadKeyPath {
        /// Key field name
        name: String,
        /// What is wrong with the path
        reason: String,
    },

    /// A key field has a type that cannot be part of a key.
    #[error("op {at}: {type_name} cannot be a key field")]
    IllegalKeyType {
        /// Offending instruction
        at: usize,
        /// Type of the field
        type_name: &'static str,
    },
}

/// Entry of the key descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyField {
    /// Dotted field name, for diagnostics
    pub name: String,
    /// Index of the `KOF` instruction describing the path
    pub kof: usize,
    /// Canonical key position; keys are emitted in ascending order
    #[serde(default)]
    pub order: u32,
}

impl KeyField {
    /// Create a key field.
    pub fn new(name: impl Into<String>, kof: usize, order: u32) -> Self {
        Self {
            name: name.into(),
            kof,
            order,
        }
    }
}

/// Role of an `ADR` in key projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRole {
    /// Not key-bearing
    None,
    /// A key field; emitted whole
    Leaf,
    /// A nested structure containing key fields
    Path,
}

/// Extensibility of a structure body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extensibility {
    /// No framing
    Final,
    /// DHEADER in front of the members
    Appendable,
    /// DHEADER plus an EMHEADER in front of every member
    Mutable,
}

#[derive(Debug, Clone)]
struct BodyInfo {
    extensibility: Extensibility,
    /// `ADR` indices in declaration order, inlined through JSR and bases
    members: Vec<usize>,
    /// Member ids parallel to `members`, mutable bodies only
    ids: Vec<u32>,
    /// Number of record slots
    slots: usize,
}

#[derive(Deserialize)]
struct DescriptorDocument {
    name: String,
    ops: Vec<Op>,
    #[serde(default)]
    keys: Vec<KeyField>,
}

/// Immutable, validated description of one type.
#[derive(Debug, Clone)]
pub struct TypeDescriptor {
    name: String,
    ops: Vec<Op>,
    keys: Vec<KeyField>,
    key_roles: Vec<KeyRole>,
    bodies: HashMap<usize, BodyInfo>,
    key_leaves: usize,
    min_xcdr: XcdrVersion,
}

impl TypeDescriptor {
    /// Validate `ops` and `keys` and build a descriptor.
    ///
    /// Body 0 is the top-level type.
    pub fn new(
        name: impl Into<String>,
        ops: Vec<Op>,
        mut keys: Vec<KeyField>,
    ) -> Result<Self, ProgramError> {
        if ops.is_empty() {
            return Err(ProgramError::Empty);
        }
        keys.sort_by_key(|k| k.order);

        let mut desc = Self {
            name: name.into(),
            key_roles: vec![KeyRole::None; ops.len()],
            ops,
            keys,
            bodies: HashMap::new(),
            key_leaves: 0,
            min_xcdr: XcdrVersion::Xcdr1,
        };

        let order = desc.verify_bodies()?;
        desc.verify_acyclic(&order)?;
        for &body in &order {
            let mut members = Vec::new();
            let mut ids = Vec::new();
            desc.collect_members(body, &mut members, &mut ids);
            let slots = members
                .iter()
                .map(|&pc| desc.adr(pc).offset + 1)
                .max()
                .unwrap_or(0);
            let extensibility = match desc.ops[body] {
                Op::Dlc => Extensibility::Appendable,
                Op::Plc => Extensibility::Mutable,
                _ => Extensibility::Final,
            };
            desc.bodies.insert(
                body,
                BodyInfo {
                    extensibility,
                    members,
                    ids,
                    slots,
                },
            );
        }
        desc.verify_keys()?;
        desc.key_leaves = desc.count_key_leaves(0);
        Ok(desc)
    }

    /// Validate and build, reporting failures as [`CodecError::InvalidProgram`].
    pub fn build(name: impl Into<String>, ops: Vec<Op>, keys: Vec<KeyField>) -> CoreResult<Self> {
        let name = name.into();
        Self::new(name.clone(), ops, keys)
            .map_err(|e| CodecError::invalid_program(name, e.to_string()))
    }

    /// Load a descriptor from a JSON document `{"name", "ops", "keys"}`.
    pub fn from_json(json: &str) -> CoreResult<Self> {
        let doc: DescriptorDocument = serde_json::from_str(json)
            .map_err(|e| CodecError::parse("type descriptor", e.to_string()))?;
        Self::build(doc.name, doc.ops, doc.keys)
    }

    /// Type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The instruction stream.
    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    /// Key descriptor in canonical order.
    pub fn keys(&self) -> &[KeyField] {
        &self.keys
    }

    /// Whether the type has key fields.
    pub fn has_keys(&self) -> bool {
        !self.keys.is_empty()
    }

    /// Oldest encoding version able to represent this type.
    pub fn min_xcdr_version(&self) -> XcdrVersion {
        self.min_xcdr
    }

    /// Key role of the `ADR` at `pc`.
    pub fn key_role(&self, pc: usize) -> KeyRole {
        self.key_roles[pc]
    }

    /// Extensibility of the top-level type.
    pub fn extensibility(&self) -> Extensibility {
        self.body_extensibility(0)
    }

    /// Extensibility of the body at `body`.
    pub fn body_extensibility(&self, body: usize) -> Extensibility {
        self.body(body).extensibility
    }

    /// Members of a body in declaration order.
    pub fn body_members(&self, body: usize) -> &[usize] {
        &self.body(body).members
    }

    /// Number of record slots of a body.
    pub fn slot_count(&self, body: usize) -> usize {
        self.body(body).slots
    }

    /// Member ids of a mutable body, parallel to [`body_members`](Self::body_members).
    pub fn body_member_ids(&self, body: usize) -> &[u32] {
        &self.body(body).ids
    }

    /// Number of key leaves a key-only walk of the top-level type emits.
    ///
    /// Equals the number of keys unless a structure holding key leaves is
    /// reached through more than one key path.
    pub fn key_leaf_count(&self) -> usize {
        self.key_leaves
    }

    pub(crate) fn op(&self, pc: usize) -> &Op {
        &self.ops[pc]
    }

    /// The `ADR` at `pc`. Only called with indices the verifier checked.
    pub(crate) fn adr(&self, pc: usize) -> &Adr {
        match &self.ops[pc] {
            Op::Adr(adr) => adr,
            other => unreachable!("op {pc} is {} in a verified program", other.name()),
        }
    }

    /// `ADR` indices of a key path.
    pub(crate) fn key_path(&self, key: &KeyField) -> &[usize] {
        match &self.ops[key.kof] {
            Op::Kof { path } => path,
            other => unreachable!("op {} is {} in a verified program", key.kof, other.name()),
        }
    }

    fn body(&self, body: usize) -> &BodyInfo {
        self.bodies
            .get(&body)
            .unwrap_or_else(|| unreachable!("op {body} is not a verified body"))
    }

    /// Select the active case for `discriminant`.
    pub(crate) fn find_case(&self, cases: usize, count: u32, discriminant: i64) -> Option<&Case> {
        let table = &self.ops[cases..cases + count as usize];
        let mut default = None;
        for op in table {
            if let Op::Jeq(case) = op {
                if case.label == discriminant {
                    return Some(case);
                }
                if case.default {
                    default = Some(case);
                }
            }
        }
        default
    }

    /// Find the member of a mutable body with `id`, searching bases too.
    pub(crate) fn find_member(&self, plc: usize, id: u32) -> Option<usize> {
        let mut pc = plc + 1;
        loop {
            match &self.ops[pc] {
                Op::Plm {
                    target, base: true, ..
                } => {
                    if let Some(found) = self.find_member(*target, id) {
                        return Some(found);
                    }
                }
                Op::Plm {
                    id: member_id,
                    target,
                    ..
                } if *member_id == id => return Some(*target),
                Op::Plm { .. } => {}
                _ => return None,
            }
            pc += 1;
        }
    }

    /// Zero/empty-initialized sample of the type.
    pub fn default_sample(&self) -> Value {
        Value::Struct(self.default_fields(0))
    }

    /// Default member slots of a body. Optional members are absent.
    pub fn default_fields(&self, body: usize) -> Vec<Value> {
        let info = self.body(body);
        let mut fields = vec![Value::Null; info.slots];
        for &pc in &info.members {
            let adr = self.adr(pc);
            if !adr.flags.optional {
                fields[adr.offset] = self.default_value(&adr.ty);
            }
        }
        fields
    }

    /// Default value of a type.
    pub fn default_value(&self, ty: &TypeCode) -> Value {
        match ty {
            TypeCode::Primitive(p) => p.zero(),
            TypeCode::Enum { .. } => Value::Enum(0),
            TypeCode::Bitmask { .. } => Value::Bitmask(0),
            TypeCode::String { .. } => Value::String(String::new()),
            TypeCode::Array { count, element } => {
                Value::Array(vec![self.default_value(element); *count as usize])
            }
            TypeCode::Sequence { .. } => Value::Sequence(Vec::new()),
            TypeCode::Union { cases, count, .. } => Value::Union {
                discriminant: 0,
                value: self
                    .find_case(*cases, *count, 0)
                    .map(|case| Box::new(self.default_value(&case.ty))),
            },
            TypeCode::Struct { body } | TypeCode::External { body } => {
                Value::Struct(self.default_fields(*body))
            }
        }
    }

    /// Lower bound on the encoded size of a value of `ty`.
    ///
    /// Used to reject element counts that cannot fit in the remaining input.
    pub(crate) fn min_wire_size(&self, ty: &TypeCode, xcdr: XcdrVersion) -> usize {
        match ty {
            TypeCode::Primitive(_) | TypeCode::Enum { .. } | TypeCode::Bitmask { .. } => {
                ty.wire_width(xcdr).unwrap_or(1)
            }
            TypeCode::String { .. } => 5,
            TypeCode::Sequence { .. } => 4,
            TypeCode::Array { count, element } => {
                if xcdr == XcdrVersion::Xcdr2 && !element.is_primitive() {
                    4
                } else {
                    (*count as usize).saturating_mul(self.min_wire_size(element, xcdr))
                }
            }
            TypeCode::Union { discriminant, .. } => discriminant.wire_width(xcdr).unwrap_or(1),
            TypeCode::Struct { body } | TypeCode::External { body } => {
                let info = self.body(*body);
                match (info.extensibility, xcdr) {
                    (Extensibility::Final, _) | (_, XcdrVersion::Xcdr1) => info
                        .members
                        .iter()
                        .map(|&pc| {
                            let adr = self.adr(pc);
                            if adr.flags.optional {
                                1
                            } else {
                                self.min_wire_size(&adr.ty, xcdr)
                            }
                        })
                        .fold(0usize, usize::saturating_add),
                    _ => 4,
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Verifier
    // ------------------------------------------------------------------

    fn check_target(&self, at: usize, target: usize) -> Result<(), ProgramError> {
        if target >= self.ops.len() {
            return Err(ProgramError::JumpOutOfRange {
                at,
                target,
                len: self.ops.len(),
            });
        }
        Ok(())
    }

    /// Check every reachable body; returns body starts in discovery order.
    fn verify_bodies(&mut self) -> Result<Vec<usize>, ProgramError> {
        let mut seen = vec![false; self.ops.len()];
        let mut order = Vec::new();
        let mut pending = vec![0usize];
        let mut needs_xcdr2 = false;

        while let Some(start) = pending.pop() {
            if seen[start] {
                continue;
            }
            seen[start] = true;
            order.push(start);

            match self.ops[start] {
                Op::Plc => {
                    needs_xcdr2 = true;
                    let mut pc = start + 1;
                    loop {
                        match self.ops.get(pc) {
                            None => return Err(ProgramError::Unterminated { start }),
                            Some(Op::Rts) => break,
                            Some(Op::Plm { target, base, .. }) => {
                                let (target, base) = (*target, *base);
                                self.check_target(pc, target)?;
                                if base {
                                    if !matches!(self.ops[target], Op::Plc) {
                                        return Err(self.unexpected(target, "PLC"));
                                    }
                                    pending.push(target);
                                } else {
                                    let adr = match &self.ops[target] {
                                        Op::Adr(adr) => adr.clone(),
                                        _ => return Err(self.unexpected(target, "ADR")),
                                    };
                                    if !matches!(self.ops.get(target + 1), Some(Op::Rts)) {
                                        return Err(ProgramError::Unterminated { start: target });
                                    }
                                    self.verify_type(target, &adr.ty, &mut pending)?;
                                }
                            }
                            Some(_) => return Err(self.unexpected(pc, "PLM or RTS")),
                        }
                        pc += 1;
                    }
                }
                _ => {
                    let mut pc = start;
                    if matches!(self.ops[start], Op::Dlc) {
                        needs_xcdr2 = true;
                        pc += 1;
                    }
                    loop {
                        match self.ops.get(pc) {
                            None => return Err(ProgramError::Unterminated { start }),
                            Some(Op::Rts) => break,
                            Some(Op::Adr(adr)) => {
                                let adr = adr.clone();
                                if adr.flags.optional {
                                    needs_xcdr2 = true;
                                }
                                self.verify_type(pc, &adr.ty, &mut pending)?;
                            }
                            Some(Op::Jsr { target }) => {
                                let target = *target;
                                self.check_target(pc, target)?;
                                if matches!(self.ops[target], Op::Dlc | Op::Plc) {
                                    return Err(self.unexpected(target, "final body"));
                                }
                                pending.push(target);
                            }
                            Some(_) => return Err(self.unexpected(pc, "ADR, JSR or RTS")),
                        }
                        pc += 1;
                    }
                }
            }
        }

        if needs_xcdr2 {
            self.min_xcdr = XcdrVersion::Xcdr2;
        }
        Ok(order)
    }

    fn unexpected(&self, at: usize, expected: &'static str) -> ProgramError {
        ProgramError::UnexpectedOp {
            at,
            expected,
            found: self.ops[at].name(),
        }
    }

    fn verify_type(
        &self,
        at: usize,
        ty: &TypeCode,
        pending: &mut Vec<usize>,
    ) -> Result<(), ProgramError> {
        match ty {
            TypeCode::Primitive(_) | TypeCode::String { .. } => Ok(()),
            TypeCode::Enum { width, .. } => match width {
                1 | 2 | 4 => Ok(()),
                _ => Err(ProgramError::BadWidth {
                    at,
                    kind: "enum",
                    width: *width,
                }),
            },
            TypeCode::Bitmask { width, .. } => match width {
                1 | 2 | 4 | 8 => Ok(()),
                _ => Err(ProgramError::BadWidth {
                    at,
                    kind: "bitmask",
                    width: *width,
                }),
            },
            TypeCode::Array { element, .. } | TypeCode::Sequence { element, .. } => {
                self.verify_type(at, element, pending)
            }
            TypeCode::Union {
                discriminant,
                cases,
                count,
            } => {
                let integral = match discriminant.as_ref() {
                    TypeCode::Primitive(p) => p.is_integral() && p.size() <= 4,
                    TypeCode::Enum { .. } => true,
                    _ => false,
                };
                if !integral {
                    return Err(ProgramError::BadDiscriminant { at });
                }
                self.verify_type(at, discriminant, pending)?;
                let end = cases.saturating_add(*count as usize);
                if *count > 0 {
                    self.check_target(at, end - 1)?;
                }
                let mut defaults = 0;
                for pc in *cases..end {
                    match &self.ops[pc] {
                        Op::Jeq(case) => {
                            if case.default {
                                defaults += 1;
                            }
                            self.verify_type(pc, &case.ty, pending)?;
                        }
                        _ => return Err(self.unexpected(pc, "JEQ")),
                    }
                }
                if defaults > 1 {
                    return Err(ProgramError::MultipleDefaults { at });
                }
                Ok(())
            }
            TypeCode::Struct { body } | TypeCode::External { body } => {
                self.check_target(at, *body)?;
                match self.ops[*body] {
                    Op::Adr(_) | Op::Jsr { .. } | Op::Rts | Op::Dlc | Op::Plc => {
                        pending.push(*body);
                        Ok(())
                    }
                    _ => Err(self.unexpected(*body, "structure body")),
                }
            }
        }
    }

    /// Bodies a body contains by value (inline structs, JSR, inherited members).
    fn body_edges(&self, body: usize) -> Vec<usize> {
        fn type_edges(desc: &TypeDescriptor, ty: &TypeCode, out: &mut Vec<usize>) {
            match ty {
                TypeCode::Struct { body } | TypeCode::External { body } => out.push(*body),
                TypeCode::Array { element, .. } => type_edges(desc, element, out),
                TypeCode::Union { cases, count, .. } => {
                    for pc in *cases..*cases + *count as usize {
                        if let Op::Jeq(case) = &desc.ops[pc] {
                            type_edges(desc, &case.ty, out);
                        }
                    }
                }
                _ => {}
            }
        }

        let mut out = Vec::new();
        let member = |adr: &Adr, out: &mut Vec<usize>| {
            if !adr.flags.optional {
                type_edges(self, &adr.ty, out);
            }
        };
        let mut pc = body;
        match self.ops[body] {
            Op::Plc => {
                pc += 1;
                while let Op::Plm { target, base, .. } = &self.ops[pc] {
                    if *base {
                        out.push(*target);
                    } else {
                        member(self.adr(*target), &mut out);
                    }
                    pc += 1;
                }
            }
            _ => {
                if matches!(self.ops[body], Op::Dlc) {
                    pc += 1;
                }
                loop {
                    match &self.ops[pc] {
                        Op::Adr(adr) => member(adr, &mut out),
                        Op::Jsr { target } => out.push(*target),
                        _ => break,
                    }
                    pc += 1;
                }
            }
        }
        out
    }

    fn verify_acyclic(&self, bodies: &[usize]) -> Result<(), ProgramError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            New,
            Active,
            Done,
        }
        let mut marks = vec![Mark::New; self.ops.len()];

        for &root in bodies {
            if marks[root] != Mark::New {
                continue;
            }
            let mut stack = vec![(root, self.body_edges(root), 0usize)];
            marks[root] = Mark::Active;
            while let Some((body, edges, next)) = stack.last_mut() {
                if *next == edges.len() {
                    marks[*body] = Mark::Done;
                    stack.pop();
                    continue;
                }
                let child = edges[*next];
                *next += 1;
                match marks[child] {
                    Mark::Active => return Err(ProgramError::RecursiveType { body: child }),
                    Mark::New => {
                        marks[child] = Mark::Active;
                        let child_edges = self.body_edges(child);
                        stack.push((child, child_edges, 0));
                    }
                    Mark::Done => {}
                }
            }
        }
        Ok(())
    }

    fn collect_members(&self, body: usize, out: &mut Vec<usize>, ids: &mut Vec<u32>) {
        let mut pc = body;
        match self.ops[body] {
            Op::Plc => {
                pc += 1;
                while let Op::Plm { id, target, base } = &self.ops[pc] {
                    if *base {
                        self.collect_members(*target, out, ids);
                    } else {
                        out.push(*target);
                        ids.push(*id);
                    }
                    pc += 1;
                }
            }
            _ => {
                if matches!(self.ops[body], Op::Dlc) {
                    pc += 1;
                }
                loop {
                    match &self.ops[pc] {
                        Op::Adr(_) => out.push(pc),
                        Op::Jsr { target } => self.collect_members(*target, out, ids),
                        _ => break,
                    }
                    pc += 1;
                }
            }
        }
    }

    fn verify_keys(&mut self) -> Result<(), ProgramError> {
        let mut roles = vec![KeyRole::None; self.ops.len()];
        for key in &self.keys {
            let bad = |reason: String| ProgramError::BadKeyPath {
                name: key.name.clone(),
                reason,
            };
            let path = match self.ops.get(key.kof) {
                Some(Op::Kof { path }) if !path.is_empty() => path,
                Some(Op::Kof { .. }) => return Err(bad("empty path".to_string())),
                Some(other) => {
                    return Err(bad(format!("op {} is {}, not KOF", key.kof, other.name())))
                }
                None => return Err(bad(format!("KOF index {} out of range", key.kof))),
            };

            let mut body = 0usize;
            for (step, &pc) in path.iter().enumerate() {
                if !self.body(body).members.contains(&pc) {
                    return Err(bad(format!("op {pc} is not a member of body {body}")));
                }
                let adr = self.adr(pc);
                if adr.flags.optional {
                    return Err(ProgramError::IllegalKeyType {
                        at: pc,
                        type_name: "optional member",
                    });
                }
                let leaf = step + 1 == path.len();
                let role = if leaf { KeyRole::Leaf } else { KeyRole::Path };
                if roles[pc] != KeyRole::None && roles[pc] != role {
                    return Err(bad(format!("op {pc} is both a key and a key container")));
                }
                roles[pc] = role;
                if leaf {
                    self.verify_key_type(pc, &adr.ty)?;
                } else {
                    body = adr
                        .ty
                        .body()
                        .ok_or_else(|| bad(format!("op {pc} is not a structure")))?;
                }
            }
        }
        self.key_roles = roles;
        Ok(())
    }

    pub(crate) fn count_key_leaves(&self, body: usize) -> usize {
        self.body(body)
            .members
            .iter()
            .map(|&pc| match self.key_roles[pc] {
                KeyRole::None => 0,
                KeyRole::Leaf => 1,
                KeyRole::Path => self.adr(pc).ty.body().map_or(0, |b| self.count_key_leaves(b)),
            })
            .sum()
    }

    fn verify_key_type(&self, at: usize, ty: &TypeCode) -> Result<(), ProgramError> {
        match ty {
            TypeCode::Primitive(_)
            | TypeCode::Enum { .. }
            | TypeCode::Bitmask { .. }
            | TypeCode::String { .. } => Ok(()),
            TypeCode::Array { element, .. } => self.verify_key_type(at, element),
            TypeCode::Sequence { .. } | TypeCode::Union { .. } => {
                Err(ProgramError::IllegalKeyType {
                    at,
                    type_name: ty.name(),
                })
            }
            TypeCode::Struct { body } | TypeCode::External { body } => {
                for &pc in &self.body(*body).members {
                    let adr = self.adr(pc);
                    if adr.flags.optional {
                        return Err(ProgramError::IllegalKeyType {
                            at: pc,
                            type_name: "optional member",
                        });
                    }
                    self.verify_key_type(pc, &adr.ty)?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "TypeDescriptor for '{}':", self.name)?;
        for (idx, op) in self.ops.iter().enumerate() {
            writeln!(f, "  {idx:3}: {op:?}")?;
        }
        for key in &self.keys {
            writeln!(f, "  key {} -> KOF {} (order {})", key.name, key.kof, key.order)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::cdr::ops::MemberFlags;
    use crate::PrimitiveType;

    fn prim(p: PrimitiveType) -> TypeCode {
        TypeCode::Primitive(p)
    }

    /// struct Outer { @key Inner inner; string name; } struct Inner { @key u32 id; u8 x; }
    fn nested_key_program() -> (Vec<Op>, Vec<KeyField>) {
        let ops = vec![
            Op::Adr(Adr::new(0, TypeCode::Struct { body: 3 }).key()),
            Op::Adr(Adr::new(1, TypeCode::string())),
            Op::Rts,
            Op::Adr(Adr::new(0, prim(PrimitiveType::UInt32)).key()),
            Op::Adr(Adr::new(1, prim(PrimitiveType::UInt8))),
            Op::Rts,
            Op::Kof { path: vec![0, 3] },
        ];
        (ops, vec![KeyField::new("inner.id", 6, 0)])
    }

    #[test]
    fn test_valid_nested_program() {
        let (ops, keys) = nested_key_program();
        let desc = TypeDescriptor::new("Outer", ops, keys).unwrap();
        assert_eq!(desc.key_role(0), KeyRole::Path);
        assert_eq!(desc.key_role(3), KeyRole::Leaf);
        assert_eq!(desc.key_role(1), KeyRole::None);
        assert_eq!(desc.key_role(4), KeyRole::None);
        assert_eq!(desc.min_xcdr_version(), XcdrVersion::Xcdr1);
        assert_eq!(desc.extensibility(), Extensibility::Final);
        assert_eq!(desc.body_members(0), &[0, 1]);
        assert_eq!(desc.key_leaf_count(), 1);
    }

    #[test]
    fn test_empty_program() {
        assert_eq!(
            TypeDescriptor::new("E", vec![], vec![]).unwrap_err(),
            ProgramError::Empty
        );
    }

    #[test]
    fn test_jump_out_of_range() {
        let ops = vec![Op::Adr(Adr::new(0, TypeCode::Struct { body: 9 })), Op::Rts];
        let err = TypeDescriptor::new("T", ops, vec![]).unwrap_err();
        assert!(matches!(err, ProgramError::JumpOutOfRange { target: 9, .. }));
    }

    #[test]
    fn test_unterminated_body() {
        let ops = vec![Op::Adr(Adr::new(0, prim(PrimitiveType::UInt8)))];
        let err = TypeDescriptor::new("T", ops, vec![]).unwrap_err();
        assert_eq!(err, ProgramError::Unterminated { start: 0 });
    }

    #[test]
    fn test_union_needs_jeq_entries() {
        let ops = vec![
            Op::Adr(Adr::new(
                0,
                TypeCode::union(prim(PrimitiveType::Int32), 2, 1),
            )),
            Op::Rts,
            Op::Rts,
        ];
        let err = TypeDescriptor::new("U", ops, vec![]).unwrap_err();
        assert!(matches!(err, ProgramError::UnexpectedOp { at: 2, .. }));
    }

    #[test]
    fn test_union_float_discriminant_rejected() {
        let ops = vec![
            Op::Adr(Adr::new(
                0,
                TypeCode::union(prim(PrimitiveType::Float32), 2, 1),
            )),
            Op::Rts,
            Op::Jeq(Case::new(1, prim(PrimitiveType::UInt8))),
        ];
        let err = TypeDescriptor::new("U", ops, vec![]).unwrap_err();
        assert_eq!(err, ProgramError::BadDiscriminant { at: 0 });
    }

    #[test]
    fn test_multiple_defaults_rejected() {
        let ops = vec![
            Op::Adr(Adr::new(0, TypeCode::union(prim(PrimitiveType::Int32), 2, 2))),
            Op::Rts,
            Op::Jeq(Case::default_case(1, prim(PrimitiveType::UInt8))),
            Op::Jeq(Case::default_case(2, prim(PrimitiveType::UInt8))),
        ];
        let err = TypeDescriptor::new("U", ops, vec![]).unwrap_err();
        assert_eq!(err, ProgramError::MultipleDefaults { at: 0 });
    }

    #[test]
    fn test_recursive_by_value_rejected() {
        let ops = vec![Op::Adr(Adr::new(0, TypeCode::Struct { body: 0 })), Op::Rts];
        let err = TypeDescriptor::new("Loop", ops, vec![]).unwrap_err();
        assert_eq!(err, ProgramError::RecursiveType { body: 0 });
    }

    #[test]
    fn test_recursion_through_sequence_allowed() {
        let ops = vec![
            Op::Adr(Adr::new(0, prim(PrimitiveType::UInt32))),
            Op::Adr(Adr::new(1, TypeCode::sequence(TypeCode::Struct { body: 0 }))),
            Op::Rts,
        ];
        assert!(TypeDescriptor::new("Tree", ops, vec![]).is_ok());
    }

    #[test]
    fn test_recursion_through_optional_external_allowed() {
        let ops = vec![
            Op::Adr(Adr::new(0, prim(PrimitiveType::UInt32))),
            Op::Adr(Adr::new(1, TypeCode::External { body: 0 }).optional()),
            Op::Rts,
        ];
        let desc = TypeDescriptor::new("List", ops, vec![]).unwrap();
        assert_eq!(desc.min_xcdr_version(), XcdrVersion::Xcdr2);
        assert_eq!(
            desc.default_sample(),
            Value::Struct(vec![Value::UInt32(0), Value::Null])
        );
    }

    #[test]
    fn test_sequence_key_rejected() {
        let ops = vec![
            Op::Adr(Adr::new(0, TypeCode::sequence(prim(PrimitiveType::UInt8))).key()),
            Op::Rts,
            Op::Kof { path: vec![0] },
        ];
        let err =
            TypeDescriptor::new("K", ops, vec![KeyField::new("seq", 2, 0)]).unwrap_err();
        assert_eq!(
            err,
            ProgramError::IllegalKeyType {
                at: 0,
                type_name: "sequence"
            }
        );
    }

    #[test]
    fn test_union_key_rejected() {
        let ops = vec![
            Op::Adr(Adr::new(0, TypeCode::union(prim(PrimitiveType::Int32), 3, 1)).key()),
            Op::Rts,
            Op::Kof { path: vec![0] },
            Op::Jeq(Case::new(1, prim(PrimitiveType::UInt8))),
        ];
        let err = TypeDescriptor::new("K", ops, vec![KeyField::new("u", 2, 0)]).unwrap_err();
        assert!(matches!(err, ProgramError::IllegalKeyType { .. }));
    }

    #[test]
    fn test_key_path_must_follow_members() {
        let (mut ops, keys) = nested_key_program();
        ops[6] = Op::Kof { path: vec![1, 3] };
        let err = TypeDescriptor::new("Outer", ops, keys).unwrap_err();
        assert!(matches!(err, ProgramError::BadKeyPath { .. }));
    }

    #[test]
    fn test_keys_sorted_by_order() {
        let ops = vec![
            Op::Adr(Adr::new(0, prim(PrimitiveType::UInt8)).key()),
            Op::Adr(Adr::new(1, prim(PrimitiveType::UInt8)).key()),
            Op::Rts,
            Op::Kof { path: vec![0] },
            Op::Kof { path: vec![1] },
        ];
        let keys = vec![KeyField::new("a", 3, 1), KeyField::new("b", 4, 0)];
        let desc = TypeDescriptor::new("Ordered", ops, keys).unwrap();
        let names: Vec<_> = desc.keys().iter().map(|k| k.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn test_mutable_with_base() {
        // mutable Derived : Base { u16 extra; } mutable Base { u32 id; }
        let ops = vec![
            Op::Plc,
            Op::Plm {
                id: 0,
                target: 4,
                base: true,
            },
            Op::Plm {
                id: 10,
                target: 7,
                base: false,
            },
            Op::Rts,
            Op::Plc,
            Op::Plm {
                id: 1,
                target: 9,
                base: false,
            },
            Op::Rts,
            Op::Adr(Adr::new(1, prim(PrimitiveType::UInt16))),
            Op::Rts,
            Op::Adr(Adr::new(0, prim(PrimitiveType::UInt32))),
            Op::Rts,
        ];
        let desc = TypeDescriptor::new("Derived", ops, vec![]).unwrap();
        assert_eq!(desc.extensibility(), Extensibility::Mutable);
        assert_eq!(desc.min_xcdr_version(), XcdrVersion::Xcdr2);
        assert_eq!(desc.body_members(0), &[9, 7]);
        assert_eq!(desc.body_member_ids(0), &[1, 10]);
        assert_eq!(desc.find_member(0, 1), Some(9));
        assert_eq!(desc.find_member(0, 10), Some(7));
        assert_eq!(desc.find_member(0, 2), None);
    }

    #[test]
    fn test_find_case_default() {
        let ops = vec![
            Op::Adr(Adr::new(0, TypeCode::union(prim(PrimitiveType::Int16), 2, 2))),
            Op::Rts,
            Op::Jeq(Case::new(1, prim(PrimitiveType::UInt8))),
            Op::Jeq(Case::default_case(2, TypeCode::string())),
        ];
        let desc = TypeDescriptor::new("U", ops, vec![]).unwrap();
        assert_eq!(desc.find_case(2, 2, 1).unwrap().label, 1);
        assert_eq!(desc.find_case(2, 2, 7).unwrap().label, 2);
        assert_eq!(
            desc.default_sample(),
            Value::Struct(vec![Value::Union {
                discriminant: 0,
                value: Some(Box::new(Value::String(String::new()))),
            }])
        );
    }

    #[test]
    fn test_min_wire_size() {
        let (ops, keys) = nested_key_program();
        let desc = TypeDescriptor::new("Outer", ops, keys).unwrap();
        let outer = TypeCode::Struct { body: 0 };
        // inner (4 + 1) + string (5)
        assert_eq!(desc.min_wire_size(&outer, XcdrVersion::Xcdr2), 10);
        let arr = TypeCode::array(3, prim(PrimitiveType::UInt64));
        assert_eq!(desc.min_wire_size(&arr, XcdrVersion::Xcdr1), 24);
    }

    #[test]
    fn test_from_json() {
        let json = r#"{
            "name": "Pair",
            "ops": [
                {"Adr": {"offset": 0, "ty": {"Primitive": "UInt32"}, "flags": {"key": true, "must_understand": true}}},
                {"Adr": {"offset": 1, "ty": {"String": {"bound": null}}}},
                "Rts",
                {"Kof": {"path": [0]}}
            ],
            "keys": [{"name": "id", "kof": 3}]
        }"#;
        let desc = TypeDescriptor::from_json(json).unwrap();
        assert_eq!(desc.name(), "Pair");
        assert_eq!(desc.keys().len(), 1);
        assert_eq!(desc.key_role(0), KeyRole::Leaf);
        assert_eq!(
            desc.adr(0).flags,
            MemberFlags {
                key: true,
                must_understand: true,
                optional: false
            }
        );
    }

    #[test]
    fn test_from_json_invalid_program() {
        let json = r#"{"name": "Bad", "ops": [{"Jsr": {"target": 5}}, "Rts"]}"#;
        let err = TypeDescriptor::from_json(json).unwrap_err();
        assert!(matches!(err, CodecError::InvalidProgram { .. }));
    }

    #[test]
    fn test_display() {
        let (ops, keys) = nested_key_program();
        let desc = TypeDescriptor::new("Outer", ops, keys).unwrap();
        let text = desc.to_string();
        assert!(text.contains("Outer"));
        assert!(text.contains("inner.id"));
    }
}
