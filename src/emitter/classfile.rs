//! Class-file assembly: constant pool construction, label resolution,
//! stack/locals bookkeeping, stack-map frames, and serialization.
//!
//! The builder collects methods as symbolic instruction lists plus a type
//! per local slot; `finish` resolves everything into a version 52.0 class
//! file. Emission is deterministic: pools are append-only and deduplicated
//! by first occurrence.

use std::collections::HashMap;

use super::instr::{ClassId, Cond, FieldId, Instr, Label, MethodId, StrId};
use crate::error::{Error, Result};

pub(crate) const ACC_PUBLIC: u16 = 0x0001;
pub(crate) const ACC_STATIC: u16 = 0x0008;
const ACC_SUPER: u16 = 0x0020;

// Java 8 class-file version.
const MAJOR_VERSION: u16 = 52;
const MINOR_VERSION: u16 = 0;

/// Verification type of a local slot or operand stack entry.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum VType {
    Int,
    Float,
    Null,
    /// An object reference with its class internal name (or array
    /// descriptor, for array classes).
    Ref(String),
}

/// A finished method body awaiting assembly.
#[derive(Debug)]
pub(crate) struct MethodSpec {
    pub(crate) access: u16,
    pub(crate) name: String,
    pub(crate) descriptor: String,
    pub(crate) code: Vec<Instr>,
    /// Declared type of every allocated local slot, parameters first.
    pub(crate) slot_types: Vec<VType>,
    /// How many leading slots are initialized on method entry.
    pub(crate) param_slots: usize,
}

#[derive(Clone, Debug, PartialEq)]
struct RefData {
    class: String,
    name: String,
    descriptor: String,
}

/// Accumulates the pieces of one class and assembles them into bytes.
#[derive(Debug)]
pub(crate) struct ClassBuilder {
    class_name: String,
    strings: Vec<String>,
    classes: Vec<String>,
    method_refs: Vec<RefData>,
    field_refs: Vec<RefData>,
    methods: Vec<MethodSpec>,
}

impl ClassBuilder {
    pub(crate) fn new(class_name: &str) -> Self {
        ClassBuilder {
            class_name: class_name.to_string(),
            strings: Vec::new(),
            classes: Vec::new(),
            method_refs: Vec::new(),
            field_refs: Vec::new(),
            methods: Vec::new(),
        }
    }

    /// Stores a literal string and returns its pool index.
    pub(crate) fn string_id(&mut self, string: &str) -> Result<StrId> {
        intern(&mut self.strings, || string.to_string(), |s| s == string)
            .ok_or_else(|| Error::codegen("too many string literals"))
    }

    pub(crate) fn class_id(&mut self, name: &str) -> Result<ClassId> {
        intern(&mut self.classes, || name.to_string(), |c| c == name)
            .ok_or_else(|| Error::codegen("too many class references"))
    }

    pub(crate) fn method_id(
        &mut self,
        class: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<MethodId> {
        let data = RefData {
            class: class.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        };
        intern(&mut self.method_refs, || data.clone(), |r| *r == data)
            .ok_or_else(|| Error::codegen("too many method references"))
    }

    pub(crate) fn field_id(
        &mut self,
        class: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<FieldId> {
        let data = RefData {
            class: class.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        };
        intern(&mut self.field_refs, || data.clone(), |r| *r == data)
            .ok_or_else(|| Error::codegen("too many field references"))
    }

    pub(crate) fn add_method(&mut self, spec: MethodSpec) {
        self.methods.push(spec);
    }

    /// Assembles every method and serializes the class file.
    pub(crate) fn finish(self) -> Result<Vec<u8>> {
        let mut pool = ConstantPool::default();

        // Methods are assembled first so the pool is complete before it is
        // serialized; pool indexes are stable once handed out.
        let mut assembled = Vec::with_capacity(self.methods.len());
        for spec in &self.methods {
            assembled.push(assemble_method(&mut pool, &self, spec)?);
        }

        let this_class = pool.class(&self.class_name)?;
        let super_class = pool.class("java/lang/Object")?;

        let mut buf = Vec::new();
        push_u32(&mut buf, 0xCAFE_BABE);
        push_u16(&mut buf, MINOR_VERSION);
        push_u16(&mut buf, MAJOR_VERSION);
        pool.serialize(&mut buf);
        push_u16(&mut buf, ACC_PUBLIC | ACC_SUPER);
        push_u16(&mut buf, this_class);
        push_u16(&mut buf, super_class);
        push_u16(&mut buf, 0); // interfaces
        push_u16(&mut buf, 0); // fields
        push_u16(&mut buf, assembled.len() as u16);
        for method in assembled {
            buf.extend_from_slice(&method);
        }
        push_u16(&mut buf, 0); // class attributes
        Ok(buf)
    }
}

/// Finds a value in a pool or appends it, returning its u16 index.
fn intern<T>(pool: &mut Vec<T>, make: impl FnOnce() -> T, matches: impl Fn(&T) -> bool) -> Option<u16> {
    match pool.iter().position(matches) {
        Some(i) => Some(i as u16),
        None => {
            let i = pool.len();
            if i > u16::MAX as usize {
                None
            } else {
                pool.push(make());
                Some(i as u16)
            }
        }
    }
}

// Constant pool

#[derive(Debug, PartialEq)]
enum CpEntry {
    Utf8(String),
    Integer(i32),
    // Stored as raw bits so deduplication is exact.
    Float(u32),
    Class(u16),
    Str(u16),
    NameAndType(u16, u16),
    Fieldref(u16, u16),
    Methodref(u16, u16),
}

#[derive(Debug, Default)]
struct ConstantPool {
    entries: Vec<CpEntry>,
}

impl ConstantPool {
    /// Adds an entry (or finds an existing equal one) and returns its
    /// 1-based pool index.
    fn add(&mut self, entry: CpEntry) -> Result<u16> {
        if let Some(i) = self.entries.iter().position(|e| *e == entry) {
            return Ok((i + 1) as u16);
        }
        if self.entries.len() >= 0xFFFE {
            return Err(Error::codegen("constant pool overflow"));
        }
        self.entries.push(entry);
        Ok(self.entries.len() as u16)
    }

    fn utf8(&mut self, s: &str) -> Result<u16> {
        self.add(CpEntry::Utf8(s.to_string()))
    }

    fn integer(&mut self, v: i32) -> Result<u16> {
        self.add(CpEntry::Integer(v))
    }

    fn float(&mut self, v: f32) -> Result<u16> {
        self.add(CpEntry::Float(v.to_bits()))
    }

    fn class(&mut self, name: &str) -> Result<u16> {
        let name_idx = self.utf8(name)?;
        self.add(CpEntry::Class(name_idx))
    }

    fn string(&mut self, s: &str) -> Result<u16> {
        let utf8_idx = self.utf8(s)?;
        self.add(CpEntry::Str(utf8_idx))
    }

    fn name_and_type(&mut self, name: &str, descriptor: &str) -> Result<u16> {
        let name_idx = self.utf8(name)?;
        let desc_idx = self.utf8(descriptor)?;
        self.add(CpEntry::NameAndType(name_idx, desc_idx))
    }

    fn methodref(&mut self, data: &RefData) -> Result<u16> {
        let class_idx = self.class(&data.class)?;
        let nat_idx = self.name_and_type(&data.name, &data.descriptor)?;
        self.add(CpEntry::Methodref(class_idx, nat_idx))
    }

    fn fieldref(&mut self, data: &RefData) -> Result<u16> {
        let class_idx = self.class(&data.class)?;
        let nat_idx = self.name_and_type(&data.name, &data.descriptor)?;
        self.add(CpEntry::Fieldref(class_idx, nat_idx))
    }

    fn serialize(&self, buf: &mut Vec<u8>) {
        push_u16(buf, (self.entries.len() + 1) as u16);
        for entry in &self.entries {
            match entry {
                CpEntry::Utf8(s) => {
                    buf.push(1);
                    push_u16(buf, s.len() as u16);
                    buf.extend_from_slice(s.as_bytes());
                }
                CpEntry::Integer(v) => {
                    buf.push(3);
                    push_u32(buf, *v as u32);
                }
                CpEntry::Float(bits) => {
                    buf.push(4);
                    push_u32(buf, *bits);
                }
                CpEntry::Class(name) => {
                    buf.push(7);
                    push_u16(buf, *name);
                }
                CpEntry::Str(utf8) => {
                    buf.push(8);
                    push_u16(buf, *utf8);
                }
                CpEntry::Fieldref(class, nat) => {
                    buf.push(9);
                    push_u16(buf, *class);
                    push_u16(buf, *nat);
                }
                CpEntry::Methodref(class, nat) => {
                    buf.push(10);
                    push_u16(buf, *class);
                    push_u16(buf, *nat);
                }
                CpEntry::NameAndType(name, desc) => {
                    buf.push(12);
                    push_u16(buf, *name);
                    push_u16(buf, *desc);
                }
            }
        }
    }
}

// Method assembly

fn assemble_method(
    pool: &mut ConstantPool,
    builder: &ClassBuilder,
    spec: &MethodSpec,
) -> Result<Vec<u8>> {
    // Pass 1: lay out instruction offsets and intern constant operands.
    // Encoding widths depend only on operand values and pool indexes, both
    // known here, so offsets are final after one pass.
    let mut offsets = Vec::with_capacity(spec.code.len());
    let mut labels: HashMap<Label, usize> = HashMap::new();
    let mut operands: Vec<u16> = vec![0; spec.code.len()];
    let mut offset = 0usize;

    for (i, instr) in spec.code.iter().enumerate() {
        offsets.push(offset);
        let size = match *instr {
            Instr::PushInt(v) => {
                if (-1..=5).contains(&v) {
                    1
                } else if i8::try_from(v).is_ok() {
                    2
                } else if i16::try_from(v).is_ok() {
                    3
                } else {
                    operands[i] = pool.integer(v)?;
                    ldc_size(operands[i])
                }
            }
            Instr::PushFloat(v) => {
                if is_fconst(v) {
                    1
                } else {
                    operands[i] = pool.float(v)?;
                    ldc_size(operands[i])
                }
            }
            Instr::PushString(id) => {
                operands[i] = pool.string(&builder.strings[id as usize])?;
                ldc_size(operands[i])
            }
            Instr::PushNull
            | Instr::Dup
            | Instr::Pop
            | Instr::IntToFloat
            | Instr::AddInt
            | Instr::SubInt
            | Instr::MulInt
            | Instr::DivInt
            | Instr::AddFloat
            | Instr::SubFloat
            | Instr::MulFloat
            | Instr::DivFloat
            | Instr::NegInt
            | Instr::NegFloat
            | Instr::FloatCmp
            | Instr::ReturnVoid
            | Instr::ReturnInt => 1,
            Instr::LoadInt(n)
            | Instr::StoreInt(n)
            | Instr::LoadFloat(n)
            | Instr::StoreFloat(n)
            | Instr::LoadRef(n)
            | Instr::StoreRef(n) => {
                if n <= 3 {
                    1
                } else {
                    2
                }
            }
            Instr::Branch(..) | Instr::BranchCmpInt(..) | Instr::Jump(_) => 3,
            Instr::Bind(label) => {
                labels.insert(label, offset);
                0
            }
            Instr::New(c) => {
                operands[i] = pool.class(&builder.classes[c as usize])?;
                3
            }
            Instr::InvokeSpecial(m) | Instr::InvokeStatic(m) | Instr::InvokeVirtual(m) => {
                operands[i] = pool.methodref(&builder.method_refs[m as usize])?;
                3
            }
            Instr::GetStatic(f) => {
                operands[i] = pool.fieldref(&builder.field_refs[f as usize])?;
                3
            }
        };
        offset += size;
    }
    let code_len = offset;

    // Pass 2: emit bytecode with resolved branch offsets.
    let mut bytecode = Vec::with_capacity(code_len);
    for (i, instr) in spec.code.iter().enumerate() {
        let at = offsets[i];
        match *instr {
            Instr::PushInt(v) => {
                if (-1..=5).contains(&v) {
                    bytecode.push((0x03 + v) as u8); // iconst_<v>
                } else if let Ok(b) = i8::try_from(v) {
                    bytecode.push(0x10); // bipush
                    bytecode.push(b as u8);
                } else if let Ok(s) = i16::try_from(v) {
                    bytecode.push(0x11); // sipush
                    push_u16(&mut bytecode, s as u16);
                } else {
                    push_ldc(&mut bytecode, operands[i]);
                }
            }
            Instr::PushFloat(v) => {
                if is_fconst(v) {
                    bytecode.push(0x0b + v as u8); // fconst_<v>
                } else {
                    push_ldc(&mut bytecode, operands[i]);
                }
            }
            Instr::PushString(_) => push_ldc(&mut bytecode, operands[i]),
            Instr::PushNull => bytecode.push(0x01),
            Instr::Dup => bytecode.push(0x59),
            Instr::Pop => bytecode.push(0x57),
            Instr::LoadInt(n) => push_var(&mut bytecode, 0x1a, 0x15, n),
            Instr::LoadFloat(n) => push_var(&mut bytecode, 0x22, 0x17, n),
            Instr::LoadRef(n) => push_var(&mut bytecode, 0x2a, 0x19, n),
            Instr::StoreInt(n) => push_var(&mut bytecode, 0x3b, 0x36, n),
            Instr::StoreFloat(n) => push_var(&mut bytecode, 0x43, 0x38, n),
            Instr::StoreRef(n) => push_var(&mut bytecode, 0x4b, 0x3a, n),
            Instr::IntToFloat => bytecode.push(0x86),
            Instr::AddInt => bytecode.push(0x60),
            Instr::SubInt => bytecode.push(0x64),
            Instr::MulInt => bytecode.push(0x68),
            Instr::DivInt => bytecode.push(0x6c),
            Instr::AddFloat => bytecode.push(0x62),
            Instr::SubFloat => bytecode.push(0x66),
            Instr::MulFloat => bytecode.push(0x6a),
            Instr::DivFloat => bytecode.push(0x6e),
            Instr::NegInt => bytecode.push(0x74),
            Instr::NegFloat => bytecode.push(0x76),
            Instr::FloatCmp => bytecode.push(0x96), // fcmpg
            Instr::Branch(cond, label) => {
                let opcode = 0x99
                    + match cond {
                        Cond::Eq => 0,
                        Cond::Ne => 1,
                        Cond::Lt => 2,
                        Cond::Ge => 3,
                        Cond::Gt => 4,
                        Cond::Le => 5,
                    };
                push_branch(&mut bytecode, opcode, at, labels[&label])?;
            }
            Instr::BranchCmpInt(cond, label) => {
                let opcode = 0x9f
                    + match cond {
                        Cond::Eq => 0,
                        Cond::Ne => 1,
                        Cond::Lt => 2,
                        Cond::Ge => 3,
                        Cond::Gt => 4,
                        Cond::Le => 5,
                    };
                push_branch(&mut bytecode, opcode, at, labels[&label])?;
            }
            Instr::Jump(label) => push_branch(&mut bytecode, 0xa7, at, labels[&label])?,
            Instr::Bind(_) => {}
            Instr::New(_) => {
                bytecode.push(0xbb);
                push_u16(&mut bytecode, operands[i]);
            }
            Instr::InvokeVirtual(_) => {
                bytecode.push(0xb6);
                push_u16(&mut bytecode, operands[i]);
            }
            Instr::InvokeSpecial(_) => {
                bytecode.push(0xb7);
                push_u16(&mut bytecode, operands[i]);
            }
            Instr::InvokeStatic(_) => {
                bytecode.push(0xb8);
                push_u16(&mut bytecode, operands[i]);
            }
            Instr::GetStatic(_) => {
                bytecode.push(0xb2);
                push_u16(&mut bytecode, operands[i]);
            }
            Instr::ReturnInt => bytecode.push(0xac),
            Instr::ReturnVoid => bytecode.push(0xb1),
        }
    }
    debug_assert_eq!(code_len, bytecode.len());

    // Pass 3: simulate stack and locals for max-stack and stack-map frames.
    let (max_stack, frames) = simulate(builder, spec, &offsets)?;

    // Code attribute.
    let code_name = pool.utf8("Code")?;
    let mut frame_bytes = Vec::new();
    if !frames.is_empty() {
        let smt_name = pool.utf8("StackMapTable")?;
        let mut entries = Vec::new();
        let mut previous: Option<usize> = None;
        for (frame_offset, state) in &frames {
            let delta = match previous {
                None => *frame_offset,
                Some(p) => frame_offset - p - 1,
            };
            entries.push(255u8); // full_frame
            push_u16(&mut entries, delta as u16);
            push_u16(&mut entries, state.locals as u16);
            for slot in &spec.slot_types[..state.locals] {
                push_verification_type(pool, &mut entries, slot)?;
            }
            push_u16(&mut entries, state.stack.len() as u16);
            for item in &state.stack {
                push_verification_type(pool, &mut entries, item)?;
            }
            previous = Some(*frame_offset);
        }
        push_u16(&mut frame_bytes, smt_name);
        push_u32(&mut frame_bytes, (entries.len() + 2) as u32);
        push_u16(&mut frame_bytes, frames.len() as u16);
        frame_bytes.extend_from_slice(&entries);
    }

    let mut code_attr = Vec::new();
    push_u16(&mut code_attr, max_stack as u16);
    push_u16(&mut code_attr, spec.slot_types.len() as u16);
    push_u32(&mut code_attr, code_len as u32);
    code_attr.extend_from_slice(&bytecode);
    push_u16(&mut code_attr, 0); // exception table
    if frame_bytes.is_empty() {
        push_u16(&mut code_attr, 0);
    } else {
        push_u16(&mut code_attr, 1);
        code_attr.extend_from_slice(&frame_bytes);
    }

    // method_info.
    let name_idx = pool.utf8(&spec.name)?;
    let desc_idx = pool.utf8(&spec.descriptor)?;
    let mut method = Vec::new();
    push_u16(&mut method, spec.access);
    push_u16(&mut method, name_idx);
    push_u16(&mut method, desc_idx);
    push_u16(&mut method, 1); // one attribute: Code
    push_u16(&mut method, code_name);
    push_u32(&mut method, code_attr.len() as u32);
    method.extend_from_slice(&code_attr);
    Ok(method)
}

fn ldc_size(index: u16) -> usize {
    if index <= u8::MAX as u16 {
        2
    } else {
        3
    }
}

fn push_ldc(buf: &mut Vec<u8>, index: u16) {
    if index <= u8::MAX as u16 {
        buf.push(0x12); // ldc
        buf.push(index as u8);
    } else {
        buf.push(0x13); // ldc_w
        push_u16(buf, index);
    }
}

fn is_fconst(v: f32) -> bool {
    v.to_bits() == 0.0f32.to_bits() || v.to_bits() == 1.0f32.to_bits() || v.to_bits() == 2.0f32.to_bits()
}

/// Emits a load/store with its short form when the slot allows one.
fn push_var(buf: &mut Vec<u8>, short_base: u8, long_op: u8, slot: u8) {
    if slot <= 3 {
        buf.push(short_base + slot);
    } else {
        buf.push(long_op);
        buf.push(slot);
    }
}

fn push_branch(buf: &mut Vec<u8>, opcode: u8, at: usize, target: usize) -> Result<()> {
    let delta = target as i64 - at as i64;
    let delta = i16::try_from(delta).map_err(|_| Error::codegen("method body too large"))?;
    buf.push(opcode);
    push_u16(buf, delta as u16);
    Ok(())
}

fn push_verification_type(pool: &mut ConstantPool, buf: &mut Vec<u8>, vtype: &VType) -> Result<()> {
    match vtype {
        VType::Int => buf.push(1),
        VType::Float => buf.push(2),
        VType::Null => buf.push(5),
        VType::Ref(name) => {
            buf.push(7);
            let class_idx = pool.class(name)?;
            push_u16(buf, class_idx);
        }
    }
    Ok(())
}

// Stack/locals simulation

#[derive(Clone, Debug, PartialEq)]
struct SimState {
    stack: Vec<VType>,
    /// Length of the initialized prefix of the method's local slots.
    locals: usize,
}

/// Walks a method linearly, tracking operand stack contents and the
/// initialized-locals prefix. Produces the maximum stack depth and one frame
/// per branch target (plus synthetic frames where code follows an
/// unconditional exit).
fn simulate(
    builder: &ClassBuilder,
    spec: &MethodSpec,
    offsets: &[usize],
) -> Result<(usize, Vec<(usize, SimState)>)> {
    let mut current = Some(SimState {
        stack: Vec::new(),
        locals: spec.param_slots,
    });
    let mut last_locals = spec.param_slots;
    let mut pending: HashMap<Label, SimState> = HashMap::new();
    let mut frames: Vec<(usize, SimState)> = Vec::new();
    let mut max_stack = 0usize;

    for (i, instr) in spec.code.iter().enumerate() {
        if let Instr::Bind(label) = instr {
            let merged = match (current.take(), pending.remove(label)) {
                (Some(a), Some(b)) => merge_states(a, b)?,
                (Some(a), None) => a,
                (None, Some(b)) => b,
                // A label bound in dead code, e.g. the exit of a loop with
                // no condition.
                (None, None) => SimState {
                    stack: Vec::new(),
                    locals: last_locals,
                },
            };
            record_frame(&mut frames, offsets[i], merged.clone());
            last_locals = merged.locals;
            current = Some(merged);
            continue;
        }

        // Code after an unconditional exit still needs a frame to verify.
        let mut state = match current.take() {
            Some(state) => state,
            None => {
                let state = SimState {
                    stack: Vec::new(),
                    locals: last_locals,
                };
                record_frame(&mut frames, offsets[i], state.clone());
                state
            }
        };

        let mut terminal = false;
        match *instr {
            Instr::PushInt(_) => state.stack.push(VType::Int),
            Instr::PushFloat(_) => state.stack.push(VType::Float),
            Instr::PushString(_) => state.stack.push(VType::Ref("java/lang/String".to_string())),
            Instr::PushNull => state.stack.push(VType::Null),
            Instr::Dup => {
                let top = peek(&state)?.clone();
                state.stack.push(top);
            }
            Instr::Pop => {
                pop(&mut state)?;
            }
            Instr::LoadInt(_) => state.stack.push(VType::Int),
            Instr::LoadFloat(_) => state.stack.push(VType::Float),
            Instr::LoadRef(n) => state.stack.push(spec.slot_types[n as usize].clone()),
            Instr::StoreInt(n) | Instr::StoreFloat(n) | Instr::StoreRef(n) => {
                pop(&mut state)?;
                state.locals = state.locals.max(n as usize + 1);
            }
            Instr::IntToFloat => {
                pop(&mut state)?;
                state.stack.push(VType::Float);
            }
            Instr::AddInt | Instr::SubInt | Instr::MulInt | Instr::DivInt => {
                pop(&mut state)?;
                pop(&mut state)?;
                state.stack.push(VType::Int);
            }
            Instr::AddFloat | Instr::SubFloat | Instr::MulFloat | Instr::DivFloat => {
                pop(&mut state)?;
                pop(&mut state)?;
                state.stack.push(VType::Float);
            }
            Instr::NegInt | Instr::NegFloat => {}
            Instr::FloatCmp => {
                pop(&mut state)?;
                pop(&mut state)?;
                state.stack.push(VType::Int);
            }
            Instr::Branch(_, label) => {
                pop(&mut state)?;
                merge_pending(&mut pending, label, state.clone())?;
            }
            Instr::BranchCmpInt(_, label) => {
                pop(&mut state)?;
                pop(&mut state)?;
                merge_pending(&mut pending, label, state.clone())?;
            }
            Instr::Jump(label) => {
                merge_pending(&mut pending, label, state.clone())?;
                terminal = true;
            }
            Instr::Bind(_) => unreachable!("handled above"),
            // The reference is uninitialized until the constructor call, but
            // no frame ever lands between `new` and `<init>` here.
            Instr::New(c) => state
                .stack
                .push(VType::Ref(builder.classes[c as usize].clone())),
            Instr::InvokeSpecial(m) | Instr::InvokeStatic(m) | Instr::InvokeVirtual(m) => {
                let data = &builder.method_refs[m as usize];
                let (params, ret) = parse_descriptor(&data.descriptor);
                for _ in 0..params {
                    pop(&mut state)?;
                }
                if !matches!(*instr, Instr::InvokeStatic(_)) {
                    pop(&mut state)?; // receiver
                }
                if let Some(ret) = ret {
                    state.stack.push(ret);
                }
            }
            Instr::GetStatic(f) => {
                let data = &builder.field_refs[f as usize];
                let ty = field_type(&data.descriptor);
                state.stack.push(ty);
            }
            Instr::ReturnVoid => terminal = true,
            Instr::ReturnInt => {
                pop(&mut state)?;
                terminal = true;
            }
        }

        max_stack = max_stack.max(state.stack.len());
        last_locals = state.locals;
        current = if terminal { None } else { Some(state) };
    }

    Ok((max_stack, frames))
}

fn pop(state: &mut SimState) -> Result<VType> {
    state
        .stack
        .pop()
        .ok_or_else(|| Error::codegen("internal: operand stack underflow"))
}

fn peek(state: &SimState) -> Result<&VType> {
    state
        .stack
        .last()
        .ok_or_else(|| Error::codegen("internal: operand stack underflow"))
}

/// Merges two states reaching the same point. Stacks must agree exactly;
/// the initialized-locals prefix shrinks to what both paths guarantee.
fn merge_states(a: SimState, b: SimState) -> Result<SimState> {
    if a.stack != b.stack {
        return Err(Error::codegen("internal: operand stack mismatch at join"));
    }
    Ok(SimState {
        locals: a.locals.min(b.locals),
        stack: a.stack,
    })
}

fn merge_pending(
    pending: &mut HashMap<Label, SimState>,
    label: Label,
    state: SimState,
) -> Result<()> {
    let merged = match pending.remove(&label) {
        Some(existing) => merge_states(existing, state)?,
        None => state,
    };
    pending.insert(label, merged);
    Ok(())
}

/// Records a frame, replacing an earlier one at the same offset (two labels
/// may bind at the same position; the last merge wins).
fn record_frame(frames: &mut Vec<(usize, SimState)>, offset: usize, state: SimState) {
    if let Some(last) = frames.last_mut() {
        if last.0 == offset {
            last.1 = state;
            return;
        }
    }
    frames.push((offset, state));
}

/// Counts parameter slots and extracts the return type of a method
/// descriptor. Every type in this compiler occupies one slot.
fn parse_descriptor(descriptor: &str) -> (usize, Option<VType>) {
    let inner = &descriptor[1..descriptor.find(')').unwrap_or(descriptor.len() - 1)];
    let mut params = 0;
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        match c {
            'L' => {
                for c in chars.by_ref() {
                    if c == ';' {
                        break;
                    }
                }
                params += 1;
            }
            '[' => continue, // the component that follows counts the slot
            _ => params += 1,
        }
    }
    let ret_desc = &descriptor[descriptor.find(')').map(|p| p + 1).unwrap_or(0)..];
    let ret = match ret_desc.chars().next() {
        Some('V') | None => None,
        _ => Some(field_type(ret_desc)),
    };
    (params, ret)
}

fn field_type(descriptor: &str) -> VType {
    match descriptor.chars().next() {
        Some('I') => VType::Int,
        Some('F') => VType::Float,
        Some('L') => VType::Ref(descriptor[1..descriptor.len() - 1].to_string()),
        // Array types keep the whole descriptor as their class name.
        _ => VType::Ref(descriptor.to_string()),
    }
}

fn push_u16(buf: &mut Vec<u8>, v: u16) {
    buf.extend_from_slice(&v.to_be_bytes());
}

fn push_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_be_bytes());
}
