//! The symbolic instruction set the emitter lowers statements into.
//!
//! Instructions reference constants through small pool indexes held by the
//! class builder, and control flow through [`Label`]s; the assembly pass
//! resolves both into final bytecode.

/// A forward-referenceable position in a method body. Labels are bound by
/// [`Instr::Bind`], which occupies no space in the assembled code.
pub(crate) type Label = usize;

/// Index into the class builder's string literal pool.
pub(crate) type StrId = u16;
/// Index into the class builder's class reference pool.
pub(crate) type ClassId = u16;
/// Index into the class builder's method reference pool.
pub(crate) type MethodId = u16;
/// Index into the class builder's field reference pool.
pub(crate) type FieldId = u16;

/// Branch conditions on a single int (or on the result of a float compare).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Cond {
    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum Instr {
    // Constants
    PushInt(i32),
    PushFloat(f32),
    PushString(StrId),
    PushNull,

    // Operand stack
    Dup,
    Pop,

    // Local slots
    LoadInt(u8),
    StoreInt(u8),
    LoadFloat(u8),
    StoreFloat(u8),
    LoadRef(u8),
    StoreRef(u8),

    // Arithmetic
    IntToFloat,
    AddInt,
    SubInt,
    MulInt,
    DivInt,
    AddFloat,
    SubFloat,
    MulFloat,
    DivFloat,
    NegInt,
    NegFloat,

    /// `fcmpg`: pops two floats, pushes -1/0/1.
    FloatCmp,

    // Control flow
    /// Pops one int and branches when the condition holds against zero.
    Branch(Cond, Label),
    /// Pops two ints and branches when the comparison holds.
    BranchCmpInt(Cond, Label),
    Jump(Label),
    /// Binds a label at the current position; emits nothing.
    Bind(Label),

    // Objects and calls
    New(ClassId),
    InvokeSpecial(MethodId),
    InvokeStatic(MethodId),
    InvokeVirtual(MethodId),
    GetStatic(FieldId),

    ReturnVoid,
    ReturnInt,
}
