//! The ECMA-335 opcode catalog.
//!
//! Every instruction of the portable bytecode is listed once with its encoded value,
//! mnemonic, operand shape and control flow behaviour. Two-byte opcodes carry the
//! `0xFE` escape in their high byte. The 256-entry lookup tables used by the decoder are
//! derived from this list the first time they are needed.

use std::sync::LazyLock;

use strum::{EnumCount, EnumIter, IntoEnumIterator};

/// Lead byte selecting the secondary opcode table
pub const ESCAPE_BYTE: u8 = 0xFE;

/// Shape of the operand that follows an opcode in the byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandType {
    /// No operand
    None,
    /// 1-byte signed branch displacement
    ShortBranch,
    /// 4-byte signed branch displacement
    Branch,
    /// 1-byte signed integer
    ShortInt,
    /// 1-byte unsigned integer (`unaligned.`, `no.`)
    Byte,
    /// 4-byte signed integer
    Int,
    /// 8-byte integer
    Int64,
    /// 4-byte float
    ShortFloat,
    /// 8-byte float
    Float,
    /// 1-byte argument or local index
    ShortVar,
    /// 2-byte argument or local index
    Var,
    /// Method token
    Method,
    /// Field token
    Field,
    /// Type token
    Type,
    /// Type, method or field token (`ldtoken`)
    Token,
    /// User string token
    String,
    /// Stand-alone signature token (`calli`)
    Signature,
    /// Jump table
    Switch,
}

impl OperandType {
    /// Number of operand bytes, `None` for the variable length jump table
    #[must_use]
    pub const fn size(self) -> Option<usize> {
        match self {
            OperandType::None => Some(0),
            OperandType::ShortBranch
            | OperandType::ShortInt
            | OperandType::Byte
            | OperandType::ShortVar => Some(1),
            OperandType::Var => Some(2),
            OperandType::Branch
            | OperandType::Int
            | OperandType::ShortFloat
            | OperandType::Method
            | OperandType::Field
            | OperandType::Type
            | OperandType::Token
            | OperandType::String
            | OperandType::Signature => Some(4),
            OperandType::Int64 | OperandType::Float => Some(8),
            OperandType::Switch => None,
        }
    }
}

/// How an instruction affects control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowType {
    /// Falls through to the next instruction
    Next,
    /// Unconditional jump
    Branch,
    /// Conditional jump or jump table
    CondBranch,
    /// Calls another method and continues
    Call,
    /// Leaves the method or a handler
    Return,
    /// Raises an exception
    Throw,
    /// Debugger break
    Break,
    /// Prefix modifying the next instruction
    Meta,
}

macro_rules! opcodes {
    ($($variant:ident = $value:literal, $name:literal, $operand:ident, $flow:ident;)*) => {
        /// A CIL opcode.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumCount)]
        pub enum OpCode {
            $(
                #[doc = $name]
                $variant,
            )*
        }

        impl OpCode {
            /// Encoded value; two-byte opcodes are `0xFE00 | second byte`
            #[must_use]
            pub const fn value(self) -> u16 {
                match self {
                    $(OpCode::$variant => $value,)*
                }
            }

            /// Mnemonic as written in IL assembly
            #[must_use]
            pub const fn name(self) -> &'static str {
                match self {
                    $(OpCode::$variant => $name,)*
                }
            }

            /// Shape of the inline operand
            #[must_use]
            pub const fn operand_type(self) -> OperandType {
                match self {
                    $(OpCode::$variant => OperandType::$operand,)*
                }
            }

            /// Control flow behaviour
            #[must_use]
            pub const fn flow(self) -> FlowType {
                match self {
                    $(OpCode::$variant => FlowType::$flow,)*
                }
            }
        }
    };
}

opcodes! {
    Nop = 0x00, "nop", None, Next;
    Break = 0x01, "break", None, Break;
    Ldarg0 = 0x02, "ldarg.0", None, Next;
    Ldarg1 = 0x03, "ldarg.1", None, Next;
    Ldarg2 = 0x04, "ldarg.2", None, Next;
    Ldarg3 = 0x05, "ldarg.3", None, Next;
    Ldloc0 = 0x06, "ldloc.0", None, Next;
    Ldloc1 = 0x07, "ldloc.1", None, Next;
    Ldloc2 = 0x08, "ldloc.2", None, Next;
    Ldloc3 = 0x09, "ldloc.3", None, Next;
    Stloc0 = 0x0A, "stloc.0", None, Next;
    Stloc1 = 0x0B, "stloc.1", None, Next;
    Stloc2 = 0x0C, "stloc.2", None, Next;
    Stloc3 = 0x0D, "stloc.3", None, Next;
    LdargS = 0x0E, "ldarg.s", ShortVar, Next;
    LdargaS = 0x0F, "ldarga.s", ShortVar, Next;
    StargS = 0x10, "starg.s", ShortVar, Next;
    LdlocS = 0x11, "ldloc.s", ShortVar, Next;
    LdlocaS = 0x12, "ldloca.s", ShortVar, Next;
    StlocS = 0x13, "stloc.s", ShortVar, Next;
    Ldnull = 0x14, "ldnull", None, Next;
    LdcI4M1 = 0x15, "ldc.i4.m1", None, Next;
    LdcI40 = 0x16, "ldc.i4.0", None, Next;
    LdcI41 = 0x17, "ldc.i4.1", None, Next;
    LdcI42 = 0x18, "ldc.i4.2", None, Next;
    LdcI43 = 0x19, "ldc.i4.3", None, Next;
    LdcI44 = 0x1A, "ldc.i4.4", None, Next;
    LdcI45 = 0x1B, "ldc.i4.5", None, Next;
    LdcI46 = 0x1C, "ldc.i4.6", None, Next;
    LdcI47 = 0x1D, "ldc.i4.7", None, Next;
    LdcI48 = 0x1E, "ldc.i4.8", None, Next;
    LdcI4S = 0x1F, "ldc.i4.s", ShortInt, Next;
    LdcI4 = 0x20, "ldc.i4", Int, Next;
    LdcI8 = 0x21, "ldc.i8", Int64, Next;
    LdcR4 = 0x22, "ldc.r4", ShortFloat, Next;
    LdcR8 = 0x23, "ldc.r8", Float, Next;
    Dup = 0x25, "dup", None, Next;
    Pop = 0x26, "pop", None, Next;
    Jmp = 0x27, "jmp", Method, Call;
    Call = 0x28, "call", Method, Call;
    Calli = 0x29, "calli", Signature, Call;
    Ret = 0x2A, "ret", None, Return;
    BrS = 0x2B, "br.s", ShortBranch, Branch;
    BrfalseS = 0x2C, "brfalse.s", ShortBranch, CondBranch;
    BrtrueS = 0x2D, "brtrue.s", ShortBranch, CondBranch;
    BeqS = 0x2E, "beq.s", ShortBranch, CondBranch;
    BgeS = 0x2F, "bge.s", ShortBranch, CondBranch;
    BgtS = 0x30, "bgt.s", ShortBranch, CondBranch;
    BleS = 0x31, "ble.s", ShortBranch, CondBranch;
    BltS = 0x32, "blt.s", ShortBranch, CondBranch;
    BneUnS = 0x33, "bne.un.s", ShortBranch, CondBranch;
    BgeUnS = 0x34, "bge.un.s", ShortBranch, CondBranch;
    BgtUnS = 0x35, "bgt.un.s", ShortBranch, CondBranch;
    BleUnS = 0x36, "ble.un.s", ShortBranch, CondBranch;
    BltUnS = 0x37, "blt.un.s", ShortBranch, CondBranch;
    Br = 0x38, "br", Branch, Branch;
    Brfalse = 0x39, "brfalse", Branch, CondBranch;
    Brtrue = 0x3A, "brtrue", Branch, CondBranch;
    Beq = 0x3B, "beq", Branch, CondBranch;
    Bge = 0x3C, "bge", Branch, CondBranch;
    Bgt = 0x3D, "bgt", Branch, CondBranch;
    Ble = 0x3E, "ble", Branch, CondBranch;
    Blt = 0x3F, "blt", Branch, CondBranch;
    BneUn = 0x40, "bne.un", Branch, CondBranch;
    BgeUn = 0x41, "bge.un", Branch, CondBranch;
    BgtUn = 0x42, "bgt.un", Branch, CondBranch;
    BleUn = 0x43, "ble.un", Branch, CondBranch;
    BltUn = 0x44, "blt.un", Branch, CondBranch;
    Switch = 0x45, "switch", Switch, CondBranch;
    LdindI1 = 0x46, "ldind.i1", None, Next;
    LdindU1 = 0x47, "ldind.u1", None, Next;
    LdindI2 = 0x48, "ldind.i2", None, Next;
    LdindU2 = 0x49, "ldind.u2", None, Next;
    LdindI4 = 0x4A, "ldind.i4", None, Next;
    LdindU4 = 0x4B, "ldind.u4", None, Next;
    LdindI8 = 0x4C, "ldind.i8", None, Next;
    LdindI = 0x4D, "ldind.i", None, Next;
    LdindR4 = 0x4E, "ldind.r4", None, Next;
    LdindR8 = 0x4F, "ldind.r8", None, Next;
    LdindRef = 0x50, "ldind.ref", None, Next;
    StindRef = 0x51, "stind.ref", None, Next;
    StindI1 = 0x52, "stind.i1", None, Next;
    StindI2 = 0x53, "stind.i2", None, Next;
    StindI4 = 0x54, "stind.i4", None, Next;
    StindI8 = 0x55, "stind.i8", None, Next;
    StindR4 = 0x56, "stind.r4", None, Next;
    StindR8 = 0x57, "stind.r8", None, Next;
    Add = 0x58, "add", None, Next;
    Sub = 0x59, "sub", None, Next;
    Mul = 0x5A, "mul", None, Next;
    Div = 0x5B, "div", None, Next;
    DivUn = 0x5C, "div.un", None, Next;
    Rem = 0x5D, "rem", None, Next;
    RemUn = 0x5E, "rem.un", None, Next;
    And = 0x5F, "and", None, Next;
    Or = 0x60, "or", None, Next;
    Xor = 0x61, "xor", None, Next;
    Shl = 0x62, "shl", None, Next;
    Shr = 0x63, "shr", None, Next;
    ShrUn = 0x64, "shr.un", None, Next;
    Neg = 0x65, "neg", None, Next;
    Not = 0x66, "not", None, Next;
    ConvI1 = 0x67, "conv.i1", None, Next;
    ConvI2 = 0x68, "conv.i2", None, Next;
    ConvI4 = 0x69, "conv.i4", None, Next;
    ConvI8 = 0x6A, "conv.i8", None, Next;
    ConvR4 = 0x6B, "conv.r4", None, Next;
    ConvR8 = 0x6C, "conv.r8", None, Next;
    ConvU4 = 0x6D, "conv.u4", None, Next;
    ConvU8 = 0x6E, "conv.u8", None, Next;
    Callvirt = 0x6F, "callvirt", Method, Call;
    Cpobj = 0x70, "cpobj", Type, Next;
    Ldobj = 0x71, "ldobj", Type, Next;
    Ldstr = 0x72, "ldstr", String, Next;
    Newobj = 0x73, "newobj", Method, Call;
    Castclass = 0x74, "castclass", Type, Next;
    Isinst = 0x75, "isinst", Type, Next;
    ConvRUn = 0x76, "conv.r.un", None, Next;
    Unbox = 0x79, "unbox", Type, Next;
    Throw = 0x7A, "throw", None, Throw;
    Ldfld = 0x7B, "ldfld", Field, Next;
    Ldflda = 0x7C, "ldflda", Field, Next;
    Stfld = 0x7D, "stfld", Field, Next;
    Ldsfld = 0x7E, "ldsfld", Field, Next;
    Ldsflda = 0x7F, "ldsflda", Field, Next;
    Stsfld = 0x80, "stsfld", Field, Next;
    Stobj = 0x81, "stobj", Type, Next;
    ConvOvfI1Un = 0x82, "conv.ovf.i1.un", None, Next;
    ConvOvfI2Un = 0x83, "conv.ovf.i2.un", None, Next;
    ConvOvfI4Un = 0x84, "conv.ovf.i4.un", None, Next;
    ConvOvfI8Un = 0x85, "conv.ovf.i8.un", None, Next;
    ConvOvfU1Un = 0x86, "conv.ovf.u1.un", None, Next;
    ConvOvfU2Un = 0x87, "conv.ovf.u2.un", None, Next;
    ConvOvfU4Un = 0x88, "conv.ovf.u4.un", None, Next;
    ConvOvfU8Un = 0x89, "conv.ovf.u8.un", None, Next;
    ConvOvfIUn = 0x8A, "conv.ovf.i.un", None, Next;
    ConvOvfUUn = 0x8B, "conv.ovf.u.un", None, Next;
    Box = 0x8C, "box", Type, Next;
    Newarr = 0x8D, "newarr", Type, Next;
    Ldlen = 0x8E, "ldlen", None, Next;
    Ldelema = 0x8F, "ldelema", Type, Next;
    LdelemI1 = 0x90, "ldelem.i1", None, Next;
    LdelemU1 = 0x91, "ldelem.u1", None, Next;
    LdelemI2 = 0x92, "ldelem.i2", None, Next;
    LdelemU2 = 0x93, "ldelem.u2", None, Next;
    LdelemI4 = 0x94, "ldelem.i4", None, Next;
    LdelemU4 = 0x95, "ldelem.u4", None, Next;
    LdelemI8 = 0x96, "ldelem.i8", None, Next;
    LdelemI = 0x97, "ldelem.i", None, Next;
    LdelemR4 = 0x98, "ldelem.r4", None, Next;
    LdelemR8 = 0x99, "ldelem.r8", None, Next;
    LdelemRef = 0x9A, "ldelem.ref", None, Next;
    StelemI = 0x9B, "stelem.i", None, Next;
    StelemI1 = 0x9C, "stelem.i1", None, Next;
    StelemI2 = 0x9D, "stelem.i2", None, Next;
    StelemI4 = 0x9E, "stelem.i4", None, Next;
    StelemI8 = 0x9F, "stelem.i8", None, Next;
    StelemR4 = 0xA0, "stelem.r4", None, Next;
    StelemR8 = 0xA1, "stelem.r8", None, Next;
    StelemRef = 0xA2, "stelem.ref", None, Next;
    Ldelem = 0xA3, "ldelem", Type, Next;
    Stelem = 0xA4, "stelem", Type, Next;
    UnboxAny = 0xA5, "unbox.any", Type, Next;
    ConvOvfI1 = 0xB3, "conv.ovf.i1", None, Next;
    ConvOvfU1 = 0xB4, "conv.ovf.u1", None, Next;
    ConvOvfI2 = 0xB5, "conv.ovf.i2", None, Next;
    ConvOvfU2 = 0xB6, "conv.ovf.u2", None, Next;
    ConvOvfI4 = 0xB7, "conv.ovf.i4", None, Next;
    ConvOvfU4 = 0xB8, "conv.ovf.u4", None, Next;
    ConvOvfI8 = 0xB9, "conv.ovf.i8", None, Next;
    ConvOvfU8 = 0xBA, "conv.ovf.u8", None, Next;
    Refanyval = 0xC2, "refanyval", Type, Next;
    Ckfinite = 0xC3, "ckfinite", None, Next;
    Mkrefany = 0xC6, "mkrefany", Type, Next;
    Ldtoken = 0xD0, "ldtoken", Token, Next;
    ConvU2 = 0xD1, "conv.u2", None, Next;
    ConvU1 = 0xD2, "conv.u1", None, Next;
    ConvI = 0xD3, "conv.i", None, Next;
    ConvOvfI = 0xD4, "conv.ovf.i", None, Next;
    ConvOvfU = 0xD5, "conv.ovf.u", None, Next;
    AddOvf = 0xD6, "add.ovf", None, Next;
    AddOvfUn = 0xD7, "add.ovf.un", None, Next;
    MulOvf = 0xD8, "mul.ovf", None, Next;
    MulOvfUn = 0xD9, "mul.ovf.un", None, Next;
    SubOvf = 0xDA, "sub.ovf", None, Next;
    SubOvfUn = 0xDB, "sub.ovf.un", None, Next;
    Endfinally = 0xDC, "endfinally", None, Return;
    Leave = 0xDD, "leave", Branch, Branch;
    LeaveS = 0xDE, "leave.s", ShortBranch, Branch;
    StindI = 0xDF, "stind.i", None, Next;
    ConvU = 0xE0, "conv.u", None, Next;
    Arglist = 0xFE00, "arglist", None, Next;
    Ceq = 0xFE01, "ceq", None, Next;
    Cgt = 0xFE02, "cgt", None, Next;
    CgtUn = 0xFE03, "cgt.un", None, Next;
    Clt = 0xFE04, "clt", None, Next;
    CltUn = 0xFE05, "clt.un", None, Next;
    Ldftn = 0xFE06, "ldftn", Method, Next;
    Ldvirtftn = 0xFE07, "ldvirtftn", Method, Next;
    Ldarg = 0xFE09, "ldarg", Var, Next;
    Ldarga = 0xFE0A, "ldarga", Var, Next;
    Starg = 0xFE0B, "starg", Var, Next;
    Ldloc = 0xFE0C, "ldloc", Var, Next;
    Ldloca = 0xFE0D, "ldloca", Var, Next;
    Stloc = 0xFE0E, "stloc", Var, Next;
    Localloc = 0xFE0F, "localloc", None, Next;
    Endfilter = 0xFE11, "endfilter", None, Return;
    Unaligned = 0xFE12, "unaligned.", Byte, Meta;
    Volatile = 0xFE13, "volatile.", None, Meta;
    Tail = 0xFE14, "tail.", None, Meta;
    Initobj = 0xFE15, "initobj", Type, Next;
    Constrained = 0xFE16, "constrained.", Type, Meta;
    Cpblk = 0xFE17, "cpblk", None, Next;
    Initblk = 0xFE18, "initblk", None, Next;
    No = 0xFE19, "no.", Byte, Meta;
    Rethrow = 0xFE1A, "rethrow", None, Throw;
    Sizeof = 0xFE1C, "sizeof", Type, Next;
    Refanytype = 0xFE1D, "refanytype", None, Next;
    Readonly = 0xFE1E, "readonly.", None, Meta;
}

static PRIMARY: LazyLock<[Option<OpCode>; 256]> = LazyLock::new(|| build_table(false));
static SECONDARY: LazyLock<[Option<OpCode>; 256]> = LazyLock::new(|| build_table(true));

fn build_table(secondary: bool) -> [Option<OpCode>; 256] {
    let mut table = [None; 256];
    for opcode in OpCode::iter() {
        let [high, low] = opcode.value().to_be_bytes();
        match (secondary, high) {
            (false, 0) => table[usize::from(low)] = Some(opcode),
            (true, ESCAPE_BYTE) => table[usize::from(low)] = Some(opcode),
            _ => {}
        }
    }
    table
}

/// Number of opcodes in the catalog
pub const OPCODE_COUNT: usize = OpCode::COUNT;

impl OpCode {
    /// The single byte opcode encoded as `byte`
    #[must_use]
    pub fn from_primary(byte: u8) -> Option<OpCode> {
        PRIMARY[usize::from(byte)]
    }

    /// The two byte opcode `0xFE byte`
    #[must_use]
    pub fn from_secondary(byte: u8) -> Option<OpCode> {
        SECONDARY[usize::from(byte)]
    }

    /// Number of bytes the opcode itself occupies
    #[must_use]
    pub const fn size(self) -> usize {
        if self.value() > 0xFF {
            2
        } else {
            1
        }
    }

    /// The general form a shortcut is rewritten into, `self` for general opcodes.
    #[must_use]
    pub const fn general_form(self) -> OpCode {
        match self {
            OpCode::Ldarg0
            | OpCode::Ldarg1
            | OpCode::Ldarg2
            | OpCode::Ldarg3
            | OpCode::LdargS => OpCode::Ldarg,
            OpCode::LdargaS => OpCode::Ldarga,
            OpCode::StargS => OpCode::Starg,
            OpCode::Ldloc0
            | OpCode::Ldloc1
            | OpCode::Ldloc2
            | OpCode::Ldloc3
            | OpCode::LdlocS => OpCode::Ldloc,
            OpCode::LdlocaS => OpCode::Ldloca,
            OpCode::Stloc0
            | OpCode::Stloc1
            | OpCode::Stloc2
            | OpCode::Stloc3
            | OpCode::StlocS => OpCode::Stloc,
            OpCode::LdcI4M1
            | OpCode::LdcI40
            | OpCode::LdcI41
            | OpCode::LdcI42
            | OpCode::LdcI43
            | OpCode::LdcI44
            | OpCode::LdcI45
            | OpCode::LdcI46
            | OpCode::LdcI47
            | OpCode::LdcI48
            | OpCode::LdcI4S => OpCode::LdcI4,
            OpCode::BrS => OpCode::Br,
            OpCode::BrfalseS => OpCode::Brfalse,
            OpCode::BrtrueS => OpCode::Brtrue,
            OpCode::BeqS => OpCode::Beq,
            OpCode::BgeS => OpCode::Bge,
            OpCode::BgtS => OpCode::Bgt,
            OpCode::BleS => OpCode::Ble,
            OpCode::BltS => OpCode::Blt,
            OpCode::BneUnS => OpCode::BneUn,
            OpCode::BgeUnS => OpCode::BgeUn,
            OpCode::BgtUnS => OpCode::BgtUn,
            OpCode::BleUnS => OpCode::BleUn,
            OpCode::BltUnS => OpCode::BltUn,
            OpCode::LeaveS => OpCode::Leave,
            other => other,
        }
    }

    /// The operand a shortcut without inline operand stands for
    #[must_use]
    pub const fn implicit_operand(self) -> Option<i32> {
        match self {
            OpCode::Ldarg0 | OpCode::Ldloc0 | OpCode::Stloc0 | OpCode::LdcI40 => Some(0),
            OpCode::Ldarg1 | OpCode::Ldloc1 | OpCode::Stloc1 | OpCode::LdcI41 => Some(1),
            OpCode::Ldarg2 | OpCode::Ldloc2 | OpCode::Stloc2 | OpCode::LdcI42 => Some(2),
            OpCode::Ldarg3 | OpCode::Ldloc3 | OpCode::Stloc3 | OpCode::LdcI43 => Some(3),
            OpCode::LdcI44 => Some(4),
            OpCode::LdcI45 => Some(5),
            OpCode::LdcI46 => Some(6),
            OpCode::LdcI47 => Some(7),
            OpCode::LdcI48 => Some(8),
            OpCode::LdcI4M1 => Some(-1),
            _ => None,
        }
    }

    /// True for the rewritten short and implicit-operand forms
    #[must_use]
    pub fn is_shortcut(self) -> bool {
        self.general_form() != self
    }
}

impl std::fmt::Display for OpCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use crate::disassembler::{FlowType, OpCode, OperandType};

    #[test]
    fn tables_cover_catalog() {
        let mut found = 0;
        for byte in 0..=255u8 {
            if OpCode::from_primary(byte).is_some() {
                found += 1;
            }
            if OpCode::from_secondary(byte).is_some() {
                found += 1;
            }
        }
        assert_eq!(found, OpCode::iter().count());
        assert_eq!(OpCode::from_primary(0xFE), None);
        assert_eq!(OpCode::from_primary(0x24), None);
    }

    #[test]
    fn lookup() {
        assert_eq!(OpCode::from_primary(0x2A), Some(OpCode::Ret));
        assert_eq!(OpCode::from_secondary(0x01), Some(OpCode::Ceq));
        assert_eq!(OpCode::Ceq.size(), 2);
        assert_eq!(OpCode::Switch.operand_type(), OperandType::Switch);
        assert_eq!(OpCode::Leave.flow(), FlowType::Branch);
        assert_eq!(OpCode::Constrained.name(), "constrained.");
    }

    #[test]
    fn shortcuts() {
        assert_eq!(OpCode::Ldarg2.general_form(), OpCode::Ldarg);
        assert_eq!(OpCode::LdcI4M1.implicit_operand(), Some(-1));
        assert_eq!(OpCode::BleUnS.general_form(), OpCode::BleUn);
        assert!(!OpCode::Ldfld.is_shortcut());
        for opcode in OpCode::iter().filter(|o| o.is_shortcut()) {
            let general = opcode.general_form();
            assert!(!general.is_shortcut(), "{opcode} expands to a shortcut");
            assert_ne!(general.operand_type(), OperandType::ShortBranch);
        }
    }
}
