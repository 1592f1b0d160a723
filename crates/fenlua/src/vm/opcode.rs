//! The Lua 5.1-style instruction set and 32-bit encoding (spec §4.4, §I).
//!
//! Layout, mirroring real Lua 5.1's `lopcodes.h`:
//!   iABC:  Op(6) | A(8) | C(9) | B(9)
//!   iABx:  Op(6) | A(8) | Bx(18)
//!   iAsBx: Op(6) | A(8) | sBx(18, offset-encoded)
//!
//! `B`/`C` are 9-bit "RK" operands: the top bit (`BITRK`) marks "this is a
//! constant-table index", the low 8 bits are either a register or a
//! constant index depending on that bit.

pub const SIZE_OP: u32 = 6;
pub const SIZE_A: u32 = 8;
pub const SIZE_B: u32 = 9;
pub const SIZE_C: u32 = 9;
pub const SIZE_BX: u32 = SIZE_B + SIZE_C;

pub const POS_OP: u32 = 0;
pub const POS_A: u32 = POS_OP + SIZE_OP;
pub const POS_C: u32 = POS_A + SIZE_A;
pub const POS_B: u32 = POS_C + SIZE_C;
pub const POS_BX: u32 = POS_C;

pub const MAX_A: u32 = (1 << SIZE_A) - 1;
pub const MAX_B: u32 = (1 << SIZE_B) - 1;
pub const MAX_C: u32 = (1 << SIZE_C) - 1;
pub const MAX_BX: u32 = (1 << SIZE_BX) - 1;
pub const MAX_SBX: i32 = (MAX_BX >> 1) as i32;

/// Top bit of a 9-bit RK operand: set means "constant table index".
pub const BITRK: u32 = 1 << (SIZE_B - 1);
pub const MAX_INDEX_RK: u32 = BITRK - 1;

pub fn is_constant(rk: u32) -> bool {
    rk & BITRK != 0
}

pub fn rk_constant_index(rk: u32) -> u32 {
    rk & !BITRK
}

pub fn rk_from_constant(index: u32) -> u32 {
    index | BITRK
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpMode {
    IABC,
    IABx,
    IAsBx,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    Move = 0,
    LoadK,
    LoadKX,
    LoadNil,
    LoadBool,
    GetGlobal,
    SetGlobal,
    GetUpval,
    SetUpval,
    NewTable,
    GetTable,
    SetTable,
    SelfOp,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Unm,
    Not,
    Len,
    Concat,
    Eq,
    Lt,
    Le,
    Jmp,
    Test,
    TestSet,
    Call,
    TailCall,
    Return,
    Vararg,
    Closure,
    Close,
    ForPrep,
    ForLoop,
    TForLoop,
}

impl OpCode {
    pub fn mode(self) -> OpMode {
        use OpCode::*;
        match self {
            LoadK | Closure | GetGlobal | SetGlobal => OpMode::IABx,
            Jmp | ForPrep | ForLoop | TForLoop => OpMode::IAsBx,
            _ => OpMode::IABC,
        }
    }

    pub fn from_u8(b: u8) -> Self {
        // SAFETY-free decode: match every discriminant explicitly so an
        // out-of-range byte panics loudly instead of producing an invalid
        // enum value.
        const TABLE: [OpCode; 37] = [
            OpCode::Move,
            OpCode::LoadK,
            OpCode::LoadKX,
            OpCode::LoadNil,
            OpCode::LoadBool,
            OpCode::GetGlobal,
            OpCode::SetGlobal,
            OpCode::GetUpval,
            OpCode::SetUpval,
            OpCode::NewTable,
            OpCode::GetTable,
            OpCode::SetTable,
            OpCode::SelfOp,
            OpCode::Add,
            OpCode::Sub,
            OpCode::Mul,
            OpCode::Div,
            OpCode::Mod,
            OpCode::Pow,
            OpCode::Unm,
            OpCode::Not,
            OpCode::Len,
            OpCode::Concat,
            OpCode::Eq,
            OpCode::Lt,
            OpCode::Le,
            OpCode::Jmp,
            OpCode::Test,
            OpCode::TestSet,
            OpCode::Call,
            OpCode::TailCall,
            OpCode::Return,
            OpCode::Vararg,
            OpCode::Closure,
            OpCode::Close,
            OpCode::ForPrep,
            OpCode::ForLoop,
        ];
        // TForLoop sits past the 37-entry compact table above only because
        // listing all 38 inline make the match arm below easier to read;
        // index directly instead.
        if b as usize == TABLE.len() {
            OpCode::TForLoop
        } else {
            TABLE[b as usize]
        }
    }
}

/// One bytecode instruction: a bitpacked 32-bit word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction(pub u32);

impl Instruction {
    pub fn iabc(op: OpCode, a: u32, b: u32, c: u32) -> Self {
        debug_assert!(a <= MAX_A && b <= MAX_B && c <= MAX_C);
        Instruction((op as u32) | (a << POS_A) | (c << POS_C) | (b << POS_B))
    }

    pub fn iabx(op: OpCode, a: u32, bx: u32) -> Self {
        debug_assert!(a <= MAX_A && bx <= MAX_BX);
        Instruction((op as u32) | (a << POS_A) | (bx << POS_BX))
    }

    pub fn iasbx(op: OpCode, a: u32, sbx: i32) -> Self {
        let bx = (sbx + MAX_SBX) as u32;
        Self::iabx(op, a, bx)
    }

    pub fn op(self) -> OpCode {
        OpCode::from_u8((self.0 & ((1 << SIZE_OP) - 1)) as u8)
    }

    pub fn a(self) -> u32 {
        (self.0 >> POS_A) & MAX_A
    }

    pub fn b(self) -> u32 {
        (self.0 >> POS_B) & MAX_B
    }

    pub fn c(self) -> u32 {
        (self.0 >> POS_C) & MAX_C
    }

    pub fn bx(self) -> u32 {
        (self.0 >> POS_BX) & MAX_BX
    }

    pub fn sbx(self) -> i32 {
        self.bx() as i32 - MAX_SBX
    }
}
