//! GPR identity and the general-purpose register file.
//!
//! Each slot is a `Register` union cell (signed/unsigned/float views of the same 32
//! bits), matching the teacher's representation; this file adds the 35-entry MIPS
//! register identity on top (zero..ra plus pc, hi, lo) with stable numeric indices.

use std::fmt;
use std::str::FromStr;

use crate::constants::REGISTER_COUNT;

#[derive(Clone, Copy)]
pub union Register {
    i: i32,
    u: u32,
    f: f32,
}

impl Register {
    pub fn i(self) -> i32 {
        unsafe { self.i }
    }

    pub fn u(self) -> u32 {
        unsafe { self.u }
    }

    pub fn f(self) -> f32 {
        unsafe { self.f }
    }

    pub fn set_i(&mut self, value: i32) {
        self.i = value;
    }

    pub fn set_u(&mut self, value: u32) {
        self.u = value;
    }

    pub fn set_f(&mut self, value: f32) {
        self.f = value;
    }
}

impl Default for Register {
    fn default() -> Register {
        Register { u: 0 }
    }
}

/// Stable indices for the 35 general-purpose registers (§3 "Register identity").
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Gpr {
    Zero,
    At,
    V0,
    V1,
    A0,
    A1,
    A2,
    A3,
    T0,
    T1,
    T2,
    T3,
    T4,
    T5,
    T6,
    T7,
    T8,
    T9,
    S0,
    S1,
    S2,
    S3,
    S4,
    S5,
    S6,
    S7,
    K0,
    K1,
    Gp,
    Sp,
    Fp,
    Ra,
    Pc,
    Hi,
    Lo,
}

impl Gpr {
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Gpr> {
        use Gpr::*;
        const ORDER: [Gpr; REGISTER_COUNT] = [
            Zero, At, V0, V1, A0, A1, A2, A3, T0, T1, T2, T3, T4, T5, T6, T7, T8, T9, S0, S1, S2,
            S3, S4, S5, S6, S7, K0, K1, Gp, Sp, Fp, Ra, Pc, Hi, Lo,
        ];
        ORDER.get(index).copied()
    }
}

#[derive(Debug, Clone)]
pub struct ParseGprError(pub String);

impl fmt::Display for ParseGprError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "unknown register name \"{}\"", self.0)
    }
}

impl std::error::Error for ParseGprError {}

impl FromStr for Gpr {
    type Err = ParseGprError;

    fn from_str(s: &str) -> Result<Gpr, ParseGprError> {
        use Gpr::*;
        match s {
            "zero" => Ok(Zero),
            "at" => Ok(At),
            "v0" => Ok(V0),
            "v1" => Ok(V1),
            "a0" => Ok(A0),
            "a1" => Ok(A1),
            "a2" => Ok(A2),
            "a3" => Ok(A3),
            "t0" => Ok(T0),
            "t1" => Ok(T1),
            "t2" => Ok(T2),
            "t3" => Ok(T3),
            "t4" => Ok(T4),
            "t5" => Ok(T5),
            "t6" => Ok(T6),
            "t7" => Ok(T7),
            "t8" => Ok(T8),
            "t9" => Ok(T9),
            "s0" => Ok(S0),
            "s1" => Ok(S1),
            "s2" => Ok(S2),
            "s3" => Ok(S3),
            "s4" => Ok(S4),
            "s5" => Ok(S5),
            "s6" => Ok(S6),
            "s7" => Ok(S7),
            "k0" => Ok(K0),
            "k1" => Ok(K1),
            "gp" => Ok(Gp),
            "sp" => Ok(Sp),
            "fp" => Ok(Fp),
            "ra" => Ok(Ra),
            "pc" => Ok(Pc),
            "hi" => Ok(Hi),
            "lo" => Ok(Lo),
            other => Err(ParseGprError(other.to_string())),
        }
    }
}

impl fmt::Display for Gpr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use Gpr::*;
        let name = match self {
            Zero => "zero",
            At => "at",
            V0 => "v0",
            V1 => "v1",
            A0 => "a0",
            A1 => "a1",
            A2 => "a2",
            A3 => "a3",
            T0 => "t0",
            T1 => "t1",
            T2 => "t2",
            T3 => "t3",
            T4 => "t4",
            T5 => "t5",
            T6 => "t6",
            T7 => "t7",
            T8 => "t8",
            T9 => "t9",
            S0 => "s0",
            S1 => "s1",
            S2 => "s2",
            S3 => "s3",
            S4 => "s4",
            S5 => "s5",
            S6 => "s6",
            S7 => "s7",
            K0 => "k0",
            K1 => "k1",
            Gp => "gp",
            Sp => "sp",
            Fp => "fp",
            Ra => "ra",
            Pc => "pc",
            Hi => "hi",
            Lo => "lo",
        };
        write!(f, "{}", name)
    }
}

/// The general-purpose register file: 35 slots, `$zero` hardwired to 0 on write.
#[derive(Clone)]
pub struct RegisterFile {
    slots: [Register; REGISTER_COUNT],
}

impl RegisterFile {
    pub fn new() -> Self {
        RegisterFile {
            slots: [Register::default(); REGISTER_COUNT],
        }
    }

    pub fn get(&self, reg: Gpr) -> Register {
        self.slots[reg.index()]
    }

    pub fn get_i(&self, reg: Gpr) -> i32 {
        self.slots[reg.index()].i()
    }

    pub fn get_u(&self, reg: Gpr) -> u32 {
        self.slots[reg.index()].u()
    }

    pub fn set_i(&mut self, reg: Gpr, value: i32) {
        if reg == Gpr::Zero {
            return;
        }
        self.slots[reg.index()].set_i(value);
    }

    pub fn set_u(&mut self, reg: Gpr, value: u32) {
        if reg == Gpr::Zero {
            return;
        }
        self.slots[reg.index()].set_u(value);
    }
}

impl Default for RegisterFile {
    fn default() -> Self {
        RegisterFile::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_register_ignores_writes() {
        let mut rf = RegisterFile::new();
        rf.set_i(Gpr::Zero, 42);
        assert_eq!(rf.get_i(Gpr::Zero), 0);
    }

    #[test]
    fn round_trip_name() {
        for i in 0..REGISTER_COUNT {
            let gpr = Gpr::from_index(i).unwrap();
            let parsed: Gpr = gpr.to_string().parse().unwrap();
            assert_eq!(gpr, parsed);
        }
    }

    #[test]
    fn stable_indices() {
        assert_eq!(Gpr::Zero.index(), 0);
        assert_eq!(Gpr::Ra.index(), 31);
        assert_eq!(Gpr::Pc.index(), 32);
        assert_eq!(Gpr::Lo.index(), 34);
    }
}
