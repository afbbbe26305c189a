//! AVR-specific instruction knowledge, kept apart from the graph
//! logic: which mnemonics transfer control, how objdump spells targets
//! and immediates, and which instruction patterns ahead of a recursive
//! call give away a bounded recursion.
//!
//! Addresses come in two currencies. Symbol headers and call operands
//! in the listing are byte addresses, but the program counter (and so
//! every address materialized for `icall`) counts 16-bit words. Lookups
//! therefore probe both `a` and `a * 2`.

use crate::disasm::Instruction;


pub fn is_direct_call(mnemonic: &str) -> bool
{
    mnemonic == "call" || mnemonic == "rcall"
}

pub fn is_indirect_call(mnemonic: &str) -> bool
{
    mnemonic == "icall" || mnemonic == "eicall"
}

pub fn is_jump(mnemonic: &str) -> bool
{
    mnemonic == "jmp" || mnemonic == "rjmp"
}


/// `0xb6` or plain decimal.
pub fn parse_address(operand: &str) -> Option<u32>
{
    match operand.strip_prefix("0x")
    {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None      => operand.parse().ok(),
    }
}

/// `.+14` / `.-6` relative displacement of `rcall`/`rjmp`.
pub fn parse_relative(operand: &str) -> Option<i32>
{
    operand.strip_prefix('.')?.parse().ok()
}

/// Resolved target of a relative instruction: displacement is from the
/// end of the 2-byte opcode.
pub fn relative_target(site: u32, displacement: i32) -> u32
{
    (site as i64 + 2 + displacement as i64) as u32
}

/// Symbol inside an objdump annotation, `0xb6 <foo>` ⇒ `foo`. A
/// `<foo+0x12>` form points into the middle of `foo` and names no
/// entry, so it resolves nothing.
pub fn comment_symbol(comment: &str) -> Option<&str>
{
    let start = comment.find('<')? + 1;
    let end = comment[start..].find('>')? + start;
    let sym = &comment[start..end];
    if sym.is_empty() || sym.contains('+') || sym.contains('-')
    {
        return None;
    }
    Some(sym)
}

/// Leading address of an objdump annotation, `0xb6 <foo>` ⇒ `0xb6`.
pub fn comment_address(comment: &str) -> Option<u32>
{
    let first = comment.split_whitespace().next()?;
    first.strip_prefix("0x")
        .and_then(|hex| u32::from_str_radix(hex, 16).ok())
}

/// `r24` ⇒ 24.
pub fn parse_register(operand: &str) -> Option<u8>
{
    let n: u8 = operand.strip_prefix('r')?.parse().ok()?;
    if n < 32 { Some(n) } else { None }
}


/// What an `ldi` loads: a known byte, or half of a symbol's address
/// when objdump kept the relocation spelled out (`lo8(tick)`,
/// `pm_hi8(tick)`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LdiValue
{
    Byte(u8),
    SymbolLow(String),
    SymbolHigh(String),
}

/// Decodes `ldi rN, <imm>`. Returns the destination register and the
/// loaded value.
pub fn parse_ldi(ins: &Instruction) -> Option<(u8, LdiValue)>
{
    if ins.mnemonic != "ldi" || ins.operands.len() < 2
    {
        return None;
    }
    let reg = parse_register(&ins.operands[0])?;
    let imm = ins.operands[1].as_str();

    for (prefix, high) in [("pm_lo8(", false), ("lo8(", false), ("pm_hi8(", true), ("hi8(", true)]
    {
        if let Some(inner) = imm.strip_prefix(prefix).and_then(|s| s.strip_suffix(')'))
        {
            return Some((reg, match parse_address(inner)
            {
                Some(v) if high => LdiValue::Byte((v >> 8) as u8),
                Some(v)         => LdiValue::Byte(v as u8),
                None if high    => LdiValue::SymbolHigh(inner.to_string()),
                None            => LdiValue::SymbolLow(inner.to_string()),
            }));
        }
    }

    parse_address(imm).map(|v| (reg, LdiValue::Byte(v as u8)))
}


/// Constant subtracted from a register by one instruction, if any:
/// `subi rN, k`, `sbiw rN, k` or `dec rN`.
pub fn sub_constant(ins: &Instruction) -> Option<u64>
{
    match ins.mnemonic.as_str()
    {
        "dec" if !ins.operands.is_empty() => Some(1),
        "subi" | "sbiw" if ins.operands.len() >= 2 =>
        {
            let k = parse_address(&ins.operands[1])? as u64;
            // Large subi immediates are negated additions.
            if (1..=127).contains(&k) { Some(k) } else { None }
        }
        _ => None,
    }
}

/// Register shifted right by `lsr`/`asr`, if any.
pub fn shift_register(ins: &Instruction) -> Option<u8>
{
    match ins.mnemonic.as_str()
    {
        "lsr" | "asr" => ins.operands.first().and_then(|op| parse_register(op)),
        _             => None,
    }
}




/// Compile-time-recognizable reduction of a recursion argument between
/// activations. Each form yields a closed-form depth bound over the
/// argument's value domain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecursionPattern
{
    /// Argument decreases by a constant per call.
    MinusK(u64),
    /// Argument divides by a constant per call.
    DivK(u64),
    /// Argument shifts right by k bits per call.
    ShiftK(u32),
    Unknown,
}

/// Smallest d with base^d >= bound.
fn ceil_log(bound: u64, base: u64) -> u64
{
    let mut d = 0;
    let mut reach: u64 = 1;
    while reach < bound
    {
        reach = reach.saturating_mul(base);
        d += 1;
    }
    d
}

impl RecursionPattern
{
    ///
    /// Maximum number of simultaneous activations given an upper bound
    /// on the argument's value. The second component is true when the
    /// result is the configured ceiling rather than a derived bound.
    ///
    pub fn depth_bound(&self, domain: u64, cap: u64) -> (u64, bool)
    {
        match *self
        {
            RecursionPattern::MinusK(k) =>
            {
                let k = k.max(1);
                (domain.div_ceil(k) + 1, false)
            }
            RecursionPattern::DivK(k) =>
            {
                (ceil_log(domain, k.max(2)) + 1, false)
            }
            RecursionPattern::ShiftK(k) =>
            {
                (ceil_log(domain, 1u64 << k.clamp(1, 63)) + 1, false)
            }
            RecursionPattern::Unknown => (cap, true),
        }
    }
}


impl core::fmt::Display for RecursionPattern
{
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result
    {
        match *self
        {
            RecursionPattern::MinusK(k) => write!(f, "subtraction by {}", k),
            RecursionPattern::DivK(k)   => write!(f, "division by {}", k),
            RecursionPattern::ShiftK(k) => write!(f, "right shift by {}", k),
            RecursionPattern::Unknown   => f.write_str("unclassified"),
        }
    }
}


/// How far back from a recursive call site classification looks.
pub const CLASSIFY_WINDOW: usize = 16;

///
/// Scans the instructions ahead of a recursive call site for argument
/// reductions. `resolve` maps a call instruction to its callee name so
/// that calls into the integer-division helpers (`__udivmodqi4` and
/// relatives) can be paired with the divisor constant loaded before
/// them. Returns every candidate seen; the caller picks the one with
/// the largest depth reduction.
///
pub fn classify_window<F>(window: &[Instruction], resolve: F) -> Vec<RecursionPattern>
where
    F: Fn(&Instruction) -> Option<String>,
{
    let mut candidates = Vec::new();

    let mut last_ldi_const: Option<u64> = None;
    let mut shift_run: Option<(u8, u32)> = None;

    for ins in window
    {
        if let Some(reg) = shift_register(ins)
        {
            shift_run = match shift_run
            {
                Some((r, n)) if r == reg => Some((reg, n + 1)),
                _ =>
                {
                    if let Some((_, n)) = shift_run
                    {
                        candidates.push(RecursionPattern::ShiftK(n));
                    }
                    Some((reg, 1))
                }
            };
            continue;
        }
        if let Some((_, n)) = shift_run.take()
        {
            candidates.push(RecursionPattern::ShiftK(n));
        }

        if let Some(k) = sub_constant(ins)
        {
            candidates.push(RecursionPattern::MinusK(k));
            continue;
        }

        if let Some((_, LdiValue::Byte(v))) = parse_ldi(ins)
        {
            last_ldi_const = Some(v as u64);
            continue;
        }

        if is_direct_call(&ins.mnemonic)
        {
            if let Some(callee) = resolve(ins)
            {
                if callee.contains("divmod")
                {
                    if let Some(k) = last_ldi_const.filter(|&k| k >= 2)
                    {
                        candidates.push(RecursionPattern::DivK(k));
                    }
                }
            }
        }
    }

    if let Some((_, n)) = shift_run
    {
        candidates.push(RecursionPattern::ShiftK(n));
    }

    candidates
}

///
/// Picks the pattern with the largest depth reduction (the smallest
/// bound) for one call site, per the site's argument domain.
///
pub fn best_pattern(candidates: &[RecursionPattern], domain: u64, cap: u64) -> RecursionPattern
{
    candidates
        .iter()
        .copied()
        .min_by_key(|p| p.depth_bound(domain, cap).0)
        .unwrap_or(RecursionPattern::Unknown)
}
