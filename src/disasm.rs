//! Parser for objdump-style AVR disassembly listings. The listing is a
//! stream of section markers (`Disassembly of section .text:`), symbol
//! headers (`00000090 <main>:`) and tab-separated instruction lines
//! (`  94:\t0e 94 64 00 \tcall\t0xc8\t; 0xc8 <foo>`). Only code
//! sections are scanned; everything else is discarded.

use log::warn;


#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Instruction
{
    pub address:  u32,
    /// Lowercased. Only a handful of mnemonics are interpreted
    /// downstream; the rest ride along opaquely.
    pub mnemonic: String,
    /// Operand fields, verbatim.
    pub operands: Vec<String>,
    /// Trailing `; ...` annotation, if any. objdump resolves call and
    /// load targets here, which is the most reliable name source.
    pub comment:  Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FunctionBlock
{
    /// Symbol name as printed; canonicalize with [`canonical_name`].
    pub name:         String,
    pub address:      u32,
    pub section:      String,
    pub instructions: Vec<Instruction>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Listing
{
    pub functions:       Vec<FunctionBlock>,
    /// Lines inside code sections that should have tokenized but did not.
    pub discarded_lines: u64,
}


/// Sections whose symbols are functions worth scanning.
fn is_code_section(name: &str) -> bool
{
    name == ".text"
        || name.starts_with(".text.")
        || name.starts_with(".init")
        || name == ".vectors"
}

///
/// Strips the clone suffixes GCC appends to specialized copies of a
/// function (`frob.constprop.0`, `frob.isra.1`, `frob.part.0`, plain
/// `frob.1`), so that every artifact indexes the same symbol.
///
pub fn canonical_name(mut name: &str) -> &str
{
    loop
    {
        match name.rfind('.')
        {
            Some(i) if i > 0 =>
            {
                let tail = &name[i + 1..];
                let is_clone = (!tail.is_empty() && tail.bytes().all(|b| b.is_ascii_digit()))
                    || matches!(tail, "constprop" | "isra" | "part");
                if !is_clone
                {
                    return name;
                }
                name = &name[..i];
            }
            _ => return name,
        }
    }
}


/// Parses the whole listing into per-function instruction blocks.
/// An empty result means the artifact was not a disassembly at all;
/// the caller treats that as fatal.
pub fn parse(text: &str) -> Listing
{
    let mut listing = Listing::default();
    // Some(name) while inside a code section.
    let mut section: Option<String> = None;

    for raw in text.lines()
    {
        let line = raw.trim_end();
        if line.is_empty()
        {
            continue;
        }

        if let Some(rest) = line.strip_prefix("Disassembly of section ")
        {
            let name = rest.trim().trim_end_matches(':');
            section = if is_code_section(name) { Some(name.to_string()) } else { None };
            continue;
        }

        let sec = match &section
        {
            Some(sec) => sec,
            None      => continue,
        };

        if let Some((address, name)) = parse_symbol_header(line)
        {
            // Local labels do not terminate the enclosing function.
            if name.starts_with(".L")
            {
                continue;
            }
            listing.functions.push(FunctionBlock
            {
                name: name.to_string(),
                address,
                section: sec.clone(),
                instructions: Vec::new(),
            });
            continue;
        }

        // objdump prints "..." for skipped gaps.
        if line.trim() == "..."
        {
            continue;
        }

        match (parse_instruction(line), listing.functions.last_mut())
        {
            (Some(ins), Some(block)) =>
            {
                block.instructions.push(ins);
            }
            _ if line.contains('\t') =>
            {
                warn!("disassembly line did not tokenize: `{}`", line);
                listing.discarded_lines += 1;
            }
            _ => {} // prose between sections, file headers, etc.
        }
    }

    listing
}

/// `00000090 <main>:`
fn parse_symbol_header(line: &str) -> Option<(u32, &str)>
{
    let mut tokens = line.split_whitespace();
    let addr = u32::from_str_radix(tokens.next()?, 16).ok()?;
    let sym = tokens.next()?;
    if tokens.next().is_some()
    {
        return None;
    }
    let name = sym.strip_prefix('<')?.strip_suffix(">:")?;
    if name.is_empty()
    {
        return None;
    }
    Some((addr, name))
}

/// `  94:\t0e 94 64 00 \tcall\t0xc8\t; 0xc8 <foo>`
fn parse_instruction(line: &str) -> Option<Instruction>
{
    let mut fields = line.split('\t');

    let address = fields
        .next()?
        .trim()
        .strip_suffix(':')
        .and_then(|a| u32::from_str_radix(a, 16).ok())?;

    let _encoding = fields.next()?;

    let mnemonic = fields.next()?.trim().to_lowercase();
    if mnemonic.is_empty()
    {
        return None;
    }

    let rest = fields.collect::<Vec<_>>().join("\t");
    let (operand_text, comment) = match rest.split_once(';')
    {
        Some((ops, c)) => (ops, Some(c.trim().to_string())),
        None           => (rest.as_str(), None),
    };

    let operands = operand_text
        .split(',')
        .map(|op| op.trim())
        .filter(|op| !op.is_empty())
        .map(|op| op.to_string())
        .collect();

    Some(Instruction
    {
        address,
        mnemonic,
        operands,
        comment,
    })
}
