//! Parser for the `avr-size` section summary:
//!
//! ```text
//!    text    data     bss     dec     hex filename
//!    1234      12      34    1280     500 program.elf
//! ```
//!
//! Only `.data` and `.bss` matter for the RAM budget; `.text` rides
//! along for the record. Unlike the listing parsers this one is all or
//! nothing: a size summary that does not parse is a fatal input error.

use thiserror::Error;


#[derive(Error, Debug)]
pub enum SizesError
{
    #[error("no usable size summary line found in `{0}`")]
    Malformed(String),
}


#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SectionSizes
{
    pub text: u64,
    pub data: u64,
    pub bss:  u64,
}

impl SectionSizes
{
    /// Bytes of RAM statically claimed before the stack gets any.
    pub fn static_ram(&self) -> u64
    {
        self.data + self.bss
    }
}


pub fn parse(text: &str) -> Result<SectionSizes, SizesError>
{
    for line in text.lines()
    {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 3
        {
            continue;
        }
        // The header line starts with the word "text"; data lines start
        // with the .text byte count.
        let parsed: Option<Vec<u64>> = fields[..3]
            .iter()
            .map(|f| f.parse().ok())
            .collect();
        if let Some(v) = parsed
        {
            return Ok(SectionSizes
            {
                text: v[0],
                data: v[1],
                bss:  v[2],
            });
        }
    }

    Err(SizesError::Malformed(
        text.lines().next().unwrap_or("").to_string(),
    ))
}




#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn parses_a_summary_with_header()
    {
        let s = parse("   text\t   data\t    bss\t    dec\t    hex\tfilename\n   1034\t    100\t    256\t   1390\t    56e\tprog.elf\n")
            .unwrap();
        assert_eq!(s, SectionSizes { text: 1034, data: 100, bss: 256 });
        assert_eq!(s.static_ram(), 356);
    }

    #[test]
    fn parses_a_bare_data_line()
    {
        let s = parse("512 4 0 516 204 blinky.elf\n").unwrap();
        assert_eq!(s.data, 4);
        assert_eq!(s.bss, 0);
    }

    #[test]
    fn missing_summary_is_fatal()
    {
        assert!(parse("").is_err());
        assert!(parse("   text\t   data\t    bss\n").is_err());
    }
}
