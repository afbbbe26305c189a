//! Parser for the per-function stack-usage listing emitted by
//! `-fstack-usage`. Each line reads
//! `<file>:<line>:<col>:<function>\t<bytes>\t<qualifier>`, where the
//! qualifier is `static`, `dynamic`, `bounded` or a comma-joined
//! combination. The result maps canonical function names to local frame
//! sizes, exclusive of the return address.

use std::collections::BTreeMap;

use log::warn;

use crate::disasm::canonical_name;


#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameEntry
{
    pub bytes:   u64,
    /// The compiler could only bound this frame from below.
    pub dynamic: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameTable
{
    pub entries:  BTreeMap<String, FrameEntry>,
    pub warnings: Vec<String>,
}

impl FrameTable
{
    pub fn get(&self, name: &str) -> Option<&FrameEntry>
    {
        self.entries.get(name)
    }
}


/// Parses one or more concatenated stack-usage listings. Lines that do
/// not tokenize are skipped with a warning; duplicate entries for one
/// function keep the larger frame.
pub fn parse(text: &str) -> FrameTable
{
    let mut table = FrameTable::default();

    for line in text.lines()
    {
        let line = line.trim_end();
        if line.is_empty()
        {
            continue;
        }

        match parse_line(line)
        {
            Some((name, entry)) =>
            {
                table.entries
                    .entry(name)
                    .and_modify(|e|
                    {
                        e.bytes = e.bytes.max(entry.bytes);
                        e.dynamic |= entry.dynamic;
                    })
                    .or_insert(entry);
            }
            None =>
            {
                warn!("stack-usage line skipped: `{}`", line);
                table.warnings.push(format!("stack-usage line skipped: `{}`", line));
            }
        }
    }

    table
}

fn parse_line(line: &str) -> Option<(String, FrameEntry)>
{
    let mut fields = line.split('\t');
    let location = fields.next()?;
    let bytes: u64 = fields.next()?.trim().parse().ok()?;
    let qualifier = fields.next()?.trim();

    // <file>:<line>:<col>:<qualified name>
    let mut parts = location.splitn(4, ':');
    let _file = parts.next()?;
    let _line = parts.next()?;
    let _col = parts.next()?;
    let qualified = parts.next()?;

    // C++ listings append a parameter list; the symbol itself is the
    // last word before it.
    let base = qualified.split('(').next().unwrap_or(qualified);
    let base = base.split_whitespace().last()?;
    if base.is_empty()
    {
        return None;
    }

    Some((
        canonical_name(base).to_string(),
        FrameEntry
        {
            bytes,
            dynamic: qualifier.split(',').any(|q| q.trim() == "dynamic"),
        },
    ))
}




#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn parses_a_plain_static_line()
    {
        let t = parse("program.c:18:5:main\t2\tstatic\n");
        assert_eq!(t.entries["main"], FrameEntry { bytes: 2, dynamic: false });
        assert!(t.warnings.is_empty());
    }

    #[test]
    fn duplicate_entries_keep_the_maximum()
    {
        let t = parse(concat!(
            "a.c:3:1:helper\t10\tstatic\n",
            "b.c:9:1:helper\t26\tstatic\n",
            "c.c:4:1:helper\t12\tstatic\n",
        ));
        assert_eq!(t.entries["helper"].bytes, 26);
    }

    #[test]
    fn dynamic_qualifier_survives_duplicate_resolution()
    {
        let t = parse(concat!(
            "a.c:3:1:varargs\t8\tdynamic,bounded\n",
            "a.c:3:1:varargs\t6\tstatic\n",
        ));
        assert_eq!(t.entries["varargs"], FrameEntry { bytes: 8, dynamic: true });
    }

    #[test]
    fn clone_suffixes_collapse_onto_the_base_symbol()
    {
        let t = parse(concat!(
            "a.c:3:1:compute.constprop.0\t24\tstatic\n",
            "a.c:3:1:compute\t16\tstatic\n",
        ));
        assert_eq!(t.entries.len(), 1);
        assert_eq!(t.entries["compute"].bytes, 24);
    }

    #[test]
    fn cxx_parameter_lists_are_dropped()
    {
        let t = parse("drv.cpp:40:9:void pump(int)\t12\tstatic\n");
        assert_eq!(t.entries["pump"].bytes, 12);
    }

    #[test]
    fn malformed_lines_warn_and_are_skipped()
    {
        let t = parse(concat!(
            "not a stack usage line\n",
            "a.c:1:1:ok\t4\tstatic\n",
            "a.c:2:2:bad\tNaN\tstatic\n",
        ));
        assert_eq!(t.entries.len(), 1);
        assert_eq!(t.warnings.len(), 2);
    }

    #[test]
    fn empty_lines_are_not_warnings()
    {
        let t = parse("\n\na.c:1:1:ok\t4\tstatic\n\n");
        assert_eq!(t.entries.len(), 1);
        assert!(t.warnings.is_empty());
    }

    #[test]
    fn parsing_is_idempotent()
    {
        let text = "a.c:1:1:f\t4\tstatic\nb.c:2:2:g\t8\tdynamic\n";
        assert_eq!(parse(text), parse(text));
    }
}
