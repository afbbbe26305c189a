use std::io;

/// Backslash-escapes `"` and `\` on the way to a dot label.
pub struct Escaper<W>
where
    W: io::Write,
{
    writer: W,
}

impl<W> Escaper<W>
where
    W: io::Write,
{
    pub fn new(writer: W) -> Self {
        Escaper { writer }
    }
}

impl<W> io::Write for Escaper<W>
where
    W: io::Write,
{
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>
    {
        for &b in buf
        {
            if b == b'"' || b == b'\\'
            {
                self.writer.write_all(b"\\")?;
            }
            self.writer.write_all(&[b])?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()>
    {
        self.writer.flush()
    }
}



#[cfg(test)]
mod tests
{
    use super::*;
    use std::io::Write as _;

    #[test]
    fn quotes_and_backslashes_get_escaped()
    {
        let mut out = Vec::new();
        let mut esc = Escaper::new(&mut out);
        write!(esc, "a \"b\" \\c").unwrap();
        assert_eq!(out, br#"a \"b\" \\c"#);
    }
}
