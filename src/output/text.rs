use std::io;

use crate as c;
use crate::state::State;


impl State
{
    ///
    /// Renders the human-readable analysis report: the RAM budget
    /// header, the deepest call path, per-function frames sorted by
    /// size, recursion bounds, the call-graph adjacency and any
    /// warnings collected along the way.
    ///
    pub fn output_text(&self, report: &c::MemoryReport, mut writer: impl io::Write)
        -> io::Result<()>
    {
        let bound_marker = if report.bounded_by_heuristic { " (upper bound)" } else { "" };
        let margin = report.stack_worst_case
            * (100 + self.config.safety_margin_percent) / 100;

        writeln!(writer, "Stack analysis report")?;
        writeln!(writer, "{}", "=".repeat(60))?;
        writeln!(writer, "MCU:                      {}", report.mcu)?;
        writeln!(writer, "RAM size:                 {} bytes", report.ram_total)?;
        writeln!(
            writer,
            ".data + .bss:             {} bytes ({} + {})",
            report.data_bytes + report.bss_bytes,
            report.data_bytes,
            report.bss_bytes,
        )?;
        writeln!(
            writer,
            "Worst-case stack:         {} bytes{}",
            report.stack_worst_case, bound_marker,
        )?;
        writeln!(
            writer,
            "With {:>2}% safety margin:   {} bytes",
            self.config.safety_margin_percent, margin,
        )?;
        if report.overflow
        {
            writeln!(
                writer,
                "Free RAM:                 OVERFLOW by {} bytes",
                -report.free_ram,
            )?;
        }
        else
        {
            writeln!(writer, "Free RAM:                 {} bytes", report.free_ram)?;
        }
        if report.unresolved_calls > 0
        {
            writeln!(writer, "Unresolved calls:         {}", report.unresolved_calls)?;
        }

        if !report.longest_path.is_empty()
        {
            writeln!(writer)?;
            writeln!(writer, "Deepest path:")?;
            writeln!(writer, "  {}", report.longest_path.join(" -> "))?;
        }

        writeln!(writer)?;
        writeln!(writer, "Function frames (local bytes, return address excluded):")?;
        let mut nodes: Vec<&c::Node> = self.g
            .raw_nodes()
            .iter()
            .map(|n| &n.weight)
            .filter(|n| n.kind != c::NodeKind::UnknownExternal)
            .collect();
        nodes.sort_by(|a, b| b.local.bytes().cmp(&a.local.bytes()).then(a.name.cmp(&b.name)));
        for node in &nodes
        {
            writeln!(writer, "  {}: {}", node.name, node.local)?;
        }

        if !self.recursion.is_empty()
        {
            writeln!(writer)?;
            writeln!(writer, "Recursive functions:")?;
            for (name, pattern) in &self.recursion
            {
                let (depth, _) = pattern.depth_bound(
                    self.config.domain_for(name),
                    self.config.unknown_recursion_depth_cap,
                );
                writeln!(writer, "  {} ({}, depth {})", name, pattern, depth)?;
            }
        }

        writeln!(writer)?;
        writeln!(writer, "Call graph:")?;
        for v in self.g.node_indices()
        {
            let node = &self.g[v];
            if node.kind == c::NodeKind::UnknownExternal
            {
                continue;
            }
            let mut callees: Vec<&str> = self.g
                .neighbors(v)
                .map(|u| self.g[u].name.as_str())
                .collect();
            callees.sort_unstable();
            callees.dedup();
            if callees.is_empty()
            {
                writeln!(writer, "  {} -> (leaf)", node.name)?;
            }
            else
            {
                writeln!(writer, "  {} -> {}", node.name, callees.join(", "))?;
            }
        }

        if !report.warnings.is_empty()
        {
            writeln!(writer)?;
            writeln!(writer, "Warnings:")?;
            for w in &report.warnings
            {
                writeln!(writer, "  - {}", w)?;
            }
        }

        Ok(())
    }
}




#[cfg(test)]
mod tests
{
    use super::*;
    use crate::input::InputData;

    const ASM: &str = "\
Disassembly of section .text:

00000080 <tick>:
  80:\t08 95       \tret

00000090 <main>:
  90:\tcf 93       \tpush\tr28
  92:\t0e 94 40 00 \tcall\t0x80\t; 0x80 <tick>
  96:\tff cf       \trjmp\t.-2\t; 0x96 <main+0x6>
";
    const SU: &str = "a.c:1:1:tick\t4\tstatic\na.c:9:1:main\t2\tstatic\n";
    const SIZES: &str = "   text\tdata\tbss\tdec\thex\tfilename\n  100\t4\t8\t112\t70\ta.elf\n";

    fn solved_state() -> State
    {
        let mut s = State::new(c::AnalysisConfig::default());
        s.load_artifacts(&InputData::from_strings(ASM, SU, SIZES)).unwrap();
        s.add_nodes();
        s.collect_address_taken();
        s.build_call_graph();
        s.solve().unwrap();
        s
    }

    #[test]
    fn text_report_carries_the_header_and_path()
    {
        let s = solved_state();
        let report = s.report();
        let mut out = Vec::new();
        s.output_text(&report, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("MCU:                      atmega328p"));
        assert!(text.contains("Worst-case stack:         10 bytes"));
        assert!(text.contains("main -> tick"));
        assert!(text.contains("tick -> (leaf)"));
    }

    #[test]
    fn dot_report_is_well_formed()
    {
        let s = solved_state();
        let mut out = Vec::new();
        s.output_dot(&mut out, crate::output::DotConf::default()).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.starts_with("digraph {"));
        assert!(text.trim_end().ends_with('}'));
        assert!(text.contains("label=\"main"));
    }
}
