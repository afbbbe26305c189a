use petgraph::graph::NodeIndex;
use std::{
    io,
    io::Write as _, // to get write_fmt, granting writeln!
};

use crate as c;
use crate::state::State;
use crate::output::escaper::Escaper;


impl State
{
    ///
    /// Renders the call graph as Graphviz dot: one box per function
    /// with its local frame and solved worst case, dashed boxes for
    /// unresolved targets, dashed arrows for indirect calls, and one
    /// dashed cluster per recursion cycle.
    ///
    pub fn output_dot(&self, mut writer: impl io::Write, dc: DotConf) -> io::Result<()>
    {
        let cycles: &Vec< Vec<NodeIndex> > = &self.cycles;

        writeln!(writer, "digraph {{")?;
        writeln!(writer, "    node [fontname={} shape=box]", &dc.font)?;

        for (i, node) in self.g.raw_nodes().iter().enumerate() {
            let node = &node.weight;

            write!(writer, "    {} [label=\"", i)?;

            let mut esc = Escaper::new(&mut writer);
            write!(esc, "{}", node.name)?;

            if let Some(max) = node.max {
                write!(writer, "\\nmax {}", max)?;
            }

            write!(writer, "\\nlocal = {}\"", node.local)?;

            if node.kind == c::NodeKind::UnknownExternal {
                write!(writer, " style=dashed")?;
            }

            writeln!(writer, "]")?;
        }

        for edge in self.g.raw_edges() {
            let style = match edge.weight {
                c::EdgeKind::Indirect => " [style=dashed]",
                c::EdgeKind::Tail     => " [style=dotted]",
                _                     => "",
            };
            writeln!(
                writer,
                "    {} -> {}{}",
                edge.source().index(),
                edge.target().index(),
                style,
            )?;
        }

        for (i, cycle) in cycles.iter().enumerate() {
            writeln!(writer, "\n    subgraph cluster_{} {{", i)?;
            writeln!(writer, "        style=dashed")?;
            writeln!(writer, "        fontname={}", &dc.font)?;
            writeln!(writer, "        label=\"cycle {} (depth {})\"", i, self.cycle_depths[i])?;

            for node in cycle {
                writeln!(writer, "        {}", node.index())?;
            }

            writeln!(writer, "    }}")?;
        }

        writeln!(writer, "}}")?;

        Ok(())
    }
}



pub struct DotConf
{
    pub font: String,
}

impl DotConf
{
    pub fn default() -> Self
    {
        DotConf
        {
            font: "monospace".to_string(),
        }
    }
}
