/*      ███████╗████████╗ █████╗ ████████╗███████╗       */
/*      ██╔════╝╚══██╔══╝██╔══██╗╚══██╔══╝██╔════╝       */
/*      ███████╗   ██║   ███████║   ██║   █████╗         */
/*      ╚════██║   ██║   ██╔══██║   ██║   ██╔══╝         */
/*      ███████║   ██║   ██║  ██║   ██║   ███████╗       */
/*      ╚══════╝   ╚═╝   ╚═╝  ╚═╝   ╚═╝   ╚══════╝       */
/*     ███████████████████████████████████████████╗      */
/*     ╚══════════════════════════════════════════╝      */

use crate as c;
use crate::avr;
use crate::disasm::{self, FunctionBlock, Instruction};
use crate::input::{self, InputData};
use crate::sizes::{self, SectionSizes};
use crate::su::{self, FrameTable};

use std::collections::{
    BTreeMap, BTreeSet,
    HashMap, HashSet,
};
use petgraph::{
    algo,
    graph::{DiGraph, NodeIndex},
    visit::{Dfs, EdgeRef},
};

use log::{debug, warn};
use thiserror::Error;


///
/// The errors that abort an analysis. Everything else — skipped lines,
/// unresolved calls, missing frame sizes, heuristic cycle bounds —
/// flows into the report instead.
///
#[derive(Error, Debug)]
pub enum AnalysisError
{
    #[error("disassembly listing contains no symbols")]
    EmptySymbolTable,

    #[error("no entry point or interrupt handler to start from")]
    NoRoot,

    #[error(transparent)]
    Sizes(#[from] sizes::SizesError),

    #[error(transparent)]
    Input(#[from] input::InputError),
}


#[derive(Clone, Debug)]
pub struct State
{
    pub config:               c::AnalysisConfig,

    /// Frame sizes from the stack-usage listing.
    pub frames:               FrameTable,
    /// Instruction blocks from the disassembly, address order.
    pub blocks:               Vec<FunctionBlock>,
    pub sections:             SectionSizes,

    pub g:                    DiGraph<c::Node, c::EdgeKind>,
    pub indices:              BTreeMap<String, NodeIndex>,
    pub by_address:           BTreeMap<u32, String>,

    /// Functions whose entry address is materialized somewhere; the
    /// candidate targets of every indirect call.
    pub address_taken:        BTreeSet<String>,
    /// Classified reduction pattern per self-recursive function.
    pub recursion:            BTreeMap<String, avr::RecursionPattern>,

    pub roots:                Vec<NodeIndex>,
    pub cycles:               Vec<Vec<NodeIndex>>,
    pub cycle_depths:         Vec<u64>,
    pub cycle_of:             HashMap<NodeIndex, usize>,

    pub unknown_node:         Option<NodeIndex>,
    pub unresolved_calls:     u64,
    pub bounded_by_heuristic: bool,

    pub worst_case:           Option<c::Max>,
    pub longest_path:         Vec<String>,
    pub warnings:             Vec<String>,
}


impl State
{
    pub fn new(config: c::AnalysisConfig) -> Self
    {
        State
        {
            config,
            frames:               FrameTable::default(),
            blocks:               Vec::new(),
            sections:             SectionSizes::default(),
            g:                    DiGraph::new(),
            indices:              BTreeMap::new(),
            by_address:           BTreeMap::new(),
            address_taken:        BTreeSet::new(),
            recursion:            BTreeMap::new(),
            roots:                Vec::new(),
            cycles:               Vec::new(),
            cycle_depths:         Vec::new(),
            cycle_of:             HashMap::new(),
            unknown_node:         None,
            unresolved_calls:     0,
            bounded_by_heuristic: false,
            worst_case:           None,
            longest_path:         Vec::new(),
            warnings:             Vec::new(),
        }
    }

    /// All variables initialized to empty/default values.
    pub fn empty() -> Self
    {
        State::new(c::AnalysisConfig::default())
    }


    ///
    /// Runs the three artifact parsers.
    ///
    /// Modified fields:
    /// - `frames`
    /// - `blocks`
    /// - `sections`
    /// - `warnings`
    ///
    pub fn load_artifacts(&mut self, inp: &InputData) -> Result<(), AnalysisError>
    {
        self.frames = su::parse(&inp.su_text);
        self.warnings.extend(self.frames.warnings.iter().cloned());

        let listing = disasm::parse(&inp.asm_text);
        if listing.functions.is_empty()
        {
            return Err(AnalysisError::EmptySymbolTable);
        }
        if listing.discarded_lines > 0
        {
            self.warnings.push(format!(
                "{} disassembly line(s) could not be tokenized",
                listing.discarded_lines
            ));
        }
        self.blocks = listing.functions;
        self.blocks.sort_by_key(|b| b.address);

        self.sections = sizes::parse(&inp.size_text)?;

        Ok(())
    }


    ///
    /// One node per canonical function name; clone blocks
    /// (`frob.constprop.0` next to `frob`) merge onto one node.
    ///
    /// Modified fields:
    /// - `g`
    /// - `indices`
    /// - `by_address`
    ///
    pub fn add_nodes(&mut self)
    {
        let blocks = std::mem::take(&mut self.blocks);

        for block in &blocks
        {
            let name = disasm::canonical_name(&block.name).to_string();
            self.by_address.entry(block.address).or_insert_with(|| name.clone());

            if self.indices.contains_key(&name)
            {
                continue;
            }

            let local = match self.frames.get(&name)
            {
                Some(e) if e.dynamic => c::Local::Dynamic(e.bytes),
                Some(e)              => c::Local::Exact(e.bytes),
                None                 => c::Local::Missing,
            };

            let kind = if name == "main"
            {
                c::NodeKind::Entry
            }
            else if name.starts_with(&self.config.isr_prefix)
            {
                c::NodeKind::Interrupt
            }
            else
            {
                c::NodeKind::Normal
            };

            let idx = self.g.add_node(c::Node(name.clone(), block.address, local, kind));
            self.indices.insert(name, idx);
        }

        self.blocks = blocks;
    }


    ///
    /// One pass over every instruction, watching the register file for
    /// `ldi` pairs that materialize a function entry address (in byte
    /// or word form) and for spelled-out `lo8(sym)` / `pm_hi8(sym)`
    /// relocations. Whatever it finds is a candidate target of every
    /// `icall` in the program.
    ///
    /// Modified fields:
    /// - `address_taken`
    ///
    pub fn collect_address_taken(&mut self)
    {
        let blocks = std::mem::take(&mut self.blocks);

        for block in &blocks
        {
            let mut regs: [Option<u8>; 32] = [None; 32];

            for ins in &block.instructions
            {
                let (reg, value) = match avr::parse_ldi(ins)
                {
                    Some(hit) => hit,
                    None      => continue,
                };

                match value
                {
                    avr::LdiValue::SymbolLow(sym) | avr::LdiValue::SymbolHigh(sym) =>
                    {
                        let name = disasm::canonical_name(&sym);
                        if self.indices.contains_key(name)
                        {
                            debug!("`{}` address-taken via relocation in `{}`", name, block.name);
                            self.address_taken.insert(name.to_string());
                        }
                    }
                    avr::LdiValue::Byte(v) =>
                    {
                        regs[reg as usize] = Some(v);

                        // A 16-bit address lives in an adjacent pair,
                        // low byte in the lower register.
                        for lo_reg in [reg.saturating_sub(1), reg]
                        {
                            let hi_reg = lo_reg as usize + 1;
                            if hi_reg > 31
                            {
                                continue;
                            }
                            if let (Some(lo), Some(hi)) = (regs[lo_reg as usize], regs[hi_reg])
                            {
                                let combined = ((hi as u32) << 8) | lo as u32;
                                if combined == 0
                                {
                                    continue;
                                }
                                if let Some(name) = self.name_at(combined)
                                {
                                    let name = name.clone();
                                    debug!("`{}` address-taken via r{}:r{} in `{}`",
                                           name, hi_reg, lo_reg, block.name);
                                    self.address_taken.insert(name);
                                }
                            }
                        }
                    }
                }
            }
        }

        self.blocks = blocks;
    }


    ///
    /// Walks every instruction block and emits call edges: direct and
    /// relative calls, tail jumps onto other entries, and one indirect
    /// edge per address-taken function at every `icall`/`eicall` site.
    /// Self-loops get their recursion pattern classified on the spot.
    ///
    /// Modified fields:
    /// - `g`
    /// - `recursion`
    /// - `unknown_node`
    /// - `unresolved_calls`
    ///
    pub fn build_call_graph(&mut self)
    {
        let blocks = std::mem::take(&mut self.blocks);

        for block in &blocks
        {
            let caller_name = disasm::canonical_name(&block.name);
            let caller = match self.indices.get(caller_name)
            {
                Some(&idx) => idx,
                None       => continue,
            };

            for (site, ins) in block.instructions.iter().enumerate()
            {
                let m = ins.mnemonic.as_str();

                if avr::is_direct_call(m)
                {
                    // `rcall .+0` reserves return-address bytes on the
                    // stack; it never transfers control anywhere.
                    if ins.operands.first().map(String::as_str) == Some(".+0")
                    {
                        continue;
                    }

                    match self.resolve_target(ins)
                    {
                        Some(callee) if callee == caller =>
                        {
                            self.upsert_edge(caller, caller, c::EdgeKind::RecursiveSelf);
                            self.classify_recursion(block, site);
                        }
                        Some(callee) =>
                        {
                            self.upsert_edge(caller, callee, c::EdgeKind::Direct);
                        }
                        None =>
                        {
                            warn!("unresolved call at 0x{:x} in `{}`", ins.address, caller_name);
                            let u = self.unknown();
                            self.upsert_edge(caller, u, c::EdgeKind::Direct);
                            self.unresolved_calls += 1;
                        }
                    }
                }
                else if avr::is_indirect_call(m)
                {
                    if self.address_taken.is_empty()
                    {
                        warn!("indirect call at 0x{:x} in `{}` with no address-taken candidates",
                              ins.address, caller_name);
                        let u = self.unknown();
                        self.upsert_edge(caller, u, c::EdgeKind::Indirect);
                        self.unresolved_calls += 1;
                        continue;
                    }

                    let targets: Vec<NodeIndex> = self.address_taken
                        .iter()
                        .filter_map(|name| self.indices.get(name).copied())
                        .collect();
                    for t in targets
                    {
                        if t == caller
                        {
                            self.upsert_edge(caller, caller, c::EdgeKind::RecursiveSelf);
                            self.classify_recursion(block, site);
                        }
                        else
                        {
                            self.upsert_edge(caller, t, c::EdgeKind::Indirect);
                        }
                    }
                }
                else if avr::is_jump(m)
                {
                    // Only a jump that lands exactly on another entry
                    // is a tail call; everything else is control flow
                    // inside the function.
                    match self.resolve_target(ins)
                    {
                        Some(callee) if callee == caller =>
                        {
                            self.upsert_edge(caller, caller, c::EdgeKind::RecursiveSelf);
                            self.classify_recursion(block, site);
                        }
                        Some(callee) =>
                        {
                            self.upsert_edge(caller, callee, c::EdgeKind::Tail);
                        }
                        None => {}
                    }
                }
            }
        }

        self.blocks = blocks;
    }


    ///
    /// Computes per-node worst cases bottom-up (Kosaraju gives the
    /// SCCs callees-first), then composes the root results: deepest
    /// non-ISR path, plus the deepest ISR path on top of it, plus the
    /// interrupt entry push. Nested interrupts are not modeled.
    ///
    /// Modified fields:
    /// - `roots`
    /// - `cycles`, `cycle_depths`, `cycle_of`
    /// - `bounded_by_heuristic`
    /// - `worst_case`, `longest_path`
    /// - `warnings`
    /// - every node's `max` and `next`
    ///
    pub fn solve(&mut self) -> Result<(), AnalysisError>
    {
        let o = self.config.call_overhead_bytes;

        self.roots = self.g
            .node_indices()
            .filter(|&i| matches!(self.g[i].kind, c::NodeKind::Entry | c::NodeKind::Interrupt))
            .collect();
        if self.roots.is_empty()
        {
            return Err(AnalysisError::NoRoot);
        }

        let mut reachable: HashSet<NodeIndex> = HashSet::new();
        for &r in &self.roots
        {
            let mut dfs = Dfs::new(&self.g, r);
            while let Some(n) = dfs.next(&self.g)
            {
                reachable.insert(n);
            }
        }

        for v in self.g.node_indices()
        {
            if !reachable.contains(&v)
            {
                continue;
            }
            match (self.g[v].kind, self.g[v].local)
            {
                (c::NodeKind::UnknownExternal, _) =>
                {
                    self.bounded_by_heuristic = true;
                }
                (_, c::Local::Missing) =>
                {
                    warn!("no frame-size entry for `{}`", self.g[v].name);
                    self.warnings.push(format!(
                        "no frame-size entry for `{}`; assuming 0 bytes",
                        self.g[v].name
                    ));
                }
                (_, c::Local::Dynamic(n)) =>
                {
                    self.warnings.push(format!(
                        "`{}` has a dynamic frame; {} bytes is only a lower bound",
                        self.g[v].name, n
                    ));
                }
                _ => {}
            }
        }

        let sccs = algo::kosaraju_scc(&self.g);
        for scc in &sccs
        {
            let first = scc[0];
            let is_cycle = scc.len() > 1
                || self.g.edges(first).any(|e| e.target() == first);

            if is_cycle
            {
                self.solve_cycle(scc, o, &reachable);
            }
            else
            {
                self.solve_single(first, o);
            }
        }

        let entry = self.best_root(c::NodeKind::Entry);
        let isr = self.best_root(c::NodeKind::Interrupt);
        let (total, start) = match (entry, isr)
        {
            (Some((ei, em)), Some((_, im))) => (em + im + c::Max::Exact(o), ei),
            (Some((ei, em)), None)          => (em, ei),
            (None, Some((ii, im)))          => (im + c::Max::Exact(o), ii),
            (None, None)                    => return Err(AnalysisError::NoRoot),
        };

        self.worst_case = Some(total);
        self.longest_path = self.replay_path(start);

        Ok(())
    }


    /// The report, detached from all pipeline state.
    pub fn report(&self) -> c::MemoryReport
    {
        let stack = self.worst_case.map(|m| m.value()).unwrap_or(0);
        let used = self.sections.static_ram() + stack;

        c::MemoryReport
        {
            mcu:                  self.config.mcu.clone(),
            ram_total:            self.config.ram_total,
            data_bytes:           self.sections.data,
            bss_bytes:            self.sections.bss,
            stack_worst_case:     stack,
            free_ram:             self.config.ram_total as i64 - used as i64,
            overflow:             used > self.config.ram_total,
            bounded_by_heuristic: self.bounded_by_heuristic,
            unresolved_calls:     self.unresolved_calls,
            longest_path:         self.longest_path.clone(),
            warnings:             self.warnings.clone(),
        }
    }


    /*  helpers  */


    /// Entry lookup in byte form, then in word form.
    fn name_at(&self, addr: u32) -> Option<&String>
    {
        self.by_address
            .get(&addr)
            .or_else(|| self.by_address.get(&addr.wrapping_mul(2)))
    }

    fn node_at(&self, addr: u32) -> Option<NodeIndex>
    {
        self.name_at(addr).and_then(|n| self.indices.get(n).copied())
    }

    ///
    /// Resolution order for one control-transfer instruction: the
    /// symbol objdump wrote into the comment, the comment address, then
    /// the operand itself (relative displacement or absolute address).
    ///
    fn resolve_target(&self, ins: &Instruction) -> Option<NodeIndex>
    {
        if let Some(comment) = ins.comment.as_deref()
        {
            if let Some(sym) = avr::comment_symbol(comment)
            {
                if let Some(&idx) = self.indices.get(disasm::canonical_name(sym))
                {
                    return Some(idx);
                }
            }
            if let Some(addr) = avr::comment_address(comment)
            {
                if let Some(idx) = self.node_at(addr)
                {
                    return Some(idx);
                }
            }
        }

        let op = ins.operands.first()?;
        let addr = match avr::parse_relative(op)
        {
            Some(d) => avr::relative_target(ins.address, d),
            None    => avr::parse_address(op)?,
        };
        self.node_at(addr)
    }

    /// Parallel edges collapse onto the most specific kind.
    fn upsert_edge(&mut self, a: NodeIndex, b: NodeIndex, kind: c::EdgeKind)
    {
        match self.g.find_edge(a, b)
        {
            Some(e) =>
            {
                let w = self.g.edge_weight_mut(e).expect("UNREACHABLE");
                if kind > *w
                {
                    *w = kind;
                }
            }
            None =>
            {
                self.g.add_edge(a, b, kind);
            }
        }
    }

    /// The shared placeholder callee for calls nothing could resolve.
    fn unknown(&mut self) -> NodeIndex
    {
        if let Some(u) = self.unknown_node
        {
            return u;
        }
        let idx = self.g.add_node(c::Node(
            "?".to_string(),
            u32::MAX,
            c::Local::Exact(self.config.unresolved_call_penalty),
            c::NodeKind::UnknownExternal,
        ));
        self.unknown_node = Some(idx);
        idx
    }

    ///
    /// Looks at the window ahead of a recursive call site for the
    /// argument reduction. One site with several candidates keeps the
    /// strongest reduction; several sites for one function keep the
    /// deepest bound.
    ///
    fn classify_recursion(&mut self, block: &FunctionBlock, site: usize)
    {
        let name = disasm::canonical_name(&block.name).to_string();
        let start = site.saturating_sub(avr::CLASSIFY_WINDOW);
        let window = &block.instructions[start..site];

        let candidates =
        {
            let resolve = |ins: &Instruction| -> Option<String>
            {
                if let Some(sym) = ins.comment.as_deref().and_then(avr::comment_symbol)
                {
                    return Some(disasm::canonical_name(sym).to_string());
                }
                let op = ins.operands.first()?;
                let addr = match avr::parse_relative(op)
                {
                    Some(d) => avr::relative_target(ins.address, d),
                    None    => avr::parse_address(op)?,
                };
                self.name_at(addr).cloned()
            };
            avr::classify_window(window, resolve)
        };

        let domain = self.config.domain_for(&name);
        let cap = self.config.unknown_recursion_depth_cap;
        let pattern = avr::best_pattern(&candidates, domain, cap);
        debug!("self-recursion in `{}` classified as {:?}", name, pattern);

        match self.recursion.get(&name)
        {
            Some(old) if old.depth_bound(domain, cap).0 >= pattern.depth_bound(domain, cap).0 => {}
            _ =>
            {
                self.recursion.insert(name, pattern);
            }
        }
    }

    ///
    /// Worst case of one non-recursive node: its own invocation cost on
    /// top of the best successor. A tail edge replaces the frame
    /// instead of stacking, so its candidate is the plain maximum of
    /// the callee's worst case and this node's own cost.
    ///
    fn solve_single(&mut self, v: NodeIndex, o: u64)
    {
        let local: c::Max = self.g[v].local.into();
        let mut cost = local + c::Max::Exact(o);
        if self.g[v].kind == c::NodeKind::UnknownExternal
        {
            cost = c::Max::LowerBound(cost.value());
        }

        let mut best: Option<(c::Max, Option<NodeIndex>)> = None;
        for e in self.g.edges(v)
        {
            let u = e.target();
            let um = self.g[u].max.expect("UNREACHABLE");
            let (cand, nxt) = match *e.weight()
            {
                c::EdgeKind::Tail =>
                {
                    let follow = um.value() > cost.value();
                    (c::max(um, cost), if follow { Some(u) } else { None })
                }
                _ => (um + cost, Some(u)),
            };
            if best.as_ref().map_or(true, |(b, _)| cand.value() > b.value())
            {
                best = Some((cand, nxt));
            }
        }

        let (max, next) = best.unwrap_or((cost, None));
        self.g[v].max = Some(max);
        self.g[v].next = next;
    }

    ///
    /// Worst case of a recursion cycle: every member's invocation cost,
    /// multiplied by the bounded activation depth, plus the best path
    /// leaving the cycle. An unclassified cycle gets the configured
    /// ceiling and renders everything above it a lower bound.
    ///
    fn solve_cycle(&mut self, scc: &[NodeIndex], o: u64, reachable: &HashSet<NodeIndex>)
    {
        let mut members = scc.to_vec();
        members.sort_by_key(|&i| (self.g[i].address, i));

        let cap = self.config.unknown_recursion_depth_cap;
        let mut depth: u64 = 0;
        let mut heuristic = false;
        let mut classified = false;

        for &m in &members
        {
            if self.g.find_edge(m, m).is_none()
            {
                continue;
            }
            let name = self.g[m].name.clone();
            let pattern = self.recursion
                .get(&name)
                .copied()
                .unwrap_or(avr::RecursionPattern::Unknown);
            let (d, h) = pattern.depth_bound(self.config.domain_for(&name), cap);
            depth = depth.max(d);
            heuristic |= h;
            classified = true;
        }

        // Mutual recursion without any self-loop defeats per-site
        // classification entirely.
        if !classified
        {
            depth = cap;
            heuristic = true;
        }
        if heuristic && members.iter().any(|m| reachable.contains(m))
        {
            self.bounded_by_heuristic = true;
        }

        let mut sum = c::Max::Exact(0);
        for &m in &members
        {
            let lm: c::Max = self.g[m].local.into();
            sum = sum + lm + c::Max::Exact(o);
        }
        let mut cost = sum.scale(depth);
        if heuristic
        {
            cost = c::Max::LowerBound(cost.value());
        }

        let member_set: HashSet<NodeIndex> = members.iter().copied().collect();
        let mut best_ext: Option<(c::Max, NodeIndex)> = None;
        for &m in &members
        {
            for e in self.g.edges(m)
            {
                let t = e.target();
                if member_set.contains(&t)
                {
                    continue;
                }
                let um = self.g[t].max.expect("UNREACHABLE");
                if best_ext.as_ref().map_or(true, |(b, _)| um.value() > b.value())
                {
                    best_ext = Some((um, t));
                }
            }
        }

        let (max, next) = match best_ext
        {
            Some((um, t)) => (cost + um, Some(t)),
            None          => (cost, None),
        };

        let ci = self.cycles.len();
        for &m in &members
        {
            self.g[m].max = Some(max);
            self.g[m].next = next;
            self.cycle_of.insert(m, ci);
        }
        self.cycles.push(members);
        self.cycle_depths.push(depth);
    }

    /// Deepest root of one kind, earliest address on ties.
    fn best_root(&self, kind: c::NodeKind) -> Option<(NodeIndex, c::Max)>
    {
        let mut best: Option<(NodeIndex, c::Max)> = None;
        for &r in &self.roots
        {
            if self.g[r].kind != kind
            {
                continue;
            }
            let m = self.g[r].max.expect("UNREACHABLE");
            if best.as_ref().map_or(true, |(_, b)| m.value() > b.value())
            {
                best = Some((r, m));
            }
        }
        best
    }

    ///
    /// Replays the winning chain into function names. A self-recursive
    /// function repeats once per bounded activation, the way the stack
    /// would actually hold it; members of a wider cycle are listed once
    /// each in address order.
    ///
    fn replay_path(&self, start: NodeIndex) -> Vec<String>
    {
        let mut names = Vec::new();
        let mut cur = Some(start);

        while let Some(v) = cur
        {
            match self.cycle_of.get(&v)
            {
                Some(&ci) =>
                {
                    let members = &self.cycles[ci];
                    if members.len() == 1
                    {
                        for _ in 0..self.cycle_depths[ci]
                        {
                            names.push(self.g[v].name.clone());
                        }
                    }
                    else
                    {
                        for &m in members
                        {
                            names.push(self.g[m].name.clone());
                        }
                    }
                }
                None =>
                {
                    names.push(self.g[v].name.clone());
                }
            }
            cur = self.g[v].next;
        }

        names
    }
}




#[cfg(test)]
mod tests
{
    use super::*;

    fn add_fn(s: &mut State, name: &str, addr: u32, local: c::Local, kind: c::NodeKind) -> NodeIndex
    {
        let idx = s.g.add_node(c::Node(name.to_string(), addr, local, kind));
        s.indices.insert(name.to_string(), idx);
        s.by_address.insert(addr, name.to_string());
        idx
    }

    fn exact(s: &mut State, name: &str, addr: u32, frame: u64, kind: c::NodeKind) -> NodeIndex
    {
        add_fn(s, name, addr, c::Local::Exact(frame), kind)
    }

    #[test]
    fn acyclic_graphs_solve_to_the_deepest_path_sum()
    {
        let mut s = State::empty();
        let main = exact(&mut s, "main", 0x90, 2, c::NodeKind::Entry);
        let a = exact(&mut s, "a", 0xa0, 4, c::NodeKind::Normal);
        let b = exact(&mut s, "b", 0xb0, 6, c::NodeKind::Normal);
        let d = exact(&mut s, "d", 0xc0, 10, c::NodeKind::Normal);
        s.g.add_edge(main, a, c::EdgeKind::Direct);
        s.g.add_edge(a, b, c::EdgeKind::Direct);
        s.g.add_edge(main, d, c::EdgeKind::Direct);

        s.solve().unwrap();

        // (2+2) + (4+2) + (6+2) beats (2+2) + (10+2)
        assert_eq!(s.worst_case, Some(c::Max::Exact(18)));
        assert_eq!(s.longest_path, ["main", "a", "b"]);
    }

    #[test]
    fn growing_a_frame_never_shrinks_the_result()
    {
        let build = |frame_b: u64|
        {
            let mut s = State::empty();
            let main = exact(&mut s, "main", 0x90, 2, c::NodeKind::Entry);
            let a = exact(&mut s, "a", 0xa0, 4, c::NodeKind::Normal);
            let b = exact(&mut s, "b", 0xb0, frame_b, c::NodeKind::Normal);
            s.g.add_edge(main, a, c::EdgeKind::Direct);
            s.g.add_edge(main, b, c::EdgeKind::Direct);
            s.solve().unwrap();
            s.worst_case.unwrap().value()
        };

        let lo = build(1);
        let hi = build(40);
        assert!(lo <= hi);
        assert_eq!(hi, 4 + 42);
    }

    #[test]
    fn adding_an_edge_never_shrinks_the_result()
    {
        let build = |extra: bool|
        {
            let mut s = State::empty();
            let main = exact(&mut s, "main", 0x90, 2, c::NodeKind::Entry);
            let a = exact(&mut s, "a", 0xa0, 4, c::NodeKind::Normal);
            let b = exact(&mut s, "b", 0xb0, 30, c::NodeKind::Normal);
            s.g.add_edge(main, a, c::EdgeKind::Direct);
            if extra
            {
                s.g.add_edge(a, b, c::EdgeKind::Direct);
            }
            s.solve().unwrap();
            s.worst_case.unwrap().value()
        };

        assert!(build(false) <= build(true));
    }

    #[test]
    fn isr_paths_stack_on_top_of_the_entry_path()
    {
        let mut s = State::empty();
        let main = exact(&mut s, "main", 0x90, 10, c::NodeKind::Entry);
        let work = exact(&mut s, "work", 0xa0, 18, c::NodeKind::Normal);
        exact(&mut s, "__vector_16", 0x7c, 4, c::NodeKind::Interrupt);
        s.g.add_edge(main, work, c::EdgeKind::Direct);

        s.solve().unwrap();

        // (10+2)+(18+2) from main, (4+2) in the handler, +2 entry push
        assert_eq!(s.worst_case, Some(c::Max::Exact(32 + 6 + 2)));
    }

    #[test]
    fn isr_composition_is_exactly_additive()
    {
        let without = {
            let mut s = State::empty();
            let main = exact(&mut s, "main", 0x90, 10, c::NodeKind::Entry);
            let work = exact(&mut s, "work", 0xa0, 18, c::NodeKind::Normal);
            s.g.add_edge(main, work, c::EdgeKind::Direct);
            s.solve().unwrap();
            s.worst_case.unwrap().value()
        };

        let with = {
            let mut s = State::empty();
            let main = exact(&mut s, "main", 0x90, 10, c::NodeKind::Entry);
            let work = exact(&mut s, "work", 0xa0, 18, c::NodeKind::Normal);
            exact(&mut s, "__vector_13", 0x7c, 6, c::NodeKind::Interrupt);
            s.g.add_edge(main, work, c::EdgeKind::Direct);
            s.solve().unwrap();
            s.worst_case.unwrap().value()
        };

        let isr_path_cost = 6 + 2;
        assert_eq!(with, without + isr_path_cost + 2);
    }

    #[test]
    fn tail_edges_replace_the_frame_instead_of_stacking()
    {
        let mut s = State::empty();
        let main = exact(&mut s, "main", 0x90, 6, c::NodeKind::Entry);
        let small = exact(&mut s, "small", 0xa0, 2, c::NodeKind::Normal);
        s.g.add_edge(main, small, c::EdgeKind::Tail);
        s.solve().unwrap();
        // max(6+2, 2+2), not their sum
        assert_eq!(s.worst_case, Some(c::Max::Exact(8)));
        assert_eq!(s.longest_path, ["main"]);

        let mut s = State::empty();
        let main = exact(&mut s, "main", 0x90, 6, c::NodeKind::Entry);
        let big = exact(&mut s, "big", 0xa0, 20, c::NodeKind::Normal);
        s.g.add_edge(main, big, c::EdgeKind::Tail);
        s.solve().unwrap();
        assert_eq!(s.worst_case, Some(c::Max::Exact(22)));
        assert_eq!(s.longest_path, ["main", "big"]);
    }

    #[test]
    fn a_classified_self_loop_multiplies_by_its_depth()
    {
        let mut s = State::empty();
        s.config.argument_domains.insert("fac".to_string(), 5);
        let main = exact(&mut s, "main", 0x90, 2, c::NodeKind::Entry);
        let fac = exact(&mut s, "fac", 0xa0, 8, c::NodeKind::Normal);
        s.g.add_edge(main, fac, c::EdgeKind::Direct);
        s.g.add_edge(fac, fac, c::EdgeKind::RecursiveSelf);
        s.recursion.insert("fac".to_string(), avr::RecursionPattern::MinusK(1));

        s.solve().unwrap();

        // depth ceil(5/1)+1 = 6; 6 * (8+2) on top of main's 4
        assert_eq!(s.worst_case, Some(c::Max::Exact(4 + 60)));
        assert!(!s.bounded_by_heuristic);
        assert_eq!(s.longest_path.len(), 1 + 6);
    }

    #[test]
    fn mutual_recursion_without_patterns_hits_the_ceiling()
    {
        let mut s = State::empty();
        let main = exact(&mut s, "main", 0x90, 2, c::NodeKind::Entry);
        let ping = exact(&mut s, "ping", 0xa0, 3, c::NodeKind::Normal);
        let pong = exact(&mut s, "pong", 0xb0, 5, c::NodeKind::Normal);
        s.g.add_edge(main, ping, c::EdgeKind::Direct);
        s.g.add_edge(ping, pong, c::EdgeKind::Direct);
        s.g.add_edge(pong, ping, c::EdgeKind::Direct);

        s.solve().unwrap();

        // 32 * ((3+2) + (5+2)) + main's 4, as a bound
        assert_eq!(s.worst_case, Some(c::Max::LowerBound(4 + 32 * 12)));
        assert!(s.bounded_by_heuristic);
        assert_eq!(s.cycles.len(), 1);
        assert_eq!(s.cycle_depths, [32]);
    }

    #[test]
    fn missing_frames_solve_as_zero_with_a_warning()
    {
        let mut s = State::empty();
        let main = exact(&mut s, "main", 0x90, 2, c::NodeKind::Entry);
        let ghost = add_fn(&mut s, "ghost", 0xa0, c::Local::Missing, c::NodeKind::Normal);
        s.g.add_edge(main, ghost, c::EdgeKind::Direct);

        s.solve().unwrap();

        assert_eq!(s.worst_case, Some(c::Max::Exact(4 + 2)));
        assert!(s.warnings.iter().any(|w| w.contains("ghost")));
        assert!(!s.bounded_by_heuristic);
    }

    #[test]
    fn dynamic_frames_turn_the_result_into_a_lower_bound()
    {
        let mut s = State::empty();
        let main = exact(&mut s, "main", 0x90, 2, c::NodeKind::Entry);
        let va = add_fn(&mut s, "va", 0xa0, c::Local::Dynamic(16), c::NodeKind::Normal);
        s.g.add_edge(main, va, c::EdgeKind::Direct);

        s.solve().unwrap();

        assert_eq!(s.worst_case, Some(c::Max::LowerBound(4 + 18)));
        // a dynamic frame is a frame-size statement, not a graph heuristic
        assert!(!s.bounded_by_heuristic);
        assert!(s.warnings.iter().any(|w| w.contains("va")));
    }

    #[test]
    fn an_unresolved_callee_flags_the_bound()
    {
        let mut s = State::empty();
        let main = exact(&mut s, "main", 0x90, 2, c::NodeKind::Entry);
        let u = s.unknown();
        s.g.add_edge(main, u, c::EdgeKind::Direct);
        s.unresolved_calls = 1;

        s.solve().unwrap();

        // penalty 0 + overhead 2 below main's 4
        assert_eq!(s.worst_case, Some(c::Max::LowerBound(6)));
        assert!(s.bounded_by_heuristic);
    }

    #[test]
    fn no_root_is_fatal()
    {
        let mut s = State::empty();
        exact(&mut s, "helper", 0x90, 2, c::NodeKind::Normal);
        assert!(matches!(s.solve(), Err(AnalysisError::NoRoot)));
    }

    #[test]
    fn solving_is_deterministic()
    {
        let build = ||
        {
            let mut s = State::empty();
            let main = exact(&mut s, "main", 0x90, 2, c::NodeKind::Entry);
            let a = exact(&mut s, "a", 0xa0, 8, c::NodeKind::Normal);
            let b = exact(&mut s, "b", 0xb0, 8, c::NodeKind::Normal);
            s.g.add_edge(main, a, c::EdgeKind::Direct);
            s.g.add_edge(main, b, c::EdgeKind::Direct);
            s.solve().unwrap();
            s.report()
        };

        assert_eq!(build(), build());
    }

    #[test]
    fn overflow_flag_matches_the_budget_identity()
    {
        let mut s = State::empty();
        s.config.ram_total = 20;
        s.sections = SectionSizes { text: 0, data: 10, bss: 4 };
        exact(&mut s, "main", 0x90, 6, c::NodeKind::Entry);

        s.solve().unwrap();
        let r = s.report();

        // 10 + 4 + 8 > 20
        assert!(r.overflow);
        assert_eq!(r.free_ram, 20 - 22);
        assert_eq!(r.exit_code(), 1);

        let fits = {
            let mut s = State::empty();
            s.config.ram_total = 64;
            s.sections = SectionSizes { text: 0, data: 10, bss: 4 };
            exact(&mut s, "main", 0x90, 6, c::NodeKind::Entry);
            s.solve().unwrap();
            s.report()
        };
        assert!(!fits.overflow);
        assert_eq!(fits.exit_code(), 0);
    }
}
