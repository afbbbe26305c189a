//! Library for estimating the worst-case call-stack depth of a compiled
//! AVR program, plus its static memory footprint (.data / .bss), before
//! the program is ever flashed.\
//! \
//! The analysis is a pure function of three textual toolchain artifacts:
//! an `avr-objdump -d` disassembly listing, a GCC `-fstack-usage`
//! listing and an `avr-size` section summary. From those it rebuilds the
//! whole-program call graph (direct, relative, tail and indirect calls),
//! bounds every recursion cycle it can classify, and reports the deepest
//! root-to-leaf stack path against the device RAM budget.
//!

// #![deny(rust_2018_idioms)]
// #![deny(missing_docs)]
#![deny(warnings)]


pub mod input;
pub mod su;
pub mod disasm;
pub mod sizes;
pub mod avr;
pub mod state;
pub mod output;


use std::collections::BTreeMap;

use petgraph::graph::NodeIndex;


///
/// Runs the whole pipeline over already-loaded artifacts and returns the
/// memory report. The staged methods on [`state::State`] do the same
/// thing one step at a time, for callers that want the intermediate
/// tables (the graph, the address-taken set, the cycles).
///
pub fn analyze(input: &input::InputData, config: AnalysisConfig)
    -> Result<MemoryReport, state::AnalysisError>
{
    let mut s = state::State::new(config);
    s.load_artifacts(input)?;
    s.add_nodes();
    s.collect_address_taken();
    s.build_call_graph();
    s.solve()?;
    Ok(s.report())
}




/*       ██████╗ ██████╗ ███╗   ██╗███████╗██╗ ██████╗        */
/*      ██╔════╝██╔═══██╗████╗  ██║██╔════╝██║██╔════╝        */
/*      ██║     ██║   ██║██╔██╗ ██║█████╗  ██║██║  ███╗       */
/*      ██║     ██║   ██║██║╚██╗██║██╔══╝  ██║██║   ██║       */
/*      ╚██████╗╚██████╔╝██║ ╚████║██║     ██║╚██████╔╝       */
/*       ╚═════╝ ╚═════╝ ╚═╝  ╚═══╝╚═╝     ╚═╝ ╚═════╝        */
/*     ██████████████████████████████████████████████████╗    */
/*     ╚═════════════════════════════════════════════════╝    */

///
/// Program-counter width of the device. A `call` pushes the return
/// address, so this decides how many bytes every call costs on top of
/// the callee's own frame.
///
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PcWidth {
    Pc16,
    Pc22,
}

impl PcWidth {
    pub fn from_mcu(mcu: &str) -> Self
    {
        match mcu
        {
            "atmega2560"    => PcWidth::Pc22,
            "atmega2561"    => PcWidth::Pc22,
            "atmega256rfr2" => PcWidth::Pc22,
            _               => PcWidth::Pc16,
        }
    }

    pub fn call_overhead_bytes(&self) -> u64
    {
        match *self {
            PcWidth::Pc16 => 2,
            PcWidth::Pc22 => 3,
        }
    }
}


///
/// Everything the solver needs to know about the device and about the
/// caller's tolerance for heuristics.
///
#[derive(Clone, Debug)]
pub struct AnalysisConfig
{
    /// Device identifier, informational except where it selects defaults.
    pub mcu:                         String,
    /// Total SRAM in bytes.
    pub ram_total:                   u64,
    /// Bytes a call instruction pushes for the return address.
    pub call_overhead_bytes:         u64,
    /// Upper bound assumed for a recursion argument whose value domain
    /// is not configured per function.
    pub argument_domain_default:     u64,
    /// Per-function recursion argument upper bounds.
    pub argument_domains:            BTreeMap<String, u64>,
    /// Depth ceiling charged for cycles that defeat classification.
    pub unknown_recursion_depth_cap: u64,
    /// Frame bytes charged for a call whose target cannot be resolved.
    pub unresolved_call_penalty:     u64,
    /// Functions whose name starts with this are interrupt handlers and
    /// become additional roots.
    pub isr_prefix:                  String,
    /// Extra headroom applied in the text report only.
    pub safety_margin_percent:       u64,
}

impl Default for AnalysisConfig
{
    fn default() -> Self
    {
        AnalysisConfig::for_mcu("atmega328p", 2048)
    }
}

impl AnalysisConfig
{
    pub fn for_mcu(mcu: &str, ram_total: u64) -> Self
    {
        AnalysisConfig
        {
            mcu:                         mcu.to_string(),
            ram_total,
            call_overhead_bytes:         PcWidth::from_mcu(mcu).call_overhead_bytes(),
            argument_domain_default:     255,
            argument_domains:            BTreeMap::new(),
            unknown_recursion_depth_cap: 32,
            unresolved_call_penalty:     0,
            isr_prefix:                  "__vector_".to_string(),
            safety_margin_percent:       10,
        }
    }

    /// Argument-domain upper bound for one function.
    pub fn domain_for(&self, name: &str) -> u64
    {
        self.argument_domains
            .get(name)
            .copied()
            .unwrap_or(self.argument_domain_default)
    }
}




/*      ███╗   ██╗ ██████╗ ██████╗ ███████╗      */
/*      ████╗  ██║██╔═══██╗██╔══██╗██╔════╝      */
/*      ██╔██╗ ██║██║   ██║██║  ██║█████╗        */
/*      ██║╚██╗██║██║   ██║██║  ██║██╔══╝        */
/*      ██║ ╚████║╚██████╔╝██████╔╝███████╗      */
/*      ╚═╝  ╚═══╝ ╚═════╝ ╚═════╝ ╚══════╝      */
/*     ████████████████████████████████████╗     */
/*     ╚═══════════════════════════════════╝     */

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NodeKind
{
    Normal,
    /// Program entry (`main`). Non-ISR root.
    Entry,
    /// Interrupt handler, an additional root.
    Interrupt,
    /// Placeholder for call targets that could not be resolved.
    UnknownExternal,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Node
{
    pub name:    String,
    pub address: u32,
    pub local:   Local,
    pub kind:    NodeKind,
    /// Worst-case stack from invoking this node, filled by the solver.
    pub max:     Option<Max>,
    /// Successor on the worst path, filled by the solver.
    pub next:    Option<NodeIndex>,
}

#[allow(non_snake_case)]
pub fn Node(name: String, address: u32, local: Local, kind: NodeKind) -> Node
{
    Node
    {
        name,
        address,
        local,
        kind,
        max:  None,
        next: None,
    }
}




/*      ██╗      ██████╗  ██████╗ █████╗ ██╗           */
/*      ██║     ██╔═══██╗██╔════╝██╔══██╗██║           */
/*      ██║     ██║   ██║██║     ███████║██║           */
/*      ██║     ██║   ██║██║     ██╔══██║██║           */
/*      ███████╗╚██████╔╝╚██████╗██║  ██║███████╗      */
/*      ╚══════╝ ╚═════╝  ╚═════╝╚═╝  ╚═╝╚══════╝      */
/*     ██████████████████████████████████████████╗     */
/*     ╚═════════════════════════════════════════╝     */
use core::fmt;

/// Local frame usage of one function, as reported by the compiler.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Local
{
    Exact(u64),
    /// `dynamic`-qualified frame: at least this many bytes.
    Dynamic(u64),
    /// No frame-size entry; solves as zero with a warning.
    Missing,
}

impl Local
{
    pub fn bytes(&self) -> u64
    {
        match *self
        {
            Local::Exact(n)   => n,
            Local::Dynamic(n) => n,
            Local::Missing    => 0,
        }
    }
}

impl fmt::Display for Local
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        match *self
        {
            Local::Exact(n)   => write!(f, "{}", n),
            Local::Dynamic(n) => write!(f, "{}+", n),
            Local::Missing    => f.write_str("?"),
        }
    }
}

impl Into<Max> for Local
{
    fn into(self) -> Max
    {
        match self
        {
            Local::Exact(n)   => Max::Exact(n),
            Local::Dynamic(n) => Max::LowerBound(n),
            Local::Missing    => Max::Exact(0),
        }
    }
}




/*      ███╗   ███╗ █████╗ ██╗  ██╗      */
/*      ████╗ ████║██╔══██╗╚██╗██╔╝      */
/*      ██╔████╔██║███████║ ╚███╔╝       */
/*      ██║╚██╔╝██║██╔══██║ ██╔██╗       */
/*      ██║ ╚═╝ ██║██║  ██║██╔╝ ██╗      */
/*      ╚═╝     ╚═╝╚═╝  ╚═╝╚═╝  ╚═╝      */
/*     ████████████████████████████╗     */
/*     ╚═══════════════════════════╝     */
use core::{ops, cmp};

/// A stack bound. `LowerBound` means the true worst case is at least
/// this much (a dynamic frame, an unclassified cycle or an unresolved
/// call was involved somewhere below).
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum Max
{
    Exact(u64),
    LowerBound(u64),
}

impl Max
{
    pub fn value(&self) -> u64
    {
        match *self
        {
            Max::Exact(n)      => n,
            Max::LowerBound(n) => n,
        }
    }

    pub fn is_exact(&self) -> bool
    {
        matches!(*self, Max::Exact(_))
    }

    /// Multiplies the bound by a cycle depth.
    pub fn scale(self, depth: u64) -> Max
    {
        match self
        {
            Max::Exact(n)      => Max::Exact(n * depth),
            Max::LowerBound(n) => Max::LowerBound(n * depth),
        }
    }
}

impl ops::Add<Max> for Max {
    type Output = Max;

    fn add(self, rhs: Max) -> Max {
        match (self, rhs) {
            (Max::Exact(lhs),      Max::Exact(rhs))      => Max::Exact(lhs + rhs),
            (Max::Exact(lhs),      Max::LowerBound(rhs)) => Max::LowerBound(lhs + rhs),
            (Max::LowerBound(lhs), Max::Exact(rhs))      => Max::LowerBound(lhs + rhs),
            (Max::LowerBound(lhs), Max::LowerBound(rhs)) => Max::LowerBound(lhs + rhs),
        }
    }
}

pub fn max_of(mut iter: impl Iterator<Item = Max>) -> Option<Max>
{
    iter.next().map(|first| iter.fold(first, max))
}

pub fn max(lhs: Max, rhs: Max) -> Max
{
    match (lhs, rhs)
    {
        (Max::Exact(lhs),      Max::Exact(rhs))      => Max::Exact(cmp::max(lhs, rhs)),
        (Max::Exact(lhs),      Max::LowerBound(rhs)) => Max::LowerBound(cmp::max(lhs, rhs)),
        (Max::LowerBound(lhs), Max::Exact(rhs))      => Max::LowerBound(cmp::max(lhs, rhs)),
        (Max::LowerBound(lhs), Max::LowerBound(rhs)) => Max::LowerBound(cmp::max(lhs, rhs)),
    }
}

impl fmt::Display for Max
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        match *self
        {
            Max::Exact(n)      => write!(f, "= {}", n),
            Max::LowerBound(n) => write!(f, ">= {}", n),
        }
    }
}




/*      ███████╗██████╗  ██████╗ ███████╗      */
/*      ██╔════╝██╔══██╗██╔════╝ ██╔════╝      */
/*      █████╗  ██║  ██║██║  ███╗█████╗        */
/*      ██╔══╝  ██║  ██║██║   ██║██╔══╝        */
/*      ███████╗██████╔╝╚██████╔╝███████╗      */
/*      ╚══════╝╚═════╝  ╚═════╝ ╚══════╝      */

/// How a call site transfers control. Parallel edges between the same
/// pair of functions collapse into one edge of the greatest kind, so
/// the variant order here is the specificity order.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum EdgeKind
{
    /// `icall`/`eicall` through a function pointer.
    Indirect,
    /// `call`/`rcall` with a resolved target.
    Direct,
    /// `jmp`/`rjmp` onto another function's entry; the caller's frame is
    /// gone by then, so the callee replaces it instead of stacking.
    Tail,
    /// Caller and callee are the same function.
    RecursiveSelf,
}




/*      ██████╗ ███████╗██████╗  ██████╗ ██████╗ ████████╗      */
/*      ██╔══██╗██╔════╝██╔══██╗██╔═══██╗██╔══██╗╚══██╔══╝      */
/*      ██████╔╝█████╗  ██████╔╝██║   ██║██████╔╝   ██║         */
/*      ██╔══██╗██╔══╝  ██╔═══╝ ██║   ██║██╔══██╗   ██║         */
/*      ██║  ██║███████╗██║     ╚██████╔╝██║  ██║   ██║         */
/*      ╚═╝  ╚═╝╚══════╝╚═╝      ╚═════╝ ╚═╝  ╚═╝   ╚═╝         */

///
/// The final product: worst-case stack depth against the device RAM
/// budget. Holds no references into the pipeline state.
///
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemoryReport
{
    pub mcu:                  String,
    pub ram_total:            u64,
    pub data_bytes:           u64,
    pub bss_bytes:            u64,
    pub stack_worst_case:     u64,
    /// `ram_total - (data + bss + stack_worst_case)`; negative on overflow.
    pub free_ram:             i64,
    pub overflow:             bool,
    /// Set when some traversed cycle had no classified pattern or some
    /// call never resolved: the result is a bound, not an estimate.
    pub bounded_by_heuristic: bool,
    pub unresolved_calls:     u64,
    /// Function names along the deepest path, in call order. A
    /// self-recursive function appears once per bounded activation.
    pub longest_path:         Vec<String>,
    pub warnings:             Vec<String>,
}

impl MemoryReport
{
    /// Exit-code convention for command-line front ends: 0 fits, 1
    /// overflows. (Fatal input errors never produce a report; front
    /// ends map those to 2.)
    pub fn exit_code(&self) -> i32
    {
        if self.overflow { 1 } else { 0 }
    }
}




#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn max_addition_keeps_lower_bounds_sticky()
    {
        assert_eq!(Max::Exact(4) + Max::Exact(6), Max::Exact(10));
        assert_eq!(Max::Exact(4) + Max::LowerBound(6), Max::LowerBound(10));
        assert_eq!(Max::LowerBound(4) + Max::Exact(6), Max::LowerBound(10));
    }

    #[test]
    fn max_of_picks_largest_value()
    {
        let m = max_of([Max::Exact(3), Max::LowerBound(7), Max::Exact(5)].into_iter());
        assert_eq!(m, Some(Max::LowerBound(7)));
        assert_eq!(max_of(std::iter::empty::<Max>()), None);
    }

    #[test]
    fn scale_multiplies_the_payload()
    {
        assert_eq!(Max::Exact(24).scale(8), Max::Exact(192));
        assert_eq!(Max::LowerBound(10).scale(3), Max::LowerBound(30));
    }

    #[test]
    fn local_converts_to_the_right_bound()
    {
        let e: Max = Local::Exact(12).into();
        let d: Max = Local::Dynamic(12).into();
        let m: Max = Local::Missing.into();
        assert_eq!(e, Max::Exact(12));
        assert_eq!(d, Max::LowerBound(12));
        assert_eq!(m, Max::Exact(0));
    }

    #[test]
    fn edge_kinds_order_by_specificity()
    {
        assert!(EdgeKind::RecursiveSelf > EdgeKind::Tail);
        assert!(EdgeKind::Tail > EdgeKind::Direct);
        assert!(EdgeKind::Direct > EdgeKind::Indirect);
    }

    #[test]
    fn call_overhead_follows_pc_width()
    {
        assert_eq!(PcWidth::from_mcu("atmega328p").call_overhead_bytes(), 2);
        assert_eq!(PcWidth::from_mcu("atmega2560").call_overhead_bytes(), 3);
        assert_eq!(AnalysisConfig::for_mcu("atmega328p", 2048).call_overhead_bytes, 2);
    }

    #[test]
    fn domain_override_beats_default()
    {
        let mut cfg = AnalysisConfig::default();
        cfg.argument_domains.insert("fac".to_string(), 5);
        assert_eq!(cfg.domain_for("fac"), 5);
        assert_eq!(cfg.domain_for("other"), 255);
    }
}
