//! Algorithm builder: lowers an expression graph to a scalar [`Tape`].
//!
//! Lowering runs in four passes:
//!
//! 1. Post-order traversal from the outputs, visiting each node once.
//! 2. Scalar emission: every stored entry of every visited node becomes a
//!    value id (inputs first, then one per instruction). Structural nodes
//!    only re-route value ids and emit nothing.
//! 3. Dead-code elimination from the outputs, then compaction.
//! 4. Slot assignment with liveness-based reuse.

use std::collections::{HashMap, HashSet};

use crate::error::GraphError;
use crate::graph::{ConcatKind, ExprGraph, ExprId, Node};
use crate::opcode::{OpCode, UNUSED};
use crate::options::BuildOptions;
use crate::sparsity::{PartEntry, Sparsity};
use crate::tape::{Instruction, IoBlock, Tape};

/// Builds tapes from one graph.
pub struct TapeBuilder<'g> {
    graph: &'g ExprGraph,
    options: BuildOptions,
}

impl<'g> TapeBuilder<'g> {
    pub fn new(graph: &'g ExprGraph) -> Self {
        Self {
            graph,
            options: BuildOptions::default(),
        }
    }

    pub fn options(mut self, options: BuildOptions) -> Self {
        self.options = options;
        self
    }

    /// Linearize `outputs` as functions of the symbols `inputs`.
    ///
    /// Input nonzeros occupy slots `0..n` in declaration order. A declared
    /// input that no output uses is not an error; it simply gets no
    /// instruction.
    pub fn build(&self, inputs: &[ExprId], outputs: &[ExprId]) -> Result<Tape, GraphError> {
        let graph = self.graph;
        let mut lowering = Lowering::new(graph, self.options);

        let mut seen = HashSet::new();
        let mut input_blocks = Vec::with_capacity(inputs.len());
        for &x in inputs {
            graph.check(x)?;
            if !matches!(graph.node(x), Node::Symbol(_)) {
                return Err(GraphError::NotSymbol { node: x });
            }
            if !seen.insert(x) {
                return Err(GraphError::DuplicateInput { node: x });
            }
            let sparsity = graph.sparsity(x).clone();
            let start = lowering.num_inputs;
            lowering.num_inputs += sparsity.nnz() as u32;
            let slots: Vec<u32> = (start..lowering.num_inputs).collect();
            lowering.values[x.index()] = Some(slots.clone());
            input_blocks.push(IoBlock {
                name: graph.symbol_name(x).unwrap_or_default().to_string(),
                sparsity,
                slots,
            });
        }
        for &y in outputs {
            graph.check(y)?;
        }

        for id in topological_order(graph, outputs)? {
            if lowering.values[id.index()].is_none() {
                let vals = lowering.lower(id)?;
                lowering.values[id.index()] = Some(vals);
            }
        }

        let output_values: Vec<Vec<u32>> = outputs
            .iter()
            .map(|y| lowering.values[y.index()].clone().unwrap_or_default())
            .collect();
        let emitted = lowering.instructions.len();
        let (instructions, output_values) = lowering.eliminate_dead_code(output_values);
        let (instructions, output_values, num_slots) = assign_slots(
            lowering.num_inputs,
            instructions,
            output_values,
            self.options.reuse_slots,
        );

        let output_blocks = outputs
            .iter()
            .zip(output_values)
            .enumerate()
            .map(|(o, (&y, slots))| IoBlock {
                name: graph
                    .symbol_name(y)
                    .map_or_else(|| format!("o{o}"), str::to_string),
                sparsity: graph.sparsity(y).clone(),
                slots,
            })
            .collect();

        let values = lowering.num_inputs as usize + instructions.len();
        log::debug!(
            "built tape: {} nodes, {} instructions ({} before dce), {} slots ({} saved by reuse)",
            graph.len(),
            instructions.len(),
            emitted,
            num_slots,
            values - num_slots
        );

        let tape = Tape {
            instructions,
            num_slots,
            inputs: input_blocks,
            outputs: output_blocks,
        };
        debug_assert!(tape.validate().is_ok(), "builder produced an invalid tape");
        Ok(tape)
    }
}

impl Tape {
    /// Build with default [`BuildOptions`].
    pub fn build(graph: &ExprGraph, inputs: &[ExprId], outputs: &[ExprId]) -> Result<Self, GraphError> {
        TapeBuilder::new(graph).build(inputs, outputs)
    }
}

// ── Traversal ──

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    New,
    Active,
    Done,
}

/// Post-order over everything reachable from `roots`, each node once.
fn topological_order(graph: &ExprGraph, roots: &[ExprId]) -> Result<Vec<ExprId>, GraphError> {
    let mut mark = vec![Mark::New; graph.len()];
    let mut order = Vec::new();
    let mut stack: Vec<(ExprId, Vec<ExprId>, usize)> = Vec::new();

    for &root in roots {
        if mark[root.index()] != Mark::New {
            continue;
        }
        mark[root.index()] = Mark::Active;
        stack.push((root, graph.dependencies(root), 0));

        while let Some(frame) = stack.last_mut() {
            let id = frame.0;
            let Some(dep) = frame.1.get(frame.2).copied() else {
                mark[id.index()] = Mark::Done;
                order.push(id);
                stack.pop();
                continue;
            };
            frame.2 += 1;
            graph.check(dep)?;
            match mark[dep.index()] {
                Mark::Done => {}
                Mark::Active => return Err(GraphError::Cycle { node: dep }),
                Mark::New => {
                    mark[dep.index()] = Mark::Active;
                    stack.push((dep, graph.dependencies(dep), 0));
                }
            }
        }
    }
    Ok(order)
}

// ── Scalar emission ──

/// Emission state. Value ids `0..num_inputs` are input nonzeros; instruction
/// `k` defines value `num_inputs + k`. Instruction operands and outputs hold
/// value ids until slot assignment.
struct Lowering<'g> {
    graph: &'g ExprGraph,
    options: BuildOptions,
    num_inputs: u32,
    instructions: Vec<Instruction>,
    /// Value ids of each lowered node's stored entries, in nonzero order.
    values: Vec<Option<Vec<u32>>>,
    constants: HashMap<u64, u32>,
    scalar_ops: HashMap<(OpCode, u32, u32), u32>,
}

impl<'g> Lowering<'g> {
    fn new(graph: &'g ExprGraph, options: BuildOptions) -> Self {
        Self {
            graph,
            options,
            num_inputs: 0,
            instructions: Vec::new(),
            values: vec![None; graph.len()],
            constants: HashMap::new(),
            scalar_ops: HashMap::new(),
        }
    }

    fn next_value(&self) -> u32 {
        self.num_inputs + self.instructions.len() as u32
    }

    fn emit_const(&mut self, bits: u64) -> u32 {
        if self.options.cse {
            if let Some(&v) = self.constants.get(&bits) {
                return v;
            }
        }
        let v = self.next_value();
        self.instructions.push(Instruction {
            op: OpCode::Const,
            out: v,
            args: [UNUSED, UNUSED],
            literal: f64::from_bits(bits),
        });
        self.constants.insert(bits, v);
        v
    }

    fn zero(&mut self) -> u32 {
        self.emit_const(0.0f64.to_bits())
    }

    fn emit(&mut self, op: OpCode, a: u32, b: u32) -> u32 {
        let (a, b) = if op.is_commutative() && b < a { (b, a) } else { (a, b) };
        let key = (op, a, b);
        if self.options.cse {
            if let Some(&v) = self.scalar_ops.get(&key) {
                return v;
            }
        }
        let v = self.next_value();
        self.instructions.push(Instruction {
            op,
            out: v,
            args: [a, b],
            literal: 0.0,
        });
        self.scalar_ops.insert(key, v);
        v
    }

    fn lowered(&self, id: ExprId) -> &[u32] {
        self.values[id.index()].as_deref().unwrap_or(&[])
    }

    /// Value of `x` at result position `(r, c)`, broadcasting a 1x1 `x`.
    fn element(&mut self, x: ExprId, r: usize, c: usize) -> u32 {
        let sx = self.graph.sparsity(x);
        let nz = if sx.is_scalar() {
            sx.get_nz(0, 0)
        } else {
            sx.get_nz(r, c)
        };
        match nz {
            Some(k) => self.lowered(x)[k],
            None => self.zero(),
        }
    }

    fn route(&self, parts: &[ExprId], mapping: &[PartEntry]) -> Vec<u32> {
        mapping
            .iter()
            .map(|&(p, k)| self.lowered(parts[p])[k])
            .collect()
    }

    /// Emit the entries of one node whose operands are already lowered.
    fn lower(&mut self, id: ExprId) -> Result<Vec<u32>, GraphError> {
        let graph = self.graph;
        let vals = match graph.node(id) {
            Node::Symbol(_) => {
                return Err(GraphError::FreeSymbol {
                    node: id,
                    name: graph.symbol_name(id).unwrap_or_default().to_string(),
                })
            }
            Node::Constant(bits) => vec![self.emit_const(*bits)],
            Node::Zeros(..) => Vec::new(),
            Node::Unary(op, a) => {
                let (op, a) = (*op, *a);
                let positions: Vec<(usize, usize)> = graph.sparsity(id).iter().collect();
                positions
                    .into_iter()
                    .map(|(r, c)| {
                        let v = self.element(a, r, c);
                        self.emit(op, v, UNUSED)
                    })
                    .collect()
            }
            Node::Binary(op, a, b) => {
                let (op, a, b) = (*op, *a, *b);
                let positions: Vec<(usize, usize)> = graph.sparsity(id).iter().collect();
                positions
                    .into_iter()
                    .map(|(r, c)| {
                        let va = self.element(a, r, c);
                        let vb = self.element(b, r, c);
                        self.emit(op, va, vb)
                    })
                    .collect()
            }
            Node::Concat(kind, parts) => {
                let patterns: Vec<&Sparsity> = parts.iter().map(|&p| graph.sparsity(p)).collect();
                let (_, mapping) = match kind {
                    ConcatKind::Horizontal => Sparsity::horzcat(&patterns)?,
                    ConcatKind::Vertical => Sparsity::vertcat(&patterns)?,
                    ConcatKind::Diagonal => Sparsity::diagcat(&patterns),
                };
                self.route(parts, &mapping)
            }
            Node::Transpose(a) => {
                let (_, mapping) = graph.sparsity(*a).transpose();
                let src = self.lowered(*a);
                mapping.iter().map(|&k| src[k]).collect()
            }
            Node::GetNonzero(a, k) => vec![self.lowered(*a)[*k]],
        };
        Ok(vals)
    }

    /// Drop instructions no output depends on and renumber the rest.
    fn eliminate_dead_code(
        &self,
        outputs: Vec<Vec<u32>>,
    ) -> (Vec<Instruction>, Vec<Vec<u32>>) {
        let n_in = self.num_inputs as usize;
        let n = n_in + self.instructions.len();
        let mut live = vec![false; n];
        for &v in outputs.iter().flatten() {
            live[v as usize] = true;
        }
        for ins in self.instructions.iter().rev() {
            if live[ins.out as usize] {
                for a in ins.operands() {
                    live[a as usize] = true;
                }
            }
        }

        let mut remap: Vec<u32> = (0..n as u32).collect();
        let mut kept = Vec::new();
        for ins in &self.instructions {
            if !live[ins.out as usize] {
                continue;
            }
            let new_out = (n_in + kept.len()) as u32;
            remap[ins.out as usize] = new_out;
            let mut ins = *ins;
            ins.out = new_out;
            for arg in ins.args.iter_mut().take(ins.op.arity()) {
                *arg = remap[*arg as usize];
            }
            kept.push(ins);
        }
        let outputs = outputs
            .into_iter()
            .map(|block| block.into_iter().map(|v| remap[v as usize]).collect())
            .collect();
        (kept, outputs)
    }
}

// ── Slot assignment ──

/// Map value ids to slots. With `reuse` on, a slot is released after the
/// last instruction reading it and handed to the next definition; slots of
/// output values are never released.
fn assign_slots(
    num_inputs: u32,
    mut instructions: Vec<Instruction>,
    outputs: Vec<Vec<u32>>,
    reuse: bool,
) -> (Vec<Instruction>, Vec<Vec<u32>>, usize) {
    let n_in = num_inputs as usize;
    let n = n_in + instructions.len();
    if !reuse {
        return (instructions, outputs, n);
    }

    let mut pinned = vec![false; n];
    for &v in outputs.iter().flatten() {
        pinned[v as usize] = true;
    }
    let mut last_use = vec![None; n];
    for (k, ins) in instructions.iter().enumerate() {
        for a in ins.operands() {
            last_use[a as usize] = Some(k);
        }
    }

    let mut slot = vec![0u32; n];
    let mut free: Vec<u32> = Vec::new();
    for v in 0..n_in {
        slot[v] = v as u32;
        if last_use[v].is_none() && !pinned[v] {
            free.push(v as u32);
        }
    }
    // Unused input slots go out lowest first.
    free.reverse();

    let mut num_slots = n_in as u32;
    for (k, ins) in instructions.iter_mut().enumerate() {
        let [a, b] = ins.args;
        let arity = ins.op.arity();
        if arity >= 1 {
            ins.args[0] = slot[a as usize];
        }
        if arity == 2 {
            ins.args[1] = slot[b as usize];
        }
        for (i, v) in [a, b].into_iter().take(arity).enumerate() {
            let repeated = i == 1 && v == a;
            if !repeated && last_use[v as usize] == Some(k) && !pinned[v as usize] {
                free.push(slot[v as usize]);
            }
        }
        let s = free.pop().unwrap_or_else(|| {
            num_slots += 1;
            num_slots - 1
        });
        slot[ins.out as usize] = s;
        ins.out = s;
    }

    let outputs = outputs
        .into_iter()
        .map(|block| block.into_iter().map(|v| slot[v as usize]).collect())
        .collect();
    (instructions, outputs, num_slots as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ins(op: OpCode, out: u32, a: u32, b: u32) -> Instruction {
        Instruction {
            op,
            out,
            args: [a, b],
            literal: 0.0,
        }
    }

    #[test]
    fn chain_reuses_one_slot() {
        // v1 = sin(v0), v2 = cos(v1), v3 = exp(v2); only v3 is an output.
        let chain = vec![
            ins(OpCode::Sin, 1, 0, UNUSED),
            ins(OpCode::Cos, 2, 1, UNUSED),
            ins(OpCode::Exp, 3, 2, UNUSED),
        ];
        let (out, outputs, n) = assign_slots(1, chain, vec![vec![3]], true);
        assert_eq!(n, 1);
        assert_eq!(outputs, vec![vec![out[2].out]]);
        assert!(out.iter().all(|i| i.out == 0));
    }

    #[test]
    fn output_slots_are_pinned() {
        let prog = vec![
            ins(OpCode::Sin, 1, 0, UNUSED),
            ins(OpCode::Cos, 2, 1, UNUSED),
        ];
        let (out, outputs, _) = assign_slots(1, prog, vec![vec![1], vec![2]], true);
        assert_ne!(outputs[0][0], outputs[1][0]);
        assert_eq!(out[1].args[0], outputs[0][0]);
    }

    #[test]
    fn no_reuse_keeps_value_ids() {
        let prog = vec![
            ins(OpCode::Sin, 1, 0, UNUSED),
            ins(OpCode::Cos, 2, 1, UNUSED),
        ];
        let (out, _, n) = assign_slots(1, prog, vec![vec![2]], false);
        assert_eq!(n, 3);
        assert_eq!(out[1].out, 2);
    }

    #[test]
    fn repeated_operand_is_released_once() {
        // v2 = v1 * v1 kills v1; v3 must not land on v2's slot.
        let prog = vec![
            ins(OpCode::Sin, 1, 0, UNUSED),
            ins(OpCode::Mul, 2, 1, 1),
            ins(OpCode::Cos, 3, 0, UNUSED),
            ins(OpCode::Add, 4, 2, 3),
            ins(OpCode::Add, 5, 4, 0),
        ];
        let (out, _, n) = assign_slots(1, prog, vec![vec![5]], true);
        assert_ne!(out[2].out, out[1].out);
        assert_eq!(n, 3);
    }
}
