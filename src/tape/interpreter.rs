//! Generic tape interpreter.
//!
//! One primal, one tangent and one adjoint sweep, each written against
//! [`Algebra`]. Numeric evaluation, forward and reverse AD, symbolic
//! re-emission and sparsity propagation all run through these.
//!
//! Working arrays are slot-indexed; the tangent and adjoint arrays hold
//! `ndir` entries per slot (`slot * ndir + d`).

use crate::algebra::Algebra;
use crate::opcode::OpCode;

use super::{Instruction, Tape};

/// Operand values of `ins`, with [`Algebra::zero`] for absent operands.
#[inline]
fn load<A: Algebra>(alg: &mut A, ins: &Instruction, work: &[A::Elem]) -> (A::Elem, A::Elem) {
    let arity = ins.op.arity();
    let a = if arity >= 1 {
        work[ins.args[0] as usize].clone()
    } else {
        alg.zero()
    };
    let b = if arity == 2 {
        work[ins.args[1] as usize].clone()
    } else {
        alg.zero()
    };
    (a, b)
}

/// Operands and result of `ins`, or `None` if the algebra rejects the result.
#[inline]
fn step<A: Algebra>(
    alg: &mut A,
    ins: &Instruction,
    work: &[A::Elem],
) -> Option<(A::Elem, A::Elem, A::Elem)> {
    let (a, b) = load(alg, ins, work);
    if ins.op == OpCode::Const {
        let r = alg.constant(ins.literal);
        return Some((a, b, r));
    }
    let r = alg.eval(ins.op, &a, &b);
    if alg.admissible(ins.op, &a, &b, &r) {
        Some((a, b, r))
    } else {
        None
    }
}

impl Tape {
    /// Primal sweep. On entry `work` holds the inputs in slots `0..n_in`.
    ///
    /// Returns the index of the first rejected instruction on failure.
    pub(crate) fn sweep_primal<A: Algebra>(
        &self,
        alg: &mut A,
        work: &mut [A::Elem],
    ) -> Result<(), usize> {
        for (k, ins) in self.instructions.iter().enumerate() {
            let (_, _, r) = step(alg, ins, work).ok_or(k)?;
            work[ins.out as usize] = r;
        }
        Ok(())
    }

    /// Primal sweep that also records each instruction's local partials.
    ///
    /// The recorded partials let the adjoint sweep run after slots have been
    /// overwritten by later instructions.
    pub(crate) fn sweep_primal_partials<A: Algebra>(
        &self,
        alg: &mut A,
        work: &mut [A::Elem],
        partials: &mut Vec<(A::Elem, A::Elem)>,
    ) -> Result<(), usize> {
        partials.clear();
        partials.reserve(self.instructions.len());
        for (k, ins) in self.instructions.iter().enumerate() {
            let (a, b, r) = step(alg, ins, work).ok_or(k)?;
            let p = if ins.op == OpCode::Const {
                (alg.zero(), alg.zero())
            } else {
                alg.partials(ins.op, &a, &b, &r)
            };
            partials.push(p);
            work[ins.out as usize] = r;
        }
        Ok(())
    }

    /// Primal sweep carrying `ndir` tangent directions alongside.
    ///
    /// On entry `tangents` holds the seeds in the input slots.
    pub(crate) fn sweep_tangent<A: Algebra>(
        &self,
        alg: &mut A,
        work: &mut [A::Elem],
        tangents: &mut [A::Elem],
        ndir: usize,
    ) -> Result<(), usize> {
        let mut buf: Vec<A::Elem> = Vec::with_capacity(ndir);
        for (k, ins) in self.instructions.iter().enumerate() {
            let (a, b, r) = step(alg, ins, work).ok_or(k)?;
            let out = ins.out as usize;
            buf.clear();
            if ins.op == OpCode::Const {
                for _ in 0..ndir {
                    buf.push(alg.zero());
                }
            } else {
                let (pa, pb) = alg.partials(ins.op, &a, &b, &r);
                let ia = ins.args[0] as usize;
                for d in 0..ndir {
                    let ta = &tangents[ia * ndir + d];
                    let mut t = if alg.is_zero(ta) {
                        alg.zero()
                    } else {
                        alg.mul(&pa, ta)
                    };
                    if ins.op.is_binary() {
                        let tb = &tangents[ins.args[1] as usize * ndir + d];
                        if !alg.is_zero(tb) {
                            let c = alg.mul(&pb, tb);
                            t = alg.add(&t, &c);
                        }
                    }
                    buf.push(t);
                }
            }
            for (d, t) in buf.drain(..).enumerate() {
                tangents[out * ndir + d] = t;
            }
            work[out] = r;
        }
        Ok(())
    }

    /// Adjoint sweep in strictly reverse order over recorded partials.
    ///
    /// On entry `adjoints` holds the seeds in the output slots; on exit the
    /// input slots hold the accumulated input adjoints. Each instruction
    /// takes its output adjoint, resets that slot, then adds the weighted
    /// contribution to every operand, so operands read by several
    /// instructions (or twice by one) receive the sum.
    pub(crate) fn sweep_adjoint<A: Algebra>(
        &self,
        alg: &mut A,
        partials: &[(A::Elem, A::Elem)],
        adjoints: &mut [A::Elem],
        ndir: usize,
    ) {
        debug_assert_eq!(partials.len(), self.instructions.len());
        for (k, ins) in self.instructions.iter().enumerate().rev() {
            let out = ins.out as usize;
            let (pa, pb) = &partials[k];
            for d in 0..ndir {
                let zero = alg.zero();
                let s = std::mem::replace(&mut adjoints[out * ndir + d], zero);
                if ins.op == OpCode::Const || alg.is_zero(&s) {
                    continue;
                }
                let ia = ins.args[0] as usize * ndir + d;
                let ca = alg.mul(pa, &s);
                let sum = alg.add(&adjoints[ia], &ca);
                adjoints[ia] = sum;
                if ins.op.is_binary() {
                    let ib = ins.args[1] as usize * ndir + d;
                    let cb = alg.mul(pb, &s);
                    let sum = alg.add(&adjoints[ib], &cb);
                    adjoints[ib] = sum;
                }
            }
        }
    }
}
