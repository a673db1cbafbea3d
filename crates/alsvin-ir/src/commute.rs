//! Commutation and inverse-cancellation rules between operations.

use crate::error::{IrError, IrResult};
use crate::op::{Op, OpKind, PARAMETER_TOLERANCE, QubitId};

/// Checks whether two operations commute on the given qubit.
///
/// The rules, per shared qubit q:
/// - both operations control on q, or
/// - one controls on q and the other targets q with a diagonal gate
///   (symmetric in both orders), or
/// - both target q with diagonal gates, or
/// - both are the same standard (or homogeneous compound) gate kind.
pub fn commutes_on(a: &Op, b: &Op, qubit: QubitId) -> IrResult<bool> {
    if !a.acts_on(qubit) || !b.acts_on(qubit) {
        return Err(IrError::DoesNotActOn(qubit));
    }
    if a.is_control(qubit) {
        if b.is_control(qubit) {
            // q: ──■────■──
            //      |    |
            return Ok(true);
        }
        //         ┌────┐
        // q: ──■──┤ RZ ├
        //      |  └────┘
        return Ok(b.is_diagonal());
    }
    if b.is_control(qubit) {
        //    ┌────┐
        // q: ┤ RZ ├──■──
        //    └────┘  |
        return Ok(a.is_diagonal());
    }
    // q is a target of both operations
    if a.is_diagonal() && b.is_diagonal() {
        return Ok(true);
    }
    //    ┌───┐┌───┐
    // q: ┤ A ├┤ A ├
    //    └───┘└───┘
    Ok(a.kind() == b.kind() && a.is_unitary() && b.is_unitary())
}

/// Whether `kinds` forms an inverse pair given equal qubit support.
fn kinds_cancel(a: OpKind, b: OpKind, params_a: &[f64], params_b: &[f64]) -> bool {
    use OpKind::*;
    match (a, b) {
        (I, I) | (X, X) | (Y, Y) | (Z, Z) | (H, H) => true,
        (S, Sdg) | (Sdg, S) | (SX, SXdg) | (SXdg, SX) | (T, Tdg) | (Tdg, T) => true,
        (P, P) | (RX, RX) | (RY, RY) | (RZ, RZ) => {
            params_a.len() == 1
                && params_b.len() == 1
                && (params_a[0] + params_b[0]).abs() < PARAMETER_TOLERANCE
        }
        _ => false,
    }
}

/// Checks whether two consecutive operations cancel each other out.
///
/// Both operations must have identical control and target sets; the pair
/// must be of a self-inverse kind, a dagger pair, or matching rotations with
/// angles summing to zero.
pub fn is_inverse(a: &Op, b: &Op) -> bool {
    if a.controls() != b.controls() || a.targets() != b.targets() {
        return false;
    }
    match (a, b) {
        (Op::Compound(ca), Op::Compound(cb)) => kinds_cancel(
            ca.child_kind(),
            cb.child_kind(),
            ca.child_params(),
            cb.child_params(),
        ),
        (Op::Standard(sa), Op::Standard(sb)) => {
            kinds_cancel(sa.kind, sb.kind, &sa.params, &sb.params)
        }
        _ => false,
    }
}
