//! Implicit species solver
//!
//! The five moisture species of one level are coupled through an explicit source
//! matrix `solqa` (entry `(i, j)` is the mass species `i` gains from species `j`), an
//! implicit rate matrix `solqb` and a per-species sedimentation sink. Matrices are held
//! in solver-slot order. Elimination runs without pivoting in slot order; the system is
//! diagonally dominant by construction.

use nalgebra::{SMatrix, SVector};

/// Number of coupled moisture species
pub const NCLV: usize = 5;

/// 5x5 species matrix
pub type SpeciesMatrix = SMatrix<f64, NCLV, NCLV>;

/// Per-slot species vector
pub type SpeciesVector = SVector<f64, NCLV>;

/// Scale explicit sinks so that no species is driven below zero
///
/// Rows are processed in slot order and every row's total sink is recomputed after
/// the previous rows were scaled, so the result depends on the slot ordering.
pub fn limit_sinks(solqa: &mut SpeciesMatrix, qx: &SpeciesVector, epsec: f64) {
    for jm in 0..NCLV {
        let sinksum = -solqa.row(jm).sum();
        let max = qx[jm].max(epsec);
        let ratio = max / sinksum.max(max);
        for jn in 0..NCLV {
            if solqa[(jm, jn)] < 0.0 {
                solqa[(jm, jn)] *= ratio;
                solqa[(jn, jm)] *= ratio;
            }
        }
    }
}

/// Left-hand side of the implicit system
///
/// Diagonal: `1 + fallsink + sum of implicit losses`; off-diagonal: implicit gains.
#[must_use]
pub fn assemble_lhs(solqb: &SpeciesMatrix, fallsink: &SpeciesVector) -> SpeciesMatrix {
    let mut lhs = SpeciesMatrix::zeros();
    for jm in 0..NCLV {
        for jn in 0..NCLV {
            lhs[(jn, jm)] = if jn == jm {
                1.0 + fallsink[jm] + solqb.column(jn).sum()
            } else {
                -solqb[(jn, jm)]
            };
        }
    }
    lhs
}

/// Explicit first guess `qx + sum_j solqa(i, j)`
#[must_use]
pub fn explicit_update(solqa: &SpeciesMatrix, qx: &SpeciesVector) -> SpeciesVector {
    let mut qxn = *qx;
    for jm in 0..NCLV {
        qxn[jm] += solqa.row(jm).sum();
    }
    qxn
}

/// Solve `lhs * x = rhs` in place by Gaussian elimination without pivoting
///
/// On return `lhs` holds the LU factors and `rhs` the solution.
pub fn solve_in_place(lhs: &mut SpeciesMatrix, rhs: &mut SpeciesVector) {
    // Non-pivoting LU factorization
    for jn in 0..NCLV - 1 {
        for jm in jn + 1..NCLV {
            lhs[(jm, jn)] /= lhs[(jn, jn)];
            for ik in jn + 1..NCLV {
                lhs[(jm, ik)] -= lhs[(jm, jn)] * lhs[(jn, ik)];
            }
        }
    }

    // Forward substitution
    for jn in 1..NCLV {
        for jm in 0..jn {
            rhs[jn] -= lhs[(jn, jm)] * rhs[jm];
        }
    }

    // Back substitution
    rhs[NCLV - 1] /= lhs[(NCLV - 1, NCLV - 1)];
    for jn in (0..NCLV - 1).rev() {
        for jm in jn + 1..NCLV {
            rhs[jn] -= lhs[(jn, jm)] * rhs[jm];
        }
        rhs[jn] /= lhs[(jn, jn)];
    }
}

/// Move every non-vapour value below `epsec` into the vapour slot
pub fn absorb_small_values(qxn: &mut SpeciesVector, vapour_slot: usize, epsec: f64) {
    for jn in 0..NCLV {
        if jn != vapour_slot && qxn[jn] < epsec {
            qxn[vapour_slot] += qxn[jn];
            qxn[jn] = 0.0;
        }
    }
}

/// Full implicit step: sink limiting, explicit guess, implicit solve, cleanup
#[must_use]
pub fn solve_species(
    mut solqa: SpeciesMatrix,
    solqb: &SpeciesMatrix,
    fallsink: &SpeciesVector,
    qx: &SpeciesVector,
    vapour_slot: usize,
    epsec: f64,
) -> SpeciesVector {
    limit_sinks(&mut solqa, qx, epsec);
    let mut lhs = assemble_lhs(solqb, fallsink);
    let mut qxn = explicit_update(&solqa, qx);
    solve_in_place(&mut lhs, &mut qxn);
    absorb_small_values(&mut qxn, vapour_slot, epsec);
    qxn
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_solve_matches_dense_solution() {
        let lhs = SpeciesMatrix::from_row_slice(&[
            4.0, -1.0, 0.0, 0.0, -0.5, //
            -0.2, 3.0, -0.1, 0.0, 0.0, //
            0.0, -0.3, 2.5, -0.2, 0.0, //
            -0.1, 0.0, 0.0, 2.0, -0.3, //
            0.0, -0.2, -0.4, 0.0, 1.5,
        ]);
        let expected = SpeciesVector::new(0.1, 0.2, 0.3, 0.4, 0.5);
        let mut rhs = lhs * expected;
        let mut factored = lhs;
        solve_in_place(&mut factored, &mut rhs);
        for i in 0..NCLV {
            assert_relative_eq!(rhs[i], expected[i], max_relative = 1e-13);
        }
    }

    #[test]
    fn test_identity_system_is_explicit_update() {
        let mut solqa = SpeciesMatrix::zeros();
        // 1e-4 from slot 4 to slot 0
        solqa[(0, 4)] = 1.0e-4;
        solqa[(4, 0)] = -1.0e-4;
        let qx = SpeciesVector::new(1.0e-4, 0.0, 0.0, 0.0, 1.0e-2);
        let qxn = solve_species(
            solqa,
            &SpeciesMatrix::zeros(),
            &SpeciesVector::zeros(),
            &qx,
            4,
            1e-14,
        );
        assert_relative_eq!(qxn[0], 2.0e-4, max_relative = 1e-14);
        assert_relative_eq!(qxn[4], 1.0e-2 - 1.0e-4, max_relative = 1e-14);
        assert_eq!(qxn[1], 0.0);
    }

    #[test]
    fn test_sink_limiter_prevents_negative_mass() {
        let mut solqa = SpeciesMatrix::zeros();
        // Slot 2 loses three times what it holds
        solqa[(4, 2)] = 3.0e-4;
        solqa[(2, 4)] = -3.0e-4;
        let qx = SpeciesVector::new(0.0, 0.0, 1.0e-4, 0.0, 1.0e-3);
        limit_sinks(&mut solqa, &qx, 1e-14);
        assert_relative_eq!(solqa[(2, 4)], -1.0e-4, max_relative = 1e-12);
        assert_relative_eq!(solqa[(4, 2)], 1.0e-4, max_relative = 1e-12);
        let qxn = explicit_update(&solqa, &qx);
        assert!(qxn[2].abs() < 1e-18);
    }

    #[test]
    fn test_implicit_conversion_conserves_mass() {
        let mut solqb = SpeciesMatrix::zeros();
        // Slot 0 converts into slot 2 at rate 0.5 per step
        solqb[(2, 0)] = 0.5;
        let qx = SpeciesVector::new(3.0e-4, 0.0, 0.0, 0.0, 5.0e-3);
        let qxn = solve_species(
            SpeciesMatrix::zeros(),
            &solqb,
            &SpeciesVector::zeros(),
            &qx,
            4,
            1e-14,
        );
        assert_relative_eq!(qxn[0], 2.0e-4, max_relative = 1e-12);
        assert_relative_eq!(qxn.sum(), qx.sum(), max_relative = 1e-12);
    }

    #[test]
    fn test_fall_sink_removes_mass() {
        let fallsink = SpeciesVector::new(0.0, 0.0, 1.0, 0.0, 0.0);
        let qx = SpeciesVector::new(0.0, 0.0, 2.0e-4, 0.0, 5.0e-3);
        let qxn = solve_species(
            SpeciesMatrix::zeros(),
            &SpeciesMatrix::zeros(),
            &fallsink,
            &qx,
            4,
            1e-14,
        );
        assert_relative_eq!(qxn[2], 1.0e-4, max_relative = 1e-12);
    }

    #[test]
    fn test_small_values_move_to_vapour() {
        let mut qxn = SpeciesVector::new(1.0e-16, -1.0e-16, 1.0e-3, 0.0, 1.0e-3);
        absorb_small_values(&mut qxn, 4, 1e-14);
        assert_eq!(qxn[0], 0.0);
        assert_eq!(qxn[1], 0.0);
        assert_eq!(qxn[2], 1.0e-3);
        assert_eq!(qxn[4], 1.0e-3);
    }
}
