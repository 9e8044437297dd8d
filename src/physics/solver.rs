//! Sparse projected Gauss-Seidel constraint solver (spec §3 "Constraint
//! row set", §4.7, component C7).
//!
//! Grounded directly on `dof/physics/PGSSolver1D.cpp`/`.h`: `resize`,
//! `set_mass`/`set_velocity`/`set_jacobian`/`set_bias`/
//! `set_lambda_bounds`/`set_warm_start`, `premultiply`, `warm_start`,
//! `advance_pgs`/`solve_pgs` are the same operations over the same flat
//! `Vec<f32>` layout (mass/velocity/jacobian/jacobianTMass rows, a
//! `mapping` array of body-index pairs). The source hard-codes
//! `BLOCK_SIZE = 1` (it only ever solves a single linear axis); this
//! solver keeps the source's per-constraint iteration untouched but reads
//! `block_size` as a runtime field so the same code serves 1-D contact
//! normals and larger (e.g. 2-D linear + angular) constraint rows alike.
//!
//! `warm_start` here applies `lambda0 * jacobianTMass` rather than the
//! source's `lambda0 * mass * jacobian` (its own comment flags this as a
//! TODO, never acted on) — using the already-premultiplied row keeps
//! `warm_start` consistent with `advance_pgs`, which only ever reads
//! `jacobianTMass`.

use crate::config::SolverConfig;

pub type BodyIndex = u32;
pub type ConstraintIndex = u32;

pub const INFINITE_MASS: BodyIndex = u32::MAX;

#[derive(Copy, Clone, Debug, Default)]
pub struct SolveResult {
    pub remaining_error: f32,
    pub is_finished: bool,
}

/// Flat storage for a system of `constraints` rows over `bodies` bodies,
/// each body contributing `block_size` velocity/mass components (spec §3:
/// "their three cardinalities ... are always consistent").
pub struct PgsSolver {
    block_size: usize,
    bodies: usize,
    constraints: usize,
    current_iteration: u8,
    max_iterations: u8,
    max_lambda: f32,

    lambda: Vec<f32>,
    bias: Vec<f32>,
    lambda_min: Vec<f32>,
    lambda_max: Vec<f32>,
    diagonal: Vec<f32>,
    velocity: Vec<f32>,
    mass: Vec<f32>,
    jacobian: Vec<f32>,
    jacobian_t_mass: Vec<f32>,
    mapping: Vec<BodyIndex>,
}

impl PgsSolver {
    pub fn new(block_size: usize, config: &SolverConfig) -> Self {
        PgsSolver {
            block_size,
            bodies: 0,
            constraints: 0,
            current_iteration: 0,
            max_iterations: config.max_iterations,
            max_lambda: config.max_lambda,
            lambda: Vec::new(),
            bias: Vec::new(),
            lambda_min: Vec::new(),
            lambda_max: Vec::new(),
            diagonal: Vec::new(),
            velocity: Vec::new(),
            mass: Vec::new(),
            jacobian: Vec::new(),
            jacobian_t_mass: Vec::new(),
            mapping: Vec::new(),
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn body_count(&self) -> usize {
        self.bodies
    }

    pub fn constraint_count(&self) -> usize {
        self.constraints
    }

    /// Allocates storage for `bodies` bodies and `constraints` rows,
    /// resetting the solve iteration counter.
    pub fn resize(&mut self, bodies: usize, constraints: usize) {
        self.bodies = bodies;
        self.constraints = constraints;
        self.current_iteration = 0;

        self.mass.resize(bodies * self.block_size, 0.0);
        self.velocity.resize(bodies * self.block_size, 0.0);

        self.lambda.resize(constraints, 0.0);
        self.bias.resize(constraints, 0.0);
        self.lambda_min.resize(constraints, 0.0);
        self.lambda_max.resize(constraints, 0.0);
        self.diagonal.resize(constraints, 0.0);
        self.jacobian.resize(constraints * self.block_size * 2, 0.0);
        self.jacobian_t_mass.resize(constraints * self.block_size * 2, 0.0);
        self.mapping.resize(constraints * 2, INFINITE_MASS);
    }

    fn mass_row(&self, body: BodyIndex) -> &[f32] {
        let i = body as usize * self.block_size;
        &self.mass[i..i + self.block_size]
    }

    fn velocity_row(&self, body: BodyIndex) -> &[f32] {
        let i = body as usize * self.block_size;
        &self.velocity[i..i + self.block_size]
    }

    /// Public view of a body's current velocity block, for callers that
    /// integrate the solved velocities back into their own storage.
    pub fn velocity(&self, body: BodyIndex) -> &[f32] {
        self.velocity_row(body)
    }

    fn jacobian_row(&self, constraint: ConstraintIndex) -> &[f32] {
        let i = constraint as usize * self.block_size * 2;
        &self.jacobian[i..i + self.block_size * 2]
    }

    fn jacobian_t_mass_row(&self, constraint: ConstraintIndex) -> &[f32] {
        let i = constraint as usize * self.block_size * 2;
        &self.jacobian_t_mass[i..i + self.block_size * 2]
    }

    fn mapping_pair(&self, constraint: ConstraintIndex) -> (BodyIndex, BodyIndex) {
        let i = constraint as usize * 2;
        (self.mapping[i], self.mapping[i + 1])
    }

    pub fn set_velocity(&mut self, body: BodyIndex, velocity: &[f32]) {
        let i = body as usize * self.block_size;
        self.velocity[i..i + self.block_size].copy_from_slice(velocity);
    }

    pub fn set_mass(&mut self, body: BodyIndex, inverse_mass: &[f32]) {
        let i = body as usize * self.block_size;
        self.mass[i..i + self.block_size].copy_from_slice(inverse_mass);
    }

    pub fn set_jacobian(&mut self, constraint: ConstraintIndex, body_a: BodyIndex, body_b: BodyIndex, row_a: &[f32], row_b: &[f32]) {
        let m = constraint as usize * 2;
        self.mapping[m] = body_a;
        self.mapping[m + 1] = body_b;

        let i = constraint as usize * self.block_size * 2;
        self.jacobian[i..i + self.block_size].copy_from_slice(row_a);
        self.jacobian[i + self.block_size..i + self.block_size * 2].copy_from_slice(row_b);
    }

    pub fn set_bias(&mut self, constraint: ConstraintIndex, bias: f32) {
        self.bias[constraint as usize] = bias;
    }

    pub fn set_lambda_bounds(&mut self, constraint: ConstraintIndex, min: f32, max: f32) {
        self.lambda_min[constraint as usize] = min;
        self.lambda_max[constraint as usize] = max;
    }

    pub fn set_warm_start(&mut self, constraint: ConstraintIndex, lambda0: f32) {
        self.lambda[constraint as usize] = lambda0;
    }

    /// `jacobianTMass[i] = jacobian[i] * mass[bodyOfBlock]`, row by row.
    pub fn premultiply(&mut self) {
        for i in 0..self.constraints as ConstraintIndex {
            let (a, b) = self.mapping_pair(i);
            let row = self.jacobian_row(i).to_vec();
            let (ja, jb) = row.split_at(self.block_size);

            let ma = if a == INFINITE_MASS { vec![0.0; self.block_size] } else { self.mass_row(a).to_vec() };
            let mb = if b == INFINITE_MASS { vec![0.0; self.block_size] } else { self.mass_row(b).to_vec() };

            let out = self.jacobian_t_mass_row_mut(i);
            for t in 0..self.block_size {
                out[t] = ja[t] * ma[t];
                out[self.block_size + t] = jb[t] * mb[t];
            }
        }
    }

    fn jacobian_t_mass_row_mut(&mut self, constraint: ConstraintIndex) -> &mut [f32] {
        let i = constraint as usize * self.block_size * 2;
        &mut self.jacobian_t_mass[i..i + self.block_size * 2]
    }

    fn apply_impulse(&mut self, body: BodyIndex, lambda: f32, jacobian_t_mass_half: &[f32]) {
        if body == INFINITE_MASS {
            return;
        }
        let i = body as usize * self.block_size;
        for t in 0..self.block_size {
            self.velocity[i + t] += lambda * jacobian_t_mass_half[t];
        }
    }

    /// Applies each constraint's currently stored `lambda` to body
    /// velocities via `jacobianTMass` (not the raw `jacobian * mass`
    /// product the source computes inline — see module doc).
    pub fn warm_start(&mut self) {
        for i in 0..self.constraints as ConstraintIndex {
            let (a, b) = self.mapping_pair(i);
            let lambda = self.lambda[i as usize];
            let row = self.jacobian_t_mass_row(i).to_vec();
            let (jma, jmb) = row.split_at(self.block_size);
            self.apply_impulse(a, lambda, jma);
            self.apply_impulse(b, lambda, jmb);
        }
    }

    fn dot(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
    }

    /// One PGS sweep over every constraint, precomputing `diagonal` on the
    /// first iteration.
    pub fn advance_pgs(&mut self) -> SolveResult {
        if self.current_iteration == 0 {
            for i in 0..self.constraints as ConstraintIndex {
                let row = self.jacobian_row(i).to_vec();
                let (ja, jb) = row.split_at(self.block_size);
                let jm_row = self.jacobian_t_mass_row(i).to_vec();
                let (jma, jmb) = jm_row.split_at(self.block_size);
                let denom = Self::dot(ja, jma) + Self::dot(jb, jmb);
                self.diagonal[i as usize] = if denom.abs() > f32::EPSILON { 1.0 / denom } else { 0.0 };
            }
        }

        let mut remaining_error = 0.0f32;
        for i in 0..self.constraints as ConstraintIndex {
            let (a, b) = self.mapping_pair(i);
            let row = self.jacobian_row(i).to_vec();
            let (ja, jb) = row.split_at(self.block_size);

            let va = if a == INFINITE_MASS { vec![0.0; self.block_size] } else { self.velocity_row(a).to_vec() };
            let vb = if b == INFINITE_MASS { vec![0.0; self.block_size] } else { self.velocity_row(b).to_vec() };

            let jv = Self::dot(ja, &va) + Self::dot(jb, &vb);
            let idx = i as usize;
            let delta = (self.bias[idx] - jv) * self.diagonal[idx];

            let prev_lambda = self.lambda[idx];
            let new_lambda = (prev_lambda + delta).max(self.lambda_min[idx]).min(self.lambda_max[idx]);
            let applied = new_lambda - prev_lambda;
            self.lambda[idx] = new_lambda;

            let jm_row = self.jacobian_t_mass_row(i).to_vec();
            let (jma, jmb) = jm_row.split_at(self.block_size);
            self.apply_impulse(a, applied, jma);
            self.apply_impulse(b, applied, jmb);

            remaining_error = remaining_error.max(applied.abs());
        }

        self.current_iteration += 1;
        let is_finished = self.current_iteration >= self.max_iterations || remaining_error <= self.max_lambda;
        SolveResult { remaining_error, is_finished }
    }

    /// Iterates `advance_pgs` until it reports finished.
    pub fn solve_pgs(&mut self) -> SolveResult {
        loop {
            let result = self.advance_pgs();
            if result.is_finished {
                return result;
            }
        }
    }

    pub fn solve_pgs_warm_start(&mut self) -> SolveResult {
        self.warm_start();
        self.solve_pgs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_config() -> SolverConfig {
        SolverConfig::default()
    }

    #[test]
    fn single_constraint_converges_to_half_the_bias_with_unit_masses() {
        let mut solver = PgsSolver::new(1, &default_config());
        solver.resize(2, 1);
        solver.set_mass(0, &[1.0]);
        solver.set_mass(1, &[1.0]);
        solver.set_jacobian(0, 0, 1, &[-1.0], &[1.0]);
        solver.set_bias(0, 1.0);
        solver.set_lambda_bounds(0, f32::MIN, f32::MAX);
        solver.premultiply();

        let result = solver.solve_pgs();
        assert!(result.is_finished);
        assert!((solver.lambda[0] - 0.5).abs() < 1e-3, "lambda was {}", solver.lambda[0]);
    }

    #[test]
    fn infinite_mass_body_never_receives_a_velocity_update() {
        let mut solver = PgsSolver::new(1, &default_config());
        solver.resize(1, 1);
        solver.set_mass(0, &[2.0]);
        solver.set_jacobian(0, INFINITE_MASS, 0, &[0.0], &[1.0]);
        solver.set_bias(0, 1.0);
        solver.set_lambda_bounds(0, f32::MIN, f32::MAX);
        solver.premultiply();

        solver.solve_pgs();
        assert!(solver.velocity[0] != 0.0);
    }

    #[test]
    fn lambda_bounds_clamp_the_accumulated_impulse() {
        let mut solver = PgsSolver::new(1, &default_config());
        solver.resize(2, 1);
        solver.set_mass(0, &[1.0]);
        solver.set_mass(1, &[1.0]);
        solver.set_jacobian(0, 0, 1, &[-1.0], &[1.0]);
        solver.set_bias(0, 100.0);
        solver.set_lambda_bounds(0, 0.0, 0.2);
        solver.premultiply();

        solver.solve_pgs();
        assert!((solver.lambda[0] - 0.2).abs() < 1e-5);
    }
}
