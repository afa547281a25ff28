//! Partition of the flat optimization vector.
//!
//! ```text
//! | x (N) | y (N) | psi (N) | v (N) | cte (N) | epsi (N) | delta (N-1) | a (N-1) |
//! ```
//!
//! Constraint row `i` mirrors optimization index `i` for the six state blocks,
//! so the same offsets address both vectors. No other module computes offsets.

use std::ops::Range;

use crate::common::{Actuation, VehicleState};

/// State components in block order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateVar {
    X,
    Y,
    Psi,
    V,
    Cte,
    Epsi,
}

impl StateVar {
    pub const ALL: [StateVar; 6] = [
        StateVar::X,
        StateVar::Y,
        StateVar::Psi,
        StateVar::V,
        StateVar::Cte,
        StateVar::Epsi,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Control components in block order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlVar {
    Steering,
    Acceleration,
}

impl ControlVar {
    pub const ALL: [ControlVar; 2] = [ControlVar::Steering, ControlVar::Acceleration];

    pub fn index(self) -> usize {
        self as usize
    }
}

/// One contiguous block of the optimization vector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Block {
    State(StateVar),
    Control(ControlVar),
}

/// Offsets of every block for a horizon of `n` steps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    n: usize,
    state_start: [usize; 6],
    control_start: [usize; 2],
    n_vars: usize,
}

impl Layout {
    pub const STATE_DIM: usize = 6;
    pub const CONTROL_DIM: usize = 2;

    /// Compute the offsets for `n` timesteps. `n` must be at least 2.
    pub fn new(n: usize) -> Self {
        debug_assert!(n >= 2, "horizon needs at least 2 steps");
        let mut state_start = [0; 6];
        for (k, start) in state_start.iter_mut().enumerate() {
            *start = k * n;
        }
        let delta_start = Self::STATE_DIM * n;
        let a_start = delta_start + (n - 1);
        Self {
            n,
            state_start,
            control_start: [delta_start, a_start],
            n_vars: a_start + (n - 1),
        }
    }

    /// Horizon length N
    pub fn steps(&self) -> usize {
        self.n
    }

    /// Number of actuation steps, N - 1
    pub fn control_steps(&self) -> usize {
        self.n - 1
    }

    pub fn n_vars(&self) -> usize {
        self.n_vars
    }

    pub fn n_constraints(&self) -> usize {
        Self::STATE_DIM * self.n
    }

    /// Index of state component `var` at timestep `t`
    #[inline]
    pub fn state(&self, var: StateVar, t: usize) -> usize {
        debug_assert!(t < self.n);
        self.state_start[var.index()] + t
    }

    /// Index of control component `var` at timestep `t`
    #[inline]
    pub fn control(&self, var: ControlVar, t: usize) -> usize {
        debug_assert!(t < self.n - 1);
        self.control_start[var.index()] + t
    }

    /// Constraint row enforcing state component `var` at timestep `t`
    #[inline]
    pub fn constraint_row(&self, var: StateVar, t: usize) -> usize {
        self.state(var, t)
    }

    /// Index range covered by `block`
    pub fn range(&self, block: Block) -> Range<usize> {
        match block {
            Block::State(var) => {
                let start = self.state_start[var.index()];
                start..start + self.n
            }
            Block::Control(var) => {
                let start = self.control_start[var.index()];
                start..start + self.n - 1
            }
        }
    }

    /// All eight blocks in vector order
    pub fn blocks(&self) -> impl Iterator<Item = (Block, Range<usize>)> + '_ {
        StateVar::ALL
            .iter()
            .map(|&v| Block::State(v))
            .chain(ControlVar::ALL.iter().map(|&c| Block::Control(c)))
            .map(move |b| (b, self.range(b)))
    }

    /// First index of the control blocks; everything before it is state
    pub fn controls_start(&self) -> usize {
        self.control_start[0]
    }

    /// Read the state at timestep `t`
    pub fn state_at(&self, vars: &[f64], t: usize) -> VehicleState {
        VehicleState::new(
            vars[self.state(StateVar::X, t)],
            vars[self.state(StateVar::Y, t)],
            vars[self.state(StateVar::Psi, t)],
            vars[self.state(StateVar::V, t)],
            vars[self.state(StateVar::Cte, t)],
            vars[self.state(StateVar::Epsi, t)],
        )
    }

    /// Write `state` at timestep `t`
    pub fn set_state(&self, vars: &mut [f64], t: usize, state: &VehicleState) {
        let values = state.to_vector();
        for var in StateVar::ALL.iter() {
            vars[self.state(*var, t)] = values[var.index()];
        }
    }

    /// Read the actuation at timestep `t`
    pub fn control_at(&self, vars: &[f64], t: usize) -> Actuation {
        Actuation::new(
            vars[self.control(ControlVar::Steering, t)],
            vars[self.control(ControlVar::Acceleration, t)],
        )
    }
}
