/// Single options struct enumerating every tunable of the engine (spec §6).
/// Callers build one of these and pass it to `createDatabase`-equivalent
/// module constructors; no persisted state format is part of the core.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Worker thread count. `0` means "use hardware parallelism".
    pub worker_count: usize,
    pub broadphase: BroadphaseConfig,
    pub solver: SolverConfig,
    pub physics: PhysicsConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            worker_count: 0,
            broadphase: BroadphaseConfig::default(),
            solver: SolverConfig::default(),
            physics: PhysicsConfig::default(),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct BroadphaseConfig {
    pub origin_x: f32,
    pub origin_y: f32,
    pub cell_size_x: f32,
    pub cell_size_y: f32,
    pub cell_count_x: u32,
    pub cell_count_y: u32,
    pub cell_padding: f32,
}

impl Default for BroadphaseConfig {
    fn default() -> Self {
        BroadphaseConfig {
            origin_x: 0.0,
            origin_y: 0.0,
            cell_size_x: 1.0,
            cell_size_y: 1.0,
            cell_count_x: 64,
            cell_count_y: 64,
            cell_padding: 0.0,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct SolverConfig {
    pub max_iterations: u8,
    pub max_lambda: f32,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            max_iterations: 5,
            max_lambda: 1e-3,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct PhysicsConfig {
    pub linear_drag_multiplier: f32,
    pub angular_drag_multiplier: f32,
    pub friction_coeff: f32,
    pub solve_iterations: i32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        // Matches the canonical field set named in spec §6; the upstream
        // project carried two diverging `PhysicsConfig` shapes (Open
        // Question 4) — this is the one resolved at reimplementation time.
        PhysicsConfig {
            linear_drag_multiplier: 0.96,
            angular_drag_multiplier: 0.99,
            friction_coeff: 0.5,
            solve_iterations: 5,
        }
    }
}
