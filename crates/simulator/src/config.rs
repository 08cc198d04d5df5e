/// Knobs for a simulation run. The defaults describe a small pool:
/// 8 placement groups, 3-way replication, a 20-tick timestep and a
/// two-timestep peering window.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Number of placement groups, ids `0..pg_count`.
    pub pg_count: usize,
    /// Replica count requested from the rule (pool size).
    pub pool_size: i32,
    /// Minimum replicas for the pool to accept writes. Carried for
    /// completeness; the write model does not enforce it.
    pub pool_min_size: i32,
    /// Retry budget for the rule evaluator.
    pub choose_total_tries: u32,
    /// Virtual ticks between mainloop iterations.
    pub timestep: i64,
    /// Peering must see a live device for this many future timesteps.
    pub timesteps_to_peer: i64,
    /// Informational send timeout; not consulted by the write model.
    pub timeout: i64,
    /// Default user-to-primary transfer cost.
    pub user_conn_speed: i64,
    /// Default primary-to-replica transfer cost.
    pub conn_speed: i64,
    /// Default per-write device failure probability.
    pub failure_proba: f64,
    /// Per-timestep device death probability.
    pub death_proba: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            pg_count: 8,
            pool_size: 3,
            pool_min_size: 2,
            choose_total_tries: 5,
            timestep: 20,
            timesteps_to_peer: 2,
            timeout: 70,
            user_conn_speed: 20,
            conn_speed: 20,
            failure_proba: 0.05,
            death_proba: 0.25,
        }
    }
}
