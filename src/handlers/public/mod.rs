// handlers/public/mod.rs - Public handlers (no authentication required)
//
// Route prefix: /api/_auth/* and liveness endpoints. These are high-frequency
// polls and are excluded from the request log by default.

pub mod session;

pub use session::session_get;
