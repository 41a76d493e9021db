// handlers/protected/mod.rs - Protected handlers (JWT authentication required)
//
// Route prefix: /api/*. `jwt_auth_middleware` runs first and has already put
// the user (and any impersonation) on the request log by the time these run.

pub mod todos;
pub mod whoami;

pub use todos::{todo_delete, todos_get, todos_post, Todo, TodoStore};
pub use whoami::whoami_get;
