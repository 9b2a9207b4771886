//! Request middleware: authentication and scope attachment

pub mod auth;
pub mod scope;

pub use auth::{authenticate, AuthUser, Claims, CurrentUser};
pub use scope::{attach_city_scope, require_city_scope, require_permission, CityScopeCtx};
