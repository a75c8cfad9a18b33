// ============================================================================
// Authentication
// ============================================================================
//
// Two pieces:
// - `users`: identity records (role, credential hash, lockout state)
// - `tokens`: the token manager owning issuance, validation, rotation and
//   revocation of bearer tokens
//
// ============================================================================

pub mod tokens;
pub mod users;

pub use tokens::{AuthError, TokenKind, TokenManager};
pub use users::{Role, User, UserInfo};
