//! Administrator credentials
//!
//! Provides:
//! - JWT generation and validation for staff accounts
//! - Roles and the operation table that says which role a write needs

pub mod jwt;
pub mod permissions;

pub use jwt::{extract_token_from_header, Claims, JwtValidator, TokenInput, TokenValidationResult};
pub use permissions::{is_operation_allowed, required_role, Operation, Role};
