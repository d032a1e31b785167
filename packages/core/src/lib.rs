// ABOUTME: Core types and filesystem primitives for Plinth
// ABOUTME: Data-root layout, path containment guard, identifier validation and tree walking

pub mod constants;
pub mod layout;
pub mod path_guard;
pub mod utils;
pub mod validation;

// Re-export main types
pub use layout::Layout;
pub use path_guard::{
    assert_contained, assert_contained_in_any, join_relative, resolve_relative, PathGuard,
    PathGuardError,
};

// Re-export utilities
pub use utils::{is_skipped_dir, walk_files, WalkedFile};

// Re-export validation
pub use validation::{validate_commit_id, validate_site_id, ValidationError};
